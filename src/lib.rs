//! Media identity extraction and subtitle ranking
//!
//! Classifies scene-style video filenames, ranks subtitle candidates from a
//! provider against them and stores the best match beside each video.

pub mod config;
pub mod error;
pub mod media;
pub mod services;

pub use error::{Result, SubtitleError};
