//! Weighted scoring of subtitle candidates against a target video
//!
//! ## Scoring Formula
//! ```text
//! score = Σ (term_score × term_weight) / Σ term_weight
//! ```
//!
//! Every term adds weight even when it scores zero, so a penalty is simply a
//! zero-score term with some weight. Release metadata terms follow one rule:
//!
//! - target tag unknown: small "unavailable" penalty
//! - candidate tag unknown: large "missing" penalty
//! - tags equal: full credit
//! - tags differ: zero credit weighted by `sqrt(ordinal distance)`

use tracing::trace;

use super::text_utils::title_similarity;
use crate::media::{MediaIdentity, Metadata, Tier};

// ============================================================================
// Weight Constants
// ============================================================================

/// Term weights
pub mod weights {
    pub const QUALITY: f64 = 0.50;
    pub const SOURCE: f64 = 0.75;
    pub const CODEC: f64 = 0.15;
    pub const GROUP: f64 = 0.33;
    /// Movie release year agreement
    pub const YEAR: f64 = GROUP;
    /// Title similarity carries as much as all metadata terms together
    pub const TITLE: f64 = QUALITY + SOURCE + CODEC + GROUP;
}

/// Penalty multipliers applied to a term's weight
pub mod penalties {
    /// The candidate lacks a tag the target has
    pub const MISSING: f64 = 2.25;
    /// The target itself lacks the tag
    pub const UNAVAILABLE: f64 = 0.18;
    /// Per `sqrt(distance)` between two known tiers
    pub const DIFFERENT: f64 = 0.66;
}


/// Scores a candidate identity against a target identity. Zero means "cannot
/// match"; higher is better.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, target: &MediaIdentity, candidate: &MediaIdentity) -> f64;
}

/// Weighted average accumulator
#[derive(Debug, Clone, Copy, Default)]
pub struct Weighted {
    score: f64,
    weight: f64,
}

impl Weighted {
    pub fn add(&mut self, score: f64, weight: f64) {
        self.score += score * weight;
        self.weight += weight;
    }

    pub fn penalize(&mut self, weight: f64) {
        self.add(0.0, weight);
    }

    pub fn score(&self) -> f64 {
        if self.weight == 0.0 {
            0.0
        } else {
            self.score / self.weight
        }
    }
}

/// Default evaluator: title similarity plus release metadata agreement
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataEvaluator;

impl MetadataEvaluator {
    fn score_tier<T: Tier>(acc: &mut Weighted, target: Option<T>, candidate: Option<T>, weight: f64) {
        match (target, candidate) {
            (None, _) => acc.penalize(penalties::UNAVAILABLE * weight),
            (Some(_), None) => acc.penalize(penalties::MISSING * weight),
            (Some(t), Some(c)) if t == c => acc.add(1.0, weight),
            (Some(t), Some(c)) => {
                let distance = f64::from(t.distance(c));
                acc.penalize(distance.sqrt() * penalties::DIFFERENT * weight);
            }
        }
    }

    fn score_group(acc: &mut Weighted, target: Option<&str>, candidate: Option<&str>) {
        match (target, candidate) {
            (None, _) => acc.penalize(penalties::UNAVAILABLE * weights::GROUP),
            (Some(_), None) => acc.penalize(penalties::MISSING * weights::GROUP),
            (Some(t), Some(c)) if t == c => acc.add(1.0, weights::GROUP),
            (Some(_), Some(_)) => acc.penalize(penalties::DIFFERENT * weights::GROUP),
        }
    }

    fn score_metadata(acc: &mut Weighted, target: &Metadata, candidate: &Metadata) {
        Self::score_group(acc, target.group.as_deref(), candidate.group.as_deref());
        Self::score_tier(acc, target.quality, candidate.quality, weights::QUALITY);
        Self::score_tier(acc, target.source, candidate.source, weights::SOURCE);
        Self::score_tier(acc, target.codec, candidate.codec, weights::CODEC);
    }
}

impl Evaluator for MetadataEvaluator {
    fn evaluate(&self, target: &MediaIdentity, candidate: &MediaIdentity) -> f64 {
        // 3D subtitles are timed for a different cut
        if candidate.metadata().is_3d() && !target.metadata().is_3d() {
            return 0.0;
        }

        let mut acc = Weighted::default();
        match (target, candidate) {
            (MediaIdentity::Movie(t), MediaIdentity::Movie(c)) => {
                // Zero marks an unknown year
                if t.year > 0 && c.year > 0 && t.year != c.year {
                    return 0.0;
                }
                acc.add(title_similarity(&t.title, &c.title), weights::TITLE);
                acc.add(if t.year == c.year { 1.0 } else { 0.0 }, weights::YEAR);
            }
            (MediaIdentity::Episode(t), MediaIdentity::Episode(c)) => {
                if t.season != c.season || t.episode != c.episode {
                    return 0.0;
                }
                acc.add(title_similarity(&t.show, &c.show), weights::TITLE);
            }
            _ => return 0.0,
        }

        Self::score_metadata(&mut acc, target.metadata(), candidate.metadata());

        let score = acc.score();
        trace!(
            target = %target,
            candidate = %candidate,
            candidate_meta = %candidate.metadata().summary(),
            score = score,
            "Evaluated candidate"
        );
        score
    }
}
