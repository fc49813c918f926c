//! Filename classifier for scene-style release names
//!
//! Turns names like:
//! - "Inception.2010.720p.x264-GROUP"
//! - "The.Office.US.S02E04.720p"
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL"
//!
//! into a [`MediaIdentity`]. Episodes are tried before movies. Everything after
//! the year or episode marker is the release tail, which feeds the metadata
//! tag tables below.
//!
//! Tag tables are ordered: when several entries of one table match, the one
//! listed first wins. More specific patterns are therefore listed before the
//! generic ones they overlap with (`WEB.?Rip` before `WEB`, `Remux` before
//! `BluRay`, the x26x encoder names before the H.26x standards).

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::text_utils::clean_name;
use crate::error::{Result, SubtitleError};
use crate::media::{Codec, Episode, MediaIdentity, Metadata, MiscTag, Movie, Quality, Source};

const QUALITY_PATTERNS: &[(&str, Quality)] = &[
    (r"2160p|4K|UHD|Ultra.?HD", Quality::Uhd2160p),
    (r"1440p|QHD", Quality::Qhd1440p),
    (r"1080p|Full.?HD", Quality::Hd1080p),
    (r"720p", Quality::Hd720p),
    (r"576p", Quality::Sd576p),
    (r"480p", Quality::Sd480p),
];

const SOURCE_PATTERNS: &[(&str, Source)] = &[
    (r"Remux", Source::Remux),
    (r"Blu.?Ray|(?:BD|BR).?Rip|BD.?(?:R|5|9)", Source::BluRay),
    (r"WEB.?Rip", Source::WebRip),
    (r"WEB.?DL(?:Rip)?|HD.?Rip|WEB", Source::WebDl),
    (r"VOD.?Rip|VODR", Source::VodRip),
    (r"(?:DSR|DS|SAT|DTH|DVB|TV|HDTV|PDTV)(?:.?Rip)?", Source::Hdtv),
    (r"DVD.?Rip|DVD.?Mux", Source::DvdRip),
    (r"DVD.?(?:R|5|9)(?:.?Full)?|ISO", Source::Dvdr),
    (r"R5(?:.LINE)?", Source::R5),
    (r"DVD.?SCR(?:EENER)?|SCR|SCREENER|DBSCR", Source::Screener),
    (r"HD.?TC|TC|TELECINE", Source::Telecine),
    (r"WP|WORKPRINT", Source::Workprint),
    (r"HD.?TS|TS|TELESYNC|PDVD", Source::Telesync),
    (r"CAM.?Rip|HD.?CAM|CAM", Source::Cam),
];

const CODEC_PATTERNS: &[(&str, Codec)] = &[
    (r"x265", Codec::X265),
    (r"x264", Codec::X264),
    (r"HEVC|H.?265", Codec::Hevc),
    (r"AVC|H.?264", Codec::Avc),
    (r"XviD", Codec::Xvid),
    (r"DivX", Codec::Divx),
    (r"WMV", Codec::Wmv),
];

const MISC_PATTERNS: &[(&str, MiscTag)] = &[
    (r"3D", MiscTag::Video3D),
    (r"HC|Hardcoded?", MiscTag::HardcodedSubs),
    (r"SDH|HI", MiscTag::HearingImpaired),
    (r"DTS(?:.?HD)?", MiscTag::Dts),
    (r"DD(?:\+|P)?(?:[257]\.[01])?|TrueHD|Atmos", MiscTag::DolbyDigital),
    (r"AC3", MiscTag::Ac3),
    (r"Extended(?:.(?:Cut|Edition))?", MiscTag::Extended),
    (r"(?:DD[+P]?|TrueHD|MA|DTS)?5\.1", MiscTag::Surround5_1),
    (r"(?:DD[+P]?|TrueHD|MA|DTS)?7\.1", MiscTag::Surround7_1),
];

static EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?[\w)]+)[\W_]+?[Ss]?(\d{1,2})[Eex](\d{1,2})(?:[Ee]\d{1,2})?[\W_]*(.*)$")
        .expect("episode regex should compile")
});

static MOVIE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+)[\W_]+(19\d\d|20\d\d)[\W_]*(.*)$").expect("movie regex should compile")
});

static GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9]+$").expect("group regex should compile"));

static QUALITIES: Lazy<TagMatcher<Quality>> = Lazy::new(|| TagMatcher::new(QUALITY_PATTERNS));
static SOURCES: Lazy<TagMatcher<Source>> = Lazy::new(|| TagMatcher::new(SOURCE_PATTERNS));
static CODECS: Lazy<TagMatcher<Codec>> = Lazy::new(|| TagMatcher::new(CODEC_PATTERNS));
static MISC: Lazy<TagMatcher<MiscTag>> = Lazy::new(|| TagMatcher::new(MISC_PATTERNS));

/// Ordered table of tag patterns matched case-insensitively between
/// separators (anything but a letter or digit)
struct TagMatcher<T> {
    entries: Vec<(Regex, T)>,
}

impl<T: Copy> TagMatcher<T> {
    fn new(patterns: &[(&str, T)]) -> Self {
        let entries = patterns
            .iter()
            .map(|(pattern, tag)| {
                let bounded = format!(r"(?i)(?:^|[\W_])({})(?:[\W_]|$)", pattern);
                let regex = Regex::new(&bounded).expect("tag pattern should compile");
                (regex, *tag)
            })
            .collect();
        Self { entries }
    }

    fn position(regex: &Regex, s: &str) -> Option<usize> {
        regex.captures(s).and_then(|c| c.get(1)).map(|m| m.start())
    }

    /// First table entry that matches, with the offset of its match
    fn find(&self, s: &str) -> Option<(usize, T)> {
        self.entries
            .iter()
            .find_map(|(regex, tag)| Self::position(regex, s).map(|pos| (pos, *tag)))
    }

    /// Every table entry that matches
    fn find_all(&self, s: &str) -> Vec<(usize, T)> {
        self.entries
            .iter()
            .filter_map(|(regex, tag)| Self::position(regex, s).map(|pos| (pos, *tag)))
            .collect()
    }
}

pub fn parse_quality(s: &str) -> Option<Quality> {
    QUALITIES.find(s).map(|(_, q)| q)
}

pub fn parse_source(s: &str) -> Option<Source> {
    SOURCES.find(s).map(|(_, src)| src)
}

pub fn parse_codec(s: &str) -> Option<Codec> {
    CODECS.find(s).map(|(_, c)| c)
}

/// Release group: the trailing alphanumeric run, unless it is itself a
/// quality, source or codec tag or a single character
pub fn parse_group(s: &str) -> Option<String> {
    find_group(s).map(|(_, g)| g.to_string())
}

fn find_group(s: &str) -> Option<(usize, &str)> {
    let m = GROUP.find(s)?;
    let group = m.as_str();
    if group.len() <= 1
        || parse_quality(group).is_some()
        || parse_source(group).is_some()
        || parse_codec(group).is_some()
    {
        return None;
    }
    Some((m.start(), group))
}

/// Metadata of a release tail plus where the free text in front of the
/// first tag ends
struct ParsedRelease {
    metadata: Metadata,
    text_end: usize,
}

/// Parse the metadata of a release tail such as "720p.BluRay.x264-GROUP".
///
/// A trailing run only counts as the release group when a tag precedes it;
/// otherwise it is free text (an episode title, for instance).
pub fn parse_metadata(tail: &str) -> Metadata {
    parse_release(tail, false).metadata
}

fn parse_release(tail: &str, bare_group: bool) -> ParsedRelease {
    let quality = QUALITIES.find(tail);
    let source = SOURCES.find(tail);
    let codec = CODECS.find(tail);
    let misc = MISC.find_all(tail);

    let first_tag = [
        quality.map(|(pos, _)| pos),
        source.map(|(pos, _)| pos),
        codec.map(|(pos, _)| pos),
    ]
    .into_iter()
    .flatten()
    .chain(misc.iter().map(|(pos, _)| *pos))
    .min();

    let group = find_group(tail).filter(|(start, _)| match first_tag {
        Some(tag) => *start > tag,
        None => bare_group,
    });

    let text_end = first_tag
        .or(group.map(|(start, _)| start))
        .unwrap_or(tail.len());

    let metadata = Metadata {
        group: group.map(|(_, g)| g.to_string()),
        quality: quality.map(|(_, q)| q),
        source: source.map(|(_, s)| s),
        codec: codec.map(|(_, c)| c),
        misc: misc.into_iter().map(|(_, m)| m).collect(),
        tags: tail
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    };

    ParsedRelease { metadata, text_end }
}

fn unrecognized(name: &str) -> SubtitleError {
    SubtitleError::Unrecognized(name.to_string())
}

/// Classify a bare filename (no directory, no extension)
pub fn classify(name: &str) -> Result<MediaIdentity> {
    if let Some(caps) = EPISODE.captures(name) {
        let show = clean_name(&caps[1]);
        let season: u32 = caps[2].parse().map_err(|_| unrecognized(name))?;
        let episode: u32 = caps[3].parse().map_err(|_| unrecognized(name))?;
        let tail = caps.get(4).map_or("", |m| m.as_str());

        let release = parse_release(tail, false);
        let episode_title = Some(clean_name(&tail[..release.text_end])).filter(|t| !t.is_empty());

        debug!(
            filename = name,
            show = %show,
            season = season,
            episode = episode,
            episode_title = ?episode_title,
            quality = ?release.metadata.quality,
            "Classified episode"
        );

        return Ok(MediaIdentity::Episode(Episode {
            show,
            season,
            episode,
            episode_title,
            metadata: release.metadata,
        }));
    }

    if let Some(caps) = MOVIE.captures(name) {
        let title = clean_name(&caps[1]);
        let year: u32 = caps[2].parse().map_err(|_| unrecognized(name))?;
        let tail = caps.get(3).map_or("", |m| m.as_str());
        let metadata = parse_release(tail, true).metadata;

        debug!(
            filename = name,
            title = %title,
            year = year,
            quality = ?metadata.quality,
            group = ?metadata.group,
            "Classified movie"
        );

        return Ok(MediaIdentity::Movie(Movie {
            title,
            year,
            metadata,
        }));
    }

    debug!(filename = name, "Filename did not match any media pattern");
    Err(unrecognized(name))
}
