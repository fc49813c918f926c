//! Ranked subtitle candidates
//!
//! The list is kept sorted by score, best first. Ties keep arrival order.
//! Filters return new lists and leave the original untouched.

use super::match_scorer::Evaluator;
use super::provider::OnlineSubtitle;
use crate::media::{LanguageTag, MediaIdentity};

/// A candidate and the score it earned against one target
#[derive(Debug, Clone)]
pub struct RatedSubtitle {
    pub subtitle: OnlineSubtitle,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RatedSubtitles {
    entries: Vec<RatedSubtitle>,
}

impl RatedSubtitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score every candidate against `target` and keep the ones that can match
    pub fn rate<E, I>(evaluator: &E, target: &MediaIdentity, candidates: I) -> Self
    where
        E: Evaluator + ?Sized,
        I: IntoIterator<Item = OnlineSubtitle>,
    {
        let mut list = Self::new();
        list.extend(candidates.into_iter().map(|subtitle| {
            let score = evaluator.evaluate(target, &subtitle.subtitle.media);
            RatedSubtitle { subtitle, score }
        }));
        list
    }

    /// Add a rated candidate. Candidates scoring zero cannot match and are
    /// dropped.
    pub fn push(&mut self, rated: RatedSubtitle) {
        self.extend(std::iter::once(rated));
    }

    fn sort(&mut self) {
        // Vec::sort_by is stable, so equal scores keep arrival order
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    fn filtered(&self, keep: impl Fn(&RatedSubtitle) -> bool) -> Self {
        Self {
            entries: self.entries.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Candidates scoring at least `min`
    pub fn filter_score(&self, min: f64) -> Self {
        self.filtered(|r| r.score >= min)
    }

    /// Candidates whose hearing-impaired flag equals `hi`
    pub fn hearing_impaired(&self, hi: bool) -> Self {
        self.filtered(|r| r.subtitle.subtitle.hearing_impaired == hi)
    }

    pub fn filter_language(&self, language: &LanguageTag) -> Self {
        self.filtered(|r| &r.subtitle.subtitle.language == language)
    }

    pub fn best(&self) -> Option<&RatedSubtitle> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RatedSubtitle> {
        self.entries.iter()
    }
}

impl Extend<RatedSubtitle> for RatedSubtitles {
    fn extend<T: IntoIterator<Item = RatedSubtitle>>(&mut self, iter: T) {
        self.entries
            .extend(iter.into_iter().filter(|r| r.score > 0.0));
        self.sort();
    }
}

impl IntoIterator for RatedSubtitles {
    type Item = RatedSubtitle;
    type IntoIter = std::vec::IntoIter<RatedSubtitle>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a RatedSubtitles {
    type Item = &'a RatedSubtitle;
    type IntoIter = std::slice::Iter<'a, RatedSubtitle>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Metadata, Movie, Quality, Subtitle};
    use crate::services::match_scorer::MetadataEvaluator;

    fn online(link: &str, language: &str, hi: bool) -> OnlineSubtitle {
        OnlineSubtitle {
            subtitle: Subtitle {
                media: MediaIdentity::Movie(Movie {
                    title: "Inception".to_string(),
                    year: 2010,
                    metadata: Metadata::default(),
                }),
                language: LanguageTag::parse(language).unwrap(),
                hearing_impaired: hi,
            },
            link: link.to_string(),
            provider: "test".to_string(),
        }
    }

    fn rated(link: &str, language: &str, hi: bool, score: f64) -> RatedSubtitle {
        RatedSubtitle {
            subtitle: online(link, language, hi),
            score,
        }
    }

    fn links(list: &RatedSubtitles) -> Vec<&str> {
        list.iter().map(|r| r.subtitle.link.as_str()).collect()
    }

    fn sample() -> RatedSubtitles {
        let mut list = RatedSubtitles::new();
        list.extend([
            rated("a", "en", false, 0.4),
            rated("b", "de", true, 0.9),
            rated("c", "en", true, 0.7),
            rated("d", "en", false, 0.7),
        ]);
        list
    }

    #[test]
    fn test_sorted_after_every_add() {
        let mut list = sample();
        assert_eq!(links(&list), vec!["b", "c", "d", "a"]);

        list.push(rated("e", "en", false, 0.8));
        assert_eq!(links(&list), vec!["b", "e", "c", "d", "a"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut list = RatedSubtitles::new();
        list.push(rated("first", "en", false, 0.5));
        list.push(rated("second", "en", false, 0.5));
        list.push(rated("third", "en", false, 0.5));
        assert_eq!(links(&list), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_zero_scores_dropped() {
        let mut list = RatedSubtitles::new();
        list.push(rated("zero", "en", false, 0.0));
        assert!(list.is_empty());
        assert!(list.best().is_none());
    }

    #[test]
    fn test_filter_score() {
        let list = sample();
        let filtered = list.filter_score(0.7);
        assert_eq!(links(&filtered), vec!["b", "c", "d"]);
        assert!(filtered.iter().all(|r| r.score >= 0.7));
        // The original list is unchanged
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_filter_language_and_hearing_impaired() {
        let list = sample();
        let english = list.filter_language(&LanguageTag::parse("en").unwrap());
        assert_eq!(links(&english), vec!["c", "d", "a"]);

        let plain = english.hearing_impaired(false);
        assert_eq!(links(&plain), vec!["d", "a"]);
        assert_eq!(plain.best().map(|r| r.subtitle.link.as_str()), Some("d"));
    }

    #[test]
    fn test_rate_with_evaluator() {
        let target = MediaIdentity::Movie(Movie {
            title: "Inception".to_string(),
            year: 2010,
            metadata: Metadata {
                quality: Some(Quality::Hd720p),
                ..Default::default()
            },
        });
        let mut wrong_year = online("wrong", "en", false);
        if let MediaIdentity::Movie(ref mut m) = wrong_year.subtitle.media {
            m.year = 1990;
        }

        let list = RatedSubtitles::rate(
            &MetadataEvaluator,
            &target,
            vec![online("right", "en", false), wrong_year],
        );
        assert_eq!(links(&list), vec!["right"]);
    }
}
