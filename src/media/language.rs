//! BCP-47 language tags
//!
//! Only the subset subtitle sites use is accepted: a 2-3 letter primary
//! language, an optional 4 letter script and an optional region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid language tag: {0:?}")]
pub struct InvalidLanguageTag(pub String);

/// A canonicalised language tag such as `en`, `pt-BR` or `zh-Hant`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

/// English language names, their tag and the ISO 639-2 codes seen in filenames
const LANGUAGES: &[(&str, &str, &[&str])] = &[
    ("albanian", "sq", &["sqi", "alb"]),
    ("arabic", "ar", &["ara"]),
    ("armenian", "hy", &["hye", "arm"]),
    ("azerbaijani", "az", &["aze"]),
    ("bengali", "bn", &["ben"]),
    ("bosnian", "bs", &["bos"]),
    ("brazilian", "pt-BR", &[]),
    ("bulgarian", "bg", &["bul"]),
    ("catalan", "ca", &["cat"]),
    ("chinese", "zh", &["zho", "chi"]),
    ("croatian", "hr", &["hrv"]),
    ("czech", "cs", &["ces", "cze"]),
    ("danish", "da", &["dan"]),
    ("dutch", "nl", &["nld", "dut"]),
    ("english", "en", &["eng"]),
    ("estonian", "et", &["est"]),
    ("farsi", "fa", &[]),
    ("finnish", "fi", &["fin"]),
    ("french", "fr", &["fra", "fre"]),
    ("georgian", "ka", &["kat", "geo"]),
    ("german", "de", &["deu", "ger"]),
    ("greek", "el", &["ell", "gre"]),
    ("hebrew", "he", &["heb"]),
    ("hindi", "hi", &["hin"]),
    ("hungarian", "hu", &["hun"]),
    ("icelandic", "is", &["isl", "ice"]),
    ("indonesian", "id", &["ind"]),
    ("italian", "it", &["ita"]),
    ("japanese", "ja", &["jpn"]),
    ("korean", "ko", &["kor"]),
    ("latvian", "lv", &["lav"]),
    ("lithuanian", "lt", &["lit"]),
    ("macedonian", "mk", &["mkd", "mac"]),
    ("malay", "ms", &["msa", "may"]),
    ("malayalam", "ml", &["mal"]),
    ("mongolian", "mn", &["mon"]),
    ("norwegian", "no", &["nor"]),
    ("persian", "fa", &["fas", "per"]),
    ("polish", "pl", &["pol"]),
    ("portuguese", "pt", &["por"]),
    ("romanian", "ro", &["ron", "rum"]),
    ("russian", "ru", &["rus"]),
    ("serbian", "sr", &["srp"]),
    ("slovak", "sk", &["slk", "slo"]),
    ("slovenian", "sl", &["slv"]),
    ("spanish", "es", &["spa"]),
    ("swedish", "sv", &["swe"]),
    ("thai", "th", &["tha"]),
    ("turkish", "tr", &["tur"]),
    ("ukrainian", "uk", &["ukr"]),
    ("urdu", "ur", &["urd"]),
    ("vietnamese", "vi", &["vie"]),
];

impl LanguageTag {
    /// Parse a strict BCP-47 tag, canonicalising case and known 3 letter codes
    pub fn parse(s: &str) -> Result<Self, InvalidLanguageTag> {
        let invalid = || InvalidLanguageTag(s.to_string());
        let mut subtags = s.split(['-', '_']);

        let primary = subtags.next().ok_or_else(invalid)?;
        if !(2..=3).contains(&primary.len()) || !primary.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(invalid());
        }
        let mut primary = primary.to_ascii_lowercase();
        if primary.len() == 3
            && let Some((_, two, _)) = LANGUAGES.iter().find(|(_, _, three)| three.contains(&primary.as_str()))
            && !two.contains('-')
        {
            primary = (*two).to_string();
        }

        let mut tag = primary;
        let mut seen_script = false;
        let mut seen_region = false;
        for subtag in subtags {
            if !seen_script
                && !seen_region
                && subtag.len() == 4
                && subtag.chars().all(|c| c.is_ascii_alphabetic())
            {
                let mut chars = subtag.chars();
                tag.push('-');
                if let Some(first) = chars.next() {
                    tag.push(first.to_ascii_uppercase());
                }
                tag.extend(chars.map(|c| c.to_ascii_lowercase()));
                seen_script = true;
            } else if !seen_region
                && ((subtag.len() == 2 && subtag.chars().all(|c| c.is_ascii_alphabetic()))
                    || (subtag.len() == 3 && subtag.chars().all(|c| c.is_ascii_digit())))
            {
                tag.push('-');
                tag.push_str(&subtag.to_ascii_uppercase());
                seen_region = true;
            } else {
                return Err(invalid());
            }
        }

        Ok(Self(tag))
    }

    /// Look up an English language name such as "german"
    pub fn from_english_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        LANGUAGES
            .iter()
            .find(|(english, _, _)| *english == lower)
            .and_then(|(_, tag, _)| Self::parse(tag).ok())
    }

    /// Accept either a tag or an English language name
    pub fn parse_lenient(s: &str) -> Result<Self, InvalidLanguageTag> {
        Self::parse(s).or_else(|err| Self::from_english_name(s).ok_or(err))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The primary language subtag, e.g. "pt" for "pt-BR"
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl FromStr for LanguageTag {
    type Err = InvalidLanguageTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = InvalidLanguageTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_lenient(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
