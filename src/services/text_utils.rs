//! Title cleaning and normalization utilities
//!
//! Release names use dots and underscores as separators, embed website
//! prefixes and shout in capitals. `clean_name` turns such a fragment into a
//! human title; `identity_fragment` reduces a title to a comparison key.

use once_cell::sync::Lazy;
use regex::Regex;

/// Words kept lower-case inside English titles
const NON_CAPITALIZED: &[&str] = &[
    // articles
    "a", "an", "the",
    // coordinating conjunctions
    "for", "and", "nor", "but", "or", "yet", "so",
    // short prepositions
    "ago", "anti", "as", "at", "by", "down", "from", "in", "into", "like", "near", "of", "off",
    "on", "onto", "past", "per", "plus", "save", "than", "to", "up", "via", "with",
];

static WEBSITE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:\[[^\]]*\]|www\.\S+?\.[a-z]{2,4}\b)[\W_]*")
        .expect("website prefix regex should compile")
});

static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}0-9]+").expect("word regex should compile"));

static ROMAN_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[IVXMC]+$").expect("roman numeral regex should compile"));

/// A punctuation break followed by a word, e.g. ": the" or "- a"
static BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.;:\-]\s*[\p{L}0-9]+").expect("break regex should compile"));

/// Turn a raw release-name fragment into a title.
///
/// ```ignore
/// assert_eq!(clean_name("agents.of.s.h.i.e.l.d."), "Agents of S.H.I.E.L.D.");
/// ```
pub fn clean_name(raw: &str) -> String {
    let stripped = WEBSITE_PREFIX.replace(raw.trim(), "");
    let spaced = stripped.replace('_', " ");

    let mut words: Vec<String> = Vec::new();
    for chunk in spaced.split_whitespace() {
        let parts: Vec<&str> = chunk.split('.').filter(|p| !p.is_empty()).collect();
        // A lone word ending in a dot is an abbreviation ("Vol.", "Mr.")
        let abbreviation = parts.len() == 1 && chunk.ends_with('.');
        for part in parts {
            let kept: String = part.chars().filter(|c| is_title_char(*c)).collect();
            if kept.is_empty() {
                continue;
            }
            if abbreviation && !is_single_letter(&kept) {
                words.push(format!("{}.", kept));
            } else {
                words.push(kept);
            }
        }
    }

    capitalize(&merge_acronyms(words).join(" "))
}

/// Collapse runs of two or more single letters into a dotted acronym
fn merge_acronyms(words: Vec<String>) -> Vec<String> {
    let mut merged = Vec::with_capacity(words.len());
    let mut run: Vec<String> = Vec::new();

    let flush = |run: &mut Vec<String>, merged: &mut Vec<String>| {
        if run.len() >= 2 {
            let acronym: String = run.iter().map(|l| format!("{}.", l.to_uppercase())).collect();
            merged.push(acronym);
        } else {
            merged.append(run);
        }
        run.clear();
    };

    for word in words {
        let letter = word.trim_end_matches('.');
        if is_single_letter(letter) {
            run.push(letter.to_string());
        } else {
            flush(&mut run, &mut merged);
            merged.push(word);
        }
    }
    flush(&mut run, &mut merged);
    merged
}

fn is_single_letter(word: &str) -> bool {
    let mut chars = word.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

fn is_title_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '\'' | '\u{2019}' | '&' | '!' | ',' | ':' | ';' | '(' | ')' | '-')
}

/// Whether the string has upper-case letters and no lower-case ones
fn is_upper(s: &str) -> bool {
    let mut upper = 0;
    for c in s.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            upper += 1;
        }
    }
    upper > 0
}

/// Upper-case the first letter of every word. Apostrophes do not start a
/// new word.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        let starts_word = match prev {
            None => true,
            Some(p) => !(p.is_alphanumeric() || p == '\'' || p == '\u{2019}'),
        };
        if starts_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

fn is_non_capitalized(word: &str) -> bool {
    NON_CAPITALIZED.contains(&word.to_lowercase().as_str())
}

/// English title capitalization
pub fn capitalize(s: &str) -> String {
    let lowered;
    let s = if is_upper(s) && s.chars().count() > 3 {
        lowered = s.to_lowercase();
        lowered.as_str()
    } else {
        s
    };
    let titled = title_case(s);

    let matches: Vec<_> = WORD.find_iter(&titled).collect();
    // The closing run of small words is capitalised ("What Are You Up To")
    let trailing = matches
        .iter()
        .rposition(|m| !is_non_capitalized(m.as_str()))
        .map_or(0, |i| i + 1);

    let mut out = String::with_capacity(titled.len());
    let mut last = 0;
    for (i, m) in matches.iter().enumerate() {
        out.push_str(&titled[last..m.start()]);
        let word = m.as_str();
        // Letters of a dotted acronym stay as they are
        let acronym_letter = is_single_letter(word)
            && word.chars().all(char::is_uppercase)
            && titled[m.end()..].starts_with('.');

        if i == 0 || acronym_letter {
            out.push_str(word);
        } else if i < trailing && is_non_capitalized(word) {
            out.push_str(&word.to_lowercase());
        } else if ROMAN_NUMERAL.is_match(word) {
            out.push_str(&word.to_uppercase());
        } else {
            out.push_str(word);
        }
        last = m.end();
    }
    out.push_str(&titled[last..]);

    BREAK
        .replace_all(&out, |caps: &regex::Captures| title_case(&caps[0]))
        .replace("'S", "'s")
}

/// Lower-case alphanumeric key with common diacritics folded, used for
/// identity keys and title comparison
pub fn identity_fragment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.to_lowercase().chars() {
        match fold_diacritic(c) {
            Some(folded) => out.push_str(folded),
            None if c.is_alphabetic() || c.is_ascii_digit() => out.push(c),
            None => {}
        }
    }
    out
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    };
    Some(folded)
}

/// Similarity of two titles in [0, 1] after normalization
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = identity_fragment(a);
    let b = identity_fragment(b);
    if a == b {
        return 1.0;
    }
    strsim::jaro_winkler(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TITLES: &[&str] = &[
        "Gone with the Wind",
        "The Shawshank Redemption",
        "The Godfather: Part II",
        "Schindler's List",
        "The Lord of the Rings: The Return of the King",
        "The Good, the Bad and the Ugly",
        "12 Angry Men",
        "Star Wars: Episode V - The Empire Strikes Back",
        "One Flew Over the Cuckoo's Nest",
        "Léon: The Professional",
        "Se7en",
        "Star Wars: Episode IV - A New Hope",
        "Once Upon a Time in America",
        "2001: A Space Odyssey",
        "To Kill a Mockingbird",
        "L.A. Confidential",
        "Mr. Smith Goes to Washington",
        "V for Vendetta",
        "Kill Bill: Vol. 1",
        "Agents of S.H.I.E.L.D.",
        "Dr. Strangelove or: How I Learned to Stop Worrying and Love the Bomb",
        "X-Men Origins: Wolverine",
        "Don't Think Twice",
        "Berlin, I Love You",
        "Mamma Mia!",
        "What Are You Up To",
        "Fed Up",
    ];

    #[test]
    fn test_capitalize_known_titles() {
        for title in TITLES {
            assert_eq!(capitalize(&title.to_lowercase()), *title);
        }
    }

    #[test]
    fn test_capitalize_shouting() {
        assert_eq!(capitalize("THE DARK KNIGHT"), "The Dark Knight");
        // Short all-caps strings are left alone
        assert_eq!(capitalize("USA"), "USA");
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("this.is.a.test"), "This Is a Test");
        assert_eq!(clean_name("this?_=is#.a_(test)"), "This Is a (Test)");
        assert_eq!(clean_name("abc.A.B.C.abc"), "Abc A.B.C. Abc");
        assert_eq!(clean_name("abc A B C abc"), "Abc A.B.C. Abc");
        assert_eq!(clean_name("A.Good.Day.To.Die.Hard"), "A Good Day to Die Hard");
        assert_eq!(clean_name("This.Is.A.Test"), "This Is a Test");
        assert_eq!(clean_name("agents.of.s.h.i.e.l.d."), "Agents of S.H.I.E.L.D.");
        assert_eq!(clean_name("The.Office.US"), "The Office US");
        assert_eq!(clean_name("what.are.you.up.to"), "What Are You Up To");
        assert_eq!(clean_name("the.one.i.love"), "The One I Love");
    }

    #[test]
    fn test_clean_name_dotted_titles() {
        assert_eq!(clean_name("the.godfather:.part.ii"), "The Godfather: Part II");
        assert_eq!(clean_name("l.a.confidential"), "L.A. Confidential");
        assert_eq!(
            clean_name("star.wars:.episode.v.-.the.empire.strikes.back"),
            "Star Wars: Episode V - The Empire Strikes Back"
        );
    }

    #[test]
    fn test_clean_name_keeps_spaced_titles() {
        assert_eq!(clean_name("Kill Bill: Vol. 1"), "Kill Bill: Vol. 1");
        assert_eq!(
            clean_name("Mr. Smith Goes to Washington"),
            "Mr. Smith Goes to Washington"
        );
    }

    #[test]
    fn test_clean_name_strips_websites() {
        assert_eq!(clean_name("www.example.com - Inception"), "Inception");
        assert_eq!(clean_name("[www.example.com].Inception"), "Inception");
    }

    #[test]
    fn test_identity_fragment() {
        assert_eq!(identity_fragment("thìs is â tést"), "thisisatest");
        assert_eq!(
            identity_fragment("vyzkoušejte tento řetězec"),
            "vyzkousejtetentoretezec"
        );
        assert_eq!(identity_fragment(r#""?=_ä!'<b½c)#1,2...3"#), "abc123");
        assert_eq!(identity_fragment("这是一个测试"), "这是一个测试");
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("The Office", "the office"), 1.0);
        assert!(title_similarity("The Office US", "The Office") > 0.8);
        assert!(title_similarity("Inception", "Interstellar") < 0.8);
    }
}
