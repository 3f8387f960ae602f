//! Keyword normalization for phonetic matching
//!
//! Free text is split into unique lowercase words, stop words are dropped and
//! every remaining word is reduced to its Metaphone code. The same pipeline
//! runs when a challenge is indexed and when a query is resolved, so a query
//! word hits a record only when both encode to the same code.

use std::collections::HashSet;

/// Words never indexed nor searched for
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "on", "at", "then", "for", "from", "this", "that", "more",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Unique lowercase words of `text` in first-seen order, stop words removed
pub fn words(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| !is_stop_word(word))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Deduplicated phonetic codes for every word of every text
pub fn phonetic_codes<'a, I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut codes = Vec::new();

    for text in texts {
        for word in words(text) {
            if let Some(code) = metaphone(&word) {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
        }
    }

    codes
}

/// Metaphone code of a single word, `None` when nothing encodable is left.
///
/// Non-letters are discarded first. Rules run in order over the lowercase
/// word; every rewrite emits uppercase letters (or `0` for TH) so later rules
/// never match their output.
pub fn metaphone(word: &str) -> Option<String> {
    let mut s: Vec<u8> = word
        .bytes()
        .filter(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_lowercase())
        .collect();

    if s.is_empty() {
        return None;
    }

    for rule in RULES {
        s = rule(&s);
    }

    let code: String = s.iter().map(|b| b.to_ascii_uppercase() as char).collect();
    (!code.is_empty()).then_some(code)
}

type Rule = fn(&[u8]) -> Vec<u8>;

const RULES: &[Rule] = &[
    collapse_doubled_consonants,
    initial_ae,
    initial_silent_before_n,
    initial_wr,
    initial_x,
    initial_wh,
    trailing_mb,
    inner_sch,
    th,
    ch_sh,
    cia,
    sio_tia,
    soft_c,
    hard_c,
    dge,
    d,
    silent_gh,
    gned,
    soft_g,
    hard_g,
    ph,
    h_after_vowel,
    w_y_before_consonant,
    z,
    v,
    x,
    inner_vowels,
];

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u')
}

fn at(s: &[u8], i: usize) -> Option<u8> {
    s.get(i).copied()
}

fn followed_by(s: &[u8], i: usize, pred: impl Fn(u8) -> bool) -> bool {
    at(s, i).map_or(false, pred)
}

/// Rewrite a leading `pattern`
fn prefix(s: &[u8], pattern: &[u8], replacement: &[u8]) -> Vec<u8> {
    if s.starts_with(pattern) {
        let mut out = replacement.to_vec();
        out.extend_from_slice(&s[pattern.len()..]);
        out
    } else {
        s.to_vec()
    }
}

/// Left-to-right scan; `step` returns the input length consumed and the
/// replacement, or `None` to copy the byte through.
fn rewrite(s: &[u8], step: impl Fn(&[u8], usize) -> Option<(usize, &'static [u8])>) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        match step(s, i) {
            Some((consumed, replacement)) => {
                out.extend_from_slice(replacement);
                i += consumed;
            }
            None => {
                out.push(s[i]);
                i += 1;
            }
        }
    }
    out
}

fn collapse_doubled_consonants(s: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(s.len());
    for &b in s {
        if out.last() == Some(&b) && b"bcdfhjklmnpqrstvwxyz".contains(&b) {
            continue;
        }
        out.push(b);
    }
    out
}

fn initial_ae(s: &[u8]) -> Vec<u8> {
    prefix(s, b"ae", b"E")
}

fn initial_silent_before_n(s: &[u8]) -> Vec<u8> {
    match s {
        [b'g' | b'k' | b'p', b'n', ..] => prefix(s, &s[..2], b"N"),
        _ => s.to_vec(),
    }
}

fn initial_wr(s: &[u8]) -> Vec<u8> {
    prefix(s, b"wr", b"R")
}

fn initial_x(s: &[u8]) -> Vec<u8> {
    prefix(s, b"x", b"S")
}

fn initial_wh(s: &[u8]) -> Vec<u8> {
    prefix(s, b"wh", b"W")
}

fn trailing_mb(s: &[u8]) -> Vec<u8> {
    match s.strip_suffix(b"mb") {
        Some(head) => {
            let mut out = head.to_vec();
            out.push(b'M');
            out
        }
        None => s.to_vec(),
    }
}

fn inner_sch(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (i > 0 && s[i..].starts_with(b"sch")).then_some((3, b"SK".as_slice())))
}

fn th(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| s[i..].starts_with(b"th").then_some((2, b"0".as_slice())))
}

fn ch_sh(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let rest = &s[i..];
        if rest.starts_with(b"tch") {
            Some((3, b"X".as_slice()))
        } else if rest.starts_with(b"ch") || rest.starts_with(b"sh") {
            Some((2, b"X".as_slice()))
        } else {
            None
        }
    })
}

fn cia(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        (s[i] == b'c' && s[i + 1..].starts_with(b"ia")).then_some((1, b"X".as_slice()))
    })
}

fn sio_tia(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = matches!(s[i], b's' | b't')
            && at(s, i + 1) == Some(b'i')
            && matches!(at(s, i + 2), Some(b'a' | b'o'));
        hit.then_some((1, b"X".as_slice()))
    })
}

fn soft_c(s: &[u8]) -> Vec<u8> {
    let front = |b: u8| matches!(b, b'i' | b'e' | b'y');
    rewrite(s, |s, i| {
        if s[i] == b's' && at(s, i + 1) == Some(b'c') && followed_by(s, i + 2, front) {
            Some((2, b"S".as_slice()))
        } else if s[i] == b'c' && followed_by(s, i + 1, front) {
            Some((1, b"S".as_slice()))
        } else {
            None
        }
    })
}

fn hard_c(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| match s[i] {
        b'c' if at(s, i + 1) == Some(b'k') => Some((2, b"K".as_slice())),
        b'c' | b'q' => Some((1, b"K".as_slice())),
        _ => None,
    })
}

fn dge(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = s[i..].starts_with(b"dg")
            && followed_by(s, i + 2, |b| matches!(b, b'i' | b'e' | b'y'));
        hit.then_some((2, b"J".as_slice()))
    })
}

fn d(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (s[i] == b'd').then_some((1, b"T".as_slice())))
}

fn silent_gh(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = s[i] == b'g' && at(s, i + 1) == Some(b'h') && followed_by(s, i + 2, |b| !is_vowel(b));
        hit.then_some((1, b"".as_slice()))
    })
}

fn gned(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let rest = &s[i..];
        if rest.starts_with(b"gned") {
            Some((4, b"N".as_slice()))
        } else if rest.starts_with(b"gn") {
            Some((2, b"N".as_slice()))
        } else {
            None
        }
    })
}

fn soft_g(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = s[i] == b'g'
            && (i == 0 || s[i - 1] != b'g')
            && followed_by(s, i + 1, |b| matches!(b, b'i' | b'e' | b'y'));
        hit.then_some((1, b"J".as_slice()))
    })
}

fn hard_g(s: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s[i] == b'g' {
            while i < s.len() && s[i] == b'g' {
                i += 1;
            }
            out.push(b'K');
        } else {
            out.push(s[i]);
            i += 1;
        }
    }
    out
}

fn ph(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| s[i..].starts_with(b"ph").then_some((2, b"F".as_slice())))
}

fn h_after_vowel(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = s[i] == b'h'
            && i > 0
            && is_vowel(s[i - 1])
            && !followed_by(s, i + 1, is_vowel);
        hit.then_some((1, b"".as_slice()))
    })
}

fn w_y_before_consonant(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| {
        let hit = matches!(s[i], b'w' | b'y') && !followed_by(s, i + 1, is_vowel);
        hit.then_some((1, b"".as_slice()))
    })
}

fn z(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (s[i] == b'z').then_some((1, b"S".as_slice())))
}

fn v(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (s[i] == b'v').then_some((1, b"F".as_slice())))
}

fn x(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (s[i] == b'x').then_some((1, b"KS".as_slice())))
}

fn inner_vowels(s: &[u8]) -> Vec<u8> {
    rewrite(s, |s, i| (i > 0 && is_vowel(s[i])).then_some((1, b"".as_slice())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(word: &str) -> String {
        metaphone(word).unwrap()
    }

    #[test]
    fn test_common_codes() {
        assert_eq!(code("ruby"), "RB");
        assert_eq!(code("java"), "JF");
        assert_eq!(code("heroku"), "HRK");
        assert_eq!(code("thumb"), "0M");
        assert_eq!(code("apex"), "APKS");
    }

    #[test]
    fn test_sound_alike_words_share_codes() {
        assert_eq!(code("knight"), code("night"));
        assert_eq!(code("Smith"), code("Smyth"));
        assert_eq!(code("phone"), code("fone"));
        assert_ne!(code("ruby"), code("java"));
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert_eq!(code("Ruby,"), code("ruby"));
        assert_eq!(code("HEROKU"), code("heroku"));
    }

    #[test]
    fn test_unencodable_words() {
        assert_eq!(metaphone("2024"), None);
        assert_eq!(metaphone("!!"), None);
        assert_eq!(metaphone(""), None);
    }

    #[test]
    fn test_words_drop_stop_words_and_duplicates() {
        assert_eq!(
            words("The Ruby challenge for the ruby fans"),
            vec!["ruby", "challenge", "fans"]
        );
    }

    #[test]
    fn test_phonetic_codes_are_deduplicated() {
        let codes = phonetic_codes(["Ruby on Rails", "ruby", "Rails 2024"]);
        assert_eq!(codes, vec![code("ruby"), code("rails")]);
    }

    #[test]
    fn test_stop_words_yield_no_codes() {
        assert!(phonetic_codes(["the a an this that"]).is_empty());
    }
}
