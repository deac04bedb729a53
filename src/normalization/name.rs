//! Title normalization: tokenization, stopword filtering, Roman-numeral
//! canonicalization, and slug-candidate generation.
//!
//! Generalizes the teacher's ASCII-only `slugify_token`/`normalize_title`
//! helpers (`database_ops/ingest_providers.rs`) into a Unicode-aware form
//! (NFKD fold, Hangul preserved) as required by the matching/slug
//! components.

use unicode_normalization::UnicodeNormalization;

const STOPWORDS: &[&str] = &[
    "the",
    "a",
    "an",
    "and",
    "or",
    "of",
    "for",
    "edition",
    "definitive",
    "remastered",
    "hd",
];

const EXCLUDED_PRODUCT_WORDS: &[&str] = &[
    "soundtrack",
    "wallpaper",
    "screensaver",
    "sdk",
    "server",
    "benchmark",
    "test",
    "sample",
    "trailer",
    "video",
    "playtest",
];

const MAX_SLUG_LEN: usize = 120;

/// Lowercase, diacritic-stripped, punctuation-split tokens with stopwords
/// removed.
pub fn tokenize(name: &str) -> Vec<String> {
    let folded: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    folded
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .filter(|s| !STOPWORDS.contains(&s.as_str()))
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

/// Whole-word, case-insensitive match against the excluded-product
/// vocabulary (soundtracks, wallpapers, SDKs, ...).
pub fn is_excluded_product(name: &str) -> bool {
    let tokens: Vec<String> = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    tokens.iter().any(|t| EXCLUDED_PRODUCT_WORDS.contains(&t.as_str()))
}

const ROMAN_PAIRS: &[(u32, &str)] = &[
    (1000, "m"),
    (900, "cm"),
    (500, "d"),
    (400, "cd"),
    (100, "c"),
    (90, "xc"),
    (50, "l"),
    (40, "xl"),
    (10, "x"),
    (9, "ix"),
    (5, "v"),
    (4, "iv"),
    (1, "i"),
];

/// Parse a lowercase Roman numeral token into its arabic value, rejecting
/// non-canonical forms (e.g. "iiii") by round-tripping: a numeral is only
/// accepted if re-encoding the parsed value reproduces the input exactly.
pub fn parse_roman(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 15 {
        return None;
    }
    let mut remaining = token;
    let mut value = 0u32;
    for (n, sym) in ROMAN_PAIRS {
        while remaining.starts_with(sym) {
            value += n;
            remaining = &remaining[sym.len()..];
        }
    }
    if !remaining.is_empty() {
        return None;
    }
    if to_roman(value).as_deref() != Some(token) {
        return None;
    }
    Some(value)
}

pub fn to_roman(mut value: u32) -> Option<String> {
    if value == 0 || value > 3999 {
        return None;
    }
    let mut out = String::new();
    for (n, sym) in ROMAN_PAIRS {
        while value >= *n {
            out.push_str(sym);
            value -= n;
        }
    }
    Some(out)
}

/// Canonicalize a token to its arabic-numeral string if it is a Roman
/// numeral, otherwise return it unchanged.
pub fn canonicalize_roman_token(token: &str) -> String {
    match parse_roman(token) {
        Some(value) => value.to_string(),
        None => token.to_string(),
    }
}

/// Does this title carry an explicit sequel-number token (a bare digit, or
/// a canonical Roman numeral I-V)? Used by the matching engine's sequel
/// disambiguation: "Subnautica 2" and "Subnautica" share a slug prefix but
/// are different entries, while "Stellar Blade" repeated under a
/// collision-suffixed slug is the same entry.
pub fn has_sequel_number_token(name: &str) -> bool {
    tokenize(name).iter().any(|t| {
        if let Ok(n) = t.parse::<u32>() {
            return n >= 1 && n <= 20;
        }
        matches!(parse_roman(t), Some(1..=5))
    })
}

/// NFKD-fold, lowercase, keep `[a-z0-9\s-]` plus Hangul, collapse
/// whitespace/hyphen runs, trim, cap at `MAX_SLUG_LEN`.
pub fn slug_candidate(name: &str) -> String {
    let folded: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = folded.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for c in lowered.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c as u32, 0xAC00..=0xD7A3);
        if keep {
            out.push(c);
            last_was_sep = false;
        } else if c.is_whitespace() || c == '-' {
            if !last_was_sep && !out.is_empty() {
                out.push('-');
                last_was_sep = true;
            }
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.chars().count() > MAX_SLUG_LEN {
        trimmed.chars().take(MAX_SLUG_LEN).collect::<String>()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_and_drops_stopwords() {
        let tokens = tokenize("The Elder Scrolls: Definitive Edition");
        assert_eq!(tokens, vec!["elder", "scrolls"]);
    }

    #[test]
    fn roman_numeral_round_trip_rejects_non_canonical() {
        assert_eq!(parse_roman("iv"), Some(4));
        assert_eq!(parse_roman("iiii"), None);
        assert_eq!(parse_roman("xiv"), Some(14));
    }

    #[test]
    fn excluded_product_detection_is_whole_word() {
        assert!(is_excluded_product("Halo Infinite Soundtrack"));
        assert!(!is_excluded_product("Tested Heroes"));
    }

    #[test]
    fn sequel_token_detection() {
        assert!(has_sequel_number_token("Subnautica 2"));
        assert!(has_sequel_number_token("Final Fantasy IV"));
        assert!(!has_sequel_number_token("Stellar Blade"));
    }

    #[test]
    fn slug_candidate_strips_diacritics_and_collapses_separators() {
        assert_eq!(slug_candidate("Pokémon: Let's Go!"), "pokemon-let-s-go");
        assert_eq!(slug_candidate("   Double   Space  "), "double-space");
    }
}
