//! Candidate password generation
//!
//! A [`SequenceSampler`] produces a random base string; every caller keyword
//! is then blended into it with light human-style styling (capitalization,
//! leetspeak, truncation) at a random position. Candidates are scored by the
//! service, not here.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::GeneratorConfig;

/// Symbols appended when a candidate has none of them.
pub const REQUIRED_SYMBOLS: &str = "!@#$%&*?";

const CAPITALIZE_P: f64 = 0.20;
const LEETSPEAK_P: f64 = 0.30;
const TRUNCATE_P: f64 = 0.25;

/// Black-box source of base character sequences.
pub trait SequenceSampler: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore, length: usize) -> String;
}

/// Uniform sampling over a fixed character set.
#[derive(Debug, Clone)]
pub struct CharsetSampler {
    charset: Vec<char>,
}

impl CharsetSampler {
    pub fn new(charset: impl IntoIterator<Item = char>) -> Self {
        let mut seen = HashSet::new();
        let charset = charset.into_iter().filter(|c| seen.insert(*c)).collect();
        Self { charset }
    }
}

impl Default for CharsetSampler {
    /// ASCII letters, digits and punctuation.
    fn default() -> Self {
        Self::new(
            ('a'..='z')
                .chain('A'..='Z')
                .chain('0'..='9')
                .chain((0x21u8..=0x7e).map(char::from).filter(|c| c.is_ascii_punctuation())),
        )
    }
}

impl SequenceSampler for CharsetSampler {
    fn sample(&self, rng: &mut dyn RngCore, length: usize) -> String {
        (0..length)
            .filter_map(|_| self.charset.choose(&mut *rng).copied())
            .collect()
    }
}

fn capitalize(word: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(word.len());
    for (i, c) in word.iter().enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn leetspeak(c: char) -> char {
    match c {
        'a' => '@',
        'e' => '3',
        'i' => '1',
        'o' => '0',
        other => other,
    }
}

/// Style one keyword: maybe capitalize, maybe leetspeak, maybe truncate.
fn style_keyword(keyword: &str, rng: &mut dyn RngCore) -> Vec<char> {
    let mut styled: Vec<char> = keyword.chars().collect();

    if rng.random_bool(CAPITALIZE_P) {
        styled = capitalize(&styled);
    }
    if rng.random_bool(LEETSPEAK_P) {
        styled = styled.into_iter().map(leetspeak).collect();
    }
    if styled.len() > 3 && rng.random_bool(TRUNCATE_P) {
        let keep = rng.random_range(3..=styled.len().min(5));
        styled.truncate(keep);
    }
    styled
}

/// Insert every keyword into `base`, then make sure a required symbol is present.
///
/// Without any non-empty keyword the base comes back unchanged.
pub fn blend_keywords(base: &str, keywords: &[String], rng: &mut dyn RngCore) -> String {
    if keywords.iter().all(|k| k.is_empty()) {
        return base.to_string();
    }
    let mut pwd: Vec<char> = base.chars().collect();

    for keyword in keywords.iter().filter(|k| !k.is_empty()) {
        let styled = style_keyword(keyword, rng);
        match rng.random_range(0..3) {
            0 => {
                pwd.splice(0..0, styled);
            }
            1 => pwd.extend(styled),
            _ if pwd.len() >= 2 => {
                let pos = rng.random_range(1..pwd.len());
                pwd.splice(pos..pos, styled);
            }
            _ => pwd.extend(styled),
        }
    }

    if !pwd.iter().any(|c| REQUIRED_SYMBOLS.contains(*c)) {
        let symbols: Vec<char> = REQUIRED_SYMBOLS.chars().collect();
        if let Some(s) = symbols.choose(&mut *rng) {
            pwd.push(*s);
        }
    }

    pwd.into_iter().collect()
}

pub struct PasswordGenerator {
    sampler: Box<dyn SequenceSampler>,
    candidates: usize,
    length: usize,
}

impl PasswordGenerator {
    pub fn new(sampler: Box<dyn SequenceSampler>, config: &GeneratorConfig) -> Self {
        Self {
            sampler,
            candidates: config.candidates,
            length: config.length,
        }
    }

    pub fn candidates(&self) -> usize {
        self.candidates
    }

    /// Produce blended candidates. A seed makes the output reproducible.
    pub fn generate(&self, keywords: &[String], seed: Option<u64>) -> Vec<String> {
        let seed = seed.unwrap_or_else(rand::random::<u64>);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        (0..self.candidates)
            .map(|_| {
                let base = self.sampler.sample(&mut rng, self.length);
                blend_keywords(&base, keywords, &mut rng)
            })
            .collect()
    }
}

impl Default for PasswordGenerator {
    fn default() -> Self {
        Self::new(Box::new(CharsetSampler::default()), &GeneratorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_charset() {
        let sampler = CharsetSampler::default();
        assert_eq!(sampler.charset.len(), 26 + 26 + 10 + 32);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let s = sampler.sample(&mut rng, 12);
        assert_eq!(s.chars().count(), 12);
        assert!(s.chars().all(|c| c.is_ascii_graphic()));
    }

    #[test]
    fn test_charset_drops_repeats_anywhere() {
        let sampler = CharsetSampler::new("abcabca".chars());
        assert_eq!(sampler.charset, vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let generator = PasswordGenerator::default();
        let a = generator.generate(&kw(&["tiger", "lily"]), Some(7));
        let b = generator.generate(&kw(&["tiger", "lily"]), Some(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 15);
    }

    #[test]
    fn test_every_candidate_has_a_required_symbol() {
        let generator = PasswordGenerator::default();
        for pwd in generator.generate(&kw(&["moon"]), Some(3)) {
            assert!(pwd.chars().any(|c| REQUIRED_SYMBOLS.contains(c)), "{pwd}");
        }
    }

    fn unleet(s: &str) -> String {
        s.to_lowercase()
            .replace('@', "a")
            .replace('3', "e")
            .replace('1', "i")
            .replace('0', "o")
    }

    #[test]
    fn test_keyword_survives_styling() {
        // Truncation keeps at least three characters, so the prefix survives
        // once case and leetspeak are undone.
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let out = blend_keywords("XYZ", &kw(&["tiger"]), &mut rng);
            assert!(unleet(&out).contains("tig"), "{out}");
        }
    }

    #[test]
    fn test_every_keyword_lengthens_the_base() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..20 {
            let out = blend_keywords("XYZ!", &kw(&["sun", "sky"]), &mut rng);
            assert_eq!(out.chars().count(), 4 + 3 + 3);
        }
    }

    #[test]
    fn test_short_base_appends_instead_of_mid_insert() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..20 {
            let out = blend_keywords("", &kw(&["ab"]), &mut rng);
            // "ab" may turn into "@b", which already carries a symbol
            assert!(out.chars().any(|c| REQUIRED_SYMBOLS.contains(c)), "{out}");
            assert!(unleet(&out).contains("ab"), "{out}");
        }
    }

    #[test]
    fn test_no_keywords_returns_base_unchanged() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(blend_keywords("abcdef", &[], &mut rng), "abcdef");
        assert_eq!(blend_keywords("abc!", &[], &mut rng), "abc!");
        assert_eq!(blend_keywords("abcdef", &kw(&["", ""]), &mut rng), "abcdef");
    }

    #[test]
    fn test_generate_without_keywords_yields_raw_samples() {
        let generator = PasswordGenerator::default();
        let candidates = generator.generate(&[], Some(9));
        assert_eq!(candidates.len(), 15);
        assert!(candidates.iter().all(|c| c.chars().count() == 12));
    }
}
