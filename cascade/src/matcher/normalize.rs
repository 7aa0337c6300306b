//! Utterance normalization: tokenization, filler removal, synonym expansion.
//!
//! The three views of an utterance are kept separate because negative
//! triggers must be checked before fillers and synonyms erase distinctions.

use std::collections::HashMap;

use crate::catalog::types::CatalogSnapshot;
use crate::matcher::config::MatcherConfig;

/// Lowercase, drop apostrophes, turn other punctuation into whitespace, split.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Whether `needle` occurs as a contiguous run in `haystack`.
pub fn contains_phrase(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Cheap suffix stripping, enough to pair "holding"/"hold" and "calls"/"call".
pub fn light_stem(token: &str) -> &str {
    let len = token.len();
    if len > 5 && token.ends_with("ing") {
        &token[..len - 3]
    } else if len > 4 && (token.ends_with("ed") || token.ends_with("es")) {
        &token[..len - 2]
    } else if len > 3 && token.ends_with('s') && !token.ends_with("ss") {
        &token[..len - 1]
    } else {
        token
    }
}

/// The views of one utterance used by the matchers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedUtterance {
    /// Lowercased, punctuation stripped; fillers and synonyms untouched
    pub tokens: Vec<String>,
    /// `tokens` with fillers removed
    pub content: Vec<String>,
    /// `content` with synonyms mapped to canonical terms
    pub expanded: Vec<String>,
}

impl NormalizedUtterance {
    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    /// Space-joined `tokens`, the text regex patterns run against.
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Filler and synonym tables merged from tenant config and learned catalog
/// entries.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Filler phrases, longest first
    fillers: Vec<Vec<String>>,
    synonyms: HashMap<Vec<String>, Vec<String>>,
    max_variant_len: usize,
}

impl Normalizer {
    pub fn new(config: &MatcherConfig, snapshot: &CatalogSnapshot) -> Self {
        let mut fillers: Vec<Vec<String>> = config
            .filler_words
            .iter()
            .chain(snapshot.learned_fillers.iter())
            .map(|f| tokenize(f))
            .filter(|f| !f.is_empty())
            .collect();
        fillers.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        fillers.dedup();

        let mut synonyms = HashMap::new();
        let mut max_variant_len = 0;
        // Tenant config wins over learned entries for the same variant.
        for (variant, canonical) in snapshot
            .learned_synonyms
            .iter()
            .chain(config.synonyms.iter())
        {
            let v = tokenize(variant);
            let c = tokenize(canonical);
            if v.is_empty() || c.is_empty() || v == c {
                continue;
            }
            max_variant_len = max_variant_len.max(v.len());
            synonyms.insert(v, c);
        }

        Self {
            fillers,
            synonyms,
            max_variant_len,
        }
    }

    /// Remove filler phrases (longest match first at each position).
    pub fn strip_fillers(&self, tokens: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'outer: while i < tokens.len() {
            for filler in &self.fillers {
                let end = i + filler.len();
                if end <= tokens.len() && tokens[i..end] == filler[..] {
                    i = end;
                    continue 'outer;
                }
            }
            out.push(tokens[i].clone());
            i += 1;
        }
        out
    }

    /// Greedy longest-phrase synonym expansion.
    pub fn expand_synonyms(&self, tokens: &[String]) -> Vec<String> {
        if self.synonyms.is_empty() {
            return tokens.to_vec();
        }
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let longest = self.max_variant_len.min(tokens.len() - i);
            let mut matched = false;
            for len in (1..=longest).rev() {
                if let Some(canonical) = self.synonyms.get(&tokens[i..i + len]) {
                    out.extend(canonical.iter().cloned());
                    i += len;
                    matched = true;
                    break;
                }
            }
            if !matched {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
        out
    }

    pub fn normalize(&self, utterance: &str) -> NormalizedUtterance {
        let tokens = tokenize(utterance);
        let content = self.strip_fillers(&tokens);
        let expanded = self.expand_synonyms(&content);
        NormalizedUtterance {
            tokens,
            content,
            expanded,
        }
    }

    /// Normalize a trigger phrase into the canonical vocabulary.
    ///
    /// A trigger made only of filler words keeps its raw tokens.
    pub fn normalize_trigger(&self, phrase: &str) -> Vec<String> {
        let tokens = tokenize(phrase);
        let content = self.strip_fillers(&tokens);
        let content = if content.is_empty() { tokens } else { content };
        self.expand_synonyms(&content)
    }
}
