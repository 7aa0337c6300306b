//! BM25 lexical ranking over trigger documents.
//!
//! Each trigger phrase is one document. IDF is computed across every trigger
//! of the tenant, so terms shared by many scenarios ("can", "you") contribute
//! little and rare informative terms dominate. Scores are normalized by the
//! document's self-score to land in [0, 1].

use std::collections::{HashMap, HashSet};

/// BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.2;
/// BM25 length normalization strength.
pub const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, Default)]
struct Document {
    term_freqs: HashMap<String, u32>,
    len: usize,
    self_score: f64,
}

/// Immutable BM25 index.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    docs: Vec<Document>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn build(documents: &[Vec<String>]) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut docs = Vec::with_capacity(documents.len());
        for tokens in documents {
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for t in tokens {
                *term_freqs.entry(t.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(Document {
                term_freqs,
                len: tokens.len(),
                self_score: 0.0,
            });
        }
        let total: usize = docs.iter().map(|d| d.len).sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total as f64 / docs.len() as f64
        };

        let mut index = Self {
            docs,
            doc_freq,
            avg_len,
        };
        for i in 0..index.docs.len() {
            let terms: Vec<String> = index.docs[i].term_freqs.keys().cloned().collect();
            index.docs[i].self_score = index.raw_score(i, &terms);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Smoothed IDF (always positive).
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn raw_score(&self, doc: usize, query: &[String]) -> f64 {
        let Some(d) = self.docs.get(doc) else {
            return 0.0;
        };
        if self.avg_len <= 0.0 {
            return 0.0;
        }
        let norm = 1.0 - BM25_B + BM25_B * (d.len as f64 / self.avg_len);
        let mut seen = HashSet::new();
        let mut score = 0.0;
        for term in query {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let Some(&tf) = d.term_freqs.get(term) else {
                continue;
            };
            let tf = tf as f64;
            score += self.idf(term) * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * norm);
        }
        score
    }

    /// BM25 score of `query` against document `doc`, divided by the
    /// document's self-score and clamped to [0, 1].
    pub fn normalized_score(&self, doc: usize, query: &[String]) -> f64 {
        let Some(d) = self.docs.get(doc) else {
            return 0.0;
        };
        if d.self_score <= 0.0 {
            return 0.0;
        }
        (self.raw_score(doc, query) / d.self_score).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_full_cover_scores_one() {
        let idx = Bm25Index::build(&[toks("hold"), toks("talk to agent")]);
        assert!((idx.normalized_score(0, &toks("hold please")) - 1.0).abs() < 1e-9);
        assert_eq!(idx.normalized_score(1, &toks("hold please")), 0.0);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let idx = Bm25Index::build(&[
            toks("cancel my order"),
            toks("track my order"),
            toks("where is my order"),
        ]);
        assert!(idx.idf("cancel") > idx.idf("order"));
        let rare = idx.normalized_score(0, &toks("cancel"));
        let common = idx.normalized_score(0, &toks("order"));
        assert!(rare > common);
    }

    #[test]
    fn test_repeated_query_terms_count_once() {
        let idx = Bm25Index::build(&[toks("hold on")]);
        assert_eq!(
            idx.normalized_score(0, &toks("hold")),
            idx.normalized_score(0, &toks("hold hold hold"))
        );
    }

    #[test]
    fn test_empty_and_out_of_range() {
        let idx = Bm25Index::build(&[]);
        assert!(idx.is_empty());
        assert_eq!(idx.normalized_score(3, &toks("x")), 0.0);
    }
}
