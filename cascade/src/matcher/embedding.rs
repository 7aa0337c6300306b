//! Hashed embeddings for Tier Two.
//!
//! Each feature (a word stem or a character trigram) hashes with FNV-1a to
//! one dimension, with a sign taken from the hash's high bit, and the result
//! is L2-normalized. Deterministic and model-free; it captures paraphrase
//! through shared stems and misspellings through shared trigrams.

use crate::matcher::normalize::light_stem;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Default vector width.
pub const DEFAULT_DIMENSION: usize = 256;

pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn project<'a>(features: impl Iterator<Item = &'a [u8]>, dimension: usize) -> Vec<f32> {
    let mut embedding = vec![0.0_f32; dimension];
    if dimension == 0 {
        return embedding;
    }
    for feature in features {
        let hash = fnv1a_hash(feature);
        let index = (hash % dimension as u64) as usize;
        let sign = if (hash >> 63) == 1 { 1.0 } else { -1.0 };
        embedding[index] += sign;
    }
    l2_normalize(&mut embedding);
    embedding
}

/// Bag-of-stems embedding.
pub fn embed_words(tokens: &[String], dimension: usize) -> Vec<f32> {
    project(tokens.iter().map(|t| light_stem(t).as_bytes()), dimension)
}

/// Character-trigram embedding over `#token#`-padded words.
pub fn embed_trigrams(tokens: &[String], dimension: usize) -> Vec<f32> {
    let padded: Vec<Vec<u8>> = tokens
        .iter()
        .map(|t| {
            let mut p = Vec::with_capacity(t.len() + 2);
            p.push(b'#');
            p.extend_from_slice(t.as_bytes());
            p.push(b'#');
            p
        })
        .collect();
    project(
        padded.iter().flat_map(|p| p.windows(3)),
        dimension,
    )
}

/// Cosine similarity of two normalized vectors, clamped to [0, 1].
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    f64::from(dot).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_fnv_known_vector() {
        // FNV-1a 64 of the empty input is the offset basis.
        assert_eq!(fnv1a_hash(b""), FNV_OFFSET);
        assert_eq!(fnv1a_hash(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_identical_text_has_unit_similarity() {
        let a = embed_words(&toks("talk to a person"), DEFAULT_DIMENSION);
        let b = embed_words(&toks("talk to a person"), DEFAULT_DIMENSION);
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_trigrams_tolerate_misspelling() {
        let right = embed_trigrams(&toks("billing"), DEFAULT_DIMENSION);
        let typo = embed_trigrams(&toks("biling"), DEFAULT_DIMENSION);
        let other = embed_trigrams(&toks("weather"), DEFAULT_DIMENSION);
        assert!(cosine(&right, &typo) > cosine(&right, &other));
    }

    #[test]
    fn test_empty_and_zero_dimension() {
        assert_eq!(cosine(&embed_words(&[], 16), &embed_words(&toks("x"), 16)), 0.0);
        assert!(embed_words(&toks("x"), 0).is_empty());
        assert_eq!(cosine(&[], &[]), 0.0);
    }
}
