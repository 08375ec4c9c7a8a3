//! Character-trigram TF-IDF vectorizer.
//!
//! Documents are encoded keys produced by `encode`, so "tokens" here are
//! overlapping 3-byte windows over the key, not words. A vocabulary is built
//! from the trigrams seen during [`Vectorizer::fit`], each term gets a
//! smoothed inverse document frequency, and [`Vectorizer::transform`] turns
//! new documents into L2-normalized sparse vectors over that vocabulary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A sparse, L2-normalized document vector. `indices` is sorted ascending and
/// parallel to `values`; both have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Dot product against another sparse vector, merging both index lists.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A fitted vocabulary plus inverse-document-frequency weights.
///
/// `vocabulary` maps each trigram to its column index; `idf` is aligned to
/// those indices (`idf[vocabulary[term]]` is the term's weight).
///
/// Trigrams are keyed by raw bytes, not `String`: a 3-byte window can split a
/// multi-byte UTF-8 character (most encoded keys are ASCII after
/// romanization, but `encode_stupid` skips that step), and collapsing an
/// invalid split to U+FFFD via lossy UTF-8 conversion would make distinct
/// byte sequences compare equal as vocabulary terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vectorizer {
    vocabulary: BTreeMap<Vec<u8>, u32>,
    idf: Vec<f64>,
}

impl Vectorizer {
    /// Split `doc` into overlapping 3-byte trigrams. Documents shorter than 3
    /// bytes are right-padded with spaces to exactly 3 bytes and yield one
    /// token, matching the reference vectorizer's short-document handling.
    fn tokenize(doc: &str) -> Vec<Vec<u8>> {
        let bytes = doc.as_bytes();
        if bytes.len() < 3 {
            let mut padded = bytes.to_vec();
            while padded.len() < 3 {
                padded.push(b' ');
            }
            return vec![padded];
        }
        (0..=bytes.len() - 3).map(|i| bytes[i..i + 3].to_vec()).collect()
    }

    /// Build the vocabulary and IDF weights from `docs`.
    ///
    /// `idf[t] = log((N + 1) / (df[t] + 1)) + 1`, where `N` is the number of
    /// documents and `df[t]` the number of documents containing trigram `t`.
    pub fn fit(docs: &[String]) -> Vectorizer {
        let tokenized: Vec<Vec<Vec<u8>>> = docs.iter().map(|d| Self::tokenize(d)).collect();

        let mut doc_freq: BTreeMap<&[u8], u32> = BTreeMap::new();
        for tokens in &tokenized {
            let mut seen = std::collections::BTreeSet::new();
            for t in tokens {
                if seen.insert(t.as_slice()) {
                    *doc_freq.entry(t.as_slice()).or_insert(0) += 1;
                }
            }
        }

        let vocabulary: BTreeMap<Vec<u8>, u32> = doc_freq
            .keys()
            .enumerate()
            .map(|(i, &t)| (t.to_vec(), i as u32))
            .collect();

        let n = docs.len() as f64;
        let mut idf = vec![0.0; vocabulary.len()];
        for (term, &col) in &vocabulary {
            let df = *doc_freq.get(term.as_slice()).unwrap_or(&0) as f64;
            idf[col as usize] = ((n + 1.0) / (df + 1.0)).ln() + 1.0;
        }

        Vectorizer { vocabulary, idf }
    }

    /// Transform `docs` into L2-normalized sparse vectors over the fitted
    /// vocabulary. Trigrams absent from the vocabulary contribute no
    /// dimension; they are not an error.
    pub fn transform(&self, docs: &[String]) -> Vec<SparseVector> {
        docs.iter().map(|d| self.transform_one(d)).collect()
    }

    /// Transform a single document. Exposed separately so query-time callers
    /// don't need to allocate a one-element slice.
    pub fn transform_one(&self, doc: &str) -> SparseVector {
        let tokens = Self::tokenize(doc);
        let token_count = tokens.len() as f64;

        let mut term_counts: BTreeMap<u32, f64> = BTreeMap::new();
        for t in &tokens {
            if let Some(&col) = self.vocabulary.get(t.as_slice()) {
                *term_counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        let mut indices = Vec::with_capacity(term_counts.len());
        let mut values = Vec::with_capacity(term_counts.len());
        for (col, count) in term_counts {
            let tf = count / token_count;
            let weight = tf * self.idf[col as usize];
            indices.push(col);
            values.push(weight);
        }

        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm != 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }

        SparseVector { indices, values }
    }

    /// Fit on `docs` then transform them in one step.
    pub fn fit_transform(docs: &[String]) -> (Vectorizer, Vec<SparseVector>) {
        let vectorizer = Self::fit(docs);
        let vectors = vectorizer.transform(docs);
        (vectorizer, vectors)
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(words: &[&str]) -> Vec<String> {
        words.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn short_documents_are_padded_to_one_trigram() {
        assert_eq!(Vectorizer::tokenize("a"), vec![b"a  ".to_vec()]);
        assert_eq!(Vectorizer::tokenize("ab"), vec![b"ab ".to_vec()]);
        assert_eq!(Vectorizer::tokenize("abc"), vec![b"abc".to_vec()]);
    }

    #[test]
    fn tokenize_produces_overlapping_windows() {
        assert_eq!(
            Vectorizer::tokenize("abcd"),
            vec![b"abc".to_vec(), b"bcd".to_vec()]
        );
    }

    #[test]
    fn multibyte_split_trigrams_stay_distinct_bytes() {
        // "é" is the 2-byte sequence [0xC3, 0xA9]; a 3-byte window landing on
        // only the second byte must not collapse to the same token as one
        // landing on an unrelated invalid byte sequence.
        let doc = "aébc"; // bytes: 'a' 0xC3 0xA9 'b' 'c'
        let tokens = Vectorizer::tokenize(doc);
        assert_eq!(tokens.len(), 3);
        assert_ne!(tokens[0], tokens[1]);
        assert_ne!(tokens[1], tokens[2]);
        // None of these windows are valid UTF-8 on their own, but they must
        // still be distinguishable raw-byte tokens rather than all decoding
        // to U+FFFD.
        assert!(std::str::from_utf8(&tokens[2]).is_err());
    }

    #[test]
    fn vectors_are_l2_normalized() {
        let corpus = docs(&["portishead", "portugal", "pantera"]);
        let (vectorizer, vectors) = Vectorizer::fit_transform(&corpus);
        for v in &vectors {
            let norm = v.values.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9 || v.is_empty());
        }
        assert!(vectorizer.vocabulary_len() > 0);
    }

    #[test]
    fn unknown_trigram_contributes_no_dimension() {
        let corpus = docs(&["portishead"]);
        let vectorizer = Vectorizer::fit(&corpus);
        let v = vectorizer.transform_one("zzzzz");
        assert!(v.is_empty());
    }

    #[test]
    fn identical_documents_have_identical_vectors() {
        let corpus = docs(&["radiohead", "portishead"]);
        let vectorizer = Vectorizer::fit(&corpus);
        let a = vectorizer.transform_one("radiohead");
        let b = vectorizer.transform_one("radiohead");
        assert_eq!(a, b);
    }

    #[test]
    fn dot_product_of_identical_unit_vectors_is_one() {
        let corpus = docs(&["radiohead"]);
        let vectorizer = Vectorizer::fit(&corpus);
        let v = vectorizer.transform_one("radiohead");
        assert!((v.dot(&v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn vectorizer_round_trips_through_serde_json() {
        let corpus = docs(&["portishead", "pantera"]);
        let vectorizer = Vectorizer::fit(&corpus);
        let json = serde_json::to_string(&vectorizer).unwrap();
        let restored: Vectorizer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.vocabulary_len(), vectorizer.vocabulary_len());
    }
}
