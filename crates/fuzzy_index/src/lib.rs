//! Inverted-file k-NN search over character-trigram TF-IDF sparse vectors.
//!
//! A [`FuzzyIndex`] bundles a fitted [`tfidf::Vectorizer`] with a posting-list
//! index over the fitted column vectors ("simple inverted index" in the
//! original implementation this crate is modeled on): each vocabulary term
//! keeps the list of document columns with a non-zero weight for that term,
//! so a query only needs to score the union of those columns rather than the
//! whole corpus. Because both query and column vectors are L2-normalized,
//! negative dot-product distance and plain dot-product confidence are the
//! same computation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tfidf::{SparseVector, Vectorizer};

/// Number of nearest columns a search considers before threshold filtering.
pub const NUM_FUZZY_SEARCH_RESULTS: usize = 500;

/// Bump whenever [`FuzzyIndex`]'s serialized layout changes.
pub const INDEX_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("fuzzy index has not been built")]
    NotBuilt,
    #[error("build requires non-empty, equal-length external_ids and texts")]
    InvalidBuildInput,
    #[error("index blob has schema version {found}, expected {expected}")]
    SchemaVersion { found: u8, expected: u8 },
    #[error("index blob is empty")]
    EmptyBlob,
    #[error("failed to encode index blob: {0}")]
    Encode(String),
    #[error("failed to decode index blob: {0}")]
    Decode(String),
    #[error("I/O error while (de)serializing index blob: {0}")]
    Io(#[from] std::io::Error),
}

/// One hit from [`FuzzyIndex::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    /// The id supplied to [`FuzzyIndex::build`] for this column.
    pub external_id: u32,
    /// The column's position inside the index, stable for the index's lifetime.
    pub result_index: u32,
    /// Dot product of the L2-normalized query and column vectors, in `[0, 1]`.
    pub confidence: f32,
    /// Caller-supplied tag describing which index/path produced this result
    /// (e.g. `'s'` single-artist, `'m'` multi-artist, `'l'`/`'r'` release path).
    pub source_tag: char,
}

/// Character-trigram TF-IDF fuzzy index with inverted-file candidate search.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FuzzyIndex {
    vectorizer: Option<Vectorizer>,
    external_ids: Vec<u32>,
    texts: Vec<String>,
    vectors: Vec<SparseVector>,
    /// vocabulary term -> sorted list of column positions with a non-zero weight.
    postings: BTreeMap<u32, Vec<u32>>,
}

impl FuzzyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the vectorizer on `texts` and build the posting-list index.
    ///
    /// `external_ids` and `texts` must be equal length and non-empty;
    /// duplicates of the same encoded key must already be collapsed by the
    /// caller (spec.md's upstream-dedup contract).
    pub fn build(&mut self, external_ids: Vec<u32>, texts: Vec<String>) -> Result<(), IndexError> {
        if external_ids.is_empty() || texts.is_empty() || external_ids.len() != texts.len() {
            return Err(IndexError::InvalidBuildInput);
        }

        let (vectorizer, vectors) = Vectorizer::fit_transform(&texts);
        let postings = build_postings(&vectors);

        self.vectorizer = Some(vectorizer);
        self.external_ids = external_ids;
        self.texts = texts;
        self.vectors = vectors;
        self.postings = postings;
        Ok(())
    }

    /// Number of columns currently indexed.
    pub fn len(&self) -> usize {
        self.external_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external_ids.is_empty()
    }

    /// Whether `build` has been called on this index yet.
    pub fn is_built(&self) -> bool {
        self.vectorizer.is_some()
    }

    /// Text stored for a given column position, if any.
    pub fn get_index_text(&self, result_index: u32) -> Option<&str> {
        self.texts.get(result_index as usize).map(String::as_str)
    }

    /// Top [`NUM_FUZZY_SEARCH_RESULTS`] nearest columns whose confidence
    /// strictly exceeds `min_confidence`, tagged with `source_tag`.
    ///
    /// Returns [`IndexError::NotBuilt`] if `build` has not been called yet.
    pub fn search(
        &self,
        query: &str,
        min_confidence: f32,
        source_tag: char,
    ) -> Result<Vec<IndexResult>, IndexError> {
        let vectorizer = self.vectorizer.as_ref().ok_or(IndexError::NotBuilt)?;
        let query_vec = vectorizer.transform_one(query);
        if query_vec.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<u32> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for term in &query_vec.indices {
            if let Some(docs) = self.postings.get(term) {
                for &doc in docs {
                    if seen.insert(doc) {
                        candidates.push(doc);
                    }
                }
            }
        }

        let mut scored: Vec<(u32, f64)> = candidates
            .into_iter()
            .map(|doc| (doc, query_vec.dot(&self.vectors[doc as usize])))
            .filter(|&(_, confidence)| confidence > min_confidence as f64)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(NUM_FUZZY_SEARCH_RESULTS);

        Ok(scored
            .into_iter()
            .map(|(doc, confidence)| IndexResult {
                external_id: self.external_ids[doc as usize],
                result_index: doc,
                confidence: confidence as f32,
                source_tag,
            })
            .collect())
    }

    /// Binary round-trip: vectorizer, postings, external ids and texts.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<(), IndexError> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| IndexError::Encode(e.to_string()))?;
        writer.write_all(&[INDEX_SCHEMA_VERSION])?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Self, IndexError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let (&version, body) = buf.split_first().ok_or(IndexError::EmptyBlob)?;
        if version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::SchemaVersion {
                found: version,
                expected: INDEX_SCHEMA_VERSION,
            });
        }
        let (index, _) = bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| IndexError::Decode(e.to_string()))?;
        Ok(index)
    }
}

fn build_postings(vectors: &[SparseVector]) -> BTreeMap<u32, Vec<u32>> {
    let mut postings: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (doc, vector) in vectors.iter().enumerate() {
        for &term in &vector.indices {
            postings.entry(term).or_default().push(doc as u32);
        }
    }
    postings
}
