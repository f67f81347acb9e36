//! In-memory nearest-neighbor index over embedded chunks.
//!
//! A [`VectorIndex`] holds an ordered list of (vector, chunk) entries with a
//! fixed dimensionality and a fixed similarity metric, and supports exact
//! top-k search, deterministic merging, and a lossless self-describing
//! binary serialization.
//!
//! # Blob format
//!
//! ```text
//! magic "RGPL" | format version u8 | metric u8 | dims u32 LE | count u64 LE
//! then per entry:
//!   dims × f32 LE | text_len u32 LE | text bytes | source_len u32 LE | source bytes
//! ```
//!
//! Deserialization validates the header, every length prefix, and that no
//! trailing bytes remain; any violation fails with [`IndexError::Corrupt`]
//! rather than yielding a partial index.

use crate::error::IndexError;
use crate::models::{Chunk, SearchHit};

const MAGIC: &[u8; 4] = b"RGPL";
const FORMAT_VERSION: u8 = 1;

/// Distance metric, fixed at index creation and never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Cosine similarity; scores are similarities, higher is better.
    Cosine,
    /// Euclidean distance; scores are distances, lower is better.
    L2,
}

impl Metric {
    fn id(self) -> u8 {
        match self {
            Metric::Cosine => 0,
            Metric::L2 => 1,
        }
    }

    fn from_id(id: u8) -> Result<Self, IndexError> {
        match id {
            0 => Ok(Metric::Cosine),
            1 => Ok(Metric::L2),
            other => Err(IndexError::Corrupt(format!("unknown metric id {}", other))),
        }
    }
}

/// One embedded chunk: a fixed-dimension vector plus the chunk it encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedVector {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// An exact nearest-neighbor index over [`EmbeddedVector`] entries.
///
/// Entry order is insertion order and is preserved by serialization and
/// merging, which makes equal-score ties stable and round-trips
/// reproducible.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    metric: Metric,
    dims: usize,
    entries: Vec<EmbeddedVector>,
}

impl VectorIndex {
    /// Build an index from scratch. All entries must share one
    /// dimensionality, which becomes the index's `dims`.
    ///
    /// # Errors
    ///
    /// [`IndexError::EmptyInput`] for zero entries;
    /// [`IndexError::DimensionMismatch`] if entries disagree on dims.
    pub fn build(metric: Metric, entries: Vec<EmbeddedVector>) -> Result<Self, IndexError> {
        let dims = match entries.first() {
            Some(e) => e.vector.len(),
            None => return Err(IndexError::EmptyInput),
        };
        for e in &entries {
            if e.vector.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    got: e.vector.len(),
                });
            }
        }
        Ok(Self {
            metric,
            dims,
            entries,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of all source documents represented in the index.
    pub fn source_documents(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.chunk.source_document.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Return up to `k` entries nearest to `query`, best-first.
    ///
    /// Fewer than `k` hits are returned when the index holds fewer entries.
    /// Ties keep insertion order (stable sort).
    ///
    /// # Errors
    ///
    /// [`IndexError::DimensionMismatch`] if `query.len() != dims`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|e| SearchHit {
                chunk: e.chunk.clone(),
                score: match self.metric {
                    Metric::Cosine => cosine_similarity(query, &e.vector),
                    Metric::L2 => l2_distance(query, &e.vector),
                },
            })
            .collect();

        match self.metric {
            Metric::Cosine => hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            Metric::L2 => hits.sort_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        hits.truncate(k);
        Ok(hits)
    }

    /// Produce a new index holding the union of both entry lists: `self`'s
    /// entries first, then `other`'s. Deterministic for fixed inputs.
    ///
    /// # Errors
    ///
    /// [`IndexError::Incompatible`] when dims or metric differ.
    pub fn merge(&self, other: &VectorIndex) -> Result<VectorIndex, IndexError> {
        if self.metric != other.metric {
            return Err(IndexError::Incompatible(format!(
                "metric {:?} vs {:?}",
                self.metric, other.metric
            )));
        }
        if self.dims != other.dims {
            return Err(IndexError::Incompatible(format!(
                "dims {} vs {}",
                self.dims, other.dims
            )));
        }

        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        entries.extend(self.entries.iter().cloned());
        entries.extend(other.entries.iter().cloned());

        Ok(VectorIndex {
            metric: self.metric,
            dims: self.dims,
            entries,
        })
    }

    /// Serialize to the self-describing blob format (lossless; f32 values
    /// round-trip bit-exact).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.entries.len() * (self.dims * 4 + 64));
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        buf.push(self.metric.id());
        buf.extend_from_slice(&(self.dims as u32).to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());

        for e in &self.entries {
            for v in &e.vector {
                buf.extend_from_slice(&v.to_le_bytes());
            }
            put_str(&mut buf, &e.chunk.text);
            put_str(&mut buf, &e.chunk.source_document);
        }

        buf
    }

    /// Deserialize a blob produced by [`VectorIndex::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`IndexError::Corrupt`] for truncated, foreign, or malformed bytes.
    /// Never silently returns a partial or empty index.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = Reader { bytes, pos: 0 };

        let magic = r.take(4)?;
        if magic != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = r.take(1)?[0];
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }
        let metric = Metric::from_id(r.take(1)?[0])?;
        let dims = r.u32()? as usize;
        let count = r.u64()? as usize;
        if dims == 0 {
            return Err(IndexError::Corrupt("zero dimensions".to_string()));
        }
        if count == 0 {
            return Err(IndexError::Corrupt("zero entries".to_string()));
        }

        let mut entries = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            let mut vector = Vec::with_capacity(dims);
            let raw = r.take(dims * 4)?;
            for c in raw.chunks_exact(4) {
                vector.push(f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
            }
            let text = r.string()?;
            let source_document = r.string()?;
            entries.push(EmbeddedVector {
                vector,
                chunk: Chunk {
                    text,
                    source_document,
                },
            });
        }

        if r.pos != bytes.len() {
            return Err(IndexError::Corrupt(format!(
                "{} trailing bytes after last entry",
                bytes.len() - r.pos
            )));
        }

        Ok(Self {
            metric,
            dims,
            entries,
        })
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over the blob bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        if self.pos + n > self.bytes.len() {
            return Err(IndexError::Corrupt(format!(
                "truncated blob: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.bytes.len() - self.pos
            )));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn string(&mut self) -> Result<String, IndexError> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| IndexError::Corrupt("string is not valid UTF-8".to_string()))
    }
}

/// Compute cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean distance between two vectors of equal length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
