//! Offline feature-hashing embedder.
//!
//! Maps lowercase alphanumeric tokens into a fixed number of buckets with
//! FNV-1a and L2-normalizes the result. Deterministic, dependency-free, and
//! good enough for development and tests where texts sharing words should
//! score closer than texts that don't.

use async_trait::async_trait;

use super::{Embedder, EmbeddingError};

/// Output size used when the config leaves the dimension unset.
pub const DEFAULT_DIM: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct LocalEmbedder {
    model: String,
    /// Dimension reported to the coordinator (`0` = learn it).
    preset: usize,
    buckets: usize,
}

impl LocalEmbedder {
    pub fn new(model: &str, dim: usize) -> Self {
        Self {
            model: model.to_string(),
            preset: dim,
            buckets: if dim == 0 { DEFAULT_DIM } else { dim },
        }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.buckets];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.buckets as u64) as usize;
            // High bit picks the sign so collisions partially cancel.
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&v)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.hash_embed(text))
    }

    fn dimension(&self) -> usize {
        self.preset
    }

    fn provider(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
