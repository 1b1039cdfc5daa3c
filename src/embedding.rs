//! Embedding providers and cosine-similarity index

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Interface for converting text into embedding vectors.
///
/// Exactly one entry point: implementations for remote APIs or local models
/// adapt to `embed` rather than exposing backend-specific method names.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimensionality of the output vectors
    fn dimension(&self) -> usize;

    /// The model name used for embeddings
    fn model_name(&self) -> &str;
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]. Zero-magnitude vectors compare as 0.0.
/// Vectors of different lengths are rejected, never padded or truncated.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::dimension_mismatch(a.len(), b.len()));
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a * norm_b))
}

/// Embedding index pairing a provider with a fixed dimensionality.
///
/// Every vector produced through one index shares the provider's dimension;
/// a provider returning a different length is treated as misbehaving.
#[derive(Clone)]
pub struct EmbeddingIndex {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Create an index around a provider
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimension = provider.dimension();
        Self {
            provider,
            dimension,
        }
    }

    /// Get the fixed dimensionality
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the provider's model name
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Generate an embedding, validating the provider's output length
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed(text).await?;
        if vector.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, vector.len()));
        }
        Ok(vector)
    }

    /// Cosine similarity between two vectors produced by this index
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        cosine_similarity(a, b)
    }
}

/// Deterministic token-hashing embedder.
///
/// Hashes whitespace-separated tokens into a fixed number of buckets and
/// L2-normalizes the result. No model, no network, never fails. Suitable as
/// an offline fallback and for tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder with the given dimensionality
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        use std::hash::{Hash, Hasher};

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        let hash = hasher.finish();

        let index = (hash % self.dimension as u64) as usize;
        // One hash bit decides the sign so unrelated tokens cancel out
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.to_lowercase().split_whitespace() {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

/// Local embedding provider backed by fastembed.
///
/// Uses all-MiniLM-L6-v2 (384 dimensions). The model downloads automatically
/// on first use to ~/.cache/fastembed.
#[cfg(feature = "embeddings")]
pub struct FastembedProvider {
    model: Arc<tokio::sync::Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
}

#[cfg(feature = "embeddings")]
impl FastembedProvider {
    /// Load the local embedding model
    pub fn new() -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true),
        )
        .map_err(|e| Error::provider(format!("Failed to load embedding model: {}", e)))?;

        Ok(Self {
            model: Arc::new(tokio::sync::Mutex::new(model)),
            dimension: 384,
        })
    }
}

#[cfg(feature = "embeddings")]
#[async_trait]
impl EmbeddingProvider for FastembedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut guard = self.model.lock().await;
        let embeddings = guard
            .embed(vec![text.to_string()], None)
            .map_err(|e| Error::provider(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_magnitude() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn cosine_similarity_rejects_length_mismatch() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        match cosine_similarity(&a, &b) {
            Err(Error::DimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected dimension mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);

        let a = embedder.embed("the quick brown fox").await.unwrap();
        let b = embedder.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hashing_embedder_ranks_overlapping_text_higher() {
        let embedder = HashingEmbedder::new(256);

        let query = embedder.embed("deploy the web service").await.unwrap();
        let close = embedder.embed("deploy web service to prod").await.unwrap();
        let far = embedder.embed("quantum entanglement basics").await.unwrap();

        let sim_close = cosine_similarity(&query, &close).unwrap();
        let sim_far = cosine_similarity(&query, &far).unwrap();
        assert!(sim_close > sim_far);
    }

    #[cfg(feature = "embeddings")]
    #[tokio::test]
    #[ignore = "requires model download (~90MB)"]
    async fn fastembed_produces_fixed_dimension_vectors() {
        let provider = FastembedProvider::new().unwrap();
        let vector = provider.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), provider.dimension());

        let index = EmbeddingIndex::new(Arc::new(provider));
        let a = index.embed("deploy the service").await.unwrap();
        let b = index.embed("deploy the web service").await.unwrap();
        let sim = index.similarity(&a, &b).unwrap();
        assert!(sim > 0.5);
    }

    #[tokio::test]
    async fn index_rejects_misbehaving_provider() {
        struct ShortProvider;

        #[async_trait]
        impl EmbeddingProvider for ShortProvider {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![1.0, 2.0])
            }

            fn dimension(&self) -> usize {
                8
            }

            fn model_name(&self) -> &str {
                "short"
            }
        }

        let index = EmbeddingIndex::new(Arc::new(ShortProvider));
        let err = index.embed("anything").await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 2 }));
    }
}
