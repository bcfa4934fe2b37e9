use async_trait::async_trait;
use ultrag_core::{Embeddings, UltragError};

/// Deterministic embeddings for tests and demos.
///
/// Identical texts yield identical unit vectors.
#[derive(Debug, Clone)]
pub struct FakeEmbeddings {
    dimensions: usize,
}

impl FakeEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "dimensions must be > 0");
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            vec[i % self.dimensions] += byte as f32 / 255.0;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        } else {
            // Empty text: keep the vector usable under cosine distance.
            vec[0] = 1.0;
        }
        vec
    }
}

impl Default for FakeEmbeddings {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl Embeddings for FakeEmbeddings {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, UltragError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, UltragError> {
        Ok(self.embed(text))
    }
}
