//! Text embedding with a latched model-or-fallback path.
//!
//! The sentence-embedding model is loaded at most once per process; when the
//! load fails, the process latches onto the deterministic hash fallback and
//! never retries (an operator restarts the process to retry the model).

use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

/// Fixed output dimension; every stored vector has this length.
pub const DIM: usize = 384;

pub struct Embedder {
    model_name: String,
    model: OnceCell<Option<Arc<TextEmbedding>>>,
}

impl Embedder {
    pub fn new(model_name: String) -> Self {
        Self {
            model_name,
            model: OnceCell::new(),
        }
    }

    /// Embed a text into a unit vector of length [`DIM`].
    ///
    /// Empty input (after trimming) returns the zero vector. The model path
    /// is used when available; otherwise the hash fallback. Both are
    /// normalized to the fixed dimension.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let input = text.trim().to_lowercase();
        if input.is_empty() {
            return vec![0.0; DIM];
        }

        if let Some(model) = self.model().await {
            match Self::run_model(model, input.clone()).await {
                Ok(raw) => return fit_dimension(raw),
                Err(e) => {
                    log::warn!("Model embedding failed, hashing this input instead: {}", e);
                }
            }
        }

        hash_embedding(&input)
    }

    /// Load the model exactly once; concurrent first callers share the load.
    /// `None` means the load failed and the fallback path is latched.
    async fn model(&self) -> Option<Arc<TextEmbedding>> {
        self.model
            .get_or_init(|| async {
                let name = self.model_name.clone();
                let loaded =
                    tokio::task::spawn_blocking(move || load_model(&name)).await;
                match loaded {
                    Ok(Ok(model)) => {
                        log::info!("Embedding model '{}' loaded", self.model_name);
                        Some(Arc::new(model))
                    }
                    Ok(Err(e)) => {
                        log::warn!(
                            "Failed to load embedding model '{}', latching hash fallback: {}",
                            self.model_name,
                            e
                        );
                        None
                    }
                    Err(e) => {
                        log::warn!(
                            "Embedding model load task panicked, latching hash fallback: {}",
                            e
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn run_model(model: Arc<TextEmbedding>, input: String) -> Result<Vec<f32>, String> {
        let embedded = tokio::task::spawn_blocking(move || {
            model
                .embed(vec![input], None)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("Embedding task failed: {}", e))??;

        embedded
            .into_iter()
            .next()
            .ok_or_else(|| "Embedding model returned no vectors".to_string())
    }
}

fn load_model(name: &str) -> Result<TextEmbedding, String> {
    let model_name = match name {
        "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        other => {
            log::warn!("Unknown embed model '{}', using all-MiniLM-L6-v2", other);
            EmbeddingModel::AllMiniLML6V2
        }
    };

    TextEmbedding::try_new(InitOptions {
        model_name,
        show_download_progress: false,
        ..Default::default()
    })
    .map_err(|e| e.to_string())
}

/// Fit a model vector to [`DIM`]: truncate when larger, zero-pad when
/// smaller, then re-normalize.
pub(crate) fn fit_dimension(mut vector: Vec<f32>) -> Vec<f32> {
    vector.resize(DIM, 0.0);
    normalize(&mut vector);
    vector
}

/// Deterministic fallback embedding derived from SHA-256 of the input.
pub(crate) fn hash_embedding(input: &str) -> Vec<f32> {
    let digest = Sha256::digest(input.as_bytes());
    let mut vector: Vec<f32> = (0..DIM)
        .map(|i| digest[i % 32] as f32 / 127.5 - 1.0)
        .collect();
    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn hash_embedding_is_deterministic() {
        let a = hash_embedding("find me an image classifier");
        let b = hash_embedding("find me an image classifier");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_embedding_has_fixed_dim_and_unit_norm() {
        let v = hash_embedding("translate english to french");
        assert_eq!(v.len(), DIM);
        assert!((l2(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distinct_inputs_embed_differently() {
        assert_ne!(hash_embedding("alpha"), hash_embedding("beta"));
    }

    #[test]
    fn fit_dimension_pads_and_renormalizes() {
        let v = fit_dimension(vec![3.0, 4.0]);
        assert_eq!(v.len(), DIM);
        assert!((l2(&v) - 1.0).abs() < 1e-6);
        assert!(v[2..].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn fit_dimension_truncates_oversized_vectors() {
        let v = fit_dimension(vec![1.0; 768]);
        assert_eq!(v.len(), DIM);
        assert!((l2(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_input_embeds_to_zero_vector() {
        let embedder = Embedder::new("all-MiniLM-L6-v2".to_string());
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let v = rt.block_on(embedder.embed("   "));
        assert_eq!(v, vec![0.0; DIM]);
    }
}
