//! Optional vector index for semantic candidate retrieval.
//!
//! The index is a capability, not a requirement: at startup the
//! configured provider is probed, and on failure (or when disabled) a
//! no-op implementation is wired behind the same interface. With the
//! no-op index every semantic-similarity score is `0` and the linker
//! proceeds keyword-only.

use crate::error::{Error, Result};
use crate::paths::Roots;
use crate::settings::Settings;
use async_trait::async_trait;
use std::sync::Arc;

/// Nearest-neighbor interface over entity embeddings.
///
/// Implementations must be `Send + Sync`; the linker queries from
/// concurrent gateway calls.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether this index actually computes similarities.
    fn is_enabled(&self) -> bool;

    /// Embed free text into the index's vector space.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Insert or replace the vector stored for `id`.
    async fn upsert(&self, id: &str, vector: Vec<f32>) -> Result<()>;

    /// The `k` nearest stored vectors by cosine similarity, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>>;

    /// Remove the vector stored for `id`, if any.
    async fn remove(&self, id: &str) -> Result<()>;
}

impl std::fmt::Debug for dyn VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("is_enabled", &self.is_enabled())
            .finish()
    }
}

/// The degraded index: similarity is always zero, storage is a no-op.
pub struct NoopIndex;

#[async_trait]
impl VectorIndex for NoopIndex {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _id: &str, _vector: Vec<f32>) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<(String, f32)>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

/// Probe the configured provider.
///
/// # Errors
///
/// Returns [`Error::Degraded`] when semantic search is disabled by
/// settings, the crate was built without the `vector-index` feature,
/// or the provider failed to initialize (the cause is logged).
pub async fn probe(settings: &Settings, roots: &Roots) -> Result<Arc<dyn VectorIndex>> {
    if !settings.semantic_search_enabled() {
        tracing::info!("semantic search disabled by settings");
        return Err(Error::Degraded {
            subsystem: "vector-index",
        });
    }

    #[cfg(feature = "vector-index")]
    {
        return match builtin::BagOfWordsIndex::open(roots.vectors()).await {
            Ok(index) => Ok(Arc::new(index)),
            Err(e) => {
                tracing::warn!(error = %e, "vector provider failed to initialize");
                Err(Error::Degraded {
                    subsystem: "vector-index",
                })
            }
        };
    }

    #[cfg(not(feature = "vector-index"))]
    {
        let _ = roots;
        Err(Error::Degraded {
            subsystem: "vector-index",
        })
    }
}

/// Probe the configured provider and return a ready index.
///
/// Never fails: a [`Error::Degraded`] probe result wires [`NoopIndex`]
/// behind the same interface with a single warning, and every
/// semantic-similarity score reads as zero from then on.
pub async fn open(settings: &Settings, roots: &Roots) -> Arc<dyn VectorIndex> {
    match probe(settings, roots).await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(error = %e, "linker runs keyword-only");
            Arc::new(NoopIndex)
        }
    }
}

#[cfg(feature = "vector-index")]
pub use builtin::BagOfWordsIndex;

#[cfg(feature = "vector-index")]
mod builtin {
    use super::{async_trait, Result, VectorIndex};
    use recall_markdown::write_atomic;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tokio::sync::RwLock;

    /// Embedding dimensionality of the built-in provider.
    pub const DIMS: usize = 256;

    /// The built-in provider: a deterministic feature-hashed
    /// bag-of-words embedding.
    ///
    /// Tokens are hashed into a fixed number of buckets and the counts
    /// L2-normalized, so cosine similarity measures token overlap with
    /// sub-linear sensitivity to repeats. No model files, no network.
    /// Vectors persist as JSON under `<dataRoot>/vectors/`.
    pub struct BagOfWordsIndex {
        file: PathBuf,
        vectors: RwLock<HashMap<String, Vec<f32>>>,
    }

    impl BagOfWordsIndex {
        /// Open (or initialize) the index in the given directory.
        ///
        /// # Errors
        ///
        /// Returns an error if the directory cannot be created. A
        /// malformed persistence file is logged and treated as empty.
        pub async fn open(dir: PathBuf) -> Result<Self> {
            tokio::fs::create_dir_all(&dir).await?;
            let file = dir.join("vectors.json");

            let vectors = match tokio::fs::read_to_string(&file).await {
                Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                    tracing::warn!(file = %file.display(), error = %e, "resetting malformed vector store");
                    HashMap::new()
                }),
                Err(_) => HashMap::new(),
            };

            Ok(Self {
                file,
                vectors: RwLock::new(vectors),
            })
        }

        async fn persist(&self, snapshot: &HashMap<String, Vec<f32>>) -> Result<()> {
            let raw = serde_json::to_string(snapshot)?;
            write_atomic(&self.file, &raw).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl VectorIndex for BagOfWordsIndex {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(embed_text(text))
        }

        async fn upsert(&self, id: &str, vector: Vec<f32>) -> Result<()> {
            let snapshot = {
                let mut vectors = self.vectors.write().await;
                vectors.insert(id.to_string(), vector);
                vectors.clone()
            };
            self.persist(&snapshot).await
        }

        async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
            let vectors = self.vectors.read().await;
            let mut scored: Vec<(String, f32)> = vectors
                .iter()
                .map(|(id, stored)| (id.clone(), cosine(vector, stored)))
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            scored.truncate(k);
            Ok(scored)
        }

        async fn remove(&self, id: &str) -> Result<()> {
            let snapshot = {
                let mut vectors = self.vectors.write().await;
                if vectors.remove(id).is_none() {
                    return Ok(());
                }
                vectors.clone()
            };
            self.persist(&snapshot).await
        }
    }

    /// Embed text by hashing lowercase alphanumeric tokens into
    /// [`DIMS`] buckets, then L2-normalizing.
    #[must_use]
    pub fn embed_text(text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
        {
            let bucket = (fnv1a(&token.to_lowercase()) as usize) % DIMS;
            buckets[bucket] += 1.0;
        }
        let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut buckets {
                *x /= norm;
            }
        }
        buckets
    }

    fn fnv1a(s: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in s.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        // Inputs are L2-normalized, so the dot product is the cosine.
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn embedding_is_deterministic_and_normalized() {
            let a = embed_text("API retry logic with exponential backoff");
            let b = embed_text("API retry logic with exponential backoff");
            assert_eq!(a, b);
            let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }

        #[test]
        fn related_text_scores_higher_than_unrelated() {
            let query = embed_text("retry with exponential backoff");
            let related = embed_text("API retry logic: exponential backoff with jitter");
            let unrelated = embed_text("grocery list: milk, eggs, bread");
            assert!(cosine(&query, &related) > cosine(&query, &unrelated));
        }

        #[tokio::test]
        async fn upsert_query_remove_cycle() {
            let temp = tempfile::tempdir().unwrap();
            let index = BagOfWordsIndex::open(temp.path().join("vectors")).await.unwrap();

            let v1 = index.embed("retry backoff jitter").await.unwrap();
            let v2 = index.embed("weekly meal planning").await.unwrap();
            index.upsert("mem-1", v1.clone()).await.unwrap();
            index.upsert("mem-2", v2).await.unwrap();

            let hits = index.query(&v1, 1).await.unwrap();
            assert_eq!(hits[0].0, "mem-1");
            assert!(hits[0].1 > 0.99);

            index.remove("mem-1").await.unwrap();
            let hits = index.query(&v1, 2).await.unwrap();
            assert!(hits.iter().all(|(id, _)| id != "mem-1"));
        }

        #[tokio::test]
        async fn vectors_survive_a_reopen() {
            let temp = tempfile::tempdir().unwrap();
            let dir = temp.path().join("vectors");
            {
                let index = BagOfWordsIndex::open(dir.clone()).await.unwrap();
                let v = index.embed("persisted content").await.unwrap();
                index.upsert("mem-9", v).await.unwrap();
            }
            let reopened = BagOfWordsIndex::open(dir).await.unwrap();
            let v = reopened.embed("persisted content").await.unwrap();
            let hits = reopened.query(&v, 1).await.unwrap();
            assert_eq!(hits[0].0, "mem-9");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_index_degrades_cleanly() {
        let index = NoopIndex;
        assert!(!index.is_enabled());
        assert!(index.embed("anything").await.unwrap().is_empty());
        index.upsert("mem-1", vec![1.0]).await.unwrap();
        assert!(index.query(&[1.0], 5).await.unwrap().is_empty());
        index.remove("mem-1").await.unwrap();
    }

    #[tokio::test]
    async fn disabled_settings_probe_reports_degraded() {
        let temp = tempfile::tempdir().unwrap();
        let roots = crate::paths::Roots::from_dirs(
            temp.path().join("m"),
            temp.path().join("t"),
            temp.path().join("d"),
        )
        .unwrap();
        let mut settings = Settings::default();
        settings.features.enable_semantic_search = false;

        let err = probe(&settings, &roots).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Degraded {
                subsystem: "vector-index"
            }
        ));

        // open() absorbs the degradation and wires the no-op index.
        let index = open(&settings, &roots).await;
        assert!(!index.is_enabled());
    }
}
