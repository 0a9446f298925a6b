use std::collections::BTreeMap;

use taskhost::worker::{Embedding, SearchHit, SimilarityStore};

/// In-memory [`SimilarityStore`] with a linear cosine-similarity scan.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    architecture: Option<String>,
    entries: BTreeMap<String, Embedding>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

impl SimilarityStore for MemoryStore {
    fn add_embedding(&mut self, key: &str, embedding: &Embedding) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), embedding.clone());
        Ok(())
    }

    fn similarity_search(&self, vector: &[f32], top_n: usize) -> anyhow::Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(key, e)| SearchHit {
                key: key.clone(),
                score: cosine(vector, &e.vector),
                thumbnail: e.thumbnail.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_n);
        Ok(hits)
    }

    fn architecture(&self) -> Option<String> {
        self.architecture.clone()
    }

    fn set_architecture(&mut self, architecture: &str) -> anyhow::Result<()> {
        self.architecture = Some(architecture.to_string());
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        self.architecture = None;
        Ok(())
    }
}
