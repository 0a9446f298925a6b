// src/worker/indexing.rs

//! Bulk loading of items into a similarity store.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::Result;
use crate::worker::progress::IndexingHooks;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: String,
    pub score: f64,
    /// Encoded preview of the stored item, if the store keeps one.
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// An embedding computed for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub thumbnail: Option<String>,
}

/// Store of embeddings searchable by similarity.
///
/// Implementations own opening and closing their backing storage.
pub trait SimilarityStore {
    fn add_embedding(&mut self, key: &str, embedding: &Embedding) -> anyhow::Result<()>;

    fn similarity_search(&self, vector: &[f32], top_n: usize) -> anyhow::Result<Vec<SearchHit>>;

    /// Name of the model architecture the stored embeddings came from.
    fn architecture(&self) -> Option<String>;

    fn set_architecture(&mut self, architecture: &str) -> anyhow::Result<()>;

    /// Drop every stored embedding.
    fn clear(&mut self) -> anyhow::Result<()>;
}

/// Make `store` hold embeddings of `architecture`, clearing it when it was
/// built with another one.
pub fn prepare_store<S: SimilarityStore + ?Sized>(store: &mut S, architecture: &str) -> Result<()> {
    match store.architecture() {
        Some(existing) if existing == architecture => return Ok(()),
        Some(existing) => {
            info!(%existing, wanted = architecture, "store built with another architecture; clearing");
            store.clear()?;
        }
        None => {}
    }
    store.set_architecture(architecture)?;
    Ok(())
}

/// Embed every item and add it to `store`, reporting through `hooks`.
///
/// Items whose embedding or insertion fails are skipped. Returns the number
/// of items stored; the status record is written once all were processed.
pub fn index_items<S, I, E>(
    store: &mut S,
    architecture: &str,
    items: I,
    mut embed: E,
    hooks: &mut IndexingHooks,
) -> Result<u64>
where
    S: SimilarityStore + ?Sized,
    I: IntoIterator<Item = String>,
    E: FnMut(&str) -> anyhow::Result<Embedding>,
{
    prepare_store(store, architecture)?;

    let mut stored = 0u64;
    for key in items {
        let added = embed(&key).and_then(|embedding| store.add_embedding(&key, &embedding));
        match added {
            Ok(()) => {
                stored += 1;
                hooks.on_item(stored, &key);
            }
            Err(e) => warn!(item = %key, error = %e, "skipping item"),
        }
    }

    hooks.on_load_end(stored)?;
    Ok(stored)
}
