use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::loader::GraphLoader;
use crate::models::{ListWithVideos, slug_violation};
use crate::store::GraphStore;

/// Resolves public slugs to lists with their member videos.
pub struct SlugResolver<S> {
    store: Arc<S>,
    loader: GraphLoader<S>,
}

impl<S> Clone for SlugResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            loader: self.loader.clone(),
        }
    }
}

impl<S: GraphStore> SlugResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        let loader = GraphLoader::new(Arc::clone(&store));
        Self { store, loader }
    }

    /// Malformed and reserved slugs fail with `InvalidSlug` before any lookup. A list with
    /// no members fails with `EmptyCollection` rather than resolving to an empty result.
    pub async fn resolve(&self, slug: &str) -> Result<ListWithVideos> {
        if let Some(violation) = slug_violation(slug) {
            return Err(LibError::invalid_slug(anyhow!(
                "slug {:?} rejected: {}",
                slug,
                violation
            )));
        }

        let list = self.store.find_list_by_slug(slug).await?.ok_or_else(|| {
            LibError::not_found(
                "Video list not found",
                anyhow!("no video list with slug {:?}", slug),
            )
        })?;

        let loaded = self.loader.load_one(list.id).await?;
        if loaded.videos.is_empty() {
            return Err(LibError::empty_collection(anyhow!(
                "video list {} ({:?}) has no videos",
                list.id,
                slug
            )));
        }
        Ok(loaded)
    }
}
