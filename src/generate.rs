//! Generate-PDF-returning-URL use case.
//!
//! Memoizes render results by the request fingerprint. The object store is
//! the ground truth: a cached URL is only served while its artifact still
//! exists; a cache entry pointing at a vanished object is dropped and the
//! request re-rendered.

use std::sync::Arc;

use crate::error::Result;
use crate::hash;
use crate::model::RenderRequest;
use crate::render::PdfRenderer;
use crate::services::cache::UrlCache;
use crate::services::storage::ArtifactStore;

pub struct GeneratePdfUrl {
    renderer: Arc<dyn PdfRenderer>,
    storage: Arc<dyn ArtifactStore>,
    cache: Arc<dyn UrlCache>,
}

impl GeneratePdfUrl {
    pub fn new(
        renderer: Arc<dyn PdfRenderer>,
        storage: Arc<dyn ArtifactStore>,
        cache: Arc<dyn UrlCache>,
    ) -> Self {
        Self {
            renderer,
            storage,
            cache,
        }
    }

    /// Resolve the request to a public URL, rendering and uploading only when
    /// no valid cached artifact exists.
    pub async fn execute(&self, request: &RenderRequest) -> Result<String> {
        let key = hash::request_key(request)?;

        if let Some(url) = self.cache.get(&key).await? {
            let config = &request.config;
            if self
                .storage
                .exists(&config.directory, &config.file_name)
                .await?
            {
                log::info!("cache hit for {url}");
                return Ok(url);
            }

            // The artifact is gone; the entry lies. Drop it and re-render.
            log::warn!("cached artifact missing for {url}, regenerating");
            self.cache.delete(&key).await?;
        }

        let pdf = self.renderer.render(request).await?;

        let config = &request.config;
        let url = self
            .storage
            .upload(
                &config.directory,
                &config.file_name,
                pdf,
                "application/pdf",
                &config.public_url_prefix,
            )
            .await?;

        self.cache.set(&key, &url, config.expiration).await?;

        Ok(url)
    }
}
