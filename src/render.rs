//! Concurrent per-item rendering.
//!
//! Each item of a request is rendered on its own pooled page; the resulting
//! byte streams are merged in request order no matter which item finishes
//! first. A single failing item fails the whole request.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;

use crate::browser::{BrowserDriver, PageSession, PrintOptions};
use crate::error::Result;
use crate::merge;
use crate::model::{RenderItem, RenderRequest};
use crate::pool::PagePool;

/// Seam between the memoizer and the rendering machinery.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render every item of the request and merge them into one document.
    async fn render(&self, request: &RenderRequest) -> Result<Bytes>;
}

pub struct RenderPipeline<D: BrowserDriver> {
    pool: Arc<PagePool<D>>,
}

impl<D: BrowserDriver> RenderPipeline<D> {
    pub fn new(pool: Arc<PagePool<D>>) -> Self {
        Self { pool }
    }

    async fn render_item(&self, item: &RenderItem) -> Result<Vec<u8>> {
        let lease = self.pool.acquire().await?;

        let result = async {
            let options = PrintOptions::from_config(item.config.as_ref());
            let page = lease.page();
            page.set_content(&item.body_html).await?;
            page.wait_until_ready().await?;
            page.await_images().await?;
            page.print_to_pdf(&options).await
        }
        .await;

        self.pool.release(lease).await;
        result
    }
}

#[async_trait]
impl<D: BrowserDriver> PdfRenderer for RenderPipeline<D> {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes> {
        // One unit per item; join_all keeps the results in item order.
        let units = request.items.iter().map(|item| self.render_item(item));
        let results = join_all(units).await;

        let mut streams = Vec::with_capacity(results.len());
        for result in results {
            streams.push(result?);
        }

        merge::merge_pdfs(streams).await
    }
}
