//! Browser driver seam.
//!
//! The pool and pipeline talk to headless browsers through [`BrowserDriver`]
//! and [`PageSession`] so the scheduler can be exercised without a Chromium
//! binary. [`ChromiumDriver`] is the production implementation, speaking CDP
//! via chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, PrintToPdfParams, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::model::{ItemConfig, Orientation};

/// Waits until every `document.images` entry has settled, successfully or
/// not. Kept as an opaque constant; the protocol evaluates it in the page.
const IMAGE_WAIT_SCRIPT: &str = r#"() => {
    return Promise.all(
        Array.from(document.images).map(img => {
            if (img.complete) return Promise.resolve();
            return new Promise(resolve => img.onload = img.onerror = resolve);
        })
    );
}"#;

/// Protocol-level print options, assembled from an item's [`ItemConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrintOptions {
    pub landscape: Option<bool>,
    pub display_header_footer: Option<bool>,
    pub print_background: Option<bool>,
    pub scale: Option<f64>,
    pub paper_width: Option<f64>,
    pub paper_height: Option<f64>,
    pub margin_top: Option<f64>,
    pub margin_bottom: Option<f64>,
    pub margin_left: Option<f64>,
    pub margin_right: Option<f64>,
    /// Serialized as "start-end".
    pub page_ranges: Option<String>,
    pub header_template: Option<String>,
    pub footer_template: Option<String>,
}

impl PrintOptions {
    pub fn from_config(config: Option<&ItemConfig>) -> Self {
        let Some(config) = config else {
            return Self::default();
        };

        let mut options = Self {
            landscape: config
                .orientation
                .map(|orientation| orientation == Orientation::Landscape),
            display_header_footer: config.display_header_footer,
            print_background: config.print_background,
            scale: config.scale,
            page_ranges: config
                .page_ranges
                .map(|range| format!("{}-{}", range.start, range.end)),
            header_template: config.header_html.clone(),
            footer_template: config.footer_html.clone(),
            ..Self::default()
        };

        if let Some(size) = config.size {
            options.paper_width = Some(size.width);
            options.paper_height = Some(size.height);
        }

        if let Some(margin) = config.margin {
            options.margin_top = margin.top;
            options.margin_bottom = margin.bottom;
            options.margin_left = margin.left;
            options.margin_right = margin.right;
        }

        options
    }
}

/// A single document context able to take HTML and print it.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn set_content(&self, html: &str) -> Result<()>;
    /// Wait for load-complete and network-idle of the current document.
    async fn wait_until_ready(&self) -> Result<()>;
    /// Wait for every image in the document to settle.
    async fn await_images(&self) -> Result<()>;
    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>>;
    async fn close(&self) -> Result<()>;
}

/// Launches browser processes and opens isolated pages in them.
#[async_trait]
pub trait BrowserDriver: Send + Sync + 'static {
    type Browser: Send + Sync + 'static;
    type Page: PageSession + Clone + Send + Sync + 'static;

    async fn launch(&self) -> Result<Self::Browser>;
    async fn open_page(&self, browser: &Self::Browser) -> Result<Self::Page>;
    async fn close_browser(&self, browser: &mut Self::Browser);
}

/// Production driver speaking CDP to a headless Chromium process.
pub struct ChromiumDriver {
    binary_path: String,
}

impl ChromiumDriver {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

/// A running Chromium process together with the task pumping its CDP events.
pub struct ChromiumBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct ChromiumPage {
    inner: Arc<ChromiumPageInner>,
}

struct ChromiumPageInner {
    page: Page,
    /// Lifecycle events subscribed just before the content is set, consumed
    /// by the following readiness wait.
    lifecycle: tokio::sync::Mutex<Option<EventStream<EventLifecycleEvent>>>,
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    type Browser = ChromiumBrowser;
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<ChromiumBrowser> {
        let config = BrowserConfig::builder()
            .chrome_executable(&self.binary_path)
            .args(vec![
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
            ])
            .build()
            .map_err(Error::Render)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(Error::render)?;

        // The handler stream must be polled for the connection to make
        // progress; it ends when the browser process goes away.
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(ChromiumBrowser {
            browser,
            handler_task,
        })
    }

    async fn open_page(&self, browser: &ChromiumBrowser) -> Result<ChromiumPage> {
        // An isolated context per page keeps cookies and storage of
        // concurrent documents apart, like an incognito tab.
        let context = browser
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(Error::render)?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.result.browser_context_id.clone())
            .build()
            .map_err(Error::Render)?;

        let page = browser.browser.new_page(target).await.map_err(Error::render)?;

        page.execute(
            SetLifecycleEventsEnabledParams::builder()
                .enabled(true)
                .build()
                .map_err(Error::Render)?,
        )
        .await
        .map_err(Error::render)?;

        Ok(ChromiumPage {
            inner: Arc::new(ChromiumPageInner {
                page,
                lifecycle: tokio::sync::Mutex::new(None),
            }),
        })
    }

    async fn close_browser(&self, browser: &mut ChromiumBrowser) {
        if let Err(err) = browser.browser.close().await {
            log::warn!("failed to close browser: {err}");
        }
        let _ = browser.browser.wait().await;
        browser.handler_task.abort();
    }
}

#[async_trait]
impl PageSession for ChromiumPage {
    async fn set_content(&self, html: &str) -> Result<()> {
        // Subscribe before the content goes in so the network-idle event of
        // this document cannot be missed.
        let listener = self
            .inner
            .page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(Error::render)?;

        self.inner.page.set_content(html).await.map_err(Error::render)?;

        *self.inner.lifecycle.lock().await = Some(listener);
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        loop {
            let state: String = self
                .inner
                .page
                .evaluate("document.readyState")
                .await
                .map_err(Error::render)?
                .into_value()
                .map_err(Error::render)?;

            if state == "complete" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if let Some(mut listener) = self.inner.lifecycle.lock().await.take() {
            while let Some(event) = listener.next().await {
                if event.name == "networkIdle" {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn await_images(&self) -> Result<()> {
        self.inner
            .page
            .evaluate_function(IMAGE_WAIT_SCRIPT)
            .await
            .map_err(Error::render)?;
        Ok(())
    }

    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>> {
        let params = PrintToPdfParams {
            landscape: options.landscape,
            display_header_footer: options.display_header_footer,
            print_background: options.print_background,
            scale: options.scale,
            paper_width: options.paper_width,
            paper_height: options.paper_height,
            margin_top: options.margin_top,
            margin_bottom: options.margin_bottom,
            margin_left: options.margin_left,
            margin_right: options.margin_right,
            page_ranges: options.page_ranges.clone(),
            header_template: options.header_template.clone(),
            footer_template: options.footer_template.clone(),
            ..PrintToPdfParams::default()
        };

        self.inner.page.pdf(params).await.map_err(Error::render)
    }

    async fn close(&self) -> Result<()> {
        self.inner.page.clone().close().await.map_err(Error::render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageMargin, PageRange, PageSize};

    #[test]
    fn absent_config_yields_defaults() {
        assert_eq!(PrintOptions::from_config(None), PrintOptions::default());
    }

    #[test]
    fn full_config_maps_every_field() {
        let config = ItemConfig {
            orientation: Some(Orientation::Landscape),
            display_header_footer: Some(true),
            print_background: Some(true),
            scale: Some(1.5),
            size: Some(PageSize {
                width: 8.5,
                height: 11.0,
            }),
            margin: Some(PageMargin {
                top: Some(0.5),
                bottom: Some(0.5),
                left: Some(1.0),
                right: Some(1.0),
            }),
            page_ranges: Some(PageRange { start: 2, end: 4 }),
            header_html: Some("<span>header</span>".to_string()),
            footer_html: Some("<span>footer</span>".to_string()),
        };

        let options = PrintOptions::from_config(Some(&config));
        assert_eq!(options.landscape, Some(true));
        assert_eq!(options.display_header_footer, Some(true));
        assert_eq!(options.print_background, Some(true));
        assert_eq!(options.scale, Some(1.5));
        assert_eq!(options.paper_width, Some(8.5));
        assert_eq!(options.paper_height, Some(11.0));
        assert_eq!(options.margin_top, Some(0.5));
        assert_eq!(options.margin_left, Some(1.0));
        assert_eq!(options.page_ranges.as_deref(), Some("2-4"));
        assert_eq!(options.header_template.as_deref(), Some("<span>header</span>"));
        assert_eq!(options.footer_template.as_deref(), Some("<span>footer</span>"));
    }

    #[test]
    fn portrait_maps_to_landscape_false() {
        let config = ItemConfig {
            orientation: Some(Orientation::Portrait),
            ..ItemConfig::default()
        };
        let options = PrintOptions::from_config(Some(&config));
        assert_eq!(options.landscape, Some(false));
    }
}
