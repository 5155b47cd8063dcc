//! Shared fixtures: a mock browser driver for exercising the pool and
//! pipeline without Chromium, in-memory stores for the use case, and a
//! minimal PDF builder for merge assertions.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quire::browser::{BrowserDriver, PageSession, PrintOptions};
use quire::error::{Error, Result};
use quire::render::PdfRenderer;
use quire::services::cache::UrlCache;
use quire::services::storage::ArtifactStore;

// ---------------------------------------------------------------------------
// Minimal PDF documents
// ---------------------------------------------------------------------------

/// Build a valid PDF with one page per marker, each page's only text being
/// that marker. Page objects are added in reverse so their ids do not follow
/// page order; the Kids array alone carries the real order.
pub fn multi_page_pdf(markers: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(markers.len());
    for marker in markers.iter().rev() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*marker)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id);
    }
    kids.reverse();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => markers.len() as u32,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("document saves");
    bytes
}

/// Build a valid one-page PDF whose only text is `marker`.
pub fn single_page_pdf(marker: &str) -> Vec<u8> {
    multi_page_pdf(&[marker])
}

/// Extract the text of page `number` (1-based) from a PDF byte stream.
pub fn page_text(pdf: &[u8], number: u32) -> String {
    let doc = Document::load_mem(pdf).expect("output parses as PDF");
    doc.extract_text(&[number]).expect("page text extracts")
}

// ---------------------------------------------------------------------------
// Mock browser driver
// ---------------------------------------------------------------------------

/// Counters shared by every mock browser and page, for invariant assertions.
#[derive(Default)]
pub struct DriverMetrics {
    pub launches: AtomicUsize,
    pub open_browsers: AtomicUsize,
    pub peak_browsers: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub peak_pages_per_browser: AtomicUsize,
}

impl DriverMetrics {
    fn record_peak(peak: &AtomicUsize, current: usize) {
        peak.fetch_max(current, Ordering::SeqCst);
    }
}

pub struct MockDriver {
    pub metrics: Arc<DriverMetrics>,
    pub fail_launch: Arc<AtomicBool>,
    pub fail_open_page: Arc<AtomicBool>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(DriverMetrics::default()),
            fail_launch: Arc::new(AtomicBool::new(false)),
            fail_open_page: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct MockBrowser {
    current_pages: Arc<AtomicUsize>,
    metrics: Arc<DriverMetrics>,
}

#[derive(Clone)]
pub struct MockPage {
    inner: Arc<MockPageInner>,
}

struct MockPageInner {
    html: Mutex<String>,
    browser_pages: Arc<AtomicUsize>,
    metrics: Arc<DriverMetrics>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserDriver for MockDriver {
    type Browser = MockBrowser;
    type Page = MockPage;

    async fn launch(&self) -> Result<MockBrowser> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::render("mock launch failure"));
        }
        self.metrics.launches.fetch_add(1, Ordering::SeqCst);
        let open = self.metrics.open_browsers.fetch_add(1, Ordering::SeqCst) + 1;
        DriverMetrics::record_peak(&self.metrics.peak_browsers, open);
        Ok(MockBrowser {
            current_pages: Arc::new(AtomicUsize::new(0)),
            metrics: self.metrics.clone(),
        })
    }

    async fn open_page(&self, browser: &MockBrowser) -> Result<MockPage> {
        if self.fail_open_page.load(Ordering::SeqCst) {
            return Err(Error::render("mock page failure"));
        }
        let per_browser = browser.current_pages.fetch_add(1, Ordering::SeqCst) + 1;
        DriverMetrics::record_peak(&self.metrics.peak_pages_per_browser, per_browser);
        self.metrics.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(MockPage {
            inner: Arc::new(MockPageInner {
                html: Mutex::new(String::new()),
                browser_pages: browser.current_pages.clone(),
                metrics: self.metrics.clone(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    async fn close_browser(&self, _browser: &mut MockBrowser) {
        self.metrics.open_browsers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageSession for MockPage {
    async fn set_content(&self, html: &str) -> Result<()> {
        *self.inner.html.lock().unwrap() = html.to_string();
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn await_images(&self) -> Result<()> {
        Ok(())
    }

    async fn print_to_pdf(&self, _options: &PrintOptions) -> Result<Vec<u8>> {
        let html = self.inner.html.lock().unwrap().clone();
        if html.contains("RENDER-FAIL") {
            return Err(Error::render("mock print failure"));
        }
        if html.contains("SLOW") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if html.contains("MULTIPAGE") {
            let markers: Vec<String> = (1..=3).map(|n| format!("{html} part{n}")).collect();
            let markers: Vec<&str> = markers.iter().map(String::as_str).collect();
            return Ok(multi_page_pdf(&markers));
        }
        Ok(single_page_pdf(&html))
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.browser_pages.fetch_sub(1, Ordering::SeqCst);
            self.inner.metrics.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory stores and renderers
// ---------------------------------------------------------------------------

/// Artifact store on a HashMap, counting uploads.
#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    pub uploads: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn remove(&self, folder: &str, path: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(folder.to_string(), path.to_string()));
    }

    pub fn contains(&self, folder: &str, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(folder.to_string(), path.to_string()))
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(
        &self,
        folder: &str,
        path: &str,
        body: Bytes,
        _content_type: &str,
        public_url_prefix: &str,
    ) -> Result<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert((folder.to_string(), path.to_string()), body);
        Ok(format!("{public_url_prefix}/{folder}/{path}"))
    }

    async fn exists(&self, folder: &str, path: &str) -> Result<bool> {
        Ok(self.contains(folder, path))
    }
}

/// URL cache on a HashMap; TTLs recorded, never enforced.
#[derive(Default)]
pub struct MemoryUrlCache {
    entries: Mutex<HashMap<String, (String, u64)>>,
}

impl MemoryUrlCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl UrlCache for MemoryUrlCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(url, _)| url.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), ttl_seconds));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Cache whose every call fails, for error-propagation tests.
pub struct FailingUrlCache;

#[async_trait]
impl UrlCache for FailingUrlCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::cache("cache is down"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<()> {
        Err(Error::cache("cache is down"))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::cache("cache is down"))
    }
}

/// Renderer returning a fixed single-page document, counting invocations.
#[derive(Default)]
pub struct CountingRenderer {
    pub renders: AtomicUsize,
}

#[async_trait]
impl PdfRenderer for CountingRenderer {
    async fn render(&self, _request: &quire::model::RenderRequest) -> Result<Bytes> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(single_page_pdf("rendered")))
    }
}

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

pub fn render_request(htmls: &[&str]) -> quire::model::RenderRequest {
    quire::model::RenderRequest {
        items: htmls
            .iter()
            .map(|html| quire::model::RenderItem {
                body_html: html.to_string(),
                config: None,
            })
            .collect(),
        config: quire::model::GeneralConfig {
            directory: "docs".to_string(),
            file_name: "out.pdf".to_string(),
            public_url_prefix: "http://cdn.local".to_string(),
            expiration: 0,
        },
    }
}
