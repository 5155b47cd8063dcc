//! Page pool for reusing browser tabs across requests.
//!
//! Launching a browser process is expensive and even opening a tab in a
//! running one is not free, so rendered pages are pooled and reused. The pool
//! grows on demand: a request first takes an idle page, then opens a tab in a
//! browser with spare capacity, then launches a new browser, and only blocks
//! when every browser is at its tab limit. Blocked acquirers wait FIFO on
//! single-use handoff channels and are served directly by releases.
//!
//! A pooled page that sits idle past the configured timeout is closed, and
//! closing the last page of a browser closes the browser with it, so a quiet
//! service converges back to zero processes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::browser::{BrowserDriver, PageSession};
use crate::error::{Error, Result};

/// Sizing and reclamation knobs for the pool.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Max concurrent browser processes.
    pub max_browsers: usize,
    /// Max tabs per browser process.
    pub max_pages_per_browser: usize,
    /// How long a pooled page may sit idle before it is closed.
    pub page_idle_timeout: Duration,
}

type BrowserId = u64;
type PageId = u64;

/// A page checked out of the pool. Hand it back with [`PagePool::release`]
/// on every path; an unreleased lease permanently occupies a pool slot.
pub struct PageLease<D: BrowserDriver> {
    id: PageId,
    page: D::Page,
}

impl<D: BrowserDriver> PageLease<D> {
    pub fn page(&self) -> &D::Page {
        &self.page
    }
}

struct PageEntry<D: BrowserDriver> {
    page: D::Page,
    browser_id: BrowserId,
    in_use: bool,
    last_used: Instant,
    idle_timer: Option<JoinHandle<()>>,
}

struct BrowserEntry<D: BrowserDriver> {
    browser: D::Browser,
    pages: Vec<PageId>,
}

struct PoolState<D: BrowserDriver> {
    browsers: HashMap<BrowserId, BrowserEntry<D>>,
    pages: HashMap<PageId, PageEntry<D>>,
    available: VecDeque<PageId>,
    waiters: VecDeque<oneshot::Sender<PageLease<D>>>,
    /// Browser launches in flight; counts toward the browser cap so two
    /// concurrent acquires cannot both spawn the last allowed process.
    launching: usize,
    /// Leases currently held by callers.
    in_flight: usize,
    next_browser_id: BrowserId,
    next_page_id: PageId,
    shutdown: bool,
}

/// Dynamic pool of browser processes and their pages.
pub struct PagePool<D: BrowserDriver> {
    driver: D,
    limits: PoolLimits,
    state: Mutex<PoolState<D>>,
    /// Signalled on every release so shutdown can wait for in-flight leases.
    released: Notify,
}

impl<D: BrowserDriver> PagePool<D> {
    pub fn new(driver: D, limits: PoolLimits) -> Arc<Self> {
        Arc::new(Self {
            driver,
            limits,
            state: Mutex::new(PoolState {
                browsers: HashMap::new(),
                pages: HashMap::new(),
                available: VecDeque::new(),
                waiters: VecDeque::new(),
                launching: 0,
                in_flight: 0,
                next_browser_id: 0,
                next_page_id: 0,
                shutdown: false,
            }),
            released: Notify::new(),
        })
    }

    /// Take a page, blocking until one is available. The returned lease is
    /// exclusively owned until it is released. Fails once shutdown begins.
    pub async fn acquire(self: &Arc<Self>) -> Result<PageLease<D>> {
        let mut state = self.state.lock().await;

        if state.shutdown {
            return Err(Error::render("page pool is shut down"));
        }

        // Reuse an idle page if any.
        if let Some(id) = state.available.pop_front() {
            let entry = state
                .pages
                .get_mut(&id)
                .ok_or_else(|| Error::Internal("available page missing from registry".into()))?;
            if let Some(timer) = entry.idle_timer.take() {
                timer.abort();
            }
            entry.in_use = true;
            let lease = PageLease {
                id,
                page: entry.page.clone(),
            };
            state.in_flight += 1;
            return Ok(lease);
        }

        // A browser with spare capacity can host a new tab.
        let candidate = state
            .browsers
            .iter()
            .find(|(_, entry)| entry.pages.len() < self.limits.max_pages_per_browser)
            .map(|(id, _)| *id);

        if let Some(browser_id) = candidate {
            let entry = state
                .browsers
                .get(&browser_id)
                .ok_or_else(|| Error::Internal("candidate browser vanished".into()))?;
            let page = self.driver.open_page(&entry.browser).await?;
            let id = state.next_page_id;
            state.next_page_id += 1;
            state.pages.insert(
                id,
                PageEntry {
                    page: page.clone(),
                    browser_id,
                    in_use: true,
                    last_used: Instant::now(),
                    idle_timer: None,
                },
            );
            if let Some(browser) = state.browsers.get_mut(&browser_id) {
                browser.pages.push(id);
            }
            state.in_flight += 1;
            log::debug!("opened page {id} in browser {browser_id}");
            return Ok(PageLease { id, page });
        }

        // Room for another browser process. The launch happens without the
        // lock; the `launching` reservation keeps the cap intact meanwhile.
        if state.browsers.len() + state.launching < self.limits.max_browsers {
            state.launching += 1;
            drop(state);
            return self.launch_browser_with_page().await;
        }

        // Saturated. Queue up and wait for a release to hand a page over.
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        drop(state);

        match rx.await {
            Ok(lease) => Ok(lease),
            Err(_) => Err(Error::render("page pool shut down while waiting for a page")),
        }
    }

    async fn launch_browser_with_page(self: &Arc<Self>) -> Result<PageLease<D>> {
        let launched = self.driver.launch().await;

        let mut browser = match launched {
            Ok(browser) => browser,
            Err(err) => {
                let mut state = self.state.lock().await;
                state.launching -= 1;
                return Err(err);
            }
        };

        let opened = self.driver.open_page(&browser).await;

        let mut state = self.state.lock().await;
        state.launching -= 1;

        let page = match opened {
            Ok(page) => page,
            Err(err) => {
                drop(state);
                self.driver.close_browser(&mut browser).await;
                return Err(err);
            }
        };

        if state.shutdown {
            drop(state);
            let _ = page.close().await;
            self.driver.close_browser(&mut browser).await;
            return Err(Error::render("page pool is shut down"));
        }

        let browser_id = state.next_browser_id;
        state.next_browser_id += 1;
        let page_id = state.next_page_id;
        state.next_page_id += 1;

        state.browsers.insert(
            browser_id,
            BrowserEntry {
                browser,
                pages: vec![page_id],
            },
        );
        state.pages.insert(
            page_id,
            PageEntry {
                page: page.clone(),
                browser_id,
                in_use: true,
                last_used: Instant::now(),
                idle_timer: None,
            },
        );
        state.in_flight += 1;
        log::info!("launched browser {browser_id} with page {page_id}");

        // Acquirers that queued up while this launch was in flight can be
        // served from the new browser's remaining tab capacity.
        self.serve_waiters_locked(&mut state).await;

        Ok(PageLease {
            id: page_id,
            page,
        })
    }

    /// Open pages for queued waiters while some browser has spare capacity.
    /// Lock must be held. Stops on the first open failure; those waiters
    /// stay queued and are served by releases.
    async fn serve_waiters_locked(&self, state: &mut PoolState<D>) {
        while !state.waiters.is_empty() {
            let candidate = state
                .browsers
                .iter()
                .find(|(_, entry)| entry.pages.len() < self.limits.max_pages_per_browser)
                .map(|(id, _)| *id);
            let Some(browser_id) = candidate else {
                return;
            };
            let Some(entry) = state.browsers.get(&browser_id) else {
                return;
            };

            let page = match self.driver.open_page(&entry.browser).await {
                Ok(page) => page,
                Err(err) => {
                    log::warn!("failed to open page for queued acquirer: {err}");
                    return;
                }
            };

            let id = state.next_page_id;
            state.next_page_id += 1;

            let mut handed = false;
            while let Some(waiter) = state.waiters.pop_front() {
                let lease = PageLease {
                    id,
                    page: page.clone(),
                };
                if waiter.send(lease).is_ok() {
                    handed = true;
                    break;
                }
            }

            if !handed {
                let _ = page.close().await;
                return;
            }

            state.pages.insert(
                id,
                PageEntry {
                    page: page.clone(),
                    browser_id,
                    in_use: true,
                    last_used: Instant::now(),
                    idle_timer: None,
                },
            );
            if let Some(browser) = state.browsers.get_mut(&browser_id) {
                browser.pages.push(id);
            }
            state.in_flight += 1;
            log::debug!("opened page {id} in browser {browser_id} for queued acquirer");
        }
    }

    /// Return a page. A queued waiter gets it directly (still checked out);
    /// otherwise it goes back to the idle pool and its reclamation timer
    /// starts. After shutdown has begun, returned pages are closed instead.
    pub async fn release(self: &Arc<Self>, lease: PageLease<D>) {
        let PageLease { id, page } = lease;
        let mut state = self.state.lock().await;

        state.in_flight -= 1;

        if !state.pages.contains_key(&id) || state.shutdown {
            // Unknown to the registry (already reclaimed) or shutting down.
            if let Err(err) = page.close().await {
                log::warn!("failed to close returned page {id}: {err}");
            }
            self.remove_page_locked(&mut state, id).await;
            drop(state);
            self.released.notify_waiters();
            return;
        }

        // Hand off to the oldest waiter still listening.
        while let Some(waiter) = state.waiters.pop_front() {
            let lease = PageLease {
                id,
                page: page.clone(),
            };
            if waiter.send(lease).is_ok() {
                state.in_flight += 1;
                self.released.notify_waiters();
                return;
            }
        }

        let now = Instant::now();
        if let Some(entry) = state.pages.get_mut(&id) {
            entry.in_use = false;
            entry.last_used = now;
            entry.idle_timer = Some(self.spawn_idle_timer(id));
        }
        state.available.push_back(id);
        drop(state);
        self.released.notify_waiters();
    }

    fn spawn_idle_timer(self: &Arc<Self>, id: PageId) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let timeout = self.limits.page_idle_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            pool.reclaim_idle(id).await;
        })
    }

    /// Timer body: close the page if it is still pooled and untouched, and
    /// collapse its browser when that was the last page.
    async fn reclaim_idle(self: &Arc<Self>, id: PageId) {
        let mut state = self.state.lock().await;

        if state.shutdown {
            return;
        }
        let Some(entry) = state.pages.get(&id) else {
            return;
        };
        if entry.in_use || entry.last_used.elapsed() < self.limits.page_idle_timeout {
            return;
        }
        let Some(position) = state.available.iter().position(|&p| p == id) else {
            return;
        };

        state.available.remove(position);
        let page = state.pages.get(&id).map(|entry| entry.page.clone());
        self.remove_page_locked(&mut state, id).await;
        drop(state);

        if let Some(page) = page {
            if let Err(err) = page.close().await {
                log::warn!("failed to close idle page {id}: {err}");
            }
        }
        log::info!("closed idle page {id}");
    }

    /// Drop a page from the registry and close its browser if it was the
    /// last one. Must be called with the state lock held; browser close and
    /// removal happen in the same critical section.
    async fn remove_page_locked(&self, state: &mut PoolState<D>, id: PageId) {
        let Some(entry) = state.pages.remove(&id) else {
            return;
        };
        if let Some(timer) = entry.idle_timer {
            timer.abort();
        }

        let browser_id = entry.browser_id;
        let empty = match state.browsers.get_mut(&browser_id) {
            Some(browser) => {
                browser.pages.retain(|&p| p != id);
                browser.pages.is_empty()
            }
            None => false,
        };

        if empty {
            if let Some(mut browser) = state.browsers.remove(&browser_id) {
                self.driver.close_browser(&mut browser.browser).await;
                log::info!("closed idle browser {browser_id}");
            }
        }
    }

    /// Wait for in-flight leases, then tear everything down. Blocked
    /// acquirers observe the dropped handoff channel and abort.
    pub async fn shutdown(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.shutdown = true;

        // Dropping the senders wakes every waiter with an error.
        state.waiters.clear();

        while state.in_flight > 0 {
            // Created before the lock drops so a release between unlock and
            // await cannot be missed.
            let released = self.released.notified();
            drop(state);
            released.await;
            state = self.state.lock().await;
        }

        for entry in state.pages.values_mut() {
            if let Some(timer) = entry.idle_timer.take() {
                timer.abort();
            }
        }

        let pages: Vec<_> = state.pages.drain().map(|(_, entry)| entry.page).collect();
        state.available.clear();
        let browsers: Vec<_> = state.browsers.drain().collect();
        drop(state);

        for page in pages {
            if let Err(err) = page.close().await {
                log::warn!("failed to close page during shutdown: {err}");
            }
        }
        for (id, mut entry) in browsers {
            self.driver.close_browser(&mut entry.browser).await;
            log::debug!("closed browser {id} during shutdown");
        }

        log::info!("page pool shut down");
    }

    /// Point-in-time counters, for logs and tests.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        PoolStats {
            browsers: state.browsers.len(),
            pages: state.pages.len(),
            available: state.available.len(),
            in_flight: state.in_flight,
            waiters: state.waiters.len(),
        }
    }
}

/// Snapshot of the pool's occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub browsers: usize,
    pub pages: usize,
    pub available: usize,
    pub in_flight: usize,
    pub waiters: usize,
}
