use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::AppError;

/// One page of results from the listing backend.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub data: Vec<T>,
    pub has_next_page: bool,
    pub total: u64,
}

pub type PageFuture<T> = Pin<Box<dyn Future<Output = Result<PageResult<T>, AppError>> + Send>>;

/// Page fetch function supplied by the embedder, typically bound to a filter
/// set via `PropertyService::page_fetcher`.
pub type PageFetcher<T> = Arc<dyn Fn(u32) -> PageFuture<T> + Send + Sync>;

/// Observable engine state. Items grow monotonically until a reset; a failed
/// fetch surfaces in `error` without clearing what is already loaded.
#[derive(Debug, Clone)]
pub struct ScrollSnapshot<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub has_next_page: bool,
    pub total: u64,
    pub error: Option<String>,
    pub initialized: bool,
}

struct EngineInner<T> {
    items: Vec<T>,
    page: u32,
    has_next_page: bool,
    total: u64,
    error: Option<String>,
    initialized: bool,

    /// Bumped by every reset. Results arriving with a stale generation are
    /// discarded, which is what invalidates in-flight fetches.
    generation: u64,
    /// Issuance counter within the current generation.
    next_seq: u64,
    /// Sequence number the engine will apply next. Results are applied in
    /// issuance order, not arrival order; an early arrival waits in `parked`.
    next_apply: u64,
    parked: BTreeMap<u64, (u32, Result<PageResult<T>, AppError>)>,
    highest_issued_page: u32,
    in_flight: u32,
}

impl<T> EngineInner<T> {
    fn fresh() -> Self {
        Self {
            items: Vec::new(),
            page: 0,
            has_next_page: false,
            total: 0,
            error: None,
            initialized: false,
            generation: 0,
            next_seq: 0,
            next_apply: 0,
            parked: BTreeMap::new(),
            highest_issued_page: 0,
            in_flight: 0,
        }
    }
}

/// Page-cursor-driven fetch-and-append controller.
///
/// The embedder wires a viewport sentinel to [`on_sentinel_visible`] (using
/// [`root_margin_px`] as the observer pre-fetch margin) and renders from
/// [`snapshot`]. Page 1 is an initial load that replaces data; every later
/// page appends. Overlapping fetches are reconciled by a monotonically
/// increasing issuance id: results apply in issuance order regardless of
/// arrival order, and `reset()` discards whatever is still in flight.
///
/// [`on_sentinel_visible`]: InfiniteScrollEngine::on_sentinel_visible
/// [`root_margin_px`]: InfiniteScrollEngine::root_margin_px
/// [`snapshot`]: InfiniteScrollEngine::snapshot
pub struct InfiniteScrollEngine<T> {
    fetcher: PageFetcher<T>,
    enabled: bool,
    root_margin_px: u32,
    inner: Mutex<EngineInner<T>>,
}

impl<T: Clone + Send + 'static> InfiniteScrollEngine<T> {
    pub fn new(fetcher: PageFetcher<T>, enabled: bool, root_margin_px: u32) -> Self {
        Self {
            fetcher,
            enabled,
            root_margin_px,
            inner: Mutex::new(EngineInner::fresh()),
        }
    }

    /// Loads page 1, replacing any current data. Equivalent to [`reset`].
    ///
    /// [`reset`]: InfiniteScrollEngine::reset
    pub async fn initial_load(&self) {
        self.reset().await;
    }

    /// Clears the engine and restarts from page 1. Any fetch still in flight
    /// belongs to the previous generation and its result is discarded on
    /// arrival.
    pub async fn reset(&self) {
        if !self.enabled {
            return;
        }
        let ticket = {
            let mut inner = self.lock();
            let generation = inner.generation + 1;
            *inner = EngineInner::fresh();
            inner.generation = generation;
            self.issue(&mut inner, 1)
        };
        self.run_fetch(ticket).await;
    }

    /// Fetches the next page when there is one and nothing is in flight.
    /// Returns whether a fetch was issued; the repeat-trigger case (sentinel
    /// firing again while the fetch runs) is a quiet no-op.
    pub async fn load_more(&self) -> bool {
        let ticket = {
            let mut inner = self.lock();
            if !self.can_fetch_next(&inner) || inner.in_flight > 0 {
                return false;
            }
            let target = inner.highest_issued_page + 1;
            self.issue(&mut inner, target)
        };
        self.run_fetch(ticket).await;
        true
    }

    /// Raw issuance primitive behind [`load_more`]: fetches the next page
    /// even while an earlier fetch is still in flight. Out-of-order arrivals
    /// are still applied in issuance order.
    ///
    /// [`load_more`]: InfiniteScrollEngine::load_more
    pub async fn fetch_next_unguarded(&self) -> bool {
        let ticket = {
            let mut inner = self.lock();
            if !self.can_fetch_next(&inner) {
                return false;
            }
            let target = inner.highest_issued_page + 1;
            self.issue(&mut inner, target)
        };
        self.run_fetch(ticket).await;
        true
    }

    /// Intersection-sentinel entry point: initial load on first visibility,
    /// append afterwards.
    pub async fn on_sentinel_visible(&self) {
        if !self.enabled {
            return;
        }
        let initialized = self.lock().initialized;
        if initialized {
            self.load_more().await;
        } else {
            self.reset().await;
        }
    }

    pub fn snapshot(&self) -> ScrollSnapshot<T> {
        let inner = self.lock();
        ScrollSnapshot {
            items: inner.items.clone(),
            page: inner.page,
            has_next_page: inner.has_next_page,
            total: inner.total,
            error: inner.error.clone(),
            initialized: inner.initialized,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Pre-fetch margin the embedder should give its intersection observer.
    pub fn root_margin_px(&self) -> u32 {
        self.root_margin_px
    }

    fn can_fetch_next(&self, inner: &EngineInner<T>) -> bool {
        self.enabled && inner.initialized && inner.has_next_page
    }

    fn issue(&self, inner: &mut EngineInner<T>, page: u32) -> FetchTicket {
        let ticket = FetchTicket {
            generation: inner.generation,
            seq: inner.next_seq,
            page,
        };
        inner.next_seq += 1;
        inner.in_flight += 1;
        inner.highest_issued_page = inner.highest_issued_page.max(page);
        ticket
    }

    async fn run_fetch(&self, ticket: FetchTicket) {
        let result = (self.fetcher)(ticket.page).await;
        self.complete(ticket, result);
    }

    fn complete(&self, ticket: FetchTicket, result: Result<PageResult<T>, AppError>) {
        let mut inner = self.lock();
        if ticket.generation != inner.generation {
            tracing::debug!(
                "Discarding stale page {} fetch from a previous generation",
                ticket.page
            );
            return;
        }
        inner.in_flight -= 1;
        inner.parked.insert(ticket.seq, (ticket.page, result));

        // Drain everything that is now applicable, in issuance order.
        loop {
            let next = inner.next_apply;
            let Some((page, result)) = inner.parked.remove(&next) else {
                break;
            };
            inner.next_apply += 1;
            match result {
                Ok(page_result) => {
                    if page == 1 {
                        inner.items = page_result.data;
                    } else {
                        inner.items.extend(page_result.data);
                    }
                    inner.page = page;
                    inner.has_next_page = page_result.has_next_page;
                    inner.total = page_result.total;
                    inner.error = None;
                    inner.initialized = true;
                }
                Err(e) => {
                    tracing::warn!("Page {} fetch failed: {}", page, e);
                    inner.error = Some(e.to_string());
                    inner.initialized = true;
                    // Allow a manual retry of the failed page when nothing
                    // later is already on its way.
                    if inner.in_flight == 0 && inner.parked.is_empty() {
                        inner.highest_issued_page = page.saturating_sub(1);
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy)]
struct FetchTicket {
    generation: u64,
    seq: u64,
    page: u32,
}
