use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use crate::data::FeedService;
use crate::error::ApiError;
use crate::feed::AsyncResponse;
use crate::model::{FeedPage, FeedQuery, FeedSource, VideoItem};

pub const DEFAULT_PREFETCH_DISTANCE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadMode {
    Replace,
    Append,
}

struct PendingPage {
    request_id: u64,
    page: u32,
    cancel_flag: Arc<AtomicBool>,
    mode: LoadMode,
}

#[derive(Debug)]
pub struct PageResponse {
    pub request_id: u64,
    pub page: u32,
    pub result: Result<FeedPage, ApiError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The response belonged to a cancelled or superseded request.
    Stale,
    Loaded {
        page: u32,
        added: usize,
        replaced: bool,
    },
    Failed(ApiError),
}

/// Paginated video sequence for one query. Owns the items; a single fetch is
/// in flight at any time and its result comes back through `apply`.
pub struct FeedPager {
    service: Arc<dyn FeedService>,
    response_tx: Sender<AsyncResponse>,
    query: FeedQuery,
    items: Vec<VideoItem>,
    seen: HashSet<String>,
    page: u32,
    has_more: bool,
    pending: Option<PendingPage>,
    failed: Option<(u32, LoadMode)>,
    last_error: Option<ApiError>,
    next_request_id: u64,
    requests_sent: usize,
    prefetch_distance: usize,
}

impl FeedPager {
    pub fn new(
        service: Arc<dyn FeedService>,
        response_tx: Sender<AsyncResponse>,
        prefetch_distance: usize,
    ) -> Self {
        Self {
            service,
            response_tx,
            query: FeedQuery::default(),
            items: Vec::new(),
            seen: HashSet::new(),
            page: 0,
            has_more: true,
            pending: None,
            failed: None,
            last_error: None,
            next_request_id: 1,
            requests_sent: 0,
            prefetch_distance,
        }
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn items(&self) -> &[VideoItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [VideoItem] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// Number of fetches dispatched since the pager was created.
    pub fn requests_sent(&self) -> usize {
        self.requests_sent
    }

    /// Dispatches a fetch for `page` of `query`. Returns `false` without doing
    /// anything while another fetch for the same query is still in flight. A
    /// different query starts the sequence over, as `set_query` does.
    pub fn load(&mut self, query: &FeedQuery, page: u32, reset: bool) -> bool {
        let switched = *query != self.query;
        if switched {
            self.set_query(query.clone());
        }
        if self.pending.is_some() {
            tracing::debug!(page, "page load skipped, fetch in flight");
            return false;
        }
        let reset = reset || switched;
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let mode = if reset {
            LoadMode::Replace
        } else {
            LoadMode::Append
        };
        self.pending = Some(PendingPage {
            request_id,
            page,
            cancel_flag: cancel_flag.clone(),
            mode,
        });
        self.requests_sent += 1;
        tracing::debug!(request_id, page, source = %self.query.source.label(), "fetching page");

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        let query = self.query.clone();
        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = match &query.source {
                FeedSource::Feed(kind) => service.fetch_feed_page(*kind, page, &query.exclude),
                FeedSource::Profile(user) => {
                    service.fetch_user_videos(user).map(|items| FeedPage {
                        items,
                        page,
                        has_more: false,
                    })
                }
            };
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(AsyncResponse::Page(PageResponse {
                request_id,
                page,
                result,
            }));
        });
        true
    }

    /// Requests the next page when the cursor is within the prefetch distance
    /// of the end of the loaded items.
    pub fn maybe_prefetch(&mut self, cursor: usize) -> bool {
        if self.items.is_empty()
            || !self.has_more
            || self.pending.is_some()
            || self.last_error.is_some()
        {
            return false;
        }
        if self.items.len().saturating_sub(cursor) > self.prefetch_distance {
            return false;
        }
        let query = self.query.clone();
        self.load(&query, self.page + 1, false)
    }

    /// Re-issues the request that last failed.
    pub fn retry(&mut self) -> bool {
        let Some((page, mode)) = self.failed else {
            return false;
        };
        if self.pending.is_some() {
            return false;
        }
        self.last_error = None;
        self.failed = None;
        let query = self.query.clone();
        self.load(&query, page, mode == LoadMode::Replace)
    }

    /// Cancels any fetch in flight and drops everything loaded for the
    /// previous query.
    pub fn set_query(&mut self, query: FeedQuery) {
        if let Some(pending) = self.pending.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
        self.query = query;
        self.items.clear();
        self.seen.clear();
        self.page = 0;
        self.has_more = true;
        self.failed = None;
        self.last_error = None;
    }

    pub fn apply(&mut self, response: PageResponse) -> PageOutcome {
        let Some(pending) = &self.pending else {
            return PageOutcome::Stale;
        };
        if pending.cancel_flag.load(Ordering::SeqCst) || pending.request_id != response.request_id
        {
            tracing::debug!(request_id = response.request_id, "dropping stale page");
            return PageOutcome::Stale;
        }
        let mode = pending.mode;
        let requested = pending.page;
        self.pending = None;

        match response.result {
            Ok(page) => {
                let replaced = mode == LoadMode::Replace;
                if replaced {
                    self.items.clear();
                    self.seen.clear();
                }
                let returned = page.items.len();
                let added = self.append(page.items);
                self.page = requested;
                self.has_more = page.has_more && returned > 0;
                self.last_error = None;
                self.failed = None;
                tracing::info!(
                    page = requested,
                    added,
                    total = self.items.len(),
                    has_more = self.has_more,
                    "page loaded"
                );
                PageOutcome::Loaded {
                    page: requested,
                    added,
                    replaced,
                }
            }
            Err(err) => {
                tracing::warn!(page = requested, error = %err, "page load failed");
                self.last_error = Some(err.clone());
                self.failed = Some((requested, mode));
                PageOutcome::Failed(err)
            }
        }
    }

    fn append(&mut self, incoming: Vec<VideoItem>) -> usize {
        let mut added = 0;
        for item in incoming {
            let keys = item.id.keys();
            if keys.iter().any(|key| self.seen.contains(key)) {
                continue;
            }
            self.seen.extend(keys);
            self.items.push(item);
            added += 1;
        }
        added
    }
}
