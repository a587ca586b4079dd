//! The feed controller: one cursor over a paged video sequence, one player
//! following the cursor, and optimistic interactions on the visible item.
//!
//! Everything here runs on the UI thread. Worker threads report back through
//! `AsyncResponse` and the media backend through `MediaEvent`; both are
//! drained by `poll_async`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crate::data::{CommentService, FeedService, InteractionService};
use crate::error::{ApiError, MediaError};
use crate::interaction::{
    CommentPosted, CommentThread, CommentsResponse, InteractionFailure, InteractionResponse,
    InteractionState, Toggle,
};
use crate::model::{Comment, FeedQuery, FeedType, VideoItem};
use crate::navigation::{
    CursorMove, Direction, NavKey, NavigationConfig, NavigationController, WheelEvent,
};
use crate::pager::{FeedPager, PageOutcome, PageResponse, DEFAULT_PREFETCH_DISTANCE};
use crate::playback::{
    MediaBackend, MediaEvent, PlaybackCoordinator, PlaybackSignal, PlaybackState, Progress,
};

pub const DEFAULT_SEEK_STEP: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum AsyncResponse {
    Page(PageResponse),
    Interaction(InteractionResponse),
    Comments(CommentsResponse),
    CommentPosted(CommentPosted),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    CursorChanged(CursorMove),
    QueryChanged(FeedQuery),
    PageLoaded { page: u32, added: usize, total: usize },
    LoadFailed(ApiError),
    PlaybackChanged { index: usize, state: PlaybackState },
    PlaybackEnded { index: usize },
    MediaFailed { index: usize, error: MediaError },
    InteractionFailed(InteractionFailure),
    CommentsLoaded { count: usize },
    CommentPosted(Comment),
    SessionExpired,
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub navigation: NavigationConfig,
    pub prefetch_distance: usize,
    pub autoplay: bool,
    pub muted: bool,
    pub seek_step: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            navigation: NavigationConfig::default(),
            prefetch_distance: DEFAULT_PREFETCH_DISTANCE,
            autoplay: true,
            muted: false,
            seek_step: DEFAULT_SEEK_STEP,
        }
    }
}

#[derive(Clone)]
pub struct FeedServices {
    pub feed: Arc<dyn FeedService>,
    pub comments: Arc<dyn CommentService>,
    pub interactions: Arc<dyn InteractionService>,
}

/// Read-only view of the feed handed to the renderer.
#[derive(Debug, Clone, Copy)]
pub struct FeedSnapshot<'a> {
    pub query: &'a FeedQuery,
    pub cursor: usize,
    pub items: &'a [VideoItem],
    pub playback: PlaybackState,
    pub progress: Progress,
    pub muted: bool,
    pub autoplay: bool,
    pub loading: bool,
    pub has_more: bool,
    pub error: Option<&'a ApiError>,
    pub last_failure: Option<&'a InteractionFailure>,
    pub comments: Option<&'a CommentThread>,
}

impl<'a> FeedSnapshot<'a> {
    pub fn current(&self) -> Option<&'a VideoItem> {
        self.items.get(self.cursor)
    }
}

pub struct Feed {
    navigation: NavigationController,
    pager: FeedPager,
    playback: PlaybackCoordinator,
    interactions: InteractionState,
    response_rx: Receiver<AsyncResponse>,
    media_rx: Receiver<MediaEvent>,
    events_tx: Sender<FeedEvent>,
    events_rx: Receiver<FeedEvent>,
    seek_step: Duration,
}

impl Feed {
    pub fn new(
        services: FeedServices,
        backend: Box<dyn MediaBackend>,
        media_rx: Receiver<MediaEvent>,
        options: FeedOptions,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        Self {
            navigation: NavigationController::new(options.navigation),
            pager: FeedPager::new(
                services.feed,
                response_tx.clone(),
                options.prefetch_distance,
            ),
            playback: PlaybackCoordinator::new(backend, options.autoplay, options.muted),
            interactions: InteractionState::new(
                services.interactions,
                services.comments,
                response_tx,
            ),
            response_rx,
            media_rx,
            events_tx,
            events_rx,
            seek_step: options.seek_step,
        }
    }

    /// Observers receive every `FeedEvent` emitted from here on.
    pub fn events(&self) -> Receiver<FeedEvent> {
        self.events_rx.clone()
    }

    pub fn cursor(&self) -> usize {
        self.navigation.index()
    }

    pub fn items(&self) -> &[VideoItem] {
        self.pager.items()
    }

    pub fn current(&self) -> Option<&VideoItem> {
        self.pager.items().get(self.navigation.index())
    }

    pub fn query(&self) -> &FeedQuery {
        self.pager.query()
    }

    pub fn requests_sent(&self) -> usize {
        self.pager.requests_sent()
    }

    pub fn playback_state_of(&self, index: usize) -> PlaybackState {
        self.playback.state_of(index)
    }

    pub fn snapshot(&self) -> FeedSnapshot<'_> {
        FeedSnapshot {
            query: self.pager.query(),
            cursor: self.navigation.index(),
            items: self.pager.items(),
            playback: self.playback.state_of(self.navigation.index()),
            progress: self.playback.progress(),
            muted: self.playback.muted(),
            autoplay: self.playback.autoplay(),
            loading: self.pager.is_loading(),
            has_more: self.pager.has_more(),
            error: self.pager.last_error(),
            last_failure: self.interactions.last_failure(),
            comments: self.interactions.comments(),
        }
    }

    /// Drops everything loaded so far and starts over on page 1 of `query`.
    pub fn set_query(&mut self, query: FeedQuery) {
        tracing::info!(source = %query.source.label(), "switching feed");
        self.playback.deactivate();
        self.interactions.close_comments();
        self.pager.set_query(query.clone());
        self.navigation.set_len(0);
        self.navigation.reset();
        self.emit(FeedEvent::QueryChanged(query.clone()));
        self.pager.load(&query, 1, true);
    }

    pub fn switch_feed(&mut self, feed_type: FeedType) {
        self.set_query(FeedQuery::feed(feed_type));
    }

    /// Shows `user`'s videos with the same navigation and playback.
    pub fn open_profile(&mut self, user: &str) {
        self.set_query(FeedQuery::profile(user.trim_start_matches('@')));
    }

    pub fn retry(&mut self) -> bool {
        self.pager.retry()
    }

    pub fn handle_wheel(&mut self, event: WheelEvent, now: Instant) -> Option<CursorMove> {
        let moved = self.navigation.handle_wheel(event, now)?;
        self.cursor_moved(moved);
        Some(moved)
    }

    pub fn handle_key(&mut self, key: NavKey, now: Instant) -> Option<CursorMove> {
        let moved = self.navigation.handle_key(key, now)?;
        self.cursor_moved(moved);
        Some(moved)
    }

    pub fn advance(&mut self, direction: Direction, now: Instant) -> Option<CursorMove> {
        let moved = self.navigation.advance(direction, now)?;
        self.cursor_moved(moved);
        Some(moved)
    }

    pub fn jump_to(&mut self, index: usize) -> Option<CursorMove> {
        let moved = self.navigation.jump_to(index)?;
        self.cursor_moved(moved);
        Some(moved)
    }

    pub fn toggle_playback(&mut self) {
        self.playback.toggle();
    }

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn toggle_mute(&mut self) {
        self.playback.toggle_mute();
    }

    pub fn toggle_autoplay(&mut self) -> bool {
        let autoplay = !self.playback.autoplay();
        self.playback.set_autoplay(autoplay);
        autoplay
    }

    pub fn seek_fraction(&mut self, fraction: f64) -> bool {
        self.playback.seek_fraction(fraction)
    }

    pub fn seek_step(&mut self, forward: bool) -> bool {
        self.playback.seek_relative(self.seek_step, forward)
    }

    pub fn toggle_like(&mut self) -> Toggle {
        let Some(id) = self.current().map(|item| item.id.clone()) else {
            return Toggle::Ignored;
        };
        self.interactions.toggle_like(self.pager.items_mut(), &id)
    }

    pub fn toggle_follow(&mut self) -> Toggle {
        let Some(author_id) = self.current().and_then(|item| item.author.id) else {
            return Toggle::Ignored;
        };
        self.interactions
            .toggle_follow(self.pager.items_mut(), author_id)
    }

    pub fn open_comments(&mut self) {
        if let Some(id) = self.current().map(|item| item.id.clone()) {
            self.interactions.load_comments(&id);
        }
    }

    pub fn close_comments(&mut self) {
        self.interactions.close_comments();
    }

    pub fn post_comment(&mut self, text: &str) -> Result<Toggle, ApiError> {
        let Some(id) = self.current().map(|item| item.id.clone()) else {
            return Ok(Toggle::Ignored);
        };
        self.interactions.append_comment(&id, text)
    }

    pub fn toggle_comment_like(&mut self, comment_id: u64) -> Toggle {
        let Some(id) = self.current().map(|item| item.id.clone()) else {
            return Toggle::Ignored;
        };
        self.interactions.toggle_comment_like(&id, comment_id)
    }

    /// Applies every response and media event that has arrived, without
    /// blocking. Returns whether anything changed.
    pub fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        while let Ok(event) = self.media_rx.try_recv() {
            self.handle_media_event(event);
            changed = true;
        }
        changed
    }

    /// Blocks until one message arrives or `timeout` passes, then drains
    /// whatever else is ready.
    pub fn wait_async(&mut self, timeout: Duration) -> bool {
        let responses = self.response_rx.clone();
        let media = self.media_rx.clone();
        let received = select! {
            recv(responses) -> message => match message {
                Ok(message) => {
                    self.handle_async_response(message);
                    true
                }
                Err(_) => false,
            },
            recv(media) -> event => match event {
                Ok(event) => {
                    self.handle_media_event(event);
                    true
                }
                Err(_) => false,
            },
            default(timeout) => false,
        };
        self.poll_async() || received
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Page(response) => match self.pager.apply(response) {
                PageOutcome::Stale => {}
                PageOutcome::Loaded { page, added, .. } => {
                    let total = self.pager.len();
                    self.navigation.set_len(total);
                    self.emit(FeedEvent::PageLoaded { page, added, total });
                    self.sync_playback();
                    self.pager.maybe_prefetch(self.navigation.index());
                }
                PageOutcome::Failed(err) => {
                    if err.is_auth_expired() {
                        self.emit(FeedEvent::SessionExpired);
                    }
                    self.emit(FeedEvent::LoadFailed(err));
                }
            },
            AsyncResponse::Interaction(response) => {
                if let Some(failure) = self.interactions.resolve(self.pager.items_mut(), response)
                {
                    self.interaction_failed(failure);
                }
            }
            AsyncResponse::Comments(response) => {
                match self.interactions.resolve_comments(response) {
                    Some(failure) => self.interaction_failed(failure),
                    None => {
                        if let Some(thread) = self.interactions.comments() {
                            if !thread.loading {
                                let count = thread.comments.len();
                                self.emit(FeedEvent::CommentsLoaded { count });
                            }
                        }
                    }
                }
            }
            AsyncResponse::CommentPosted(posted) => {
                match self
                    .interactions
                    .resolve_posted(self.pager.items_mut(), posted)
                {
                    Ok(comment) => self.emit(FeedEvent::CommentPosted(comment)),
                    Err(failure) => self.interaction_failed(failure),
                }
            }
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        let before = self.playback.state();
        let signal = self.playback.handle_event(event);
        self.playback_changed(before);
        match signal {
            Some(PlaybackSignal::Completed { index }) => {
                self.emit(FeedEvent::PlaybackEnded { index });
                if index == self.navigation.index() {
                    self.advance(Direction::Next, Instant::now());
                }
            }
            Some(PlaybackSignal::Failed { index, error }) => {
                self.emit(FeedEvent::MediaFailed { index, error });
            }
            None => {}
        }
    }

    fn cursor_moved(&mut self, moved: CursorMove) {
        self.emit(FeedEvent::CursorChanged(moved));
        self.interactions.close_comments();
        self.interactions.clear_failure();
        self.sync_playback();
        self.pager.maybe_prefetch(moved.to);
    }

    /// Points the player at the item under the cursor, or releases it when the
    /// cursor sits past the loaded items.
    fn sync_playback(&mut self) {
        let index = self.navigation.index();
        let before = self.playback.state();
        let signal = match self.pager.items().get(index) {
            Some(item) => {
                if self.playback.active_index() == Some(index) {
                    return;
                }
                self.playback.activate(index, item)
            }
            None => {
                self.playback.deactivate();
                None
            }
        };
        self.playback_changed(before);
        if let Some(PlaybackSignal::Failed { index, error }) = signal {
            self.emit(FeedEvent::MediaFailed { index, error });
        }
    }

    fn playback_changed(&mut self, before: PlaybackState) {
        let state = self.playback.state();
        if state != before {
            if let Some(index) = self.playback.active_index() {
                self.emit(FeedEvent::PlaybackChanged { index, state });
            }
        }
    }

    fn interaction_failed(&mut self, failure: InteractionFailure) {
        if failure.error.is_auth_expired() {
            self.emit(FeedEvent::SessionExpired);
        }
        self.emit(FeedEvent::InteractionFailed(failure));
    }

    fn emit(&self, event: FeedEvent) {
        let _ = self.events_tx.send(event);
    }
}
