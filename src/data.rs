use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::api;
use crate::error::ApiError;
use crate::model::{Author, Comment, Counts, FeedPage, FeedType, VideoId, VideoItem};

pub trait FeedService: Send + Sync {
    fn fetch_feed_page(
        &self,
        feed_type: FeedType,
        page: u32,
        exclude: &[String],
    ) -> Result<FeedPage, ApiError>;
    fn fetch_user_videos(&self, user: &str) -> Result<Vec<VideoItem>, ApiError>;
}

pub trait CommentService: Send + Sync {
    fn fetch_comments(&self, video: &VideoId) -> Result<Vec<Comment>, ApiError>;
    fn post_comment(&self, video: &VideoId, text: &str) -> Result<Comment, ApiError>;
}

pub trait InteractionService: Send + Sync {
    fn like(&self, video: &VideoId) -> Result<(), ApiError>;
    fn unlike(&self, video: &VideoId) -> Result<(), ApiError>;
    fn follow(&self, author_id: u64) -> Result<(), ApiError>;
    fn unfollow(&self, author_id: u64) -> Result<(), ApiError>;
    fn like_comment(&self, comment_id: u64) -> Result<(), ApiError>;
    fn unlike_comment(&self, comment_id: u64) -> Result<(), ApiError>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn fetch_feed_page(
        &self,
        feed_type: FeedType,
        page: u32,
        exclude: &[String],
    ) -> Result<FeedPage, ApiError> {
        self.client.videos(feed_type, page, exclude)
    }

    fn fetch_user_videos(&self, user: &str) -> Result<Vec<VideoItem>, ApiError> {
        self.client.user_videos(user)
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn fetch_comments(&self, video: &VideoId) -> Result<Vec<Comment>, ApiError> {
        self.client.comments(&video.primary())
    }

    fn post_comment(&self, video: &VideoId, text: &str) -> Result<Comment, ApiError> {
        self.client.create_comment(&video.primary(), text)
    }
}

pub struct ApiInteractionService {
    client: Arc<api::Client>,
}

impl ApiInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for ApiInteractionService {
    fn like(&self, video: &VideoId) -> Result<(), ApiError> {
        self.client.like_video(&video.primary())
    }

    fn unlike(&self, video: &VideoId) -> Result<(), ApiError> {
        self.client.unlike_video(&video.primary())
    }

    fn follow(&self, author_id: u64) -> Result<(), ApiError> {
        self.client.follow_user(author_id)
    }

    fn unfollow(&self, author_id: u64) -> Result<(), ApiError> {
        self.client.unfollow_user(author_id)
    }

    fn like_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.client.like_comment(comment_id)
    }

    fn unlike_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.client.unlike_comment(comment_id)
    }
}

/// Blocks service calls until the holder releases them, so tests can observe
/// the state while a request is in flight.
#[derive(Clone)]
pub struct Gate {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Gate {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn release(&self) {
        let _ = self.tx.send(());
    }

    fn wait(&self) {
        let _ = self.rx.recv();
    }
}

/// Serves `page_size` generated items per page until `total_pages`, unless a
/// page has been scripted explicitly.
pub struct MockFeedService {
    page_size: usize,
    total_pages: u32,
    scripted: Mutex<HashMap<(FeedType, u32), Result<FeedPage, ApiError>>>,
    profiles: Mutex<HashMap<String, Vec<VideoItem>>>,
    calls: Mutex<Vec<(FeedType, u32)>>,
    gate: Option<Gate>,
}

impl Default for MockFeedService {
    fn default() -> Self {
        Self::new(10, 5)
    }
}

impl MockFeedService {
    pub fn new(page_size: usize, total_pages: u32) -> Self {
        Self {
            page_size,
            total_pages,
            scripted: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(mut self) -> (Self, Gate) {
        let gate = Gate::new();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn script(&self, feed_type: FeedType, page: u32, result: Result<FeedPage, ApiError>) {
        self.scripted.lock().insert((feed_type, page), result);
    }

    pub fn set_profile(&self, user: &str, items: Vec<VideoItem>) {
        self.profiles.lock().insert(user.to_string(), items);
    }

    pub fn calls(&self) -> Vec<(FeedType, u32)> {
        self.calls.lock().clone()
    }

    fn generated(&self, feed_type: FeedType, page: u32) -> FeedPage {
        if page == 0 || page > self.total_pages {
            return FeedPage {
                items: Vec::new(),
                page,
                has_more: false,
            };
        }
        let base = match feed_type {
            FeedType::ForYou => 0,
            FeedType::Following => 100_000,
        };
        let items = (0..self.page_size)
            .map(|i| mock_video(base + u64::from(page) * 1_000 + i as u64))
            .collect();
        FeedPage {
            items,
            page,
            has_more: page < self.total_pages,
        }
    }
}

impl FeedService for MockFeedService {
    fn fetch_feed_page(
        &self,
        feed_type: FeedType,
        page: u32,
        _exclude: &[String],
    ) -> Result<FeedPage, ApiError> {
        self.calls.lock().push((feed_type, page));
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let scripted = self.scripted.lock().get(&(feed_type, page)).cloned();
        match scripted {
            Some(result) => result,
            None => Ok(self.generated(feed_type, page)),
        }
    }

    fn fetch_user_videos(&self, user: &str) -> Result<Vec<VideoItem>, ApiError> {
        self.profiles
            .lock()
            .get(user)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("user {user}")))
    }
}

#[derive(Default)]
pub struct MockCommentService {
    comments: Mutex<HashMap<String, Vec<Comment>>>,
    next_id: Mutex<u64>,
    fail_with: Mutex<Option<ApiError>>,
}

impl MockCommentService {
    pub fn set_comments(&self, video: &VideoId, comments: Vec<Comment>) {
        self.comments.lock().insert(video.primary(), comments);
    }

    pub fn fail_with(&self, error: Option<ApiError>) {
        *self.fail_with.lock() = error;
    }
}

impl CommentService for MockCommentService {
    fn fetch_comments(&self, video: &VideoId) -> Result<Vec<Comment>, ApiError> {
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        Ok(self
            .comments
            .lock()
            .get(&video.primary())
            .cloned()
            .unwrap_or_default())
    }

    fn post_comment(&self, video: &VideoId, text: &str) -> Result<Comment, ApiError> {
        if let Some(err) = self.fail_with.lock().clone() {
            return Err(err);
        }
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        let comment = Comment {
            id,
            text: text.to_string(),
            author: Author {
                id: Some(1),
                nickname: "me".into(),
                ..Author::default()
            },
            created_at: Some(Utc::now()),
            likes_count: 0,
            is_liked: false,
        };
        self.comments
            .lock()
            .entry(video.primary())
            .or_default()
            .insert(0, comment.clone());
        Ok(comment)
    }
}

/// Records every call as `"<action>:<target>"`.
#[derive(Default)]
pub struct MockInteractionService {
    calls: Mutex<Vec<String>>,
    fail_with: Mutex<Option<ApiError>>,
    gate: Option<Gate>,
}

impl MockInteractionService {
    pub fn gated(mut self) -> (Self, Gate) {
        let gate = Gate::new();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn fail_with(&self, error: Option<ApiError>) {
        *self.fail_with.lock() = error;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<(), ApiError> {
        self.calls.lock().push(call);
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl InteractionService for MockInteractionService {
    fn like(&self, video: &VideoId) -> Result<(), ApiError> {
        self.record(format!("like:{video}"))
    }

    fn unlike(&self, video: &VideoId) -> Result<(), ApiError> {
        self.record(format!("unlike:{video}"))
    }

    fn follow(&self, author_id: u64) -> Result<(), ApiError> {
        self.record(format!("follow:{author_id}"))
    }

    fn unfollow(&self, author_id: u64) -> Result<(), ApiError> {
        self.record(format!("unfollow:{author_id}"))
    }

    fn like_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.record(format!("like_comment:{comment_id}"))
    }

    fn unlike_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.record(format!("unlike_comment:{comment_id}"))
    }
}

pub fn mock_video(id: u64) -> VideoItem {
    VideoItem {
        id: VideoId::new(Some(id), Some(format!("uuid-{id}"))),
        media_url: Some(format!("https://cdn.example/{id}.mp4")),
        thumbnail_url: Some(format!("https://cdn.example/{id}.jpg")),
        author: Author {
            id: Some(id % 7 + 1),
            nickname: format!("creator{}", id % 7 + 1),
            display_name: format!("Creator {}", id % 7 + 1),
            avatar: None,
            is_followed: false,
        },
        description: format!("Sample clip #{id}"),
        music: None,
        counts: Counts {
            likes: 10,
            comments: 2,
            views: 100,
        },
        is_liked: false,
    }
}
