//! Optimistic like/follow state and the comment thread of the current item.
//!
//! Toggles flip the local flags and counters immediately and confirm in the
//! background. A key with a confirmation outstanding ignores further toggles;
//! a failed confirmation restores the values captured before the toggle.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use crate::data::{CommentService, InteractionService};
use crate::error::ApiError;
use crate::feed::AsyncResponse;
use crate::model::{Comment, VideoId, VideoItem};

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Sent,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InteractionKey {
    Like(String),
    Follow(u64),
    CommentLike(u64),
    PostComment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionAction {
    Like,
    Unlike,
    Follow,
    Unfollow,
    LikeComment,
    UnlikeComment,
    PostComment,
    LoadComments,
}

impl InteractionAction {
    pub fn label(&self) -> &'static str {
        match self {
            InteractionAction::Like => "like",
            InteractionAction::Unlike => "unlike",
            InteractionAction::Follow => "follow",
            InteractionAction::Unfollow => "unfollow",
            InteractionAction::LikeComment => "like comment",
            InteractionAction::UnlikeComment => "unlike comment",
            InteractionAction::PostComment => "post comment",
            InteractionAction::LoadComments => "load comments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionFailure {
    pub action: InteractionAction,
    pub error: ApiError,
}

/// Values captured before an optimistic toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractionDelta {
    Like { was_liked: bool, likes: u64 },
    Follow { was_followed: bool },
    CommentLike { was_liked: bool, likes: u64 },
    PostComment,
}

#[derive(Debug)]
pub struct InteractionResponse {
    pub key: InteractionKey,
    pub action: InteractionAction,
    pub result: Result<(), ApiError>,
}

#[derive(Debug)]
pub struct CommentsResponse {
    pub request_id: u64,
    pub video: VideoId,
    pub result: Result<Vec<Comment>, ApiError>,
}

#[derive(Debug)]
pub struct CommentPosted {
    pub video: VideoId,
    pub result: Result<Comment, ApiError>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentThread {
    pub video: VideoId,
    pub comments: Vec<Comment>,
    pub loading: bool,
    pub error: Option<ApiError>,
    request_id: u64,
}

pub struct InteractionState {
    service: Arc<dyn InteractionService>,
    comment_service: Arc<dyn CommentService>,
    response_tx: Sender<AsyncResponse>,
    pending: HashMap<InteractionKey, InteractionDelta>,
    thread: Option<CommentThread>,
    last_failure: Option<InteractionFailure>,
    next_request_id: u64,
}

impl InteractionState {
    pub fn new(
        service: Arc<dyn InteractionService>,
        comment_service: Arc<dyn CommentService>,
        response_tx: Sender<AsyncResponse>,
    ) -> Self {
        Self {
            service,
            comment_service,
            response_tx,
            pending: HashMap::new(),
            thread: None,
            last_failure: None,
            next_request_id: 1,
        }
    }

    pub fn last_failure(&self) -> Option<&InteractionFailure> {
        self.last_failure.as_ref()
    }

    /// Forgets the last failure once it no longer describes what is on screen.
    pub fn clear_failure(&mut self) {
        self.last_failure = None;
    }

    pub fn is_pending(&self, key: &InteractionKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn comments(&self) -> Option<&CommentThread> {
        self.thread.as_ref()
    }

    pub fn close_comments(&mut self) {
        self.thread = None;
    }

    pub fn toggle_like(&mut self, items: &mut [VideoItem], item_id: &VideoId) -> Toggle {
        let key = InteractionKey::Like(item_id.primary());
        if self.pending.contains_key(&key) {
            return Toggle::Ignored;
        }
        let Some(item) = items.iter_mut().find(|item| item.id.same_item(item_id)) else {
            return Toggle::Ignored;
        };
        let was_liked = item.is_liked;
        let likes = item.counts.likes;
        item.is_liked = !was_liked;
        item.counts.likes = if was_liked {
            likes.saturating_sub(1)
        } else {
            likes + 1
        };
        self.pending
            .insert(key.clone(), InteractionDelta::Like { was_liked, likes });

        let action = if was_liked {
            InteractionAction::Unlike
        } else {
            InteractionAction::Like
        };
        let video = item.id.clone();
        let service = self.service.clone();
        self.dispatch(key, action, move || match action {
            InteractionAction::Unlike => service.unlike(&video),
            _ => service.like(&video),
        });
        Toggle::Sent
    }

    /// Flips the follow flag on every loaded item by `author_id`.
    pub fn toggle_follow(&mut self, items: &mut [VideoItem], author_id: u64) -> Toggle {
        let key = InteractionKey::Follow(author_id);
        if self.pending.contains_key(&key) {
            return Toggle::Ignored;
        }
        let Some(was_followed) = items
            .iter()
            .find(|item| item.author.id == Some(author_id))
            .map(|item| item.author.is_followed)
        else {
            return Toggle::Ignored;
        };
        set_followed(items, author_id, !was_followed);
        self.pending
            .insert(key.clone(), InteractionDelta::Follow { was_followed });

        let action = if was_followed {
            InteractionAction::Unfollow
        } else {
            InteractionAction::Follow
        };
        let service = self.service.clone();
        self.dispatch(key, action, move || match action {
            InteractionAction::Unfollow => service.unfollow(author_id),
            _ => service.follow(author_id),
        });
        Toggle::Sent
    }

    pub fn toggle_comment_like(&mut self, item_id: &VideoId, comment_id: u64) -> Toggle {
        let key = InteractionKey::CommentLike(comment_id);
        if self.pending.contains_key(&key) {
            return Toggle::Ignored;
        }
        let Some(comment) = self
            .thread
            .as_mut()
            .filter(|thread| thread.video.same_item(item_id))
            .and_then(|thread| thread.comments.iter_mut().find(|c| c.id == comment_id))
        else {
            return Toggle::Ignored;
        };
        let was_liked = comment.is_liked;
        let likes = comment.likes_count;
        comment.is_liked = !was_liked;
        comment.likes_count = if was_liked {
            likes.saturating_sub(1)
        } else {
            likes + 1
        };
        self.pending
            .insert(key.clone(), InteractionDelta::CommentLike { was_liked, likes });

        let action = if was_liked {
            InteractionAction::UnlikeComment
        } else {
            InteractionAction::LikeComment
        };
        let service = self.service.clone();
        self.dispatch(key, action, move || match action {
            InteractionAction::UnlikeComment => service.unlike_comment(comment_id),
            _ => service.like_comment(comment_id),
        });
        Toggle::Sent
    }

    /// Starts loading the comment thread for `item_id`, replacing any thread
    /// that is currently open.
    pub fn load_comments(&mut self, item_id: &VideoId) {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.thread = Some(CommentThread {
            video: item_id.clone(),
            comments: Vec::new(),
            loading: true,
            error: None,
            request_id,
        });
        let tx = self.response_tx.clone();
        let service = self.comment_service.clone();
        let video = item_id.clone();
        thread::spawn(move || {
            let result = service.fetch_comments(&video);
            let _ = tx.send(AsyncResponse::Comments(CommentsResponse {
                request_id,
                video,
                result,
            }));
        });
    }

    /// Posts a comment. Nothing is shown locally until the server returns
    /// the stored comment.
    pub fn append_comment(&mut self, item_id: &VideoId, text: &str) -> Result<Toggle, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::Validation("comment is empty".into()));
        }
        if text.chars().count() > MAX_COMMENT_CHARS {
            return Err(ApiError::Validation(format!(
                "comment is longer than {MAX_COMMENT_CHARS} characters"
            )));
        }
        let key = InteractionKey::PostComment(item_id.primary());
        if self.pending.contains_key(&key) {
            return Ok(Toggle::Ignored);
        }
        self.pending.insert(key, InteractionDelta::PostComment);

        let tx = self.response_tx.clone();
        let service = self.comment_service.clone();
        let video = item_id.clone();
        let text = text.to_string();
        tracing::debug!(video = %video, "posting comment");
        thread::spawn(move || {
            let result = service.post_comment(&video, &text);
            let _ = tx.send(AsyncResponse::CommentPosted(CommentPosted { video, result }));
        });
        Ok(Toggle::Sent)
    }

    /// Settles a like/follow confirmation, rolling back on failure.
    pub fn resolve(
        &mut self,
        items: &mut [VideoItem],
        response: InteractionResponse,
    ) -> Option<InteractionFailure> {
        let delta = self.pending.remove(&response.key)?;
        let error = match response.result {
            Ok(()) => {
                tracing::info!(action = response.action.label(), "interaction confirmed");
                self.clear_failure();
                return None;
            }
            Err(err) => err,
        };
        tracing::warn!(action = response.action.label(), error = %error, "interaction failed, rolling back");
        match (&response.key, delta) {
            (InteractionKey::Like(video), InteractionDelta::Like { was_liked, likes }) => {
                for item in items.iter_mut().filter(|item| item.id.matches(video)) {
                    item.is_liked = was_liked;
                    item.counts.likes = likes;
                }
            }
            (InteractionKey::Follow(author_id), InteractionDelta::Follow { was_followed }) => {
                set_followed(items, *author_id, was_followed);
            }
            (
                InteractionKey::CommentLike(comment_id),
                InteractionDelta::CommentLike { was_liked, likes },
            ) => {
                if let Some(comment) = self
                    .thread
                    .as_mut()
                    .and_then(|thread| thread.comments.iter_mut().find(|c| c.id == *comment_id))
                {
                    comment.is_liked = was_liked;
                    comment.likes_count = likes;
                }
            }
            _ => {}
        }
        Some(self.fail(response.action, error))
    }

    pub fn resolve_comments(&mut self, response: CommentsResponse) -> Option<InteractionFailure> {
        let thread = self.thread.as_mut()?;
        if thread.request_id != response.request_id || !thread.video.same_item(&response.video) {
            return None;
        }
        thread.loading = false;
        match response.result {
            Ok(comments) => {
                thread.comments = comments;
                thread.error = None;
                None
            }
            Err(err) => {
                thread.error = Some(err.clone());
                Some(self.fail(InteractionAction::LoadComments, err))
            }
        }
    }

    /// Prepends the stored comment and bumps the item's comment count.
    pub fn resolve_posted(
        &mut self,
        items: &mut [VideoItem],
        posted: CommentPosted,
    ) -> Result<Comment, InteractionFailure> {
        self.pending
            .remove(&InteractionKey::PostComment(posted.video.primary()));
        match posted.result {
            Ok(comment) => {
                if let Some(thread) = self
                    .thread
                    .as_mut()
                    .filter(|thread| thread.video.same_item(&posted.video))
                {
                    thread.comments.insert(0, comment.clone());
                }
                for item in items.iter_mut().filter(|item| item.id.same_item(&posted.video)) {
                    item.counts.comments += 1;
                }
                tracing::info!(video = %posted.video, "comment posted");
                Ok(comment)
            }
            Err(err) => Err(self.fail(InteractionAction::PostComment, err)),
        }
    }

    fn fail(&mut self, action: InteractionAction, error: ApiError) -> InteractionFailure {
        let failure = InteractionFailure { action, error };
        self.last_failure = Some(failure.clone());
        failure
    }

    fn dispatch<F>(&mut self, key: InteractionKey, action: InteractionAction, request: F)
    where
        F: FnOnce() -> Result<(), ApiError> + Send + 'static,
    {
        tracing::debug!(action = action.label(), "sending interaction");
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = request();
            let _ = tx.send(AsyncResponse::Interaction(InteractionResponse {
                key,
                action,
                result,
            }));
        });
    }
}

fn set_followed(items: &mut [VideoItem], author_id: u64, followed: bool) {
    for item in items
        .iter_mut()
        .filter(|item| item.author.id == Some(author_id))
    {
        item.author.is_followed = followed;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::{unbounded, Receiver};

    use super::*;
    use crate::data::{mock_video, MockCommentService, MockInteractionService};

    fn recv(rx: &Receiver<AsyncResponse>) -> AsyncResponse {
        rx.recv_timeout(Duration::from_secs(2))
            .expect("interaction response")
    }

    fn state(
        service: MockInteractionService,
    ) -> (
        InteractionState,
        Arc<MockInteractionService>,
        Arc<MockCommentService>,
        Receiver<AsyncResponse>,
    ) {
        let (tx, rx) = unbounded();
        let service = Arc::new(service);
        let comments = Arc::new(MockCommentService::default());
        let state = InteractionState::new(service.clone(), comments.clone(), tx);
        (state, service, comments, rx)
    }

    #[test]
    fn rapid_double_like_sends_one_request() {
        let (service, gate) = MockInteractionService::default().gated();
        let (mut state, service, _, rx) = state(service);
        let mut items = vec![mock_video(1)];
        let id = items[0].id.clone();

        assert_eq!(state.toggle_like(&mut items, &id), Toggle::Sent);
        assert_eq!(state.toggle_like(&mut items, &id), Toggle::Ignored);
        assert!(items[0].is_liked);
        assert_eq!(items[0].counts.likes, 11);

        gate.release();
        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        assert!(state.resolve(&mut items, response).is_none());
        assert_eq!(service.calls(), vec!["like:1".to_string()]);
        assert!(items[0].is_liked);
        assert!(!state.is_pending(&InteractionKey::Like("1".into())));
    }

    #[test]
    fn failed_like_rolls_back() {
        let (mut state, service, _, rx) = state(MockInteractionService::default());
        service.fail_with(Some(ApiError::Network("offline".into())));
        let mut items = vec![mock_video(1)];
        items[0].is_liked = true;
        let id = items[0].id.clone();

        state.toggle_like(&mut items, &id);
        assert!(!items[0].is_liked);
        assert_eq!(items[0].counts.likes, 9);

        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        let failure = state.resolve(&mut items, response).unwrap();
        assert_eq!(failure.action, InteractionAction::Unlike);
        assert!(items[0].is_liked);
        assert_eq!(items[0].counts.likes, 10);
        assert!(state.last_failure().is_some());
    }

    #[test]
    fn confirmed_interaction_clears_the_last_failure() {
        let (mut state, service, _, rx) = state(MockInteractionService::default());
        let mut items = vec![mock_video(1)];
        let id = items[0].id.clone();

        service.fail_with(Some(ApiError::Network("offline".into())));
        state.toggle_like(&mut items, &id);
        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        assert!(state.resolve(&mut items, response).is_some());
        assert!(state.last_failure().is_some());

        service.fail_with(None);
        state.toggle_like(&mut items, &id);
        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        assert!(state.resolve(&mut items, response).is_none());
        assert!(state.last_failure().is_none());
        assert!(items[0].is_liked);
    }

    #[test]
    fn follow_flips_every_item_by_the_author() {
        let (mut state, service, _, rx) = state(MockInteractionService::default());
        let mut items = vec![mock_video(1), mock_video(8), mock_video(2)];
        let author = items[0].author.id.unwrap();
        assert_eq!(items[1].author.id, Some(author));

        assert_eq!(state.toggle_follow(&mut items, author), Toggle::Sent);
        assert!(items[0].author.is_followed);
        assert!(items[1].author.is_followed);
        assert!(!items[2].author.is_followed);

        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        state.resolve(&mut items, response);
        assert_eq!(service.calls(), vec![format!("follow:{author}")]);
    }

    #[test]
    fn invalid_comments_are_rejected_before_sending() {
        let (mut state, _, _, rx) = state(MockInteractionService::default());
        let id = VideoId::from_id(1);
        assert!(matches!(
            state.append_comment(&id, "   "),
            Err(ApiError::Validation(_))
        ));
        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            state.append_comment(&id, &long),
            Err(ApiError::Validation(_))
        ));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn posted_comment_is_prepended_after_confirmation() {
        let (mut state, _, comments, rx) = state(MockInteractionService::default());
        let mut items = vec![mock_video(1)];
        let id = items[0].id.clone();
        comments.set_comments(
            &id,
            vec![Comment {
                id: 50,
                text: "older".into(),
                ..Comment::default()
            }],
        );

        state.load_comments(&id);
        let AsyncResponse::Comments(loaded) = recv(&rx) else {
            panic!("expected comments");
        };
        state.resolve_comments(loaded);
        assert_eq!(state.comments().unwrap().comments.len(), 1);

        assert_eq!(state.append_comment(&id, "  hello ").unwrap(), Toggle::Sent);
        assert_eq!(state.comments().unwrap().comments[0].text, "older");
        let AsyncResponse::CommentPosted(posted) = recv(&rx) else {
            panic!("expected posted comment");
        };
        let comment = state.resolve_posted(&mut items, posted).unwrap();
        assert_eq!(comment.text, "hello");
        let thread = state.comments().unwrap();
        assert_eq!(thread.comments[0].text, "hello");
        assert_eq!(items[0].counts.comments, 3);
    }

    #[test]
    fn failed_comment_like_restores_count() {
        let (mut state, service, comments, rx) = state(MockInteractionService::default());
        let id = VideoId::from_id(1);
        comments.set_comments(
            &id,
            vec![Comment {
                id: 9,
                likes_count: 4,
                ..Comment::default()
            }],
        );
        state.load_comments(&id);
        let AsyncResponse::Comments(loaded) = recv(&rx) else {
            panic!("expected comments");
        };
        state.resolve_comments(loaded);

        service.fail_with(Some(ApiError::AuthExpired));
        assert_eq!(state.toggle_comment_like(&id, 9), Toggle::Sent);
        assert_eq!(state.comments().unwrap().comments[0].likes_count, 5);
        let AsyncResponse::Interaction(response) = recv(&rx) else {
            panic!("expected interaction response");
        };
        let failure = state.resolve(&mut [], response).unwrap();
        assert!(failure.error.is_auth_expired());
        let comment = &state.comments().unwrap().comments[0];
        assert_eq!(comment.likes_count, 4);
        assert!(!comment.is_liked);
    }
}
