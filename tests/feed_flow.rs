use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use shortfeed::data::{
    mock_video, Gate, MockCommentService, MockFeedService, MockInteractionService,
};
use shortfeed::error::ApiError;
use shortfeed::feed::{Feed, FeedEvent, FeedOptions, FeedServices};
use shortfeed::model::{Comment, FeedPage, FeedSource, FeedType};
use shortfeed::navigation::{NavKey, ScrollOrigin, WheelEvent};
use shortfeed::playback::{
    MediaCall, MediaEvent, MediaEventKind, MediaTicket, PlaybackState, RecordingBackend,
};

const CLIP: Duration = Duration::from_secs(30);
const STEP: Duration = Duration::from_millis(250);

struct Harness {
    feed: Feed,
    events: Receiver<FeedEvent>,
    feed_service: Arc<MockFeedService>,
    comments: Arc<MockCommentService>,
    interactions: Arc<MockInteractionService>,
    backend: RecordingBackend,
    media_tx: Sender<MediaEvent>,
}

fn harness(feed_service: MockFeedService, interactions: MockInteractionService) -> Harness {
    let feed_service = Arc::new(feed_service);
    let comments = Arc::new(MockCommentService::default());
    let interactions = Arc::new(interactions);
    let (media_tx, media_rx) = unbounded();
    let backend = RecordingBackend::with_events(media_tx.clone(), CLIP);
    let feed = Feed::new(
        FeedServices {
            feed: feed_service.clone(),
            comments: comments.clone(),
            interactions: interactions.clone(),
        },
        Box::new(backend.clone()),
        media_rx,
        FeedOptions::default(),
    );
    let events = feed.events();
    Harness {
        feed,
        events,
        feed_service,
        comments,
        interactions,
        backend,
        media_tx,
    }
}

fn started(feed_type: FeedType) -> Harness {
    let mut h = harness(MockFeedService::default(), MockInteractionService::default());
    h.feed.switch_feed(feed_type);
    settle(&mut h.feed);
    h
}

/// Applies async results until nothing has arrived for a short while.
fn settle(feed: &mut Feed) {
    while feed.wait_async(Duration::from_millis(200)) {}
}

fn drain(events: &Receiver<FeedEvent>) -> Vec<FeedEvent> {
    events.try_iter().collect()
}

/// Presses ArrowDown `count` times, spaced past the cooldown.
fn scroll_down(feed: &mut Feed, count: usize) {
    let start = Instant::now();
    for step in 1..=count {
        let at = start + STEP * step as u32;
        assert!(feed.handle_key(NavKey::ArrowDown, at).is_some());
    }
}

fn last_ticket(backend: &RecordingBackend) -> MediaTicket {
    backend
        .calls()
        .iter()
        .rev()
        .find_map(|call| match call {
            MediaCall::Load { ticket, .. } => Some(*ticket),
            _ => None,
        })
        .expect("a load call")
}

#[test]
fn first_page_loads_and_first_item_plays() {
    let h = started(FeedType::ForYou);

    assert_eq!(h.feed.items().len(), 10);
    assert_eq!(h.feed.cursor(), 0);
    assert_eq!(h.feed_service.calls(), vec![(FeedType::ForYou, 1)]);
    let snapshot = h.feed.snapshot();
    assert!(snapshot.has_more);
    assert_eq!(snapshot.playback, PlaybackState::Playing);
    assert_eq!(snapshot.progress.duration, Some(CLIP));

    let events = drain(&h.events);
    assert!(events.contains(&FeedEvent::PageLoaded {
        page: 1,
        added: 10,
        total: 10
    }));
}

#[test]
fn nearing_the_end_prefetches_exactly_once() {
    let mut h = started(FeedType::ForYou);

    scroll_down(&mut h.feed, 6);
    assert_eq!(h.feed.requests_sent(), 1);

    let start = Instant::now() + STEP * 10;
    h.feed.handle_key(NavKey::ArrowDown, start);
    assert_eq!(h.feed.cursor(), 7);
    assert_eq!(h.feed.requests_sent(), 2);

    h.feed.handle_key(NavKey::ArrowDown, start + STEP);
    h.feed.handle_key(NavKey::ArrowDown, start + STEP * 2);
    assert_eq!(h.feed.cursor(), 9);
    assert_eq!(h.feed.requests_sent(), 2);

    settle(&mut h.feed);
    assert_eq!(
        h.feed_service.calls(),
        vec![(FeedType::ForYou, 1), (FeedType::ForYou, 2)]
    );
    assert_eq!(h.feed.items().len(), 20);
}

#[test]
fn overlapping_pages_are_deduplicated() {
    let service = MockFeedService::default();
    service.script(
        FeedType::ForYou,
        2,
        Ok(FeedPage {
            items: vec![mock_video(1008), mock_video(1009), mock_video(2000)],
            page: 2,
            has_more: true,
        }),
    );
    let mut h = harness(service, MockInteractionService::default());
    h.feed.switch_feed(FeedType::ForYou);
    settle(&mut h.feed);

    h.feed.jump_to(7);
    settle(&mut h.feed);

    assert_eq!(h.feed.items().len(), 11);
    assert!(drain(&h.events).contains(&FeedEvent::PageLoaded {
        page: 2,
        added: 1,
        total: 11
    }));
    let last = h.feed.items().last().expect("items");
    assert_eq!(last.id.id, Some(2000));
}

#[test]
fn moving_on_releases_the_previous_item_before_loading_the_next() {
    let mut h = started(FeedType::ForYou);
    let first = last_ticket(&h.backend);
    h.backend.clear();

    scroll_down(&mut h.feed, 1);
    settle(&mut h.feed);

    let calls = h.backend.calls();
    let released = calls
        .iter()
        .position(|call| *call == MediaCall::Release(first))
        .expect("first item released");
    let loaded = calls
        .iter()
        .position(|call| matches!(call, MediaCall::Load { .. }))
        .expect("second item loaded");
    assert!(released < loaded);

    let second = last_ticket(&h.backend);
    assert_ne!(first, second);
    assert!(calls.contains(&MediaCall::Play(second)));
    assert!(!calls.contains(&MediaCall::Play(first)));
    assert_eq!(h.feed.playback_state_of(0), PlaybackState::Idle);
    assert_eq!(h.feed.playback_state_of(1), PlaybackState::Playing);
}

#[test]
fn wheel_gestures_respect_threshold_origin_and_cooldown() {
    let mut h = started(FeedType::ForYou);
    let now = Instant::now();

    let small = WheelEvent {
        delta_y: 10.0,
        origin: ScrollOrigin::Feed,
    };
    assert!(h.feed.handle_wheel(small, now).is_none());

    let inside_comments = WheelEvent {
        delta_y: 120.0,
        origin: ScrollOrigin::Comments,
    };
    assert!(h.feed.handle_wheel(inside_comments, now).is_none());

    let swipe = WheelEvent {
        delta_y: 120.0,
        origin: ScrollOrigin::Feed,
    };
    assert!(h.feed.handle_wheel(swipe, now).is_some());
    assert!(h.feed.handle_wheel(swipe, now + Duration::from_millis(20)).is_none());
    assert!(h.feed.handle_wheel(swipe, now + STEP).is_some());
    assert_eq!(h.feed.cursor(), 2);
}

#[test]
fn ended_item_auto_advances_to_the_next() {
    let mut h = started(FeedType::ForYou);
    h.feed.jump_to(3);
    settle(&mut h.feed);
    assert_eq!(h.feed.playback_state_of(3), PlaybackState::Playing);
    drain(&h.events);

    let ticket = last_ticket(&h.backend);
    h.media_tx
        .send(MediaEvent {
            ticket,
            kind: MediaEventKind::Ended,
        })
        .expect("send ended");
    settle(&mut h.feed);

    assert_eq!(h.feed.cursor(), 4);
    assert_eq!(h.feed.playback_state_of(3), PlaybackState::Idle);
    assert_eq!(h.feed.playback_state_of(4), PlaybackState::Playing);

    let events = drain(&h.events);
    assert!(events.contains(&FeedEvent::PlaybackEnded { index: 3 }));
    let loading = events
        .iter()
        .position(|event| {
            *event
                == FeedEvent::PlaybackChanged {
                    index: 4,
                    state: PlaybackState::Loading,
                }
        })
        .expect("item 4 loading");
    let playing = events
        .iter()
        .position(|event| {
            *event
                == FeedEvent::PlaybackChanged {
                    index: 4,
                    state: PlaybackState::Playing,
                }
        })
        .expect("item 4 playing");
    assert!(loading < playing);
}

#[test]
fn stale_media_events_are_ignored() {
    let mut h = started(FeedType::ForYou);
    let first = last_ticket(&h.backend);
    scroll_down(&mut h.feed, 1);
    settle(&mut h.feed);

    h.media_tx
        .send(MediaEvent {
            ticket: first,
            kind: MediaEventKind::Ended,
        })
        .expect("send stale event");
    settle(&mut h.feed);

    assert_eq!(h.feed.cursor(), 1);
    assert_eq!(h.feed.playback_state_of(1), PlaybackState::Playing);
}

#[test]
fn double_like_sends_a_single_request() {
    let (interactions, gate): (MockInteractionService, Gate) =
        MockInteractionService::default().gated();
    let mut h = harness(MockFeedService::default(), interactions);
    h.feed.switch_feed(FeedType::ForYou);
    settle(&mut h.feed);

    assert_eq!(h.feed.toggle_like(), shortfeed::interaction::Toggle::Sent);
    assert_eq!(h.feed.toggle_like(), shortfeed::interaction::Toggle::Ignored);
    let current = h.feed.current().expect("current item");
    assert!(current.is_liked);
    assert_eq!(current.counts.likes, 11);

    gate.release();
    settle(&mut h.feed);

    assert_eq!(h.interactions.calls(), vec!["like:1000".to_string()]);
    let current = h.feed.current().expect("current item");
    assert!(current.is_liked);
    assert_eq!(current.counts.likes, 11);
}

#[test]
fn failed_like_rolls_back() {
    let mut h = started(FeedType::ForYou);
    h.interactions
        .fail_with(Some(ApiError::Network("offline".into())));
    drain(&h.events);

    h.feed.toggle_like();
    settle(&mut h.feed);

    let current = h.feed.current().expect("current item");
    assert!(!current.is_liked);
    assert_eq!(current.counts.likes, 10);
    let failure = h.feed.snapshot().last_failure.cloned().expect("failure");
    assert_eq!(failure.error, ApiError::Network("offline".into()));
    assert!(drain(&h.events)
        .iter()
        .any(|event| matches!(event, FeedEvent::InteractionFailed(_))));

    scroll_down(&mut h.feed, 1);
    assert!(h.feed.snapshot().last_failure.is_none());
}

#[test]
fn follow_updates_every_item_by_the_author() {
    let mut h = started(FeedType::ForYou);
    let author = h.feed.current().and_then(|item| item.author.id);

    h.feed.toggle_follow();
    settle(&mut h.feed);

    for item in h.feed.items() {
        assert_eq!(item.author.is_followed, item.author.id == author);
    }
    assert_eq!(
        h.interactions.calls(),
        vec![format!("follow:{}", author.expect("author id"))]
    );
}

#[test]
fn switching_feeds_resets_cursor_and_loads_page_one() {
    let mut h = started(FeedType::ForYou);
    scroll_down(&mut h.feed, 3);
    settle(&mut h.feed);
    let playing = last_ticket(&h.backend);

    h.feed.switch_feed(FeedType::Following);
    assert_eq!(h.feed.cursor(), 0);
    assert!(h.feed.items().is_empty());
    assert!(h.backend.calls().contains(&MediaCall::Release(playing)));

    settle(&mut h.feed);
    assert_eq!(
        h.feed_service.calls().last(),
        Some(&(FeedType::Following, 1))
    );
    assert_eq!(h.feed.query().source, FeedSource::Feed(FeedType::Following));
    assert_eq!(h.feed.current().and_then(|item| item.id.id), Some(101_000));
    assert_eq!(h.feed.snapshot().playback, PlaybackState::Playing);
}

#[test]
fn expired_session_is_reported() {
    let service = MockFeedService::default();
    service.script(FeedType::Following, 1, Err(ApiError::AuthExpired));
    let mut h = harness(service, MockInteractionService::default());

    h.feed.switch_feed(FeedType::Following);
    settle(&mut h.feed);

    let events = drain(&h.events);
    assert!(events.contains(&FeedEvent::SessionExpired));
    assert!(events.contains(&FeedEvent::LoadFailed(ApiError::AuthExpired)));
    assert!(h.feed.items().is_empty());
}

#[test]
fn retry_reissues_a_failed_load() {
    let service = MockFeedService::default();
    service.script(
        FeedType::ForYou,
        1,
        Err(ApiError::Network("connection reset".into())),
    );
    let mut h = harness(service, MockInteractionService::default());
    h.feed.switch_feed(FeedType::ForYou);
    settle(&mut h.feed);
    assert!(h.feed.snapshot().error.is_some());

    h.feed_service.script(
        FeedType::ForYou,
        1,
        Ok(FeedPage {
            items: vec![mock_video(1), mock_video(2)],
            page: 1,
            has_more: false,
        }),
    );
    assert!(h.feed.retry());
    settle(&mut h.feed);

    assert!(h.feed.snapshot().error.is_none());
    assert_eq!(h.feed.items().len(), 2);
    assert!(!h.feed.retry());
}

#[test]
fn profile_shows_user_videos_without_paging() {
    let mut h = started(FeedType::ForYou);
    h.feed_service
        .set_profile("alice", vec![mock_video(1), mock_video(2), mock_video(3)]);

    h.feed.open_profile("@alice");
    settle(&mut h.feed);

    assert_eq!(
        h.feed.query().source,
        FeedSource::Profile("alice".to_string())
    );
    assert_eq!(h.feed.items().len(), 3);
    assert!(!h.feed.snapshot().has_more);

    let sent = h.feed.requests_sent();
    scroll_down(&mut h.feed, 2);
    assert_eq!(h.feed.requests_sent(), sent);
}

#[test]
fn comments_load_and_new_comments_are_prepended() {
    let mut h = started(FeedType::ForYou);
    let video = h.feed.current().expect("current").id.clone();
    h.comments.set_comments(
        &video,
        vec![Comment {
            id: 77,
            text: "first".into(),
            ..Comment::default()
        }],
    );

    h.feed.open_comments();
    settle(&mut h.feed);
    assert!(drain(&h.events).contains(&FeedEvent::CommentsLoaded { count: 1 }));

    assert!(h.feed.post_comment("   ").is_err());
    assert!(h.feed.post_comment("nice clip").is_ok());
    settle(&mut h.feed);

    let snapshot = h.feed.snapshot();
    let thread = snapshot.comments.expect("open thread");
    assert_eq!(thread.comments.len(), 2);
    assert_eq!(thread.comments[0].text, "nice clip");
    assert_eq!(snapshot.current().map(|item| item.counts.comments), Some(3));
}

#[test]
fn moving_the_cursor_closes_comments() {
    let mut h = started(FeedType::ForYou);
    h.feed.open_comments();
    settle(&mut h.feed);
    assert!(h.feed.snapshot().comments.is_some());

    scroll_down(&mut h.feed, 1);
    assert!(h.feed.snapshot().comments.is_none());
}

#[test]
fn autoplay_off_leaves_the_next_item_paused() {
    let mut h = started(FeedType::ForYou);
    assert!(!h.feed.toggle_autoplay());
    assert!(!h.feed.snapshot().autoplay);

    scroll_down(&mut h.feed, 1);
    settle(&mut h.feed);
    assert_eq!(h.feed.playback_state_of(1), PlaybackState::Paused);

    h.feed.toggle_playback();
    settle(&mut h.feed);
    assert_eq!(h.feed.playback_state_of(1), PlaybackState::Playing);
}
