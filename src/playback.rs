//! Per-item playback lifecycle over a single media player.
//!
//! The coordinator owns the only `MediaBackend`. Each activation is tagged
//! with a fresh `MediaTicket`; the backend stamps every event with the ticket
//! it was issued for, and events carrying an older ticket are discarded.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::error::MediaError;
use crate::model::VideoItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MediaTicket(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    Loaded { duration: Duration },
    Playing,
    Paused,
    Progress { position: Duration, duration: Duration },
    Ended,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub ticket: MediaTicket,
    pub kind: MediaEventKind,
}

/// A media player. Commands return once they are issued; their outcome is
/// reported later as a `MediaEvent` for the same ticket.
pub trait MediaBackend: Send {
    fn load(&mut self, ticket: MediaTicket, source: &str, muted: bool) -> Result<(), MediaError>;
    fn play(&mut self, ticket: MediaTicket) -> Result<(), MediaError>;
    fn pause(&mut self, ticket: MediaTicket) -> Result<(), MediaError>;
    fn seek(&mut self, ticket: MediaTicket, position: Duration) -> Result<(), MediaError>;
    fn set_muted(&mut self, muted: bool) -> Result<(), MediaError>;
    fn release(&mut self, ticket: MediaTicket) -> Result<(), MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Errored,
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Ended => "ended",
            PlaybackState::Errored => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSignal {
    /// The item at `index` played to the end.
    Completed { index: usize },
    Failed { index: usize, error: MediaError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub position: Duration,
    pub duration: Option<Duration>,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        match self.duration {
            Some(total) if !total.is_zero() => {
                (self.position.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Play,
    Pause,
}

#[derive(Debug)]
struct Activation {
    index: usize,
    ticket: MediaTicket,
    state: PlaybackState,
    progress: Progress,
    in_flight: Option<Transport>,
    queued: Option<Transport>,
    /// Play/pause intent recorded while the item is still loading.
    intent: Option<Transport>,
    source: Option<String>,
}

pub struct PlaybackCoordinator {
    backend: Box<dyn MediaBackend>,
    active: Option<Activation>,
    next_ticket: u64,
    autoplay: bool,
    muted: bool,
}

impl PlaybackCoordinator {
    pub fn new(backend: Box<dyn MediaBackend>, autoplay: bool, muted: bool) -> Self {
        Self {
            backend,
            active: None,
            next_ticket: 1,
            autoplay,
            muted,
        }
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.index)
    }

    pub fn current_ticket(&self) -> Option<MediaTicket> {
        self.active.as_ref().map(|active| active.ticket)
    }

    pub fn state(&self) -> PlaybackState {
        self.active
            .as_ref()
            .map(|active| active.state)
            .unwrap_or_default()
    }

    /// Every item other than the active one is idle.
    pub fn state_of(&self, index: usize) -> PlaybackState {
        match &self.active {
            Some(active) if active.index == index => active.state,
            _ => PlaybackState::Idle,
        }
    }

    pub fn progress(&self) -> Progress {
        self.active
            .as_ref()
            .map(|active| active.progress)
            .unwrap_or_default()
    }

    /// Hands the player to the item at `index`. The outgoing item is released
    /// before the new one is loaded.
    pub fn activate(&mut self, index: usize, item: &VideoItem) -> Option<PlaybackSignal> {
        if let Some(active) = &self.active {
            if active.index == index && active.state != PlaybackState::Errored {
                return None;
            }
        }
        self.deactivate();

        let ticket = MediaTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let mut activation = Activation {
            index,
            ticket,
            state: PlaybackState::Loading,
            progress: Progress::default(),
            in_flight: None,
            queued: None,
            intent: None,
            source: item.media_url.clone(),
        };
        let outcome = match item.media_url.as_deref() {
            Some(source) => self.backend.load(ticket, source, self.muted),
            None => Err(MediaError::MissingSource),
        };
        let signal = match outcome {
            Ok(()) => {
                tracing::debug!(index, ticket = ticket.0, "loading item");
                None
            }
            Err(error) => {
                tracing::warn!(index, error = %error, "could not load item");
                activation.state = PlaybackState::Errored;
                Some(PlaybackSignal::Failed { index, error })
            }
        };
        self.active = Some(activation);
        signal
    }

    pub fn deactivate(&mut self) {
        if let Some(previous) = self.active.take() {
            if let Err(err) = self.backend.release(previous.ticket) {
                tracing::warn!(index = previous.index, error = %err, "release failed");
            }
        }
    }

    pub fn play(&mut self) {
        self.request(Transport::Play);
    }

    pub fn pause(&mut self) {
        self.request(Transport::Pause);
    }

    pub fn toggle(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let playing = match active.queued.or(active.in_flight).or(active.intent) {
            Some(pending) => pending == Transport::Play,
            None => match active.state {
                PlaybackState::Playing => true,
                PlaybackState::Loading => self.autoplay,
                _ => false,
            },
        };
        if playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if self.active.is_some() {
            if let Err(err) = self.backend.set_muted(muted) {
                tracing::warn!(error = %err, "mute failed");
            }
        }
    }

    pub fn toggle_mute(&mut self) {
        self.set_muted(!self.muted);
    }

    /// Jumps to `position`, clamped to the item's duration. Ignored until the
    /// duration is known.
    pub fn seek(&mut self, position: Duration) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Some(duration) = active.progress.duration else {
            return false;
        };
        let target = position.min(duration);
        if let Err(err) = self.backend.seek(active.ticket, target) {
            tracing::warn!(error = %err, "seek failed");
            return false;
        }
        active.progress.position = target;
        true
    }

    pub fn seek_fraction(&mut self, fraction: f64) -> bool {
        let Some(duration) = self.progress().duration else {
            return false;
        };
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.seek(duration.mul_f64(fraction))
    }

    pub fn seek_relative(&mut self, delta: Duration, forward: bool) -> bool {
        let position = self.progress().position;
        let target = if forward {
            position.saturating_add(delta)
        } else {
            position.saturating_sub(delta)
        };
        self.seek(target)
    }

    /// Applies a backend event. Events for any ticket but the current one are
    /// dropped.
    pub fn handle_event(&mut self, event: MediaEvent) -> Option<PlaybackSignal> {
        let autoplay = self.autoplay;
        let active = self.active.as_mut()?;
        if active.ticket != event.ticket {
            tracing::debug!(ticket = event.ticket.0, "dropping stale media event");
            return None;
        }
        if active.state == PlaybackState::Errored {
            return None;
        }
        match event.kind {
            MediaEventKind::Loaded { duration } => {
                if active.state != PlaybackState::Loading {
                    return None;
                }
                active.progress.duration = Some(duration);
                let wants_play = match active.intent.take() {
                    Some(intent) => intent == Transport::Play,
                    None => autoplay,
                };
                if wants_play {
                    self.issue(Transport::Play);
                } else if let Some(active) = self.active.as_mut() {
                    active.state = PlaybackState::Paused;
                }
                None
            }
            MediaEventKind::Playing => {
                active.state = PlaybackState::Playing;
                self.confirm(Transport::Play);
                None
            }
            MediaEventKind::Paused => {
                if active.state != PlaybackState::Loading {
                    active.state = PlaybackState::Paused;
                }
                self.confirm(Transport::Pause);
                None
            }
            MediaEventKind::Progress { position, duration } => {
                if matches!(active.state, PlaybackState::Playing | PlaybackState::Paused) {
                    active.progress.duration = Some(duration);
                    active.progress.position = position.min(duration);
                }
                None
            }
            MediaEventKind::Ended => {
                active.state = PlaybackState::Ended;
                active.progress.position = Duration::ZERO;
                active.in_flight = None;
                active.queued = None;
                tracing::debug!(index = active.index, "item ended");
                Some(PlaybackSignal::Completed {
                    index: active.index,
                })
            }
            MediaEventKind::Failed(reason) => {
                tracing::warn!(index = active.index, reason = %reason, "playback failed");
                active.state = PlaybackState::Errored;
                active.in_flight = None;
                active.queued = None;
                Some(PlaybackSignal::Failed {
                    index: active.index,
                    error: MediaError::Playback(reason),
                })
            }
        }
    }

    fn request(&mut self, command: Transport) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active.state {
            PlaybackState::Idle | PlaybackState::Errored => {}
            PlaybackState::Ended => {
                if command == Transport::Play {
                    self.replay();
                }
            }
            PlaybackState::Loading if active.in_flight.is_none() => {
                active.intent = Some(command);
            }
            _ if active.in_flight.is_some() => {
                active.queued = Some(command);
            }
            _ => self.issue(command),
        }
    }

    /// Restarts an ended item with a fresh load under a new ticket. The player
    /// may already have dropped the finished file.
    fn replay(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(source) = active.source.clone() else {
            return;
        };
        if let Err(err) = self.backend.release(active.ticket) {
            tracing::warn!(index = active.index, error = %err, "release failed");
        }
        let ticket = MediaTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        active.ticket = ticket;
        active.state = PlaybackState::Loading;
        active.progress = Progress::default();
        active.in_flight = None;
        active.queued = None;
        active.intent = Some(Transport::Play);
        match self.backend.load(ticket, &source, self.muted) {
            Ok(()) => tracing::debug!(index = active.index, ticket = ticket.0, "replaying item"),
            Err(err) => {
                tracing::warn!(index = active.index, error = %err, "could not reload item");
                active.state = PlaybackState::Errored;
            }
        }
    }

    fn confirm(&mut self, confirmed: Transport) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.in_flight == Some(confirmed) {
            active.in_flight = None;
        }
        if active.in_flight.is_none() {
            if let Some(next) = active.queued.take() {
                self.issue(next);
            }
        }
    }

    fn issue(&mut self, command: Transport) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let already = match command {
            Transport::Play => active.state == PlaybackState::Playing,
            Transport::Pause => active.state == PlaybackState::Paused,
        };
        if already {
            return;
        }
        let ticket = active.ticket;
        let result = match command {
            Transport::Play => self.backend.play(ticket),
            Transport::Pause => self.backend.pause(ticket),
        };
        match result {
            Ok(()) => active.in_flight = Some(command),
            Err(err) => {
                tracing::warn!(index = active.index, error = %err, "transport command failed");
                active.state = PlaybackState::Errored;
                active.in_flight = None;
                active.queued = None;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Load {
        ticket: MediaTicket,
        source: String,
        muted: bool,
    },
    Play(MediaTicket),
    Pause(MediaTicket),
    Seek(MediaTicket, Duration),
    SetMuted(bool),
    Release(MediaTicket),
}

/// Backend that records every command. With an event sender attached it
/// also confirms commands the way a real player would: `load` reports
/// `Loaded`, `play` reports `Playing` and `pause` reports `Paused`.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<MediaCall>>>,
    events: Option<Sender<MediaEvent>>,
    duration: Duration,
    failing_sources: Arc<Mutex<Vec<String>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Sender<MediaEvent>, duration: Duration) -> Self {
        Self {
            events: Some(events),
            duration,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_source(&self, source: &str) {
        self.failing_sources.lock().push(source.to_string());
    }

    fn emit(&self, ticket: MediaTicket, kind: MediaEventKind) {
        if let Some(events) = &self.events {
            let _ = events.send(MediaEvent { ticket, kind });
        }
    }
}

impl MediaBackend for RecordingBackend {
    fn load(&mut self, ticket: MediaTicket, source: &str, muted: bool) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::Load {
            ticket,
            source: source.to_string(),
            muted,
        });
        if self.failing_sources.lock().iter().any(|s| s == source) {
            return Err(MediaError::Unavailable(source.to_string()));
        }
        self.emit(
            ticket,
            MediaEventKind::Loaded {
                duration: self.duration,
            },
        );
        Ok(())
    }

    fn play(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::Play(ticket));
        self.emit(ticket, MediaEventKind::Playing);
        Ok(())
    }

    fn pause(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::Pause(ticket));
        self.emit(ticket, MediaEventKind::Paused);
        Ok(())
    }

    fn seek(&mut self, ticket: MediaTicket, position: Duration) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::Seek(ticket, position));
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::SetMuted(muted));
        Ok(())
    }

    fn release(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        self.calls.lock().push(MediaCall::Release(ticket));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock_video;

    const CLIP: Duration = Duration::from_secs(30);

    fn coordinator(autoplay: bool) -> (PlaybackCoordinator, RecordingBackend) {
        let backend = RecordingBackend::new();
        let coordinator = PlaybackCoordinator::new(Box::new(backend.clone()), autoplay, false);
        (coordinator, backend)
    }

    fn event(ticket: MediaTicket, kind: MediaEventKind) -> MediaEvent {
        MediaEvent { ticket, kind }
    }

    fn loaded(coordinator: &mut PlaybackCoordinator) {
        let ticket = coordinator.current_ticket().unwrap();
        coordinator.handle_event(event(ticket, MediaEventKind::Loaded { duration: CLIP }));
    }

    #[test]
    fn autoplay_plays_once_loaded() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        assert_eq!(playback.state_of(0), PlaybackState::Loading);
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        assert!(backend.calls().contains(&MediaCall::Play(ticket)));
        playback.handle_event(event(ticket, MediaEventKind::Playing));
        assert_eq!(playback.state(), PlaybackState::Playing);
    }

    #[test]
    fn without_autoplay_loaded_item_waits_paused() {
        let (mut playback, backend) = coordinator(false);
        playback.activate(0, &mock_video(1));
        loaded(&mut playback);
        assert_eq!(playback.state(), PlaybackState::Paused);
        assert!(!backend
            .calls()
            .iter()
            .any(|call| matches!(call, MediaCall::Play(_))));
        playback.toggle();
        let ticket = playback.current_ticket().unwrap();
        assert_eq!(backend.calls().last(), Some(&MediaCall::Play(ticket)));
    }

    #[test]
    fn previous_item_is_released_before_next_loads() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        let first = playback.current_ticket().unwrap();
        loaded(&mut playback);
        playback.handle_event(event(first, MediaEventKind::Playing));
        backend.clear();

        playback.activate(1, &mock_video(2));
        let calls = backend.calls();
        assert_eq!(calls[0], MediaCall::Release(first));
        assert!(matches!(calls[1], MediaCall::Load { .. }));
        assert_eq!(playback.state_of(0), PlaybackState::Idle);
        assert_eq!(playback.state_of(1), PlaybackState::Loading);
    }

    #[test]
    fn late_events_for_old_tickets_are_dropped() {
        let (mut playback, _) = coordinator(true);
        playback.activate(0, &mock_video(1));
        let stale = playback.current_ticket().unwrap();
        playback.activate(1, &mock_video(2));
        playback.handle_event(event(stale, MediaEventKind::Playing));
        assert_eq!(playback.state_of(1), PlaybackState::Loading);
        assert_eq!(playback.state_of(0), PlaybackState::Idle);
    }

    #[test]
    fn transport_commands_are_serialised() {
        let (mut playback, backend) = coordinator(false);
        playback.activate(0, &mock_video(1));
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        backend.clear();

        playback.play();
        playback.pause();
        playback.play();
        assert_eq!(backend.calls(), vec![MediaCall::Play(ticket)]);

        playback.handle_event(event(ticket, MediaEventKind::Playing));
        assert_eq!(playback.state(), PlaybackState::Playing);
        assert_eq!(backend.calls(), vec![MediaCall::Play(ticket)]);
    }

    #[test]
    fn queued_pause_is_sent_after_play_confirms() {
        let (mut playback, backend) = coordinator(false);
        playback.activate(0, &mock_video(1));
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        backend.clear();

        playback.play();
        playback.pause();
        playback.handle_event(event(ticket, MediaEventKind::Playing));
        assert_eq!(
            backend.calls(),
            vec![MediaCall::Play(ticket), MediaCall::Pause(ticket)]
        );
    }

    #[test]
    fn ended_resets_progress_and_signals_completion() {
        let (mut playback, _) = coordinator(true);
        playback.activate(3, &mock_video(1));
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        playback.handle_event(event(ticket, MediaEventKind::Playing));
        playback.handle_event(event(
            ticket,
            MediaEventKind::Progress {
                position: Duration::from_secs(29),
                duration: CLIP,
            },
        ));
        let signal = playback.handle_event(event(ticket, MediaEventKind::Ended));
        assert_eq!(signal, Some(PlaybackSignal::Completed { index: 3 }));
        assert_eq!(playback.progress().position, Duration::ZERO);
        assert_eq!(playback.state(), PlaybackState::Ended);
    }

    #[test]
    fn seeking_clamps_to_duration() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        assert!(!playback.seek(Duration::from_secs(5)));
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        playback.handle_event(event(ticket, MediaEventKind::Playing));

        assert!(playback.seek(Duration::from_secs(90)));
        assert_eq!(playback.progress().position, CLIP);
        assert!(playback.seek_fraction(0.5));
        assert_eq!(playback.progress().position, Duration::from_secs(15));
        assert!(playback.seek_relative(Duration::from_secs(20), false));
        assert_eq!(playback.progress().position, Duration::ZERO);
        assert_eq!(
            backend.calls().last(),
            Some(&MediaCall::Seek(ticket, Duration::ZERO))
        );
    }

    #[test]
    fn seek_is_accepted_while_play_is_in_flight() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        loaded(&mut playback);
        let ticket = playback.current_ticket().unwrap();
        assert_eq!(playback.state(), PlaybackState::Loading);

        assert!(playback.seek(Duration::from_secs(10)));
        assert_eq!(playback.progress().position, Duration::from_secs(10));
        assert_eq!(
            backend.calls().last(),
            Some(&MediaCall::Seek(ticket, Duration::from_secs(10)))
        );
    }

    #[test]
    fn play_after_end_reloads_under_a_new_ticket() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        let first = playback.current_ticket().unwrap();
        loaded(&mut playback);
        playback.handle_event(event(first, MediaEventKind::Playing));
        playback.handle_event(event(first, MediaEventKind::Ended));
        backend.clear();

        playback.toggle();
        let second = playback.current_ticket().unwrap();
        assert_ne!(first, second);
        assert_eq!(playback.state(), PlaybackState::Loading);
        let calls = backend.calls();
        assert_eq!(calls[0], MediaCall::Release(first));
        assert!(matches!(calls[1], MediaCall::Load { ticket, .. } if ticket == second));

        loaded(&mut playback);
        assert_eq!(backend.calls().last(), Some(&MediaCall::Play(second)));
        playback.handle_event(event(second, MediaEventKind::Playing));
        assert_eq!(playback.state(), PlaybackState::Playing);

        playback.pause();
        assert_eq!(backend.calls().last(), Some(&MediaCall::Pause(second)));
    }

    #[test]
    fn missing_source_errors_and_revisit_reloads() {
        let (mut playback, backend) = coordinator(true);
        let mut item = mock_video(1);
        item.media_url = None;
        let signal = playback.activate(0, &item);
        assert!(matches!(
            signal,
            Some(PlaybackSignal::Failed {
                error: MediaError::MissingSource,
                ..
            })
        ));
        assert_eq!(playback.state(), PlaybackState::Errored);
        playback.play();
        assert!(backend.calls().is_empty());

        playback.activate(0, &mock_video(1));
        assert_eq!(playback.state(), PlaybackState::Loading);
    }

    #[test]
    fn mute_persists_across_items() {
        let (mut playback, backend) = coordinator(true);
        playback.activate(0, &mock_video(1));
        playback.toggle_mute();
        playback.activate(1, &mock_video(2));
        assert!(backend.calls().iter().any(|call| matches!(
            call,
            MediaCall::Load { muted: true, .. }
        )));
        assert!(playback.muted());
    }
}
