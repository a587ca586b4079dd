//! `MediaBackend` driving a single long-lived mpv process over its JSON IPC
//! socket. Commands are written to the socket; a reader thread turns mpv's
//! events and observed properties into `MediaEvent`s for the current ticket.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::MediaError;
use crate::playback::{MediaBackend, MediaEvent, MediaEventKind, MediaTicket};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const CONNECT_RETRY: Duration = Duration::from_millis(50);

const OBSERVE_TIME_POS: u64 = 1;
const OBSERVE_DURATION: u64 = 2;
const OBSERVE_PAUSE: u64 = 3;

#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub mpv_path: String,
    pub user_agent: String,
}

impl Default for MpvOptions {
    fn default() -> Self {
        Self {
            mpv_path: "mpv".into(),
            user_agent: format!("shortfeed/{}", crate::VERSION),
        }
    }
}

/// State shared with the reader thread.
#[derive(Default)]
struct Shared {
    ticket: AtomicU64,
    /// Set between releasing or loading a file and mpv starting the file of
    /// the current ticket. Nothing is reported while it is set.
    switching: AtomicBool,
}

#[cfg(unix)]
struct MpvSession {
    child: Child,
    writer: UnixStream,
    ipc_path: String,
}

#[cfg(not(unix))]
struct MpvSession {
    child: Child,
}

pub struct MpvBackend {
    options: MpvOptions,
    events: Sender<MediaEvent>,
    shared: Arc<Shared>,
    session: Option<MpvSession>,
}

impl MpvBackend {
    /// The player process is started lazily by the first `load`.
    pub fn new(options: MpvOptions, events: Sender<MediaEvent>) -> Self {
        Self {
            options,
            events,
            shared: Arc::new(Shared::default()),
            session: None,
        }
    }

    fn send(&mut self, command: Value) -> Result<(), MediaError> {
        let session = self.ensure_session()?;
        write_command(session, &command)
    }

    /// Sends `command` tagged with `request_id`; mpv echoes the id in its reply.
    fn send_request(&mut self, command: Value, request_id: u64) -> Result<(), MediaError> {
        let session = self.ensure_session()?;
        write_payload(
            session,
            &json!({ "command": command, "request_id": request_id }),
        )
    }

    fn ensure_session(&mut self) -> Result<&mut MpvSession, MediaError> {
        let alive = match self.session.as_mut() {
            Some(session) => matches!(session.child.try_wait(), Ok(None)),
            None => false,
        };
        if !alive {
            if let Some(stale) = self.session.take() {
                tracing::warn!("mpv exited, restarting");
                shutdown(stale);
            }
            let session = self.spawn()?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| MediaError::Unavailable("mpv session missing".into()))
    }

    #[cfg(unix)]
    fn spawn(&self) -> Result<MpvSession, MediaError> {
        let ipc_path = unique_ipc_path();
        if let Err(err) = fs::remove_file(&ipc_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %ipc_path, error = %err, "failed to remove stale mpv socket");
            }
        }

        let mut command = Command::new(&self.options.mpv_path);
        command
            .args(player_args(&self.options.user_agent))
            .arg(format!("--input-ipc-server={ipc_path}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = command.spawn().map_err(|err| {
            MediaError::Unavailable(format!("launch {}: {err}", self.options.mpv_path))
        })?;
        tracing::info!(pid = child.id(), ipc = %ipc_path, "mpv started");

        let stream = match connect(&ipc_path) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };
        let reader = stream
            .try_clone()
            .map_err(|err| MediaError::Unavailable(format!("clone mpv socket: {err}")))?;
        let events = self.events.clone();
        let shared = self.shared.clone();
        thread::spawn(move || read_events(reader, events, shared));

        let mut session = MpvSession {
            child,
            writer: stream,
            ipc_path,
        };
        for (id, property) in [
            (OBSERVE_TIME_POS, "time-pos"),
            (OBSERVE_DURATION, "duration"),
            (OBSERVE_PAUSE, "pause"),
        ] {
            write_command(&mut session, &json!(["observe_property", id, property]))?;
        }
        Ok(session)
    }

    #[cfg(not(unix))]
    fn spawn(&self) -> Result<MpvSession, MediaError> {
        Err(MediaError::Unavailable(
            "mpv control is only supported on unix platforms".into(),
        ))
    }

    fn check_ticket(&self, ticket: MediaTicket) -> bool {
        self.shared.ticket.load(Ordering::SeqCst) == ticket.0
    }
}

impl MediaBackend for MpvBackend {
    fn load(&mut self, ticket: MediaTicket, source: &str, muted: bool) -> Result<(), MediaError> {
        if source.trim().is_empty() {
            return Err(MediaError::MissingSource);
        }
        self.ensure_session()?;
        self.shared.switching.store(true, Ordering::SeqCst);
        self.shared.ticket.store(ticket.0, Ordering::SeqCst);
        self.send(json!(["set_property", "pause", true]))?;
        self.send(json!(["set_property", "mute", muted]))?;
        self.send_request(json!(["loadfile", source, "replace"]), ticket.0)?;
        tracing::debug!(ticket = ticket.0, source, "mpv loadfile");
        Ok(())
    }

    fn play(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        if !self.check_ticket(ticket) {
            return Ok(());
        }
        self.send(json!(["set_property", "pause", false]))
    }

    fn pause(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        if !self.check_ticket(ticket) {
            return Ok(());
        }
        self.send(json!(["set_property", "pause", true]))
    }

    fn seek(&mut self, ticket: MediaTicket, position: Duration) -> Result<(), MediaError> {
        if !self.check_ticket(ticket) {
            return Ok(());
        }
        self.send(json!(["seek", position.as_secs_f64(), "absolute"]))
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), MediaError> {
        if self.session.is_none() {
            return Ok(());
        }
        self.send(json!(["set_property", "mute", muted]))
    }

    fn release(&mut self, ticket: MediaTicket) -> Result<(), MediaError> {
        if !self.check_ticket(ticket) || self.session.is_none() {
            return Ok(());
        }
        self.shared.switching.store(true, Ordering::SeqCst);
        self.send(json!(["stop"]))
    }
}

impl Drop for MpvBackend {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = write_command(&mut session, &json!(["quit"]));
            shutdown(session);
        }
    }
}

fn player_args(user_agent: &str) -> Vec<String> {
    vec![
        "--idle=yes".into(),
        "--force-window=yes".into(),
        "--keep-open=no".into(),
        "--really-quiet".into(),
        "--no-config".into(),
        "--ytdl=no".into(),
        "--terminal=no".into(),
        "--input-terminal=no".into(),
        format!("--user-agent={user_agent}"),
    ]
}

fn write_command(session: &mut MpvSession, command: &Value) -> Result<(), MediaError> {
    write_payload(session, &json!({ "command": command }))
}

#[cfg(unix)]
fn write_payload(session: &mut MpvSession, payload: &Value) -> Result<(), MediaError> {
    let mut line = serde_json::to_string(payload)
        .map_err(|err| MediaError::Playback(format!("serialize mpv command: {err}")))?;
    line.push('\n');
    session
        .writer
        .write_all(line.as_bytes())
        .map_err(|err| MediaError::Unavailable(format!("write mpv command: {err}")))
}

#[cfg(not(unix))]
fn write_payload(_session: &mut MpvSession, _payload: &Value) -> Result<(), MediaError> {
    Err(MediaError::Unavailable(
        "mpv control is only supported on unix platforms".into(),
    ))
}

#[cfg(unix)]
fn connect(path: &str) -> Result<UnixStream, MediaError> {
    let deadline = Instant::now() + CONNECT_TIMEOUT;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) if Instant::now() >= deadline => {
                return Err(MediaError::Unavailable(format!(
                    "connect to mpv socket {path}: {err}"
                )));
            }
            Err(_) => thread::sleep(CONNECT_RETRY),
        }
    }
}

fn shutdown(mut session: MpvSession) {
    let _ = session.child.kill();
    let _ = session.child.wait();
    #[cfg(unix)]
    if let Err(err) = fs::remove_file(&session.ipc_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %session.ipc_path, error = %err, "failed to remove mpv socket");
        }
    }
}

#[cfg(unix)]
fn read_events(stream: UnixStream, events: Sender<MediaEvent>, shared: Arc<Shared>) {
    let mut state = ReaderState::default();
    let mut binder = TicketBinder::default();
    for line in BufReader::new(stream).lines().map_while(Result::ok) {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let current = shared.ticket.load(Ordering::SeqCst);
        let kind = state.translate(&message);
        let mut pending = Vec::with_capacity(2);
        if let Some(bound) = binder.observe(&message, current) {
            if bound == current {
                shared.switching.store(false, Ordering::SeqCst);
                // The reply naming the entry can trail the file's own events.
                if message.get("event").is_none() {
                    pending.extend(state.loaded_event());
                }
            }
        }
        pending.extend(kind);
        if shared.switching.load(Ordering::SeqCst) || binder.bound() != Some(current) {
            continue;
        }
        let ticket = MediaTicket(current);
        if pending
            .into_iter()
            .any(|kind| events.send(MediaEvent { ticket, kind }).is_err())
        {
            break;
        }
    }
    tracing::debug!("mpv event reader finished");
}

/// Maps mpv's playlist entries back to tickets. `loadfile` goes out with the
/// ticket as its `request_id`, the reply names the new playlist entry, and
/// `start-file` names the entry that is starting. Either of the last two may
/// arrive first.
#[derive(Debug, Default)]
struct TicketBinder {
    entries: HashMap<u64, u64>,
    unmatched_start: Option<u64>,
    bound: Option<u64>,
}

impl TicketBinder {
    fn bound(&self) -> Option<u64> {
        self.bound
    }

    /// Returns the ticket `message` just bound the playing file to.
    fn observe(&mut self, message: &Value, current: u64) -> Option<u64> {
        match message.get("event").and_then(Value::as_str) {
            Some("start-file") => {
                let Some(entry) = message.get("playlist_entry_id").and_then(Value::as_u64) else {
                    // mpv before 0.33 does not report entry ids.
                    return self.bind(current);
                };
                match self.entries.remove(&entry) {
                    Some(ticket) => self.bind(ticket),
                    None => {
                        self.bound = None;
                        self.unmatched_start = Some(entry);
                        None
                    }
                }
            }
            Some(_) => None,
            None => {
                let ticket = message.get("request_id").and_then(Value::as_u64)?;
                let entry = message
                    .get("data")
                    .and_then(|data| data.get("playlist_entry_id"))
                    .and_then(Value::as_u64)?;
                if self.unmatched_start == Some(entry) {
                    self.bind(ticket)
                } else {
                    self.entries.insert(entry, ticket);
                    None
                }
            }
        }
    }

    fn bind(&mut self, ticket: u64) -> Option<u64> {
        self.unmatched_start = None;
        self.bound = Some(ticket);
        self.entries.retain(|_, pending| *pending > ticket);
        Some(ticket)
    }
}

/// Tracks what mpv has reported about the current file.
#[derive(Debug, Default)]
struct ReaderState {
    duration: Option<f64>,
    loaded: bool,
    announced: bool,
}

impl ReaderState {
    fn translate(&mut self, message: &Value) -> Option<MediaEventKind> {
        match message.get("event").and_then(Value::as_str)? {
            "start-file" => {
                *self = ReaderState::default();
                None
            }
            "file-loaded" => {
                self.loaded = true;
                self.announce()
            }
            "end-file" => {
                let reason = message.get("reason").and_then(Value::as_str).unwrap_or("");
                let was_announced = self.announced;
                *self = ReaderState::default();
                match reason {
                    "eof" if was_announced => Some(MediaEventKind::Ended),
                    "error" => Some(MediaEventKind::Failed(
                        message
                            .get("file_error")
                            .and_then(Value::as_str)
                            .unwrap_or("playback error")
                            .to_string(),
                    )),
                    _ => None,
                }
            }
            "property-change" => self.property_change(message),
            _ => None,
        }
    }

    fn property_change(&mut self, message: &Value) -> Option<MediaEventKind> {
        let data = message.get("data");
        match message.get("name").and_then(Value::as_str)? {
            "duration" => {
                self.duration = data.and_then(Value::as_f64).filter(|d| *d > 0.0);
                self.announce()
            }
            "time-pos" if self.announced => {
                let position = data.and_then(Value::as_f64)?.max(0.0);
                let duration = self.duration?;
                Some(MediaEventKind::Progress {
                    position: Duration::from_secs_f64(position.min(duration)),
                    duration: Duration::from_secs_f64(duration),
                })
            }
            "pause" if self.announced => match data.and_then(Value::as_bool)? {
                true => Some(MediaEventKind::Paused),
                false => Some(MediaEventKind::Playing),
            },
            _ => None,
        }
    }

    /// `Loaded` for a file that was already announced.
    fn loaded_event(&self) -> Option<MediaEventKind> {
        if !self.announced {
            return None;
        }
        self.duration.map(|duration| MediaEventKind::Loaded {
            duration: Duration::from_secs_f64(duration),
        })
    }

    /// `Loaded` goes out once both the file and its duration are known.
    fn announce(&mut self) -> Option<MediaEventKind> {
        if self.announced || !self.loaded {
            return None;
        }
        let duration = self.duration?;
        self.announced = true;
        Some(MediaEventKind::Loaded {
            duration: Duration::from_secs_f64(duration),
        })
    }
}

fn unique_ipc_path() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("shortfeed-mpv-{}-{suffix}.sock", std::process::id()));
    path.to_string_lossy().to_string()
}
