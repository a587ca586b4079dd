use std::cell::Cell;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossbeam_channel::Receiver;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use unicode_width::UnicodeWidthStr;

use crate::feed::{Feed, FeedEvent, FeedSnapshot};
use crate::interaction::{InteractionAction, Toggle, MAX_COMMENT_CHARS};
use crate::model::{format_count, Comment, FeedSource, FeedType, VideoItem};
use crate::navigation::{NavKey, ScrollOrigin, WheelEvent};
use crate::playback::{PlaybackState, Progress};
use crate::session::Session;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Wheel delta reported for one terminal scroll notch. Terminals only report
/// notches, so every notch is treated as a full gesture.
const SCROLL_NOTCH_DELTA: f64 = 100.0;

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Focus {
    Feed,
    Comments,
    Compose,
}

pub struct Options {
    pub feed: Feed,
    pub session: Arc<Session>,
    pub initial_feed: FeedType,
    pub config_path: String,
}

pub struct Model {
    feed: Feed,
    events: Receiver<FeedEvent>,
    session: Arc<Session>,
    initial_feed: FeedType,
    status_message: String,
    config_path: String,
    spinner: Spinner,
    needs_redraw: bool,
    focus: Focus,
    compose: String,
    selected_comment: usize,
    comments_area: Cell<Option<Rect>>,
    progress_area: Cell<Option<Rect>>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let events = options.feed.events();
        let status_message = if options.session.is_logged_in() {
            "Loading feed…".to_string()
        } else {
            "Browsing signed out. Set api.token to like, follow and comment.".to_string()
        };
        Self {
            feed: options.feed,
            events,
            session: options.session,
            initial_feed: options.initial_feed,
            status_message,
            config_path: options.config_path,
            spinner: Spinner::new(),
            needs_redraw: true,
            focus: Focus::Feed,
            compose: String::new(),
            selected_comment: 0,
            comments_area: Cell::new(None),
            progress_area: Cell::new(None),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.feed.switch_feed(self.initial_feed);
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            self.pump();

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if self.handle_key(key.code) {
                            break;
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            self.pump();

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                let snapshot = self.feed.snapshot();
                let busy = snapshot.loading || snapshot.playback == PlaybackState::Loading;
                let playing = snapshot.playback == PlaybackState::Playing;
                if busy {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
                if playing {
                    self.mark_dirty();
                }
            }
        }

        Ok(())
    }

    fn pump(&mut self) {
        if self.feed.poll_async() {
            self.mark_dirty();
        }
        while let Ok(event) = self.events.try_recv() {
            self.handle_feed_event(event);
            self.mark_dirty();
        }
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::CursorChanged(_) => {
                self.selected_comment = 0;
                if self.focus != Focus::Feed {
                    self.focus = Focus::Feed;
                    self.compose.clear();
                }
            }
            FeedEvent::QueryChanged(query) => {
                self.status_message = format!("Loading {}…", query.source.label());
            }
            FeedEvent::PageLoaded { page, total, .. } => {
                self.status_message = format!(
                    "{} · page {page} · {total} videos",
                    self.feed.query().source.label()
                );
            }
            FeedEvent::LoadFailed(err) => {
                self.status_message = format!("Failed to load videos: {err}. Press r to retry.");
            }
            FeedEvent::PlaybackChanged { .. } | FeedEvent::PlaybackEnded { .. } => {}
            FeedEvent::MediaFailed { error, .. } => {
                self.status_message = format!("Video unavailable: {error}");
            }
            FeedEvent::InteractionFailed(failure) => {
                self.status_message = match failure.action {
                    InteractionAction::LoadComments => {
                        format!("Could not load comments: {}", failure.error)
                    }
                    action => format!("Could not {}: {}", action.label(), failure.error),
                };
            }
            FeedEvent::CommentsLoaded { count } => {
                self.status_message = format!("{count} comments");
            }
            FeedEvent::CommentPosted(_) => {
                self.status_message = "Comment posted.".to_string();
            }
            FeedEvent::SessionExpired => {
                self.session.invalidate();
                self.status_message =
                    "Session expired. Update api.token in your config to sign in again."
                        .to_string();
            }
        }
    }

    /// Returns `true` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        self.mark_dirty();
        match self.focus {
            Focus::Compose => {
                self.handle_compose_key(code);
                false
            }
            Focus::Comments => self.handle_comments_key(code),
            Focus::Feed => self.handle_feed_key(code),
        }
    }

    fn handle_feed_key(&mut self, code: KeyCode) -> bool {
        let now = Instant::now();
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') => {
                self.feed.handle_key(NavKey::ArrowDown, now);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.feed.handle_key(NavKey::ArrowUp, now);
            }
            KeyCode::Char(' ') => self.feed.toggle_playback(),
            KeyCode::Char('m') => self.feed.toggle_mute(),
            KeyCode::Char('a') => {
                let on = self.feed.toggle_autoplay();
                self.status_message = format!("Autoplay {}.", if on { "on" } else { "off" });
            }
            KeyCode::Left => {
                self.feed.seek_step(false);
            }
            KeyCode::Right => {
                self.feed.seek_step(true);
            }
            KeyCode::Char('l') => {
                if self.require_login("like videos") {
                    let toggle = self.feed.toggle_like();
                    self.report_toggle(toggle);
                }
            }
            KeyCode::Char('f') => {
                if self.require_login("follow creators") {
                    let toggle = self.feed.toggle_follow();
                    self.report_toggle(toggle);
                }
            }
            KeyCode::Char('c') => {
                if self.feed.current().is_some() {
                    self.feed.open_comments();
                    self.focus = Focus::Comments;
                    self.selected_comment = 0;
                    self.status_message = "Loading comments…".to_string();
                }
            }
            KeyCode::Char('p') => {
                let nickname = self
                    .feed
                    .current()
                    .map(|item| item.author.nickname.clone())
                    .filter(|nickname| !nickname.is_empty());
                if let Some(nickname) = nickname {
                    self.feed.open_profile(&nickname);
                }
            }
            KeyCode::Tab => {
                let next = match &self.feed.query().source {
                    FeedSource::Feed(kind) => kind.toggled(),
                    FeedSource::Profile(_) => self.initial_feed,
                };
                self.feed.switch_feed(next);
            }
            KeyCode::Char('r') => {
                if self.feed.retry() {
                    self.status_message = "Retrying…".to_string();
                }
            }
            _ => {}
        }
        false
    }

    fn handle_comments_key(&mut self, code: KeyCode) -> bool {
        let count = self
            .feed
            .snapshot()
            .comments
            .map(|thread| thread.comments.len())
            .unwrap_or(0);
        match code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc | KeyCode::Char('c') => {
                self.feed.close_comments();
                self.focus = Focus::Feed;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_comment + 1 < count {
                    self.selected_comment += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_comment = self.selected_comment.saturating_sub(1);
            }
            KeyCode::Char('l') => {
                let comment_id = self.feed.snapshot().comments.and_then(|thread| {
                    thread
                        .comments
                        .get(self.selected_comment)
                        .map(|comment| comment.id)
                });
                if let Some(comment_id) = comment_id {
                    if self.require_login("like comments") {
                        let toggle = self.feed.toggle_comment_like(comment_id);
                        self.report_toggle(toggle);
                    }
                }
            }
            KeyCode::Char('i') | KeyCode::Enter => {
                if self.require_login("comment") {
                    self.focus = Focus::Compose;
                    self.status_message =
                        "Type your comment. Enter to send, Esc to cancel.".to_string();
                }
            }
            KeyCode::Char(' ') => self.feed.toggle_playback(),
            _ => {}
        }
        false
    }

    fn handle_compose_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.compose.clear();
                self.focus = Focus::Comments;
            }
            KeyCode::Enter => match self.feed.post_comment(&self.compose) {
                Ok(Toggle::Sent) => {
                    self.compose.clear();
                    self.focus = Focus::Comments;
                    self.status_message = "Posting comment…".to_string();
                }
                Ok(Toggle::Ignored) => {
                    self.status_message = "Still posting your last comment.".to_string();
                }
                Err(err) => {
                    self.status_message = err.to_string();
                }
            },
            KeyCode::Backspace => {
                self.compose.pop();
            }
            KeyCode::Char(ch) => {
                if self.compose.chars().count() < MAX_COMMENT_CHARS {
                    self.compose.push(ch);
                }
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        let origin = self.scroll_origin(event.column, event.row);
        let delta_y = match event.kind {
            MouseEventKind::ScrollDown => SCROLL_NOTCH_DELTA,
            MouseEventKind::ScrollUp => -SCROLL_NOTCH_DELTA,
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(area) = self.progress_area.get() {
                    if let Some(fraction) = click_fraction(area, event.column, event.row) {
                        self.feed.seek_fraction(fraction);
                        self.mark_dirty();
                    }
                }
                return;
            }
            _ => return,
        };
        if origin == ScrollOrigin::Comments {
            if delta_y > 0.0 {
                self.selected_comment = self.selected_comment.saturating_add(1);
            } else {
                self.selected_comment = self.selected_comment.saturating_sub(1);
            }
        }
        self.feed
            .handle_wheel(WheelEvent { delta_y, origin }, Instant::now());
        self.mark_dirty();
    }

    fn scroll_origin(&self, column: u16, row: u16) -> ScrollOrigin {
        match self.comments_area.get() {
            Some(area) if rect_contains(area, column, row) => ScrollOrigin::Comments,
            _ => ScrollOrigin::Feed,
        }
    }

    fn require_login(&mut self, action: &str) -> bool {
        match self.session.require() {
            Ok(_) => true,
            Err(err) => {
                self.status_message = format!("Sign in to {action} ({err}).");
                false
            }
        }
    }

    fn report_toggle(&mut self, toggle: Toggle) {
        if toggle == Toggle::Ignored {
            self.status_message = "Still waiting for the last request.".to_string();
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let snapshot = self.feed.snapshot();
        let status_text = if snapshot.loading || snapshot.playback == PlaybackState::Loading {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let show_comments = snapshot.comments.is_some();
        let constraints = if show_comments {
            [Constraint::Percentage(55), Constraint::Percentage(45)]
        } else {
            [Constraint::Percentage(100), Constraint::Percentage(0)]
        };
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(layout[1]);

        self.draw_video(frame, main[0], &snapshot);
        if show_comments {
            self.comments_area.set(Some(main[1]));
            self.draw_comments(frame, main[1], &snapshot);
        } else {
            self.comments_area.set(None);
        }

        let footer = Paragraph::new(footer_text(self.focus))
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[2]);
    }

    fn draw_video(&self, frame: &mut Frame<'_>, area: Rect, snapshot: &FeedSnapshot<'_>) {
        let title = format!(
            " {} · {}/{}{} ",
            snapshot.query.source.label(),
            (snapshot.cursor + 1).min(snapshot.items.len().max(1)),
            snapshot.items.len(),
            if snapshot.has_more { "+" } else { "" }
        );
        let block = pane_block(title, self.focus == Focus::Feed);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);
        let width = sections[0].width.max(1) as usize;

        let mut lines = match snapshot.current() {
            Some(item) => video_lines(item, snapshot, width),
            None => placeholder_lines(snapshot, &self.config_path),
        };
        pad_lines_to_width(&mut lines, sections[0].width);
        frame.render_widget(
            Paragraph::new(lines).style(Style::default().bg(COLOR_PANEL_BG)),
            sections[0],
        );

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(COLOR_ACCENT).bg(COLOR_PANEL_FOCUSED_BG))
            .ratio(snapshot.progress.fraction())
            .label(progress_label(snapshot.playback, snapshot.progress, snapshot.muted));
        self.progress_area.set(Some(sections[1]));
        frame.render_widget(gauge, sections[1]);
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, area: Rect, snapshot: &FeedSnapshot<'_>) {
        let Some(thread) = snapshot.comments else {
            return;
        };
        let focused = matches!(self.focus, Focus::Comments | Focus::Compose);
        let block = pane_block(" Comments ".to_string(), focused);
        let inner = block.inner(area);
        let width = inner.width.max(1) as usize;
        let now = Utc::now();

        let mut items: Vec<ListItem> = Vec::with_capacity(thread.comments.len() + 1);
        if self.focus == Focus::Compose {
            let style = Style::default().fg(COLOR_ACCENT).bg(COLOR_PANEL_FOCUSED_BG);
            let mut lines = wrap_plain(&format!("> {}▏", self.compose), width, style);
            pad_lines_to_width(&mut lines, inner.width);
            items.push(ListItem::new(lines));
        }
        if thread.loading {
            items.push(ListItem::new(Line::from(Span::styled(
                "Loading…",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))));
        } else if let Some(err) = &thread.error {
            items.push(ListItem::new(Line::from(Span::styled(
                err.to_string(),
                Style::default().fg(COLOR_ERROR),
            ))));
        } else if thread.comments.is_empty() {
            items.push(ListItem::new(Line::from(Span::styled(
                "No comments yet.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))));
        }

        let selected = self
            .selected_comment
            .min(thread.comments.len().saturating_sub(1));
        let visible_rows = inner.height as usize;
        let mut used = 0usize;
        for (index, comment) in thread.comments.iter().enumerate().skip(selected.saturating_sub(2)) {
            let highlight = focused && index == selected;
            let background = if highlight {
                COLOR_PANEL_SELECTED_BG
            } else {
                COLOR_PANEL_BG
            };
            let mut lines = comment_lines(comment, width, now, background);
            lines.push(Line::from(Span::styled(
                String::new(),
                Style::default().bg(background),
            )));
            pad_lines_to_width(&mut lines, inner.width);
            used += lines.len();
            items.push(ListItem::new(lines));
            if used >= visible_rows {
                break;
            }
        }

        frame.render_widget(List::new(items).block(block), area);
    }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        COLOR_BORDER_FOCUSED
    } else {
        COLOR_BORDER_IDLE
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(Span::styled(
            title,
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        ))
        .padding(Padding::horizontal(1))
        .style(Style::default().bg(COLOR_PANEL_BG))
}

fn video_lines(item: &VideoItem, snapshot: &FeedSnapshot<'_>, width: usize) -> Vec<Line<'static>> {
    let primary = Style::default().fg(COLOR_TEXT_PRIMARY).bg(COLOR_PANEL_BG);
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG);
    let mut lines = Vec::new();

    let mut header = vec![Span::styled(
        format!("@{}", item.author.label()),
        primary.add_modifier(Modifier::BOLD),
    )];
    if !item.author.display_name.is_empty() && item.author.display_name != item.author.nickname {
        header.push(Span::styled(format!("  {}", item.author.display_name), secondary));
    }
    if item.author.is_followed {
        header.push(Span::styled("  ✓ following", Style::default().fg(COLOR_SUCCESS)));
    }
    lines.push(Line::from(header));
    lines.push(Line::from(Span::styled(String::new(), primary)));

    if !item.description.trim().is_empty() {
        lines.extend(wrap_plain(item.description.trim(), width, primary));
        lines.push(Line::from(Span::styled(String::new(), primary)));
    }
    if let Some(music) = item.music.as_deref().filter(|music| !music.trim().is_empty()) {
        lines.extend(wrap_plain(&format!("♫ {}", music.trim()), width, secondary));
    }

    let like_style = if item.is_liked {
        Style::default().fg(COLOR_ERROR).bg(COLOR_PANEL_BG)
    } else {
        secondary
    };
    lines.push(Line::from(vec![
        Span::styled(
            format!(
                "{} {}",
                if item.is_liked { "♥" } else { "♡" },
                format_count(item.counts.likes)
            ),
            like_style,
        ),
        Span::styled(
            format!("   💬 {}", format_count(item.counts.comments)),
            secondary,
        ),
        Span::styled(format!("   ▶ {}", format_count(item.counts.views)), secondary),
    ]));

    if snapshot.playback == PlaybackState::Errored {
        lines.push(Line::from(Span::styled(
            "This video can't be played. Move on with j/k.",
            Style::default().fg(COLOR_ERROR).bg(COLOR_PANEL_BG),
        )));
    }
    if let Some(err) = snapshot.error {
        lines.push(Line::from(Span::styled(
            format!("More videos failed to load: {err} (r to retry)"),
            Style::default().fg(COLOR_ERROR).bg(COLOR_PANEL_BG),
        )));
    }
    lines
}

fn placeholder_lines(snapshot: &FeedSnapshot<'_>, config_path: &str) -> Vec<Line<'static>> {
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG);
    let message = if snapshot.loading {
        "Loading videos…".to_string()
    } else if let Some(err) = snapshot.error {
        format!("Couldn't load videos: {err}\nPress r to retry.")
    } else if snapshot.items.is_empty() {
        format!("Nothing to watch here yet.\nConfig: {config_path}")
    } else {
        "You're all caught up.".to_string()
    };
    message
        .lines()
        .map(|line| Line::from(Span::styled(line.to_string(), secondary)))
        .collect()
}

fn comment_lines(
    comment: &Comment,
    width: usize,
    now: chrono::DateTime<Utc>,
    background: Color,
) -> Vec<Line<'static>> {
    let meta = Style::default().fg(COLOR_ACCENT).bg(background);
    let body = Style::default().fg(COLOR_TEXT_PRIMARY).bg(background);
    let age = comment.age_label(now);
    let likes = format!(
        "{} {}",
        if comment.is_liked { "♥" } else { "♡" },
        format_count(comment.likes_count)
    );
    let mut lines = vec![Line::from(vec![
        Span::styled(format!("@{}", comment.author.label()), meta.add_modifier(Modifier::BOLD)),
        Span::styled(
            if age.is_empty() {
                format!("  {likes}")
            } else {
                format!("  {age} · {likes}")
            },
            meta,
        ),
    ])];
    lines.extend(wrap_plain(&comment.text, width, body));
    lines
}

fn progress_label(state: PlaybackState, progress: Progress, muted: bool) -> String {
    let mut label = match progress.duration {
        Some(duration) => format!(
            "{} {} / {}",
            state.label(),
            format_clock(progress.position),
            format_clock(duration)
        ),
        None => state.label().to_string(),
    };
    if muted {
        label.push_str(" · muted");
    }
    label
}

fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn footer_text(focus: Focus) -> &'static str {
    match focus {
        Focus::Feed => {
            "j/k next/prev · space play/pause · ←/→ seek · m mute · a autoplay · l like · f follow · c comments · p profile · Tab switch feed · r retry · q quit"
        }
        Focus::Comments => "j/k select · l like · i write · c/Esc close · q quit",
        Focus::Compose => "Enter send · Esc cancel",
    }
}

fn rect_contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

fn click_fraction(area: Rect, column: u16, row: u16) -> Option<f64> {
    if area.width == 0 || !rect_contains(area, column, row) {
        return None;
    }
    Some(f64::from(column - area.x) / f64::from(area.width.saturating_sub(1).max(1)))
}

fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        if paragraph.trim().is_empty() {
            lines.push(Line::from(Span::styled(String::new(), style)));
            continue;
        }
        for chunk in wrap(paragraph, width) {
            lines.push(Line::from(Span::styled(chunk.into_owned(), style)));
        }
    }
    lines
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let mut current_width = 0usize;
        for span in &line.spans {
            current_width =
                current_width.saturating_add(UnicodeWidthStr::width(span.content.as_ref()));
        }
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}
