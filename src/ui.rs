use std::cell::Cell;
use std::fs;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};
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
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthStr;

use crate::identity::Subscription;
use crate::nav::{Action, Navigator, Point, Tab, Thresholds};
use crate::player;
use crate::session::{self, SessionError, SignOutResult, SignUpResult};
use crate::state::{self, AppState, Comment, CurrentUser, StateError};
use crate::theme::Palette;

const ICON_LIKE: &str = "♥";
const ICON_PREV: &str = "◀";
const ICON_NEXT: &str = "▶";
const INPUT_CURSOR: &str = "▏";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum NoticeKind {
    Info,
    Success,
    Error,
}

#[derive(Clone, PartialEq, Eq, Debug)]
struct Notice {
    kind: NoticeKind,
    text: String,
}

impl Notice {
    fn info<S: Into<String>>(text: S) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    fn success<S: Into<String>>(text: S) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    fn error<S: Into<String>>(text: S) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }

    fn color(&self, palette: &Palette) -> Color {
        match self.kind {
            NoticeKind::Info => palette.text_primary,
            NoticeKind::Success => palette.success,
            NoticeKind::Error => palette.error,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Focus {
    Browse,
    Comment,
    Auth,
    Avatar,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
enum AuthMode {
    #[default]
    Login,
    SignUp,
}

impl AuthMode {
    fn title(self) -> &'static str {
        match self {
            AuthMode::Login => "Log in",
            AuthMode::SignUp => "Sign up",
        }
    }

    fn other(self) -> Self {
        match self {
            AuthMode::Login => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::Login,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
enum AuthField {
    #[default]
    Email,
    Password,
    Username,
    Submit,
    SwitchMode,
}

impl AuthField {
    fn next(self, mode: AuthMode) -> Self {
        match self {
            AuthField::Email => AuthField::Password,
            AuthField::Password => match mode {
                AuthMode::Login => AuthField::Submit,
                AuthMode::SignUp => AuthField::Username,
            },
            AuthField::Username => AuthField::Submit,
            AuthField::Submit => AuthField::SwitchMode,
            AuthField::SwitchMode => AuthField::Email,
        }
    }

    fn previous(self, mode: AuthMode) -> Self {
        match self {
            AuthField::Email => AuthField::SwitchMode,
            AuthField::Password => AuthField::Email,
            AuthField::Username => AuthField::Password,
            AuthField::Submit => match mode {
                AuthMode::Login => AuthField::Password,
                AuthMode::SignUp => AuthField::Username,
            },
            AuthField::SwitchMode => AuthField::Submit,
        }
    }

    fn title(self) -> &'static str {
        match self {
            AuthField::Email => "Email",
            AuthField::Password => "Password",
            AuthField::Username => "Username (optional)",
            AuthField::Submit => "Submit",
            AuthField::SwitchMode => "Switch mode",
        }
    }
}

#[derive(Default)]
struct AuthForm {
    mode: AuthMode,
    active: AuthField,
    email: String,
    password: String,
    username: String,
    message: Option<Notice>,
    pending: bool,
}

impl AuthForm {
    fn fields(&self) -> Vec<AuthField> {
        let mut fields = vec![AuthField::Email, AuthField::Password];
        if self.mode == AuthMode::SignUp {
            fields.push(AuthField::Username);
        }
        fields.push(AuthField::Submit);
        fields.push(AuthField::SwitchMode);
        fields
    }

    fn next(&mut self) {
        self.active = self.active.next(self.mode);
    }

    fn previous(&mut self) {
        self.active = self.active.previous(self.mode);
    }

    fn switch_mode(&mut self) {
        self.mode = self.mode.other();
        self.message = None;
        if self.active == AuthField::Username && self.mode == AuthMode::Login {
            self.active = AuthField::Password;
        }
    }

    fn active_value_mut(&mut self) -> Option<&mut String> {
        match self.active {
            AuthField::Email => Some(&mut self.email),
            AuthField::Password => Some(&mut self.password),
            AuthField::Username => Some(&mut self.username),
            AuthField::Submit | AuthField::SwitchMode => None,
        }
    }

    fn insert_char(&mut self, ch: char) {
        if let Some(value) = self.active_value_mut() {
            value.push(ch);
        }
    }

    fn backspace(&mut self) {
        if let Some(value) = self.active_value_mut() {
            value.pop();
        }
    }

    fn display_value(&self, field: AuthField) -> String {
        match field {
            AuthField::Email => self.email.clone(),
            AuthField::Password => "*".repeat(self.password.chars().count()),
            AuthField::Username => self.username.clone(),
            AuthField::Submit => {
                if self.pending {
                    format!("[ {}… ]", self.mode.title())
                } else {
                    format!("[ {} ]", self.mode.title())
                }
            }
            AuthField::SwitchMode => format!("{} instead", self.mode.other().title()),
        }
    }

    fn clear_secrets(&mut self) {
        self.password.clear();
    }
}

/// Folds wheel notches that arrive close together into one delta.
struct WheelAccumulator {
    total: i32,
    last: Option<Instant>,
    idle: Duration,
}

impl WheelAccumulator {
    fn new(idle: Duration) -> Self {
        Self {
            total: 0,
            last: None,
            idle,
        }
    }

    fn push(&mut self, step: i32, now: Instant) -> i32 {
        let stale = self
            .last
            .is_some_and(|last| now.saturating_duration_since(last) > self.idle);
        if stale || self.total.signum() * step.signum() < 0 {
            self.total = 0;
        }
        self.total += step;
        self.last = Some(now);
        self.total
    }

    fn reset(&mut self) {
        self.total = 0;
        self.last = None;
    }
}

enum AsyncResponse {
    SignIn {
        result: Result<CurrentUser, SessionError>,
    },
    SignUp {
        result: Result<SignUpResult, SessionError>,
    },
    SignOut {
        result: SignOutResult,
    },
    Avatar {
        user_id: String,
        path: PathBuf,
        result: Result<Vec<u8>, String>,
    },
}

pub struct Options {
    pub state: AppState,
    pub sessions: session::Manager,
    pub thresholds: Thresholds,
    pub wheel_idle: Duration,
    pub player_command: Vec<String>,
    pub palette: Palette,
    pub status_message: String,
}

pub struct Model {
    state: AppState,
    nav: Navigator,
    sessions: session::Manager,
    subscription: Option<Subscription>,
    player_command: Vec<String>,
    palette: Palette,
    wheel: WheelAccumulator,
    drag_start: Option<Point>,
    focus: Focus,
    auth_form: AuthForm,
    comment_input: String,
    comment_scroll: usize,
    avatar_input: String,
    avatar_pending: bool,
    avatar_summary: Option<String>,
    status: Notice,
    tab_areas: Cell<[Rect; 2]>,
    video_area: Cell<Rect>,
    like_area: Cell<Rect>,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let subscription = options.sessions.subscribe();
        let restored = options.sessions.restore();
        let mut model = Self {
            state: options.state,
            nav: Navigator::new(options.thresholds),
            sessions: options.sessions,
            subscription: Some(subscription),
            player_command: options.player_command,
            palette: options.palette,
            wheel: WheelAccumulator::new(options.wheel_idle),
            drag_start: None,
            focus: Focus::Browse,
            auth_form: AuthForm::default(),
            comment_input: String::new(),
            comment_scroll: 0,
            avatar_input: String::new(),
            avatar_pending: false,
            avatar_summary: None,
            status: Notice::info(options.status_message),
            tab_areas: Cell::new([Rect::default(); 2]),
            video_area: Cell::new(Rect::default()),
            like_area: Cell::new(Rect::default()),
            needs_redraw: true,
            response_tx,
            response_rx,
        };
        model.set_user(restored);
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        self.shutdown();

        result
    }

    /// Detaches from session notifications.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            if event::poll(tick_rate)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status = Notice::error(format!("Error: {err}"));
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;

        let changes = self
            .subscription
            .as_ref()
            .map(Subscription::drain)
            .unwrap_or_default();
        for change in changes {
            debug!(event = ?change.event, "session change");
            self.set_user(session::user_from_change(&change));
            changed = true;
        }

        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            changed = true;
        }
        changed
    }

    fn handle_response(&mut self, response: AsyncResponse) {
        match response {
            AsyncResponse::SignIn { result } => {
                self.auth_form.pending = false;
                match result {
                    Ok(user) => self.finish_login(user),
                    Err(err) => self.auth_form.message = Some(Notice::error(err.to_string())),
                }
            }
            AsyncResponse::SignUp { result } => {
                self.auth_form.pending = false;
                match result {
                    Ok(SignUpResult::SignedIn(user)) => self.finish_login(user),
                    Ok(SignUpResult::ConfirmationRequired) => {
                        self.auth_form.clear_secrets();
                        self.auth_form.mode = AuthMode::Login;
                        self.auth_form.active = AuthField::Email;
                        self.auth_form.message = Some(Notice::info(session::CONFIRMATION_MESSAGE));
                    }
                    Err(err) => self.auth_form.message = Some(Notice::error(err.to_string())),
                }
            }
            AsyncResponse::SignOut { result } => {
                if let SignOutResult::RemoteFailed(message) = result {
                    self.status = Notice::error(format!(
                        "Signed out locally; remote sign-out failed: {message}"
                    ));
                }
            }
            AsyncResponse::Avatar {
                user_id,
                path,
                result,
            } => {
                self.avatar_pending = false;
                match result {
                    Ok(bytes) => match self.state.set_avatar_for(&user_id, &bytes) {
                        Ok(_) => {
                            self.refresh_avatar_summary();
                            self.status = Notice::success("Avatar updated.");
                        }
                        Err(StateError::NotLoggedIn | StateError::UserChanged) => {
                            debug!(%user_id, "avatar dropped; requesting user logged out");
                            self.status = Notice::info(
                                "Avatar discarded: the account that chose it is no longer logged in.",
                            );
                        }
                        Err(err) => self.status = Notice::error(err.to_string()),
                    },
                    Err(message) => {
                        self.status =
                            Notice::error(format!("Could not read {}: {message}", path.display()));
                    }
                }
            }
        }
    }

    fn finish_login(&mut self, user: CurrentUser) {
        self.status = Notice::success(format!("Logged in as {}.", user.username));
        self.set_user(Some(user));
        self.auth_form = AuthForm::default();
        self.focus = Focus::Browse;
    }

    fn set_user(&mut self, user: Option<CurrentUser>) {
        if user.is_none() && matches!(self.focus, Focus::Comment | Focus::Avatar) {
            self.focus = Focus::Browse;
        }
        self.state.set_current_user(user);
        self.refresh_avatar_summary();
    }

    fn refresh_avatar_summary(&mut self) {
        self.avatar_summary = self
            .state
            .current_user()
            .and_then(|user| self.state.avatar_for(&user.id))
            .map(avatar_summary);
    }

    fn current_video_id(&self) -> Option<String> {
        self.nav
            .current(self.state.catalog())
            .map(|video| video.id.clone())
    }

    fn apply_nav(&mut self, action: Action) {
        if action == Action::None {
            return;
        }
        self.nav.apply(action, self.state.catalog());
        self.comment_scroll = 0;
        self.mark_dirty();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let quit = match self.focus {
            Focus::Browse => self.handle_browse_key(code)?,
            Focus::Comment => {
                self.handle_comment_key(code);
                false
            }
            Focus::Auth => {
                self.handle_auth_key(code);
                false
            }
            Focus::Avatar => {
                self.handle_avatar_key(code);
                false
            }
        };
        self.mark_dirty();
        Ok(quit)
    }

    fn handle_browse_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Tab | KeyCode::BackTab => {
                self.apply_nav(Action::SwitchTab(self.nav.tab().toggled()));
            }
            KeyCode::Char('1') => self.apply_nav(Action::SwitchTab(Tab::Trending)),
            KeyCode::Char('2') => self.apply_nav(Action::SwitchTab(Tab::Your)),
            KeyCode::Left | KeyCode::Char('h') => self.apply_nav(Action::Previous),
            KeyCode::Right | KeyCode::Char('l') => self.apply_nav(Action::Next),
            KeyCode::Down | KeyCode::Char('j') => self.apply_nav(self.nav.scroll_action(true)),
            KeyCode::Up | KeyCode::Char('k') => self.apply_nav(self.nav.scroll_action(false)),
            KeyCode::Char('f') | KeyCode::Char(' ') => self.toggle_like(),
            KeyCode::Char('c') => self.begin_comment(),
            KeyCode::Char('a') => self.open_auth_form(),
            KeyCode::Char('x') => self.sign_out(),
            KeyCode::Char('p') => self.begin_avatar(),
            KeyCode::Char('o') => self.play_current()?,
            KeyCode::PageUp => self.scroll_comments(1),
            KeyCode::PageDown => self.scroll_comments(-1),
            _ => {}
        }
        Ok(false)
    }

    fn handle_comment_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.focus = Focus::Browse,
            KeyCode::Up | KeyCode::PageUp => self.scroll_comments(1),
            KeyCode::Down | KeyCode::PageDown => self.scroll_comments(-1),
            KeyCode::Enter => self.submit_comment(),
            KeyCode::Backspace => {
                self.comment_input.pop();
            }
            KeyCode::Char(ch) => self.comment_input.push(ch),
            _ => {}
        }
    }

    fn handle_auth_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.auth_form.clear_secrets();
                self.auth_form.message = None;
                self.focus = Focus::Browse;
            }
            KeyCode::Tab | KeyCode::Down => self.auth_form.next(),
            KeyCode::BackTab | KeyCode::Up => self.auth_form.previous(),
            KeyCode::Enter => match self.auth_form.active {
                AuthField::Submit => self.submit_auth(),
                AuthField::SwitchMode => self.auth_form.switch_mode(),
                _ => self.auth_form.next(),
            },
            KeyCode::Backspace => self.auth_form.backspace(),
            KeyCode::Char(ch) => self.auth_form.insert_char(ch),
            _ => {}
        }
    }

    fn handle_avatar_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.focus = Focus::Browse,
            KeyCode::Enter => self.submit_avatar(),
            KeyCode::Backspace => {
                self.avatar_input.pop();
            }
            KeyCode::Char(ch) => self.avatar_input.push(ch),
            _ => {}
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent) {
        if self.focus == Focus::Auth || self.focus == Focus::Avatar {
            return;
        }

        let point = Point::new(i32::from(event.column), i32::from(event.row));
        match event.kind {
            MouseEventKind::ScrollDown => self.handle_wheel(1),
            MouseEventKind::ScrollUp => self.handle_wheel(-1),
            MouseEventKind::Down(MouseButton::Left) => self.drag_start = Some(point),
            MouseEventKind::Up(MouseButton::Left) => {
                let Some(start) = self.drag_start.take() else {
                    return;
                };
                let action = self.nav.swipe_action(start, point);
                if action != Action::None {
                    self.apply_nav(action);
                } else if start == point {
                    self.handle_click(event.column, event.row);
                }
            }
            _ => {}
        }
    }

    fn handle_wheel(&mut self, step: i32) {
        let delta = self.wheel.push(step, Instant::now());
        let action = self.nav.wheel_action(delta);
        if action != Action::None {
            self.wheel.reset();
            self.apply_nav(action);
        }
    }

    fn handle_click(&mut self, column: u16, row: u16) {
        let [trending, yours] = self.tab_areas.get();
        if rect_contains(trending, column, row) {
            self.apply_nav(Action::SwitchTab(Tab::Trending));
            return;
        }
        if rect_contains(yours, column, row) {
            self.apply_nav(Action::SwitchTab(Tab::Your));
            return;
        }
        if rect_contains(self.like_area.get(), column, row) {
            self.toggle_like();
            self.mark_dirty();
            return;
        }
        let video = self.video_area.get();
        if rect_contains(video, column, row) {
            let action = self.nav.click_action(
                i32::from(column),
                i32::from(video.x),
                i32::from(video.width),
            );
            self.apply_nav(action);
        }
    }

    fn toggle_like(&mut self) {
        let Some(video_id) = self.current_video_id() else {
            self.status = Notice::info("Nothing to like in this tab.");
            return;
        };
        self.status = match self.state.toggle_like(&video_id) {
            Ok(outcome) if outcome.liked => Notice::success(format!(
                "Liked. {} like{} now.",
                outcome.count,
                plural(outcome.count as usize)
            )),
            Ok(outcome) => Notice::info(format!(
                "Like removed. {} like{} now.",
                outcome.count,
                plural(outcome.count as usize)
            )),
            Err(err) => Notice::error(err.to_string()),
        };
    }

    fn begin_comment(&mut self) {
        if self.state.current_user().is_none() {
            self.status = Notice::error(StateError::NotLoggedIn.to_string());
            return;
        }
        if self.current_video_id().is_none() {
            self.status = Notice::info("Nothing to comment on in this tab.");
            return;
        }
        self.focus = Focus::Comment;
    }

    fn submit_comment(&mut self) {
        let Some(video_id) = self.current_video_id() else {
            self.focus = Focus::Browse;
            return;
        };
        match self.state.add_comment(&video_id, &self.comment_input) {
            Ok(Some(_)) => {
                self.comment_input.clear();
                self.comment_scroll = 0;
                self.focus = Focus::Browse;
                self.status = Notice::success("Comment posted.");
            }
            Ok(None) => {}
            Err(err) => {
                self.focus = Focus::Browse;
                self.status = Notice::error(err.to_string());
            }
        }
    }

    /// Positive steps reveal older comments; the newest one always stays
    /// reachable.
    fn scroll_comments(&mut self, step: isize) {
        let total = self
            .current_video_id()
            .map(|id| self.state.comment_count(&id))
            .unwrap_or(0);
        let max = total.saturating_sub(1);
        self.comment_scroll = self.comment_scroll.saturating_add_signed(step).min(max);
    }

    fn open_auth_form(&mut self) {
        if let Some(user) = self.state.current_user() {
            self.status = Notice::info(format!(
                "Already logged in as {}. Press x to log out.",
                user.username
            ));
            return;
        }
        self.focus = Focus::Auth;
    }

    fn submit_auth(&mut self) {
        if self.auth_form.pending {
            return;
        }
        let email = self.auth_form.email.trim().to_string();
        let password = self.auth_form.password.clone();
        if email.is_empty() || password.is_empty() {
            self.auth_form.message = Some(Notice::error(SessionError::MissingCredentials.to_string()));
            return;
        }

        self.auth_form.pending = true;
        let sessions = self.sessions.clone();
        let tx = self.response_tx.clone();
        match self.auth_form.mode {
            AuthMode::Login => {
                self.auth_form.message = Some(Notice::info("Logging in…"));
                thread::spawn(move || {
                    let result = sessions.sign_in(&email, &password);
                    let _ = tx.send(AsyncResponse::SignIn { result });
                });
            }
            AuthMode::SignUp => {
                self.auth_form.message = Some(Notice::info("Creating account…"));
                let username = self.auth_form.username.clone();
                thread::spawn(move || {
                    let result = sessions.sign_up(&email, &password, &username);
                    let _ = tx.send(AsyncResponse::SignUp { result });
                });
            }
        }
    }

    fn sign_out(&mut self) {
        let Some(user) = self.state.current_user().cloned() else {
            self.status = Notice::info("Not logged in.");
            return;
        };
        let ending = self.sessions.current_session();
        self.set_user(None);
        self.status = Notice::success(format!("Logged out {}.", user.username));

        let Some(ending) = ending else {
            return;
        };
        let sessions = self.sessions.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = sessions.sign_out(&ending);
            let _ = tx.send(AsyncResponse::SignOut { result });
        });
    }

    fn begin_avatar(&mut self) {
        if self.state.current_user().is_none() {
            return;
        }
        self.focus = Focus::Avatar;
    }

    fn submit_avatar(&mut self) {
        let path = self.avatar_input.trim().to_string();
        if path.is_empty() || self.avatar_pending {
            return;
        }
        let Some(user_id) = self.state.current_user().map(|user| user.id.clone()) else {
            self.focus = Focus::Browse;
            return;
        };
        self.avatar_pending = true;
        self.avatar_input.clear();
        self.focus = Focus::Browse;
        self.status = Notice::info(format!("Reading {path}…"));

        let path = expand_home(&path);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = fs::read(&path).map_err(|err| err.to_string());
            let _ = tx.send(AsyncResponse::Avatar {
                user_id,
                path,
                result,
            });
        });
    }

    fn play_current(&mut self) -> Result<()> {
        let Some(video) = self.nav.current(self.state.catalog()).cloned() else {
            self.status = Notice::info("Nothing to play in this tab.");
            return Ok(());
        };
        if let Err(err) = player::launch(&self.player_command, &video) {
            warn!(error = %err, "player launch failed");
            return Err(err);
        }
        self.status = Notice::success(format!("Playing {}.", video.title));
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(
            Block::default().style(Style::default().bg(self.palette.bg)),
            full,
        );

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(full);

        self.draw_header(frame, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(layout[1]);
        self.draw_profile(frame, body[0]);

        let main = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Percentage(45),
                Constraint::Min(6),
            ])
            .split(body[1]);
        self.draw_tabs(frame, main[0]);
        self.draw_video(frame, main[1]);
        self.draw_comments(frame, main[2]);

        let status = Paragraph::new(self.status.text.clone()).style(
            Style::default()
                .fg(self.status.color(&self.palette))
                .bg(self.palette.panel_focused_bg)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status, layout[2]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(self.palette.text_secondary)
                    .bg(self.palette.panel_bg)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[3]);

        match self.focus {
            Focus::Auth => self.draw_auth_form(frame, layout[1]),
            Focus::Avatar => self.draw_avatar_prompt(frame, layout[1]),
            Focus::Browse | Focus::Comment => {}
        }
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let account = match self.state.current_user() {
            Some(user) => match user.email.as_deref() {
                Some(email) => format!("Logged in as {} ({email})", user.username),
                None => format!("Logged in as {}", user.username),
            },
            None => "Not logged in · press a to log in or sign up".to_string(),
        };
        let line = Line::from(vec![
            Span::styled(
                " Reel-TUI ",
                Style::default()
                    .fg(self.palette.bg)
                    .bg(self.palette.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {account}"),
                Style::default()
                    .fg(self.palette.text_primary)
                    .bg(self.palette.panel_bg),
            ),
        ]);
        let mut lines = vec![line];
        pad_lines_to_width(&mut lines, area.width);
        frame.render_widget(Paragraph::new(lines), area);
    }

    fn panel_block(&self, title: String, focused: bool) -> Block<'static> {
        let border = if focused {
            self.palette.border_focused
        } else {
            self.palette.border_idle
        };
        Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(if focused { self.palette.accent } else { self.palette.text_secondary })
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(self.palette.panel_bg))
    }

    fn draw_profile(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.panel_block("Profile".to_string(), false);
        let primary = Style::default().fg(self.palette.text_primary);
        let secondary = Style::default().fg(self.palette.text_secondary);

        let lines = match self.state.current_user() {
            Some(user) => {
                let liked = self
                    .state
                    .user_likes()
                    .get(&user.username)
                    .map(|set| set.len())
                    .unwrap_or(0);
                let comments = self
                    .state
                    .all_comments()
                    .iter()
                    .filter(|comment| comment.author == user.username)
                    .count();
                let avatar = self
                    .avatar_summary
                    .clone()
                    .unwrap_or_else(|| "none".to_string());
                vec![
                    Line::from(Span::styled(
                        user.username.clone(),
                        primary.add_modifier(Modifier::BOLD),
                    )),
                    Line::from(Span::styled(
                        user.email.clone().unwrap_or_default(),
                        secondary,
                    )),
                    Line::from(""),
                    Line::from(Span::styled(format!("Avatar: {avatar}"), secondary)),
                    Line::from(Span::styled(format!("Liked videos: {liked}"), secondary)),
                    Line::from(Span::styled(format!("Comments: {comments}"), secondary)),
                    Line::from(""),
                    Line::from(Span::styled("p  change avatar", secondary)),
                    Line::from(Span::styled("x  log out", secondary)),
                ]
            }
            None => vec![
                Line::from(Span::styled(
                    "Welcome!",
                    primary.add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Log in to like videos and join the conversation.",
                    secondary,
                )),
                Line::from(""),
                Line::from(Span::styled("a  log in / sign up", secondary)),
            ],
        };

        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn draw_tabs(&self, frame: &mut Frame<'_>, area: Rect) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        self.tab_areas.set([halves[0], halves[1]]);

        for (tab, rect) in [Tab::Trending, Tab::Your].into_iter().zip(halves.iter()) {
            let active = self.nav.tab() == tab;
            let count = self.state.catalog().by_category(tab.category()).len();
            let style = if active {
                Style::default()
                    .fg(self.palette.accent)
                    .bg(self.palette.panel_selected_bg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.palette.text_secondary).bg(self.palette.panel_bg)
            };
            let label = Paragraph::new(format!("{} ({count})", tab.title()))
                .alignment(Alignment::Center)
                .style(style)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(if active {
                            self.palette.border_focused
                        } else {
                            self.palette.border_idle
                        })),
                );
            frame.render_widget(label, *rect);
        }
    }

    fn draw_video(&self, frame: &mut Frame<'_>, area: Rect) {
        let filtered = self.nav.filtered(self.state.catalog());
        let title = if filtered.is_empty() {
            self.nav.tab().title().to_string()
        } else {
            format!(
                "{} · {}/{}",
                self.nav.tab().title(),
                self.nav.index() + 1,
                filtered.len()
            )
        };
        let block = self.panel_block(title, self.focus == Focus::Browse);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(video) = self.nav.current(self.state.catalog()) else {
            self.video_area.set(Rect::default());
            self.like_area.set(Rect::default());
            let empty = Paragraph::new("No videos in this tab.")
                .style(Style::default().fg(self.palette.text_secondary))
                .alignment(Alignment::Center);
            frame.render_widget(empty, inner);
            return;
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(inner);
        self.video_area.set(rows[0]);
        self.like_area.set(rows[1]);

        let width = rows[0].width.max(1) as usize;
        let mut lines = vec![
            Line::from(Span::styled(
                video.title.clone(),
                Style::default()
                    .fg(self.palette.text_primary)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];
        lines.extend(wrap_plain(
            &video.description,
            width,
            Style::default().fg(self.palette.text_primary),
        ));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            video.url.clone(),
            Style::default()
                .fg(self.palette.text_secondary)
                .add_modifier(Modifier::UNDERLINED),
        )));
        frame.render_widget(Paragraph::new(lines), rows[0]);

        let count = self.state.like_count(&video.id);
        let logged_in = self.state.current_user().is_some();
        let liked = self.state.is_liked(&video.id);
        let like_style = if !logged_in {
            Style::default().fg(self.palette.text_disabled)
        } else if liked {
            Style::default().fg(self.palette.like).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_primary)
        };
        let mut like_text = format!("{ICON_LIKE} {count} like{}", plural(count as usize));
        if !logged_in {
            like_text.push_str("  (log in to like)");
        } else if liked {
            like_text.push_str("  · you liked this");
        }
        frame.render_widget(Paragraph::new(like_text).style(like_style), rows[1]);

        let hint = Paragraph::new(format!(
            "{ICON_PREV} click left half · click right half {ICON_NEXT}"
        ))
        .style(Style::default().fg(self.palette.text_secondary))
        .alignment(Alignment::Center);
        frame.render_widget(hint, rows[2]);
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, area: Rect) {
        let video_id = self.current_video_id();
        let comments: Vec<&Comment> = video_id
            .as_deref()
            .map(|id| self.state.comments_for(id))
            .unwrap_or_default();
        let skip = self.comment_scroll.min(comments.len().saturating_sub(1));
        let title = if skip > 0 {
            format!("Comments ({}) · {skip} newer hidden", comments.len())
        } else {
            format!("Comments ({})", comments.len())
        };
        let block = self.panel_block(title, self.focus == Focus::Comment);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);

        let width = rows[0].width.max(1) as usize;
        let height = rows[0].height as usize;
        let mut visible = fit_comments(&comments, width, height, skip, &self.palette);
        if visible.is_empty() {
            visible.push(Line::from(Span::styled(
                "No comments yet.",
                Style::default().fg(self.palette.text_secondary),
            )));
        }
        frame.render_widget(Paragraph::new(visible), rows[0]);

        let input = if self.state.current_user().is_none() {
            Line::from(Span::styled(
                "Log in to comment.",
                Style::default().fg(self.palette.text_disabled),
            ))
        } else if self.focus == Focus::Comment {
            Line::from(vec![
                Span::styled("> ", Style::default().fg(self.palette.accent)),
                Span::styled(
                    format!("{}{INPUT_CURSOR}", self.comment_input),
                    Style::default().fg(self.palette.text_primary),
                ),
            ])
        } else if self.comment_input.is_empty() {
            Line::from(Span::styled(
                "Press c to add a comment.",
                Style::default().fg(self.palette.text_secondary),
            ))
        } else {
            Line::from(Span::styled(
                format!("> {}", self.comment_input),
                Style::default().fg(self.palette.text_secondary),
            ))
        };
        let mut input_lines = vec![input];
        let input_bg = if self.focus == Focus::Comment {
            self.palette.panel_focused_bg
        } else {
            self.palette.panel_bg
        };
        for line in &mut input_lines {
            for span in &mut line.spans {
                span.style = span.style.bg(input_bg);
            }
        }
        pad_lines_to_width(&mut input_lines, rows[1].width);
        frame.render_widget(Paragraph::new(input_lines), rows[1]);
    }

    fn draw_auth_form(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup = centered_rect(60, 60, area);
        frame.render_widget(Clear, popup);

        let form = &self.auth_form;
        let mut lines = Vec::new();
        for field in form.fields() {
            let selected = form.active == field;
            let marker = if selected { "›" } else { " " };
            let label_style = if selected {
                Style::default()
                    .fg(self.palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.palette.text_secondary)
            };
            let value_style = if field == AuthField::Submit && form.pending {
                Style::default().fg(self.palette.text_disabled)
            } else {
                Style::default().fg(self.palette.text_primary)
            };
            match field {
                AuthField::Submit | AuthField::SwitchMode => {
                    lines.push(Line::from(vec![
                        Span::styled(format!("{marker} "), label_style),
                        Span::styled(form.display_value(field), value_style),
                    ]));
                }
                _ => {
                    let mut value = form.display_value(field);
                    if selected {
                        value.push_str(INPUT_CURSOR);
                    }
                    lines.push(Line::from(vec![
                        Span::styled(format!("{marker} {}: ", field.title()), label_style),
                        Span::styled(value, value_style),
                    ]));
                }
            }
            lines.push(Line::from(""));
        }
        if let Some(message) = form.message.as_ref() {
            lines.push(Line::from(Span::styled(
                message.text.clone(),
                Style::default().fg(message.color(&self.palette)),
            )));
        }

        let paragraph = Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .title(Span::styled(
                        form.mode.title(),
                        Style::default()
                            .fg(self.palette.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.palette.accent))
                    .style(Style::default().bg(self.palette.panel_bg)),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, popup);
    }

    fn draw_avatar_prompt(&self, frame: &mut Frame<'_>, area: Rect) {
        let popup = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup);
        let lines = vec![
            Line::from(Span::styled(
                "Path to an image file:",
                Style::default().fg(self.palette.text_secondary),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("{}{INPUT_CURSOR}", self.avatar_input),
                Style::default().fg(self.palette.text_primary),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(Span::styled(
                        "Change avatar",
                        Style::default()
                            .fg(self.palette.accent)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.palette.accent))
                    .style(Style::default().bg(self.palette.panel_bg)),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, popup);
    }

    fn footer_text(&self) -> String {
        match self.focus {
            Focus::Browse => {
                let mut parts = vec![
                    "tab/1/2 switch",
                    "h/l prev/next",
                    "j/k scroll tabs",
                    "pgup/pgdn comments",
                    "f like",
                    "c comment",
                    "o play",
                ];
                if self.state.current_user().is_some() {
                    parts.push("p avatar");
                    parts.push("x log out");
                } else {
                    parts.push("a log in");
                }
                parts.push("q quit");
                parts.join(" · ")
            }
            Focus::Comment => "enter post · ↑/↓ older/newer · esc cancel".to_string(),
            Focus::Auth => "tab next field · enter select · esc close".to_string(),
            Focus::Avatar => "enter load · esc cancel".to_string(),
        }
    }
}

fn comment_lines(comment: &Comment, width: usize, palette: &Palette) -> Vec<Line<'static>> {
    let timestamp = comment
        .created_at
        .with_timezone(&Local)
        .format("%b %d %H:%M");
    let mut lines = vec![Line::from(vec![
        Span::styled(
            comment.author.clone(),
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" · {timestamp}"),
            Style::default().fg(palette.text_secondary),
        ),
    ])];
    lines.extend(wrap_with_prefixes(
        &comment.text,
        width,
        "  ",
        "  ",
        Style::default().fg(palette.text_primary),
    ));
    lines
}

/// Lines for the newest comments that fit in `height`, after hiding the
/// `skip` newest ones.
fn fit_comments(
    comments: &[&Comment],
    width: usize,
    height: usize,
    skip: usize,
    palette: &Palette,
) -> Vec<Line<'static>> {
    let mut visible: Vec<Line<'static>> = Vec::new();
    for comment in comments.iter().rev().skip(skip) {
        let mut lines = comment_lines(comment, width, palette);
        if !visible.is_empty() && visible.len() + lines.len() > height {
            break;
        }
        lines.append(&mut visible);
        visible = lines;
    }
    visible
}

fn avatar_summary(data_url: &str) -> String {
    let Some((mime, bytes)) = state::decode_data_url(data_url) else {
        return "unreadable".to_string();
    };
    match image::load_from_memory(&bytes) {
        Ok(img) => format!("{mime}, {}×{}", img.width(), img.height()),
        Err(_) => format!("{mime}, {} bytes", bytes.len()),
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn rect_contains(rect: Rect, column: u16, row: u16) -> bool {
    rect.width > 0
        && rect.height > 0
        && column >= rect.x
        && column < rect.x.saturating_add(rect.width)
        && row >= rect.y
        && row < rect.y.saturating_add(rect.height)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

fn wrap_with_prefixes(
    text: &str,
    width: usize,
    first_prefix: &str,
    rest_prefix: &str,
    style: Style,
) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(String::new(), style))];
    }

    let min_width = first_prefix
        .chars()
        .count()
        .max(rest_prefix.chars().count())
        .saturating_add(1);
    let wrap_width = width.max(min_width);
    let options = WrapOptions::new(wrap_width)
        .break_words(true)
        .initial_indent(first_prefix)
        .subsequent_indent(rest_prefix);

    wrap(text, options)
        .into_iter()
        .map(|cow| Line::from(Span::styled(cow.into_owned(), style)))
        .collect()
}

fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_with_prefixes(text, width, "", "", style)
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let current_width: usize = line
            .spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum();
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}
