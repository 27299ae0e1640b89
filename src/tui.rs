use std::{
    io::{self, Stdout},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context as _, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode as TermKey, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, info, warn};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
    Frame, Terminal,
};
use time::OffsetDateTime;
use transmission_dashboard::{
    command::{Command, FilterRequest, PromptKind},
    config::AppConfig,
    dispatch::{contexts_for, Dispatcher, Feed},
    keymap::{Context, Key, KeyCode},
    model::{format_bytes, format_eta, format_progress, format_speed, Entity, EntityKind, Value},
    rpc::TransmissionClient,
    source::{poll_once, DaemonSource, RemoteAction},
    sync::SyncReport,
    workspace::{lock, Effect, ListView, Notice, Severity, SharedWorkspace, Workspace},
};

type Backend = ratatui::backend::CrosstermBackend<Stdout>;

pub fn run(config: AppConfig) -> Result<()> {
    let AppConfig {
        rpc,
        poll_interval,
        views,
        chain_timeout,
        keymap,
        ..
    } = config;
    let connection_label = rpc.endpoint();
    let client =
        TransmissionClient::new(rpc).context("failed to construct Transmission RPC client")?;
    let mut workspace = Workspace::new(views);
    workspace.attach(client.kinds())?;
    let workspace: SharedWorkspace = Arc::new(Mutex::new(workspace));

    let mut terminal = setup_terminal()?;
    let (event_tx, event_rx) = unbounded();
    let (worker_tx, worker_rx) = unbounded();

    let input_handle = spawn_input_thread(event_tx.clone());
    let worker_handle = spawn_worker(
        client,
        Arc::clone(&workspace),
        worker_rx,
        event_tx.clone(),
        poll_interval,
    );

    let mut app = App::new(
        connection_label,
        workspace,
        Dispatcher::new(keymap, chain_timeout),
    );
    app.set_status(Notice::new(Severity::Info, "Connecting to transmission…"));
    if worker_tx.send(WorkerCommand::Refresh).is_err() {
        app.set_status(Notice::new(
            Severity::Error,
            "RPC worker not available; shutting down",
        ));
    }

    let loop_result = run_loop(&mut terminal, &mut app, event_rx, worker_tx.clone());

    drop(worker_tx);
    drop(event_tx);

    restore_terminal(&mut terminal)?;
    input_handle.join().ok();
    worker_handle.join().ok();

    loop_result
}

fn run_loop(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    events: Receiver<AppEvent>,
    worker_tx: Sender<WorkerCommand>,
) -> Result<()> {
    draw(terminal, app)?;
    loop {
        let event = match events.recv() {
            Ok(event) => event,
            Err(_) => break,
        };
        app.process_event(event, &worker_tx);
        if app.should_quit {
            break;
        }
        draw(terminal, app)?;
    }
    Ok(())
}

fn draw(terminal: &mut Terminal<Backend>, app: &mut App) -> Result<()> {
    let screen = app.screen();
    terminal.draw(|f| app.render(f, &screen))?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(tx: Sender<AppEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let tick_rate = Duration::from_millis(250);
        loop {
            let event = match event::poll(tick_rate) {
                Ok(true) => match event::read() {
                    Ok(evt) => AppEvent::Input(evt),
                    Err(err) => {
                        AppEvent::Status(Notice::new(Severity::Error, format!("Input error: {err}")))
                    }
                },
                Ok(false) | Err(_) => AppEvent::Tick,
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    })
}

fn spawn_worker(
    client: TransmissionClient,
    workspace: SharedWorkspace,
    rx: Receiver<WorkerCommand>,
    tx: Sender<AppEvent>,
    poll_interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || worker_loop(client, workspace, rx, tx, poll_interval))
}

/// Polls the daemon on a fixed interval and on request. Each poll lands in the
/// workspace before the UI is told to redraw.
fn worker_loop(
    client: TransmissionClient,
    workspace: SharedWorkspace,
    rx: Receiver<WorkerCommand>,
    tx: Sender<AppEvent>,
    poll_interval: Duration,
) {
    let version = client.daemon_version().map_err(|err| err.to_string());
    if tx.send(AppEvent::Connected(version)).is_err() {
        return;
    }
    let poll_enabled = poll_interval > Duration::ZERO;
    if !poll_enabled {
        while let Ok(cmd) = rx.recv() {
            handle_command(&client, &workspace, cmd, &tx);
        }
        return;
    }
    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(cmd) => handle_command(&client, &workspace, cmd, &tx),
            Err(RecvTimeoutError::Timeout) => sync(&client, &workspace, &tx),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_command<S: DaemonSource>(
    source: &S,
    workspace: &SharedWorkspace,
    cmd: WorkerCommand,
    tx: &Sender<AppEvent>,
) {
    match cmd {
        WorkerCommand::Refresh => sync(source, workspace, tx),
        WorkerCommand::Perform(action) => {
            info!("requesting {action}");
            let result = source.perform(&action).map_err(|err| err.to_string());
            let succeeded = result.is_ok();
            let _ = tx.send(AppEvent::Performed { action, result });
            if succeeded {
                sync(source, workspace, tx);
            }
        }
    }
}

fn sync<S: DaemonSource>(source: &S, workspace: &SharedWorkspace, tx: &Sender<AppEvent>) {
    let result = poll_once(source, workspace).map_err(|err| {
        warn!("poll failed: {err}");
        err.to_string()
    });
    let _ = tx.send(AppEvent::Synced(result));
}

enum WorkerCommand {
    Refresh,
    Perform(RemoteAction),
}

enum AppEvent {
    Input(Event),
    Tick,
    Connected(Result<String, String>),
    Synced(Result<SyncReport, String>),
    Performed {
        action: RemoteAction,
        result: Result<(), String>,
    },
    Status(Notice),
}

#[derive(Clone)]
struct StatusMessage {
    text: String,
    severity: Severity,
    expires_at: Instant,
}

impl StatusMessage {
    fn from_notice(notice: Notice) -> Self {
        let duration = match notice.severity {
            Severity::Info => Duration::from_secs(4),
            Severity::Success => Duration::from_secs(5),
            Severity::Warning => Duration::from_secs(6),
            Severity::Error => Duration::from_secs(8),
        };
        Self {
            text: notice.text,
            severity: notice.severity,
            expires_at: Instant::now() + duration,
        }
    }
}

/// What one frame shows, copied out of the workspace under a single lock.
struct Screen {
    view: Option<ListView>,
    tabs: Vec<String>,
    focused_tab: usize,
    torrents: usize,
    rate_down: f64,
    rate_up: f64,
}

struct App {
    workspace: SharedWorkspace,
    dispatcher: Dispatcher,
    connection_label: String,
    version: Option<String>,
    table_state: TableState,
    status: Option<StatusMessage>,
    toast: Option<StatusMessage>,
    mode: InputMode,
    should_quit: bool,
    pending_manual_refresh: bool,
    synced_once: bool,
}

impl App {
    fn new(connection_label: String, workspace: SharedWorkspace, dispatcher: Dispatcher) -> Self {
        Self {
            workspace,
            dispatcher,
            connection_label,
            version: None,
            table_state: TableState::default(),
            status: None,
            toast: None,
            mode: InputMode::Normal,
            should_quit: false,
            pending_manual_refresh: false,
            synced_once: false,
        }
    }

    fn screen(&self) -> Screen {
        let mut ws = lock(&self.workspace);
        let view = ws.current_view();
        let tabs = ws.tabs().labels().into_iter().map(str::to_string).collect();
        let focused_tab = ws.tabs().focused_index();
        let registry = ws.registry();
        let torrents = registry.len(EntityKind::Torrent);
        let (rate_down, rate_up) = registry
            .iter(EntityKind::Torrent)
            .fold((0.0, 0.0), |(down, up), torrent| {
                (
                    down + torrent.number("rate-down").unwrap_or(0.0),
                    up + torrent.number("rate-up").unwrap_or(0.0),
                )
            });
        Screen {
            view,
            tabs,
            focused_tab,
            torrents,
            rate_down,
            rate_up,
        }
    }

    fn render(&mut self, frame: &mut Frame, screen: &Screen) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(frame.size());
        self.render_header(frame, chunks[0], screen);
        render_tabs(frame, chunks[1], screen);
        self.render_body(frame, chunks[2], screen);
        self.render_footer(frame, chunks[3], screen);
        self.render_toast(frame);
        match &self.mode {
            InputMode::Prompt(prompt) => {
                let area = centered_rect(60, 20, frame.size());
                let block = Block::default()
                    .title(Span::raw(format!(" {} ", prompt.title())))
                    .borders(Borders::ALL);
                let text = vec![
                    Line::from(prompt.hint()),
                    Line::from(format!("{}{}", prompt.sigil(), prompt.buffer)),
                ];
                let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
                frame.render_widget(Clear, area);
                frame.render_widget(paragraph, area);
            }
            InputMode::Confirm(confirm) => {
                let area = centered_rect(50, 30, frame.size());
                let block = Block::default().title(" Confirm ").borders(Borders::ALL);
                let text = vec![
                    Line::from(confirm.message.clone()),
                    Line::from(Span::styled(
                        "Press y to confirm, n or Esc to cancel",
                        Style::default().fg(Color::Yellow),
                    )),
                ];
                let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
                frame.render_widget(Clear, area);
                frame.render_widget(paragraph, area);
            }
            InputMode::Help { scroll } => {
                let area = centered_rect(70, 80, frame.size());
                let block = Block::default().title(" Key Bindings ").borders(Borders::ALL);
                let paragraph = Paragraph::new(help_lines(&self.dispatcher))
                    .block(block)
                    .scroll((*scroll, 0));
                frame.render_widget(Clear, area);
                frame.render_widget(paragraph, area);
            }
            InputMode::Normal => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, screen: &Screen) {
        let mut lines = vec![Line::from(vec![
            Span::styled(
                "Transmission",
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  |  "),
            Span::raw(&self.connection_label),
            Span::raw("  |  "),
            Span::raw(format!(
                "DL {}  UL {}  Torrents {}  Version {}",
                format_speed(screen.rate_down),
                format_speed(screen.rate_up),
                screen.torrents,
                self.version.as_deref().unwrap_or("?"),
            )),
        ])];
        if let Some(status) = &self.status {
            lines.push(Line::from(Span::styled(
                status.text.clone(),
                status_style(status.severity),
            )));
        }
        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::raw(" Session ")),
        );
        frame.render_widget(paragraph, area);
    }

    fn render_body(&mut self, frame: &mut Frame, area: Rect, screen: &Screen) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(area);
        match &screen.view {
            Some(view) => {
                self.render_list(frame, chunks[0], view);
                render_detail(frame, chunks[1], view);
            }
            None => {
                let paragraph = Paragraph::new("No list in this tab")
                    .block(Block::default().borders(Borders::ALL));
                frame.render_widget(paragraph, area);
            }
        }
    }

    fn render_list(&mut self, frame: &mut Frame, area: Rect, view: &ListView) {
        let columns = columns_for(view.kind);
        let header = Row::new(columns.iter().map(|column| column.title))
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows = view.rows.iter().map(|entity| {
            Row::new(
                columns
                    .iter()
                    .map(|column| Cell::from(column.render(entity))),
            )
        });
        let widths = columns.iter().map(|column| column.width);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Span::raw(format!(" {} ({}) ", view.title, view.rows.len())));
        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .highlight_style(Style::default().fg(Color::Yellow))
            .highlight_symbol("> ");
        self.table_state.select(view.focus);
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect, screen: &Screen) {
        let mode_label = match &self.mode {
            InputMode::Normal => "NORMAL",
            InputMode::Prompt(_) => "PROMPT",
            InputMode::Confirm(_) => "CONFIRM",
            InputMode::Help { .. } => "HELP",
        };
        let (sort, filter) = match &screen.view {
            Some(view) => (
                if view.sort.is_empty() {
                    "(unsorted)".to_string()
                } else {
                    view.sort.clone()
                },
                if view.filters.is_empty() {
                    "(no filter)".to_string()
                } else {
                    view.filters.join(" & ")
                },
            ),
            None => (String::new(), String::new()),
        };
        let mut summary = format!("Mode {mode_label} | Sort {sort} | Filter {filter}");
        let pending = self.dispatcher.pending();
        if !pending.is_empty() {
            let keys: Vec<String> = pending.iter().map(ToString::to_string).collect();
            summary.push_str(&format!(" | Keys {} …", keys.join(" ")));
        }
        let sections = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(14)])
            .split(area);
        let left = Paragraph::new(Line::from(summary)).wrap(Wrap { trim: true });
        frame.render_widget(left, sections[0]);
        let help_label =
            Paragraph::new(Line::from(Span::raw("Help [?]"))).alignment(Alignment::Right);
        frame.render_widget(help_label, sections[1]);
    }

    fn render_toast(&self, frame: &mut Frame) {
        if !matches!(self.mode, InputMode::Normal) {
            return;
        }
        let Some(toast) = &self.toast else {
            return;
        };
        let frame_area = frame.size();
        if frame_area.width < 20 || frame_area.height < 5 {
            return;
        }
        let padding = 2;
        let max_width = frame_area.width.saturating_sub(padding * 2);
        let width = max_width.clamp(20, 60);
        let height = 3;
        let x = frame_area
            .x
            .saturating_add(frame_area.width.saturating_sub(width + padding));
        let y = frame_area
            .y
            .saturating_add(frame_area.height.saturating_sub(height + padding));
        let area = Rect::new(x, y, width, height);
        let text = Line::from(Span::styled(
            toast.text.clone(),
            status_style(toast.severity),
        ));
        let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::raw(" Notice ")),
        );
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }

    fn process_event(&mut self, event: AppEvent, worker_tx: &Sender<WorkerCommand>) {
        match event {
            AppEvent::Input(event) => self.handle_input(event, worker_tx),
            AppEvent::Tick => {
                self.dispatcher.tick(Instant::now());
                self.expire_status();
            }
            AppEvent::Connected(Ok(version)) => {
                info!("connected to transmission {version}");
                self.version = Some(version);
            }
            AppEvent::Connected(Err(err)) => {
                self.set_status(Notice::new(Severity::Error, format!("RPC error: {err}")));
            }
            AppEvent::Synced(result) => self.apply_sync(result),
            AppEvent::Performed { action, result } => match result {
                Ok(()) => self.set_status(Notice::new(Severity::Success, format!("Requested {action}"))),
                Err(err) => self.set_status(Notice::new(
                    Severity::Error,
                    format!("Failed to {action}: {err}"),
                )),
            },
            AppEvent::Status(notice) => self.set_status(notice),
        }
    }

    fn handle_input(&mut self, event: Event, worker_tx: &Sender<WorkerCommand>) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == TermKey::Char('c') {
                    self.should_quit = true;
                    return;
                }
                match std::mem::replace(&mut self.mode, InputMode::Normal) {
                    InputMode::Normal => self.handle_normal_key(key, worker_tx),
                    InputMode::Prompt(prompt) => self.handle_prompt_key(prompt, key, worker_tx),
                    InputMode::Confirm(confirm) => match key.code {
                        TermKey::Char('y') | TermKey::Enter => {
                            self.set_status(Notice::new(
                                Severity::Info,
                                format!("Requesting {}…", confirm.action),
                            ));
                            self.send(worker_tx, WorkerCommand::Perform(confirm.action));
                        }
                        TermKey::Char('n') | TermKey::Esc => {
                            self.set_status(Notice::new(Severity::Info, "Removal cancelled"));
                        }
                        _ => self.mode = InputMode::Confirm(confirm),
                    },
                    InputMode::Help { scroll } => match key.code {
                        TermKey::Char('?') | TermKey::Esc | TermKey::Enter | TermKey::Char('q') => {}
                        TermKey::Char('j') | TermKey::Down => {
                            self.mode = InputMode::Help {
                                scroll: scroll.saturating_add(1),
                            }
                        }
                        TermKey::Char('k') | TermKey::Up => {
                            self.mode = InputMode::Help {
                                scroll: scroll.saturating_sub(1),
                            }
                        }
                        _ => self.mode = InputMode::Help { scroll },
                    },
                }
            }
            Event::Paste(data) => {
                if let InputMode::Prompt(prompt) = &mut self.mode {
                    prompt.buffer.push_str(data.trim_end_matches(['\r', '\n']));
                }
            }
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, event: KeyEvent, worker_tx: &Sender<WorkerCommand>) {
        let Some(key) = key_from_event(&event) else {
            return;
        };
        let kind = lock(&self.workspace).current_kind();
        match self.dispatcher.feed(key, &contexts_for(kind), Instant::now()) {
            Feed::Run(command) => self.run_command(&command, worker_tx),
            Feed::Pending | Feed::Cancelled => {}
            Feed::Unbound(key) => debug!("no binding for {key}"),
            Feed::Aborted(keys) => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                self.set_status(Notice::new(
                    Severity::Info,
                    format!("No binding for {}", keys.join(" ")),
                ));
            }
        }
    }

    fn handle_prompt_key(
        &mut self,
        mut prompt: PromptState,
        key: KeyEvent,
        worker_tx: &Sender<WorkerCommand>,
    ) {
        match key.code {
            TermKey::Enter => {
                let text = prompt.buffer.trim();
                if text.is_empty() {
                    return;
                }
                match prompt.kind {
                    PromptKind::Filter => {
                        let command = Command::Filter(FilterRequest::Push(text.to_string()));
                        self.run_command(&command, worker_tx);
                    }
                    PromptKind::Command => match text.parse::<Command>() {
                        Ok(command) => self.run_command(&command, worker_tx),
                        Err(err) => self.set_status(Notice::new(Severity::Error, err.to_string())),
                    },
                }
            }
            TermKey::Esc => {}
            TermKey::Backspace => {
                prompt.buffer.pop();
                self.mode = InputMode::Prompt(prompt);
            }
            TermKey::Char(c) => {
                prompt.buffer.push(c);
                self.mode = InputMode::Prompt(prompt);
            }
            _ => self.mode = InputMode::Prompt(prompt),
        }
    }

    fn run_command(&mut self, command: &Command, worker_tx: &Sender<WorkerCommand>) {
        debug!("running {command}");
        let (outcome, focused) = {
            let mut ws = lock(&self.workspace);
            let outcome = ws.execute(command);
            let focused = match &outcome.effect {
                Effect::Remote(RemoteAction::Remove { .. }) => ws.focused().map(|e| e.label()),
                _ => None,
            };
            (outcome, focused)
        };
        if let Some(notice) = outcome.notice {
            self.set_status(notice);
        }
        match outcome.effect {
            Effect::None => {}
            Effect::Quit => self.should_quit = true,
            Effect::Help => self.mode = InputMode::Help { scroll: 0 },
            Effect::Refresh => self.queue_refresh(worker_tx),
            Effect::Prompt(kind) => self.mode = InputMode::Prompt(PromptState::new(kind)),
            Effect::Remote(action @ RemoteAction::Remove { .. }) => {
                self.mode = InputMode::Confirm(ConfirmState::new(action, focused));
            }
            Effect::Remote(action) => {
                self.set_status(Notice::new(Severity::Info, format!("Requesting {action}…")));
                self.send(worker_tx, WorkerCommand::Perform(action));
            }
        }
    }

    fn send(&mut self, worker_tx: &Sender<WorkerCommand>, cmd: WorkerCommand) {
        if worker_tx.send(cmd).is_err() {
            self.set_status(Notice::new(Severity::Error, "RPC worker not available"));
        }
    }

    fn queue_refresh(&mut self, worker_tx: &Sender<WorkerCommand>) {
        self.pending_manual_refresh = true;
        self.set_status(Notice::new(Severity::Info, "Refreshing…"));
        self.send(worker_tx, WorkerCommand::Refresh);
    }

    fn apply_sync(&mut self, result: Result<SyncReport, String>) {
        match result {
            Ok(report) => {
                if self.pending_manual_refresh || !self.synced_once {
                    let count = lock(&self.workspace).registry().len(EntityKind::Torrent);
                    self.set_status(Notice::new(
                        Severity::Success,
                        format!("Refreshed {count} torrents"),
                    ));
                }
                if let Some(summary) = report.summary() {
                    self.set_status(Notice::new(Severity::Warning, summary));
                }
                self.synced_once = true;
            }
            Err(err) => {
                self.set_status(Notice::new(Severity::Error, format!("RPC error: {err}")));
            }
        }
        self.pending_manual_refresh = false;
    }

    fn expire_status(&mut self) {
        let now = Instant::now();
        if self.status.as_ref().is_some_and(|s| now >= s.expires_at) {
            self.status = None;
        }
        if self.toast.as_ref().is_some_and(|s| now >= s.expires_at) {
            self.toast = None;
        }
    }

    fn set_status(&mut self, notice: Notice) {
        let message = StatusMessage::from_notice(notice);
        if matches!(message.severity, Severity::Warning | Severity::Error) {
            self.toast = Some(message.clone());
        }
        self.status = Some(message);
    }
}

struct PromptState {
    kind: PromptKind,
    buffer: String,
}

impl PromptState {
    fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            buffer: String::new(),
        }
    }

    fn title(&self) -> &'static str {
        match self.kind {
            PromptKind::Command => "Command",
            PromptKind::Filter => "Filter",
        }
    }

    fn hint(&self) -> &'static str {
        match self.kind {
            PromptKind::Command => "e.g. sort !size,name  or  open peers  (Esc to cancel)",
            PromptKind::Filter => "e.g. size>=1G  or  name~linux  or  downloading  (Esc to cancel)",
        }
    }

    fn sigil(&self) -> char {
        match self.kind {
            PromptKind::Command => ':',
            PromptKind::Filter => '/',
        }
    }
}

struct ConfirmState {
    action: RemoteAction,
    message: String,
}

impl ConfirmState {
    fn new(action: RemoteAction, label: Option<String>) -> Self {
        let target = label.map_or_else(|| "the torrent".to_string(), |name| format!("'{name}'"));
        let message = match &action {
            RemoteAction::Remove {
                delete_data: true, ..
            } => format!("Remove {target} and delete its data?"),
            _ => format!("Remove {target} from Transmission?"),
        };
        Self { action, message }
    }
}

enum InputMode {
    Normal,
    Prompt(PromptState),
    Confirm(ConfirmState),
    Help { scroll: u16 },
}

fn render_tabs(frame: &mut Frame, area: Rect, screen: &Screen) {
    let titles = screen
        .tabs
        .iter()
        .enumerate()
        .map(|(index, label)| format!("{} {label}", index + 1));
    let tabs = Tabs::new(titles)
        .select(screen.focused_tab)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_detail(frame: &mut Frame, area: Rect, view: &ListView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::raw(" Details "));
    let Some(entity) = view.focus.and_then(|index| view.rows.get(index)) else {
        let paragraph = Paragraph::new(format!("No {} selected", view.kind.singular()))
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
        return;
    };
    let mut lines = vec![Line::from(Span::styled(
        entity.label(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    let columns = columns_for(entity.kind);
    for (name, value) in &entity.attributes {
        let text = match columns.iter().find(|column| column.attribute == name) {
            Some(column) => column.render(entity),
            None => detail_value(value),
        };
        if name == "error" && !text.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("{name}: {text}"),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(format!("{name}: {text}")));
        }
    }
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Number,
    Bytes,
    Speed,
    Percent,
    Ratio,
    Eta,
    Time,
}

struct Column {
    title: &'static str,
    attribute: &'static str,
    width: Constraint,
    format: Format,
}

impl Column {
    const fn new(title: &'static str, attribute: &'static str, width: u16, format: Format) -> Self {
        Self {
            title,
            attribute,
            width: Constraint::Length(width),
            format,
        }
    }

    const fn wide(title: &'static str, attribute: &'static str) -> Self {
        Self {
            title,
            attribute,
            width: Constraint::Min(20),
            format: Format::Text,
        }
    }

    fn render(&self, entity: &Entity) -> String {
        let value = entity.get(self.attribute);
        if self.format == Format::Eta {
            return format_eta(value.and_then(Value::as_f64).map(|secs| secs as i64));
        }
        let Some(value) = value else {
            return "-".to_string();
        };
        let number = value.as_f64().unwrap_or(0.0);
        match self.format {
            Format::Text | Format::Eta => value.to_string(),
            Format::Number => format!("{number:.0}"),
            Format::Bytes => format_bytes(number),
            Format::Speed => format_speed(number),
            Format::Percent => format_progress(number),
            Format::Ratio => format!("{number:.2}"),
            Format::Time => format_time(number as i64),
        }
    }
}

const TORRENT_COLUMNS: &[Column] = &[
    Column::wide("Name", "name"),
    Column::new("Status", "status", 13, Format::Text),
    Column::new("Size", "size", 10, Format::Bytes),
    Column::new("Done", "progress", 7, Format::Percent),
    Column::new("Down", "rate-down", 11, Format::Speed),
    Column::new("Up", "rate-up", 11, Format::Speed),
    Column::new("Ratio", "ratio", 6, Format::Ratio),
    Column::new("ETA", "eta", 7, Format::Eta),
    Column::new("Peers", "peers", 5, Format::Number),
];

const PEER_COLUMNS: &[Column] = &[
    Column::wide("Address", "address"),
    Column::new("Client", "client", 20, Format::Text),
    Column::new("Done", "progress", 7, Format::Percent),
    Column::new("Down", "rate-down", 11, Format::Speed),
    Column::new("Up", "rate-up", 11, Format::Speed),
    Column::new("Est. rate", "rate-est", 11, Format::Speed),
];

const TRACKER_COLUMNS: &[Column] = &[
    Column::wide("URL", "url"),
    Column::new("Status", "status", 11, Format::Text),
    Column::new("Seeds", "seeds", 6, Format::Number),
    Column::new("Leeches", "leeches", 7, Format::Number),
    Column::new("Last announce", "last-announce", 16, Format::Time),
];

const FILE_COLUMNS: &[Column] = &[
    Column::wide("Name", "name"),
    Column::new("Size", "size", 10, Format::Bytes),
    Column::new("Have", "downloaded", 10, Format::Bytes),
    Column::new("Done", "progress", 7, Format::Percent),
    Column::new("Priority", "priority", 8, Format::Text),
];

fn columns_for(kind: EntityKind) -> &'static [Column] {
    match kind {
        EntityKind::Torrent => TORRENT_COLUMNS,
        EntityKind::Peer => PEER_COLUMNS,
        EntityKind::Tracker => TRACKER_COLUMNS,
        EntityKind::File => FILE_COLUMNS,
    }
}

fn detail_value(value: &Value) -> String {
    match value {
        Value::Float(v) => format!("{v:.2}"),
        Value::Time(v) => format_time(*v),
        other => other.to_string(),
    }
}

fn format_time(seconds: i64) -> String {
    if seconds <= 0 {
        return "never".to_string();
    }
    match OffsetDateTime::from_unix_timestamp(seconds) {
        Ok(at) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            at.year(),
            u8::from(at.month()),
            at.day(),
            at.hour(),
            at.minute()
        ),
        Err(_) => seconds.to_string(),
    }
}

/// Maps a terminal key event onto the keymap's key. Shift is dropped for
/// printable symbols since the terminal has already applied it.
fn key_from_event(event: &KeyEvent) -> Option<Key> {
    let code = match event.code {
        TermKey::Char(c) => KeyCode::Char(c),
        TermKey::Enter => KeyCode::Enter,
        TermKey::Esc => KeyCode::Esc,
        TermKey::Tab => KeyCode::Tab,
        TermKey::BackTab => KeyCode::BackTab,
        TermKey::Backspace => KeyCode::Backspace,
        TermKey::Up => KeyCode::Up,
        TermKey::Down => KeyCode::Down,
        TermKey::Left => KeyCode::Left,
        TermKey::Right => KeyCode::Right,
        TermKey::Home => KeyCode::Home,
        TermKey::End => KeyCode::End,
        TermKey::PageUp => KeyCode::PageUp,
        TermKey::PageDown => KeyCode::PageDown,
        TermKey::Insert => KeyCode::Insert,
        TermKey::Delete => KeyCode::Delete,
        TermKey::F(n) => KeyCode::F(n),
        _ => return None,
    };
    let modifiers = event.modifiers;
    let shift = modifiers.contains(KeyModifiers::SHIFT)
        && match code {
            KeyCode::Char(c) => c.is_alphabetic(),
            KeyCode::BackTab => false,
            _ => true,
        };
    Some(Key::with_modifiers(
        code,
        modifiers.contains(KeyModifiers::CONTROL),
        modifiers.contains(KeyModifiers::ALT),
        shift,
    ))
}

fn status_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::default().fg(Color::Blue),
        Severity::Success => Style::default().fg(Color::Green),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    vertical[1]
}

fn context_heading(context: Option<Context>) -> String {
    match context {
        None => "Anywhere".to_string(),
        Some(Context::Main) => "Main".to_string(),
        Some(Context::Tabs) => "Tabs".to_string(),
        Some(Context::List(kind)) => format!("{} list", kind.singular()),
    }
}

/// Bindings grouped by context, in keymap order.
fn help_lines(dispatcher: &Dispatcher) -> Vec<Line<'static>> {
    let heading = |text: String| {
        Line::from(Span::styled(
            text,
            Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    };
    let mut lines = Vec::new();
    let mut current: Option<Option<Context>> = None;
    for (context, keys, command) in dispatcher.keymap().iter() {
        if current != Some(context) {
            if current.is_some() {
                lines.push(Line::from(""));
            }
            lines.push(heading(context_heading(context)));
            current = Some(context);
        }
        lines.push(Line::from(format!("  {:<14} {command}", keys.to_string())));
    }
    lines.push(Line::from(""));
    lines.push(heading("Dialogs".to_string()));
    lines.push(Line::from("  Prompt: Enter to submit, Esc to cancel"));
    lines.push(Line::from("  Confirm: y to accept, n/Esc to cancel"));
    lines.push(Line::from("  Help: j/k to scroll, Esc to close"));
    lines.push(Line::from("  Esc while typing a key chain cancels it; Ctrl+c quits"));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use transmission_dashboard::model::{attributes, EntityId};

    fn press(code: TermKey, modifiers: KeyModifiers) -> Option<Key> {
        key_from_event(&KeyEvent::new(code, modifiers))
    }

    #[test]
    fn terminal_keys_match_keymap_spelling() {
        let parse = |s: &str| s.parse::<Key>().unwrap();
        assert_eq!(press(TermKey::Char('G'), KeyModifiers::SHIFT), Some(parse("G")));
        assert_eq!(press(TermKey::Char('?'), KeyModifiers::SHIFT), Some(parse("?")));
        assert_eq!(
            press(TermKey::Char('d'), KeyModifiers::CONTROL),
            Some(parse("ctrl-d"))
        );
        assert_eq!(press(TermKey::Char('1'), KeyModifiers::ALT), Some(parse("alt-1")));
        assert_eq!(press(TermKey::BackTab, KeyModifiers::SHIFT), Some(parse("backtab")));
        assert_eq!(press(TermKey::Null, KeyModifiers::NONE), None);
    }

    #[test]
    fn columns_format_torrent_attributes() {
        let torrent = Entity::new(
            EntityKind::Torrent,
            EntityId::from("1"),
            attributes([
                ("name", Value::from("debian")),
                ("size", Value::Int(2048)),
                ("progress", Value::Float(50.0)),
                ("eta", Value::Int(90)),
            ]),
        );
        let render = |attribute: &str| {
            let column = TORRENT_COLUMNS
                .iter()
                .find(|column| column.attribute == attribute)
                .unwrap();
            column.render(&torrent)
        };
        assert_eq!(render("name"), "debian");
        assert_eq!(render("size"), format_bytes(2048.0));
        assert_eq!(render("progress"), format_progress(50.0));
        assert_eq!(render("eta"), "1m");
        assert_eq!(render("ratio"), "-");
    }

    #[test]
    fn formats_unix_times() {
        assert_eq!(format_time(0), "never");
        assert_eq!(format_time(86_400), "1970-01-02 00:00");
    }

    #[test]
    fn sync_warnings_raise_a_toast() {
        use transmission_dashboard::{
            dispatch::{default_keymap, DEFAULT_CHAIN_TIMEOUT},
            sync::SyncWarning,
            workspace::ViewDefaults,
        };

        let workspace = Arc::new(Mutex::new(Workspace::new(ViewDefaults::default())));
        let dispatcher = Dispatcher::new(default_keymap().unwrap(), DEFAULT_CHAIN_TIMEOUT);
        let mut app = App::new("localhost".into(), workspace, dispatcher);

        app.apply_sync(Ok(SyncReport::default()));
        assert!(app.toast.is_none());

        let mut report = SyncReport::default();
        report.warnings = vec![
            SyncWarning::MissingAttributes {
                kind: EntityKind::Peer,
                id: EntityId::from("7:x"),
                missing: vec!["torrent"],
            },
            SyncWarning::DuplicateIdentifier {
                kind: EntityKind::Torrent,
                id: EntityId::from("7"),
            },
        ];
        app.apply_sync(Ok(report));
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.text, "dropped peer 7:x: missing torrent (+1 more)");
    }

    #[test]
    fn remove_confirmation_names_target() {
        let action = RemoteAction::Remove {
            ids: vec![EntityId::from("1")],
            delete_data: true,
        };
        let confirm = ConfirmState::new(action, Some("debian".into()));
        assert_eq!(confirm.message, "Remove 'debian' and delete its data?");
    }
}
