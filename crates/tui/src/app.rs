use std::{cmp, collections::BTreeSet, io, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use savekeep_core::{launch_updater, AppConfig, Library, SnapshotInfo, UpdateOffer};
use tracing::{error, info, warn};

use crate::prompt::TextInput;

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Games,
    Sources,
    Snapshots,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Games => Pane::Sources,
            Pane::Sources => Pane::Snapshots,
            Pane::Snapshots => Pane::Games,
        }
    }

    fn previous(self) -> Self {
        match self {
            Pane::Games => Pane::Snapshots,
            Pane::Sources => Pane::Games,
            Pane::Snapshots => Pane::Sources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
enum PromptAction {
    AddGameName,
    AddGameSource { name: String },
    AddGameIcon { name: String, source: PathBuf },
    ChangeSource { game: String },
    ChangeIcon { game: String },
    RenameSource { game: String, from: String },
    RenameSnapshot { game: String, from: String },
    EditNote { game: String, snapshot: String },
}

#[derive(Debug, Clone)]
struct PromptModal {
    title: String,
    label: String,
    input: TextInput,
    action: PromptAction,
    multiline: bool,
}

impl PromptModal {
    fn new(title: impl Into<String>, label: impl Into<String>, initial: &str, action: PromptAction) -> Self {
        Self {
            title: title.into(),
            label: label.into(),
            input: TextInput::new(initial),
            action,
            multiline: false,
        }
    }

    fn multiline(mut self) -> Self {
        self.multiline = true;
        self
    }
}

#[derive(Debug, Clone)]
enum ConfirmAction {
    DeleteGame { game: String },
    DeleteSource { game: String, entry: String },
    DeleteSnapshot { game: String, snapshot: String },
    Restore { game: String, snapshot: String },
    Update(UpdateOffer),
}

#[derive(Debug, Clone)]
struct ConfirmModal {
    title: String,
    message: String,
    action: ConfirmAction,
}

#[derive(Debug, Clone)]
enum Modal {
    Prompt(PromptModal),
    Confirm(ConfirmModal),
}

pub struct SavekeepApp {
    config: AppConfig,
    library: Library,
    state: UiState,
    modal: Option<Modal>,
    theme: Theme,
}

impl SavekeepApp {
    pub fn new(config: AppConfig, library: Library, update: Option<UpdateOffer>) -> Self {
        let modal = update.map(|offer| {
            Modal::Confirm(ConfirmModal {
                title: "Update available".to_string(),
                message: format!(
                    "Version {} is available (installed: {}). Update now? The application will restart.",
                    offer.remote, offer.local
                ),
                action: ConfirmAction::Update(offer),
            })
        });
        Self {
            config,
            library,
            state: UiState::default(),
            modal,
            theme: Theme::default(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.reload_games();
        self.state.set_status(
            StatusKind::Info,
            format!("Loaded {} games", self.state.games.len()),
        );

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }
            if event::poll(TICK_RATE).context("failed to poll terminal events")? {
                let event = event::read().context("failed to read terminal event")?;
                self.handle_event(event);
            }
            if self.state.should_quit {
                break;
            }
        }
        Ok(())
    }

    fn current_game(&self) -> Option<&str> {
        self.state.games.get(self.state.game_cursor).map(String::as_str)
    }

    fn current_source(&self) -> Option<&str> {
        self.state
            .sources
            .get(self.state.source_cursor)
            .map(String::as_str)
    }

    fn current_snapshot(&self) -> Option<&SnapshotInfo> {
        self.state.snapshots.get(self.state.snapshot_cursor)
    }

    fn reload_games(&mut self) {
        self.state.games = self.library.catalog().names();
        self.state.game_cursor = clamp_index(self.state.game_cursor, self.state.games.len());
        self.refresh_lists();
    }

    fn refresh_lists(&mut self) {
        let Some(game) = self.current_game().map(str::to_string) else {
            self.state.sources.clear();
            self.state.snapshots.clear();
            self.state.selected.clear();
            return;
        };

        match self.library.list_source_entries(&game) {
            Ok(sources) => {
                self.state
                    .selected
                    .retain(|name| sources.iter().any(|source| source == name));
                self.state.sources = sources;
            }
            Err(err) => {
                warn!(%err, game = %game, "Failed to list savegame directory");
                self.state.sources.clear();
                self.state.selected.clear();
                self.state
                    .set_status(StatusKind::Error, format!("Cannot read savegames: {err}"));
            }
        }
        match self.library.list_snapshots(&game) {
            Ok(snapshots) => self.state.snapshots = snapshots,
            Err(err) => {
                warn!(%err, game = %game, "Failed to list snapshots");
                self.state.snapshots.clear();
                self.state
                    .set_status(StatusKind::Error, format!("Cannot read backups: {err}"));
            }
        }
        self.state.source_cursor = clamp_index(self.state.source_cursor, self.state.sources.len());
        self.state.snapshot_cursor =
            clamp_index(self.state.snapshot_cursor, self.state.snapshots.len());
    }

    fn select_game(&mut self, name: &str) {
        if let Some(index) = self.state.games.iter().position(|game| game == name) {
            self.state.game_cursor = index;
            self.state.selected.clear();
            self.refresh_lists();
        }
    }

    fn select_snapshot(&mut self, name: &str) {
        if let Some(index) = self.state.snapshots.iter().position(|s| s.name == name) {
            self.state.snapshot_cursor = index;
        }
    }

    fn handle_event(&mut self, event: Event) {
        let Event::Key(key) = event else {
            return;
        };
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.modal.is_some() {
            self.handle_modal_key(key);
        } else {
            self.handle_key(key);
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Tab => self.state.focus = self.state.focus.next(),
            KeyCode::BackTab => self.state.focus = self.state.focus.previous(),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.reload_games();
                self.state
                    .set_status(StatusKind::Info, "Lists refreshed".to_string());
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::Home | KeyCode::Char('g') => self.move_cursor(isize::MIN),
            KeyCode::End | KeyCode::Char('G') => self.move_cursor(isize::MAX),
            KeyCode::Char('a') => self.prompt_add_game(),
            KeyCode::Char('s') => self.take_snapshot(),
            _ => match self.state.focus {
                Pane::Games => self.handle_games_key(key),
                Pane::Sources => self.handle_sources_key(key),
                Pane::Snapshots => self.handle_snapshots_key(key),
            },
        }
    }

    fn handle_games_key(&mut self, key: KeyEvent) {
        let Some(game) = self.current_game().map(str::to_string) else {
            return;
        };
        match key.code {
            KeyCode::Enter => self.state.focus = Pane::Sources,
            KeyCode::Char('p') => {
                let current = self
                    .library
                    .game(&game)
                    .map(|entry| entry.source_path.display().to_string())
                    .unwrap_or_default();
                self.open_prompt(PromptModal::new(
                    format!("Change path - {game}"),
                    "New savegame directory",
                    &current,
                    PromptAction::ChangeSource { game },
                ));
            }
            KeyCode::Char('i') => {
                self.open_prompt(PromptModal::new(
                    format!("Change icon - {game}"),
                    "Image file (.png, .jpg, .ico)",
                    "",
                    PromptAction::ChangeIcon { game },
                ));
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                self.modal = Some(Modal::Confirm(ConfirmModal {
                    title: "Delete game".to_string(),
                    message: format!(
                        "Remove {game} from the catalog? Backups and icon stay on disk."
                    ),
                    action: ConfirmAction::DeleteGame { game },
                }));
            }
            _ => {}
        }
    }

    fn handle_sources_key(&mut self, key: KeyEvent) {
        let Some(game) = self.current_game().map(str::to_string) else {
            return;
        };
        match key.code {
            KeyCode::Char(' ') => {
                if let Some(entry) = self.current_source().map(str::to_string) {
                    if !self.state.selected.remove(&entry) {
                        self.state.selected.insert(entry);
                    }
                    self.move_cursor(1);
                }
            }
            KeyCode::Char('*') => {
                if self.state.selected.len() == self.state.sources.len() {
                    self.state.selected.clear();
                } else {
                    self.state.selected = self.state.sources.iter().cloned().collect();
                }
            }
            KeyCode::Char('m') => {
                if let Some(entry) = self.current_source().map(str::to_string) {
                    self.open_prompt(PromptModal::new(
                        "Rename",
                        format!("New name for {entry}"),
                        &entry,
                        PromptAction::RenameSource {
                            game,
                            from: entry.clone(),
                        },
                    ));
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                if let Some(entry) = self.current_source().map(str::to_string) {
                    self.modal = Some(Modal::Confirm(ConfirmModal {
                        title: "Delete file/folder".to_string(),
                        message: format!("Really delete '{entry}' from the savegame directory?"),
                        action: ConfirmAction::DeleteSource { game, entry },
                    }));
                }
            }
            _ => {}
        }
    }

    fn handle_snapshots_key(&mut self, key: KeyEvent) {
        let Some(game) = self.current_game().map(str::to_string) else {
            return;
        };
        let Some(snapshot) = self.current_snapshot().cloned() else {
            return;
        };
        match key.code {
            KeyCode::Enter | KeyCode::Char('r') => {
                self.modal = Some(Modal::Confirm(ConfirmModal {
                    title: "Restore".to_string(),
                    message: format!(
                        "Restore backup {} into the savegame directory? Files with the same name are overwritten.",
                        snapshot.name
                    ),
                    action: ConfirmAction::Restore {
                        game,
                        snapshot: snapshot.name,
                    },
                }));
            }
            KeyCode::Char('n') => {
                let note = snapshot.note.clone().unwrap_or_default();
                self.open_prompt(
                    PromptModal::new(
                        "Edit note",
                        format!("Note for backup {}", snapshot.name),
                        &note,
                        PromptAction::EditNote {
                            game,
                            snapshot: snapshot.name,
                        },
                    )
                    .multiline(),
                );
            }
            KeyCode::Char('m') => {
                self.open_prompt(PromptModal::new(
                    "Rename backup",
                    "New name for the backup",
                    &snapshot.name,
                    PromptAction::RenameSnapshot {
                        game,
                        from: snapshot.name.clone(),
                    },
                ));
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                self.modal = Some(Modal::Confirm(ConfirmModal {
                    title: "Delete backup".to_string(),
                    message: format!("Really delete backup '{}'?", snapshot.name),
                    action: ConfirmAction::DeleteSnapshot {
                        game,
                        snapshot: snapshot.name,
                    },
                }));
            }
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        match self.state.focus {
            Pane::Games => {
                let before = self.state.game_cursor;
                self.state.game_cursor =
                    step_index(self.state.game_cursor, delta, self.state.games.len());
                if before != self.state.game_cursor {
                    self.state.selected.clear();
                    self.state.source_cursor = 0;
                    self.state.snapshot_cursor = 0;
                    self.refresh_lists();
                }
            }
            Pane::Sources => {
                self.state.source_cursor =
                    step_index(self.state.source_cursor, delta, self.state.sources.len());
            }
            Pane::Snapshots => {
                self.state.snapshot_cursor =
                    step_index(self.state.snapshot_cursor, delta, self.state.snapshots.len());
            }
        }
    }

    fn open_prompt(&mut self, prompt: PromptModal) {
        self.modal = Some(Modal::Prompt(prompt));
    }

    fn prompt_add_game(&mut self) {
        self.open_prompt(PromptModal::new(
            "Add game",
            "Name of the game",
            "",
            PromptAction::AddGameName,
        ));
    }

    fn take_snapshot(&mut self) {
        let Some(game) = self.current_game().map(str::to_string) else {
            self.state
                .set_status(StatusKind::Warning, "Add a game first".to_string());
            return;
        };
        let selected: Vec<String> = self
            .state
            .sources
            .iter()
            .filter(|name| self.state.selected.contains(*name))
            .cloned()
            .collect();
        if selected.is_empty() {
            self.state.set_status(
                StatusKind::Warning,
                "Select at least one file with space first".to_string(),
            );
            return;
        }

        match self.library.take_snapshot(&game, &selected) {
            Ok(report) => {
                let id = report.id.to_string();
                if report.failures.is_empty() {
                    self.state.set_status(
                        StatusKind::Success,
                        format!("Backup {id} created with {} entries", report.copied.len()),
                    );
                } else {
                    let failed: Vec<String> = report
                        .failures
                        .iter()
                        .map(|failure| format!("{} ({})", failure.name, failure.error))
                        .collect();
                    self.state.set_status(
                        StatusKind::Warning,
                        format!(
                            "Backup {id}: {} copied, failed: {}",
                            report.copied.len(),
                            failed.join("; ")
                        ),
                    );
                }
                self.refresh_lists();
                self.select_snapshot(&id);
            }
            Err(err) => {
                error!(%err, game = %game, "Backup failed");
                self.state
                    .set_status(StatusKind::Error, format!("Backup failed: {err}"));
            }
        }
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        match self.modal.take() {
            Some(Modal::Prompt(mut prompt)) => {
                let keep_open = match key.code {
                    KeyCode::Esc => {
                        self.state
                            .set_status(StatusKind::Info, "Cancelled".to_string());
                        false
                    }
                    KeyCode::Enter
                        if prompt.multiline && key.modifiers.contains(KeyModifiers::ALT) =>
                    {
                        prompt.input.insert('\n');
                        true
                    }
                    KeyCode::Enter => {
                        self.submit_prompt(prompt.action.clone(), prompt.input.value().to_string());
                        // Submitting may chain into the next prompt.
                        return;
                    }
                    KeyCode::Left => {
                        prompt.input.move_left();
                        true
                    }
                    KeyCode::Right => {
                        prompt.input.move_right();
                        true
                    }
                    KeyCode::Home => {
                        prompt.input.move_home();
                        true
                    }
                    KeyCode::End => {
                        prompt.input.move_end();
                        true
                    }
                    KeyCode::Backspace => {
                        prompt.input.backspace();
                        true
                    }
                    KeyCode::Delete => {
                        prompt.input.delete();
                        true
                    }
                    KeyCode::Char(ch) => {
                        if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                            prompt.input.insert(ch);
                        }
                        true
                    }
                    _ => true,
                };
                if keep_open {
                    self.modal = Some(Modal::Prompt(prompt));
                }
            }
            Some(Modal::Confirm(confirm)) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.confirm(confirm.action);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.state
                        .set_status(StatusKind::Info, "Cancelled".to_string());
                }
                _ => self.modal = Some(Modal::Confirm(confirm)),
            },
            None => {}
        }
    }

    fn submit_prompt(&mut self, action: PromptAction, value: String) {
        let trimmed = value.trim().to_string();
        match action {
            PromptAction::AddGameName => {
                if trimmed.is_empty() {
                    self.state
                        .set_status(StatusKind::Warning, "A game name is required".to_string());
                    return;
                }
                self.open_prompt(PromptModal::new(
                    format!("Add game - {trimmed}"),
                    "Savegame directory",
                    "",
                    PromptAction::AddGameSource { name: trimmed },
                ));
            }
            PromptAction::AddGameSource { name } => {
                if trimmed.is_empty() {
                    self.state.set_status(
                        StatusKind::Warning,
                        "A savegame directory is required".to_string(),
                    );
                    return;
                }
                self.open_prompt(PromptModal::new(
                    format!("Add game - {name}"),
                    "Icon image (optional, Enter to skip)",
                    "",
                    PromptAction::AddGameIcon {
                        name,
                        source: PathBuf::from(trimmed),
                    },
                ));
            }
            PromptAction::AddGameIcon { name, source } => {
                let icon = (!trimmed.is_empty()).then(|| PathBuf::from(&trimmed));
                match self.library.add_game(&name, &source, icon.as_deref()) {
                    Ok(()) => {
                        self.reload_games();
                        self.select_game(name.trim());
                        self.state
                            .set_status(StatusKind::Success, format!("Added {name}"));
                    }
                    Err(err) => self
                        .state
                        .set_status(StatusKind::Error, format!("Could not add game: {err}")),
                }
            }
            PromptAction::ChangeSource { game } => {
                if trimmed.is_empty() {
                    return;
                }
                let result = self
                    .library
                    .change_source_path(&game, &PathBuf::from(&trimmed));
                self.report(result, format!("Savegame directory of {game} changed"));
                self.refresh_lists();
            }
            PromptAction::ChangeIcon { game } => {
                if trimmed.is_empty() {
                    return;
                }
                let result = self
                    .library
                    .change_icon(&game, &PathBuf::from(&trimmed))
                    .map(|_| ());
                self.report(result, format!("Icon of {game} changed"));
            }
            PromptAction::RenameSource { game, from } => {
                if trimmed.is_empty() || trimmed == from {
                    return;
                }
                let result = self.library.rename_source_entry(&game, &from, &trimmed);
                if result.is_ok() && self.state.selected.remove(&from) {
                    self.state.selected.insert(trimmed.clone());
                }
                self.report(result, format!("Renamed {from} to {trimmed}"));
                self.refresh_lists();
            }
            PromptAction::RenameSnapshot { game, from } => {
                if trimmed.is_empty() || trimmed == from {
                    return;
                }
                let result = self.library.rename_snapshot(&game, &from, &trimmed);
                self.report(result, format!("Backup renamed to {trimmed}"));
                self.refresh_lists();
                self.select_snapshot(&trimmed);
            }
            PromptAction::EditNote { game, snapshot } => {
                let result = self.library.edit_note(&game, &snapshot, &value);
                self.report(result, format!("Note for {snapshot} saved"));
                self.refresh_lists();
            }
        }
    }

    fn confirm(&mut self, action: ConfirmAction) {
        match action {
            ConfirmAction::DeleteGame { game } => {
                let result = self.library.delete_game(&game).map(|_| ());
                self.report(result, format!("{game} removed"));
                self.state.selected.clear();
                self.reload_games();
            }
            ConfirmAction::DeleteSource { game, entry } => {
                let result = self.library.delete_source_entry(&game, &entry);
                self.report(result, format!("{entry} deleted"));
                self.state.selected.remove(&entry);
                self.refresh_lists();
            }
            ConfirmAction::DeleteSnapshot { game, snapshot } => {
                let result = self.library.delete_snapshot(&game, &snapshot);
                self.report(result, format!("Backup {snapshot} deleted"));
                self.refresh_lists();
            }
            ConfirmAction::Restore { game, snapshot } => {
                match self.library.restore(&game, &snapshot) {
                    Ok(report) => self.state.set_status(
                        StatusKind::Success,
                        format!(
                            "Backup {snapshot} restored ({} files)",
                            report.files_restored
                        ),
                    ),
                    Err(err) => {
                        error!(%err, game = %game, snapshot = %snapshot, "Restore failed");
                        self.state
                            .set_status(StatusKind::Error, format!("Restore failed: {err}"));
                    }
                }
                self.refresh_lists();
            }
            ConfirmAction::Update(offer) => match launch_updater(&self.config) {
                Ok(()) => {
                    info!(remote = %offer.remote, "Handing over to updater");
                    self.state.should_quit = true;
                }
                Err(err) => {
                    error!(%err, "Updater could not be started");
                    self.state.set_status(
                        StatusKind::Error,
                        format!("Updater could not be started: {err}"),
                    );
                }
            },
        }
    }

    fn report(&mut self, result: savekeep_core::Result<()>, success: String) {
        match result {
            Ok(()) => self.state.set_status(StatusKind::Success, success),
            Err(err) => {
                warn!(%err, "Operation failed");
                self.state.set_status(StatusKind::Error, format!("Error: {err}"));
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(8),
                Constraint::Length(1),
                Constraint::Length(4),
            ])
            .split(area);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(25),
                Constraint::Percentage(35),
                Constraint::Percentage(40),
            ])
            .split(chunks[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(4), Constraint::Length(8)])
            .split(columns[2]);

        self.render_games(frame, columns[0]);
        self.render_sources(frame, columns[1]);
        self.render_snapshots(frame, right[0]);
        self.render_note(frame, right[1]);
        self.render_help(frame, chunks[1]);
        self.render_status(frame, chunks[2]);

        match &self.modal {
            Some(Modal::Prompt(prompt)) => self.render_prompt(frame, prompt),
            Some(Modal::Confirm(confirm)) => self.render_confirm(frame, confirm),
            None => {}
        }
    }

    fn pane_block(&self, title: String, pane: Pane) -> Block<'static> {
        let style = if self.state.focus == pane {
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.theme.muted)
        };
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(title)
    }

    fn render_list(
        &self,
        frame: &mut Frame,
        area: Rect,
        items: Vec<ListItem<'static>>,
        block: Block<'static>,
        cursor: usize,
        pane: Pane,
    ) {
        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(cursor.min(items.len() - 1)));
        }
        let highlight = if self.state.focus == pane {
            Style::default().bg(self.theme.selection_bg)
        } else {
            Style::default()
        };
        let list = List::new(items)
            .block(block)
            .highlight_style(highlight)
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_games(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem<'static>> = self
            .state
            .games
            .iter()
            .map(|game| {
                ListItem::new(Line::from(Span::styled(
                    game.clone(),
                    Style::default()
                        .fg(self.theme.primary_fg)
                        .add_modifier(Modifier::BOLD),
                )))
            })
            .collect();
        let block = self.pane_block(format!("Games ({})", self.state.games.len()), Pane::Games);
        if items.is_empty() {
            let hint = Paragraph::new(Line::from(Span::styled(
                "Press a to add a game",
                Style::default().fg(self.theme.muted),
            )))
            .block(block)
            .wrap(Wrap { trim: true });
            frame.render_widget(hint, area);
            return;
        }
        self.render_list(frame, area, items, block, self.state.game_cursor, Pane::Games);
    }

    fn render_sources(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem<'static>> = self
            .state
            .sources
            .iter()
            .map(|name| {
                let checked = self.state.selected.contains(name);
                let marker = if checked {
                    Span::styled("[x] ", Style::default().fg(self.theme.success))
                } else {
                    Span::styled("[ ] ", Style::default().fg(self.theme.muted))
                };
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(name.clone(), Style::default().fg(self.theme.primary_fg)),
                ]))
            })
            .collect();
        let title = format!(
            "Savegames ({} selected)",
            self.state.selected.len()
        );
        let block = self.pane_block(title, Pane::Sources);
        self.render_list(frame, area, items, block, self.state.source_cursor, Pane::Sources);
    }

    fn render_snapshots(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem<'static>> = self
            .state
            .snapshots
            .iter()
            .map(|snapshot| {
                let mut spans = vec![Span::styled(
                    snapshot.name.clone(),
                    Style::default().fg(self.theme.primary_fg),
                )];
                if let Some(first) = snapshot
                    .note
                    .as_deref()
                    .and_then(|note| note.lines().find(|line| !line.trim().is_empty()))
                {
                    spans.push(Span::styled(
                        format!(" · {first}"),
                        Style::default().fg(self.theme.muted),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        let block = self.pane_block(
            format!("Backups ({})", self.state.snapshots.len()),
            Pane::Snapshots,
        );
        self.render_list(
            frame,
            area,
            items,
            block,
            self.state.snapshot_cursor,
            Pane::Snapshots,
        );
    }

    fn render_note(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = match self.current_snapshot() {
            Some(snapshot) => match snapshot.note.as_deref() {
                Some(note) if !note.is_empty() => {
                    note.lines().map(|line| Line::from(line.to_string())).collect()
                }
                _ => vec![Line::from(Span::styled(
                    "No note",
                    Style::default().fg(self.theme.muted),
                ))],
            },
            None => Vec::new(),
        };
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Note"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let pane_keys = match self.state.focus {
            Pane::Games => "p path  i icon  x delete",
            Pane::Sources => "space select  * all  m rename  x delete",
            Pane::Snapshots => "r restore  n note  m rename  x delete",
        };
        let help = Line::from(vec![
            Span::styled("a", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" add game  "),
            Span::styled("s", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" backup  "),
            Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" switch  "),
            Span::styled(pane_keys, Style::default().fg(self.theme.muted)),
            Span::raw("  "),
            Span::styled("q", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" quit"),
        ]);
        frame.render_widget(Paragraph::new(help), area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let color = match self.state.status_kind {
            StatusKind::Info => self.theme.primary_fg,
            StatusKind::Success => self.theme.success,
            StatusKind::Warning => self.theme.warning,
            StatusKind::Error => self.theme.danger,
        };
        let detail = self
            .current_game()
            .and_then(|game| self.library.game(game).ok())
            .map(|entry| {
                let mut text = format!("Source: {}", entry.source_path.display());
                if let Some(icon) = &entry.icon_path {
                    text.push_str(&format!("  Icon: {}", icon.display()));
                }
                text
            })
            .unwrap_or_else(|| "No game selected".to_string());
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                self.state.status.clone(),
                Style::default().fg(color),
            )),
            Line::from(Span::styled(detail, Style::default().fg(self.theme.muted))),
        ])
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_prompt(&self, frame: &mut Frame, prompt: &PromptModal) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(70_u16, frame_area.width.saturating_sub(4)), 24_u16);
        let input_lines = if prompt.multiline { 6_u16 } else { 1_u16 };
        let height = (input_lines + 5).min(frame_area.height.saturating_sub(2)).max(5);
        let area = centered_rect(width, height, frame_area);
        frame.render_widget(Clear, area);

        let mut lines = vec![Line::from(prompt.label.clone())];
        let prefix = if prompt.multiline { "" } else { "> " };
        for (idx, text) in prompt.input.value().split('\n').enumerate() {
            let lead = if idx == 0 { prefix } else { "" };
            lines.push(Line::from(vec![
                Span::styled(lead, Style::default().fg(self.theme.accent)),
                Span::raw(text.to_string()),
            ]));
        }
        lines.push(Line::from(""));
        let mut helper = vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" save  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ];
        if prompt.multiline {
            helper.push(Span::raw("  "));
            helper.push(Span::styled(
                "Alt+Enter",
                Style::default().add_modifier(Modifier::BOLD),
            ));
            helper.push(Span::raw(" new line"));
        }
        lines.push(Line::from(helper));

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(prompt.title.clone()),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);

        let (row, column) = prompt.input.cursor_position();
        let offset = if row == 0 { prefix.len() as u16 } else { 0 };
        let cursor_x = (area.x + 1 + offset + column as u16)
            .min(area.x + area.width.saturating_sub(2));
        let cursor_y = (area.y + 2 + row as u16).min(area.y + area.height.saturating_sub(2));
        frame.set_cursor(cursor_x, cursor_y);
    }

    fn render_confirm(&self, frame: &mut Frame, confirm: &ConfirmModal) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(64_u16, frame_area.width.saturating_sub(4)), 24_u16);
        let height = 7_u16.min(frame_area.height.saturating_sub(2)).max(5);
        let area = centered_rect(width, height, frame_area);
        frame.render_widget(Clear, area);

        let helper = Line::from(vec![
            Span::styled("y", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" confirm  "),
            Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]);
        let paragraph = Paragraph::new(vec![
            Line::from(confirm.message.clone()),
            Line::from(""),
            helper,
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.warning))
                .title(confirm.title.clone()),
        )
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

struct UiState {
    games: Vec<String>,
    game_cursor: usize,
    sources: Vec<String>,
    source_cursor: usize,
    selected: BTreeSet<String>,
    snapshots: Vec<SnapshotInfo>,
    snapshot_cursor: usize,
    focus: Pane,
    status: String,
    status_kind: StatusKind,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            game_cursor: 0,
            sources: Vec::new(),
            source_cursor: 0,
            selected: BTreeSet::new(),
            snapshots: Vec::new(),
            snapshot_cursor: 0,
            focus: Pane::Games,
            status: "Ready".to_string(),
            status_kind: StatusKind::Info,
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_status(&mut self, kind: StatusKind, message: String) {
        self.status_kind = kind;
        self.status = message;
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    index.min(len.saturating_sub(1))
}

fn step_index(index: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = (index as isize).saturating_add(delta);
    next.clamp(0, len as isize - 1) as usize
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_steps_stay_in_bounds() {
        assert_eq!(step_index(0, -1, 3), 0);
        assert_eq!(step_index(1, 1, 3), 2);
        assert_eq!(step_index(2, 1, 3), 2);
        assert_eq!(step_index(2, isize::MIN, 3), 0);
        assert_eq!(step_index(0, isize::MAX, 3), 2);
        assert_eq!(step_index(5, 1, 0), 0);
        assert_eq!(clamp_index(9, 2), 1);
        assert_eq!(clamp_index(0, 0), 0);
    }

    #[test]
    fn panes_cycle_both_ways() {
        let mut pane = Pane::Games;
        for _ in 0..3 {
            pane = pane.next();
        }
        assert_eq!(pane, Pane::Games);
        assert_eq!(Pane::Games.previous(), Pane::Snapshots);
    }

    #[test]
    fn centered_rect_fits_small_areas() {
        let area = Rect::new(0, 0, 10, 4);
        let rect = centered_rect(20, 8, area);
        assert_eq!(rect, area);
        let rect = centered_rect(4, 2, area);
        assert_eq!(rect, Rect::new(3, 1, 4, 2));
    }
}
