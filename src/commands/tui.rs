use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::board::{Board, BoardFilter};
use crate::checklist;
use crate::error::Result;
use crate::model::{ChecklistKind, Phase, Property};
use crate::store::repo::Repo;

/// Nine pipeline columns plus the orphaned bucket.
const LANE_COUNT: usize = 10;
const ORPHANED_LANE: usize = LANE_COUNT - 1;

#[derive(Debug, Clone)]
struct BoardTuiConfig {
    query: String,
    filter: BoardFilter,
    tick_rate: StdDuration,
    auto_refresh: StdDuration,
}

impl Default for BoardTuiConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            filter: BoardFilter::default(),
            tick_rate: StdDuration::from_millis(200),
            auto_refresh: StdDuration::from_secs(10),
        }
    }
}

struct BoardTuiApp {
    repo_root: PathBuf,
    filter: BoardFilter,
    query: String,
    search_mode: bool,
    needs_refresh: bool,
    refresh_count: u32,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_refresh_instant: Option<Instant>,
    last_error: Option<String>,
    tick_rate: StdDuration,
    auto_refresh: StdDuration,
    lane: usize,
    selected: [usize; LANE_COUNT],
    properties: Vec<Property>,
    board: Board,
}

impl BoardTuiApp {
    fn new(repo_root: &Path, config: BoardTuiConfig) -> Self {
        let filter = config.filter;
        Self {
            repo_root: repo_root.to_path_buf(),
            board: Board::build(Vec::new(), &filter),
            filter,
            query: config.query.trim().to_string(),
            search_mode: false,
            needs_refresh: true,
            refresh_count: 0,
            last_refreshed_at: None,
            last_refresh_instant: None,
            last_error: None,
            tick_rate: config.tick_rate,
            auto_refresh: config.auto_refresh,
            lane: 0,
            selected: [0; LANE_COUNT],
            properties: Vec::new(),
        }
    }

    fn should_auto_refresh(&self) -> bool {
        self.last_refresh_instant
            .is_none_or(|last| last.elapsed() >= self.auto_refresh)
    }

    fn refresh(&mut self) {
        match load_properties(&self.repo_root) {
            Ok(properties) => {
                self.properties = properties;
                self.last_error = None;
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
            }
        }
        self.rebuild();
        self.refresh_count += 1;
        self.last_refreshed_at = Some(Utc::now());
        self.last_refresh_instant = Some(Instant::now());
        self.needs_refresh = false;
    }

    /// Re-place properties after a data refresh or a query change.
    fn rebuild(&mut self) {
        let mut filter = self.filter.clone();
        if !self.query.is_empty() {
            filter.search = Some(self.query.clone());
        }
        self.board = Board::build(self.properties.clone(), &filter);
        self.normalize_selection();
    }

    fn lane_items(&self, lane: usize) -> &[Property] {
        if lane == ORPHANED_LANE {
            &self.board.orphaned
        } else {
            self.board
                .columns
                .get(lane)
                .map(|c| c.properties.as_slice())
                .unwrap_or(&[])
        }
    }

    fn lane_title(&self, lane: usize) -> String {
        let label = if lane == ORPHANED_LANE {
            Phase::Orphaned.canonical_label()
        } else {
            Phase::pipeline()[lane].canonical_label()
        };
        format!("{label} ({})", self.lane_items(lane).len())
    }

    fn selected_property(&self) -> Option<&Property> {
        self.lane_items(self.lane).get(self.selected[self.lane])
    }

    fn normalize_selection(&mut self) {
        for lane in 0..LANE_COUNT {
            let len = self.lane_items(lane).len();
            if len == 0 {
                self.selected[lane] = 0;
            } else if self.selected[lane] >= len {
                self.selected[lane] = len - 1;
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.lane_items(self.lane).len();
        if len == 0 {
            return;
        }
        let current = self.selected[self.lane] as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.selected[self.lane] = next as usize;
    }

    fn next_lane(&mut self) {
        self.lane = (self.lane + 1) % LANE_COUNT;
    }

    fn prev_lane(&mut self) {
        self.lane = if self.lane == 0 {
            LANE_COUNT - 1
        } else {
            self.lane - 1
        };
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind == KeyEventKind::Release {
            return false;
        }

        if self.search_mode {
            return self.handle_search_key(key);
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('/') => {
                self.search_mode = true;
                false
            }
            KeyCode::Char('c') => {
                self.query.clear();
                self.rebuild();
                false
            }
            KeyCode::Char('r') => {
                self.needs_refresh = true;
                false
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
                self.next_lane();
                false
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
                self.prev_lane();
                false
            }
            KeyCode::Char('o') => {
                self.lane = ORPHANED_LANE;
                false
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                false
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                false
            }
            KeyCode::Home | KeyCode::Char('g') => {
                self.selected[self.lane] = 0;
                false
            }
            KeyCode::End | KeyCode::Char('G') => {
                self.selected[self.lane] = self.lane_items(self.lane).len().saturating_sub(1);
                false
            }
            _ => false,
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.search_mode = false;
            }
            KeyCode::Backspace => {
                self.query.pop();
                self.rebuild();
            }
            KeyCode::Char(ch) => {
                self.query.push(ch);
                self.rebuild();
            }
            _ => {}
        }
        false
    }

    fn render(&self, frame: &mut Frame) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(9),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let refreshed_at = self
            .last_refreshed_at
            .as_ref()
            .map(|timestamp| timestamp.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut summary = format!(
            "properties={}  orphaned={}  refreshes={}  last={}",
            self.board.total(),
            self.board.orphaned.len(),
            self.refresh_count,
            refreshed_at,
        );
        if !self.query.is_empty() {
            summary.push_str(&format!("  query={:?}", self.query));
        }
        if let Some(error) = &self.last_error {
            summary.push_str(&format!("  last_error={error}"));
        }
        frame.render_widget(
            Paragraph::new(summary)
                .block(Block::default().borders(Borders::ALL).title("reno board"))
                .wrap(Wrap { trim: true }),
            outer[0],
        );

        let pipeline = Phase::pipeline().len() as u32;
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints((0..pipeline).map(|_| Constraint::Ratio(1, pipeline)))
            .split(outer[1]);
        for (lane, area) in columns.iter().enumerate() {
            self.render_lane(frame, *area, lane);
        }

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(outer[2]);
        self.render_lane(frame, bottom[0], ORPHANED_LANE);
        frame.render_widget(
            Paragraph::new(self.detail_text())
                .block(Block::default().borders(Borders::ALL).title("Detail"))
                .wrap(Wrap { trim: false }),
            bottom[1],
        );

        frame.render_widget(
            Paragraph::new(self.controls_line()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(if self.search_mode { "Search" } else { "Controls" }),
            ),
            outer[3],
        );
    }

    fn render_lane(&self, frame: &mut Frame, area: Rect, lane: usize) {
        let focused = lane == self.lane;
        let items = self
            .lane_items(lane)
            .iter()
            .map(|p| ListItem::new(p.unique_id.clone()))
            .collect::<Vec<_>>();
        let border_style = if focused {
            Style::default().fg(Color::Cyan)
        } else if lane == ORPHANED_LANE && !self.board.orphaned.is_empty() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };

        let mut state = ListState::default();
        if focused && !items.is_empty() {
            state.select(Some(self.selected[lane]));
        }
        frame.render_stateful_widget(
            List::new(items)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(border_style)
                        .title(self.lane_title(lane)),
                )
                .highlight_style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("❯ "),
            area,
            &mut state,
        );
    }

    fn detail_text(&self) -> String {
        let Some(p) = self.selected_property() else {
            return "No property selected".to_string();
        };
        let mut lines = vec![
            format!("{}  [{}]", p.unique_id, p.phase),
            format!("address: {}", p.address.as_deref().unwrap_or("-")),
            format!("crm status: {}", p.set_up_status.as_deref().unwrap_or("-")),
            format!(
                "renovator: {}  constructor: {}",
                p.renovator.as_deref().unwrap_or("-"),
                p.technical_constructor.as_deref().unwrap_or("-")
            ),
        ];
        if let Some(date) = p.estimated_visit_date {
            lines.push(format!("visit: {date}"));
        }
        for kind in [ChecklistKind::Initial, ChecklistKind::Final] {
            if let Some(tree) = p.checklist(kind) {
                let progress = checklist::progress(tree);
                lines.push(format!(
                    "{kind} checklist: {}% ({}/{})",
                    progress.percent, progress.completed, progress.total
                ));
            }
        }
        lines.join("\n")
    }

    fn controls_line(&self) -> String {
        if self.search_mode {
            format!("/{}  (Enter/Esc to finish)", self.query)
        } else {
            "h/l lanes  j/k rows  o orphaned  / search  c clear  r refresh  q quit".to_string()
        }
    }
}

pub fn run(repo_root: &Path, filter: BoardFilter, query: Option<String>) -> Result<()> {
    let config = BoardTuiConfig {
        query: query.unwrap_or_default(),
        filter,
        ..BoardTuiConfig::default()
    };
    run_tui(repo_root, config)
}

fn run_tui(repo_root: &Path, config: BoardTuiConfig) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BoardTuiApp::new(repo_root, config);
    let run_result = run_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn run_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut BoardTuiApp) -> Result<()> {
    app.refresh();
    let mut last_tick = Instant::now();

    loop {
        terminal
            .draw(|frame| app.render(frame))
            .map_err(|err| std::io::Error::other(err.to_string()))?;

        let timeout = app.tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && app.handle_key(key)
        {
            break;
        }

        if app.needs_refresh || app.should_auto_refresh() {
            app.refresh();
        }

        if last_tick.elapsed() >= app.tick_rate {
            last_tick = Instant::now();
        }
    }

    Ok(())
}

fn load_properties(repo_root: &Path) -> Result<Vec<Property>> {
    let repo = Repo::open(repo_root)?;
    repo.db.list_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    use ratatui::backend::TestBackend;

    fn property(uid: &str, phase: Phase, address: &str) -> Property {
        let mut p = Property::new(uid);
        p.phase = phase;
        p.address = Some(address.into());
        p
    }

    fn app_with_board() -> BoardTuiApp {
        let mut app = BoardTuiApp::new(Path::new("."), BoardTuiConfig::default());
        app.properties = vec![
            property("SP-1", Phase::UpcomingSettlements, "Calle Mayor 1"),
            property("SP-2", Phase::UpcomingSettlements, "Gran Vía 20"),
            property("SP-3", Phase::RenoInProgress, "Calle Mayor 9"),
            property("SP-4", Phase::Orphaned, "Paseo del Prado 3"),
        ];
        app.rebuild();
        app
    }

    #[test]
    fn lane_navigation_wraps_through_orphaned() {
        let mut app = app_with_board();
        app.prev_lane();
        assert_eq!(app.lane, ORPHANED_LANE);
        assert_eq!(app.selected_property().unwrap().unique_id, "SP-4");
        app.next_lane();
        assert_eq!(app.lane, 0);
    }

    #[test]
    fn row_selection_is_clamped() {
        let mut app = app_with_board();
        app.move_selection(5);
        assert_eq!(app.selected_property().unwrap().unique_id, "SP-2");
        app.move_selection(-9);
        assert_eq!(app.selected_property().unwrap().unique_id, "SP-1");
    }

    #[test]
    fn search_rebuilds_board() {
        let mut app = app_with_board();
        app.selected[0] = 1;
        let _ = app.handle_key(KeyEvent::from(KeyCode::Char('/')));
        for ch in "mayor".chars() {
            let _ = app.handle_key(KeyEvent::from(KeyCode::Char(ch)));
        }
        assert_eq!(app.query, "mayor");
        assert_eq!(app.board.total(), 2);
        assert_eq!(app.selected[0], 0);

        let _ = app.handle_key(KeyEvent::from(KeyCode::Enter));
        assert!(!app.search_mode);
        let _ = app.handle_key(KeyEvent::from(KeyCode::Char('c')));
        assert_eq!(app.board.total(), 4);
    }

    #[test]
    fn quit_key_stops_loop() {
        let mut app = app_with_board();
        assert!(app.handle_key(KeyEvent::from(KeyCode::Char('q'))));
    }

    #[test]
    fn render_smoke() {
        let app = app_with_board();
        let backend = TestBackend::new(200, 40);
        let mut terminal = Terminal::new(backend).unwrap();

        terminal.draw(|frame| app.render(frame)).unwrap();
    }
}
