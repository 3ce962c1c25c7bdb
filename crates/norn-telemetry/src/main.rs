//! norn-telemetry — TUI diagnostics dashboard for norn simulations.
//!
//! Connects to a running simulation via UDP and displays real-time task,
//! entity, and event-source metrics in a terminal dashboard using ratatui.
//!
//! Run a norn binary with the `diagnostics` feature (on by default) and a
//! `DiagSender`, then run `cargo run -p norn-telemetry`.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use serde::Deserialize;

// ── Wire types (must match norn's JSON format) ──────────────────────────

#[derive(Deserialize, Clone, Default)]
struct DiagSnapshot {
    tick: u64,
    tasks: TaskPoolInfo,
    entities: EntityPoolInfo,
    open_sources: usize,
}

#[derive(Deserialize, Clone, Default)]
struct TaskPoolInfo {
    pending: usize,
    sleeping: usize,
    waiting: usize,
    retired: usize,
    total_slots: u32,
    free_slots: usize,
}

#[derive(Deserialize, Clone, Default)]
struct EntityPoolInfo {
    alive: usize,
    free_slots: usize,
    total_slots: u32,
}

impl TaskPoolInfo {
    fn live(&self) -> usize {
        self.pending + self.sleeping + self.waiting
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 600;

struct App {
    latest: DiagSnapshot,
    task_history: VecDeque<u64>,
    entity_history: VecDeque<u64>,
    paused: bool,
    connected: bool,
    /// (tick, arrival time) of the previous snapshot, for the tick-rate
    /// estimate.
    last_mark: Option<(u64, Instant)>,
    ticks_per_sec: f64,
}

impl App {
    fn new() -> Self {
        Self {
            latest: DiagSnapshot::default(),
            task_history: VecDeque::with_capacity(HISTORY_CAP),
            entity_history: VecDeque::with_capacity(HISTORY_CAP),
            paused: false,
            connected: false,
            last_mark: None,
            ticks_per_sec: 0.0,
        }
    }

    fn push_snapshot(&mut self, snap: DiagSnapshot) {
        if self.paused {
            return;
        }

        let now = Instant::now();
        if let Some((tick, at)) = self.last_mark {
            let dt = now.duration_since(at).as_secs_f64();
            if dt > 0.0 && snap.tick >= tick {
                self.ticks_per_sec = (snap.tick - tick) as f64 / dt;
            }
        }
        self.last_mark = Some((snap.tick, now));

        if self.task_history.len() >= HISTORY_CAP {
            self.task_history.pop_front();
        }
        self.task_history.push_back(snap.tasks.live() as u64);

        if self.entity_history.len() >= HISTORY_CAP {
            self.entity_history.pop_front();
        }
        self.entity_history.push_back(snap.entities.alive as u64);

        self.latest = snap;
        self.connected = true;
    }
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:9400")
        .expect("Failed to bind UDP port 9400 — is another norn-telemetry running?");
    socket
        .set_nonblocking(true)
        .expect("Failed to set non-blocking");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let mut buf = [0u8; 65536];

    loop {
        // Drain all pending datagrams.
        while let Ok(n) = socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<DiagSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    break;
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,
        _ => {}
    }
    false
}

// ── Drawing ──────────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(8), // sparklines
            Constraint::Min(6),    // pools
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_sparklines(f, app, chunks[1]);
    draw_pools(f, app, chunks[2]);
    draw_help_bar(f, chunks[3]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(status, Style::default().bg(status_color).fg(Color::Black)),
        Span::raw("  "),
        Span::styled("Tick: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.tick),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Rate: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.0} t/s", app.ticks_per_sec),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Sources: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.open_sources),
            Style::default().fg(Color::White),
        ),
    ]);

    let block = Block::default()
        .title(" norn-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_sparklines(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let task_data: Vec<u64> = app.task_history.iter().copied().collect();
    draw_history(f, chunks[0], " Live Tasks ", &task_data, Color::Cyan);

    let entity_data: Vec<u64> = app.entity_history.iter().copied().collect();
    draw_history(f, chunks[1], " Alive Entities ", &entity_data, Color::Magenta);
}

fn draw_history(f: &mut ratatui::Frame, area: Rect, title: &str, data: &[u64], color: Color) {
    let (min, avg, max) = stats(data);
    let block = Block::default()
        .title(format!("{title}(min {min}  avg {avg:.0}  max {max}) "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height >= 2 && !data.is_empty() {
        let visible = data.len().saturating_sub(inner.width as usize);
        let sparkline = Sparkline::default()
            .data(&data[visible..])
            .style(Style::default().fg(color));
        f.render_widget(sparkline, inner);
    }
}

fn draw_pools(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let t = &app.latest.tasks;
    let task_lines = vec![
        pool_line("live", t.live(), Color::Cyan),
        pool_line("  pending", t.pending, Color::White),
        pool_line("  sleeping", t.sleeping, Color::White),
        pool_line("  waiting", t.waiting, Color::White),
        pool_line("retired (await reap)", t.retired, Color::DarkGray),
        slot_line(t.total_slots, t.free_slots),
    ];
    let block = Block::default()
        .title(" Task Pool ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(task_lines).block(block), chunks[0]);

    let e = &app.latest.entities;
    let entity_lines = vec![
        pool_line("alive", e.alive, Color::Magenta),
        slot_line(e.total_slots, e.free_slots),
    ];
    let block = Block::default()
        .title(" Entity Pool ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    f.render_widget(Paragraph::new(entity_lines).block(block), chunks[1]);
}

fn pool_line(label: &str, value: usize, color: Color) -> Line<'_> {
    Line::from(vec![
        Span::styled(format!("{label:<22}"), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{value}"), Style::default().fg(color)),
    ])
}

fn slot_line(total: u32, free: usize) -> Line<'static> {
    let used = total as usize - free;
    let pct = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    Line::from(vec![
        Span::styled(format!("{:<22}", "slots used"), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{used}/{total} ({pct:.0}%)"),
            Style::default().fg(Color::White),
        ),
    ])
}

fn draw_help_bar(f: &mut ratatui::Frame, area: Rect) {
    let help = Line::from(vec![
        Span::styled(" q ", Style::default().fg(Color::Cyan)),
        Span::styled("quit  ", Style::default().fg(Color::DarkGray)),
        Span::styled(" p ", Style::default().fg(Color::Cyan)),
        Span::styled("pause  ", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(help), area);
}

fn stats(data: &[u64]) -> (u64, f64, u64) {
    if data.is_empty() {
        return (0, 0.0, 0);
    }
    let min = *data.iter().min().unwrap();
    let max = *data.iter().max().unwrap();
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (min, avg, max)
}
