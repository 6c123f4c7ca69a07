use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use makito_core::feedback::{self, Rgb};
use makito_core::{
    PollScheduler, SchedulerState, Snapshot, SnapshotStore, Transport, Vars, DECODER_COUNT,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, Paragraph};
use ratatui::Terminal;

use crate::{display_value, log_failures};

const SERIES_COLORS: [Color; DECODER_COUNT] = [Color::Yellow, Color::Cyan, Color::Green, Color::Magenta];

/// Leading number of a bitrate label such as `"5000 kbps"`.
pub(crate) fn parse_kbps(label: &str) -> Option<f64> {
    label.split_whitespace().next()?.parse().ok()
}

/// Only a polling scheduler ticks; with polling off the first snapshot stays.
pub(crate) fn tick_due(state: SchedulerState, now: Instant, next_tick: Instant) -> bool {
    matches!(state, SchedulerState::Polling { .. }) && now >= next_tick
}

pub(crate) struct BitrateSeries {
    label: String,
    color: Color,
    points: VecDeque<(f64, f64)>,
}

impl BitrateSeries {
    pub(crate) fn new(label: String, color: Color) -> Self {
        Self {
            label,
            color,
            points: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, x: f64, y: f64, window_sec: f64) {
        self.points.push_back((x, y));
        while let Some((old_x, _)) = self.points.front() {
            if x - old_x > window_sec {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }
}

pub(crate) fn y_bounds(series: &[BitrateSeries]) -> [f64; 2] {
    let max = series
        .iter()
        .flat_map(|s| s.points.iter().map(|(_, y)| *y))
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        [0.0, 1.0]
    } else {
        [0.0, max * 1.12]
    }
}

struct DecoderTile {
    vars: Vars,
    style: Option<feedback::Style>,
    has_thumbnail: bool,
}

struct ViewerState {
    start: Instant,
    latest: Option<Snapshot>,
    tiles: Vec<DecoderTile>,
    series: Vec<BitrateSeries>,
}

impl ViewerState {
    fn new() -> Self {
        let series = SERIES_COLORS
            .iter()
            .enumerate()
            .map(|(index, color)| BitrateSeries::new(format!("Decoder {index}"), *color))
            .collect();

        Self {
            start: Instant::now(),
            latest: None,
            tiles: Vec::new(),
            series,
        }
    }

    fn update(&mut self, store: &SnapshotStore, window_sec: f64) {
        let t = self.start.elapsed().as_secs_f64();
        let snapshot = store.snapshot();

        self.tiles = (0..DECODER_COUNT)
            .map(|index| DecoderTile {
                vars: snapshot.decoder(index).cloned().unwrap_or_default(),
                style: feedback::decoder_state_style(store, index),
                has_thumbnail: feedback::decoder_thumbnail(store, index).is_some(),
            })
            .collect();

        for (index, series) in self.series.iter_mut().enumerate() {
            let kbps = snapshot
                .decoder(index)
                .and_then(|vars| vars.get("stream_bitrate"))
                .and_then(|value| value.as_str())
                .and_then(parse_kbps)
                .unwrap_or(0.0);
            series.push(t, kbps, window_sec);
        }
        self.latest = Some(snapshot);
    }
}

pub async fn run_viewer<T: Transport>(scheduler: &mut PollScheduler<T>, window_sec: f64) -> Result<()> {
    let failures = scheduler.start().await?;
    log_failures(&failures);
    let store = scheduler.store().clone();
    let interval = scheduler.connection().config().poll_interval;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = ViewerState::new();
    state.update(&store, window_sec);
    let mut next_tick = Instant::now() + interval;

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        break;
                    }
                }
            }

            if tick_due(scheduler.state(), Instant::now(), next_tick) {
                scheduler.tick().await;
                state.update(&store, window_sec);
                next_tick = Instant::now() + interval;
            }

            terminal.draw(|frame| draw_ui(frame.size(), frame, &state, window_sec))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    scheduler.stop();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

fn draw_ui(area: Rect, frame: &mut ratatui::Frame<'_>, state: &ViewerState, window_sec: f64) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Percentage(55),
            Constraint::Min(0),
        ])
        .split(area);

    frame.render_widget(render_header(state, window_sec), rows[0]);

    let tile_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let mut index = 0;
    for row_area in tile_rows.iter().copied() {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(row_area);

        for col in cols.iter().copied() {
            match state.tiles.get(index) {
                Some(tile) => frame.render_widget(render_tile(index, tile), col),
                None => frame.render_widget(Paragraph::new(Line::from(" ")), col),
            }
            index += 1;
        }
    }

    render_bitrate_chart(frame, rows[2], state, window_sec);
}

fn render_header(state: &ViewerState, window_sec: f64) -> Paragraph<'static> {
    let mut lines = Vec::new();
    if let Some(snapshot) = &state.latest {
        let var = |key: &str| snapshot.system.get(key).map(display_value).unwrap_or_default();
        let status = format!(
            "{}  status={} tick={} temp={} uptime={}",
            var("connection_status"),
            snapshot.status.code(),
            snapshot.tick,
            var("device_temperature"),
            var("device_uptime"),
        );
        let device = format!(
            "{} {} (serial {}, firmware {})  preset={}  window={}s  (press 'q' to quit)",
            var("device_type"),
            var("device_ip"),
            var("device_serial"),
            var("device_version"),
            var("preset_active"),
            window_sec as u64
        );
        lines.push(Line::from(vec![
            Span::styled("Makito X4  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(status),
        ]));
        lines.push(Line::from(device));
    } else {
        lines.push(Line::from("Waiting first snapshot..."));
    }

    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Device"))
}

fn render_tile(index: usize, tile: &DecoderTile) -> Paragraph<'static> {
    let var = |key: &str| tile.vars.get(key).map(display_value).unwrap_or_default();
    let style = match tile.style {
        Some(style) => Style::default().bg(color(style.bg)).fg(color(style.fg)),
        None => Style::default(),
    };

    let lines = vec![
        Line::from(Span::styled(var("state"), style.add_modifier(Modifier::BOLD))),
        Line::from(format!("stream   {} ({})", var("stream_name"), var("stream_protocol"))),
        Line::from(format!("link     {}", var("stream_summary"))),
        Line::from(format!("bitrate  {}", var("stream_bitrate"))),
        Line::from(format!(
            "video    {} {} {}",
            var("video_algorithm"),
            var("video_input_resolution"),
            var("video_input_framerate")
        )),
        Line::from(format!("uptime   {}", var("uptime"))),
        Line::from(format!(
            "preview  {}",
            if tile.has_thumbnail { "available" } else { "none" }
        )),
    ];

    let title = format!("{index}: {}", var("name"));
    Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(style)
            .title(title),
    )
}

fn render_bitrate_chart(frame: &mut ratatui::Frame<'_>, area: Rect, state: &ViewerState, window_sec: f64) {
    let now_sec = state.start.elapsed().as_secs_f64();
    let x_min = (now_sec - window_sec).max(0.0);
    let x_max = now_sec.max(window_sec);
    let x_mid = (x_min + x_max) / 2.0;
    let y = y_bounds(&state.series);

    let points: Vec<Vec<(f64, f64)>> = state
        .series
        .iter()
        .map(|series| series.points.iter().copied().collect())
        .collect();
    let datasets = state
        .series
        .iter()
        .zip(&points)
        .map(|(series, data)| {
            Dataset::default()
                .name(series.label.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(ratatui::widgets::GraphType::Line)
                .style(Style::default().fg(series.color))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title("Stream bitrate (kbps)"))
        .x_axis(
            Axis::default()
                .title("time (s)")
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{x_min:.0}")),
                    Span::raw(format!("{x_mid:.0}")),
                    Span::raw(format!("{x_max:.0}")),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("kbps")
                .style(Style::default().fg(Color::Gray))
                .bounds(y)
                .labels(vec![
                    Span::raw(format!("{:.0}", y[0])),
                    Span::raw(format!("{:.0}", (y[0] + y[1]) / 2.0)),
                    Span::raw(format!("{:.0}", y[1])),
                ]),
        );

    frame.render_widget(chart, area);
}
