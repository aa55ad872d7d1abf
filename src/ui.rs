use crate::{
    app::{App, InputMode},
    engine::FixOutcome,
    fixes::CATALOGUE,
    game::GAME_NAME,
    logging::LogLevel,
};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Padding, Paragraph, Wrap},
};
use std::{io, time::Duration};

const LOG_PANEL_HEIGHT: u16 = 8;

#[derive(Clone)]
struct Theme {
    accent: Color,
    border: Color,
    text: Color,
    muted: Color,
    success: Color,
    warning: Color,
    error: Color,
    header_bg: Color,
}

impl Theme {
    fn new() -> Self {
        Self {
            accent: Color::Rgb(120, 190, 255),
            border: Color::Rgb(65, 75, 90),
            text: Color::Rgb(220, 230, 240),
            muted: Color::Rgb(135, 145, 155),
            success: Color::Rgb(120, 220, 140),
            warning: Color::Rgb(230, 200, 120),
            error: Color::Rgb(235, 100, 95),
            header_bg: Color::Rgb(22, 28, 36),
        }
    }

    fn panel(&self, title: &'static str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.border))
            .title(Span::styled(
                title,
                Style::default()
                    .fg(self.accent)
                    .add_modifier(Modifier::BOLD),
            ))
            .padding(Padding {
                left: 1,
                right: 1,
                top: 0,
                bottom: 0,
            })
    }
}

pub fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_loop(terminal: &mut Terminal<impl Backend>, app: &mut App) -> Result<()> {
    loop {
        app.poll_worker();
        terminal.draw(|frame| draw(frame, app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let mode = std::mem::replace(&mut app.input_mode, InputMode::Normal);
    match mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::EditingPath { mut buffer } => match key.code {
            KeyCode::Esc => {
                app.status = "Path entry cancelled".to_string();
            }
            KeyCode::Enter => {
                if !buffer.trim().is_empty() {
                    app.submit_path(&buffer);
                }
            }
            KeyCode::Backspace => {
                buffer.pop();
                app.input_mode = InputMode::EditingPath { buffer };
            }
            KeyCode::Char(c)
                if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                buffer.push(c);
                app.input_mode = InputMode::EditingPath { buffer };
            }
            _ => app.input_mode = InputMode::EditingPath { buffer },
        },
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::Char(' ') => app.toggle_selected(),
        KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Enter => app.start_apply(),
        KeyCode::Char('d') | KeyCode::Char('D') => app.start_detect(),
        KeyCode::Char('p') | KeyCode::Char('P') => app.begin_path_edit(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.copy_report(),
        KeyCode::PageUp => app.scroll_report(-5),
        KeyCode::PageDown => app.scroll_report(5),
        _ => {}
    }
}

fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.size();
    let theme = Theme::new();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(LOG_PANEL_HEIGHT),
            Constraint::Length(1),
        ])
        .split(area);

    let location = match &app.install {
        Some(install) => Span::styled(install.to_string(), Style::default().fg(theme.text)),
        None => Span::styled("(not set)", Style::default().fg(theme.warning)),
    };
    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            format!("{GAME_NAME} (1998) Compatibility Fixer"),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Game Location: ", Style::default().fg(theme.muted)),
            location,
        ]),
    ])
    .style(Style::default().bg(theme.header_bg))
    .alignment(Alignment::Center);
    frame.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(52), Constraint::Min(20)])
        .split(chunks[1]);

    let items: Vec<ListItem> = CATALOGUE
        .iter()
        .map(|fix| {
            let enabled = app.is_enabled(fix.id);
            let mark = if enabled { "[x] " } else { "[ ] " };
            let style = if enabled {
                Style::default().fg(theme.text)
            } else {
                Style::default().fg(theme.muted)
            };
            let mut spans = vec![Span::styled(mark, style), Span::styled(fix.label, style)];
            if let Some(result) = app.results.iter().find(|result| result.id == fix.id) {
                let (label, color) = outcome_badge(result.outcome, &theme);
                spans.push(Span::styled(format!(" {label}"), Style::default().fg(color)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.selected));
    let list = List::new(items)
        .block(theme.panel("Available Fixes"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, body[0], &mut state);

    let report = app.report.as_deref().unwrap_or(if app.busy {
        "Working..."
    } else {
        "Press a to apply the selected fixes."
    });
    let output = Paragraph::new(report)
        .style(Style::default().fg(theme.text))
        .block(theme.panel("Output"))
        .wrap(Wrap { trim: false })
        .scroll((app.report_scroll, 0));
    frame.render_widget(output, body[1]);

    let log_height = LOG_PANEL_HEIGHT.saturating_sub(2) as usize;
    let log = Paragraph::new(build_log_lines(app, &theme, log_height)).block(theme.panel("Log"));
    frame.render_widget(log, chunks[2]);

    let status = Paragraph::new(status_bar_line(app, chunks[3].width))
        .style(Style::default().fg(theme.muted));
    frame.render_widget(status, chunks[3]);
}

fn outcome_badge(outcome: FixOutcome, theme: &Theme) -> (&'static str, Color) {
    match outcome {
        FixOutcome::Applied => ("✓", theme.success),
        FixOutcome::Skipped => ("skipped", theme.warning),
        FixOutcome::Failed => ("✗", theme.error),
    }
}

fn status_bar_line(app: &App, width: u16) -> String {
    let width = width as usize;
    let (left, right) = match &app.input_mode {
        InputMode::Normal => (format!("Status: {}", app.status), app.hint().to_string()),
        InputMode::EditingPath { buffer } => (
            format!("Game folder: {buffer}"),
            "Enter confirm | Esc cancel".to_string(),
        ),
    };

    if width == 0 {
        return String::new();
    }

    let left_len = left.chars().count();
    let right_len = right.chars().count();
    if left_len + right_len + 1 > width {
        return left;
    }
    format!("{left}{}{right}", " ".repeat(width - left_len - right_len))
}

fn build_log_lines(app: &App, theme: &Theme, height: usize) -> Vec<Line<'static>> {
    let entries = app.log.entries();
    if entries.is_empty() {
        return vec![Line::from(Span::styled(
            "No recent events.",
            Style::default().fg(theme.muted),
        ))];
    }

    let start = entries.len().saturating_sub(height.max(1));
    entries[start..]
        .iter()
        .map(|entry| {
            let (label, color) = match entry.level {
                LogLevel::Info => ("[i]", theme.accent),
                LogLevel::Warn => ("[!]", theme.warning),
                LogLevel::Error => ("[x]", theme.error),
            };
            Line::from(vec![
                Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(theme.text)),
            ])
        })
        .collect()
}
