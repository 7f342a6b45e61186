use crate::controller::{DEBOUNCE_DELAY, SETTLE_DELAY};
use crate::settings::{DEFAULT_BUSCTL_COMMAND, DEFAULT_STORE_POLL_SECS, Settings};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell as TuiCell, Paragraph, Row as TuiRow, Table as TuiTable},
};
use std::error::Error;
use std::path::Path;
use std::time::Duration;

const DEBOUNCE_OPTIONS: &[u64] = &[250, 500, 750, 1000, 1500];
const SETTLE_OPTIONS: &[u64] = &[500, 1000, 1500, 2000, 3000];
const POLL_OPTIONS: &[u64] = &[1, 2, 5, 10, 30];
const ROW_COUNT: usize = 7;

pub(crate) fn apply_editor_defaults(mut settings: Settings) -> Settings {
    if settings.busctl_command.is_none() {
        settings.busctl_command = Some(DEFAULT_BUSCTL_COMMAND.to_string());
    }
    if settings.debounce_ms.is_none() {
        settings.debounce_ms = Some(DEBOUNCE_DELAY.as_millis() as u64);
    }
    if settings.settle_ms.is_none() {
        settings.settle_ms = Some(SETTLE_DELAY.as_millis() as u64);
    }
    if settings.confirm_apply.is_none() {
        settings.confirm_apply = Some(false);
    }
    if settings.restore_on_start.is_none() {
        settings.restore_on_start = Some(true);
    }
    if settings.store_poll_secs.is_none() {
        settings.store_poll_secs = Some(DEFAULT_STORE_POLL_SECS);
    }
    settings
}

/// Steps to the neighbouring option. A value not in the list jumps to the first one.
fn cycle_option(current: Option<u64>, options: &[u64], forward: bool) -> Option<u64> {
    let Some(idx) = current.and_then(|c| options.iter().position(|o| *o == c)) else {
        return options.first().copied();
    };
    let next_idx = if forward {
        (idx + 1) % options.len()
    } else if idx == 0 {
        options.len() - 1
    } else {
        idx - 1
    };
    Some(options[next_idx])
}

fn change_selected(settings: &mut Settings, selected: usize, forward: bool) {
    match selected {
        0 => settings.debounce_ms = cycle_option(settings.debounce_ms, DEBOUNCE_OPTIONS, forward),
        1 => settings.settle_ms = cycle_option(settings.settle_ms, SETTLE_OPTIONS, forward),
        2 => {
            settings.store_poll_secs = cycle_option(settings.store_poll_secs, POLL_OPTIONS, forward)
        }
        3 => settings.confirm_apply = Some(!settings.confirm_apply.unwrap_or(false)),
        4 => settings.restore_on_start = Some(!settings.restore_on_start.unwrap_or(true)),
        _ => {}
    }
}

pub(crate) fn edit_settings_tui(
    title: &str,
    settings: Settings,
    config_path: &Path,
) -> Result<Option<Settings>, Box<dyn Error>> {
    let mut settings = settings;
    let mut selected: usize = 0;

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = (|| -> Result<Option<Settings>, Box<dyn Error>> {
        loop {
            terminal.draw(|f| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Length(4),
                        Constraint::Min(8),
                        Constraint::Length(3),
                    ])
                    .split(f.area());

                let header = Paragraph::new(format!(
                    "{}\nConfig: {}\nbusctl: {}",
                    title,
                    config_path.display(),
                    settings
                        .busctl_command
                        .clone()
                        .unwrap_or_else(|| DEFAULT_BUSCTL_COMMAND.to_string())
                ))
                .block(Block::default().borders(Borders::ALL).title("Context"));
                f.render_widget(header, chunks[0]);

                let rows = vec![
                    (
                        "debounce_ms",
                        settings.debounce_ms.unwrap_or_default().to_string(),
                    ),
                    (
                        "settle_ms",
                        settings.settle_ms.unwrap_or_default().to_string(),
                    ),
                    (
                        "store_poll_secs",
                        settings.store_poll_secs.unwrap_or_default().to_string(),
                    ),
                    (
                        "confirm_apply",
                        settings.confirm_apply.unwrap_or(false).to_string(),
                    ),
                    (
                        "restore_on_start",
                        settings.restore_on_start.unwrap_or(true).to_string(),
                    ),
                    ("save", "Write config and exit".to_string()),
                    ("cancel", "Discard changes".to_string()),
                ];

                let table_rows = rows
                    .into_iter()
                    .enumerate()
                    .map(|(idx, (k, v))| {
                        let style = if idx == selected {
                            Style::default()
                                .fg(Color::Yellow)
                                .add_modifier(Modifier::BOLD)
                        } else {
                            Style::default()
                        };
                        TuiRow::new(vec![TuiCell::from(k), TuiCell::from(v)]).style(style)
                    })
                    .collect::<Vec<_>>();

                let table =
                    TuiTable::new(table_rows, [Constraint::Length(18), Constraint::Min(24)])
                        .header(
                            TuiRow::new(vec!["Field", "Value"])
                                .style(Style::default().add_modifier(Modifier::BOLD)),
                        )
                        .block(
                            Block::default()
                                .borders(Borders::ALL)
                                .title("Config Editor"),
                        );
                f.render_widget(table, chunks[1]);

                let footer = Paragraph::new(
                    "Keys: ↑/↓ select  ←/→ change  Enter activate/toggle  s save  q/Esc cancel",
                )
                .block(Block::default().borders(Borders::ALL).title("Help"));
                f.render_widget(footer, chunks[2]);
            })?;

            if event::poll(Duration::from_millis(200))?
                && let Event::Key(key) = event::read()?
            {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                    KeyCode::Char('s') => return Ok(Some(settings.clone())),
                    KeyCode::Down => selected = (selected + 1) % ROW_COUNT,
                    KeyCode::Up => {
                        selected = if selected == 0 {
                            ROW_COUNT - 1
                        } else {
                            selected - 1
                        };
                    }
                    KeyCode::Left => change_selected(&mut settings, selected, false),
                    KeyCode::Right => change_selected(&mut settings, selected, true),
                    KeyCode::Enter => match selected {
                        5 => return Ok(Some(settings.clone())),
                        6 => return Ok(None),
                        _ => change_selected(&mut settings, selected, true),
                    },
                    _ => {}
                }
            }
        }
    })();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}
