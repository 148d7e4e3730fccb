//! TUI for batch validation with live progress

use crate::proxy::{
    BatchScheduler, BatchStats, Probe, Proxy, Resolve, TestOutcome, TestResult,
};
use crate::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Maximum number of recent results to keep per list
const MAX_RECENT_RESULTS: usize = 100;

/// Live view of a running batch
pub struct ProxyCheckerApp<R, P> {
    scheduler: BatchScheduler<R, P>,
    proxies: Vec<Proxy>,
    concurrency: usize,
    good_output: Option<PathBuf>,
    bad_output: Option<PathBuf>,
    total: usize,
    /// Every result received so far, for the final statistics
    results: Vec<TestResult>,
    good_count: usize,
    bad_count: usize,
    recent_good: VecDeque<TestResult>,
    recent_bad: VecDeque<TestResult>,
    /// Selected list (0 = good, 1 = bad)
    selected_list: usize,
    list_state: ListState,
    status_message: String,
    is_complete: bool,
    should_quit: bool,
}

impl<R, P> ProxyCheckerApp<R, P>
where
    R: Resolve + 'static,
    P: Probe + 'static,
{
    pub fn new(
        scheduler: BatchScheduler<R, P>,
        proxies: Vec<Proxy>,
        concurrency: usize,
        good_output: Option<PathBuf>,
        bad_output: Option<PathBuf>,
    ) -> Self {
        let total = proxies.len();
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            scheduler,
            proxies,
            concurrency,
            good_output,
            bad_output,
            total,
            results: Vec::with_capacity(total),
            good_count: 0,
            bad_count: 0,
            recent_good: VecDeque::new(),
            recent_bad: VecDeque::new(),
            selected_list: 0,
            list_state,
            status_message: "Starting validation... Press 'q' to quit.".to_string(),
            is_complete: false,
            should_quit: false,
        }
    }

    /// Run the TUI until the user quits, returning the statistics of what was
    /// validated by then
    pub async fn run(&mut self) -> Result<BatchStats> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result?;
        Ok(BatchStats::from_results(&self.results))
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut good_file = open_output(self.good_output.as_ref())?;
        let mut bad_file = open_output(self.bad_output.as_ref())?;

        let (mut rx, handle) = self
            .scheduler
            .spawn(std::mem::take(&mut self.proxies), self.concurrency);
        // Leaving early, on quit or on error, abandons the validations in flight
        let _batch = AbortOnDrop(handle);

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Drain everything that finished since the last frame
            loop {
                match rx.try_recv() {
                    Ok(result) => {
                        let file = if result.is_working() {
                            good_file.as_mut()
                        } else {
                            bad_file.as_mut()
                        };
                        if let Some(file) = file {
                            writeln!(file, "{}", result.proxy.to_full_string())?;
                            file.flush()?;
                        }
                        self.record(result);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !self.is_complete {
                            self.is_complete = true;
                            let stats = BatchStats::from_results(&self.results);
                            self.status_message = format!(
                                "Complete! Checked: {} | Working: {} | Failed: {} | Avg latency: {:.0}ms | Press 'q' to quit",
                                stats.total, stats.working, stats.failed, stats.avg_latency_ms
                            );
                        }
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn record(&mut self, result: TestResult) {
        let (list, count) = if result.is_working() {
            (&mut self.recent_good, &mut self.good_count)
        } else {
            (&mut self.recent_bad, &mut self.bad_count)
        };
        *count += 1;
        list.push_back(result.clone());
        if list.len() > MAX_RECENT_RESULTS {
            list.pop_front();
        }
        self.results.push(result);

        let checked = self.results.len();
        let percentage = (checked as f64 / self.total as f64 * 100.0) as u32;
        self.status_message = format!(
            "Validating... {}% ({}/{}) | Working: {} | Failed: {}",
            percentage, checked, self.total, self.good_count, self.bad_count
        );
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.selected_list = (self.selected_list + 1) % 2;
                self.list_state.select(Some(0));
            }
            KeyCode::Down => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let len = self.selected_len();
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn selected_len(&self) -> usize {
        if self.selected_list == 0 {
            self.recent_good.len()
        } else {
            self.recent_bad.len()
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Result lists
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Validator")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let checked = self.results.len();
        let progress = if self.total > 0 {
            (checked as f64 / self.total as f64 * 100.0) as u16
        } else {
            100
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(progress.min(100))
            .label(format!("{}/{} ({}%)", checked, self.total, progress));
        f.render_widget(gauge, chunks[1]);

        let list_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        render_result_list(
            f,
            list_chunks[0],
            "Working",
            &self.recent_good,
            self.good_count,
            Color::Green,
            if self.selected_list == 0 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );
        render_result_list(
            f,
            list_chunks[1],
            "Failed",
            &self.recent_bad,
            self.bad_count,
            Color::Red,
            if self.selected_list == 1 {
                Some(&mut self.list_state)
            } else {
                None
            },
        );

        let status = Paragraph::new(self.status_message.clone())
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }
}

/// Aborts the spawned batch when the view goes away
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Option<File>> {
    let file = path
        .map(|p| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(p)
        })
        .transpose()?;
    Ok(file)
}

/// One line per result: address plus egress IP and latency, or the failure kind
fn describe(result: &TestResult) -> String {
    match &result.outcome {
        TestOutcome::Working {
            ip,
            latency_ms,
            location,
            ..
        } => match location {
            Some(location) => format!(
                "{} -> {} ({}ms, {})",
                result.proxy.to_simple_string(),
                ip,
                latency_ms,
                location.short_display()
            ),
            None => format!("{} -> {} ({}ms)", result.proxy.to_simple_string(), ip, latency_ms),
        },
        TestOutcome::Failed { error_kind, .. } => {
            format!("{} [{}]", result.proxy.to_simple_string(), error_kind)
        }
    }
}

fn render_result_list(
    f: &mut Frame,
    area: Rect,
    title: &str,
    results: &VecDeque<TestResult>,
    total_count: usize,
    color: Color,
    list_state: Option<&mut ListState>,
) {
    let items: Vec<ListItem> = results
        .iter()
        .rev() // Show newest first
        .map(|result| ListItem::new(describe(result)).style(Style::default().fg(color)))
        .collect();

    let border_style = if list_state.is_some() {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ({})", title, total_count))
                .border_style(border_style),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol(">> ");

    match list_state {
        Some(state) => f.render_stateful_widget(list, area, state),
        None => f.render_widget(list, area),
    }
}
