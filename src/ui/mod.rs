// GNU AGPL v3 License

use crate::segment::ScanProgress;
use anyhow::{anyhow, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{
    io::{self, Write},
    process,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tracing::Level;
use tui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};

mod subscriber;

/// Run the UI thread.
///
/// Communicates with the rest of the program via a channel.
pub(crate) async fn ui_thread(
    send_data: mpsc::Receiver<UiDirective>,
    sender: mpsc::Sender<UiDirective>,
    ui_data: broadcast::Sender<UiMessage>,
    max_level: Level,
) -> Result<()> {
    // establish our backend
    let mut terminal = tokio::task::spawn_blocking(|| {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        anyhow::Ok(terminal)
    })
    .await??;

    let mut cleanup = Cleanup {
        terminal: &mut terminal,
        cleaned: false,
    };

    run_ui(cleanup.terminal, send_data, sender, ui_data, max_level).await?;

    // restore the terminal that was there before
    tokio::task::block_in_place(move || cleanup.cleanup())?;

    Ok(())
}

/// Stand-in for the UI thread when logging straight to stderr.
///
/// Reports progress through tracing and turns Ctrl-C into a halt request.
pub(crate) async fn headless(
    mut send_data: mpsc::Receiver<UiDirective>,
    ui_data: broadcast::Sender<UiMessage>,
) -> Result<()> {
    loop {
        tokio::select! {
            directive = send_data.recv() => {
                match directive {
                    Some(UiDirective::Stop) | None => return Ok(()),
                    Some(UiDirective::Progress { label, done, total }) if done == total => {
                        tracing::info!("{}: {} / {}", label, done, total);
                    }
                    Some(_) => {}
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::warn!("Interrupted, stopping");
                ui_data.send(UiMessage::Halt).ok();
            }
        }
    }
}

struct Cleanup<'a, W: Write> {
    terminal: &'a mut Terminal<CrosstermBackend<W>>,
    cleaned: bool,
}

impl<'a, W: Write> Cleanup<'a, W> {
    fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        self.terminal.show_cursor()?;
        self.cleaned = true;

        anyhow::Ok(())
    }
}

impl<'a, W: Write> Drop for Cleanup<'a, W> {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = self.cleanup();
        }
    }
}

async fn run_ui<B: Backend + Send + 'static>(
    terminal: &mut Terminal<B>,
    mut send_data: mpsc::Receiver<UiDirective>,
    sender: mpsc::Sender<UiDirective>,
    ui_data: broadcast::Sender<UiMessage>,
    max_level: Level,
) -> Result<()> {
    // set up an event stream
    let mut event_stream = EventStream::new();

    // open up a tracing channel
    let sub = subscriber::UiSubscriber::new(sender, max_level);
    let span_events = sub.inner().clone();
    tracing::subscriber::set_global_default(sub)?;

    // state for the UI drawing
    let mut state = DrawState {
        message: Message::Text("Loading...".to_string()),
        progress: None,
        tracing_events: span_events,
    };

    let mut running = true;
    loop {
        // block in place while we draw the UI
        tokio::task::block_in_place(|| terminal.draw(|frame| draw_ui(frame, &mut state)))?;

        // wait for an event from either the UI or the channel from the main program
        tokio::select! {
            directive = send_data.recv() => {
                match directive {
                    Some(UiDirective::Stop) | None => {
                        running = false;
                        state.message = Message::Finished;
                    },
                    Some(UiDirective::Refresh) => {},
                    Some(_) if !running => {},
                    Some(UiDirective::DisplayText(text)) => state.message = Message::Text(text),
                    Some(UiDirective::Progress { label, done, total }) => {
                        state.progress = Some(Progress { label, done, total });
                    }
                }
            },
            event = event_stream.next() => {
                let event = match event {
                    Some(event) => event?,
                    None => return Ok(()),
                };

                if let Event::Key(key) = event {
                    if !running {
                        return Ok(());
                    }

                    // if the user hits ctrl-c, stop the program
                    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        ui_data.send(UiMessage::Halt).ok();

                        // spawn a task that exits the process after 5 seconds if something
                        // is hanging
                        tokio::spawn(async {
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            process::exit(1);
                        });

                        return Err(anyhow!("User requested exit"));
                    }
                }
            }
        }
    }
}

fn draw_ui(frame: &mut Frame<'_, impl Backend>, state: &mut DrawState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(3),
            ]
            .as_ref(),
        )
        .split(frame.size());

    let text = match &state.message {
        Message::Text(text) => text.as_str(),
        Message::Finished => "Press any key to continue...",
    };
    let spans = Spans::from(Span::styled(
        text,
        Style::default().add_modifier(Modifier::BOLD),
    ));
    let p = Paragraph::new(spans)
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL).title("Message"));
    frame.render_widget(p, chunks[0]);

    let (title, ratio, label) = match &state.progress {
        Some(progress) => (
            progress.label,
            progress.ratio(),
            format!("{} / {}", progress.done, progress.total),
        ),
        None => ("Progress", 0.0, String::new()),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, chunks[1]);

    let height = chunks[2].height.saturating_sub(2);
    let lines = state
        .tracing_events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .lines
        .iter()
        .rev()
        .take(height as usize)
        .rev()
        .cloned()
        .collect::<Vec<_>>();
    let p = Paragraph::new(lines)
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::ALL).title("Tracing"));
    frame.render_widget(p, chunks[2]);
}

struct DrawState {
    message: Message,
    progress: Option<Progress>,
    tracing_events: Arc<Mutex<subscriber::Inner>>,
}

enum Message {
    Text(String),
    Finished,
}

struct Progress {
    label: &'static str,
    done: usize,
    total: usize,
}

impl Progress {
    fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug)]
pub(crate) enum UiDirective {
    /// Request the UI to display some text.
    DisplayText(String),
    /// Report how far a long-running stage is.
    Progress {
        label: &'static str,
        done: usize,
        total: usize,
    },
    /// Request the UI to stop gracefully.
    Stop,
    /// We just need to refresh.
    Refresh,
}

#[derive(Debug, Clone)]
pub(crate) enum UiMessage {
    /// Halt the program as gracefully as possible.
    Halt,
}

impl ScanProgress for mpsc::Sender<UiDirective> {
    fn frames_scanned(&self, done: usize, total: usize) {
        // a full channel only drops a tick
        self.try_send(UiDirective::Progress {
            label: "Scanning for silence",
            done,
            total,
        })
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_ratio_is_clamped() {
        let progress = Progress {
            label: "scan",
            done: 5,
            total: 4,
        };
        assert_eq!(progress.ratio(), 1.0);

        let empty = Progress {
            label: "scan",
            done: 0,
            total: 0,
        };
        assert_eq!(empty.ratio(), 1.0);
    }

    #[tokio::test]
    async fn scan_ticks_become_progress() {
        let (send, mut recv) = mpsc::channel(4);
        send.frames_scanned(10, 20);

        match recv.recv().await {
            Some(UiDirective::Progress { done, total, .. }) => assert_eq!((done, total), (10, 20)),
            other => panic!("unexpected directive: {:?}", other),
        }
    }

    #[tokio::test]
    async fn headless_stops_on_directive() {
        let (send, recv) = mpsc::channel(4);
        let (halt, _) = broadcast::channel(1);

        send.send(UiDirective::DisplayText("working".into()))
            .await
            .unwrap();
        send.send(UiDirective::Stop).await.unwrap();
        headless(recv, halt).await.unwrap();
    }
}
