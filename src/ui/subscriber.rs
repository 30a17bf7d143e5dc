// GNU AGPL v3 License

use super::UiDirective;
use std::{
    fmt::Write as _,
    mem,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing::{field::Visit, level_filters::LevelFilter, span, Id, Level, Subscriber};
use tui::{
    style::{Color, Modifier, Style},
    text::{Span, Spans},
};

/// Lines kept for the tracing pane.
const MAX_LINES: usize = 1000;

/// A subscriber that listens for events and records them for use in the UI.
pub(crate) struct UiSubscriber {
    inner: Arc<Mutex<Inner>>,
    notify: mpsc::Sender<UiDirective>,
    max_level: Level,
}

pub(super) struct Inner {
    pub(super) lines: Vec<Spans<'static>>,
}

impl Inner {
    fn push(&mut self, line: Spans<'static>) {
        if self.lines.len() >= MAX_LINES {
            self.lines.drain(..self.lines.len() + 1 - MAX_LINES);
        }
        self.lines.push(line);
    }
}

impl UiSubscriber {
    pub(crate) fn new(notify: mpsc::Sender<UiDirective>, max_level: Level) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { lines: Vec::new() })),
            notify,
            max_level,
        }
    }

    pub(super) fn inner(&self) -> &Arc<Mutex<Inner>> {
        &self.inner
    }
}

impl Subscriber for UiSubscriber {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        *metadata.level() <= self.max_level
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::from_level(self.max_level))
    }

    fn new_span(&self, _span: &span::Attributes<'_>) -> span::Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        let md = event.metadata();

        // add spans for each part
        let level_span = match *md.level() {
            Level::ERROR => Span::styled(
                "ERROR ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Level::WARN => Span::styled(
                "WARN  ",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Level::INFO => Span::styled("INFO  ", Style::default().fg(Color::Green)),
            Level::DEBUG => Span::styled("DEBUG ", Style::default().fg(Color::Cyan)),
            _ => Span::styled("TRACE ", Style::default().fg(Color::Blue)),
        };

        // add a span for the event body
        let mut buffer = String::new();
        let mut visitor = BufferVisitor {
            buffer: &mut buffer,
        };
        event.record(&mut visitor);

        let mut inner = match self.inner.try_lock() {
            Ok(inner) => inner,
            Err(_) => return,
        };
        inner.push(Spans(vec![level_span, Span::from(buffer)]));
        mem::drop(inner);

        // send a notification to the UI to refresh
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let notify = self.notify.clone();
            handle.spawn(async move {
                notify.send(UiDirective::Refresh).await.ok();
            });
        }
    }

    fn enter(&self, _span: &span::Id) {}

    fn exit(&self, _span: &span::Id) {}
}

struct BufferVisitor<'a> {
    buffer: &'a mut String,
}

impl<'a> Visit for BufferVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }

        if field.name() == "message" {
            let _ = write!(self.buffer, "{:?}", value);
        } else {
            let _ = write!(self.buffer, "{}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_is_bounded() {
        let mut inner = Inner { lines: Vec::new() };
        for i in 0..MAX_LINES + 5 {
            inner.push(Spans::from(i.to_string()));
        }

        assert_eq!(inner.lines.len(), MAX_LINES);
        assert_eq!(inner.lines[0], Spans::from("5".to_string()));
    }

    #[test]
    fn events_above_max_level_are_skipped() {
        let (notify, _recv) = mpsc::channel(1);
        let sub = UiSubscriber::new(notify, Level::INFO);
        let lines = sub.inner().clone();

        tracing::subscriber::with_default(sub, || {
            tracing::info!("kept");
            tracing::debug!("dropped");
            tracing::warn!(frames = 3, "also kept");
        });

        let lines = lines.lock().unwrap();
        assert_eq!(lines.lines.len(), 2);
        assert_eq!(lines.lines[1].0[1].content, "also kept frames=3");
    }
}
