use crate::controller::RawEvent;
use crate::monitor::InputObserver;
use std::io::Write;
use tracing::warn;

/// Prints one aligned `time type code value` line per event
pub struct ConsoleObserver<W: Write + Send> {
    out: W,
}

impl ConsoleObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn format_line(event: &RawEvent) -> String {
    format!(
        "{} {:<8} {:<16} {:>6}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.kind.to_string(),
        event.code,
        event.value
    )
}

impl<W: Write + Send> InputObserver for ConsoleObserver<W> {
    fn display(&mut self, event: &RawEvent) {
        let line = format_line(event);
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write monitor output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lines_are_column_aligned() {
        let mut observer = ConsoleObserver::new(Vec::new());
        observer.display(&RawEvent::absolute("ABS_X", 128));
        observer.display(&RawEvent::key("BTN_THUMB2", 1));

        let text = String::from_utf8(observer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].find("ABS_X"), lines[1].find("BTN_THUMB2"));
        assert!(lines[0].ends_with("   128"));
        assert!(lines[1].ends_with("     1"));
    }
}
