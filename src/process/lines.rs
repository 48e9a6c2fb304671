//! Splitting child output into lines and passing them through filters.

use std::fmt;

use tracing::Level;

use crate::context::{LogSink, Reason};

/// One line of child output on its way to the log.
///
/// A filter may change the level or suppress the line entirely; the reason
/// is fixed by the stream the line was read from.
#[derive(Debug)]
pub struct FilterEvent<'a> {
    line: &'a str,
    reason: Reason,
    /// Level the line will be logged at.
    pub level: Level,
    /// Drop the line instead of logging it.
    pub suppress: bool,
}

impl<'a> FilterEvent<'a> {
    #[must_use]
    pub fn new(line: &'a str, reason: Reason, level: Level) -> Self {
        Self {
            line,
            reason,
            level,
            suppress: false,
        }
    }

    #[must_use]
    pub fn line(&self) -> &'a str {
        self.line
    }

    #[must_use]
    pub fn reason(&self) -> Reason {
        self.reason
    }
}

/// Per-line decision hook.
pub type Filter = Box<dyn FnMut(&mut FilterEvent<'_>) + Send>;

/// Turns raw chunks from one output stream into logged lines.
///
/// A line split across two chunks is held back until its newline arrives;
/// whatever is left when the stream ends is emitted by [`LineReader::finish`].
pub struct LineReader {
    reason: Reason,
    level: Level,
    filter: Option<Filter>,
    partial: Vec<u8>,
}

impl fmt::Debug for LineReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineReader")
            .field("reason", &self.reason)
            .field("level", &self.level)
            .field("filter", &self.filter.is_some())
            .field("partial", &self.partial.len())
            .finish()
    }
}

impl LineReader {
    #[must_use]
    pub fn new(reason: Reason, level: Level, filter: Option<Filter>) -> Self {
        Self {
            reason,
            level,
            filter,
            partial: Vec::new(),
        }
    }

    /// Log every complete line in `chunk`.
    pub fn feed(&mut self, chunk: &[u8], sink: &dyn LogSink) {
        if chunk.is_empty() {
            return;
        }

        self.partial.extend_from_slice(chunk);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return;
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        for line in complete.split(|&b| b == b'\n') {
            self.emit(line, sink);
        }
    }

    /// Log the trailing line, if any, once the stream has ended.
    pub fn finish(&mut self, sink: &dyn LogSink) {
        let rest = std::mem::take(&mut self.partial);
        self.emit(&rest, sink);
    }

    fn emit(&mut self, raw: &[u8], sink: &dyn LogSink) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let text = String::from_utf8_lossy(raw);
        let mut event = FilterEvent::new(&text, self.reason, self.level);

        if let Some(filter) = self.filter.as_mut() {
            filter(&mut event);
            if event.suppress {
                return;
            }
        }

        sink.log(event.reason, event.level, event.line);
    }
}
