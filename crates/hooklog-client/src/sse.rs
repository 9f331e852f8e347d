//! Incremental Server-Sent Events parser

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, `message` when absent
    pub event: String,
    /// `id:` field
    pub id: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Buffers response bytes and yields complete events
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk of bytes to the buffer
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete event, skipping comments and keep-alives.
    ///
    /// Returns `None` until a full event (terminated by a blank line) has
    /// been buffered.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            let boundary = self.find_event_boundary()?;
            let block: Vec<u8> = self.buffer.drain(..boundary.end).collect();
            let text = String::from_utf8_lossy(&block[..boundary.start]);

            if let Some(event) = Self::parse_event(&text) {
                return Some(event);
            }
        }
    }

    /// Earliest blank line, as (end of event content)..(end of delimiter)
    fn find_event_boundary(&self) -> Option<std::ops::Range<usize>> {
        let buf = &self.buffer;
        for i in 0..buf.len() {
            if buf[i..].starts_with(b"\r\n\r\n") {
                return Some(i..i + 4);
            }
            if buf[i..].starts_with(b"\n\n") {
                return Some(i..i + 2);
            }
        }
        None
    }

    fn parse_event(text: &str) -> Option<SseEvent> {
        let mut event = None;
        let mut id = None;
        let mut data: Vec<&str> = Vec::new();

        for line in text.lines() {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event = Some(value.to_string()),
                "id" => id = Some(value.to_string()),
                "data" => data.push(value),
                _ => {}
            }
        }

        if data.is_empty() {
            return None;
        }

        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            id,
            data: data.join("\n"),
        })
    }
}
