/// Incremental SSE (Server-Sent Events) parser for streamed chat completions.
///
/// SSE format: events separated by a blank line, each containing optional `event:` and `data:` lines.

/// A single parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `data:` field content; multiple `data:` lines are joined with `\n`.
    pub data: String,
}

/// Buffers incomplete lines across chunk boundaries.
///
/// Bytes are kept raw until a whole event block has arrived, so a UTF-8
/// character split between network chunks is decoded intact.
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw bytes from the HTTP response. Returns any complete SSE events found.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // Drop CR so a `\r\n\r\n` boundary is found even when split across chunks.
        // 0x0D never occurs inside a multi-byte UTF-8 sequence.
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();

        while let Some(boundary) = find_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..boundary + 2).collect();
            let block = String::from_utf8_lossy(&raw);

            let mut event_type: Option<String> = None;
            let mut data_lines: Vec<&str> = Vec::new();

            for line in block.lines() {
                if let Some(val) = line.strip_prefix("event:") {
                    event_type = Some(val.trim().to_string());
                } else if let Some(val) = line.strip_prefix("data:") {
                    data_lines.push(val.strip_prefix(' ').unwrap_or(val));
                }
                // id:, retry: and `:` comments are ignored
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event: event_type,
                    data: data_lines.join("\n"),
                });
            }
        }

        events
    }

    /// Whatever is left once the stream ends, if it forms an event without a trailing blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        self.feed(b"\n\n").into_iter().next()
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_sse() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: hello\n\ndata: world\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "world");
    }

    #[test]
    fn test_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"choices\":").is_empty());
        let events = parser.feed(b"[]}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"choices\":[]}");
    }

    #[test]
    fn test_crlf_boundary_split_between_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: one\r\n").is_empty());
        let events = parser.feed(b"\r\ndata: two\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn test_comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keep-alive\n\nevent: delta\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut parser = SseParser::new();
        let bytes = "data: café ✓\n\n".as_bytes();
        // Cut inside the three-byte check mark
        let cut = bytes.len() - 4;
        assert!(parser.feed(&bytes[..cut]).is_empty());
        let events = parser.feed(&bytes[cut..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "café ✓");
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: [DONE]").is_empty());
        let last = parser.finish().unwrap();
        assert_eq!(last.data, "[DONE]");
        assert!(parser.finish().is_none());
    }
}
