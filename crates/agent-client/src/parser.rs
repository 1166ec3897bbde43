//! Line-oriented `event:`/`data:` frame parser for the agent streaming
//! protocol. Blank lines delimit frames; consecutive `data:` lines
//! within a frame concatenate with newline separators; bytes that don't
//! parse as a recognized field are skipped rather than aborting the
//! stream.

/// One decoded raw frame before it is matched against a known event type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser fed arbitrary byte chunks as they arrive over the
/// wire; call [`StreamParser::push`] per chunk and drain completed frames.
#[derive(Default)]
pub struct StreamParser {
    buf: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes (assumed UTF-8; invalid bytes are replaced).
    /// Returns every frame completed by a blank line within this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        loop {
            let Some(idx) = self.buf.find('\n') else {
                break;
            };
            let line = self.buf[..idx].trim_end_matches('\r').to_string();
            self.buf.drain(..=idx);

            if line.is_empty() {
                if self.event.is_some() || !self.data_lines.is_empty() {
                    frames.push(RawFrame {
                        event: self.event.take(),
                        data: self.data_lines.join("\n"),
                    });
                    self.data_lines.clear();
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("event:") {
                self.event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data_lines.push(rest.trim_start().to_string());
            }
            // Any other line shape (malformed bytes between frames) is skipped.
        }

        frames
    }

    /// Flush whatever partial frame remains when the connection closes
    /// without a trailing blank line.
    pub fn finish(mut self) -> Option<RawFrame> {
        if self.event.is_some() || !self.data_lines.is_empty() {
            Some(RawFrame {
                event: self.event.take(),
                data: self.data_lines.join("\n"),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_then_done() {
        let mut parser = StreamParser::new();
        let input = b"event: delta\ndata: {\"text\":\"hi\"}\n\nevent: done\ndata: {\"final_message\":\"hi\"}\n\n";
        let frames = parser.push(input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("delta"));
        assert_eq!(frames[0].data, r#"{"text":"hi"}"#);
        assert_eq!(frames[1].event.as_deref(), Some("done"));
    }

    #[test]
    fn concatenates_multiline_data() {
        let mut parser = StreamParser::new();
        let input = b"event: delta\ndata: line1\ndata: line2\n\n";
        let frames = parser.push(input);
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn handles_chunk_boundaries_mid_line() {
        let mut parser = StreamParser::new();
        let mut frames = parser.push(b"event: del");
        assert!(frames.is_empty());
        frames = parser.push(b"ta\ndata: hi\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("delta"));
    }

    #[test]
    fn skips_malformed_lines_between_frames() {
        let mut parser = StreamParser::new();
        let input = b"garbage line\nevent: delta\ndata: ok\n\n";
        let frames = parser.push(input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "ok");
    }

    #[test]
    fn finish_flushes_trailing_frame_without_blank_line() {
        let mut parser = StreamParser::new();
        let frames = parser.push(b"event: done\ndata: {}");
        assert!(frames.is_empty());
        let tail = parser.finish();
        assert_eq!(tail.unwrap().event.as_deref(), Some("done"));
    }
}
