//! Split streaming response bodies into payloads.
//!
//! Network chunks arrive at arbitrary byte boundaries, including inside a
//! multi-byte character. The decoder buffers raw bytes and only hands out
//! payloads whose frame is complete.

use crate::provider::Framing;

/// Incremental frame decoder.
#[derive(Debug)]
pub struct EventDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl EventDecoder {
    #[must_use]
    pub const fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Feed a chunk and return every payload it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some((end, skip)) = self.next_boundary() {
            let frame: Vec<u8> = self.buffer.drain(..end + skip).take(end).collect();
            let frame = String::from_utf8_lossy(&frame);
            if let Some(payload) = self.decode_frame(&frame) {
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Flush a final frame that was not terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let frame = String::from_utf8_lossy(&rest);
        self.decode_frame(&frame)
    }

    /// Position and length of the next frame terminator.
    fn next_boundary(&self) -> Option<(usize, usize)> {
        match self.framing {
            Framing::JsonLines => self.buffer.iter().position(|&b| b == b'\n').map(|i| (i, 1)),
            Framing::Sse => {
                let lf = find(&self.buffer, b"\n\n").map(|i| (i, 2));
                let crlf = find(&self.buffer, b"\r\n\r\n").map(|i| (i, 4));
                match (lf, crlf) {
                    (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
                    (a, b) => a.or(b),
                }
            }
        }
    }

    fn decode_frame(&self, frame: &str) -> Option<String> {
        match self.framing {
            Framing::JsonLines => {
                let line = frame.trim();
                (!line.is_empty()).then(|| line.to_string())
            }
            Framing::Sse => {
                let mut data: Option<String> = None;
                for line in frame.lines() {
                    let line = line.trim_end_matches('\r');
                    let Some(rest) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let rest = rest.strip_prefix(' ').unwrap_or(rest);
                    match &mut data {
                        Some(joined) => {
                            joined.push('\n');
                            joined.push_str(rest);
                        }
                        None => data = Some(rest.to_string()),
                    }
                }
                let data = data?;
                if data.trim() == "[DONE]" {
                    return None;
                }
                Some(data)
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_events_split_across_chunks() {
        let mut decoder = EventDecoder::new(Framing::Sse);
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\n\ndata: {\"b\":2}\n\n"), vec![
            r#"{"a":1}"#.to_string(),
            r#"{"b":2}"#.to_string()
        ]);
    }

    #[test]
    fn sse_skips_comments_event_names_and_done() {
        let mut decoder = EventDecoder::new(Framing::Sse);
        let payloads =
            decoder.push(b": keep-alive\n\nevent: message_start\r\ndata: {\"x\":1}\r\n\r\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec![r#"{"x":1}"#.to_string()]);
    }

    #[test]
    fn sse_joins_multiline_data() {
        let mut decoder = EventDecoder::new(Framing::Sse);
        let payloads = decoder.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(payloads, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn multibyte_character_split_between_chunks() {
        let bytes = "data: {\"t\":\"h\u{e9}llo\"}\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = EventDecoder::new(Framing::Sse);
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec![
            "{\"t\":\"h\u{e9}llo\"}".to_string()
        ]);
    }

    #[test]
    fn json_lines_and_unterminated_tail() {
        let mut decoder = EventDecoder::new(Framing::JsonLines);
        assert_eq!(decoder.push(b"{\"a\":1}\n\n{\"b\""), vec![r#"{"a":1}"#.to_string()]);
        assert!(decoder.push(b":2}").is_empty());
        assert_eq!(decoder.finish(), Some(r#"{"b":2}"#.to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
