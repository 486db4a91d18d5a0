use std::collections::VecDeque;

/// Byte buffer that yields complete lines as chunks arrive
///
/// Accepts `\n`, `\r\n` and lone `\r` terminators. A lone `\r` at the very
/// end of the buffer is held back until the next chunk shows whether a `\n`
/// follows it. Invalid UTF-8 inside a line is replaced with U+FFFD so one bad
/// line never ends the stream.
pub struct LineBuffer {
    buffer: VecDeque<u8>,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n' || b == b'\r')?;

        let terminator_len = if self.buffer[end] == b'\r' {
            match self.buffer.get(end + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None => return None,
            }
        } else {
            1
        };

        let line_bytes: Vec<u8> = self.buffer.drain(..end).collect();
        self.buffer.drain(..terminator_len);

        Some(decode_line(line_bytes))
    }

    /// Whatever is left once the byte source is exhausted
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut bytes: Vec<u8> = self.buffer.drain(..).collect();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Some(decode_line(bytes))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn decode_line(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        tracing::warn!(error = %e.utf8_error(), "Replacing invalid UTF-8 in SSE line");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}
