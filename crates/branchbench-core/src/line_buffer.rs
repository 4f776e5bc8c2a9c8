/// Control sequences some tools print at the start of lines when they think
/// they are writing to a terminal. Meaningless in captured output.
const LEADING_SEQUENCES: &[&str] = &[
    // Clear line
    "\x1b[2K",
    // Cursor to column 1
    "\x1b[1G",
];

/// Reassembles complete lines from arbitrarily chunked process output.
///
/// Pipes hand over data in whatever chunks the OS chose; a line may arrive in
/// several pieces and one chunk may hold many lines. Text after the last
/// newline is held back until a later chunk completes it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
    /// Bytes of a UTF-8 sequence split across chunk boundaries.
    partial_utf8: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text chunk, returning every line it completed (without newline).
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.find('\n') {
            self.pending.push_str(&rest[..pos]);
            lines.push(clean_line(&std::mem::take(&mut self.pending)));
            rest = &rest[pos + 1..];
        }
        self.pending.push_str(rest);
        lines
    }

    /// Feed raw bytes, carrying incomplete UTF-8 sequences over to the next call.
    /// Invalid bytes are replaced with U+FFFD.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut data = std::mem::take(&mut self.partial_utf8);
        data.extend_from_slice(bytes);

        let mut text = String::new();
        let mut input = data.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    // safety: `valid_up_to` marks the end of a valid prefix
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.partial_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        self.push(&text)
    }

    /// Flush whatever is left at end of stream as a final line, if non-empty.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial_utf8.is_empty() {
            let bytes = std::mem::take(&mut self.partial_utf8);
            self.pending.push_str(&String::from_utf8_lossy(&bytes));
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(clean_line(&std::mem::take(&mut self.pending)))
    }
}

fn clean_line(raw: &str) -> String {
    let mut line = raw.strip_suffix('\r').unwrap_or(raw);
    while let Some(seq) = LEADING_SEQUENCES.iter().find(|s| line.starts_with(**s)) {
        line = &line[seq.len()..];
    }
    line.to_string()
}
