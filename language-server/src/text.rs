use dashmap::DashMap;
use std::ops::Range as ByteRange;
use tower_lsp::lsp_types::{Position, Range};

pub type DocumentStore = DashMap<String, Document>;

#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    language_id: String,
    line_index: LineIndex,
}

impl Document {
    pub fn new(text: String, language_id: impl Into<String>) -> Self {
        let line_index = LineIndex::new(&text);
        Self {
            text,
            language_id: language_id.into(),
            line_index,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn offset(&self, position: Position) -> Option<usize> {
        self.line_index.offset(&self.text, position)
    }

    pub fn position_at(&self, byte_offset: usize) -> Position {
        self.line_index.position_at(&self.text, byte_offset)
    }

    pub fn range_of(&self, span: ByteRange<usize>) -> Range {
        Range {
            start: self.position_at(span.start),
            end: self.position_at(span.end),
        }
    }

    /// Text of a line without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        let span = self.line_index.line_span(&self.text, line as usize)?;
        Some(&self.text[span])
    }

    pub fn line_start(&self, line: u32) -> Option<usize> {
        self.line_index.line_starts.get(line as usize).copied()
    }

    /// Everything on the cursor's line before the cursor.
    pub fn line_prefix(&self, position: Position) -> Option<&str> {
        let start = self.line_start(position.line)?;
        let offset = self.offset(position)?;
        Some(&self.text[start..offset])
    }

    /// The double-quoted string on the cursor's line that contains the cursor,
    /// quotes excluded. Quotes pair up from the start of the line.
    pub fn quoted_at(&self, position: Position) -> Option<(&str, Range)> {
        let line_start = self.line_start(position.line)?;
        let line = self.line(position.line)?;
        let cursor = self.offset(position)? - line_start;

        let quotes: Vec<usize> = line.match_indices('"').map(|(idx, _)| idx).collect();
        for pair in quotes.chunks_exact(2) {
            let (open, close) = (pair[0], pair[1]);
            if open <= cursor && cursor <= close + 1 {
                let span = line_start + open + 1..line_start + close;
                return Some((&self.text[span.clone()], self.range_of(span)));
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, ch) in text.char_indices() {
            if ch == '\n' {
                line_starts.push(idx + 1);
            }
        }
        Self { line_starts }
    }

    fn line_span(&self, text: &str, line: usize) -> Option<ByteRange<usize>> {
        let start = *self.line_starts.get(line)?;
        let mut end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(text.len());
        if text[start..end].ends_with('\r') {
            end -= 1;
        }
        Some(start..end)
    }

    fn offset(&self, text: &str, position: Position) -> Option<usize> {
        let span = self.line_span(text, position.line as usize)?;
        let line = &text[span.clone()];

        let mut units = 0u32;
        for (byte_idx, ch) in line.char_indices() {
            if units >= position.character {
                return Some(span.start + byte_idx);
            }
            units += ch.len_utf16() as u32;
        }

        // Clients may place the cursor past the end of a line.
        Some(span.end)
    }

    fn position_at(&self, text: &str, byte_offset: usize) -> Position {
        let clamped = byte_offset.min(text.len());
        let line = match self.line_starts.binary_search(&clamped) {
            Ok(line) => line,
            Err(next_line) => next_line.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        let character = text[line_start..clamped]
            .chars()
            .map(|ch| ch.len_utf16() as u32)
            .sum();

        Position {
            line: line as u32,
            character,
        }
    }
}
