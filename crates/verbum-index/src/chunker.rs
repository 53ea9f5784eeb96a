use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Chunk, ChunkId, Document, PageRange};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:chapter|part|section|book)\s+([0-9]+|[IVXLCDM]+)\b").unwrap()
});

const MAX_LABEL_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Upper bound on chunk length, in characters.
    pub max_chars: usize,
    pub detect_chapters: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            detect_chapters: true,
        }
    }
}

/// Piece of a single page, never longer than the chunk limit.
#[derive(Debug)]
struct Unit<'a> {
    page: u32,
    text: &'a str,
    heading: Option<String>,
}

/// Turns a document's pages into ordered, page-tagged chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(mut config: ChunkerConfig) -> Self {
        config.max_chars = config.max_chars.max(1);
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk every non-blank page of `document`.
    ///
    /// Blank pages are folded into the page range of a neighbouring chunk. A document whose
    /// pages are all blank yields no chunks.
    #[must_use]
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let mut units = Vec::new();
        for page in document.pages.iter().filter(|p| !p.is_blank()) {
            self.page_units(page.number, &page.text, &mut units);
        }

        let mut builder = ChunkBuilder::new(document, self.config.max_chars);
        for unit in units {
            builder.push(unit);
        }
        let mut chunks = builder.finish();

        for blank in document.pages.iter().filter(|p| p.is_blank()) {
            absorb_blank_page(&mut chunks, blank.number);
        }

        tracing::debug!(
            document = %document.id,
            pages = document.pages.len(),
            chunks = chunks.len(),
            "chunked document"
        );
        chunks
    }

    fn page_units<'a>(&self, page: u32, text: &'a str, out: &mut Vec<Unit<'a>>) {
        let max = self.config.max_chars;
        for paragraph in split_at(text, paragraph_breaks(text)) {
            let heading = if self.config.detect_chapters {
                detect_heading(paragraph)
            } else {
                None
            };
            let mut pieces = Vec::new();
            if char_len(paragraph) <= max {
                pieces.push(paragraph);
            } else {
                for sentence in split_at(paragraph, sentence_breaks(paragraph)) {
                    if char_len(sentence) <= max {
                        pieces.push(sentence);
                    } else {
                        pieces.extend(hard_split(sentence, max));
                    }
                }
            }
            for (i, piece) in pieces.into_iter().enumerate() {
                out.push(Unit {
                    page,
                    text: piece,
                    heading: if i == 0 { heading.clone() } else { None },
                });
            }
        }
    }
}

struct ChunkBuilder<'d> {
    document: &'d Document,
    max_chars: usize,
    chunks: Vec<Chunk>,
    text: String,
    chars: usize,
    pages: Option<PageRange>,
    label: Option<String>,
}

impl<'d> ChunkBuilder<'d> {
    fn new(document: &'d Document, max_chars: usize) -> Self {
        Self {
            document,
            max_chars,
            chunks: Vec::new(),
            text: String::new(),
            chars: 0,
            pages: None,
            label: None,
        }
    }

    fn push(&mut self, unit: Unit<'_>) {
        if unit.heading.is_some() {
            self.flush();
            self.label = unit.heading;
        }

        let unit_chars = char_len(unit.text);
        let crosses_page = self.pages.is_some_and(|r| r.end != unit.page);
        let separator = crosses_page && !self.text.ends_with(char::is_whitespace);
        let needed = unit_chars + usize::from(separator);

        if unit.text.trim().is_empty() {
            // Whitespace is kept only where it fits inside an open chunk.
            if self.chars > 0 && self.chars + needed <= self.max_chars {
                self.append(unit.page, unit.text, separator, unit_chars);
            }
            return;
        }

        if self.chars > 0 && self.chars + needed > self.max_chars {
            self.flush();
            self.append(unit.page, unit.text, false, unit_chars);
        } else {
            self.append(unit.page, unit.text, separator, unit_chars);
        }
    }

    fn append(&mut self, page: u32, text: &str, separator: bool, chars: usize) {
        if separator {
            self.text.push('\n');
            self.chars += 1;
        }
        self.text.push_str(text);
        self.chars += chars;
        match &mut self.pages {
            Some(range) => range.extend_to(page),
            None => self.pages = Some(PageRange::single(page)),
        }
    }

    fn flush(&mut self) {
        let Some(pages) = self.pages.take() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        self.chars = 0;
        let hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        self.chunks.push(Chunk {
            id: ChunkId {
                document: self.document.id.clone(),
                index: self.chunks.len(),
            },
            text,
            pages,
            label: self.label.clone(),
            hash,
        });
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

fn absorb_blank_page(chunks: &mut [Chunk], page: u32) {
    if chunks.iter().any(|c| c.pages.contains(page)) {
        return;
    }
    let target = chunks
        .iter()
        .rposition(|c| c.pages.start <= page)
        .unwrap_or(0);
    if let Some(chunk) = chunks.get_mut(target) {
        chunk.pages.extend_to(page);
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` at the given byte offsets, merging whitespace-only pieces into a neighbour.
fn split_at(text: &str, breaks: Vec<usize>) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for end in breaks {
        if end <= start || end >= text.len() {
            continue;
        }
        if text[start..end].trim().is_empty() {
            continue;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    let tail = &text[start..];
    if !tail.is_empty() {
        match pieces.last_mut() {
            Some(last) if tail.trim().is_empty() => {
                let begin = start - last.len();
                *last = &text[begin..];
            }
            _ => pieces.push(tail),
        }
    }
    pieces
}

/// Offsets just past each blank-line run.
fn paragraph_breaks(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut breaks = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            let mut newlines = 1;
            while j < bytes.len() && matches!(bytes[j], b'\n' | b'\r' | b' ' | b'\t') {
                if bytes[j] == b'\n' {
                    newlines += 1;
                }
                j += 1;
            }
            if newlines >= 2 {
                breaks.push(j);
            }
            i = j;
        } else {
            i += 1;
        }
    }
    breaks
}

/// Offsets just past each sentence terminator and the whitespace that follows it.
fn sentence_breaks(text: &str) -> Vec<usize> {
    let mut breaks = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        let mut end = None;
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
                end = Some(idx + next.len_utf8());
            } else {
                break;
            }
        }
        if let Some(end) = end {
            breaks.push(end);
        }
    }
    breaks
}

/// Cut `text` into pieces of at most `max` chars, preferring to cut after whitespace.
fn hard_split(text: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while char_len(rest) > max {
        let limit = rest
            .char_indices()
            .nth(max)
            .map_or(rest.len(), |(idx, _)| idx);
        let window = &rest[..limit];
        let cut = window
            .char_indices()
            .filter(|&(idx, c)| idx > 0 && c.is_whitespace())
            .map(|(idx, c)| idx + c.len_utf8())
            .last()
            .unwrap_or(limit);
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

fn detect_heading(paragraph: &str) -> Option<String> {
    let first_line = paragraph.lines().map(str::trim).find(|l| !l.is_empty())?;
    if !HEADING_RE.is_match(first_line) {
        return None;
    }
    Some(first_line.chars().take(MAX_LABEL_CHARS).collect())
}
