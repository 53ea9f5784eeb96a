use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Identity of a document: its `/`-separated path relative to the collection root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Text,
    Other,
}

impl FileKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("txt" | "md" | "markdown") => Self::Text,
            _ => Self::Other,
        }
    }

    /// Whether documents of this kind can be extracted and asked questions about.
    #[must_use]
    pub fn is_queryable(self) -> bool {
        matches!(self, Self::Pdf | Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

impl Page {
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// An extracted document. Re-extraction produces a new value; pages are never edited in place.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocId,
    pub name: String,
    pub kind: FileKind,
    pub pages: Vec<Page>,
}

impl Document {
    /// Leading text of the document, at most `max_chars` characters.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let mut out = String::new();
        let mut remaining = max_chars;
        for page in &self.pages {
            if remaining == 0 {
                break;
            }
            let taken: String = page.text.chars().take(remaining).collect();
            remaining -= taken.chars().count();
            out.push_str(&taken);
        }
        out
    }
}

/// Inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    #[must_use]
    pub fn single(page: u32) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }

    pub fn extend_to(&mut self, page: u32) {
        self.start = self.start.min(page);
        self.end = self.end.max(page);
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub document: DocId,
    pub index: usize,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.index)
    }
}

impl Serialize for ChunkId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub pages: PageRange,
    /// Heading of the chapter or section this chunk belongs to, when one was detected.
    pub label: Option<String>,
    /// blake3 hex digest of `text`, used as the representation cache key.
    pub hash: String,
}
