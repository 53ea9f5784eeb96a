//! Prompt construction for document questions.

use std::fmt::Write;

use verbum_index::Chunk;
use verbum_llm::Message;

const SYSTEM_PROMPT: &str = "\
You answer questions about a single document using only the excerpts provided. \
Each excerpt is tagged with the pages it comes from. \
If the excerpts do not contain the answer, say so instead of guessing.

Rules:
- Cite the page of every claim inline, written as (p. N).
- Support claims with short quotes copied verbatim from the excerpts.
- End with a line `CITATIONS:` followed by one line per quote, formatted as
  - p. N: \"exact quote\"";

const CLOSING_TAG: &str = "\n</excerpt>\n";

/// Characters set aside for an excerpt's tags when sizing chunks against the context budget.
pub const EXCERPT_MARKUP_RESERVE: usize = 256;

/// Opening tag of an excerpt; counted against the context budget with the closing tag.
#[must_use]
pub fn excerpt_header(chunk: &Chunk) -> String {
    let mut header = format!("<excerpt id=\"{}\" pages=\"{}\"", chunk.id, chunk.pages);
    if let Some(label) = &chunk.label {
        let _ = write!(header, " label=\"{}\"", label.replace('"', "'"));
    }
    header.push_str(">\n");
    header
}

/// Characters an excerpt occupies in the prompt.
#[must_use]
pub fn excerpt_cost(chunk: &Chunk) -> usize {
    excerpt_header(chunk).chars().count() + chunk.text.chars().count() + CLOSING_TAG.len()
}

/// Format excerpts in rank order.
#[must_use]
pub fn format_excerpts(chunks: &[&Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&excerpt_header(chunk));
        out.push_str(&chunk.text);
        out.push_str(CLOSING_TAG);
    }
    out
}

#[must_use]
pub fn build(document_name: &str, question: &str, chunks: &[&Chunk]) -> Vec<Message> {
    let user = format!(
        "Document: {document_name}\n\n{}\nQuestion: {}",
        format_excerpts(chunks),
        question.trim()
    );
    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

/// Rough token count: four characters per token.
#[must_use]
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| m.content.chars().count())
        .sum::<usize>()
        / 4
}

#[cfg(test)]
mod tests {
    use verbum_index::{ChunkId, DocId, PageRange};

    use super::*;

    fn chunk(index: usize, pages: PageRange, label: Option<&str>, text: &str) -> Chunk {
        Chunk {
            id: ChunkId {
                document: DocId::new("history/rome.txt"),
                index,
            },
            text: text.into(),
            pages,
            label: label.map(Into::into),
            hash: String::new(),
        }
    }

    #[test]
    fn excerpts_carry_id_pages_and_label() {
        let a = chunk(0, PageRange::single(1), None, "Roads.");
        let b = chunk(
            3,
            PageRange { start: 4, end: 6 },
            Some("Chapter \"II\""),
            "Legions.",
        );
        let text = format_excerpts(&[&a, &b]);
        assert!(text.contains("<excerpt id=\"history/rome.txt#0\" pages=\"1\">\nRoads.\n</excerpt>"));
        assert!(text.contains("pages=\"4-6\" label=\"Chapter 'II'\""));
        assert!(text.find("Roads").unwrap() < text.find("Legions").unwrap());
    }

    #[test]
    fn cost_matches_formatted_length() {
        let c = chunk(1, PageRange { start: 2, end: 3 }, Some("Part 1"), "Naïve text.");
        assert_eq!(excerpt_cost(&c), format_excerpts(&[&c]).chars().count());
    }

    #[test]
    fn prompt_has_instructions_excerpts_and_question() {
        let c = chunk(0, PageRange::single(2), None, "Carthage traded.");
        let messages = build("rome.txt", "  Who traded?  ", &[&c]);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("(p. N)"));
        assert!(messages[0].content.contains("CITATIONS:"));
        assert!(messages[1].content.starts_with("Document: rome.txt"));
        assert!(messages[1].content.contains("Carthage traded."));
        assert!(messages[1].content.ends_with("Question: Who traded?"));
    }

    #[test]
    fn token_estimate_is_quarter_of_chars() {
        let messages = vec![Message::user("x".repeat(400))];
        assert_eq!(estimate_tokens(&messages), 100);
    }
}
