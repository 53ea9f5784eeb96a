//! Best-effort extraction of page citations and supporting quotes from model output.
//!
//! Models rarely follow the requested format exactly, so the parser accepts `p. 3`,
//! `p.3`, `pp. 3-4`, `page 3`, `Pages 3 to 4`, straight or curly quotes, and a citation
//! list with or without a heading. Nothing here fails: unparseable input yields an answer
//! with no citations.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use verbum_index::Chunk;

static PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:pages?|pp?)\.?\s*(\d{1,5})(?:\s*(?:-|–|—|to)\s*(\d{1,5}))?").unwrap()
});

static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]{3,})"|“([^”]{3,})”"#).unwrap());

/// A quote immediately followed by a parenthesised page reference.
static INLINE_QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:"([^"]{3,})"|“([^”]{3,})”)\s*\(\s*(?:pages?|pp?)\.?\s*(\d{1,5})"#,
    )
    .unwrap()
});

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t#>*_]*(?:citations|sources|references)[ \t*_]*(?::[\s*_]*|$)").unwrap()
});

/// How strictly quotes are checked against the consulted excerpts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteVerification {
    /// Keep every parsed citation.
    Off,
    /// Quotes must appear exactly.
    Verbatim,
    /// Quotes must appear ignoring case and whitespace differences.
    #[default]
    Normalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub page: u32,
    pub quote: Option<String>,
}

/// A citation as written by the model, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCitation {
    pub page: Option<u32>,
    pub quote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnswer {
    /// Answer text with the trailing citation list removed.
    pub text: String,
    pub citations: Vec<RawCitation>,
}

impl ParsedAnswer {
    /// Whether the model cited anything at all.
    #[must_use]
    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// Split model output into answer text and the citations it mentions.
#[must_use]
pub fn parse(output: &str) -> ParsedAnswer {
    let (body, list) = match HEADING_RE.find(output) {
        Some(m) => (&output[..m.start()], Some(&output[m.end()..])),
        None => (output, None),
    };

    let mut citations = Vec::new();
    if let Some(list) = list {
        for line in list.lines().filter(|l| !l.trim().is_empty()) {
            let page = PAGE_RE.captures(line).and_then(|c| c[1].parse().ok());
            let quote = first_quote(line);
            if page.is_some() || quote.is_some() {
                citations.push(RawCitation { page, quote });
            }
        }
    }

    for caps in INLINE_QUOTE_RE.captures_iter(body) {
        let quote = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().trim().to_owned());
        let page = caps[3].parse().ok();
        citations.push(RawCitation { page, quote });
    }
    for caps in PAGE_RE.captures_iter(body) {
        if let Ok(page) = caps[1].parse::<u32>() {
            citations.push(RawCitation {
                page: Some(page),
                quote: None,
            });
        }
    }

    ParsedAnswer {
        text: body.trim().to_owned(),
        citations: dedup(citations),
    }
}

fn first_quote(line: &str) -> Option<String> {
    QUOTE_RE
        .captures(line)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().trim().to_owned())
}

/// Drop repeats and bare page mentions already covered by a quoted citation.
fn dedup(citations: Vec<RawCitation>) -> Vec<RawCitation> {
    let quoted_pages: Vec<u32> = citations
        .iter()
        .filter(|c| c.quote.is_some())
        .filter_map(|c| c.page)
        .collect();
    let mut out: Vec<RawCitation> = Vec::new();
    for c in citations {
        if c.quote.is_none() && c.page.is_some_and(|p| quoted_pages.contains(&p)) {
            continue;
        }
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Check parsed citations against the chunks that were shown to the model.
///
/// Under `Verbatim` and `Normalized`, a quote must occur in a consulted chunk and is cited
/// on a page of that chunk: a missing page, or one the quote does not appear on, becomes the
/// first page of the chunk containing it. A bare page must fall inside a consulted range. Under `Off` only citations without any page are dropped.
/// The result is ordered by page, then by first appearance.
#[must_use]
pub fn verify(citations: &[RawCitation], consulted: &[&Chunk], policy: QuoteVerification) -> Vec<Citation> {
    let in_range = |page: u32| consulted.iter().any(|c| c.pages.contains(page));
    let mut out: Vec<Citation> = Vec::new();

    for raw in citations {
        let verified = match (policy, raw.page, &raw.quote) {
            (QuoteVerification::Off, Some(page), quote) => Some(Citation {
                page,
                quote: quote.clone(),
            }),
            (QuoteVerification::Off, None, _) | (_, None, None) => None,
            (_, Some(page), None) => in_range(page).then_some(Citation { page, quote: None }),
            (_, page, Some(quote)) => {
                let sources: Vec<&Chunk> = consulted
                    .iter()
                    .copied()
                    .filter(|c| contains_quote(&c.text, quote, policy))
                    .collect();
                let Some(first) = sources.first() else {
                    tracing::debug!(quote = %quote, "discarding quote not found in excerpts");
                    continue;
                };
                let page = match page {
                    Some(p) if sources.iter().any(|c| c.pages.contains(p)) => p,
                    Some(p) => {
                        tracing::debug!(
                            cited = p,
                            page = first.pages.start,
                            "quote is not on the cited page, citing the page it was found on"
                        );
                        first.pages.start
                    }
                    None => first.pages.start,
                };
                Some(Citation {
                    page,
                    quote: Some(quote.clone()),
                })
            }
        };
        if let Some(c) = verified
            && !out.contains(&c)
        {
            out.push(c);
        }
    }

    out.sort_by_key(|c| c.page);
    out
}

fn contains_quote(haystack: &str, quote: &str, policy: QuoteVerification) -> bool {
    match policy {
        QuoteVerification::Off => true,
        QuoteVerification::Verbatim => haystack.contains(quote),
        QuoteVerification::Normalized => {
            let needle = normalize(quote.trim_matches(|c: char| c == '.' || c == '…' || c.is_whitespace()));
            !needle.is_empty() && normalize(haystack).contains(&needle)
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use verbum_index::{ChunkId, DocId, PageRange};

    use super::*;

    fn chunk(index: usize, start: u32, end: u32, text: &str) -> Chunk {
        Chunk {
            id: ChunkId {
                document: DocId::new("book.txt"),
                index,
            },
            text: text.into(),
            pages: PageRange { start, end },
            label: None,
            hash: fake_hash(text),
        }
    }

    fn fake_hash(text: &str) -> String {
        format!("{:x}", text.len())
    }

    #[test]
    fn parses_inline_and_listed_citations() {
        let output = "Rome built roads (p. 3) to move legions (pp. 4-5).\n\n\
                      CITATIONS:\n\
                      - p. 3: \"roads were built\"\n\
                      - p. 7: “the legions marched”\n";
        let parsed = parse(output);
        assert_eq!(
            parsed.text,
            "Rome built roads (p. 3) to move legions (pp. 4-5)."
        );
        assert_eq!(
            parsed.citations,
            vec![
                RawCitation {
                    page: Some(3),
                    quote: Some("roads were built".into())
                },
                RawCitation {
                    page: Some(7),
                    quote: Some("the legions marched".into())
                },
                RawCitation {
                    page: Some(4),
                    quote: None
                },
            ]
        );
    }

    #[test]
    fn tolerates_format_variance() {
        for text in [
            "See page 12.",
            "See Page 12",
            "(p.12)",
            "(P. 12)",
            "as noted on pages 12 to 14",
            "pp.12–13",
        ] {
            let parsed = parse(text);
            assert_eq!(parsed.citations[0].page, Some(12), "input: {text}");
        }
    }

    #[test]
    fn inline_quote_followed_by_page() {
        let parsed = parse("The author writes “ferns need shade” (p. 9).");
        assert_eq!(
            parsed.citations,
            vec![RawCitation {
                page: Some(9),
                quote: Some("ferns need shade".into())
            }]
        );
    }

    #[test]
    fn answer_without_citations_parses_cleanly() {
        let parsed = parse("Ferns reproduce with spores.");
        assert!(!parsed.has_citations());
        assert_eq!(parsed.text, "Ferns reproduce with spores.");
    }

    #[test]
    fn ordinary_words_are_not_page_references() {
        assert!(!parse("Stop 5 times, then step up 3 flights.").has_citations());
    }

    #[test]
    fn heading_variants_split_the_list() {
        let parsed = parse("Answer text.\n**Sources:**\n* page 2 - \"exact words\"");
        assert_eq!(parsed.text, "Answer text.");
        assert_eq!(parsed.citations[0].quote.as_deref(), Some("exact words"));
    }

    #[test]
    fn verify_normalized_accepts_case_and_spacing_changes() {
        let c = chunk(0, 2, 3, "The Roman roads were\nbuilt for legions.");
        let raw = vec![RawCitation {
            page: Some(2),
            quote: Some("roman roads were built...".into()),
        }];
        let verified = verify(&raw, &[&c], QuoteVerification::Normalized);
        assert_eq!(verified.len(), 1);
        assert!(verify(&raw, &[&c], QuoteVerification::Verbatim).is_empty());
    }

    #[test]
    fn verify_drops_unknown_quotes_and_out_of_range_pages() {
        let c = chunk(0, 2, 3, "Carthage traded across the sea.");
        let raw = vec![
            RawCitation {
                page: Some(2),
                quote: Some("invented sentence".into()),
            },
            RawCitation {
                page: Some(9),
                quote: None,
            },
            RawCitation {
                page: Some(3),
                quote: None,
            },
        ];
        let verified = verify(&raw, &[&c], QuoteVerification::Normalized);
        assert_eq!(
            verified,
            vec![Citation {
                page: 3,
                quote: None
            }]
        );
    }

    #[test]
    fn verify_assigns_page_to_unpaged_quote() {
        let a = chunk(0, 1, 1, "First page text.");
        let b = chunk(1, 4, 5, "Spores spread on the wind.");
        let raw = vec![RawCitation {
            page: None,
            quote: Some("spores spread".into()),
        }];
        let verified = verify(&raw, &[&a, &b], QuoteVerification::Normalized);
        assert_eq!(verified[0].page, 4);
    }

    #[test]
    fn verify_moves_quote_to_the_page_it_was_found_on() {
        let a = chunk(0, 1, 1, "Ferns reproduce with spores.");
        let b = chunk(1, 4, 4, "Mosses hold water like sponges.");
        let raw = vec![RawCitation {
            page: Some(4),
            quote: Some("Ferns reproduce with spores".into()),
        }];
        for policy in [QuoteVerification::Verbatim, QuoteVerification::Normalized] {
            assert_eq!(
                verify(&raw, &[&a, &b], policy),
                vec![Citation {
                    page: 1,
                    quote: Some("Ferns reproduce with spores".into()),
                }]
            );
        }
    }

    #[test]
    fn verify_off_keeps_paged_citations() {
        let c = chunk(0, 1, 1, "Text.");
        let raw = vec![
            RawCitation {
                page: Some(40),
                quote: Some("not in text".into()),
            },
            RawCitation {
                page: None,
                quote: Some("no page".into()),
            },
        ];
        let verified = verify(&raw, &[&c], QuoteVerification::Off);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].page, 40);
    }

    #[test]
    fn verified_citations_sorted_by_page() {
        let c = chunk(0, 1, 9, "Alpha beta gamma.");
        let raw = vec![
            RawCitation {
                page: Some(7),
                quote: None,
            },
            RawCitation {
                page: Some(2),
                quote: None,
            },
        ];
        let pages: Vec<u32> = verify(&raw, &[&c], QuoteVerification::Normalized)
            .iter()
            .map(|c| c.page)
            .collect();
        assert_eq!(pages, vec![2, 7]);
    }
}
