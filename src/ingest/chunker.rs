//! Splits file contents into overlapping, line-aligned chunks.
//!
//! Split points prefer, in order: a top-level declaration header (the
//! declaration starts the next chunk), a blank-line paragraph boundary,
//! then whatever newline lands nearest the target size. Lines are never
//! split. Consecutive chunks within a file overlap by a configured
//! character window so context survives the boundary.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Language;

/// Chunking parameters, usually taken from
/// [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Target chunk size in bytes.
    pub target_bytes: usize,
    /// Hard cap on chunk size in bytes (a single long line may exceed it).
    pub max_bytes: usize,
    /// Overlap between consecutive chunks in characters.
    pub overlap: usize,
    /// Contents below this size become a single chunk.
    pub min_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            target_bytes: 2_000,
            max_bytes: 4_000,
            overlap: 200,
            min_bytes: 100,
        }
    }
}

/// A chunk's text and its 1-indexed, inclusive line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Chunk text (lines joined with `\n`).
    pub text: String,
    /// First line (1-indexed, inclusive).
    pub start_line: usize,
    /// Last line (1-indexed, inclusive).
    pub end_line: usize,
}

static DECL_PYTHON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(async\s+def|def|class)\s+\w").unwrap_or_else(|_| unreachable!())
});
static DECL_JS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(export\s+)?(default\s+)?(async\s+)?(function|class|interface|type|enum)\s")
        .unwrap_or_else(|_| unreachable!())
});
static DECL_RUST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(pub(\([^)]*\))?\s+)?(async\s+)?(fn|struct|enum|impl|trait|mod)\s")
        .unwrap_or_else(|_| unreachable!())
});
static DECL_GO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(func|type)\s+\w").unwrap_or_else(|_| unreachable!()));
static DECL_JAVA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(public|private|protected|static)\s+[\w<>\[\]]+\s+\w+\s*[({]")
        .unwrap_or_else(|_| unreachable!())
});
static DECL_C: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][\w\s\*]*\s+\**\w+\s*\([^;]*$").unwrap_or_else(|_| unreachable!())
});
static DECL_RUBY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(def|class|module)\s+\w").unwrap_or_else(|_| unreachable!())
});
static DECL_PHP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(public\s+|private\s+|protected\s+)?(function|class|interface|trait)\s+\w")
        .unwrap_or_else(|_| unreachable!())
});
static DECL_MARKDOWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s").unwrap_or_else(|_| unreachable!()));

/// Returns `true` when a line opens a top-level declaration for the
/// language — a preferred place to start a new chunk.
fn is_declaration(line: &str, language: Language) -> bool {
    match language {
        Language::Python => DECL_PYTHON.is_match(line),
        Language::Javascript | Language::Typescript => DECL_JS.is_match(line),
        Language::Rust => DECL_RUST.is_match(line),
        Language::Go => DECL_GO.is_match(line),
        Language::Java => DECL_JAVA.is_match(line),
        Language::C | Language::Cpp => DECL_C.is_match(line),
        Language::Ruby => DECL_RUBY.is_match(line),
        Language::Php => DECL_PHP.is_match(line),
        Language::Markdown => DECL_MARKDOWN.is_match(line),
        _ => false,
    }
}

/// Splits `contents` into overlapping line-aligned chunks.
///
/// Empty or whitespace-only contents produce no chunks; contents under
/// `min_bytes` produce exactly one.
#[must_use]
pub fn chunk(contents: &str, language: Language, config: &ChunkerConfig) -> Vec<ChunkSpan> {
    if contents.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = contents.lines().collect();
    let line_count = lines.len();

    if contents.len() < config.min_bytes {
        return vec![ChunkSpan {
            text: lines.join("\n"),
            start_line: 1,
            end_line: line_count,
        }];
    }

    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < line_count {
        // Fill to the target size, honoring the hard cap. Always take at
        // least one line so a single oversize line cannot stall progress.
        let mut end = start;
        let mut size = 0usize;
        while end < line_count {
            let line_size = lines[end].len() + 1;
            if end > start && size + line_size > config.max_bytes {
                break;
            }
            size += line_size;
            end += 1;
            if size >= config.target_bytes {
                break;
            }
        }

        let split = if end >= line_count {
            line_count
        } else {
            pick_split(&lines, start, end, size, language, config)
        };

        spans.push(ChunkSpan {
            text: lines[start..split].join("\n"),
            start_line: start + 1,
            end_line: split,
        });

        if split >= line_count {
            break;
        }

        // Back up whole lines totaling at most the overlap window, while
        // guaranteeing forward progress past the previous start.
        let mut next = split;
        let mut carried = 0usize;
        while next > start + 1 {
            let line_size = lines[next - 1].len() + 1;
            if carried + line_size > config.overlap {
                break;
            }
            carried += line_size;
            next -= 1;
        }
        start = next;
    }

    spans
}

/// Chooses the split index in `(start, end]`, preferring a declaration
/// header, then a blank-line boundary, within the back half of the
/// filled window so chunks do not degenerate.
fn pick_split(
    lines: &[&str],
    start: usize,
    end: usize,
    size: usize,
    language: Language,
    config: &ChunkerConfig,
) -> usize {
    let floor = size.min(config.target_bytes) / 2;

    // Lowest index the split may land on: keep at least `floor` bytes.
    let mut kept = 0usize;
    let mut low = start + 1;
    for (offset, line) in lines[start..end].iter().enumerate() {
        kept += line.len() + 1;
        if kept >= floor {
            low = (start + offset + 1).max(start + 1);
            break;
        }
    }

    // Prefer splitting right before a declaration header.
    for i in (low..=end.saturating_sub(1)).rev() {
        if i > start && is_declaration(lines[i], language) {
            return i;
        }
    }

    // Then after a blank line.
    for i in (low..=end.saturating_sub(1)).rev() {
        if i > start && lines[i - 1].trim().is_empty() {
            return i;
        }
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(target: usize, overlap: usize) -> ChunkerConfig {
        ChunkerConfig {
            target_bytes: target,
            max_bytes: target * 2,
            overlap,
            min_bytes: 100,
        }
    }

    #[test]
    fn test_empty_and_whitespace_dropped() {
        let cfg = ChunkerConfig::default();
        assert!(chunk("", Language::Python, &cfg).is_empty());
        assert!(chunk("   \n\t\n  ", Language::Python, &cfg).is_empty());
    }

    #[test]
    fn test_small_file_single_chunk() {
        let cfg = ChunkerConfig::default();
        let spans = chunk("def main():\n    pass\n", Language::Python, &cfg);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[0].end_line, 2);
    }

    #[test]
    fn test_splits_prefer_declarations() {
        // Several small functions separated by blank lines: every split
        // point lands before a `def`, never inside a body.
        let mut source = String::new();
        for i in 0..8 {
            source.push_str(&format!("def func_{i}(arg):\n"));
            source.push_str(&format!("    total = arg + {i}\n"));
            source.push_str("    return total\n\n");
        }

        let spans = chunk(&source, Language::Python, &config(250, 0));
        assert!(spans.len() > 1);
        // Every chunk after the first starts at a declaration header.
        for span in &spans[1..] {
            assert!(
                span.text.starts_with("def "),
                "chunk did not start at a declaration: {:?}",
                span.text.lines().next()
            );
        }
    }

    #[test]
    fn test_line_spans_are_one_indexed_and_ordered() {
        let source = "line\n".repeat(400);
        let spans = chunk(&source, Language::Unknown, &config(300, 30));
        assert_eq!(spans[0].start_line, 1);
        for span in &spans {
            assert!(span.start_line <= span.end_line);
        }
        for pair in spans.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
            // Overlap window only: the next chunk may reach back, never skip.
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
    }

    #[test]
    fn test_coverage_of_all_lines() {
        let source = (0..200)
            .map(|i| format!("statement_{i} = {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let line_count = source.lines().count();
        let spans = chunk(&source, Language::Python, &config(400, 40));

        let covered: usize = spans.iter().map(|s| s.end_line - s.start_line + 1).sum();
        assert!(covered >= line_count);
        assert_eq!(spans.last().map(|s| s.end_line), Some(line_count));
    }

    #[test]
    fn test_overlap_carries_context() {
        let source = "word word word word\n".repeat(100);
        let spans = chunk(&source, Language::Unknown, &config(300, 60));
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            // Overlapping lines appear in both chunks.
            assert!(pair[1].start_line <= pair[0].end_line);
        }
    }

    #[test]
    fn test_single_long_line_not_split() {
        let source = format!("short\n{}\nshort", "x".repeat(10_000));
        let spans = chunk(&source, Language::Unknown, &config(500, 50));
        // The long line survives intact in exactly one chunk body.
        let long_chunks = spans
            .iter()
            .filter(|s| s.text.contains(&"x".repeat(10_000)))
            .count();
        assert_eq!(long_chunks, 1);
    }

    #[test]
    fn test_blank_line_fallback() {
        let mut source = String::new();
        for i in 0..40 {
            source.push_str(&format!("paragraph {i} sentence one two three\n"));
            if i % 5 == 4 {
                source.push('\n');
            }
        }
        let spans = chunk(&source, Language::Unknown, &config(250, 0));
        assert!(spans.len() > 1);
        // At least one split should land right after a blank line.
        let after_blank = spans[1..]
            .iter()
            .any(|s| s.start_line > 1 && source.lines().nth(s.start_line - 2).is_some_and(|l| l.trim().is_empty()));
        assert!(after_blank);
    }

    proptest! {
        #[test]
        fn prop_spans_cover_and_never_invert(
            lines in proptest::collection::vec("[a-z ]{0,60}", 1..120),
            target in 100usize..600,
        ) {
            let source = lines.join("\n");
            let cfg = ChunkerConfig {
                target_bytes: target,
                max_bytes: target * 2,
                overlap: target / 10,
                min_bytes: 100,
            };
            let spans = chunk(&source, Language::Unknown, &cfg);

            if source.trim().is_empty() {
                prop_assert!(spans.is_empty());
            } else {
                let line_count = source.lines().count();
                prop_assert_eq!(spans[0].start_line, 1);
                prop_assert_eq!(spans.last().map(|s| s.end_line), Some(line_count));
                for span in &spans {
                    prop_assert!(span.start_line <= span.end_line);
                }
                for pair in spans.windows(2) {
                    prop_assert!(pair[1].start_line > pair[0].start_line);
                    prop_assert!(pair[1].start_line <= pair[0].end_line + 1);
                }
            }
        }
    }
}
