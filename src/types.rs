//! Core data model shared across the ingestion and query pipelines.
//!
//! The [`Chunk`] is the unit of retrieval: a bounded, line-annotated slice
//! of one file with derived metadata. Chunk ids are content-derived so a
//! second ingest of unchanged content reproduces the same id set.

use std::path::Path;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{xxh3_64, xxh3_128};

/// Detected source language, from extension or shebang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python sources.
    Python,
    /// JavaScript sources.
    Javascript,
    /// TypeScript sources.
    Typescript,
    /// Java sources.
    Java,
    /// Go sources.
    Go,
    /// Rust sources.
    Rust,
    /// C sources and headers.
    C,
    /// C++ sources and headers.
    Cpp,
    /// Ruby sources.
    Ruby,
    /// PHP sources.
    Php,
    /// Markdown documents.
    Markdown,
    /// YAML documents.
    Yaml,
    /// JSON documents.
    Json,
    /// TOML documents.
    Toml,
    /// Shell scripts.
    Shell,
    /// Unrecognized extension.
    Unknown,
}

impl Language {
    /// Detects the language from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" | "pyw" => Self::Python,
            "js" | "mjs" | "cjs" | "jsx" => Self::Javascript,
            "ts" | "mts" | "cts" | "tsx" => Self::Typescript,
            "java" => Self::Java,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Self::Cpp,
            "rb" | "rake" => Self::Ruby,
            "php" => Self::Php,
            "md" | "mdx" => Self::Markdown,
            "yaml" | "yml" => Self::Yaml,
            "json" => Self::Json,
            "toml" => Self::Toml,
            "sh" | "bash" | "zsh" => Self::Shell,
            _ => Self::Unknown,
        }
    }

    /// Detects the language from a shebang line, if present.
    #[must_use]
    pub fn from_shebang(first_line: &str) -> Option<Self> {
        let line = first_line.strip_prefix("#!")?;
        if line.contains("python") {
            Some(Self::Python)
        } else if line.contains("node") {
            Some(Self::Javascript)
        } else if line.contains("ruby") {
            Some(Self::Ruby)
        } else if line.contains("php") {
            Some(Self::Php)
        } else if line.contains("sh") {
            Some(Self::Shell)
        } else {
            None
        }
    }

    /// Returns the lowercase string form used in store payloads and filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Markdown => "markdown",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
            Self::Shell => "shell",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the lowercase string form (inverse of [`Language::as_str`]).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "python" => Self::Python,
            "javascript" => Self::Javascript,
            "typescript" => Self::Typescript,
            "java" => Self::Java,
            "go" => Self::Go,
            "rust" => Self::Rust,
            "c" => Self::C,
            "cpp" => Self::Cpp,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "markdown" => Self::Markdown,
            "yaml" => Self::Yaml,
            "json" => Self::Json,
            "toml" => Self::Toml,
            "shell" => Self::Shell,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse file classification used for filtering and reranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Production source code.
    Code,
    /// Test or spec files.
    Test,
    /// Configuration files.
    Config,
    /// Documentation.
    Docs,
    /// Build scripts and manifests.
    Build,
    /// Anything else.
    Other,
}

impl Category {
    /// Returns the lowercase string form used in store payloads and filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Test => "test",
            Self::Config => "config",
            Self::Docs => "docs",
            Self::Build => "build",
            Self::Other => "other",
        }
    }

    /// Parses the lowercase string form (inverse of [`Category::as_str`]).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "code" => Self::Code,
            "test" => Self::Test,
            "config" => Self::Config,
            "docs" => Self::Docs,
            "build" => Self::Build,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Word-count bucket for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    /// Fewer than 200 words.
    Small,
    /// 200 to 800 words inclusive.
    Medium,
    /// More than 800 words.
    Large,
}

impl SizeCategory {
    /// Buckets a word count.
    #[must_use]
    pub const fn from_word_count(words: usize) -> Self {
        if words < 200 {
            Self::Small
        } else if words <= 800 {
            Self::Medium
        } else {
            Self::Large
        }
    }

    /// Returns the lowercase string form used in store payloads and filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate file accepted by the walker. Ephemeral — lives only for the
/// duration of one ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Detected language.
    pub language: Language,
    /// Coarse classification.
    pub category: Category,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Number of path separators from the repository root.
    pub depth: u32,
    /// Decoded UTF-8 contents.
    pub contents: String,
}

/// A bounded, line-annotated slice of one file with derived metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Content-derived stable identifier (hex).
    pub id: String,
    /// Owning repository id (equals the store namespace).
    pub repo_id: String,
    /// UTF-8 chunk text.
    pub text: String,
    /// Path relative to the repository root.
    pub path: String,
    /// First line of the span (1-indexed, inclusive).
    pub start_line: usize,
    /// Last line of the span (1-indexed, inclusive).
    pub end_line: usize,
    /// File classification.
    pub category: Category,
    /// File language.
    pub language: Language,
    /// Path depth from the repository root.
    pub depth: u32,
    /// Word-count bucket.
    pub size_category: SizeCategory,
    /// Chunk contains a class/type declaration.
    pub has_class_def: bool,
    /// Chunk contains a function declaration.
    pub has_fn_def: bool,
    /// Chunk contains import/use statements.
    pub has_imports: bool,
    /// Chunk references a test framework.
    pub has_tests: bool,
    /// Heuristic complexity score in `1..=10`.
    pub complexity: u8,
    /// Whitespace-separated token count.
    pub word_count: usize,
}

impl Chunk {
    /// Derives the stable chunk id from its identifying fields.
    ///
    /// The id is a 128-bit xxh3 of `repo_id ‖ path ‖ start ‖ end ‖
    /// content_hash`, so re-ingesting unchanged content reproduces the
    /// same id (and upserts become no-ops).
    #[must_use]
    pub fn derive_id(
        repo_id: &str,
        path: &str,
        start_line: usize,
        end_line: usize,
        text: &str,
    ) -> String {
        let content_hash = xxh3_64(text.as_bytes());
        let key = format!("{repo_id}\u{1f}{path}\u{1f}{start_line}\u{1f}{end_line}\u{1f}{content_hash:016x}");
        format!("{:032x}", xxh3_128(key.as_bytes()))
    }

    /// Number of lines covered by this chunk (inclusive span).
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Descriptor for an indexed repository. Created on first successful
/// ingest; counts and `indexed_at` are updated on re-ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDescriptor {
    /// Stable id derived from the URL; equals the store namespace.
    pub id: String,
    /// Original repository URL.
    pub url: String,
    /// Resolved revision (branch, tag, or commit), if pinned.
    pub revision: Option<String>,
    /// Vector store namespace (always equals `id`).
    pub namespace: String,
    /// Files accepted by the walker in the last ingest.
    pub file_count: usize,
    /// Chunks acknowledged by the vector store in the last ingest.
    pub chunk_count: usize,
    /// Unix timestamp (seconds) of the last successful ingest.
    pub indexed_at: u64,
}

/// Derives the stable repository id from its URL.
///
/// Case-folds, strips the scheme and a trailing `.git`, and maps every
/// non-alphanumeric run to a single `-`. The result doubles as the vector
/// store namespace.
#[must_use]
pub fn repo_id_from_url(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    let without_scheme = lowered
        .split_once("://")
        .map_or(lowered.as_str(), |(_, rest)| rest);
    let trimmed = without_scheme
        .trim_end_matches('/')
        .trim_end_matches(".git");

    let mut id = String::with_capacity(trimmed.len());
    let mut last_dash = true;
    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            id.push(ch);
            last_dash = false;
        } else if !last_dash {
            id.push('-');
            last_dash = true;
        }
    }
    while id.ends_with('-') {
        id.pop();
    }
    id
}

/// Computes the path depth: number of separators from the repository root.
#[must_use]
pub fn path_depth(path: &str) -> u32 {
    u32::try_from(
        Path::new(path)
            .components()
            .count()
            .saturating_sub(1),
    )
    .unwrap_or(u32::MAX)
}
