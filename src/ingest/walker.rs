//! File enumeration and classification.
//!
//! Walks a fetched snapshot, rejecting VCS/dependency/artifact
//! directories, oversize files, and binaries, then assigns each accepted
//! file a language, a category, and its path depth.

use std::io::Read;
use std::path::Path;

use ignore::WalkBuilder;

use crate::types::{Category, Language, SourceFile, path_depth};

/// Directories never descended into.
const DENYLIST_DIRS: [&str; 9] = [
    ".git",
    "node_modules",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    "vendor",
];

/// Bytes sniffed from the head of each file for the UTF-8 validity check.
const SNIFF_BYTES: usize = 8_192;

/// Well-known build script and manifest names.
const BUILD_FILES: [&str; 12] = [
    "makefile",
    "cmakelists.txt",
    "dockerfile",
    "build.gradle",
    "build.gradle.kts",
    "pom.xml",
    "setup.py",
    "build.rs",
    "justfile",
    "rakefile",
    "gulpfile.js",
    "webpack.config.js",
];

/// Extensions treated as configuration.
const CONFIG_EXTENSIONS: [&str; 8] = ["yaml", "yml", "json", "toml", "ini", "cfg", "conf", "env"];

/// Extensions treated as documentation.
const DOC_EXTENSIONS: [&str; 3] = ["md", "rst", "txt"];

/// Enumerates and classifies candidate files under `root`.
///
/// Skips, in order: denylisted directories, files over `max_file_bytes`,
/// and files whose first 8 KiB are not valid UTF-8 (treated as binary).
/// Per-file I/O errors skip the file rather than failing the walk.
#[must_use]
pub fn walk(root: &Path, max_file_bytes: u64) -> Vec<SourceFile> {
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            !(entry.file_type().is_some_and(|t| t.is_dir()) && DENYLIST_DIRS.contains(&name.as_str()))
        })
        .build();

    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let size_bytes = metadata.len();
        if size_bytes > max_file_bytes {
            tracing::debug!(path = %path.display(), size_bytes, "skipping oversize file");
            continue;
        }

        let Some(contents) = read_text(path) else {
            continue;
        };

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let rel_path = relative.to_string_lossy().replace('\\', "/");

        let language = detect_language(&rel_path, &contents);
        let category = classify(&rel_path, language);

        files.push(SourceFile {
            depth: path_depth(&rel_path),
            path: rel_path,
            language,
            category,
            size_bytes,
            contents,
        });
    }

    // Deterministic enumeration order regardless of filesystem ordering.
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// Reads a file as UTF-8 text, sniffing the head first to reject
/// binaries cheaply. Returns `None` for binaries and unreadable files.
fn read_text(path: &Path) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut head = vec![0u8; SNIFF_BYTES];
    let read = file.read(&mut head).ok()?;
    head.truncate(read);

    if let Err(e) = std::str::from_utf8(&head) {
        // A multi-byte char cut at the sniff boundary is not binary.
        let truncated_char =
            read == SNIFF_BYTES && e.error_len().is_none() && head.len() - e.valid_up_to() < 4;
        if !truncated_char {
            return None;
        }
    }

    std::fs::read_to_string(path).ok()
}

/// Detects the language from the extension, falling back to the shebang.
fn detect_language(path: &str, contents: &str) -> Language {
    let by_ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(Language::Unknown, Language::from_extension);
    if by_ext != Language::Unknown {
        return by_ext;
    }
    contents
        .lines()
        .next()
        .and_then(Language::from_shebang)
        .unwrap_or(Language::Unknown)
}

/// Assigns the file category. Precedence: test → config → docs → build →
/// code.
fn classify(path: &str, language: Language) -> Category {
    let lowered = path.to_lowercase();
    let file_name = Path::new(&lowered)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = Path::new(&lowered)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();

    if lowered.contains("test") || lowered.contains("spec") {
        return Category::Test;
    }
    if CONFIG_EXTENSIONS.contains(&extension.as_str())
        || file_name.starts_with(".env")
        || file_name == ".gitignore"
    {
        return Category::Config;
    }
    if DOC_EXTENSIONS.contains(&extension.as_str()) {
        return Category::Docs;
    }
    if BUILD_FILES.contains(&file_name.as_str()) {
        return Category::Build;
    }
    if language == Language::Unknown {
        return Category::Other;
    }
    Category::Code
}
