//! Chunk metadata enrichment.
//!
//! Derives the filterable attributes of a chunk from its text: word
//! count, size bucket, language-aware structure flags, and a cheap
//! complexity proxy. All detection is regex-based — a monotone heuristic,
//! not a parser.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Language, SizeCategory};

/// Derived chunk attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enrichment {
    /// Whitespace-separated token count.
    pub word_count: usize,
    /// Bucketed from `word_count`.
    pub size_category: SizeCategory,
    /// Chunk contains a class/type declaration.
    pub has_class_def: bool,
    /// Chunk contains a function declaration.
    pub has_fn_def: bool,
    /// Chunk contains import/include statements.
    pub has_imports: bool,
    /// Chunk references a test framework.
    pub has_tests: bool,
    /// Heuristic score in `1..=10`.
    pub complexity: u8,
}

macro_rules! lazy_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).unwrap_or_else(|_| unreachable!()));
    };
}

lazy_regex!(PY_CLASS, r"(?m)^\s*class\s+\w");
lazy_regex!(PY_FN, r"(?m)^\s*(async\s+)?def\s+\w");
lazy_regex!(PY_IMPORT, r"(?m)^\s*(import|from)\s");
lazy_regex!(PY_TEST, r"\bunittest\b|\bpytest\b");

lazy_regex!(JS_CLASS, r"(?m)^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+\w");
lazy_regex!(JS_FN, r"(?m)(\bfunction\s+\w|=>\s*[{(]|^\s*(export\s+)?(async\s+)?function\b)");
lazy_regex!(JS_IMPORT, r#"(?m)^\s*(import\s|const\s+.+=\s*require\()"#);
lazy_regex!(JS_TEST, r"\b(describe|it|test|expect)\s*\(");

lazy_regex!(JAVA_CLASS, r"(?m)^\s*(public\s+|final\s+|abstract\s+)*(class|interface|enum)\s+\w");
lazy_regex!(JAVA_FN, r"(?m)^\s*(public|private|protected|static)[\w\s<>\[\]]*\s\w+\s*\(");
lazy_regex!(JAVA_IMPORT, r"(?m)^import\s");
lazy_regex!(JAVA_TEST, r"@Test\b|\bjunit\b");

lazy_regex!(GO_CLASS, r"(?m)^type\s+\w+\s+(struct|interface)\b");
lazy_regex!(GO_FN, r"(?m)^func\s");
lazy_regex!(GO_IMPORT, r#"(?m)^import\s|^\s+"[\w./-]+"$"#);
lazy_regex!(GO_TEST, r"(?m)^func\s+Test\w|\btesting\.T\b");

lazy_regex!(RUST_CLASS, r"(?m)^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait)\s+\w");
lazy_regex!(RUST_FN, r"(?m)^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(const\s+)?fn\s+\w");
lazy_regex!(RUST_IMPORT, r"(?m)^\s*use\s");
lazy_regex!(RUST_TEST, r"#\[(test|cfg\(test\))\]");

lazy_regex!(C_CLASS, r"(?m)^\s*(class|struct)\s+\w");
lazy_regex!(C_FN, r"(?m)^[A-Za-z_][\w\s\*]*\s+\**\w+\s*\([^;]*\)\s*\{?\s*$");
lazy_regex!(C_IMPORT, r"(?m)^\s*#include\b");
lazy_regex!(C_TEST, r"\b(TEST|TEST_F|ASSERT_\w+|assert)\s*\(");

lazy_regex!(RUBY_CLASS, r"(?m)^\s*(class|module)\s+[A-Z]");
lazy_regex!(RUBY_FN, r"(?m)^\s*def\s+\w");
lazy_regex!(RUBY_IMPORT, r#"(?m)^\s*require(_relative)?\s"#);
lazy_regex!(RUBY_TEST, r"\bRSpec\b|\bMinitest\b|(?m)^\s*describe\s");

lazy_regex!(PHP_CLASS, r"(?m)^\s*(abstract\s+|final\s+)?class\s+\w");
lazy_regex!(PHP_FN, r"(?m)\bfunction\s+\w+\s*\(");
lazy_regex!(PHP_IMPORT, r"(?m)^\s*(use\s+[\w\\]+;|require|include)");
lazy_regex!(PHP_TEST, r"\bPHPUnit\b|extends\s+TestCase\b");

lazy_regex!(BRANCH, r"\b(if|elif|else if|for|while|switch|case|match|catch|except|when)\b");
lazy_regex!(CALL, r"\b\w+\s*\(");

/// Per-language regex family for the structure flags.
struct Rules {
    class_def: &'static LazyLock<Regex>,
    fn_def: &'static LazyLock<Regex>,
    imports: &'static LazyLock<Regex>,
    tests: &'static LazyLock<Regex>,
}

fn rules_for(language: Language) -> Option<Rules> {
    let rules = match language {
        Language::Python => Rules {
            class_def: &PY_CLASS,
            fn_def: &PY_FN,
            imports: &PY_IMPORT,
            tests: &PY_TEST,
        },
        Language::Javascript | Language::Typescript => Rules {
            class_def: &JS_CLASS,
            fn_def: &JS_FN,
            imports: &JS_IMPORT,
            tests: &JS_TEST,
        },
        Language::Java => Rules {
            class_def: &JAVA_CLASS,
            fn_def: &JAVA_FN,
            imports: &JAVA_IMPORT,
            tests: &JAVA_TEST,
        },
        Language::Go => Rules {
            class_def: &GO_CLASS,
            fn_def: &GO_FN,
            imports: &GO_IMPORT,
            tests: &GO_TEST,
        },
        Language::Rust => Rules {
            class_def: &RUST_CLASS,
            fn_def: &RUST_FN,
            imports: &RUST_IMPORT,
            tests: &RUST_TEST,
        },
        Language::C | Language::Cpp => Rules {
            class_def: &C_CLASS,
            fn_def: &C_FN,
            imports: &C_IMPORT,
            tests: &C_TEST,
        },
        Language::Ruby => Rules {
            class_def: &RUBY_CLASS,
            fn_def: &RUBY_FN,
            imports: &RUBY_IMPORT,
            tests: &RUBY_TEST,
        },
        Language::Php => Rules {
            class_def: &PHP_CLASS,
            fn_def: &PHP_FN,
            imports: &PHP_IMPORT,
            tests: &PHP_TEST,
        },
        _ => return None,
    };
    Some(rules)
}

/// Computes the heuristic complexity score.
///
/// `clip(1 + floor(log2(1 + branches + calls/4)), 1, 10)` where the
/// counts come from cheap regex hits. Monotone in control-flow density,
/// nothing more.
fn complexity_score(text: &str) -> u8 {
    let branches = BRANCH.find_iter(text).count();
    let calls = CALL.find_iter(text).count();
    let weight = 1.0 + branches as f64 + calls as f64 / 4.0;
    let score = 1.0 + weight.log2().floor();
    // Score is ≥ 1 by construction; clamp only the top.
    if score >= 10.0 { 10 } else { score as u8 }
}

/// Derives all chunk attributes from its text and language.
#[must_use]
pub fn enrich(text: &str, language: Language) -> Enrichment {
    let word_count = text.split_whitespace().count();
    let rules = rules_for(language);

    let (has_class_def, has_fn_def, has_imports, has_tests) = rules.map_or(
        (false, false, false, false),
        |r| {
            (
                r.class_def.is_match(text),
                r.fn_def.is_match(text),
                r.imports.is_match(text),
                r.tests.is_match(text),
            )
        },
    );

    Enrichment {
        word_count,
        size_category: SizeCategory::from_word_count(word_count),
        has_class_def,
        has_fn_def,
        has_imports,
        has_tests,
        complexity: complexity_score(text),
    }
}
