//! End-to-end pipeline tests against the in-process store, the
//! deterministic hash embedder, and a scripted LLM.
//!
//! Each test builds a real git repository on disk, runs the full
//! ingestion pipeline (shallow clone included), and exercises the query
//! path through the same services the HTTP shell uses.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use reporag_rs::catalog::RepoCatalog;
use reporag_rs::config::EngineConfig;
use reporag_rs::embed::HashEmbedder;
use reporag_rs::error::AnswerError;
use reporag_rs::ingest::{self, IngestReport, PipelineDeps};
use reporag_rs::llm::{ChatRequest, ChatResponse, LlmProvider, TokenUsage};
use reporag_rs::query::{ConfidenceLevel, Intent, QueryEngine};
use reporag_rs::sparse::SparseRegistry;
use reporag_rs::store::{InMemoryStore, VectorStore};

/// Scripted provider: answers deterministically, never contacts a network.
struct ScriptedProvider;

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AnswerError> {
        let grounded = request.messages.iter().any(|m| m.content.contains("[S1]"));
        Ok(ChatResponse {
            content: if grounded {
                "Based on the sources, see [S1].".to_string()
            } else {
                "No sources were provided.".to_string()
            },
            usage: TokenUsage::default(),
        })
    }
}

/// Test harness bundling the shared services.
struct Harness {
    deps: PipelineDeps,
    store: Arc<InMemoryStore>,
    engine: QueryEngine,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::builder().micro_batch(4).build())
    }

    fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(HashEmbedder::new(128));
        let sparse = Arc::new(SparseRegistry::new());
        let catalog = Arc::new(RepoCatalog::new());
        let config = Arc::new(config);

        let deps = PipelineDeps {
            store: Arc::clone(&store) as Arc<dyn VectorStore>,
            embedder: embedder.clone(),
            sparse: Arc::clone(&sparse),
            catalog: Arc::clone(&catalog),
            config: Arc::clone(&config),
        };
        let engine = QueryEngine::with_provider(
            Arc::clone(&store) as Arc<dyn VectorStore>,
            embedder,
            sparse,
            catalog,
            config,
            Arc::new(ScriptedProvider),
        );
        Self {
            deps,
            store,
            engine,
        }
    }

    async fn ingest(&self, url: &str) -> IngestReport {
        match ingest::run(
            &self.deps,
            url,
            None,
            &|_, _| {},
            &CancellationToken::new(),
        )
        .await
        {
            Ok(report) => report,
            Err(e) => unreachable!("ingestion failed: {e}"),
        }
    }
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "t")
        .env("GIT_AUTHOR_EMAIL", "t@t")
        .env("GIT_COMMITTER_NAME", "t")
        .env("GIT_COMMITTER_EMAIL", "t@t")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    assert!(status.map(|s| s.success()).unwrap_or(false), "git {args:?}");
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|_| unreachable!());
    }
    std::fs::write(path, contents).unwrap_or_else(|_| unreachable!());
}

fn commit_all(dir: &Path) {
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "snapshot"]);
}

/// A repository with only a LICENSE file.
fn license_only_repo() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap_or_else(|_| unreachable!());
    git(dir.path(), &["init", "-q"]);
    write(
        dir.path(),
        "LICENSE",
        "MIT License\n\nPermission is hereby granted, free of charge, to any person\nobtaining a copy of this software.\n",
    );
    commit_all(dir.path());
    dir
}

/// A mixed Python/JavaScript repository with documentation.
fn mixed_repo() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap_or_else(|_| unreachable!());
    git(dir.path(), &["init", "-q"]);

    write(
        dir.path(),
        "README.md",
        "# Widgets\n\nArchitecture overview: the service is split into an\nauthentication layer, a session store, and request routing.\n",
    );
    write(dir.path(), "settings.yaml", "debug: false\nport: 8000\n");
    write(
        dir.path(),
        "src/auth.py",
        "\"\"\"Authentication code for the python backend.\"\"\"\nimport hashlib\n\ndef authenticate(user, password):\n    digest = hashlib.sha256(password.encode()).hexdigest()\n    return digest == user.password_hash\n",
    );
    write(
        dir.path(),
        "src/session.py",
        "\"\"\"Session management for the python backend.\"\"\"\n\ndef create_session(user):\n    session = issue_token(user)\n    return session\n",
    );
    write(
        dir.path(),
        "src/routes.py",
        "\"\"\"Request routing for the python backend.\"\"\"\n\ndef register(app):\n    app.route('/login')\n    app.route('/logout')\n",
    );
    write(
        dir.path(),
        "src/deep/nested/util.py",
        "def helper(value):\n    return value * 2\n",
    );
    write(
        dir.path(),
        "web/login.js",
        "// Login form submission and authentication request.\nfunction submitLogin(form) {\n  return fetch('/login', {method: 'POST', body: form});\n}\n",
    );
    write(
        dir.path(),
        "web/session.js",
        "// Session cookie access for the browser.\nfunction readSession() {\n  return document.cookie;\n}\n",
    );
    write(
        dir.path(),
        "web/nav.js",
        "function highlightNav(item) {\n  item.classList.add('active');\n}\n",
    );
    write(
        dir.path(),
        "web/format.js",
        "function formatDate(d) {\n  return d.toISOString();\n}\n",
    );

    commit_all(dir.path());
    dir
}

#[tokio::test]
async fn scenario_empty_repo_indexes_and_answers_no_information() {
    let origin = license_only_repo();
    // The hash embedder's similarity scale sits well below a real
    // model's; a floor of 0.35 is unreachable without shared tokens.
    let harness = Harness::with_config(
        EngineConfig::builder()
            .micro_batch(4)
            .min_dense_score(0.35)
            .build(),
    );
    let url = origin.path().to_string_lossy().to_string();

    let report = harness.ingest(&url).await;
    assert_eq!(report.file_count, 1);
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.skipped_count, 0);

    let outcome = harness
        .engine
        .chat("Find authentication logic", None, None)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(outcome.answer, "No relevant information found.");
    assert!(outcome.sources.is_empty());
    assert_eq!(outcome.confidence.level, ConfidenceLevel::None);
    assert_eq!(outcome.intent, Intent::Implementation);
}

#[tokio::test]
async fn scenario_language_filtered_query() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();

    let report = harness.ingest(&url).await;
    assert!(report.chunk_count >= 10);

    let outcome = harness
        .engine
        .chat("Python authentication code", None, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(outcome.intent, Intent::Implementation);
    assert!(!outcome.sources.is_empty());
    assert!(outcome.sources.len() <= 10);
    for source in &outcome.sources {
        assert!(
            source.file.ends_with(".py"),
            "non-python source {} leaked through the language filter",
            source.file
        );
    }
    assert!(matches!(
        outcome.confidence.level,
        ConfidenceLevel::High | ConfidenceLevel::Medium
    ));
}

#[tokio::test]
async fn scenario_architecture_intent_prefers_shallow_files() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();
    harness.ingest(&url).await;

    let outcome = harness
        .engine
        .chat("Give me the architecture overview", None, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(outcome.intent, Intent::Architecture);
    assert!(!outcome.sources.is_empty());
    let top = &outcome.sources[0];
    assert_eq!(top.file, "README.md", "top source should be near-root");
}

#[tokio::test]
async fn scenario_overrestrictive_filter_recovers() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();
    harness.ingest(&url).await;

    // Python-only corpus for haskell: the selectivity gate drops the
    // pre-filter and the request must not error.
    let outcome = harness
        .engine
        .chat("Show me Haskell parsers", None, None)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(
        outcome.answer == "No relevant information found." || !outcome.sources.is_empty()
    );
}

#[tokio::test]
async fn scenario_chunk_ids_reproducible_across_reingest() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();

    harness.ingest(&url).await;
    let repo_id = reporag_rs::types::repo_id_from_url(&url);
    let mut first_ids = harness.store.ids(&repo_id);
    first_ids.sort();
    assert!(!first_ids.is_empty());

    // Delete the namespace entirely, then re-ingest the same commit.
    harness
        .store
        .delete_namespace(&repo_id)
        .await
        .unwrap_or_else(|_| unreachable!());
    harness.ingest(&url).await;
    let mut second_ids = harness.store.ids(&repo_id);
    second_ids.sort();

    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn reingest_unchanged_repo_is_idempotent() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();

    let first = harness.ingest(&url).await;
    let second = harness.ingest(&url).await;

    assert_eq!(first.chunk_count, second.chunk_count);
    let repo_id = reporag_rs::types::repo_id_from_url(&url);
    assert_eq!(harness.store.count(&repo_id), first.chunk_count);
}

#[tokio::test]
async fn citations_point_into_the_ingested_tree() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();
    harness.ingest(&url).await;

    let outcome = harness
        .engine
        .chat("how does the session function work", None, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    for source in &outcome.sources {
        assert!(
            origin.path().join(&source.file).exists(),
            "citation {} does not exist in the repository",
            source.file
        );
        let (start, end) = source
            .lines
            .split_once('-')
            .and_then(|(s, e)| Some((s.parse::<usize>().ok()?, e.parse::<usize>().ok()?)))
            .unwrap_or((0, 0));
        assert!(start >= 1 && start <= end, "bad span {}", source.lines);
    }
}

#[tokio::test]
async fn chunk_spans_cover_every_file() {
    let origin = mixed_repo();
    let harness = Harness::new();
    let url = origin.path().to_string_lossy().to_string();
    harness.ingest(&url).await;

    // Every auth.py line must be covered by at least one stored span.
    let repo_id = reporag_rs::types::repo_id_from_url(&url);
    let matches = harness
        .store
        .query(&repo_id, &vec![0.0f32; 128], 1_000, None)
        .await
        .unwrap_or_default();

    let auth_lines = std::fs::read_to_string(origin.path().join("src/auth.py"))
        .unwrap_or_default()
        .lines()
        .count();
    let covered: usize = matches
        .iter()
        .filter(|m| m.payload["path"] == "src/auth.py")
        .map(|m| {
            let start = m.payload["start_line"].as_u64().unwrap_or(0) as usize;
            let end = m.payload["end_line"].as_u64().unwrap_or(0) as usize;
            end - start + 1
        })
        .sum();
    assert!(covered >= auth_lines);
}
