//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run whole jobs
//! end-to-end through the coordinator.

use chrono::Utc;
use corpus_harvest::config::{
    Config, CrawlerConfig, OutputConfig, ProfileConfig, RobotsPolicy, SelectorConfig,
    UserAgentConfig, YearSource,
};
use corpus_harvest::crawler::{Coordinator, DrainReason};
use corpus_harvest::state::{CrawlState, EntryState, FrontierEntry, JobPhase};
use corpus_harvest::storage::{load_checkpoint, save_checkpoint, ArticleSink, RunStatus, SqliteStorage};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY_TEXT: &str = "Артериальная гипертензия остаётся одним из главных факторов риска \
    сердечно-сосудистых заболеваний у взрослых пациентов.";

/// Creates a single-profile configuration rooted in `dir`
fn create_test_config(dir: &Path, seeds: Vec<String>) -> Config {
    Config {
        crawler: CrawlerConfig {
            retry_backoff: 0,
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.join("corpus.db").display().to_string(),
            jobs_dir: dir.join("jobs").display().to_string(),
        },
        profiles: vec![ProfileConfig {
            source_id: "test".to_string(),
            allowed_domains: vec!["127.0.0.1".to_string()],
            seeds,
            depth_limit: 2,
            concurrency: 1,
            delay: 0,
            jitter: [1.0, 1.0],
            min_text_length: 50,
            robots_policy: RobotsPolicy::Ignore,
            item_budget: 1000,
            job_dir: None,
            cookies: false,
            user_agent: None,
            headers: BTreeMap::new(),
            skip_patterns: vec!["/search".to_string()],
            year_precedence: vec![YearSource::Structured, YearSource::DateText, YearSource::Url],
            selectors: SelectorConfig::default(),
            url_categories: BTreeMap::new(),
        }],
    }
}

/// An article page with the given links
fn article_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!(
        "<html><body><h1>{}</h1><article><p>{}</p></article>{}</body></html>",
        title, BODY_TEXT, anchors
    )
}

/// A listing page whose own text is too short to be an article
fn hub_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!(
        "<html><body><h1>Статьи</h1><p>Список</p>{}</body></html>",
        anchors
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body, "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(expected)
        .mount(server)
        .await;
}

fn open_sink(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

/// A stop signal that never fires
fn no_stop() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

#[tokio::test]
async fn test_depth_limit_stops_chain() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // A (depth 0) -> B (1) -> C (2) -> D (3, beyond the limit)
    mount_page(&server, "/", article_page("A", &["/b"]), 1).await;
    mount_page(&server, "/b", article_page("B", &["/c"]), 1).await;
    mount_page(&server, "/c", article_page("C", &["/d"]), 1).await;
    mount_page(&server, "/d", article_page("D", &[]), 0).await;

    let config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.drain_reason, None);
    assert_eq!(summary.counters.total_accepted, 3);
    assert_eq!(summary.pending, 0);
    assert!(!coordinator
        .frontier()
        .contains(&format!("{}/d", server.uri())));

    let sink = open_sink(&config);
    assert_eq!(sink.count(Some("test")).unwrap(), 3);
}

#[tokio::test]
async fn test_robots_disallow_prevents_fetch() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", hub_page(&["/private/1", "/public/1"]), 1).await;
    mount_page(&server, "/private/1", article_page("Private", &[]), 0).await;
    mount_page(&server, "/public/1", article_page("Public", &[]), 1).await;

    let mut config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    config.profiles[0].robots_policy = RobotsPolicy::Enforce;

    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    let counters = &summary.counters.by_source["test"];
    assert_eq!(counters.accepted, 1);
    assert_eq!(counters.rejected, 1);
    assert_eq!(counters.failed, 1);
    assert_eq!(summary.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_transient_failures_are_retried_then_dropped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // One attempt plus two retries
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(dir.path(), vec![format!("{}/flaky", server.uri())]);
    config.crawler.max_retries = 2;

    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    let counters = &summary.counters.by_source["test"];
    assert_eq!(counters.retried, 2);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.fetched, 0);
    assert_eq!(summary.pending, 0);
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/", hub_page(&["/gone", "/ok"]), 1).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/ok", article_page("Ok", &[]), 1).await;

    let config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    let counters = &summary.counters.by_source["test"];
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.retried, 0);
    assert_eq!(counters.accepted, 1);
}

#[tokio::test]
async fn test_budget_triggers_drain() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let links = ["/a1", "/a2", "/a3", "/a4", "/a5"];
    mount_page(&server, "/", hub_page(&links), 1).await;
    for (i, link) in links.iter().enumerate() {
        // Per-domain concurrency 1: exactly two articles are fetched
        let expected = if i < 2 { 1 } else { 0 };
        mount_page(&server, link, article_page(link, &[]), expected).await;
    }

    let mut config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    config.profiles[0].item_budget = 2;

    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    assert_eq!(summary.drain_reason, Some(DrainReason::BudgetReached));
    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(summary.counters.total_accepted, 2);
    assert_eq!(summary.pending, 3);

    let saved = load_checkpoint(coordinator.job_dir()).unwrap().unwrap();
    assert_eq!(saved.phase, JobPhase::Stopped);
    assert_eq!(saved.pending.len(), 3);
    assert_eq!(open_sink(&config).count(None).unwrap(), 2);
}

#[tokio::test]
async fn test_budget_is_a_hard_cap_with_parallel_fetches() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let links = ["/p1", "/p2", "/p3", "/p4"];
    mount_page(&server, "/", hub_page(&links), 1).await;
    for link in links {
        // All four may be in flight when the first one lands
        Mock::given(method("GET"))
            .and(path(link))
            .respond_with(html(article_page(link, &[])).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    config.profiles[0].item_budget = 1;
    config.profiles[0].concurrency = 4;

    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    assert_eq!(summary.drain_reason, Some(DrainReason::BudgetReached));
    assert_eq!(summary.counters.total_accepted, 1);
    assert_eq!(summary.counters.by_source["test"].accepted, 1);
    assert_eq!(open_sink(&config).count(None).unwrap(), 1);
}

#[tokio::test]
async fn test_resume_skips_seen_urls() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let base = server.uri();

    mount_page(&server, "/", article_page("A", &["/b"]), 0).await;
    mount_page(&server, "/b", article_page("B", &["/"]), 1).await;

    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    let job_dir = config.job_dir(&config.profiles[0]);

    // A crash left A done and B pending
    let mut state = CrawlState::new("test");
    state.config_hash = "hash".to_string();
    state.phase = JobPhase::Running;
    state.seen = vec![format!("{}/", base), format!("{}/b", base)];
    state.pending = vec![FrontierEntry {
        url: format!("{}/b", base),
        domain: server.address().to_string(),
        depth: 1,
        source_id: "test".to_string(),
        state: EntryState::InFlight,
        retry_count: 0,
        enqueued_at: Utc::now(),
        sequence: 1,
        category_hint: None,
        not_before: None,
    }];
    state.counters.record_accepted("test");
    save_checkpoint(&job_dir, &state).unwrap();

    let mut coordinator = Coordinator::resume(&config, &job_dir, "hash").unwrap();
    let summary = coordinator.run(no_stop()).await.unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.counters.total_accepted, 2);
    assert_eq!(summary.seen, 2);
}

#[tokio::test]
async fn test_politeness_delay_spaces_requests() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/", hub_page(&["/a", "/b"]), 1).await;
    mount_page(&server, "/a", article_page("A", &[]), 1).await;
    mount_page(&server, "/b", article_page("B", &[]), 1).await;

    let mut config = create_test_config(dir.path(), vec![format!("{}/", server.uri())]);
    config.profiles[0].delay = 300;

    let started = Instant::now();
    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    coordinator.run(no_stop()).await.unwrap();

    // Three dispatches to one domain need two full gaps
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_stop_signal_abandons_after_grace_timeout() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(article_page("Slow", &[])).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let mut config = create_test_config(dir.path(), vec![format!("{}/slow", server.uri())]);
    config.crawler.grace_timeout = 0;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
        tx.closed().await;
    });

    let mut coordinator = Coordinator::start(&config, "test", "hash", false).unwrap();
    let summary = coordinator.run(rx).await.unwrap();

    assert_eq!(summary.drain_reason, Some(DrainReason::StopRequested));
    assert_eq!(summary.abandoned, 1);
    assert_eq!(summary.counters.by_source["test"].failed, 1);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.status, RunStatus::Interrupted);
    assert_eq!(open_sink(&config).count(None).unwrap(), 0);
}
