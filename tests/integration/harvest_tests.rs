//! Integration tests for the harvester
//!
//! These tests drive the public API against temporary directories and
//! in-memory event streams, covering a full harvest cycle end-to-end.

use dict_harvester::config::{Config, CrawlerConfig, OutputConfig};
use dict_harvester::crawler::{
    run_event_stream, run_harvest, Coordinator, FetchError, FetchOutcome, RetryDecision,
};
use dict_harvester::output::{load_statistics, FlushPolicy, OutputAggregator};
use dict_harvester::state::{CrawlStateStore, StatusKind};
use dict_harvester::url::Level;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Creates a test configuration rooted at `dir`
fn create_test_config(dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig::default(),
        output: OutputConfig {
            data_dir: dir.join("data").to_string_lossy().into_owned(),
            state_dir: dir.join("spider_state").to_string_lossy().into_owned(),
            flush_every: 100,
            flush_policy: FlushPolicy::Global,
        },
    }
}

fn word(word: &str, letter: &str) -> Value {
    json!({ "word": word, "letter": letter, "definition": format!("meaning of {}", word) })
}

fn read_shard(data_dir: &Path, key: &str) -> Vec<Value> {
    let content = std::fs::read_to_string(data_dir.join(format!("{}.json", key))).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_failure_then_success_clears_entry() {
    let dir = TempDir::new().unwrap();
    let store = CrawlStateStore::open(dir.path()).unwrap();

    store
        .mark_status("http://x/a", Level::Word, StatusKind::Failed, 1)
        .unwrap();
    let status = store.get_status("http://x/a", Level::Word).unwrap();
    assert_eq!(status.status, StatusKind::Failed);
    assert_eq!(status.retry_count, 1);

    store
        .mark_status("http://x/a", Level::Word, StatusKind::Success, 0)
        .unwrap();
    assert!(store.get_status("http://x/a", Level::Word).is_none());

    // The clear is durable
    drop(store);
    let store = CrawlStateStore::open(dir.path()).unwrap();
    assert!(store.get_status("http://x/a", Level::Word).is_none());
}

#[test]
fn test_single_shard_close_writes_everything() {
    let dir = TempDir::new().unwrap();
    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();

    for i in 0..150 {
        let admission = output.process(word(&format!("a{}", i), "a")).unwrap();
        assert!(admission.is_accepted());
    }
    let stats = output.close().unwrap();

    assert_eq!(read_shard(dir.path(), "a").len(), 150);
    assert_eq!(stats.items_by_letter.get("a"), Some(&150));

    let on_disk = load_statistics(dir.path()).unwrap();
    assert_eq!(on_disk.total_items, 150);
    assert_eq!(on_disk.items_by_letter.get("a"), Some(&150));
}

#[test]
fn test_rejected_record_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();

    let admission = output.process(json!({ "letter": "a" })).unwrap();
    assert!(!admission.is_accepted());
    assert!(!dir.path().join("a.json").exists());
    assert_eq!(output.stats().total_items, 0);

    let stats = output.close().unwrap();
    assert_eq!(stats.total_items, 0);
    assert!(!dir.path().join("a.json").exists());
}

#[test]
fn test_hundredth_record_flushes_its_shard() {
    let dir = TempDir::new().unwrap();
    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();

    for i in 0..99 {
        output.process(word(&format!("b{}", i), "b")).unwrap();
    }
    assert!(!dir.path().join("b.json").exists());

    output.process(word("b99", "b")).unwrap();
    assert_eq!(read_shard(dir.path(), "b").len(), 100);

    // Between boundaries the file lags the buffer
    for i in 100..120 {
        output.process(word(&format!("b{}", i), "b")).unwrap();
    }
    assert_eq!(read_shard(dir.path(), "b").len(), 100);

    output.close().unwrap();
    assert_eq!(read_shard(dir.path(), "b").len(), 120);
}

#[test]
fn test_close_flushes_every_shard() {
    let dir = TempDir::new().unwrap();
    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();

    for (i, letter) in ["a", "b", "c"].iter().cycle().take(31).enumerate() {
        output.process(word(&format!("w{}", i), letter)).unwrap();
    }
    let stats = output.close().unwrap();

    assert_eq!(read_shard(dir.path(), "a").len(), 11);
    assert_eq!(read_shard(dir.path(), "b").len(), 10);
    assert_eq!(read_shard(dir.path(), "c").len(), 10);
    assert_eq!(stats.total_items, 31);
    assert!(stats.is_consistent());
}

#[test]
fn test_output_accumulates_across_runs() {
    let dir = TempDir::new().unwrap();

    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();
    output.process(word("apple", "a")).unwrap();
    output.close().unwrap();

    let output = OutputAggregator::open(dir.path(), 100, FlushPolicy::Global).unwrap();
    output.process(word("axe", "a")).unwrap();
    let stats = output.close().unwrap();

    let records = read_shard(dir.path(), "a");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["word"], "apple");
    assert_eq!(records[1]["word"], "axe");
    assert_eq!(stats.items_by_letter.get("a"), Some(&2));
}

#[test]
fn test_rejection_does_not_advance_progress() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(&create_test_config(dir.path())).unwrap();

    let report = coordinator
        .page_extracted(
            "https://x.org/dict/english/apple",
            vec![word("apple", "a"), json!({ "word": "ghost" }), json!(42)],
        )
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(coordinator.store().get_progress().processed_words, 1);
}

#[test]
fn test_retry_then_give_up() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(&create_test_config(dir.path())).unwrap();
    let url = "https://x.org/dict/english/a/a-range/";

    for attempt in 0..3 {
        let decision = coordinator
            .fetch_outcome(&FetchOutcome::response(url, 503, attempt))
            .unwrap();
        assert_eq!(
            decision,
            RetryDecision::Retry {
                next_attempt: attempt + 1
            }
        );
        assert!(coordinator.store().get_status(url, Level::Second).is_none());
    }

    let decision = coordinator
        .fetch_outcome(&FetchOutcome::response(url, 503, 3))
        .unwrap();
    assert!(decision.is_terminal());

    let status = coordinator.store().get_status(url, Level::Second).unwrap();
    assert_eq!(status.status, StatusKind::MaxRetriesReached);
    assert_eq!(status.retry_count, 3);
}

#[test]
fn test_connection_error_is_terminal_immediately() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(&create_test_config(dir.path())).unwrap();
    let url = "https://x.org/dict/english/apple";

    let decision = coordinator
        .fetch_outcome(&FetchOutcome::failure(url, FetchError::Connection, 0))
        .unwrap();
    assert_eq!(
        decision,
        RetryDecision::Terminal {
            status: StatusKind::Failed,
            retry_count: 0
        }
    );
    assert_eq!(coordinator.store().failed_urls(Some(Level::Word)).len(), 1);
}

#[test]
fn test_resume_after_reopen() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());
    let failed = "https://x.org/dict/english/cabbage";

    {
        let coordinator = Coordinator::open(&config).unwrap();
        coordinator.set_total_words(500).unwrap();
        coordinator.letter_started("c").unwrap();
        coordinator
            .page_extracted("https://x.org/dict/english/cat", vec![word("cat", "c")])
            .unwrap();
        coordinator
            .fetch_outcome(&FetchOutcome::response(failed, 404, 0))
            .unwrap();
        // No shutdown: everything above must already be on disk
    }

    let coordinator = Coordinator::open(&config).unwrap();
    let progress = coordinator.store().get_progress();
    assert_eq!(progress.current_letter.as_deref(), Some("c"));
    assert_eq!(progress.total_words, 500);
    assert_eq!(progress.processed_words, 1);

    let links: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|l| format!("https://x.org/browse/english/{}/", l))
        .collect();
    assert_eq!(coordinator.start_listing(&links), links[2..].to_vec());

    let status = coordinator.store().get_status(failed, Level::Word).unwrap();
    assert_eq!(status.status, StatusKind::Failed);
}

#[test]
fn test_fresh_start_discards_state_but_keeps_output() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let coordinator = Coordinator::open(&config).unwrap();
    coordinator.letter_started("m").unwrap();
    coordinator
        .page_extracted("https://x.org/dict/english/moon", vec![word("moon", "m")])
        .unwrap();
    coordinator.shutdown().unwrap();
    drop(coordinator);

    CrawlStateStore::reset(Path::new(&config.output.state_dir)).unwrap();

    let coordinator = Coordinator::open(&config).unwrap();
    assert_eq!(coordinator.store().get_progress().current_letter, None);
    assert_eq!(coordinator.output().stats().total_items, 1);
}

#[tokio::test]
async fn test_full_harvest_over_event_stream() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path());

    let events = [
        json!({"event": "start_listing", "urls": [
            "https://x.org/browse/english/a/",
            "https://x.org/browse/english/b/"
        ]}),
        json!({"event": "letter_started", "letter": "a"}),
        json!({"event": "total_words", "total": 3}),
        json!({"event": "discovered", "urls": [
            "https://x.org/dict/english/apple",
            "https://x.org/dict/english/axe"
        ]}),
        json!({"event": "fetch_outcome", "url": "https://x.org/dict/english/apple", "status": 200}),
        json!({"event": "extracted", "url": "https://x.org/dict/english/apple",
               "records": [{"word": "apple", "letter": "a"}]}),
        json!({"event": "fetch_outcome", "url": "https://x.org/dict/english/axe", "error": "timeout", "attempt": 3}),
        json!({"event": "letter_started", "letter": "b"}),
        json!({"event": "extracted", "url": "https://x.org/dict/english/bee",
               "records": [{"word": "bee", "letter": "b"}, {"letter": "b"}]}),
    ];
    let input: String = events.iter().map(|e| format!("{}\n", e)).collect();
    let mut output = Vec::new();

    let summary = run_harvest(
        &config,
        input.as_bytes(),
        &mut output,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(summary.events, 9);
    assert_eq!(summary.malformed, 0);
    assert!(!summary.interrupted);
    assert_eq!(summary.stats.total_items, 2);

    let answers: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(answers.len(), 9);
    assert_eq!(answers[0]["decision"], "dispatch");
    assert_eq!(answers[0]["urls"].as_array().unwrap().len(), 2);
    assert_eq!(answers[4]["outcome"]["action"], "proceed");
    assert_eq!(answers[6]["outcome"]["action"], "terminal");
    assert_eq!(answers[6]["outcome"]["status"], "max_retries_reached");
    assert_eq!(answers[8]["accepted"], 1);
    assert_eq!(answers[8]["rejected"].as_array().unwrap().len(), 1);

    let data_dir = Path::new(&config.output.data_dir);
    assert_eq!(read_shard(data_dir, "a").len(), 1);
    assert_eq!(read_shard(data_dir, "b").len(), 1);

    let store = CrawlStateStore::open(Path::new(&config.output.state_dir)).unwrap();
    let progress = store.get_progress();
    assert_eq!(progress.current_letter.as_deref(), Some("b"));
    assert_eq!(progress.processed_words, 2);
    assert_eq!(progress.total_words, 3);
    assert_eq!(store.failed_urls(None).len(), 1);
}

#[tokio::test]
async fn test_interrupt_drains_buffered_output() {
    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::open(&create_test_config(dir.path())).unwrap();

    let (mut engine_tx, harvester_rx) = tokio::io::duplex(4096);
    let (harvester_tx, engine_rx) = tokio::io::duplex(4096);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let run = run_event_stream(
        &coordinator,
        BufReader::new(harvester_rx),
        harvester_tx,
        async {
            let _ = stop_rx.await;
        },
    );

    let engine = async move {
        let lines = format!(
            "{}\n{}\n",
            json!({"event": "letter_started", "letter": "q"}),
            json!({"event": "extracted", "url": "https://x.org/dict/english/quiz",
                   "records": [{"word": "quiz", "letter": "q"}]}),
        );
        engine_tx.write_all(lines.as_bytes()).await.unwrap();

        let mut answers = BufReader::new(engine_rx).lines();
        let first = answers.next_line().await.unwrap().unwrap();
        let second = answers.next_line().await.unwrap().unwrap();
        stop_tx.send(()).unwrap();

        // Keep the event side open so only the interrupt can end the stream
        (engine_tx, vec![first, second])
    };

    let (summary, (_engine_tx, answers)) = tokio::join!(run, engine);
    let summary = summary.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.events, 2);
    assert_eq!(answers.len(), 2);

    // Below the flush boundary the record is still only buffered
    assert!(!dir.path().join("data").join("q.json").exists());

    let stats = coordinator.shutdown().unwrap();
    assert_eq!(stats.total_items, 1);
    assert_eq!(read_shard(&dir.path().join("data"), "q").len(), 1);
}
