//! End-to-end tests driving the engine through real filesystem events.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conveyor::{
    Engine, FileHandler, HandlerError, ProcessedCounter, Settings, WatcherConfig,
};

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.stability.poll_interval_ms = 10;
    settings
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    pred()
}

#[test]
fn copy_watcher_moves_large_file_and_counts_it() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");
    let dest = dir.path().join("d");

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(WatcherConfig::new("mover", "copy", &source).with_destination(&dest))
        .unwrap();
    engine.start_watcher("mover").unwrap();

    // 1 MB payload, larger than a single page so a slow writer would be
    // caught by the stability wait
    let payload: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8).collect();
    fs::write(source.join("a.txt"), &payload).unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("mover").unwrap() == 1
    }));
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), payload);
    assert!(wait_until(Duration::from_secs(5), || {
        !source.join("a.txt").exists()
    }));

    engine.shutdown();
}

#[test]
fn delete_source_false_keeps_processed_files() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");
    let dest = dir.path().join("d");

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(
            WatcherConfig::new("keeper", "copy", &source)
                .with_destination(&dest)
                .with_delete_source(false),
        )
        .unwrap();
    engine.start_watcher("keeper").unwrap();

    fs::write(source.join("kept.txt"), b"both sides").unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("keeper").unwrap() == 1
    }));
    assert_eq!(fs::read(dest.join("kept.txt")).unwrap(), b"both sides");
    assert!(source.join("kept.txt").exists());

    engine.shutdown();
}

#[test]
fn every_dropped_file_is_processed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");
    let dest = dir.path().join("d");

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(WatcherConfig::new("batch", "copy", &source).with_destination(&dest))
        .unwrap();
    engine.start_watcher("batch").unwrap();

    let count = 5;
    for i in 0..count {
        fs::write(source.join(format!("f{i}.txt")), format!("payload {i}")).unwrap();
    }

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("batch").unwrap() == count
    }));
    // Settle briefly to catch duplicate processing
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(engine.files_processed("batch").unwrap(), count);

    for i in 0..count {
        assert_eq!(
            fs::read(dest.join(format!("f{i}.txt"))).unwrap(),
            format!("payload {i}").into_bytes()
        );
    }

    engine.shutdown();
}

#[test]
fn recursive_watcher_preserves_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");
    let dest = dir.path().join("d");
    fs::create_dir_all(source.join("nested")).unwrap();

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(
            WatcherConfig::new("deep", "copy", &source)
                .with_destination(&dest)
                .with_recursive(true),
        )
        .unwrap();
    engine.start_watcher("deep").unwrap();

    fs::write(source.join("nested").join("inner.txt"), b"below the root").unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("deep").unwrap() == 1
    }));
    assert_eq!(
        fs::read(dest.join("nested").join("inner.txt")).unwrap(),
        b"below the root"
    );

    engine.shutdown();
}

/// Handler that fails on request, for exercising the failure policies
/// through the public extension surface.
struct FlakyHandler {
    config: WatcherConfig,
    processed: ProcessedCounter,
    attempts: Arc<AtomicUsize>,
}

impl FileHandler for FlakyHandler {
    fn name(&self) -> &str {
        "flaky"
    }

    fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn processed(&self) -> ProcessedCounter {
        self.processed.clone()
    }

    fn process(&mut self, path: &Path) -> Result<(), HandlerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if name.starts_with("fail") {
            return Err(HandlerError::Failed(format!("refusing {name}")));
        }
        Ok(())
    }
}

fn register_flaky(engine: &mut Engine, attempts: Arc<AtomicUsize>) {
    engine
        .factory_mut()
        .register(
            "flaky",
            Box::new(move |config: &WatcherConfig| {
                Ok(Box::new(FlakyHandler {
                    config: config.clone(),
                    processed: ProcessedCounter::new(),
                    attempts: Arc::clone(&attempts),
                }) as Box<dyn FileHandler>)
            }),
        )
        .unwrap();
}

#[test]
fn failure_without_escalation_keeps_watcher_alive() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut engine = Engine::new(test_settings()).unwrap();
    register_flaky(&mut engine, Arc::clone(&attempts));

    engine
        .create_watcher(
            WatcherConfig::new("tolerant", "flaky", &source).with_delete_source(false),
        )
        .unwrap();
    engine.start_watcher("tolerant").unwrap();

    fs::write(source.join("fail-1.txt"), b"x").unwrap();
    fs::write(source.join("ok-1.txt"), b"y").unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("tolerant").unwrap() == 1
    }));
    assert!(engine.is_running("tolerant").unwrap());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    // The failed file stays where it was
    assert!(source.join("fail-1.txt").exists());

    engine.shutdown();
}

#[test]
fn escalated_failure_halts_watcher_until_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");

    let attempts = Arc::new(AtomicUsize::new(0));
    let mut engine = Engine::new(test_settings()).unwrap();
    register_flaky(&mut engine, Arc::clone(&attempts));

    let reported: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    engine.set_failure_callback(move |watcher| {
        sink.lock().unwrap().push(watcher.to_string());
    });

    engine
        .create_watcher(
            WatcherConfig::new("strict", "flaky", &source)
                .with_delete_source(false)
                .with_exit_on_failure(true),
        )
        .unwrap();
    engine.start_watcher("strict").unwrap();

    fs::write(source.join("fail-now.txt"), b"x").unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        !engine.is_running("strict").unwrap()
    }));
    assert_eq!(reported.lock().unwrap().as_slice(), ["strict".to_string()]);

    // Restart is an explicit action and brings the watcher back
    engine.start_watcher("strict").unwrap();
    assert!(engine.is_running("strict").unwrap());

    fs::write(source.join("ok-again.txt"), b"y").unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("strict").unwrap() == 1
    }));

    engine.shutdown();
}

#[test]
fn lifecycle_is_idempotent_and_registry_errors_are_typed() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(WatcherConfig::new("solo", "log", &source))
        .unwrap();

    engine.start_watcher("solo").unwrap();
    engine.start_watcher("solo").unwrap();
    assert!(engine.is_running("solo").unwrap());

    engine.stop_watcher("solo").unwrap();
    engine.stop_watcher("solo").unwrap();
    assert!(!engine.is_running("solo").unwrap());

    let before = engine.watcher_count();
    assert!(engine.delete_watcher("missing").is_err());
    assert_eq!(engine.watcher_count(), before);

    engine.shutdown();
}

#[test]
fn scan_on_start_processes_preexisting_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s");
    let dest = dir.path().join("d");
    fs::create_dir_all(&source).unwrap();

    for i in 0..3 {
        fs::write(source.join(format!("old{i}.txt")), format!("backlog {i}")).unwrap();
    }

    let mut engine = Engine::new(test_settings()).unwrap();
    engine
        .create_watcher(
            WatcherConfig::new("backlog", "copy", &source)
                .with_destination(&dest)
                .with_scan_on_start(true),
        )
        .unwrap();
    engine.start_watcher("backlog").unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("backlog").unwrap() >= 3
    }));
    for i in 0..3 {
        assert_eq!(
            fs::read(dest.join(format!("old{i}.txt"))).unwrap(),
            format!("backlog {i}").into_bytes()
        );
    }

    engine.shutdown();
}

#[test]
fn startup_builds_and_starts_all_configured_watchers() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings();

    let source_a: PathBuf = dir.path().join("a");
    let source_b: PathBuf = dir.path().join("b");
    let dest_b: PathBuf = dir.path().join("b-out");

    settings
        .watchers
        .push(WatcherConfig::new("a", "log", &source_a));
    settings
        .watchers
        .push(WatcherConfig::new("b", "copy", &source_b).with_destination(&dest_b));

    let mut engine = Engine::new(settings).unwrap();
    engine.startup().unwrap();

    assert_eq!(engine.watcher_names(), vec!["a".to_string(), "b".to_string()]);
    assert!(engine.is_running("a").unwrap());
    assert!(engine.is_running("b").unwrap());

    fs::write(source_b.join("through.txt"), b"via startup").unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        engine.files_processed("b").unwrap() == 1
    }));
    assert_eq!(fs::read(dest_b.join("through.txt")).unwrap(), b"via startup");

    engine.shutdown();
    assert_eq!(engine.watcher_count(), 0);
}
