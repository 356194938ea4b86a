use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use stock_core::{
    Dispatcher, FetchError, Fetcher, Listener, ListenerError, LogRecord, Monitor, MonitorConfig,
    PollLog, PollResult, PredicateError, PredicateSpec, Status, Target, TransitionKind,
};

const WHEEL_A: &str = "https://shop.example.com/products/strain-110-red";
const WHEEL_B: &str = "https://shop.example.com/products/strain-110-blue";

const SOLD_OUT: &str = r#"<form><button id="AddToCart-product-template" disabled="disabled">Sold out</button></form>"#;
const IN_STOCK: &str = r#"<form><button id="AddToCart-product-template">Add to cart</button></form>"#;

#[derive(Clone, Copy)]
enum Step {
    Page(&'static str),
    Fail(u16),
}

/// Serves a scripted response per URL for the current step; the last entry
/// repeats once the script runs out.
struct ScriptedFetcher {
    step: Arc<AtomicUsize>,
    scripts: HashMap<String, Vec<Step>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new(step: &Arc<AtomicUsize>, scripts: &[(&str, Vec<Step>)]) -> Self {
        Self {
            step: Arc::clone(step),
            scripts: scripts
                .iter()
                .map(|(url, steps)| (url.to_string(), steps.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let script = self
            .scripts
            .get(url)
            .unwrap_or_else(|| panic!("ScriptedFetcher: unexpected URL: {}", url));
        let idx = self.step.load(Ordering::SeqCst).min(script.len() - 1);
        match script[idx] {
            Step::Page(body) => Ok(body.to_string()),
            Step::Fail(status) => Err(FetchError::Http {
                url: url.to_string(),
                status,
                message: "scripted failure".into(),
            }),
        }
    }
}

/// Records `(target_id, status)` for every invocation.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, Status)>>,
}

impl Recorder {
    fn seen(&self) -> Vec<(String, Status)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Listener for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        self.seen
            .lock()
            .unwrap()
            .push((result.target.id.clone(), result.status));
        Ok(())
    }
}

fn wheel(id: &str, url: &str) -> Target {
    Target::from_spec(id, url, &PredicateSpec::default()).unwrap()
}

struct Harness {
    step: Arc<AtomicUsize>,
    fetcher: Arc<ScriptedFetcher>,
    changes: Arc<Recorder>,
    polls: Arc<Recorder>,
    monitor: Monitor,
}

fn harness(targets: Vec<Target>, scripts: &[(&str, Vec<Step>)]) -> Harness {
    harness_with(targets, scripts, Dispatcher::new())
}

fn harness_with(targets: Vec<Target>, scripts: &[(&str, Vec<Step>)], dispatcher: Dispatcher) -> Harness {
    let step = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(ScriptedFetcher::new(&step, scripts));
    let changes = Arc::new(Recorder::default());
    let polls = Arc::new(Recorder::default());
    let dispatcher = dispatcher
        .with_change_listener(changes.clone())
        .with_poll_listener(polls.clone());
    let monitor = Monitor::new(targets, MonitorConfig::default(), fetcher.clone(), dispatcher);
    Harness {
        step,
        fetcher,
        changes,
        polls,
        monitor,
    }
}

impl Harness {
    async fn sweeps(&self, n: usize) -> Vec<Vec<PollResult>> {
        let mut all = Vec::new();
        for i in 0..n {
            self.step.store(i, Ordering::SeqCst);
            all.push(self.monitor.sweep().await);
        }
        all
    }
}

#[tokio::test]
async fn first_poll_never_fires_change_listeners() {
    let h = harness(
        vec![wheel("red", WHEEL_A), wheel("blue", WHEEL_B)],
        &[
            (WHEEL_A, vec![Step::Page(IN_STOCK)]),
            (WHEEL_B, vec![Step::Fail(500)]),
        ],
    );

    let sweeps = h.sweeps(1).await;
    assert!(sweeps[0]
        .iter()
        .all(|r| r.transition == TransitionKind::FirstObservation));
    assert!(h.changes.seen().is_empty());
    assert_eq!(
        h.polls.seen(),
        vec![("red".to_string(), Status::Available), ("blue".to_string(), Status::Error)]
    );
}

#[tokio::test]
async fn identical_statuses_do_not_fire() {
    let h = harness(
        vec![wheel("red", WHEEL_A)],
        &[(WHEEL_A, vec![Step::Page(SOLD_OUT)])],
    );

    let sweeps = h.sweeps(3).await;
    assert_eq!(sweeps[2][0].transition, TransitionKind::Unchanged);
    assert!(h.changes.seen().is_empty());
    assert_eq!(h.polls.seen().len(), 3);
}

#[tokio::test]
async fn each_transition_fires_each_change_listener_once() {
    let second = Arc::new(Recorder::default());
    let h = harness_with(
        vec![wheel("red", WHEEL_A)],
        &[(
            WHEEL_A,
            vec![
                Step::Page(SOLD_OUT),
                Step::Page(IN_STOCK),
                Step::Page(IN_STOCK),
                Step::Fail(503),
                Step::Page(SOLD_OUT),
            ],
        )],
        Dispatcher::new().with_change_listener(second.clone()),
    );

    h.sweeps(5).await;
    let expected = vec![
        ("red".to_string(), Status::Available),
        ("red".to_string(), Status::Error),
        ("red".to_string(), Status::NotAvailable),
    ];
    assert_eq!(h.changes.seen(), expected);
    assert_eq!(second.seen(), expected);
    assert_eq!(h.polls.seen().len(), 5);
}

#[tokio::test]
async fn fetch_failure_does_not_stop_the_sweep() {
    let h = harness(
        vec![wheel("red", WHEEL_A), wheel("blue", WHEEL_B)],
        &[
            (WHEEL_A, vec![Step::Fail(404)]),
            (WHEEL_B, vec![Step::Page(IN_STOCK)]),
        ],
    );

    let results = h.monitor.sweep().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, Status::Error);
    assert_eq!(results[1].status, Status::Available);
    assert_eq!(*h.fetcher.calls.lock().unwrap(), vec![WHEEL_A, WHEEL_B]);
}

struct StatusProbe {
    monitor_status: Arc<Mutex<Vec<Option<Status>>>>,
}

#[async_trait]
impl Listener for StatusProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        self.monitor_status.lock().unwrap().push(result.previous);
        Ok(())
    }
}

#[tokio::test]
async fn poll_results_carry_previous_status() {
    let previous = Arc::new(Mutex::new(Vec::new()));
    let h = harness_with(
        vec![wheel("red", WHEEL_A)],
        &[(WHEEL_A, vec![Step::Page(SOLD_OUT), Step::Page(IN_STOCK)])],
        Dispatcher::new().with_poll_listener(Arc::new(StatusProbe {
            monitor_status: Arc::clone(&previous),
        })),
    );

    h.sweeps(2).await;
    assert_eq!(*previous.lock().unwrap(), vec![None, Some(Status::NotAvailable)]);

    let statuses = h.monitor.statuses().await;
    assert_eq!(statuses[0].status, Some(Status::Available));
    assert!(statuses[0].last_polled.is_some());
    assert_eq!(h.monitor.sweep_count(), 2);
}

#[tokio::test]
async fn log_holds_one_record_per_poll() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let h = harness_with(
        vec![wheel("red", WHEEL_A)],
        &[(
            WHEEL_A,
            vec![Step::Page(SOLD_OUT), Step::Page(IN_STOCK), Step::Fail(500), Step::Page(IN_STOCK)],
        )],
        Dispatcher::new().with_poll_listener(Arc::new(PollLog::new(&log_path))),
    );

    h.sweeps(4).await;

    let content = std::fs::read_to_string(&log_path).unwrap();
    let records: Vec<LogRecord> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is a JSON record"))
        .collect();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.url == WHEEL_A));
    assert_eq!(
        records.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![Status::NotAvailable, Status::Available, Status::Error, Status::Available]
    );
}

#[tokio::test]
async fn predicate_flip_then_failure_end_to_end() {
    // 0 = sold out, 1 = in stock, 2 = predicate fails
    let mode = Arc::new(AtomicU8::new(0));
    let predicate_mode = Arc::clone(&mode);
    let target = Target::new(
        "red",
        WHEEL_A,
        Arc::new(move |_: &str| -> Result<bool, PredicateError> {
            match predicate_mode.load(Ordering::SeqCst) {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(PredicateError::Failed("markup changed".into())),
            }
        }),
    );

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("log.jsonl");
    let h = harness_with(
        vec![target],
        &[(WHEEL_A, vec![Step::Page(IN_STOCK)])],
        Dispatcher::new().with_poll_listener(Arc::new(PollLog::new(&log_path))),
    );
    let lines = || std::fs::read_to_string(&log_path).unwrap().lines().count();

    let r1 = h.monitor.sweep().await;
    assert_eq!(r1[0].status, Status::NotAvailable);
    assert!(h.changes.seen().is_empty());
    assert_eq!(lines(), 1);

    mode.store(1, Ordering::SeqCst);
    let r2 = h.monitor.sweep().await;
    assert_eq!(r2[0].status, Status::Available);
    assert_eq!(h.changes.seen(), vec![("red".to_string(), Status::Available)]);
    assert_eq!(lines(), 2);

    mode.store(2, Ordering::SeqCst);
    let r3 = h.monitor.sweep().await;
    assert_eq!(r3[0].status, Status::Error);
    assert_eq!(
        h.changes.seen(),
        vec![("red".to_string(), Status::Available), ("red".to_string(), Status::Error)]
    );
    assert_eq!(lines(), 3);
}

#[tokio::test]
async fn failing_log_does_not_block_other_listeners() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness_with(
        vec![wheel("red", WHEEL_A), wheel("blue", WHEEL_B)],
        &[
            (WHEEL_A, vec![Step::Page(SOLD_OUT), Step::Page(IN_STOCK)]),
            (WHEEL_B, vec![Step::Page(SOLD_OUT)]),
        ],
        // A directory path makes every append fail.
        Dispatcher::new().with_poll_listener(Arc::new(PollLog::new(dir.path()))),
    );

    h.sweeps(2).await;
    assert_eq!(h.polls.seen().len(), 4);
    assert_eq!(h.changes.seen(), vec![("red".to_string(), Status::Available)]);
}

#[tokio::test(start_paused = true)]
async fn run_sweeps_until_shutdown() {
    let step = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(ScriptedFetcher::new(&step, &[(WHEEL_A, vec![Step::Page(IN_STOCK)])]));
    let polls = Arc::new(Recorder::default());
    let config = MonitorConfig::default().with_base_delay(1000).with_jitter(0);
    let monitor = Arc::new(Monitor::new(
        vec![wheel("red", WHEEL_A)],
        config,
        fetcher,
        Dispatcher::new().with_poll_listener(polls.clone()),
    ));

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let running = Arc::clone(&monitor);
    let handle = tokio::spawn(async move {
        running
            .run(async move {
                let _ = rx.await;
            })
            .await;
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("monitor should stop after shutdown")
        .unwrap();

    let sweeps = monitor.sweep_count();
    assert!(sweeps >= 2, "expected at least two sweeps, got {sweeps}");
    assert_eq!(polls.seen().len() as u64, sweeps);
}

/// Reads the monitor's stored statuses from inside `on_poll`.
#[derive(Default)]
struct StateReader {
    monitor: OnceLock<Arc<Monitor>>,
    seen: Mutex<Vec<(Status, Option<Status>)>>,
}

#[async_trait]
impl Listener for StateReader {
    fn name(&self) -> &'static str {
        "state_reader"
    }

    async fn on_poll(&self, result: &PollResult) -> Result<(), ListenerError> {
        let monitor = self
            .monitor
            .get()
            .ok_or_else(|| ListenerError::Failed("monitor not set".into()))?;
        let stored = monitor
            .statuses()
            .await
            .into_iter()
            .find(|s| s.url == result.target.url)
            .and_then(|s| s.status);
        self.seen.lock().unwrap().push((result.status, stored));
        Ok(())
    }
}

#[tokio::test]
async fn poll_listeners_observe_updated_state() {
    let step = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(ScriptedFetcher::new(
        &step,
        &[
            (WHEEL_A, vec![Step::Page(SOLD_OUT), Step::Page(IN_STOCK)]),
            (WHEEL_B, vec![Step::Fail(503), Step::Page(SOLD_OUT)]),
        ],
    ));
    let reader = Arc::new(StateReader::default());
    let monitor = Arc::new(Monitor::new(
        vec![wheel("red", WHEEL_A), wheel("blue", WHEEL_B)],
        MonitorConfig::default(),
        fetcher,
        Dispatcher::new()
            .with_change_listener(reader.clone())
            .with_poll_listener(reader.clone()),
    ));
    assert!(reader.monitor.set(Arc::clone(&monitor)).is_ok());

    for i in 0..2 {
        step.store(i, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), monitor.sweep())
            .await
            .expect("listener reading monitor state must not deadlock");
    }

    let seen = reader.seen.lock().unwrap().clone();
    // Four polls, plus the change-listener call for red and blue in sweep two.
    assert_eq!(seen.len(), 6);
    for (status, stored) in seen {
        assert_eq!(stored, Some(status));
    }
}

#[tokio::test]
async fn interrupted_sweep_is_not_counted() {
    let step = Arc::new(AtomicUsize::new(0));
    let fetcher = Arc::new(ScriptedFetcher::new(&step, &[(WHEEL_A, vec![Step::Page(IN_STOCK)])]));
    let monitor = Monitor::new(
        vec![wheel("red", WHEEL_A)],
        MonitorConfig::default(),
        fetcher.clone(),
        Dispatcher::new(),
    );

    monitor.run(async {}).await;

    assert_eq!(monitor.sweep_count(), 0);
    assert!(fetcher.calls.lock().unwrap().is_empty());
}
