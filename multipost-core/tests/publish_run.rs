use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use multipost_core::config::PublisherConfig;
use multipost_core::model::{
    Account, AccountStatus, Listing, Price, PublishOutcome, SuccessKind, Variation,
};
use multipost_core::orchestrator::{
    ListingSource, LogLevel, LogSink, PublishDriver, Publisher, SourceError, StartError,
};
use multipost_core::session::{SessionError, SessionResult};

fn listing(row: u32, name: &str) -> Listing {
    Listing {
        row,
        name: name.into(),
        price: Price {
            amount: Some(100.0),
            currency: "CUP".into(),
        },
        description: format!("{name} en venta"),
        image_url: None,
        category: "Electrónica".into(),
        location: "La Habana".into(),
        contact: "55551234".into(),
        whatsapp_link: None,
        published: false,
        published_at: None,
    }
}

fn account(name: &str) -> Account {
    Account::new(name, format!("{name}.json"))
}

fn test_config() -> Arc<PublisherConfig> {
    let mut config = PublisherConfig::default();
    config.pacing.listing_delay_ms = [0, 0];
    Arc::new(config)
}

#[derive(Default)]
struct DriverLog {
    initialized: AtomicUsize,
    cleanups: AtomicUsize,
    switches: Mutex<Vec<String>>,
    publishes: Mutex<Vec<String>>,
}

enum DriverMode {
    Succeed,
    Fail,
    FailInitialize,
}

struct MockDriver {
    log: Arc<DriverLog>,
    mode: DriverMode,
    active: Option<String>,
    /// Stop the publisher from inside a publish, to exercise the
    /// listing-boundary cancellation check.
    stop_with: Option<Arc<Publisher>>,
    /// Blocks each publish until notified.
    gate: Option<Arc<Notify>>,
}

impl MockDriver {
    fn new(log: Arc<DriverLog>, mode: DriverMode) -> Self {
        Self {
            log,
            mode,
            active: None,
            stop_with: None,
            gate: None,
        }
    }
}

#[async_trait]
impl PublishDriver for MockDriver {
    async fn initialize(&mut self) -> SessionResult<()> {
        self.log.initialized.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            DriverMode::FailInitialize => {
                Err(SessionError::Launch("chromium binary missing".into()))
            }
            _ => Ok(()),
        }
    }

    async fn switch_account(&mut self, account: &Account) -> SessionResult<()> {
        self.log.switches.lock().unwrap().push(account.name.clone());
        self.active = Some(account.name.clone());
        Ok(())
    }

    async fn publish(
        &mut self,
        listing: &Listing,
        account: &Account,
        _variation: &Variation,
    ) -> PublishOutcome {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.active.as_deref() != Some(account.name.as_str()) {
            // Switch-on-demand, the way the real driver ensures the
            // session matches the requested account.
            self.log.switches.lock().unwrap().push(account.name.clone());
            self.active = Some(account.name.clone());
        }
        self.log.publishes.lock().unwrap().push(listing.name.clone());
        if let Some(publisher) = &self.stop_with {
            publisher.stop_run();
        }
        match self.mode {
            DriverMode::Succeed => PublishOutcome::Published(SuccessKind::Confirmed),
            _ => PublishOutcome::Failed("submit button not found".into()),
        }
    }

    async fn cleanup(&mut self) {
        self.log.cleanups.fetch_add(1, Ordering::SeqCst);
        self.active = None;
    }
}

#[derive(Default)]
struct MockSource {
    listings: Mutex<Vec<Listing>>,
    marked: Mutex<Vec<u32>>,
}

impl MockSource {
    fn with_listings(listings: Vec<Listing>) -> Self {
        Self {
            listings: Mutex::new(listings),
            marked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ListingSource for MockSource {
    async fn pending_listings(&self) -> Result<Vec<Listing>, SourceError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|listing| !listing.published)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, row: u32) -> Result<(), SourceError> {
        let mut listings = self.listings.lock().unwrap();
        if let Some(entry) = listings.iter_mut().find(|listing| listing.row == row) {
            if !entry.published {
                entry.mark_published(chrono::Utc::now());
                self.marked.lock().unwrap().push(row);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl LogSink for RecordingSink {
    fn record(&self, level: LogLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

fn build_publisher(source: Arc<MockSource>) -> (Arc<Publisher>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let publisher = Arc::new(Publisher::new(test_config(), source, Arc::clone(&sink) as _));
    (publisher, sink)
}

#[tokio::test]
async fn zero_pending_listings_complete_cleanly() {
    let mut done = listing(1, "Sofá");
    done.mark_published(chrono::Utc::now());
    let source = Arc::new(MockSource::with_listings(vec![done.clone()]));
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    let handle = publisher
        .start_run(driver, vec![done], vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.errors, 0);
    let state = publisher.run_state();
    assert!(!state.running);
    assert_eq!(state.total, 0);
    assert_eq!(log.cleanups.load(Ordering::SeqCst), 1);
    // Nothing to publish, so the browser is never launched.
    assert_eq!(log.initialized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_driver_records_an_error_per_listing() {
    let listings = vec![listing(1, "Sofá"), listing(2, "Mesa"), listing(3, "Silla")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::Fail);
    let handle = publisher
        .start_run(driver, listings, vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.errors, 3);
    assert!(source.marked.lock().unwrap().is_empty());
    let state = publisher.run_state();
    assert!(!state.running);
    assert_eq!(state.errors.len(), 3);
    assert_eq!(log.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn succeeding_driver_marks_every_listing_once() {
    let listings = vec![listing(1, "Sofá"), listing(2, "Mesa"), listing(3, "Silla")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let (publisher, sink) = build_publisher(Arc::clone(&source));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    let handle = publisher
        .start_run(driver, listings, vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.errors, 0);

    let marked = source.marked.lock().unwrap().clone();
    assert_eq!(marked, vec![1, 2, 3]);
    for entry in source.listings.lock().unwrap().iter() {
        assert!(entry.published);
        assert!(entry.published_at.is_some());
    }

    // Session switched on demand for the first listing only; the quota
    // was never exhausted, so no further switches happen.
    assert_eq!(log.switches.lock().unwrap().clone(), vec!["primary"]);

    let lines = sink.lines.lock().unwrap();
    assert!(lines
        .iter()
        .any(|(level, line)| *level == LogLevel::Info && line.contains("published Sofá")));
}

#[tokio::test]
async fn quota_exhaustion_rotates_through_accounts() {
    let listings = vec![
        listing(1, "Sofá"),
        listing(2, "Mesa"),
        listing(3, "Silla"),
        listing(4, "Lámpara"),
    ];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let sink = Arc::new(RecordingSink::default());
    let mut config = PublisherConfig::default();
    config.pacing.listing_delay_ms = [0, 0];
    config.rotation.max_per_account = 2;
    let publisher = Arc::new(Publisher::new(
        Arc::new(config),
        Arc::clone(&source) as _,
        sink as _,
    ));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    let handle = publisher
        .start_run(driver, listings, vec![account("first"), account("second")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.published, 4);
    // Listings 1-2 go out on "first" (switched on demand); the quota of 2
    // triggers an explicit rotation to "second" before listing 3.
    assert_eq!(
        log.switches.lock().unwrap().clone(),
        vec!["first", "second"]
    );
}

#[tokio::test]
async fn stop_request_halts_at_the_listing_boundary() {
    let listings = vec![listing(1, "Sofá"), listing(2, "Mesa"), listing(3, "Silla")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let log = Arc::new(DriverLog::default());
    let mut driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    driver.stop_with = Some(Arc::clone(&publisher));
    let handle = publisher
        .start_run(driver, listings, vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    // The in-flight listing completes; nothing is published after the
    // flag is observed.
    assert_eq!(log.publishes.lock().unwrap().len(), 1);
    assert_eq!(summary.processed, 1);
    assert!(summary.cancelled);
    assert!(!publisher.run_state().running);
    assert_eq!(log.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn initialization_failure_aborts_the_run() {
    let listings = vec![listing(1, "Sofá"), listing(2, "Mesa")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::FailInitialize);
    let handle = publisher
        .start_run(driver, listings, vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.errors, 1);
    let state = publisher.run_state();
    assert!(!state.running);
    assert_eq!(state.errors[0].listing, "system");
    assert!(log.publishes.lock().unwrap().is_empty());
    assert_eq!(log.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_run_requests_are_rejected() {
    let listings = vec![listing(1, "Sofá")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let gate = Arc::new(Notify::new());
    let log = Arc::new(DriverLog::default());
    let mut driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    driver.gate = Some(Arc::clone(&gate));
    let handle = publisher
        .start_run(driver, listings.clone(), vec![account("primary")])
        .unwrap();

    // The first run is parked inside publish; a second request must be
    // rejected, not queued.
    tokio::task::yield_now().await;
    let second = MockDriver::new(Arc::new(DriverLog::default()), DriverMode::Succeed);
    let err = publisher
        .start_run(second, listings, vec![account("primary")])
        .unwrap_err();
    assert_eq!(err, StartError::AlreadyRunning);

    gate.notify_one();
    let summary = handle.await.unwrap();
    assert_eq!(summary.published, 1);
    assert!(!publisher.run_state().running);
}

#[tokio::test]
async fn runs_without_active_accounts_are_rejected() {
    let source = Arc::new(MockSource::default());
    let (publisher, _sink) = build_publisher(Arc::clone(&source));

    let driver = MockDriver::new(Arc::new(DriverLog::default()), DriverMode::Succeed);
    let err = publisher
        .start_run(driver, vec![listing(1, "Sofá")], vec![])
        .unwrap_err();
    assert_eq!(err, StartError::NoAccounts);

    let mut disabled = account("primary");
    disabled.status = AccountStatus::Disabled;
    let driver = MockDriver::new(Arc::new(DriverLog::default()), DriverMode::Succeed);
    let err = publisher
        .start_run(driver, vec![listing(1, "Sofá")], vec![disabled])
        .unwrap_err();
    assert_eq!(err, StartError::NoAccounts);
}

#[tokio::test(start_paused = true)]
async fn listings_are_paced_with_a_human_delay() {
    let listings = vec![listing(1, "Sofá"), listing(2, "Mesa"), listing(3, "Silla")];
    let source = Arc::new(MockSource::with_listings(listings.clone()));
    let sink = Arc::new(RecordingSink::default());
    // Default pacing: 5-10 s between listings.
    let publisher = Arc::new(Publisher::new(
        Arc::new(PublisherConfig::default()),
        Arc::clone(&source) as _,
        sink as _,
    ));

    let log = Arc::new(DriverLog::default());
    let driver = MockDriver::new(Arc::clone(&log), DriverMode::Succeed);
    let started = tokio::time::Instant::now();
    let handle = publisher
        .start_run(driver, listings, vec![account("primary")])
        .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.published, 3);
    let elapsed = started.elapsed();
    // Two inter-listing pauses of at least 5 s each.
    assert!(elapsed >= std::time::Duration::from_secs(10));
    assert!(elapsed <= std::time::Duration::from_secs(21));
}
