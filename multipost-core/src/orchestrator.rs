use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PublisherConfig;
use crate::model::{
    Account, AccountStatus, Listing, PublishOutcome, RunError, RunState, RunSummary, SuccessKind,
    Variation,
};
use crate::rotation;
use crate::session::{SessionDriver, SessionResult};
use crate::variation::VariationEngine;

#[derive(Debug, Error)]
#[error("listing source error: {0}")]
pub struct SourceError(pub String);

/// Where listings come from and where the published flag lives. The
/// implementation (spreadsheet, uploaded file, ...) stays outside the core.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn pending_listings(&self) -> Result<Vec<Listing>, SourceError>;
    /// Idempotent: marking an already-published row is a no-op.
    async fn mark_published(&self, row: u32) -> Result<(), SourceError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Fire-and-forget event sink. Implementations must never block the run;
/// a sink that loses a line loses a line.
pub trait LogSink: Send + Sync {
    fn record(&self, level: LogLevel, message: &str);
}

/// Default sink: forwards run events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!(target: "multipost::run", "{message}"),
            LogLevel::Warn => warn!(target: "multipost::run", "{message}"),
            LogLevel::Error => error!(target: "multipost::run", "{message}"),
        }
    }
}

/// The one seam between the orchestration loop and the browser session.
#[async_trait]
pub trait PublishDriver: Send {
    async fn initialize(&mut self) -> SessionResult<()>;
    async fn switch_account(&mut self, account: &Account) -> SessionResult<()>;
    async fn publish(
        &mut self,
        listing: &Listing,
        account: &Account,
        variation: &Variation,
    ) -> PublishOutcome;
    async fn cleanup(&mut self);
}

#[async_trait]
impl PublishDriver for SessionDriver {
    async fn initialize(&mut self) -> SessionResult<()> {
        SessionDriver::initialize(self).await
    }

    async fn switch_account(&mut self, account: &Account) -> SessionResult<()> {
        SessionDriver::switch_account(self, account).await
    }

    async fn publish(
        &mut self,
        listing: &Listing,
        account: &Account,
        variation: &Variation,
    ) -> PublishOutcome {
        SessionDriver::publish(self, listing, account, variation).await
    }

    async fn cleanup(&mut self) {
        SessionDriver::cleanup(self).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a publishing run is already in progress")]
    AlreadyRunning,
    #[error("no active accounts configured")]
    NoAccounts,
}

/// Drives one batch of pending listings through the session driver,
/// rotating accounts and recording progress in a shared advisory state.
/// At most one run is active at a time; a second `start_run` is rejected,
/// not queued.
pub struct Publisher {
    config: Arc<PublisherConfig>,
    source: Arc<dyn ListingSource>,
    sink: Arc<dyn LogSink>,
    state: Arc<Mutex<RunState>>,
    stop: Arc<AtomicBool>,
}

impl Publisher {
    pub fn new(
        config: Arc<PublisherConfig>,
        source: Arc<dyn ListingSource>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            state: Arc::new(Mutex::new(RunState::default())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cloned snapshot of the current run state. Readers may observe
    /// in-transition values; the state is advisory only.
    pub fn run_state(&self) -> RunState {
        self.state.lock().unwrap().clone()
    }

    /// Requests cooperative cancellation. Always succeeds; the flag is
    /// observed at listing boundaries, never mid-publish.
    pub fn stop_run(&self) {
        self.stop.store(true, Ordering::SeqCst);
        info!("stop requested for publishing run");
    }

    /// Starts the run as a background task and returns immediately. The
    /// handle resolves to the final summary; callers polling `run_state`
    /// may ignore it.
    pub fn start_run<D>(
        &self,
        driver: D,
        listings: Vec<Listing>,
        accounts: Vec<Account>,
    ) -> Result<JoinHandle<RunSummary>, StartError>
    where
        D: PublishDriver + 'static,
    {
        let accounts: Vec<Account> = accounts
            .into_iter()
            .filter(|account| account.status == AccountStatus::Active)
            .collect();

        let run_id = Uuid::new_v4();
        {
            let mut state = self.state.lock().unwrap();
            if state.running {
                return Err(StartError::AlreadyRunning);
            }
            if accounts.is_empty() {
                return Err(StartError::NoAccounts);
            }
            *state = RunState {
                running: true,
                run_id: Some(run_id),
                ..RunState::default()
            };
        }
        self.stop.store(false, Ordering::SeqCst);

        let ctx = RunContext {
            run_id,
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&self.stop),
        };
        Ok(tokio::spawn(execute_run(driver, listings, accounts, ctx)))
    }
}

struct RunContext {
    run_id: Uuid,
    config: Arc<PublisherConfig>,
    source: Arc<dyn ListingSource>,
    sink: Arc<dyn LogSink>,
    state: Arc<Mutex<RunState>>,
    stop: Arc<AtomicBool>,
}

impl RunContext {
    fn record_listing_error(&self, listing: &str, message: String) {
        error!(listing = %listing, error = %message, "listing failed");
        self.sink
            .record(LogLevel::Error, &format!("{listing}: {message}"));
        let mut state = self.state.lock().unwrap();
        state.errors.push(RunError {
            listing: listing.to_string(),
            message,
            at: Utc::now(),
        });
        state.last_update = Utc::now();
    }

    fn record_system_error(&self, message: String) {
        self.record_listing_error("system", message);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

async fn execute_run<D: PublishDriver>(
    mut driver: D,
    listings: Vec<Listing>,
    mut accounts: Vec<Account>,
    ctx: RunContext,
) -> RunSummary {
    // Session quotas are per run, never carried over.
    for account in &mut accounts {
        account.published_this_run = 0;
    }
    let pending: Vec<Listing> = listings
        .into_iter()
        .filter(|listing| !listing.published)
        .collect();
    {
        let mut state = ctx.state.lock().unwrap();
        state.total = pending.len() as u32;
        state.last_update = Utc::now();
    }
    info!(
        run_id = %ctx.run_id,
        pending = pending.len(),
        accounts = accounts.len(),
        "publishing run started"
    );
    ctx.sink.record(
        LogLevel::Info,
        &format!(
            "run {} started: {} pending listings across {} accounts",
            ctx.run_id,
            pending.len(),
            accounts.len()
        ),
    );

    if pending.is_empty() {
        ctx.sink
            .record(LogLevel::Info, "no pending listings to publish");
        driver.cleanup().await;
        return finish(&ctx);
    }

    if let Err(err) = driver.initialize().await {
        ctx.record_system_error(format!("session initialization failed: {err}"));
        driver.cleanup().await;
        return finish(&ctx);
    }

    let mut engine = VariationEngine::new();
    let max_per_account = ctx.config.rotation.max_per_account;
    let mut current = 0usize;
    let mut published_with_current: u32 = 0;
    let total = pending.len();

    for (idx, mut listing) in pending.into_iter().enumerate() {
        // Cancellation is only honored here; an in-flight publish is
        // never aborted partway.
        if ctx.stop_requested() {
            info!(run_id = %ctx.run_id, "stop observed, halting at listing boundary");
            break;
        }

        match rotation::next_account(
            accounts.len(),
            current,
            published_with_current,
            max_per_account,
        ) {
            Ok(decision) => {
                if decision.rotated {
                    current = decision.index;
                    published_with_current = 0;
                    info!(account = %accounts[current].name, "rotating to next account");
                    if let Err(err) = driver.switch_account(&accounts[current]).await {
                        ctx.record_system_error(format!("account switch failed: {err}"));
                        break;
                    }
                }
            }
            Err(err) => {
                ctx.record_system_error(err.to_string());
                break;
            }
        }

        {
            let mut state = ctx.state.lock().unwrap();
            state.active_account = Some(accounts[current].name.clone());
        }

        let variation = engine.generate(&listing);
        if variation.fallback {
            warn!(listing = %listing.name, "variation engine degraded to raw listing text");
            ctx.sink.record(
                LogLevel::Warn,
                &format!("variation fallback for {}", listing.name),
            );
        }

        match driver.publish(&listing, &accounts[current], &variation).await {
            PublishOutcome::Published(kind) => {
                match ctx.source.mark_published(listing.row).await {
                    Ok(()) => {
                        let now = Utc::now();
                        listing.mark_published(now);
                        accounts[current].published_this_run += 1;
                        accounts[current].last_used = Some(now);
                        published_with_current += 1;
                        {
                            let mut state = ctx.state.lock().unwrap();
                            state.published += 1;
                        }
                        let confirmed = kind == SuccessKind::Confirmed;
                        info!(
                            listing = %listing.name,
                            account = %accounts[current].name,
                            confirmed,
                            "listing published"
                        );
                        ctx.sink.record(
                            LogLevel::Info,
                            &format!(
                                "published {} via {} ({})",
                                listing.name,
                                accounts[current].name,
                                if confirmed { "confirmed" } else { "assumed" }
                            ),
                        );
                    }
                    Err(err) => {
                        // The source still shows the listing as pending, so
                        // a later run will retry it.
                        ctx.record_listing_error(
                            &listing.name,
                            format!("published but source update failed: {err}"),
                        );
                    }
                }
            }
            PublishOutcome::Failed(message) => {
                ctx.record_listing_error(&listing.name, message);
            }
        }

        {
            let mut state = ctx.state.lock().unwrap();
            state.processed += 1;
            state.last_update = Utc::now();
        }

        if idx + 1 < total && !ctx.stop_requested() {
            pause_between_listings(ctx.config.pacing.listing_delay_ms).await;
        }
    }

    driver.cleanup().await;
    finish(&ctx)
}

/// Randomized think-time between listings; also a suspension point that
/// lets cancellation land before the next listing starts.
async fn pause_between_listings(range: [u64; 2]) {
    let lower = range[0].min(range[1]);
    let upper = range[0].max(range[1]);
    let millis = if lower == upper {
        lower
    } else {
        rand::thread_rng().gen_range(lower..=upper)
    };
    if millis > 0 {
        sleep(Duration::from_millis(millis)).await;
    }
}

fn finish(ctx: &RunContext) -> RunSummary {
    let summary = {
        let mut state = ctx.state.lock().unwrap();
        state.running = false;
        state.active_account = None;
        state.last_update = Utc::now();
        RunSummary {
            run_id: ctx.run_id,
            processed: state.processed,
            published: state.published,
            errors: state.errors.len() as u32,
            cancelled: ctx.stop_requested(),
        }
    };
    info!(
        run_id = %ctx.run_id,
        processed = summary.processed,
        published = summary.published,
        errors = summary.errors,
        cancelled = summary.cancelled,
        "publishing run finished"
    );
    ctx.sink.record(
        LogLevel::Info,
        &format!(
            "run {} finished: {} published, {} errors",
            ctx.run_id, summary.published, summary.errors
        ),
    );
    summary
}
