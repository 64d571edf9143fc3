use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use multipost_core::orchestrator::{AccountStore, ListingSource, TracingSink};
use multipost_core::{Publisher, PublisherConfig, SessionDriver};

use crate::sources::{JsonAccountStore, JsonListingSource};
use crate::{AppError, OutputFormat, Result, RunArgs};

pub async fn execute(config: PublisherConfig, args: RunArgs, format: OutputFormat) -> Result<()> {
    let config = Arc::new(config);
    let source = Arc::new(JsonListingSource::load(&args.listings)?);
    let store = JsonAccountStore::load(&args.accounts)?;
    let accounts = store.list_accounts().await?;
    let listings = source.pending_listings().await?;

    let publisher = Arc::new(Publisher::new(
        Arc::clone(&config),
        Arc::clone(&source) as _,
        Arc::new(TracingSink),
    ));
    let driver = SessionDriver::new(config);
    let handle = publisher.start_run(driver, listings, accounts)?;

    let stopper = Arc::clone(&publisher);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop_run();
        }
    });

    let progress = Arc::clone(&publisher);
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let state = progress.run_state();
            if !state.running {
                break;
            }
            info!(
                processed = state.processed,
                total = state.total,
                published = state.published,
                errors = state.errors.len(),
                account = state.active_account.as_deref().unwrap_or("-"),
                "run progress"
            );
        }
    });

    let summary = handle.await.map_err(|err| AppError::Join(err.to_string()))?;
    ticker.abort();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!(
                "run {}: processed {}, published {}, errors {}{}",
                summary.run_id,
                summary.processed,
                summary.published,
                summary.errors,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            let state = publisher.run_state();
            for error in &state.errors {
                println!("  {}: {}", error.listing, error.message);
            }
        }
    }
    Ok(())
}
