use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use multipost_core::orchestrator::AccountStore;
use multipost_core::session::load_bundle;
use multipost_core::{PublisherConfig, SessionDriver};

use crate::sources::JsonAccountStore;
use crate::{AccountsArgs, AccountsCommand, OutputFormat, Result};

#[derive(Debug, Serialize)]
struct AccountReport {
    name: String,
    status: String,
    bundle: String,
}

pub async fn execute(
    config: PublisherConfig,
    args: AccountsArgs,
    format: OutputFormat,
) -> Result<()> {
    match args.command {
        AccountsCommand::List { accounts } => list(&config, &accounts, format).await,
        AccountsCommand::Verify { accounts } => verify(config, &accounts).await,
    }
}

/// Offline check: every account's cookie bundle must exist and parse.
async fn list(config: &PublisherConfig, accounts_path: &Path, format: OutputFormat) -> Result<()> {
    let store = JsonAccountStore::load(accounts_path)?;
    let cookies_dir = Path::new(&config.credentials.cookies_dir);

    let mut reports = Vec::new();
    for account in store.list_accounts().await? {
        let bundle = match load_bundle(&cookies_dir.join(&account.credentials_file)).await {
            Ok(cookies) => format!("{} cookies", cookies.len()),
            Err(err) => format!("unusable: {err}"),
        };
        reports.push(AccountReport {
            name: account.name,
            status: account.status.to_string(),
            bundle,
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in reports {
                println!("{:<20} {:<10} {}", report.name, report.status, report.bundle);
            }
        }
    }
    Ok(())
}

/// Online check: load each account in a real browser session and probe
/// whether the site still accepts its cookies.
async fn verify(config: PublisherConfig, accounts_path: &Path) -> Result<()> {
    let store = JsonAccountStore::load(accounts_path)?;
    let accounts = store.list_accounts().await?;

    let mut driver = SessionDriver::new(Arc::new(config));
    if let Err(err) = driver.initialize().await {
        driver.cleanup().await;
        return Err(err.into());
    }

    for account in &accounts {
        match driver.switch_account(account).await {
            Ok(()) => {
                let alive = driver.session_alive().await;
                println!(
                    "{:<20} {}",
                    account.name,
                    if alive { "session ok" } else { "session expired" }
                );
            }
            Err(err) => {
                warn!(account = %account.name, error = %err, "account verification failed");
                println!("{:<20} error: {err}", account.name);
            }
        }
    }

    driver.cleanup().await;
    Ok(())
}
