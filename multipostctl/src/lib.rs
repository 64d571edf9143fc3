use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use multipost_core::{load_publisher_config, PublisherConfig};

pub mod commands;
pub mod sources;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] multipost_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("source error: {0}")]
    Source(#[from] multipost_core::SourceError),
    #[error("session error: {0}")]
    Session(#[from] multipost_core::SessionError),
    #[error("{0}")]
    Start(#[from] multipost_core::StartError),
    #[error("run task failed: {0}")]
    Join(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "multipost command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to publisher.toml
    #[arg(long, default_value = "configs/publisher.toml")]
    pub config: PathBuf,
    /// Output format for structured results
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish every pending listing through the configured accounts
    Run(RunArgs),
    /// Preview text variations without launching a browser
    Preview(PreviewArgs),
    /// Inspect or verify configured accounts
    Accounts(AccountsArgs),
    /// Validate the configuration file and print the resolved values
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file with the listings batch
    #[arg(long)]
    pub listings: PathBuf,
    /// JSON file with the account set
    #[arg(long)]
    pub accounts: PathBuf,
    /// Run the browser with a visible window
    #[arg(long)]
    pub headed: bool,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// JSON file with the listings batch
    #[arg(long)]
    pub listings: PathBuf,
    /// Variations to generate per listing
    #[arg(long, default_value_t = 3)]
    pub count: usize,
    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
    /// Restrict the preview to one source row
    #[arg(long)]
    pub row: Option<u32>,
}

#[derive(Debug, Args)]
pub struct AccountsArgs {
    #[command(subcommand)]
    pub command: AccountsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// List accounts and the state of their cookie bundles
    List {
        /// JSON file with the account set
        #[arg(long)]
        accounts: PathBuf,
    },
    /// Load each account in a real browser session and probe it
    Verify {
        /// JSON file with the account set
        #[arg(long)]
        accounts: PathBuf,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let mut config = load_config(&cli.config)?;
            if args.headed {
                config.browser.headless = false;
            }
            commands::run::execute(config, args, cli.format).await
        }
        Commands::Preview(args) => commands::preview::execute(args).await,
        Commands::Accounts(args) => {
            let config = load_config(&cli.config)?;
            commands::accounts::execute(config, args, cli.format).await
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            print_config(&config, cli.format)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "multipostctl", &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(path: &PathBuf) -> Result<PublisherConfig> {
    Ok(load_publisher_config(path)?)
}

fn print_config(config: &PublisherConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "site": config.site.base_url,
                    "headless": config.browser.headless,
                    "max_per_account": config.rotation.max_per_account,
                    "listing_delay_ms": config.pacing.listing_delay_ms,
                    "cookies_dir": config.credentials.cookies_dir,
                })
            );
        }
        OutputFormat::Text => {
            println!("site            {}", config.site.base_url);
            println!("headless        {}", config.browser.headless);
            println!("max per account {}", config.rotation.max_per_account);
            println!(
                "listing delay   {}-{} ms",
                config.pacing.listing_delay_ms[0], config.pacing.listing_delay_ms[1]
            );
            println!("cookies dir     {}", config.credentials.cookies_dir);
        }
    }
    Ok(())
}
