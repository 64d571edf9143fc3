pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod rotation;
pub mod session;
pub mod variation;

pub use config::{load_publisher_config, PublisherConfig};
pub use error::{ConfigError, Result};
pub use model::{
    whatsapp_link, Account, AccountStatus, Listing, Price, PublishOutcome, RunError, RunState,
    RunSummary, SuccessKind, Variation,
};
pub use orchestrator::{
    AccountStore, ListingSource, LogLevel, LogSink, PublishDriver, Publisher, SourceError,
    StartError, TracingSink,
};
pub use rotation::{next_account, Rotation, RotationError};
pub use session::{DriverState, SessionDriver, SessionError, SessionResult};
pub use variation::VariationEngine;
