use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One classified-ad item sourced externally (spreadsheet row, upload, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Stable reference into the external source.
    pub row: u32,
    pub name: String,
    #[serde(default)]
    pub price: Price,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub whatsapp_link: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// `published` and `published_at` always move together.
    pub fn mark_published(&mut self, at: DateTime<Utc>) {
        self.published = true;
        self.published_at = Some(at);
    }

    pub fn derive_whatsapp_link(&mut self) {
        self.whatsapp_link = whatsapp_link(&self.contact);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: String,
}

/// Builds a `https://wa.me/<number>` link from a free-form contact value.
/// Everything but digits is stripped; a leading `+` is tolerated.
pub fn whatsapp_link(contact: &str) -> Option<String> {
    let mut cleaned = String::new();
    for (idx, ch) in contact.trim().chars().enumerate() {
        if ch.is_ascii_digit() || (ch == '+' && idx == 0) {
            cleaned.push(ch);
        }
    }
    let digits = cleaned.trim_start_matches('+');
    if digits.is_empty() {
        None
    } else {
        Some(format!("https://wa.me/{digits}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A publishing identity. `name` is unique across the active account set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    /// File name of the stored cookie bundle, relative to the cookies dir.
    pub credentials_file: String,
    #[serde(default)]
    pub published_this_run: u32,
    #[serde(default = "default_account_status")]
    pub status: AccountStatus,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

fn default_account_status() -> AccountStatus {
    AccountStatus::Active
}

impl Account {
    pub fn new(name: impl Into<String>, credentials_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credentials_file: credentials_file.into(),
            published_this_run: 0,
            status: AccountStatus::Active,
            last_used: None,
        }
    }
}

/// Randomized rewrite of a listing's title/description. Never persisted.
#[derive(Debug, Clone)]
pub struct Variation {
    pub title: String,
    pub description: String,
    /// Set when the engine degraded to the listing's raw text; the caller
    /// is expected to log this at warn level.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessKind {
    /// A navigation or success indicator confirmed the publication.
    Confirmed,
    /// Neither confirmation nor failure appeared before timeout.
    Assumed,
}

/// Result of a single publish attempt. Session internals never escape as
/// errors; they are folded into `Failed` with a readable message.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Published(SuccessKind),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub listing: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Advisory status of the current orchestration, mutated only by the run
/// loop and read by status queries as cloned snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub running: bool,
    pub run_id: Option<Uuid>,
    pub processed: u32,
    pub total: u32,
    pub published: u32,
    pub errors: Vec<RunError>,
    pub last_update: DateTime<Utc>,
    pub active_account: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            running: false,
            run_id: None,
            processed: 0,
            total: 0,
            published: 0,
            errors: Vec::new(),
            last_update: Utc::now(),
            active_account: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub processed: u32,
    pub published: u32,
    pub errors: u32,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatsapp_link_strips_formatting() {
        assert_eq!(
            whatsapp_link("+53 5555-1234"),
            Some("https://wa.me/5355551234".to_string())
        );
        assert_eq!(
            whatsapp_link("(537) 555 66 77"),
            Some("https://wa.me/5375556677".to_string())
        );
        assert_eq!(whatsapp_link("sin telefono"), None);
        assert_eq!(whatsapp_link(""), None);
    }

    #[test]
    fn mark_published_sets_timestamp() {
        let mut listing = Listing {
            row: 2,
            name: "Bicicleta".into(),
            price: Price::default(),
            description: "Bicicleta de montaña".into(),
            image_url: None,
            category: String::new(),
            location: String::new(),
            contact: String::new(),
            whatsapp_link: None,
            published: false,
            published_at: None,
        };
        listing.mark_published(Utc::now());
        assert!(listing.published);
        assert!(listing.published_at.is_some());
    }
}
