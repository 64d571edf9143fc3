use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use multipost_core::model::{Account, Listing};
use multipost_core::orchestrator::{AccountStore, ListingSource, SourceError};

use crate::Result;

/// Listing batch backed by a JSON file. The file is the source of truth:
/// `mark_published` flips the flag in memory and rewrites the file so a
/// crash never republishes a listing that already went out.
pub struct JsonListingSource {
    path: PathBuf,
    listings: Mutex<Vec<Listing>>,
}

impl JsonListingSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut listings: Vec<Listing> = serde_json::from_str(&content)?;
        for listing in &mut listings {
            if listing.whatsapp_link.is_none() {
                listing.derive_whatsapp_link();
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            listings: Mutex::new(listings),
        })
    }

    pub fn all(&self) -> Vec<Listing> {
        self.listings.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for JsonListingSource {
    async fn pending_listings(&self) -> std::result::Result<Vec<Listing>, SourceError> {
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|listing| !listing.published)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, row: u32) -> std::result::Result<(), SourceError> {
        let snapshot = {
            let mut listings = self.listings.lock().unwrap();
            match listings.iter_mut().find(|listing| listing.row == row) {
                Some(entry) if !entry.published => entry.mark_published(Utc::now()),
                _ => return Ok(()),
            }
            listings.clone()
        };
        let encoded = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| SourceError(err.to_string()))?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| SourceError(format!("failed to rewrite {}: {err}", self.path.display())))
    }
}

/// Account set backed by a JSON file.
pub struct JsonAccountStore {
    accounts: Vec<Account>,
}

impl JsonAccountStore {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let accounts: Vec<Account> = serde_json::from_str(&content)?;
        Ok(Self { accounts })
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn list_accounts(&self) -> std::result::Result<Vec<Account>, SourceError> {
        Ok(self.accounts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_listings(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("listings.json");
        let content = r#"[
            {"row": 2, "name": "Bicicleta", "description": "Bicicleta de montaña",
             "price": {"amount": 120.0, "currency": "USD"}, "contact": "+53 5555 1234"},
            {"row": 3, "name": "Nevera", "description": "Nevera pequeña", "published": true,
             "published_at": "2026-01-10T12:00:00Z"}
        ]"#;
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_listings_and_derives_contact_links() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonListingSource::load(&write_listings(&dir)).unwrap();
        let pending = source.pending_listings().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].whatsapp_link.as_deref(),
            Some("https://wa.me/5355551234")
        );
    }

    #[tokio::test]
    async fn mark_published_is_idempotent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_listings(&dir);
        let source = JsonListingSource::load(&path).unwrap();

        source.mark_published(2).await.unwrap();
        source.mark_published(2).await.unwrap();
        source.mark_published(99).await.unwrap();

        let reloaded = JsonListingSource::load(&path).unwrap();
        assert!(reloaded.pending_listings().await.unwrap().is_empty());
        let all = reloaded.all();
        assert!(all.iter().all(|listing| listing.published));
        assert!(all.iter().all(|listing| listing.published_at.is_some()));
    }

    #[tokio::test]
    async fn loads_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "primary", "credentials_file": "primary.json"},
                {"name": "backup", "credentials_file": "backup.txt", "status": "disabled"}
            ]"#,
        )
        .unwrap();
        let store = JsonAccountStore::load(&path).unwrap();
        let accounts = store.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].name, "primary");
        assert_eq!(
            accounts[1].status,
            multipost_core::model::AccountStatus::Disabled
        );
    }
}
