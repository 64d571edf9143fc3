use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub site: SiteSection,
    pub browser: BrowserSection,
    pub human: HumanSection,
    pub selectors: SelectorSection,
    pub rotation: RotationSection,
    pub pacing: PacingSection,
    pub credentials: CredentialsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub base_url: String,
    pub publish_path: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.revolico.com".to_string(),
            publish_path: "/publish".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub connect_timeout_seconds: u64,
    pub navigation_timeout_seconds: u64,
    /// URL patterns blocked to conserve bandwidth on unreliable links.
    pub blocked_resources: Vec<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            viewport_width: 1366,
            viewport_height: 768,
            connect_timeout_seconds: 30,
            navigation_timeout_seconds: 60,
            blocked_resources: [
                "*.woff", "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3", "*.wav",
                "*.avi", "*.m4a",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HumanSection {
    pub typing_delay_ms: [u64; 2],
    pub field_pause_ms: [u64; 2],
    pub wait_ms: [u64; 2],
    pub click_pause_ms: [u64; 2],
    pub scroll_pause_ms: [u64; 2],
    pub click_jitter_px: f64,
}

impl Default for HumanSection {
    fn default() -> Self {
        Self {
            typing_delay_ms: [50, 150],
            field_pause_ms: [300, 1000],
            wait_ms: [2000, 5000],
            click_pause_ms: [200, 500],
            scroll_pause_ms: [500, 1500],
            click_jitter_px: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub publish_buttons: Vec<String>,
    pub title_fields: Vec<String>,
    pub description_fields: Vec<String>,
    pub category_selects: Vec<String>,
    pub location_selects: Vec<String>,
    pub price_fields: Vec<String>,
    pub contact_fields: Vec<String>,
    pub submit_buttons: Vec<String>,
    pub success_indicators: Vec<String>,
    pub login_buttons: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            publish_buttons: strings(&[".publish-btn", "a[href*=\"publish\"]", ".post-ad-btn"]),
            title_fields: strings(&["input[name=\"title\"]", "#title", ".title-input"]),
            description_fields: strings(&[
                "textarea[name=\"description\"]",
                "#description",
                ".description-textarea",
            ]),
            category_selects: strings(&[
                "select[name=\"category\"]",
                "#category",
                ".category-select",
            ]),
            location_selects: strings(&[
                "select[name=\"location\"]",
                "#location",
                ".location-select",
            ]),
            price_fields: strings(&["input[name=\"price\"]", "#price", ".price-input"]),
            contact_fields: strings(&["input[name=\"phone\"]", "#phone", ".phone-input"]),
            submit_buttons: strings(&["button[type=\"submit\"]", ".publish-submit", "#submit-ad"]),
            success_indicators: strings(&[".success-message", ".alert-success", ".confirmation"]),
            login_buttons: strings(&[".login-btn", "a[href*=\"login\"]", "#login-link"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotationSection {
    pub max_per_account: u32,
}

impl Default for RotationSection {
    fn default() -> Self {
        Self { max_per_account: 20 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub listing_delay_ms: [u64; 2],
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            listing_delay_ms: [5000, 10000],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub cookies_dir: String,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            cookies_dir: "./cookies".to_string(),
        }
    }
}

pub fn load_publisher_config<P: AsRef<Path>>(path: P) -> Result<PublisherConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/publisher.toml");
        let config = load_publisher_config(path).expect("fixture config should parse");
        assert_eq!(config.rotation.max_per_account, 20);
        assert_eq!(config.human.typing_delay_ms, [50, 150]);
        assert!(config.selectors.title_fields.len() >= 2);
        assert!(config.browser.navigation_timeout_seconds >= 60);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: PublisherConfig =
            toml::from_str("[rotation]\nmax_per_account = 5\n").expect("partial config");
        assert_eq!(config.rotation.max_per_account, 5);
        assert_eq!(config.pacing.listing_delay_ms, [5000, 10000]);
        assert!(!config.site.base_url.is_empty());
    }
}
