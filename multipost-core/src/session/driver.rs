use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, EnableParams as NetworkEnableParams,
    SetBlockedUrLsParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::model::{Account, Listing, PublishOutcome, SuccessKind, Variation};

use super::credentials;
use super::error::{SessionError, SessionResult};
use super::form;
use super::human::HumanInput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Ready,
    AccountActive(String),
    Closed,
}

/// Owns exactly one live Chromium session at a time and drives the posting
/// form through it. `Uninitialized -> Ready -> (AccountActive)* -> Closed`;
/// `cleanup` is valid from any state and always lands in `Closed`.
pub struct SessionDriver {
    config: Arc<PublisherConfig>,
    human: HumanInput,
    state: DriverState,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
}

impl SessionDriver {
    pub fn new(config: Arc<PublisherConfig>) -> Self {
        let human = HumanInput::new(config.human.clone());
        Self {
            config,
            human,
            state: DriverState::Uninitialized,
            browser: None,
            page: None,
            handler_task: None,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn active_account(&self) -> Option<&str> {
        match &self.state {
            DriverState::AccountActive(name) => Some(name),
            _ => None,
        }
    }

    pub async fn initialize(&mut self) -> SessionResult<()> {
        if self.state != DriverState::Uninitialized {
            return Err(SessionError::InvalidState(format!(
                "initialize called in state {:?}",
                self.state
            )));
        }

        let chromium_config = self.build_chromium_config()?;
        info!(
            headless = self.config.browser.headless,
            width = self.config.browser.viewport_width,
            height = self.config.browser.viewport_height,
            "launching Chromium instance"
        );
        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| SessionError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });
        self.browser = Some(browser);
        self.handler_task = Some(handler_task);

        let params = CreateTargetParams::new("about:blank");
        let page = self
            .browser
            .as_ref()
            .map(|browser| browser.new_page(params))
            .ok_or_else(|| SessionError::Launch("browser handle lost after launch".into()))?
            .await?;
        self.configure_page(&page).await?;
        self.page = Some(page);
        self.state = DriverState::Ready;
        Ok(())
    }

    fn build_chromium_config(&self) -> SessionResult<ChromiumConfig> {
        let browser = &self.config.browser;
        let mut builder = ChromiumConfig::builder()
            .viewport(ChromiumViewport {
                width: browser.viewport_width,
                height: browser.viewport_height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: browser.viewport_width >= browser.viewport_height,
                has_touch: false,
            })
            .request_timeout(Duration::from_secs(browser.connect_timeout_seconds));

        if let Some(path) = &browser.executable_path {
            builder = builder.chrome_executable(path);
        }
        if !browser.headless {
            builder = builder.with_head();
        }
        if !browser.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            format!("--user-agent={}", browser.user_agent),
            format!(
                "--window-size={},{}",
                browser.viewport_width, browser.viewport_height
            ),
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--mute-audio".to_string(),
            "--password-store=basic".to_string(),
        ];
        if browser.disable_gpu {
            args.push("--disable-gpu".to_string());
        }
        builder = builder.args(args);

        builder.build().map_err(SessionError::Configuration)
    }

    async fn configure_page(&self, page: &Page) -> SessionResult<()> {
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(self.config.browser.user_agent.clone())
            .build()
            .map_err(SessionError::Configuration)?;
        page.set_user_agent(params).await?;

        page.execute(NetworkEnableParams::default()).await?;
        if !self.config.browser.blocked_resources.is_empty() {
            page.execute(SetBlockedUrLsParams::new(
                self.config.browser.blocked_resources.clone(),
            ))
            .await?;
        }
        Ok(())
    }

    /// Clears the current cookie jar, loads the account's stored bundle
    /// and verifies the site root loads with it.
    pub async fn switch_account(&mut self, account: &Account) -> SessionResult<()> {
        match self.state {
            DriverState::Ready | DriverState::AccountActive(_) => {}
            _ => {
                return Err(SessionError::InvalidState(format!(
                    "switch_account called in state {:?}",
                    self.state
                )))
            }
        }
        info!(account = %account.name, "switching session account");

        let bundle_path =
            Path::new(&self.config.credentials.cookies_dir).join(&account.credentials_file);
        let records = credentials::load_bundle(&bundle_path).await?;

        let page = self.page()?;
        page.execute(ClearBrowserCookiesParams::default()).await?;

        let mut cookies = Vec::with_capacity(records.len());
        for record in records {
            let mut builder = CookieParam::builder()
                .name(record.name)
                .value(record.value)
                .secure(record.secure)
                .http_only(record.http_only);
            builder = match record.domain {
                Some(domain) => builder.domain(domain),
                None => builder.url(self.config.site.base_url.clone()),
            };
            if let Some(path) = record.path {
                builder = builder.path(path);
            }
            if let Some(expires) = record.expires {
                if expires > 0.0 {
                    builder = builder.expires(TimeSinceEpoch::new(expires));
                }
            }
            cookies.push(builder.build().map_err(SessionError::Configuration)?);
        }
        page.set_cookies(cookies).await?;

        let base_url = self.config.site.base_url.clone();
        self.goto(&base_url).await?;
        self.human.settle().await;

        self.state = DriverState::AccountActive(account.name.clone());
        info!(account = %account.name, "session account active");
        Ok(())
    }

    /// Fills and submits the posting form for one listing. Never returns an
    /// error: everything internal is folded into `PublishOutcome::Failed`.
    pub async fn publish(
        &mut self,
        listing: &Listing,
        account: &Account,
        variation: &Variation,
    ) -> PublishOutcome {
        match self.try_publish(listing, account, variation).await {
            Ok(kind) => PublishOutcome::Published(kind),
            Err(err) => {
                warn!(listing = %listing.name, error = %err, "publish attempt failed");
                PublishOutcome::Failed(err.to_string())
            }
        }
    }

    async fn try_publish(
        &mut self,
        listing: &Listing,
        account: &Account,
        variation: &Variation,
    ) -> SessionResult<SuccessKind> {
        if self.active_account() != Some(account.name.as_str()) {
            self.switch_account(account).await?;
        }
        info!(listing = %listing.name, account = %account.name, "starting publication");

        self.open_publish_form().await?;
        self.fill_form(listing, variation).await?;
        self.submit_and_confirm().await
    }

    /// Tries the known entry-point controls first; navigates straight to
    /// the posting URL when none is present on the current page.
    async fn open_publish_form(&self) -> SessionResult<()> {
        let page = self.page()?;
        if let Some(button) = form::find_first(page, &self.config.selectors.publish_buttons).await {
            self.human.click(page, &button).await?;
            self.wait_for_navigation_within(self.navigation_timeout())
                .await?;
        } else {
            let target = url::Url::parse(&self.config.site.base_url)
                .and_then(|base| base.join(&self.config.site.publish_path))
                .map_err(|err| SessionError::Configuration(err.to_string()))?;
            self.goto(target.as_str()).await?;
        }
        self.human.settle().await;
        debug!("posting form reached");
        Ok(())
    }

    async fn fill_form(&self, listing: &Listing, variation: &Variation) -> SessionResult<()> {
        let page = self.page()?;
        let selectors = &self.config.selectors;

        let title = form::require_first(page, &selectors.title_fields, "title field").await?;
        form::clear_value(&title).await?;
        self.human.type_text(&title, &variation.title).await?;
        self.human.field_pause().await;

        let description =
            form::require_first(page, &selectors.description_fields, "description field").await?;
        form::clear_value(&description).await?;
        self.human
            .type_text(&description, &variation.description)
            .await?;
        self.human.field_pause().await;

        if !listing.category.trim().is_empty() {
            if let Some(select) = form::find_first(page, &selectors.category_selects).await {
                if !form::select_option(&select, &listing.category).await? {
                    debug!(category = %listing.category, "no category option matched");
                }
                self.human.field_pause().await;
            }
        }

        if !listing.location.trim().is_empty() {
            if let Some(select) = form::find_first(page, &selectors.location_selects).await {
                if !form::select_option(&select, &listing.location).await? {
                    debug!(location = %listing.location, "no location option matched");
                }
                self.human.field_pause().await;
            }
        }

        if let Some(amount) = listing.price.amount {
            if let Some(field) = form::find_first(page, &selectors.price_fields).await {
                let text = if amount.fract() == 0.0 {
                    format!("{amount:.0}")
                } else {
                    amount.to_string()
                };
                form::clear_value(&field).await?;
                self.human.type_text(&field, &text).await?;
                self.human.field_pause().await;
            }
        }

        if !listing.contact.trim().is_empty() {
            if let Some(field) = form::find_first(page, &selectors.contact_fields).await {
                form::clear_value(&field).await?;
                self.human.type_text(&field, &listing.contact).await?;
                self.human.field_pause().await;
            }
        }

        if let Some(image) = &listing.image_url {
            // Attachment upload is not part of this flow yet.
            debug!(image = %image, "image attachment skipped");
        }

        debug!(listing = %listing.name, "posting form filled");
        Ok(())
    }

    async fn submit_and_confirm(&self) -> SessionResult<SuccessKind> {
        let page = self.page()?;
        self.human.scroll(page).await?;

        let submit =
            form::require_first(page, &self.config.selectors.submit_buttons, "submit button")
                .await?;
        self.human.click(page, &submit).await?;

        let navigated = match timeout(
            Duration::from_secs(self.config.browser.connect_timeout_seconds),
            page.wait_for_navigation(),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(error = %err, "no navigation event after submit");
                false
            }
            Err(_) => false,
        };
        self.human.pause_ms([2000, 4000]).await;

        if navigated {
            return Ok(SuccessKind::Confirmed);
        }
        if form::find_first(page, &self.config.selectors.success_indicators)
            .await
            .is_some()
        {
            return Ok(SuccessKind::Confirmed);
        }
        // The site does not reliably render a confirmation screen.
        info!("no confirmation observed before timeout, assuming success");
        Ok(SuccessKind::Assumed)
    }

    /// True when the current cookie session still looks authenticated
    /// (no login control on the page).
    pub async fn session_alive(&self) -> bool {
        match self.page() {
            Ok(page) => form::find_first(page, &self.config.selectors.login_buttons)
                .await
                .is_none(),
            Err(_) => false,
        }
    }

    /// Releases the browser and every associated task. Idempotent, valid
    /// from any state.
    pub async fn cleanup(&mut self) {
        self.page = None;
        if let Some(mut browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                warn!(error = %err, "failed to close browser gracefully");
            }
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        if self.state != DriverState::Closed {
            debug!("browser session released");
        }
        self.state = DriverState::Closed;
    }

    async fn goto(&self, target: &str) -> SessionResult<()> {
        let page = self.page()?;
        let params = NavigateParams::builder()
            .url(target)
            .build()
            .map_err(SessionError::Configuration)?;
        page.goto(params).await?;
        self.wait_for_navigation_within(self.navigation_timeout())
            .await
    }

    async fn wait_for_navigation_within(&self, limit: Duration) -> SessionResult<()> {
        let page = self.page()?;
        match timeout(limit, page.wait_for_navigation()).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(SessionError::Timeout("navigation".to_string())),
        }
    }

    fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.browser.navigation_timeout_seconds)
    }

    fn page(&self) -> SessionResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::InvalidState("browser session not initialized".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_starts_uninitialized() {
        let driver = SessionDriver::new(Arc::new(PublisherConfig::default()));
        assert_eq!(*driver.state(), DriverState::Uninitialized);
        assert_eq!(driver.active_account(), None);
    }

    #[tokio::test]
    async fn cleanup_is_safe_before_initialize() {
        let mut driver = SessionDriver::new(Arc::new(PublisherConfig::default()));
        driver.cleanup().await;
        driver.cleanup().await;
        assert_eq!(*driver.state(), DriverState::Closed);
    }

    #[tokio::test]
    async fn switch_account_rejected_before_initialize() {
        let mut driver = SessionDriver::new(Arc::new(PublisherConfig::default()));
        let account = Account::new("primary", "primary.json");
        let err = driver.switch_account(&account).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }
}
