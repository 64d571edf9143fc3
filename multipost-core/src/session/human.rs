use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page;
use rand::{thread_rng, Rng};
use tokio::time::sleep;

use crate::config::HumanSection;

use super::error::{SessionError, SessionResult};

/// Paces every interaction with the page so the session reads like a
/// person on a slow connection: per-character typing delays, pointer
/// movement with jitter before each click, pauses between fields.
#[derive(Debug, Clone)]
pub struct HumanInput {
    config: HumanSection,
}

impl HumanInput {
    pub fn new(config: HumanSection) -> Self {
        Self { config }
    }

    pub async fn type_text(&self, element: &Element, text: &str) -> SessionResult<()> {
        element.click().await.map_err(|err| {
            SessionError::Unexpected(format!("failed to focus element before typing: {err}"))
        })?;
        for ch in text.chars() {
            element
                .type_str(ch.to_string())
                .await
                .map_err(|err| SessionError::Unexpected(format!("failed to type: {err}")))?;
            sleep(span(self.config.typing_delay_ms)).await;
        }
        Ok(())
    }

    pub async fn click(&self, page: &Page, element: &Element) -> SessionResult<()> {
        if let Ok(bbox) = element.bounding_box().await {
            let jitter = self.config.click_jitter_px;
            let target = {
                let mut rng = thread_rng();
                Point::new(
                    bbox.x + bbox.width / 2.0 + rng.gen_range(-jitter..=jitter),
                    bbox.y + bbox.height / 2.0 + rng.gen_range(-jitter..=jitter),
                )
            };
            page.move_mouse(target)
                .await
                .map_err(|err| SessionError::Unexpected(format!("failed to move mouse: {err}")))?;
            sleep(span([100, 300])).await;
        }
        element
            .click()
            .await
            .map_err(|err| SessionError::Unexpected(format!("failed to click element: {err}")))?;
        sleep(span(self.config.click_pause_ms)).await;
        Ok(())
    }

    pub async fn scroll(&self, page: &Page) -> SessionResult<()> {
        let distance = {
            let mut rng = thread_rng();
            rng.gen_range(200.0..700.0)
        };
        let script = format!("window.scrollBy({{ top: {distance}, behavior: 'smooth' }});");
        page.evaluate(script.as_str())
            .await
            .map_err(|err| SessionError::Unexpected(format!("failed to scroll: {err}")))?;
        sleep(span(self.config.scroll_pause_ms)).await;
        Ok(())
    }

    /// Long pause after navigations, like a reader taking the page in.
    pub async fn settle(&self) {
        sleep(span(self.config.wait_ms)).await;
    }

    pub async fn field_pause(&self) {
        sleep(span(self.config.field_pause_ms)).await;
    }

    pub async fn pause_ms(&self, range: [u64; 2]) {
        sleep(span(range)).await;
    }
}

fn span(range: [u64; 2]) -> Duration {
    let lower = range[0].min(range[1]);
    let upper = range[0].max(range[1]);
    let millis = if lower == upper {
        lower
    } else {
        thread_rng().gen_range(lower..=upper)
    };
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_stays_inside_bounds() {
        for _ in 0..50 {
            let duration = span([50, 150]);
            assert!(duration >= Duration::from_millis(50));
            assert!(duration <= Duration::from_millis(150));
        }
        assert_eq!(span([0, 0]), Duration::ZERO);
        // Reversed bounds are tolerated.
        let duration = span([150, 50]);
        assert!(duration >= Duration::from_millis(50));
        assert!(duration <= Duration::from_millis(150));
    }
}
