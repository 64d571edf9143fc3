use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use tracing::trace;

use super::error::{SessionError, SessionResult};

/// Probes an ordered list of candidate selectors and returns the first
/// matching handle. Markup on the target site drifts; callers decide
/// whether a miss is fatal.
pub async fn find_first(page: &Page, selectors: &[String]) -> Option<Element> {
    for selector in selectors {
        if let Ok(element) = page.find_element(selector.as_str()).await {
            trace!(selector = %selector, "selector matched");
            return Some(element);
        }
    }
    None
}

pub async fn require_first(
    page: &Page,
    selectors: &[String],
    what: &str,
) -> SessionResult<Element> {
    find_first(page, selectors)
        .await
        .ok_or_else(|| SessionError::NotFound(what.to_string()))
}

/// Clears an input before human-paced typing replaces its content.
pub async fn clear_value(element: &Element) -> SessionResult<()> {
    element
        .call_js_fn("function() { if ('value' in this) { this.value = ''; } }", false)
        .await?;
    Ok(())
}

/// Picks an option on a `<select>`: exact value match first, then the
/// first option whose text contains the wanted value, case-insensitive.
/// Returns false when nothing matched.
pub async fn select_option(element: &Element, wanted: &str) -> SessionResult<bool> {
    let literal = serde_json::to_string(wanted)
        .map_err(|err| SessionError::Unexpected(format!("failed to encode option value: {err}")))?;
    let function = format!(
        r#"function() {{
    const wanted = {literal};
    const lowered = wanted.toLowerCase();
    const options = Array.from(this.options || []);
    let match = options.find(option => option.value === wanted);
    if (!match) {{
        match = options.find(option => (option.textContent || '').toLowerCase().includes(lowered));
    }}
    if (!match) {{
        return false;
    }}
    this.value = match.value;
    this.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}}"#
    );
    let returns = element.call_js_fn(function, false).await?;
    Ok(returns
        .result
        .value
        .and_then(|value| value.as_bool())
        .unwrap_or(false))
}
