use std::path::Path;

use serde::Deserialize;

use super::error::{SessionError, SessionResult};

/// One stored cookie, independent of the on-disk bundle format.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub expires: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct JsonCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, alias = "httpOnly")]
    http_only: bool,
    #[serde(default)]
    secure: bool,
    #[serde(default, alias = "expirationDate")]
    expires: Option<f64>,
}

/// Reads a stored credential bundle. Two formats are accepted and
/// auto-detected: a JSON cookie array (devtools / extension exports) and
/// the raw tab-separated browser export. An unreadable or empty bundle is
/// a hard error; a session cannot be activated without cookies.
pub async fn load_bundle(path: &Path) -> SessionResult<Vec<CookieRecord>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|err| {
        SessionError::Credentials(format!("cookie bundle {} unreadable: {err}", path.display()))
    })?;
    let cookies = parse_bundle(&content);
    if cookies.is_empty() {
        return Err(SessionError::Credentials(format!(
            "cookie bundle {} contains no cookies",
            path.display()
        )));
    }
    Ok(cookies)
}

pub fn parse_bundle(content: &str) -> Vec<CookieRecord> {
    match serde_json::from_str::<Vec<JsonCookie>>(content) {
        Ok(cookies) => cookies
            .into_iter()
            .map(|cookie| CookieRecord {
                name: cookie.name,
                value: cookie.value,
                domain: cookie.domain,
                path: cookie.path,
                secure: cookie.secure,
                http_only: cookie.http_only,
                expires: cookie.expires,
            })
            .collect(),
        Err(_) => parse_tab_separated(content),
    }
}

/// Browser-exported format: one cookie per line,
/// `domain \t flag \t path \t secure \t expiry \t name \t value`.
fn parse_tab_separated(content: &str) -> Vec<CookieRecord> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 7 {
                return None;
            }
            Some(CookieRecord {
                name: parts[5].to_string(),
                value: parts[6].to_string(),
                domain: Some(parts[0].to_string()),
                path: Some(parts[2].to_string()),
                secure: parts[3] == "TRUE",
                http_only: parts[1] == "TRUE",
                expires: parts[4].parse().ok(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_bundles() {
        let content = r#"[
            {"name": "sessionid", "value": "abc", "domain": ".example.com",
             "path": "/", "secure": true, "httpOnly": true, "expirationDate": 1999999999.5},
            {"name": "csrftoken", "value": "xyz"}
        ]"#;
        let cookies = parse_bundle(content);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "sessionid");
        assert!(cookies[0].http_only);
        assert_eq!(cookies[0].expires, Some(1999999999.5));
        assert_eq!(cookies[1].domain, None);
    }

    #[test]
    fn parses_tab_separated_bundles() {
        let content = "# Netscape HTTP Cookie File\n\
                       .example.com\tTRUE\t/\tTRUE\t1999999999\tsessionid\tabc\n\
                       \n\
                       .example.com\tFALSE\t/\tFALSE\t0\tcsrftoken\txyz\n";
        let cookies = parse_bundle(content);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].value, "abc");
        assert!(cookies[0].secure);
        assert!(!cookies[1].secure);
        assert_eq!(cookies[1].domain.as_deref(), Some(".example.com"));
    }

    #[test]
    fn garbage_yields_no_cookies() {
        assert!(parse_bundle("not a bundle at all").is_empty());
    }

    #[tokio::test]
    async fn missing_bundle_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_bundle(&dir.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, SessionError::Credentials(_)));
    }

    #[tokio::test]
    async fn empty_bundle_is_a_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();
        let err = load_bundle(&path).await.unwrap_err();
        assert!(matches!(err, SessionError::Credentials(_)));
    }
}
