// Hub login exchange
//
// The hub's `/login` endpoint takes a form-encoded username/password and
// answers with JSON. A successful body carries `authorization: "Bearer …"`;
// a failed one carries `error`, sometimes with HTTP 200.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Bearer credential issued by the hub at login.
///
/// Shared by the realtime socket and snapshot fetches. The secret is never
/// printed by `Debug`.
#[derive(Clone)]
pub struct Token(SecretString);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// The raw token, for building headers and URLs.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Cookie` header value the hub's HTTP endpoints accept.
    pub fn cookie_header(&self) -> String {
        format!("login_user_token={}", self.expose())
    }

    /// `Authorization` header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

/// Client for the hub's login endpoint.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Log in and return the bearer token.
    ///
    /// Never retries: a rejected login is fatal for the caller.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Token, Error> {
        let body = self.login_raw(username, password).await?;
        token_from_response(&body).ok_or_else(|| Error::Authentication {
            message: "login response carried no token".into(),
        })
    }

    /// Log in and return the hub's full JSON response.
    ///
    /// An explicit `error` field is still an [`Error::Authentication`].
    pub async fn login_raw(&self, username: &str, password: &SecretString) -> Result<Value, Error> {
        let url = self.base_url.join("login")?;
        debug!(%url, username, "logging in");

        let resp = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password.expose_secret())])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| error_message(&v))
                .unwrap_or_else(|| format!("HTTP {}: {text}", status.as_u16()));
            return Err(Error::Authentication { message });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.clone(),
        })?;

        if let Some(message) = error_message(&body) {
            return Err(Error::Authentication { message });
        }

        debug!("login successful");
        Ok(body)
    }
}

fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Pull the bearer token out of a login response.
fn token_from_response(body: &Value) -> Option<Token> {
    let raw = body
        .get("authorization")
        .and_then(Value::as_str)
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s))
        .or_else(|| body.get("token").and_then(Value::as_str))?
        .trim();

    (!raw.is_empty()).then(|| Token::new(raw))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_bearer_prefix() {
        let token = token_from_response(&json!({"authorization": "Bearer abc123"})).unwrap();
        assert_eq!(token.expose(), "abc123");
        assert_eq!(token.cookie_header(), "login_user_token=abc123");
        assert_eq!(token.bearer_header(), "Bearer abc123");
    }

    #[test]
    fn falls_back_to_token_field() {
        let token = token_from_response(&json!({"token": "xyz"})).unwrap();
        assert_eq!(token.expose(), "xyz");
    }

    #[test]
    fn empty_authorization_is_no_token() {
        assert!(token_from_response(&json!({"authorization": ""})).is_none());
        assert!(token_from_response(&json!({"username": "admin"})).is_none());
    }

    #[test]
    fn debug_redacts_secret() {
        let token = Token::new("super-secret");
        assert_eq!(format!("{token:?}"), "Token([REDACTED])");
    }

    #[test]
    fn error_field_variants() {
        assert_eq!(
            error_message(&json!({"error": "bad credentials"})).as_deref(),
            Some("bad credentials")
        );
        assert_eq!(error_message(&json!({"error": null})), None);
        assert_eq!(
            error_message(&json!({"error": {"code": 1}})).as_deref(),
            Some(r#"{"code":1}"#)
        );
    }
}
