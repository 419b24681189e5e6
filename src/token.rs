//! HS256 access tokens.
//!
//! ```rust,ignore
//! let issuer = TokenIssuer::from_config(&config)?;
//! let token = issuer.create_token(3600, claims)?;
//! let status = issuer.get_token(&token);
//! assert!(status.state);
//! ```

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;

pub const DEFAULT_HEADER_NAME: &str = "X-Token";

pub const MSG_LOGIN_TIMEOUT: &str = "Login timed out, please log in again";
pub const MSG_EXPIRED: &str = "Token has expired";
pub const MSG_ILLEGAL: &str = "Illegal token";
pub const MSG_FAILURE: &str = "Token authentication failure";
pub const MSG_SUCCESS: &str = "Token authentication is successful";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("`[setting] cookie_secret` is not configured")]
    MissingSecret,
    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Outcome of validating a token. `data` holds the claims on success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    pub state: bool,
    pub msg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl TokenStatus {
    fn rejected(msg: &'static str) -> Self {
        Self {
            state: false,
            msg,
            data: None,
        }
    }
}

pub struct TokenIssuer {
    header_name: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_owned(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Uses `[setting] cookie_secret` and `[setting] cookie_secret_name`.
    pub fn from_config(config: &Config) -> Result<Self, TokenError> {
        let secret = config
            .get_option("setting", "cookie_secret", None)
            .ok_or(TokenError::MissingSecret)?;
        let mut issuer = Self::new(&secret);
        if let Some(name) = config.get_option("setting", "cookie_secret_name", None) {
            issuer.header_name = name;
        }
        Ok(issuer)
    }

    /// Request header that carries the token.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Signs `claims` plus `iat` and an `exp` of now + `expires` seconds.
    pub fn create_token(&self, expires: i64, mut claims: Map<String, Value>) -> Result<String, TokenError> {
        let now = jsonwebtoken::get_current_timestamp() as i64;
        claims.insert("iat".to_owned(), Value::from(now));
        claims.insert("exp".to_owned(), Value::from(now.saturating_add(expires)));
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn get_token(&self, token: &str) -> TokenStatus {
        let token = token.trim();
        if token.is_empty() {
            return TokenStatus::rejected(MSG_LOGIN_TIMEOUT);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match jsonwebtoken::decode::<Map<String, Value>>(token, &self.decoding, &validation) {
            Ok(decoded) => TokenStatus {
                state: true,
                msg: MSG_SUCCESS,
                data: Some(decoded.claims),
            },
            Err(err) => TokenStatus::rejected(match err.kind() {
                ErrorKind::ExpiredSignature => MSG_EXPIRED,
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => MSG_FAILURE,
                _ => MSG_ILLEGAL,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> Map<String, Value> {
        match json!({ "uid": 1, "username": "tester" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn round_trip_carries_claims() {
        let issuer = TokenIssuer::new("secret");
        let token = issuer.create_token(1000, claims()).unwrap();
        let status = issuer.get_token(&token);

        assert!(status.state);
        assert_eq!(status.msg, MSG_SUCCESS);
        let data = status.data.unwrap();
        assert_eq!(data["uid"], json!(1));
        assert_eq!(data["username"], json!("tester"));
        assert!(data.contains_key("exp"));
        assert!(data.contains_key("iat"));
    }

    #[test]
    fn empty_token_asks_for_login() {
        let status = TokenIssuer::new("secret").get_token("  ");
        assert!(!status.state);
        assert_eq!(status.msg, MSG_LOGIN_TIMEOUT);
        assert_eq!(status.data, None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new("secret");
        let token = issuer.create_token(-10, claims()).unwrap();
        assert_eq!(issuer.get_token(&token).msg, MSG_EXPIRED);
    }

    #[test]
    fn wrong_secret_or_garbage_fails() {
        let token = TokenIssuer::new("secret").create_token(100, claims()).unwrap();
        let other = TokenIssuer::new("other");
        assert_eq!(other.get_token(&token).msg, MSG_FAILURE);
        assert_eq!(other.get_token("not-a-token").msg, MSG_FAILURE);
    }

    #[test]
    fn from_config_reads_secret_and_header() {
        let config: Config = "[setting]\ncookie_secret = abc\ncookie_secret_name = Authorization\n"
            .parse()
            .unwrap();
        let issuer = TokenIssuer::from_config(&config).unwrap();
        assert_eq!(issuer.header_name(), "Authorization");

        let empty: Config = "[setting]\ncookie_secret =\n".parse().unwrap();
        assert!(matches!(TokenIssuer::from_config(&empty), Err(TokenError::MissingSecret)));
    }
}
