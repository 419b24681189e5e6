//! Salted password digests and md5 request signatures.
//!
//! Stored passwords have the form `algo$salt$hexdigest`, where the digest is
//! taken over `salt + password`. Signed payloads carry an md5 digest of
//! their sorted `k=v` pairs followed by `&key=<secret>`.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use thiserror::Error;

pub const SALT_LEN: usize = 6;
pub const DEFAULT_SIGN_KEY: &str = "sign";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("unknown password digest algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("data and secret key are required to sign")]
    NothingToSign,
    #[error("`{0}` is missing from the signed data")]
    MissingSign(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Md5,
    Sha1,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
        }
    }

    pub fn hex_digest(&self, salt: &str, text: &str) -> String {
        match self {
            Algorithm::Md5 => digest_hex::<Md5>(&[salt, text]),
            Algorithm::Sha1 => digest_hex::<Sha1>(&[salt, text]),
        }
    }
}

impl FromStr for Algorithm {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(Algorithm::Md5),
            "sha1" => Ok(Algorithm::Sha1),
            other => Err(SecurityError::UnknownAlgorithm(other.to_owned())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn digest_hex<D: Digest>(parts: &[&str]) -> String {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn md5_hex(text: &str) -> String {
    digest_hex::<Md5>(&[text])
}

pub fn sha1_hex(text: &str) -> String {
    digest_hex::<Sha1>(&[text])
}

pub fn random_salt(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Hashes `password` with md5 and a fresh salt.
pub fn hex_passwd(password: &str) -> String {
    hex_passwd_with(Algorithm::Md5, password)
}

pub fn hex_passwd_with(algorithm: Algorithm, password: &str) -> String {
    let salt = random_salt(SALT_LEN);
    let digest = algorithm.hex_digest(&salt, password);
    format!("{algorithm}${salt}${digest}")
}

/// Checks `raw` against a stored `algo$salt$hexdigest`. Malformed values and
/// unknown algorithms never match.
pub fn check_passwd(stored: &str, raw: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(algorithm), Some(salt), Some(digest), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    algorithm
        .parse::<Algorithm>()
        .map(|algorithm| algorithm.hex_digest(salt, raw) == digest)
        .unwrap_or(false)
}

fn sign_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sorted_pairs(data: &Map<String, Value>, sign_key: &str) -> String {
    let mut pairs: Vec<(&String, &Value)> = data.iter().filter(|(k, _)| *k != sign_key).collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={}", sign_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// md5 over the sorted `k=v` pairs of `data` (minus `sign_key`) and the
/// secret.
pub fn create_hexdigest_sign(
    data: &Map<String, Value>,
    secret_key: &str,
    sign_key: &str,
) -> Result<String, SecurityError> {
    if data.is_empty() || secret_key.is_empty() {
        return Err(SecurityError::NothingToSign);
    }
    let unsigned = format!("{}&key={secret_key}", sorted_pairs(data, sign_key));
    Ok(md5_hex(&unsigned))
}

/// Copy of `data` with the signature stored under `sign_key`.
pub fn create_hexdigest_data(
    data: &Map<String, Value>,
    secret_key: &str,
    sign_key: &str,
) -> Result<Map<String, Value>, SecurityError> {
    let sign = create_hexdigest_sign(data, secret_key, sign_key)?;
    let mut signed = data.clone();
    signed.insert(sign_key.to_owned(), Value::String(sign));
    Ok(signed)
}

pub fn validate_hexdigest_sign(
    data: &Map<String, Value>,
    secret_key: &str,
    sign_key: &str,
) -> Result<bool, SecurityError> {
    let received = data
        .get(sign_key)
        .ok_or_else(|| SecurityError::MissingSign(sign_key.to_owned()))?;
    let expected = create_hexdigest_sign(data, secret_key, sign_key)?;
    Ok(sign_value(received) == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn known_digests() {
        assert_eq!(md5_hex("hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(sha1_hex("hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(Algorithm::Md5.hex_digest("he", "llo"), md5_hex("hello"));
    }

    #[test]
    fn password_round_trip() {
        let stored = hex_passwd("s3cret");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "md5");
        assert_eq!(parts[1].len(), SALT_LEN);
        assert!(check_passwd(&stored, "s3cret"));
        assert!(!check_passwd(&stored, "S3cret"));

        let stored = hex_passwd_with(Algorithm::Sha1, "s3cret");
        assert!(stored.starts_with("sha1$"));
        assert!(check_passwd(&stored, "s3cret"));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hex_passwd("same"), hex_passwd("same"));
    }

    #[test]
    fn malformed_passwords_never_match() {
        assert!(!check_passwd("plaintext", "plaintext"));
        assert!(!check_passwd("md5$salt", "x"));
        assert!(!check_passwd(&format!("crypt$ab${}", md5_hex("abx")), "x"));
        assert!(!check_passwd("md5$a$b$c", "x"));
        assert_eq!(
            "crypt".parse::<Algorithm>(),
            Err(SecurityError::UnknownAlgorithm("crypt".into()))
        );
    }

    #[test]
    fn sign_uses_sorted_pairs_and_secret() {
        let data = map(json!({ "b": 2, "a": "x", "sign": "ignored" }));
        let sign = create_hexdigest_sign(&data, "k", DEFAULT_SIGN_KEY).unwrap();
        assert_eq!(sign, md5_hex("a=x&b=2&key=k"));
    }

    #[test]
    fn signed_data_validates() {
        let data = map(json!({ "order": "A1", "amount": 100 }));
        let signed = create_hexdigest_data(&data, "k", DEFAULT_SIGN_KEY).unwrap();
        assert!(validate_hexdigest_sign(&signed, "k", DEFAULT_SIGN_KEY).unwrap());
        assert!(!validate_hexdigest_sign(&signed, "other", DEFAULT_SIGN_KEY).unwrap());

        let mut tampered = signed.clone();
        tampered.insert("amount".into(), json!(1));
        assert!(!validate_hexdigest_sign(&tampered, "k", DEFAULT_SIGN_KEY).unwrap());
    }

    #[test]
    fn signing_requires_data_secret_and_sign() {
        let data = map(json!({ "a": 1 }));
        assert_eq!(
            create_hexdigest_sign(&Map::new(), "k", DEFAULT_SIGN_KEY),
            Err(SecurityError::NothingToSign)
        );
        assert_eq!(
            create_hexdigest_sign(&data, "", DEFAULT_SIGN_KEY),
            Err(SecurityError::NothingToSign)
        );
        assert_eq!(
            validate_hexdigest_sign(&data, "k", DEFAULT_SIGN_KEY),
            Err(SecurityError::MissingSign("sign".into()))
        );
    }
}
