use crate::error::ServerError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Application level result codes carried in the JSON envelope.
pub struct Codes;

impl Codes {
    pub const SUCCESS: i64 = 0;
    pub const FAILED: i64 = 1;
    pub const NO_LOGIN: i64 = 10001;
    pub const INVALID_TOKEN: i64 = 10002;
    pub const NO_PERMISSION: i64 = 10003;
}

/// `{"code": .., "msg": .., "data": .., ...extra}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub code: i64,
    pub msg: Option<String>,
    pub data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Adds a top-level field. `code`, `msg` and `data` are reserved and ignored.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), "code" | "msg" | "data") {
            self.extra.insert(key, value.into());
        }
        self
    }
}

pub fn content(code: i64, msg: Option<&str>, data: Value) -> Envelope {
    Envelope {
        code,
        msg: msg.map(str::to_owned),
        data,
        extra: Map::new(),
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn new(status: u16) -> Response {
        Response {
            status,
            headers: HashMap::new(),
            body: String::new(),
        }
    }

    pub fn body<T: AsRef<str>>(&mut self, body: T) -> &mut Self {
        self.body = body.as_ref().to_string();
        self
    }

    pub fn header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        self.headers.insert(name.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ServerError> {
        let json_string = serde_json::to_string(value)
            .map_err(|e| ServerError::InternalError(format!("JSON serialization error: {}", e)))?;
        self.header("Content-Type", "application/json");
        self.body(json_string);
        Ok(self)
    }

    /// 200 with a [`Codes::SUCCESS`] envelope.
    pub fn success<T: Serialize>(msg: &str, data: &T) -> Result<Response, ServerError> {
        Self::failure(Codes::SUCCESS, msg, data)
    }

    /// 200 with an application error code; the HTTP status stays 200 so
    /// clients branch on `code`.
    pub fn failure<T: Serialize>(code: i64, msg: &str, data: &T) -> Result<Response, ServerError> {
        let data = serde_json::to_value(data)
            .map_err(|e| ServerError::InternalError(format!("JSON serialization error: {}", e)))?;
        Self::ok(&content(code, Some(msg), data))
    }

    pub fn ok<T: Serialize>(data: &T) -> Result<Response, ServerError> {
        let mut response = Response::new(200);
        response.json(data)?;
        Ok(response)
    }

    pub fn no_content() -> Response {
        Response::new(204)
    }

    /// Error response; the status comes from [`ServerError::status_code`].
    pub fn error(err: ServerError) -> Response {
        let status = err.status_code();
        let mut response = Response::new(status);
        let body = serde_json::json!({
            "error": {
                "message": err.to_string(),
                "status": status
            }
        });
        response
            .header("Content-Type", "application/json")
            .body(body.to_string());
        response
    }

    /// Cross-origin headers for browser clients, including the token header.
    pub fn with_cors(&mut self, origin: &str) -> &mut Self {
        self.header("Access-Control-Allow-Origin", origin)
            .header("Access-Control-Allow-Credentials", "true")
            .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
            .header("Access-Control-Max-Age", "10000")
            .header(
                "Access-Control-Allow-Headers",
                "Accept, Authorization, Content-Length, Content-Type, Origin, X-Requested-With, X-Token, X-CSRFToken",
            )
    }

    pub fn text<T: AsRef<str>>(content: T) -> Response {
        let mut response = Response::new(200);
        response
            .header("Content-Type", "text/plain")
            .body(content);
        response
    }

    pub fn method_not_allowed(allowed_methods: &[&str]) -> Response {
        let mut response = Response::new(405);
        let body = serde_json::json!({
            "error": {
                "message": "Method not allowed",
                "allowed_methods": allowed_methods
            }
        });
        response
            .header("Allow", allowed_methods.join(", "))
            .header("Content-Type", "application/json")
            .body(body.to_string());
        response
    }
}
