use crate::error::{ServerError, ServerResult};
use crate::plugins::Plugins;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

impl Method {
    pub fn from_string(s: &str) -> Method {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            _ => Method::GET,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

#[derive(Debug, Default)]
pub struct Body {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

impl Body {
    pub fn new() -> Body {
        Body::default()
    }

    pub fn json_bytes(data: impl Into<Vec<u8>>) -> Body {
        Body {
            content_type: "application/json".to_string(),
            data: data.into(),
        }
    }

    pub fn form(data: impl Into<Vec<u8>>) -> Body {
        Body {
            content_type: "application/x-www-form-urlencoded".to_string(),
            data: data.into(),
        }
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn json<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.content_type.starts_with("application/json") {
            serde_json::from_slice(&self.data).ok()
        } else {
            None
        }
    }

    pub fn x_www_form_urlencoded(&self) -> Option<HashMap<String, String>> {
        if self.content_type.starts_with("application/x-www-form-urlencoded") {
            Some(parse_urlencoded(&String::from_utf8_lossy(&self.data)))
        } else {
            None
        }
    }
}

/// Decodes `a=1&b=two+words`. Undecodable pairs are skipped.
pub fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub params: HashMap<String, String>,
    /// Header names are stored lowercase.
    pub headers: HashMap<String, String>,
    pub remote_addr: Option<String>,
    pub data: HashMap<String, Value>,
    pub body: Body,
    pub plugins: Plugins,
}

impl Request {
    /// `uri` is a path with an optional query string.
    pub fn new(method: Method, uri: &str) -> Request {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Request {
            method,
            path: path.to_string(),
            query: parse_urlencoded(query),
            params: HashMap::new(),
            headers: HashMap::new(),
            remote_addr: None,
            data: HashMap::new(),
            body: Body::new(),
            plugins: Plugins::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_plugins(mut self, plugins: Plugins) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `X-Real-IP`, then the first `X-Forwarded-For` hop, then the peer address.
    pub fn client_ip(&self) -> Option<&str> {
        self.get_header("X-Real-IP")
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                self.get_header("X-Forwarded-For")
                    .and_then(|hops| hops.split(',').next())
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
            .or(self.remote_addr.as_deref())
    }

    /// Token from `header_name`, with an optional `Bearer ` prefix removed.
    pub fn token(&self, header_name: &str) -> Option<&str> {
        let value = self.get_header(header_name)?.trim();
        let value = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        (!value.is_empty()).then_some(value)
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Stores `value` for later handlers. Values that cannot be turned into
    /// JSON are rejected and leave the existing entry alone.
    pub fn set_data<T>(&mut self, key: &str, value: T) -> ServerResult<()>
    where
        T: serde::Serialize,
    {
        let value = serde_json::to_value(value)
            .map_err(|e| ServerError::InternalError(format!("request data `{key}`: {e}")))?;
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get_typed_data<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.to_owned()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_string_is_decoded() {
        let req = Request::new(Method::GET, "/users?name=J%C3%BCrgen&q=a+b&flag");
        assert_eq!(req.path, "/users");
        assert_eq!(req.get_query("name"), Some("Jürgen"));
        assert_eq!(req.get_query("q"), Some("a b"));
        assert_eq!(req.get_query("flag"), Some(""));
        assert!(Request::new(Method::GET, "/").query.is_empty());
    }

    #[test]
    fn client_ip_prefers_proxy_headers() {
        let mut req = Request::new(Method::GET, "/");
        req.remote_addr = Some("10.0.0.1".into());
        assert_eq!(req.client_ip(), Some("10.0.0.1"));

        let req = req.with_header("X-Forwarded-For", "1.2.3.4, 10.0.0.2");
        assert_eq!(req.client_ip(), Some("1.2.3.4"));

        let req = req.with_header("x-real-ip", "5.6.7.8");
        assert_eq!(req.client_ip(), Some("5.6.7.8"));
    }

    #[test]
    fn token_header_lookup() {
        let req = Request::new(Method::GET, "/").with_header("X-Token", "Bearer abc");
        assert_eq!(req.token("x-token"), Some("abc"));
        assert_eq!(req.token("Authorization"), None);
        let blank = Request::new(Method::GET, "/").with_header("X-Token", "  ");
        assert_eq!(blank.token("X-Token"), None);
    }

    #[test]
    fn body_decoders_check_content_type() {
        let body = Body::json_bytes(r#"{"id": 3}"#);
        assert_eq!(body.json::<Value>(), Some(json!({ "id": 3 })));
        assert_eq!(body.x_www_form_urlencoded(), None);

        let form = Body::form("a=1&b=x%20y");
        let fields = form.x_www_form_urlencoded().unwrap();
        assert_eq!(fields["b"], "x y");
        assert_eq!(form.json::<Value>(), None);
    }

    #[test]
    fn request_data_round_trips_and_rejects_unserializable_values() {
        let mut req = Request::new(Method::GET, "/");
        req.set_data("user", json!({ "id": 7 })).unwrap();
        assert_eq!(req.get_data("user"), Some(&json!({ "id": 7 })));
        assert_eq!(req.get_typed_data::<HashMap<String, u32>>("user").unwrap()["id"], 7);

        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = req.set_data("user", bad).unwrap_err();
        assert!(matches!(err, ServerError::InternalError(ref msg) if msg.contains("user")));
        assert_eq!(req.get_data("user"), Some(&json!({ "id": 7 })));
    }
}
