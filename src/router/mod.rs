//! Route registry.
//!
//! Handlers are registered either as public routes on the [`Router`] or
//! inside a named [`Module`] that carries a URL prefix. A module route may
//! be published under several version groups at once:
//!
//! ```rust,ignore
//! let mut router = Router::new();
//! router
//!     .register_module("user", "/user")
//!     .route(Method::GET, &["/list", "^/users"], &["/v1", "/v2"], list_users);
//! // GET /user/v1/list, /user/v2/list and /users
//! ```

use crate::error::ServerError;
use crate::handler::{shared, Handler, HttpResponse, IntoResponse, SharedHandler};
use crate::http::{Method, Request, Response};
use crate::plugins::Plugins;
use std::collections::HashMap;
use tracing::trace;

#[derive(Clone)]
pub struct Router {
    routes: HashMap<String, HashMap<Method, SharedHandler>>,
    dynamic_routes: Vec<String>,
    public: Vec<(String, Method)>,
    modules: Vec<ModuleEntry>,
    plugins: Plugins,
    cors: Option<String>,
}

#[derive(Clone)]
struct ModuleEntry {
    name: String,
    prefix: String,
    urls: Vec<(String, Method)>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            dynamic_routes: Vec::new(),
            public: Vec::new(),
            modules: Vec::new(),
            plugins: Plugins::new(),
            cors: None,
        }
    }

    /// Adds a public handler.
    pub fn register<F, R>(&mut self, method: Method, url: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let url = self.add(method, url, shared(handler));
        self.public.push((url, method));
        self
    }

    /// Adds a public handler under every group. See [`expand_urls`].
    pub fn route<F, R>(&mut self, method: Method, patterns: &[&str], groups: &[&str], handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let handler = shared(handler);
        for url in expand_urls(patterns, groups, "") {
            let url = self.add(method, &url, handler.clone());
            self.public.push((url, method));
        }
        self
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.register(Method::GET, path, handler)
    }

    pub fn post<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.register(Method::POST, path, handler)
    }

    pub fn put<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.register(Method::PUT, path, handler)
    }

    pub fn delete<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.register(Method::DELETE, path, handler)
    }

    /// Starts (or reopens) a named module. The prefix given the first time
    /// a name is registered sticks.
    pub fn register_module(&mut self, name: &str, url_prefix: &str) -> Module<'_> {
        let index = match self.modules.iter().position(|m| m.name == name) {
            Some(index) => index,
            None => {
                self.modules.push(ModuleEntry {
                    name: name.to_owned(),
                    prefix: url_prefix.to_owned(),
                    urls: Vec::new(),
                });
                self.modules.len() - 1
            }
        };
        Module { router: self, index }
    }

    /// Registered `(url, method)` pairs: the named module (or every module)
    /// followed by the public routes when `with_public` is set.
    pub fn loading_handlers(&self, name: Option<&str>, with_public: bool) -> Vec<(String, Method)> {
        let mut handlers: Vec<(String, Method)> = self
            .modules
            .iter()
            .filter(|m| name.map_or(true, |name| m.name == name))
            .flat_map(|m| m.urls.iter().cloned())
            .collect();
        if with_public {
            handlers.extend(self.public.iter().cloned());
        }
        handlers
    }

    /// Makes `value` available to every handler through `req.plugins`.
    pub fn plugin<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.plugins.insert(value);
        self
    }

    /// Adds CORS headers for `origin` to every response and answers
    /// unhandled `OPTIONS` preflights with 204.
    pub fn cors(&mut self, origin: &str) -> &mut Self {
        self.cors = Some(origin.to_owned());
        self
    }

    /// Dispatches on exact path, then on `:param` patterns in registration
    /// order. HEAD falls back to GET with the body dropped.
    pub async fn handle(&self, req: Request) -> HttpResponse {
        let mut response = self.dispatch(req).await?;
        if let Some(origin) = &self.cors {
            response.with_cors(origin);
        }
        Ok(response)
    }

    async fn dispatch(&self, mut req: Request) -> HttpResponse {
        let path = normalize(&req.path);
        let (methods, params) = match self.routes.get(&path) {
            Some(methods) => (methods, HashMap::new()),
            None => self
                .dynamic_routes
                .iter()
                .find_map(|pattern| {
                    let params = match_dynamic_path(pattern, &path)?;
                    Some((self.routes.get(pattern)?, params))
                })
                .ok_or(ServerError::NotFound)?,
        };

        let head = req.method == Method::HEAD && !methods.contains_key(&Method::HEAD);
        let method = if head { Method::GET } else { req.method };
        let Some(handler) = methods.get(&method) else {
            if method == Method::OPTIONS && self.cors.is_some() {
                return Ok(Response::no_content());
            }
            let mut allowed: Vec<&str> = methods.keys().map(Method::as_str).collect();
            allowed.sort_unstable();
            return Ok(Response::method_not_allowed(&allowed));
        };

        trace!(method = req.method.as_str(), path = %path, "dispatching request");
        req.params.extend(params);
        req.plugins = self.plugins.clone();
        let mut response = handler.handle(req).await?;
        if head {
            response.body.clear();
        }
        Ok(response)
    }

    fn add(&mut self, method: Method, url: &str, handler: SharedHandler) -> String {
        let path = normalize(url);
        let methods = self.routes.entry(path.clone()).or_default();
        if methods.is_empty() && path.contains(':') {
            self.dynamic_routes.push(path.clone());
        }
        methods.insert(method, handler);
        path
    }
}

/// Routes added under one [`Router::register_module`] name.
pub struct Module<'a> {
    router: &'a mut Router,
    index: usize,
}

impl Module<'_> {
    pub fn name(&self) -> &str {
        &self.router.modules[self.index].name
    }

    pub fn prefix(&self) -> &str {
        &self.router.modules[self.index].prefix
    }

    pub fn route<F, R>(&mut self, method: Method, patterns: &[&str], groups: &[&str], handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        let urls = expand_urls(patterns, groups, self.prefix());
        let handler = shared(handler);
        for url in urls {
            let url = self.router.add(method, &url, handler.clone());
            self.router.modules[self.index].urls.push((url, method));
        }
        self
    }

    pub fn get<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Method::GET, &[path], &[], handler)
    }

    pub fn post<F, R>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Request) -> R + Send + Sync + 'static,
        R: IntoResponse,
    {
        self.route(Method::POST, &[path], &[], handler)
    }
}

/// Builds the concrete URLs for a set of patterns.
///
/// Each plain pattern is repeated under every group (pattern-major order)
/// and then prefixed. Patterns starting with `^` skip both and are appended
/// last with the `^` removed.
pub fn expand_urls(patterns: &[&str], groups: &[&str], prefix: &str) -> Vec<String> {
    let (special, plain): (Vec<&str>, Vec<&str>) = patterns.iter().partition(|p| p.starts_with('^'));

    let mut urls: Vec<String> = if groups.is_empty() {
        plain.iter().map(|p| p.to_string()).collect()
    } else {
        plain
            .iter()
            .flat_map(|p| groups.iter().map(move |g| format!("{}{}", g.trim(), p)))
            .collect()
    };
    if !prefix.is_empty() {
        urls = urls.into_iter().map(|u| format!("{prefix}{u}")).collect();
    }
    urls.extend(special.iter().map(|p| p[1..].to_string()));
    urls
}

fn normalize(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_owned()
    } else {
        path.to_owned()
    }
}

fn match_dynamic_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part).ok()?;
            params.insert(name.to_string(), value.into_owned());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}
