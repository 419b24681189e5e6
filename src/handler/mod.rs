//! Async request handlers.
//!
//! Any `Fn(Request) -> impl Future<Output = HttpResponse>` closure is a
//! [`Handler`]. The router stores each one once as a [`SharedHandler`] and
//! points every URL a route expands to (one per version group) at it.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ServerResult;
use crate::http::{Request, Response};

pub type HttpResponse = ServerResult<Response>;

pub type SharedHandler = Arc<dyn Handler>;

pub trait IntoResponse {
    fn into_response_future(self) -> BoxFuture<'static, HttpResponse>;
}

impl<F: Future<Output = HttpResponse> + Send + 'static> IntoResponse for F {
    fn into_response_future(self) -> BoxFuture<'static, HttpResponse> {
        Box::pin(self)
    }
}

pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse>;
}

impl<F, R> Handler for F
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    fn handle(&self, req: Request) -> BoxFuture<'static, HttpResponse> {
        (self)(req).into_response_future()
    }
}

pub fn shared<F, R>(handler: F) -> SharedHandler
where
    F: Fn(Request) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    Arc::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn shared_handler_serves_every_clone() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = shared(move |req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Response::text(req.path)) }
        });
        let other = handler.clone();

        let first = handler.handle(Request::new(Method::GET, "/a")).await.unwrap();
        let second = other.handle(Request::new(Method::GET, "/b")).await.unwrap();

        assert_eq!(first.body, "/a");
        assert_eq!(second.body, "/b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&handler), 2);
    }
}
