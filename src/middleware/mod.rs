//! Middleware pipeline.
//!
//! Middleware run before route resolution, in registration order. Each one
//! receives the request, the response, and a [`Next`] continuation:
//!
//! ```rust
//! use relay::{Next, Request, Response};
//!
//! #[derive(Clone, Copy)]
//! struct UserId(u64);
//!
//! async fn authenticate(mut req: Request, mut res: Response, next: Next) -> relay::Outcome {
//!     if req.header("authorization") != Some("Bearer letmein") {
//!         res.status(401).json(&serde_json::json!({ "error": "Unauthorized!" }))?;
//!         return Ok(());
//!     }
//!     req.extensions_mut().insert(UserId(7));
//!     next.run(req, res).await
//! }
//! ```
//!
//! A middleware has three choices:
//!
//! - **Proceed**: call `next.run(req, res).await`, whenever it likes (after
//!   reading the body, after a database call, …).
//! - **Short-circuit**: answer through the response and return without
//!   calling `next`. Nothing after it runs for this request.
//! - **Stall**: hold on to the response and never finish. The request stays
//!   pending; the core does not detect this. Enable
//!   [`Server::request_timeout`](crate::Server::request_timeout) if that
//!   matters to you.
//!
//! Errors are not caught. Whatever `next.run` returns is what the rest of the
//! chain produced; returning it passes it further up toward the dispatcher,
//! which logs it.

pub mod json_body;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, HandlerOutput};
use crate::request::Request;
use crate::response::Response;

// ── Erasure ───────────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every valid middleware: any function or closure shaped
/// like `async fn(Request, Response, Next) -> () | Result<(), E>`.
pub trait Middleware: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut, R> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let fut = (self.0)(req, res, next);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Step run once every middleware has proceeded.
pub(crate) type Complete = Box<dyn Fn(Request, Response) -> BoxFuture + Send + Sync + 'static>;

/// A frozen middleware list plus its completion step.
///
/// Built once when the app is turned into a dispatcher; every request walks
/// it from index 0 with its own [`Next`] cursor.
pub(crate) struct Chain {
    middleware: Box<[BoxedMiddleware]>,
    complete: Complete,
}

impl Chain {
    pub(crate) fn new(middleware: Vec<BoxedMiddleware>, complete: Complete) -> Arc<Self> {
        Arc::new(Self { middleware: middleware.into_boxed_slice(), complete })
    }

    /// Start a fresh traversal for one request.
    pub(crate) fn run(self: &Arc<Self>, req: Request, res: Response) -> BoxFuture {
        Next { chain: Arc::clone(self), cursor: 0 }.run(req, res)
    }

    pub(crate) fn len(&self) -> usize {
        self.middleware.len()
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The continuation handed to a middleware.
///
/// Calling [`run`](Next::run) hands the request to the next middleware, or to
/// route resolution once the list is exhausted. `run` consumes `self`, so a
/// middleware proceeds at most once.
pub struct Next {
    chain: Arc<Chain>,
    cursor: usize,
}

impl Next {
    pub fn run(self, req: Request, res: Response) -> BoxFuture {
        match self.chain.middleware.get(self.cursor) {
            Some(middleware) => {
                let next = Next { chain: Arc::clone(&self.chain), cursor: self.cursor + 1 };
                middleware.call(req, res, next)
            }
            None => (self.chain.complete)(req, res),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("cursor", &self.cursor)
            .field("len", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use http_body_util::Full;
    use tokio::sync::oneshot;

    use crate::error::BoxError;
    use crate::response::Reply;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn exchange() -> (Request, Response, oneshot::Receiver<Reply>) {
        let req = Request::from_http(
            http::Request::builder().uri("/").body(Full::new(bytes::Bytes::new())).unwrap(),
        );
        let (tx, rx) = oneshot::channel();
        (req, Response::new(tx), rx)
    }

    fn recording(log: &Log, name: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        (move |req: Request, res: Response, next: Next| {
            log.lock().unwrap().push(name);
            next.run(req, res)
        })
        .into_boxed_middleware()
    }

    fn completing(log: &Log) -> Complete {
        let log = Arc::clone(log);
        Box::new(move |_req: Request, mut res: Response| -> BoxFuture {
            log.lock().unwrap().push("complete");
            Box::pin(async move {
                res.json(&"done")?;
                Ok::<(), BoxError>(())
            })
        })
    }

    #[tokio::test]
    async fn runs_in_registration_order_then_completes() {
        let log = Log::default();
        let chain = Chain::new(
            vec![recording(&log, "first"), recording(&log, "second"), recording(&log, "third")],
            completing(&log),
        );

        let (req, res, rx) = exchange();
        chain.run(req, res).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["first", "second", "third", "complete"]);
        assert_eq!(rx.await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn empty_chain_goes_straight_to_completion() {
        let log = Log::default();
        let chain = Chain::new(Vec::new(), completing(&log));

        let (req, res, _rx) = exchange();
        chain.run(req, res).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["complete"]);
    }

    #[tokio::test]
    async fn withholding_next_stops_the_chain() {
        let log = Log::default();
        let gate = (|_req: Request, mut res: Response, _next: Next| async move {
            res.status(401).json(&"Unauthorized!")
        })
        .into_boxed_middleware();

        let chain = Chain::new(
            vec![recording(&log, "before"), gate, recording(&log, "after")],
            completing(&log),
        );

        let (req, res, rx) = exchange();
        chain.run(req, res).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["before"]);
        assert_eq!(rx.await.unwrap().status(), 401);
    }

    #[tokio::test]
    async fn next_may_be_called_after_async_work() {
        let log = Log::default();
        let slow = (|req: Request, res: Response, next: Next| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            next.run(req, res).await
        })
        .into_boxed_middleware();

        let chain = Chain::new(vec![slow, recording(&log, "after")], completing(&log));

        let (req, res, _rx) = exchange();
        chain.run(req, res).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["after", "complete"]);
    }

    #[tokio::test]
    async fn each_traversal_starts_at_the_beginning() {
        let log = Log::default();
        let chain = Chain::new(vec![recording(&log, "only")], completing(&log));

        for _ in 0..3 {
            let (req, res, _rx) = exchange();
            chain.run(req, res).await.unwrap();
        }

        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn errors_travel_back_up_uncaught() {
        let log = Log::default();
        let failing: Complete = Box::new(|_req: Request, _res: Response| -> BoxFuture {
            Box::pin(async { Err::<(), BoxError>("boom".into()) })
        });
        let chain = Chain::new(vec![recording(&log, "outer")], failing);

        let (req, res, rx) = exchange();
        let err = chain.run(req, res).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert!(rx.await.is_err());
    }
}
