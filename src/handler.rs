//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The route table holds handlers of *different* types in one
//! `HashMap<String, BoxedHandler>`. Rust collections hold one concrete type,
//! so each handler is hidden behind a trait object (`dyn ErasedHandler`).
//!
//! ```text
//! async fn list_posts(req: Request, res: Response) { … }   ← user writes this
//!        ↓ app.get("/api/posts", list_posts)
//! list_posts.into_boxed_handler()                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(list_posts))                          ← stored as BoxedHandler
//!        ↓
//! handler.call(req, res)  at request time                  ← one vtable dispatch
//!        ↓
//! Box::pin(async { list_posts(req, res).await.into_outcome() })
//! ```
//!
//! Middleware go through the same erasure; see [`crate::middleware`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::Response;

// ── Internal types ────────────────────────────────────────────────────────────

/// What every erased handler and middleware future resolves to.
pub type Outcome = Result<(), BoxError>;

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
///
/// `Send + 'static` because every request runs on its own tokio task.
pub type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── HandlerOutput ─────────────────────────────────────────────────────────────

/// Return types accepted from handlers and middleware.
///
/// Either `()` or `Result<(), E>`. An `Err` is not turned into a response:
/// it travels back up the middleware chain and is logged by the dispatcher.
pub trait HandlerOutput: Send + 'static {
    fn into_outcome(self) -> Outcome;
}

impl HandlerOutput for () {
    fn into_outcome(self) -> Outcome { Ok(()) }
}

impl<E> HandlerOutput for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_outcome(self) -> Outcome {
        self.map_err(Into::into)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any function or closure shaped like:
///
/// ```text
/// async fn name(req: Request, res: Response) -> () | Result<(), E>
/// ```
///
/// The handler owns both halves of the exchange. It answers by calling a
/// terminal method on the response; returning without doing so leaves the
/// request unanswered.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture {
        let fut = (self.0)(req, res);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
