//! Registration API.
//!
//! An [`App`] collects middleware and routes at startup. Turning it into a
//! [`Dispatcher`] (directly, or by handing it to [`Server::serve`]) freezes
//! both: nothing can be registered while requests are in flight.
//!
//! [`Server::serve`]: crate::Server::serve

use crate::dispatch::Dispatcher;
use crate::handler::Handler;
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::router::RouteTable;

/// The application under construction.
///
/// Every method returns `self` so registrations chain:
///
/// ```rust,no_run
/// # use relay::{App, Next, Request, Response};
/// # async fn log_requests(req: Request, res: Response, next: Next) -> relay::Outcome {
/// #     next.run(req, res).await
/// # }
/// # async fn list_posts(_: Request, _: Response) {}
/// # async fn logout(_: Request, _: Response) {}
/// let app = App::new()
///     .middleware(log_requests)
///     .get("/api/posts", list_posts)
///     .route("DELETE", "/api/logout", logout);
/// ```
#[derive(Default)]
pub struct App {
    routes: RouteTable,
    middleware: Vec<BoxedMiddleware>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// The method is case-insensitive; the path must match the request
    /// target exactly. Registering the same pair again replaces the earlier
    /// handler.
    pub fn route(mut self, method: &str, path: &str, handler: impl Handler) -> Self {
        self.routes.insert(method, path, handler);
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.route("get", path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.route("post", path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.route("put", path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.route("delete", path, handler)
    }

    /// Append a middleware. Middleware run in the order they are added,
    /// before route resolution, on every request.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(middleware.into_boxed_middleware());
        self
    }

    /// Freeze the registrations into a [`Dispatcher`].
    pub fn into_dispatcher(self) -> Dispatcher {
        Dispatcher::new(self.routes, self.middleware)
    }
}
