//! # relay
//!
//! A minimal HTTP dispatch core. Requests go through an ordered chain of
//! middleware, then to exactly one handler picked by exact method + path
//! match, or to a JSON 404.
//!
//! ## The model
//!
//! - **Middleware** get `(Request, Response, Next)`. They proceed with
//!   `next.run(req, res).await`, or answer directly and stop the chain.
//! - **Handlers** get `(Request, Response)` and answer through the response.
//! - **Responses** are answered once: [`Response::json`] or
//!   [`Response::send_file`] (streamed, never buffered).
//! - **Routes** match exactly. `GET /about` and `GET /about/` are different
//!   routes; there are no path parameters or wildcards.
//! - Unmatched requests get `404 {"error":"Cannot <METHOD> <url>"}`.
//!
//! What relay leaves to the application: body parsing (see
//! [`middleware::json_body`] for a ready-made middleware), error recovery,
//! authentication, timeouts beyond [`Server::request_timeout`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use relay::{App, Next, Request, Response, Server};
//!
//! #[derive(Clone, Copy)]
//! struct UserId(u64);
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new()
//!         .middleware(identify)
//!         .get("/whoami", whoami);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn identify(mut req: Request, res: Response, next: Next) -> relay::Outcome {
//!     req.extensions_mut().insert(UserId(7));
//!     next.run(req, res).await
//! }
//!
//! async fn whoami(req: Request, mut res: Response) -> Result<(), relay::Error> {
//!     let user_id = req.extensions().get::<UserId>().map(|id| id.0);
//!     res.json(&serde_json::json!({ "userId": user_id }))
//! }
//! ```

mod app;
mod body;
mod dispatch;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::App;
pub use body::Body;
pub use dispatch::Dispatcher;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, Handler, HandlerOutput, Outcome};
pub use middleware::{Middleware, Next};
pub use request::Request;
pub use response::Response;
pub use server::Server;
