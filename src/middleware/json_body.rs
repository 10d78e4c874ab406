//! JSON request-body parsing, as an ordinary middleware.
//!
//! The dispatch core never reads request bodies. Register this middleware to
//! have `application/json` bodies parsed up front:
//!
//! ```rust,no_run
//! use relay::{App, Request, Response, middleware::json_body::{self, JsonBody}};
//!
//! async fn create_post(req: Request, mut res: Response) -> Result<(), relay::Error> {
//!     let title = req.extensions().get::<JsonBody>().and_then(|b| b.0.get("title"));
//!     res.status(201).json(&serde_json::json!({ "title": title }))
//! }
//!
//! let app = App::new()
//!     .middleware(json_body::parse)
//!     .post("/api/posts", create_post);
//! ```

use serde_json::Value;
use tracing::debug;

use crate::handler::Outcome;
use crate::middleware::Next;
use crate::request::Request;
use crate::response::Response;

/// The parsed body, stored in the request extensions.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonBody(pub Value);

/// Parses the body when `content-type` is `application/json` (parameters
/// such as `charset` are allowed) and stores it as [`JsonBody`].
///
/// Malformed JSON is answered with `400 {"error":"Invalid JSON body"}` and the
/// chain stops there. Other requests pass through untouched, body unread.
pub async fn parse(mut req: Request, mut res: Response, next: Next) -> Outcome {
    if !is_json(&req) {
        return next.run(req, res).await;
    }

    let bytes = req.body_bytes().await?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => {
            req.extensions_mut().insert(JsonBody(value));
            next.run(req, res).await
        }
        Err(e) => {
            debug!(error = %e, "rejecting malformed JSON body");
            res.status(400).json(&serde_json::json!({ "error": "Invalid JSON body" }))?;
            Ok(())
        }
    }
}

fn is_json(req: &Request) -> bool {
    req.header("content-type")
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}
