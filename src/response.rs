//! The decorated response handed to middleware and handlers.
//!
//! A [`Response`] never leaves your hands as a return value. You set a status,
//! maybe a header, and finish with exactly one terminal call: [`json`] or
//! [`send_file`]. The terminal call hands the reply to the transport through a
//! one-shot slot; the dispatcher is waiting on the other end.
//!
//! [`json`]: Response::json
//! [`send_file`]: Response::send_file

use std::fmt;
use std::path::Path;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::body::{self, Body, FileBody};
use crate::error::Error;

/// The reply as handed to the transport.
pub(crate) type Reply = http::Response<Body>;

/// An outgoing HTTP response under construction.
///
/// ```rust
/// # use relay::{Request, Response};
/// async fn create_post(_req: Request, mut res: Response) -> Result<(), relay::Error> {
///     res.status(201)
///         .set_header("location", "/api/posts/2")?
///         .json(&[("id", 2)])
/// }
/// ```
pub struct Response {
    status: u16,
    headers: HeaderMap,
    reply: Option<oneshot::Sender<Reply>>,
}

impl Response {
    pub(crate) fn new(reply: oneshot::Sender<Reply>) -> Self {
        Self { status: 200, headers: HeaderMap::new(), reply: Some(reply) }
    }

    /// Set the status code. Any value is accepted here; a code outside
    /// `100..=999` makes the terminal call fail with [`Error::InvalidStatus`].
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.status = code;
        self
    }

    /// Insert a header, replacing any existing value under that name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.to_owned()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidHeader(name.as_str().to_owned()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn status_code(&self) -> u16 { self.status }

    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Whether a terminal call has already sent this response.
    pub fn is_sent(&self) -> bool {
        self.reply.is_none()
    }

    /// Terminal: serialize `data` as the `application/json` body and send.
    pub fn json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), Error> {
        let status = self.sendable_status()?;
        let bytes = serde_json::to_vec(data)?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.finish(status, body::full(bytes))
    }

    /// Terminal: stream the file at `path` as the body.
    ///
    /// `content-type` is set to `mime` when given and left untouched
    /// otherwise. If the file cannot be opened this returns [`Error::File`]
    /// and the response stays unsent, so the caller can still answer:
    ///
    /// ```rust
    /// # use relay::{Request, Response};
    /// async fn styles(_req: Request, mut res: Response) -> Result<(), relay::Error> {
    ///     if let Err(e) = res.send_file("./public/styles.css", Some("text/css")).await {
    ///         tracing::warn!("{e}");
    ///         res.status(404).json(&serde_json::json!({ "error": "Not found" }))?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn send_file(
        &mut self,
        path: impl AsRef<Path>,
        mime: Option<&str>,
    ) -> Result<(), Error> {
        let status = self.sendable_status()?;
        let mime = mime
            .map(|mime| {
                HeaderValue::from_str(mime)
                    .map_err(|_| Error::InvalidHeader(CONTENT_TYPE.as_str().to_owned()))
            })
            .transpose()?;

        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| Error::File { path: path.to_owned(), source })?;

        if let Some(mime) = mime {
            self.headers.insert(CONTENT_TYPE, mime);
        }
        self.finish(status, FileBody::new(file).boxed())
    }

    /// Checks a terminal call can go out. Runs before any header is touched,
    /// so a rejected call leaves the response exactly as it was.
    fn sendable_status(&self) -> Result<StatusCode, Error> {
        if self.is_sent() {
            return Err(Error::AlreadySent);
        }
        StatusCode::from_u16(self.status).map_err(|_| Error::InvalidStatus(self.status))
    }

    fn finish(&mut self, status: StatusCode, body: Body) -> Result<(), Error> {
        let Some(slot) = self.reply.take() else {
            return Err(Error::AlreadySent);
        };

        let mut reply = http::Response::new(body);
        *reply.status_mut() = status;
        *reply.headers_mut() = std::mem::take(&mut self.headers);

        // The receiver is gone when the client disconnected or the server
        // timed the request out. Nothing left to tell anyone.
        if slot.send(reply).is_err() {
            debug!(status = self.status, "reply discarded, no one is waiting for it");
        }
        Ok(())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("sent", &self.is_sent())
            .finish()
    }
}
