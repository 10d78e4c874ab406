//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap};
use http_body_util::BodyExt;

use crate::body::{self, Body};
use crate::error::{BoxError, Error};

/// Peer address recorded by the server in the request extensions.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RemoteAddr(pub(crate) SocketAddr);

/// An incoming HTTP request.
///
/// Middleware attach their own data through [`extensions_mut`](Self::extensions_mut);
/// later middleware and handlers read it back by type:
///
/// ```rust
/// # use relay::Request;
/// #[derive(Clone, Copy)]
/// struct UserId(u64);
///
/// fn user_id(req: &Request) -> Option<u64> {
///     req.extensions().get::<UserId>().map(|id| id.0)
/// }
/// ```
pub struct Request {
    method: String,
    url: String,
    headers: HeaderMap,
    extensions: Extensions,
    body: Option<Body>,
}

impl Request {
    /// Wrap a transport-level request.
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        // Authority-form targets (`CONNECT host:443`) have no path at all.
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.to_string(), |pq| pq.as_str().to_owned());

        Self {
            method: parts.method.as_str().to_owned(),
            url,
            headers: parts.headers,
            extensions: parts.extensions,
            body: Some(body::boxed(body)),
        }
    }

    /// The method exactly as the client sent it.
    pub fn method(&self) -> &str { &self.method }

    /// The request target: path plus query string, verbatim. Routes match
    /// against this string.
    pub fn url(&self) -> &str { &self.url }

    /// The path component of [`url`](Self::url), without the query string.
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Header lookup by name (names are case-insensitive). Values that are
    /// not visible ASCII are reported as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }

    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Address of the connected peer, when the request arrived through
    /// [`Server`](crate::Server).
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.extensions.get::<RemoteAddr>().map(|addr| addr.0)
    }

    /// Take the streaming body. Returns `None` once it has been taken.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Read the whole body into memory. An already-taken body reads as empty.
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        let Some(body) = self.body.take() else {
            return Ok(Bytes::new());
        };
        let collected = body.collect().await.map_err(Error::Body)?;
        Ok(collected.to_bytes())
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
