//! Request dispatch: the composition root.
//!
//! For every request the dispatcher
//!
//! 1. wraps the transport request and creates the decorated [`Response`],
//! 2. walks the middleware chain on a fresh tokio task,
//! 3. once the chain completes, resolves the route and calls its handler, or
//!    answers `404 {"error":"Cannot <METHOD> <url>"}`,
//! 4. waits for whichever stage sends the reply and hands it to the transport.
//!
//! The dispatcher never forces a reply. If the response is dropped unsent,
//! [`dispatch`](Dispatcher::dispatch) returns [`Error::Unanswered`]; if it is
//! held forever, `dispatch` never resolves.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::body::Body;
use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;
use crate::middleware::{BoxedMiddleware, Chain, Complete};
use crate::request::Request;
use crate::response::Response;
use crate::router::RouteTable;

/// A frozen app, ready to serve requests. Obtain one with
/// [`App::into_dispatcher`](crate::App::into_dispatcher).
///
/// Cheap to share: the server wraps it in an `Arc` and every connection task
/// dispatches through the same instance.
pub struct Dispatcher {
    chain: Arc<Chain>,
}

impl Dispatcher {
    pub(crate) fn new(routes: RouteTable, middleware: Vec<BoxedMiddleware>) -> Self {
        debug!(routes = routes.len(), middleware = middleware.len(), "dispatcher frozen");
        let routes = Arc::new(routes);
        let complete: Complete =
            Box::new(move |req: Request, res: Response| resolve(&routes, req, res));
        Self { chain: Chain::new(middleware, complete) }
    }

    /// Run one request through the middleware chain and route table, and
    /// return the reply once something sends it.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Result<http::Response<Body>, Error>
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let req = Request::from_http(req);
        let span = info_span!("request", method = %req.method(), url = %req.url());

        let (slot, reply) = oneshot::channel();
        let res = Response::new(slot);
        let chain = Arc::clone(&self.chain);

        // The traversal owns the request from here on. Running it on its own
        // task lets it keep going after the reply is out, and keeps a panic
        // in user code from taking the connection task down with it. The
        // chain is entered inside the task: middleware and handlers may run
        // code before handing back their future.
        tokio::spawn(
            async move {
                if let Err(e) = chain.run(req, res).await {
                    error!(error = %e, "request failed");
                }
            }
            .instrument(span.clone()),
        );

        match reply.await {
            Ok(reply) => {
                debug!(parent: &span, status = reply.status().as_u16(), "reply ready");
                Ok(reply)
            }
            Err(_) => {
                warn!(parent: &span, "response dropped without a reply");
                Err(Error::Unanswered)
            }
        }
    }
}

/// Completion step: exact-match lookup, then the handler or the 404 reply.
fn resolve(routes: &RouteTable, req: Request, mut res: Response) -> BoxFuture {
    if let Some(handler) = routes.resolve(req.method(), req.url()) {
        return handler.call(req, res);
    }

    let body = serde_json::json!({ "error": format!("Cannot {} {}", req.method(), req.url()) });
    let outcome = res.status(404).json(&body).map_err(BoxError::from);
    Box::pin(std::future::ready(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http_body_util::BodyExt;

    use crate::{App, Next, body};

    fn get(uri: &str) -> http::Request<Body> {
        request("GET", uri)
    }

    fn request(method: &str, uri: &str) -> http::Request<Body> {
        http::Request::builder().method(method).uri(uri).body(body::full(Bytes::new())).unwrap()
    }

    async fn body_string(reply: http::Response<Body>) -> String {
        let bytes = reply.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn counting(hits: &Arc<AtomicUsize>, body: &'static str) -> impl crate::Handler {
        let hits = Arc::clone(hits);
        move |_req: Request, mut res: Response| {
            hits.fetch_add(1, Ordering::SeqCst);
            async move { res.json(&serde_json::json!(body)) }
        }
    }

    #[tokio::test]
    async fn registered_route_answers_with_default_status() {
        let dispatcher = App::new()
            .get("/api/posts", |_req: Request, mut res: Response| async move {
                res.json(&serde_json::json!([{ "id": 1 }]))
            })
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/api/posts")).await.unwrap();

        assert_eq!(reply.status(), 200);
        assert_eq!(reply.headers()["content-type"], "application/json");
        assert_eq!(body_string(reply).await, r#"[{"id":1}]"#);
    }

    #[tokio::test]
    async fn unknown_route_is_a_json_404() {
        let dispatcher = App::new().into_dispatcher();

        let reply = dispatcher.dispatch(get("/api/unknown")).await.unwrap();

        assert_eq!(reply.status(), 404);
        assert_eq!(reply.headers()["content-type"], "application/json");
        assert_eq!(body_string(reply).await, r#"{"error":"Cannot GET /api/unknown"}"#);
    }

    #[tokio::test]
    async fn not_found_echoes_original_method_and_url() {
        let dispatcher = App::new().into_dispatcher();

        let reply = dispatcher.dispatch(request("Patch", "/api/user?x=1")).await.unwrap();

        assert_eq!(body_string(reply).await, r#"{"error":"Cannot Patch /api/user?x=1"}"#);
    }

    #[tokio::test]
    async fn not_found_echoes_authority_form_targets() {
        let dispatcher = App::new().into_dispatcher();

        let reply = dispatcher.dispatch(request("CONNECT", "example.com:443")).await.unwrap();

        assert_eq!(body_string(reply).await, r#"{"error":"Cannot CONNECT example.com:443"}"#);
    }

    #[tokio::test]
    async fn only_the_matching_handler_runs() {
        let posts = Arc::new(AtomicUsize::new(0));
        let user = Arc::new(AtomicUsize::new(0));
        let dispatcher = App::new()
            .get("/api/posts", counting(&posts, "posts"))
            .route("GET", "/api/user", counting(&user, "user"))
            .into_dispatcher();

        let reply = dispatcher.dispatch(request("get", "/api/user")).await.unwrap();

        assert_eq!(body_string(reply).await, r#""user""#);
        assert_eq!(posts.load(Ordering::SeqCst), 0);
        assert_eq!(user.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trailing_slash_is_a_different_route() {
        let hits = Arc::new(AtomicUsize::new(0));
        let dispatcher = App::new().get("/login", counting(&hits, "login")).into_dispatcher();

        let reply = dispatcher.dispatch(get("/login/")).await.unwrap();

        assert_eq!(reply.status(), 404);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let dispatcher = App::new()
            .get("/", counting(&first, "first"))
            .route("GET", "/", counting(&second, "second"))
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/")).await.unwrap();

        assert_eq!(body_string(reply).await, r#""second""#);
        assert_eq!(first.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_run_in_order_before_the_handler() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let step = |n: usize| {
            let order = Arc::clone(&order);
            move |req: Request, res: Response, next: Next| {
                order.lock().unwrap().push(n);
                next.run(req, res)
            }
        };
        let seen = Arc::clone(&order);
        let dispatcher = App::new()
            .middleware(step(0))
            .middleware(step(1))
            .middleware(step(2))
            .get("/", move |_req: Request, mut res: Response| {
                seen.lock().unwrap().push(99);
                async move { res.json(&true) }
            })
            .into_dispatcher();

        for _ in 0..2 {
            dispatcher.dispatch(get("/")).await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 99, 0, 1, 2, 99]);
    }

    #[tokio::test]
    async fn middleware_extensions_reach_the_handler() {
        #[derive(Clone, Copy)]
        struct UserId(u64);

        let dispatcher = App::new()
            .middleware(|mut req: Request, res: Response, next: Next| {
                req.extensions_mut().insert(UserId(7));
                next.run(req, res)
            })
            .get("/whoami", |req: Request, mut res: Response| async move {
                let user_id = req.extensions().get::<UserId>().map(|id| id.0);
                res.json(&serde_json::json!({ "userId": user_id }))
            })
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/whoami")).await.unwrap();

        assert_eq!(body_string(reply).await, r#"{"userId":7}"#);
    }

    #[tokio::test]
    async fn short_circuit_skips_later_middleware_and_handler() {
        let later = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&later);
        let dispatcher = App::new()
            .middleware(|_req: Request, mut res: Response, _next: Next| async move {
                res.status(401).json(&serde_json::json!({ "error": "Unauthorized!" }))
            })
            .middleware(move |req: Request, res: Response, next: Next| {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(req, res)
            })
            .get("/api/user", counting(&handler, "user"))
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/api/user")).await.unwrap();

        assert_eq!(reply.status(), 401);
        assert_eq!(body_string(reply).await, r#"{"error":"Unauthorized!"}"#);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(handler.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stalled_middleware_leaves_the_request_pending() {
        let handler = Arc::new(AtomicUsize::new(0));
        let dispatcher = App::new()
            .middleware(|_req: Request, res: Response, _next: Next| async move {
                let _held = res;
                std::future::pending::<()>().await;
            })
            .get("/", counting(&handler, "never"))
            .into_dispatcher();

        let pending =
            tokio::time::timeout(Duration::from_millis(50), dispatcher.dispatch(get("/"))).await;

        assert!(pending.is_err());
        assert_eq!(handler.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_response_is_unanswered() {
        let dispatcher = App::new()
            .middleware(|_req: Request, _res: Response, _next: Next| async {})
            .into_dispatcher();

        let err = dispatcher.dispatch(get("/")).await.unwrap_err();

        assert!(matches!(err, Error::Unanswered));
    }

    #[tokio::test]
    async fn handler_errors_are_not_turned_into_replies() {
        let dispatcher = App::new()
            .get("/broken", |_req: Request, _res: Response| async {
                Err::<(), _>(Error::AlreadySent)
            })
            .into_dispatcher();

        let err = dispatcher.dispatch(get("/broken")).await.unwrap_err();

        assert!(matches!(err, Error::Unanswered));
    }

    #[tokio::test]
    async fn handler_panic_is_contained_to_its_request() {
        let dispatcher = App::new()
            .get("/panic", |_req: Request, _res: Response| async {
                if true {
                    panic!("handler bug");
                }
            })
            .get("/ok", |_req: Request, mut res: Response| async move { res.json(&"ok") })
            .into_dispatcher();

        assert!(dispatcher.dispatch(get("/panic")).await.is_err());
        assert_eq!(dispatcher.dispatch(get("/ok")).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn panic_before_the_handler_future_is_contained() {
        let dispatcher = App::new()
            .get("/panic", |_req: Request, _res: Response| {
                if true {
                    panic!("handler bug");
                }
                async {}
            })
            .into_dispatcher();

        // Dispatch from a task of its own, the way a connection task would.
        let outcome = tokio::spawn(async move { dispatcher.dispatch(get("/panic")).await })
            .await
            .expect("dispatching task must not panic");

        assert!(matches!(outcome, Err(Error::Unanswered)));
    }

    #[tokio::test]
    async fn panic_in_a_synchronous_middleware_is_contained() {
        let dispatcher = App::new()
            .middleware(|req: Request, res: Response, next: Next| {
                if req.path() == "/panic" {
                    panic!("middleware bug");
                }
                next.run(req, res)
            })
            .get("/ok", |_req: Request, mut res: Response| async move { res.json(&"ok") })
            .into_dispatcher();
        let dispatcher = Arc::new(dispatcher);

        let caller = Arc::clone(&dispatcher);
        let outcome = tokio::spawn(async move { caller.dispatch(get("/panic")).await })
            .await
            .expect("dispatching task must not panic");

        assert!(matches!(outcome, Err(Error::Unanswered)));
        assert_eq!(dispatcher.dispatch(get("/ok")).await.unwrap().status(), 200);
    }

    #[tokio::test]
    async fn handler_can_fall_back_when_a_file_is_missing() {
        let dispatcher = App::new()
            .get("/styles.css", |_req: Request, mut res: Response| async move {
                if res.send_file("./public/missing.css", Some("text/css")).await.is_err() {
                    res.status(404).json(&serde_json::json!({ "error": "Not found" }))?;
                }
                Ok::<(), Error>(())
            })
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/styles.css")).await.unwrap();

        assert_eq!(reply.status(), 404);
    }

    #[tokio::test]
    async fn handler_streams_a_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let dispatcher = App::new()
            .get("/manifest", move |_req: Request, mut res: Response| async move {
                res.send_file(path, Some("text/plain")).await
            })
            .into_dispatcher();

        let reply = dispatcher.dispatch(get("/manifest")).await.unwrap();

        assert_eq!(reply.headers()["content-type"], "text/plain");
        assert_eq!(body_string(reply).await, std::fs::read_to_string(path).unwrap());
    }
}
