//! Minimal relay demo: a token-checking middleware, the JSON body parser,
//! a few JSON routes and a streamed file.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/posts
//!   curl http://localhost:3000/api/whoami -H 'authorization: Bearer letmein'
//!   curl -X POST http://localhost:3000/api/echo \
//!        -H 'content-type: application/json' \
//!        -d '{"title":"Hello"}'
//!   curl http://localhost:3000/manifest
//!   curl http://localhost:3000/nowhere

use std::time::Duration;

use relay::middleware::json_body::{self, JsonBody};
use relay::{App, Next, Request, Response, Server};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Post {
    id: u64,
    title: &'static str,
}

#[derive(Clone, Copy)]
struct UserId(u64);

const PROTECTED: &[&str] = &["/api/whoami"];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = App::new()
        .middleware(authenticate)
        .middleware(json_body::parse)
        .get("/api/posts", list_posts)
        .get("/api/whoami", whoami)
        .post("/api/echo", echo)
        .get("/manifest", manifest);

    Server::bind("0.0.0.0:3000")
        .request_timeout(Duration::from_secs(30))
        .on_ready(|addr| tracing::info!("demo is live at http://{addr}"))
        .serve(app)
        .await
        .expect("server error");
}

// Rejects protected paths without the demo token; everything else passes.
async fn authenticate(mut req: Request, mut res: Response, next: Next) -> relay::Outcome {
    if !PROTECTED.contains(&req.path()) {
        return next.run(req, res).await;
    }
    if req.header("authorization") != Some("Bearer letmein") {
        res.status(401).json(&serde_json::json!({ "error": "Unauthorized!" }))?;
        return Ok(());
    }
    req.extensions_mut().insert(UserId(1));
    next.run(req, res).await
}

async fn list_posts(_req: Request, mut res: Response) -> Result<(), relay::Error> {
    res.json(&[Post { id: 1, title: "First Post" }])
}

async fn whoami(req: Request, mut res: Response) -> Result<(), relay::Error> {
    let user_id = req.extensions().get::<UserId>().map(|id| id.0);
    res.json(&serde_json::json!({ "userId": user_id }))
}

async fn echo(req: Request, mut res: Response) -> Result<(), relay::Error> {
    match req.extensions().get::<JsonBody>() {
        Some(JsonBody(value)) => res.status(201).json(value),
        None => res.status(415).json(&serde_json::json!({ "error": "Expected a JSON body" })),
    }
}

async fn manifest(_req: Request, mut res: Response) -> Result<(), relay::Error> {
    if let Err(e) = res.send_file("Cargo.toml", Some("text/plain; charset=utf-8")).await {
        tracing::warn!("{e}");
        res.status(404).json(&serde_json::json!({ "error": "Not found" }))?;
    }
    Ok(())
}
