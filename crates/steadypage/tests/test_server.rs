// Test Server - Local HTTP server for browser integration tests
//
// Serves pages that exercise the loader and network gate: a flaky page that
// fails before it succeeds, a page whose content appears late, and a page that
// pulls in an image and a font so blocked requests can be counted. The ads page
// embeds an iframe whose path contains a denylisted ad domain.

// Functions appear "unused" in test binaries that don't include them.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::task::JoinHandle;

/// Request counters shared with the handlers
#[derive(Default)]
pub struct Hits {
    pub flaky: AtomicU32,
    pub image: AtomicU32,
    pub font: AtomicU32,
    pub ad_frame: AtomicU32,
}

/// Test server handle
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    hits: Arc<Hits>,
}

impl TestServer {
    /// Start the test server on a random available port
    pub async fn start() -> Self {
        let hits = Arc::new(Hits::default());
        let app = Router::new()
            .route("/", get(index_page))
            .route("/flaky.html", get(flaky_page))
            .route("/late.html", get(late_page))
            .route("/assets.html", get(assets_page))
            .route("/logo.png", get(logo))
            .route("/font.woff2", get(font))
            .route("/ads.html", get(ads_page))
            .route("/doubleclick.net/ad.html", get(ad_frame))
            .with_state(hits.clone());

        // Bind to port 0 to get any available port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");

        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Test server failed");
        });

        TestServer { addr, handle, hits }
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> &Hits {
        &self.hits
    }

    /// Shutdown the test server
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

fn html(status: StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/html")
        .header("Cache-Control", "no-store")
        .body(Body::from(body))
        .expect("valid response")
}

async fn index_page() -> Response<Body> {
    html(
        StatusCode::OK,
        r#"<!DOCTYPE html>
<html>
<head><title>Index</title></head>
<body>
  <div id="app"><h1>Ready</h1></div>
</body>
</html>"#,
    )
}

/// Fails with 503 twice, then serves the page
async fn flaky_page(State(hits): State<Arc<Hits>>) -> Response<Body> {
    let hit = hits.flaky.fetch_add(1, Ordering::SeqCst) + 1;
    if hit <= 2 {
        return html(
            StatusCode::SERVICE_UNAVAILABLE,
            "<html><body>Service Unavailable</body></html>",
        );
    }
    html(
        StatusCode::OK,
        r#"<!DOCTYPE html>
<html>
<head><title>Flaky</title></head>
<body>
  <div id="app">Recovered</div>
</body>
</html>"#,
    )
}

/// Shows #content 300ms after load and enables #enableAfter after 500ms
async fn late_page() -> Response<Body> {
    html(
        StatusCode::OK,
        r#"<!DOCTYPE html>
<html>
<head><title>Late</title></head>
<body>
  <div id="spinner">Loading...</div>
  <div id="content" style="display:none">Loaded</div>
  <button id="enableAfter" disabled>Will enable</button>
  <div id="progress" role="progressbar" aria-valuenow="0">0%</div>
  <script>
    setTimeout(() => {
      document.getElementById('spinner').remove();
      document.getElementById('content').style.display = 'block';
    }, 300);
    setTimeout(() => { document.getElementById('enableAfter').disabled = false; }, 500);
    let value = 0;
    const timer = setInterval(() => {
      value += 10;
      const bar = document.getElementById('progress');
      bar.setAttribute('aria-valuenow', String(value));
      bar.textContent = value + '%';
      if (value >= 100) clearInterval(timer);
    }, 100);
  </script>
</body>
</html>"#,
    )
}

async fn assets_page() -> Response<Body> {
    html(
        StatusCode::OK,
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Assets</title>
  <style>
    @font-face { font-family: 'Test'; src: url('/font.woff2') format('woff2'); }
    body { font-family: 'Test', sans-serif; }
  </style>
</head>
<body>
  <div id="app">Assets</div>
  <img id="logo" src="/logo.png" alt="logo">
</body>
</html>"#,
    )
}

async fn logo(State(hits): State<Arc<Hits>>) -> Response<Body> {
    hits.image.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "image/png")
        .body(Body::empty())
        .expect("valid response")
}

async fn font(State(hits): State<Arc<Hits>>) -> Response<Body> {
    hits.font.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "font/woff2")
        .body(Body::empty())
        .expect("valid response")
}

async fn ads_page() -> Response<Body> {
    html(
        StatusCode::OK,
        r#"<!DOCTYPE html>
<html>
<head><title>Ads</title></head>
<body>
  <div id="app">Article</div>
  <iframe id="ad" src="/doubleclick.net/ad.html" width="300" height="250"></iframe>
</body>
</html>"#,
    )
}

async fn ad_frame(State(hits): State<Arc<Hits>>) -> Response<Body> {
    hits.ad_frame.fetch_add(1, Ordering::SeqCst);
    html(StatusCode::OK, "<html><body>Buy now</body></html>")
}
