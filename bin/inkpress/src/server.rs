//! Development server serving the current build from memory, with live reload.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use inkpress_core::OutputBody;
use inkpress_generator::BuildContext;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

/// Path of the server-sent events endpoint.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Live reload message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMessage {
    /// Full page reload.
    Reload,
}

/// Shared state: the current build and the reload broadcaster.
pub struct ServerState {
    current: RwLock<Option<Arc<BuildContext>>>,

    /// Broadcast channel for live reload events.
    pub reload_tx: broadcast::Sender<ReloadMessage>,
}

impl ServerState {
    /// Create a state with no build yet.
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self {
            current: RwLock::new(None),
            reload_tx,
        }
    }

    /// The build currently being served.
    pub async fn current(&self) -> Option<Arc<BuildContext>> {
        self.current.read().await.clone()
    }

    /// Replace the served build and tell connected pages to reload.
    pub async fn install(&self, context: Arc<BuildContext>) {
        *self.current.write().await = Some(context);
        self.notify_reload();
    }

    /// Send a reload notification to all connected clients.
    pub fn notify_reload(&self) {
        let _ = self.reload_tx.send(ReloadMessage::Reload);
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the development server router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_handler))
        .fallback(serve_artifact)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Look up the request path in the current manifest.
async fn serve_artifact(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(context) = state.current().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let Some(file) = context.find(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let content_type = content_type_for(&file.file_path);
    let body = match &file.body {
        OutputBody::Rendered(content) if is_html(&file.file_path) => {
            Body::from(inject_livereload(content))
        }
        OutputBody::Rendered(content) => Body::from(content.clone()),
        OutputBody::Passthrough(source) => match tokio::fs::read(source).await {
            Ok(bytes) => Body::from(bytes),
            Err(e) => {
                tracing::error!(path = %source.display(), error = %e, "failed to read static file");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
    };

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.reload_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(ReloadMessage::Reload) => Some(Ok(Event::default().data("reload"))),
        // Lagged receivers just miss a message; the next one reloads anyway.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

fn is_html(file_path: &str) -> bool {
    file_path.ends_with(".html")
}

/// Content type derived from the file extension. Text types are served as UTF-8.
pub fn content_type_for(file_path: &str) -> String {
    let mime = mime_guess::from_path(file_path).first_or_text_plain();
    if mime.type_() == mime_guess::mime::TEXT && mime.get_param("charset").is_none() {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

/// Insert the live reload client before `</body>`, or append it.
pub fn inject_livereload(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + LIVERELOAD_SCRIPT.len());
            out.push_str(&html[..pos]);
            out.push_str(LIVERELOAD_SCRIPT);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{LIVERELOAD_SCRIPT}"),
    }
}

/// JavaScript snippet to inject for live reload.
pub const LIVERELOAD_SCRIPT: &str = r#"
<script>
(function() {
    const source = new EventSource('/__livereload');
    source.onmessage = function(event) {
        if (event.data === 'reload') {
            window.location.reload();
        }
    };
    source.onerror = function() {
        console.log('[livereload] Connection lost, retrying...');
    };
})();
</script>
"#;

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::Request};
    use inkpress_core::{BuildMode, OutputFile};
    use inkpress_generator::{BuildStats, Listings};
    use tower::ServiceExt;

    use super::*;

    fn context(files: Vec<OutputFile>) -> Arc<BuildContext> {
        Arc::new(
            BuildContext::new(files, Listings::default(), BuildMode::Watch, BuildStats::default())
                .unwrap(),
        )
    }

    async fn get(router: Router, path: &str) -> Response {
        router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unavailable_before_first_build() {
        let state = Arc::new(ServerState::new());
        let response = get(create_router(state), "/").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_not_found_after_build() {
        let state = Arc::new(ServerState::new());
        state
            .install(context(vec![OutputFile::rendered("/", "/", "/index.html", "home")]))
            .await;

        let response = get(create_router(state), "/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_rendered_content() {
        let state = Arc::new(ServerState::new());
        state
            .install(context(vec![OutputFile::rendered(
                "/sitemap.txt",
                "/sitemap.txt",
                "/sitemap.txt",
                "https://example.com/",
            )]))
            .await;

        let response = get(create_router(state), "/sitemap.txt").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "https://example.com/");
    }

    #[tokio::test]
    async fn test_html_gets_livereload() {
        let state = Arc::new(ServerState::new());
        state
            .install(context(vec![OutputFile::rendered(
                "/blog",
                "/blog",
                "/blog.html",
                "<html><body>Blog</body></html>",
            )]))
            .await;

        let response = get(create_router(state), "/blog").await;
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        let body = body_text(response).await;
        assert!(body.starts_with("<html><body>Blog"));
        assert!(body.contains(LIVERELOAD_PATH));
        assert!(body.ends_with("</body></html>"));
    }

    #[tokio::test]
    async fn test_serves_passthrough_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("app.js");
        std::fs::write(&source, "console.log(1)").unwrap();

        let state = Arc::new(ServerState::new());
        state
            .install(context(vec![OutputFile::passthrough(
                "/js/app.HASH.js",
                "/js/app.HASH.js",
                "/js/app.HASH.js",
                &source,
            )]))
            .await;

        let response = get(create_router(state), "/js/app.HASH.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/javascript; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "console.log(1)");
    }

    #[tokio::test]
    async fn test_install_replaces_and_notifies() {
        let state = Arc::new(ServerState::new());
        let mut rx = state.reload_tx.subscribe();

        state
            .install(context(vec![OutputFile::rendered("/", "/", "/index.html", "v1")]))
            .await;
        state
            .install(context(vec![OutputFile::rendered("/", "/", "/index.html", "v2")]))
            .await;

        assert_eq!(rx.recv().await.unwrap(), ReloadMessage::Reload);
        assert_eq!(rx.recv().await.unwrap(), ReloadMessage::Reload);

        let response = get(create_router(state), "/").await;
        assert!(body_text(response).await.starts_with("v2"));
    }

    #[tokio::test]
    async fn test_post_is_rejected() {
        let state = Arc::new(ServerState::new());
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("/css/site.0123456789.css"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("/img/a.PNG"), "image/png");
        assert_eq!(content_type_for("/LICENSE"), "text/plain; charset=utf-8");
        assert_eq!(content_type_for("/fonts/body.woff2"), "font/woff2");
        assert_eq!(content_type_for("/feed.atom"), "application/atom+xml");
        assert_eq!(content_type_for("/media/talk.mp4"), "video/mp4");
        assert_eq!(content_type_for("/files/deck.pdf"), "application/pdf");
    }

    #[test]
    fn test_inject_without_body_tag() {
        let out = inject_livereload("<p>fragment</p>");
        assert!(out.starts_with("<p>fragment</p>"));
        assert!(out.contains("EventSource"));
    }
}
