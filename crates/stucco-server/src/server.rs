//! Development server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::services::ServeDir;

use crate::inject::{client_tag, inject_tag, InjectionRules};
use crate::proxy::Upstream;
use crate::reload::{
    reload_client_script, ReloadHub, ReloadMessage, RELOAD_SCRIPT_PATH, RELOAD_WS_PATH,
};

/// Largest HTML document the injector will buffer.
const MAX_HTML_BYTES: usize = 32 * 1024 * 1024;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Site to proxy, e.g. `mysite.local/php`. Serves `serve_dir` when unset.
    pub proxy: Option<String>,

    /// Directory served when no proxy is configured
    pub serve_dir: PathBuf,

    /// Open browser on start
    pub open: bool,

    /// Paths that always get the reload client
    pub allow: Vec<String>,

    /// Paths that never get the reload client
    pub deny: Vec<String>,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            proxy: None,
            serve_dir: PathBuf::from("dist"),
            open: true,
            allow: vec!["/wp-admin/admin-ajax.php".to_string()],
            deny: vec!["/wp-admin/**".to_string()],
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Invalid proxy target {0}")]
    InvalidProxy(String),

    #[error("Invalid path pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Proxy error: {0}")]
    Proxy(String),
}

/// Shared server state.
struct ServerState {
    hub: ReloadHub,
    rules: InjectionRules,
    upstream: Option<Upstream>,
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self {
            config,
            hub: ReloadHub::new(),
        }
    }

    /// Hub used to push reload messages to connected browsers.
    pub fn hub(&self) -> ReloadHub {
        self.hub.clone()
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    /// Build the router: reload endpoints, then either the proxy or the
    /// static output directory, with the reload client injected into HTML.
    pub fn router(&self) -> Result<Router, ServerError> {
        let rules = InjectionRules::new(&self.config.allow, &self.config.deny)?;
        let upstream = self
            .config
            .proxy
            .as_deref()
            .map(Upstream::new)
            .transpose()?;
        let proxied = upstream.is_some();

        let state = Arc::new(ServerState {
            hub: self.hub.clone(),
            rules,
            upstream,
        });

        let router = Router::new()
            .route(RELOAD_WS_PATH, get(ws_handler))
            .route(RELOAD_SCRIPT_PATH, get(script_handler));

        let router = if proxied {
            router.fallback(proxy_handler)
        } else {
            router.fallback_service(ServeDir::new(&self.config.serve_dir))
        };

        Ok(router
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                inject_reload_client,
            ))
            .with_state(state))
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = self.router()?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::InvalidAddress(e.to_string()))?;

        let start_path = match &self.config.proxy {
            Some(target) => {
                let upstream = Upstream::new(target)?;
                tracing::info!("Proxying {}", upstream.origin());
                upstream.start_path().to_string()
            }
            None => {
                tracing::info!("Serving {}", self.config.serve_dir.display());
                "/".to_string()
            }
        };

        let url = format!("http://{}{}", addr, start_path);
        tracing::info!("Dev server running at {}", url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))
    }
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let rx = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_ws(socket, rx))
}

/// Forward hub messages to one browser until it disconnects.
async fn handle_ws(
    mut socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<ReloadMessage>,
) {
    if send_message(&mut socket, &ReloadMessage::Connected)
        .await
        .is_err()
    {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_message(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Reload client lagged by {} messages", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

/// Handler for the reload client script.
async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        reload_client_script(),
    )
}

async fn proxy_handler(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let Some(upstream) = &state.upstream else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match upstream.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("{}", e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Insert the reload client into HTML responses for eligible paths.
async fn inject_reload_client(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let is_head = request.method() == Method::HEAD;

    let response = next.run(request).await;

    if is_head
        || !state.rules.should_inject(&path)
        || !is_html(response.headers())
        || response.headers().contains_key(header::CONTENT_ENCODING)
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read response for {}: {}", path, e);
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let html = inject_tag(&String::from_utf8_lossy(&bytes), &client_tag());
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::Html;
    use std::fs;
    use tempfile::tempdir;

    async fn spawn(config: DevServerConfig) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = DevServer::new(DevServerConfig {
            open: false,
            ..config
        });
        tokio::spawn(server.serve(listener));
        addr
    }

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default());
        assert_eq!(server.config().port, 3000);
        assert!(server.config().proxy.is_none());
    }

    #[test]
    fn rejects_invalid_proxy() {
        let server = DevServer::new(DevServerConfig {
            proxy: Some("http://".to_string()),
            ..Default::default()
        });
        assert!(matches!(server.router(), Err(ServerError::InvalidProxy(_))));
    }

    #[tokio::test]
    async fn serves_output_dir_with_reload_client() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Hi</h1></body></html>",
        )
        .unwrap();
        fs::write(temp.path().join("app.css"), "a{color:red}").unwrap();

        let addr = spawn(DevServerConfig {
            serve_dir: temp.path().to_path_buf(),
            ..Default::default()
        })
        .await;

        let html = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains(r#"<script async src="/__stucco/reload.js"></script></body>"#));

        let css = reqwest::get(format!("http://{}/app.css", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(css, "a{color:red}");
    }

    #[tokio::test]
    async fn serves_client_script() {
        let temp = tempdir().unwrap();
        let addr = spawn(DevServerConfig {
            serve_dir: temp.path().to_path_buf(),
            ..Default::default()
        })
        .await;

        let response = reqwest::get(format!("http://{}{}", addr, RELOAD_SCRIPT_PATH))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE.as_str()],
            "application/javascript"
        );
        assert!(response.text().await.unwrap().contains(RELOAD_WS_PATH));
    }

    #[tokio::test]
    async fn proxies_and_rewrites_upstream() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        let page = format!(
            r#"<html><body><a href="http://{}/about">About</a></body></html>"#,
            upstream_addr
        );
        let app = Router::new()
            .route("/", get(move || async move { Html(page) }))
            .route(
                "/wp-admin/index.php",
                get(|| async { Html("<html><body>admin</body></html>") }),
            );
        tokio::spawn(async move { axum::serve(upstream, app).await });

        let addr = spawn(DevServerConfig {
            proxy: Some(upstream_addr.to_string()),
            ..Default::default()
        })
        .await;

        let html = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains(&format!(r#"href="http://{}/about""#, addr)));
        assert!(html.contains("/__stucco/reload.js"));

        let admin = reqwest::get(format!("http://{}/wp-admin/index.php", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(admin, "<html><body>admin</body></html>");
    }

    #[tokio::test]
    async fn protocol_relative_paths_stay_on_upstream() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream.local_addr().unwrap();
        let app = Router::new().fallback(|uri: axum::http::Uri| async move { uri.to_string() });
        tokio::spawn(async move { axum::serve(upstream, app).await });

        let addr = spawn(DevServerConfig {
            proxy: Some(upstream_addr.to_string()),
            ..Default::default()
        })
        .await;

        let response = reqwest::get(format!("http://{}//wp-content/uploads/a.png?v=1", addr))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.text().await.unwrap(),
            "//wp-content/uploads/a.png?v=1"
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let addr = spawn(DevServerConfig {
            proxy: Some(closed_addr.to_string()),
            ..Default::default()
        })
        .await;

        let response = reqwest::get(format!("http://{}/", addr)).await.unwrap();
        assert_eq!(response.status().as_u16(), 502);
    }
}
