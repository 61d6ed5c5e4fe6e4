//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use markup_proxy::config::{CacheBackendKind, MimeTypeConfig, PluginRef, PluginsConfig, ProxyConfig};
use markup_proxy::document::{ElementTree, MarkupTree};
use markup_proxy::http::HttpServer;
use markup_proxy::lifecycle::Shutdown;
use markup_proxy::plugin::{BoxError, Capabilities, Plugin, PluginContext};
use markup_proxy::plugins::InProcessLoader;

/// A canned backend response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Start a programmable mock backend. `f` receives the request path.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(path) = read_request_path(&mut socket).await else {
                            return;
                        };
                        let response = f(path).await;

                        let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            response.body.len()
                        ));

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a mock backend that always returns the same response.
pub async fn start_mock_backend(addr: SocketAddr, response: MockResponse) {
    start_programmable_backend(addr, move |_| {
        let response = response.clone();
        async move { response }
    })
    .await;
}

async fn read_request_path(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    // drain the request body so closing the socket does not reset it
    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }

    head.split_whitespace().nth(1).map(str::to_string)
}

/// Adds `data-proxied="yes"` to `<body>`.
pub struct MarkBody;

impl Plugin for MarkBody {
    fn capabilities(&self) -> Capabilities {
        Capabilities::MARKUP
    }

    fn process_markup_tree(&self, _ctx: &PluginContext, _url: &url::Url, tree: &mut MarkupTree) -> Result<(), BoxError> {
        let body = tree.document().select_first("body").map_err(|_| "document has no body")?;
        body.attributes.borrow_mut().insert("data-proxied", "yes".to_string());
        Ok(())
    }
}

/// Always fails.
pub struct Broken;

impl Plugin for Broken {
    fn capabilities(&self) -> Capabilities {
        Capabilities::MARKUP
    }

    fn process_markup_tree(&self, _ctx: &PluginContext, _url: &url::Url, _tree: &mut MarkupTree) -> Result<(), BoxError> {
        Err("refusing to process".into())
    }
}

/// Element-tree only.
pub struct FeedOnly;

impl Plugin for FeedOnly {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ELEMENT
    }
}

/// Adds `proxied="yes"` to the XML root element.
pub struct StampFeed;

impl Plugin for StampFeed {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ELEMENT
    }

    fn process_element_tree(&self, _ctx: &PluginContext, _url: &url::Url, tree: &mut ElementTree) -> Result<(), BoxError> {
        tree.root_mut()
            .attributes
            .insert("proxied".to_string(), "yes".to_string());
        Ok(())
    }
}

/// A plugin directory with stub files plus a loader resolving their symbols.
pub struct PluginFixture {
    pub dir: tempfile::TempDir,
    pub loader: Arc<InProcessLoader>,
}

impl PluginFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for file in ["mark.so", "broken.so", "feed.so", "stamp.so"] {
            let path = dir.path().join(file);
            std::fs::write(&path, b"in-process plugin").unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
            }
        }

        let loader = Arc::new(InProcessLoader::new());
        loader.register("MarkBodyPlugin", || Arc::new(MarkBody) as Arc<dyn Plugin>);
        loader.register("BrokenPlugin", || Arc::new(Broken) as Arc<dyn Plugin>);
        loader.register("FeedOnlyPlugin", || Arc::new(FeedOnly) as Arc<dyn Plugin>);
        loader.register("StampFeedPlugin", || Arc::new(StampFeed) as Arc<dyn Plugin>);
        Self { dir, loader }
    }

    pub fn plugin(&self, file: &str, name: &str) -> PluginRef {
        PluginRef {
            path: self.dir.path().join(file).to_string_lossy().into_owned(),
            name: name.into(),
        }
    }

    /// Memory-cached config forwarding to `backend`, with one `text/html` rule.
    pub fn config(&self, proxy: SocketAddr, backend: SocketAddr, html_plugin: PluginRef) -> ProxyConfig {
        let mut config = ProxyConfig {
            backend_url: format!("http://{}", backend),
            mime_types: vec![MimeTypeConfig {
                mime_type: "text/html".into(),
                plugins: vec![html_plugin],
            }],
            plugins: PluginsConfig {
                allowed_dirs: vec![PathBuf::from(self.dir.path())],
            },
            ..Default::default()
        };
        config.listener.bind_address = proxy.to_string();
        config.cache.backend = CacheBackendKind::Memory;
        config
    }
}

/// Running proxy handle. Shuts the server down on drop.
pub struct RunningProxy {
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig, loader: Arc<InProcessLoader>) -> RunningProxy {
    let addr: SocketAddr = config.listener.bind_address.parse().unwrap();
    let server = HttpServer::with_plugin_loader(config, loader).expect("proxy state");
    let listener = TcpListener::bind(addr).await.unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    RunningProxy {
        shutdown,
        config_updates,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
