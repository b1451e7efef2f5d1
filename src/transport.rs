//! Record Transport
//!
//! Fire-and-forget delivery of records to the collector endpoints. Every
//! payload is logged before it is sent; failures are logged and dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{Error, Result};
use crate::record::Record;
use crate::TrackerConfig;

/// Delivers one JSON body to one endpoint path
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, path: &str, body: String) -> Result<()>;
}

/// JSON-over-HTTP POST transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport posting to paths under `base_url`
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        Url::parse(base_url).map_err(|e| Error::invalid_url(base_url, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Later requests must carry the visitor cookie the collector sets
        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::transport_reqwest("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Transport for a page: the configured endpoint, or the page's own origin
    pub fn for_page(config: &TrackerConfig, page_url: &str) -> Result<Self> {
        let base = match &config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => origin_of(page_url)?,
        };
        Self::new(&base, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `scheme://host[:port]` of a URL
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;
    match parsed.origin() {
        origin @ url::Origin::Tuple(..) => Ok(origin.ascii_serialization()),
        url::Origin::Opaque(_) => Err(Error::invalid_url(url, "URL has no origin")),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, path: &str, body: String) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::transport_reqwest(format!("POST {} failed", url), e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Http {
                status: status.as_u16(),
                url,
            })
        }
    }
}

/// A request captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub path: String,
    pub body: String,
}

impl SentRequest {
    /// Parse the body back into JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Transport that keeps requests in memory; can be told to fail
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentRequest>>,
    failing: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails like a refused connection
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Requests delivered so far
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().clone()
    }

    /// Delivered requests to `path`
    pub fn sent_to(&self, path: &str) -> Vec<SentRequest> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, path: &str, body: String) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transport(format!("POST {} failed: connection refused", path)));
        }
        self.sent.lock().push(SentRequest {
            path: path.to_string(),
            body,
        });
        Ok(())
    }
}

/// Serializes records, logs them and hands them to a [`Transport`] without waiting
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    navigation_path: String,
    events_path: String,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, config: &TrackerConfig) -> Self {
        Self {
            transport,
            navigation_path: config.navigation_path.clone(),
            events_path: config.events_path.clone(),
        }
    }

    /// Endpoint path for a record
    pub fn path_for(&self, record: &Record) -> &str {
        match record {
            Record::Navigation(_) => &self.navigation_path,
            Record::Event(_) => &self.events_path,
        }
    }

    /// Send `record` in the background.
    ///
    /// The returned handle resolves once the attempt is over; dropping it is
    /// fine. Returns `None` if the record could not be encoded or there is no
    /// runtime to send on.
    pub fn dispatch(&self, record: &Record) -> Option<JoinHandle<()>> {
        let label = record.label();
        let body = match record.to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(kind = label, "Failed to encode record: {}", e);
                return None;
            }
        };
        let path = self.path_for(record).to_string();

        tracing::info!(
            target: "clickstream::transport",
            kind = label,
            path = %path,
            payload = %body,
            "Transmitting {} data",
            if record.is_navigation() { "navigation" } else { "event" }
        );

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!(kind = label, "No async runtime; dropping record");
                return None;
            }
        };

        let transport = self.transport.clone();
        Some(handle.spawn(async move {
            if let Err(e) = transport.send(&path, body).await {
                tracing::error!(
                    target: "clickstream::transport",
                    kind = label,
                    path = %path,
                    "Error transmitting data: {}",
                    e
                );
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Environment;
    use crate::record::{EventRecord, NavigationRecord};
    use crate::snapshot::build_snapshot;
    use std::collections::HashMap;
    use std::fmt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::{assert_err, assert_ok};
    use tracing::field::{Field, Visit};
    use tracing::{Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn records() -> (Record, Record) {
        let page = build_snapshot(&Environment::desktop("https://example.com/"), 0.0);
        (
            NavigationRecord::leave(page.clone(), "https://example.com/", 10.0).into(),
            EventRecord::visibility(page, false).into(),
        )
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            assert_ok!(origin_of("https://shop.example.com:8443/cart?x=1")),
            "https://shop.example.com:8443"
        );
        assert_eq!(assert_ok!(origin_of("http://example.com/a")), "http://example.com");
        assert_err!(origin_of("data:text/html,hello"));
        assert_err!(origin_of("not a url"));
    }

    #[test]
    fn test_for_page_prefers_configured_endpoint() {
        let config = TrackerConfig::default().with_endpoint("https://collect.example.net/");
        let transport = assert_ok!(HttpTransport::for_page(&config, "https://example.com/page"));
        assert_eq!(transport.base_url(), "https://collect.example.net");

        let transport = assert_ok!(HttpTransport::for_page(
            &TrackerConfig::default(),
            "https://example.com/page"
        ));
        assert_eq!(transport.base_url(), "https://example.com");
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_variant() {
        let memory = Arc::new(MemoryTransport::new());
        let dispatcher = Dispatcher::new(memory.clone(), &TrackerConfig::default());
        let (navigation, event) = records();

        dispatcher.dispatch(&navigation).unwrap().await.unwrap();
        dispatcher.dispatch(&event).unwrap().await.unwrap();

        assert_eq!(memory.sent_to("/api/navigation").len(), 1);
        assert_eq!(memory.sent_to("/api/events").len(), 1);
        let json = assert_ok!(memory.sent_to("/api/events")[0].json());
        assert_eq!(json["type"], "visibilitychange");
    }

    #[tokio::test]
    async fn test_failed_send_is_swallowed() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let memory = Arc::new(MemoryTransport::failing());
        let dispatcher = Dispatcher::new(memory.clone(), &TrackerConfig::default());
        let (navigation, _) = records();
        let body = assert_ok!(navigation.to_json());

        let handle = dispatcher.dispatch(&navigation).expect("spawned");
        assert_ok!(handle.await);
        assert!(memory.sent().is_empty());

        let info = logs.at(Level::INFO);
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].target, "clickstream::transport");
        assert_eq!(info[0].fields["payload"], body);
        assert_eq!(info[0].fields["path"], "/api/navigation");

        let errors = logs.at(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].target, "clickstream::transport");
        assert!(errors[0].fields["message"].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_successful_send_logs_payload_only() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let memory = Arc::new(MemoryTransport::new());
        let dispatcher = Dispatcher::new(memory.clone(), &TrackerConfig::default());
        let (_, event) = records();

        assert_ok!(dispatcher.dispatch(&event).expect("spawned").await);
        assert_eq!(memory.sent().len(), 1);

        let info = logs.at(Level::INFO);
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].fields["payload"], memory.sent()[0].body);
        assert_eq!(info[0].fields["kind"], "visibilitychange");
        assert!(logs.at(Level::ERROR).is_empty());
    }

    #[tokio::test]
    async fn test_http_transport_returns_collector_cookie() {
        let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
        let base = format!("http://{}", assert_ok!(listener.local_addr()));

        let server = tokio::spawn(async move {
            let mut carried_cookie = Vec::new();
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let head = read_request_head(&mut socket).await.to_ascii_lowercase();
                carried_cookie.push(head.contains("tracking_id=abc"));
                socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\n\
                          Set-Cookie: tracking_id=abc; Path=/\r\n\
                          Content-Length: 0\r\n\
                          Connection: close\r\n\r\n",
                    )
                    .await
                    .unwrap();
            }
            carried_cookie
        });

        let transport = assert_ok!(HttpTransport::new(&base, Some(Duration::from_secs(5))));
        assert_ok!(transport.send("/api/events", "{}".to_string()).await);
        assert_ok!(transport.send("/api/events", "{}".to_string()).await);

        assert_eq!(server.await.unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_http_error_status_is_failure() {
        let listener = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
        let base = format!("http://{}", assert_ok!(listener.local_addr()));

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request_head(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\n\
                      Content-Length: 0\r\n\
                      Connection: close\r\n\r\n",
                )
                .await
                .unwrap();
        });

        let transport = assert_ok!(HttpTransport::new(&base, Some(Duration::from_secs(5))));
        match transport.send("/api/navigation", "{}".to_string()).await {
            Err(Error::Http { status, url }) => {
                assert_eq!(status, 503);
                assert!(url.ends_with("/api/navigation"));
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    /// Read one request, returning its head once the body has arrived
    async fn read_request_head(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&buf).into_owned();
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(end) = text.find("\r\n\r\n") {
                let head = &text[..end];
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return head.to_string();
                }
            }
        }
    }

    #[derive(Debug, Clone)]
    struct CapturedEvent {
        level: Level,
        target: String,
        fields: HashMap<String, String>,
    }

    /// Collects tracing events emitted while installed
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<CapturedEvent>>>);

    impl LogCapture {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        fn at(&self, level: Level) -> Vec<CapturedEvent> {
            self.0
                .lock()
                .iter()
                .filter(|e| e.level == level)
                .cloned()
                .collect()
        }
    }

    impl<S: Subscriber> Layer<S> for LogCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = FieldMap::default();
            event.record(&mut fields);
            let meta = event.metadata();
            self.0.lock().push(CapturedEvent {
                level: *meta.level(),
                target: meta.target().to_string(),
                fields: fields.0,
            });
        }
    }

    #[derive(Default)]
    struct FieldMap(HashMap<String, String>);

    impl Visit for FieldMap {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{:?}", value));
        }
    }

    #[test]
    fn test_dispatch_without_runtime_drops() {
        let memory = Arc::new(MemoryTransport::new());
        let dispatcher = Dispatcher::new(memory, &TrackerConfig::default());
        let (navigation, _) = records();
        assert!(dispatcher.dispatch(&navigation).is_none());
    }
}
