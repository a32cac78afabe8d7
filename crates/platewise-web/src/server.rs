//! [`WebServer`] – HTTP + WebSocket front end for the recommender.
//!
//! Listens on `0.0.0.0:8080` (configurable via [`WebServer::with_port`]).
//!
//! * Regular HTTP requests → 200 OK with the embedded single-page UI.
//! * WebSocket upgrades → JSON request/reply channel to the shared
//!   [`Orchestrator`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use platewise_runtime::Orchestrator;
use platewise_types::{Constraint, Dish, Fallback, Feedback, PlateError, Signal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Default TCP port for the web UI.
pub const DEFAULT_PORT: u16 = 8080;

/// User id applied to messages that do not name one.
pub const DEFAULT_USER: &str = "guest";

/// The compiled-in single-page application (HTML + CSS + JS).
const WEB_HTML: &str = include_str!("web.html");

/// The orchestrator as shared between connections.
pub type SharedOrchestrator = Arc<Mutex<Orchestrator>>;

// ─────────────────────────────────────────────────────────────────────────────
// WebServer
// ─────────────────────────────────────────────────────────────────────────────

/// Serves the web UI and answers its WebSocket requests.
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo(orchestrator: platewise_runtime::Orchestrator) -> Result<(), platewise_types::PlateError> {
/// use platewise_web::WebServer;
///
/// WebServer::new(orchestrator).with_port(8090).run().await
/// # }
/// ```
pub struct WebServer {
    orchestrator: SharedOrchestrator,
    port: u16,
    default_user: String,
}

impl WebServer {
    /// Create a server around `orchestrator` on the [`DEFAULT_PORT`].
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self::shared(Arc::new(Mutex::new(orchestrator)))
    }

    /// Create a server around an orchestrator that other code also uses.
    pub fn shared(orchestrator: SharedOrchestrator) -> Self {
        Self {
            orchestrator,
            port: DEFAULT_PORT,
            default_user: DEFAULT_USER.to_string(),
        }
    }

    /// Override the listening port (builder-style).  Port `0` picks a free one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// User id for messages that carry none.
    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = user.into();
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listener without serving yet.
    ///
    /// # Errors
    ///
    /// [`PlateError::Initialization`] if the port cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, PlateError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PlateError::Initialization(format!("cannot bind web UI on {addr}: {e}")))?;
        Ok(BoundServer {
            listener,
            orchestrator: self.orchestrator,
            default_user: Arc::from(self.default_user),
        })
    }

    /// Bind and serve until the task is dropped.
    pub async fn run(self) -> Result<(), PlateError> {
        self.bind().await?.serve().await
    }
}

/// A [`WebServer`] whose listener is bound.
pub struct BoundServer {
    listener: TcpListener,
    orchestrator: SharedOrchestrator,
    default_user: Arc<str>,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr, PlateError> {
        self.listener
            .local_addr()
            .map_err(|e| PlateError::Initialization(format!("listener address: {e}")))
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self) -> Result<(), PlateError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!(port = addr.port(), "web UI listening on http://localhost:{}", addr.port());
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let user = Arc::clone(&self.default_user);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, orchestrator, user).await {
                            warn!(%peer, error = %e, "client connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-connection handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    orchestrator: SharedOrchestrator,
    default_user: Arc<str>,
) -> Result<(), PlateError> {
    // `peek` leaves the request in the socket for the WebSocket handshake.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| PlateError::ExternalService(format!("peek error from {peer}: {e}")))?;

    let head = String::from_utf8_lossy(&buf[..n]).to_lowercase();
    let is_ws_upgrade = head
        .lines()
        .any(|line| line.starts_with("upgrade:") && line.contains("websocket"));

    if is_ws_upgrade {
        handle_ws(stream, peer, orchestrator, &default_user).await
    } else {
        serve_html(stream).await
    }
}

async fn serve_html(mut stream: TcpStream) -> Result<(), PlateError> {
    // Drain the peeked request so closing the socket does not reset it.
    let mut request = [0u8; 1024];
    let _ = stream.read(&mut request).await;
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {WEB_HTML}",
        WEB_HTML.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| PlateError::ExternalService(format!("HTTP write error: {e}")))
}

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    orchestrator: SharedOrchestrator,
    default_user: &str,
) -> Result<(), PlateError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| PlateError::ExternalService(format!("WS handshake from {peer}: {e}")))?;
    debug!(%peer, "websocket connected");
    let (mut ws_tx, mut ws_rx) = ws.split();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let reply = dispatch(text.as_str(), &orchestrator, default_user).await;
                let json = serde_json::to_string(&reply)
                    .map_err(|e| PlateError::ExternalService(format!("reply encoding: {e}")))?;
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    debug!(%peer, "websocket closed");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Answer to one WebSocket request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub topic: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    fn ok(topic: &str, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                topic: topic.to_string(),
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self::error(topic, format!("reply encoding: {e}")),
        }
    }

    fn error(topic: &str, error: impl ToString) -> Self {
        Self {
            topic: topic.to_string(),
            ok: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    topic: String,
    #[serde(default)]
    msg: Value,
}

#[derive(Deserialize)]
struct RecommendMsg {
    user: Option<String>,
    query: String,
}

#[derive(Deserialize)]
struct FeedbackMsg {
    user: Option<String>,
    dish_id: String,
    signal: Signal,
    rating: Option<f32>,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize, Default)]
struct UserMsg {
    user: Option<String>,
}

/// A recommended dish with its details, for display.
#[derive(Serialize)]
struct ItemView<'a> {
    dish: &'a Dish,
    rationale: &'a str,
}

#[derive(Serialize)]
struct RecommendationView<'a> {
    items: Vec<ItemView<'a>>,
    rationale: &'a str,
    constraints: &'a [Constraint],
    fallbacks: &'a [Fallback],
}

fn parse_msg<T: for<'de> Deserialize<'de>>(topic: &str, msg: Value) -> Result<T, Reply> {
    serde_json::from_value(msg).map_err(|e| Reply::error(topic, format!("invalid message: {e}")))
}

fn user_or<'a>(user: &'a Option<String>, default_user: &'a str) -> &'a str {
    user.as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(default_user)
}

/// Handle one request text and build its reply.
///
/// | Topic | `msg` | Reply `data` |
/// |---|---|---|
/// | `/recommend` | `{user?, query}` | dishes with rationale, applied constraints, fallbacks |
/// | `/feedback` | `{user?, dish_id, signal, rating?, comment?}` | `{persisted}` |
/// | `/profile` | `{user?}` | memory record plus its summary |
/// | `/catalog` | – | catalog stats and every dish |
pub async fn dispatch(text: &str, orchestrator: &SharedOrchestrator, default_user: &str) -> Reply {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => return Reply::error("", format!("invalid JSON: {e}")),
    };
    let topic = envelope.topic.as_str();
    let result = match topic {
        "/recommend" => recommend(topic, envelope.msg, orchestrator, default_user).await,
        "/feedback" => feedback(topic, envelope.msg, orchestrator, default_user).await,
        "/profile" => profile(topic, envelope.msg, orchestrator, default_user).await,
        "/catalog" => {
            let orch = orchestrator.lock().await;
            let catalog = orch.catalog();
            Ok(Reply::ok(
                topic,
                serde_json::json!({ "stats": catalog.stats(), "dishes": catalog.all() }),
            ))
        }
        other => Err(Reply::error(other, format!("unknown topic `{other}`"))),
    };
    result.unwrap_or_else(|reply| reply)
}

async fn recommend(
    topic: &str,
    msg: Value,
    orchestrator: &SharedOrchestrator,
    default_user: &str,
) -> Result<Reply, Reply> {
    let req: RecommendMsg = parse_msg(topic, msg)?;
    if req.query.trim().is_empty() {
        return Err(Reply::error(topic, "query must not be empty"));
    }
    let user = user_or(&req.user, default_user);
    let mut orch = orchestrator.lock().await;
    let rec = orch.recommend(user, req.query.trim()).await;
    let catalog = orch.catalog();
    let view = RecommendationView {
        items: rec
            .items
            .iter()
            .filter_map(|item| {
                catalog.get(&item.dish_id).map(|dish| ItemView {
                    dish,
                    rationale: &item.rationale,
                })
            })
            .collect(),
        rationale: &rec.rationale,
        constraints: &rec.constraints,
        fallbacks: &rec.fallbacks,
    };
    Ok(Reply::ok(topic, view))
}

async fn feedback(
    topic: &str,
    msg: Value,
    orchestrator: &SharedOrchestrator,
    default_user: &str,
) -> Result<Reply, Reply> {
    let req: FeedbackMsg = parse_msg(topic, msg)?;
    let user = user_or(&req.user, default_user);
    let mut fb = Feedback::new(req.signal).with_comment(req.comment);
    if let Some(rating) = req.rating {
        fb = fb.with_rating(rating);
    }
    let status = orchestrator
        .lock()
        .await
        .record_feedback(user, &req.dish_id, fb)
        .map_err(|e| Reply::error(topic, e))?;
    Ok(Reply::ok(
        topic,
        serde_json::json!({ "persisted": status.is_saved() }),
    ))
}

async fn profile(
    topic: &str,
    msg: Value,
    orchestrator: &SharedOrchestrator,
    default_user: &str,
) -> Result<Reply, Reply> {
    let req: UserMsg = if msg.is_null() {
        UserMsg::default()
    } else {
        parse_msg(topic, msg)?
    };
    let user = user_or(&req.user, default_user);
    let record = orchestrator.lock().await.profile(user);
    Ok(Reply::ok(
        topic,
        serde_json::json!({ "summary": record.summary(), "record": record }),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use platewise_catalog::default_catalog;
    use platewise_memory::MemoryStore;
    use platewise_runtime::{Ranking, ScriptedReasoner};
    use platewise_types::RecommendationItem;

    fn shared(reasoner: ScriptedReasoner) -> SharedOrchestrator {
        Arc::new(Mutex::new(Orchestrator::new(
            default_catalog().unwrap(),
            MemoryStore::session_only(),
            Box::new(reasoner),
        )))
    }

    fn picks(ids: &[&str]) -> Ranking {
        Ranking {
            picks: ids
                .iter()
                .map(|id| RecommendationItem {
                    dish_id: id.to_string(),
                    rationale: "fits".into(),
                })
                .collect(),
            summary: "Tonight's picks".into(),
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn default_port_is_8080() {
        let server = WebServer::shared(shared(ScriptedReasoner::new()));
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.with_port(9999).port(), 9999);
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn recommend_returns_dish_details() {
        let orch = shared(ScriptedReasoner::new().then_rank(picks(&["D004", "D018"])));
        let reply = dispatch(
            r#"{"topic":"/recommend","msg":{"user":"ann","query":"rich and aromatic"}}"#,
            &orch,
            DEFAULT_USER,
        )
        .await;
        assert!(reply.ok, "{reply:?}");
        let data = reply.data.unwrap();
        assert_eq!(data["items"][0]["dish"]["name"], "Chicken Biryani");
        assert_eq!(data["items"][0]["rationale"], "fits");
        assert_eq!(data["rationale"], "Tonight's picks");
        assert_eq!(data["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn feedback_after_recommend_succeeds() {
        let orch = shared(ScriptedReasoner::new().then_rank(picks(&["D006"])));
        dispatch(r#"{"topic":"/recommend","msg":{"query":"dosa"}}"#, &orch, "bo").await;
        let reply = dispatch(
            r#"{"topic":"/feedback","msg":{"dish_id":"D006","signal":"like","rating":5}}"#,
            &orch,
            "bo",
        )
        .await;
        assert!(reply.ok, "{reply:?}");
        // Session-only store in tests.
        assert_eq!(reply.data.unwrap()["persisted"], false);

        let profile = dispatch(r#"{"topic":"/profile"}"#, &orch, "bo").await;
        let data = profile.data.unwrap();
        assert_eq!(data["record"]["permanent"]["cuisine_affinity"]["South Indian"], 1);
        assert!(data["summary"].as_str().unwrap().contains("Masala Dosa"));
    }

    #[tokio::test]
    async fn feedback_on_unshown_dish_is_an_error_reply() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch(
            r#"{"topic":"/feedback","msg":{"dish_id":"D001","signal":"dislike"}}"#,
            &orch,
            DEFAULT_USER,
        )
        .await;
        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("D001"));
    }

    #[tokio::test]
    async fn catalog_topic_lists_dishes() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch(r#"{"topic":"/catalog"}"#, &orch, DEFAULT_USER).await;
        let data = reply.data.unwrap();
        assert_eq!(data["stats"]["total"], 20);
        assert_eq!(data["dishes"].as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch(r#"{"topic":"/recommend","msg":{"query":"  "}}"#, &orch, "x").await;
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn unknown_topic_gets_error_reply() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch(r#"{"topic":"/order","msg":{}}"#, &orch, "x").await;
        assert_eq!(reply.topic, "/order");
        assert!(!reply.ok);
        assert!(reply.error.unwrap().contains("unknown topic"));
    }

    #[tokio::test]
    async fn invalid_json_gets_error_reply() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch("not json at all", &orch, "x").await;
        assert!(!reply.ok);
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn malformed_feedback_signal_is_rejected() {
        let orch = shared(ScriptedReasoner::new());
        let reply = dispatch(
            r#"{"topic":"/feedback","msg":{"dish_id":"D001","signal":"meh"}}"#,
            &orch,
            "x",
        )
        .await;
        assert!(reply.error.unwrap().starts_with("invalid message"));
    }

    // ── Over the wire ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn serves_html_and_websocket() {
        let bound = WebServer::shared(shared(ScriptedReasoner::new()))
            .with_port(0)
            .bind()
            .await
            .unwrap();
        let port = bound.local_addr().unwrap().port();
        let server = tokio::spawn(bound.serve());

        let mut http = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        http.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        let mut page = String::new();
        http.read_to_string(&mut page).await.unwrap();
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert!(page.contains("<title>Platewise</title>"));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"topic":"/catalog"}"#.into())).await.unwrap();
        let reply = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(t) => break t,
                _ => continue,
            }
        };
        let json: Value = serde_json::from_str(reply.as_str()).unwrap();
        assert_eq!(json["topic"], "/catalog");
        assert_eq!(json["ok"], true);

        server.abort();
    }

    // ── HTML embedding ────────────────────────────────────────────────────────

    #[test]
    fn web_html_contains_websocket_client() {
        assert!(WEB_HTML.contains("new WebSocket"));
        assert!(WEB_HTML.contains("/recommend"));
        assert!(WEB_HTML.contains("/feedback"));
    }
}
