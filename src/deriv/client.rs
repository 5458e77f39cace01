// =============================================================================
// Deriv WebSocket API client
// =============================================================================
//
// One socket per client. Three background tasks share it:
//   - writer:    drains an unbounded channel of outbound frames into the sink.
//   - reader:    parses inbound frames and hands them to the router.
//   - heartbeat: sends `{"ping": 1}` every 30 s while the socket is open.
//
// SECURITY: the API token is never logged.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use super::router::{subscription_id, Envelope, Router, StreamSink, STREAM_BUFFER};
use crate::runtime_config::DerivConfig;
use crate::types::{ActiveSymbol, Balance, Proposal, ProposalRequest, Tick, TicksHistory, TicksHistoryRequest};

/// Interval between keep-alive pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// How long a request waits for its reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// How long `disconnect` waits for the writer to flush the Close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v3 WebSocket URL for `endpoint` and `app_id`.
pub fn build_url(endpoint: &str, app_id: u32) -> String {
    format!("wss://{endpoint}/websockets/v3?app_id={app_id}")
}

/// Merge `req_id` into a request object.
fn with_req_id(mut payload: Value, req_id: u64) -> Result<Value> {
    payload
        .as_object_mut()
        .context("Deriv request must be a JSON object")?
        .insert("req_id".to_string(), json!(req_id));
    Ok(payload)
}

/// Serialize `request` and merge extra top-level keys into it.
fn merge<T: Serialize>(request: &T, extra: Value) -> Result<Value> {
    let mut payload = serde_json::to_value(request).context("failed to serialise Deriv request")?;
    let object = payload
        .as_object_mut()
        .context("Deriv request must serialise to a JSON object")?;
    if let Value::Object(extra) = extra {
        object.extend(extra);
    }
    Ok(payload)
}

/// Extract and deserialize `body[key]`.
fn field<T: serde::de::DeserializeOwned>(body: &Value, key: &str) -> Result<T> {
    let value = body
        .get(key)
        .with_context(|| format!("Deriv response missing field {key}"))?;
    serde_json::from_value(value.clone()).with_context(|| format!("failed to parse Deriv field {key}"))
}

/// Async client for the Deriv WebSocket API v3.
pub struct DerivClient {
    token: String,
    router: Arc<Router>,
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DerivClient {
    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    /// Open the socket and start the writer, reader and heartbeat tasks.
    /// Call [`authorize`](Self::authorize) before account-level requests.
    pub async fn connect(config: &DerivConfig) -> Result<Self> {
        let url = build_url(&config.endpoint, config.app_id);
        info!(url = %url, "connecting to Deriv WebSocket");

        let (ws_stream, _response) = connect_async(&url)
            .await
            .context("failed to connect to Deriv WebSocket")?;
        info!(app_id = config.app_id, "Deriv WebSocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let router = Arc::new(Router::default());
        let connected = Arc::new(AtomicBool::new(true));

        // ── Writer ───────────────────────────────────────────────────────
        let writer = {
            let connected = connected.clone();
            tokio::spawn(async move {
                while let Some(msg) = outbound_rx.recv().await {
                    let closing = matches!(msg, Message::Close(_));
                    if let Err(e) = write.send(msg).await {
                        warn!(error = %e, "Deriv WebSocket write failed");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                connected.store(false, Ordering::Relaxed);
            })
        };

        // ── Reader ───────────────────────────────────────────────────────
        let reader = {
            let router = router.clone();
            let connected = connected.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                loop {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => match Envelope::parse(&text) {
                            Ok(envelope) => {
                                if let Some(sub_id) = router.dispatch(envelope) {
                                    debug!(subscription = %sub_id, "forgetting finished subscription");
                                    let forget = json!({ "forget": sub_id }).to_string();
                                    let _ = outbound.send(Message::Text(forget));
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to parse Deriv message"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "Deriv WebSocket closed by server");
                            break;
                        }
                        // tungstenite answers pings itself.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "Deriv WebSocket read error");
                            break;
                        }
                        None => {
                            warn!("Deriv WebSocket stream ended");
                            break;
                        }
                    }
                }
                connected.store(false, Ordering::Relaxed);
                router.close_all();
            })
        };

        // ── Heartbeat ────────────────────────────────────────────────────
        let heartbeat = {
            let connected = connected.clone();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
                // The first tick fires immediately.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if !connected.load(Ordering::Relaxed) {
                        break;
                    }
                    let ping = json!({ "ping": 1 }).to_string();
                    if outbound.send(Message::Text(ping)).is_err() {
                        break;
                    }
                    debug!("Deriv heartbeat sent");
                }
                debug!("Deriv heartbeat stopped");
            })
        };

        Ok(Self {
            token: config.token.clone(),
            router,
            outbound,
            connected,
            writer: Some(writer),
            tasks: vec![reader, heartbeat],
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Send a Close frame and stop the background tasks.
    pub async fn disconnect(mut self) {
        let _ = self.outbound.send(Message::Close(None));
        // The writer exits after sending Close.
        if let Some(writer) = self.writer.as_mut() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!(timeout = ?CLOSE_TIMEOUT, "Deriv writer did not flush Close in time");
            }
        }
        self.shutdown();
        info!("Deriv client disconnected");
    }

    fn shutdown(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        for task in self.writer.take().into_iter().chain(self.tasks.drain(..)) {
            task.abort();
        }
        self.router.close_all();
    }

    // -------------------------------------------------------------------------
    // Request plumbing
    // -------------------------------------------------------------------------

    /// Send `payload` with a fresh `req_id` and wait for the matching reply.
    pub async fn request(&self, payload: Value) -> Result<Value> {
        let req_id = self.router.next_req_id();
        self.send_with_id(payload, req_id).await
    }

    async fn send_with_id(&self, payload: Value, req_id: u64) -> Result<Value> {
        if !self.is_connected() {
            anyhow::bail!("Deriv connection is closed");
        }
        let payload = with_req_id(payload, req_id)?;
        let reply = self.router.expect_reply(req_id);

        if self.outbound.send(Message::Text(payload.to_string())).is_err() {
            self.router.cancel_reply(req_id);
            anyhow::bail!("Deriv connection is closed");
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, reply).await {
            Ok(Ok(body)) => Ok(body?),
            Ok(Err(_)) => anyhow::bail!("Deriv connection closed before reply to req_id {req_id}"),
            Err(_) => {
                self.router.cancel_reply(req_id);
                anyhow::bail!("Deriv request {req_id} timed out after {REQUEST_TIMEOUT:?}")
            }
        }
    }

    /// Register `sink`, send the subscribe request, and return its first
    /// reply. The sink is removed again if the request fails.
    async fn subscribe(&self, payload: Value, sink: StreamSink) -> Result<Value> {
        let req_id = self.router.next_req_id();
        self.router.add_stream(req_id, sink);
        match self.send_with_id(payload, req_id).await {
            Ok(body) => Ok(body),
            Err(e) => {
                let already = e
                    .downcast_ref::<super::DerivApiError>()
                    .is_some_and(super::DerivApiError::is_already_subscribed);
                if already {
                    // Keep the sink: it stays the fallback for the existing
                    // server-side stream.
                    warn!(req_id, "already subscribed, reusing existing stream");
                    Ok(json!({ "subscription": { "id": "existing" } }))
                } else {
                    self.router.remove_stream(req_id);
                    Err(e)
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Account
    // -------------------------------------------------------------------------

    /// Authorize the connection with the configured API token.
    #[instrument(skip(self), name = "deriv::authorize")]
    pub async fn authorize(&self) -> Result<()> {
        let body = self
            .request(json!({ "authorize": self.token }))
            .await
            .context("Deriv authorization failed")?;
        let loginid = body["authorize"]["loginid"].as_str().unwrap_or("unknown");
        info!(loginid, "Deriv authorized");
        Ok(())
    }

    #[instrument(skip(self), name = "deriv::balance")]
    pub async fn balance(&self) -> Result<Balance> {
        let body = self.request(json!({ "balance": 1 })).await?;
        field(&body, "balance")
    }

    #[instrument(skip(self), name = "deriv::account_status")]
    pub async fn account_status(&self) -> Result<Value> {
        let body = self.request(json!({ "get_account_status": 1 })).await?;
        field(&body, "get_account_status")
    }

    // -------------------------------------------------------------------------
    // Market data
    // -------------------------------------------------------------------------

    #[instrument(skip(self, request), fields(symbol = %request.ticks_history), name = "deriv::ticks_history")]
    pub async fn ticks_history(&self, request: TicksHistoryRequest) -> Result<TicksHistory> {
        let payload = serde_json::to_value(&request).context("failed to serialise ticks_history")?;
        let body = self.request(payload).await?;
        let history: TicksHistory =
            serde_json::from_value(body).context("failed to parse ticks_history response")?;
        debug!(samples = history.prices().len(), "history received");
        Ok(history)
    }

    /// The most recent `count` candles of `granularity` seconds.
    pub async fn candles(&self, symbol: &str, granularity: u32, count: u32) -> Result<TicksHistory> {
        self.ticks_history(TicksHistoryRequest::candles(symbol, granularity, count))
            .await
    }

    /// Subscribe to live ticks for `symbol`.
    ///
    /// Only one tick subscription is tracked at a time: any earlier tick
    /// receiver stops receiving when this is called.
    #[instrument(skip(self), name = "deriv::subscribe_ticks")]
    pub async fn subscribe_ticks(&self, symbol: &str) -> Result<mpsc::Receiver<Tick>> {
        self.router.remove_streams_of("tick");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let first_tx = tx.clone();
        let sink = StreamSink::Ticks {
            symbol: symbol.to_string(),
            tx,
        };
        let body = self
            .subscribe(json!({ "ticks": symbol, "subscribe": 1 }), sink)
            .await?;

        if let Some(tick) = body.get("tick") {
            match serde_json::from_value::<Tick>(tick.clone()) {
                Ok(tick) => {
                    let _ = first_tx.try_send(tick);
                }
                Err(e) => warn!(error = %e, "failed to parse first tick"),
            }
        }
        info!(symbol, subscription = ?subscription_id(&body), "tick subscription active");
        Ok(rx)
    }

    /// Forget every tick stream. Failures are logged, not returned.
    #[instrument(skip(self), name = "deriv::unsubscribe_all_ticks")]
    pub async fn unsubscribe_all_ticks(&self) {
        self.router.remove_streams_of("tick");
        if let Err(e) = self.request(json!({ "forget_all": "ticks" })).await {
            warn!(error = %e, "forget_all ticks failed");
        }
    }

    /// Tradable symbols. Failures yield an empty list.
    #[instrument(skip(self), name = "deriv::active_symbols")]
    pub async fn active_symbols(&self, product_type: &str) -> Vec<ActiveSymbol> {
        let result = self
            .request(json!({ "active_symbols": "brief", "product_type": product_type }))
            .await
            .and_then(|body| field::<Vec<ActiveSymbol>>(&body, "active_symbols"));
        match result {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "active_symbols failed, returning empty list");
                Vec::new()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Contracts
    // -------------------------------------------------------------------------

    /// One-off price proposal.
    #[instrument(skip(self, request), fields(contract_type = %request.contract_type), name = "deriv::proposal")]
    pub async fn proposal(&self, request: &ProposalRequest) -> Result<Proposal> {
        let body = self.request(merge(request, json!({ "proposal": 1 }))?).await?;
        field(&body, "proposal")
    }

    /// Streaming price proposals. The first proposal is delivered on the
    /// returned channel together with every later update.
    #[instrument(skip(self, request), fields(contract_type = %request.contract_type), name = "deriv::subscribe_proposal")]
    pub async fn subscribe_proposal(&self, request: &ProposalRequest) -> Result<mpsc::Receiver<Proposal>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let first_tx = tx.clone();
        let payload = merge(request, json!({ "proposal": 1, "subscribe": 1 }))?;
        let body = self.subscribe(payload, StreamSink::Proposals(tx)).await?;
        if body.get("proposal").is_some() {
            let _ = first_tx.try_send(field(&body, "proposal")?);
        }
        Ok(rx)
    }

    /// Buy a contract. `parameters` is the full `buy` request object.
    #[instrument(skip(self, parameters), name = "deriv::buy")]
    pub async fn buy(&self, parameters: Value) -> Result<Value> {
        let body = self.request(parameters).await?;
        info!(contract_id = ?body["buy"]["contract_id"], "contract bought");
        Ok(body)
    }

    /// Sell a contract at market (`price: 0`).
    #[instrument(skip(self), name = "deriv::sell")]
    pub async fn sell(&self, contract_id: u64) -> Result<Value> {
        let body = self.request(json!({ "sell": contract_id, "price": 0 })).await?;
        info!(contract_id, "contract sold");
        Ok(body)
    }

    /// Stream updates for an open contract. The subscription is forgotten
    /// automatically once the contract is sold.
    #[instrument(skip(self), name = "deriv::subscribe_open_contract")]
    pub async fn subscribe_open_contract(&self, contract_id: u64) -> Result<mpsc::Receiver<Value>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let first_tx = tx.clone();
        let sink = StreamSink::OpenContract { contract_id, tx };
        let body = self
            .subscribe(
                json!({ "proposal_open_contract": 1, "contract_id": contract_id, "subscribe": 1 }),
                sink,
            )
            .await?;
        if let Some(poc) = body.get("proposal_open_contract") {
            let _ = first_tx.try_send(poc.clone());
        }
        Ok(rx)
    }

    /// Current state of a contract (no subscription).
    #[instrument(skip(self), name = "deriv::contract_status")]
    pub async fn contract_status(&self, contract_id: u64) -> Result<Value> {
        let body = self
            .request(json!({ "proposal_open_contract": 1, "contract_id": contract_id }))
            .await?;
        field(&body, "proposal_open_contract")
    }

    #[instrument(skip(self), name = "deriv::contract_update_history")]
    pub async fn contract_update_history(&self, contract_id: u64) -> Result<Value> {
        self.request(json!({ "contract_update_history": 1, "contract_id": contract_id }))
            .await
    }
}

impl Drop for DerivClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
