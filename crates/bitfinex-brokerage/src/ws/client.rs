/*
[INPUT]:  WebSocket URL, credentials and the pairs the engine wants streamed
[OUTPUT]: Ticks, fill events and wallet events dispatched from the wire
[POS]:    WebSocket layer - session lifecycle and frame dispatch
[UPDATE]: When adding new channels or changing connection logic
*/

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashSet;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::auth::NonceGenerator;
use crate::config::{BrokerageConfig, InfoCodes};
use crate::http::{BitfinexError, RequestSigner, Result};
use crate::ledger::OrderLedger;
use crate::mapping::{ScaleFactor, SymbolMapper};
use crate::ticks::{LastPrices, PendingTicks};
use crate::types::{AccountEvent, BrokerageEvent, Tick, TickKind, TradingPair};
use crate::ws::channels::{ChannelBinding, ChannelKind, ChannelTable};
use crate::ws::message::{
    InboundFrame, PublicTrade, ServerEvent, TickerSnapshot, parse_execution, parse_frame,
    parse_wallets,
};

const OUTBOUND_BUFFER: usize = 100;
const SUBSCRIPTION_LOG_LIMIT: usize = 10;
const OTHER_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const UNBOUND_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static SUBSCRIBE_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static OTHER_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static UNBOUND_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reaction to an exchange control event, run off the receive path
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    Reconnect,
    /// Unsubscribe the withdrawn channels, then subscribe every wanted pair again
    Resubscribe(Vec<ChannelBinding>),
    /// Drop a channel acked for a pair that is no longer wanted
    Unsubscribe(i64),
}

/// Per-connection settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ws_url: String,
    pub subscribe_trades: bool,
    pub info_codes: InfoCodes,
    pub scale: ScaleFactor,
    /// Wallet whose balance changes are reported
    pub wallet: &'static str,
    /// Account channel is authenticated only when set
    pub signer: Option<RequestSigner>,
}

impl SessionConfig {
    pub fn from_config(config: &BrokerageConfig) -> Result<Self> {
        Ok(Self {
            ws_url: config.ws_url.clone(),
            subscribe_trades: config.subscribe_trades,
            info_codes: config.info_codes,
            scale: config.scale()?,
            wallet: config.account_type.wallet(),
            signer: Some(RequestSigner::new(&config.credentials()?)),
        })
    }
}

#[derive(Debug)]
struct SessionShared {
    config: SessionConfig,
    nonces: Arc<NonceGenerator>,
    channels: ChannelTable,
    ledger: Arc<OrderLedger>,
    ticks: Arc<PendingTicks>,
    prices: Arc<LastPrices>,
    events: mpsc::UnboundedSender<BrokerageEvent>,
    /// Pairs the engine wants, keyed by raw pair; replayed on every (re)connect
    wanted: Mutex<BTreeMap<String, &'static TradingPair>>,
    /// Pairs dropped by the caller; acks still in flight for them are released
    released: DashSet<String>,
    outbound_tx: Mutex<Option<mpsc::Sender<WsMessage>>>,
    /// Bumped whenever a socket is opened or deliberately closed
    generation: AtomicU64,
    state: watch::Sender<ConnectionState>,
    lifecycle: Mutex<()>,
}

/// Streaming session; clones share one connection
#[derive(Debug, Clone)]
pub struct WebSocketSession {
    shared: Arc<SessionShared>,
}

impl WebSocketSession {
    pub fn new(
        config: SessionConfig,
        nonces: Arc<NonceGenerator>,
        ledger: Arc<OrderLedger>,
        ticks: Arc<PendingTicks>,
        prices: Arc<LastPrices>,
        events: mpsc::UnboundedSender<BrokerageEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(SessionShared {
                config,
                nonces,
                channels: ChannelTable::new(),
                ledger,
                ticks,
                prices,
                events,
                wanted: Mutex::new(BTreeMap::new()),
                released: DashSet::new(),
                outbound_tx: Mutex::new(None),
                generation: AtomicU64::new(0),
                state,
                lifecycle: Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.shared.channels
    }

    /// Raw pairs currently wanted, sorted
    pub async fn wanted_pairs(&self) -> Vec<String> {
        self.shared.wanted.lock().await.keys().cloned().collect()
    }

    /// Open the socket, authenticate and replay wanted subscriptions.
    ///
    /// A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.open_locked().await
    }

    /// Close the socket; always ends Disconnected
    pub async fn disconnect(&self) {
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.close_socket().await;
        self.set_state(ConnectionState::Disconnected);
        info!("ws disconnected");
    }

    /// Close and reopen, replaying wanted subscriptions on the new socket
    pub async fn reconnect(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.reopen_locked().await
    }

    /// Add pairs to the wanted set and subscribe them when connected.
    ///
    /// While connecting or reconnecting the pairs join the pending replay.
    pub async fn subscribe(&self, pairs: &[&'static TradingPair]) -> Result<()> {
        let mut wanted = self.shared.wanted.lock().await;
        let state = self.state();
        if state == ConnectionState::Disconnected {
            return Err(BitfinexError::NotConnected);
        }

        let added: Vec<&'static TradingPair> = pairs
            .iter()
            .copied()
            .filter(|pair| wanted.insert(pair.raw.clone(), *pair).is_none())
            .collect();
        for pair in &added {
            self.shared.released.remove(&pair.raw);
        }

        if state == ConnectionState::Connected {
            for pair in added {
                self.send_subscribe(pair).await?;
            }
        }
        Ok(())
    }

    /// Drop pairs from the wanted set; bindings go when the exchange acks.
    ///
    /// A subscription still waiting for its ack is dropped when the ack lands.
    pub async fn unsubscribe(&self, pairs: &[&'static TradingPair]) -> Result<()> {
        let mut wanted = self.shared.wanted.lock().await;
        let connected = self.is_connected();

        for pair in pairs {
            if wanted.remove(&pair.raw).is_none() {
                continue;
            }
            self.shared.released.insert(pair.raw.clone());
            if connected {
                for binding in self.shared.channels.channels_for(pair) {
                    self.send_json(unsubscribe_message(binding.chan_id)).await?;
                }
            }
        }
        Ok(())
    }

    /// Dispatch one inbound text frame.
    ///
    /// Returns the control reaction the frame asks for, if any; channel
    /// bindings it invalidates are already withdrawn when this returns.
    pub fn handle_text(&self, text: &str) -> Option<ControlAction> {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                log_parse_fail_once(&err, text);
                return None;
            }
        };

        match frame {
            InboundFrame::Event(event) => self.handle_event(event),
            InboundFrame::Heartbeat { .. } => None,
            InboundFrame::Account { tag, payload } => {
                self.handle_account(&tag, &payload);
                None
            }
            InboundFrame::Channel { chan_id, fields } => {
                self.handle_channel(chan_id, &fields);
                None
            }
        }
    }

    fn handle_event(&self, event: ServerEvent) -> Option<ControlAction> {
        let codes = self.shared.config.info_codes;
        match event {
            ServerEvent::Info {
                code: Some(code), ..
            } if code == codes.hard_reset => {
                warn!(code, "exchange requested reconnect");
                self.shared.channels.clear();
                self.shared.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connected {
                        *state = ConnectionState::Reconnecting;
                        true
                    } else {
                        false
                    }
                });
                Some(ControlAction::Reconnect)
            }
            ServerEvent::Info {
                code: Some(code), ..
            } if code == codes.resubscribe => {
                let stale = self.shared.channels.invalidate();
                info!(code, channels = stale.len(), "exchange requested resubscribe");
                Some(ControlAction::Resubscribe(stale))
            }
            ServerEvent::Info { code, msg, version } => {
                info!(?code, ?version, msg = msg.as_deref().unwrap_or_default(), "ws info");
                None
            }
            ServerEvent::Subscribed {
                channel,
                chan_id,
                pair,
            } => {
                let Some(kind) = ChannelKind::parse(&channel) else {
                    debug!(channel = %channel, chan_id, "ack for unhandled channel");
                    return None;
                };
                let raw = pair.unwrap_or_default();
                let Some(pair) = SymbolMapper.pair_for_raw(&raw) else {
                    warn!(pair = %raw, chan_id, "ack for unknown pair");
                    return None;
                };
                if self.shared.released.contains(&pair.raw) {
                    debug!(chan_id, pair = %pair.raw, "ack for unwanted pair, unsubscribing");
                    return Some(ControlAction::Unsubscribe(chan_id));
                }
                if let Some(previous) = self.shared.channels.bind(chan_id, pair, kind) {
                    debug!(chan_id, previous = %previous.pair.raw, "channel id rebound");
                }
                info!(chan_id, channel = kind.as_str(), pair = %pair.raw, "ws channel subscribed");
                None
            }
            ServerEvent::Unsubscribed { chan_id, status } => {
                let removed = self.shared.channels.unbind(chan_id);
                debug!(
                    chan_id,
                    status = status.as_deref().unwrap_or_default(),
                    removed = removed.is_some(),
                    "ws channel unsubscribed"
                );
                None
            }
            ServerEvent::Auth { status, code, msg } => {
                if status.as_deref() == Some("OK") {
                    info!("ws authenticated");
                } else {
                    warn!(?status, ?code, msg = msg.as_deref().unwrap_or_default(), "ws authentication failed");
                }
                None
            }
            ServerEvent::Error { msg, code } => {
                warn!(?code, msg = msg.as_deref().unwrap_or_default(), "ws error event");
                None
            }
            ServerEvent::Other => {
                log_other_message_once("event");
                None
            }
        }
    }

    fn handle_channel(&self, chan_id: i64, fields: &[Value]) {
        let Some(binding) = self.shared.channels.resolve(chan_id) else {
            log_unbound_once(chan_id);
            return;
        };
        let scale = self.shared.config.scale;

        match binding.kind {
            ChannelKind::Ticker => {
                let snapshot = TickerSnapshot::from_fields(fields);
                let Some(value) = snapshot.mid().and_then(|mid| scale.from_exchange_price(mid)) else {
                    debug!(chan_id, "ticker without usable price");
                    return;
                };
                let price = |field: Option<Decimal>| {
                    field
                        .and_then(|raw| scale.from_exchange_price(raw))
                        .unwrap_or_default()
                };
                let size = |field: Option<Decimal>| {
                    field
                        .and_then(|raw| scale.from_exchange_quantity(raw))
                        .unwrap_or_default()
                };
                self.push_tick(Tick {
                    symbol: binding.pair.symbol.clone(),
                    time: Utc::now(),
                    kind: TickKind::Quote,
                    value,
                    bid_price: price(snapshot.bid),
                    ask_price: price(snapshot.ask),
                    bid_size: size(snapshot.bid_size),
                    ask_size: size(snapshot.ask_size),
                    quantity: Decimal::ZERO,
                });
            }
            ChannelKind::Trades => {
                let Some(trade) = PublicTrade::from_fields(fields) else {
                    return;
                };
                if trade.update {
                    return;
                }
                let (Some(price), Some(quantity)) = (
                    scale.from_exchange_price(trade.price),
                    scale.from_exchange_quantity(trade.amount.abs()),
                ) else {
                    debug!(chan_id, "trade out of range dropped");
                    return;
                };
                self.push_tick(Tick::trade(binding.pair.symbol.clone(), trade.time, price, quantity));
            }
        }
    }

    fn handle_account(&self, tag: &str, payload: &Value) {
        match tag {
            "te" | "tu" => {
                let Some(execution) = parse_execution(payload) else {
                    log_other_message_once(tag);
                    return;
                };

                let scale = self.shared.config.scale;
                if let Some(pair) = SymbolMapper.pair_for_raw(&execution.pair)
                    && let Some(price) = scale.from_exchange_price(execution.price)
                    && let Some(quantity) = scale.from_exchange_quantity(execution.amount.abs())
                {
                    self.push_tick(Tick::trade(pair.symbol.clone(), execution.time, price, quantity));
                }

                // `te` precedes the final `tu` for the same trade
                if tag == "tu"
                    && let Some(event) = self.shared.ledger.apply_execution(&execution)
                {
                    info!(
                        order_id = event.order_id,
                        broker_id = execution.broker_order_id,
                        fill_quantity = %event.fill_quantity,
                        fill_price = %event.fill_price,
                        status = ?event.status,
                        "order fill"
                    );
                    self.emit(BrokerageEvent::OrderStatusChanged(event));
                }
            }
            "ws" | "wu" => {
                for wallet in parse_wallets(payload) {
                    if wallet.wallet == self.shared.config.wallet {
                        self.emit(BrokerageEvent::AccountChanged(AccountEvent {
                            currency: wallet.currency,
                            balance: wallet.balance,
                        }));
                    }
                }
            }
            _ => debug!(tag, "account message ignored"),
        }
    }

    fn push_tick(&self, tick: Tick) {
        self.shared.prices.update(&tick);
        self.shared.ticks.push(tick);
    }

    fn emit(&self, event: BrokerageEvent) {
        if self.shared.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    async fn open_locked(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let opened = async {
            self.open_socket().await?;
            self.authenticate().await?;
            self.replay_subscriptions().await
        }
        .await;

        if let Err(err) = opened {
            warn!(url = %self.shared.config.ws_url, error = %err, "ws connect failed");
            self.close_socket().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(err);
        }
        Ok(())
    }

    async fn reopen_locked(&self) -> Result<()> {
        self.set_state(ConnectionState::Reconnecting);
        self.close_socket().await;
        self.open_locked().await
    }

    async fn open_socket(&self) -> Result<()> {
        let (ws_stream, _response) = connect_async(self.shared.config.ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        let generation = {
            let mut guard = self.shared.outbound_tx.lock().await;
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *guard = Some(outbound_tx);
            generation
        };
        self.shared.channels.clear();
        self.shared.released.clear();

        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(message) => {
                                if write.send(message).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = read.next() => {
                        let text = match incoming {
                            Some(Ok(WsMessage::Text(text))) => text.to_string(),
                            Some(Ok(WsMessage::Binary(bytes))) => {
                                match String::from_utf8(bytes.to_vec()) {
                                    Ok(text) => text,
                                    Err(_) => continue,
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(err)) => {
                                debug!(generation, error = %err, "ws read failed");
                                break;
                            }
                            None => break,
                        };
                        let Some(session) = upgrade(&shared) else {
                            break;
                        };
                        if let Some(action) = session.handle_text(&text) {
                            session.spawn_action(action, generation);
                        }
                    }
                }
            }

            if let Some(session) = upgrade(&shared) {
                session.on_socket_closed(generation).await;
            }
        });

        info!(url = %self.shared.config.ws_url, generation, "ws connected");
        Ok(())
    }

    async fn close_socket(&self) {
        let mut guard = self.shared.outbound_tx.lock().await;
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        guard.take();
        drop(guard);
        self.shared.channels.clear();
    }

    async fn on_socket_closed(&self, generation: u64) {
        let mut guard = self.shared.outbound_tx.lock().await;
        if self.shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        guard.take();
        drop(guard);
        self.shared.channels.clear();

        // a pending hard reset owns the next transition
        if self.state() != ConnectionState::Reconnecting {
            warn!(generation, "ws connection closed unexpectedly");
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn spawn_action(&self, action: ControlAction, generation: u64) {
        let session = self.clone();
        tokio::spawn(async move {
            session.run_action(action, generation).await;
        });
    }

    async fn run_action(&self, action: ControlAction, generation: u64) {
        let result = match action {
            ControlAction::Reconnect => {
                let _lifecycle = self.shared.lifecycle.lock().await;
                if self.is_current(generation) {
                    self.reopen_locked().await
                } else {
                    debug!(generation, "reconnect superseded");
                    Ok(())
                }
            }
            ControlAction::Resubscribe(stale) => self.resubscribe(stale, generation).await,
            ControlAction::Unsubscribe(chan_id) => {
                if self.is_current(generation) {
                    self.send_json(unsubscribe_message(chan_id)).await
                } else {
                    Ok(())
                }
            }
        };
        if let Err(err) = result {
            warn!(generation, error = %err, "ws control reaction failed");
        }
    }

    async fn resubscribe(&self, stale: Vec<ChannelBinding>, generation: u64) -> Result<()> {
        let wanted = self.shared.wanted.lock().await;
        if !self.is_current(generation) {
            debug!(generation, "resubscribe superseded by a new connection");
            return Ok(());
        }
        for binding in &stale {
            self.send_json(unsubscribe_message(binding.chan_id)).await?;
        }
        for pair in wanted.values() {
            self.send_subscribe(pair).await?;
        }
        info!(stale = stale.len(), pairs = wanted.len(), "ws resubscribed");
        Ok(())
    }

    async fn authenticate(&self) -> Result<()> {
        let Some(signer) = &self.shared.config.signer else {
            return Ok(());
        };
        self.send_json(signer.ws_auth_message(self.shared.nonces.next()))
            .await
    }

    async fn replay_subscriptions(&self) -> Result<()> {
        let wanted = self.shared.wanted.lock().await;
        let open = self.shared.outbound_tx.lock().await.is_some();
        if !open {
            return Err(BitfinexError::NotConnected);
        }
        self.set_state(ConnectionState::Connected);
        for pair in wanted.values() {
            self.send_subscribe(pair).await?;
        }
        Ok(())
    }

    async fn send_subscribe(&self, pair: &TradingPair) -> Result<()> {
        self.send_json(subscribe_message(ChannelKind::Ticker, pair))
            .await?;
        if self.shared.config.subscribe_trades {
            self.send_json(subscribe_message(ChannelKind::Trades, pair))
                .await?;
        }
        Ok(())
    }

    async fn send_json(&self, message: Value) -> Result<()> {
        let sender = {
            let guard = self.shared.outbound_tx.lock().await;
            guard.clone().ok_or(BitfinexError::NotConnected)?
        };

        sender
            .send(WsMessage::Text(message.to_string().into()))
            .await
            .map_err(|_| BitfinexError::WebSocket("send channel closed".to_string()))?;

        log_subscription_sent(&message);
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "ws state changed");
        }
    }
}

fn upgrade(shared: &Weak<SessionShared>) -> Option<WebSocketSession> {
    shared.upgrade().map(|shared| WebSocketSession { shared })
}

fn subscribe_message(kind: ChannelKind, pair: &TradingPair) -> Value {
    serde_json::json!({
        "event": "subscribe",
        "channel": kind.as_str(),
        "pair": pair.raw,
    })
}

fn unsubscribe_message(chan_id: i64) -> Value {
    serde_json::json!({
        "event": "unsubscribe",
        "chanId": chan_id,
    })
}

fn log_subscription_sent(message: &Value) {
    let Some(event) = message.get("event").and_then(Value::as_str) else {
        return;
    };
    if event == "auth" {
        info!("ws auth sent");
        return;
    }

    let count = SUBSCRIBE_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= SUBSCRIPTION_LOG_LIMIT {
        return;
    }

    let preview = truncate_for_log(&message.to_string(), RAW_LOG_MAX_BYTES);
    info!(
        sample_index = count + 1,
        sample_limit = SUBSCRIPTION_LOG_LIMIT,
        action = event,
        message = %preview,
        "ws subscription sent"
    );
}

fn log_other_message_once(kind: &str) {
    let count = OTHER_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < OTHER_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = OTHER_LOG_LIMIT,
            kind,
            "ws message unrecognized"
        );
    }
}

fn log_unbound_once(chan_id: i64) {
    let count = UNBOUND_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < UNBOUND_LOG_LIMIT {
        debug!(
            sample_index = count + 1,
            sample_limit = UNBOUND_LOG_LIMIT,
            chan_id,
            "ws frame for unbound channel dropped"
        );
    }
}

fn log_parse_fail_once(err: &BitfinexError, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "ws message parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            message = %preview,
            "ws message parse failed"
        );
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, OrderStatus};
    use rust_decimal_macros::dec;

    struct Harness {
        session: WebSocketSession,
        ledger: Arc<OrderLedger>,
        ticks: Arc<PendingTicks>,
        events: mpsc::UnboundedReceiver<BrokerageEvent>,
    }

    fn harness(scale: ScaleFactor) -> Harness {
        let ledger = Arc::new(OrderLedger::new());
        let ticks = Arc::new(PendingTicks::new());
        let (tx, events) = mpsc::unbounded_channel();
        let config = SessionConfig {
            ws_url: "ws://127.0.0.1:1".to_string(),
            subscribe_trades: true,
            info_codes: InfoCodes::default(),
            scale,
            wallet: "exchange",
            signer: None,
        };
        let session = WebSocketSession::new(
            config,
            Arc::new(NonceGenerator::new()),
            ledger.clone(),
            ticks.clone(),
            Arc::new(LastPrices::new()),
            tx,
        );
        Harness {
            session,
            ledger,
            ticks,
            events,
        }
    }

    #[test]
    fn ticker_frame_on_bound_channel_queues_quote() {
        let h = harness(ScaleFactor::IDENTITY);
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":7,"pair":"ETHUSD"}"#);
        h.session
            .handle_text("[7,10.0,2.0,12.0,3.0,0.1,0.01,11.5,1000,13,9]");

        let ticks = h.ticks.drain();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol.value, "ETHUSD");
        assert_eq!(ticks[0].kind, TickKind::Quote);
        assert_eq!(ticks[0].value, dec!(11));
        assert_eq!(ticks[0].ask_size, dec!(3.0));
    }

    #[test]
    fn unbound_channel_frames_are_dropped() {
        let h = harness(ScaleFactor::IDENTITY);
        h.session.handle_text("[9,1,1,1,1,1,1,1,1,1,1]");
        h.session.handle_text("[9,\"hb\"]");
        assert!(h.ticks.is_empty());
    }

    #[test]
    fn public_trade_update_is_not_queued_twice() {
        let h = harness(ScaleFactor::IDENTITY);
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"trades","chanId":4,"pair":"BTCUSD"}"#);
        h.session.handle_text(r#"[4,"te","1-BTCUSD",1443659698,236.42,-0.5]"#);
        h.session.handle_text(r#"[4,"tu","1-BTCUSD",99,1443659698,236.42,-0.5]"#);

        let ticks = h.ticks.drain();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].kind, TickKind::Trade);
        assert_eq!(ticks[0].quantity, dec!(0.5));
    }

    #[test]
    fn hard_reset_returns_reconnect_and_clears_channels() {
        let h = harness(ScaleFactor::IDENTITY);
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":1,"pair":"BTCUSD"}"#);
        let action = h.session.handle_text(r#"{"event":"info","code":20051}"#);
        assert_eq!(action, Some(ControlAction::Reconnect));
        assert!(h.session.channels().is_empty());
    }

    #[test]
    fn only_final_execution_is_accounted() {
        let mut h = harness(ScaleFactor::IDENTITY);
        let pair = SymbolMapper.pair_for_raw("BTCUSD").unwrap();
        let order = Order::limit(3, pair.symbol.clone(), dec!(1), dec!(100));
        h.ledger.track(&order, pair, ScaleFactor::IDENTITY);
        h.ledger.record_placement(order.id, 500, order.quantity, "");

        h.session.handle_text(
            r#"[0,"te",["1-BTCUSD",1443659698,"BTCUSD",1443659698,500,"1","100"]]"#,
        );
        assert!(h.events.try_recv().is_err());

        h.session.handle_text(
            r#"[0,"tu",["42","1-BTCUSD","BTCUSD",1443659698,500,"1","100","EXCHANGE LIMIT","100","-0.2","USD"]]"#,
        );
        match h.events.try_recv().unwrap() {
            BrokerageEvent::OrderStatusChanged(event) => {
                assert_eq!(event.order_id, 3);
                assert_eq!(event.status, OrderStatus::Filled);
                assert_eq!(event.fee, dec!(-0.2));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.ticks.drain().len(), 2);
    }

    #[test]
    fn oversized_numbers_drop_only_their_field() {
        let mut h = harness(ScaleFactor::IDENTITY);
        let pair = SymbolMapper.pair_for_raw("BTCUSD").unwrap();
        let order = Order::limit(4, pair.symbol.clone(), dec!(1), dec!(100));
        h.ledger.track(&order, pair, ScaleFactor::IDENTITY);
        h.ledger.record_placement(order.id, 600, order.quantity, "");

        h.session
            .handle_text(r#"{"event":"subscribed","channel":"trades","chanId":4,"pair":"BTCUSD"}"#);
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":5,"pair":"BTCUSD"}"#);
        h.session
            .handle_text(r#"[4,"te","1-BTCUSD","79228162514264337593543950335",236.42,-0.5]"#);
        h.session.handle_text(
            r#"[5,"79228162514264337593543950335",1,"79228162514264337593543950335",1,0,0,"250",0,0,0]"#,
        );
        h.session.handle_text(
            r#"[0,"tu",["43","1-BTCUSD","BTCUSD",1443659698,600,"1","100","EXCHANGE LIMIT","100","79228162514264337593543950335","BTC"]]"#,
        );

        let ticks = h.ticks.drain();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].kind, TickKind::Trade);
        assert_eq!(ticks[0].value, dec!(236.42));
        assert_eq!(ticks[1].kind, TickKind::Quote);
        assert_eq!(ticks[1].value, dec!(250));

        match h.events.try_recv().unwrap() {
            BrokerageEvent::OrderStatusChanged(event) => {
                assert_eq!(event.status, OrderStatus::Filled);
                assert_eq!(event.fee, Decimal::ZERO);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn scaled_overflow_drops_tick() {
        let h = harness(ScaleFactor::new(dec!(10)).unwrap());
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":1,"pair":"BTCUSD"}"#);
        h.session
            .handle_text(r#"[1,0,0,0,0,0,0,"79228162514264337593543950335",0,0,0]"#);
        assert!(h.ticks.is_empty());
    }

    #[test]
    fn wallet_updates_filtered_by_wallet() {
        let mut h = harness(ScaleFactor::IDENTITY);
        h.session
            .handle_text(r#"[0,"ws",[["exchange","USD",100,0],["trading","USD",5,0]]]"#);
        h.session.handle_text(r#"[0,"wu",["exchange","BTC","1.5",0]]"#);

        let mut balances = Vec::new();
        while let Ok(BrokerageEvent::AccountChanged(event)) = h.events.try_recv() {
            balances.push((event.currency, event.balance));
        }
        assert_eq!(
            balances,
            vec![("USD".to_string(), dec!(100)), ("BTC".to_string(), dec!(1.5))]
        );
    }

    #[test]
    fn ticker_prices_scaled_into_engine_units() {
        let h = harness(ScaleFactor::new(dec!(10)).unwrap());
        h.session
            .handle_text(r#"{"event":"subscribed","channel":"ticker","chanId":1,"pair":"BTCUSD"}"#);
        h.session.handle_text("[1,1.0,20,3.0,40,0,0,2.5,0,0,0]");

        let tick = &h.ticks.drain()[0];
        assert_eq!(tick.value, dec!(20));
        assert_eq!(tick.bid_size, dec!(2));
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let h = harness(ScaleFactor::IDENTITY);
        let pair = SymbolMapper.pair_for_raw("BTCUSD").unwrap();
        let err = h.session.subscribe(&[pair]).await.unwrap_err();
        assert!(matches!(err, BitfinexError::NotConnected));
        assert!(h.session.wanted_pairs().await.is_empty());
    }

    #[tokio::test]
    async fn connect_failure_ends_disconnected() {
        let h = harness(ScaleFactor::IDENTITY);
        assert!(h.session.connect().await.is_err());
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ééé";
        assert_eq!(truncate_for_log(text, 3), "é...");
        assert_eq!(truncate_for_log("abc", 10), "abc");
    }
}
