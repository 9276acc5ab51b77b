/*
[INPUT]:  Engine orders, subscriptions and account queries
[OUTPUT]: Exchange calls, order/account events and drained ticks
[POS]:    Facade - the only surface the trading engine talks to
[UPDATE]: When the engine contract or order flow changes
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::auth::NonceGenerator;
use crate::config::BrokerageConfig;
use crate::http::{BitfinexClient, BitfinexError, Result};
use crate::ledger::OrderLedger;
use crate::mapping::{OrderTypeMapper, ScaleFactor, SymbolMapper};
use crate::ticks::{LastPrices, PendingTicks};
use crate::types::{
    AccountType, BrokerageEvent, CashAmount, EXCHANGE_NAME, Holding, NewOrderRequest, Order,
    OrderRecord, OrderStatus, OrderType, ReplaceOrderRequest, Side, Symbol, Tick, TradingPair,
};
use crate::ws::{ConnectionState, SessionConfig, WebSocketSession};

/// What the brokerage reads from the surrounding engine
pub trait EngineContext: Send + Sync {
    /// Signed quantity currently held
    fn holdings_quantity(&self, symbol: &Symbol) -> Decimal;

    /// Last known price, used when neither the stream nor REST has one
    fn last_price(&self, symbol: &Symbol) -> Option<Decimal>;
}

/// Context with no holdings and no prices
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEngineContext;

impl EngineContext for NoEngineContext {
    fn holdings_quantity(&self, _symbol: &Symbol) -> Decimal {
        Decimal::ZERO
    }

    fn last_price(&self, _symbol: &Symbol) -> Option<Decimal> {
        None
    }
}

pub struct BitfinexBrokerage {
    config: BrokerageConfig,
    client: BitfinexClient,
    session: WebSocketSession,
    symbols: SymbolMapper,
    order_types: OrderTypeMapper,
    scale: ScaleFactor,
    ledger: Arc<OrderLedger>,
    ticks: Arc<PendingTicks>,
    prices: Arc<LastPrices>,
    events_tx: mpsc::UnboundedSender<BrokerageEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<BrokerageEvent>>,
    engine: Arc<dyn EngineContext>,
}

impl BitfinexBrokerage {
    pub fn new(config: BrokerageConfig, engine: Arc<dyn EngineContext>) -> Result<Self> {
        config.validate()?;

        let nonces = Arc::new(NonceGenerator::new());
        let mut client =
            BitfinexClient::with_config_and_base_url(config.client_config(), &config.rest_base_url)?;
        client.set_credentials(&config.credentials()?);
        client.set_nonce_generator(nonces.clone());

        let ledger = Arc::new(OrderLedger::new());
        let ticks = Arc::new(PendingTicks::new());
        let prices = Arc::new(LastPrices::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = WebSocketSession::new(
            SessionConfig::from_config(&config)?,
            nonces,
            ledger.clone(),
            ticks.clone(),
            prices.clone(),
            events_tx.clone(),
        );

        Ok(Self {
            order_types: OrderTypeMapper::new(config.account_type),
            scale: config.scale()?,
            symbols: SymbolMapper::new(),
            config,
            client,
            session,
            ledger,
            ticks,
            prices,
            events_tx,
            events_rx: Some(events_rx),
            engine,
        })
    }

    /// Order and account events; can be taken once
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<BrokerageEvent>> {
        self.events_rx.take()
    }

    pub fn account_type(&self) -> AccountType {
        self.config.account_type
    }

    pub fn client(&self) -> &BitfinexClient {
        &self.client
    }

    pub fn session(&self) -> &WebSocketSession {
        &self.session
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.state_receiver()
    }

    /// Submit an order.
    ///
    /// An order that would take holdings through zero goes out as two legs,
    /// flatten then reverse. `Ok(false)` means the exchange rejected it and an
    /// `Invalid` event was raised.
    pub async fn place_order(&self, order: &mut Order) -> Result<bool> {
        let pair = self.symbols.trading_pair(&order.symbol)?;
        let wire_type = self.order_types.to_brokerage(order.order_type)?;

        let holdings = self.engine.holdings_quantity(&order.symbol);
        let legs = split_legs(holdings, order.quantity);
        let mut requests = Vec::with_capacity(legs.len());
        for leg in &legs {
            requests.push(self.new_order_request(order, pair, wire_type, *leg).await?);
        }
        self.ledger.track(order, pair, self.scale);

        for (index, (leg, request)) in legs.iter().copied().zip(&requests).enumerate() {
            let outcome = self.client.new_order(request).await;

            let (broker_id, message) = match outcome {
                Ok(record) => (record.id, String::new()),
                Err(BitfinexError::Api { code, message }) => {
                    warn!(order_id = order.id, code, message = %message, "order rejected");
                    (0, message)
                }
                Err(err) if index == 0 => {
                    self.ledger.record_placement(order.id, 0, leg, "");
                    return Err(err);
                }
                Err(err) => {
                    warn!(order_id = order.id, error = %err, "reversal leg failed");
                    (0, err.to_string())
                }
            };

            if index > 0 && broker_id == 0 {
                self.ledger.drop_leg(order.id, leg);
                continue;
            }

            let Some(event) = self.ledger.record_placement(order.id, broker_id, leg, &message) else {
                continue;
            };
            order.status = event.status;
            if broker_id == 0 {
                self.emit(BrokerageEvent::OrderStatusChanged(event));
                return Ok(false);
            }

            order.broker_ids.push(broker_id);
            info!(
                order_id = order.id,
                broker_id,
                leg = index + 1,
                legs = legs.len(),
                quantity = %leg,
                "order placed"
            );
            if index == 0 {
                self.emit(BrokerageEvent::OrderStatusChanged(event));
            }
            for fill in self.ledger.replay_unmatched(broker_id) {
                order.status = fill.status;
                self.emit(BrokerageEvent::OrderStatusChanged(fill));
            }
        }

        Ok(true)
    }

    /// Amend price/quantity with a cancel-replace.
    ///
    /// `Ok(false)` when the replace did not apply; the original order keeps
    /// trading. Split orders cannot be amended.
    pub async fn update_order(&self, order: &mut Order) -> Result<bool> {
        if self.ledger.is_split(order.id) {
            warn!(order_id = order.id, "split orders cannot be updated");
            return Ok(false);
        }
        let Some(previous_id) = self.ledger.live_ids(order.id).last().copied() else {
            warn!(order_id = order.id, "update for untracked order");
            return Ok(false);
        };

        let pair = self.symbols.trading_pair(&order.symbol)?;
        let wire_type = self.order_types.to_brokerage(order.order_type)?;
        let filled = self
            .ledger
            .fill_state(order.id)
            .map(|fills| fills.filled)
            .unwrap_or_default();
        let remaining = order.quantity.abs() - filled;
        if remaining <= Decimal::ZERO {
            warn!(order_id = order.id, "update would leave nothing to fill");
            return Ok(false);
        }
        let leg = if order.quantity.is_sign_negative() {
            -remaining
        } else {
            remaining
        };

        let base = self.new_order_request(order, pair, wire_type, leg).await?;
        let request = ReplaceOrderRequest {
            order_id: previous_id,
            symbol: base.symbol,
            amount: base.amount,
            price: base.price,
            exchange: base.exchange,
            side: base.side,
            order_type: base.order_type,
        };

        let record = match self.client.replace_order(&request).await {
            Ok(record) => record,
            Err(BitfinexError::Api { code, message }) => {
                warn!(order_id = order.id, code, message = %message, "update rejected");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        match self
            .ledger
            .record_replacement(order.id, previous_id, record.id, order.quantity)
        {
            Some(event) => {
                info!(order_id = order.id, previous_id, broker_id = record.id, "order updated");
                order.broker_ids.push(record.id);
                order.status = event.status;
                self.emit(BrokerageEvent::OrderStatusChanged(event));
                for fill in self.ledger.replay_unmatched(record.id) {
                    order.status = fill.status;
                    self.emit(BrokerageEvent::OrderStatusChanged(fill));
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every live leg; succeeds only when each cancel is confirmed
    pub async fn cancel_order(&self, order: &mut Order) -> Result<bool> {
        let live = self.ledger.live_ids(order.id);
        if live.is_empty() {
            warn!(order_id = order.id, "cancel for untracked order");
            return Ok(false);
        }

        let mut confirmed = true;
        for broker_id in live {
            match self.client.cancel_order(broker_id).await {
                Ok(record) => {
                    if !self.ledger.record_cancel(order.id, broker_id, record.id) {
                        warn!(order_id = order.id, broker_id, echoed = record.id, "cancel not applied");
                        confirmed = false;
                    }
                }
                Err(BitfinexError::Api { code, message }) => {
                    warn!(order_id = order.id, broker_id, code, message = %message, "cancel rejected");
                    confirmed = false;
                }
                Err(err) => return Err(err),
            }
        }

        if !confirmed {
            return Ok(false);
        }
        match self.ledger.retire_canceled(order.id) {
            Some(event) => {
                info!(order_id = order.id, "order canceled");
                order.status = event.status;
                self.emit(BrokerageEvent::OrderStatusChanged(event));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Live exchange orders for this account mode
    pub async fn get_open_orders(&self) -> Result<Vec<Order>> {
        let records = self.client.active_orders().await?;
        let mut orders = Vec::with_capacity(records.len());

        for record in records {
            match self.order_from_record(&record) {
                Ok(order) => orders.push(order),
                Err(err) => warn!(broker_id = record.id, error = %err, "open order skipped"),
            }
        }
        Ok(orders)
    }

    /// Non-account-currency balances of the configured wallet, netted with
    /// open margin positions
    pub async fn get_account_holdings(&self) -> Result<Vec<Holding>> {
        let wallet = self.config.account_type.wallet();
        let account_currency = self.config.account_currency();

        let mut amounts: BTreeMap<String, Decimal> = BTreeMap::new();
        for balance in self.client.balances().await? {
            if balance.wallet.eq_ignore_ascii_case(wallet) {
                let total = amounts
                    .entry(balance.currency.to_ascii_uppercase())
                    .or_default();
                *total = total.saturating_add(balance.amount);
            }
        }

        let mut entry_prices: BTreeMap<String, Decimal> = BTreeMap::new();
        if self.config.account_type == AccountType::Margin {
            for position in self.client.active_positions().await? {
                let Some(pair) = self.symbols.pair_for_raw(&position.symbol) else {
                    warn!(symbol = %position.symbol, "position on unknown pair skipped");
                    continue;
                };
                let total = amounts.entry(pair.base.clone()).or_default();
                *total = total.saturating_add(position.amount);
                entry_prices.insert(pair.base.clone(), position.base);
            }
        }

        let mut holdings = Vec::new();
        for (currency, amount) in amounts {
            if currency == account_currency || amount.is_zero() {
                continue;
            }
            let Some(pair) = self.symbols.pair_for_currencies(&currency, &account_currency) else {
                debug!(currency = %currency, "no pair against account currency");
                continue;
            };

            let market_price = self.last_price(&pair.symbol).await.unwrap_or_default();
            let average_price = entry_prices
                .get(&currency)
                .and_then(|price| self.scale.from_exchange_price(*price))
                .unwrap_or(market_price);
            let Some(quantity) = self.scale.from_exchange_quantity(amount) else {
                warn!(currency = %currency, amount = %amount, "holding out of range skipped");
                continue;
            };

            holdings.push(Holding {
                symbol: pair.symbol.clone(),
                quantity,
                average_price,
                market_price,
                currency: pair.quote.clone(),
            });
        }
        Ok(holdings)
    }

    /// Cash lines of the configured wallet with their conversion rate into
    /// the account currency
    pub async fn get_cash_balance(&self) -> Result<Vec<CashAmount>> {
        let wallet = self.config.account_type.wallet();
        let account_currency = self.config.account_currency();

        let mut cash = Vec::new();
        for balance in self.client.balances().await? {
            if !balance.wallet.eq_ignore_ascii_case(wallet) {
                continue;
            }
            let currency = balance.currency.to_ascii_uppercase();
            let conversion_rate = self.conversion_rate(&currency, &account_currency).await;
            cash.push(CashAmount {
                currency,
                amount: balance.amount,
                conversion_rate,
            });
        }
        Ok(cash)
    }

    /// Stream ticker (and trades, when configured) for each symbol
    pub async fn subscribe(&self, symbols: &[Symbol]) -> Result<()> {
        let pairs = self.pairs_for(symbols)?;
        self.session.subscribe(&pairs).await
    }

    pub async fn unsubscribe(&self, symbols: &[Symbol]) -> Result<()> {
        let pairs = self.pairs_for(symbols)?;
        self.session.unsubscribe(&pairs).await
    }

    /// Everything queued since the last call
    pub fn get_next_ticks(&self) -> Vec<Tick> {
        self.ticks.drain()
    }

    /// Last price from the stream, then the REST ticker, then the engine
    pub async fn last_price(&self, symbol: &Symbol) -> Option<Decimal> {
        if let Some(price) = self.prices.get(symbol) {
            return Some(price);
        }

        if let Ok(pair) = self.symbols.trading_pair(symbol) {
            match self.client.ticker(&pair.wire_symbol()).await {
                Ok(ticker) => {
                    if let Some(price) = ticker
                        .price()
                        .filter(|price| *price > Decimal::ZERO)
                        .and_then(|price| self.scale.from_exchange_price(price))
                    {
                        return Some(price);
                    }
                }
                Err(err) => debug!(symbol = %symbol, error = %err, "ticker fallback failed"),
            }
        }

        self.engine.last_price(symbol)
    }

    async fn conversion_rate(&self, currency: &str, account_currency: &str) -> Decimal {
        if currency == account_currency {
            return Decimal::ONE;
        }
        if let Some(pair) = self.symbols.pair_for_currencies(currency, account_currency) {
            return self.last_price(&pair.symbol).await.unwrap_or_default();
        }
        if let Some(pair) = self.symbols.pair_for_currencies(account_currency, currency)
            && let Some(price) = self.last_price(&pair.symbol).await
            && !price.is_zero()
        {
            return Decimal::ONE.checked_div(price).unwrap_or_default();
        }
        debug!(currency, "no conversion rate");
        Decimal::ZERO
    }

    async fn new_order_request(
        &self,
        order: &Order,
        pair: &TradingPair,
        wire_type: &str,
        quantity: Decimal,
    ) -> Result<NewOrderRequest> {
        let price = match order.order_type {
            // the exchange requires a price even for market orders
            OrderType::Market => self.last_price(&order.symbol).await.unwrap_or(Decimal::ONE),
            _ => order.trigger_price().ok_or_else(|| {
                BitfinexError::UnsupportedOrderType(format!(
                    "{:?} order {} has no price",
                    order.order_type, order.id
                ))
            })?,
        };

        let amount = self.scale.to_exchange_quantity(quantity.abs()).ok_or_else(|| {
            BitfinexError::OutOfRange(format!("order {} quantity {quantity}", order.id))
        })?;
        let price = self.scale.to_exchange_price(price).ok_or_else(|| {
            BitfinexError::OutOfRange(format!("order {} price {price}", order.id))
        })?;

        Ok(NewOrderRequest {
            symbol: pair.wire_symbol(),
            amount,
            price,
            exchange: EXCHANGE_NAME.to_string(),
            side: if quantity.is_sign_negative() {
                Side::Sell
            } else {
                Side::Buy
            },
            order_type: wire_type.to_string(),
        })
    }

    fn order_from_record(&self, record: &OrderRecord) -> Result<Order> {
        let symbol = self.symbols.to_engine_symbol(&record.symbol, None, None)?;
        let order_type = self.order_types.from_brokerage(&record.order_type)?;

        let remaining = self
            .scale
            .from_exchange_quantity(record.remaining_amount.abs())
            .ok_or_else(|| BitfinexError::OutOfRange(format!("order {} amount", record.id)))?;
        let quantity = if record.side.eq_ignore_ascii_case(Side::Sell.as_str()) {
            -remaining
        } else {
            remaining
        };
        let price = self
            .scale
            .from_exchange_price(record.price)
            .ok_or_else(|| BitfinexError::OutOfRange(format!("order {} price", record.id)))?;
        let id = self.ledger.order_id_for(record.id).unwrap_or_default();

        let mut order = match order_type {
            OrderType::Market => Order::market(id, symbol, quantity),
            OrderType::Limit => Order::limit(id, symbol, quantity, price),
            OrderType::StopMarket => Order::stop_market(id, symbol, quantity, price),
            OrderType::StopLimit => Order::stop_limit(id, symbol, quantity, price, price),
        };
        order.broker_ids = match id {
            0 => vec![record.id],
            _ => self.ledger.broker_ids(id),
        };
        order.status = if record.executed_amount.is_zero() {
            OrderStatus::Submitted
        } else {
            OrderStatus::PartiallyFilled
        };
        Ok(order)
    }

    fn pairs_for(&self, symbols: &[Symbol]) -> Result<Vec<&'static TradingPair>> {
        symbols
            .iter()
            .map(|symbol| self.symbols.trading_pair(symbol))
            .collect()
    }

    fn emit(&self, event: BrokerageEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Quantities to submit for `quantity` given current `holdings`.
///
/// Crossing zero becomes a flattening leg followed by the remainder.
pub fn split_legs(holdings: Decimal, quantity: Decimal) -> Vec<Decimal> {
    let Some(after) = holdings.checked_add(quantity) else {
        return vec![quantity];
    };
    let crosses = !holdings.is_zero()
        && !after.is_zero()
        && holdings.is_sign_negative() != after.is_sign_negative();
    if crosses {
        vec![-holdings, after]
    } else {
        vec![quantity]
    }
}
