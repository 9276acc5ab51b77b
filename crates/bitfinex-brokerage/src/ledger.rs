/*
[INPUT]:  Placement/replace/cancel outcomes and account execution reports
[OUTPUT]: Monotonic order status events with per-execution fill and fee
[POS]:    Reconciliation layer - per-order fill accounting
[UPDATE]: When changing fill accounting, fee normalization or eviction rules
*/

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::mapping::ScaleFactor;
use crate::types::{Order, OrderEvent, OrderStatus, Symbol, TradingPair};

/// Executions held for broker ids the ledger has not seen yet
const UNMATCHED_CAPACITY: usize = 256;

/// One trade execution against an account order, in exchange units
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Exchange trade id; the redelivery key when present
    pub trade_id: Option<i64>,
    pub broker_order_id: i64,
    pub pair: String,
    pub time: DateTime<Utc>,
    /// Signed executed amount; negative sells
    pub amount: Decimal,
    pub price: Decimal,
    pub order_type: String,
    pub order_price: Option<Decimal>,
    pub fee: Decimal,
    pub fee_currency: String,
}

/// Cumulative fill state of one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillAccumulator {
    /// Absolute target quantity, engine units
    pub target: Decimal,
    /// Absolute filled quantity, engine units
    pub filled: Decimal,
    /// Cumulative fee, quote-currency terms where convertible
    pub fee: Decimal,
}

impl FillAccumulator {
    fn new(target: Decimal) -> Self {
        Self {
            target: target.abs(),
            filled: Decimal::ZERO,
            fee: Decimal::ZERO,
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.target - self.filled).max(Decimal::ZERO)
    }

    pub fn is_complete(&self) -> bool {
        self.filled >= self.target
    }
}

/// One exchange order resting for an engine order
#[derive(Debug, Clone, Copy)]
struct Leg {
    broker_id: i64,
    /// Absolute quantity this exchange order was sent for, engine units
    target: Decimal,
    filled: Decimal,
}

#[derive(Debug)]
struct TrackedOrder {
    symbol: Symbol,
    pair: &'static TradingPair,
    /// Every id the exchange has assigned, oldest first
    broker_ids: Vec<i64>,
    /// Exchange orders still resting (two for a split order)
    live: Vec<Leg>,
    fills: FillAccumulator,
    seen_trades: HashSet<i64>,
    scale: ScaleFactor,
}

impl TrackedOrder {
    fn live_ids(&self) -> Vec<i64> {
        self.live.iter().map(|leg| leg.broker_id).collect()
    }

    /// Count a fill against its leg; a leg filled in full stops resting
    fn fill_leg(&mut self, broker_id: i64, quantity: Decimal) {
        let Some(index) = self.live.iter().position(|leg| leg.broker_id == broker_id) else {
            return;
        };
        let leg = &mut self.live[index];
        leg.filled += quantity;
        if leg.filled >= leg.target {
            self.live.remove(index);
        }
    }
}

/// Per-connector order and fill ledger.
///
/// Orders are keyed by engine id; a second map resolves any broker id in an
/// order's history back to it. Both maps lock per key, so independent orders
/// never contend.
#[derive(Debug, Default)]
pub struct OrderLedger {
    orders: DashMap<u64, TrackedOrder>,
    by_broker_id: DashMap<i64, u64>,
    /// Executions that beat their placement response, oldest first
    unmatched: Mutex<VecDeque<Execution>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an order before it is sent to the exchange
    pub fn track(&self, order: &Order, pair: &'static TradingPair, scale: ScaleFactor) {
        self.orders.insert(
            order.id,
            TrackedOrder {
                symbol: order.symbol.clone(),
                pair,
                broker_ids: Vec::new(),
                live: Vec::new(),
                fills: FillAccumulator::new(order.quantity),
                seen_trades: HashSet::new(),
                scale,
            },
        );
    }

    /// Record the id returned by a placement call for one leg.
    ///
    /// A zero id is a rejection: the order stops being tracked and an
    /// `Invalid` event is returned. Otherwise the id joins the order's history
    /// and a `Submitted` event is returned. Executions already seen for the
    /// id are picked up by [`OrderLedger::replay_unmatched`].
    pub fn record_placement(
        &self,
        order_id: u64,
        broker_id: i64,
        leg_quantity: Decimal,
        message: &str,
    ) -> Option<OrderEvent> {
        if broker_id == 0 {
            let (_, tracked) = self.orders.remove(&order_id)?;
            self.unindex(&tracked);
            debug!(order_id, "placement rejected");
            return Some(OrderEvent::status(
                order_id,
                tracked.symbol,
                OrderStatus::Invalid,
                message,
            ));
        }

        let symbol = {
            let mut tracked = self.orders.get_mut(&order_id)?;
            tracked.broker_ids.push(broker_id);
            tracked.live.push(Leg {
                broker_id,
                target: leg_quantity.abs(),
                filled: Decimal::ZERO,
            });
            tracked.symbol.clone()
        };
        self.index(broker_id, order_id);

        let mut event = OrderEvent::status(order_id, symbol, OrderStatus::Submitted, message);
        event.broker_id = Some(broker_id);
        Some(event)
    }

    /// Drop a rejected leg of a split order, shrinking the target to the legs that rest
    pub fn drop_leg(&self, order_id: u64, leg_quantity: Decimal) {
        if let Some(mut tracked) = self.orders.get_mut(&order_id) {
            tracked.fills.target = (tracked.fills.target - leg_quantity.abs()).max(Decimal::ZERO);
            warn!(order_id, leg_quantity = %leg_quantity, "split order leg rejected");
        }
    }

    /// Record the outcome of a cancel-replace.
    ///
    /// The replace applies only when the exchange returned a fresh non-zero id.
    /// Fill state is kept; the target follows the amended quantity and the
    /// new exchange order rests for what is left of it.
    pub fn record_replacement(
        &self,
        order_id: u64,
        previous_id: i64,
        new_id: i64,
        quantity: Decimal,
    ) -> Option<OrderEvent> {
        if new_id == 0 || new_id == previous_id {
            debug!(order_id, previous_id, new_id, "replace not applied");
            return None;
        }

        let symbol = {
            let mut tracked = self.orders.get_mut(&order_id)?;
            tracked.broker_ids.push(new_id);
            tracked.live.retain(|leg| leg.broker_id != previous_id);
            tracked.fills.target = quantity.abs();
            let target = tracked.fills.remaining();
            tracked.live.push(Leg {
                broker_id: new_id,
                target,
                filled: Decimal::ZERO,
            });
            tracked.symbol.clone()
        };
        self.index(new_id, order_id);

        let mut event = OrderEvent::status(order_id, symbol, OrderStatus::UpdateSubmitted, "");
        event.broker_id = Some(new_id);
        Some(event)
    }

    /// Record the echo of a cancel call for one leg; true when it applied
    pub fn record_cancel(&self, order_id: u64, requested: i64, echoed: i64) -> bool {
        if echoed == 0 || echoed != requested {
            return false;
        }
        match self.orders.get_mut(&order_id) {
            Some(mut tracked) => {
                tracked.live.retain(|leg| leg.broker_id != requested);
                true
            }
            None => false,
        }
    }

    /// Retire an order whose every leg was canceled
    pub fn retire_canceled(&self, order_id: u64) -> Option<OrderEvent> {
        let (_, tracked) = self.orders.remove_if(&order_id, |_, tracked| tracked.live.is_empty())?;
        self.unindex(&tracked);
        Some(OrderEvent::status(
            order_id,
            tracked.symbol,
            OrderStatus::Canceled,
            "",
        ))
    }

    /// Account one execution.
    ///
    /// Returns `None` when the trade id was already accounted, when nothing
    /// remains to fill, or when the amount or price is out of range. An
    /// execution for a broker id no order owns yet is held until
    /// [`OrderLedger::replay_unmatched`] claims it.
    pub fn apply_execution(&self, execution: &Execution) -> Option<OrderEvent> {
        let order_id = self.owner_or_hold(execution)?;

        let event = {
            let mut tracked = self.orders.get_mut(&order_id)?;

            let scale = tracked.scale;
            let (Some(executed), Some(price)) = (
                scale.from_exchange_quantity(execution.amount.abs()),
                scale.from_exchange_price(execution.price),
            ) else {
                warn!(order_id, broker_id = execution.broker_order_id, "execution out of range dropped");
                return None;
            };

            if let Some(trade_id) = execution.trade_id
                && !tracked.seen_trades.insert(trade_id)
            {
                debug!(order_id, trade_id, "duplicate execution ignored");
                return None;
            }

            let remaining = tracked.fills.remaining();
            if remaining.is_zero() {
                debug!(order_id, "execution after order completed ignored");
                return None;
            }

            let (fee, fee_currency) = normalize_fee(tracked.pair, execution);
            let mut quantity = executed;
            if quantity > remaining {
                warn!(
                    order_id,
                    executed = %quantity,
                    remaining = %remaining,
                    "execution overfills order, clamping"
                );
                quantity = remaining;
            }

            tracked.fills.filled += quantity;
            tracked.fills.fee = tracked.fills.fee.checked_add(fee).unwrap_or(tracked.fills.fee);
            tracked.fill_leg(execution.broker_order_id, quantity);

            let status = if tracked.fills.is_complete() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };

            let signed_quantity = if execution.amount.is_sign_negative() {
                -quantity
            } else {
                quantity
            };

            OrderEvent {
                order_id,
                broker_id: Some(execution.broker_order_id),
                symbol: tracked.symbol.clone(),
                fill_quantity: signed_quantity,
                fill_price: price,
                fee,
                fee_currency,
                status,
                message: String::new(),
            }
        };

        if event.status == OrderStatus::Filled
            && let Some((_, tracked)) = self.orders.remove(&order_id)
        {
            self.unindex(&tracked);
        }

        Some(event)
    }

    /// Apply the held executions for a broker id that now has an owner
    pub fn replay_unmatched(&self, broker_id: i64) -> Vec<OrderEvent> {
        let held: Vec<Execution> = {
            let mut unmatched = self.unmatched.lock();
            let (claimed, rest): (Vec<_>, Vec<_>) = unmatched
                .drain(..)
                .partition(|execution| execution.broker_order_id == broker_id);
            unmatched.extend(rest);
            claimed
        };
        if !held.is_empty() {
            debug!(broker_id, executions = held.len(), "replaying early executions");
        }
        held.iter()
            .filter_map(|execution| self.apply_execution(execution))
            .collect()
    }

    /// Engine id owning a broker id, across the whole replace history
    pub fn order_id_for(&self, broker_id: i64) -> Option<u64> {
        self.by_broker_id.get(&broker_id).map(|entry| *entry)
    }

    pub fn broker_ids(&self, order_id: u64) -> Vec<i64> {
        self.orders
            .get(&order_id)
            .map(|tracked| tracked.broker_ids.clone())
            .unwrap_or_default()
    }

    /// Broker ids still resting on the exchange, in placement order
    pub fn live_ids(&self, order_id: u64) -> Vec<i64> {
        self.orders
            .get(&order_id)
            .map(|tracked| tracked.live_ids())
            .unwrap_or_default()
    }

    /// True when more than one exchange order rests for this engine order
    pub fn is_split(&self, order_id: u64) -> bool {
        self.orders
            .get(&order_id)
            .is_some_and(|tracked| tracked.live.len() > 1)
    }

    pub fn fill_state(&self, order_id: u64) -> Option<FillAccumulator> {
        self.orders.get(&order_id).map(|tracked| tracked.fills)
    }

    pub fn is_tracked(&self, order_id: u64) -> bool {
        self.orders.contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of executions waiting for their broker id
    pub fn unmatched_len(&self) -> usize {
        self.unmatched.lock().len()
    }

    /// Owner of the execution's broker id, or hold the execution for later.
    ///
    /// The lookup and the hold happen under the same lock that
    /// [`OrderLedger::index`] takes, so an id indexed concurrently is either
    /// seen here or finds the execution in the buffer.
    fn owner_or_hold(&self, execution: &Execution) -> Option<u64> {
        if let Some(order_id) = self.order_id_for(execution.broker_order_id) {
            return Some(order_id);
        }
        let mut unmatched = self.unmatched.lock();
        if let Some(order_id) = self.order_id_for(execution.broker_order_id) {
            return Some(order_id);
        }
        if unmatched.len() == UNMATCHED_CAPACITY {
            unmatched.pop_front();
        }
        debug!(broker_id = execution.broker_order_id, "execution for unknown order held");
        unmatched.push_back(execution.clone());
        None
    }

    fn index(&self, broker_id: i64, order_id: u64) {
        let _unmatched = self.unmatched.lock();
        self.by_broker_id.insert(broker_id, order_id);
    }

    fn unindex(&self, tracked: &TrackedOrder) {
        for id in &tracked.broker_ids {
            self.by_broker_id.remove(id);
        }
    }
}

/// Fee in quote-currency terms: quote fees pass as-is, base fees are priced at
/// the executed price, anything else passes through unconverted.
///
/// A base fee whose quote value is out of range counts as no fee.
fn normalize_fee(pair: &TradingPair, execution: &Execution) -> (Decimal, String) {
    let currency = execution.fee_currency.trim().to_ascii_uppercase();
    if currency == pair.quote {
        (execution.fee, pair.quote.clone())
    } else if currency == pair.base {
        let fee = execution.fee.checked_mul(execution.price).unwrap_or_else(|| {
            warn!(fee = %execution.fee, price = %execution.price, "fee conversion out of range");
            Decimal::ZERO
        });
        (fee, pair.quote.clone())
    } else {
        (execution.fee, currency)
    }
}
