/*
[INPUT]:  Normalized ticks from the WebSocket receive path
[OUTPUT]: Drained tick snapshots and last known prices per symbol
[POS]:    Market data layer - pull queue shared by session and facade
[UPDATE]: When changing queue semantics or price cache sources
*/

use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::types::{Symbol, Tick};

/// Unbounded tick queue; draining hands over the contents and clears it
#[derive(Debug, Default)]
pub struct PendingTicks {
    queue: Mutex<Vec<Tick>>,
}

impl PendingTicks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tick: Tick) {
        self.queue.lock().push(tick);
    }

    /// Take everything queued so far
    pub fn drain(&self) -> Vec<Tick> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Last streamed price per engine symbol
#[derive(Debug, Default)]
pub struct LastPrices {
    prices: DashMap<String, Decimal>,
}

impl LastPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, tick: &Tick) {
        if tick.value > Decimal::ZERO {
            self.prices.insert(tick.symbol.value.clone(), tick.value);
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.get(&symbol.value).map(|price| *price)
    }

    pub fn clear(&self) {
        self.prices.clear();
    }
}
