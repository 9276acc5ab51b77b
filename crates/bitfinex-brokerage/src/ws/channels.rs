/*
[INPUT]:  Subscription and unsubscription acks from the exchange
[OUTPUT]: Channel id -> (pair, kind) resolution for the current connection
[POS]:    WebSocket layer - connection-scoped channel bindings
[UPDATE]: When adding channel kinds or changing ack handling
*/

use dashmap::{DashMap, DashSet};

use crate::types::TradingPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Ticker,
    Trades,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trades => "trades",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ticker" => Some(ChannelKind::Ticker),
            "trades" => Some(ChannelKind::Trades),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub chan_id: i64,
    pub pair: &'static TradingPair,
    pub kind: ChannelKind,
}

/// Bindings confirmed by acks on the live connection.
///
/// Ids withdrawn by a forced resubscribe sit in a stale set until their
/// unsubscribe ack arrives, so that ack cannot remove a fresh binding that
/// reuses the id.
#[derive(Debug, Default)]
pub struct ChannelTable {
    bindings: DashMap<i64, ChannelBinding>,
    stale: DashSet<i64>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an acked channel, returning the binding it replaced
    pub fn bind(&self, chan_id: i64, pair: &'static TradingPair, kind: ChannelKind) -> Option<ChannelBinding> {
        self.bindings
            .insert(chan_id, ChannelBinding { chan_id, pair, kind })
    }

    pub fn resolve(&self, chan_id: i64) -> Option<ChannelBinding> {
        self.bindings.get(&chan_id).map(|binding| *binding)
    }

    /// Withdraw every binding at once, keeping the ids as stale
    pub fn invalidate(&self) -> Vec<ChannelBinding> {
        let withdrawn: Vec<ChannelBinding> =
            self.bindings.iter().map(|entry| *entry.value()).collect();
        for binding in &withdrawn {
            self.bindings.remove(&binding.chan_id);
            self.stale.insert(binding.chan_id);
        }
        withdrawn
    }

    /// Handle an unsubscribe ack
    pub fn unbind(&self, chan_id: i64) -> Option<ChannelBinding> {
        if self.stale.remove(&chan_id).is_some() {
            return None;
        }
        self.bindings.remove(&chan_id).map(|(_, binding)| binding)
    }

    /// Channel ids currently bound to a pair
    pub fn channels_for(&self, pair: &TradingPair) -> Vec<ChannelBinding> {
        self.bindings
            .iter()
            .filter(|entry| entry.pair.raw == pair.raw)
            .map(|entry| *entry.value())
            .collect()
    }

    /// Forget everything; ids do not survive a reconnect
    pub fn clear(&self) {
        self.bindings.clear();
        self.stale.clear();
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
