/*
[INPUT]:  Raw WebSocket text frames
[OUTPUT]: Typed events, channel payloads and account updates
[POS]:    WebSocket layer - message parsing and validation
[UPDATE]: When adding new message types or changing format
*/

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::http::{BitfinexError, Result};
use crate::ledger::Execution;
use crate::mapping::numeric::{decimal_from_value, i64_from_value};

/// Account data arrives on this channel once authenticated
pub const ACCOUNT_CHANNEL: i64 = 0;
const HEARTBEAT: &str = "hb";

/// JSON object frames, discriminated by `event`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ServerEvent {
    Info {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        msg: Option<String>,
        #[serde(default)]
        version: Option<f64>,
    },
    Subscribed {
        channel: String,
        #[serde(rename = "chanId")]
        chan_id: i64,
        #[serde(default)]
        pair: Option<String>,
    },
    Unsubscribed {
        #[serde(default)]
        status: Option<String>,
        #[serde(rename = "chanId")]
        chan_id: i64,
    },
    Auth {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        msg: Option<String>,
    },
    Error {
        #[serde(default)]
        msg: Option<String>,
        #[serde(default)]
        code: Option<i64>,
    },
    #[serde(other)]
    Other,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(ServerEvent),
    Heartbeat { chan_id: i64 },
    /// Channel 0 message: `[0, tag, payload]`
    Account { tag: String, payload: Value },
    /// Data on a subscribed channel, with the channel id stripped
    Channel { chan_id: i64, fields: Vec<Value> },
}

pub fn parse_frame(text: &str) -> Result<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(_) => Ok(InboundFrame::Event(serde_json::from_value(value)?)),
        Value::Array(mut items) => {
            if items.is_empty() {
                return Err(BitfinexError::InvalidResponse("empty array frame".to_string()));
            }
            let chan_id = i64_from_value(&items[0]).ok_or_else(|| {
                BitfinexError::InvalidResponse(format!("bad channel id: {}", items[0]))
            })?;
            let mut fields = items.split_off(1);

            if fields.first().and_then(Value::as_str) == Some(HEARTBEAT) {
                return Ok(InboundFrame::Heartbeat { chan_id });
            }

            if chan_id == ACCOUNT_CHANNEL {
                let tag = fields
                    .first()
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        BitfinexError::InvalidResponse("account frame without tag".to_string())
                    })?;
                let payload = fields.get(1).cloned().unwrap_or(Value::Null);
                return Ok(InboundFrame::Account { tag, payload });
            }

            // `[chanId, [fields...]]` carries the same layout one level down
            if fields.len() == 1
                && let Some(Value::Array(inner)) = fields.first()
                && inner.first().is_some_and(|first| !first.is_array())
            {
                fields = inner.clone();
            }

            Ok(InboundFrame::Channel { chan_id, fields })
        }
        other => Err(BitfinexError::InvalidResponse(format!(
            "unexpected frame: {other}"
        ))),
    }
}

/// Ticker fields, each parsed on its own so one bad field drops only itself
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickerSnapshot {
    pub bid: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub daily_change: Option<Decimal>,
    pub daily_change_perc: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
}

impl TickerSnapshot {
    /// `[BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_PERC,
    /// LAST_PRICE, VOLUME, HIGH, LOW]`
    pub fn from_fields(fields: &[Value]) -> Self {
        let field = |index: usize| fields.get(index).and_then(decimal_from_value);
        Self {
            bid: field(0),
            bid_size: field(1),
            ask: field(2),
            ask_size: field(3),
            daily_change: field(4),
            daily_change_perc: field(5),
            last_price: field(6),
            volume: field(7),
            high: field(8),
            low: field(9),
        }
    }

    /// Mean of bid and ask when both are quoted, else the last price
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => bid
                .checked_add(ask)
                .and_then(|sum| sum.checked_div(Decimal::TWO))
                .or(self.last_price),
            _ => self.last_price,
        }
    }
}

/// One print on the public trades channel
#[derive(Debug, Clone, PartialEq)]
pub struct PublicTrade {
    /// `te` is the first announcement, `tu` repeats it with the trade id
    pub update: bool,
    pub trade_id: Option<i64>,
    pub time: DateTime<Utc>,
    pub price: Decimal,
    pub amount: Decimal,
}

impl PublicTrade {
    /// `["te", SEQ, TIMESTAMP, PRICE, AMOUNT]` or
    /// `["tu", SEQ, ID, TIMESTAMP, PRICE, AMOUNT]`
    pub fn from_fields(fields: &[Value]) -> Option<Self> {
        let update = match fields.first()?.as_str()? {
            "te" => false,
            "tu" => true,
            _ => return None,
        };
        let offset = if update { 3 } else { 2 };
        Some(Self {
            update,
            trade_id: if update { fields.get(2).and_then(i64_from_value) } else { None },
            time: timestamp_from(fields.get(offset)),
            price: fields.get(offset + 1).and_then(decimal_from_value)?,
            amount: fields.get(offset + 2).and_then(decimal_from_value)?,
        })
    }
}

/// `[TRD_ID, SEQ, PAIR, TIMESTAMP, ORD_ID, AMOUNT_EXECUTED, PRICE_EXECUTED,
/// ORD_TYPE, ORD_PRICE, FEE, FEE_CURRENCY]`
///
/// Order id, amount and price are required; the fee fields are absent on the
/// provisional `te` notice and default to zero.
pub fn parse_execution(payload: &Value) -> Option<Execution> {
    let fields = payload.as_array()?;
    Some(Execution {
        trade_id: fields.first().and_then(i64_from_value),
        broker_order_id: fields.get(4).and_then(i64_from_value)?,
        pair: fields
            .get(2)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        time: timestamp_from(fields.get(3)),
        amount: fields.get(5).and_then(decimal_from_value)?,
        price: fields.get(6).and_then(decimal_from_value)?,
        order_type: fields
            .get(7)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        order_price: fields.get(8).and_then(decimal_from_value),
        fee: fields
            .get(9)
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO),
        fee_currency: fields
            .get(10)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletUpdate {
    pub wallet: String,
    pub currency: String,
    pub balance: Decimal,
}

/// Wallet lines of a `ws` snapshot (array of rows) or a `wu` update (one row)
pub fn parse_wallets(payload: &Value) -> Vec<WalletUpdate> {
    let Some(items) = payload.as_array() else {
        return Vec::new();
    };
    if items.first().is_some_and(Value::is_array) {
        items.iter().filter_map(wallet_row).collect()
    } else {
        wallet_row(payload).into_iter().collect()
    }
}

fn wallet_row(row: &Value) -> Option<WalletUpdate> {
    let fields = row.as_array()?;
    Some(WalletUpdate {
        wallet: fields.first()?.as_str()?.to_ascii_lowercase(),
        currency: fields.get(1)?.as_str()?.to_ascii_uppercase(),
        balance: fields.get(2).and_then(decimal_from_value)?,
    })
}

/// Exchange timestamps are seconds, possibly fractional
fn timestamp_from(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(decimal_from_value)
        .and_then(|seconds| {
            let millis = seconds.checked_mul(Decimal::ONE_THOUSAND)?.trunc();
            i64::try_from(millis).ok()
        })
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_events() {
        let frame = parse_frame(r#"{"event":"info","version":1.1}"#).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Event(ServerEvent::Info { code: None, .. })
        ));

        let frame = parse_frame(r#"{"event":"info","code":20061,"msg":"resubscribe"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Event(ServerEvent::Info {
                code: Some(20061),
                msg: Some("resubscribe".to_string()),
                version: None,
            })
        );

        let frame = parse_frame(
            r#"{"event":"subscribed","channel":"ticker","chanId":2,"pair":"BTCUSD"}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Event(ServerEvent::Subscribed { chan_id: 2, .. })
        ));

        let frame = parse_frame(r#"{"event":"pong","ts":1}"#).unwrap();
        assert_eq!(frame, InboundFrame::Event(ServerEvent::Other));
    }

    #[test]
    fn parses_heartbeats_and_account_frames() {
        assert_eq!(
            parse_frame(r#"[5,"hb"]"#).unwrap(),
            InboundFrame::Heartbeat { chan_id: 5 }
        );
        assert_eq!(
            parse_frame(r#"[0,"hb"]"#).unwrap(),
            InboundFrame::Heartbeat { chan_id: 0 }
        );

        let frame = parse_frame(r#"[0,"wu",["exchange","USD",100.5,0]]"#).unwrap();
        match frame {
            InboundFrame::Account { tag, payload } => {
                assert_eq!(tag, "wu");
                assert_eq!(parse_wallets(&payload)[0].balance, dec!(100.5));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn ticker_bad_field_drops_only_that_field() {
        let frame = parse_frame(r#"[3,236.62,9.0,236.88,7.1,1.1,"garbage",236.52,5191.36,245.0,224.0]"#)
            .unwrap();
        let InboundFrame::Channel { chan_id, fields } = frame else {
            panic!("expected channel frame");
        };
        assert_eq!(chan_id, 3);

        let ticker = TickerSnapshot::from_fields(&fields);
        assert_eq!(ticker.bid, Some(dec!(236.62)));
        assert_eq!(ticker.bid_size, Some(dec!(9.0)));
        assert_eq!(ticker.ask, Some(dec!(236.88)));
        assert_eq!(ticker.ask_size, Some(dec!(7.1)));
        assert_eq!(ticker.daily_change, Some(dec!(1.1)));
        assert_eq!(ticker.daily_change_perc, None);
        assert_eq!(ticker.last_price, Some(dec!(236.52)));
        assert_eq!(ticker.mid(), Some(dec!(236.75)));
    }

    #[test]
    fn ticker_mid_falls_back_to_last_price() {
        let ticker = TickerSnapshot {
            bid: Some(dec!(10)),
            last_price: Some(dec!(11)),
            ..Default::default()
        };
        assert_eq!(ticker.mid(), Some(dec!(11)));
    }

    #[test]
    fn oversized_bid_ask_fall_back_to_last_price() {
        let fields = serde_json::json!([
            "79228162514264337593543950335", 1, "79228162514264337593543950335", 1,
            0, 0, "250.5", 0, 0, 0
        ]);
        let ticker = TickerSnapshot::from_fields(fields.as_array().unwrap());
        assert_eq!(ticker.bid, Some(Decimal::MAX));
        assert_eq!(ticker.mid(), Some(dec!(250.5)));
    }

    #[test]
    fn oversized_timestamp_is_replaced_by_now() {
        let before = Utc::now();
        let te = serde_json::json!(["te", "1-BTCUSD", "79228162514264337593543950335", 236.42, 0.5]);
        let trade = PublicTrade::from_fields(te.as_array().unwrap()).unwrap();
        assert!(trade.time >= before);
        assert_eq!(trade.price, dec!(236.42));
    }

    #[test]
    fn nested_channel_payload_is_flattened() {
        let frame = parse_frame(r#"[3,[1,2,3,4,5,6,7,8,9,10]]"#).unwrap();
        let InboundFrame::Channel { fields, .. } = frame else {
            panic!("expected channel frame");
        };
        assert_eq!(fields.len(), 10);
    }

    #[test]
    fn public_trades() {
        let te = serde_json::json!(["te", "1234-BTCUSD", 1443659698, 236.42, 0.49064538]);
        let trade = PublicTrade::from_fields(te.as_array().unwrap()).unwrap();
        assert!(!trade.update);
        assert_eq!(trade.price, dec!(236.42));
        assert_eq!(trade.time.timestamp(), 1443659698);

        let tu = serde_json::json!(["tu", "1234-BTCUSD", 15254529, 1443659698, 236.42, -0.49]);
        let trade = PublicTrade::from_fields(tu.as_array().unwrap()).unwrap();
        assert!(trade.update);
        assert_eq!(trade.trade_id, Some(15254529));
        assert_eq!(trade.amount, dec!(-0.49));

        let snapshot = serde_json::json!([[1, 2, 3, 4]]);
        assert!(PublicTrade::from_fields(snapshot.as_array().unwrap()).is_none());
    }

    #[test]
    fn account_execution() {
        let payload = serde_json::json!([
            "15254529", "1234-BTCUSD", "BTCUSD", 1443659698, 448364249,
            "-0.5", "240.1", "EXCHANGE LIMIT", "240.0", "-0.24", "USD"
        ]);
        let execution = parse_execution(&payload).unwrap();
        assert_eq!(execution.trade_id, Some(15254529));
        assert_eq!(execution.broker_order_id, 448364249);
        assert_eq!(execution.amount, dec!(-0.5));
        assert_eq!(execution.fee, dec!(-0.24));
        assert_eq!(execution.fee_currency, "USD");

        let provisional = serde_json::json!(["1234-BTCUSD", 1443659698, "BTCUSD", 1443659698, 1, "1", "2"]);
        let execution = parse_execution(&provisional).unwrap();
        assert_eq!(execution.trade_id, None);
        assert_eq!(execution.fee, Decimal::ZERO);

        assert!(parse_execution(&serde_json::json!(["1", "2", "BTCUSD"])).is_none());
    }

    #[test]
    fn wallet_snapshot_rows() {
        let payload = serde_json::json!([
            ["exchange", "usd", 100, 0],
            ["trading", "BTC", "1.5", 0],
            ["broken"]
        ]);
        let wallets = parse_wallets(&payload);
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].currency, "USD");
        assert_eq!(wallets[1].wallet, "trading");
    }

    #[test]
    fn rejects_non_frames() {
        assert!(parse_frame("not json").is_err());
        assert!(parse_frame("[]").is_err());
        assert!(parse_frame("42").is_err());
    }
}
