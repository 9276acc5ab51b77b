/*
[INPUT]:  Engine symbols and raw exchange pair strings
[OUTPUT]: Validated translations in both directions and cached trading pairs
[POS]:    Mapping layer - symbol identity translation
[UPDATE]: When the exchange lists or delists pairs
*/

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::http::{BitfinexError, Result};
use crate::types::{MARKET_BITFINEX, SecurityType, Symbol, TradingPair};

/// Pairs accepted by the connector, as (base, quote).
const KNOWN_PAIRS: &[(&str, &str)] = &[
    ("BTC", "USD"),
    ("LTC", "USD"),
    ("LTC", "BTC"),
    ("ETH", "USD"),
    ("ETH", "BTC"),
    ("ETC", "BTC"),
    ("ETC", "USD"),
    ("RRT", "USD"),
    ("RRT", "BTC"),
    ("ZEC", "USD"),
    ("ZEC", "BTC"),
    ("XMR", "USD"),
    ("XMR", "BTC"),
    ("DSH", "USD"),
    ("DSH", "BTC"),
    ("BCC", "BTC"),
    ("BCU", "BTC"),
    ("BCC", "USD"),
    ("BCU", "USD"),
    ("XRP", "USD"),
    ("XRP", "BTC"),
    ("IOT", "USD"),
    ("IOT", "BTC"),
    ("IOT", "ETH"),
    ("EOS", "USD"),
    ("EOS", "BTC"),
    ("EOS", "ETH"),
    ("SAN", "USD"),
    ("SAN", "BTC"),
    ("SAN", "ETH"),
    ("OMG", "USD"),
    ("OMG", "BTC"),
    ("OMG", "ETH"),
    ("BCH", "USD"),
    ("BCH", "BTC"),
    ("BCH", "ETH"),
    ("NEO", "USD"),
    ("NEO", "BTC"),
    ("NEO", "ETH"),
    ("ETP", "USD"),
    ("ETP", "BTC"),
    ("ETP", "ETH"),
    ("QTM", "USD"),
    ("QTM", "BTC"),
    ("QTM", "ETH"),
    ("AVT", "USD"),
    ("AVT", "BTC"),
    ("AVT", "ETH"),
    ("EDO", "USD"),
    ("EDO", "BTC"),
    ("EDO", "ETH"),
    ("BTG", "USD"),
    ("BTG", "BTC"),
    ("DAT", "USD"),
    ("DAT", "BTC"),
    ("DAT", "ETH"),
    ("QSH", "USD"),
    ("QSH", "BTC"),
    ("QSH", "ETH"),
    ("YYW", "USD"),
    ("YYW", "BTC"),
    ("YYW", "ETH"),
    ("GNT", "USD"),
    ("GNT", "BTC"),
    ("GNT", "ETH"),
    ("SNT", "USD"),
    ("SNT", "BTC"),
    ("SNT", "ETH"),
];

static PAIRS: LazyLock<HashMap<String, TradingPair>> = LazyLock::new(|| {
    KNOWN_PAIRS
        .iter()
        .map(|(base, quote)| {
            let raw = format!("{base}{quote}");
            let pair = TradingPair {
                base: (*base).to_string(),
                quote: (*quote).to_string(),
                raw: raw.clone(),
                symbol: Symbol::crypto(&raw),
            };
            (raw, pair)
        })
        .collect()
});

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Translates between engine symbols and exchange pair strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolMapper;

impl SymbolMapper {
    pub fn new() -> Self {
        Self
    }

    /// Exchange pair string (upper case) for an engine symbol.
    pub fn to_brokerage_symbol(&self, symbol: &Symbol) -> Result<String> {
        Ok(self.trading_pair(symbol)?.raw.clone())
    }

    /// Engine symbol for a raw exchange pair.
    ///
    /// When `security_type`/`market` are given they must be crypto on this
    /// exchange.
    pub fn to_engine_symbol(
        &self,
        raw: &str,
        security_type: Option<SecurityType>,
        market: Option<&str>,
    ) -> Result<Symbol> {
        if raw.trim().is_empty() {
            return Err(BitfinexError::InvalidSymbol(
                "exchange symbol is empty".to_string(),
            ));
        }
        if let Some(security_type) = security_type
            && security_type != SecurityType::Crypto
        {
            return Err(BitfinexError::InvalidSymbol(format!(
                "{raw}: security type {security_type:?} is not supported"
            )));
        }
        if let Some(market) = market
            && !market.trim().eq_ignore_ascii_case(MARKET_BITFINEX)
        {
            return Err(BitfinexError::InvalidSymbol(format!(
                "{raw}: market {market} is not supported"
            )));
        }

        self.pair_for_raw(raw)
            .map(|pair| pair.symbol.clone())
            .ok_or_else(|| BitfinexError::InvalidSymbol(format!("unknown exchange symbol: {raw}")))
    }

    /// Membership test on the raw exchange string; never fails.
    pub fn is_known_symbol(&self, raw: &str) -> bool {
        !raw.trim().is_empty() && PAIRS.contains_key(&normalize(raw))
    }

    /// Cached pair for an engine symbol, validating type and market.
    pub fn trading_pair(&self, symbol: &Symbol) -> Result<&'static TradingPair> {
        if symbol.value.trim().is_empty() {
            return Err(BitfinexError::InvalidSymbol("symbol is empty".to_string()));
        }
        if symbol.security_type != SecurityType::Crypto {
            return Err(BitfinexError::InvalidSymbol(format!(
                "{}: security type {:?} is not supported",
                symbol.value, symbol.security_type
            )));
        }
        if !symbol.market.eq_ignore_ascii_case(MARKET_BITFINEX) {
            return Err(BitfinexError::InvalidSymbol(format!(
                "{}: market {} is not supported",
                symbol.value, symbol.market
            )));
        }

        self.pair_for_raw(&symbol.value).ok_or_else(|| {
            BitfinexError::InvalidSymbol(format!("unknown symbol: {}", symbol.value))
        })
    }

    /// Cached pair for a raw exchange string, if known.
    pub fn pair_for_raw(&self, raw: &str) -> Option<&'static TradingPair> {
        PAIRS.get(&normalize(raw))
    }

    /// Pair trading `base` against `quote`, if listed.
    pub fn pair_for_currencies(&self, base: &str, quote: &str) -> Option<&'static TradingPair> {
        self.pair_for_raw(&format!("{base}{quote}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_brokerage_symbol_upper_cases() {
        let mapper = SymbolMapper::new();
        let symbol = Symbol::new("btcusd", SecurityType::Crypto, "bitfinex");
        assert_eq!(mapper.to_brokerage_symbol(&symbol).unwrap(), "BTCUSD");
    }

    #[test]
    fn to_brokerage_symbol_rejects_invalid_input() {
        let mapper = SymbolMapper::new();
        let cases = [
            Symbol::crypto(""),
            Symbol::crypto("ABCXYZ"),
            Symbol::new("BTCUSD", SecurityType::Forex, MARKET_BITFINEX),
            Symbol::new("BTCUSD", SecurityType::Crypto, "gdax"),
        ];
        for symbol in cases {
            let err = mapper.to_brokerage_symbol(&symbol).unwrap_err();
            assert!(matches!(err, BitfinexError::InvalidSymbol(_)), "{symbol:?}");
        }
    }

    #[test]
    fn to_engine_symbol_matches_case_insensitively() {
        let mapper = SymbolMapper::new();
        let symbol = mapper.to_engine_symbol("ethbtc", None, None).unwrap();
        assert_eq!(symbol.value, "ETHBTC");
        assert_eq!(symbol.security_type, SecurityType::Crypto);
        assert_eq!(symbol.market, MARKET_BITFINEX);
    }

    #[test]
    fn to_engine_symbol_validates_type_and_market() {
        let mapper = SymbolMapper::new();
        assert!(mapper.to_engine_symbol("", None, None).is_err());
        assert!(mapper.to_engine_symbol("   ", None, None).is_err());
        assert!(mapper.to_engine_symbol("XYZABC", None, None).is_err());
        assert!(
            mapper
                .to_engine_symbol("BTCUSD", Some(SecurityType::Equity), None)
                .is_err()
        );
        assert!(
            mapper
                .to_engine_symbol("BTCUSD", Some(SecurityType::Crypto), Some("binance"))
                .is_err()
        );
        assert!(
            mapper
                .to_engine_symbol("BTCUSD", Some(SecurityType::Crypto), Some("Bitfinex"))
                .is_ok()
        );
    }

    #[test]
    fn is_known_symbol_never_fails() {
        let mapper = SymbolMapper::new();
        assert!(!mapper.is_known_symbol(""));
        assert!(!mapper.is_known_symbol("  "));
        assert!(!mapper.is_known_symbol("NOPE"));
        assert!(mapper.is_known_symbol("btcusd"));
        assert!(mapper.is_known_symbol(" LTCBTC "));
    }

    #[test]
    fn round_trip_is_stable_for_all_known_pairs() {
        let mapper = SymbolMapper::new();
        for (base, quote) in KNOWN_PAIRS {
            let raw = format!("{base}{quote}").to_ascii_lowercase();
            let engine = mapper.to_engine_symbol(&raw, None, None).unwrap();
            let brokerage = mapper.to_brokerage_symbol(&engine).unwrap();
            let again = mapper.to_engine_symbol(&brokerage, None, None).unwrap();
            assert_eq!(again, engine);
        }
    }

    #[test]
    fn trading_pair_splits_base_and_quote() {
        let mapper = SymbolMapper::new();
        let pair = mapper.trading_pair(&Symbol::crypto("IOTETH")).unwrap();
        assert_eq!(pair.base, "IOT");
        assert_eq!(pair.quote, "ETH");
        assert_eq!(pair.wire_symbol(), "ioteth");
        assert_eq!(
            mapper.pair_for_currencies("BTC", "USD").map(|p| p.raw.as_str()),
            Some("BTCUSD")
        );
    }
}
