/*
[INPUT]:  Config file path (BITFINEX_CONFIG) or BITFINEX_API_KEY / BITFINEX_API_SECRET
[OUTPUT]: Streamed ticks and order/account events printed to stdout
[POS]:    Examples - live market data stream
[UPDATE]: When connection or subscription flow changes
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bitfinex_brokerage::*;
use tracing_subscriber::EnvFilter;

/// Example: stream BTCUSD and ETHUSD for thirty seconds
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("BITFINEX_CONFIG") {
        Ok(path) => BrokerageConfig::from_file(&path).with_context(|| format!("load {path}"))?,
        Err(_) => BrokerageConfig::new(
            std::env::var("BITFINEX_API_KEY").context("BITFINEX_API_KEY not set")?,
            std::env::var("BITFINEX_API_SECRET").context("BITFINEX_API_SECRET not set")?,
            AccountType::Cash,
        ),
    };

    let mut brokerage = BitfinexBrokerage::new(config, Arc::new(NoEngineContext))?;
    let mut events = brokerage
        .take_event_receiver()
        .context("event receiver already taken")?;

    brokerage.connect().await?;
    brokerage
        .subscribe(&[Symbol::crypto("BTCUSD"), Symbol::crypto("ETHUSD")])
        .await?;
    println!("✓ Subscribed, streaming for 30s\n");

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Some(event) = events.recv() => println!("event: {event:?}"),
            _ = poll.tick() => {
                for tick in brokerage.get_next_ticks() {
                    println!(
                        "{:<8} {:?} value={} bid={} ask={} qty={}",
                        tick.symbol.value, tick.kind, tick.value, tick.bid_price, tick.ask_price, tick.quantity
                    );
                }
            }
        }
    }

    for cash in brokerage.get_cash_balance().await? {
        println!("cash {} {} @ {}", cash.currency, cash.amount, cash.conversion_rate);
    }

    brokerage.disconnect().await;
    println!("\n✓ Stream example complete");
    Ok(())
}
