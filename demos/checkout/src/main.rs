//! Checkout flow: reserve stock concurrently, race two payment providers,
//! and keep a ledger session open for the whole order.
//!
//! Run: `cargo run -p checkout [path/to/behaviour.toml]`

use async_trait::async_trait;
use rivulet::prelude::*;
use rivulet::init_stdout_tracing;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, thiserror::Error)]
#[error("card declined by {0}")]
struct CardDeclined(&'static str);

#[derive(Debug, Clone)]
struct Receipt {
    provider: &'static str,
    amount_cents: u64,
}

struct LedgerSession {
    order_id: u32,
}

#[async_trait]
impl Resource for LedgerSession {
    async fn dispose(&self) -> anyhow::Result<()> {
        tracing::info!(order_id = self.order_id, "ledger session closed");
        Ok(())
    }
}

fn reserve(item: &'static str, price_cents: u64) -> Flow<u64> {
    Flow::create_async(move || async move {
        sleep(Duration::from_millis(20)).await;
        tracing::info!(item, "stock reserved");
        Ok(price_cents)
    })
}

/// Fails twice before accepting, to exercise retry.
fn flaky_provider(amount_cents: u64) -> Flow<Receipt> {
    let calls = Arc::new(AtomicU32::new(0));
    Flow::create_async(move || {
        let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            sleep(Duration::from_millis(30)).await;
            if attempt < 3 {
                anyhow::bail!("provider-a busy (attempt {attempt})");
            }
            Ok(Receipt {
                provider: "provider-a",
                amount_cents,
            })
        }
    })
}

/// Takes longer than the deadline, so it always loses.
fn slow_provider(amount_cents: u64) -> Flow<Receipt> {
    Flow::create_cancellable(move |scope: CancelScope| async move {
        tokio::select! {
            _ = scope.cancelled() => Err(anyhow::Error::new(FlowError::Cancelled)),
            _ = sleep(Duration::from_secs(2)) => Ok(Receipt {
                provider: "provider-b",
                amount_cents,
            }),
        }
    })
}

fn checkout(order_id: u32, payment: BehaviourConfig) -> Flow<Receipt> {
    let open_session = move || async move {
        tracing::info!(order_id, "ledger session opened");
        Ok(LedgerSession { order_id })
    };

    Flow::with_resource_async(open_session, move |session| {
        let payment = payment.clone();
        let order_id = session.order_id;
        let flow = Flow::all(vec![
            reserve("keyboard", 4_900),
            reserve("mouse", 2_500),
            reserve("cable", 900),
        ])
        .select(|prices| Ok(prices.iter().sum::<u64>()))
        .chain(move |total| {
            let race = Flow::any(vec![flaky_provider(total), slow_provider(total)]);
            Ok(race.with_config(&payment)?)
        })
        .validate(
            |receipt| Ok(receipt.amount_cents > 0),
            |receipt| CardDeclined(receipt.provider).into(),
        )
        .do_on_success(move |receipt| {
            tracing::info!(order_id, provider = receipt.provider, "payment captured");
            Ok(())
        })
        .do_on_failure(move |err| {
            tracing::warn!(order_id, error = %err, "checkout failed");
            Ok(())
        });
        Ok(flow)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_stdout_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => BehaviourConfig::from_path(path)?,
        None => BehaviourConfig::from_toml_str(include_str!("../behaviour.toml"))?,
    };

    let flow = checkout(1042, config);
    println!("{}", serde_json::to_string_pretty(&flow.schematic("checkout").to_json())?);

    match flow.run(&CancelScope::new()).await {
        Outcome::Success(receipt) => {
            println!("paid {} cents via {}", receipt.amount_cents, receipt.provider);
        }
        Outcome::Failure(err) => {
            println!("checkout failed: {err}");
        }
    }
    Ok(())
}
