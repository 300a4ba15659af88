pub mod store;

pub use store::MemoryStore;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{Error, Fill, Order, OrderGateway, OrderSide, Result};

/// Simulated order gateway for paper trading.
///
/// Fills at the order's reference price (the last observed close) with
/// configurable slippage. No real orders are ever sent to Binance.
pub struct PaperClient {
    /// Signed base-asset holdings per symbol: positive long, negative short.
    holdings: Arc<RwLock<HashMap<String, f64>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    rejecting: AtomicBool,
}

impl PaperClient {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps = slippage_bps, "PaperClient initialized");
        Self {
            holdings: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
            rejecting: AtomicBool::new(false),
        }
    }

    /// Make every subsequent order fail, as an exchange outage would.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Current simulated holding for `symbol`.
    pub async fn holding(&self, symbol: &str) -> f64 {
        self.holdings.read().await.get(symbol).copied().unwrap_or(0.0)
    }

    fn fill_price(&self, side: OrderSide, reference: f64) -> f64 {
        // Buys pay more, sells receive less.
        match side {
            OrderSide::Buy => reference * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => reference * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl OrderGateway for PaperClient {
    async fn submit_order(&self, order: &Order) -> Result<Fill> {
        if self.rejecting.load(Ordering::SeqCst) {
            warn!(symbol = %order.symbol, "Paper gateway rejecting order");
            return Err(Error::Execution(format!(
                "paper gateway rejected {} {}",
                order.side, order.symbol
            )));
        }
        if !order.reference_price.is_finite() || order.reference_price <= 0.0 {
            return Err(Error::Execution(format!(
                "no usable price for {}: {}",
                order.symbol, order.reference_price
            )));
        }
        if !order.quantity.is_finite() || order.quantity <= 0.0 {
            return Err(Error::Execution(format!(
                "invalid quantity for {}: {}",
                order.symbol, order.quantity
            )));
        }

        let signed_qty = match order.side {
            OrderSide::Buy => order.quantity,
            OrderSide::Sell => -order.quantity,
        };

        let mut holdings = self.holdings.write().await;
        let held = holdings.get(&order.symbol).copied().unwrap_or(0.0);
        if order.reduce_only && (held == 0.0 || held.signum() == signed_qty.signum()) {
            return Err(Error::Execution(format!(
                "reduce-only {} on {} would not reduce holding {held}",
                order.side, order.symbol
            )));
        }

        let fill_price = self.fill_price(order.side, order.reference_price);
        let quantity = if order.reduce_only {
            order.quantity.min(held.abs())
        } else {
            order.quantity
        };
        let remaining = held + signed_qty.signum() * quantity;
        if remaining.abs() < 1e-12 {
            holdings.remove(&order.symbol);
        } else {
            holdings.insert(order.symbol.clone(), remaining);
        }
        drop(holdings);

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            reference = order.reference_price,
            fill = fill_price,
            qty = quantity,
            "Paper fill simulated"
        );

        Ok(Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            quantity,
            timestamp: Utc::now(),
        })
    }
}
