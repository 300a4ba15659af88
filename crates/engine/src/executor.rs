use std::sync::Arc;

use tracing::{error, info};

use common::{ClosedTrade, Error, ExitReason, Order, OrderGateway, Position, Result};
use strategy::Candidate;

/// Turns entry candidates and exit decisions into exchange orders.
///
/// This is the ONLY component that calls `OrderGateway::submit_order`.
/// Nothing is reported as opened or closed without a `Fill`.
pub struct OrderExecutor {
    gateway: Arc<dyn OrderGateway>,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self { gateway }
    }

    /// Open a position worth `notional_usd` at the candidate's entry price.
    pub async fn open(&self, candidate: &Candidate, notional_usd: f64) -> Result<Position> {
        let signal = &candidate.signal;
        signal.validate()?;

        let quantity = notional_usd / signal.entry_price;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(Error::InvalidSignal(format!(
                "cannot size {notional_usd} USD at {}",
                signal.entry_price
            )));
        }

        let order = Order::market(
            &candidate.symbol,
            signal.side.entry_order_side(),
            quantity,
            signal.entry_price,
        );
        info!(symbol = %order.symbol, side = %signal.side, qty = quantity, "Executing entry order");

        let fill = self.gateway.submit_order(&order).await.map_err(|e| {
            error!(symbol = %order.symbol, error = %e, "Entry order failed");
            as_execution(e)
        })?;

        info!(
            symbol = %fill.symbol,
            price = fill.fill_price,
            qty = fill.quantity,
            "Entry order filled"
        );
        Ok(Position::open(&candidate.symbol, signal, &fill))
    }

    /// Close `position` with a reduce-only market order.
    pub async fn close(
        &self,
        position: &Position,
        reason: ExitReason,
        last_price: f64,
    ) -> Result<ClosedTrade> {
        let order = Order::market(
            &position.symbol,
            position.side.exit_order_side(),
            position.quantity,
            last_price,
        )
        .reduce_only();
        info!(symbol = %order.symbol, side = %position.side, reason = %reason, "Executing exit order");

        let fill = self.gateway.submit_order(&order).await.map_err(|e| {
            error!(symbol = %order.symbol, error = %e, "Exit order failed");
            as_execution(e)
        })?;

        info!(
            symbol = %fill.symbol,
            price = fill.fill_price,
            qty = fill.quantity,
            "Exit order filled"
        );
        Ok(ClosedTrade::new(position.clone(), reason, &fill))
    }
}

/// Anything that goes wrong talking to the gateway is an execution failure
/// from the orchestrator's point of view.
fn as_execution(e: Error) -> Error {
    match e {
        Error::Execution(_) => e,
        other => Error::Execution(other.to_string()),
    }
}
