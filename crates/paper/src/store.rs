use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use common::{ClosedTrade, Error, Position, PositionStore, Result, TelemetryRow, TradeSide};

/// In-memory `PositionStore` for paper runs without a database and for tests.
///
/// Mirrors the SQLite store's constraints: one open position per
/// (symbol, side), and updates to unknown positions fail.
#[derive(Default)]
pub struct MemoryStore {
    open: RwLock<HashMap<(String, TradeSide), Position>>,
    trades: RwLock<Vec<ClosedTrade>>,
    telemetry: RwLock<Vec<TelemetryRow>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.open.read().await.values().cloned().collect()
    }

    pub async fn trades(&self) -> Vec<ClosedTrade> {
        self.trades.read().await.clone()
    }

    pub async fn telemetry(&self) -> Vec<TelemetryRow> {
        self.telemetry.read().await.clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn load_open_position(&self, symbol: &str, side: TradeSide) -> Result<Option<Position>> {
        Ok(self.open.read().await.get(&(symbol.to_string(), side)).cloned())
    }

    async fn load_open_positions(&self, side: TradeSide) -> Result<Vec<Position>> {
        let mut open: Vec<Position> = self
            .open
            .read()
            .await
            .values()
            .filter(|p| p.side == side)
            .cloned()
            .collect();
        open.sort_by_key(|p| p.opened_at);
        Ok(open)
    }

    async fn record_trade_open(&self, position: &Position) -> Result<()> {
        self.check()?;
        let key = (position.symbol.clone(), position.side);
        let mut open = self.open.write().await;
        if open.contains_key(&key) {
            return Err(Error::Persistence(format!(
                "{} {} already has an open position",
                position.symbol, position.side
            )));
        }
        open.insert(key, position.clone());
        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        self.check()?;
        let mut open = self.open.write().await;
        let existing = open
            .values_mut()
            .find(|p| p.id == position.id)
            .ok_or_else(|| Error::Persistence(format!("no open position with id {}", position.id)))?;
        existing.stop_loss = position.stop_loss;
        existing.trailing_active = position.trailing_active;
        Ok(())
    }

    async fn record_trade_close(&self, trade: &ClosedTrade) -> Result<()> {
        self.check()?;
        let id = &trade.position.id;
        self.open.write().await.retain(|_, p| &p.id != id);
        let mut trades = self.trades.write().await;
        if !trades.iter().any(|t| &t.position.id == id) {
            trades.push(trade.clone());
        }
        Ok(())
    }

    async fn append_telemetry_row(&self, row: &TelemetryRow) -> Result<()> {
        self.check()?;
        self.telemetry.write().await.push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{ErrorKind, ExitReason, Fill, OrderSide, Signal};

    fn position(id: &str, symbol: &str) -> Position {
        let signal = Signal {
            side: TradeSide::Long,
            entry_price: 10.0,
            stop_loss: 9.7,
            take_profit: 10.8,
            volume: 1.0,
            score: 1.0,
            reason: String::new(),
        };
        let fill = Fill {
            order_id: id.into(),
            symbol: symbol.into(),
            side: OrderSide::Buy,
            fill_price: 10.0,
            quantity: 3.0,
            timestamp: Utc::now(),
        };
        Position::open(symbol, &signal, &fill)
    }

    #[tokio::test]
    async fn duplicate_open_on_same_side_is_rejected() {
        let store = MemoryStore::new();
        store.record_trade_open(&position("a", "XRPUSDT")).await.unwrap();
        let err = store.record_trade_open(&position("b", "XRPUSDT")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn side_scan_ignores_the_other_side() {
        let store = MemoryStore::new();
        store.record_trade_open(&position("a", "XRPUSDT")).await.unwrap();
        assert_eq!(store.load_open_positions(TradeSide::Long).await.unwrap().len(), 1);
        assert!(store.load_open_positions(TradeSide::Short).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = MemoryStore::new();
        let pos = position("a", "XRPUSDT");
        store.record_trade_open(&pos).await.unwrap();
        let exit = Fill {
            order_id: "x".into(),
            symbol: "XRPUSDT".into(),
            side: OrderSide::Sell,
            fill_price: 10.8,
            quantity: 3.0,
            timestamp: Utc::now(),
        };
        let trade = ClosedTrade::new(pos, ExitReason::TakeProfit, &exit);
        store.record_trade_close(&trade).await.unwrap();
        store.record_trade_close(&trade).await.unwrap();

        assert!(store.open_positions().await.is_empty());
        assert_eq!(store.trades().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_store_rejects_writes_but_still_reads() {
        let store = MemoryStore::new();
        store.record_trade_open(&position("a", "XRPUSDT")).await.unwrap();
        store.set_failing(true);
        let mut moved = position("a", "XRPUSDT");
        moved.stop_loss = 10.0;
        assert!(store.update_position(&moved).await.is_err());
        let loaded = store
            .load_open_position("XRPUSDT", TradeSide::Long)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.stop_loss, 9.7);
    }
}
