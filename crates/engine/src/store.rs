use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use common::{
    ClosedTrade, Error, Position, PositionStatus, PositionStore, Result, TelemetryRow, TradeSide,
};

/// SQLite-backed `PositionStore`. The `positions` table holds a row per open
/// position; closing moves it to `trades` in one transaction.
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.db).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: String,
    symbol: String,
    side: String,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    quantity: f64,
    trailing_active: bool,
    opened_at: String,
}

impl TryFrom<PositionRow> for Position {
    type Error = Error;

    fn try_from(row: PositionRow) -> Result<Self> {
        let opened_at = DateTime::parse_from_rfc3339(&row.opened_at)
            .map_err(|e| Error::Persistence(format!("bad opened_at '{}': {e}", row.opened_at)))?
            .with_timezone(&Utc);
        let side: TradeSide = row
            .side
            .parse()
            .map_err(|e| Error::Persistence(format!("position {}: {e}", row.id)))?;
        Ok(Position {
            id: row.id,
            symbol: row.symbol,
            side,
            entry_price: row.entry_price,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            quantity: row.quantity,
            trailing_active: row.trailing_active,
            opened_at,
            status: PositionStatus::Open,
            exit_reason: None,
        })
    }
}

#[async_trait]
impl PositionStore for SqliteStore {
    async fn load_open_position(&self, symbol: &str, side: TradeSide) -> Result<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as(
            r#"
            SELECT id, symbol, side, entry_price, stop_loss, take_profit, quantity,
                   trailing_active, opened_at
            FROM positions
            WHERE symbol = ?1 AND side = ?2
            "#,
        )
        .bind(symbol)
        .bind(side.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Position::try_from).transpose()
    }

    async fn load_open_positions(&self, side: TradeSide) -> Result<Vec<Position>> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            r#"
            SELECT id, symbol, side, entry_price, stop_loss, take_profit, quantity,
                   trailing_active, opened_at
            FROM positions
            WHERE side = ?1
            ORDER BY opened_at
            "#,
        )
        .bind(side.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    async fn record_trade_open(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (id, symbol, side, entry_price, stop_loss, take_profit,
                                   quantity, trailing_active, opened_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&position.id)
        .bind(&position.symbol)
        .bind(position.side.to_string())
        .bind(position.entry_price)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.quantity)
        .bind(position.trailing_active)
        .bind(position.opened_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE positions SET stop_loss = ?2, trailing_active = ?3
            WHERE id = ?1
            "#,
        )
        .bind(&position.id)
        .bind(position.stop_loss)
        .bind(position.trailing_active)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Persistence(format!(
                "no open position with id {}",
                position.id
            )));
        }
        Ok(())
    }

    async fn record_trade_close(&self, trade: &ClosedTrade) -> Result<()> {
        let p = &trade.position;
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM positions WHERE id = ?1")
            .bind(&p.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO trades (id, symbol, side, entry_price, exit_price, stop_loss, take_profit,
                                quantity, exit_reason, pnl_usd, pnl_ratio, opened_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&p.id)
        .bind(&p.symbol)
        .bind(p.side.to_string())
        .bind(p.entry_price)
        .bind(trade.exit_price)
        .bind(p.stop_loss)
        .bind(p.take_profit)
        .bind(p.quantity)
        .bind(trade.exit_reason.as_str())
        .bind(trade.pnl_usd)
        .bind(trade.pnl_ratio)
        .bind(p.opened_at.to_rfc3339())
        .bind(trade.closed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_telemetry_row(&self, row: &TelemetryRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO telemetry (recorded_at, symbol, side, close, rsi, volume_ratio,
                                   price_change, atr_pct, adx, signal, score, reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(row.recorded_at.to_rfc3339())
        .bind(&row.symbol)
        .bind(row.side.to_string())
        .bind(row.close)
        .bind(row.rsi)
        .bind(row.volume_ratio)
        .bind(row.price_change)
        .bind(row.atr_pct)
        .bind(row.adx)
        .bind(row.signal)
        .bind(row.score)
        .bind(&row.reason)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
