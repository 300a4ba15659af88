use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use common::{
    Bar, ClosedTrade, Error, ErrorKind, MarketData, Notifier, Position, PositionStore, Result,
    TelemetryRow, TradeSide,
};
use risk::{MarketTick, MonitorConfig, MonitorDecision, PositionMonitor};
use strategy::indicators::regime;
use strategy::{select_candidate, Evaluation, SignalEvaluator, StrategyParams, TrackConfig};

use crate::executor::OrderExecutor;

/// One trading side with its own symbol universe, data source and gateway.
pub struct Track {
    pub side: TradeSide,
    pub config: TrackConfig,
    pub market: Arc<dyn MarketData>,
    pub executor: OrderExecutor,
}

/// Counters for one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub symbols_refreshed: usize,
    pub fetch_failures: usize,
    pub exits: usize,
    pub entries: usize,
    pub execution_failures: usize,
    pub persistence_failures: usize,
}

/// A store write whose order already filled but which failed to persist.
/// Retried at the start of every cycle until it lands.
#[derive(Debug, Clone)]
enum PendingWrite {
    Open(Position),
    Update(Position),
    Close(ClosedTrade),
}

impl PendingWrite {
    fn position_id(&self) -> &str {
        match self {
            PendingWrite::Open(p) | PendingWrite::Update(p) => &p.id,
            PendingWrite::Close(t) => &t.position.id,
        }
    }
}

/// Drives polling cycles: refresh bars, manage the open position per side,
/// and open a new one when a side is flat.
pub struct Orchestrator {
    params: StrategyParams,
    evaluator: SignalEvaluator,
    monitor: PositionMonitor,
    tracks: Vec<Track>,
    store: Arc<dyn PositionStore>,
    notifier: Arc<dyn Notifier>,
    pending: Vec<PendingWrite>,
    failed_cycles: u32,
}

impl Orchestrator {
    pub fn new(
        params: StrategyParams,
        tracks: Vec<Track>,
        store: Arc<dyn PositionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            evaluator: SignalEvaluator::new(params.clone()),
            monitor: PositionMonitor::new(MonitorConfig::from_params(&params)),
            params,
            tracks,
            store,
            notifier,
            pending: Vec::new(),
            failed_cycles: 0,
        }
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Run one cycle at time `now`.
    ///
    /// Per-symbol data errors, execution errors and single persistence
    /// errors are absorbed here. An `Err` means the loop must stop.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut blacklist: HashSet<String> = HashSet::new();

        self.flush_pending(&mut report).await;

        for idx in 0..self.tracks.len() {
            if !self.tracks[idx].config.enabled {
                continue;
            }
            if let Err(e) = self.run_track(idx, now, &mut blacklist, &mut report).await {
                match e.kind() {
                    ErrorKind::Persistence => {
                        error!(side = %self.tracks[idx].side, error = %e, "Persistence error, side skipped this cycle");
                        report.persistence_failures += 1;
                    }
                    _ => return Err(e),
                }
            }
        }

        if report.persistence_failures > 0 {
            self.failed_cycles += 1;
            if self.failed_cycles >= self.params.max_persistence_failures {
                return Err(Error::Persistence(format!(
                    "persistence failed in {} consecutive cycles",
                    self.failed_cycles
                )));
            }
        } else {
            self.failed_cycles = 0;
        }

        info!(
            refreshed = report.symbols_refreshed,
            fetch_failures = report.fetch_failures,
            exits = report.exits,
            entries = report.entries,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn run_track(
        &mut self,
        idx: usize,
        now: DateTime<Utc>,
        blacklist: &mut HashSet<String>,
        report: &mut CycleReport,
    ) -> Result<()> {
        let side = self.tracks[idx].side;

        // 1. Refresh entry-timeframe bars, one symbol at a time.
        let mut universe: Vec<(String, Vec<Bar>)> = Vec::new();
        for symbol in self.tracks[idx].config.symbols.clone() {
            let fetched = self.tracks[idx]
                .market
                .fetch_bars(&symbol, &self.params.entry_timeframe, self.params.bar_limit)
                .await;
            match fetched {
                Ok(bars) => {
                    report.symbols_refreshed += 1;
                    universe.push((symbol, bars));
                }
                Err(e) if e.kind() == ErrorKind::DataFetch => {
                    warn!(symbol = %symbol, side = %side, error = %e, "Market data unavailable, skipping symbol");
                    report.fetch_failures += 1;
                }
                Err(e) => return Err(e),
            }
        }

        // 2. Monitor whatever is open on this side.
        let open = self.load_open_positions(idx).await?;
        if open.len() > 1 {
            warn!(side = %side, count = open.len(), "More than one open position on one side");
        }
        let mut still_open = 0;
        for position in open {
            if !self.monitor_position(idx, position, now, blacklist, report).await? {
                still_open += 1;
            }
        }

        // 3. Evaluate every refreshed symbol; telemetry is written either way.
        let evaluations: Vec<(String, Evaluation)> = universe
            .iter()
            .map(|(symbol, bars)| (symbol.clone(), self.evaluator.evaluate(bars, side)))
            .collect();
        for ((symbol, bars), (_, eval)) in universe.iter().zip(&evaluations) {
            self.record_telemetry(symbol, bars, eval, now, report).await;
        }

        if still_open > 0 {
            return Ok(());
        }

        // 4. Flat on this side: pick the best candidate and open it.
        let Some(candidate) = select_candidate(
            evaluations.iter().map(|(s, e)| (s.as_str(), e)),
            blacklist,
        ) else {
            debug!(side = %side, "No entry signal this cycle");
            return Ok(());
        };

        let notional = self.tracks[idx].config.order_notional_usd;
        let opened = self.tracks[idx].executor.open(&candidate, notional).await;
        match opened {
            Ok(position) => {
                info!(
                    symbol = %position.symbol,
                    side = %side,
                    entry = position.entry_price,
                    stop = position.stop_loss,
                    target = position.take_profit,
                    score = candidate.signal.score,
                    "Position opened"
                );
                report.entries += 1;
                self.notifier.notify(&entry_message(&position, &candidate.signal.reason)).await;
                self.persist(PendingWrite::Open(position), report).await;
            }
            Err(e) => match e.kind() {
                ErrorKind::Execution => {
                    report.execution_failures += 1;
                    self.notifier
                        .notify(&format!("🚨 Entry order failed on {} ({side}): {e}", candidate.symbol))
                        .await;
                }
                ErrorKind::InvalidSignal => {
                    warn!(symbol = %candidate.symbol, error = %e, "Candidate discarded");
                }
                _ => return Err(e),
            },
        }
        Ok(())
    }

    /// Returns true when the position was closed.
    async fn monitor_position(
        &mut self,
        idx: usize,
        mut position: Position,
        now: DateTime<Utc>,
        blacklist: &mut HashSet<String>,
        report: &mut CycleReport,
    ) -> Result<bool> {
        let side = position.side;
        let fetched = self.tracks[idx]
            .market
            .fetch_bars(&position.symbol, &self.params.monitor_timeframe, self.params.bar_limit)
            .await;
        let bars = match fetched {
            Ok(bars) => bars,
            Err(e) if e.kind() == ErrorKind::DataFetch => {
                warn!(symbol = %position.symbol, side = %side, error = %e, "Cannot monitor position this cycle");
                report.fetch_failures += 1;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let Some(tick) = MarketTick::from_bars(&bars, self.params.rsi_period, now) else {
            warn!(symbol = %position.symbol, "No monitor bars returned");
            return Ok(false);
        };

        let before = (position.stop_loss, position.trailing_active);
        let decision = self.monitor.evaluate(&mut position, &tick);
        if (position.stop_loss, position.trailing_active) != before {
            self.persist(PendingWrite::Update(position.clone()), report).await;
        }

        let reason = match decision {
            MonitorDecision::Hold { .. } => return Ok(false),
            MonitorDecision::Exit(reason) => reason,
        };

        let closed = self.tracks[idx].executor.close(&position, reason, tick.price).await;
        match closed {
            Ok(trade) => {
                info!(
                    symbol = %position.symbol,
                    side = %side,
                    reason = %reason,
                    exit = trade.exit_price,
                    pnl_usd = trade.pnl_usd,
                    "Position closed"
                );
                report.exits += 1;
                blacklist.insert(position.symbol.clone());
                self.notifier.notify(&exit_message(&trade)).await;
                self.persist(PendingWrite::Close(trade), report).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::Execution => {
                report.execution_failures += 1;
                self.notifier
                    .notify(&format!(
                        "🚨 Exit order failed on {} ({side}, {reason}): {e}. Will retry next cycle.",
                        position.symbol
                    ))
                    .await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Every open position on the track's side from the store, including
    /// symbols no longer configured, overlaid with writes that have not
    /// landed yet.
    async fn load_open_positions(&self, idx: usize) -> Result<Vec<Position>> {
        let track = &self.tracks[idx];
        let mut open = self.store.load_open_positions(track.side).await?;
        for position in &open {
            if !track.config.symbols.contains(&position.symbol) {
                warn!(symbol = %position.symbol, side = %track.side, "Open position outside the configured symbols, still monitored");
            }
        }

        for write in &self.pending {
            match write {
                PendingWrite::Close(trade) => {
                    open.retain(|p| p.id != trade.position.id);
                }
                PendingWrite::Open(p) | PendingWrite::Update(p) if p.side == track.side => {
                    match open.iter_mut().find(|o| o.id == p.id) {
                        Some(existing) => *existing = p.clone(),
                        None => open.push(p.clone()),
                    }
                }
                _ => {}
            }
        }
        Ok(open)
    }

    async fn persist(&mut self, write: PendingWrite, report: &mut CycleReport) {
        let write = self.coalesce(write);
        if let Err(e) = self.apply(&write).await {
            error!(position = %write.position_id(), error = %e, "Store write failed, will retry");
            report.persistence_failures += 1;
            self.notifier
                .notify(&format!("⚠️ Failed to record position {}: {e}", write.position_id()))
                .await;
            self.pending.push(write);
        }
    }

    /// Merge `write` with any queued write for the same position so that at
    /// most one write per position is ever pending.
    fn coalesce(&mut self, write: PendingWrite) -> PendingWrite {
        let Some(i) = self
            .pending
            .iter()
            .position(|w| w.position_id() == write.position_id())
        else {
            return write;
        };
        match (self.pending.remove(i), write) {
            // The row was never inserted; insert it with the latest stop.
            (PendingWrite::Open(_), PendingWrite::Update(p)) => PendingWrite::Open(p),
            (_, write) => write,
        }
    }

    async fn flush_pending(&mut self, report: &mut CycleReport) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        for write in pending {
            if let Err(e) = self.apply(&write).await {
                warn!(position = %write.position_id(), error = %e, "Pending store write still failing");
                report.persistence_failures += 1;
                self.pending.push(write);
            }
        }
    }

    async fn apply(&self, write: &PendingWrite) -> Result<()> {
        match write {
            PendingWrite::Open(p) => self.store.record_trade_open(p).await,
            PendingWrite::Update(p) => self.store.update_position(p).await,
            PendingWrite::Close(t) => self.store.record_trade_close(t).await,
        }
    }

    async fn record_telemetry(
        &self,
        symbol: &str,
        bars: &[Bar],
        eval: &Evaluation,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) {
        let Some(last) = bars.last() else {
            return;
        };
        let snapshot = eval.snapshot;
        let row = TelemetryRow {
            recorded_at: now,
            symbol: symbol.to_string(),
            side: eval.side,
            close: last.close,
            rsi: snapshot.and_then(|s| s.rsi),
            volume_ratio: eval.volume_ratio(last.volume),
            price_change: snapshot.and_then(|s| s.price_change),
            atr_pct: regime::atr_pct(bars, self.params.rsi_period),
            adx: regime::adx(bars, self.params.rsi_period),
            signal: eval.fired(),
            score: eval.score,
            reason: eval.reason.clone(),
        };
        if let Err(e) = self.store.append_telemetry_row(&row).await {
            warn!(symbol = %symbol, error = %e, "Telemetry row dropped");
            report.persistence_failures += 1;
        }
    }
}

fn entry_message(position: &Position, reason: &str) -> String {
    format!(
        "🟢 {} entry {} @ {:.4} | SL {:.4} | TP {:.4} | qty {:.6}\n{reason}",
        position.side.to_string().to_uppercase(),
        position.symbol,
        position.entry_price,
        position.stop_loss,
        position.take_profit,
        position.quantity,
    )
}

fn exit_message(trade: &ClosedTrade) -> String {
    let p = &trade.position;
    format!(
        "🔴 {} exit {} @ {:.4} ({}) | PnL {:+.2} USD ({:+.2}%)",
        p.side.to_string().to_uppercase(),
        p.symbol,
        trade.exit_price,
        trade.exit_reason,
        trade.pnl_usd,
        trade.pnl_ratio * 100.0,
    )
}
