use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use common::{EngineState, Notifier, Result};

use crate::orchestrator::Orchestrator;

/// Cloneable handle used to observe and stop a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    /// Ask the engine to stop. The cycle in progress, if any, completes first.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// The polling loop: one orchestrator cycle per interval tick.
pub struct Engine {
    orchestrator: Orchestrator,
    interval: Duration,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<EngineState>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    pub fn new(
        orchestrator: Orchestrator,
        interval: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, EngineHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            shutdown_tx: Arc::new(shutdown_tx),
            state: state.clone(),
        };
        let engine = Engine {
            orchestrator,
            interval,
            notifier,
            state,
            shutdown_rx,
        };
        (engine, handle)
    }

    /// Run until stopped (`Ok`) or until a cycle fails fatally (`Err`).
    pub async fn run(mut self) -> Result<()> {
        let sides: Vec<String> = self
            .orchestrator
            .tracks()
            .filter(|t| t.config.enabled)
            .map(|t| format!("{} ({} symbols)", t.side, t.config.symbols.len()))
            .collect();
        info!(interval_secs = self.interval.as_secs(), tracks = ?sides, "Engine starting");
        *self.state.write().await = EngineState::Running;
        self.notifier
            .notify(&format!("▶️ BreakBot started: {}", sides.join(", ")))
            .await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.orchestrator.run_cycle(Utc::now()).await {
                error!(error = %e, kind = ?e.kind(), "Fatal error, halting engine");
                *self.state.write().await = EngineState::Halted;
                self.notifier
                    .notify(&format!("🛑 BreakBot halted: {e}"))
                    .await;
                return Err(e);
            }
        }

        info!("Engine stopped");
        *self.state.write().await = EngineState::Stopped;
        self.notifier.notify("⏹ BreakBot stopped").await;
        Ok(())
    }
}
