pub mod monitor;

pub use monitor::{MarketTick, MonitorConfig, MonitorDecision, PositionMonitor};
