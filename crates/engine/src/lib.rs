pub mod binance;
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;
pub mod store;

pub use binance::{BinanceClient, BinanceMarket};
pub use executor::OrderExecutor;
pub use lifecycle::{Engine, EngineHandle};
pub use orchestrator::{CycleReport, Orchestrator, Track};
pub use store::SqliteStore;
