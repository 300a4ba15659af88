pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use exchange::{MarketData, Notifier, OrderGateway, PositionStore};
pub use types::*;
