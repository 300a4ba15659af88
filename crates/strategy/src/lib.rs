pub mod config;
pub mod evaluator;
pub mod indicators;
pub mod selector;

pub use config::{StrategyFileConfig, StrategyParams, TrackConfig};
pub use evaluator::{Evaluation, SideRule, SignalEvaluator};
pub use indicators::{IndicatorSet, IndicatorSnapshot};
pub use selector::{select_candidate, Candidate};
