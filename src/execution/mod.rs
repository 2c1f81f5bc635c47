// Order execution: broker seam, strategy engine and position ledger
pub mod broker;
pub mod engine;
pub mod ledger;

pub use broker::{Broker, BrokerEvent};
pub use engine::{EngineStats, StrategyEngine};
pub use ledger::{FillOutcome, PositionLedger};
