//! Shared types, configuration and market data traits for the delta hedger.

pub mod config;
pub mod config_loader;
pub mod market;
pub mod traits;

pub use config::{AppConfig, BrokerConfig, FeedConfig, HedgeConfig, InstrumentConfig};
pub use config_loader::ConfigLoader;
pub use market::{ContractSpec, InstrumentId, MarketState, OptionKind};
pub use traits::MarketDataSource;
