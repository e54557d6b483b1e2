//! CLI commands for the delta hedger.

pub mod price;
pub mod run;
pub mod simulate;

pub use price::{run_price, PriceArgs};
pub use run::{run_service, RunArgs};
pub use simulate::{run_simulate, SimulateArgs};

use anyhow::Result;
use hedger_core::{AppConfig, ConfigLoader};

/// Loads the config file, layered with a profile when one is given.
fn load_config(path: &str, profile: Option<&str>) -> Result<AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(profile),
        None => ConfigLoader::load_from(path),
    }
}
