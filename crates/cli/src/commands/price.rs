//! One-shot option valuation.

use anyhow::{Context, Result};
use clap::Args;
use hedger::{BlackScholes, OptionContract, PricingModel};
use hedger_core::{MarketState, OptionKind};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Arguments for the price command.
#[derive(Args, Debug, Clone)]
pub struct PriceArgs {
    /// Option kind (call or put)
    #[arg(long, default_value = "call")]
    pub kind: String,

    #[arg(long)]
    pub strike: Decimal,

    #[arg(long)]
    pub spot: Decimal,

    /// Annualized volatility (e.g. 0.10)
    #[arg(long, default_value_t = 0.10)]
    pub vol: f64,

    /// Continuously compounded risk-free rate
    #[arg(long, default_value_t = 0.05)]
    pub rate: f64,

    /// Time to expiry in years
    #[arg(long)]
    pub expiry: f64,

    /// Underlying units per contract
    #[arg(long, default_value = "1")]
    pub multiplier: Decimal,

    /// Signed contract count; negative is short
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    pub quantity: i64,
}

#[derive(Serialize)]
struct PriceOutput {
    contract: String,
    fair_value: f64,
    delta: f64,
    gamma: f64,
    theta: f64,
    vega: f64,
    rho: f64,
    /// Fair value × quantity × multiplier.
    position_value: f64,
    /// Delta × quantity × multiplier, in underlying units.
    exposure: f64,
}

/// Runs the price command.
///
/// # Errors
/// Returns an error for an unknown option kind or inputs the model rejects.
pub fn run_price(args: PriceArgs) -> Result<()> {
    let kind: OptionKind = args.kind.parse()?;
    let contract = OptionContract::new("CLI", kind, args.strike, args.expiry).with_multiplier(args.multiplier);
    let state = MarketState::new("CLI", args.spot, args.vol, args.rate).at(contract.listed_at);

    let valuation = BlackScholes
        .value(&contract, &state)
        .context("Failed to value contract")?;
    let units = (Decimal::from(args.quantity) * args.multiplier).to_f64().unwrap_or_default();

    let output = PriceOutput {
        contract: contract.display_name(),
        fair_value: valuation.fair_value,
        delta: valuation.delta,
        gamma: valuation.greeks.gamma,
        theta: valuation.greeks.theta,
        vega: valuation.greeks.vega,
        rho: valuation.greeks.rho,
        position_value: valuation.fair_value * units,
        exposure: valuation.delta * units,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
