//! Black-Scholes valuation and Greeks for European options.
//!
//! Everything here is a pure function of the contract and a market snapshot,
//! so a single model can be shared by any number of readers.

use std::f64::consts::{PI, SQRT_2};

use hedger_core::{MarketState, OptionKind};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::PricingError;
use crate::types::OptionContract;

/// Option greeks snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per year.
    pub theta: f64,
    /// Per 1.00 change in volatility.
    pub vega: f64,
    /// Per 1.00 change in rate.
    pub rho: f64,
}

/// Result of valuing one contract against one market state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    /// Fair value per unit of underlying.
    pub fair_value: f64,
    pub delta: f64,
    pub greeks: OptionGreeks,
    /// Remaining years used for the valuation.
    pub time_to_expiry: f64,
}

/// Option valuation capability.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &str;

    /// Values `contract` at `state`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMarketState` for non-positive spot or volatility and
    /// `InvalidContract` for non-positive strike.
    fn value(&self, contract: &OptionContract, state: &MarketState) -> Result<Valuation, PricingError>;
}

/// Closed-form Black-Scholes model.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackScholes;

impl PricingModel for BlackScholes {
    fn name(&self) -> &str {
        "black-scholes"
    }

    fn value(&self, contract: &OptionContract, state: &MarketState) -> Result<Valuation, PricingError> {
        let inputs = Inputs::validate(contract, state)?;
        Ok(inputs.valuation(contract.kind))
    }
}

/// Fair value and delta of `contract` at `state` under Black-Scholes.
///
/// # Errors
///
/// See [`PricingModel::value`].
pub fn price_and_delta(contract: &OptionContract, state: &MarketState) -> Result<(f64, f64), PricingError> {
    let v = BlackScholes.value(contract, state)?;
    Ok((v.fair_value, v.delta))
}

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

/// Standard normal PDF.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

struct Inputs {
    spot: f64,
    strike: f64,
    vol: f64,
    rate: f64,
    t: f64,
}

impl Inputs {
    fn validate(contract: &OptionContract, state: &MarketState) -> Result<Self, PricingError> {
        let strike = contract.strike.to_f64().unwrap_or(f64::NAN);
        if !strike.is_finite() || strike <= 0.0 {
            return Err(PricingError::InvalidContract(format!(
                "strike must be positive, got {}",
                contract.strike
            )));
        }
        if !contract.time_to_expiry.is_finite() || contract.time_to_expiry < 0.0 {
            return Err(PricingError::InvalidContract(format!(
                "time to expiry must be non-negative, got {}",
                contract.time_to_expiry
            )));
        }

        let spot = state.spot.to_f64().unwrap_or(f64::NAN);
        if !spot.is_finite() || spot <= 0.0 {
            return Err(PricingError::InvalidMarketState(format!(
                "spot must be positive, got {}",
                state.spot
            )));
        }
        if !state.volatility.is_finite() || state.volatility <= 0.0 {
            return Err(PricingError::InvalidMarketState(format!(
                "volatility must be positive, got {}",
                state.volatility
            )));
        }
        if !state.rate.is_finite() {
            return Err(PricingError::InvalidMarketState(format!(
                "rate must be finite, got {}",
                state.rate
            )));
        }

        Ok(Self {
            spot,
            strike,
            vol: state.volatility,
            rate: state.rate,
            t: contract.remaining_years(state.as_of),
        })
    }

    fn valuation(&self, kind: OptionKind) -> Valuation {
        if self.t <= 0.0 {
            return self.at_expiry(kind);
        }

        let Self { spot, strike, vol, rate, t } = *self;
        let sqrt_t = t.sqrt();
        let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * t) / (vol * sqrt_t);
        let d2 = d1 - vol * sqrt_t;
        let discount = (-rate * t).exp();
        let pdf_d1 = norm_pdf(d1);

        let gamma = pdf_d1 / (spot * vol * sqrt_t);
        let vega = spot * pdf_d1 * sqrt_t;
        let decay = -spot * pdf_d1 * vol / (2.0 * sqrt_t);

        let (fair_value, delta, theta, rho) = match kind {
            OptionKind::Call => (
                spot * norm_cdf(d1) - strike * discount * norm_cdf(d2),
                norm_cdf(d1),
                decay - rate * strike * discount * norm_cdf(d2),
                strike * t * discount * norm_cdf(d2),
            ),
            OptionKind::Put => (
                strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1),
                norm_cdf(d1) - 1.0,
                decay + rate * strike * discount * norm_cdf(-d2),
                -strike * t * discount * norm_cdf(-d2),
            ),
        };

        let delta = match kind {
            OptionKind::Call => delta.clamp(0.0, 1.0),
            OptionKind::Put => delta.clamp(-1.0, 0.0),
        };

        Valuation {
            fair_value: fair_value.max(0.0),
            delta,
            greeks: OptionGreeks { delta, gamma, theta, vega, rho },
            time_to_expiry: t,
        }
    }

    /// Intrinsic value with a step delta; exactly at the money the delta is ±0.5.
    fn at_expiry(&self, kind: OptionKind) -> Valuation {
        let (fair_value, delta) = match kind {
            OptionKind::Call => {
                let delta = if self.spot > self.strike {
                    1.0
                } else if self.spot < self.strike {
                    0.0
                } else {
                    0.5
                };
                ((self.spot - self.strike).max(0.0), delta)
            }
            OptionKind::Put => {
                let delta = if self.spot < self.strike {
                    -1.0
                } else if self.spot > self.strike {
                    0.0
                } else {
                    -0.5
                };
                ((self.strike - self.spot).max(0.0), delta)
            }
        };

        Valuation {
            fair_value,
            delta,
            greeks: OptionGreeks { delta, ..OptionGreeks::default() },
            time_to_expiry: 0.0,
        }
    }
}
