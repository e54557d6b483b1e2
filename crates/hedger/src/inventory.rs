//! Underlying inventory accumulated by hedge trades, per instrument.

use std::collections::BTreeMap;

use hedger_core::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::HedgeRecord;

/// Net hedge holding in one instrument, average-cost accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HedgeHolding {
    /// Signed units; positive is long the underlying.
    pub units: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

impl HedgeHolding {
    /// Mark-to-market P&L of the open units at `price`.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.avg_price) * self.units
    }

    /// Applies one fill; returns the realized P&L when it reduces the holding.
    fn apply(&mut self, units: Decimal, price: Decimal) -> Option<Decimal> {
        if units.is_zero() {
            return None;
        }
        let same_direction = self.units.is_zero() || (self.units.is_sign_positive() == units.is_sign_positive());

        if same_direction {
            // Opening or adding
            let total_cost = self.avg_price * self.units.abs() + price * units.abs();
            self.units += units;
            self.avg_price = total_cost / self.units.abs();
            return None;
        }

        // Reducing, possibly flipping through zero
        let close_units = units.abs().min(self.units.abs());
        let pnl = if self.units.is_sign_positive() {
            (price - self.avg_price) * close_units
        } else {
            (self.avg_price - price) * close_units
        };
        self.realized_pnl += pnl;
        self.units += units;

        if self.units.is_zero() {
            self.avg_price = Decimal::ZERO;
        } else if self.units.is_sign_positive() == units.is_sign_positive() {
            // Flipped: the remainder opened at this fill's price
            self.avg_price = price;
        }

        Some(pnl)
    }
}

/// Hedge holdings keyed by instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HedgeInventory {
    holdings: BTreeMap<InstrumentId, HedgeHolding>,
}

impl HedgeInventory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes a ledger record. Returns realized P&L if the trade reduced the holding.
    pub fn process(&mut self, record: &HedgeRecord) -> Option<Decimal> {
        self.holdings
            .entry(record.instrument.clone())
            .or_default()
            .apply(record.units, record.price)
    }

    #[must_use]
    pub fn get(&self, instrument: &str) -> Option<&HedgeHolding> {
        self.holdings.get(instrument)
    }

    /// Net units held in `instrument` (zero if never hedged).
    #[must_use]
    pub fn units(&self, instrument: &str) -> Decimal {
        self.get(instrument).map_or(Decimal::ZERO, |h| h.units)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &HedgeHolding)> {
        self.holdings.iter()
    }
}
