//! Position book: option positions, hedge ledger and hedge inventory.
//!
//! Positions live in an id-indexed arena and are never removed, only moved to
//! `Closed`. Hedge records refer to positions by id, so closing a position
//! never invalidates the ledger. Every mutation bumps `revision`, which the
//! hedge engine uses to detect that the book moved under a pending hedge.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hedger_core::{InstrumentId, MarketState};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BookError, PricingError};
use crate::inventory::HedgeInventory;
use crate::pricing::PricingModel;
use crate::types::{CloseReason, HedgeOrder, HedgeRecord, OptionContract, Position, PositionId, PositionStatus};

/// Book shared between the session, the engine and readers.
pub type SharedBook = Arc<RwLock<PositionBook>>;

/// Aggregate exposure of one instrument at one market state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub instrument: InstrumentId,
    /// Book revision the snapshot was taken at.
    pub revision: u64,
    /// Σ quantity × multiplier × delta over live positions.
    pub option_delta: f64,
    pub hedge_units: Decimal,
    /// Option delta plus hedge units.
    pub net_exposure: f64,
    /// Σ |quantity × multiplier| over live positions.
    pub gross_units: f64,
    pub contributors: Vec<PositionId>,
    pub spot: Decimal,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PositionBook {
    positions: Vec<Position>,
    ledger: Vec<HedgeRecord>,
    inventory: HedgeInventory,
    revision: u64,
}

impl PositionBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new, empty book for sharing.
    #[must_use]
    pub fn shared() -> SharedBook {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Opens a position.
    ///
    /// # Errors
    ///
    /// `InvalidContract` if the strike or multiplier is not positive or the
    /// time to expiry is negative; `InvalidQuantity` for a zero quantity.
    pub fn open(&mut self, contract: OptionContract, quantity: i64) -> Result<PositionId, BookError> {
        validate_contract(&contract)?;
        if quantity == 0 {
            return Err(BookError::InvalidQuantity(quantity));
        }

        let id = PositionId(self.positions.len() as u64 + 1);
        info!(
            id = %id,
            contract = contract.display_name(),
            quantity,
            "Opened position"
        );
        self.positions.push(Position {
            id,
            contract,
            quantity,
            status: PositionStatus::Open,
            created_at: Utc::now(),
            closed_at: None,
            close_reason: None,
        });
        self.revision += 1;
        Ok(id)
    }

    /// Closes a position manually.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `AlreadyClosed` if it is closed. Neither
    /// failure changes the book.
    pub fn close(&mut self, id: PositionId) -> Result<(), BookError> {
        self.close_with(id, CloseReason::Manual, Utc::now())
    }

    /// Closes a position with an explicit reason and time.
    ///
    /// # Errors
    ///
    /// See [`PositionBook::close`].
    pub fn close_with(&mut self, id: PositionId, reason: CloseReason, at: DateTime<Utc>) -> Result<(), BookError> {
        let position = self.slot_mut(id)?;
        if position.status == PositionStatus::Closed {
            return Err(BookError::AlreadyClosed(id));
        }
        position.status = PositionStatus::Closed;
        position.closed_at = Some(at);
        position.close_reason = Some(reason);
        info!(id = %id, %reason, "Closed position");
        self.revision += 1;
        Ok(())
    }

    /// Closes every live position on `instrument` whose contract has no time
    /// left at `as_of`, that instrument's market time.
    pub fn expire_matured(&mut self, instrument: &str, as_of: DateTime<Utc>) -> Vec<PositionId> {
        let matured: Vec<PositionId> = self
            .live_on(instrument)
            .filter(|p| p.contract.remaining_years(as_of) <= 0.0)
            .map(|p| p.id)
            .collect();

        for id in &matured {
            // Ids come from live positions above, so this cannot fail.
            if self.close_with(*id, CloseReason::Expired, as_of).is_ok() {
                warn!(id = %id, "Position expired");
            }
        }
        matured
    }

    /// Looks up a position.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get(&self, id: PositionId) -> Result<&Position, BookError> {
        id.0.checked_sub(1)
            .and_then(|i| self.positions.get(i as usize))
            .ok_or(BookError::NotFound(id))
    }

    /// All positions, including closed ones, in insertion order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Live (open or hedged) positions in insertion order.
    pub fn list_open(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.is_live()).collect()
    }

    pub fn ledger(&self) -> &[HedgeRecord] {
        &self.ledger
    }

    pub fn inventory(&self) -> &HedgeInventory {
        &self.inventory
    }

    /// Hedge units held in `instrument`.
    pub fn hedge_units(&self, instrument: &str) -> Decimal {
        self.inventory.units(instrument)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Instruments with live positions or a non-zero hedge holding.
    pub fn instruments(&self) -> BTreeSet<InstrumentId> {
        let mut set: BTreeSet<InstrumentId> = self
            .positions
            .iter()
            .filter(|p| p.is_live())
            .map(|p| p.contract.instrument.clone())
            .collect();
        set.extend(
            self.inventory
                .iter()
                .filter(|(_, h)| !h.units.is_zero())
                .map(|(id, _)| id.clone()),
        );
        set
    }

    /// Σ quantity × multiplier × delta over live positions on `state.instrument`.
    ///
    /// Recomputed on every call; delta moves with spot and time.
    ///
    /// # Errors
    ///
    /// Propagates the first pricing failure.
    pub fn option_delta(&self, pricing: &dyn PricingModel, state: &MarketState) -> Result<f64, PricingError> {
        let mut total = 0.0;
        for position in self.live_on(&state.instrument) {
            let valuation = pricing.value(&position.contract, state)?;
            let units = position.units().to_f64().unwrap_or_default();
            debug!(id = %position.id, delta = valuation.delta, units, "Position delta");
            total += units * valuation.delta;
        }
        Ok(total)
    }

    /// Option delta plus hedge inventory for `state.instrument`.
    ///
    /// # Errors
    ///
    /// Propagates the first pricing failure.
    pub fn net_exposure(&self, pricing: &dyn PricingModel, state: &MarketState) -> Result<f64, PricingError> {
        Ok(self.exposure_snapshot(pricing, state)?.net_exposure)
    }

    /// Full exposure breakdown for `state.instrument`.
    ///
    /// # Errors
    ///
    /// Propagates the first pricing failure.
    pub fn exposure_snapshot(
        &self,
        pricing: &dyn PricingModel,
        state: &MarketState,
    ) -> Result<ExposureSnapshot, PricingError> {
        let option_delta = self.option_delta(pricing, state)?;
        let hedge_units = self.hedge_units(&state.instrument);
        let gross_units: f64 = self
            .live_on(&state.instrument)
            .map(|p| p.units().abs().to_f64().unwrap_or_default())
            .sum();

        Ok(ExposureSnapshot {
            instrument: state.instrument.clone(),
            revision: self.revision,
            option_delta,
            hedge_units,
            net_exposure: option_delta + hedge_units.to_f64().unwrap_or_default(),
            gross_units,
            contributors: self.live_on(&state.instrument).map(|p| p.id).collect(),
            spot: state.spot,
            as_of: state.as_of,
        })
    }

    /// Appends hedge orders to the ledger if the book is still at `expected_revision`.
    ///
    /// Contributing positions move from `Open` to `Hedged`.
    ///
    /// # Errors
    ///
    /// `StaleRevision` if the book changed since the snapshot; nothing is appended.
    pub fn commit_hedges(
        &mut self,
        expected_revision: u64,
        orders: Vec<HedgeOrder>,
    ) -> Result<Vec<HedgeRecord>, BookError> {
        if self.revision != expected_revision {
            return Err(BookError::StaleRevision {
                expected: expected_revision,
                actual: self.revision,
            });
        }
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let mut appended = Vec::with_capacity(orders.len());
        for order in orders {
            for id in &order.contributors {
                if let Ok(position) = self.slot_mut(*id) {
                    if position.status == PositionStatus::Open {
                        position.status = PositionStatus::Hedged;
                    }
                }
            }
            let record = HedgeRecord::from_order(self.ledger.len() as u64 + 1, order);
            self.inventory.process(&record);
            self.ledger.push(record.clone());
            appended.push(record);
        }
        self.revision += 1;
        Ok(appended)
    }

    fn live_on<'a>(&'a self, instrument: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions
            .iter()
            .filter(move |p| p.is_live() && p.contract.instrument == instrument)
    }

    fn slot_mut(&mut self, id: PositionId) -> Result<&mut Position, BookError> {
        id.0.checked_sub(1)
            .and_then(|i| self.positions.get_mut(i as usize))
            .ok_or(BookError::NotFound(id))
    }
}

fn validate_contract(contract: &OptionContract) -> Result<(), BookError> {
    if contract.instrument.trim().is_empty() {
        return Err(BookError::InvalidContract("instrument must not be empty".to_string()));
    }
    if contract.strike <= Decimal::ZERO {
        return Err(BookError::InvalidContract(format!(
            "strike must be positive, got {}",
            contract.strike
        )));
    }
    if !contract.time_to_expiry.is_finite() || contract.time_to_expiry < 0.0 {
        return Err(BookError::InvalidContract(format!(
            "time to expiry must be non-negative, got {}",
            contract.time_to_expiry
        )));
    }
    if contract.multiplier <= Decimal::ZERO {
        return Err(BookError::InvalidContract(format!(
            "multiplier must be positive, got {}",
            contract.multiplier
        )));
    }
    Ok(())
}

/// Access to a book for one hedge decision: a read snapshot, then a
/// revision-checked commit.
pub trait BookHandle: Send + Sync {
    /// # Errors
    ///
    /// Propagates pricing failures.
    fn snapshot(&self, pricing: &dyn PricingModel, state: &MarketState) -> Result<ExposureSnapshot, PricingError>;

    /// # Errors
    ///
    /// `StaleRevision` if the book moved since `expected_revision`.
    fn commit(&self, expected_revision: u64, orders: Vec<HedgeOrder>) -> Result<Vec<HedgeRecord>, BookError>;
}

impl BookHandle for RwLock<PositionBook> {
    fn snapshot(&self, pricing: &dyn PricingModel, state: &MarketState) -> Result<ExposureSnapshot, PricingError> {
        self.read().exposure_snapshot(pricing, state)
    }

    fn commit(&self, expected_revision: u64, orders: Vec<HedgeOrder>) -> Result<Vec<HedgeRecord>, BookError> {
        self.write().commit_hedges(expected_revision, orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::BlackScholes;
    use chrono::Duration;
    use hedger_core::OptionKind;
    use rust_decimal_macros::dec;

    fn call(strike: Decimal, t: f64, at: DateTime<Utc>) -> OptionContract {
        OptionContract::new("EURUSD", OptionKind::Call, strike, t).listed(at)
    }

    fn order(units: Decimal, contributors: Vec<PositionId>) -> HedgeOrder {
        HedgeOrder {
            instrument: "EURUSD".to_string(),
            units,
            price: dec!(1.2),
            exposure_before: 0.0,
            contributors,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn open_assigns_sequential_ids_in_insertion_order() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let a = book.open(call(dec!(1.2), 0.25, now), 1).unwrap();
        let b = book.open(call(dec!(1.3), 0.25, now), -2).unwrap();
        assert_eq!(a, PositionId(1));
        assert_eq!(b, PositionId(2));
        let open: Vec<_> = book.list_open().iter().map(|p| p.id).collect();
        assert_eq!(open, vec![a, b]);
    }

    #[test]
    fn open_rejects_bad_terms() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        assert!(matches!(
            book.open(call(dec!(0), 0.25, now), 1),
            Err(BookError::InvalidContract(_))
        ));
        assert!(matches!(
            book.open(call(dec!(1.2), -0.1, now), 1),
            Err(BookError::InvalidContract(_))
        ));
        assert!(matches!(
            book.open(call(dec!(1.2), 0.25, now).with_multiplier(dec!(0)), 1),
            Err(BookError::InvalidContract(_))
        ));
        assert_eq!(book.open(call(dec!(1.2), 0.25, now), 0), Err(BookError::InvalidQuantity(0)));
        assert!(book.positions().is_empty());
        assert_eq!(book.revision(), 0);
    }

    #[test]
    fn close_unknown_is_not_found() {
        let mut book = PositionBook::new();
        assert_eq!(book.close(PositionId(7)), Err(BookError::NotFound(PositionId(7))));
        assert_eq!(book.close(PositionId(0)), Err(BookError::NotFound(PositionId(0))));
    }

    #[test]
    fn second_close_is_rejected_without_mutation() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let id = book.open(call(dec!(1.2), 0.25, now), 3).unwrap();
        book.close(id).unwrap();

        let before = book.get(id).unwrap().clone();
        let revision = book.revision();

        assert_eq!(book.close(id), Err(BookError::AlreadyClosed(id)));
        let after = book.get(id).unwrap();
        assert_eq!(after.closed_at, before.closed_at);
        assert_eq!(after.quantity, 3);
        assert_eq!(book.revision(), revision);
        assert!(book.ledger().is_empty());
    }

    #[test]
    fn net_exposure_sums_live_positions_only() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let state = MarketState::new("EURUSD", dec!(1.2), 0.1, 0.01).at(now);
        let a = book.open(call(dec!(1.2), 0.25, now).with_multiplier(dec!(100)), 2).unwrap();
        book.open(call(dec!(1.2), 0.25, now), 1).unwrap();

        let (_, delta) = crate::pricing::price_and_delta(&book.get(a).unwrap().contract, &state).unwrap();
        let exposure = book.net_exposure(&BlackScholes, &state).unwrap();
        assert!((exposure - 201.0 * delta).abs() < 1e-9);

        book.close(a).unwrap();
        let exposure = book.net_exposure(&BlackScholes, &state).unwrap();
        assert!((exposure - delta).abs() < 1e-9);
    }

    #[test]
    fn exposure_ignores_other_instruments() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        book.open(
            OptionContract::new("GBPUSD", OptionKind::Put, dec!(1.3), 0.5).listed(now),
            5,
        )
        .unwrap();
        let state = MarketState::new("EURUSD", dec!(1.2), 0.1, 0.01).at(now);
        assert_eq!(book.net_exposure(&BlackScholes, &state).unwrap(), 0.0);
    }

    #[test]
    fn commit_appends_records_and_updates_inventory() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let id = book.open(call(dec!(1.2), 0.25, now), 1).unwrap();
        let revision = book.revision();

        let records = book
            .commit_hedges(revision, vec![order(dec!(-0.3), vec![id]), order(dec!(-0.2), vec![id])])
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
        assert_eq!(book.hedge_units("EURUSD"), dec!(-0.5));
        assert_eq!(book.get(id).unwrap().status, PositionStatus::Hedged);
        assert_eq!(book.revision(), revision + 1);
    }

    #[test]
    fn commit_against_stale_revision_fails() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let revision = book.revision();
        book.open(call(dec!(1.2), 0.25, now), 1).unwrap();

        let err = book.commit_hedges(revision, vec![order(dec!(1), vec![])]).unwrap_err();
        assert!(matches!(err, BookError::StaleRevision { .. }));
        assert!(book.ledger().is_empty());
        assert_eq!(book.hedge_units("EURUSD"), Decimal::ZERO);
    }

    #[test]
    fn hedged_exposure_includes_inventory() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let state = MarketState::new("EURUSD", dec!(1.2), 0.1, 0.01).at(now);
        book.open(call(dec!(1.2), 0.25, now).with_multiplier(dec!(10)), 1).unwrap();
        let snap = book.exposure_snapshot(&BlackScholes, &state).unwrap();

        book.commit_hedges(snap.revision, vec![order(dec!(-5), vec![])]).unwrap();
        let after = book.exposure_snapshot(&BlackScholes, &state).unwrap();
        assert!((after.net_exposure - (snap.option_delta - 5.0)).abs() < 1e-9);
        assert!((after.gross_units - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closed_positions_keep_ledger_and_hedged_instruments() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let id = book.open(call(dec!(1.2), 0.25, now), 1).unwrap();
        book.commit_hedges(book.revision(), vec![order(dec!(-0.5), vec![id])]).unwrap();
        book.close(id).unwrap();

        assert_eq!(book.ledger()[0].position_ids, vec![id]);
        assert!(book.instruments().contains("EURUSD"));
    }

    #[test]
    fn expire_matured_closes_only_expired() {
        let now = Utc::now();
        let mut book = PositionBook::new();
        let short_dated = book.open(call(dec!(1.2), 1.0 / 365.0, now), 1).unwrap();
        let long_dated = book.open(call(dec!(1.2), 1.0, now), 1).unwrap();
        let other = book
            .open(OptionContract::new("GBPUSD", OptionKind::Call, dec!(1.3), 1.0 / 365.0).listed(now), 1)
            .unwrap();

        let expired = book.expire_matured("EURUSD", now + Duration::days(2));
        assert_eq!(expired, vec![short_dated]);
        let p = book.get(short_dated).unwrap();
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.close_reason, Some(CloseReason::Expired));
        assert!(book.get(long_dated).unwrap().is_live());
        // Other instruments keep their own clock
        assert!(book.get(other).unwrap().is_live());
    }

    #[test]
    fn shared_book_handle_round_trip() {
        let now = Utc::now();
        let shared = PositionBook::shared();
        shared.write().open(call(dec!(1.2), 0.25, now), 1).unwrap();
        let state = MarketState::new("EURUSD", dec!(1.2), 0.1, 0.01).at(now);

        let snap = shared.snapshot(&BlackScholes, &state).unwrap();
        assert_eq!(snap.contributors, vec![PositionId(1)]);
        let records = shared.commit(snap.revision, vec![order(dec!(-0.53), snap.contributors.clone())]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(shared.read().ledger().len(), 1);
    }
}
