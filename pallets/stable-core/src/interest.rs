//! Pegged token interest bonding curve.
//!
//! Abundance is the share of a token's capacity already minted. Inside `abeq ± band` the base
//! rate applies. Outside the band a correction factor moves linearly from one toward the curve
//! extreme reached at abundance 0 or 1, and the scaled rate is clamped to `[ti_min, ti_max]`.
//! Minting gets dearer as the token becomes abundant; redemption mirrors it.

use polkadot_sdk::frame_support::pallet_prelude::*;
use polkadot_sdk::sp_runtime::{
  FixedPointNumber, FixedU128, PerThing, Permill, Saturating,
  traits::One,
};

#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  TypeInfo,
  MaxEncodedLen,
)]
pub struct InterestCurve {
  /// Base rate at equilibrium.
  pub tils: Permill,
  pub ti_min: Permill,
  pub ti_max: Permill,
  /// Equilibrium abundance.
  pub abeq: Permill,
  /// Correction factor floor, at most one.
  pub fac_min: FixedU128,
  /// Correction factor ceiling, at least one.
  pub fac_max: FixedU128,
}

impl InterestCurve {
  pub fn is_valid(&self) -> bool {
    self.ti_min <= self.tils
      && self.tils <= self.ti_max
      && self.fac_min <= FixedU128::one()
      && self.fac_max >= FixedU128::one()
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
  Mint,
  Redeem,
}

/// Interest rate charged on the collateral value of an operation.
pub fn interest_rate(
  curve: &InterestCurve,
  abundance: Permill,
  band: Permill,
  direction: Direction,
) -> Permill {
  let factor = correction_factor(curve, abundance, band, direction);
  let rate = FixedU128::from(curve.tils).saturating_mul(factor);
  let rate = Permill::from_rational(rate.into_inner(), FixedU128::accuracy());
  rate.max(curve.ti_min).min(curve.ti_max)
}

fn correction_factor(
  curve: &InterestCurve,
  abundance: Permill,
  band: Permill,
  direction: Direction,
) -> FixedU128 {
  let (abundant_end, scarce_end) = match direction {
    Direction::Mint => (curve.fac_max, curve.fac_min),
    Direction::Redeem => (curve.fac_min, curve.fac_max),
  };
  let lower = curve.abeq.saturating_sub(band);
  let upper = curve.abeq.saturating_add(band);
  if abundance > upper {
    let span = Permill::ACCURACY - upper.deconstruct();
    let progress = Permill::from_rational(abundance.deconstruct() - upper.deconstruct(), span);
    lerp_from_one(abundant_end, progress)
  } else if abundance < lower {
    let progress = Permill::from_rational(
      lower.deconstruct() - abundance.deconstruct(),
      lower.deconstruct(),
    );
    lerp_from_one(scarce_end, progress)
  } else {
    FixedU128::one()
  }
}

fn lerp_from_one(end: FixedU128, progress: Permill) -> FixedU128 {
  let one = FixedU128::one();
  let t = FixedU128::from(progress);
  if end >= one {
    one.saturating_add(end.saturating_sub(one).saturating_mul(t))
  } else {
    one.saturating_sub(one.saturating_sub(end).saturating_mul(t))
  }
}
