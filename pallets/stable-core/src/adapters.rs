//! Adapter traits for the stable core
//!
//! The pallet consumes prices and signals liquidation through these traits, keeping it
//! independent of any oracle or token-layer implementation.

use polkadot_sdk::sp_runtime::FixedU128;

use primitives::PriceProviderId;

/// Reference price source.
///
/// Returns `(pACtp, is_valid)`: pegged units per collateral unit and whether the provider
/// considers the value fresh. An invalid or zero price fails every dependent operation; the
/// pallet never falls back to a previous value.
pub trait PriceOracle {
  fn current_price(provider: PriceProviderId) -> (FixedU128, bool);
}

/// No-op oracle: every provider is invalid.
impl PriceOracle for () {
  fn current_price(_: PriceProviderId) -> (FixedU128, bool) {
    (FixedU128::from_inner(0), false)
  }
}

/// Runtime glue invoked once when the protocol enters liquidation.
///
/// Typically freezes the collateral token so it stops being transferable.
pub trait OnLiquidation {
  fn on_liquidation(collateral_token: u32);
}

impl OnLiquidation for () {
  fn on_liquidation(_: u32) {}
}
