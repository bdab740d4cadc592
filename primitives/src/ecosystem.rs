//! Ecosystem Constants for the stable core
//!
//! This module centralizes system-level constants: balance and identifier aliases, the pallet id
//! used to derive the custody account, and the default economic parameters the core boots with.
//!
//! Governance may override every parameter at runtime; these values only seed storage defaults
//! and test fixtures.

/// Balance type alias for consistency across ecosystem
pub type Balance = u128;

/// Monotonic identifier assigned to every queued operation.
pub type OperId = u64;

/// Position of a pegged token in the append-only bucket list.
pub type TpIndex = u32;

/// Identifier of a price source registered with the oracle adapter.
pub type PriceProviderId = u32;

/// Pallet identifiers for deriving pallet-owned accounts.
///
/// These IDs are used by Polkadot SDK's `PalletId::into_account_truncating()`
/// to deterministically generate accounts for pallet-specific operations.
pub mod pallet_ids {
  /// Stable core pallet ID (queue escrow and collateral custody)
  pub const STABLE_CORE_PALLET_ID: &[u8; 8] = b"stblcore";
}

/// Ecosystem parameters defining mathematical constants and thresholds.
///
/// Ratios above one are `FixedU128` (18 decimals), fractions in `[0, 1]` are `Permill`.
pub mod params {
  use super::Balance;
  use sp_arithmetic::{FixedU128, Permill};

  /// Precision scalar for all amounts (10^18).
  ///
  /// Collateral, collateral token and pegged token amounts share this 18-decimal unit, which is
  /// also the inner accuracy of `FixedU128`.
  pub const PRECISION: Balance = 1_000_000_000_000_000_000;

  /// Coverage below which coverage-reducing operations are refused (1.5).
  pub const PROTECTION_THRESHOLD: FixedU128 = FixedU128::from_inner(1_500_000_000_000_000_000);

  /// Coverage below which the protocol may be liquidated (1.04).
  pub const LIQUIDATION_THRESHOLD: FixedU128 = FixedU128::from_inner(1_040_000_000_000_000_000);

  /// Collateral token mint fee (0.5%).
  pub const TC_MINT_FEE: Permill = Permill::from_parts(5_000);

  /// Collateral token redeem fee (0.5%).
  pub const TC_REDEEM_FEE: Permill = Permill::from_parts(5_000);

  /// Combined TC and TP mint/redeem fee (0.5%).
  pub const TC_AND_TP_FEE: Permill = Permill::from_parts(5_000);

  /// Swap fee applied to all three swap kinds (0.1%).
  pub const SWAP_FEE: Permill = Permill::from_parts(1_000);

  /// Share of a fee charged when paying with the alternate fee token (50%).
  pub const FEE_TOKEN_PCT: Permill = Permill::from_percent(50);

  /// Share of the vendor markup retained by the protocol (10%).
  pub const VENDOR_PROTOCOL_SHARE: Permill = Permill::from_percent(10);

  /// Collateral token holder interest charged on locked collateral per settlement (0.005%).
  pub const TC_INTEREST_RATE: Permill = Permill::from_parts(50);

  /// Fraction of pegged-token driven collateral appreciation skimmed at settlement (10%).
  pub const SUCCESS_FEE: Permill = Permill::from_percent(10);

  /// Dampens the success fee as coverage approaches its target (x1).
  pub const APPRECIATION_FACTOR: FixedU128 = FixedU128::from_inner(PRECISION);

  /// Tolerance band around the equilibrium abundance in which the base interest applies (5%).
  pub const ABUNDANCE_BAND: Permill = Permill::from_percent(5);

  /// Blocks between settlements (~1 week at 6s/block).
  pub const SETTLEMENT_INTERVAL: u32 = 100_800;

  /// Flux capacitor ceiling on decayed absolute volume (100k collateral units).
  pub const FLUX_MAX_ABSOLUTE_OP: Balance = 100_000 * PRECISION;

  /// Flux capacitor ceiling on decayed net volume (50k collateral units).
  pub const FLUX_MAX_OP_DIFF: Balance = 50_000 * PRECISION;

  /// Blocks for the flux capacitor window to decay to zero (~1 hour at 6s/block).
  pub const FLUX_DECAY_SPAN: u32 = 600;
}
