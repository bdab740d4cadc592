use polkadot_sdk::frame_support::pallet_prelude::*;
use polkadot_sdk::sp_runtime::{
  FixedPointNumber, FixedU128, Permill, Saturating,
  traits::One,
};

pub use primitives::{Balance, OperId, PriceProviderId, TpIndex};
use primitives::params;

use crate::flux::FluxContribution;
use crate::interest::InterestCurve;

/// Operation type tag, used for execution fee lookup and events.
#[derive(
  Clone,
  Copy,
  Debug,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  Ord,
  PartialOrd,
  TypeInfo,
  MaxEncodedLen,
)]
pub enum OperationKind {
  MintTC,
  RedeemTC,
  MintTP,
  RedeemTP,
  MintTCandTP,
  RedeemTCandTP,
  SwapTCforTP,
  SwapTPforTC,
  SwapTPforTP,
}

/// A user request as registered in the queue.
///
/// Minimum/maximum bounds are the caller's slippage guard and are only checked at execution.
/// Collateral amounts are in the collateral asset, `q_tc` in the collateral token and `q_tp` in
/// the pegged token addressed by `tp`.
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
pub enum Action {
  MintTC {
    q_tc: Balance,
    q_ac_max: Balance,
  },
  RedeemTC {
    q_tc: Balance,
    q_ac_min: Balance,
  },
  MintTP {
    tp: TpIndex,
    q_tp: Balance,
    q_ac_max: Balance,
  },
  RedeemTP {
    tp: TpIndex,
    q_tp: Balance,
    q_ac_min: Balance,
  },
  /// Mints `q_tp` together with the collateral tokens keeping the token at target coverage.
  MintTCandTP {
    tp: TpIndex,
    q_tp: Balance,
    q_ac_max: Balance,
  },
  /// Redeems `q_tc` together with the proportional pegged tokens, at most `q_tp`.
  RedeemTCandTP {
    tp: TpIndex,
    q_tc: Balance,
    q_tp: Balance,
    q_ac_min: Balance,
  },
  SwapTCforTP {
    tp: TpIndex,
    q_tc: Balance,
    q_tp_min: Balance,
    q_ac_max: Balance,
  },
  SwapTPforTC {
    tp: TpIndex,
    q_tp: Balance,
    q_tc_min: Balance,
    q_ac_max: Balance,
  },
  SwapTPforTP {
    tp_from: TpIndex,
    tp_to: TpIndex,
    q_tp: Balance,
    q_tp_min: Balance,
    q_ac_max: Balance,
  },
}

impl Action {
  pub fn kind(&self) -> OperationKind {
    match self {
      Action::MintTC { .. } => OperationKind::MintTC,
      Action::RedeemTC { .. } => OperationKind::RedeemTC,
      Action::MintTP { .. } => OperationKind::MintTP,
      Action::RedeemTP { .. } => OperationKind::RedeemTP,
      Action::MintTCandTP { .. } => OperationKind::MintTCandTP,
      Action::RedeemTCandTP { .. } => OperationKind::RedeemTCandTP,
      Action::SwapTCforTP { .. } => OperationKind::SwapTCforTP,
      Action::SwapTPforTC { .. } => OperationKind::SwapTPforTC,
      Action::SwapTPforTP { .. } => OperationKind::SwapTPforTP,
    }
  }

  /// Pegged token indices the action touches.
  pub fn pegged_tokens(&self) -> (Option<TpIndex>, Option<TpIndex>) {
    match *self {
      Action::MintTC { .. } | Action::RedeemTC { .. } => (None, None),
      Action::MintTP { tp, .. }
      | Action::RedeemTP { tp, .. }
      | Action::MintTCandTP { tp, .. }
      | Action::RedeemTCandTP { tp, .. }
      | Action::SwapTCforTP { tp, .. }
      | Action::SwapTPforTC { tp, .. } => (Some(tp), None),
      Action::SwapTPforTP { tp_from, tp_to, .. } => (Some(tp_from), Some(tp_to)),
    }
  }

  /// Funds taken into custody at enqueue time.
  pub fn escrow(&self, execution_fee: Balance) -> Escrow {
    let mut escrow = Escrow {
      execution_fee,
      ..Default::default()
    };
    match *self {
      Action::MintTC { q_ac_max, .. }
      | Action::MintTP { q_ac_max, .. }
      | Action::MintTCandTP { q_ac_max, .. } => escrow.collateral = q_ac_max,
      Action::RedeemTC { q_tc, .. } => escrow.collateral_token = q_tc,
      Action::RedeemTP { tp, q_tp, .. } => escrow.pegged = Some((tp, q_tp)),
      Action::RedeemTCandTP { tp, q_tc, q_tp, .. } => {
        escrow.collateral_token = q_tc;
        escrow.pegged = Some((tp, q_tp));
      }
      Action::SwapTCforTP { q_tc, q_ac_max, .. } => {
        escrow.collateral = q_ac_max;
        escrow.collateral_token = q_tc;
      }
      Action::SwapTPforTC {
        tp, q_tp, q_ac_max, ..
      } => {
        escrow.collateral = q_ac_max;
        escrow.pegged = Some((tp, q_tp));
      }
      Action::SwapTPforTP {
        tp_from,
        q_tp,
        q_ac_max,
        ..
      } => {
        escrow.collateral = q_ac_max;
        escrow.pegged = Some((tp_from, q_tp));
      }
    }
    escrow
  }
}

/// Funds held by the queue for the lifetime of one operation.
#[derive(
  Clone,
  Copy,
  Debug,
  Default,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  TypeInfo,
  MaxEncodedLen,
)]
pub struct Escrow {
  pub collateral: Balance,
  pub collateral_token: Balance,
  pub pegged: Option<(TpIndex, Balance)>,
  /// Base settlement asset, paid to whoever executes the operation.
  pub execution_fee: Balance,
}

impl Escrow {
  /// Whether no collateral or token leg is left to move.
  pub fn is_empty(&self) -> bool {
    self.collateral == 0
      && self.collateral_token == 0
      && self.pegged.map_or(true, |(_, amount)| amount == 0)
  }
}

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
pub enum OperationState {
  Queued,
  Executed,
  Errored,
}

/// Persisted queue record. Never deleted once created.
#[derive(
  Clone, Debug, Decode, DecodeWithMemTracking, Encode, Eq, PartialEq, TypeInfo, MaxEncodedLen,
)]
pub struct Operation<AccountId, BlockNumber> {
  pub owner: AccountId,
  pub recipient: AccountId,
  pub vendor: Option<AccountId>,
  pub action: Action,
  pub escrow: Escrow,
  pub flux: FluxContribution,
  pub pay_fee_in_token: bool,
  pub state: OperationState,
  pub queued_at: BlockNumber,
}

/// Singleton collateral ledger.
///
/// Collateral custody of the pallet account always equals
/// `total_collateral + accumulated_gain_loss + pending_escrowed_collateral`.
#[derive(
  Clone,
  Copy,
  Debug,
  Default,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  TypeInfo,
  MaxEncodedLen,
)]
pub struct GlobalBucket {
  pub total_collateral: Balance,
  /// Locked collateral as of the last committed state change.
  pub locked_collateral: Balance,
  pub pending_escrowed_collateral: Balance,
  /// Interest and other flows not yet realized into `total_collateral`.
  pub accumulated_gain_loss: i128,
  /// Collateral token supply issued by this core.
  pub tc_supply: Balance,
  pub liquidated: bool,
  pub liquidation_enabled: bool,
}

impl GlobalBucket {
  /// `total_collateral + accumulated_gain_loss`, clamped at zero.
  pub fn available_collateral(&self) -> Balance {
    let total = i128::try_from(self.total_collateral).unwrap_or(i128::MAX);
    let net = total.saturating_add(self.accumulated_gain_loss);
    Balance::try_from(net).unwrap_or_default()
  }
}

#[derive(
  Clone,
  Copy,
  Debug,
  Default,
  Decode,
  DecodeWithMemTracking,
  Encode,
  Eq,
  PartialEq,
  TypeInfo,
  MaxEncodedLen,
)]
pub struct EmaState<BlockNumber> {
  pub value: FixedU128,
  pub smoothing: Permill,
  pub last_block: BlockNumber,
  pub interval: BlockNumber,
}

impl<BlockNumber: Copy + PartialOrd + Saturating> EmaState<BlockNumber> {
  pub fn next_calculation(&self) -> BlockNumber {
    self.last_block.saturating_add(self.interval)
  }

  pub fn is_due(&self, now: BlockNumber) -> bool {
    now >= self.next_calculation()
  }

  /// `value * (1 - smoothing) + price * smoothing`; seeds with `price` when unset.
  pub fn advance(&mut self, price: FixedU128, now: BlockNumber) {
    self.value = if self.value.into_inner() == 0 {
      price
    } else {
      let alpha = FixedU128::from(self.smoothing);
      let keep = FixedU128::one().saturating_sub(alpha);
      self
        .value
        .saturating_mul(keep)
        .saturating_add(price.saturating_mul(alpha))
    };
    self.last_block = now;
  }
}

/// Governance input for registering or editing a pegged token.
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
pub struct PeggedTokenConfig<BlockNumber> {
  pub asset_id: u32,
  pub price_provider: PriceProviderId,
  pub target_coverage: FixedU128,
  pub ema_smoothing: Permill,
  pub ema_interval: BlockNumber,
  pub interest: InterestCurve,
  pub mint_fee: Permill,
  pub redeem_fee: Permill,
}

/// Per pegged token accounting.
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
pub struct PeggedTokenBucket<BlockNumber> {
  pub asset_id: u32,
  pub price_provider: PriceProviderId,
  /// Mirrors the live supply of `asset_id`.
  pub total_supply: Balance,
  pub target_coverage: FixedU128,
  pub ema: EmaState<BlockNumber>,
  pub interest: InterestCurve,
  pub mint_fee: Permill,
  pub redeem_fee: Permill,
  /// Price seen by the previous settlement, zero until one happened.
  pub last_settlement_price: FixedU128,
}

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
pub struct ProtocolParameters<BlockNumber> {
  pub protection_threshold: FixedU128,
  pub liquidation_threshold: FixedU128,
  pub tc_interest_rate: Permill,
  pub success_fee: Permill,
  pub appreciation_factor: FixedU128,
  pub settlement_interval: BlockNumber,
  pub abundance_band: Permill,
}

impl<BlockNumber: From<u32>> Default for ProtocolParameters<BlockNumber> {
  fn default() -> Self {
    Self {
      protection_threshold: params::PROTECTION_THRESHOLD,
      liquidation_threshold: params::LIQUIDATION_THRESHOLD,
      tc_interest_rate: params::TC_INTEREST_RATE,
      success_fee: params::SUCCESS_FEE,
      appreciation_factor: params::APPRECIATION_FACTOR,
      settlement_interval: params::SETTLEMENT_INTERVAL.into(),
      abundance_band: params::ABUNDANCE_BAND,
    }
  }
}

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
pub struct FeeParameters {
  pub tc_mint_fee: Permill,
  pub tc_redeem_fee: Permill,
  pub mint_tc_and_tp_fee: Permill,
  pub redeem_tc_and_tp_fee: Permill,
  pub swap_tc_for_tp_fee: Permill,
  pub swap_tp_for_tc_fee: Permill,
  pub swap_tp_for_tp_fee: Permill,
  /// Fraction of the collateral fee due when paying in the fee token.
  pub fee_token_pct: Permill,
  /// Share of a vendor markup kept by the protocol.
  pub vendor_protocol_share: Permill,
}

impl Default for FeeParameters {
  fn default() -> Self {
    Self {
      tc_mint_fee: params::TC_MINT_FEE,
      tc_redeem_fee: params::TC_REDEEM_FEE,
      mint_tc_and_tp_fee: params::TC_AND_TP_FEE,
      redeem_tc_and_tp_fee: params::TC_AND_TP_FEE,
      swap_tc_for_tp_fee: params::SWAP_FEE,
      swap_tp_for_tc_fee: params::SWAP_FEE,
      swap_tp_for_tp_fee: params::SWAP_FEE,
      fee_token_pct: params::FEE_TOKEN_PCT,
      vendor_protocol_share: params::VENDOR_PROTOCOL_SHARE,
    }
  }
}

/// Alternate fee asset. Its provider quotes fee token units per collateral unit.
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
pub struct FeeTokenConfig {
  pub asset_id: u32,
  pub price_provider: PriceProviderId,
}
