//! Liquidation: a terminal state entered when coverage drops under the liquidation threshold.
//!
//! At the liquidation moment every pegged token gets a redemption price
//! `price_i * locked / available`. Redeeming a whole supply at that price pays out the token's
//! locked share of the available collateral, so collateral is split by exposure rather than by
//! raw token amounts.

use crate::ledger::{LedgerView, div_fixed};
use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_support::traits::fungibles::Inspect;
use polkadot_sdk::sp_arithmetic::{ArithmeticError, Rounding, traits::CheckedMul};
use polkadot_sdk::sp_runtime::{FixedPointNumber, FixedU128};

impl<T: Config> Pallet<T> {
  /// Enters liquidation when enabled and coverage is under the threshold. Returns whether the
  /// protocol is liquidated afterwards.
  pub(crate) fn do_eval_liquidation() -> Result<bool, DispatchError> {
    let bucket = Bucket::<T>::get();
    if bucket.liquidated {
      return Ok(true);
    }
    if !bucket.liquidation_enabled {
      return Ok(false);
    }
    let view = Self::ledger_view()?;
    if view.coverage()? >= ProtocolParams::<T>::get().liquidation_threshold {
      return Ok(false);
    }
    Self::enter_liquidation(&view)?;
    Ok(true)
  }

  fn enter_liquidation(view: &LedgerView) -> DispatchResult {
    let locked = view.total_locked()?;
    for (tp, token) in view.tokens.iter().enumerate() {
      let liq_price = if view.available == 0 {
        FixedU128::max_value()
      } else {
        FixedU128::checked_from_rational(locked, view.available)
          .and_then(|ratio| token.price.checked_mul(&ratio))
          .ok_or(ArithmeticError::Overflow)?
      };
      LiquidationPrices::<T>::insert(tp as TpIndex, liq_price);
    }
    Bucket::<T>::mutate(|bucket| {
      bucket.total_collateral = view.available;
      bucket.accumulated_gain_loss = 0;
      bucket.locked_collateral = locked;
      bucket.liquidated = true;
    });
    T::LiquidationHook::on_liquidation(T::CollateralTokenId::get());
    log::info!(
      target: LOG_TARGET,
      "protocol liquidated: available {} locked {}",
      view.available,
      locked
    );
    Self::deposit_event(Event::ContractLiquidated);
    Ok(())
  }

  pub(crate) fn do_liq_redeem_tp(
    who: T::AccountId,
    tp: TpIndex,
    recipient: T::AccountId,
  ) -> DispatchResult {
    ensure!(Bucket::<T>::get().liquidated, Error::<T>::NotLiquidated);
    let asset_id = Self::pegged_asset(tp)?;
    let liq_price = LiquidationPrices::<T>::get(tp).ok_or(Error::<T>::InvalidPeggedToken)?;
    let q_tp = T::Assets::balance(asset_id, &who);
    ensure!(q_tp > 0, Error::<T>::NothingToRedeem);

    let bucket = Bucket::<T>::get();
    let q_ac = div_fixed(q_tp, liq_price, Rounding::Down)?.min(bucket.total_collateral);

    Self::burn_asset(asset_id, &who, q_tp)?;
    Self::transfer_asset(T::CollateralAssetId::get(), &Self::account_id(), &recipient, q_ac)?;
    Bucket::<T>::mutate(|bucket| {
      bucket.total_collateral = bucket.total_collateral.saturating_sub(q_ac);
    });
    PeggedTokens::<T>::mutate(|tokens| {
      if let Some(token) = tokens.get_mut(tp as usize) {
        token.total_supply = token.total_supply.saturating_sub(q_tp);
      }
    });

    Self::deposit_event(Event::LiqTPRedeemed {
      tp,
      redeemer: who,
      recipient,
      q_tp,
      q_ac,
    });
    Ok(())
  }
}
