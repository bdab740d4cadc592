//! Periodic settlement: EMA refresh, collateral token holder interest and the success fee.

use crate::ledger::{LedgerView, div_fixed, mul_fixed};
use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_support::storage::{TransactionOutcome, with_transaction};
use polkadot_sdk::sp_arithmetic::{
  ArithmeticError, Rounding,
  traits::{CheckedDiv, CheckedMul},
};
use polkadot_sdk::sp_runtime::{FixedPointNumber, FixedU128, traits::One};

impl<T: Config> Pallet<T> {
  pub(crate) fn do_exec_settlement() -> DispatchResult {
    ensure!(!Bucket::<T>::get().liquidated, Error::<T>::Liquidated);
    let now = frame_system::Pallet::<T>::block_number();
    ensure!(
      now >= NextSettlementBlock::<T>::get(),
      Error::<T>::SettlementTooEarly
    );
    let params = ProtocolParams::<T>::get();

    Self::update_due_emas(now);
    Self::realize_gain();

    let (tc_interest, success_fee) = match Self::ledger_view() {
      Ok(view) => {
        let tc_interest = Self::pay_tc_interest(&view, &params)?;
        let view = Self::ledger_view()?;
        let success_fee = Self::pay_success_fee(&view, &params)?;
        (tc_interest, success_fee)
      }
      Err(error) => {
        log::warn!(target: LOG_TARGET, "settlement without payouts: {error:?}");
        (0, 0)
      }
    };

    let next_settlement = now.saturating_add(params.settlement_interval);
    NextSettlementBlock::<T>::put(next_settlement);
    log::info!(
      target: LOG_TARGET,
      "settlement done: tc interest {tc_interest}, success fee {success_fee}"
    );
    Self::deposit_event(Event::SettlementExecuted {
      tc_interest,
      success_fee,
      next_settlement,
    });
    Ok(())
  }

  /// Folds accumulated gain or loss into total collateral.
  fn realize_gain() {
    Bucket::<T>::mutate(|bucket| {
      bucket.total_collateral = bucket.available_collateral();
      bucket.accumulated_gain_loss = 0;
    });
  }

  fn pay_tc_interest(
    view: &LedgerView,
    params: &ProtocolParameters<BlockNumberFor<T>>,
  ) -> Result<Balance, DispatchError> {
    let amount = params
      .tc_interest_rate
      .mul_floor(view.total_locked()?)
      .min(view.available);
    Ok(Self::pay_from_collateral(&T::InterestCollectorAccount::get(), amount))
  }

  /// Skims `success_fee` of the collateral appreciation since the last settlement, scaled by
  /// how far coverage is above target.
  fn pay_success_fee(
    view: &LedgerView,
    params: &ProtocolParameters<BlockNumberFor<T>>,
  ) -> Result<Balance, DispatchError> {
    let mut tokens = PeggedTokens::<T>::get();
    let factor = Self::appreciation_factor(view, params.appreciation_factor)?;
    let mut appreciation: Balance = 0;
    for (token, snapshot) in tokens.iter_mut().zip(view.tokens.iter()) {
      let last = token.last_settlement_price;
      if last.into_inner() > 0 && snapshot.price > last {
        let before = div_fixed(token.total_supply, last, Rounding::Down)?;
        let after = div_fixed(token.total_supply, snapshot.price, Rounding::Up)?;
        appreciation = appreciation.saturating_add(before.saturating_sub(after));
      }
      token.last_settlement_price = snapshot.price;
    }
    PeggedTokens::<T>::put(tokens);

    let skim = params
      .success_fee
      .mul_floor(mul_fixed(appreciation, factor, Rounding::Down)?);
    let surplus = view.available.saturating_sub(view.target_locked()?);
    Ok(Self::pay_from_collateral(
      &T::SuccessFeeAccount::get(),
      skim.min(surplus),
    ))
  }

  /// `min(1, (coverage - target) / target * factor)`, zero at or below target.
  fn appreciation_factor(view: &LedgerView, factor: FixedU128) -> Result<FixedU128, DispatchError> {
    let coverage = view.coverage()?;
    let target = view.global_target_coverage()?;
    if coverage <= target {
      return Ok(FixedU128::from_inner(0));
    }
    let excess = coverage
      .saturating_sub(target)
      .checked_div(&target)
      .ok_or(ArithmeticError::DivisionByZero)?;
    Ok(
      excess
        .checked_mul(&factor)
        .unwrap_or(FixedU128::one())
        .min(FixedU128::one()),
    )
  }

  /// Fire and forget collateral payout. A transfer that fails leaves the buckets untouched.
  fn pay_from_collateral(to: &T::AccountId, amount: Balance) -> Balance {
    if amount == 0 {
      return 0;
    }
    let res = with_transaction(|| {
      let res = Self::transfer_asset(T::CollateralAssetId::get(), &Self::account_id(), to, amount)
        .and_then(|()| {
          Bucket::<T>::try_mutate(|bucket| -> DispatchResult {
            bucket.total_collateral = bucket
              .total_collateral
              .checked_sub(amount)
              .ok_or(ArithmeticError::Underflow)?;
            Ok(())
          })
        });
      if res.is_ok() {
        TransactionOutcome::Commit(res)
      } else {
        TransactionOutcome::Rollback(res)
      }
    });
    match res {
      Ok(()) => amount,
      Err(error) => {
        log::warn!(target: LOG_TARGET, "settlement payout of {amount} not delivered: {error:?}");
        0
      }
    }
  }
}
