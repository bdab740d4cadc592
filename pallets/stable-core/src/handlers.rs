//! Per operation handlers.
//!
//! A handler turns a queued operation into a [`Plan`] against a price snapshot without touching
//! storage. The plan is checked against the post-operation ledger and only then committed.

use crate::fees::FeeCharge;
use crate::interest::Direction;
use crate::ledger::{LedgerView, div_fixed, mul_fixed};
use crate::*;
use frame::prelude::*;
use polkadot_sdk::sp_arithmetic::{ArithmeticError, Rounding};
use polkadot_sdk::sp_runtime::{FixedPointNumber, FixedU128, traits::One};

/// Ledger and asset changes of one operation.
pub(crate) struct Plan<T: Config> {
  /// Collateral credited to the buckets.
  pub collateral_in: Balance,
  /// Collateral debited from the buckets.
  pub collateral_out: Balance,
  /// Collateral paid to the recipient.
  pub payout: Balance,
  /// Interest retained as accumulated gain.
  pub interest: Balance,
  pub fee: FeeCharge<T::AccountId>,
  pub tc_mint: Balance,
  pub tc_burn: Balance,
  pub tp_mint: Option<(TpIndex, Balance)>,
  pub tp_burn: Option<(TpIndex, Balance)>,
  pub event: Event<T>,
}

impl<T: Config> Plan<T> {
  fn new(fee: FeeCharge<T::AccountId>, event: Event<T>) -> Self {
    Self {
      collateral_in: 0,
      collateral_out: 0,
      payout: 0,
      interest: 0,
      fee,
      tc_mint: 0,
      tc_burn: 0,
      tp_mint: None,
      tp_burn: None,
      event,
    }
  }

  /// The snapshot as it will look once the plan is committed.
  fn apply(&self, view: &LedgerView) -> Result<LedgerView, ArithmeticError> {
    let mut after = view.clone();
    after.available = after
      .available
      .checked_add(self.collateral_in)
      .and_then(|v| v.checked_add(self.interest))
      .and_then(|v| v.checked_sub(self.collateral_out))
      .ok_or(ArithmeticError::Underflow)?;
    after.tc_supply = after
      .tc_supply
      .checked_add(self.tc_mint)
      .and_then(|v| v.checked_sub(self.tc_burn))
      .ok_or(ArithmeticError::Underflow)?;
    if let Some((tp, amount)) = self.tp_burn {
      let token = after
        .tokens
        .get_mut(tp as usize)
        .ok_or(ArithmeticError::Overflow)?;
      token.supply = token
        .supply
        .checked_sub(amount)
        .ok_or(ArithmeticError::Underflow)?;
    }
    if let Some((tp, amount)) = self.tp_mint {
      let token = after
        .tokens
        .get_mut(tp as usize)
        .ok_or(ArithmeticError::Overflow)?;
      token.supply = token
        .supply
        .checked_add(amount)
        .ok_or(ArithmeticError::Overflow)?;
    }
    Ok(after)
  }
}

fn add(a: Balance, b: Balance) -> Result<Balance, ArithmeticError> {
  a.checked_add(b).ok_or(ArithmeticError::Overflow)
}

/// `ctargema - 1`, the collateral a pegged unit needs above its own value.
fn headroom(ctargema: FixedU128) -> FixedU128 {
  ctargema.saturating_sub(FixedU128::one())
}

impl<T: Config> Pallet<T> {
  /// Validates `op` at current prices and returns what committing it would change.
  pub(crate) fn plan_operation(oper_id: OperId, op: &OperationOf<T>) -> Result<Plan<T>, DispatchError> {
    ensure!(!Paused::<T>::get(), Error::<T>::Paused);
    ensure!(!Bucket::<T>::get().liquidated, Error::<T>::Liquidated);
    let view = Self::ledger_view()?;
    let (first, second) = op.action.pegged_tokens();
    for tp in [first, second].into_iter().flatten() {
      Self::ensure_token(&view, tp)?;
    }

    let plan = match op.action {
      Action::MintTC { q_tc, q_ac_max } => Self::plan_mint_tc(oper_id, op, &view, q_tc, q_ac_max)?,
      Action::RedeemTC { q_tc, q_ac_min } => {
        Self::plan_redeem_tc(oper_id, op, &view, q_tc, q_ac_min)?
      }
      Action::MintTP { tp, q_tp, q_ac_max } => {
        Self::plan_mint_tp(oper_id, op, &view, tp, q_tp, q_ac_max)?
      }
      Action::RedeemTP { tp, q_tp, q_ac_min } => {
        Self::plan_redeem_tp(oper_id, op, &view, tp, q_tp, q_ac_min)?
      }
      Action::MintTCandTP { tp, q_tp, q_ac_max } => {
        Self::plan_mint_tc_and_tp(oper_id, op, &view, tp, q_tp, q_ac_max)?
      }
      Action::RedeemTCandTP {
        tp,
        q_tc,
        q_tp,
        q_ac_min,
      } => Self::plan_redeem_tc_and_tp(oper_id, op, &view, tp, q_tc, q_tp, q_ac_min)?,
      Action::SwapTCforTP {
        tp,
        q_tc,
        q_tp_min,
        q_ac_max,
      } => Self::plan_swap_tc_for_tp(oper_id, op, &view, tp, q_tc, q_tp_min, q_ac_max)?,
      Action::SwapTPforTC {
        tp,
        q_tp,
        q_tc_min,
        q_ac_max,
      } => Self::plan_swap_tp_for_tc(oper_id, op, &view, tp, q_tp, q_tc_min, q_ac_max)?,
      Action::SwapTPforTP {
        tp_from,
        tp_to,
        q_tp,
        q_tp_min,
        q_ac_max,
      } => Self::plan_swap_tp_for_tp(
        oper_id, op, &view, tp_from, tp_to, q_tp, q_tp_min, q_ac_max,
      )?,
    };

    // Minting collateral tokens only adds collateral.
    if op.action.kind() != OperationKind::MintTC {
      let after = plan.apply(&view)?;
      ensure!(
        after.coverage()? >= ProtocolParams::<T>::get().protection_threshold,
        Error::<T>::LowCoverage
      );
    }
    Ok(plan)
  }

  fn positive_tc_price(view: &LedgerView) -> Result<FixedU128, DispatchError> {
    let price = view.tc_price()?;
    ensure!(price.into_inner() > 0, Error::<T>::LowCoverage);
    Ok(price)
  }

  fn plan_mint_tc(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    q_tc: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    let tc_price = Self::positive_tc_price(view)?;
    let cost = mul_fixed(q_tc, tc_price, Rounding::Up)?;
    let fee = Self::quote_fee(op, FeeParams::<T>::get().tc_mint_fee, cost)?;
    ensure!(
      add(cost, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TCMinted {
      oper_id,
      recipient: op.recipient.clone(),
      q_tc,
      q_ac: cost,
      fee: fee.fee,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_in = cost;
    plan.tc_mint = q_tc;
    Ok(plan)
  }

  fn plan_redeem_tc(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    q_tc: Balance,
    q_ac_min: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    ensure!(
      q_tc <= view.tc_available_to_redeem()?,
      Error::<T>::InsufficientTCtoRedeem
    );
    let tc_price = Self::positive_tc_price(view)?;
    let value = mul_fixed(q_tc, tc_price, Rounding::Down)?;
    let fee = Self::quote_fee(op, FeeParams::<T>::get().tc_redeem_fee, value)?;
    let payout = value
      .checked_sub(fee.collateral_due())
      .ok_or(Error::<T>::QacBelowMinimumRequired)?;
    ensure!(payout >= q_ac_min, Error::<T>::QacBelowMinimumRequired);
    let event = Event::TCRedeemed {
      oper_id,
      recipient: op.recipient.clone(),
      q_tc,
      q_ac: payout,
      fee: fee.fee,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_out = value;
    plan.payout = payout;
    plan.tc_burn = q_tc;
    Ok(plan)
  }

  fn plan_mint_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tp: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    let token = Self::pegged_token(tp)?;
    ensure!(
      q_tp <= view.tp_available_to_mint(tp as usize)?,
      Error::<T>::InsufficientTPtoMint
    );
    let cost = div_fixed(q_tp, view.tokens[tp as usize].price, Rounding::Up)?;
    let interest = Self::rate_for(view, tp, Direction::Mint)?.mul_ceil(cost);
    let fee = Self::quote_fee(op, token.mint_fee, cost)?;
    ensure!(
      add(add(cost, interest)?, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TPMinted {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tp,
      q_ac: cost,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_in = cost;
    plan.interest = interest;
    plan.tp_mint = Some((tp, q_tp));
    Ok(plan)
  }

  fn plan_redeem_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tp: Balance,
    q_ac_min: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    let token = Self::pegged_token(tp)?;
    ensure!(
      q_tp <= view.tokens[tp as usize].supply,
      Error::<T>::InsufficientTPtoRedeem
    );
    let value = div_fixed(q_tp, view.tokens[tp as usize].price, Rounding::Down)?;
    let interest = Self::rate_for(view, tp, Direction::Redeem)?.mul_ceil(value);
    let fee = Self::quote_fee(op, token.redeem_fee, value)?;
    let payout = value
      .checked_sub(interest)
      .and_then(|v| v.checked_sub(fee.collateral_due()))
      .ok_or(Error::<T>::QacBelowMinimumRequired)?;
    ensure!(payout >= q_ac_min, Error::<T>::QacBelowMinimumRequired);
    let event = Event::TPRedeemed {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tp,
      q_ac: payout,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_out = value;
    plan.payout = payout;
    plan.interest = interest;
    plan.tp_burn = Some((tp, q_tp));
    Ok(plan)
  }

  /// Mints `q_tp` plus the collateral tokens that back it at adjusted target coverage.
  fn plan_mint_tc_and_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tp: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    let tc_price = Self::positive_tc_price(view)?;
    let q_ac_tp = div_fixed(q_tp, view.tokens[tp as usize].price, Rounding::Up)?;
    let ctargema = view.target_coverage_ema(tp as usize)?;
    let q_ac_tc = mul_fixed(q_ac_tp, headroom(ctargema), Rounding::Up)?;
    let q_tc = div_fixed(q_ac_tc, tc_price, Rounding::Down)?;
    let cost = add(q_ac_tc, q_ac_tp)?;
    let interest = Self::rate_for(view, tp, Direction::Mint)?.mul_ceil(q_ac_tp);
    let fee = Self::quote_fee(op, FeeParams::<T>::get().mint_tc_and_tp_fee, cost)?;
    ensure!(
      add(add(cost, interest)?, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TCandTPMinted {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tc,
      q_tp,
      q_ac: cost,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_in = cost;
    plan.interest = interest;
    plan.tc_mint = q_tc;
    plan.tp_mint = Some((tp, q_tp));
    Ok(plan)
  }

  /// Redeems `q_tc` with the pegged tokens it backs; escrowed pegged tokens beyond that are
  /// returned.
  fn plan_redeem_tc_and_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tc: Balance,
    q_tp: Balance,
    q_ac_min: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    let tc_price = Self::positive_tc_price(view)?;
    let price = view.tokens[tp as usize].price;
    let q_ac_tc = mul_fixed(q_tc, tc_price, Rounding::Down)?;
    let ctargema = view.target_coverage_ema(tp as usize)?;
    let q_ac_tp = div_fixed(q_ac_tc, headroom(ctargema), Rounding::Down)?;
    let q_tp_needed = mul_fixed(q_ac_tp, price, Rounding::Up)?;
    ensure!(
      q_tp_needed <= q_tp && q_tp_needed <= view.tokens[tp as usize].supply,
      Error::<T>::InsufficientTPtoRedeem
    );
    ensure!(q_tc <= view.tc_supply, Error::<T>::InsufficientTCtoRedeem);
    let value = add(q_ac_tc, q_ac_tp)?;
    let interest = Self::rate_for(view, tp, Direction::Redeem)?.mul_ceil(q_ac_tp);
    let fee = Self::quote_fee(op, FeeParams::<T>::get().redeem_tc_and_tp_fee, value)?;
    let payout = value
      .checked_sub(interest)
      .and_then(|v| v.checked_sub(fee.collateral_due()))
      .ok_or(Error::<T>::QacBelowMinimumRequired)?;
    ensure!(payout >= q_ac_min, Error::<T>::QacBelowMinimumRequired);
    let event = Event::TCandTPRedeemed {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tc,
      q_tp: q_tp_needed,
      q_ac: payout,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.collateral_out = value;
    plan.payout = payout;
    plan.interest = interest;
    plan.tc_burn = q_tc;
    plan.tp_burn = Some((tp, q_tp_needed));
    Ok(plan)
  }

  fn plan_swap_tc_for_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tc: Balance,
    q_tp_min: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    ensure!(q_tc <= view.tc_supply, Error::<T>::InsufficientTCtoRedeem);
    let tc_price = Self::positive_tc_price(view)?;
    let value = mul_fixed(q_tc, tc_price, Rounding::Down)?;
    let q_tp = mul_fixed(value, view.tokens[tp as usize].price, Rounding::Down)?;
    ensure!(q_tp >= q_tp_min, Error::<T>::QtpBelowMinimumRequired);
    ensure!(
      q_tp <= view.tp_available_to_mint(tp as usize)?,
      Error::<T>::InsufficientTPtoMint
    );
    let interest = Self::rate_for(view, tp, Direction::Mint)?.mul_ceil(value);
    let fee = Self::quote_fee(op, FeeParams::<T>::get().swap_tc_for_tp_fee, value)?;
    ensure!(
      add(interest, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TCSwappedForTP {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tc,
      q_tp,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.interest = interest;
    plan.tc_burn = q_tc;
    plan.tp_mint = Some((tp, q_tp));
    Ok(plan)
  }

  fn plan_swap_tp_for_tc(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp: TpIndex,
    q_tp: Balance,
    q_tc_min: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    ensure!(
      q_tp <= view.tokens[tp as usize].supply,
      Error::<T>::InsufficientTPtoRedeem
    );
    // Minting at the pre-swap price keeps the collateral token price unchanged.
    let tc_price = Self::positive_tc_price(view)?;
    let value = div_fixed(q_tp, view.tokens[tp as usize].price, Rounding::Down)?;
    let q_tc = div_fixed(value, tc_price, Rounding::Down)?;
    ensure!(q_tc >= q_tc_min, Error::<T>::QtcBelowMinimumRequired);
    let interest = Self::rate_for(view, tp, Direction::Redeem)?.mul_ceil(value);
    let fee = Self::quote_fee(op, FeeParams::<T>::get().swap_tp_for_tc_fee, value)?;
    ensure!(
      add(interest, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TPSwappedForTC {
      oper_id,
      tp,
      recipient: op.recipient.clone(),
      q_tp,
      q_tc,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.interest = interest;
    plan.tc_mint = q_tc;
    plan.tp_burn = Some((tp, q_tp));
    Ok(plan)
  }

  #[allow(clippy::too_many_arguments)]
  fn plan_swap_tp_for_tp(
    oper_id: OperId,
    op: &OperationOf<T>,
    view: &LedgerView,
    tp_from: TpIndex,
    tp_to: TpIndex,
    q_tp: Balance,
    q_tp_min: Balance,
    q_ac_max: Balance,
  ) -> Result<Plan<T>, DispatchError> {
    ensure!(tp_from != tp_to, Error::<T>::SameTokenSwap);
    ensure!(
      q_tp <= view.tokens[tp_from as usize].supply,
      Error::<T>::InsufficientTPtoRedeem
    );
    let value = div_fixed(q_tp, view.tokens[tp_from as usize].price, Rounding::Down)?;
    let q_tp_to = mul_fixed(value, view.tokens[tp_to as usize].price, Rounding::Down)?;
    ensure!(q_tp_to >= q_tp_min, Error::<T>::QtpBelowMinimumRequired);
    let mut burned = view.clone();
    burned.tokens[tp_from as usize].supply =
      burned.tokens[tp_from as usize].supply.saturating_sub(q_tp);
    ensure!(
      q_tp_to <= burned.tp_available_to_mint(tp_to as usize)?,
      Error::<T>::InsufficientTPtoMint
    );
    let interest = Self::rate_for(view, tp_to, Direction::Mint)?.mul_ceil(value);
    let fee = Self::quote_fee(op, FeeParams::<T>::get().swap_tp_for_tp_fee, value)?;
    ensure!(
      add(interest, fee.collateral_due())? <= q_ac_max,
      Error::<T>::InsufficientQacSent
    );
    let event = Event::TPSwappedForTP {
      oper_id,
      tp_from,
      tp_to,
      recipient: op.recipient.clone(),
      q_tp_from: q_tp,
      q_tp_to,
      fee: fee.fee,
      interest,
    };
    let mut plan = Plan::new(fee, event);
    plan.interest = interest;
    plan.tp_burn = Some((tp_from, q_tp));
    plan.tp_mint = Some((tp_to, q_tp_to));
    Ok(plan)
  }

  fn pegged_token(tp: TpIndex) -> Result<PeggedTokenOf<T>, DispatchError> {
    PeggedTokens::<T>::get()
      .get(tp as usize)
      .copied()
      .ok_or_else(|| Error::<T>::InvalidPeggedToken.into())
  }

  /// Applies a validated plan: bucket accounting, token supply, asset movements and fees.
  ///
  /// Escrow not consumed by the plan is released to the recipient.
  pub(crate) fn commit_plan(op: &OperationOf<T>, plan: Plan<T>) -> DispatchResult {
    let custody = Self::account_id();
    let collateral = T::CollateralAssetId::get();
    let collateral_token = T::CollateralTokenId::get();
    let escrow = op.escrow;

    let change = escrow
      .collateral
      .checked_add(plan.collateral_out)
      .and_then(|v| v.checked_sub(plan.collateral_in))
      .and_then(|v| v.checked_sub(plan.payout))
      .and_then(|v| v.checked_sub(plan.interest))
      .and_then(|v| v.checked_sub(plan.fee.collateral_due()))
      .ok_or(Error::<T>::InsufficientQacSent)?;
    let interest = i128::try_from(plan.interest).map_err(|_| ArithmeticError::Overflow)?;

    Bucket::<T>::try_mutate(|bucket| -> DispatchResult {
      bucket.pending_escrowed_collateral = bucket
        .pending_escrowed_collateral
        .checked_sub(escrow.collateral)
        .ok_or(ArithmeticError::Underflow)?;
      bucket.total_collateral = bucket
        .total_collateral
        .checked_add(plan.collateral_in)
        .and_then(|v| v.checked_sub(plan.collateral_out))
        .ok_or(ArithmeticError::Underflow)?;
      bucket.accumulated_gain_loss = bucket
        .accumulated_gain_loss
        .checked_add(interest)
        .ok_or(ArithmeticError::Overflow)?;
      bucket.tc_supply = bucket
        .tc_supply
        .checked_add(plan.tc_mint)
        .and_then(|v| v.checked_sub(plan.tc_burn))
        .ok_or(ArithmeticError::Underflow)?;
      Ok(())
    })?;
    PeggedTokens::<T>::try_mutate(|tokens| -> DispatchResult {
      if let Some((tp, amount)) = plan.tp_burn {
        let token = tokens
          .get_mut(tp as usize)
          .ok_or(Error::<T>::InvalidPeggedToken)?;
        token.total_supply = token
          .total_supply
          .checked_sub(amount)
          .ok_or(ArithmeticError::Underflow)?;
      }
      if let Some((tp, amount)) = plan.tp_mint {
        let token = tokens
          .get_mut(tp as usize)
          .ok_or(Error::<T>::InvalidPeggedToken)?;
        token.total_supply = token
          .total_supply
          .checked_add(amount)
          .ok_or(ArithmeticError::Overflow)?;
      }
      Ok(())
    })?;

    Self::burn_asset(collateral_token, &custody, plan.tc_burn)?;
    Self::mint_asset(collateral_token, &op.recipient, plan.tc_mint)?;
    let mut pegged_burned = 0;
    if let Some((tp, amount)) = plan.tp_burn {
      Self::burn_asset(Self::pegged_asset(tp)?, &custody, amount)?;
      pegged_burned = amount;
    }
    if let Some((tp, amount)) = plan.tp_mint {
      Self::mint_asset(Self::pegged_asset(tp)?, &op.recipient, amount)?;
    }
    Self::transfer_asset(collateral, &custody, &op.recipient, plan.payout)?;
    Self::pay_fees(op, &plan.fee)?;

    Self::transfer_asset(collateral, &custody, &op.recipient, change)?;
    let tc_left = escrow
      .collateral_token
      .checked_sub(plan.tc_burn)
      .ok_or(ArithmeticError::Underflow)?;
    Self::transfer_asset(collateral_token, &custody, &op.recipient, tc_left)?;
    if let Some((tp, amount)) = escrow.pegged {
      let left = amount
        .checked_sub(pegged_burned)
        .ok_or(ArithmeticError::Underflow)?;
      Self::transfer_asset(Self::pegged_asset(tp)?, &custody, &op.recipient, left)?;
    }

    let locked = Self::ledger_view()?.total_locked()?;
    Bucket::<T>::mutate(|bucket| bucket.locked_collateral = locked);
    Self::deposit_event(plan.event);
    Ok(())
  }
}
