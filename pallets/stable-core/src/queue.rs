//! Operation queue: escrow at registration, FIFO batch execution, failure isolation.

use crate::flux::{FluxCheck, FluxContribution};
use crate::ledger::{LedgerView, div_fixed, mul_fixed};
use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_support::{
  storage::{TransactionOutcome, with_storage_layer, with_transaction},
  traits::{
    PalletInfoAccess,
    fungible::{Inspect as NativeInspect, Mutate as NativeMutate},
    fungibles::{Inspect, Mutate},
    tokens::{Fortitude, Precision, Preservation},
  },
};
use polkadot_sdk::sp_arithmetic::{ArithmeticError, Rounding};
use polkadot_sdk::sp_runtime::{ModuleError, SaturatedConversion};

impl<T: Config> Pallet<T> {
  pub(crate) fn transfer_asset(
    asset_id: u32,
    from: &T::AccountId,
    to: &T::AccountId,
    amount: Balance,
  ) -> DispatchResult {
    if amount == 0 || from == to {
      return Ok(());
    }
    T::Assets::transfer(asset_id, from, to, amount, Preservation::Expendable)?;
    Ok(())
  }

  pub(crate) fn mint_asset(asset_id: u32, to: &T::AccountId, amount: Balance) -> DispatchResult {
    if amount == 0 {
      return Ok(());
    }
    T::Assets::mint_into(asset_id, to, amount)?;
    Ok(())
  }

  pub(crate) fn burn_asset(asset_id: u32, from: &T::AccountId, amount: Balance) -> DispatchResult {
    if amount == 0 {
      return Ok(());
    }
    T::Assets::burn_from(
      asset_id,
      from,
      amount,
      Preservation::Expendable,
      Precision::Exact,
      Fortitude::Force,
    )?;
    Ok(())
  }

  pub(crate) fn pegged_asset(tp: TpIndex) -> Result<u32, DispatchError> {
    PeggedTokens::<T>::get()
      .get(tp as usize)
      .map(|token| token.asset_id)
      .ok_or_else(|| Error::<T>::InvalidPeggedToken.into())
  }

  pub(crate) fn do_enqueue(
    owner: T::AccountId,
    action: Action,
    recipient: Option<T::AccountId>,
    vendor: Option<T::AccountId>,
    pay_fee_in_token: bool,
  ) -> Result<OperId, DispatchError> {
    ensure!(!Paused::<T>::get(), Error::<T>::Paused);
    ensure!(!Bucket::<T>::get().liquidated, Error::<T>::Liquidated);
    Self::validate_action(&action)?;
    if let Some(vendor) = &vendor {
      ensure!(
        VendorMarkups::<T>::contains_key(vendor),
        Error::<T>::VendorNotRegistered
      );
    }
    if pay_fee_in_token {
      ensure!(FeeToken::<T>::exists(), Error::<T>::FeeTokenNotSet);
    }

    let kind = action.kind();
    let escrow = action.escrow(ExecutionFees::<T>::get(kind));
    Self::ensure_can_escrow(&owner, &escrow)?;

    let oper_id = NextOperId::<T>::get();
    NextOperId::<T>::put(oper_id.checked_add(1).ok_or(ArithmeticError::Overflow)?);

    let custody = Self::account_id();
    Self::transfer_asset(T::CollateralAssetId::get(), &owner, &custody, escrow.collateral)?;
    Self::transfer_asset(
      T::CollateralTokenId::get(),
      &owner,
      &custody,
      escrow.collateral_token,
    )?;
    if let Some((tp, amount)) = escrow.pegged {
      Self::transfer_asset(Self::pegged_asset(tp)?, &owner, &custody, amount)?;
    }
    if escrow.execution_fee > 0 {
      T::Currency::transfer(
        &owner,
        &custody,
        escrow.execution_fee,
        Preservation::Preserve,
      )?;
    }
    Bucket::<T>::try_mutate(|bucket| -> DispatchResult {
      bucket.pending_escrowed_collateral = bucket
        .pending_escrowed_collateral
        .checked_add(escrow.collateral)
        .ok_or(ArithmeticError::Overflow)?;
      Ok(())
    })?;

    let flux = Self::ledger_view()
      .and_then(|view| Self::flux_contribution(&action, &view))
      .unwrap_or_else(|_| Self::fallback_flux(&action));

    Operations::<T>::insert(
      oper_id,
      Operation {
        recipient: recipient.unwrap_or_else(|| owner.clone()),
        owner: owner.clone(),
        vendor,
        action,
        escrow,
        flux,
        pay_fee_in_token,
        state: OperationState::Queued,
        queued_at: frame_system::Pallet::<T>::block_number(),
      },
    );

    log::debug!(target: LOG_TARGET, "queued operation {oper_id} ({kind:?})");
    Self::deposit_event(Event::OperationQueued {
      operator: owner,
      oper_id,
      kind,
    });
    Ok(oper_id)
  }

  fn validate_action(action: &Action) -> DispatchResult {
    let principal = match *action {
      Action::MintTC { q_tc, .. }
      | Action::RedeemTC { q_tc, .. }
      | Action::SwapTCforTP { q_tc, .. } => q_tc,
      Action::RedeemTCandTP { q_tc, q_tp, .. } => q_tc.min(q_tp),
      Action::MintTP { q_tp, .. }
      | Action::RedeemTP { q_tp, .. }
      | Action::MintTCandTP { q_tp, .. }
      | Action::SwapTPforTC { q_tp, .. }
      | Action::SwapTPforTP { q_tp, .. } => q_tp,
    };
    ensure!(principal > 0, Error::<T>::ZeroAmount);
    let registered = PeggedTokens::<T>::decode_len().unwrap_or_default();
    let (first, second) = action.pegged_tokens();
    for tp in [first, second].into_iter().flatten() {
      ensure!((tp as usize) < registered, Error::<T>::InvalidPeggedToken);
    }
    if let (Some(from), Some(to)) = (first, second) {
      ensure!(from != to, Error::<T>::SameTokenSwap);
    }
    Ok(())
  }

  fn ensure_can_escrow(owner: &T::AccountId, escrow: &Escrow) -> DispatchResult {
    let spendable = |asset_id: u32| {
      T::Assets::reducible_balance(
        asset_id,
        owner,
        Preservation::Expendable,
        Fortitude::Polite,
      )
    };
    ensure!(
      spendable(T::CollateralAssetId::get()) >= escrow.collateral
        && spendable(T::CollateralTokenId::get()) >= escrow.collateral_token,
      Error::<T>::InsufficientBalance
    );
    if let Some((tp, amount)) = escrow.pegged {
      ensure!(
        spendable(Self::pegged_asset(tp)?) >= amount,
        Error::<T>::InsufficientBalance
      );
    }
    ensure!(
      T::Currency::reducible_balance(owner, Preservation::Preserve, Fortitude::Polite)
        >= escrow.execution_fee,
      Error::<T>::InsufficientBalance
    );
    Ok(())
  }

  /// Collateral value moved by `action` at the prices in `view`.
  pub(crate) fn flux_contribution(
    action: &Action,
    view: &LedgerView,
  ) -> Result<FluxContribution, DispatchError> {
    let pegged_value = |tp: TpIndex, q_tp: Balance| -> Result<Balance, DispatchError> {
      let token = view
        .tokens
        .get(tp as usize)
        .ok_or(Error::<T>::InvalidPeggedToken)?;
      Ok(div_fixed(q_tp, token.price, Rounding::Down)?)
    };
    let tc_value = |q_tc: Balance| -> Result<Balance, DispatchError> {
      Ok(mul_fixed(q_tc, view.tc_price()?, Rounding::Down)?)
    };
    let contribution = match *action {
      Action::MintTC { q_tc, .. } => FluxContribution::inflow(tc_value(q_tc)?),
      Action::RedeemTC { q_tc, .. } => FluxContribution::outflow(tc_value(q_tc)?),
      Action::MintTP { tp, q_tp, .. } => FluxContribution::inflow(pegged_value(tp, q_tp)?),
      Action::RedeemTP { tp, q_tp, .. } => FluxContribution::outflow(pegged_value(tp, q_tp)?),
      Action::MintTCandTP { tp, q_tp, .. } => {
        let ctargema = view.target_coverage_ema(tp as usize)?;
        FluxContribution::inflow(mul_fixed(
          pegged_value(tp, q_tp)?,
          ctargema,
          Rounding::Down,
        )?)
      }
      Action::RedeemTCandTP { tp, q_tc, q_tp, .. } => FluxContribution::outflow(
        tc_value(q_tc)?.saturating_add(pegged_value(tp, q_tp)?),
      ),
      Action::SwapTCforTP { q_tc, .. } => FluxContribution::neutral(tc_value(q_tc)?),
      Action::SwapTPforTC { tp, q_tp, .. } => FluxContribution::neutral(pegged_value(tp, q_tp)?),
      Action::SwapTPforTP { tp_from, q_tp, .. } => {
        FluxContribution::neutral(pegged_value(tp_from, q_tp)?)
      }
    };
    Ok(contribution)
  }

  /// Estimate from the caller's own bounds when no price snapshot is available.
  fn fallback_flux(action: &Action) -> FluxContribution {
    match *action {
      Action::MintTC { q_ac_max, .. }
      | Action::MintTP { q_ac_max, .. }
      | Action::MintTCandTP { q_ac_max, .. } => FluxContribution::inflow(q_ac_max),
      Action::RedeemTC { q_ac_min, .. }
      | Action::RedeemTP { q_ac_min, .. }
      | Action::RedeemTCandTP { q_ac_min, .. } => FluxContribution::outflow(q_ac_min),
      Action::SwapTCforTP { .. } | Action::SwapTPforTC { .. } | Action::SwapTPforTP { .. } => {
        FluxContribution::neutral(0)
      }
    }
  }

  /// Processes queued operations in id order and returns how many reached a terminal state.
  pub(crate) fn do_execute(
    executor: T::AccountId,
    fee_recipient: T::AccountId,
  ) -> Result<u32, DispatchError> {
    let now = frame_system::Pallet::<T>::block_number();
    let params = FluxParams::<T>::get();
    let stored = FluxWindowState::<T>::get();
    let elapsed: u128 = now.saturating_sub(stored.last_block).saturated_into();
    let mut window = stored.decayed(elapsed, params.decay_span.saturated_into(), now);

    let end = NextOperId::<T>::get();
    let mut cursor = ExecutionCursor::<T>::get();
    let mut processed = 0u32;
    let mut fees_paid: Balance = 0;

    while cursor < end && processed < T::MaxOperationsPerBatch::get() {
      let Some(mut op) = Operations::<T>::get(cursor) else {
        cursor = cursor.saturating_add(1);
        continue;
      };
      if op.state != OperationState::Queued {
        cursor = cursor.saturating_add(1);
        continue;
      }

      let contribution = Self::ledger_view()
        .and_then(|view| Self::flux_contribution(&op.action, &view))
        .unwrap_or(op.flux);
      let outcome = match window.check(&contribution, &params) {
        FluxCheck::Throttled => {
          log::warn!(target: LOG_TARGET, "flux capacitor throttled batch at operation {cursor}");
          Self::deposit_event(Event::FluxCapacitorThrottled { oper_id: cursor });
          break;
        }
        FluxCheck::TooLarge => Err(Error::<T>::MaxFluxCapacitorOperationReached.into()),
        FluxCheck::Fits => Self::dispatch_operation(cursor, &op),
      };

      match outcome {
        Ok(()) => {
          window.record(&contribution);
          op.state = OperationState::Executed;
          log::debug!(target: LOG_TARGET, "executed operation {cursor}");
          Self::deposit_event(Event::OperationExecuted {
            executor: executor.clone(),
            oper_id: cursor,
          });
        }
        Err(error) => {
          Self::refund_escrow(cursor, &op);
          op.state = OperationState::Errored;
          Self::report_failure(cursor, error);
        }
      }
      fees_paid = fees_paid.saturating_add(op.escrow.execution_fee);
      Operations::<T>::insert(cursor, op);
      processed = processed.saturating_add(1);
      cursor = cursor.saturating_add(1);
    }

    ExecutionCursor::<T>::put(cursor);
    FluxWindowState::<T>::put(window);
    if fees_paid > 0 {
      Self::pay_execution_fees(&fee_recipient, fees_paid);
    }
    Self::deposit_event(Event::BatchExecuted {
      executor,
      processed,
      fees_paid,
    });

    if let Err(error) = Self::do_eval_liquidation() {
      log::debug!(target: LOG_TARGET, "post-batch liquidation check skipped: {error:?}");
    }
    Ok(processed)
  }

  /// Pays collected execution fees to `fee_recipient`, or to the fee flow account when the
  /// recipient cannot receive them.
  fn pay_execution_fees(fee_recipient: &T::AccountId, amount: Balance) {
    let custody = Self::account_id();
    let Err(error) = T::Currency::transfer(&custody, fee_recipient, amount, Preservation::Expendable)
    else {
      return;
    };
    log::warn!(
      target: LOG_TARGET,
      "execution fee payout failed ({error:?}), routing {amount} to the fee flow account"
    );
    if let Err(error) = T::Currency::transfer(
      &custody,
      &T::FeeFlowAccount::get(),
      amount,
      Preservation::Expendable,
    ) {
      log::error!(target: LOG_TARGET, "execution fees stay in custody: {error:?}");
    }
  }

  /// Plans and commits one operation atomically.
  fn dispatch_operation(oper_id: OperId, op: &OperationOf<T>) -> DispatchResult {
    with_transaction(|| {
      let res = Self::plan_operation(oper_id, op).and_then(|plan| Self::commit_plan(op, plan));
      if res.is_ok() {
        TransactionOutcome::Commit(res)
      } else {
        TransactionOutcome::Rollback(res)
      }
    })
  }

  /// Returns escrowed collateral and tokens to the owner. The execution fee is kept for the
  /// executor. Legs that cannot be paid out stay in custody as a claimable refund.
  fn refund_escrow(oper_id: OperId, op: &OperationOf<T>) {
    let left = Self::refund_legs(&op.owner, &op.escrow);
    if !left.is_empty() {
      log::error!(target: LOG_TARGET, "refund of operation {oper_id} deferred: {left:?}");
      PendingRefunds::<T>::insert(oper_id, left);
      Self::deposit_event(Event::RefundDeferred { oper_id });
    }
  }

  /// Pays a deferred refund to the operation owner. Fails when no leg could be paid.
  pub(crate) fn do_claim_refund(oper_id: OperId) -> DispatchResult {
    let escrow = PendingRefunds::<T>::get(oper_id).ok_or(Error::<T>::NoPendingRefund)?;
    let owner = Operations::<T>::get(oper_id)
      .map(|op| op.owner)
      .ok_or(Error::<T>::NoPendingRefund)?;
    let left = Self::refund_legs(&owner, &escrow);
    ensure!(left != escrow, Error::<T>::RefundStillBlocked);
    if left.is_empty() {
      PendingRefunds::<T>::remove(oper_id);
    } else {
      PendingRefunds::<T>::insert(oper_id, left);
    }
    Self::deposit_event(Event::RefundClaimed {
      oper_id,
      complete: left.is_empty(),
    });
    Ok(())
  }

  /// Moves each escrow leg back to `owner` in its own storage layer and returns the legs that
  /// failed.
  fn refund_legs(owner: &T::AccountId, escrow: &Escrow) -> Escrow {
    let custody = Self::account_id();
    let mut left = Escrow::default();

    let collateral = with_storage_layer(|| -> DispatchResult {
      Bucket::<T>::try_mutate(|bucket| -> DispatchResult {
        bucket.pending_escrowed_collateral = bucket
          .pending_escrowed_collateral
          .checked_sub(escrow.collateral)
          .ok_or(ArithmeticError::Underflow)?;
        Ok(())
      })?;
      Self::transfer_asset(
        T::CollateralAssetId::get(),
        &custody,
        owner,
        escrow.collateral,
      )
    });
    if collateral.is_err() {
      left.collateral = escrow.collateral;
    }

    let collateral_token = with_storage_layer(|| {
      Self::transfer_asset(
        T::CollateralTokenId::get(),
        &custody,
        owner,
        escrow.collateral_token,
      )
    });
    if collateral_token.is_err() {
      left.collateral_token = escrow.collateral_token;
    }

    if let Some((tp, amount)) = escrow.pegged {
      let pegged = with_storage_layer(|| {
        Self::transfer_asset(Self::pegged_asset(tp)?, &custody, owner, amount)
      });
      if pegged.is_err() {
        left.pegged = Some((tp, amount));
      }
    }
    left
  }

  /// Errors raised by this pallet are business failures; anything else is unexpected.
  fn report_failure(oper_id: OperId, error: DispatchError) {
    let recognized = matches!(
      error,
      DispatchError::Module(ModuleError { index, .. })
        if index as usize == <Pallet<T> as PalletInfoAccess>::index()
    );
    if recognized {
      log::debug!(target: LOG_TARGET, "operation {oper_id} failed: {error:?}");
      Self::deposit_event(Event::OperationError { oper_id, error });
    } else {
      log::warn!(target: LOG_TARGET, "operation {oper_id} failed unexpectedly: {error:?}");
      Self::deposit_event(Event::UnhandledError {
        oper_id,
        reason: error,
      });
    }
  }
}
