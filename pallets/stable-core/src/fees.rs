//! Operation fees, vendor markups and the alternate fee token.

use crate::ledger::mul_fixed;
use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_support::traits::{
  fungibles::Inspect,
  tokens::{Fortitude, Preservation},
};
use polkadot_sdk::sp_arithmetic::Rounding;
use polkadot_sdk::sp_runtime::Permill;

/// Fee settled in the fee token instead of collateral.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct TokenFee {
  pub asset_id: u32,
  pub fee: Balance,
  pub markup: Balance,
  pub protocol_markup: Balance,
}

/// Fees owed by one operation, quoted in collateral.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FeeCharge<AccountId> {
  pub fee: Balance,
  pub markup: Balance,
  /// Part of `markup` kept by the protocol.
  pub protocol_markup: Balance,
  pub vendor: Option<AccountId>,
  pub token: Option<TokenFee>,
}

impl<AccountId> FeeCharge<AccountId> {
  /// Collateral withheld from the operation to pay fees and markup.
  pub fn collateral_due(&self) -> Balance {
    match self.token {
      Some(_) => 0,
      None => self.fee.saturating_add(self.markup),
    }
  }
}

impl<T: Config> Pallet<T> {
  /// Quotes `rate` on `q_ac` plus the operation vendor's markup.
  ///
  /// The fee token is used when the operation asked for it, its price is valid and the owner
  /// holds enough of it; otherwise the charge falls back to collateral.
  pub(crate) fn quote_fee(
    op: &OperationOf<T>,
    rate: Permill,
    q_ac: Balance,
  ) -> Result<FeeCharge<T::AccountId>, DispatchError> {
    let params = FeeParams::<T>::get();
    let fee = rate.mul_floor(q_ac);
    let vendor_rate = op
      .vendor
      .as_ref()
      .and_then(|vendor| VendorMarkups::<T>::get(vendor))
      .unwrap_or_default();
    let markup = vendor_rate.mul_floor(q_ac);
    let protocol_markup = params.vendor_protocol_share.mul_floor(markup);
    let mut charge = FeeCharge {
      fee,
      markup,
      protocol_markup,
      vendor: op.vendor.clone().filter(|_| markup > 0),
      token: None,
    };
    if op.pay_fee_in_token {
      charge.token = Self::quote_fee_token(op, &charge, params.fee_token_pct)?;
    }
    Ok(charge)
  }

  fn quote_fee_token(
    op: &OperationOf<T>,
    charge: &FeeCharge<T::AccountId>,
    fee_token_pct: Permill,
  ) -> Result<Option<TokenFee>, DispatchError> {
    let Some(config) = FeeToken::<T>::get() else {
      return Ok(None);
    };
    let Ok(price) = Self::valid_price(config.price_provider) else {
      log::debug!(target: LOG_TARGET, "fee token price unavailable, charging collateral");
      return Ok(None);
    };
    let fee = mul_fixed(fee_token_pct.mul_floor(charge.fee), price, Rounding::Up)?;
    let markup = mul_fixed(charge.markup, price, Rounding::Up)?;
    let protocol_markup = mul_fixed(charge.protocol_markup, price, Rounding::Up)?.min(markup);
    let spendable = T::Assets::reducible_balance(
      config.asset_id,
      &op.owner,
      Preservation::Expendable,
      Fortitude::Polite,
    );
    if spendable < fee.saturating_add(markup) {
      return Ok(None);
    }
    Ok(Some(TokenFee {
      asset_id: config.asset_id,
      fee,
      markup,
      protocol_markup,
    }))
  }

  /// Pays the protocol and vendor parts of `charge`. Collateral fees leave the custody
  /// account, fee token payments come straight from the owner.
  pub(crate) fn pay_fees(op: &OperationOf<T>, charge: &FeeCharge<T::AccountId>) -> DispatchResult {
    let fee_flow = T::FeeFlowAccount::get();
    let (asset_id, payer, fee, markup, protocol_markup) = match charge.token {
      Some(token) => (
        token.asset_id,
        op.owner.clone(),
        token.fee,
        token.markup,
        token.protocol_markup,
      ),
      None => (
        T::CollateralAssetId::get(),
        Self::account_id(),
        charge.fee,
        charge.markup,
        charge.protocol_markup,
      ),
    };
    let to_protocol = fee.saturating_add(protocol_markup);
    Self::transfer_asset(asset_id, &payer, &fee_flow, to_protocol)?;
    if let Some(vendor) = &charge.vendor {
      Self::transfer_asset(asset_id, &payer, vendor, markup.saturating_sub(protocol_markup))?;
    }
    Ok(())
  }
}
