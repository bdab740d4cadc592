//! Read-only bucket accounting over a price snapshot.
//!
//! Prices are `pACtp`: pegged token units per collateral unit, so a pegged supply locks
//! `supply / price` collateral. Handlers build a [`LedgerView`] once, validate a plan against it
//! (and against a mutated copy for post-operation checks), then commit.

use alloc::vec::Vec;

use polkadot_sdk::sp_arithmetic::{
  ArithmeticError, FixedPointNumber, FixedU128, Permill, Rounding,
  helpers_128bit::multiply_by_rational_with_rounding,
  traits::{Bounded, CheckedDiv, CheckedMul, One},
};

use primitives::Balance;

pub type ArithResult<T> = Result<T, ArithmeticError>;

/// `a * b / c`.
pub fn mul_div(a: Balance, b: Balance, c: Balance, rounding: Rounding) -> ArithResult<Balance> {
  if c == 0 {
    return Err(ArithmeticError::DivisionByZero);
  }
  multiply_by_rational_with_rounding(a, b, c, rounding).ok_or(ArithmeticError::Overflow)
}

/// `amount * ratio`.
pub fn mul_fixed(amount: Balance, ratio: FixedU128, rounding: Rounding) -> ArithResult<Balance> {
  mul_div(amount, ratio.into_inner(), FixedU128::accuracy(), rounding)
}

/// `amount / ratio`.
pub fn div_fixed(amount: Balance, ratio: FixedU128, rounding: Rounding) -> ArithResult<Balance> {
  mul_div(amount, FixedU128::accuracy(), ratio.into_inner(), rounding)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TokenView {
  pub price: FixedU128,
  pub ema: FixedU128,
  pub supply: Balance,
  pub target_coverage: FixedU128,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerView {
  /// `total_collateral + accumulated_gain_loss`, clamped at zero.
  pub available: Balance,
  pub tc_supply: Balance,
  pub tokens: Vec<TokenView>,
}

impl LedgerView {
  fn token(&self, tp: usize) -> ArithResult<&TokenView> {
    // Callers index by registered pegged tokens only.
    self.tokens.get(tp).ok_or(ArithmeticError::Overflow)
  }

  /// Collateral locked by pegged token `tp`.
  pub fn locked(&self, tp: usize) -> ArithResult<Balance> {
    let token = self.token(tp)?;
    div_fixed(token.supply, token.price, Rounding::Up)
  }

  pub fn total_locked(&self) -> ArithResult<Balance> {
    (0..self.tokens.len()).try_fold(0 as Balance, |acc, tp| {
      acc.checked_add(self.locked(tp)?).ok_or(ArithmeticError::Overflow)
    })
  }

  /// Target coverage raised by the spot price falling below its EMA.
  pub fn target_coverage_ema(&self, tp: usize) -> ArithResult<FixedU128> {
    let token = self.token(tp)?;
    if token.ema <= token.price {
      return Ok(token.target_coverage);
    }
    let adjusted = token
      .target_coverage
      .checked_mul(&token.ema)
      .and_then(|v| v.checked_div(&token.price))
      .ok_or(ArithmeticError::Overflow)?;
    Ok(adjusted.max(token.target_coverage))
  }

  /// Collateral needed to keep every pegged token at its adjusted target coverage.
  pub fn target_locked(&self) -> ArithResult<Balance> {
    (0..self.tokens.len()).try_fold(0 as Balance, |acc, tp| {
      let needed = mul_fixed(self.locked(tp)?, self.target_coverage_ema(tp)?, Rounding::Up)?;
      acc.checked_add(needed).ok_or(ArithmeticError::Overflow)
    })
  }

  /// Locked-weighted average of the adjusted target coverages.
  pub fn global_target_coverage(&self) -> ArithResult<FixedU128> {
    let locked = self.total_locked()?;
    if locked == 0 {
      return Ok(FixedU128::one());
    }
    FixedU128::checked_from_rational(self.target_locked()?, locked).ok_or(ArithmeticError::Overflow)
  }

  /// `available / locked`; `FixedU128::max_value()` with no pegged exposure.
  pub fn coverage(&self) -> ArithResult<FixedU128> {
    let locked = self.total_locked()?;
    if locked == 0 {
      return Ok(FixedU128::max_value());
    }
    FixedU128::checked_from_rational(self.available, locked).ok_or(ArithmeticError::Overflow)
  }

  /// Collateral per collateral token. One before any issuance, zero when under-collateralized.
  pub fn tc_price(&self) -> ArithResult<FixedU128> {
    if self.tc_supply == 0 {
      return Ok(FixedU128::one());
    }
    let locked = self.total_locked()?;
    match self.available.checked_sub(locked) {
      Some(equity) if equity > 0 => FixedU128::checked_from_rational(equity, self.tc_supply)
        .ok_or(ArithmeticError::Overflow),
      _ => Ok(FixedU128::from_inner(0)),
    }
  }

  fn surplus(&self) -> ArithResult<Balance> {
    Ok(self.available.saturating_sub(self.target_locked()?))
  }

  /// Pegged tokens `tp` that can be minted while staying at adjusted target coverage.
  pub fn tp_available_to_mint(&self, tp: usize) -> ArithResult<Balance> {
    let token = self.token(tp)?;
    let ctargema = self.target_coverage_ema(tp)?;
    let headroom = ctargema.into_inner().saturating_sub(FixedU128::accuracy());
    mul_div(
      self.surplus()?,
      token.price.into_inner(),
      headroom,
      Rounding::Down,
    )
  }

  /// Collateral tokens redeemable without dropping below adjusted target coverage.
  pub fn tc_available_to_redeem(&self) -> ArithResult<Balance> {
    let price = self.tc_price()?;
    if price.into_inner() == 0 {
      return Ok(0);
    }
    div_fixed(self.surplus()?, price, Rounding::Down)
  }

  /// Minted share of the token's capacity, `supply / (supply + available to mint)`.
  pub fn abundance(&self, tp: usize) -> ArithResult<Permill> {
    let supply = self.token(tp)?.supply;
    let capacity = supply.saturating_add(self.tp_available_to_mint(tp)?);
    if capacity == 0 {
      return Ok(Permill::from_percent(100));
    }
    Ok(Permill::from_rational(supply, capacity))
  }
}
