//! Flux capacitor: a decaying window over recently executed volume.
//!
//! Both accumulators decay linearly to zero over `decay_span` blocks. A batch stops before the
//! first operation whose contribution would push either accumulator over its ceiling.

use polkadot_sdk::frame_support::pallet_prelude::*;
use polkadot_sdk::sp_arithmetic::{Rounding, helpers_128bit::multiply_by_rational_with_rounding};

use primitives::{Balance, params};

/// Collateral-denominated size of one operation.
///
/// `net` is positive for inflows (mints) and negative for outflows (redemptions).
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
pub struct FluxContribution {
  pub absolute: Balance,
  pub net: i128,
}

impl FluxContribution {
  pub fn inflow(amount: Balance) -> Self {
    Self {
      absolute: amount,
      net: i128::try_from(amount).unwrap_or(i128::MAX),
    }
  }

  pub fn outflow(amount: Balance) -> Self {
    Self {
      absolute: amount,
      net: i128::try_from(amount).map(|n| -n).unwrap_or(i128::MIN + 1),
    }
  }

  /// Moves value between buckets without changing total collateral.
  pub fn neutral(amount: Balance) -> Self {
    Self {
      absolute: amount,
      net: 0,
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
pub struct FluxParameters<BlockNumber> {
  pub max_absolute_op: Balance,
  pub max_op_diff: Balance,
  pub decay_span: BlockNumber,
}

impl<BlockNumber: From<u32>> Default for FluxParameters<BlockNumber> {
  fn default() -> Self {
    Self {
      max_absolute_op: params::FLUX_MAX_ABSOLUTE_OP,
      max_op_diff: params::FLUX_MAX_OP_DIFF,
      decay_span: params::FLUX_DECAY_SPAN.into(),
    }
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
pub struct FluxWindow<BlockNumber> {
  pub absolute: Balance,
  pub net: i128,
  pub last_block: BlockNumber,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FluxCheck {
  Fits,
  /// Would overflow the window now; fits once the window decays.
  Throttled,
  /// Larger than a ceiling on its own; can never fit.
  TooLarge,
}

impl<BlockNumber: Copy> FluxWindow<BlockNumber> {
  /// Window as seen `elapsed` blocks after `last_block`, restamped at `now`.
  pub fn decayed(&self, elapsed: u128, decay_span: u128, now: BlockNumber) -> Self {
    let (absolute, net) = if elapsed >= decay_span {
      (0, 0)
    } else {
      let remaining = decay_span - elapsed;
      let absolute =
        multiply_by_rational_with_rounding(self.absolute, remaining, decay_span, Rounding::Down)
          .unwrap_or(0);
      let magnitude = multiply_by_rational_with_rounding(
        self.net.unsigned_abs(),
        remaining,
        decay_span,
        Rounding::Down,
      )
      .and_then(|m| i128::try_from(m).ok())
      .unwrap_or(0);
      (absolute, if self.net < 0 { -magnitude } else { magnitude })
    };
    Self {
      absolute,
      net,
      last_block: now,
    }
  }

  pub fn check(
    &self,
    contribution: &FluxContribution,
    params: &FluxParameters<BlockNumber>,
  ) -> FluxCheck {
    if contribution.absolute > params.max_absolute_op
      || contribution.net.unsigned_abs() > params.max_op_diff
    {
      return FluxCheck::TooLarge;
    }
    let absolute = self.absolute.saturating_add(contribution.absolute);
    let net = self.net.saturating_add(contribution.net);
    if absolute > params.max_absolute_op || net.unsigned_abs() > params.max_op_diff {
      FluxCheck::Throttled
    } else {
      FluxCheck::Fits
    }
  }

  pub fn record(&mut self, contribution: &FluxContribution) {
    self.absolute = self.absolute.saturating_add(contribution.absolute);
    self.net = self.net.saturating_add(contribution.net);
  }
}
