#![cfg_attr(rustfmt, rustfmt_skip)]
#![allow(unused_parens)]
#![allow(unused_imports)]
#![allow(missing_docs)]

use polkadot_sdk::frame_support::{traits::Get, weights::{Weight, constants::RocksDbWeight}};
use core::marker::PhantomData;

pub trait WeightInfo {
  fn enqueue() -> Weight;
  fn execute(n: u32) -> Weight;
  fn eval_liquidation(t: u32) -> Weight;
  fn liq_redeem_tp() -> Weight;
  fn exec_settlement(t: u32) -> Weight;
  fn update_emas(t: u32) -> Weight;
  fn add_pegged_token() -> Weight;
  fn edit_pegged_token() -> Weight;
  fn set_protocol_params() -> Weight;
  fn set_fee_params() -> Weight;
  fn set_flux_params() -> Weight;
  fn set_fee_token() -> Weight;
  fn set_execution_fee() -> Weight;
  fn set_liquidation_enabled() -> Weight;
  fn set_paused() -> Weight;
  fn set_vendor_markup() -> Weight;
  fn claim_refund() -> Weight;
}

pub struct SubstrateWeight<T>(PhantomData<T>);
impl<T: polkadot_sdk::frame_system::Config> WeightInfo for SubstrateWeight<T> {
  /// Escrow of up to three assets plus the execution fee.
  fn enqueue() -> Weight {
    Weight::from_parts(90_000_000, 8000)
      .saturating_add(T::DbWeight::get().reads(12))
      .saturating_add(T::DbWeight::get().writes(10))
  }
  /// Per operation: ledger snapshot, plan, up to eight asset movements.
  fn execute(n: u32) -> Weight {
    Weight::from_parts(40_000_000, 4000)
      .saturating_add(T::DbWeight::get().reads(6))
      .saturating_add(T::DbWeight::get().writes(4))
      .saturating_add(Weight::from_parts(250_000_000, 12000).saturating_mul(n.into()))
      .saturating_add(T::DbWeight::get().reads(24_u64.saturating_mul(n.into())))
      .saturating_add(T::DbWeight::get().writes(18_u64.saturating_mul(n.into())))
  }
  fn eval_liquidation(t: u32) -> Weight {
    Weight::from_parts(30_000_000, 3000)
      .saturating_add(T::DbWeight::get().reads(3))
      .saturating_add(T::DbWeight::get().writes(1))
      .saturating_add(Weight::from_parts(8_000_000, 600).saturating_mul(t.into()))
      .saturating_add(T::DbWeight::get().writes((1_u64).saturating_mul(t.into())))
  }
  fn liq_redeem_tp() -> Weight {
    Weight::from_parts(70_000_000, 6000)
      .saturating_add(T::DbWeight::get().reads(7))
      .saturating_add(T::DbWeight::get().writes(6))
  }
  fn exec_settlement(t: u32) -> Weight {
    Weight::from_parts(80_000_000, 6000)
      .saturating_add(T::DbWeight::get().reads(8))
      .saturating_add(T::DbWeight::get().writes(7))
      .saturating_add(Weight::from_parts(12_000_000, 600).saturating_mul(t.into()))
  }
  fn update_emas(t: u32) -> Weight {
    Weight::from_parts(15_000_000, 2000)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
      .saturating_add(Weight::from_parts(6_000_000, 600).saturating_mul(t.into()))
  }
  fn add_pegged_token() -> Weight {
    Weight::from_parts(30_000_000, 3000)
      .saturating_add(T::DbWeight::get().reads(3))
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn edit_pegged_token() -> Weight {
    Weight::from_parts(25_000_000, 3000)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_protocol_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_fee_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_flux_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_fee_token() -> Weight {
    Weight::from_parts(15_000_000, 2000)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_execution_fee() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_liquidation_enabled() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().reads(1))
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_paused() -> Weight {
    Weight::from_parts(10_000_000, 1000)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  fn set_vendor_markup() -> Weight {
    Weight::from_parts(12_000_000, 1500)
      .saturating_add(T::DbWeight::get().writes(1))
  }
  /// Up to three asset movements back to the owner.
  fn claim_refund() -> Weight {
    Weight::from_parts(60_000_000, 6000)
      .saturating_add(T::DbWeight::get().reads(8))
      .saturating_add(T::DbWeight::get().writes(7))
  }
}

impl WeightInfo for () {
  fn enqueue() -> Weight {
    Weight::from_parts(90_000_000, 8000)
  }
  fn execute(n: u32) -> Weight {
    Weight::from_parts(40_000_000, 4000)
      .saturating_add(Weight::from_parts(250_000_000, 12000).saturating_mul(n.into()))
  }
  fn eval_liquidation(t: u32) -> Weight {
    Weight::from_parts(30_000_000, 3000)
      .saturating_add(Weight::from_parts(8_000_000, 600).saturating_mul(t.into()))
  }
  fn liq_redeem_tp() -> Weight {
    Weight::from_parts(70_000_000, 6000)
  }
  fn exec_settlement(t: u32) -> Weight {
    Weight::from_parts(80_000_000, 6000)
      .saturating_add(Weight::from_parts(12_000_000, 600).saturating_mul(t.into()))
  }
  fn update_emas(t: u32) -> Weight {
    Weight::from_parts(15_000_000, 2000)
      .saturating_add(Weight::from_parts(6_000_000, 600).saturating_mul(t.into()))
  }
  fn add_pegged_token() -> Weight {
    Weight::from_parts(30_000_000, 3000)
  }
  fn edit_pegged_token() -> Weight {
    Weight::from_parts(25_000_000, 3000)
  }
  fn set_protocol_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_fee_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_flux_params() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_fee_token() -> Weight {
    Weight::from_parts(15_000_000, 2000)
  }
  fn set_execution_fee() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_liquidation_enabled() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_paused() -> Weight {
    Weight::from_parts(10_000_000, 1000)
  }
  fn set_vendor_markup() -> Weight {
    Weight::from_parts(12_000_000, 1500)
  }
  fn claim_refund() -> Weight {
    Weight::from_parts(60_000_000, 6000)
  }
}
