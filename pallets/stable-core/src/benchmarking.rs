#![cfg(feature = "runtime-benchmarks")]

use crate::flux::FluxParameters;
use crate::interest::InterestCurve;
use crate::*;
use frame::prelude::*;
use polkadot_sdk::frame_benchmarking::v2::*;
use polkadot_sdk::frame_support::traits::{
  fungible::Mutate as NativeMutate,
  fungibles::{Inspect, Mutate},
};
use polkadot_sdk::frame_system::RawOrigin;
use polkadot_sdk::sp_runtime::{FixedPointNumber, FixedU128, Permill};
use primitives::params::PRECISION;

#[benchmarks]
mod benches {
  use super::*;

  const FIRST_BENCH_ASSET: u32 = 1_000;

  fn units(n: u128) -> Balance {
    n.saturating_mul(PRECISION)
  }

  fn admin<T: Config>() -> Result<T::RuntimeOrigin, BenchmarkError> {
    T::AdminOrigin::try_successful_origin().map_err(|_| BenchmarkError::Weightless)
  }

  fn token_config<T: Config>(asset_id: u32, provider: PriceProviderId) -> PeggedTokenConfig<BlockNumberFor<T>> {
    PeggedTokenConfig {
      asset_id,
      price_provider: provider,
      target_coverage: FixedU128::saturating_from_integer(4u32),
      ema_smoothing: Permill::from_percent(50),
      ema_interval: 10u32.into(),
      interest: InterestCurve {
        tils: Permill::from_percent(1),
        ti_min: Permill::from_percent(0),
        ti_max: Permill::from_percent(5),
        abeq: Permill::from_percent(50),
        fac_min: FixedU128::from_inner(0),
        fac_max: FixedU128::saturating_from_integer(2u32),
      },
      mint_fee: Permill::from_percent(1),
      redeem_fee: Permill::from_percent(1),
    }
  }

  /// Registers `count` pegged tokens priced at 100 per collateral unit.
  fn setup_tokens<T: Config>(count: u32) -> Result<(), BenchmarkError> {
    for tp in 0..count {
      let asset_id = FIRST_BENCH_ASSET.saturating_add(tp);
      T::BenchmarkHelper::create_asset(asset_id)?;
      T::BenchmarkHelper::set_price(tp, FixedU128::saturating_from_integer(100u32));
      Pallet::<T>::add_pegged_token(admin::<T>()?, token_config::<T>(asset_id, tp))?;
    }
    Ok(())
  }

  fn funded<T: Config>(name: &'static str) -> Result<T::AccountId, BenchmarkError> {
    let who: T::AccountId = account(name, 0, 0);
    T::Currency::set_balance(&who, units(1_000));
    T::Assets::mint_into(T::CollateralAssetId::get(), &who, units(1_000_000))?;
    Ok(who)
  }

  fn queue_mint_tc<T: Config>(
    who: &T::AccountId,
    count: u32,
    q_tc: Balance,
  ) -> Result<(), BenchmarkError> {
    for _ in 0..count {
      Pallet::<T>::do_enqueue(
        who.clone(),
        Action::MintTC {
          q_tc,
          q_ac_max: q_tc.saturating_add(q_tc / 10),
        },
        None,
        None,
        false,
      )?;
    }
    Ok(())
  }

  #[benchmark]
  fn enqueue() -> Result<(), BenchmarkError> {
    setup_tokens::<T>(1)?;
    let caller = funded::<T>("caller")?;

    #[extrinsic_call]
    _(
      RawOrigin::Signed(caller),
      Action::MintTP {
        tp: 0,
        q_tp: units(100),
        q_ac_max: units(2),
      },
      None,
      None,
      false,
    );

    assert_eq!(NextOperId::<T>::get(), 1);
    Ok(())
  }

  #[benchmark]
  fn execute(n: Linear<1, { T::MaxOperationsPerBatch::get() }>) -> Result<(), BenchmarkError> {
    let caller = funded::<T>("caller")?;
    queue_mint_tc::<T>(&caller, n, units(10))?;
    let origin = T::ExecutorOrigin::try_successful_origin().map_err(|_| BenchmarkError::Weightless)?;
    let executor =
      T::ExecutorOrigin::ensure_origin(origin.clone()).map_err(|_| BenchmarkError::Weightless)?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, executor);

    assert_eq!(ExecutionCursor::<T>::get(), n as OperId);
    Ok(())
  }

  #[benchmark]
  fn eval_liquidation(t: Linear<1, { T::MaxPeggedTokens::get() }>) -> Result<(), BenchmarkError> {
    setup_tokens::<T>(t)?;
    let caller = funded::<T>("caller")?;
    queue_mint_tc::<T>(&caller, 1, units(1_000))?;
    for tp in 0..t {
      Pallet::<T>::do_enqueue(
        caller.clone(),
        Action::MintTP {
          tp,
          q_tp: units(100),
          q_ac_max: units(2),
        },
        None,
        None,
        false,
      )?;
    }
    Pallet::<T>::do_execute(caller.clone(), caller.clone())?;
    // Collateral collapses against every peg.
    for tp in 0..t {
      T::BenchmarkHelper::set_price(tp, FixedU128::saturating_from_rational(1u32, 100u32));
    }

    #[extrinsic_call]
    _(RawOrigin::Signed(caller));

    assert!(Bucket::<T>::get().liquidated);
    Ok(())
  }

  #[benchmark]
  fn liq_redeem_tp() -> Result<(), BenchmarkError> {
    setup_tokens::<T>(1)?;
    let caller = funded::<T>("caller")?;
    let asset_id = FIRST_BENCH_ASSET;
    T::Assets::mint_into(asset_id, &caller, units(100))?;
    T::Assets::mint_into(T::CollateralAssetId::get(), &Pallet::<T>::account_id(), units(10))?;
    PeggedTokens::<T>::mutate(|tokens| {
      if let Some(token) = tokens.get_mut(0) {
        token.total_supply = units(100);
      }
    });
    Bucket::<T>::mutate(|bucket| {
      bucket.total_collateral = units(10);
      bucket.liquidated = true;
    });
    LiquidationPrices::<T>::insert(0, FixedU128::saturating_from_integer(100u32));

    #[extrinsic_call]
    _(RawOrigin::Signed(caller.clone()), 0, None);

    assert_eq!(T::Assets::balance(asset_id, &caller), 0);
    Ok(())
  }

  #[benchmark]
  fn exec_settlement(t: Linear<1, { T::MaxPeggedTokens::get() }>) -> Result<(), BenchmarkError> {
    setup_tokens::<T>(t)?;
    let caller = funded::<T>("caller")?;
    let next = NextSettlementBlock::<T>::get();
    frame_system::Pallet::<T>::set_block_number(next);

    #[extrinsic_call]
    _(RawOrigin::Signed(caller));

    assert!(NextSettlementBlock::<T>::get() > next);
    Ok(())
  }

  #[benchmark]
  fn update_emas(t: Linear<1, { T::MaxPeggedTokens::get() }>) -> Result<(), BenchmarkError> {
    setup_tokens::<T>(t)?;
    let caller = funded::<T>("caller")?;
    let due = Pallet::<T>::next_ema_calculation(0).ok_or(BenchmarkError::Weightless)?;
    frame_system::Pallet::<T>::set_block_number(due);

    #[extrinsic_call]
    _(RawOrigin::Signed(caller));

    assert_eq!(Pallet::<T>::next_ema_calculation(0), Some(due.saturating_add(10u32.into())));
    Ok(())
  }

  #[benchmark]
  fn add_pegged_token() -> Result<(), BenchmarkError> {
    setup_tokens::<T>(T::MaxPeggedTokens::get().saturating_sub(1))?;
    let asset_id = FIRST_BENCH_ASSET.saturating_add(T::MaxPeggedTokens::get());
    T::BenchmarkHelper::create_asset(asset_id)?;
    let provider = T::MaxPeggedTokens::get();
    T::BenchmarkHelper::set_price(provider, FixedU128::saturating_from_integer(100u32));
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, token_config::<T>(asset_id, provider));

    assert_eq!(PeggedTokens::<T>::decode_len(), Some(T::MaxPeggedTokens::get() as usize));
    Ok(())
  }

  #[benchmark]
  fn edit_pegged_token() -> Result<(), BenchmarkError> {
    setup_tokens::<T>(1)?;
    let mut config = token_config::<T>(FIRST_BENCH_ASSET, 0);
    config.mint_fee = Permill::from_percent(2);
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, 0, config);

    assert_eq!(PeggedTokens::<T>::get()[0].mint_fee, Permill::from_percent(2));
    Ok(())
  }

  #[benchmark]
  fn set_protocol_params() -> Result<(), BenchmarkError> {
    let mut params = ProtocolParams::<T>::get();
    params.success_fee = Permill::from_percent(20);
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, params);

    assert_eq!(ProtocolParams::<T>::get().success_fee, Permill::from_percent(20));
    Ok(())
  }

  #[benchmark]
  fn set_fee_params() -> Result<(), BenchmarkError> {
    let mut params = FeeParams::<T>::get();
    params.tc_mint_fee = Permill::from_percent(1);
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, params);

    assert_eq!(FeeParams::<T>::get().tc_mint_fee, Permill::from_percent(1));
    Ok(())
  }

  #[benchmark]
  fn set_flux_params() -> Result<(), BenchmarkError> {
    let params = FluxParameters {
      max_absolute_op: units(1_000),
      max_op_diff: units(500),
      decay_span: 100u32.into(),
    };
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, params);

    assert_eq!(FluxParams::<T>::get(), params);
    Ok(())
  }

  #[benchmark]
  fn set_fee_token() -> Result<(), BenchmarkError> {
    T::BenchmarkHelper::create_asset(FIRST_BENCH_ASSET)?;
    let config = FeeTokenConfig {
      asset_id: FIRST_BENCH_ASSET,
      price_provider: 0,
    };
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, Some(config));

    assert_eq!(FeeToken::<T>::get(), Some(config));
    Ok(())
  }

  #[benchmark]
  fn set_execution_fee() -> Result<(), BenchmarkError> {
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, OperationKind::SwapTPforTP, 1_000);

    assert_eq!(ExecutionFees::<T>::get(OperationKind::SwapTPforTP), 1_000);
    Ok(())
  }

  #[benchmark]
  fn set_liquidation_enabled() -> Result<(), BenchmarkError> {
    let origin = admin::<T>()?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, false);

    assert!(!Bucket::<T>::get().liquidation_enabled);
    Ok(())
  }

  #[benchmark]
  fn set_paused() -> Result<(), BenchmarkError> {
    let origin = T::PauserOrigin::try_successful_origin().map_err(|_| BenchmarkError::Weightless)?;

    #[extrinsic_call]
    _(origin as T::RuntimeOrigin, true);

    assert!(Paused::<T>::get());
    Ok(())
  }

  #[benchmark]
  fn set_vendor_markup() {
    let vendor: T::AccountId = whitelisted_caller();

    #[extrinsic_call]
    _(RawOrigin::Signed(vendor.clone()), Some(Permill::from_percent(1)));

    assert_eq!(VendorMarkups::<T>::get(&vendor), Some(Permill::from_percent(1)));
  }

  #[benchmark]
  fn claim_refund() -> Result<(), BenchmarkError> {
    let caller = funded::<T>("caller")?;
    let oper_id = NextOperId::<T>::get();
    queue_mint_tc::<T>(&caller, 1, units(10))?;
    let mut op = Operations::<T>::get(oper_id).ok_or(BenchmarkError::Weightless)?;
    op.state = OperationState::Errored;
    let escrow = Escrow {
      execution_fee: 0,
      ..op.escrow
    };
    Operations::<T>::insert(oper_id, op);
    PendingRefunds::<T>::insert(oper_id, escrow);
    let before = T::Assets::balance(T::CollateralAssetId::get(), &caller);

    #[extrinsic_call]
    _(RawOrigin::Signed(caller.clone()), oper_id);

    assert!(!PendingRefunds::<T>::contains_key(oper_id));
    assert_eq!(
      T::Assets::balance(T::CollateralAssetId::get(), &caller),
      before.saturating_add(escrow.collateral)
    );
    Ok(())
  }

  impl_benchmark_test_suite!(Pallet, crate::mock::new_test_ext(), crate::mock::Test);
}
