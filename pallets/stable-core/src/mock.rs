extern crate alloc;

use crate as pallet_stable_core;
use crate::interest::InterestCurve;
use crate::types::{FeeParameters, OperationKind, PeggedTokenConfig, PriceProviderId};
use core::cell::RefCell;
use polkadot_sdk::frame_support::{
  PalletId, assert_ok, construct_runtime, derive_impl, parameter_types,
  traits::{ConstU32, ConstU64, Get, SortedMembers},
};
use polkadot_sdk::frame_system::{self, EnsureRoot, EnsureSignedBy};
use polkadot_sdk::sp_runtime::{
  BuildStorage, FixedPointNumber, FixedU128, Permill,
  testing::H256,
  traits::{BlakeTwo256, IdentityLookup},
};
use primitives::params::PRECISION;

type Block = frame_system::mocking::MockBlock<Test>;

pub type AccountId = u64;

pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const VENDOR: AccountId = 4;
pub const EXECUTOR: AccountId = 5;
pub const FEE_FLOW: AccountId = 900;
pub const SUCCESS_FEE_BENEFICIARY: AccountId = 901;
pub const INTEREST_COLLECTOR: AccountId = 902;

pub const AC: u32 = 1;
pub const TC: u32 = 2;
pub const TP_A: u32 = 10;
pub const TP_B: u32 = 11;
pub const FEE_TOKEN: u32 = 20;

pub const PROVIDER_A: PriceProviderId = 0;
pub const PROVIDER_B: PriceProviderId = 1;
pub const PROVIDER_FEE_TOKEN: PriceProviderId = 9;

pub const EXECUTION_FEE: u128 = 10;

pub const ALL_KINDS: [OperationKind; 9] = [
  OperationKind::MintTC,
  OperationKind::RedeemTC,
  OperationKind::MintTP,
  OperationKind::RedeemTP,
  OperationKind::MintTCandTP,
  OperationKind::RedeemTCandTP,
  OperationKind::SwapTCforTP,
  OperationKind::SwapTPforTC,
  OperationKind::SwapTPforTP,
];

construct_runtime!(
  pub struct Test {
    System: frame_system,
    Balances: polkadot_sdk::pallet_balances,
    Assets: polkadot_sdk::pallet_assets,
    StableCore: pallet_stable_core,
  }
);

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
  type Block = Block;
  type AccountId = AccountId;
  type Lookup = IdentityLookup<Self::AccountId>;
  type Hash = H256;
  type Hashing = BlakeTwo256;
  type AccountData = polkadot_sdk::pallet_balances::AccountData<u128>;
}

parameter_types! {
  pub static ExistentialDeposit: u128 = 1;
}

impl polkadot_sdk::pallet_balances::Config for Test {
  type MaxLocks = ();
  type MaxReserves = ();
  type ReserveIdentifier = [u8; 8];
  type Balance = u128;
  type DustRemoval = ();
  type RuntimeEvent = RuntimeEvent;
  type ExistentialDeposit = ExistentialDeposit;
  type AccountStore = System;
  type WeightInfo = ();
  type FreezeIdentifier = ();
  type MaxFreezes = ();
  type RuntimeHoldReason = ();
  type RuntimeFreezeReason = ();
  type DoneSlashHandler = ();
}

impl polkadot_sdk::pallet_assets::Config for Test {
  type RuntimeEvent = RuntimeEvent;
  type Balance = u128;
  type AssetId = u32;
  type AssetIdParameter = u32;
  type Currency = Balances;
  type CreateOrigin = polkadot_sdk::frame_support::traits::AsEnsureOriginWithArg<
    frame_system::EnsureSigned<Self::AccountId>,
  >;
  type ForceOrigin = frame_system::EnsureRoot<Self::AccountId>;
  type AssetDeposit = polkadot_sdk::frame_support::traits::ConstU128<1>;
  type AssetAccountDeposit = polkadot_sdk::frame_support::traits::ConstU128<1>;
  type MetadataDepositBase = polkadot_sdk::frame_support::traits::ConstU128<1>;
  type MetadataDepositPerByte = polkadot_sdk::frame_support::traits::ConstU128<1>;
  type ApprovalDeposit = polkadot_sdk::frame_support::traits::ConstU128<1>;
  type StringLimit = ConstU32<50>;
  type Freezer = ();
  type Extra = ();
  type ReserveData = ();
  type CallbackHandle = ();
  type WeightInfo = ();
  type RemoveItemsLimit = ConstU32<5>;
  type Holder = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = AssetBenchmarkHelper;
}

#[cfg(feature = "runtime-benchmarks")]
pub struct AssetBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl polkadot_sdk::pallet_assets::BenchmarkHelper<u32, ()> for AssetBenchmarkHelper {
  fn create_asset_id_parameter(id: u32) -> u32 {
    id
  }
  fn create_reserve_id_parameter(_id: u32) -> () {
    ()
  }
}

thread_local! {
  static PRICES: RefCell<alloc::collections::BTreeMap<PriceProviderId, (FixedU128, bool)>> =
    RefCell::new(Default::default());
  static LIQUIDATION_CALLS: RefCell<alloc::vec::Vec<u32>> = RefCell::new(Default::default());
}

/// Oracle answering from a per-provider table; unknown providers are invalid.
pub struct MockOracle;
impl crate::PriceOracle for MockOracle {
  fn current_price(provider: PriceProviderId) -> (FixedU128, bool) {
    PRICES.with(|p| {
      p.borrow()
        .get(&provider)
        .copied()
        .unwrap_or((FixedU128::from_inner(0), false))
    })
  }
}

pub fn set_price(provider: PriceProviderId, price: FixedU128, valid: bool) {
  PRICES.with(|p| p.borrow_mut().insert(provider, (price, valid)));
}

/// Freezes the collateral token through its freezer, as a runtime would.
pub struct MockLiquidationHook;
impl crate::OnLiquidation for MockLiquidationHook {
  fn on_liquidation(collateral_token: u32) {
    LIQUIDATION_CALLS.with(|c| c.borrow_mut().push(collateral_token));
    assert_ok!(Assets::freeze_asset(
      RuntimeOrigin::signed(ALICE),
      collateral_token
    ));
  }
}

pub fn liquidation_calls() -> alloc::vec::Vec<u32> {
  LIQUIDATION_CALLS.with(|c| c.borrow().clone())
}

pub struct StableCorePalletId;
impl Get<PalletId> for StableCorePalletId {
  fn get() -> PalletId {
    PalletId(*primitives::pallet_ids::STABLE_CORE_PALLET_ID)
  }
}

pub struct MaxVendorMarkup;
impl Get<Permill> for MaxVendorMarkup {
  fn get() -> Permill {
    Permill::from_percent(10)
  }
}

pub struct Executors;
impl SortedMembers<AccountId> for Executors {
  fn sorted_members() -> alloc::vec::Vec<AccountId> {
    alloc::vec![EXECUTOR]
  }
}

#[cfg(feature = "runtime-benchmarks")]
pub struct StableCoreBenchmarkHelper;

#[cfg(feature = "runtime-benchmarks")]
impl crate::BenchmarkHelper for StableCoreBenchmarkHelper {
  fn create_asset(asset_id: u32) -> polkadot_sdk::sp_runtime::DispatchResult {
    Assets::force_create(RuntimeOrigin::root(), asset_id, ALICE, true, 1)
  }
  fn set_price(provider: PriceProviderId, price: FixedU128) {
    set_price(provider, price, true);
  }
}

impl pallet_stable_core::Config for Test {
  type Assets = Assets;
  type Currency = Balances;
  type PriceOracle = MockOracle;
  type LiquidationHook = MockLiquidationHook;
  type AdminOrigin = EnsureRoot<AccountId>;
  type PauserOrigin = EnsureRoot<AccountId>;
  type ExecutorOrigin = EnsureSignedBy<Executors, AccountId>;
  type PalletId = StableCorePalletId;
  type CollateralAssetId = ConstU32<AC>;
  type CollateralTokenId = ConstU32<TC>;
  type FeeFlowAccount = ConstU64<FEE_FLOW>;
  type SuccessFeeAccount = ConstU64<SUCCESS_FEE_BENEFICIARY>;
  type InterestCollectorAccount = ConstU64<INTEREST_COLLECTOR>;
  type MaxPeggedTokens = ConstU32<4>;
  type MaxOperationsPerBatch = ConstU32<10>;
  type MaxVendorMarkup = MaxVendorMarkup;
  type WeightInfo = ();
  #[cfg(feature = "runtime-benchmarks")]
  type BenchmarkHelper = StableCoreBenchmarkHelper;
}

pub fn units(n: u128) -> u128 {
  n * PRECISION
}

pub fn price(n: u32) -> FixedU128 {
  FixedU128::saturating_from_integer(n)
}

/// Interest curve charging nothing.
pub fn flat_curve() -> InterestCurve {
  InterestCurve {
    tils: Permill::from_percent(0),
    ti_min: Permill::from_percent(0),
    ti_max: Permill::from_percent(0),
    abeq: Permill::from_percent(50),
    fac_min: FixedU128::from_inner(0),
    fac_max: FixedU128::saturating_from_integer(2u32),
  }
}

pub fn token_config(asset_id: u32, provider: PriceProviderId, ctarg: FixedU128) -> PeggedTokenConfig<u64> {
  PeggedTokenConfig {
    asset_id,
    price_provider: provider,
    target_coverage: ctarg,
    ema_smoothing: Permill::from_percent(50),
    ema_interval: 10,
    interest: flat_curve(),
    mint_fee: Permill::from_percent(0),
    redeem_fee: Permill::from_percent(0),
  }
}

pub fn zero_fees() -> FeeParameters {
  FeeParameters {
    tc_mint_fee: Permill::from_percent(0),
    tc_redeem_fee: Permill::from_percent(0),
    mint_tc_and_tp_fee: Permill::from_percent(0),
    redeem_tc_and_tp_fee: Permill::from_percent(0),
    swap_tc_for_tp_fee: Permill::from_percent(0),
    swap_tp_for_tc_fee: Permill::from_percent(0),
    swap_tp_for_tp_fee: Permill::from_percent(0),
    fee_token_pct: Permill::from_percent(50),
    vendor_protocol_share: Permill::from_percent(10),
  }
}

/// Registers pegged token `asset_id` at index order and sets its price.
pub fn register_token(asset_id: u32, provider: PriceProviderId, spot: FixedU128, ctarg: FixedU128) {
  set_price(provider, spot, true);
  assert_ok!(StableCore::add_pegged_token(
    RuntimeOrigin::root(),
    token_config(asset_id, provider, ctarg)
  ));
}

pub fn new_test_ext() -> polkadot_sdk::sp_io::TestExternalities {
  PRICES.with(|p| p.borrow_mut().clear());
  LIQUIDATION_CALLS.with(|c| c.borrow_mut().clear());

  let mut t = frame_system::GenesisConfig::<Test>::default()
    .build_storage()
    .unwrap();

  polkadot_sdk::pallet_balances::GenesisConfig::<Test> {
    balances: alloc::vec![
      (ALICE, 1_000_000),
      (BOB, 1_000_000),
      (VENDOR, 1_000),
      (EXECUTOR, 1_000),
      (FEE_FLOW, 1_000),
    ],
    dev_accounts: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  polkadot_sdk::pallet_assets::GenesisConfig::<Test> {
    assets: alloc::vec![
      (AC, ALICE, true, 1),
      (TC, ALICE, true, 1),
      (TP_A, ALICE, true, 1),
      (TP_B, ALICE, true, 1),
      (FEE_TOKEN, ALICE, true, 1),
    ],
    metadata: alloc::vec![],
    accounts: alloc::vec![
      (AC, ALICE, units(1_000_000)),
      (AC, BOB, units(1_000_000)),
      (FEE_TOKEN, ALICE, units(1_000)),
    ],
    reserves: alloc::vec![],
    next_asset_id: None,
  }
  .assimilate_storage(&mut t)
  .unwrap();

  pallet_stable_core::GenesisConfig::<Test>::default()
    .assimilate_storage(&mut t)
    .unwrap();

  let mut ext: polkadot_sdk::sp_io::TestExternalities = t.into();
  ext.execute_with(|| {
    System::set_block_number(1);
    for kind in ALL_KINDS {
      assert_ok!(StableCore::set_execution_fee(
        RuntimeOrigin::root(),
        kind,
        EXECUTION_FEE
      ));
    }
  });
  ext
}
