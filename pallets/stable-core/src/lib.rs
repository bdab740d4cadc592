//! # Stable Core Pallet
//!
//! Operation queue and collateral bucket accounting for a multi-asset collateralized
//! stablecoin.
//!
//! Users lock a collateral asset (AC) to mint a collateral token (TC) that absorbs price risk
//! and/or pegged tokens (TP) that track an external reference price. Requests are registered
//! with [`Pallet::enqueue`], which escrows the funds, and settled later in FIFO batches by
//! [`Pallet::execute`] at the prices current at execution time. A flux capacitor bounds the
//! volume one batch may settle.
//!
//! Every queued operation ends either `Executed` or `Errored`. Failures are isolated per
//! operation: storage and asset changes are rolled back, the escrow is refunded in full and the
//! failure is reported as `OperationError` (errors raised by this pallet) or `UnhandledError`
//! (anything else).
//!
//! Coverage is `(total collateral + accumulated gain) / locked collateral`. When liquidation is
//! enabled and coverage drops under the liquidation threshold the protocol enters a terminal
//! liquidated state in which pegged token holders may only exit through
//! [`Pallet::liq_redeem_tp`].

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub use pallet::*;

pub mod adapters;
pub use adapters::{OnLiquidation, PriceOracle};

pub mod flux;
pub mod interest;
pub mod ledger;

pub mod types;
pub use types::*;

mod fees;
mod handlers;
mod liquidation;
mod queue;
mod settlement;

pub mod weights;
pub use weights::WeightInfo;

#[cfg(test)]
mod mock;

#[cfg(feature = "runtime-benchmarks")]
mod benchmarking;

/// Log target for this pallet.
pub(crate) const LOG_TARGET: &str = "runtime::stable-core";

#[cfg(feature = "runtime-benchmarks")]
pub trait BenchmarkHelper {
  /// Creates a fungible asset with zero supply that pegged token registration can use.
  fn create_asset(asset_id: u32) -> polkadot_sdk::sp_runtime::DispatchResult;
  /// Makes `provider` report `price` as valid.
  fn set_price(provider: PriceProviderId, price: polkadot_sdk::sp_runtime::FixedU128);
}

#[frame::pallet]
pub mod pallet {
  use super::*;
  use crate::flux::{FluxParameters, FluxWindow};
  use crate::interest::Direction;
  use crate::ledger::LedgerView;
  use frame::prelude::*;
  use polkadot_sdk::frame_support::{
    PalletId,
    traits::{
      fungible::{Inspect as NativeInspect, Mutate as NativeMutate},
      fungibles::{Inspect, Mutate},
    },
  };
  use polkadot_sdk::sp_runtime::{
    FixedPointNumber, FixedU128, Permill,
    traits::{AccountIdConversion, One},
  };

  pub type OperationOf<T> =
    Operation<<T as frame_system::Config>::AccountId, BlockNumberFor<T>>;
  pub type PeggedTokenOf<T> = PeggedTokenBucket<BlockNumberFor<T>>;
  pub type PeggedTokensOf<T> =
    BoundedVec<PeggedTokenOf<T>, <T as Config>::MaxPeggedTokens>;

  #[pallet::config]
  pub trait Config: frame_system::Config {
    /// Collateral asset, collateral token and pegged tokens
    type Assets: Inspect<Self::AccountId, AssetId = u32, Balance = Balance>
      + Mutate<Self::AccountId, AssetId = u32, Balance = Balance>;

    /// Base settlement asset in which execution fees are escrowed
    type Currency: NativeMutate<Self::AccountId, Balance = Balance>
      + NativeInspect<Self::AccountId, Balance = Balance>;

    /// Reference prices for pegged tokens and the fee token
    type PriceOracle: PriceOracle;

    /// Runtime glue executed when the protocol is liquidated
    type LiquidationHook: OnLiquidation;

    /// Origin that can perform governance operations
    type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    /// Origin that can pause and unpause the queue
    type PauserOrigin: EnsureOrigin<Self::RuntimeOrigin>;

    /// Origin allowed to execute queued operations, yielding the executing account
    type ExecutorOrigin: EnsureOrigin<Self::RuntimeOrigin, Success = Self::AccountId>;

    /// Pallet ID for the custody account
    #[pallet::constant]
    type PalletId: Get<PalletId>;

    /// Collateral asset (AC)
    #[pallet::constant]
    type CollateralAssetId: Get<u32>;

    /// Collateral token (TC), minted and burned by this pallet only
    #[pallet::constant]
    type CollateralTokenId: Get<u32>;

    /// Receives protocol fees and the protocol share of vendor markups
    type FeeFlowAccount: Get<Self::AccountId>;

    /// Receives the success fee skimmed at settlement
    type SuccessFeeAccount: Get<Self::AccountId>;

    /// Receives collateral token holder interest at settlement
    type InterestCollectorAccount: Get<Self::AccountId>;

    #[pallet::constant]
    type MaxPeggedTokens: Get<u32>;

    /// Upper bound of operations settled by one `execute` call
    #[pallet::constant]
    type MaxOperationsPerBatch: Get<u32>;

    /// Upper bound of the markup a vendor may register
    #[pallet::constant]
    type MaxVendorMarkup: Get<Permill>;

    /// Weight information
    type WeightInfo: WeightInfo;

    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelper: crate::BenchmarkHelper;
  }

  #[pallet::pallet]
  pub struct Pallet<T>(_);

  /// Identifier assigned to the next enqueued operation.
  #[pallet::storage]
  pub type NextOperId<T> = StorageValue<_, OperId, ValueQuery>;

  /// Every operation ever enqueued, keyed by id.
  #[pallet::storage]
  pub type Operations<T: Config> = StorageMap<_, Twox64Concat, OperId, OperationOf<T>>;

  /// Lowest id that may still be queued.
  #[pallet::storage]
  pub type ExecutionCursor<T> = StorageValue<_, OperId, ValueQuery>;

  #[pallet::storage]
  pub type Bucket<T> = StorageValue<_, GlobalBucket, ValueQuery>;

  /// Pegged token buckets, append-only.
  #[pallet::storage]
  pub type PeggedTokens<T: Config> = StorageValue<_, PeggedTokensOf<T>, ValueQuery>;

  #[pallet::storage]
  pub type FluxWindowState<T: Config> = StorageValue<_, FluxWindow<BlockNumberFor<T>>, ValueQuery>;

  #[pallet::storage]
  pub type FluxParams<T: Config> =
    StorageValue<_, FluxParameters<BlockNumberFor<T>>, ValueQuery>;

  #[pallet::storage]
  pub type ProtocolParams<T: Config> =
    StorageValue<_, ProtocolParameters<BlockNumberFor<T>>, ValueQuery>;

  #[pallet::storage]
  pub type FeeParams<T> = StorageValue<_, FeeParameters, ValueQuery>;

  #[pallet::storage]
  pub type FeeToken<T> = StorageValue<_, FeeTokenConfig, OptionQuery>;

  /// Markup registered by each vendor.
  #[pallet::storage]
  pub type VendorMarkups<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, Permill>;

  /// Execution fee escrowed per operation kind.
  #[pallet::storage]
  pub type ExecutionFees<T> = StorageMap<_, Twox64Concat, OperationKind, Balance, ValueQuery>;

  #[pallet::storage]
  pub type Paused<T> = StorageValue<_, bool, ValueQuery>;

  #[pallet::storage]
  pub type NextSettlementBlock<T: Config> = StorageValue<_, BlockNumberFor<T>, ValueQuery>;

  /// Escrow legs that could not be returned when their operation errored.
  #[pallet::storage]
  pub type PendingRefunds<T> = StorageMap<_, Twox64Concat, OperId, Escrow>;

  /// Per pegged token redemption price fixed when the protocol was liquidated.
  #[pallet::storage]
  pub type LiquidationPrices<T> = StorageMap<_, Twox64Concat, TpIndex, FixedU128>;

  #[pallet::genesis_config]
  pub struct GenesisConfig<T: Config> {
    pub liquidation_enabled: bool,
    #[serde(skip)]
    pub _marker: core::marker::PhantomData<T>,
  }

  impl<T: Config> Default for GenesisConfig<T> {
    fn default() -> Self {
      Self {
        liquidation_enabled: true,
        _marker: Default::default(),
      }
    }
  }

  #[pallet::genesis_build]
  impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
    fn build(&self) {
      Bucket::<T>::mutate(|bucket| bucket.liquidation_enabled = self.liquidation_enabled);
      NextSettlementBlock::<T>::put(ProtocolParams::<T>::get().settlement_interval);
      // Custody account holds assets without a native balance
      frame_system::Pallet::<T>::inc_providers(&Pallet::<T>::account_id());
    }
  }

  #[pallet::hooks]
  impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
    fn on_idle(now: BlockNumberFor<T>, remaining_weight: Weight) -> Weight {
      let needed = T::WeightInfo::update_emas(T::MaxPeggedTokens::get());
      if remaining_weight.any_lt(needed) {
        return Weight::zero();
      }
      Self::update_due_emas(now);
      needed
    }
  }

  #[pallet::event]
  #[pallet::generate_deposit(pub(super) fn deposit_event)]
  pub enum Event<T: Config> {
    OperationQueued {
      operator: T::AccountId,
      oper_id: OperId,
      kind: OperationKind,
    },
    OperationExecuted {
      executor: T::AccountId,
      oper_id: OperId,
    },
    /// A business rule rejected the operation; escrow refunded.
    OperationError {
      oper_id: OperId,
      error: DispatchError,
    },
    /// The operation failed outside the known error set; escrow refunded.
    UnhandledError {
      oper_id: OperId,
      reason: DispatchError,
    },
    /// Part of the escrow could not be returned and waits in `PendingRefunds`.
    RefundDeferred {
      oper_id: OperId,
    },
    RefundClaimed {
      oper_id: OperId,
      complete: bool,
    },
    /// The batch stopped before `oper_id` to respect the flux capacitor.
    FluxCapacitorThrottled {
      oper_id: OperId,
    },
    BatchExecuted {
      executor: T::AccountId,
      processed: u32,
      fees_paid: Balance,
    },
    TCMinted {
      oper_id: OperId,
      recipient: T::AccountId,
      q_tc: Balance,
      q_ac: Balance,
      fee: Balance,
    },
    TCRedeemed {
      oper_id: OperId,
      recipient: T::AccountId,
      q_tc: Balance,
      q_ac: Balance,
      fee: Balance,
    },
    TPMinted {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tp: Balance,
      q_ac: Balance,
      fee: Balance,
      interest: Balance,
    },
    TPRedeemed {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tp: Balance,
      q_ac: Balance,
      fee: Balance,
      interest: Balance,
    },
    TCandTPMinted {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tc: Balance,
      q_tp: Balance,
      q_ac: Balance,
      fee: Balance,
      interest: Balance,
    },
    TCandTPRedeemed {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tc: Balance,
      q_tp: Balance,
      q_ac: Balance,
      fee: Balance,
      interest: Balance,
    },
    TCSwappedForTP {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tc: Balance,
      q_tp: Balance,
      fee: Balance,
      interest: Balance,
    },
    TPSwappedForTC {
      oper_id: OperId,
      tp: TpIndex,
      recipient: T::AccountId,
      q_tp: Balance,
      q_tc: Balance,
      fee: Balance,
      interest: Balance,
    },
    TPSwappedForTP {
      oper_id: OperId,
      tp_from: TpIndex,
      tp_to: TpIndex,
      recipient: T::AccountId,
      q_tp_from: Balance,
      q_tp_to: Balance,
      fee: Balance,
      interest: Balance,
    },
    ContractLiquidated,
    LiqTPRedeemed {
      tp: TpIndex,
      redeemer: T::AccountId,
      recipient: T::AccountId,
      q_tp: Balance,
      q_ac: Balance,
    },
    SettlementExecuted {
      tc_interest: Balance,
      success_fee: Balance,
      next_settlement: BlockNumberFor<T>,
    },
    EmaUpdated {
      tp: TpIndex,
      value: FixedU128,
    },
    PeggedTokenAdded {
      tp: TpIndex,
      asset_id: u32,
    },
    PeggedTokenEdited {
      tp: TpIndex,
    },
    ProtocolParamsUpdated,
    FeeParamsUpdated,
    FluxParamsUpdated,
    FeeTokenSet {
      config: Option<FeeTokenConfig>,
    },
    ExecutionFeeSet {
      kind: OperationKind,
      fee: Balance,
    },
    LiquidationEnabledSet {
      enabled: bool,
    },
    PausedSet {
      paused: bool,
    },
    VendorMarkupSet {
      vendor: T::AccountId,
      markup: Option<Permill>,
    },
  }

  #[pallet::error]
  pub enum Error<T> {
    /// The queue is paused
    Paused,
    /// The protocol is liquidated
    Liquidated,
    /// Only available once the protocol is liquidated
    NotLiquidated,
    ZeroAmount,
    InvalidPeggedToken,
    SameTokenSwap,
    VendorNotRegistered,
    FeeTokenNotSet,
    /// Not enough free balance to cover escrow and execution fee
    InsufficientBalance,
    /// A price provider reported an invalid or zero price
    MissingProviderPrice,
    LowCoverage,
    InsufficientQacSent,
    InsufficientTCtoRedeem,
    InsufficientTPtoMint,
    InsufficientTPtoRedeem,
    QacBelowMinimumRequired,
    QtpBelowMinimumRequired,
    QtcBelowMinimumRequired,
    /// The operation alone exceeds a flux capacitor ceiling
    MaxFluxCapacitorOperationReached,
    NothingToRedeem,
    SettlementTooEarly,
    NoEmaUpdateDue,
    TooManyPeggedTokens,
    /// Target coverage must be above one
    InvalidTargetCoverage,
    InvalidInterestCurve,
    /// Liquidation threshold must lie between one and the protection threshold
    InvalidThresholds,
    UnknownAsset,
    AssetAlreadyRegistered,
    /// Pegged token assets must start with zero issuance
    AssetHasSupply,
    AssetIdImmutable,
    VendorMarkupTooHigh,
    NoPendingRefund,
    /// None of the deferred refund legs can be paid yet
    RefundStillBlocked,
  }

  #[pallet::call]
  impl<T: Config> Pallet<T> {
    /// Registers an operation and escrows its funds and execution fee.
    ///
    /// Only structural checks happen here; prices, coverage and slippage bounds are evaluated
    /// when the operation is executed.
    #[pallet::call_index(0)]
    #[pallet::weight(T::WeightInfo::enqueue())]
    pub fn enqueue(
      origin: OriginFor<T>,
      action: Action,
      recipient: Option<T::AccountId>,
      vendor: Option<T::AccountId>,
      pay_fee_in_token: bool,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      Self::do_enqueue(who, action, recipient, vendor, pay_fee_in_token)?;
      Ok(())
    }

    /// Executes queued operations in id order until the batch limit or the flux capacitor
    /// stops it, and pays the collected execution fees to `fee_recipient`.
    #[pallet::call_index(1)]
    #[pallet::weight(T::WeightInfo::execute(T::MaxOperationsPerBatch::get()))]
    pub fn execute(origin: OriginFor<T>, fee_recipient: T::AccountId) -> DispatchResultWithPostInfo {
      let executor = T::ExecutorOrigin::ensure_origin(origin)?;
      let processed = Self::do_execute(executor, fee_recipient)?;
      Ok(Some(T::WeightInfo::execute(processed)).into())
    }

    #[pallet::call_index(2)]
    #[pallet::weight(T::WeightInfo::eval_liquidation(T::MaxPeggedTokens::get()))]
    pub fn eval_liquidation(origin: OriginFor<T>) -> DispatchResult {
      ensure_signed(origin)?;
      Self::do_eval_liquidation()?;
      Ok(())
    }

    /// Burns the caller's whole balance of pegged token `tp` for its liquidation share.
    #[pallet::call_index(3)]
    #[pallet::weight(T::WeightInfo::liq_redeem_tp())]
    pub fn liq_redeem_tp(
      origin: OriginFor<T>,
      tp: TpIndex,
      recipient: Option<T::AccountId>,
    ) -> DispatchResult {
      let who = ensure_signed(origin)?;
      let recipient = recipient.unwrap_or_else(|| who.clone());
      Self::do_liq_redeem_tp(who, tp, recipient)
    }

    #[pallet::call_index(4)]
    #[pallet::weight(T::WeightInfo::exec_settlement(T::MaxPeggedTokens::get()))]
    pub fn exec_settlement(origin: OriginFor<T>) -> DispatchResult {
      ensure_signed(origin)?;
      Self::do_exec_settlement()
    }

    /// Recomputes every EMA whose interval has elapsed.
    #[pallet::call_index(5)]
    #[pallet::weight(T::WeightInfo::update_emas(T::MaxPeggedTokens::get()))]
    pub fn update_emas(origin: OriginFor<T>) -> DispatchResult {
      ensure_signed(origin)?;
      let now = frame_system::Pallet::<T>::block_number();
      ensure!(Self::update_due_emas(now) > 0, Error::<T>::NoEmaUpdateDue);
      Ok(())
    }

    #[pallet::call_index(6)]
    #[pallet::weight(T::WeightInfo::add_pegged_token())]
    pub fn add_pegged_token(
      origin: OriginFor<T>,
      config: PeggedTokenConfig<BlockNumberFor<T>>,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      ensure!(!Bucket::<T>::get().liquidated, Error::<T>::Liquidated);
      Self::ensure_valid_token_config(&config)?;
      ensure!(
        T::Assets::asset_exists(config.asset_id),
        Error::<T>::UnknownAsset
      );
      ensure!(
        config.asset_id != T::CollateralAssetId::get()
          && config.asset_id != T::CollateralTokenId::get()
          && !PeggedTokens::<T>::get()
            .iter()
            .any(|token| token.asset_id == config.asset_id),
        Error::<T>::AssetAlreadyRegistered
      );
      ensure!(
        T::Assets::total_issuance(config.asset_id) == 0,
        Error::<T>::AssetHasSupply
      );
      let now = frame_system::Pallet::<T>::block_number();
      let (price, valid) = T::PriceOracle::current_price(config.price_provider);
      let seed = if valid { price } else { FixedU128::from_inner(0) };
      let tp = PeggedTokens::<T>::try_mutate(|tokens| -> Result<TpIndex, DispatchError> {
        let tp = tokens.len() as TpIndex;
        tokens
          .try_push(PeggedTokenBucket {
            asset_id: config.asset_id,
            price_provider: config.price_provider,
            total_supply: 0,
            target_coverage: config.target_coverage,
            ema: EmaState {
              value: seed,
              smoothing: config.ema_smoothing,
              last_block: now,
              interval: config.ema_interval,
            },
            interest: config.interest,
            mint_fee: config.mint_fee,
            redeem_fee: config.redeem_fee,
            last_settlement_price: seed,
          })
          .map_err(|_| Error::<T>::TooManyPeggedTokens)?;
        Ok(tp)
      })?;
      Self::deposit_event(Event::PeggedTokenAdded {
        tp,
        asset_id: config.asset_id,
      });
      Ok(())
    }

    #[pallet::call_index(7)]
    #[pallet::weight(T::WeightInfo::edit_pegged_token())]
    pub fn edit_pegged_token(
      origin: OriginFor<T>,
      tp: TpIndex,
      config: PeggedTokenConfig<BlockNumberFor<T>>,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      Self::ensure_valid_token_config(&config)?;
      PeggedTokens::<T>::try_mutate(|tokens| -> DispatchResult {
        let token = tokens
          .get_mut(tp as usize)
          .ok_or(Error::<T>::InvalidPeggedToken)?;
        ensure!(
          token.asset_id == config.asset_id,
          Error::<T>::AssetIdImmutable
        );
        token.price_provider = config.price_provider;
        token.target_coverage = config.target_coverage;
        token.ema.smoothing = config.ema_smoothing;
        token.ema.interval = config.ema_interval;
        token.interest = config.interest;
        token.mint_fee = config.mint_fee;
        token.redeem_fee = config.redeem_fee;
        Ok(())
      })?;
      Self::deposit_event(Event::PeggedTokenEdited { tp });
      Ok(())
    }

    #[pallet::call_index(8)]
    #[pallet::weight(T::WeightInfo::set_protocol_params())]
    pub fn set_protocol_params(
      origin: OriginFor<T>,
      params: ProtocolParameters<BlockNumberFor<T>>,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      ensure!(
        params.liquidation_threshold >= FixedU128::one()
          && params.liquidation_threshold <= params.protection_threshold,
        Error::<T>::InvalidThresholds
      );
      ProtocolParams::<T>::put(params);
      Self::deposit_event(Event::ProtocolParamsUpdated);
      Ok(())
    }

    #[pallet::call_index(9)]
    #[pallet::weight(T::WeightInfo::set_fee_params())]
    pub fn set_fee_params(origin: OriginFor<T>, params: FeeParameters) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      FeeParams::<T>::put(params);
      Self::deposit_event(Event::FeeParamsUpdated);
      Ok(())
    }

    #[pallet::call_index(10)]
    #[pallet::weight(T::WeightInfo::set_flux_params())]
    pub fn set_flux_params(
      origin: OriginFor<T>,
      params: FluxParameters<BlockNumberFor<T>>,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      FluxParams::<T>::put(params);
      Self::deposit_event(Event::FluxParamsUpdated);
      Ok(())
    }

    /// Sets or clears the alternate fee token.
    #[pallet::call_index(11)]
    #[pallet::weight(T::WeightInfo::set_fee_token())]
    pub fn set_fee_token(origin: OriginFor<T>, config: Option<FeeTokenConfig>) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      match config {
        Some(fee_token) => {
          ensure!(
            T::Assets::asset_exists(fee_token.asset_id),
            Error::<T>::UnknownAsset
          );
          FeeToken::<T>::put(fee_token);
        }
        None => FeeToken::<T>::kill(),
      }
      Self::deposit_event(Event::FeeTokenSet { config });
      Ok(())
    }

    #[pallet::call_index(12)]
    #[pallet::weight(T::WeightInfo::set_execution_fee())]
    pub fn set_execution_fee(
      origin: OriginFor<T>,
      kind: OperationKind,
      fee: Balance,
    ) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      ExecutionFees::<T>::insert(kind, fee);
      Self::deposit_event(Event::ExecutionFeeSet { kind, fee });
      Ok(())
    }

    #[pallet::call_index(13)]
    #[pallet::weight(T::WeightInfo::set_liquidation_enabled())]
    pub fn set_liquidation_enabled(origin: OriginFor<T>, enabled: bool) -> DispatchResult {
      T::AdminOrigin::ensure_origin(origin)?;
      Bucket::<T>::mutate(|bucket| bucket.liquidation_enabled = enabled);
      Self::deposit_event(Event::LiquidationEnabledSet { enabled });
      Ok(())
    }

    #[pallet::call_index(14)]
    #[pallet::weight(T::WeightInfo::set_paused())]
    pub fn set_paused(origin: OriginFor<T>, paused: bool) -> DispatchResult {
      T::PauserOrigin::ensure_origin(origin)?;
      Paused::<T>::put(paused);
      Self::deposit_event(Event::PausedSet { paused });
      Ok(())
    }

    /// Registers (`Some`) or removes (`None`) the caller's vendor markup.
    #[pallet::call_index(15)]
    #[pallet::weight(T::WeightInfo::set_vendor_markup())]
    pub fn set_vendor_markup(origin: OriginFor<T>, markup: Option<Permill>) -> DispatchResult {
      let vendor = ensure_signed(origin)?;
      match markup {
        Some(value) => {
          ensure!(
            value <= T::MaxVendorMarkup::get(),
            Error::<T>::VendorMarkupTooHigh
          );
          VendorMarkups::<T>::insert(&vendor, value);
        }
        None => VendorMarkups::<T>::remove(&vendor),
      }
      Self::deposit_event(Event::VendorMarkupSet { vendor, markup });
      Ok(())
    }

    /// Pays out the escrow legs an errored operation could not return. Anyone may trigger it;
    /// funds always go to the operation owner.
    #[pallet::call_index(16)]
    #[pallet::weight(T::WeightInfo::claim_refund())]
    pub fn claim_refund(origin: OriginFor<T>, oper_id: OperId) -> DispatchResult {
      ensure_signed(origin)?;
      Self::do_claim_refund(oper_id)
    }
  }

  impl<T: Config> Pallet<T> {
    /// Custody account for escrow and collateral.
    pub fn account_id() -> T::AccountId {
      T::PalletId::get().into_account_truncating()
    }

    pub fn operation(oper_id: OperId) -> Option<OperationOf<T>> {
      Operations::<T>::get(oper_id)
    }

    pub fn global_coverage() -> Result<FixedU128, DispatchError> {
      Ok(Self::ledger_view()?.coverage()?)
    }

    pub fn collateral_token_price() -> Result<FixedU128, DispatchError> {
      Ok(Self::ledger_view()?.tc_price()?)
    }

    pub fn locked_collateral() -> Result<Balance, DispatchError> {
      Ok(Self::ledger_view()?.total_locked()?)
    }

    pub fn target_coverage_ema(tp: TpIndex) -> Result<FixedU128, DispatchError> {
      let view = Self::ledger_view()?;
      Self::ensure_token(&view, tp)?;
      Ok(view.target_coverage_ema(tp as usize)?)
    }

    pub fn tp_available_to_mint(tp: TpIndex) -> Result<Balance, DispatchError> {
      let view = Self::ledger_view()?;
      Self::ensure_token(&view, tp)?;
      Ok(view.tp_available_to_mint(tp as usize)?)
    }

    pub fn tc_available_to_redeem() -> Result<Balance, DispatchError> {
      Ok(Self::ledger_view()?.tc_available_to_redeem()?)
    }

    /// Interest rate pegged token `tp` currently charges in `direction`.
    pub fn interest_rate(tp: TpIndex, direction: Direction) -> Result<Permill, DispatchError> {
      let view = Self::ledger_view()?;
      Self::ensure_token(&view, tp)?;
      Self::rate_for(&view, tp, direction)
    }

    pub fn next_ema_calculation(tp: TpIndex) -> Option<BlockNumberFor<T>> {
      PeggedTokens::<T>::get()
        .get(tp as usize)
        .map(|token| token.ema.next_calculation())
    }

    /// Price-consistent snapshot of the buckets. Fails when any pegged token lacks a valid
    /// price, since coverage depends on all of them.
    pub(crate) fn ledger_view() -> Result<LedgerView, DispatchError> {
      let bucket = Bucket::<T>::get();
      let tokens = PeggedTokens::<T>::get()
        .iter()
        .map(|token| {
          let price = Self::valid_price(token.price_provider)?;
          let ema = if token.ema.value.into_inner() == 0 {
            price
          } else {
            token.ema.value
          };
          Ok(crate::ledger::TokenView {
            price,
            ema,
            supply: token.total_supply,
            target_coverage: token.target_coverage,
          })
        })
        .collect::<Result<alloc::vec::Vec<_>, DispatchError>>()?;
      Ok(LedgerView {
        available: bucket.available_collateral(),
        tc_supply: bucket.tc_supply,
        tokens,
      })
    }

    pub(crate) fn valid_price(provider: PriceProviderId) -> Result<FixedU128, DispatchError> {
      let (price, valid) = T::PriceOracle::current_price(provider);
      ensure!(
        valid && price.into_inner() > 0,
        Error::<T>::MissingProviderPrice
      );
      Ok(price)
    }

    pub(crate) fn ensure_token(view: &LedgerView, tp: TpIndex) -> DispatchResult {
      ensure!(
        (tp as usize) < view.tokens.len(),
        Error::<T>::InvalidPeggedToken
      );
      Ok(())
    }

    pub(crate) fn rate_for(
      view: &LedgerView,
      tp: TpIndex,
      direction: Direction,
    ) -> Result<Permill, DispatchError> {
      let token = PeggedTokens::<T>::get()
        .get(tp as usize)
        .copied()
        .ok_or(Error::<T>::InvalidPeggedToken)?;
      let abundance = view.abundance(tp as usize)?;
      let band = ProtocolParams::<T>::get().abundance_band;
      Ok(crate::interest::interest_rate(
        &token.interest,
        abundance,
        band,
        direction,
      ))
    }

    fn ensure_valid_token_config(config: &PeggedTokenConfig<BlockNumberFor<T>>) -> DispatchResult {
      ensure!(
        config.target_coverage > FixedU128::one(),
        Error::<T>::InvalidTargetCoverage
      );
      ensure!(
        config.interest.is_valid(),
        Error::<T>::InvalidInterestCurve
      );
      Ok(())
    }

    /// Recomputes due EMAs from valid prices and returns how many changed.
    pub(crate) fn update_due_emas(now: BlockNumberFor<T>) -> u32 {
      let mut updated = alloc::vec::Vec::new();
      PeggedTokens::<T>::mutate(|tokens| {
        for (tp, token) in tokens.iter_mut().enumerate() {
          if !token.ema.is_due(now) {
            continue;
          }
          match Self::valid_price(token.price_provider) {
            Ok(price) => {
              token.ema.advance(price, now);
              updated.push((tp as TpIndex, token.ema.value));
            }
            Err(_) => log::debug!(
              target: LOG_TARGET,
              "skipping EMA update for pegged token {tp}: no valid price"
            ),
          }
        }
      });
      let count = updated.len() as u32;
      for (tp, value) in updated {
        Self::deposit_event(Event::EmaUpdated { tp, value });
      }
      count
    }
  }
}
