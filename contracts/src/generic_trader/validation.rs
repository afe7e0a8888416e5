//! Trade path validation.
//!
//! Runs before any balance moves and reads state only through
//! [`PathContext`]. Checks run in a fixed order and the first failure wins:
//!
//! 1. deadline
//! 2. path shape (lengths, distinct neighbours, distinct endpoints, markets exist)
//! 3. amounts (input, amount sentinel resolution, minimum output)
//! 4. per-leg trader rules (null trader, wrapper position, isolation sequencing
//!    and handoff position, converter trust and token support, internal
//!    trader allow-list)
//! 5. maker accounts

use thiserror::Error;

use margin_protocol::config::{MAX_AMOUNT_SENTINEL, MIN_PATH_LENGTH};
use margin_protocol::ledger::Market;
use margin_protocol::{Account, AccountNumber, Address, MarketId, SignedWei, Timestamp, Wei};

use super::types::{TradePath, TraderParam, TraderType, TransferCollateralParams};
use crate::MarginSystem;

/// Why a trade path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("deadline expired: deadline {deadline}, now {now}")]
    DeadlineExpired { deadline: Timestamp, now: Timestamp },

    #[error("invalid market path length {len} (allowed {min}..={max})")]
    InvalidMarketPathLength { len: usize, min: usize, max: usize },

    #[error("invalid traders path length: expected {expected}, got {actual}")]
    InvalidTradersPathLength { expected: usize, actual: usize },

    #[error("duplicate consecutive market {market} at path index {index}")]
    DuplicateConsecutiveMarket { index: usize, market: MarketId },

    #[error("input and output market are both {0}")]
    SameInputOutputMarket(MarketId),

    #[error("unknown market {0}")]
    UnknownMarket(MarketId),

    #[error("invalid input amount: zero")]
    ZeroInputAmount,

    #[error("invalid input amount: no positive balance in market {market}")]
    NoPositiveInputBalance { market: MarketId },

    #[error("invalid min output amount: zero")]
    ZeroMinOutputAmount,

    #[error("invalid trader at leg {index}: zero address")]
    NullTrader { index: usize },

    #[error("wrapper must be last trader (found at leg {index})")]
    WrapperMustBeLast { index: usize },

    /// The new shares belong in the owner's vault of the output market,
    /// which no later leg can trade from.
    #[error("unwrap into another isolation market must be last trader (found at leg {index})")]
    IsolationHandoffMustBeLast { index: usize },

    #[error("invalid trader type at leg {index}: expected {expected}, got {actual}")]
    InvalidTraderType {
        index: usize,
        expected: &'static str,
        actual: TraderType,
    },

    #[error("converter {converter} at leg {index} is not trusted by factory {factory}")]
    UntrustedConverter {
        index: usize,
        converter: Address,
        factory: Address,
    },

    #[error("converter {converter} at leg {index} does not accept input token {token}")]
    UnsupportedInputToken {
        index: usize,
        converter: Address,
        token: Address,
    },

    #[error("converter {converter} at leg {index} does not produce output token {token}")]
    UnsupportedOutputToken {
        index: usize,
        converter: Address,
        token: Address,
    },

    #[error("internal trader {trader} at leg {index} is not trusted")]
    UntrustedInternalTrader { index: usize, trader: Address },

    #[error("invalid maker account index {maker_account_index} at leg {index}: must be 0")]
    InvalidMakerAccountIndex {
        index: usize,
        maker_account_index: usize,
    },

    #[error("maker account index {maker_account_index} at leg {index} out of bounds ({len} maker accounts)")]
    MakerAccountOutOfBounds {
        index: usize,
        maker_account_index: usize,
        len: usize,
    },

    #[error("maker account for leg {index} has a null owner")]
    NullMakerAccountOwner { index: usize },

    #[error("collateral transfer has no amounts")]
    EmptyCollateralTransfers,

    #[error("collateral transfer from and to account are both #{0}")]
    SameCollateralAccounts(AccountNumber),

    #[error("collateral transfer must involve trade account #{trade}")]
    TradeAccountNotInvolved { trade: AccountNumber },

    #[error("invalid collateral amount for market {market}: zero")]
    ZeroCollateralAmount { market: MarketId },

    #[error("full-balance collateral transfer of market {market} must move the output market out of the trade account")]
    InvalidFullBalanceTransfer { market: MarketId },
}

/// State the validator reads.
pub trait PathContext {
    /// Current block time.
    fn now(&self) -> Timestamp;

    /// Upper bound on the number of markets in a path.
    fn max_path_length(&self) -> usize;

    fn market(&self, id: MarketId) -> Option<&Market>;

    fn balance(&self, account: &Account, market: MarketId) -> SignedWei;

    /// Whether the factory behind `factory` trusts `converter`.
    fn is_trusted_converter(&self, factory: &Address, converter: &Address) -> bool;

    /// Whether the converter at `converter` accepts `token`. `false` when no
    /// converter is registered there.
    fn converter_accepts(&self, converter: &Address, token: &Address) -> bool;

    /// Whether the converter at `converter` produces `token`.
    fn converter_produces(&self, converter: &Address, token: &Address) -> bool;

    fn is_trusted_internal_trader(&self, trader: &Address) -> bool;
}

impl PathContext for MarginSystem {
    fn now(&self) -> Timestamp {
        MarginSystem::now(self)
    }

    fn max_path_length(&self) -> usize {
        self.config().max_path_length
    }

    fn market(&self, id: MarketId) -> Option<&Market> {
        self.ledger().market(id).ok()
    }

    fn balance(&self, account: &Account, market: MarketId) -> SignedWei {
        self.ledger().get_account_balance(account, market)
    }

    fn is_trusted_converter(&self, factory: &Address, converter: &Address) -> bool {
        self.factory(factory)
            .map(|f| f.is_token_converter_trusted(converter))
            .unwrap_or(false)
    }

    fn converter_accepts(&self, converter: &Address, token: &Address) -> bool {
        self.converter(converter)
            .map(|c| c.is_valid_input_token(token))
            .unwrap_or(false)
    }

    fn converter_produces(&self, converter: &Address, token: &Address) -> bool {
        self.converter(converter)
            .map(|c| c.is_valid_output_token(token))
            .unwrap_or(false)
    }

    fn is_trusted_internal_trader(&self, trader: &Address) -> bool {
        MarginSystem::is_trusted_internal_trader(self, trader)
    }
}

/// One checked leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLeg {
    pub input_market: MarketId,
    pub output_market: MarketId,
    pub trader: TraderParam,
}

/// A path that passed every check, with the input amount resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    pub input_market: MarketId,
    pub output_market: MarketId,
    pub input_amount: Wei,
    pub legs: Vec<ValidatedLeg>,
}

/// Validates `path` for `trade_account`.
pub fn validate_trade_path<C: PathContext + ?Sized>(
    ctx: &C,
    trade_account: &Account,
    path: &TradePath,
) -> Result<ValidatedPath, PathError> {
    let now = ctx.now();
    if now > path.user_config.deadline {
        return Err(PathError::DeadlineExpired {
            deadline: path.user_config.deadline,
            now,
        });
    }

    validate_path_shape(ctx, path)?;
    let input_amount = resolve_input_amount(ctx, trade_account, path)?;

    let markets = &path.market_ids_path;
    let last_leg = path.traders_path.len() - 1;
    for (index, trader) in path.traders_path.iter().enumerate() {
        validate_leg(ctx, index, last_leg, markets[index], markets[index + 1], trader)?;
    }
    for (index, trader) in path.traders_path.iter().enumerate() {
        validate_maker_account(index, trader, &path.maker_accounts)?;
    }

    let legs = path
        .traders_path
        .iter()
        .enumerate()
        .map(|(i, trader)| ValidatedLeg {
            input_market: markets[i],
            output_market: markets[i + 1],
            trader: trader.clone(),
        })
        .collect();

    Ok(ValidatedPath {
        input_market: markets[0],
        output_market: markets[markets.len() - 1],
        input_amount,
        legs,
    })
}

fn validate_path_shape<C: PathContext + ?Sized>(ctx: &C, path: &TradePath) -> Result<(), PathError> {
    let markets = &path.market_ids_path;
    let len = markets.len();
    let max = ctx.max_path_length();
    if len < MIN_PATH_LENGTH || len > max {
        return Err(PathError::InvalidMarketPathLength {
            len,
            min: MIN_PATH_LENGTH,
            max,
        });
    }
    if path.traders_path.len() != len - 1 {
        return Err(PathError::InvalidTradersPathLength {
            expected: len - 1,
            actual: path.traders_path.len(),
        });
    }
    for (index, pair) in markets.windows(2).enumerate() {
        if pair[0] == pair[1] {
            return Err(PathError::DuplicateConsecutiveMarket {
                index: index + 1,
                market: pair[1],
            });
        }
    }
    if markets[0] == markets[len - 1] {
        return Err(PathError::SameInputOutputMarket(markets[0]));
    }
    if let Some(unknown) = markets.iter().find(|m| ctx.market(**m).is_none()) {
        return Err(PathError::UnknownMarket(*unknown));
    }
    Ok(())
}

fn resolve_input_amount<C: PathContext + ?Sized>(
    ctx: &C,
    trade_account: &Account,
    path: &TradePath,
) -> Result<Wei, PathError> {
    if path.input_amount == 0 {
        return Err(PathError::ZeroInputAmount);
    }
    let input_amount = if path.input_amount == MAX_AMOUNT_SENTINEL {
        let market = path.market_ids_path[0];
        let balance = ctx.balance(trade_account, market);
        if balance <= 0 {
            return Err(PathError::NoPositiveInputBalance { market });
        }
        balance as Wei
    } else {
        path.input_amount
    };
    if path.min_output_amount == 0 {
        return Err(PathError::ZeroMinOutputAmount);
    }
    Ok(input_amount)
}

fn validate_leg<C: PathContext + ?Sized>(
    ctx: &C,
    index: usize,
    last_leg: usize,
    input_market: MarketId,
    output_market: MarketId,
    param: &TraderParam,
) -> Result<(), PathError> {
    if param.trader.is_zero() {
        return Err(PathError::NullTrader { index });
    }
    if param.trader_type == TraderType::IsolationModeWrapper && index != last_leg {
        return Err(PathError::WrapperMustBeLast { index });
    }

    let input = ctx
        .market(input_market)
        .ok_or(PathError::UnknownMarket(input_market))?;
    let output = ctx
        .market(output_market)
        .ok_or(PathError::UnknownMarket(output_market))?;

    let require_type = |expected: TraderType, label: &'static str| {
        if param.trader_type == expected {
            Ok(())
        } else {
            Err(PathError::InvalidTraderType {
                index,
                expected: label,
                actual: param.trader_type,
            })
        }
    };

    match (input.is_isolation_mode, output.is_isolation_mode) {
        (true, output_is_isolation) => {
            require_type(TraderType::IsolationModeUnwrapper, "IsolationModeUnwrapper")?;
            if output_is_isolation && index != last_leg {
                return Err(PathError::IsolationHandoffMustBeLast { index });
            }
            validate_converter(ctx, index, &param.trader, &input.token, &input.token, &output.token)
        }
        (false, true) => {
            require_type(TraderType::IsolationModeWrapper, "IsolationModeWrapper")?;
            validate_converter(ctx, index, &param.trader, &output.token, &input.token, &output.token)
        }
        (false, false) => match param.trader_type {
            TraderType::ExternalLiquidity => Ok(()),
            TraderType::InternalLiquidity => {
                if ctx.is_trusted_internal_trader(&param.trader) {
                    Ok(())
                } else {
                    Err(PathError::UntrustedInternalTrader {
                        index,
                        trader: param.trader,
                    })
                }
            }
            other => Err(PathError::InvalidTraderType {
                index,
                expected: "ExternalLiquidity or InternalLiquidity",
                actual: other,
            }),
        },
    }
}

fn validate_converter<C: PathContext + ?Sized>(
    ctx: &C,
    index: usize,
    converter: &Address,
    factory: &Address,
    input_token: &Address,
    output_token: &Address,
) -> Result<(), PathError> {
    if !ctx.is_trusted_converter(factory, converter) {
        return Err(PathError::UntrustedConverter {
            index,
            converter: *converter,
            factory: *factory,
        });
    }
    if !ctx.converter_accepts(converter, input_token) {
        return Err(PathError::UnsupportedInputToken {
            index,
            converter: *converter,
            token: *input_token,
        });
    }
    if !ctx.converter_produces(converter, output_token) {
        return Err(PathError::UnsupportedOutputToken {
            index,
            converter: *converter,
            token: *output_token,
        });
    }
    Ok(())
}

fn validate_maker_account(
    index: usize,
    param: &TraderParam,
    maker_accounts: &[Account],
) -> Result<(), PathError> {
    let maker_account_index = param.maker_account_index;
    if param.trader_type != TraderType::InternalLiquidity {
        if maker_account_index != 0 {
            return Err(PathError::InvalidMakerAccountIndex {
                index,
                maker_account_index,
            });
        }
        return Ok(());
    }
    let maker = maker_accounts
        .get(maker_account_index)
        .ok_or(PathError::MakerAccountOutOfBounds {
            index,
            maker_account_index,
            len: maker_accounts.len(),
        })?;
    if maker.has_null_owner() {
        return Err(PathError::NullMakerAccountOwner { index });
    }
    Ok(())
}

/// Checks the collateral movements of a position-modifying swap.
pub fn validate_collateral_transfer(
    trade_account_number: AccountNumber,
    output_market: MarketId,
    params: &TransferCollateralParams,
) -> Result<(), PathError> {
    if params.transfer_amounts.is_empty() {
        return Err(PathError::EmptyCollateralTransfers);
    }
    if params.from_account_number == params.to_account_number {
        return Err(PathError::SameCollateralAccounts(params.from_account_number));
    }
    if params.from_account_number != trade_account_number
        && params.to_account_number != trade_account_number
    {
        return Err(PathError::TradeAccountNotInvolved {
            trade: trade_account_number,
        });
    }
    for transfer in &params.transfer_amounts {
        if transfer.amount_wei == 0 {
            return Err(PathError::ZeroCollateralAmount {
                market: transfer.market_id,
            });
        }
        if transfer.amount_wei == MAX_AMOUNT_SENTINEL
            && (transfer.market_id != output_market
                || params.from_account_number != trade_account_number)
        {
            return Err(PathError::InvalidFullBalanceTransfer {
                market: transfer.market_id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic_trader::types::{TransferAmount, UserConfig};
    use std::collections::{BTreeMap, BTreeSet};

    /// In-memory context: markets 0 and 1 ordinary, 2 isolation (factory
    /// "iso"), 3 ordinary, 4 isolation (factory "iso2").
    struct Ctx {
        now: Timestamp,
        markets: Vec<Market>,
        balances: BTreeMap<(Account, MarketId), SignedWei>,
        trusted: BTreeSet<(Address, Address)>,
        accepts: BTreeSet<(Address, Address)>,
        produces: BTreeSet<(Address, Address)>,
        internal: BTreeSet<Address>,
    }

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn ctx() -> Ctx {
        let market = |id, label: &str, iso| Market {
            id,
            token: addr(label),
            is_isolation_mode: iso,
            allows_borrowing: !iso,
        };
        let mut c = Ctx {
            now: 1_000,
            markets: vec![
                market(0, "usdc", false),
                market(1, "weth", false),
                market(2, "iso", true),
                market(3, "dai", false),
                market(4, "iso2", true),
            ],
            balances: BTreeMap::new(),
            trusted: BTreeSet::new(),
            accepts: BTreeSet::new(),
            produces: BTreeSet::new(),
            internal: BTreeSet::new(),
        };
        c.trusted.insert((addr("iso"), addr("wrapper")));
        c.trusted.insert((addr("iso"), addr("unwrapper")));
        c.accepts.insert((addr("wrapper"), addr("usdc")));
        c.produces.insert((addr("wrapper"), addr("iso")));
        c.accepts.insert((addr("unwrapper"), addr("iso")));
        c.produces.insert((addr("unwrapper"), addr("usdc")));
        c.trusted.insert((addr("iso"), addr("iso-to-iso2")));
        c.accepts.insert((addr("iso-to-iso2"), addr("iso")));
        c.produces.insert((addr("iso-to-iso2"), addr("iso2")));
        c.internal.insert(addr("amm"));
        c
    }

    impl PathContext for Ctx {
        fn now(&self) -> Timestamp {
            self.now
        }
        fn max_path_length(&self) -> usize {
            4
        }
        fn market(&self, id: MarketId) -> Option<&Market> {
            self.markets.get(id as usize)
        }
        fn balance(&self, account: &Account, market: MarketId) -> SignedWei {
            self.balances.get(&(*account, market)).copied().unwrap_or(0)
        }
        fn is_trusted_converter(&self, factory: &Address, converter: &Address) -> bool {
            self.trusted.contains(&(*factory, *converter))
        }
        fn converter_accepts(&self, converter: &Address, token: &Address) -> bool {
            self.accepts.contains(&(*converter, *token))
        }
        fn converter_produces(&self, converter: &Address, token: &Address) -> bool {
            self.produces.contains(&(*converter, *token))
        }
        fn is_trusted_internal_trader(&self, trader: &Address) -> bool {
            self.internal.contains(trader)
        }
    }

    fn trade_account() -> Account {
        Account::default_of(addr("alice"))
    }

    fn path(markets: Vec<MarketId>, traders: Vec<TraderParam>) -> TradePath {
        TradePath {
            market_ids_path: markets,
            traders_path: traders,
            input_amount: 100,
            min_output_amount: 1,
            maker_accounts: vec![],
            user_config: UserConfig::with_deadline(2_000),
        }
    }

    fn external() -> TraderParam {
        TraderParam::new(addr("dex"), TraderType::ExternalLiquidity)
    }

    #[test]
    fn simple_external_path_passes() {
        let validated =
            validate_trade_path(&ctx(), &trade_account(), &path(vec![0, 1], vec![external()]))
                .unwrap();
        assert_eq!(validated.input_amount, 100);
        assert_eq!(validated.legs.len(), 1);
        assert_eq!((validated.input_market, validated.output_market), (0, 1));
    }

    #[test]
    fn deadline_is_checked_first() {
        let mut p = path(vec![0], vec![]);
        p.user_config.deadline = 0;
        assert_eq!(
            validate_trade_path(&ctx(), &trade_account(), &p),
            Err(PathError::DeadlineExpired {
                deadline: 0,
                now: 1_000
            })
        );
    }

    #[test]
    fn deadline_equal_to_now_is_accepted() {
        let mut p = path(vec![0, 1], vec![external()]);
        p.user_config.deadline = 1_000;
        assert!(validate_trade_path(&ctx(), &trade_account(), &p).is_ok());
    }

    #[test]
    fn path_shape_rules() {
        let c = ctx();
        let a = trade_account();
        assert!(matches!(
            validate_trade_path(&c, &a, &path(vec![0], vec![])),
            Err(PathError::InvalidMarketPathLength { len: 1, .. })
        ));
        assert!(matches!(
            validate_trade_path(&c, &a, &path(vec![0, 1, 0, 1, 0], vec![external(); 4])),
            Err(PathError::InvalidMarketPathLength { len: 5, .. })
        ));
        assert_eq!(
            validate_trade_path(&c, &a, &path(vec![0, 1], vec![])),
            Err(PathError::InvalidTradersPathLength {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            validate_trade_path(&c, &a, &path(vec![0, 0, 1], vec![external(); 2])),
            Err(PathError::DuplicateConsecutiveMarket {
                index: 1,
                market: 0
            })
        );
        assert_eq!(
            validate_trade_path(&c, &a, &path(vec![0, 1, 0], vec![external(); 2])),
            Err(PathError::SameInputOutputMarket(0))
        );
        assert_eq!(
            validate_trade_path(&c, &a, &path(vec![0, 9], vec![external()])),
            Err(PathError::UnknownMarket(9))
        );
    }

    #[test]
    fn amount_rules() {
        let mut c = ctx();
        let a = trade_account();

        let mut p = path(vec![0, 1], vec![external()]);
        p.input_amount = 0;
        assert_eq!(validate_trade_path(&c, &a, &p), Err(PathError::ZeroInputAmount));

        p.input_amount = MAX_AMOUNT_SENTINEL;
        assert_eq!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::NoPositiveInputBalance { market: 0 })
        );
        c.balances.insert((a, 0), 42);
        assert_eq!(validate_trade_path(&c, &a, &p).unwrap().input_amount, 42);

        p.min_output_amount = 0;
        assert_eq!(validate_trade_path(&c, &a, &p), Err(PathError::ZeroMinOutputAmount));
    }

    #[test]
    fn wrapper_as_only_leg_passes() {
        let p = path(
            vec![0, 2],
            vec![TraderParam::new(addr("wrapper"), TraderType::IsolationModeWrapper)],
        );
        assert!(validate_trade_path(&ctx(), &trade_account(), &p).is_ok());
    }

    #[test]
    fn wrapper_must_be_last() {
        let p = path(
            vec![0, 2, 1],
            vec![
                TraderParam::new(addr("wrapper"), TraderType::IsolationModeWrapper),
                TraderParam::new(addr("unwrapper"), TraderType::IsolationModeUnwrapper),
            ],
        );
        let err = validate_trade_path(&ctx(), &trade_account(), &p).unwrap_err();
        assert_eq!(err, PathError::WrapperMustBeLast { index: 0 });
        assert!(err.to_string().contains("wrapper must be last trader"));
    }

    #[test]
    fn isolation_sequencing() {
        let c = ctx();
        let a = trade_account();

        // isolation input needs an unwrapper
        let err = validate_trade_path(&c, &a, &path(vec![2, 0], vec![external()])).unwrap_err();
        assert!(matches!(err, PathError::InvalidTraderType { index: 0, .. }));

        // isolation output needs a wrapper
        let err = validate_trade_path(&c, &a, &path(vec![0, 2], vec![external()])).unwrap_err();
        assert!(matches!(err, PathError::InvalidTraderType { index: 0, .. }));

        // converters cannot serve ordinary pairs
        let p = path(
            vec![0, 1],
            vec![TraderParam::new(addr("unwrapper"), TraderType::IsolationModeUnwrapper)],
        );
        assert!(matches!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::InvalidTraderType { .. })
        ));
    }

    #[test]
    fn unwrap_then_external_passes() {
        let p = path(
            vec![2, 0, 1],
            vec![
                TraderParam::new(addr("unwrapper"), TraderType::IsolationModeUnwrapper),
                external(),
            ],
        );
        assert!(validate_trade_path(&ctx(), &trade_account(), &p).is_ok());
    }

    #[test]
    fn unwrap_into_another_isolation_market() {
        let c = ctx();
        let a = trade_account();
        let handoff = TraderParam::new(addr("iso-to-iso2"), TraderType::IsolationModeUnwrapper);

        assert!(validate_trade_path(&c, &a, &path(vec![2, 4], vec![handoff.clone()])).is_ok());

        // the plain unwrapper does not list iso2 among its outputs
        let p = path(
            vec![2, 4],
            vec![TraderParam::new(addr("unwrapper"), TraderType::IsolationModeUnwrapper)],
        );
        assert_eq!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::UnsupportedOutputToken {
                index: 0,
                converter: addr("unwrapper"),
                token: addr("iso2"),
            })
        );

        let p = path(vec![2, 4, 0], vec![handoff, external()]);
        let err = validate_trade_path(&c, &a, &p).unwrap_err();
        assert_eq!(err, PathError::IsolationHandoffMustBeLast { index: 0 });
    }

    #[test]
    fn converter_trust_and_tokens() {
        let c = ctx();
        let a = trade_account();

        let p = path(
            vec![2, 0],
            vec![TraderParam::new(addr("rogue"), TraderType::IsolationModeUnwrapper)],
        );
        assert!(matches!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::UntrustedConverter { .. })
        ));

        // trusted unwrapper, but it does not produce DAI
        let p = path(
            vec![2, 3],
            vec![TraderParam::new(addr("unwrapper"), TraderType::IsolationModeUnwrapper)],
        );
        assert!(matches!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::UnsupportedOutputToken { .. })
        ));

        // trusted wrapper, but it does not accept WETH
        let p = path(
            vec![1, 2],
            vec![TraderParam::new(addr("wrapper"), TraderType::IsolationModeWrapper)],
        );
        assert!(matches!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::UnsupportedInputToken { .. })
        ));
    }

    #[test]
    fn null_trader_rejected() {
        let p = path(
            vec![0, 1],
            vec![TraderParam::new(Address::ZERO, TraderType::ExternalLiquidity)],
        );
        assert_eq!(
            validate_trade_path(&ctx(), &trade_account(), &p),
            Err(PathError::NullTrader { index: 0 })
        );
    }

    #[test]
    fn internal_liquidity_rules() {
        let c = ctx();
        let a = trade_account();

        let mut p = path(vec![0, 1], vec![TraderParam::internal(addr("shady"), 0)]);
        p.maker_accounts = vec![Account::default_of(addr("maker"))];
        assert!(matches!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::UntrustedInternalTrader { .. })
        ));

        let mut p = path(vec![0, 1], vec![TraderParam::internal(addr("amm"), 1)]);
        p.maker_accounts = vec![Account::default_of(addr("maker"))];
        assert_eq!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::MakerAccountOutOfBounds {
                index: 0,
                maker_account_index: 1,
                len: 1
            })
        );

        let mut p = path(vec![0, 1], vec![TraderParam::internal(addr("amm"), 0)]);
        p.maker_accounts = vec![Account::default_of(Address::ZERO)];
        assert_eq!(
            validate_trade_path(&c, &a, &p),
            Err(PathError::NullMakerAccountOwner { index: 0 })
        );

        p.maker_accounts = vec![Account::default_of(addr("maker"))];
        assert!(validate_trade_path(&c, &a, &p).is_ok());
    }

    #[test]
    fn external_needs_maker_index_zero() {
        let mut leg = external();
        leg.maker_account_index = 2;
        assert_eq!(
            validate_trade_path(&ctx(), &trade_account(), &path(vec![0, 1], vec![leg])),
            Err(PathError::InvalidMakerAccountIndex {
                index: 0,
                maker_account_index: 2
            })
        );
    }

    fn collateral(from: AccountNumber, to: AccountNumber, amounts: &[(MarketId, Wei)]) -> TransferCollateralParams {
        TransferCollateralParams {
            from_account_number: from,
            to_account_number: to,
            transfer_amounts: amounts
                .iter()
                .map(|(m, a)| TransferAmount {
                    market_id: *m,
                    amount_wei: *a,
                })
                .collect(),
        }
    }

    #[test]
    fn collateral_rules() {
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(0, 5, &[])),
            Err(PathError::EmptyCollateralTransfers)
        );
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(5, 5, &[(0, 1)])),
            Err(PathError::SameCollateralAccounts(5))
        );
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(0, 7, &[(0, 1)])),
            Err(PathError::TradeAccountNotInvolved { trade: 5 })
        );
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(0, 5, &[(0, 0)])),
            Err(PathError::ZeroCollateralAmount { market: 0 })
        );
        // the sentinel only for the output market, out of the trade account
        assert!(validate_collateral_transfer(5, 1, &collateral(5, 0, &[(1, MAX_AMOUNT_SENTINEL)])).is_ok());
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(5, 0, &[(0, MAX_AMOUNT_SENTINEL)])),
            Err(PathError::InvalidFullBalanceTransfer { market: 0 })
        );
        assert_eq!(
            validate_collateral_transfer(5, 1, &collateral(0, 5, &[(1, MAX_AMOUNT_SENTINEL)])),
            Err(PathError::InvalidFullBalanceTransfer { market: 1 })
        );
    }
}
