//! # Scenario Runner
//!
//! A scenario is a JSON document with an optional [`SystemConfig`] and a
//! list of steps. Steps name tokens, markets, factories and users by label;
//! every label maps to an address through [`Address::from_label`], and a
//! market is referred to by the label of the token (or factory) it was added
//! for.
//!
//! Each step runs against one [`MarginSystem`]. A failing step is recorded in
//! the report and the run moves on to the next step; the system's own
//! atomicity guarantees the failed step left no trace.
//!
//! ```json
//! {
//!   "name": "open a vault",
//!   "steps": [
//!     { "op": "register_token", "token": "glp", "name": "GMX LP", "symbol": "GLP" },
//!     { "op": "mint", "token": "glp", "to": "alice", "amount": 500 },
//!     { "op": "add_isolation_market", "factory": "factory-glp", "underlying": "glp" },
//!     { "op": "initialize_factory", "factory": "factory-glp", "converters": [] },
//!     { "op": "create_vault_and_deposit", "owner": "alice", "factory": "factory-glp", "amount": 200 }
//!   ]
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use margin_contracts::generic_trader::{
    SwapParams, SwapReceipt, TradePath, TraderParam, TraderType, UserConfig,
};
use margin_contracts::isolation::StandardVault;
use margin_contracts::traders::{
    FixedRateAutoTrader, FixedRateExchange, IsolationModeUnwrapper, IsolationModeWrapper, Rate,
};
use margin_contracts::{MarginSystem, SettlementError};
use margin_protocol::config::{SystemConfig, DEFAULT_DEADLINE_WINDOW_SECS, MAX_AMOUNT_SENTINEL};
use margin_protocol::ledger::{Action, BalanceCheckFlag};
use margin_protocol::{Account, AccountNumber, Address, AssetAmount, MarketId, Timestamp, Wei};

use crate::metrics::NodeMetrics;

/// Label of the vault implementation used by `add_isolation_market` when
/// the step names none.
pub const DEFAULT_IMPLEMENTATION_LABEL: &str = "standard-vault";

// ---------------------------------------------------------------------------
// Scenario file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Option<SystemConfig>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid scenario document")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// One exchange quote.
#[derive(Debug, Clone, Deserialize)]
pub struct PairRate {
    pub input: String,
    pub output: String,
    pub rate: Rate,
}

/// One leg of a swap step.
#[derive(Debug, Clone, Deserialize)]
pub struct LegSpec {
    pub trader: String,
    #[serde(rename = "type")]
    pub trader_type: TraderType,
    #[serde(default)]
    pub maker_account_index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountSpec {
    pub owner: String,
    #[serde(default)]
    pub number: AccountNumber,
}

fn one() -> Rate {
    Rate::one()
}

fn yes() -> bool {
    true
}

fn default_decimals() -> u8 {
    18
}

/// A scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    RegisterToken {
        token: String,
        name: String,
        symbol: String,
        #[serde(default = "default_decimals")]
        decimals: u8,
    },
    Mint {
        token: String,
        to: String,
        amount: Wei,
    },
    AddMarket {
        token: String,
        #[serde(default = "yes")]
        allows_borrowing: bool,
    },
    /// Deploys a factory for `underlying`. The market is then known by the
    /// factory's label.
    AddIsolationMarket {
        factory: String,
        underlying: String,
        #[serde(default)]
        implementation: Option<String>,
    },
    RegisterWrapper {
        address: String,
        factory: String,
        accepts: Vec<String>,
        #[serde(default = "one")]
        rate: Rate,
    },
    RegisterUnwrapper {
        address: String,
        factory: String,
        produces: Vec<String>,
        #[serde(default = "one")]
        rate: Rate,
    },
    InitializeFactory {
        factory: String,
        converters: Vec<String>,
    },
    SetConverterTrusted {
        factory: String,
        converter: String,
        trusted: bool,
    },
    RegisterExchange {
        address: String,
        rates: Vec<PairRate>,
    },
    /// Registers a fixed-rate auto trader quoting market pairs.
    RegisterAutoTrader {
        address: String,
        rates: Vec<PairRate>,
        #[serde(default = "yes")]
        trusted: bool,
    },
    SetOperator {
        owner: String,
        operator: String,
        #[serde(default = "yes")]
        approved: bool,
    },
    /// Ledger deposit from the owner's wallet; approves the ledger first.
    Deposit {
        owner: String,
        #[serde(default)]
        account: AccountNumber,
        market: String,
        amount: Wei,
    },
    /// Ledger withdrawal to the owner's wallet. Omitting `amount` withdraws
    /// the whole positive balance.
    Withdraw {
        owner: String,
        #[serde(default)]
        account: AccountNumber,
        market: String,
        #[serde(default)]
        amount: Option<Wei>,
    },
    CreateVault {
        owner: String,
        factory: String,
    },
    /// Approves the predicted vault address, then creates and funds it.
    CreateVaultAndDeposit {
        owner: String,
        factory: String,
        #[serde(default)]
        account: AccountNumber,
        amount: Wei,
    },
    VaultDeposit {
        owner: String,
        factory: String,
        #[serde(default)]
        account: AccountNumber,
        amount: Wei,
    },
    VaultWithdraw {
        owner: String,
        factory: String,
        #[serde(default)]
        account: AccountNumber,
        amount: Wei,
    },
    /// A generic trader swap. With `vault` set to a factory label, the trade
    /// account belongs to the caller's vault in that factory. Omitting
    /// `input_amount` spends the whole positive balance. `deadline` defaults
    /// to a short window after the current time.
    Swap {
        caller: String,
        #[serde(default)]
        vault: Option<String>,
        #[serde(default)]
        account: AccountNumber,
        markets: Vec<String>,
        legs: Vec<LegSpec>,
        #[serde(default)]
        input_amount: Option<Wei>,
        min_output_amount: Wei,
        #[serde(default)]
        makers: Vec<AccountSpec>,
        #[serde(default)]
        deadline: Option<Timestamp>,
        #[serde(default)]
        balance_check: BalanceCheckFlag,
    },
    /// Reads the factory's queue at `cursor`, or at its current cursor.
    QueuedTransfer {
        factory: String,
        #[serde(default)]
        cursor: Option<u64>,
    },
    AdvanceTime {
        seconds: i64,
    },
    Balance {
        owner: String,
        #[serde(default)]
        account: AccountNumber,
        market: String,
    },
    /// Balance of a vault's account, located by owner and factory.
    VaultBalance {
        owner: String,
        factory: String,
        #[serde(default)]
        account: AccountNumber,
        market: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::RegisterToken { .. } => "register_token",
            Step::Mint { .. } => "mint",
            Step::AddMarket { .. } => "add_market",
            Step::AddIsolationMarket { .. } => "add_isolation_market",
            Step::RegisterWrapper { .. } => "register_wrapper",
            Step::RegisterUnwrapper { .. } => "register_unwrapper",
            Step::InitializeFactory { .. } => "initialize_factory",
            Step::SetConverterTrusted { .. } => "set_converter_trusted",
            Step::RegisterExchange { .. } => "register_exchange",
            Step::RegisterAutoTrader { .. } => "register_auto_trader",
            Step::SetOperator { .. } => "set_operator",
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::CreateVault { .. } => "create_vault",
            Step::CreateVaultAndDeposit { .. } => "create_vault_and_deposit",
            Step::VaultDeposit { .. } => "vault_deposit",
            Step::VaultWithdraw { .. } => "vault_withdraw",
            Step::Swap { .. } => "swap",
            Step::QueuedTransfer { .. } => "queued_transfer",
            Step::AdvanceTime { .. } => "advance_time",
            Step::Balance { .. } => "balance",
            Step::VaultBalance { .. } => "vault_balance",
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { detail: String },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Ok { detail } => write!(f, "[{:>3}] ok     {:<26} {}", self.index, self.op, detail),
            Outcome::Failed { kind, error } => {
                write!(f, "[{:>3}] FAILED {:<26} ({}) {}", self.index, self.op, kind, error)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub events_recorded: usize,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Failed { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct ScenarioRunner {
    sys: MarginSystem,
    markets: BTreeMap<String, MarketId>,
    implementations: BTreeSet<Address>,
    metrics: NodeMetrics,
}

/// Classifies a failed step for the report and the metrics label.
fn failure_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<SettlementError>()
        .map(|e| e.kind().as_str())
        .unwrap_or("scenario")
}

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

impl ScenarioRunner {
    pub fn new(config: SystemConfig, metrics: NodeMetrics) -> Self {
        Self {
            sys: MarginSystem::new(config),
            markets: BTreeMap::new(),
            implementations: BTreeSet::new(),
            metrics,
        }
    }

    pub fn system(&self) -> &MarginSystem {
        &self.sys
    }

    pub fn market(&self, label: &str) -> Result<MarketId> {
        self.markets
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("no market was added for {label:?}"))
    }

    /// Runs every step of `scenario` in order.
    pub fn run(&mut self, scenario: &Scenario) -> RunReport {
        let started_at = Utc::now();
        info!(
            name = scenario.name.as_deref().unwrap_or("unnamed"),
            steps = scenario.steps.len(),
            "scenario started"
        );

        let steps = scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.run_step(index, step))
            .collect::<Vec<_>>();

        let report = RunReport {
            name: scenario.name.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
            events_recorded: self.sys.events().len(),
        };
        info!(
            steps = report.steps.len(),
            failures = report.failures(),
            events = report.events_recorded,
            "scenario finished"
        );
        report
    }

    fn run_step(&mut self, index: usize, step: &Step) -> StepReport {
        let op = step.name();
        let events_before = self.sys.events().len();

        let outcome = match self.apply(step) {
            Ok(detail) => {
                debug!(index, op, %detail, "step ok");
                Outcome::Ok { detail }
            }
            Err(err) => {
                let kind = failure_kind(&err);
                warn!(index, op, kind, error = %format!("{err:#}"), "step failed");
                self.metrics.step_failed(kind);
                if matches!(step, Step::Swap { .. }) {
                    self.metrics.swap_rejected(kind);
                }
                Outcome::Failed {
                    kind: kind.to_string(),
                    error: format!("{err:#}"),
                }
            }
        };

        let new_events = self.sys.events()[events_before..].iter().map(|r| &r.event);
        self.metrics.observe_events(new_events);

        StepReport { index, op, outcome }
    }

    fn apply(&mut self, step: &Step) -> Result<String> {
        let gov = self.sys.governance();
        match step {
            Step::RegisterToken {
                token,
                name,
                symbol,
                decimals,
            } => {
                self.sys
                    .tokens_mut()
                    .register(addr(token), name, symbol, *decimals, gov)?;
                Ok(format!("{symbol} at {}", addr(token)))
            }

            Step::Mint { token, to, amount } => {
                self.sys
                    .tokens_mut()
                    .mint(&addr(token), &gov, &addr(to), *amount)?;
                Ok(format!("{amount} {token} to {to}"))
            }

            Step::AddMarket {
                token,
                allows_borrowing,
            } => {
                let id = self.sys.add_market(gov, addr(token), *allows_borrowing)?;
                self.markets.insert(token.clone(), id);
                Ok(format!("market {id} for {token}"))
            }

            Step::AddIsolationMarket {
                factory,
                underlying,
                implementation,
            } => {
                let implementation =
                    addr(implementation.as_deref().unwrap_or(DEFAULT_IMPLEMENTATION_LABEL));
                if self.implementations.insert(implementation) {
                    self.sys
                        .register_vault_implementation(gov, implementation, StandardVault::new())?;
                }
                let id = self.sys.add_isolation_market(
                    gov,
                    addr(factory),
                    addr(underlying),
                    implementation,
                )?;
                self.markets.insert(factory.clone(), id);
                Ok(format!("isolation market {id} for {underlying} via {factory}"))
            }

            Step::RegisterWrapper {
                address,
                factory,
                accepts,
                rate,
            } => {
                let rate = Rate::new(rate.numerator, rate.denominator)?;
                let wrapper = accepts.iter().fold(
                    IsolationModeWrapper::new(addr(address), addr(factory), rate),
                    |w, token| w.accepting(addr(token)),
                );
                self.sys.register_converter(gov, addr(address), wrapper)?;
                Ok(format!("{address} wraps into {factory}"))
            }

            Step::RegisterUnwrapper {
                address,
                factory,
                produces,
                rate,
            } => {
                let rate = Rate::new(rate.numerator, rate.denominator)?;
                let unwrapper = produces.iter().fold(
                    IsolationModeUnwrapper::new(addr(address), addr(factory), rate),
                    |u, token| u.producing(addr(token)),
                );
                self.sys.register_converter(gov, addr(address), unwrapper)?;
                Ok(format!("{address} unwraps out of {factory}"))
            }

            Step::InitializeFactory {
                factory,
                converters,
            } => {
                let converters: Vec<Address> = converters.iter().map(|c| addr(c)).collect();
                self.sys
                    .initialize_vault_factory(gov, addr(factory), &converters)?;
                Ok(format!("{factory} trusts {} converter(s)", converters.len()))
            }

            Step::SetConverterTrusted {
                factory,
                converter,
                trusted,
            } => {
                self.sys.set_is_token_converter_trusted(
                    gov,
                    addr(factory),
                    addr(converter),
                    *trusted,
                )?;
                Ok(format!("{converter} trusted={trusted} by {factory}"))
            }

            Step::RegisterExchange { address, rates } => {
                let mut exchange = FixedRateExchange::new(addr(address));
                for quote in rates {
                    let rate = Rate::new(quote.rate.numerator, quote.rate.denominator)?;
                    exchange = exchange.with_rate(addr(&quote.input), addr(&quote.output), rate);
                }
                self.sys
                    .register_exchange_wrapper(gov, addr(address), exchange)?;
                Ok(format!("{address} quotes {} pair(s)", rates.len()))
            }

            Step::RegisterAutoTrader {
                address,
                rates,
                trusted,
            } => {
                let mut trader = FixedRateAutoTrader::new(addr(address));
                for quote in rates {
                    let rate = Rate::new(quote.rate.numerator, quote.rate.denominator)?;
                    trader = trader.with_rate(
                        self.market(&quote.input)?,
                        self.market(&quote.output)?,
                        rate,
                    );
                }
                self.sys.register_auto_trader(gov, addr(address), trader)?;
                self.sys
                    .set_trusted_internal_trader(gov, addr(address), *trusted)?;
                Ok(format!("{address} quotes {} pair(s), trusted={trusted}", rates.len()))
            }

            Step::SetOperator {
                owner,
                operator,
                approved,
            } => {
                self.sys.set_operator(addr(owner), addr(operator), *approved);
                Ok(format!("{operator} operator of {owner}: {approved}"))
            }

            Step::Deposit {
                owner,
                account,
                market,
                amount,
            } => {
                let market_id = self.market(market)?;
                let owner_addr = addr(owner);
                let token = self.sys.ledger().market_token(market_id)?;
                let ledger = self.sys.ledger_address();
                self.sys
                    .tokens_mut()
                    .approve(&token, &owner_addr, &ledger, *amount)?;
                self.sys.operate(
                    owner_addr,
                    &[Account::new(owner_addr, *account)],
                    &[Action::Deposit {
                        account: 0,
                        market: market_id,
                        amount: *amount,
                        from: owner_addr,
                    }],
                )?;
                Ok(format!("{amount} {market} into {owner}#{account}"))
            }

            Step::Withdraw {
                owner,
                account,
                market,
                amount,
            } => {
                let market_id = self.market(market)?;
                let owner_addr = addr(owner);
                let amount = amount.map(AssetAmount::Wei).unwrap_or(AssetAmount::All);
                self.sys.operate(
                    owner_addr,
                    &[Account::new(owner_addr, *account)],
                    &[Action::Withdraw {
                        account: 0,
                        market: market_id,
                        amount,
                        to: owner_addr,
                    }],
                )?;
                Ok(format!("{market} out of {owner}#{account}"))
            }

            Step::CreateVault { owner, factory } => {
                let vault = self.sys.create_vault(addr(factory), addr(owner))?;
                Ok(format!("vault {vault} for {owner}"))
            }

            Step::CreateVaultAndDeposit {
                owner,
                factory,
                account,
                amount,
            } => {
                let (owner_addr, factory_addr) = (addr(owner), addr(factory));
                let underlying = self.sys.factory(&factory_addr)?.underlying_token();
                let predicted = self
                    .sys
                    .calculate_vault_by_account(&factory_addr, &owner_addr)?;
                self.sys
                    .tokens_mut()
                    .approve(&underlying, &owner_addr, &predicted, *amount)?;
                let vault = self.sys.create_vault_and_deposit(
                    owner_addr,
                    factory_addr,
                    *account,
                    *amount,
                )?;
                Ok(format!("vault {vault} for {owner} holding {amount}"))
            }

            Step::VaultDeposit {
                owner,
                factory,
                account,
                amount,
            } => {
                let owner_addr = addr(owner);
                let vault = self.vault_of(owner, factory)?;
                let underlying = self.sys.factory(&addr(factory))?.underlying_token();
                self.sys
                    .tokens_mut()
                    .approve(&underlying, &owner_addr, &vault, *amount)?;
                self.sys
                    .vault_deposit_into_vault(owner_addr, vault, *account, *amount)?;
                Ok(format!("{amount} into {vault}#{account}"))
            }

            Step::VaultWithdraw {
                owner,
                factory,
                account,
                amount,
            } => {
                let vault = self.vault_of(owner, factory)?;
                self.sys
                    .vault_withdraw_from_vault(addr(owner), vault, *account, *amount)?;
                Ok(format!("{amount} out of {vault}#{account}"))
            }

            Step::Swap {
                caller,
                vault,
                account,
                markets,
                legs,
                input_amount,
                min_output_amount,
                makers,
                deadline,
                balance_check,
            } => {
                let market_ids_path = markets
                    .iter()
                    .map(|m| self.market(m))
                    .collect::<Result<Vec<_>>>()?;
                let traders_path = legs
                    .iter()
                    .map(|leg| TraderParam {
                        maker_account_index: leg.maker_account_index,
                        ..TraderParam::new(addr(&leg.trader), leg.trader_type)
                    })
                    .collect();
                let mut user_config = UserConfig::with_deadline(
                    deadline.unwrap_or_else(|| self.sys.now() + DEFAULT_DEADLINE_WINDOW_SECS),
                );
                user_config.balance_check_flag = *balance_check;

                let params = SwapParams {
                    trade_account_number: *account,
                    path: TradePath {
                        market_ids_path,
                        traders_path,
                        input_amount: input_amount.unwrap_or(MAX_AMOUNT_SENTINEL),
                        min_output_amount: *min_output_amount,
                        maker_accounts: makers
                            .iter()
                            .map(|m| Account::new(addr(&m.owner), m.number))
                            .collect(),
                        user_config,
                    },
                };

                let receipt = match vault {
                    Some(factory) => {
                        let vault = self.vault_of(caller, factory)?;
                        self.sys
                            .vault_swap_exact_input_for_output(addr(caller), vault, params)?
                    }
                    None => self.sys.swap_exact_input_for_output(addr(caller), params)?,
                };
                Ok(describe_receipt(&receipt))
            }

            Step::QueuedTransfer { factory, cursor } => {
                let factory_addr = addr(factory);
                let cursor = match cursor {
                    Some(c) => *c,
                    None => self.sys.factory(&factory_addr)?.transfer_cursor(),
                };
                let transfer = self.sys.get_queued_transfer_by_cursor(&factory_addr, cursor)?;
                Ok(format!(
                    "#{cursor}: {} -> {} amount {} vault {} executed={}",
                    transfer.from, transfer.to, transfer.amount, transfer.vault, transfer.is_executed
                ))
            }

            Step::AdvanceTime { seconds } => {
                if *seconds < 0 {
                    bail!("time only moves forward (got {seconds}s)");
                }
                self.sys.advance_time(Duration::seconds(*seconds));
                Ok(format!("now {}", self.sys.clock().to_rfc3339()))
            }

            Step::Balance {
                owner,
                account,
                market,
            } => {
                let market_id = self.market(market)?;
                let balance = self
                    .sys
                    .ledger()
                    .get_account_balance(&Account::new(addr(owner), *account), market_id);
                Ok(format!("{owner}#{account} {market} = {balance}"))
            }

            Step::VaultBalance {
                owner,
                factory,
                account,
                market,
            } => {
                let market_id = self.market(market)?;
                let vault = self.vault_of(owner, factory)?;
                let balance = self
                    .sys
                    .ledger()
                    .get_account_balance(&Account::new(vault, *account), market_id);
                Ok(format!("{vault}#{account} {market} = {balance}"))
            }
        }
    }

    fn vault_of(&self, owner: &str, factory: &str) -> Result<Address> {
        self.sys
            .factory(&addr(factory))?
            .get_vault_by_account(&addr(owner))
            .ok_or_else(|| anyhow!("{owner} has no vault in {factory}"))
    }
}

fn describe_receipt(receipt: &SwapReceipt) -> String {
    format!(
        "{} spent {} of market {} for {} of market {} over {} leg(s)",
        receipt.trade_account,
        receipt.input_amount,
        receipt.input_market,
        receipt.output_amount,
        receipt.output_market,
        receipt.legs
    )
}
