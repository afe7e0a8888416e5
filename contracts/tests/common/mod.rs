//! Shared fixture for the integration tests.
//!
//! Builds a system with two ordinary markets (USDC, WETH), one isolation
//! market backed by GLP, a trusted wrapper/unwrapper pair for that market,
//! a fixed-rate external exchange and a trusted fixed-rate auto trader.

#![allow(dead_code)]

use margin_contracts::generic_trader::{
    SwapParams, TradePath, TraderParam, TraderType, UserConfig,
};
use margin_contracts::isolation::StandardVault;
use margin_contracts::traders::{
    FixedRateAutoTrader, FixedRateExchange, IsolationModeUnwrapper, IsolationModeWrapper, Rate,
};
use margin_contracts::MarginSystem;
use margin_protocol::ledger::Action;
use margin_protocol::{Account, AccountNumber, Address, MarketId, SignedWei, Wei};

pub const INVENTORY: Wei = 1_000_000;
pub const USER_FUNDS: Wei = 10_000;

pub struct Fixture {
    pub sys: MarginSystem,
    pub gov: Address,
    pub usdc: Address,
    pub weth: Address,
    pub glp: Address,
    pub usdc_market: MarketId,
    pub weth_market: MarketId,
    pub iso_market: MarketId,
    pub factory: Address,
    pub implementation: Address,
    pub wrapper: Address,
    pub unwrapper: Address,
    pub exchange: Address,
    pub amm: Address,
    pub alice: Address,
    pub bob: Address,
}

impl Fixture {
    pub fn new() -> Self {
        let mut sys = MarginSystem::default();
        let gov = sys.governance();
        let a = Address::from_label;

        let usdc = a("usdc");
        let weth = a("weth");
        let glp = a("glp");
        let factory = a("factory-glp");
        let implementation = a("standard-vault");
        let wrapper = a("glp-wrapper");
        let unwrapper = a("glp-unwrapper");
        let exchange = a("dex");
        let amm = a("amm");
        let alice = a("alice");
        let bob = a("bob");

        let tokens = sys.tokens_mut();
        tokens.register(usdc, "USD Coin", "USDC", 6, gov).unwrap();
        tokens.register(weth, "Wrapped Ether", "WETH", 18, gov).unwrap();
        tokens.register(glp, "GMX LP", "GLP", 18, gov).unwrap();

        let usdc_market = sys.add_market(gov, usdc, true).unwrap();
        let weth_market = sys.add_market(gov, weth, true).unwrap();

        sys.register_vault_implementation(gov, implementation, StandardVault::new())
            .unwrap();
        let iso_market = sys
            .add_isolation_market(gov, factory, glp, implementation)
            .unwrap();

        sys.register_converter(
            gov,
            wrapper,
            IsolationModeWrapper::new(wrapper, factory, Rate::one()).accepting(usdc),
        )
        .unwrap();
        sys.register_converter(
            gov,
            unwrapper,
            IsolationModeUnwrapper::new(unwrapper, factory, Rate::one()).producing(usdc),
        )
        .unwrap();
        sys.initialize_vault_factory(gov, factory, &[wrapper, unwrapper])
            .unwrap();

        sys.register_exchange_wrapper(
            gov,
            exchange,
            FixedRateExchange::new(exchange)
                .with_rate(usdc, weth, Rate::new(1, 2).unwrap())
                .with_rate(weth, usdc, Rate::new(2, 1).unwrap()),
        )
        .unwrap();
        sys.register_auto_trader(
            gov,
            amm,
            FixedRateAutoTrader::new(amm).with_rate(usdc_market, weth_market, Rate::new(1, 2).unwrap()),
        )
        .unwrap();
        sys.set_trusted_internal_trader(gov, amm, true).unwrap();

        let tokens = sys.tokens_mut();
        tokens.mint(&usdc, &gov, &exchange, INVENTORY).unwrap();
        tokens.mint(&weth, &gov, &exchange, INVENTORY).unwrap();
        tokens.mint(&glp, &gov, &wrapper, INVENTORY).unwrap();
        tokens.mint(&usdc, &gov, &unwrapper, INVENTORY).unwrap();
        for user in [alice, bob] {
            tokens.mint(&usdc, &gov, &user, USER_FUNDS).unwrap();
            tokens.mint(&weth, &gov, &user, USER_FUNDS).unwrap();
            tokens.mint(&glp, &gov, &user, USER_FUNDS).unwrap();
        }

        Self {
            sys,
            gov,
            usdc,
            weth,
            glp,
            usdc_market,
            weth_market,
            iso_market,
            factory,
            implementation,
            wrapper,
            unwrapper,
            exchange,
            amm,
            alice,
            bob,
        }
    }

    /// Ledger deposit of an ordinary token from `owner`'s wallet.
    pub fn deposit(&mut self, owner: Address, number: AccountNumber, market: MarketId, amount: Wei) {
        let token = self.sys.ledger().market_token(market).unwrap();
        let ledger = self.sys.ledger_address();
        self.sys
            .tokens_mut()
            .approve(&token, &owner, &ledger, amount)
            .unwrap();
        self.sys
            .operate(
                owner,
                &[Account::new(owner, number)],
                &[Action::Deposit {
                    account: 0,
                    market,
                    amount,
                    from: owner,
                }],
            )
            .unwrap();
    }

    /// Creates `owner`'s vault with `amount` of GLP in vault account 0.
    pub fn funded_vault(&mut self, owner: Address, amount: Wei) -> Address {
        let predicted = self
            .sys
            .calculate_vault_by_account(&self.factory, &owner)
            .unwrap();
        self.sys
            .tokens_mut()
            .approve(&self.glp, &owner, &predicted, amount)
            .unwrap();
        self.sys
            .create_vault_and_deposit(owner, self.factory, 0, amount)
            .unwrap()
    }

    /// Gives `owner`'s vault `amount` USDC in vault account `number`.
    pub fn fund_vault_with_usdc(&mut self, owner: Address, vault: Address, number: AccountNumber, amount: Wei) {
        self.sys
            .tokens_mut()
            .approve(&self.usdc, &owner, &self.factory, amount)
            .unwrap();
        self.sys
            .vault_deposit_other_token_into_dolomite_margin(owner, vault, number, self.usdc_market, amount)
            .unwrap();
    }

    /// Bob lends WETH to the auto trader's maker account.
    pub fn seed_maker(&mut self, amount: Wei) -> Account {
        let bob = self.bob;
        self.deposit(bob, 0, self.weth_market, amount);
        self.sys.set_operator(bob, self.amm, true);
        Account::default_of(bob)
    }

    pub fn balance(&self, owner: Address, number: AccountNumber, market: MarketId) -> SignedWei {
        self.sys
            .ledger()
            .get_account_balance(&Account::new(owner, number), market)
    }

    pub fn wallet(&self, token: Address, holder: Address) -> Wei {
        self.sys.tokens().balance_of(&token, &holder)
    }

    pub fn deadline(&self) -> u64 {
        self.sys.now() + 300
    }

    pub fn path(&self, markets: Vec<MarketId>, traders: Vec<TraderParam>, input: Wei, min_output: Wei) -> TradePath {
        TradePath {
            market_ids_path: markets,
            traders_path: traders,
            input_amount: input,
            min_output_amount: min_output,
            maker_accounts: vec![],
            user_config: UserConfig::with_deadline(self.deadline()),
        }
    }

    pub fn swap(&self, account: AccountNumber, path: TradePath) -> SwapParams {
        SwapParams {
            trade_account_number: account,
            path,
        }
    }

    pub fn external(&self) -> TraderParam {
        TraderParam::new(self.exchange, TraderType::ExternalLiquidity)
    }

    pub fn wrap(&self) -> TraderParam {
        TraderParam::new(self.wrapper, TraderType::IsolationModeWrapper)
    }

    pub fn unwrap_leg(&self) -> TraderParam {
        TraderParam::new(self.unwrapper, TraderType::IsolationModeUnwrapper)
    }
}
