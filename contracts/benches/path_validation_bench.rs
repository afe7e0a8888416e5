// Generic trader benchmarks.
//
// Covers trade path validation for growing path lengths and a full
// single-leg external swap settled through the ledger.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use margin_contracts::generic_trader::{
    validate_trade_path, SwapParams, TradePath, TraderParam, TraderType, UserConfig,
};
use margin_contracts::traders::{FixedRateExchange, Rate};
use margin_contracts::MarginSystem;
use margin_protocol::ledger::Action;
use margin_protocol::{Account, Address, MarketId};

struct Setup {
    sys: MarginSystem,
    markets: Vec<MarketId>,
    dex: Address,
    trader: Address,
}

/// A system with `n` ordinary markets and one exchange quoting every pair
/// at 1:1, with `trader` holding a deposit in market 0.
fn setup(n: usize) -> Setup {
    let mut sys = MarginSystem::default();
    let gov = sys.governance();
    let dex = Address::from_label("bench-dex");
    let trader = Address::from_label("bench-trader");

    let tokens: Vec<Address> = (0..n)
        .map(|i| Address::from_label(&format!("token-{i}")))
        .collect();
    let mut markets = Vec::with_capacity(n);
    let mut exchange = FixedRateExchange::new(dex);
    for (i, token) in tokens.iter().enumerate() {
        sys.tokens_mut()
            .register(*token, &format!("Token {i}"), &format!("TK{i}"), 18, gov)
            .expect("register token");
        sys.tokens_mut()
            .mint(token, &gov, &dex, u64::MAX as u128)
            .expect("mint inventory");
        markets.push(sys.add_market(gov, *token, true).expect("add market"));
        for other in &tokens {
            if other != token {
                exchange = exchange.with_rate(*token, *other, Rate::one());
            }
        }
    }
    sys.register_exchange_wrapper(gov, dex, exchange)
        .expect("register exchange");

    let ledger = sys.ledger_address();
    sys.tokens_mut()
        .mint(&tokens[0], &gov, &trader, u64::MAX as u128)
        .expect("mint trader funds");
    sys.tokens_mut()
        .approve(&tokens[0], &trader, &ledger, u64::MAX as u128)
        .expect("approve ledger");
    sys.operate(
        trader,
        &[Account::default_of(trader)],
        &[Action::Deposit {
            account: 0,
            market: markets[0],
            amount: u64::MAX as u128,
            from: trader,
        }],
    )
    .expect("deposit");

    Setup {
        sys,
        markets,
        dex,
        trader,
    }
}

fn path(setup: &Setup, len: usize) -> TradePath {
    TradePath {
        market_ids_path: setup.markets[..len].to_vec(),
        traders_path: vec![TraderParam::new(setup.dex, TraderType::ExternalLiquidity); len - 1],
        input_amount: 1_000,
        min_output_amount: 1,
        maker_accounts: vec![],
        user_config: UserConfig::with_deadline(u64::MAX),
    }
}

fn bench_validation(c: &mut Criterion) {
    let setup = setup(8);
    let account = Account::default_of(setup.trader);
    let mut group = c.benchmark_group("generic_trader/validate_path");

    for len in [2usize, 4, 8] {
        let trade_path = path(&setup, len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &trade_path, |b, p| {
            b.iter(|| validate_trade_path(&setup.sys, &account, p));
        });
    }

    group.finish();
}

fn bench_external_swap(c: &mut Criterion) {
    let setup = setup(2);
    let params = SwapParams {
        trade_account_number: 0,
        path: path(&setup, 2),
    };

    c.bench_function("generic_trader/swap_external", |b| {
        b.iter_batched(
            || setup.sys.clone(),
            |mut sys| sys.swap_exact_input_for_output(setup.trader, params.clone()),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_validation, bench_external_swap);
criterion_main!(benches);
