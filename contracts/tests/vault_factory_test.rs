//! Integration tests for vault factories, the transfer queue and vault
//! proxies.

mod common;

use common::Fixture;
use margin_contracts::events::Event;
use margin_contracts::isolation::{FactoryError, VaultError, VaultImplementation, VaultProxy};
use margin_contracts::{ErrorKind, MarginSystem, SettlementError};
use margin_protocol::{AccountNumber, Address, Wei};

// ---------------------------------------------------------------------------
// Vault creation
// ---------------------------------------------------------------------------

#[test]
fn create_vault_and_deposit_moves_the_whole_holding() {
    let mut f = Fixture::new();
    let carol = Address::from_label("carol");
    let gov = f.gov;
    f.sys.tokens_mut().mint(&f.glp, &gov, &carol, 200).unwrap();

    let vault = f.funded_vault(carol, 200);

    assert_eq!(
        vault,
        f.sys.calculate_vault_by_account(&f.factory, &carol).unwrap()
    );
    assert_eq!(f.balance(vault, 0, f.iso_market), 200);
    assert_eq!(f.wallet(f.glp, carol), 0);
    assert_eq!(f.wallet(f.glp, vault), 200);

    let factory = f.sys.factory(&f.factory).unwrap();
    assert_eq!(factory.total_shares(), 200);
    assert_eq!(factory.share_balance_of(&f.sys.ledger_address()), 200);
    assert_eq!(factory.get_vault_by_account(&carol), Some(vault));
    assert_eq!(factory.get_account_by_vault(&vault), Some(carol));

    let queued = f.sys.get_queued_transfer_by_cursor(&f.factory, 1).unwrap();
    assert!(queued.is_executed);
    assert_eq!(queued.from, vault);
    assert_eq!(queued.to, f.sys.ledger_address());
    assert_eq!(queued.amount, 200);

    let names: Vec<_> = f.sys.events().iter().map(|r| r.event.name()).collect();
    assert!(names.contains(&"VaultCreated"));
    assert!(names.contains(&"TransferExecuted"));
}

#[test]
fn one_vault_per_owner() {
    let mut f = Fixture::new();
    let first = f.sys.create_vault(f.factory, f.alice).unwrap();
    let err = f.sys.create_vault(f.factory, f.alice).unwrap_err();
    assert_eq!(err, FactoryError::VaultAlreadyExists(f.alice).into());

    let other = f.sys.create_vault(f.factory, f.bob).unwrap();
    assert_ne!(first, other);
    assert_eq!(f.sys.factory(&f.factory).unwrap().vault_count(), 2);

    assert_eq!(
        f.sys.create_vault(f.factory, Address::ZERO),
        Err(FactoryError::ZeroAddress("account").into())
    );
}

#[test]
fn failed_create_and_deposit_leaves_nothing_behind() {
    let mut f = Fixture::new();
    let events_before = f.sys.events().len();

    // no approval for the vault, so the underlying pull fails
    let err = f
        .sys
        .create_vault_and_deposit(f.alice, f.factory, 0, 100)
        .unwrap_err();
    assert!(matches!(err, SettlementError::Token(_)));

    let factory = f.sys.factory(&f.factory).unwrap();
    assert_eq!(factory.vault_count(), 0);
    assert_eq!(factory.transfer_cursor(), 0);
    assert_eq!(f.sys.events().len(), events_before);
    assert_eq!(f.wallet(f.glp, f.alice), common::USER_FUNDS);
}

#[test]
fn proxy_initialization_is_one_shot() {
    let mut f = Fixture::new();
    let vault = f.sys.create_vault(f.factory, f.alice).unwrap();
    let err = f.sys.initialize_vault(vault, f.alice).unwrap_err();
    assert_eq!(err, VaultError::AlreadyInitialized.into());
    assert!(err.to_string().contains("already initialized"));

    // a fresh proxy at the wrong address is refused
    let predicted = f
        .sys
        .calculate_vault_by_account(&f.factory, &f.alice)
        .unwrap();
    let mut stray = VaultProxy::new(Address::from_label("stray"), f.factory);
    let err = stray.initialize(f.alice, predicted).unwrap_err();
    assert!(err.to_string().contains("invalid account"));
}

#[test]
fn only_the_owner_drives_a_vault() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 100);
    let err = f
        .sys
        .vault_withdraw_from_vault(f.bob, vault, 0, 10)
        .unwrap_err();
    assert!(matches!(err, SettlementError::Vault(VaultError::OnlyOwner { .. })));
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn withdraw_returns_underlying_to_the_owner() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 500);
    f.sys.vault_withdraw_from_vault(f.alice, vault, 0, 200).unwrap();

    assert_eq!(f.balance(vault, 0, f.iso_market), 300);
    assert_eq!(f.wallet(f.glp, vault), 300);
    assert_eq!(f.wallet(f.glp, f.alice), common::USER_FUNDS - 300);
    assert_eq!(f.sys.factory(&f.factory).unwrap().total_shares(), 300);
}

#[test]
fn isolation_balances_cannot_go_negative() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 50);
    let err = f
        .sys
        .vault_withdraw_from_vault(f.alice, vault, 0, 80)
        .unwrap_err();
    assert!(err.to_string().contains("market does not allow borrowing"));
    assert_eq!(f.balance(vault, 0, f.iso_market), 50);
}

// ---------------------------------------------------------------------------
// Transfer queue
// ---------------------------------------------------------------------------

/// A vault with underlying approved, but nothing deposited yet.
fn prepared_vault(f: &mut Fixture, owner: Address, amount: Wei) -> Address {
    let vault = f.sys.create_vault(f.factory, owner).unwrap();
    f.sys
        .tokens_mut()
        .approve(&f.glp, &owner, &vault, amount)
        .unwrap();
    vault
}

#[test]
fn queued_transfer_executes_exactly_once() {
    let mut f = Fixture::new();
    let alice = f.alice;
    let vault = prepared_vault(&mut f, alice, 100);
    let ledger = f.sys.ledger_address();

    let cursor = f
        .sys
        .enqueue_transfer_into_dolomite_margin(vault, f.factory, vault, 100)
        .unwrap();
    assert_eq!(cursor, 1);

    f.sys
        .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 100)
        .unwrap();
    assert_eq!(f.wallet(f.glp, vault), 100);

    let err = f
        .sys
        .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 100)
        .unwrap_err();
    assert_eq!(err, FactoryError::TransferAlreadyExecuted { cursor: 1 }.into());
    assert!(err.to_string().contains("transfer already executed"));
    assert_eq!(f.wallet(f.glp, vault), 100);
}

#[test]
fn vault_entry_and_unwrapper_release_each_execute_once() {
    let mut f = Fixture::new();
    let alice = f.alice;
    let vault = prepared_vault(&mut f, alice, 100);
    let ledger = f.sys.ledger_address();
    let (glp, unwrapper, factory) = (f.glp, f.unwrapper, f.factory);

    // V's own entry lets the ledger pull transferFrom(V, ledger, 100)
    f.sys
        .enqueue_transfer_into_dolomite_margin(vault, factory, vault, 100)
        .unwrap();
    f.sys
        .transfer_vault_shares_from(ledger, factory, vault, ledger, 100)
        .unwrap();
    assert_eq!(f.sys.factory(&factory).unwrap().share_balance_of(&ledger), 100);
    assert_eq!(
        f.sys
            .transfer_vault_shares_from(ledger, factory, vault, ledger, 100),
        Err(FactoryError::TransferAlreadyExecuted { cursor: 1 }.into())
    );

    // the trusted unwrapper announces a release of V's 100 to itself
    let cursor = f
        .sys
        .enqueue_transfer_from_dolomite_margin(unwrapper, factory, vault, 100)
        .unwrap();
    assert_eq!(cursor, 2);
    f.sys
        .transfer_vault_shares(ledger, factory, unwrapper, 100)
        .unwrap();
    assert_eq!(f.wallet(glp, vault), 0);
    assert_eq!(f.wallet(glp, unwrapper), 100);
    assert_eq!(f.sys.factory(&factory).unwrap().total_shares(), 0);

    let err = f
        .sys
        .transfer_vault_shares(ledger, factory, unwrapper, 100)
        .unwrap_err();
    assert_eq!(err, FactoryError::TransferAlreadyExecuted { cursor: 2 }.into());
    assert!(err.to_string().contains("transfer already executed"));
}

#[test]
fn converter_enqueued_transfer_is_pulled_from_the_converter() {
    let mut f = Fixture::new();
    let vault = f.sys.create_vault(f.factory, f.alice).unwrap();
    let ledger = f.sys.ledger_address();
    let (gov, glp, unwrapper) = (f.gov, f.glp, f.unwrapper);
    f.sys.tokens_mut().mint(&glp, &gov, &unwrapper, 100).unwrap();
    f.sys
        .tokens_mut()
        .approve(&glp, &unwrapper, &vault, 100)
        .unwrap();

    f.sys
        .enqueue_transfer_into_dolomite_margin(unwrapper, f.factory, vault, 100)
        .unwrap();

    // the queued sender is the converter, not the vault
    let err = f
        .sys
        .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 100)
        .unwrap_err();
    assert!(err.to_string().contains("invalid from"));

    f.sys
        .transfer_vault_shares_from(ledger, f.factory, unwrapper, ledger, 100)
        .unwrap();
    assert_eq!(f.wallet(glp, vault), 100);
    let err = f
        .sys
        .transfer_vault_shares_from(ledger, f.factory, unwrapper, ledger, 100)
        .unwrap_err();
    assert!(err.to_string().contains("transfer already executed"));
}

#[test]
fn trusted_converter_deposits_into_a_vault() {
    let mut f = Fixture::new();
    let vault = f.sys.create_vault(f.factory, f.alice).unwrap();
    let (glp, wrapper, factory, alice) = (f.glp, f.wrapper, f.factory, f.alice);
    f.sys
        .tokens_mut()
        .approve(&glp, &wrapper, &vault, 50)
        .unwrap();

    assert_eq!(
        f.sys
            .deposit_into_dolomite_margin_from_token_converter(alice, factory, vault, 0, 50),
        Err(FactoryError::OnlyConverter(alice).into())
    );

    f.sys
        .deposit_into_dolomite_margin_from_token_converter(wrapper, factory, vault, 3, 50)
        .unwrap();
    assert_eq!(f.balance(vault, 3, f.iso_market), 50);
    assert_eq!(f.wallet(glp, vault), 50);
    assert_eq!(f.wallet(glp, wrapper), common::INVENTORY - 50);
}

#[test]
fn hook_checks_run_in_order() {
    let mut f = Fixture::new();
    let alice = f.alice;
    let vault = prepared_vault(&mut f, alice, 100);
    let ledger = f.sys.ledger_address();

    assert_eq!(
        f.sys
            .transfer_vault_shares_from(f.alice, f.factory, vault, ledger, 100),
        Err(FactoryError::OnlyLedger(f.alice).into())
    );
    assert_eq!(
        f.sys
            .transfer_vault_shares_from(ledger, f.factory, Address::ZERO, ledger, 100),
        Err(FactoryError::TransferFromZeroAddress.into())
    );
    assert_eq!(
        f.sys
            .transfer_vault_shares_from(ledger, f.factory, vault, f.bob, 100),
        Err(FactoryError::LedgerNotInvolved.into())
    );
    assert_eq!(
        f.sys
            .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 100),
        Err(FactoryError::InvalidQueuedTransfer { cursor: 0 }.into())
    );

    f.sys
        .enqueue_transfer_into_dolomite_margin(vault, f.factory, vault, 100)
        .unwrap();
    assert!(matches!(
        f.sys
            .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 99),
        Err(SettlementError::Factory(FactoryError::InvalidAmount { .. }))
    ));
}

#[test]
fn strangers_cannot_enqueue() {
    let mut f = Fixture::new();
    let vault = f.sys.create_vault(f.factory, f.alice).unwrap();
    assert_eq!(
        f.sys
            .enqueue_transfer_into_dolomite_margin(f.bob, f.factory, vault, 1),
        Err(FactoryError::OnlyConverterOrVault(f.bob).into())
    );
    let not_a_vault = Address::from_label("nobody");
    assert_eq!(
        f.sys
            .enqueue_transfer_from_dolomite_margin(f.wrapper, f.factory, not_a_vault, 1),
        Err(FactoryError::InvalidVault(not_a_vault).into())
    );
}

#[test]
fn later_enqueue_supersedes_an_unconsumed_entry() {
    let mut f = Fixture::new();
    let alice = f.alice;
    let vault = prepared_vault(&mut f, alice, 100);
    let ledger = f.sys.ledger_address();

    f.sys
        .enqueue_transfer_into_dolomite_margin(vault, f.factory, vault, 40)
        .unwrap();
    f.sys
        .enqueue_transfer_into_dolomite_margin(vault, f.factory, vault, 60)
        .unwrap();

    assert!(f
        .sys
        .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 40)
        .is_err());
    f.sys
        .transfer_vault_shares_from(ledger, f.factory, vault, ledger, 60)
        .unwrap();
    assert!(!f.sys.get_queued_transfer_by_cursor(&f.factory, 1).unwrap().is_executed);
}

#[test]
fn cursor_is_monotonic_and_bounded() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 100);
    let mut last = f.sys.factory(&f.factory).unwrap().transfer_cursor();
    for amount in [10, 20, 30] {
        f.sys.vault_withdraw_from_vault(f.alice, vault, 0, amount).unwrap();
        let cursor = f.sys.factory(&f.factory).unwrap().transfer_cursor();
        assert_eq!(cursor, last + 1);
        last = cursor;
    }
    assert!(f.sys.get_queued_transfer_by_cursor(&f.factory, last).is_ok());
    assert!(matches!(
        f.sys.get_queued_transfer_by_cursor(&f.factory, last + 1),
        Err(SettlementError::Factory(FactoryError::CursorOutOfRange { .. }))
    ));
    assert!(f.sys.get_queued_transfer_by_cursor(&f.factory, 0).is_err());
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[test]
fn factory_governance() {
    let mut f = Fixture::new();
    assert_eq!(
        f.sys.initialize_vault_factory(f.gov, f.factory, &[]),
        Err(FactoryError::AlreadyInitialized.into())
    );
    assert_eq!(
        f.sys
            .set_is_token_converter_trusted(f.alice, f.factory, f.alice, true),
        Err(SettlementError::OnlyGovernance(f.alice))
    );

    f.sys
        .set_is_token_converter_trusted(f.gov, f.factory, f.wrapper, false)
        .unwrap();
    assert!(!f
        .sys
        .factory(&f.factory)
        .unwrap()
        .is_token_converter_trusted(&f.wrapper));
}

#[test]
fn isolation_market_must_not_allow_borrowing() {
    let mut f = Fixture::new();
    let gov = f.gov;
    let token = Address::from_label("plv-glp");
    let factory = Address::from_label("factory-plv-glp");
    f.sys
        .tokens_mut()
        .register(token, "plvGLP", "PLVGLP", 18, gov)
        .unwrap();
    let market = f
        .sys
        .add_isolation_market(gov, factory, token, f.implementation)
        .unwrap();
    f.sys.set_market_allows_borrowing(gov, market, true).unwrap();

    assert_eq!(
        f.sys.initialize_vault_factory(gov, factory, &[]),
        Err(FactoryError::MarketAllowsBorrowing(market).into())
    );
    assert_eq!(
        f.sys.create_vault(factory, f.alice),
        Err(FactoryError::NotInitialized.into())
    );
}

/// Credits deposits to `to_account_number + 100`.
#[derive(Debug)]
struct OffsetVault;

impl VaultImplementation for OffsetVault {
    fn name(&self) -> &str {
        "offset-vault"
    }

    fn deposit_into_vault(
        &self,
        system: &mut MarginSystem,
        vault: &VaultProxy,
        to_account_number: AccountNumber,
        amount: Wei,
    ) -> Result<(), SettlementError> {
        system.deposit_into_dolomite_margin(
            vault.address(),
            vault.factory(),
            to_account_number + 100,
            amount,
        )
    }
}

#[test]
fn implementation_swap_applies_to_existing_vaults() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 100);
    let gov = f.gov;
    let offset = Address::from_label("offset-vault");

    assert_eq!(
        f.sys.set_user_vault_implementation(gov, f.factory, offset),
        Err(VaultError::UnknownImplementation(offset).into())
    );
    f.sys
        .register_vault_implementation(gov, offset, OffsetVault)
        .unwrap();
    f.sys
        .set_user_vault_implementation(gov, f.factory, offset)
        .unwrap();
    assert!(f.sys.events().iter().any(|r| matches!(
        r.event,
        Event::UserVaultImplementationSet { implementation, .. } if implementation == offset
    )));

    f.sys
        .tokens_mut()
        .approve(&f.glp, &f.alice, &vault, 50)
        .unwrap();
    f.sys.vault_deposit_into_vault(f.alice, vault, 1, 50).unwrap();
    assert_eq!(f.balance(vault, 1, f.iso_market), 0);
    assert_eq!(f.balance(vault, 101, f.iso_market), 50);
}

// ---------------------------------------------------------------------------
// Borrow positions and other tokens
// ---------------------------------------------------------------------------

#[test]
fn vault_borrow_position_round_trip() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 300);

    f.sys
        .vault_open_borrow_position(f.alice, vault, 0, 7, 120)
        .unwrap();
    assert_eq!(f.balance(vault, 0, f.iso_market), 180);
    assert_eq!(f.balance(vault, 7, f.iso_market), 120);

    f.fund_vault_with_usdc(f.alice, vault, 7, 40);
    assert_eq!(f.balance(vault, 7, f.usdc_market), 40);

    let err = f
        .sys
        .vault_close_borrow_position_with_other_tokens(f.alice, vault, 7, 0, &[f.iso_market])
        .unwrap_err();
    assert_eq!(err, FactoryError::InvalidMarket(f.iso_market).into());

    f.sys
        .vault_close_borrow_position_with_other_tokens(f.alice, vault, 7, 0, &[f.usdc_market])
        .unwrap();
    f.sys
        .vault_close_borrow_position_with_underlying_vault_token(f.alice, vault, 7, 0)
        .unwrap();
    assert_eq!(f.balance(vault, 0, f.iso_market), 300);
    assert_eq!(f.balance(vault, 0, f.usdc_market), 40);
    assert_eq!(f.balance(vault, 7, f.iso_market), 0);
}

#[test]
fn vaults_cannot_deposit_their_own_market_as_other_token() {
    let mut f = Fixture::new();
    let vault = f.funded_vault(f.alice, 10);
    let err = f
        .sys
        .vault_deposit_other_token_into_dolomite_margin(f.alice, vault, 0, f.iso_market, 1)
        .unwrap_err();
    assert_eq!(err, FactoryError::InvalidMarket(f.iso_market).into());
}
