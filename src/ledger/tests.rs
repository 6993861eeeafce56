use super::*;

use proptest::prelude::*;

use crate::units::tokens;

const TOTAL_SUPPLY: Amount = tokens(1_000_000_000);
const MAX_TRANSACTION: Amount = tokens(10_000_000);
const MAX_WALLET: Amount = tokens(20_000_000);

fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

fn owner() -> Address {
    addr(0x01)
}

fn default_limits() -> TokenLimits {
    TokenLimits {
        max_transaction_amount: MAX_TRANSACTION,
        max_wallet_amount: MAX_WALLET,
        reflection_fee_percent: 2,
    }
}

fn ledger() -> TokenLedger {
    TokenLedger::genesis(TokenMetadata::default(), owner(), TOTAL_SUPPLY, default_limits()).unwrap()
}

/// Ledger where `holder` received `amount` fee-free from the owner.
fn funded(holder: Address, amount: Amount) -> TokenLedger {
    let mut ledger = ledger();
    ledger.transfer(&owner(), &holder, amount).unwrap();
    ledger
}

fn sum_of_balances(ledger: &TokenLedger) -> Amount {
    ledger.snapshot().balances.values().sum()
}

#[test]
fn genesis_assigns_supply_to_owner() {
    let ledger = ledger();
    assert_eq!(ledger.owner(), owner());
    assert_eq!(ledger.balance_of(&owner()), TOTAL_SUPPLY);
    assert_eq!(ledger.total_supply(), TOTAL_SUPPLY);
    assert_eq!(ledger.name(), "TotheNineCloud");
    assert_eq!(ledger.symbol(), "T9C");
    assert_eq!(ledger.decimals(), 18);
    assert_eq!(ledger.max_transaction_amount(), MAX_TRANSACTION);
    assert_eq!(ledger.max_wallet_amount(), MAX_WALLET);
    assert_eq!(ledger.reflection_fee_percent(), 2);
    assert!(ledger.is_excluded_from_fee(&owner()));
    assert!(!ledger.is_paused());
}

#[test]
fn genesis_rejects_bad_parameters() {
    let zero_owner =
        TokenLedger::genesis(TokenMetadata::default(), Address::ZERO, TOTAL_SUPPLY, default_limits());
    assert!(matches!(zero_owner, Err(LedgerError::InvalidGenesis(_))));

    let mut limits = default_limits();
    limits.reflection_fee_percent = 11;
    let err = TokenLedger::genesis(TokenMetadata::default(), owner(), TOTAL_SUPPLY, limits).unwrap_err();
    assert_eq!(err, LedgerError::FeeTooHigh { requested: 11 });
}

#[test]
fn owner_transfers_are_fee_free() {
    let mut ledger = ledger();
    ledger.transfer(&owner(), &addr(2), tokens(1_000)).unwrap();
    assert_eq!(ledger.balance_of(&addr(2)), tokens(1_000));
    assert_eq!(ledger.balance_of(&owner()), TOTAL_SUPPLY - tokens(1_000));
    assert_eq!(ledger.total_fees_collected(), 0);
}

#[test]
fn fee_is_burned_between_regular_holders() {
    let (alice, bob) = (addr(2), addr(3));
    let mut ledger = funded(alice, tokens(5_000));
    let fees_before = ledger.total_fees_collected();

    ledger.transfer(&alice, &bob, tokens(1_000)).unwrap();

    assert_eq!(ledger.balance_of(&bob), tokens(980));
    assert_eq!(ledger.balance_of(&alice), tokens(4_000));
    assert_eq!(ledger.total_fees_collected() - fees_before, tokens(20));
    assert_eq!(ledger.total_supply(), TOTAL_SUPPLY - tokens(20));
    assert_eq!(ledger.total_burned(), tokens(20));
    assert_eq!(
        ledger.events().last(),
        Some(&LedgerEvent::Transfer {
            from: alice,
            to: bob,
            amount: tokens(980),
            fee: tokens(20),
        })
    );
}

#[test]
fn excluding_the_recipient_waives_the_fee() {
    let (alice, bob) = (addr(2), addr(3));
    let mut ledger = funded(alice, tokens(5_000));
    ledger.exclude_from_fee(&owner(), &bob).unwrap();
    ledger.transfer(&alice, &bob, tokens(1_000)).unwrap();
    assert_eq!(ledger.balance_of(&bob), tokens(1_000));

    ledger.include_in_fee(&owner(), &bob).unwrap();
    assert!(!ledger.is_excluded_from_fee(&bob));
    ledger.transfer(&alice, &bob, tokens(1_000)).unwrap();
    assert_eq!(ledger.balance_of(&bob), tokens(1_980));
}

#[test]
fn owner_pays_fee_once_included() {
    let mut ledger = ledger();
    ledger.include_in_fee(&owner(), &owner()).unwrap();
    ledger.transfer(&owner(), &addr(9), tokens(1_000)).unwrap();
    assert_eq!(ledger.balance_of(&addr(9)), tokens(980));
    assert_eq!(ledger.total_fees_collected(), tokens(20));
    assert_eq!(ledger.balance_of(&owner()), TOTAL_SUPPLY - tokens(1_000));
}

#[test]
fn zero_amount_and_zero_recipient_fail() {
    let mut ledger = ledger();
    assert_eq!(
        ledger.transfer(&owner(), &addr(2), 0),
        Err(LedgerError::ZeroAmount)
    );
    assert_eq!(
        ledger.transfer(&owner(), &Address::ZERO, tokens(100)),
        Err(LedgerError::ZeroAddressRecipient)
    );
    assert_eq!(ledger.height(), 0);
}

#[test]
fn sender_without_funds_is_rejected() {
    let mut ledger = ledger();
    let err = ledger.transfer(&addr(2), &owner(), 1).unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            account: addr(2),
            balance: 0,
            needed: 1,
        }
    );
}

#[test]
fn transaction_cap_applies_to_regular_senders() {
    let (alice, bob) = (addr(2), addr(3));
    let mut ledger = funded(alice, MAX_WALLET);

    let err = ledger.transfer(&alice, &bob, MAX_TRANSACTION + 1).unwrap_err();
    assert_eq!(
        err,
        LedgerError::ExceedsTransactionLimit {
            amount: MAX_TRANSACTION + 1,
            limit: MAX_TRANSACTION,
        }
    );
    ledger.transfer(&alice, &bob, MAX_TRANSACTION).unwrap();
}

#[test]
fn owner_bypasses_transaction_cap() {
    let mut ledger = ledger();
    ledger.exclude_from_fee(&owner(), &addr(4)).unwrap();
    ledger.transfer(&owner(), &addr(4), MAX_TRANSACTION * 3).unwrap();
    assert_eq!(ledger.balance_of(&addr(4)), MAX_TRANSACTION * 3);
}

#[test]
fn wallet_cap_rolls_back_the_whole_transfer() {
    let holder = addr(2);
    let mut ledger = funded(holder, MAX_TRANSACTION);
    let before = ledger.snapshot();

    let err = ledger
        .transfer(&owner(), &holder, MAX_WALLET - MAX_TRANSACTION + 1)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::ExceedsWalletLimit {
            account: holder,
            balance: MAX_WALLET + 1,
            limit: MAX_WALLET,
        }
    );
    assert_eq!(ledger.snapshot(), before);

    ledger
        .transfer(&owner(), &holder, MAX_WALLET - MAX_TRANSACTION)
        .unwrap();
    assert_eq!(ledger.balance_of(&holder), MAX_WALLET);
}

#[test]
fn wallet_cap_counts_the_net_credit() {
    let (whale, bob) = (addr(2), addr(3));
    let mut ledger = funded(whale, MAX_WALLET);
    ledger.transfer(&whale, &bob, MAX_TRANSACTION).unwrap();
    ledger.transfer(&whale, &bob, MAX_TRANSACTION).unwrap();
    // Each 10M transfer nets 9.8M, so the second one stays under 20M.
    assert_eq!(ledger.balance_of(&bob), tokens(19_600_000));
}

#[test]
fn signals_fire_above_half_the_caps() {
    let mut ledger = ledger();
    ledger
        .transfer(&owner(), &addr(2), MAX_TRANSACTION / 2 + 1)
        .unwrap();
    assert_eq!(
        ledger.events()[0],
        LedgerEvent::AntiWhaleTriggered {
            from: owner(),
            amount: MAX_TRANSACTION / 2 + 1,
        }
    );
    assert!(!ledger
        .events()
        .iter()
        .any(|e| matches!(e, LedgerEvent::CloudReached { .. })));

    ledger.exclude_from_fee(&owner(), &addr(3)).unwrap();
    ledger
        .transfer(&owner(), &addr(3), MAX_WALLET / 2 + 1)
        .unwrap();
    assert!(ledger.events().contains(&LedgerEvent::CloudReached {
        holder: addr(3),
        balance: MAX_WALLET / 2 + 1,
    }));
}

#[test]
fn small_transfers_emit_no_signals() {
    let mut ledger = ledger();
    let events = ledger
        .apply(
            &owner(),
            &LedgerCall::Transfer {
                to: addr(2),
                amount: tokens(100),
            },
        )
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], LedgerEvent::Transfer { .. }));
}

#[test]
fn approve_overwrites_and_transfer_from_spends() {
    let (spender, recipient) = (addr(2), addr(3));
    let mut ledger = ledger();
    ledger.approve(&owner(), &spender, 500).unwrap();
    ledger.approve(&owner(), &spender, 100).unwrap();
    assert_eq!(ledger.allowance(&owner(), &spender), 100);

    ledger
        .transfer_from(&spender, &owner(), &recipient, 60)
        .unwrap();
    assert_eq!(ledger.allowance(&owner(), &spender), 40);
    assert_eq!(ledger.balance_of(&recipient), 60);

    let before = ledger.snapshot();
    let err = ledger
        .transfer_from(&spender, &owner(), &recipient, 41)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientAllowance {
            owner: owner(),
            spender,
            allowance: 40,
            needed: 41,
        }
    );
    assert_eq!(ledger.snapshot(), before);
}

#[test]
fn failed_transfer_from_keeps_the_allowance() {
    let (holder, spender, recipient) = (addr(2), addr(3), addr(4));
    let mut ledger = funded(holder, tokens(10));
    ledger.approve(&holder, &spender, tokens(100)).unwrap();

    let err = ledger
        .transfer_from(&spender, &holder, &recipient, tokens(50))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    assert_eq!(ledger.allowance(&holder, &spender), tokens(100));
}

#[test]
fn transfer_from_charges_the_fee() {
    let (holder, spender, recipient) = (addr(2), addr(3), addr(4));
    let mut ledger = funded(holder, tokens(1_000));
    ledger.approve(&holder, &spender, tokens(1_000)).unwrap();
    ledger
        .transfer_from(&spender, &holder, &recipient, tokens(500))
        .unwrap();
    assert_eq!(ledger.balance_of(&recipient), tokens(490));
    assert_eq!(ledger.allowance(&holder, &spender), tokens(500));
}

#[test]
fn pause_blocks_transfers_until_unpaused() {
    let mut ledger = ledger();
    ledger.approve(&owner(), &addr(5), tokens(100)).unwrap();
    ledger.pause(&owner()).unwrap();
    assert!(ledger.is_paused());

    assert_eq!(
        ledger.transfer(&owner(), &addr(2), tokens(100)),
        Err(LedgerError::Paused)
    );
    assert_eq!(
        ledger.transfer_from(&addr(5), &owner(), &addr(2), tokens(100)),
        Err(LedgerError::Paused)
    );

    ledger.unpause(&owner()).unwrap();
    assert!(!ledger.is_paused());
    ledger.transfer(&owner(), &addr(2), tokens(100)).unwrap();
    ledger
        .transfer_from(&addr(5), &owner(), &addr(2), tokens(100))
        .unwrap();
}

#[test]
fn pausing_twice_records_one_event() {
    let mut ledger = ledger();
    ledger.pause(&owner()).unwrap();
    ledger.pause(&owner()).unwrap();
    let paused_events = ledger
        .events()
        .iter()
        .filter(|e| matches!(e, LedgerEvent::Paused { .. }))
        .count();
    assert_eq!(paused_events, 1);
}

#[test]
fn admin_operations_require_the_owner() {
    let mut ledger = ledger();
    let intruder = addr(7);
    let unauthorized = Err(LedgerError::Unauthorized { caller: intruder });
    assert_eq!(ledger.pause(&intruder), unauthorized);
    assert_eq!(ledger.unpause(&intruder), unauthorized);
    assert_eq!(
        ledger.update_max_transaction_amount(&intruder, tokens(1_000_000)),
        unauthorized
    );
    assert_eq!(
        ledger.update_max_wallet_amount(&intruder, MAX_WALLET),
        unauthorized
    );
    assert_eq!(ledger.set_reflection_fee_percent(&intruder, 1), unauthorized);
    assert_eq!(ledger.exclude_from_fee(&intruder, &intruder), unauthorized);
    assert_eq!(ledger.include_in_fee(&intruder, &owner()), unauthorized);
    assert_eq!(ledger.height(), 0);
}

#[test]
fn limit_updates_respect_supply_floors() {
    let mut ledger = ledger();
    ledger
        .update_max_transaction_amount(&owner(), tokens(5_000_000))
        .unwrap();
    assert_eq!(ledger.max_transaction_amount(), tokens(5_000_000));
    ledger
        .update_max_wallet_amount(&owner(), tokens(30_000_000))
        .unwrap();
    assert_eq!(ledger.max_wallet_amount(), tokens(30_000_000));

    let tx_floor = ledger.total_supply() / 1_000;
    assert_eq!(
        ledger.update_max_transaction_amount(&owner(), tx_floor - 1),
        Err(LedgerError::LimitTooLow {
            requested: tx_floor - 1,
            minimum: tx_floor,
        })
    );
    let wallet_floor = ledger.total_supply() / 500;
    assert_eq!(
        ledger.update_max_wallet_amount(&owner(), wallet_floor - 1),
        Err(LedgerError::LimitTooLow {
            requested: wallet_floor - 1,
            minimum: wallet_floor,
        })
    );
    ledger
        .update_max_transaction_amount(&owner(), tx_floor)
        .unwrap();
}

#[test]
fn reflection_fee_is_capped_at_ten() {
    let mut ledger = ledger();
    assert_eq!(
        ledger.set_reflection_fee_percent(&owner(), 11),
        Err(LedgerError::FeeTooHigh { requested: 11 })
    );
    ledger.set_reflection_fee_percent(&owner(), 10).unwrap();
    assert_eq!(ledger.reflection_fee_percent(), 10);
    ledger.set_reflection_fee_percent(&owner(), 5).unwrap();
    assert_eq!(ledger.reflection_fee_percent(), 5);
}

#[test]
fn burn_reduces_supply() {
    let mut ledger = ledger();
    ledger.burn(&owner(), tokens(1_000)).unwrap();
    assert_eq!(ledger.total_supply(), TOTAL_SUPPLY - tokens(1_000));
    assert_eq!(ledger.balance_of(&owner()), TOTAL_SUPPLY - tokens(1_000));
    assert_eq!(ledger.total_burned(), tokens(1_000));

    let err = ledger.burn(&owner(), ledger.total_supply() + 1).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
}

#[test]
fn burn_ignores_pause_and_zero_is_a_no_op() {
    let mut ledger = funded(addr(2), tokens(10));
    ledger.pause(&owner()).unwrap();
    let height = ledger.height();
    ledger.burn(&addr(2), 0).unwrap();
    assert_eq!(ledger.height(), height);
    ledger.burn(&addr(2), tokens(10)).unwrap();
    assert_eq!(ledger.balance_of(&addr(2)), 0);
}

#[test]
fn self_transfer_only_loses_the_fee() {
    let alice = addr(2);
    let mut ledger = funded(alice, tokens(1_000));
    ledger.transfer(&alice, &alice, tokens(100)).unwrap();
    assert_eq!(ledger.balance_of(&alice), tokens(998));
    assert_eq!(sum_of_balances(&ledger), ledger.total_supply());
}

#[test]
fn state_root_tracks_mutations() {
    let mut ledger = ledger();
    let root = ledger.state_root();
    assert_eq!(root, ledger.snapshot().state_root);
    ledger.approve(&owner(), &addr(2), 1).unwrap();
    assert_ne!(ledger.state_root(), root);
}

#[test]
fn snapshot_serializes_to_json() {
    let mut ledger = funded(addr(2), tokens(3));
    ledger.record_call([9u8; 32]);
    let snapshot = ledger.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: LedgerSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
    assert_eq!(back.meta.last_call, Some([9u8; 32]));
}

#[test]
fn calls_decode_from_tagged_json() {
    let json = r#"{"type":"transfer","to":"0x0202020202020202020202020202020202020202","amount":"1000"}"#;
    let call: LedgerCall = serde_json::from_str(json).unwrap();
    assert_eq!(
        call,
        LedgerCall::Transfer {
            to: addr(2),
            amount: 1_000,
        }
    );
    let pause: LedgerCall = serde_json::from_str(r#"{"type":"pause"}"#).unwrap();
    assert_eq!(pause, LedgerCall::Pause);
}

fn call_strategy() -> impl Strategy<Value = (u8, LedgerCall)> {
    let account = 1u8..6;
    let amount = prop_oneof![0u128..1_000, Just(MAX_TRANSACTION), 0u128..=MAX_WALLET];
    prop_oneof![
        (account.clone(), account.clone(), amount.clone())
            .prop_map(|(c, to, amount)| (c, LedgerCall::Transfer { to: addr(to), amount })),
        (account.clone(), account.clone(), amount.clone())
            .prop_map(|(c, s, amount)| (c, LedgerCall::Approve { spender: addr(s), amount })),
        (account.clone(), account.clone(), account.clone(), amount.clone()).prop_map(
            |(c, from, to, amount)| (
                c,
                LedgerCall::TransferFrom {
                    from: addr(from),
                    to: addr(to),
                    amount,
                }
            )
        ),
        (account.clone(), amount).prop_map(|(c, amount)| (c, LedgerCall::Burn { amount })),
        (account.clone(), 0u8..=12)
            .prop_map(|(c, percent)| (c, LedgerCall::SetReflectionFeePercent { percent })),
        (account.clone(), account)
            .prop_map(|(c, a)| (c, LedgerCall::ExcludeFromFee { account: addr(a) })),
    ]
}

proptest! {
    #[test]
    fn supply_is_conserved(calls in proptest::collection::vec(call_strategy(), 1..40)) {
        let mut ledger = ledger();
        for (caller, call) in calls {
            let before = ledger.snapshot();
            if ledger.apply(&addr(caller), &call).is_err() {
                prop_assert_eq!(ledger.snapshot(), before);
            }
            prop_assert_eq!(sum_of_balances(&ledger), ledger.total_supply());
            prop_assert_eq!(
                ledger.total_supply() + ledger.total_burned(),
                ledger.genesis_supply()
            );
        }
    }
}
