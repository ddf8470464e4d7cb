// Ledger and bank benchmarks for TermVault.
//
// Covers the hot ledger path (operator debit, credit) and a full
// deposit + withdraw cycle through the bank.

use criterion::{criterion_group, criterion_main, Criterion};

use termvault_contracts::{CallContext, ConfidentialToken, FixedTermBank};
use termvault_protocol::config::{SECONDS_PER_DAY, SECONDS_PER_MONTH};
use termvault_protocol::fhe::Coprocessor;
use termvault_protocol::identity::Address;

const T0: u64 = 1_700_000_000;

fn user() -> Address {
    Address::from_bytes([0x42; 20])
}

/// A ledger where `user()` holds a large balance and the bank is an operator.
fn setup() -> (ConfidentialToken, FixedTermBank) {
    let mut token = ConfidentialToken::new(Coprocessor::generate());
    let bank = FixedTermBank::new();
    let ctx = CallContext::new(user(), T0);
    token.mint(&ctx, user(), u64::MAX / 4).unwrap();
    token
        .set_operator(&ctx, bank.address(), T0 + 3650 * SECONDS_PER_DAY)
        .unwrap();
    (token, bank)
}

fn bench_operator_debit(c: &mut Criterion) {
    let (mut token, bank) = setup();
    let ctx = CallContext::new(bank.address(), T0);

    c.bench_function("ledger/operator_debit", |b| {
        b.iter(|| {
            token.debit(&ctx, user(), 1).unwrap();
            token.drain_events();
        });
    });
}

fn bench_credit(c: &mut Criterion) {
    let (mut token, _) = setup();
    let ctx = CallContext::new(user(), T0);
    let bob = Address::from_bytes([0x0B; 20]);

    c.bench_function("ledger/credit", |b| {
        b.iter(|| {
            token.credit(&ctx, bob, 1).unwrap();
            token.drain_events();
        });
    });
}

fn bench_deposit_withdraw(c: &mut Criterion) {
    let (mut token, mut bank) = setup();
    let open = CallContext::new(user(), T0);
    let mature = CallContext::new(user(), T0 + SECONDS_PER_MONTH);

    c.bench_function("bank/deposit_withdraw_cycle", |b| {
        b.iter(|| {
            let id = bank.deposit(&mut token, &open, 1_000_000, 0).unwrap();
            let payout = bank.withdraw(&mut token, &mature, id).unwrap();
            bank.drain_events();
            token.drain_events();
            payout
        });
    });
}

criterion_group!(benches, bench_operator_debit, bench_credit, bench_deposit_withdraw);
criterion_main!(benches);
