// Coprocessor benchmarks for the TermVault protocol.
//
// Covers encrypted add/sub against a plaintext operand, ACL grants, and the
// full user-decryption round trip (verify, re-encrypt, open) at a few batch
// sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use termvault_protocol::crypto::keys::AccountKeypair;
use termvault_protocol::fhe::{
    Coprocessor, DecryptionSession, EncryptedArithmetic, HandleContractPair,
};
use termvault_protocol::identity::Address;

const NOW: u64 = 1_700_000_000;

fn bench_add_plain(c: &mut Criterion) {
    let mut cp = Coprocessor::generate();
    let h = cp.trivial_encrypt(1_000_000).unwrap();

    c.bench_function("coprocessor/add_plain", |b| {
        b.iter(|| cp.add_plain(&h, 1).unwrap());
    });
}

fn bench_sub_plain(c: &mut Criterion) {
    let mut cp = Coprocessor::generate();
    let h = cp.trivial_encrypt(1_000_000).unwrap();

    c.bench_function("coprocessor/sub_plain", |b| {
        b.iter(|| cp.sub_plain(&h, 1).unwrap());
    });
}

fn bench_allow(c: &mut Criterion) {
    let mut cp = Coprocessor::generate();
    let h = cp.trivial_encrypt(1).unwrap();
    let account = Address::from_bytes([7; 20]);

    c.bench_function("coprocessor/allow", |b| {
        b.iter(|| cp.allow(&h, account).unwrap());
    });
}

fn bench_user_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("coprocessor/user_decrypt");
    let contract = Address::derive_contract("confidential-token");

    for size in [1usize, 8, 32] {
        let account = AccountKeypair::generate();
        let user = Address::from_public_key(&account.public_key());
        let mut cp = Coprocessor::generate();
        let pairs: Vec<HandleContractPair> = (0..size)
            .map(|i| {
                let handle = cp.trivial_encrypt(i as u64).unwrap();
                cp.allow(&handle, user).unwrap();
                cp.allow(&handle, contract).unwrap();
                HandleContractPair { handle, contract }
            })
            .collect();
        let session = DecryptionSession::new(&account, vec![contract], NOW, 1);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &pairs, |b, pairs| {
            b.iter(|| {
                let values = cp
                    .user_decrypt(session.signed_request(), pairs, NOW)
                    .unwrap();
                for v in &values {
                    session.open(v).unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_add_plain,
    bench_sub_plain,
    bench_allow,
    bench_user_decrypt,
);
criterion_main!(benches);
