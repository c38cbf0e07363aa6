use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::{pow::mine_block, Block, CancellationToken, Transaction};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn bench_pow(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let txs: Vec<Transaction> = (0..10)
        .map(|i| Transaction {
            from: format!("alice-{i}"),
            to: "bob".into(),
            amount: rng.gen_range(1..10),
            timestamp: 1_600_000_000 + i,
        })
        .collect();
    let block = Block::new(1, 1_600_000_200, txs, [0u8; 32]);
    let cancel = CancellationToken::new();

    c.bench_function("calculate_hash", |b| b.iter(|| block.calculate_hash()));

    c.bench_function("mine_block_difficulty_3", |b| {
        b.iter(|| mine_block(block.clone(), 3, &cancel));
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
