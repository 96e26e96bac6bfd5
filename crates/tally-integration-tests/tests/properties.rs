//! Integration test: ledger invariants under random operation sequences.
//!
//! Drives the engine directly with seeded random deposits, withdrawals,
//! claims and time jumps across several pools, checking after every step:
//! - each pool's total equals the sum of its positions
//! - accumulators never decrease
//! - no checkpoint is ahead of its pool's accumulator
//! - rewards paid, settled and pending never exceed what was emitted

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tally_ledger::{
    AdminList, AdminToken, AssetId, InMemoryCustody, LedgerEngine, LedgerError, NullSink,
    PoolId, Timestamp, UserId, REWARD_ASSET,
};

const ADMIN: UserId = [0xAD; 32];
const USERS: u8 = 6;

fn user(n: u8) -> UserId {
    [n + 1; 32]
}

fn asset(n: u8) -> AssetId {
    [0x50 + n; 32]
}

struct Harness {
    engine: LedgerEngine<InMemoryCustody, NullSink>,
    /// (rate, registered_at) per pool.
    pools: Vec<(u64, Timestamp)>,
    paid: u128,
    now: Timestamp,
}

impl Harness {
    fn new(rates: &[u64]) -> Self {
        let mut custody = InMemoryCustody::new();
        for p in 0..rates.len() as u8 {
            for n in 0..USERS {
                custody.mint(asset(p), user(n), 1_000_000_000);
            }
        }
        custody.fund(REWARD_ASSET, u64::MAX / 2);

        let mut engine = LedgerEngine::new(custody, NullSink);
        let token = AdminToken::authorize(&ADMIN, &AdminList::new([ADMIN])).expect("admin");
        let mut pools = Vec::new();
        for (p, &rate) in rates.iter().enumerate() {
            engine
                .register_pool(&token, asset(p as u8), rate, 0)
                .expect("register");
            pools.push((rate, 0));
        }

        Self {
            engine,
            pools,
            paid: 0,
            now: 0,
        }
    }

    fn emitted_bound(&self) -> u128 {
        self.pools
            .iter()
            .map(|(rate, at)| u128::from(*rate) * u128::from(self.now - at))
            .sum()
    }

    fn accounted(&self) -> u128 {
        let mut total = self.paid;
        for n in 0..USERS {
            total += u128::from(self.engine.claimable(&user(n), self.now).expect("claimable"));
        }
        total
    }

    fn check(&self, accumulators: &mut [u128]) {
        let state = self.engine.state();
        assert!(state.is_conserved(), "conservation broken at t={}", self.now);

        for (index, pool) in state.pools.iter().enumerate() {
            assert!(pool.accumulator >= accumulators[index]);
            accumulators[index] = pool.accumulator;
        }
        for (key, position) in &state.positions {
            let pool = &state.pools[key.pool_id as usize];
            assert!(position.checkpoint <= pool.accumulator);
        }

        assert!(self.accounted() <= self.emitted_bound());
    }

    fn step(&mut self, rng: &mut StdRng) {
        let who = user(rng.gen_range(0..USERS));
        let pool = rng.gen_range(0..self.pools.len()) as PoolId;

        match rng.gen_range(0..10) {
            0..=3 => {
                let amount = rng.gen_range(1..5_000);
                self.engine
                    .deposit(pool, &who, amount, self.now)
                    .expect("deposit");
            }
            4..=5 => {
                let staked = self
                    .engine
                    .position(pool, &who)
                    .map_or(0, |p| p.staked_amount);
                let amount = rng.gen_range(1..=staked.max(1));
                match self.engine.withdraw(pool, &who, amount, self.now) {
                    Ok(()) => assert!(amount <= staked),
                    Err(err) => assert!(
                        matches!(err, LedgerError::InsufficientStake { .. }) && amount > staked,
                        "unexpected withdraw error: {err}"
                    ),
                }
            }
            6 => match self.engine.claim_all(&who, self.now) {
                Ok(amount) => {
                    assert!(amount > 0);
                    assert_eq!(self.engine.reward_balance(&who), 0);
                    self.paid += u128::from(amount);
                }
                Err(err) => assert_eq!(err, LedgerError::NoRewardsToClaim),
            },
            _ => self.now += rng.gen_range(0..120),
        }
    }
}

#[test]
fn random_sequences_hold_invariants() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut harness = Harness::new(&[10, 250, 1, 7_777]);
        let mut accumulators = vec![0u128; 4];

        for _ in 0..400 {
            harness.step(&mut rng);
            harness.check(&mut accumulators);
        }
    }
}

#[test]
fn stakes_earn_in_proportion() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let rate = rng.gen_range(1..10_000u64);
        let s1 = rng.gen_range(1..100_000u64);
        let s2 = rng.gen_range(1..100_000u64);
        let elapsed = rng.gen_range(1..10_000u64);

        let mut harness = Harness::new(&[rate]);
        harness.engine.deposit(0, &user(0), s1, 0).expect("s1");
        harness.engine.deposit(0, &user(1), s2, 0).expect("s2");

        let r1 = harness.engine.pending_reward(0, &user(0), elapsed).expect("r1");
        let r2 = harness.engine.pending_reward(0, &user(1), elapsed).expect("r2");

        // r1 / r2 == s1 / s2 up to one unit of truncation on each side.
        let lhs = u128::from(r1) * u128::from(s2);
        let rhs = u128::from(r2) * u128::from(s1);
        let slack = u128::from(s1.max(s2));
        assert!(lhs.abs_diff(rhs) <= slack, "rate={rate} s1={s1} s2={s2} t={elapsed}");

        let emitted = u128::from(rate) * u128::from(elapsed);
        assert!(u128::from(r1) + u128::from(r2) <= emitted);
        assert!(emitted - (u128::from(r1) + u128::from(r2)) <= 2);
    }
}

#[test]
fn failed_withdraw_leaves_state_untouched() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut harness = Harness::new(&[10, 20]);
    for _ in 0..100 {
        harness.step(&mut rng);
    }

    let pool: PoolId = 1;
    harness.engine.deposit(pool, &user(0), 500, harness.now).expect("deposit");
    harness.now += 30;

    let before = harness.engine.snapshot();
    harness.engine.transfer_mut().set_frozen(true);

    let result = harness.engine.withdraw(pool, &user(0), 500, harness.now);
    assert!(matches!(result, Err(LedgerError::TransferFailed(_))));
    assert_eq!(harness.engine.snapshot(), before);

    let result = harness.engine.claim_all(&user(0), harness.now);
    assert!(matches!(result, Err(LedgerError::TransferFailed(_))));
    assert_eq!(harness.engine.snapshot(), before);
}
