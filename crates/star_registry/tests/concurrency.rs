//! Concurrent access to a shared registry.

use starnotary_registry::{
    AccountId, AccountLedger, Amount, InMemoryAccountLedger, RegistryConfig, StarId, StarRegistry,
    StarRegistryError,
};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const PRICE: Amount = 1_000;

fn buyer(n: usize) -> AccountId {
    AccountId::from_label(&format!("buyer-{}", n))
}

#[test]
fn racing_buyers_produce_exactly_one_sale() {
    const BUYERS: usize = 16;
    let seller = AccountId::from_label("seller");
    let registry = Arc::new(StarRegistry::with_account_ledger(
        RegistryConfig::default(),
        InMemoryAccountLedger::with_balances((0..BUYERS).map(|n| (buyer(n), PRICE * 2))),
    ));
    registry.create_star("Contested", StarId(1), "", &seller).unwrap();
    registry.put_up_for_sale(StarId(1), PRICE, &seller).unwrap();

    let barrier = Arc::new(Barrier::new(BUYERS));
    let handles: Vec<_> = (0..BUYERS)
        .map(|n| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry.buy_star_from_account(StarId(1), PRICE, &buyer(n))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("buyer thread panicked"))
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(
                err,
                StarRegistryError::NotForSale { .. } | StarRegistryError::SelfPurchase { .. }
            ));
        }
    }

    let winner = winners[0].buyer;
    assert_eq!(registry.owner_of(StarId(1)).unwrap(), winner);
    assert_eq!(registry.account_balance(&seller), PRICE);
    assert_eq!(registry.account_balance(&winner), PRICE);
    let supply = registry.with_ledger(|ledger| ledger.total_supply());
    assert_eq!(supply, PRICE * 2 * BUYERS as Amount);
}

#[test]
fn opposite_order_exchanges_do_not_deadlock() {
    const ROUNDS: usize = 500;
    let alice = AccountId::from_label("alice");
    let bob = AccountId::from_label("bob");
    let registry = Arc::new(StarRegistry::new(RegistryConfig {
        shard_count: 4,
        ..RegistryConfig::default()
    }));
    // Ids 1 and 2 sit in different shards.
    registry.create_star("One", StarId(1), "", &alice).unwrap();
    registry.create_star("Two", StarId(2), "", &bob).unwrap();

    let forward = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                let caller = registry.owner_of(StarId(1)).unwrap();
                let _ = registry.exchange_stars(StarId(1), StarId(2), &caller);
            }
        })
    };
    let backward = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                let caller = registry.owner_of(StarId(2)).unwrap();
                let _ = registry.exchange_stars(StarId(2), StarId(1), &caller);
            }
        })
    };
    forward.join().expect("forward thread panicked");
    backward.join().expect("backward thread panicked");

    let owners: HashSet<_> = [StarId(1), StarId(2)]
        .iter()
        .map(|id| registry.owner_of(*id).unwrap())
        .collect();
    assert_eq!(owners, HashSet::from([alice, bob]));
    assert_eq!(registry.balance_of(&alice), 1);
    assert_eq!(registry.balance_of(&bob), 1);
}

#[test]
fn concurrent_creates_of_one_id_admit_a_single_owner() {
    const CREATORS: usize = 8;
    let registry = Arc::new(StarRegistry::default());
    let barrier = Arc::new(Barrier::new(CREATORS));

    let handles: Vec<_> = (0..CREATORS)
        .map(|n| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let creator = AccountId::from_label(&format!("creator-{}", n));
                barrier.wait();
                registry
                    .create_star("Popular", StarId(77), "", &creator)
                    .map(|_| creator)
            })
        })
        .collect();

    let created: Vec<_> = handles
        .into_iter()
        .filter_map(|handle| handle.join().expect("creator thread panicked").ok())
        .collect();

    assert_eq!(created.len(), 1);
    assert_eq!(registry.owner_of(StarId(77)).unwrap(), created[0]);
    assert_eq!(registry.total_supply(), 1);
}

#[test]
fn transfers_across_threads_keep_owner_index_consistent() {
    const THREADS: u64 = 4;
    const STARS_PER_THREAD: u64 = 50;
    let registry = Arc::new(StarRegistry::default());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let from = AccountId::from_label(&format!("from-{}", t));
                let to = AccountId::from_label(&format!("to-{}", t));
                for i in 0..STARS_PER_THREAD {
                    let id = StarId(t * STARS_PER_THREAD + i);
                    registry.create_star("Moving", id, "", &from).unwrap();
                    registry.transfer_star(&to, id, &from).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("transfer thread panicked");
    }

    assert_eq!(registry.total_supply() as u64, THREADS * STARS_PER_THREAD);
    for t in 0..THREADS {
        let from = AccountId::from_label(&format!("from-{}", t));
        let to = AccountId::from_label(&format!("to-{}", t));
        assert_eq!(registry.balance_of(&from), 0);
        let expected: Vec<_> = (0..STARS_PER_THREAD)
            .map(|i| StarId(t * STARS_PER_THREAD + i))
            .collect();
        assert_eq!(registry.stars_of(&to), expected);
    }
}
