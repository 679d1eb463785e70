use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sector_ledger::refcounter::RefCounter;
use sector_ledger::wal::InMemoryWal;
use std::sync::Arc;
use tempfile::tempdir;

/// Drives a long randomized sequence of increment/decrement/swap/append
/// operations against a real `RefCounter` and a trivial in-memory model,
/// checking after every committed transaction that they agree.
#[test]
fn randomized_mutation_sequence_matches_reference_model() {
    let dir = tempdir().unwrap();
    let wal = Arc::new(InMemoryWal::new());
    let path = dir.path().join("contract.rc");
    let mut rc = RefCounter::new_ref_counter(&path, 8, wal).unwrap();
    let mut model: Vec<u16> = vec![1; 8];

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for _ in 0..500 {
        rc.start_update().unwrap();
        let n = model.len() as u64;
        let op = rng.random_range(0..4);
        let update = match op {
            0 => {
                let i = rng.random_range(0..n);
                if model[i as usize] == u16::MAX {
                    rc.update_applied().unwrap();
                    continue;
                }
                model[i as usize] += 1;
                rc.increment(i).unwrap()
            }
            1 => {
                let i = rng.random_range(0..n);
                if model[i as usize] == 0 {
                    rc.update_applied().unwrap();
                    continue;
                }
                model[i as usize] -= 1;
                rc.decrement(i).unwrap()
            }
            2 => {
                model.push(1);
                rc.append().unwrap()
            }
            _ => {
                let i = rng.random_range(0..n);
                let j = rng.random_range(0..n);
                model.swap(i as usize, j as usize);
                let pair = rc.swap(i, j).unwrap();
                rc.create_and_apply_transaction(vec![pair[0].clone(), pair[1].clone()])
                    .unwrap();
                rc.update_applied().unwrap();
                continue;
            }
        };
        rc.create_and_apply_transaction(vec![update]).unwrap();
        rc.update_applied().unwrap();
    }

    assert_eq!(rc.num_sectors(), model.len() as u64);
    for (i, expected) in model.iter().enumerate() {
        assert_eq!(rc.count(i as u64).unwrap(), *expected);
    }
}
