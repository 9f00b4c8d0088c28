//! Property tests for the open-addressing hashmap against a model.

use std::collections::HashMap;

use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use sparnel_types::{Map, Value};

#[derive(Debug, Clone)]
enum Op {
    Insert(i64, i64),
    Remove(i64),
    Lookup(i64),
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        // Small key space to force collisions, reuse and tombstone churn.
        let key = i64::arbitrary(g).rem_euclid(64);
        match u8::arbitrary(g) % 3 {
            0 => Op::Insert(key, i64::arbitrary(g)),
            1 => Op::Remove(key),
            _ => Op::Lookup(key),
        }
    }
}

#[quickcheck]
fn behaves_like_a_model_map(ops: Vec<Op>) -> bool {
    let mut map = Map::new();
    let mut model: HashMap<i64, i64> = HashMap::new();

    for op in ops {
        match op {
            Op::Insert(k, v) => {
                let prev = map.insert(Value::Int(k), Value::Int(v)).unwrap();
                let model_prev = model.insert(k, v);
                if prev != model_prev.map(Value::Int) {
                    return false;
                }
            }
            Op::Remove(k) => {
                let prev = map.remove(&Value::Int(k)).unwrap();
                if prev != model.remove(&k).map(Value::Int) {
                    return false;
                }
            }
            Op::Lookup(k) => {
                let got = map.get(&Value::Int(k)).unwrap();
                if got != model.get(&k).copied().map(Value::Int) {
                    return false;
                }
            }
        }
        if map.len() != model.len() {
            return false;
        }
    }
    true
}

#[quickcheck]
fn delete_heavy_sequences_keep_lookups_cheap(rounds: u8) -> bool {
    // The regression this guards: unbounded tombstone accumulation turning
    // lookups into full-table scans.
    let mut map = Map::new();
    for r in 0..rounds as i64 + 1 {
        for i in 0..32 {
            map.insert(Value::Int(r * 100 + i), Value::Int(i)).unwrap();
        }
        for i in 0..32 {
            map.remove(&Value::Int(r * 100 + i)).unwrap();
        }
    }
    // Every lookup on the emptied map must terminate quickly; a poisoned
    // table would make these probes walk thousands of slots. The empty map
    // also must not have grown beyond a small multiple of its peak size.
    (0..256).all(|i| map.get(&Value::Int(i)).unwrap().is_none()) && map.is_empty()
}
