//! Trace round-trip agreement: a workload recorded by the random driver
//! replays against every implementation, and with unique keys the
//! sequence of `delete_min` results must agree across all of them.

use std::collections::BTreeMap;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use heapkit::mem::{LazyMap, MemoryMap};
use heapkit::queue::PriorityQueue;
use heapkit::trace::{TraceOp, TraceReader, TraceWriter};

const OPS: usize = 100_000;

/// Generate a single-queue random workload in the style of the classic
/// DIMACS driver: unique priorities pack a random 32-bit value in the
/// high half and the node's serial name in the low half.
fn generate_trace(path: &Path, seed: u64) -> (u32, u32) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Shadow state: key -> node_id of all live nodes (keys are unique),
    // plus node_id -> current key for decrease targets.
    let mut by_key: BTreeMap<u64, u32> = BTreeMap::new();
    let mut key_of: Vec<u64> = Vec::new();

    let mut w = TraceWriter::create(path, 1, 0).expect("create trace");
    w.write_op(TraceOp::Create { pq_id: 0 }).expect("write");

    let mut next_name: u32 = 0;
    let mut ops = 1usize;
    while ops < OPS {
        let live = by_key.len();
        let roll: f64 = rng.gen();
        if live == 0 || roll < 0.40 {
            let name = next_name;
            next_name += 1;
            let key = ((rng.gen::<u32>() as u64) << 32) | name as u64;
            by_key.insert(key, name);
            key_of.push(key);
            w.write_op(TraceOp::Insert {
                pq_id: 0,
                node_id: name,
                key,
                item: name,
            })
            .expect("write");
        } else if roll < 0.60 {
            // Decrease a random live node to a not-larger unique key.
            let idx = rng.gen_range(0..key_of.len());
            let old = key_of[idx];
            let name = match by_key.get(&old) {
                Some(&n) if n as usize == idx => n,
                _ => {
                    continue; // node already deleted
                }
            };
            let hi = old >> 32;
            let new_hi = rng.gen_range(0..=hi);
            let new = (new_hi << 32) | name as u64;
            by_key.remove(&old);
            by_key.insert(new, name);
            key_of[idx] = new;
            w.write_op(TraceOp::DecreaseKey {
                pq_id: 0,
                node_id: name,
                key: new,
            })
            .expect("write");
        } else if roll < 0.70 {
            w.write_op(TraceOp::FindMin { pq_id: 0 }).expect("write");
        } else if roll < 0.75 {
            w.write_op(TraceOp::GetSize { pq_id: 0 }).expect("write");
        } else if roll < 0.80 {
            // Probe a random live node.
            let idx = rng.gen_range(0..key_of.len());
            if by_key.get(&key_of[idx]).map(|&n| n as usize) == Some(idx) {
                w.write_op(TraceOp::GetKey {
                    pq_id: 0,
                    node_id: idx as u32,
                })
                .expect("write");
            } else {
                continue;
            }
        } else if roll < 0.85 {
            // Delete an arbitrary live node.
            let idx = rng.gen_range(0..key_of.len());
            let old = key_of[idx];
            match by_key.get(&old) {
                Some(&n) if n as usize == idx => {
                    by_key.remove(&old);
                    w.write_op(TraceOp::Delete {
                        pq_id: 0,
                        node_id: idx as u32,
                    })
                    .expect("write");
                }
                _ => continue,
            }
        } else {
            let &key = by_key.keys().next().expect("nonempty");
            by_key.remove(&key);
            w.write_op(TraceOp::DeleteMin { pq_id: 0 }).expect("write");
        }
        ops += 1;
    }
    w.write_op(TraceOp::Destroy { pq_id: 0 }).expect("write");
    ops += 1;

    w.finish(1, next_name).expect("finish trace");
    (1, next_name)
}

/// Replay a trace against one implementation, returning the sequence of
/// keys handed back by `delete_min`.
fn replay<'m, M, Q>(map: &'m M, path: &Path) -> Vec<u64>
where
    M: MemoryMap,
    Q: PriorityQueue<'m, M, u64, u32>,
{
    let mut r = TraceReader::open(path).expect("open trace");
    let header = r.read_header().expect("read header");
    let mut queues: Vec<Option<Q>> = (0..header.pq_ids).map(|_| None).collect();
    let mut nodes: Vec<Option<Q::Handle>> = vec![None; header.node_ids as usize];
    let mut mins = Vec::new();

    while let Some(op) = r.read_op().expect("read op") {
        match op {
            TraceOp::Create { pq_id } => {
                queues[pq_id as usize] = Some(Q::new(map));
            }
            TraceOp::Destroy { pq_id } => {
                queues[pq_id as usize] = None;
            }
            TraceOp::Clear { pq_id } => {
                queues[pq_id as usize].as_mut().expect("live queue").clear();
            }
            TraceOp::GetKey { pq_id, node_id } => {
                let q = queues[pq_id as usize].as_ref().expect("live queue");
                let h = nodes[node_id as usize].expect("live node");
                // SAFETY: the generator only probes live nodes
                let _ = unsafe { q.key(h) };
            }
            TraceOp::GetItem { pq_id, node_id } => {
                let q = queues[pq_id as usize].as_ref().expect("live queue");
                let h = nodes[node_id as usize].expect("live node");
                // SAFETY: the generator only probes live nodes
                let _ = unsafe { q.item(h) };
            }
            TraceOp::GetSize { pq_id } => {
                let _ = queues[pq_id as usize].as_ref().expect("live queue").size();
            }
            TraceOp::Insert {
                pq_id,
                node_id,
                key,
                item,
            } => {
                let q = queues[pq_id as usize].as_mut().expect("live queue");
                nodes[node_id as usize] = Some(q.insert(item, key));
            }
            TraceOp::FindMin { pq_id } => {
                let _ = queues[pq_id as usize].as_ref().expect("live queue").find_min();
            }
            TraceOp::Delete { pq_id, node_id } => {
                let q = queues[pq_id as usize].as_mut().expect("live queue");
                let h = nodes[node_id as usize].take().expect("live node");
                // SAFETY: the generator deletes each node at most once
                unsafe {
                    q.delete(h);
                }
            }
            TraceOp::DeleteMin { pq_id } => {
                let q = queues[pq_id as usize].as_mut().expect("live queue");
                if let Some(k) = q.delete_min() {
                    mins.push(k);
                }
            }
            TraceOp::DecreaseKey {
                pq_id,
                node_id,
                key,
            } => {
                let q = queues[pq_id as usize].as_mut().expect("live queue");
                let h = nodes[node_id as usize].expect("live node");
                // SAFETY: the generator never raises a key
                unsafe {
                    q.decrease_key(h, key);
                }
            }
            TraceOp::Meld { .. } => {
                panic!("single-queue trace contains a meld");
            }
            TraceOp::Empty { pq_id } => {
                let _ = queues[pq_id as usize]
                    .as_ref()
                    .expect("live queue")
                    .is_empty();
            }
        }
    }
    mins
}

#[test]
fn all_variants_agree_on_delete_min_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("random.trace");
    generate_trace(&path, 0xC0FFEE);

    type Reference<'m> = heapkit::implicit::ImplicitHeap<'m, LazyMap, u64, u32, 4>;
    let map = LazyMap::new(&<Reference<'_>>::node_sizes());
    let reference = replay::<_, Reference<'_>>(&map, &path);
    assert!(!reference.is_empty());

    macro_rules! check {
        ($name:literal, $q:ty) => {{
            let map = LazyMap::new(&<$q>::node_sizes());
            let got = replay::<_, $q>(&map, &path);
            assert_eq!(got, reference, "{} disagrees with the reference", $name);
        }};
    }

    check!("binomial", heapkit::binomial::BinomialQueue<'_, LazyMap, u64, u32>);
    check!("explicit_2", heapkit::explicit::ExplicitHeap<'_, LazyMap, u64, u32, 2>);
    check!("explicit_8", heapkit::explicit::ExplicitHeap<'_, LazyMap, u64, u32, 8>);
    check!("fibonacci", heapkit::fibonacci::FibonacciHeap<'_, LazyMap, u64, u32>);
    check!("implicit_2", heapkit::implicit::ImplicitHeap<'_, LazyMap, u64, u32, 2>);
    check!("pairing", heapkit::pairing::PairingHeap<'_, LazyMap, u64, u32>);
    check!("quake", heapkit::quake::QuakeHeap<'_, LazyMap, u64, u32>);
    check!("rank_pairing", heapkit::rank_pairing::RankPairingHeap<'_, LazyMap, u64, u32>);
    check!(
        "rank_relaxed_weak",
        heapkit::rank_relaxed_weak::RankRelaxedWeakQueue<'_, LazyMap, u64, u32>
    );
    check!(
        "strict_fibonacci",
        heapkit::strict_fibonacci::StrictFibonacciHeap<'_, LazyMap, u64, u32>
    );
    check!("violation", heapkit::violation::ViolationHeap<'_, LazyMap, u64, u32>);
}

#[test]
fn map_clear_supports_repeat_replays() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("repeat.trace");
    generate_trace(&path, 42);

    type Q<'m> = heapkit::binomial::BinomialQueue<'m, LazyMap, u64, u32>;
    let map = LazyMap::new(&<Q<'_>>::node_sizes());
    let first = replay::<_, Q<'_>>(&map, &path);
    // Reset the map's bookkeeping without releasing chunks, the way a
    // benchmark driver avoids first-touch cost between runs.
    map.clear();
    let second = replay::<_, Q<'_>>(&map, &path);
    assert_eq!(first, second);
}

#[test]
fn deterministic_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.trace");
    let b = dir.path().join("b.trace");
    generate_trace(&a, 7);
    generate_trace(&b, 7);
    assert_eq!(
        std::fs::read(&a).expect("read a"),
        std::fs::read(&b).expect("read b")
    );
}
