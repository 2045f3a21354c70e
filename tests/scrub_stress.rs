// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{coordinator, registry, shared_store};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use test_log::test;
use vdisk_fs::{
    kv::MemoryKv,
    registry::{FocConfigMode, ObjectRegistry},
    scrub::{
        ApplyScrubReplyFn, CollectGarbageFn, Garbage, ScrubManager, ScrubReply,
        ScrubTreeBuilder, ScrubbingCleanup,
    },
    Namespace, ObjectId, SnapshotName,
};

const NODES: usize = 3;
const DEPTH: usize = 4;
const CLONES_PER_LEVEL: usize = 5;
const FAILURE_RATE: f64 = 0.2;

const IDLE_PERIOD: Duration = Duration::from_secs(3600);

struct Node {
    manager: ScrubManager,
    registry: Arc<ObjectRegistry>,
    clone_applies: Arc<AtomicU64>,
}

#[allow(clippy::type_complexity)]
fn spawn_node(
    store: &Arc<MemoryKv>,
    name: &str,
    rng: &Arc<Mutex<StdRng>>,
    collected: &Arc<Mutex<Vec<Garbage>>>,
    parent_applies: &Arc<AtomicU64>,
    induced_failures: &Arc<AtomicU64>,
) -> Node {
    let reg = registry(store, name);
    let clone_applies = Arc::new(AtomicU64::new(0));

    let apply: ApplyScrubReplyFn = Box::new({
        let rng = rng.clone();
        let parent_applies = parent_applies.clone();
        let induced_failures = induced_failures.clone();
        let clone_applies = clone_applies.clone();

        move |_oid, _reply, cleanup| match cleanup {
            ScrubbingCleanup::OnError => {
                parent_applies.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Garbage(b"stress-garbage".to_vec())))
            }
            ScrubbingCleanup::Never => {
                if rng.lock().unwrap().random_bool(FAILURE_RATE) {
                    induced_failures.fetch_add(1, Ordering::SeqCst);
                    return Err(vdisk_fs::Error::Inconsistency("induced failure".into()));
                }

                clone_applies.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }
    });

    let build = ScrubTreeBuilder::new(
        reg.clone(),
        Box::new(move |_| vec![SnapshotName::new("snap")]),
    )
    .into_fn();

    let collect: CollectGarbageFn = Box::new({
        let collected = collected.clone();
        move |garbage| {
            collected.lock().unwrap().push(garbage);
            Ok(())
        }
    });

    let manager = ScrubManager::new(
        reg.clone(),
        coordinator(store),
        IDLE_PERIOD,
        apply,
        build,
        collect,
    )
    .expect("scrub manager starts");

    Node {
        manager,
        registry: reg,
        clone_applies,
    }
}

/// Registers a clone tree of `DEPTH` levels with `CLONES_PER_LEVEL` clones
/// per volume, distributing ownership round-robin over the nodes. Returns
/// the total number of clones.
fn build_clone_tree(nodes: &[Node], root: &ObjectId) -> usize {
    let mut level = vec![root.clone()];
    let mut total = 0;
    let mut next_node = 0;

    for depth in 0..DEPTH {
        let mut next_level = Vec::new();

        for parent in &level {
            for i in 0..CLONES_PER_LEVEL {
                let id = ObjectId::new(format!("{parent}/{depth}-{i}"));

                nodes[next_node % nodes.len()]
                    .registry
                    .register_clone(
                        &id,
                        &Namespace::new(id.as_str()),
                        parent,
                        Some(&SnapshotName::new("snap")),
                        FocConfigMode::Automatic,
                    )
                    .expect("clone registers");

                next_node += 1;
                total += 1;
                next_level.push(id);
            }
        }

        level = next_level;
    }

    total
}

#[test]
fn multi_node_propagation_with_random_failures() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(0x5eed)));
    let collected = Arc::new(Mutex::new(Vec::new()));
    let parent_applies = Arc::new(AtomicU64::new(0));
    let induced_failures = Arc::new(AtomicU64::new(0));

    let nodes: Vec<Node> = (0..NODES)
        .map(|i| {
            spawn_node(
                &store,
                &format!("node-{i}"),
                &rng,
                &collected,
                &parent_applies,
                &induced_failures,
            )
        })
        .collect();

    let root = ObjectId::new("root");
    nodes[0].registry.register_base_volume(
        &root,
        &Namespace::new("root"),
        FocConfigMode::Automatic,
    )?;

    let total_clones = build_clone_tree(&nodes, &root);

    let reply = ScrubReply {
        namespace: Namespace::new("root"),
        snapshot_name: SnapshotName::new("snap"),
        result_id: "stress-result".into(),
    };

    nodes[1].manager.queue_scrub_reply(&root, &reply)?;

    let mut done = false;

    for _ in 0..1_000 {
        for node in &nodes {
            node.manager.run_once();
        }

        let queues_empty = nodes[0].manager.get_parent_scrubs()?.is_empty()
            && nodes[0].manager.get_clone_scrubs()?.is_empty();

        if queues_empty && !collected.lock().unwrap().is_empty() {
            done = true;
            break;
        }
    }

    assert!(done, "scrub propagation did not converge");

    // garbage collected exactly once, by exactly one node
    assert_eq!(1, collected.lock().unwrap().len());
    assert_eq!(1, parent_applies.load(Ordering::SeqCst));

    let counters: Vec<_> = nodes.iter().map(|n| n.manager.get_counters()).collect();

    assert_eq!(1, counters.iter().map(|c| c.parent_scrubs_ok).sum::<u64>());
    assert_eq!(0, counters.iter().map(|c| c.parent_scrubs_nok).sum::<u64>());

    // every clone was applied exactly once, every induced failure counted
    let clone_ok: u64 = counters.iter().map(|c| c.clone_scrubs_ok).sum();
    let clone_nok: u64 = counters.iter().map(|c| c.clone_scrubs_nok).sum();

    assert_eq!(total_clones as u64, clone_ok);
    assert_eq!(
        total_clones as u64,
        nodes.iter().map(|n| n.clone_applies.load(Ordering::SeqCst)).sum::<u64>()
    );
    assert_eq!(induced_failures.load(Ordering::SeqCst), clone_nok);

    Ok(())
}
