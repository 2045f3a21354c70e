// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BuildScrubTreeFn, CloneNode, CloneTree};
use crate::registry::ObjectRegistry;
use crate::{ObjectId, SnapshotName};
use std::{collections::BTreeSet, sync::Arc};

/// Enumerates a volume's snapshots, oldest to newest. Supplied by the volume
/// layer; snapshot bookkeeping is outside this crate.
pub type ListSnapshotsFn = Box<dyn Fn(&ObjectId) -> Vec<SnapshotName> + Send + Sync>;

/// Computes which clones a scrub result propagates to.
///
/// A direct descendant enters the tree iff it was cloned from the scrubbed
/// snapshot or a younger one (or from a template, i.e. no snapshot at all).
/// An admitted descendant pulls in its entire own sub-tree; the snapshot
/// filter only applies at the first level, since deeper clones depend on
/// their ancestor wholesale.
pub struct ScrubTreeBuilder {
    registry: Arc<ObjectRegistry>,
    list_snapshots: ListSnapshotsFn,
}

impl ScrubTreeBuilder {
    /// Creates a builder over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ObjectRegistry>, list_snapshots: ListSnapshotsFn) -> Self {
        Self {
            registry,
            list_snapshots,
        }
    }

    /// Builds the clone tree for a scrub of `snap` on `parent_id`.
    ///
    /// # Errors
    ///
    /// Registry lookup failures.
    pub fn build(&self, parent_id: &ObjectId, snap: &SnapshotName) -> crate::Result<CloneTree> {
        let snapshots = (self.list_snapshots)(parent_id);

        // everything equal to or younger than the scrubbed snapshot
        let younger: BTreeSet<SnapshotName> = snapshots
            .into_iter()
            .skip_while(|s| s != snap)
            .collect();

        if younger.is_empty() {
            return Ok(CloneTree::new());
        }

        let Some(reg) = self.registry.find(parent_id)? else {
            return Ok(CloneTree::new());
        };

        let mut clones = CloneTree::new();

        for (child, child_snap) in &reg.tree_config.descendants {
            let admitted = match child_snap {
                Some(s) => younger.contains(s),
                None => true,
            };

            if admitted {
                log::info!(
                    "{parent_id}: adding ({child}, {child_snap:?}) to scrub tree as its snapshot is the same as / younger than {snap}"
                );

                clones.push(CloneNode {
                    id: child.clone(),
                    clones: self.collect_clones(child)?,
                });
            } else {
                log::info!(
                    "{parent_id}: *not* adding ({child}, {child_snap:?}) to scrub tree as its snapshot is not the same as / younger than {snap}"
                );
            }
        }

        Ok(clones)
    }

    /// The full descendant sub-tree of `oid`, no snapshot filtering.
    fn collect_clones(&self, oid: &ObjectId) -> crate::Result<CloneTree> {
        let Some(reg) = self.registry.find(oid)? else {
            return Ok(CloneTree::new());
        };

        let mut clones = CloneTree::new();

        for child in reg.tree_config.descendants.keys() {
            clones.push(CloneNode {
                id: child.clone(),
                clones: self.collect_clones(child)?,
            });
        }

        Ok(clones)
    }

    /// Wraps the builder as the scrub manager's tree callback.
    #[must_use]
    pub fn into_fn(self) -> BuildScrubTreeFn {
        Box::new(move |oid, snap| self.build(oid, snap))
    }
}
