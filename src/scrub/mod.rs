// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Cluster-wide application of scrub results.
//!
//! A scrub reply must be applied to (a) its parent volume and then (b) every
//! descendant whose snapshot lineage contains the scrubbed snapshot; exactly
//! one node collects the eventual storage garbage. All queue state lives in
//! the key-value store under `scrubmgr/{cluster_id}/`:
//!
//! - scrub replies are first put on a parent queue (a map, persisted as one
//!   key),
//! - a periodic worker walks that queue; the node owning the parent applies
//!   the reply, computes the affected clone sub-tree and moves the entry to
//!   the clone index (keyed by a fresh UUID, with the garbage blob and tree
//!   stashed under UUID-derived keys),
//! - the worker then walks the clone index, applying the reply clone by
//!   clone; an emptied tree is finalized onto the finalizing node's garbage
//!   queue, whose garbage a later pass hands to the collector.
//!
//! Every transition is an asserted sequence, so concurrent managers on other
//! nodes see exactly one winner per step, and any node may crash between
//! steps without losing work.

mod tree_builder;

pub use tree_builder::{ListSnapshotsFn, ScrubTreeBuilder};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::kv::{KvCoordinator, KvError, RetryOnAssert};
use crate::periodic::PeriodicAction;
use crate::registry::ObjectRegistry;
use crate::{ClusterId, Namespace, NodeId, ObjectId, SnapshotName};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

/// A scrub worker's result artifact, opaque to this crate apart from its
/// identity.
///
/// The namespace must match the object id of the volume the reply is queued
/// against; the result id names the artifact within that namespace.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ScrubReply {
    /// Namespace the scrubbed volume stores its data in
    pub namespace: Namespace,

    /// The scrubbed snapshot
    pub snapshot_name: SnapshotName,

    /// Opaque name of the result artifact
    pub result_id: String,
}

impl Encode for ScrubReply {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.namespace.encode_into(writer)?;
        self.snapshot_name.encode_into(writer)?;
        self.result_id.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for ScrubReply {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            namespace: Namespace::decode_from(reader)?,
            snapshot_name: SnapshotName::decode_from(reader)?,
            result_id: String::decode_from(reader)?,
        })
    }
}

/// Opaque storage-garbage descriptor produced by applying a reply to the
/// parent and consumed by the garbage collector once all clones have seen
/// the reply.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Garbage(
    /// The serialized garbage descriptor
    pub Vec<u8>,
);

impl Encode for Garbage {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.0.len() as u32)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Decode for Garbage {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<BigEndian>()?;
        let mut bytes = vec![0; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }
}

/// One clone in a persisted scrub tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CloneNode {
    /// The clone
    pub id: ObjectId,

    /// Its own clones, which inherit the propagation obligation once this
    /// node has been applied
    pub clones: Vec<CloneNode>,
}

impl CloneNode {
    /// A leaf node.
    #[must_use]
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            clones: Vec::new(),
        }
    }
}

impl Encode for CloneNode {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.id.encode_into(writer)?;
        self.clones.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for CloneNode {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            id: ObjectId::decode_from(reader)?,
            clones: Vec::decode_from(reader)?,
        })
    }
}

/// The sub-tree of clones a reply still has to visit.
pub type CloneTree = Vec<CloneNode>;

/// Parent queue: replies awaiting application to their parent volume.
pub type ParentScrubs = BTreeMap<ScrubReply, ObjectId>;

type CloneScrubs = BTreeMap<ScrubReply, Uuid>;
type NodeGarbage = Vec<Uuid>;

/// How much an apply callback may clean up on the volume
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScrubbingCleanup {
    /// Clean up when the application fails (parent phase)
    OnError,

    /// Never clean up (clone phase; the garbage is collected separately)
    Never,
}

/// Applies a scrub reply to a volume hosted on this node.
///
/// Returns the storage garbage when applied with [`ScrubbingCleanup::OnError`]
/// (the parent phase); clone applications return `None`.
pub type ApplyScrubReplyFn = Box<
    dyn Fn(&ObjectId, &ScrubReply, ScrubbingCleanup) -> crate::Result<Option<Garbage>>
        + Send
        + Sync,
>;

/// Computes the sub-tree of clones a reply applies to; see
/// [`ScrubTreeBuilder`].
pub type BuildScrubTreeFn =
    Box<dyn Fn(&ObjectId, &SnapshotName) -> crate::Result<CloneTree> + Send + Sync>;

/// Consumes the garbage of a fully propagated reply.
pub type CollectGarbageFn = Box<dyn Fn(Garbage) -> crate::Result<()> + Send + Sync>;

/// Per-node progress counters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    /// Replies successfully applied to their parent on this node
    pub parent_scrubs_ok: u64,

    /// Replies dropped from the parent queue on this node
    pub parent_scrubs_nok: u64,

    /// Clone applications that succeeded on this node
    pub clone_scrubs_ok: u64,

    /// Clone applications that failed or found the clone gone
    pub clone_scrubs_nok: u64,
}

fn scrub_prefix(cluster_id: &ClusterId) -> String {
    format!("scrubmgr/{cluster_id}")
}

fn parent_scrubs_key(cluster_id: &ClusterId) -> String {
    format!("{}/parents", scrub_prefix(cluster_id))
}

fn clone_scrubs_index_key(cluster_id: &ClusterId) -> String {
    format!("{}/clones/index", scrub_prefix(cluster_id))
}

fn node_garbage_queue_key(cluster_id: &ClusterId, node_id: &NodeId) -> String {
    format!("{}/nodes/{node_id}/garbage", scrub_prefix(cluster_id))
}

enum ApplyOutcome {
    /// The object is not registered anywhere (anymore)
    NotRegistered,

    /// Another node owns the object; leave the work to it
    NotLocal,

    /// Applied locally
    Applied(Option<Garbage>),
}

struct Inner {
    registry: Arc<ObjectRegistry>,
    kv: Arc<KvCoordinator>,

    parent_scrubs_key: String,
    clone_scrubs_index_key: String,
    garbage_queue_key: String,

    apply_scrub_reply: ApplyScrubReplyFn,
    build_scrub_tree: BuildScrubTreeFn,
    collect_garbage: CollectGarbageFn,

    counters: Mutex<Counters>,
}

/// Two-phase scrub-reply application with garbage queueing.
///
/// Construction initializes the cluster-wide queue keys (racing other nodes
/// is fine) and spawns the periodic worker; dropping the manager stops the
/// worker. [`run_once`](Self::run_once) drives one full pass manually,
/// which tests and embedders use for deterministic stepping.
pub struct ScrubManager {
    inner: Arc<Inner>,
    _worker: PeriodicAction,
}

impl ScrubManager {
    /// Creates the manager for one node and starts its worker.
    ///
    /// The three callbacks are owned for the component's lifetime;
    /// `apply_scrub_reply` and `collect_garbage` are supplied by the
    /// enclosing volume driver, `build_scrub_tree` typically by a
    /// [`ScrubTreeBuilder`].
    ///
    /// # Errors
    ///
    /// Store failures during key initialization; thread spawn failures.
    pub fn new(
        registry: Arc<ObjectRegistry>,
        kv: Arc<KvCoordinator>,
        period: Duration,
        apply_scrub_reply: ApplyScrubReplyFn,
        build_scrub_tree: BuildScrubTreeFn,
        collect_garbage: CollectGarbageFn,
    ) -> crate::Result<Self> {
        let inner = Arc::new(Inner {
            parent_scrubs_key: parent_scrubs_key(registry.cluster_id()),
            clone_scrubs_index_key: clone_scrubs_index_key(registry.cluster_id()),
            garbage_queue_key: node_garbage_queue_key(
                registry.cluster_id(),
                registry.node_id(),
            ),
            registry,
            kv,
            apply_scrub_reply,
            build_scrub_tree,
            collect_garbage,
            counters: Mutex::new(Counters::default()),
        });

        inner.maybe_init_key::<ParentScrubs>(&inner.parent_scrubs_key)?;
        inner.maybe_init_key::<CloneScrubs>(&inner.clone_scrubs_index_key)?;
        inner.maybe_init_key::<NodeGarbage>(&inner.garbage_queue_key)?;

        let worker = PeriodicAction::spawn("scrub-manager", period, {
            let inner = inner.clone();
            move || inner.work()
        })?;

        Ok(Self {
            inner,
            _worker: worker,
        })
    }

    /// Puts a reply on the parent queue.
    ///
    /// Re-queueing the same `(object, reply)` pair is a no-op, as is
    /// queueing a reply that already made it to the clone phase.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidScrubReply`] when the reply is queued for a
    /// different object, or its namespace does not match `oid`.
    pub fn queue_scrub_reply(&self, oid: &ObjectId, reply: &ScrubReply) -> crate::Result<()> {
        self.inner.queue_scrub_reply(oid, reply)
    }

    /// Runs one full worker pass (parents, clones, garbage) synchronously.
    pub fn run_once(&self) {
        self.inner.work();
    }

    /// The current parent queue.
    ///
    /// # Errors
    ///
    /// Store or decoding failures.
    pub fn get_parent_scrubs(&self) -> crate::Result<ParentScrubs> {
        self.inner.get_state(&self.inner.parent_scrubs_key)
    }

    /// The replies currently in the clone phase.
    ///
    /// # Errors
    ///
    /// Store or decoding failures.
    pub fn get_clone_scrubs(&self) -> crate::Result<Vec<ScrubReply>> {
        let idx: CloneScrubs = self.inner.get_state(&self.inner.clone_scrubs_index_key)?;
        Ok(idx.into_keys().collect())
    }

    /// The remaining clone tree of a reply in the clone phase (empty once
    /// finished or unknown).
    ///
    /// # Errors
    ///
    /// Store or decoding failures.
    pub fn get_scrub_tree(&self, reply: &ScrubReply) -> crate::Result<CloneTree> {
        let idx: CloneScrubs = self.inner.get_state(&self.inner.clone_scrubs_index_key)?;

        let Some(uuid) = idx.get(reply) else {
            return Ok(CloneTree::new());
        };

        match self.inner.kv.get(&self.inner.clone_scrub_key(*uuid)) {
            Ok(buf) => Ok(CloneTree::decode_from_slice(&buf)?),
            Err(KvError::NotFound(_)) => {
                log::info!("{reply:?}: removed while trying to retrieve?");
                Ok(CloneTree::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// This node's progress counters.
    #[must_use]
    pub fn get_counters(&self) -> Counters {
        self.inner.counters()
    }

    /// Wipes all scrub manager state of the cluster.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn destroy(&self) -> crate::Result<()> {
        self.inner
            .kv
            .delete_prefix(&scrub_prefix(self.inner.registry.cluster_id()))?;
        Ok(())
    }
}

impl Inner {
    fn clone_scrub_key(&self, uuid: Uuid) -> String {
        format!(
            "{}/clones/{uuid}",
            scrub_prefix(self.registry.cluster_id())
        )
    }

    fn garbage_key(&self, uuid: Uuid) -> String {
        format!(
            "{}/garbage/{uuid}",
            scrub_prefix(self.registry.cluster_id())
        )
    }

    #[allow(clippy::expect_used)]
    fn counters(&self) -> Counters {
        *self.counters.lock().expect("lock is poisoned")
    }

    #[allow(clippy::expect_used)]
    fn bump<F: FnOnce(&mut Counters)>(&self, f: F) {
        f(&mut self.counters.lock().expect("lock is poisoned"));
    }

    fn get_state<T: Decode>(&self, key: &str) -> crate::Result<T> {
        Ok(T::decode_from_slice(&self.kv.get(key)?)?)
    }

    fn maybe_init_key<T: Encode + Default>(&self, key: &str) -> crate::Result<()> {
        if self.kv.exists(key)? {
            log::info!("{key} already initialized");
            return Ok(());
        }

        log::info!("initializing {key}");

        let res = self.kv.run_sequence(
            "initializing scrub state key",
            |seq| {
                seq.assert(key, None);
                seq.set(key, T::default().encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        );

        match res {
            Err(crate::Error::Kv(KvError::AssertionFailed)) => {
                log::info!("failed to initialize {key} - someone else beat us to it");
                Ok(())
            }
            other => other,
        }
    }

    fn queue_scrub_reply(&self, oid: &ObjectId, reply: &ScrubReply) -> crate::Result<()> {
        self.kv.run_sequence(
            "queue scrub reply",
            |seq| {
                let parent_buf = self.kv.get(&self.parent_scrubs_key)?;
                let mut parents = ParentScrubs::decode_from_slice(&parent_buf)?;

                if let Some(queued_for) = parents.get(reply) {
                    if queued_for == oid {
                        log::info!("{oid}: {reply:?} already on parent queue!");
                        return Ok(());
                    }

                    log::error!(
                        "attempt to queue {reply:?} for {oid} but it's already queued for {queued_for}"
                    );
                    return Err(crate::Error::InvalidScrubReply(format!(
                        "reply already queued for {queued_for}"
                    )));
                }

                // Object ids and volume namespaces coincide by construction;
                // enforcing that here keeps a misdirected reply from
                // scrubbing an unrelated volume.
                if oid.as_str() != reply.namespace.as_str() {
                    log::error!(
                        "scrub reply's namespace {} and object ID {oid} don't match!",
                        reply.namespace,
                    );
                    return Err(crate::Error::InvalidScrubReply(format!(
                        "namespace {} does not match object {oid}",
                        reply.namespace,
                    )));
                }

                let clone_buf = self.kv.get(&self.clone_scrubs_index_key)?;
                let clone_scrubs = CloneScrubs::decode_from_slice(&clone_buf)?;

                if clone_scrubs.contains_key(reply) {
                    log::info!("{reply:?}: already on clone queue!");
                    return Ok(());
                }

                parents.insert(reply.clone(), oid.clone());

                seq.assert(&self.parent_scrubs_key, Some(parent_buf));
                seq.set(&self.parent_scrubs_key, parents.encode_into_vec());
                Ok(())
            },
            RetryOnAssert::Yes,
        )
    }

    /// One full pass; individual failures are logged, never fatal, so one
    /// reply cannot stop progress on the others.
    fn work(&self) {
        log::trace!("inspecting parent scrub queue");

        match self.get_state::<ParentScrubs>(&self.parent_scrubs_key) {
            Ok(parents) => {
                for (reply, oid) in parents {
                    self.apply_to_parent(&oid, &reply);
                }
            }
            Err(e) => log::warn!("failed to read parent scrub queue: {e}"),
        }

        log::trace!("inspecting clone scrub queue");

        match self.get_state::<CloneScrubs>(&self.clone_scrubs_index_key) {
            Ok(clone_scrubs) => {
                for (reply, uuid) in clone_scrubs {
                    if let Err(e) = self.apply_to_clones(uuid, &reply) {
                        log::warn!("failed to apply {reply:?} to clones: {e}");
                    }
                }
            }
            Err(e) => log::warn!("failed to read clone scrub queue: {e}"),
        }

        if let Err(e) = self.collect_scrub_garbage() {
            log::warn!("failed to collect garbage: {e}");
        }
    }

    fn apply(
        &self,
        oid: &ObjectId,
        reply: &ScrubReply,
        cleanup: ScrubbingCleanup,
    ) -> crate::Result<ApplyOutcome> {
        let Some(reg) = self.registry.find(oid)? else {
            log::info!("{oid}: not registered (anymore?)");
            return Ok(ApplyOutcome::NotRegistered);
        };

        if reg.node_id == *self.registry.node_id() {
            log::info!("{oid}: registered locally, applying scrub reply");
            let garbage = (self.apply_scrub_reply)(oid, reply, cleanup)?;
            Ok(ApplyOutcome::Applied(garbage))
        } else {
            log::info!("{oid}: not registered here but on {}", reg.node_id);
            Ok(ApplyOutcome::NotLocal)
        }
    }

    fn apply_to_parent(&self, oid: &ObjectId, reply: &ScrubReply) {
        log::info!("{reply:?}: checking {oid}");

        match self.apply(oid, reply, ScrubbingCleanup::OnError) {
            Ok(ApplyOutcome::NotLocal) => {}
            Ok(ApplyOutcome::Applied(Some(garbage))) => {
                self.bump(|c| c.parent_scrubs_ok += 1);

                if let Err(e) = self.queue_to_clones(oid, reply, &garbage) {
                    log::warn!("{oid}: failed to hand {reply:?} to the clone phase: {e}");
                }
            }
            Ok(ApplyOutcome::Applied(None)) => {
                log::error!("{oid}: applying {reply:?} yielded no garbage. Dropping it.");
                self.bump(|c| c.parent_scrubs_nok += 1);
                self.drop_parent(oid, reply);
            }
            Ok(ApplyOutcome::NotRegistered) => {
                // The storage the reply refers to is leaked, but the queue
                // stays unblocked.
                self.bump(|c| c.parent_scrubs_nok += 1);
                self.drop_parent(oid, reply);
            }
            Err(e) => {
                log::error!("{oid}: failed to apply {reply:?}: {e}. Dropping it.");
                self.bump(|c| c.parent_scrubs_nok += 1);
                self.drop_parent(oid, reply);
            }
        }
    }

    fn drop_parent(&self, oid: &ObjectId, reply: &ScrubReply) {
        log::info!("{oid}: dropping {reply:?}");

        let res = self.kv.run_sequence(
            "dropping scrub reply",
            |seq| {
                let buf = self.kv.get(&self.parent_scrubs_key)?;
                let mut parents = ParentScrubs::decode_from_slice(&buf)?;

                if parents.remove(reply).is_some() {
                    seq.assert(&self.parent_scrubs_key, Some(buf));
                    seq.set(&self.parent_scrubs_key, parents.encode_into_vec());
                }

                Ok(())
            },
            RetryOnAssert::Yes,
        );

        if let Err(e) = res {
            log::warn!("{oid}: failed to drop {reply:?} from the parent queue: {e}");
        }
    }

    fn queue_to_clones(
        &self,
        oid: &ObjectId,
        reply: &ScrubReply,
        garbage: &Garbage,
    ) -> crate::Result<()> {
        log::info!("{reply:?}: queueing it to clones of {oid}");

        let clones = (self.build_scrub_tree)(oid, &reply.snapshot_name)?;
        let uuid = Uuid::new_v4();

        self.kv.run_sequence(
            "moving scrub reply from parent to clone queue",
            |seq| {
                let parent_buf = self.kv.get(&self.parent_scrubs_key)?;
                let mut parents = ParentScrubs::decode_from_slice(&parent_buf)?;

                if parents.remove(reply).is_none() {
                    log::warn!("{reply:?}: no longer on the parent queue - already moved?");
                    return Ok(());
                }

                let clone_buf = self.kv.get(&self.clone_scrubs_index_key)?;
                let mut clone_scrubs = CloneScrubs::decode_from_slice(&clone_buf)?;
                clone_scrubs.insert(reply.clone(), uuid);

                seq.assert(&self.parent_scrubs_key, Some(parent_buf));
                seq.assert(&self.clone_scrubs_index_key, Some(clone_buf));
                seq.set(self.garbage_key(uuid), garbage.encode_into_vec());
                seq.set(self.clone_scrub_key(uuid), clones.encode_into_vec());
                seq.set(&self.clone_scrubs_index_key, clone_scrubs.encode_into_vec());
                seq.set(&self.parent_scrubs_key, parents.encode_into_vec());

                log::info!("{reply:?}: moving from parent {oid} to clones, UUID {uuid}");
                Ok(())
            },
            RetryOnAssert::Yes,
        )
    }

    fn apply_to_clones(&self, uuid: Uuid, reply: &ScrubReply) -> crate::Result<()> {
        log::info!("{reply:?}: applying to clones, UUID {uuid}");

        let clones = match self.kv.get(&self.clone_scrub_key(uuid)) {
            Ok(buf) => CloneTree::decode_from_slice(&buf)?,
            Err(KvError::NotFound(_)) => {
                log::info!(
                    "{reply:?}: no more clones found, someone else must have cleaned up already"
                );
                CloneTree::new()
            }
            Err(e) => return Err(e.into()),
        };

        for clone in &clones {
            self.apply_to_clone(uuid, &clone.id, reply)?;
        }

        if clones.is_empty() {
            self.finalize(uuid, reply)?;
        }

        Ok(())
    }

    fn apply_to_clone(
        &self,
        uuid: Uuid,
        oid: &ObjectId,
        reply: &ScrubReply,
    ) -> crate::Result<()> {
        log::info!("{reply:?}: applying to clone {oid}, UUID {uuid}");

        match self.apply(oid, reply, ScrubbingCleanup::Never) {
            Ok(ApplyOutcome::NotLocal) => Ok(()),
            Ok(ApplyOutcome::Applied(garbage)) => {
                debug_assert!(garbage.is_none());

                self.bump(|c| c.clone_scrubs_ok += 1);

                log::info!(
                    "{oid}: successfully applied {reply:?}, UUID {uuid} - dropping it"
                );
                self.drop_clone(uuid, oid, reply, true)
            }
            Ok(ApplyOutcome::NotRegistered) => {
                log::info!(
                    "{oid}: failed to apply {reply:?}, UUID {uuid}: not present anymore, dropping it"
                );

                self.bump(|c| c.clone_scrubs_nok += 1);

                // the orphaned sub-tree is the volume layer's problem;
                // children are deliberately not promoted
                self.drop_clone(uuid, oid, reply, false)
            }
            Err(e) => {
                log::error!("{oid}: failed to apply {reply:?}, UUID {uuid}: {e}");
                self.bump(|c| c.clone_scrubs_nok += 1);
                Err(e)
            }
        }
    }

    fn drop_clone(
        &self,
        uuid: Uuid,
        oid: &ObjectId,
        reply: &ScrubReply,
        promote_children: bool,
    ) -> crate::Result<()> {
        log::info!(
            "{reply:?}: removing clone {oid} from queue, UUID {uuid}, promoting children: {promote_children}"
        );

        let key = self.clone_scrub_key(uuid);

        let res = self.kv.run_sequence(
            "erase clone from scrub tree",
            |seq| {
                let buf = match self.kv.get(&key) {
                    Ok(buf) => buf,
                    Err(KvError::NotFound(_)) => {
                        log::info!(
                            "{reply:?}, UUID {uuid}: no more clones found, someone else must have cleaned up already"
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };

                let mut clones = CloneTree::decode_from_slice(&buf)?;

                if let Some(pos) = clones.iter().position(|c| c.id == *oid) {
                    let node = clones.remove(pos);

                    if promote_children {
                        // splice the children in at the removed node's level
                        for (i, child) in node.clones.into_iter().enumerate() {
                            clones.insert(pos + i, child);
                        }
                    }

                    seq.assert(&key, Some(buf));
                    seq.set(&key, clones.encode_into_vec());
                }

                Ok(())
            },
            RetryOnAssert::Yes,
        );

        match res {
            Err(crate::Error::Kv(KvError::NotFound(_))) => Ok(()),
            other => other,
        }
    }

    fn finalize(&self, uuid: Uuid, reply: &ScrubReply) -> crate::Result<()> {
        log::info!("{reply:?}, UUID {uuid}: all done, cleaning up");

        let res = self.kv.run_sequence(
            "finalize scrub reply",
            |seq| {
                let clone_buf = self.kv.get(&self.clone_scrubs_index_key)?;
                let mut clone_scrubs = CloneScrubs::decode_from_slice(&clone_buf)?;

                if clone_scrubs.remove(reply).is_some() {
                    seq.assert(&self.clone_scrubs_index_key, Some(clone_buf));
                    seq.set(&self.clone_scrubs_index_key, clone_scrubs.encode_into_vec());

                    let garbage_buf = self.kv.get(&self.garbage_queue_key)?;
                    let mut garbage_list = NodeGarbage::decode_from_slice(&garbage_buf)?;
                    garbage_list.push(uuid);

                    seq.assert(&self.garbage_queue_key, Some(garbage_buf));
                    seq.set(&self.garbage_queue_key, garbage_list.encode_into_vec());

                    seq.delete(self.clone_scrub_key(uuid));
                }

                Ok(())
            },
            RetryOnAssert::Yes,
        );

        match res {
            Err(crate::Error::Kv(KvError::NotFound(_))) => {
                log::info!("{reply:?}, UUID {uuid}: someone else collected our garbage!?");
                Ok(())
            }
            other => other,
        }
    }

    fn collect_scrub_garbage(&self) -> crate::Result<()> {
        log::trace!("collecting garbage");

        self.kv.run_sequence(
            "collect garbage",
            |seq| {
                let buf = self.kv.get(&self.garbage_queue_key)?;
                let garbage_list = NodeGarbage::decode_from_slice(&buf)?;

                seq.assert(&self.garbage_queue_key, Some(buf));

                for uuid in &garbage_list {
                    let garbage =
                        Garbage::decode_from_slice(&self.kv.get(&self.garbage_key(*uuid))?)?;
                    (self.collect_garbage)(garbage)?;
                    seq.delete(self.garbage_key(*uuid));
                }

                seq.set(&self.garbage_queue_key, NodeGarbage::new().encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        )
    }
}
