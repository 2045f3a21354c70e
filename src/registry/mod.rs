// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The cluster-replicated object directory.
//!
//! Records, for every managed object, which node currently owns it, its
//! backend namespace, its clone-tree position and its ownership tag. Every
//! mutation is one atomic key-value sequence whose asserts are pre-checked
//! against freshly read values, so concurrent updates from any node either
//! serialize (with retry) or surface as [`crate::Error::ConflictingUpdate`].

mod cached;
mod owner_tag;
mod registration;
mod tree_config;

pub use {
    cached::{CachedObjectRegistry, IgnoreCache, RefreshCache},
    owner_tag::{OwnerTag, OwnerTagAllocator},
    registration::{FocConfigMode, ObjectRegistration, ObjectRegistrationPtr},
    tree_config::{Descendants, ObjectTreeConfig, ObjectType},
};

use crate::coding::{Decode, Encode};
use crate::kv::{KvCoordinator, KvError, RetryOnAssert, Sequence};
use crate::{ClusterId, Namespace, NodeId, ObjectId, SnapshotName};
use std::sync::Arc;

/// The durable cluster directory of objects, owners and clone trees.
///
/// Keys live under `{cluster_id}/registrations/`; listing is a prefix scan.
/// The registry itself holds no mutable state: every operation re-reads the
/// affected registrations and commits through an asserted sequence.
pub struct ObjectRegistry {
    cluster_id: ClusterId,
    node_id: NodeId,
    kv: Arc<KvCoordinator>,
    owner_tags: OwnerTagAllocator,
}

impl ObjectRegistry {
    /// Opens the registry for one node of a cluster.
    ///
    /// # Errors
    ///
    /// Store failures while initializing the owner tag counter.
    pub fn new(
        cluster_id: ClusterId,
        node_id: NodeId,
        kv: Arc<KvCoordinator>,
    ) -> crate::Result<Self> {
        let owner_tags = OwnerTagAllocator::new(&cluster_id, kv.clone())?;

        Ok(Self {
            cluster_id,
            node_id,
            kv,
            owner_tags,
        })
    }

    /// The cluster this registry belongs to.
    #[must_use]
    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    /// The local node.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn prefix(&self) -> String {
        format!("{}/registrations/", self.cluster_id)
    }

    fn make_key(&self, oid: &ObjectId) -> String {
        format!("{}{oid}", self.prefix())
    }

    /// Maps a final assertion failure to `ConflictingUpdate`.
    fn run_sequence<F>(
        &self,
        id: &ObjectId,
        desc: &str,
        prepare: F,
        retry_on_assert: RetryOnAssert,
    ) -> crate::Result<()>
    where
        F: FnMut(&mut Sequence) -> crate::Result<()>,
    {
        match self.kv.run_sequence(desc, prepare, retry_on_assert) {
            Err(crate::Error::Kv(KvError::AssertionFailed)) => {
                Err(crate::Error::ConflictingUpdate(id.clone()))
            }
            res => res,
        }
    }

    /// Fetches and decodes a registration, also returning the raw buffer
    /// for use in asserts.
    fn find_raw(&self, key: &str) -> crate::Result<Option<(ObjectRegistration, Vec<u8>)>> {
        match self.kv.get(key) {
            Ok(buf) => {
                let reg = ObjectRegistration::decode_from_slice(&buf)?;
                Ok(Some((reg, buf)))
            }
            Err(KvError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Registrations that predate owner tags get a fresh tag assigned on
    /// first local observation; losing that race to another reader is fine.
    fn maybe_upgrade(&self, reg: ObjectRegistration) -> crate::Result<ObjectRegistration> {
        if !(reg.node_id == self.node_id && reg.owner_tag.is_unassigned()) {
            return Ok(reg);
        }

        log::info!("{}: old registration, upgrading it", reg.object_id);

        let key = self.make_key(&reg.object_id);
        let mut latest = reg;

        self.kv.run_sequence(
            "upgrade registration",
            |seq| {
                let Some((cur, buf)) = self.find_raw(&key)? else {
                    // unregistered under us; nothing left to upgrade
                    return Ok(());
                };

                if cur.node_id == self.node_id && cur.owner_tag.is_unassigned() {
                    let new_reg = ObjectRegistration {
                        owner_tag: self.owner_tags.allocate()?,
                        ..cur
                    };

                    seq.assert(&key, Some(buf));
                    seq.set(&key, new_reg.encode_into_vec());
                    latest = new_reg;
                } else {
                    latest = cur;
                }

                Ok(())
            },
            RetryOnAssert::Yes,
        )?;

        Ok(latest)
    }

    /// Looks up a registration.
    ///
    /// # Errors
    ///
    /// Store or decoding failures.
    pub fn find(&self, oid: &ObjectId) -> crate::Result<Option<ObjectRegistrationPtr>> {
        log::trace!("{}/{}: looking up {oid}", self.cluster_id, self.node_id);

        match self.find_raw(&self.make_key(oid))? {
            None => Ok(None),
            Some((reg, _)) => {
                debug_assert_eq!(*oid, reg.object_id);
                Ok(Some(Arc::new(self.maybe_upgrade(reg)?)))
            }
        }
    }

    /// Looks up a registration that must exist.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ObjectNotRegistered`] when absent.
    pub fn find_throw(&self, oid: &ObjectId) -> crate::Result<ObjectRegistrationPtr> {
        self.find(oid)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(oid.clone()))
    }

    /// Looks up a registration that must exist and be owned by this node.
    ///
    /// # Errors
    ///
    /// [`crate::Error::WrongOwner`] when another node owns the object.
    pub fn find_owned_throw(&self, oid: &ObjectId) -> crate::Result<ObjectRegistrationPtr> {
        let reg = self.find_throw(oid)?;

        if reg.node_id == self.node_id {
            Ok(reg)
        } else {
            log::error!(
                "object {oid} is not hosted by {} but by {}",
                self.node_id,
                reg.node_id,
            );

            Err(crate::Error::WrongOwner {
                id: oid.clone(),
                expected: self.node_id.clone(),
                actual: reg.node_id.clone(),
            })
        }
    }

    /// Lists all registered object ids.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn list(&self) -> crate::Result<Vec<ObjectId>> {
        let pfx = self.prefix();
        let keys = self.kv.prefix(&pfx, None)?;

        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(pfx.as_str()))
            .map(ObjectId::new)
            .collect())
    }

    /// Fetches all registrations; objects vanishing mid-scan are skipped.
    ///
    /// # Errors
    ///
    /// Store or decoding failures.
    pub fn get_all_registrations(&self) -> crate::Result<Vec<ObjectRegistrationPtr>> {
        let ids = self.list()?;
        let mut regs = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some(reg) = self.find(&id)? {
                regs.push(reg);
            }
        }

        Ok(regs)
    }

    /// Registers a new base volume owned by this node.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ObjectAlreadyRegistered`] on a duplicate id.
    pub fn register_base_volume(
        &self,
        oid: &ObjectId,
        nspace: &Namespace,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        log::info!(
            "{}/{}: registering {oid}, namespace {nspace}, foc config mode {foc_config_mode}",
            self.cluster_id,
            self.node_id,
        );

        self.register_base_or_file(oid, nspace, ObjectType::Volume, foc_config_mode)
    }

    /// Registers a new file owned by this node; the file's id doubles as its
    /// backend namespace.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ObjectAlreadyRegistered`] on a duplicate id.
    pub fn register_file(&self, oid: &ObjectId) -> crate::Result<ObjectRegistrationPtr> {
        log::info!("{}/{}: registering file {oid}", self.cluster_id, self.node_id);

        self.register_base_or_file(
            oid,
            &Namespace::new(oid.as_str()),
            ObjectType::File,
            FocConfigMode::Automatic,
        )
    }

    fn register_base_or_file(
        &self,
        oid: &ObjectId,
        nspace: &Namespace,
        typ: ObjectType,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        debug_assert!(matches!(typ, ObjectType::Volume | ObjectType::File));

        let reg = ObjectRegistration {
            namespace: nspace.clone(),
            object_id: oid.clone(),
            node_id: self.node_id.clone(),
            tree_config: if typ == ObjectType::Volume {
                ObjectTreeConfig::base()
            } else {
                ObjectTreeConfig::file()
            },
            owner_tag: self.owner_tags.allocate()?,
            foc_config_mode,
        };

        let key = self.make_key(oid);

        let res = self.run_sequence(
            oid,
            if typ == ObjectType::Volume {
                "register base volume"
            } else {
                "register file"
            },
            |seq| {
                seq.assert(&key, None);
                seq.set(&key, reg.encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        );

        match res {
            Ok(()) => Ok(Arc::new(reg)),
            Err(crate::Error::ConflictingUpdate(_)) => {
                log::error!("failed to register {oid} - already present!?");
                Err(crate::Error::ObjectAlreadyRegistered(oid.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Registers a clone of `parent_id`, linking it into the parent's
    /// descendants in the same atomic sequence.
    ///
    /// The snapshot is required when cloning from a volume and forbidden
    /// when cloning from a template. Concurrent sibling clones of the same
    /// parent all succeed (serializably).
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidOperation`] on illegal parent/snapshot
    /// combinations, [`crate::Error::ObjectAlreadyRegistered`] on duplicate
    /// ids.
    pub fn register_clone(
        &self,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.register_clone_internal(
            clone_id,
            clone_nspace,
            parent_id,
            maybe_parent_snap,
            false,
            foc_config_mode,
            "register clone",
        )
    }

    /// Re-registers an existing base volume as a clone of `parent_id`,
    /// replacing its registration in the same sequence.
    ///
    /// # Errors
    ///
    /// As [`register_clone`](Self::register_clone), plus
    /// [`crate::Error::ObjectNotRegistered`] when `clone_id` does not exist.
    pub fn convert_base_to_clone(
        &self,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.register_clone_internal(
            clone_id,
            clone_nspace,
            parent_id,
            maybe_parent_snap,
            true,
            foc_config_mode,
            "convert base to clone",
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn register_clone_internal(
        &self,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        convert: bool,
        foc_config_mode: FocConfigMode,
        desc: &str,
    ) -> crate::Result<ObjectRegistrationPtr> {
        let mut out = None;

        self.run_sequence(
            clone_id,
            desc,
            |seq| {
                out = Some(self.prepare_register_clone(
                    seq,
                    clone_id,
                    clone_nspace,
                    parent_id,
                    maybe_parent_snap,
                    convert,
                    foc_config_mode,
                )?);
                Ok(())
            },
            RetryOnAssert::Yes,
        )?;

        out.map(Arc::new).ok_or_else(|| {
            crate::Error::Inconsistency("clone registration produced no value".into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn prepare_register_clone(
        &self,
        seq: &mut Sequence,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        convert: bool,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistration> {
        let parent_key = self.make_key(parent_id);
        let clone_key = self.make_key(clone_id);

        // Pre-checking against the freshly read parent buffer guarantees
        // the asserts below hold in the absence of concurrent updates.
        let (parent_reg, parent_buf) = self
            .find_raw(&parent_key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(parent_id.clone()))?;

        match parent_reg.tree_config.object_type {
            ObjectType::File => {
                log::error!("clone {clone_id}: cannot clone from file {parent_id}");
                return Err(crate::Error::InvalidOperation {
                    id: clone_id.clone(),
                    reason: "cannot clone from a file",
                });
            }
            ObjectType::Volume if maybe_parent_snap.is_none() => {
                return Err(crate::Error::InvalidOperation {
                    id: clone_id.clone(),
                    reason: "cannot clone from a volume if no snapshot is specified",
                });
            }
            ObjectType::Template if maybe_parent_snap.is_some() => {
                return Err(crate::Error::InvalidOperation {
                    id: clone_id.clone(),
                    reason: "cannot clone from a template if a snapshot is specified",
                });
            }
            _ => {}
        }

        let mut new_descendants = parent_reg.tree_config.descendants.clone();

        if new_descendants
            .insert(clone_id.clone(), maybe_parent_snap.cloned())
            .is_some()
        {
            log::error!(
                "clone {clone_id} is already registered with parent {parent_id}"
            );
            return Err(crate::Error::ObjectAlreadyRegistered(clone_id.clone()));
        }

        let existing_clone = self.find_raw(&clone_key)?;

        if convert {
            let (_, old_clone_buf) = existing_clone
                .ok_or_else(|| crate::Error::ObjectNotRegistered(clone_id.clone()))?;

            seq.assert(&clone_key, Some(old_clone_buf));
            seq.delete(&clone_key);
        } else if existing_clone.is_some() {
            log::error!("clone {clone_id} is already registered in registry");
            return Err(crate::Error::ObjectAlreadyRegistered(clone_id.clone()));
        }

        let new_parent = ObjectRegistration {
            tree_config: ObjectTreeConfig::parent(
                parent_reg.tree_config.object_type,
                new_descendants,
                parent_reg.tree_config.parent_volume.clone(),
            ),
            ..parent_reg
        };

        let clone_reg = ObjectRegistration {
            namespace: clone_nspace.clone(),
            object_id: clone_id.clone(),
            node_id: self.node_id.clone(),
            tree_config: ObjectTreeConfig::clone_of(parent_id.clone()),
            owner_tag: self.owner_tags.allocate()?,
            foc_config_mode,
        };

        seq.assert(&parent_key, Some(parent_buf));
        seq.set(&parent_key, new_parent.encode_into_vec());
        seq.assert(&clone_key, None);
        seq.set(&clone_key, clone_reg.encode_into_vec());

        Ok(clone_reg)
    }

    /// Unregisters an object owned by this node.
    ///
    /// Unregistering a clone removes it from its parent's descendants in
    /// the same sequence; concurrent actions on sibling clones retry and
    /// serialize.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidOperation`] while descendants exist,
    /// [`crate::Error::WrongOwner`] when owned elsewhere.
    pub fn unregister(&self, id: &ObjectId) -> crate::Result<()> {
        log::info!("{}/{}: unregistering {id}", self.cluster_id, self.node_id);

        let reg = self.find_throw(id)?;

        match reg.tree_config.object_type {
            ObjectType::File => self.run_sequence(
                id,
                "unregister file",
                |seq| self.prepare_unregister_file(seq, id),
                RetryOnAssert::No,
            ),
            typ => self.run_sequence(
                id,
                if typ == ObjectType::Volume {
                    "unregister volume"
                } else {
                    "unregister template"
                },
                |seq| self.prepare_unregister_volumoid(seq, id),
                RetryOnAssert::Yes,
            ),
        }
    }

    fn prepare_unregister_file(&self, seq: &mut Sequence, id: &ObjectId) -> crate::Result<()> {
        let key = self.make_key(id);

        let (reg, buf) = self
            .find_raw(&key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))?;

        self.check_owner(id, &reg)?;
        debug_assert_eq!(ObjectType::File, reg.tree_config.object_type);

        seq.assert(&key, Some(buf));
        seq.delete(&key);
        Ok(())
    }

    fn prepare_unregister_volumoid(
        &self,
        seq: &mut Sequence,
        id: &ObjectId,
    ) -> crate::Result<()> {
        let key = self.make_key(id);

        let (reg, buf) = self
            .find_raw(&key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))?;

        self.check_owner(id, &reg)?;

        let tree_config = &reg.tree_config;

        if !tree_config.descendants.is_empty() {
            log::error!(
                "cannot remove {} {id} as it still has descendants",
                tree_config.object_type,
            );

            for (descendant, snap) in &tree_config.descendants {
                log::error!("descendant {descendant} (snapshot: {snap:?}) is still present");
            }

            return Err(crate::Error::InvalidOperation {
                id: id.clone(),
                reason: "cannot remove a volume or template that still has descendants",
            });
        }

        if let Some(parent_id) = &tree_config.parent_volume {
            let parent_key = self.make_key(parent_id);

            let (parent_reg, parent_buf) = self
                .find_raw(&parent_key)?
                .ok_or_else(|| crate::Error::ObjectNotRegistered(parent_id.clone()))?;

            if !matches!(
                parent_reg.tree_config.object_type,
                ObjectType::Volume | ObjectType::Template
            ) {
                // Proceeding with just deleting the clone would work, but
                // requiring consistency seems safest.
                log::error!(
                    "INCONSISTENCY: parent {parent_id} of {id} is neither a volume nor a template"
                );
                return Err(crate::Error::Inconsistency(format!(
                    "parent {parent_id} of {id} is neither a volume nor a template"
                )));
            }

            let mut new_descendants = parent_reg.tree_config.descendants.clone();

            if new_descendants.remove(id).is_none() {
                // Not necessarily corruption: a concurrent unregister may
                // have removed the same clone already.
                log::error!(
                    "parent {parent_id} does not refer to {id} anymore. Concurrently deleted?"
                );
                return Err(crate::Error::ConflictingUpdate(id.clone()));
            }

            let new_parent = ObjectRegistration {
                tree_config: ObjectTreeConfig::parent(
                    parent_reg.tree_config.object_type,
                    new_descendants,
                    parent_reg.tree_config.parent_volume.clone(),
                ),
                ..parent_reg
            };

            seq.assert(&parent_key, Some(parent_buf));
            seq.set(&parent_key, new_parent.encode_into_vec());
        }

        seq.assert(&key, Some(buf));
        seq.delete(&key);
        Ok(())
    }

    fn check_owner(&self, id: &ObjectId, reg: &ObjectRegistration) -> crate::Result<()> {
        if reg.node_id == self.node_id {
            Ok(())
        } else {
            log::error!(
                "object {id} is not hosted by {} but by {}",
                self.node_id,
                reg.node_id,
            );

            Err(crate::Error::WrongOwner {
                id: id.clone(),
                expected: self.node_id.clone(),
                actual: reg.node_id.clone(),
            })
        }
    }

    /// Moves ownership of `id` from `from` to `to`, stamping a fresh owner
    /// tag. A concurrent migration surfaces as
    /// [`crate::Error::ConflictingUpdate`]; there is deliberately no retry.
    ///
    /// # Errors
    ///
    /// [`crate::Error::WrongOwner`] when `from` does not own the object.
    pub fn migrate(
        &self,
        id: &ObjectId,
        from: &NodeId,
        to: &NodeId,
    ) -> crate::Result<ObjectRegistrationPtr> {
        log::info!(
            "{}/{}: trying to move {id} from {from} to {to}",
            self.cluster_id,
            self.node_id,
        );

        let key = self.make_key(id);

        let (old_reg, old_buf) = self
            .find_raw(&key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))?;

        if old_reg.node_id != *from {
            log::error!(
                "object {id} is not hosted by {from} but by {}",
                old_reg.node_id,
            );

            return Err(crate::Error::WrongOwner {
                id: id.clone(),
                expected: from.clone(),
                actual: old_reg.node_id.clone(),
            });
        }

        let new_reg = ObjectRegistration {
            node_id: to.clone(),
            owner_tag: self.owner_tags.allocate()?,
            ..old_reg
        };

        self.run_sequence(
            id,
            "migrate volume",
            |seq| {
                seq.assert(&key, Some(old_buf.clone()));
                seq.set(&key, new_reg.encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        )?;

        Ok(Arc::new(new_reg))
    }

    /// Promotes a volume owned by this node to a template.
    ///
    /// Requires no descendants, and a template parent if the volume is a
    /// clone. Idempotent on templates.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidOperation`] when the preconditions fail.
    pub fn set_volume_as_template(
        &self,
        id: &ObjectId,
    ) -> crate::Result<ObjectRegistrationPtr> {
        log::info!("{}/{}: setting {id} as template", self.cluster_id, self.node_id);

        let key = self.make_key(id);

        let (reg, buf) = self
            .find_raw(&key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))?;

        self.check_owner(id, &reg)?;

        match reg.tree_config.object_type {
            ObjectType::File => Err(crate::Error::InvalidOperation {
                id: id.clone(),
                reason: "cannot convert a file into a template",
            }),
            ObjectType::Template => {
                log::warn!("volume {id} was already set as template");
                Ok(Arc::new(reg))
            }
            ObjectType::Volume => {
                if !reg.tree_config.descendants.is_empty() {
                    return Err(crate::Error::InvalidOperation {
                        id: id.clone(),
                        reason: "cannot convert a volume with descendants into a template",
                    });
                }

                if let Some(parent_id) = &reg.tree_config.parent_volume {
                    let parent = self.find_throw(parent_id)?;

                    if parent.tree_config.object_type != ObjectType::Template {
                        return Err(crate::Error::InvalidOperation {
                            id: id.clone(),
                            reason: "cannot templatize a clone whose parent is not a template",
                        });
                    }
                }

                let new_reg = ObjectRegistration {
                    tree_config: ObjectTreeConfig::template(
                        reg.tree_config.parent_volume.clone(),
                    ),
                    ..reg
                };

                self.run_sequence(
                    id,
                    "set volume as template",
                    |seq| {
                        seq.assert(&key, Some(buf.clone()));
                        seq.set(&key, new_reg.encode_into_vec());
                        Ok(())
                    },
                    RetryOnAssert::No,
                )?;

                Ok(Arc::new(new_reg))
            }
        }
    }

    /// Changes the failover-cache config mode of an object owned by this
    /// node.
    ///
    /// # Errors
    ///
    /// [`crate::Error::WrongOwner`] when owned elsewhere.
    pub fn set_foc_config_mode(
        &self,
        id: &ObjectId,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        let key = self.make_key(id);

        let (reg, buf) = self
            .find_raw(&key)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))?;

        self.check_owner(id, &reg)?;

        let new_reg = ObjectRegistration {
            foc_config_mode,
            ..reg
        };

        self.run_sequence(
            id,
            "set FOC config mode",
            |seq| {
                seq.assert(&key, Some(buf.clone()));
                seq.set(&key, new_reg.encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        )?;

        Ok(Arc::new(new_reg))
    }

    /// Best-effort removal of any residue under an object's key.
    ///
    /// Not consistency-preserving: clone-tree edges pointing at the object
    /// are left alone. Meant for purging wreckage, not for regular
    /// unregistration.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn wipe_out(&self, oid: &ObjectId) -> crate::Result<()> {
        log::info!("{}/{}: wiping out {oid}", self.cluster_id, self.node_id);
        self.kv.delete_prefix(&self.make_key(oid))?;
        Ok(())
    }

    /// Removes all registrations and the owner tag counter, logging what is
    /// being leaked.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn destroy(&self) -> crate::Result<()> {
        log::info!("removing object registrations for {}", self.cluster_id);

        for oid in self.list()? {
            if let Some(reg) = self.find(&oid)? {
                log::warn!(
                    "{}: leaking {} {}",
                    self.cluster_id,
                    reg.tree_config.object_type,
                    reg.object_id,
                );
            }
        }

        self.kv.delete_prefix(&self.prefix())?;
        self.owner_tags.destroy()
    }

    #[doc(hidden)]
    pub fn add_raw_registration(
        &self,
        reg: &ObjectRegistration,
        version: u8,
    ) -> crate::Result<()> {
        let key = self.make_key(&reg.object_id);
        let buf = reg.encode_with_version(version)?;

        self.run_sequence(
            &reg.object_id,
            "add to registry",
            |seq| {
                seq.assert(&key, None);
                seq.set(&key, buf.clone());
                Ok(())
            },
            RetryOnAssert::No,
        )
    }
}
