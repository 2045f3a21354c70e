// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{registry, shared_store};
use test_log::test;
use vdisk_fs::{
    registry::{FocConfigMode, ObjectRegistration, ObjectTreeConfig, ObjectType},
    Error, Namespace, NodeId, ObjectId, OwnerTag, SnapshotName,
};

fn oid(s: &str) -> ObjectId {
    ObjectId::new(s)
}

fn ns(s: &str) -> Namespace {
    Namespace::new(s)
}

fn snap(s: &str) -> Option<SnapshotName> {
    Some(SnapshotName::new(s))
}

#[test]
fn register_find_unregister_roundtrip() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    assert!(registry.list()?.is_empty());

    let reg = registry.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;

    assert_eq!(oid("vol"), reg.object_id);
    assert_eq!(NodeId::new("node-a"), reg.node_id);
    assert_eq!(ObjectType::Volume, reg.tree_config.object_type);
    assert!(!reg.owner_tag.is_unassigned());

    assert_eq!(vec![oid("vol")], registry.list()?);
    assert_eq!(reg, registry.find_throw(&oid("vol"))?);

    registry.unregister(&oid("vol"))?;

    assert!(registry.list()?.is_empty());
    assert!(registry.find(&oid("vol"))?.is_none());

    Ok(())
}

#[test]
fn duplicate_registration_is_refused() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;

    assert!(matches!(
        registry.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic),
        Err(Error::ObjectAlreadyRegistered(_))
    ));

    Ok(())
}

#[test]
fn files_have_no_tree() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    let reg = registry.register_file(&oid("some/file"))?;

    assert_eq!(ObjectType::File, reg.tree_config.object_type);
    assert!(reg.tree_config.parent_volume.is_none());
    assert!(reg.tree_config.descendants.is_empty());
    assert_eq!(ns("some/file"), reg.namespace);

    // no clones off files
    assert!(matches!(
        registry.register_clone(
            &oid("clone"),
            &ns("clone"),
            &oid("some/file"),
            snap("s1").as_ref(),
            FocConfigMode::Automatic,
        ),
        Err(Error::InvalidOperation { .. })
    ));

    registry.unregister(&oid("some/file"))?;
    Ok(())
}

#[test]
fn clone_snapshot_rules() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("parent"), &ns("parent"), FocConfigMode::Automatic)?;

    // volume parent: snapshot required
    assert!(matches!(
        registry.register_clone(
            &oid("clone"),
            &ns("clone"),
            &oid("parent"),
            None,
            FocConfigMode::Automatic,
        ),
        Err(Error::InvalidOperation { .. })
    ));

    let clone =
        registry.register_clone(
            &oid("clone"),
            &ns("clone"),
            &oid("parent"),
            snap("s1").as_ref(),
            FocConfigMode::Automatic,
        )?;

    assert_eq!(Some(oid("parent")), clone.tree_config.parent_volume);

    let parent = registry.find_throw(&oid("parent"))?;
    assert_eq!(
        snap("s1"),
        *parent.tree_config.descendants.get(&oid("clone")).expect("linked")
    );

    // unregister the clone, templatize the parent, then clone without snapshot
    registry.unregister(&oid("clone"))?;
    registry.set_volume_as_template(&oid("parent"))?;

    assert!(matches!(
        registry.register_clone(
            &oid("clone"),
            &ns("clone"),
            &oid("parent"),
            snap("s1").as_ref(),
            FocConfigMode::Automatic,
        ),
        Err(Error::InvalidOperation { .. })
    ));

    let clone = registry.register_clone(
        &oid("clone"),
        &ns("clone"),
        &oid("parent"),
        None,
        FocConfigMode::Automatic,
    )?;

    let parent = registry.find_throw(&oid("parent"))?;
    assert_eq!(ObjectType::Template, parent.tree_config.object_type);
    assert_eq!(
        None,
        *parent.tree_config.descendants.get(&clone.object_id).expect("linked")
    );

    Ok(())
}

#[test]
fn unregister_refused_while_descendants_exist() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("parent"), &ns("parent"), FocConfigMode::Automatic)?;
    registry.register_clone(
        &oid("c1"),
        &ns("c1"),
        &oid("parent"),
        snap("s1").as_ref(),
        FocConfigMode::Automatic,
    )?;
    registry.register_clone(
        &oid("c2"),
        &ns("c2"),
        &oid("parent"),
        snap("s1").as_ref(),
        FocConfigMode::Automatic,
    )?;

    assert!(matches!(
        registry.unregister(&oid("parent")),
        Err(Error::InvalidOperation { .. })
    ));

    registry.unregister(&oid("c1"))?;

    assert!(matches!(
        registry.unregister(&oid("parent")),
        Err(Error::InvalidOperation { .. })
    ));

    registry.unregister(&oid("c2"))?;
    registry.unregister(&oid("parent"))?;

    assert!(registry.list()?.is_empty());
    Ok(())
}

#[test]
fn migrate_moves_ownership_and_bumps_tag() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry_a = registry(&store, "node-a");

    let reg = registry_a.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;
    let old_tag = reg.owner_tag;

    let moved = registry_a.migrate(&oid("vol"), &NodeId::new("node-a"), &NodeId::new("node-b"))?;

    assert_eq!(NodeId::new("node-b"), moved.node_id);
    assert!(moved.owner_tag > old_tag);
    assert_eq!(
        NodeId::new("node-b"),
        registry_a.find_throw(&oid("vol"))?.node_id
    );

    // migrating again with a stale `from` is refused
    assert!(matches!(
        registry_a.migrate(&oid("vol"), &NodeId::new("node-a"), &NodeId::new("node-c")),
        Err(Error::WrongOwner { .. })
    ));

    Ok(())
}

#[test]
fn wrong_owner_is_fenced() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry_a = registry(&store, "node-a");
    let registry_b = registry(&store, "node-b");

    registry_a.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;

    assert!(matches!(
        registry_b.unregister(&oid("vol")),
        Err(Error::WrongOwner { .. })
    ));
    assert!(matches!(
        registry_b.set_volume_as_template(&oid("vol")),
        Err(Error::WrongOwner { .. })
    ));
    assert!(matches!(
        registry_b.find_owned_throw(&oid("vol")),
        Err(Error::WrongOwner { .. })
    ));

    registry_a.find_owned_throw(&oid("vol"))?;
    Ok(())
}

#[test]
fn set_as_template_preconditions() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("parent"), &ns("parent"), FocConfigMode::Automatic)?;
    registry.register_clone(
        &oid("clone"),
        &ns("clone"),
        &oid("parent"),
        snap("s1").as_ref(),
        FocConfigMode::Automatic,
    )?;

    // parent has descendants
    assert!(matches!(
        registry.set_volume_as_template(&oid("parent")),
        Err(Error::InvalidOperation { .. })
    ));

    // clone of a non-template parent
    assert!(matches!(
        registry.set_volume_as_template(&oid("clone")),
        Err(Error::InvalidOperation { .. })
    ));

    registry.unregister(&oid("clone"))?;

    let reg = registry.set_volume_as_template(&oid("parent"))?;
    assert_eq!(ObjectType::Template, reg.tree_config.object_type);

    // idempotent
    let again = registry.set_volume_as_template(&oid("parent"))?;
    assert_eq!(ObjectType::Template, again.tree_config.object_type);

    // files cannot be templatized
    registry.register_file(&oid("file"))?;
    assert!(matches!(
        registry.set_volume_as_template(&oid("file")),
        Err(Error::InvalidOperation { .. })
    ));

    Ok(())
}

#[test]
fn foc_config_mode_can_be_changed() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    let reg = registry.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;
    assert_eq!(FocConfigMode::Automatic, reg.foc_config_mode);

    let reg = registry.set_foc_config_mode(&oid("vol"), FocConfigMode::Manual)?;
    assert_eq!(FocConfigMode::Manual, reg.foc_config_mode);
    assert_eq!(
        FocConfigMode::Manual,
        registry.find_throw(&oid("vol"))?.foc_config_mode
    );

    Ok(())
}

#[test]
fn convert_base_to_clone_relinks() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("parent"), &ns("parent"), FocConfigMode::Automatic)?;
    registry.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;

    let converted = registry.convert_base_to_clone(
        &oid("vol"),
        &ns("vol"),
        &oid("parent"),
        snap("s1").as_ref(),
        FocConfigMode::Automatic,
    )?;

    assert_eq!(Some(oid("parent")), converted.tree_config.parent_volume);

    let parent = registry.find_throw(&oid("parent"))?;
    assert!(parent.tree_config.descendants.contains_key(&oid("vol")));

    // converting something that is not registered fails
    assert!(matches!(
        registry.convert_base_to_clone(
            &oid("ghost"),
            &ns("ghost"),
            &oid("parent"),
            snap("s1").as_ref(),
            FocConfigMode::Automatic,
        ),
        Err(Error::ObjectNotRegistered(_))
    ));

    Ok(())
}

#[test]
fn legacy_registrations_are_upgraded_in_place() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry_a = registry(&store, "node-a");

    let legacy = ObjectRegistration {
        namespace: ns("vol"),
        object_id: oid("vol"),
        node_id: NodeId::new("node-a"),
        tree_config: ObjectTreeConfig::base(),
        owner_tag: OwnerTag::UNASSIGNED,
        foc_config_mode: FocConfigMode::Automatic,
    };

    // a version-2 registration has no owner tag on the wire
    registry_a.add_raw_registration(&legacy, 2)?;

    let reg = registry_a.find_throw(&oid("vol"))?;
    assert!(!reg.owner_tag.is_unassigned());

    // stable from now on
    let again = registry_a.find_throw(&oid("vol"))?;
    assert_eq!(reg.owner_tag, again.owner_tag);

    // legacy registrations of other nodes are left alone
    let foreign = ObjectRegistration {
        object_id: oid("other-vol"),
        namespace: ns("other-vol"),
        node_id: NodeId::new("node-z"),
        tree_config: ObjectTreeConfig::base(),
        owner_tag: OwnerTag::UNASSIGNED,
        foc_config_mode: FocConfigMode::Automatic,
    };
    registry_a.add_raw_registration(&foreign, 3)?;

    let reg = registry_a.find_throw(&oid("other-vol"))?;
    assert!(reg.owner_tag.is_unassigned());

    Ok(())
}

#[test]
fn wipe_out_purges_residue() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    registry.register_base_volume(&oid("parent"), &ns("parent"), FocConfigMode::Automatic)?;
    registry.register_clone(
        &oid("clone"),
        &ns("clone"),
        &oid("parent"),
        snap("s1").as_ref(),
        FocConfigMode::Automatic,
    )?;

    // not consistency-preserving: the parent keeps its descendant entry
    registry.wipe_out(&oid("clone"))?;

    assert!(registry.find(&oid("clone"))?.is_none());
    assert!(registry
        .find_throw(&oid("parent"))?
        .tree_config
        .descendants
        .contains_key(&oid("clone")));

    Ok(())
}

#[test]
fn destroy_wipes_the_cluster_prefix() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry_a = registry(&store, "node-a");

    registry_a.register_base_volume(&oid("vol"), &ns("vol"), FocConfigMode::Automatic)?;
    registry_a.register_file(&oid("file"))?;

    registry_a.destroy()?;

    assert!(registry_a.list()?.is_empty());
    Ok(())
}

#[test]
fn get_all_registrations_matches_list() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let registry = registry(&store, "node-a");

    for name in ["a", "b", "c"] {
        registry.register_base_volume(&oid(name), &ns(name), FocConfigMode::Automatic)?;
    }

    let regs = registry.get_all_registrations()?;
    let mut ids: Vec<_> = regs.iter().map(|r| r.object_id.clone()).collect();
    ids.sort();

    assert_eq!(vec![oid("a"), oid("b"), oid("c")], ids);
    Ok(())
}
