// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{registry, shared_store};
use test_log::test;
use vdisk_fs::{
    registry::FocConfigMode,
    scrub::ScrubTreeBuilder,
    Namespace, ObjectId, SnapshotName,
};

fn snap(s: &str) -> SnapshotName {
    SnapshotName::new(s)
}

#[test]
fn selective_sub_tree_by_snapshot_age() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let reg = registry(&store, "node-a");

    let parent = ObjectId::new("parent");
    reg.register_base_volume(&parent, &Namespace::new("parent"), FocConfigMode::Automatic)?;

    // clone c1 hangs off s1, clone c2 off the younger s2
    reg.register_clone(
        &ObjectId::new("c1"),
        &Namespace::new("c1"),
        &parent,
        Some(&snap("s1")),
        FocConfigMode::Automatic,
    )?;
    reg.register_clone(
        &ObjectId::new("c2"),
        &Namespace::new("c2"),
        &parent,
        Some(&snap("s2")),
        FocConfigMode::Automatic,
    )?;

    let builder = ScrubTreeBuilder::new(
        reg.clone(),
        Box::new(|_| vec![snap("s1"), snap("s2")]),
    );

    // scrubbing s2 only affects the clone taken from s2
    let tree = builder.build(&parent, &snap("s2"))?;
    let ids: Vec<_> = tree.iter().map(|c| c.id.clone()).collect();
    assert_eq!(vec![ObjectId::new("c2")], ids);

    // scrubbing s1 affects both
    let tree = builder.build(&parent, &snap("s1"))?;
    let ids: Vec<_> = tree.iter().map(|c| c.id.clone()).collect();
    assert_eq!(vec![ObjectId::new("c1"), ObjectId::new("c2")], ids);

    // an unknown snapshot affects nothing
    assert!(builder.build(&parent, &snap("s3"))?.is_empty());

    Ok(())
}

#[test]
fn admitted_clones_bring_their_whole_sub_tree() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let reg = registry(&store, "node-a");

    let parent = ObjectId::new("parent");
    reg.register_base_volume(&parent, &Namespace::new("parent"), FocConfigMode::Automatic)?;

    reg.register_clone(
        &ObjectId::new("c1"),
        &Namespace::new("c1"),
        &parent,
        Some(&snap("s1")),
        FocConfigMode::Automatic,
    )?;

    // a grand-child cloned from a *different* snapshot of c1: no filter
    // applies below the first level
    reg.register_clone(
        &ObjectId::new("c1-child"),
        &Namespace::new("c1-child"),
        &ObjectId::new("c1"),
        Some(&snap("unrelated")),
        FocConfigMode::Automatic,
    )?;

    let builder = ScrubTreeBuilder::new(
        reg.clone(),
        Box::new(|_| vec![snap("s1"), snap("s2")]),
    );

    let tree = builder.build(&parent, &snap("s1"))?;

    assert_eq!(1, tree.len());
    assert_eq!(ObjectId::new("c1"), tree[0].id);
    assert_eq!(1, tree[0].clones.len());
    assert_eq!(ObjectId::new("c1-child"), tree[0].clones[0].id);

    Ok(())
}

#[test]
fn template_clones_are_always_admitted() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let reg = registry(&store, "node-a");

    let parent = ObjectId::new("parent");
    reg.register_base_volume(&parent, &Namespace::new("parent"), FocConfigMode::Automatic)?;
    reg.set_volume_as_template(&parent)?;

    reg.register_clone(
        &ObjectId::new("c1"),
        &Namespace::new("c1"),
        &parent,
        None,
        FocConfigMode::Automatic,
    )?;

    let builder = ScrubTreeBuilder::new(
        reg.clone(),
        Box::new(|_| vec![snap("s1")]),
    );

    let tree = builder.build(&parent, &snap("s1"))?;
    assert_eq!(1, tree.len());
    assert_eq!(ObjectId::new("c1"), tree[0].id);

    Ok(())
}
