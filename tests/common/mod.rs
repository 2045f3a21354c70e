// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![allow(dead_code)]

use std::sync::Arc;
use vdisk_fs::{
    backend::MemoryBackend,
    filedriver::{ContainerManager, FileDriverConfig},
    kv::{KvCoordinator, MemoryKv},
    registry::ObjectRegistry,
    ClusterId, Namespace, NodeId,
};

pub const CLUSTER: &str = "test-cluster";

/// One in-process "store cluster" shared between any number of nodes.
pub fn shared_store() -> Arc<MemoryKv> {
    Arc::new(MemoryKv::default())
}

pub fn coordinator(store: &Arc<MemoryKv>) -> Arc<KvCoordinator> {
    Arc::new(KvCoordinator::new(store.clone()))
}

pub fn registry(store: &Arc<MemoryKv>, node: &str) -> Arc<ObjectRegistry> {
    Arc::new(
        ObjectRegistry::new(
            ClusterId::new(CLUSTER),
            NodeId::new(node),
            coordinator(store),
        )
        .expect("registry opens"),
    )
}

/// A container manager over a fresh memory backend and a scratch cache dir.
pub fn container_manager(
    dir: &tempfile::TempDir,
    backend: &Arc<MemoryBackend>,
) -> ContainerManager {
    let config = FileDriverConfig::new(dir.path(), Namespace::new("fd-namespace"))
        .with_extent_cache_capacity(32);

    ContainerManager::new(backend.clone(), &config).expect("manager opens")
}
