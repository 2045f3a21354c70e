// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Extent, ExtentCache, ExtentId};
use crate::backend::{Backend, BackendError, Overwrite};
use crate::ContainerId;
use std::sync::{Arc, Mutex, MutexGuard};

struct State {
    size: u64,

    // Presence bitmap indexed by offset index. An index is marked iff the
    // corresponding extent object exists in the backend. Grows monotonically
    // within the container's lifetime and bounds enumeration.
    extents: Vec<bool>,
}

impl State {
    fn is_present(&self, idx: u32) -> bool {
        self.extents.get(idx as usize).copied().unwrap_or(false)
    }

    fn set_present(&mut self, idx: u32, present: bool) {
        let idx = idx as usize;

        if self.extents.len() <= idx {
            self.extents.resize(idx + 1, false);
        }

        if let Some(slot) = self.extents.get_mut(idx) {
            *slot = present;
        }
    }
}

/// A sparse byte-addressable object composed of fixed-size extents.
///
/// Reads page extents in through the shared cache; writes flush the touched
/// extent back to the backend before returning. Every public method holds
/// the container's lock for the whole call, so overlapping operations on one
/// container serialize and a read observes either the pre- or the post-image
/// of a concurrent write, never a torn mix.
pub struct Container {
    id: ContainerId,
    cache: Arc<ExtentCache>,
    backend: Arc<dyn Backend>,
    state: Mutex<State>,
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        cache: Arc<ExtentCache>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            id,
            cache,
            backend,
            state: Mutex::new(State {
                size: 0,
                extents: Vec::new(),
            }),
        }
    }

    /// The container's id.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock is poisoned")
    }

    /// Current logical size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    fn extent_id(&self, idx: u32) -> ExtentId {
        ExtentId::new(self.id.clone(), idx)
    }

    /// Pages in an extent that is marked present.
    fn find_extent(&self, eid: &ExtentId) -> crate::Result<Arc<Extent>> {
        let ext = self.cache.find(eid, |eid, path| {
            log::info!("{}: fetching extent {eid} to {}", self.id, path.display());

            match self.backend.read(path, &eid.to_string(), true) {
                Ok(()) => Ok(Some(Extent::new(path.to_path_buf()))),
                Err(BackendError::ObjectDoesNotExist(_)) => {
                    log::warn!("extent {eid} does not exist");
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })?;

        ext.ok_or_else(|| crate::Error::ExtentMissing(eid.clone()))
    }

    fn new_extent(&self, eid: &ExtentId) -> crate::Result<Arc<Extent>> {
        log::info!("{}: creating new extent {eid}", self.id);

        let ext = self
            .cache
            .find(eid, |_, path| Ok(Some(Extent::new(path.to_path_buf()))))?;

        ext.ok_or_else(|| crate::Error::ExtentMissing(eid.clone()))
    }

    fn find_or_create_extent(
        &self,
        state: &State,
        eid: &ExtentId,
    ) -> crate::Result<Arc<Extent>> {
        if state.is_present(eid.offset) {
            self.find_extent(eid)
        } else {
            self.new_extent(eid)
        }
    }

    /// Reads at `off` into `buf`, returning the number of bytes produced.
    ///
    /// The count is clamped to the container size; absent extents, sparse
    /// extent tails and the buffer remainder past the clamp all read as
    /// zeroes.
    ///
    /// # Errors
    ///
    /// Backend or local file I/O while paging in a present extent.
    pub fn read(&self, off: u64, buf: &mut [u8]) -> crate::Result<usize> {
        let state = self.lock();

        log::trace!("{}: read off {off}, size {}", self.id, buf.len());

        let to_read = (buf.len() as u64).min(state.size.saturating_sub(off)) as usize;

        // the part beyond the clamp reads as zeroes
        let (mut window, tail) = buf.split_at_mut(to_read);
        tail.fill(0);

        let mut off = off;

        while !window.is_empty() {
            let idx = (off / Extent::CAPACITY) as u32;
            let eoff = off % Extent::CAPACITY;
            let r = ((Extent::CAPACITY - eoff) as usize).min(window.len());

            let taken = window;
            let (chunk, rest) = taken.split_at_mut(r);
            window = rest;

            if state.is_present(idx) {
                let ext = self.find_extent(&self.extent_id(idx))?;
                ext.read(eoff, chunk)?;
            } else {
                chunk.fill(0);
            }

            off += r as u64;
        }

        Ok(to_read)
    }

    /// Writes `buf` at `off`, flushing each touched extent to the backend.
    ///
    /// # Errors
    ///
    /// Backend or local file I/O. A newly created extent whose flush failed
    /// is dropped from the cache and not marked present; an existing extent
    /// stays present.
    pub fn write(&self, off: u64, buf: &[u8]) -> crate::Result<usize> {
        let mut state = self.lock();

        log::trace!("{}: write off {off}, size {}", self.id, buf.len());

        let mut remaining = buf;
        let mut off = off;

        while !remaining.is_empty() {
            let idx = (off / Extent::CAPACITY) as u32;
            let eoff = off % Extent::CAPACITY;
            let r = ((Extent::CAPACITY - eoff) as usize).min(remaining.len());

            let (chunk, rest) = remaining.split_at(r);
            remaining = rest;

            let eid = self.extent_id(idx);
            let existed = state.is_present(idx);
            let ext = self.find_or_create_extent(&state, &eid)?;

            let flushed = ext
                .write(eoff, chunk)
                .map_err(crate::Error::from)
                .and_then(|()| {
                    self.backend
                        .write(&ext.path, &eid.to_string(), Overwrite::Yes)
                        .map_err(crate::Error::from)
                });

            if let Err(e) = flushed {
                log::error!("failed to write to extent {eid}: {e}");

                if !existed {
                    // not on the backend yet; release before erasing
                    drop(ext);
                    self.cache.erase(&eid);
                }

                return Err(e);
            }

            state.set_present(idx, true);
            off += r as u64;

            if off > state.size {
                state.size = off;
            }
        }

        Ok(buf.len())
    }

    /// Truncates or grows the container to exactly `new_size` bytes.
    ///
    /// Extents above the boundary are erased from cache and backend; the
    /// boundary extent is cut (or extended) to the remainder and flushed.
    ///
    /// # Errors
    ///
    /// Backend or local file I/O.
    pub fn resize(&self, new_size: u64) -> crate::Result<()> {
        let mut state = self.lock();

        log::trace!("{}: resize to {new_size}", self.id);

        let idx = (new_size / Extent::CAPACITY) as u32;
        let eoff = new_size % Extent::CAPACITY;

        let rm_from = if eoff == 0 {
            idx as usize
        } else {
            idx as usize + 1
        };

        for i in (rm_from..state.extents.len()).rev() {
            #[allow(clippy::cast_possible_truncation)]
            let off_idx = i as u32;

            if state.is_present(off_idx) {
                let eid = self.extent_id(off_idx);
                self.cache.erase(&eid);
                self.backend.remove(&eid.to_string())?;
                state.extents.truncate(i);
            }
        }

        state.extents.truncate(rm_from);

        // The extent holding the last byte keeps an exact length so a
        // restart can reconstruct the size from the backend listing.
        let boundary = if eoff != 0 {
            Some((idx, eoff))
        } else if idx > 0 {
            Some((idx - 1, Extent::CAPACITY))
        } else {
            None
        };

        if let Some((bidx, blen)) = boundary {
            let eid = self.extent_id(bidx);
            let existed = state.is_present(bidx);
            let ext = self.find_or_create_extent(&state, &eid)?;

            let flushed = ext
                .resize(blen)
                .map_err(crate::Error::from)
                .and_then(|()| {
                    self.backend
                        .write(&ext.path, &eid.to_string(), Overwrite::Yes)
                        .map_err(crate::Error::from)
                });

            if let Err(e) = flushed {
                log::error!("{eid}: failed to resize to {blen}: {e}");

                if !existed {
                    drop(ext);
                    self.cache.erase(&eid);
                }

                return Err(e);
            }

            state.set_present(bidx, true);
        }

        state.size = new_size;
        Ok(())
    }

    fn erase_extents(&self, state: &mut State, from_backend: bool) {
        for i in 0..state.extents.len() {
            #[allow(clippy::cast_possible_truncation)]
            let idx = i as u32;

            if state.is_present(idx) {
                let eid = self.extent_id(idx);

                self.cache.erase(&eid);

                if from_backend {
                    log::info!("removing extent {eid}");

                    if let Err(e) = self.backend.remove(&eid.to_string()) {
                        log::warn!(
                            "failed to remove {eid} from the backend - leaking it: {e}"
                        );
                    }

                    state.set_present(idx, false);
                }
            }
        }
    }

    /// Removes all extents from the cache and (best-effort) the backend.
    ///
    /// A failed backend deletion is logged and the extent leaked rather than
    /// blocking the unlink.
    pub fn unlink(&self) {
        let mut state = self.lock();

        log::info!("{}: unlink", self.id);

        self.erase_extents(&mut state, true);
        state.extents.clear();
        state.size = 0;
    }

    /// Drops all cached extents; backend objects, presence and size remain.
    pub fn drop_from_cache(&self) {
        let mut state = self.lock();

        log::trace!("{}: dropping from cache", self.id);

        self.erase_extents(&mut state, false);
    }

    fn resync(&self, state: &mut State) -> crate::Result<()> {
        for name in self.backend.list_objects()? {
            log::trace!("checking {name}");

            // everything that doesn't parse as an extent name is not ours
            if let Ok(eid) = name.parse::<ExtentId>() {
                if eid.container_id == self.id {
                    log::info!("found extent {eid}");
                    state.set_present(eid.offset, true);
                }
            }
        }

        for i in (0..state.extents.len()).rev() {
            #[allow(clippy::cast_possible_truncation)]
            let idx = i as u32;

            if state.is_present(idx) {
                let eid = self.extent_id(idx);
                state.size =
                    u64::from(idx) * Extent::CAPACITY + self.backend.get_size(&eid.to_string())?;
                break;
            }
        }

        Ok(())
    }

    /// Rebuilds presence and size from the backend listing.
    ///
    /// # Errors
    ///
    /// Backend failures; the container is left empty in that case.
    pub fn restart(&self) -> crate::Result<()> {
        let mut state = self.lock();

        log::trace!("{}: restart", self.id);

        self.erase_extents(&mut state, false);
        state.extents.clear();
        state.size = 0;

        if let Err(e) = self.resync(&mut state) {
            state.extents.clear();
            state.size = 0;
            return Err(e);
        }

        Ok(())
    }
}
