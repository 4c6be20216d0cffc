//! Id-keyed object table shared between a device and the release hooks it
//! issues.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use corelib::{LibraryEpoch, ReleaseHook, ResourceId, ResourceKind};
use parking_lot::Mutex;

use crate::device::{RenderError, RenderResult};

pub(crate) trait Tracked {
    fn kind(&self) -> ResourceKind;
}

pub(crate) struct Registry<R> {
    next_id: u32,
    entries: HashMap<ResourceId, R>,
}

pub(crate) type SharedRegistry<R> = Arc<Mutex<Registry<R>>>;

impl<R: Tracked> Registry<R> {
    pub(crate) fn shared() -> SharedRegistry<R> {
        Arc::new(Mutex::new(Self {
            // 0 stays reserved as "no object"
            next_id: 1,
            entries: HashMap::new(),
        }))
    }

    pub(crate) fn insert(&mut self, record: R) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, record);
        id
    }

    fn check(&self, id: ResourceId, expected: ResourceKind) -> RenderResult<()> {
        match self.entries.get(&id) {
            None => Err(RenderError::Unknown { kind: expected, id }),
            Some(r) if r.kind() != expected => Err(RenderError::WrongKind {
                id,
                expected,
                actual: r.kind(),
            }),
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn get(&self, id: ResourceId, expected: ResourceKind) -> RenderResult<&R> {
        self.check(id, expected)?;
        self.entries
            .get(&id)
            .ok_or(RenderError::Unknown { kind: expected, id })
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId, expected: ResourceKind) -> RenderResult<&mut R> {
        self.check(id, expected)?;
        self.entries
            .get_mut(&id)
            .ok_or(RenderError::Unknown { kind: expected, id })
    }

    /// Remove `id` if it is a live object of `kind`.
    pub(crate) fn remove(&mut self, id: ResourceId, kind: ResourceKind) -> Option<R> {
        self.check(id, kind).ok()?;
        self.entries.remove(&id)
    }

    pub(crate) fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn count(&self, kind: ResourceKind) -> usize {
        self.entries.values().filter(|r| r.kind() == kind).count()
    }
}

/// Hook that removes objects of `kind` from `registry`. The hook does not
/// keep the registry alive; releasing after the device is gone is a no-op.
pub(crate) fn release_hook<R>(
    registry: &SharedRegistry<R>,
    epoch: &LibraryEpoch,
    kind: ResourceKind,
) -> ReleaseHook
where
    R: Tracked + Send + 'static,
{
    let registry: Weak<Mutex<Registry<R>>> = Arc::downgrade(registry);
    ReleaseHook::new(
        epoch,
        Arc::new(move |id| {
            registry
                .upgrade()
                .is_some_and(|r| r.lock().remove(id, kind).is_some())
        }),
    )
}
