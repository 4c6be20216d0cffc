//! Device resource handles and their release hooks.
//!
//! Every handle carries the release routine of the library that created it.
//! When the hosting library is reloaded in place the [`LibraryEpoch`] advances
//! and previously issued hooks become stale: invoking one is refused instead
//! of calling into code that is no longer loaded. Revalidation swaps in fresh
//! hooks without touching the resource itself.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{CoreError, CoreResult};

/// Identifier of a device resource (buffer, texture, program, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    VertexArray,
    Shader,
    Program,
    Texture,
    Framebuffer,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Buffer,
        ResourceKind::VertexArray,
        ResourceKind::Shader,
        ResourceKind::Program,
        ResourceKind::Texture,
        ResourceKind::Framebuffer,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::VertexArray => "vertex array",
            ResourceKind::Shader => "shader",
            ResourceKind::Program => "program",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reload counter of the hosting library, shared by a device and every hook
/// it has issued.
#[derive(Clone, Debug, Default)]
pub struct LibraryEpoch(Arc<AtomicU32>);

impl LibraryEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the library as reloaded. Returns the new epoch.
    pub fn advance(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Release routine; returns `false` if the id was unknown to the device.
pub type ReleaseFn = Arc<dyn Fn(ResourceId) -> bool + Send + Sync>;

/// A release routine bound to the library epoch it was issued in.
#[derive(Clone)]
pub struct ReleaseHook {
    epoch: LibraryEpoch,
    issued: u32,
    release: ReleaseFn,
}

impl ReleaseHook {
    pub fn new(epoch: &LibraryEpoch, release: ReleaseFn) -> Self {
        Self {
            epoch: epoch.clone(),
            issued: epoch.current(),
            release,
        }
    }

    #[inline]
    pub fn issued_at(&self) -> u32 {
        self.issued
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.issued == self.epoch.current()
    }

    fn invoke(&self, kind: ResourceKind, id: ResourceId, name: &str) -> CoreResult<bool> {
        let current = self.epoch.current();
        if self.issued != current {
            return Err(CoreError::StaleReleaseHook {
                kind,
                name: name.to_owned(),
                issued: self.issued,
                current,
            });
        }
        Ok((self.release)(id))
    }
}

impl fmt::Debug for ReleaseHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHook")
            .field("issued", &self.issued)
            .field("current", &self.epoch.current())
            .finish()
    }
}

/// Type-level tag tying a [`Handle`] to a resource kind.
pub trait ResourceType {
    const KIND: ResourceKind;
}

macro_rules! resource_tags {
    ($($tag:ident => $kind:ident),* $(,)?) => {
        $(
            #[derive(Debug)]
            pub enum $tag {}

            impl ResourceType for $tag {
                const KIND: ResourceKind = ResourceKind::$kind;
            }
        )*
    };
}

resource_tags! {
    BufferTag => Buffer,
    VertexArrayTag => VertexArray,
    ShaderTag => Shader,
    ProgramTag => Program,
    TextureTag => Texture,
    FramebufferTag => Framebuffer,
}

pub type BufferHandle = Handle<BufferTag>;
pub type VertexArrayHandle = Handle<VertexArrayTag>;
pub type ShaderHandle = Handle<ShaderTag>;
pub type ProgramHandle = Handle<ProgramTag>;
pub type TextureHandle = Handle<TextureTag>;
pub type FramebufferHandle = Handle<FramebufferTag>;

/// Owning handle to a device resource. Not `Clone`: whoever holds the handle
/// is responsible for releasing it.
pub struct Handle<T: ResourceType> {
    id: ResourceId,
    name: String,
    hook: ReleaseHook,
    _kind: PhantomData<fn() -> T>,
}

impl<T: ResourceType> Handle<T> {
    pub fn new(id: ResourceId, name: impl Into<String>, hook: ReleaseHook) -> Self {
        Self {
            id,
            name: name.into(),
            hook,
            _kind: PhantomData,
        }
    }

    #[inline]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        T::KIND
    }

    pub fn hook(&self) -> &ReleaseHook {
        &self.hook
    }

    pub fn has_current_hook(&self) -> bool {
        self.hook.is_current()
    }

    /// Replace the release routine. The resource itself is untouched.
    pub fn refresh_hook(&mut self, hook: ReleaseHook) {
        self.hook = hook;
    }

    /// Release the resource through its hook.
    pub fn release(self) -> CoreResult<bool> {
        self.hook.invoke(T::KIND, self.id, &self.name)
    }
}

impl<T: ResourceType> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &T::KIND)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hook", &self.hook)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_hook(epoch: &LibraryEpoch, log: &Arc<Mutex<Vec<ResourceId>>>) -> ReleaseHook {
        let log = Arc::clone(log);
        ReleaseHook::new(
            epoch,
            Arc::new(move |id| {
                log.lock().unwrap().push(id);
                true
            }),
        )
    }

    #[test]
    fn release_calls_current_hook() {
        let epoch = LibraryEpoch::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = TextureHandle::new(ResourceId(7), "tex:test", recording_hook(&epoch, &log));
        assert_eq!(handle.kind(), ResourceKind::Texture);
        assert!(handle.release().unwrap());
        assert_eq!(*log.lock().unwrap(), vec![ResourceId(7)]);
    }

    #[test]
    fn reload_makes_hooks_stale_until_refreshed() {
        let epoch = LibraryEpoch::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = BufferHandle::new(ResourceId(1), "vbo", recording_hook(&epoch, &log));

        assert_eq!(epoch.advance(), 1);
        assert!(!handle.has_current_hook());

        handle.refresh_hook(recording_hook(&epoch, &log));
        assert!(handle.has_current_hook());
        assert_eq!(handle.hook().issued_at(), 1);
        assert!(handle.release().is_ok());
    }

    #[test]
    fn stale_hook_is_refused() {
        let epoch = LibraryEpoch::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = ProgramHandle::new(ResourceId(3), "prog", recording_hook(&epoch, &log));
        epoch.advance();

        let err = handle.release().unwrap_err();
        assert!(matches!(
            err,
            CoreError::StaleReleaseHook { kind: ResourceKind::Program, issued: 0, current: 1, .. }
        ));
        assert!(log.lock().unwrap().is_empty());
    }
}
