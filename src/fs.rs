//! Filesystem boundary. Open files and inodes are owned by the platform's
//! filesystem; the core holds opaque reference handles and duplicates or
//! drops them through the [`Fs`] trait.

use crate::hal::HalSlot;

/// Opaque reference to an in-core inode.
#[derive(Debug, PartialEq, Eq)]
pub struct Inode(usize);

impl Inode {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> usize {
        self.0
    }
}

/// Opaque reference to an open file.
#[derive(Debug, PartialEq, Eq)]
pub struct File(usize);

impl File {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> usize {
        self.0
    }
}

pub trait Fs: Sync {
    /// Inode table setup and log recovery. Needs process context (it may
    /// sleep), so it runs from the first `fork_ret`, not from boot.
    fn init(&self, dev: u32);

    /// Resolves a path to an inode reference.
    fn namei(&self, path: &str) -> Option<Inode>;

    /// Takes another reference to an inode.
    fn idup(&self, inode: &Inode) -> Inode;

    /// Drops an inode reference. Must be called inside an op.
    fn iput(&self, inode: Inode);

    fn begin_op(&self);

    fn end_op(&self);

    /// Takes another reference to an open file.
    fn filedup(&self, file: &File) -> File;

    /// Drops an open-file reference.
    fn fileclose(&self, file: File);
}

static FS: HalSlot<dyn Fs> = HalSlot::new();

/// Registers the filesystem.
///
/// # Safety
/// Must be called while only one hart is running.
pub unsafe fn register(fs: &'static dyn Fs) {
    unsafe { FS.register(fs) };
}

/// Returns the registered filesystem.
pub fn fs() -> &'static dyn Fs {
    FS.get().expect("fs not registered")
}
