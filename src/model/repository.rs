//! The in-memory repository tree: a concurrent map from [`LongId`] to
//! [`Object`], standing in for the on-disk object store described in
//! `spec.md` §3. Mutations are expected to happen only while the caller
//! holds the repository's [`crate::rwlock::RwLock`] writer side
//! (`spec.md` §5).

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};

use super::longid::LongId;
use super::object::{Object, ShortId};
use crate::error::{Error, Result};

/// A single repository's object tree plus its own authoritative
/// `host:port`, used throughout mastership and replication to stamp
/// `master-repository` hints and to answer `A1`'s "is this me" checks.
///
/// Also holds the immutable-file content store, keyed by [`ShortId`] --
/// in the original this is a separate on-disk blob pool; here it's an
/// in-memory stand-in sufficient to make fingerprint dedup and file copy
/// testable end-to-end.
pub struct Repository {
    host_port: String,
    objects: DashMap<LongId, Object>,
    content: DashMap<ShortId, Vec<u8>>,
    next_short_id: AtomicU32,
}

impl Repository {
    /// Creates a repository with only its root object, non-master by
    /// default (callers seed mastership explicitly, as `spec.md`'s
    /// scenario S1 does for `R1`).
    pub fn new(host_port: impl Into<String>, root: Object) -> Self {
        let objects = DashMap::new();
        objects.insert(LongId::root(), root);
        Self { host_port: host_port.into(), objects, content: DashMap::new(), next_short_id: AtomicU32::new(1) }
    }

    /// Allocates a never-reused `ShortId` for a newly stored file's
    /// content.
    pub fn alloc_short_id(&self) -> ShortId {
        self.next_short_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn store_content(&self, short_id: ShortId, bytes: Vec<u8>) {
        self.content.insert(short_id, bytes);
    }

    pub fn read_content(&self, short_id: ShortId) -> Result<Vec<u8>> {
        self.content.get(&short_id).map(|b| b.clone()).ok_or(Error::NotFound)
    }

    /// Finds an existing immutable file or directory with the given
    /// content fingerprint, for the replication engine's dedup check
    /// (`spec.md` §4.3, §8 property 17; "Immutable directory copy"'s
    /// "pre-existing immutable copy with the same fingerprint").
    pub fn find_by_fingerprint(&self, tag: crate::fp::Tag) -> Option<LongId> {
        self.objects
            .iter()
            .find(|entry| {
                let o = entry.value();
                if !o.kind.is_immutable() {
                    return false;
                }
                o.file.as_ref().map(|f| f.fingerprint) == Some(tag) || o.dir.as_ref().and_then(|d| d.fingerprint()) == Some(tag)
            })
            .map(|entry| entry.key().clone())
    }

    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    pub fn lookup(&self, id: &LongId) -> Result<Ref<'_, LongId, Object>> {
        self.objects.get(id).ok_or(Error::NotFound)
    }

    pub fn lookup_mut(&self, id: &LongId) -> Result<RefMut<'_, LongId, Object>> {
        self.objects.get_mut(id).ok_or(Error::NotFound)
    }

    pub fn contains(&self, id: &LongId) -> bool {
        self.objects.contains_key(id)
    }

    /// Inserts a freshly constructed object. Callers are responsible for
    /// having also linked it into its parent's [`super::object::DirData`].
    pub fn insert(&self, object: Object) {
        self.objects.insert(object.long_id.clone(), object);
    }

    pub fn remove(&self, id: &LongId) -> Option<Object> {
        self.objects.remove(id).map(|(_, o)| o)
    }

    /// Looks up a child by pathname relative to the root, arc by arc.
    /// Returns `NotFound` for a missing arc and `NotADirectory` if an
    /// intermediate component is not a directory.
    pub fn lookup_path(&self, arcs: &[&str]) -> Result<LongId> {
        let mut id = LongId::root();
        for arc in arcs {
            let obj = self.lookup(&id)?;
            let dir = obj.dir.as_ref().ok_or(Error::NotADirectory)?;
            let child = dir.child(arc).ok_or(Error::NotFound)?.clone();
            drop(obj);
            id = child;
        }
        Ok(id)
    }
}
