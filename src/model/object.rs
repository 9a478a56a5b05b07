//! A single repository object: its kind, mastership bit, attributes, and
//! (depending on kind) file content metadata or a directory's children
//! (`spec.md` §3).

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

use super::attrib::AttribHistory;
use super::longid::LongId;
use crate::fp::Tag;

/// A 32-bit handle for a content-addressed file blob.
pub type ShortId = u32;

/// The tagged variant every repository object carries. Numbering is fixed
/// by `spec.md` §6 and must stay stable across processes; `FromPrimitive`/
/// `ToPrimitive` give the wire encoding used wherever a kind crosses a
/// `Peer` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ObjectKind {
    ImmutableFile = 0,
    MutableFile = 1,
    ImmutableDirectory = 2,
    AppendableDirectory = 3,
    MutableDirectory = 4,
    Stub = 5,
    Ghost = 6,
    Deleted = 7,
}

impl ObjectKind {
    pub fn is_directory(self) -> bool {
        matches!(self, Self::ImmutableDirectory | Self::AppendableDirectory | Self::MutableDirectory)
    }

    pub fn is_file(self) -> bool {
        matches!(self, Self::ImmutableFile | Self::MutableFile)
    }

    pub fn is_immutable(self) -> bool {
        matches!(self, Self::ImmutableFile | Self::ImmutableDirectory)
    }

    pub fn to_wire(self) -> u8 {
        self.to_u8().expect("ObjectKind always fits in a byte")
    }

    pub fn from_wire(tag: u8) -> Option<Self> {
        Self::from_u8(tag)
    }
}

/// File-specific fields, present iff [`Object::kind`] is a file kind.
#[derive(Debug, Clone)]
pub struct FileData {
    pub short_id: ShortId,
    pub size: u64,
    pub mtime: i64,
    pub executable: bool,
    pub fingerprint: Tag,
}

/// Directory-specific fields, present iff [`Object::kind`] is a directory
/// kind. Children are kept in insertion order, matching the "ordered
/// mapping from arc names to child object indices" of `spec.md` §3.
#[derive(Debug, Clone, Default)]
pub struct DirData {
    children: Vec<(String, LongId)>,
    next_child_index: u32,
    /// An immutable directory's content fingerprint, folded from its
    /// ordered `(arc, child fingerprint)` pairs once the copy that froze
    /// it completes. `None` for a directory still mutable/appendable, or
    /// for one not yet fully copied (`spec.md` §4.3 "Immutable directory
    /// copy"; `svs->fptag` in
    /// `examples/original_source/progs/repository/Replication.C`).
    fingerprint: Option<Tag>,
}

impl DirData {
    pub fn child(&self, arc: &str) -> Option<&LongId> {
        self.children.iter().find(|(a, _)| a == arc).map(|(_, id)| id)
    }

    pub fn contains(&self, arc: &str) -> bool {
        self.child(arc).is_some()
    }

    pub fn arcs(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(a, _)| a.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &LongId)> {
        self.children.iter().map(|(a, id)| (a.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Allocates the next never-reused child index and appends the arc
    /// mapping for `id`.
    pub fn insert(&mut self, arc: impl Into<String>, id: LongId) {
        self.children.push((arc.into(), id));
    }

    pub fn remove(&mut self, arc: &str) -> Option<LongId> {
        let pos = self.children.iter().position(|(a, _)| a == arc)?;
        Some(self.children.remove(pos).1)
    }

    /// The next never-reused index to pass to `LongId::child`, so deleting
    /// and recreating an arc does not alias an old child's identifier.
    pub fn next_child_index(&mut self) -> u32 {
        let i = self.next_child_index;
        self.next_child_index += 1;
        i
    }

    pub fn fingerprint(&self) -> Option<Tag> {
        self.fingerprint
    }

    /// Stamps this directory's content fingerprint. Called exactly once,
    /// when a replicated immutable directory copy completes.
    pub fn set_fingerprint(&mut self, fp: Tag) {
        self.fingerprint = Some(fp);
    }
}

/// A single object in the repository tree.
#[derive(Debug, Clone)]
pub struct Object {
    pub long_id: LongId,
    pub kind: ObjectKind,
    pub master: bool,
    pub host_port: String,
    pub attribs: AttribHistory,
    pub file: Option<FileData>,
    pub dir: Option<DirData>,
}

impl Object {
    pub fn new_dir(long_id: LongId, kind: ObjectKind, host_port: impl Into<String>) -> Self {
        debug_assert!(kind.is_directory());
        Self {
            long_id,
            kind,
            master: false,
            host_port: host_port.into(),
            attribs: AttribHistory::new(),
            file: None,
            dir: Some(DirData::default()),
        }
    }

    pub fn new_file(long_id: LongId, kind: ObjectKind, host_port: impl Into<String>, file: FileData) -> Self {
        debug_assert!(kind.is_file());
        Self {
            long_id,
            kind,
            master: false,
            host_port: host_port.into(),
            attribs: AttribHistory::new(),
            file: Some(file),
            dir: None,
        }
    }

    pub fn new_placeholder(long_id: LongId, kind: ObjectKind, host_port: impl Into<String>) -> Self {
        debug_assert!(matches!(kind, ObjectKind::Stub | ObjectKind::Ghost | ObjectKind::Deleted));
        Self {
            long_id,
            kind,
            master: false,
            host_port: host_port.into(),
            attribs: AttribHistory::new(),
            file: None,
            dir: None,
        }
    }

    pub fn master_repository_hint(&self) -> Option<String> {
        self.attribs.get("master-repository").into_iter().next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_match_spec_numbering() {
        assert_eq!(ObjectKind::ImmutableFile.to_wire(), 0);
        assert_eq!(ObjectKind::Deleted.to_wire(), 7);
        assert_eq!(ObjectKind::from_wire(3), Some(ObjectKind::AppendableDirectory));
        assert_eq!(ObjectKind::from_wire(8), None);
    }
}
