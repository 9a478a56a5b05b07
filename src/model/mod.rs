//! The repository data model: object kinds, long identifiers, attribute
//! histories, and the in-memory object tree (`spec.md` §3).

mod attrib;
mod longid;
mod object;
mod repository;

pub use attrib::{AttribEntry, AttribHistory, AttribOp};
pub use longid::{LongId, LONGID_MAX_LEN};
pub use object::{DirData, FileData, Object, ObjectKind, ShortId};
pub use repository::Repository;
