//! The `Peer` trait: the in-process stand-in for "RPC call/reply
//! semantics", which `spec.md` §1 explicitly leaves unspecified at the
//! transport level. Its methods are exactly the remote operations the
//! mastership and replication protocols invoke. A real SRPC-backed
//! implementation would satisfy the same trait; this crate ships only
//! [`InProcessPeer`], wrapping a [`LocalNode`] directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::fp::Tag;
use crate::journal::{Journal, MemoryJournal};
use crate::model::{AttribEntry, AttribOp, Object, ObjectKind, Repository, ShortId};
use crate::rwlock::RwLock;

/// File-specific fields of a [`RemoteObject`], mirroring
/// [`crate::model::FileData`] across the `Peer` boundary.
#[derive(Debug, Clone, Copy)]
pub struct RemoteFileMeta {
    pub size: u64,
    pub mtime: i64,
    pub executable: bool,
    pub fingerprint: Tag,
}

/// A snapshot of a remote object's externally visible state, as a real
/// `lookup_pathname` RPC would return it.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub kind: ObjectKind,
    pub master: bool,
    pub host_port: String,
    pub attribs: BTreeMap<String, Vec<String>>,
    pub file: Option<RemoteFileMeta>,
    /// An immutable directory's content fingerprint, mirroring
    /// [`crate::model::DirData::fingerprint`] across the `Peer` boundary.
    /// Checked by replication's copy policy before any recursive fetch.
    pub dir_fingerprint: Option<Tag>,
}

/// One repository node: its object tree, its writer-serializing lock, its
/// mastership journal, and its own authoritative address. Bundles exactly
/// the per-repository state the mastership and replication protocols
/// mutate under a single writer-lock bracket (`spec.md` §4.2, §5).
pub struct LocalNode {
    pub repo: Repository,
    pub lock: RwLock,
    pub journal: Box<dyn Journal>,
}

impl LocalNode {
    pub fn new(host_port: impl Into<String>, root: Object, favor_writers: bool) -> Self {
        Self { repo: Repository::new(host_port, root), lock: RwLock::new(favor_writers), journal: Box::new(MemoryJournal::new()) }
    }

    pub fn host_port(&self) -> &str {
        self.repo.host_port()
    }
}

/// The remote operations a mastership/replication peer must answer.
#[async_trait]
pub trait Peer: Send + Sync {
    /// Looks up an object by pathname (arc sequence relative to the
    /// root) and returns its externally visible state.
    async fn lookup_pathname(&self, path: &[String]) -> Result<RemoteObject>;

    /// Runs the source-side cede protocol (`spec.md` §4.2 C1..C5),
    /// returning the `grantid` on success.
    async fn cede_mastership(&self, path: &[String], requestid: &str) -> Result<String>;

    /// Removes one `(name, value)` occurrence from an object's attribute
    /// history (`spec.md` §4.2 A5).
    async fn remove_attrib(&self, path: &[String], name: &str, value: &str) -> Result<()>;

    /// Appends one attribute-history entry, as attribute replication
    /// replays a remote object's history locally (`spec.md` §4.3).
    async fn write_attrib(&self, path: &[String], op: AttribOp, name: &str, value: &str, timestamp: i64) -> Result<()>;

    /// Streams a file's entire content in one call, the preferred path
    /// for replication's file copy (`spec.md` §4.3).
    async fn read_whole(&self, path: &[String]) -> Result<Vec<u8>>;

    /// Reads one chunk of a file's content, the fallback path used when
    /// `read_whole` is unsupported (`spec.md` §4.3).
    async fn read_chunk(&self, path: &[String], offset: u64, len: u32) -> Result<Vec<u8>>;

    /// Lists a directory's child arc names in insertion order, used by
    /// replication's traversal to enumerate what to recurse into and to
    /// build the numeric-range `MatchContext` (`spec.md` §4.3).
    async fn list_children(&self, path: &[String]) -> Result<Vec<String>>;

    /// Returns a directory's full attribute history in append order, for
    /// attribute replication to replay locally (`spec.md` §4.3).
    async fn read_attribs(&self, path: &[String]) -> Result<Vec<AttribEntry>>;
}

/// An in-process [`Peer`] wrapping a [`LocalNode`] directly, standing in
/// for a real SRPC client/server pair.
pub struct InProcessPeer {
    node: Arc<LocalNode>,
}

impl InProcessPeer {
    pub fn new(node: Arc<LocalNode>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Peer for InProcessPeer {
    async fn lookup_pathname(&self, path: &[String]) -> Result<RemoteObject> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _read = self.node.lock.acquire_read().await;
        let id = self.node.repo.lookup_path(&arcs)?;
        let obj = self.node.repo.lookup(&id)?;
        let file = obj.file.as_ref().map(|f| RemoteFileMeta { size: f.size, mtime: f.mtime, executable: f.executable, fingerprint: f.fingerprint });
        let dir_fingerprint = obj.dir.as_ref().and_then(|d| d.fingerprint());
        let remote = RemoteObject { kind: obj.kind, master: obj.master, host_port: obj.host_port.clone(), attribs: obj.attribs.snapshot(), file, dir_fingerprint };
        drop(obj);
        self.node.lock.release_read();
        Ok(remote)
    }

    async fn cede_mastership(&self, path: &[String], requestid: &str) -> Result<String> {
        crate::mastership::cede_mastership(&self.node, path, requestid).await
    }

    async fn remove_attrib(&self, path: &[String], name: &str, value: &str) -> Result<()> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _write = self.node.lock.acquire_write().await;
        let id = self.node.repo.lookup_path(&arcs);
        let result = match id {
            Ok(id) => {
                let mut obj = self.node.repo.lookup_mut(&id)?;
                obj.attribs.write(AttribOp::Remove, name, value, crate::now_secs());
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.node.lock.release_write();
        result
    }

    async fn write_attrib(&self, path: &[String], op: AttribOp, name: &str, value: &str, timestamp: i64) -> Result<()> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _write = self.node.lock.acquire_write().await;
        let id = self.node.repo.lookup_path(&arcs);
        let result = match id {
            Ok(id) => {
                let mut obj = self.node.repo.lookup_mut(&id)?;
                obj.attribs.replay_entry(op, name, value, timestamp);
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.node.lock.release_write();
        result
    }

    async fn read_whole(&self, path: &[String]) -> Result<Vec<u8>> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _read = self.node.lock.acquire_read().await;
        let result = self.read_file_content(&arcs);
        self.node.lock.release_read();
        result
    }

    async fn read_chunk(&self, path: &[String], offset: u64, len: u32) -> Result<Vec<u8>> {
        let whole = self.read_whole(path).await?;
        let start = (offset as usize).min(whole.len());
        let end = start.saturating_add(len as usize).min(whole.len());
        Ok(whole[start..end].to_vec())
    }

    async fn list_children(&self, path: &[String]) -> Result<Vec<String>> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _read = self.node.lock.acquire_read().await;
        let result = (|| {
            let id = self.node.repo.lookup_path(&arcs)?;
            let obj = self.node.repo.lookup(&id)?;
            let dir = obj.dir.as_ref().ok_or(Error::NotADirectory)?;
            Ok(dir.arcs().map(str::to_string).collect())
        })();
        self.node.lock.release_read();
        result
    }

    async fn read_attribs(&self, path: &[String]) -> Result<Vec<AttribEntry>> {
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let _read = self.node.lock.acquire_read().await;
        let result = (|| {
            let id = self.node.repo.lookup_path(&arcs)?;
            let obj = self.node.repo.lookup(&id)?;
            Ok(obj.attribs.entries().to_vec())
        })();
        self.node.lock.release_read();
        result
    }
}

impl InProcessPeer {
    fn read_file_content(&self, arcs: &[&str]) -> Result<Vec<u8>> {
        let id = self.node.repo.lookup_path(arcs)?;
        let obj = self.node.repo.lookup(&id)?;
        let file = obj.file.as_ref().ok_or(Error::InappropriateOp)?;
        let short_id: ShortId = file.short_id;
        drop(obj);
        self.node.repo.read_content(short_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LongId, Object};

    fn node() -> Arc<LocalNode> {
        let root = Object::new_dir(LongId::root(), ObjectKind::AppendableDirectory, "local:0");
        Arc::new(LocalNode::new("local:0", root, false))
    }

    #[tokio::test]
    async fn lookup_pathname_returns_root() {
        let n = node();
        let peer = InProcessPeer::new(n);
        let remote = peer.lookup_pathname(&[]).await.unwrap();
        assert_eq!(remote.kind, ObjectKind::AppendableDirectory);
    }

    #[tokio::test]
    async fn lookup_missing_arc_is_not_found() {
        let n = node();
        let peer = InProcessPeer::new(n);
        let err = peer.lookup_pathname(&["missing".to_string()]).await.unwrap_err();
        assert_eq!(err, Error::NotFound);
    }
}
