//! End-to-end replication across two in-process repositories: directive
//! selection, idempotence, fingerprint-based dedup, and attribute
//! replication (`spec.md` §4.3, §8 "replication agreement/idempotence").

use std::sync::Arc;

use moka::sync::Cache;

use vesta_repos::model::{AttribOp, LongId, Object, ObjectKind};
use vesta_repos::peer::{InProcessPeer, LocalNode};
use vesta_repos::replication::{parse_directives, replicate, CopyContext, ReplicationOptions};

mod common;

fn node(host_port: &str) -> Arc<LocalNode> {
    let root = Object::new_dir(LongId::root(), ObjectKind::AppendableDirectory, host_port);
    Arc::new(LocalNode::new(host_port, root, false))
}

fn insert_file(repo_node: &Arc<LocalNode>, parent: &LongId, arc: &str, content: &[u8]) -> LongId {
    let short_id = repo_node.repo.alloc_short_id();
    repo_node.repo.store_content(short_id, content.to_vec());
    let tag = vesta_repos::fp::Tag::new(content);
    let file = vesta_repos::model::FileData { short_id, size: content.len() as u64, mtime: 0, executable: false, fingerprint: tag };
    let child_id = {
        let mut p = repo_node.repo.lookup_mut(parent).unwrap();
        let dir = p.dir.as_mut().unwrap();
        let index = dir.next_child_index();
        let id = parent.child(index).unwrap();
        dir.insert(arc, id.clone());
        id
    };
    repo_node.repo.insert(Object::new_file(child_id.clone(), ObjectKind::ImmutableFile, repo_node.host_port(), file));
    child_id
}

fn insert_dir(repo_node: &Arc<LocalNode>, parent: &LongId, arc: &str, kind: ObjectKind) -> LongId {
    let child_id = {
        let mut p = repo_node.repo.lookup_mut(parent).unwrap();
        let dir = p.dir.as_mut().unwrap();
        let index = dir.next_child_index();
        let id = parent.child(index).unwrap();
        dir.insert(arc, id.clone());
        id
    };
    repo_node.repo.insert(Object::new_dir(child_id.clone(), kind, repo_node.host_port()));
    child_id
}

#[tokio::test]
async fn full_tree_replication_is_idempotent() {
    common::init_tracing();
    let source = node("source:1");
    let pkg_id = insert_dir(&source, &LongId::root(), "pkg", ObjectKind::AppendableDirectory);
    insert_file(&source, &pkg_id, "readme.txt", b"hello");

    let dest = node("dest:2");
    let source_peer = InProcessPeer::new(source.clone());
    let options = ReplicationOptions::default();
    let cache = Cache::new(100);
    let ctx = CopyContext { source: &source_peer, source_host_port: "source:1", dest: &dest, options: &options, bad_read_whole_peers: &cache };

    let directives = parse_directives(&[('+', "")]).unwrap();
    replicate(&ctx, &directives).await.unwrap();
    // Replaying the exact same replication must not error or duplicate content.
    replicate(&ctx, &directives).await.unwrap();

    let dest_file = dest.repo.lookup_path(&["pkg", "readme.txt"]).unwrap();
    let obj = dest.repo.lookup(&dest_file).unwrap();
    assert_eq!(obj.kind, ObjectKind::ImmutableFile);
    let content = dest.repo.read_content(obj.file.as_ref().unwrap().short_id).unwrap();
    assert_eq!(content, b"hello");
}

#[tokio::test]
async fn directive_exclusion_prunes_a_subtree_but_keeps_siblings() {
    let source = node("source:1");
    insert_dir(&source, &LongId::root(), "build", ObjectKind::AppendableDirectory);
    let src_id = insert_dir(&source, &LongId::root(), "src", ObjectKind::AppendableDirectory);
    insert_file(&source, &src_id, "main.c", b"int main(){}");

    let dest = node("dest:2");
    let source_peer = InProcessPeer::new(source.clone());
    let options = ReplicationOptions::default();
    let cache = Cache::new(100);
    let ctx = CopyContext { source: &source_peer, source_host_port: "source:1", dest: &dest, options: &options, bad_read_whole_peers: &cache };

    let directives = parse_directives(&[('+', ""), ('-', "/build")]).unwrap();
    replicate(&ctx, &directives).await.unwrap();

    assert!(dest.repo.lookup_path(&["build"]).is_err());
    assert!(dest.repo.lookup_path(&["src", "main.c"]).is_ok());
}

#[tokio::test]
async fn duplicate_content_is_deduplicated_by_fingerprint() {
    let source = node("source:1");
    insert_file(&source, &LongId::root(), "a.txt", b"same bytes");
    insert_file(&source, &LongId::root(), "b.txt", b"same bytes");

    let dest = node("dest:2");
    let source_peer = InProcessPeer::new(source.clone());
    let options = ReplicationOptions::default();
    let cache = Cache::new(100);
    let ctx = CopyContext { source: &source_peer, source_host_port: "source:1", dest: &dest, options: &options, bad_read_whole_peers: &cache };

    let directives = parse_directives(&[('+', "")]).unwrap();
    replicate(&ctx, &directives).await.unwrap();

    let a = dest.repo.lookup(&dest.repo.lookup_path(&["a.txt"]).unwrap()).unwrap();
    let b = dest.repo.lookup(&dest.repo.lookup_path(&["b.txt"]).unwrap()).unwrap();
    assert_eq!(a.file.as_ref().unwrap().short_id, b.file.as_ref().unwrap().short_id);
}

#[tokio::test]
async fn attr_old_replicates_attributes_on_an_already_existing_object() {
    let source = node("source:1");
    let pkg_id = insert_dir(&source, &LongId::root(), "pkg", ObjectKind::AppendableDirectory);
    {
        let mut obj = source.repo.lookup_mut(&pkg_id).unwrap();
        obj.attribs.write(AttribOp::Set, "type", "package", 1);
    }

    let dest = node("dest:2");
    // Pre-create "pkg" at the destination so attr_new won't fire; only
    // attr_old can account for attributes landing on it.
    {
        let mut root = dest.repo.lookup_mut(&LongId::root()).unwrap();
        let dir = root.dir.as_mut().unwrap();
        let idx = dir.next_child_index();
        let id = LongId::root().child(idx).unwrap();
        dir.insert("pkg", id.clone());
        drop(root);
        dest.repo.insert(Object::new_dir(id, ObjectKind::AppendableDirectory, "dest:2"));
    }

    let source_peer = InProcessPeer::new(source.clone());
    let mut options = ReplicationOptions::default();
    options.attr_new = false;
    options.attr_old = true;
    let cache = Cache::new(100);
    let ctx = CopyContext { source: &source_peer, source_host_port: "source:1", dest: &dest, options: &options, bad_read_whole_peers: &cache };

    let directives = parse_directives(&[('+', "")]).unwrap();
    replicate(&ctx, &directives).await.unwrap();

    let dest_pkg_id = dest.repo.lookup_path(&["pkg"]).unwrap();
    let dest_pkg = dest.repo.lookup(&dest_pkg_id).unwrap();
    assert_eq!(dest_pkg.attribs.get("type"), vec!["package".to_string()]);
}
