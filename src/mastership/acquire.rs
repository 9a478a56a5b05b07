//! `AcquireMastership` (A1..A6) and `cedeMastership` (C1..C5)
//! (`spec.md` §4.2).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::journal::Record;
use crate::model::{AttribOp, ObjectKind};
use crate::peer::{LocalNode, Peer};

use super::ids::{ChildHint, GrantId, RequestId};
use super::typecheck::type_check;
use super::recovery::RecoveryQueue;

fn pathname_of(path: &[String]) -> String {
    path.join("/")
}

const SEP: &str = "/";

/// Checks an advisory attribute set on `host_port`: authorized if the
/// attribute is unset (no restriction configured) or its value list
/// contains `host_port` or the wildcard `*`.
fn advisory_authorizes(values: &[String], host_port: &str) -> bool {
    values.is_empty() || values.iter().any(|v| v == host_port || v == "*")
}

/// Runs the destination side of a mastership transfer end to end
/// (`spec.md` §4.2 A1..A6). `queue` receives the request if an RPC fails
/// after the destination has durably committed to the transfer.
pub async fn acquire_mastership(dest: &Arc<LocalNode>, path: &[String], source: &dyn Peer, src_host_port: &str, queue: &RecoveryQueue) -> Result<()> {
    let pathname = pathname_of(path);
    let span = tracing::info_span!("acquire_mastership", pathname = %pathname, src_host_port);
    let _enter = span.enter();
    tracing::info!("A1: checking source mastership");

    // A1
    let src_object = source.lookup_pathname(path).await?;
    if !src_object.master {
        tracing::warn!("A1: source does not master this object");
        return Err(Error::NotMaster);
    }
    if !src_host_port.contains('.') || src_host_port.contains(' ') || src_host_port.contains('/') {
        return Err(Error::InvalidArgs(format!("malformed source host:port: {src_host_port}")));
    }

    // A2
    tracing::debug!("A2: recording #master-request on the destination");
    let requestid = {
        let _write = dest.lock.acquire_write().await;
        let id = dest.repo.lookup_path(&path.iter().map(String::as_str).collect::<Vec<_>>())?;
        let mut obj = dest.repo.lookup_mut(&id)?;
        if obj.master {
            dest.lock.release_write();
            tracing::info!("A2: destination already masters this object, nothing to do");
            return Ok(());
        }
        if !type_check(src_object.kind, obj.kind) {
            dest.lock.release_write();
            return Err(Error::InappropriateOp);
        }
        let from_attr = obj.attribs.get("#mastership-from");
        if !advisory_authorizes(&from_attr, src_host_port) {
            dest.lock.release_write();
            return Err(Error::NoPermission);
        }
        let ts = crate::now_secs();
        let requestid = RequestId::new(src_host_port, dest.host_port(), ts);
        let encoded = requestid.encode();
        obj.attribs.write(AttribOp::Add, "#master-request", &encoded, ts);
        drop(obj);
        dest.journal.append(Record::Acqm { pathname: pathname.clone(), sep: SEP.to_string(), requestid: encoded });
        dest.lock.release_write();
        requestid
    };
    let requestid_str = requestid.encode();

    // A3
    tracing::debug!("A3: requesting cede from source");
    let grant = match source.cede_mastership(path, &requestid_str).await {
        Ok(grant) => grant,
        Err(e) if e.is_rpc_failure() => {
            tracing::warn!(error = %e, "A3: cede RPC failed, queuing for recovery");
            queue.push(pathname, SEP.to_string(), requestid_str);
            return Err(e);
        }
        Err(e) => {
            // A3x
            tracing::warn!(error = %e, "A3: cede rejected, rolling back the destination request");
            let _write = dest.lock.acquire_write().await;
            let result = run_a3x(dest, path, &pathname, &requestid_str);
            dest.lock.release_write();
            result?;
            return Err(e);
        }
    };
    let grantid = GrantId::parse(&grant)?;

    // A4
    tracing::debug!("A4: accepting the grant and flipping the master flag");
    {
        let _write = dest.lock.acquire_write().await;
        let result = accept_mastership(dest, path, src_object.kind, &requestid_str, &grant, &grantid, &pathname);
        dest.lock.release_write();
        result?;
    }

    // A5
    tracing::debug!("A5: clearing #master-grant on the source");
    if let Err(e) = source.remove_attrib(path, "#master-grant", &grant).await {
        if e.is_rpc_failure() {
            tracing::warn!(error = %e, "A5: remove_attrib RPC failed, queuing for recovery");
            queue.push(pathname, SEP.to_string(), grant);
            return Err(e);
        }
        return Err(e);
    }

    // A6
    tracing::debug!("A6: clearing #master-request on the destination");
    {
        let _write = dest.lock.acquire_write().await;
        let id = dest.repo.lookup_path(&path.iter().map(String::as_str).collect::<Vec<_>>());
        if let Ok(id) = id {
            if let Ok(mut obj) = dest.repo.lookup_mut(&id) {
                obj.attribs.write(AttribOp::Remove, "#master-request", &grant, crate::now_secs());
            }
        }
        dest.journal.append(Record::Finm { pathname, sep: SEP.to_string(), id: grant });
        dest.lock.release_write();
    }

    tracing::info!("mastership transfer complete");
    Ok(())
}

fn run_a3x(dest: &Arc<LocalNode>, path: &[String], pathname: &str, requestid: &str) -> Result<()> {
    let id = dest.repo.lookup_path(&path.iter().map(String::as_str).collect::<Vec<_>>())?;
    let mut obj = dest.repo.lookup_mut(&id)?;
    obj.attribs.write(AttribOp::Remove, "#master-request", requestid, crate::now_secs());
    drop(obj);
    dest.journal.append(Record::Finm { pathname: pathname.to_string(), sep: SEP.to_string(), id: requestid.to_string() });
    Ok(())
}

/// A4: re-look up, re-check, absorb the grant's child hints, flip
/// `master`. Also used directly by recovery's R2 case to resume a
/// transfer that crashed between A3 and A4.
pub(crate) fn accept_mastership(
    dest: &Arc<LocalNode>,
    path: &[String],
    src_kind: ObjectKind,
    requestid: &str,
    grant: &str,
    grantid: &GrantId,
    pathname: &str,
) -> Result<()> {
    let id = dest.repo.lookup_path(&path.iter().map(String::as_str).collect::<Vec<_>>())?;
    let mut obj = dest.repo.lookup_mut(&id)?;

    if !type_check(src_kind, obj.kind) {
        return Err(Error::InappropriateOp);
    }
    if !obj.attribs.get("#master-request").iter().any(|v| v == requestid) {
        return Err(Error::InvalidArgs("master-request mismatch on accept".into()));
    }

    if obj.kind == ObjectKind::AppendableDirectory {
        let mut dir = obj.dir.clone().unwrap_or_default();
        let long_id = obj.long_id.clone();
        drop(obj);

        for hint in &grantid.children {
            match dir.child(&hint.arc) {
                Some(child_id) => {
                    apply_child_hint(dest, child_id, hint)?;
                }
                None => {
                    let child_index = dir.next_child_index();
                    let child_id = long_id.child(child_index)?;
                    dir.insert(hint.arc.clone(), child_id.clone());
                    let stub = crate::model::Object::new_placeholder(child_id.clone(), ObjectKind::Stub, dest.host_port());
                    dest.repo.insert(stub);

                    let mut parent = dest.repo.lookup_mut(&id)?;
                    parent.dir.as_mut().unwrap().insert(hint.arc.clone(), child_id);
                }
            }
        }

        obj = dest.repo.lookup_mut(&id)?;
    }

    let ts = crate::now_secs();
    obj.attribs.write(AttribOp::Remove, "#master-request", requestid, ts);
    obj.attribs.write(AttribOp::Add, "#master-request", grant, ts);
    obj.master = true;
    drop(obj);

    dest.journal.append(Record::Finm { pathname: pathname.to_string(), sep: SEP.to_string(), id: requestid.to_string() });
    dest.journal.append(Record::Acqm { pathname: pathname.to_string(), sep: SEP.to_string(), requestid: grant.to_string() });
    Ok(())
}

fn apply_child_hint(dest: &Arc<LocalNode>, child_id: &crate::model::LongId, hint: &ChildHint) -> Result<()> {
    let mut child = dest.repo.lookup_mut(child_id)?;
    let ts = crate::now_secs();
    if child.master {
        child.attribs.write(AttribOp::Clear, "master-repository", "", ts);
    } else {
        let existing_ts = child
            .attribs
            .get("master-repository")
            .last()
            .and_then(|v| child.attribs.last_write_timestamp("master-repository", v));
        if existing_ts.map(|t| t < hint.ts).unwrap_or(true) {
            child.attribs.write(AttribOp::Set, "master-repository", &hint.hint, hint.ts);
        }
    }
    Ok(())
}

/// Runs the source side of a mastership transfer as one atomic action
/// (`spec.md` §4.2 C1..C5).
pub async fn cede_mastership(node: &Arc<LocalNode>, path: &[String], requestid_str: &str) -> Result<String> {
    let pathname = pathname_of(path);
    let span = tracing::info_span!("cede_mastership", pathname = %pathname);
    let _enter = span.enter();
    let requestid = RequestId::parse(requestid_str)?;
    tracing::debug!(dst_host_port = %requestid.dst_host_port, "C1..C5: ceding mastership to requester");
    let _write = node.lock.acquire_write().await;
    let result = cede_mastership_locked(node, path, &requestid, requestid_str);
    node.lock.release_write();
    if let Err(ref e) = result {
        tracing::warn!(error = %e, "cede rejected");
    }
    result
}

fn cede_mastership_locked(node: &Arc<LocalNode>, path: &[String], requestid: &RequestId, requestid_str: &str) -> Result<String> {
    let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
    let id = node.repo.lookup_path(&arcs)?;
    let mut obj = node.repo.lookup_mut(&id)?;

    // C1
    if !obj.master {
        return Err(Error::NotMaster);
    }
    let to_attr = obj.attribs.get("#mastership-to");
    if !advisory_authorizes(&to_attr, &requestid.dst_host_port) {
        return Err(Error::NoPermission);
    }
    if requestid.src_host_port != node.host_port() {
        return Err(Error::NoPermission);
    }

    let now = crate::now_secs();

    // C2
    obj.attribs.write(AttribOp::Set, "master-repository", &requestid.dst_host_port, now);

    // C3
    let mut children = Vec::new();
    if obj.kind == ObjectKind::AppendableDirectory {
        let dir = obj.dir.clone().unwrap_or_default();
        drop(obj);
        for (arc, child_id) in dir.entries() {
            let mut child = node.repo.lookup_mut(child_id)?;
            if child.master {
                child.attribs.write(AttribOp::Set, "master-repository", node.host_port(), now);
                children.push(ChildHint { arc: arc.to_string(), hint: node.host_port().to_string(), ts: now });
            } else {
                let current_hint = child.attribs.get("master-repository").last().cloned().unwrap_or_default();
                let current_ts = child.attribs.last_write_timestamp("master-repository", &current_hint).unwrap_or(0);
                children.push(ChildHint { arc: arc.to_string(), hint: current_hint, ts: current_ts });
            }
        }
        obj = node.repo.lookup_mut(&id)?;
    }

    // C4
    let grantid = GrantId { request: requestid.clone(), children };
    let grantid_str = grantid.encode();
    obj.attribs.write(AttribOp::Add, "#master-grant", &grantid_str, now);

    // C5
    obj.master = false;

    let _ = requestid_str;
    Ok(grantid_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LongId, Object};
    use crate::peer::InProcessPeer;

    fn make_node(host_port: &str, master: bool) -> Arc<LocalNode> {
        let mut root = Object::new_dir(LongId::root(), ObjectKind::AppendableDirectory, host_port);
        root.master = master;
        Arc::new(LocalNode::new(host_port, root, false))
    }

    #[tokio::test]
    async fn full_transfer_flips_master_flag_on_both_sides() {
        let source = make_node("source.example.com:1", true);
        let dest = make_node("dest.example.com:2", false);
        let source_peer = InProcessPeer::new(source.clone());
        let queue = RecoveryQueue::new();

        acquire_mastership(&dest, &[], &source_peer, "source.example.com:1", &queue).await.unwrap();

        let dest_root = dest.repo.lookup(&LongId::root()).unwrap();
        assert!(dest_root.master);
        drop(dest_root);

        let source_root = source.repo.lookup(&LongId::root()).unwrap();
        assert!(!source_root.master);
        assert!(source_root.attribs.get("master-repository").contains(&"dest.example.com:2".to_string()));
    }

    #[tokio::test]
    async fn already_master_is_a_no_op_success() {
        let source = make_node("source:1", true);
        let dest = make_node("dest:2", true);
        let source_peer = InProcessPeer::new(source.clone());
        let queue = RecoveryQueue::new();
        acquire_mastership(&dest, &[], &source_peer, "source:1", &queue).await.unwrap();
    }

    #[tokio::test]
    async fn source_not_master_fails_at_a1() {
        let source = make_node("source:1", false);
        let dest = make_node("dest:2", false);
        let source_peer = InProcessPeer::new(source.clone());
        let queue = RecoveryQueue::new();
        let err = acquire_mastership(&dest, &[], &source_peer, "source:1", &queue).await.unwrap_err();
        assert_eq!(err, Error::NotMaster);
    }
}
