//! Mastership crash recovery (`spec.md` §4.2 "Recovery"): every journal
//! `acqm` without a matching `finm` is replayed against the source to
//! figure out how far the transfer actually got, and finished off.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::Result;
use crate::journal::Record;
use crate::model::AttribOp;
use crate::peer::{LocalNode, Peer};

use super::ids::{GrantId, RequestId};

/// Pulls the originating source `host:port` out of a `requestid` or
/// `grantid` string (a `grantid`'s leading four fields are always its
/// `requestid`'s encoding), so the recovery driver knows which peer to
/// dial without consulting anything beyond the identifier itself.
fn source_host_port(id: &str) -> Result<String> {
    let leading: String = id.splitn(5, ' ').take(4).collect::<Vec<_>>().join(" ");
    Ok(RequestId::parse(&leading)?.src_host_port)
}

/// One unresolved transfer, as reconstructed from the journal on startup
/// or from a live A3/A5 RPC failure.
#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub pathname: String,
    pub sep: String,
    /// The identifier under which this transfer was last known: either a
    /// `requestid` (destination stopped at or before A3) or a `grantid`
    /// (destination stopped at or after A4).
    pub id: String,
}

/// The recovery driver's work queue: unresolved transfers awaiting a
/// retry, woken immediately on push rather than waiting out the idle
/// sleep (`spec.md` §4.2).
pub struct RecoveryQueue {
    items: Mutex<VecDeque<PendingTransfer>>,
    notify: Notify,
}

impl RecoveryQueue {
    pub fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new() }
    }

    pub fn push(&self, pathname: String, sep: String, id: String) {
        self.items.lock().unwrap().push_back(PendingTransfer { pathname, sep, id });
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<PendingTransfer> {
        self.items.lock().unwrap().pop_front()
    }

    /// Reconstructs the initial queue from a journal's full record log:
    /// every `acqm` with no later matching `finm` is unresolved.
    pub fn recover_from_journal(records: &[Record]) -> Self {
        let queue = Self::new();
        let mut open: Vec<(String, String, String)> = Vec::new();
        for record in records {
            match record {
                Record::Acqm { pathname, sep, requestid } => open.push((pathname.clone(), sep.clone(), requestid.clone())),
                Record::Finm { id, .. } => open.retain(|(_, _, open_id)| open_id != id),
            }
        }
        for (pathname, sep, id) in open {
            queue.push(pathname, sep, id);
        }
        queue
    }
}

impl Default for RecoveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains `queue` forever, sleeping `idle_sleep` between empty drains and
/// waking immediately when `push` is called. `peer_for` dials (or looks
/// up) the `Peer` for a given source `host:port`. Intended to be spawned
/// as a background `tokio::task` per repository.
pub async fn run_recovery_loop<F>(node: Arc<LocalNode>, queue: Arc<RecoveryQueue>, peer_for: F, idle_sleep: Duration)
where
    F: Fn(&str) -> Arc<dyn Peer> + Send + Sync + 'static,
{
    loop {
        match queue.pop() {
            Some(item) => {
                tracing::debug!(pathname = %item.pathname, id = %item.id, "recovery: draining pending transfer");
                let Ok(host_port) = source_host_port(&item.id) else {
                    // Malformed identifier; nothing useful to retry.
                    tracing::warn!(id = %item.id, "recovery: malformed identifier, dropping");
                    continue;
                };
                let source = peer_for(&host_port);
                if let Err(requeue) = recover_one(&node, &item, source.as_ref()).await {
                    if requeue {
                        tracing::warn!(pathname = %item.pathname, "recovery: source unreachable, requeuing");
                        queue.push(item.pathname, item.sep, item.id);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            None => {
                tracing::debug!("recovery: queue idle, waiting for a push or the idle timeout");
                tokio::select! {
                    _ = queue.notify.notified() => {}
                    _ = tokio::time::sleep(idle_sleep) => {}
                }
            }
        }
    }
}

/// Resolves one pending transfer (`spec.md` §4.2 recovery steps 1-3,
/// cases R1..R4). Returns `Err(true)` if the item should be retried
/// later (the source RPC failed), `Err(false)` if it was abandoned
/// without being requeued.
pub async fn recover_one(node: &Arc<LocalNode>, item: &PendingTransfer, source: &dyn Peer) -> std::result::Result<(), bool> {
    let span = tracing::info_span!("recover_one", pathname = %item.pathname, id = %item.id);
    let _enter = span.enter();
    let path: Vec<String> = if item.pathname.is_empty() { Vec::new() } else { item.pathname.split(&item.sep as &str).map(String::from).collect() };

    // Step 1: does the local object still carry #master-request matching
    // item.id (as requestid or grantid)?
    let local_state = {
        let _write = node.lock.acquire_write().await;
        let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
        let state = match node.repo.lookup_path(&arcs).and_then(|id| node.repo.lookup(&id).map(|o| o.attribs.get("#master-request"))) {
            Ok(values) => values.into_iter().find(|v| v == &item.id || GrantId::matches_request(v, &item.id)),
            Err(_) => None,
        };
        node.lock.release_write();
        state
    };

    let Some(current) = local_state else {
        // User manually cleared #master-request; just close the record.
        node.journal.append(Record::Finm { pathname: item.pathname.clone(), sep: item.sep.clone(), id: item.id.clone() });
        return Ok(());
    };

    let local_has_requestid = current == item.id;

    // Step 2: RPC source, read #master-grant.
    let source_object = match source.lookup_pathname(&path).await {
        Ok(obj) => obj,
        Err(_) => return Err(true),
    };
    let source_grant = source_object
        .attribs
        .get("#master-grant")
        .into_iter()
        .flatten()
        .find(|g| GrantId::matches_request(g, &item.id))
        .cloned();

    match (source_grant, local_has_requestid) {
        // R1: no grant at source, local still has requestid -> A3x.
        (None, true) => {
            tracing::debug!("R1: no grant at source, rolling back the local request");
            let _write = node.lock.acquire_write().await;
            let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
            if let Ok(id) = node.repo.lookup_path(&arcs) {
                if let Ok(mut obj) = node.repo.lookup_mut(&id) {
                    obj.attribs.write(AttribOp::Remove, "#master-request", &item.id, crate::now_secs());
                }
            }
            node.journal.append(Record::Finm { pathname: item.pathname.clone(), sep: item.sep.clone(), id: item.id.clone() });
            node.lock.release_write();
            Ok(())
        }
        // R2: source has a grant, local still has requestid -> resume A4.
        (Some(grant), true) => {
            tracing::debug!("R2: source granted, resuming A4");
            let grantid = match GrantId::parse(&grant) {
                Ok(g) => g,
                Err(_) => return Ok(()),
            };
            let _write = node.lock.acquire_write().await;
            let result = super::acquire::accept_mastership(node, &path, source_object.kind, &item.id, &grant, &grantid, &item.pathname);
            node.lock.release_write();
            match result {
                Ok(()) => finish_a5(node, source, &path, &grant).await,
                Err(_) => Ok(()),
            }
        }
        // R3: source has a grant, local has grantid -> resume A5.
        (Some(grant), false) => {
            tracing::debug!("R3: source still holds the grant, resuming A5");
            finish_a5(node, source, &path, &grant).await
        }
        // R4: source has no grant, local has grantid -> run A6.
        (None, false) => {
            tracing::debug!("R4: source grant already cleared, running A6");
            let _write = node.lock.acquire_write().await;
            let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
            if let Ok(id) = node.repo.lookup_path(&arcs) {
                if let Ok(mut obj) = node.repo.lookup_mut(&id) {
                    obj.attribs.write(AttribOp::Remove, "#master-request", &item.id, crate::now_secs());
                }
            }
            node.journal.append(Record::Finm { pathname: item.pathname.clone(), sep: item.sep.clone(), id: item.id.clone() });
            node.lock.release_write();
            Ok(())
        }
    }
}

async fn finish_a5(node: &Arc<LocalNode>, source: &dyn Peer, path: &[String], grant: &str) -> std::result::Result<(), bool> {
    if let Err(e) = source.remove_attrib(path, "#master-grant", grant).await {
        if e.is_rpc_failure() {
            return Err(true);
        }
    }
    let _write = node.lock.acquire_write().await;
    let arcs: Vec<&str> = path.iter().map(String::as_str).collect();
    if let Ok(id) = node.repo.lookup_path(&arcs) {
        if let Ok(mut obj) = node.repo.lookup_mut(&id) {
            obj.attribs.write(AttribOp::Remove, "#master-request", grant, crate::now_secs());
        }
    }
    node.journal.append(Record::Finm { pathname: path.join("/"), sep: "/".to_string(), id: grant.to_string() });
    node.lock.release_write();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recover_from_journal_drops_matched_pairs() {
        let records = vec![
            Record::Acqm { pathname: "/a".into(), sep: "/".into(), requestid: "r1".into() },
            Record::Finm { pathname: "/a".into(), sep: "/".into(), id: "r1".into() },
            Record::Acqm { pathname: "/b".into(), sep: "/".into(), requestid: "r2".into() },
        ];
        let queue = RecoveryQueue::recover_from_journal(&records);
        assert_eq!(queue.pop().map(|p| p.id), Some("r2".to_string()));
        assert!(queue.pop().is_none());
    }

    #[tokio::test]
    async fn push_wakes_a_waiting_drain() {
        let queue = Arc::new(RecoveryQueue::new());
        let queue2 = queue.clone();
        let waiter = tokio::spawn(async move {
            queue2.notify.notified().await;
        });
        queue.push("/a".into(), "/".into(), "r1".into());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
