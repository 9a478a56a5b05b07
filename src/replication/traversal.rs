//! Depth-first traversal driving directive evaluation and object copy
//! (`spec.md` §4.3 "Traversal").

use std::sync::Arc;

use crate::error::Result;
use crate::peer::{LocalNode, Peer};

use super::copy::{copy_object, CopyContext, Selection};
use super::directive::{matchhere, step_directives, Directive};
use super::pattern::MatchContext;

/// Walks the source tree depth-first from the root, copying every
/// selected object into `dest` under `directives`.
pub async fn replicate(ctx: &CopyContext<'_>, directives: &[Directive]) -> Result<()> {
    let span = tracing::info_span!("replicate", source_host_port = %ctx.source_host_port);
    let _enter = span.enter();
    tracing::info!("starting replication pass");
    let result = replicate_node(ctx, Vec::new(), Vec::new(), directives.to_vec()).await;
    match &result {
        Ok(()) => tracing::info!("replication pass complete"),
        Err(e) => tracing::warn!(error = %e, "replication pass failed"),
    }
    result
}

/// Owned path/directive vectors (rather than borrowed slices) let this
/// function recurse across `.await` points without fighting the
/// borrow checker over how long a child's path lives; `Directive` and
/// `String` are cheap enough to clone per recursion step.
fn replicate_node<'a>(
    ctx: &'a CopyContext<'a>,
    src_path: Vec<String>,
    dest_path: Vec<String>,
    directives: Vec<Directive>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let pathname = src_path.join("/");
        let src_obj = ctx.source.lookup_pathname(&src_path).await?;
        let selected = matchhere(&directives);
        tracing::debug!(pathname = %pathname, selected, "evaluating directives at this node");

        if !src_obj.kind.is_directory() {
            if selected {
                copy_object(ctx, &src_path, &dest_path, &src_obj, Selection::Selected).await?;
            }
            return Ok(());
        }

        let children = ctx.source.list_children(&src_path).await?;
        let dest_children = dest_siblings(ctx.dest, &dest_path).await;

        let mut child_directive_lists = Vec::with_capacity(children.len());
        for arc in &children {
            let match_ctx = MatchContext { source_siblings: &children, dest_siblings: &dest_children };
            child_directive_lists.push(step_directives(&directives, arc, &match_ctx));
        }
        let any_descendant_selected = child_directive_lists.iter().any(|(_, dirs)| !dirs.is_empty());

        // A directory that isn't itself selected but shelters a selected
        // descendant still needs to exist at the destination, just without
        // `attrNew`/`attrOld`/`latest` treatment (`spec.md` §4.3 `attrInner`).
        if selected {
            copy_object(ctx, &src_path, &dest_path, &src_obj, Selection::Selected).await?;
        } else if any_descendant_selected {
            tracing::debug!(pathname = %pathname, "not itself selected, recursing for a selected descendant");
            copy_object(ctx, &src_path, &dest_path, &src_obj, Selection::Inner).await?;
        }

        for (arc, (_, child_directives)) in children.into_iter().zip(child_directive_lists) {
            if child_directives.is_empty() {
                continue;
            }

            let mut child_src = src_path.clone();
            child_src.push(arc.clone());
            let mut child_dest = dest_path.clone();
            child_dest.push(arc);

            replicate_node(ctx, child_src, child_dest, child_directives).await?;
        }

        Ok(())
    })
}

async fn dest_siblings(dest: &Arc<LocalNode>, dest_path: &[String]) -> Vec<String> {
    let _read = dest.lock.acquire_read().await;
    let arcs: Vec<&str> = dest_path.iter().map(String::as_str).collect();
    let result = dest
        .repo
        .lookup_path(&arcs)
        .ok()
        .and_then(|id| dest.repo.lookup(&id).ok())
        .and_then(|obj| obj.dir.as_ref().map(|d| d.arcs().map(str::to_string).collect()))
        .unwrap_or_default();
    dest.lock.release_read();
    result
}
