//! Replication directive lists and the traversal decision they drive
//! (`spec.md` §4.3 "Directive language", "Traversal").

use crate::error::Result;

use super::pattern::{MatchContext, Pattern};

/// Whether a directive includes or excludes the pathnames it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Include,
    Exclude,
}

/// One `(sign, pattern)` directive (`spec.md` §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub sign: Sign,
    pattern: Pattern,
}

/// Parses an ordered directive list from `(sign, raw pattern)` pairs,
/// resolving a `-` pattern that doesn't start with `/` relative to the
/// most recently seen `+` pattern.
pub fn parse_directives(specs: &[(char, &str)]) -> Result<Vec<Directive>> {
    let mut directives = Vec::with_capacity(specs.len());
    let mut most_recent_plus = String::new();
    for &(sign_char, raw) in specs {
        let sign = if sign_char == '+' { Sign::Include } else { Sign::Exclude };
        let resolved = if sign == Sign::Exclude && !raw.starts_with('/') && !raw.is_empty() {
            format!("{most_recent_plus}/{raw}")
        } else {
            raw.to_string()
        };
        if sign == Sign::Include {
            most_recent_plus = resolved.clone();
        }
        directives.push(Directive { sign, pattern: Pattern::parse(&resolved)? });
    }
    Ok(directives)
}

/// Whether the object reached by the path consumed so far is itself
/// selected: the sign of the last directive (by list order) whose
/// pattern is now fully matched, or `false` if none is.
pub fn matchhere(dirs: &[Directive]) -> bool {
    dirs.iter().rev().find(|d| d.pattern.is_empty()).map(|d| d.sign == Sign::Include).unwrap_or(false)
}

/// Steps the directive list one arc deeper, returning whether this child
/// is itself selected and the directive list its own children should be
/// evaluated against. An empty result list prunes recursion entirely.
pub fn step_directives(dirs: &[Directive], arc: &str, ctx: &MatchContext) -> (bool, Vec<Directive>) {
    let stepped: Vec<(Sign, Option<Pattern>)> = dirs.iter().map(|d| (d.sign, d.pattern.step(arc, ctx))).collect();

    let matchhere = stepped.iter().rev().find_map(|(sign, opt)| opt.as_ref().filter(|p| p.is_empty()).map(|_| *sign)).map(|s| s == Sign::Include).unwrap_or(false);

    // A `-` directive that has now fully matched has done its job for
    // this node; it is dropped rather than carried forward, so a later,
    // more specific `+` further down can still re-include a descendant
    // (`spec.md` §4.3: "'-' with empty child-set is dropped").
    let child_dirs = stepped
        .into_iter()
        .filter_map(|(sign, opt)| opt.map(|pattern| Directive { sign, pattern }))
        .filter(|d| !(d.sign == Sign::Exclude && d.pattern.is_empty()))
        .collect();

    (matchhere, child_dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> MatchContext<'a> {
        MatchContext::default()
    }

    #[test]
    fn empty_plus_pattern_includes_everything() {
        let dirs = parse_directives(&[('+', "")]).unwrap();
        assert!(matchhere(&dirs));
        let (here, child) = step_directives(&dirs, "anything", &ctx());
        assert!(here);
        assert!(!child.is_empty());
    }

    #[test]
    fn later_minus_excludes_a_subtree() {
        let dirs = parse_directives(&[('+', ""), ('-', "/build")]).unwrap();
        let (root_here, root_children) = step_directives(&dirs, "build", &ctx());
        assert!(!root_here);
        // The minus directive fully matched and is dropped; nothing in
        // the remaining list still says "include", so deeper descendants
        // fall back to whatever the pruned list says (empty here).
        let (deeper_here, _) = step_directives(&root_children, "output.o", &ctx());
        assert!(!deeper_here);
    }

    #[test]
    fn relative_minus_is_resolved_against_most_recent_plus() {
        let dirs = parse_directives(&[('+', "/src"), ('-', "generated")]).unwrap();
        // "-generated" should behave like "-/src/generated".
        let (_, after_src) = step_directives(&dirs, "src", &ctx());
        let (generated_here, _) = step_directives(&after_src, "generated", &ctx());
        assert!(!generated_here);
        let (other_here, _) = step_directives(&after_src, "other.c", &ctx());
        assert!(other_here);
    }

    #[test]
    fn unmatched_arc_prunes_recursion() {
        let dirs = parse_directives(&[('+', "/src/main.c")]).unwrap();
        let (_, children) = step_directives(&dirs, "docs", &ctx());
        assert!(children.is_empty());
    }
}
