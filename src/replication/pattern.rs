//! The replication directive pattern language (`spec.md` §4.3 "Directive
//! language"): pathname patterns with arc-level metacharacters, numeric
//! ranges resolved against a traversal context, and multi-segment `%X`
//! repetition.

use crate::error::{Error, Result};

/// One character-class member: a single character or an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

/// A bound in a `[lo,hi]` numeric range: an integer literal or one of the
/// four context-relative tokens, optionally offset by a literal integer
/// (`LAST-1`, `FIRST+2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Literal(i64),
    First,
    Last,
    DFirst,
    DLast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NumBound {
    base: Bound,
    offset: i64,
}

/// One atom of a single arc's pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Atom {
    Literal(char),
    Star,
    Question,
    Hash,
    Class { negate: bool, items: Vec<ClassItem> },
    Range { lo: NumBound, hi: NumBound },
    Alt(Vec<ArcPattern>),
}

/// A single arc's compiled pattern: a sequence of atoms matched in order
/// with backtracking for the variable-length atoms (`*`, `#`, `Alt`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcPattern(Vec<Atom>);

/// One segment of a path pattern: either an ordinary arc pattern, or a
/// `%X` repetition matching zero or more consecutive segments each
/// matching `X`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Arc(ArcPattern),
    Repeat(ArcPattern),
}

/// A compiled pathname pattern: an ordered list of path segments.
/// An empty pattern (no segments) matches every pathname, per the
/// root-level special case in `spec.md` §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

/// The current-directory context a numeric range is resolved against:
/// the all-digit arc names present in the source and destination
/// directories being traversed (`spec.md` §4.3 `FIRST`/`LAST`/
/// `DFIRST`/`DLAST`).
#[derive(Debug, Clone, Default)]
pub struct MatchContext<'a> {
    pub source_siblings: &'a [String],
    pub dest_siblings: &'a [String],
}

impl Pattern {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.strip_prefix('/').unwrap_or(s);
        if s.is_empty() {
            return Ok(Pattern { segments: Vec::new() });
        }
        let segments = s.split('/').map(parse_segment).collect::<Result<Vec<_>>>()?;
        Ok(Pattern { segments })
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the remaining pattern matches the remaining path arcs
    /// exactly (used to decide `matchhere` at the end of a traversal
    /// path).
    pub fn matches_full(&self, arcs: &[&str], ctx: &MatchContext) -> bool {
        match_segments(&self.segments, arcs, ctx)
    }

    /// For one more step of traversal into child `arc`: returns `Some`
    /// with the pattern remaining to match against that child's
    /// descendants, or `None` if `arc` cannot possibly satisfy this
    /// pattern (pruning recursion).
    pub fn step(&self, arc: &str, ctx: &MatchContext) -> Option<Pattern> {
        if self.segments.is_empty() {
            // An empty pattern matches everything at and below this point.
            return Some(Pattern { segments: Vec::new() });
        }
        match &self.segments[0] {
            Segment::Arc(p) => {
                if match_arc(p, arc, ctx) {
                    Some(Pattern { segments: self.segments[1..].to_vec() })
                } else {
                    None
                }
            }
            Segment::Repeat(p) => {
                // %X = head(X)/%X | tail(X): either consume one more
                // segment matching X and stay in the repeat, or drop the
                // repeat and match what follows (possibly nothing).
                let stays = match_arc(p, arc, ctx).then(|| self.clone());
                let drops = Pattern { segments: self.segments[1..].to_vec() }.step(arc, ctx);
                stays.or(drops)
            }
        }
    }
}

fn match_segments(segments: &[Segment], arcs: &[&str], ctx: &MatchContext) -> bool {
    match segments {
        [] => arcs.is_empty(),
        [Segment::Arc(p), rest @ ..] => match arcs.split_first() {
            Some((first, tail)) => match_arc(p, first, ctx) && match_segments(rest, tail, ctx),
            None => false,
        },
        [Segment::Repeat(p), rest @ ..] => {
            // Try consuming 0, 1, 2, ... matching segments before the rest.
            for n in 0..=arcs.len() {
                let (head, tail) = arcs.split_at(n);
                if head.iter().all(|a| match_arc(p, a, ctx)) && match_segments(rest, tail, ctx) {
                    return true;
                }
            }
            false
        }
    }
}

fn parse_segment(s: &str) -> Result<Segment> {
    if let Some(rest) = s.strip_prefix('%') {
        Ok(Segment::Repeat(parse_arc(rest)?))
    } else {
        Ok(Segment::Arc(parse_arc(s)?))
    }
}

fn parse_arc(s: &str) -> Result<ArcPattern> {
    let chars: Vec<char> = s.chars().collect();
    let mut atoms = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                atoms.push(Atom::Star);
                i += 1;
            }
            '?' => {
                atoms.push(Atom::Question);
                i += 1;
            }
            '#' => {
                atoms.push(Atom::Hash);
                i += 1;
            }
            '[' => {
                let close = find_matching(&chars, i, '[', ']')?;
                let inner: String = chars[i + 1..close].iter().collect();
                atoms.push(parse_bracket(&inner)?);
                i = close + 1;
            }
            '{' => {
                let close = find_matching(&chars, i, '{', '}')?;
                let inner: String = chars[i + 1..close].iter().collect();
                let alts = split_top_level(&inner, ',').into_iter().map(|a| parse_arc(&a)).collect::<Result<Vec<_>>>()?;
                atoms.push(Atom::Alt(alts));
                i = close + 1;
            }
            '\\' if i + 1 < chars.len() => {
                atoms.push(Atom::Literal(chars[i + 1]));
                i += 2;
            }
            c => {
                atoms.push(Atom::Literal(c));
                i += 1;
            }
        }
    }
    Ok(ArcPattern(atoms))
}

fn parse_bracket(inner: &str) -> Result<Atom> {
    // Could be a character class `[a-z]`/`[^a-z]` or a numeric range
    // `[lo,hi]`; disambiguate on the presence of a top-level comma.
    if inner.contains(',') {
        let parts = split_top_level(inner, ',');
        let [lo, hi]: [String; 2] = parts.try_into().map_err(|_| bad("numeric range must have exactly two bounds"))?;
        return Ok(Atom::Range { lo: parse_bound(lo.trim())?, hi: parse_bound(hi.trim())? });
    }
    let (negate, body) = match inner.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let chars: Vec<char> = body.chars().collect();
    let mut items = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if i + 2 < chars.len() && chars[i + 1] == '-' {
            items.push(ClassItem::Range(chars[i], chars[i + 2]));
            i += 3;
        } else {
            items.push(ClassItem::Char(chars[i]));
            i += 1;
        }
    }
    Ok(Atom::Class { negate, items })
}

fn parse_bound(s: &str) -> Result<NumBound> {
    for (op, sign) in [('+', 1i64), ('-', -1i64)] {
        if let Some(pos) = s.rfind(op) {
            if pos > 0 {
                let (head, tail) = (&s[..pos], &s[pos + 1..]);
                let offset: i64 = tail.parse().map_err(|_| bad("malformed numeric range offset"))?;
                return Ok(NumBound { base: parse_base(head)?, offset: sign * offset });
            }
        }
    }
    Ok(NumBound { base: parse_base(s)?, offset: 0 })
}

fn parse_base(s: &str) -> Result<Bound> {
    match s {
        "FIRST" => Ok(Bound::First),
        "LAST" => Ok(Bound::Last),
        "DFIRST" => Ok(Bound::DFirst),
        "DLAST" => Ok(Bound::DLast),
        _ => s.parse().map(Bound::Literal).map_err(|_| bad("malformed numeric range bound")),
    }
}

fn resolve_bound(bound: &NumBound, ctx: &MatchContext) -> Option<i64> {
    let base = match bound.base {
        Bound::Literal(n) => n,
        Bound::First => extreme(ctx.source_siblings, true)?,
        Bound::Last => extreme(ctx.source_siblings, false)?,
        Bound::DFirst => extreme(ctx.dest_siblings, true)?,
        Bound::DLast => extreme(ctx.dest_siblings, false)?,
    };
    Some(base + bound.offset)
}

fn extreme(siblings: &[String], want_min: bool) -> Option<i64> {
    siblings
        .iter()
        .filter(|a| !a.is_empty() && a.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|a| a.parse::<i64>().ok())
        .fold(None, |acc, n| match acc {
            None => Some(n),
            Some(m) if want_min => Some(m.min(n)),
            Some(m) => Some(m.max(n)),
        })
}

fn find_matching(chars: &[char], open_at: usize, open: char, close: char) -> Result<usize> {
    let mut depth = 0;
    for (i, &c) in chars.iter().enumerate().skip(open_at) {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Ok(i);
            }
        }
    }
    Err(bad("unbalanced bracket in pattern"))
}

fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn bad(msg: &str) -> Error {
    Error::InvalidArgs(format!("malformed replication pattern: {msg}"))
}

fn match_arc(pattern: &ArcPattern, arc: &str, ctx: &MatchContext) -> bool {
    match_atoms(&pattern.0, &arc.chars().collect::<Vec<_>>(), arc, ctx)
}

fn match_atoms(atoms: &[Atom], chars: &[char], whole_arc: &str, ctx: &MatchContext) -> bool {
    match atoms {
        [] => chars.is_empty(),
        [Atom::Literal(c), rest @ ..] => chars.first() == Some(c) && match_atoms(rest, &chars[1..], whole_arc, ctx),
        [Atom::Question, rest @ ..] => !chars.is_empty() && match_atoms(rest, &chars[1..], whole_arc, ctx),
        [Atom::Star, rest @ ..] => (0..=chars.len()).any(|n| match_atoms(rest, &chars[n..], whole_arc, ctx)),
        [Atom::Hash, rest @ ..] => {
            let digits = chars.iter().take_while(|c| c.is_ascii_digit()).count();
            (0..=digits).any(|n| match_atoms(rest, &chars[n..], whole_arc, ctx))
        }
        [Atom::Class { negate, items }, rest @ ..] => match chars.first() {
            Some(&c) => {
                let hit = items.iter().any(|item| match item {
                    ClassItem::Char(x) => *x == c,
                    ClassItem::Range(lo, hi) => *lo <= c && c <= *hi,
                });
                (hit != *negate) && match_atoms(rest, &chars[1..], whole_arc, ctx)
            }
            None => false,
        },
        [Atom::Range { lo, hi }, rest @ ..] => {
            if !rest.is_empty() {
                // Numeric ranges only ever appear as a whole arc's pattern
                // in practice; reject composing them with trailing atoms
                // rather than guessing a split point.
                return false;
            }
            if !whole_arc.chars().all(|c| c.is_ascii_digit()) || whole_arc.is_empty() {
                return false;
            }
            let Ok(value) = whole_arc.parse::<i64>() else { return false };
            let (Some(lo), Some(hi)) = (resolve_bound(lo, ctx), resolve_bound(hi, ctx)) else { return false };
            lo <= value && value <= hi
        }
        [Atom::Alt(alts), rest @ ..] => alts.iter().any(|alt| {
            (0..=chars.len()).any(|n| {
                let (head, tail) = chars.split_at(n);
                match_atoms(&alt.0, head, whole_arc, ctx) && match_atoms(rest, tail, whole_arc, ctx)
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> MatchContext<'a> {
        MatchContext::default()
    }

    #[test]
    fn empty_pattern_matches_everything() {
        let p = Pattern::parse("").unwrap();
        assert!(p.matches_full(&[], &ctx()));
        assert!(p.matches_full(&["a", "b"], &ctx()));
    }

    #[test]
    fn star_and_question_match_within_one_arc() {
        let p = Pattern::parse("foo*.c").unwrap();
        assert!(p.matches_full(&["foobar.c"], &ctx()));
        assert!(!p.matches_full(&["foobar.c", "x"], &ctx()));
        let q = Pattern::parse("fo?.c").unwrap();
        assert!(q.matches_full(&["foo.c"], &ctx()));
        assert!(!q.matches_full(&["foo.c", "x"], &ctx()));
    }

    #[test]
    fn hash_matches_decimal_digit_runs() {
        let p = Pattern::parse("build#").unwrap();
        assert!(p.matches_full(&["build123"], &ctx()));
        assert!(p.matches_full(&["build"], &ctx()));
        assert!(!p.matches_full(&["buildx"], &ctx()));
    }

    #[test]
    fn character_class_and_negation() {
        let p = Pattern::parse("[a-c]x").unwrap();
        assert!(p.matches_full(&["bx"], &ctx()));
        assert!(!p.matches_full(&["dx"], &ctx()));
        let n = Pattern::parse("[^a-c]x").unwrap();
        assert!(n.matches_full(&["dx"], &ctx()));
        assert!(!n.matches_full(&["bx"], &ctx()));
    }

    #[test]
    fn alternation_matches_any_branch() {
        let p = Pattern::parse("{foo,bar}.txt").unwrap();
        assert!(p.matches_full(&["foo.txt"], &ctx()));
        assert!(p.matches_full(&["bar.txt"], &ctx()));
        assert!(!p.matches_full(&["baz.txt"], &ctx()));
    }

    #[test]
    fn numeric_range_resolves_against_context() {
        let p = Pattern::parse("[FIRST,LAST-1]").unwrap();
        let siblings = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let ctx = MatchContext { source_siblings: &siblings, dest_siblings: &[] };
        assert!(p.matches_full(&["1"], &ctx));
        assert!(p.matches_full(&["2"], &ctx));
        assert!(!p.matches_full(&["3"], &ctx));
    }

    #[test]
    fn repeat_segment_matches_zero_or_more_path_components() {
        let p = Pattern::parse("a/%b/c").unwrap();
        assert!(p.matches_full(&["a", "c"], &ctx()));
        assert!(p.matches_full(&["a", "b", "c"], &ctx()));
        assert!(p.matches_full(&["a", "b", "b", "c"], &ctx()));
        assert!(!p.matches_full(&["a", "x", "c"], &ctx()));
    }

    #[test]
    fn step_prunes_when_arc_cannot_match() {
        let p = Pattern::parse("foo/bar").unwrap();
        assert!(p.step("foo", &ctx()).is_some());
        assert!(p.step("nope", &ctx()).is_none());
    }
}
