//! `TypeCheck(fromType, toType)` (`spec.md` §4.2).

use crate::model::ObjectKind;

/// Whether mastership may move from an object of `from_type` to one of
/// `to_type`. Appendable directories, stubs, and ghosts may only trade
/// mastership with an exact type match (a directory can't silently become
/// a file mid-transfer); every other kind may also receive mastership from
/// a ghost, since a ghost carries no content to be inconsistent with.
pub fn type_check(from_type: ObjectKind, to_type: ObjectKind) -> bool {
    use ObjectKind::*;
    match to_type {
        AppendableDirectory | Stub | Ghost => from_type == to_type,
        _ => from_type == to_type || from_type == Ghost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ObjectKind::*;

    #[test]
    fn appendable_directory_requires_exact_match() {
        assert!(type_check(AppendableDirectory, AppendableDirectory));
        assert!(!type_check(Ghost, AppendableDirectory));
        assert!(!type_check(MutableDirectory, AppendableDirectory));
    }

    #[test]
    fn ghost_source_satisfies_any_other_destination() {
        assert!(type_check(Ghost, ImmutableFile));
        assert!(type_check(Ghost, MutableDirectory));
    }

    #[test]
    fn mismatched_non_ghost_types_are_rejected() {
        assert!(!type_check(ImmutableFile, MutableFile));
    }
}
