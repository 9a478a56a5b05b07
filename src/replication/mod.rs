//! The replication engine: directive pattern language, traversal, and
//! per-type copy policy (`spec.md` §4.3).

mod copy;
mod directive;
mod pattern;
mod traversal;

pub use copy::{new_bad_read_whole_peers_cache, startup_cleanup, CopyContext, ReplicationOptions, Selection};
pub use directive::{parse_directives, Directive, Sign};
pub use pattern::{MatchContext, Pattern};
pub use traversal::replicate;
