//! The mastership transfer protocol (`spec.md` §4.2): moving write
//! authority for one object from a source repository to a destination
//! repository, crash-safely.

mod acquire;
mod ids;
mod recovery;
mod typecheck;

pub use acquire::{acquire_mastership, cede_mastership};
pub use ids::{ChildHint, GrantId, RequestId};
pub use recovery::{recover_one, run_recovery_loop, PendingTransfer, RecoveryQueue};
pub use typecheck::type_check;
