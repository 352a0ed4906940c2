//! chronicle-govern: exclusive lock coordination and declarative
//! constraint evaluation.
//!
//! Both coordinators persist their records as graph nodes through the
//! store adapter, so every claim rides on the store's own atomicity. Lock
//! conflicts and constraint violations are outcomes, not errors.

pub mod constraints;
pub mod locks;

pub use constraints::{AppliedConstraint, ConstraintCoordinator, ConstraintSpec};
pub use locks::{LockConflict, LockCoordinator, LockGrant};
