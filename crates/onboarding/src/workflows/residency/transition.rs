use super::domain::UserStatus;

/// Raised when an administrator requests a move the approval table forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot change status from {from} to {to}")]
pub struct TransitionError {
    pub from: UserStatus,
    pub to: UserStatus,
}

/// Full approval table. An approved membership cannot return to the review
/// queue. Every other move is open, re-entrant ones included.
pub(crate) const fn is_allowed(from: UserStatus, to: UserStatus) -> bool {
    use UserStatus::{Approved, PendingApproval, Rejected};

    match (from, to) {
        (PendingApproval, PendingApproval) => true,
        (PendingApproval, Approved) => true,
        (PendingApproval, Rejected) => true,
        (Approved, PendingApproval) => false,
        (Approved, Approved) => true,
        (Approved, Rejected) => true,
        (Rejected, PendingApproval) => true,
        (Rejected, Approved) => true,
        (Rejected, Rejected) => true,
    }
}

pub(crate) fn check(from: UserStatus, to: UserStatus) -> Result<(), TransitionError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}
