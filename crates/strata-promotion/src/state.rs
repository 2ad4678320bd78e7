use strata_core::{PromotionStatus, StrataError, StrataResult};

/// Validates a promotion intent transition.
///
/// `previewed -> previewed` is a real transition: it recomputes the diff.
///
/// # Errors
/// [`StrataError::InvalidState`] naming `from -> to`.
pub fn validate_transition(from: PromotionStatus, to: PromotionStatus) -> StrataResult<()> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StrataError::invalid_state(format!(
            "illegal promotion intent transition {from} -> {to}"
        )))
    }
}

pub fn allowed_transitions(from: PromotionStatus) -> Vec<PromotionStatus> {
    use PromotionStatus::*;
    match from {
        Draft => vec![Previewed, Rejected],
        Previewed => vec![Previewed, Approved, Rejected],
        Approved => vec![Executed, Rejected],
        Executed => vec![],
        Rejected => vec![],
    }
}

fn allowed(from: PromotionStatus, to: PromotionStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
