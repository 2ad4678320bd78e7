use proptest::prelude::*;
use strata_core::PromotionStatus;
use strata_promotion::{allowed_transitions, validate_transition};

#[test]
fn test_terminal_states() {
    for to in PromotionStatus::ALL {
        assert!(validate_transition(PromotionStatus::Executed, to).is_err());
        assert!(validate_transition(PromotionStatus::Rejected, to).is_err());
    }
}

#[test]
fn test_rejectable_states() {
    assert!(validate_transition(PromotionStatus::Draft, PromotionStatus::Rejected).is_ok());
    assert!(validate_transition(PromotionStatus::Previewed, PromotionStatus::Rejected).is_ok());
    assert!(validate_transition(PromotionStatus::Approved, PromotionStatus::Rejected).is_ok());
}

fn any_status() -> impl Strategy<Value = PromotionStatus> {
    prop::sample::select(PromotionStatus::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_executed_only_after_approved(from in any_status()) {
        let ok = validate_transition(from, PromotionStatus::Executed).is_ok();
        prop_assert_eq!(ok, from == PromotionStatus::Approved);
    }

    #[test]
    fn prop_terminal_iff_no_transitions(status in any_status()) {
        prop_assert_eq!(status.is_terminal(), allowed_transitions(status).is_empty());
    }
}
