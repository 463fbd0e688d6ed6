//! Production status state machine tests

use proptest::prelude::*;

use shared::models::{ProductionStatus, TransitionOutcome};

const ALL_STATES: [ProductionStatus; 6] = [
    ProductionStatus::Na,
    ProductionStatus::PendingApproval,
    ProductionStatus::Rejected,
    ProductionStatus::Queue,
    ProductionStatus::Produced,
    ProductionStatus::Delivered,
];

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use ProductionStatus::*;
        assert_eq!(Na.validate_transition(Queue), Ok(TransitionOutcome::Apply));
        assert_eq!(
            Na.validate_transition(PendingApproval),
            Ok(TransitionOutcome::Apply)
        );
        assert_eq!(
            PendingApproval.validate_transition(Queue),
            Ok(TransitionOutcome::Apply)
        );
        assert_eq!(
            PendingApproval.validate_transition(Rejected),
            Ok(TransitionOutcome::Apply)
        );
        assert_eq!(
            Rejected.validate_transition(PendingApproval),
            Ok(TransitionOutcome::Apply)
        );
        assert_eq!(
            Queue.validate_transition(Produced),
            Ok(TransitionOutcome::Apply)
        );
        assert_eq!(
            Produced.validate_transition(Delivered),
            Ok(TransitionOutcome::Apply)
        );
    }

    #[test]
    fn test_delivered_is_terminal() {
        assert!(ProductionStatus::Delivered.is_terminal());
        for to in ALL_STATES {
            if to == ProductionStatus::Delivered {
                continue;
            }
            assert!(ProductionStatus::Delivered.validate_transition(to).is_err());
        }
    }

    #[test]
    fn test_cannot_skip_produced() {
        let err = ProductionStatus::Queue
            .validate_transition(ProductionStatus::Delivered)
            .unwrap_err();
        // The error names the state pair and the allowed set
        let message = err.to_string();
        assert!(message.contains("'queue'"));
        assert!(message.contains("'delivered'"));
        assert!(message.contains("'produced'"));
    }

    #[test]
    fn test_rejected_can_be_resubmitted() {
        assert_eq!(
            ProductionStatus::Rejected.validate_transition(ProductionStatus::PendingApproval),
            Ok(TransitionOutcome::Apply)
        );
        assert!(ProductionStatus::Rejected
            .validate_transition(ProductionStatus::Queue)
            .is_err());
    }

    #[test]
    fn test_terminal_error_names_terminal_state() {
        let err = ProductionStatus::Delivered
            .validate_transition(ProductionStatus::Queue)
            .unwrap_err();
        assert!(err.to_string().contains("terminal"));
    }

    #[test]
    fn test_round_trip_as_str_parse() {
        for state in ALL_STATES {
            assert_eq!(ProductionStatus::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProductionStatus::parse("shipped"), None);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn state_strategy() -> impl Strategy<Value = ProductionStatus> {
        prop::sample::select(ALL_STATES.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Same-state transitions always succeed as idempotent no-ops
        #[test]
        fn same_state_is_always_a_no_op(state in state_strategy()) {
            prop_assert_eq!(state.validate_transition(state), Ok(TransitionOutcome::NoOp));
        }

        /// validate_transition agrees exactly with the allowed_next table
        #[test]
        fn validation_matches_transition_table(from in state_strategy(), to in state_strategy()) {
            let result = from.validate_transition(to);
            if from == to {
                prop_assert_eq!(result, Ok(TransitionOutcome::NoOp));
            } else if from.allowed_next().contains(&to) {
                prop_assert_eq!(result, Ok(TransitionOutcome::Apply));
            } else {
                prop_assert!(result.is_err());
            }
        }
    }
}
