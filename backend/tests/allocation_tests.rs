//! Inventory allocation engine tests
//!
//! Covers FIFO planning, manual assignment validation, recipe conversion,
//! proportional restore, and the batch status invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::allocation::{
    apply_deduction, plan_fifo, plan_proportional_restore, propose_fifo, required_raw_quantity,
    restore_quantity, validate_manual, AllocationError, AssignmentRequest, BatchSnapshot,
    PlannedDeduction,
};
use shared::models::BatchStatus;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn batch(product_id: Uuid, remaining: &str) -> BatchSnapshot {
    BatchSnapshot {
        id: Uuid::new_v4(),
        product_id,
        remaining_quantity: dec(remaining),
        status: BatchStatus::InStock,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_fifo_takes_oldest_first() {
        let product = Uuid::new_v4();
        let batches = vec![batch(product, "40"), batch(product, "60"), batch(product, "50")];

        let plan = plan_fifo(&batches, dec("70")).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].batch_id, batches[0].id);
        assert_eq!(plan[0].quantity, dec("40"));
        assert_eq!(plan[1].batch_id, batches[1].id);
        assert_eq!(plan[1].quantity, dec("30"));
    }

    #[test]
    fn test_fifo_insufficient_stock() {
        let product = Uuid::new_v4();
        let batches = vec![batch(product, "40"), batch(product, "20")];

        let err = plan_fifo(&batches, dec("70")).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InsufficientStock {
                required: dec("70"),
                available: dec("60"),
            }
        );
    }

    #[test]
    fn test_fifo_skips_depleted_and_scrapped() {
        let product = Uuid::new_v4();
        let mut depleted = batch(product, "0");
        depleted.status = BatchStatus::Depleted;
        let mut scrapped = batch(product, "30");
        scrapped.status = BatchStatus::Scrapped;
        let usable = batch(product, "25");
        let batches = vec![depleted, scrapped, usable.clone()];

        let plan = plan_fifo(&batches, dec("25")).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].batch_id, usable.id);
    }

    #[test]
    fn test_fifo_rejects_non_positive_quantity() {
        let product = Uuid::new_v4();
        let batches = vec![batch(product, "40")];
        assert!(matches!(
            plan_fifo(&batches, dec("0")),
            Err(AllocationError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn test_required_raw_quantity_scenario() {
        // Selling 10 sheets at 2.5 kg of coil per sheet needs 25 kg
        assert_eq!(required_raw_quantity(dec("10"), dec("2.5")), dec("25.000"));
    }

    #[test]
    fn test_manual_assignment_scenario() {
        // Batch A holds 100 kg; assigning exactly 25 kg succeeds and leaves
        // the batch in stock at 75
        let raw = Uuid::new_v4();
        let mut a = batch(raw, "100");
        let requests = vec![AssignmentRequest {
            batch_id: a.id,
            quantity: dec("25"),
        }];

        let plan =
            validate_manual(std::slice::from_ref(&a), &requests, raw, Some(dec("25"))).unwrap();
        assert_eq!(plan.len(), 1);

        apply_deduction(&mut a, plan[0].quantity);
        assert_eq!(a.remaining_quantity, dec("75"));
        assert_eq!(a.status, BatchStatus::InStock);
    }

    #[test]
    fn test_manual_sum_must_match_exactly() {
        let raw = Uuid::new_v4();
        let a = batch(raw, "100");
        let requests = vec![AssignmentRequest {
            batch_id: a.id,
            quantity: dec("24.999"),
        }];

        let err =
            validate_manual(std::slice::from_ref(&a), &requests, raw, Some(dec("25"))).unwrap_err();
        assert_eq!(
            err,
            AllocationError::QuantityMismatch {
                expected: dec("25"),
                actual: dec("24.999"),
            }
        );
    }

    #[test]
    fn test_manual_product_mismatch_is_never_corrected() {
        let raw = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = batch(other, "100");
        let requests = vec![AssignmentRequest {
            batch_id: a.id,
            quantity: dec("25"),
        }];

        let err =
            validate_manual(std::slice::from_ref(&a), &requests, raw, Some(dec("25"))).unwrap_err();
        assert!(matches!(err, AllocationError::ProductMismatch { .. }));
    }

    #[test]
    fn test_manual_rejects_duplicate_batch() {
        let raw = Uuid::new_v4();
        let a = batch(raw, "100");
        let requests = vec![
            AssignmentRequest {
                batch_id: a.id,
                quantity: dec("10"),
            },
            AssignmentRequest {
                batch_id: a.id,
                quantity: dec("15"),
            },
        ];

        let err =
            validate_manual(std::slice::from_ref(&a), &requests, raw, Some(dec("25"))).unwrap_err();
        assert_eq!(err, AllocationError::DuplicateBatch(a.id));
    }

    #[test]
    fn test_manual_rejects_overdraw_per_batch() {
        let raw = Uuid::new_v4();
        let a = batch(raw, "10");
        let requests = vec![AssignmentRequest {
            batch_id: a.id,
            quantity: dec("15"),
        }];

        let err = validate_manual(std::slice::from_ref(&a), &requests, raw, None).unwrap_err();
        assert!(matches!(err, AllocationError::BatchShort { .. }));
    }

    #[test]
    fn test_deplete_exactly_at_zero() {
        let product = Uuid::new_v4();
        let mut a = batch(product, "25");

        apply_deduction(&mut a, dec("25"));
        assert_eq!(a.remaining_quantity, Decimal::ZERO);
        assert_eq!(a.status, BatchStatus::Depleted);

        restore_quantity(&mut a, dec("25"));
        assert_eq!(a.remaining_quantity, dec("25"));
        assert_eq!(a.status, BatchStatus::InStock);
    }

    #[test]
    fn test_restore_never_revives_scrapped() {
        let product = Uuid::new_v4();
        let mut a = batch(product, "5");
        a.status = BatchStatus::Scrapped;

        restore_quantity(&mut a, dec("10"));
        assert_eq!(a.status, BatchStatus::Scrapped);
    }

    #[test]
    fn test_proposal_reports_shortfall() {
        let product = Uuid::new_v4();
        let batches = vec![batch(product, "40")];

        let proposal = propose_fifo(&batches, dec("70"));
        assert_eq!(proposal.required_quantity, dec("70"));
        assert_eq!(proposal.suggestions.len(), 1);
        assert_eq!(proposal.shortfall, Some(dec("30")));
    }

    #[test]
    fn test_proportional_restore_full_return() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let assignments = vec![
            PlannedDeduction {
                batch_id: a,
                quantity: dec("40"),
            },
            PlannedDeduction {
                batch_id: b,
                quantity: dec("10"),
            },
        ];

        let plan = plan_proportional_restore(&assignments, dec("50")).unwrap();
        assert_eq!(plan[0].quantity, dec("40.000"));
        assert_eq!(plan[1].quantity, dec("10.000"));
    }

    #[test]
    fn test_proportional_restore_partial_return() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let assignments = vec![
            PlannedDeduction {
                batch_id: a,
                quantity: dec("40"),
            },
            PlannedDeduction {
                batch_id: b,
                quantity: dec("10"),
            },
        ];

        // Returning half restores half to each batch
        let plan = plan_proportional_restore(&assignments, dec("25")).unwrap();
        assert_eq!(plan[0].quantity, dec("20.000"));
        assert_eq!(plan[1].quantity, dec("5.000"));
    }

    #[test]
    fn test_proportional_restore_rejects_excess() {
        let assignments = vec![PlannedDeduction {
            batch_id: Uuid::new_v4(),
            quantity: dec("10"),
        }];
        assert!(matches!(
            plan_proportional_restore(&assignments, dec("11")),
            Err(AllocationError::QuantityMismatch { .. })
        ));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Strategy for quantities at quantity scale (0.001 to 1000.000)
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 3))
    }

    fn batch_set_strategy() -> impl Strategy<Value = Vec<Decimal>> {
        prop::collection::vec(quantity_strategy(), 1..8)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// FIFO never plans more than a batch holds, and the plan sums to
        /// exactly the required quantity
        #[test]
        fn fifo_plan_is_exact_and_bounded(
            quantities in batch_set_strategy(),
            take_num in 1i64..=1000i64,
        ) {
            let product = Uuid::new_v4();
            let batches: Vec<BatchSnapshot> = quantities
                .iter()
                .map(|q| BatchSnapshot {
                    id: Uuid::new_v4(),
                    product_id: product,
                    remaining_quantity: *q,
                    status: BatchStatus::InStock,
                })
                .collect();
            let available: Decimal = quantities.iter().copied().sum();
            let required = Decimal::new(take_num, 3).min(available);

            let plan = plan_fifo(&batches, required).unwrap();

            let planned: Decimal = plan.iter().map(|d| d.quantity).sum();
            prop_assert_eq!(planned, required);
            for deduction in &plan {
                let source = batches.iter().find(|b| b.id == deduction.batch_id).unwrap();
                prop_assert!(deduction.quantity <= source.remaining_quantity);
            }
        }

        /// Applying a FIFO plan keeps every batch non-negative, with the
        /// depleted flag exactly at zero
        #[test]
        fn applied_plan_preserves_batch_invariants(
            quantities in batch_set_strategy(),
            take_num in 1i64..=1000i64,
        ) {
            let product = Uuid::new_v4();
            let mut batches: Vec<BatchSnapshot> = quantities
                .iter()
                .map(|q| BatchSnapshot {
                    id: Uuid::new_v4(),
                    product_id: product,
                    remaining_quantity: *q,
                    status: BatchStatus::InStock,
                })
                .collect();
            let available: Decimal = quantities.iter().copied().sum();
            let required = Decimal::new(take_num, 3).min(available);

            let plan = plan_fifo(&batches, required).unwrap();
            for deduction in &plan {
                let target = batches.iter_mut().find(|b| b.id == deduction.batch_id).unwrap();
                apply_deduction(target, deduction.quantity);
            }

            for b in &batches {
                prop_assert!(b.remaining_quantity >= Decimal::ZERO);
                prop_assert_eq!(
                    b.status == BatchStatus::Depleted,
                    b.remaining_quantity == Decimal::ZERO
                );
            }
        }

        /// Deduct-then-restore round trip returns every batch to its original
        /// quantity and status
        #[test]
        fn deduct_restore_round_trip(
            quantities in batch_set_strategy(),
            take_num in 1i64..=1000i64,
        ) {
            let product = Uuid::new_v4();
            let mut batches: Vec<BatchSnapshot> = quantities
                .iter()
                .map(|q| BatchSnapshot {
                    id: Uuid::new_v4(),
                    product_id: product,
                    remaining_quantity: *q,
                    status: BatchStatus::InStock,
                })
                .collect();
            let original = batches.clone();
            let available: Decimal = quantities.iter().copied().sum();
            let required = Decimal::new(take_num, 3).min(available);

            let plan = plan_fifo(&batches, required).unwrap();
            for deduction in &plan {
                let target = batches.iter_mut().find(|b| b.id == deduction.batch_id).unwrap();
                apply_deduction(target, deduction.quantity);
            }
            for deduction in &plan {
                let target = batches.iter_mut().find(|b| b.id == deduction.batch_id).unwrap();
                restore_quantity(target, deduction.quantity);
            }

            prop_assert_eq!(batches, original);
        }

        /// Manufactured assignment sums equal quantity * factor exactly, and
        /// the planned restore always sums back to exactly what is returned
        #[test]
        fn proportional_restore_sums_exactly(
            quantities in batch_set_strategy(),
            restore_num in 1i64..=1_000_000i64,
        ) {
            let assignments: Vec<PlannedDeduction> = quantities
                .iter()
                .map(|q| PlannedDeduction {
                    batch_id: Uuid::new_v4(),
                    quantity: *q,
                })
                .collect();
            let total: Decimal = quantities.iter().copied().sum();
            let restore = Decimal::new(restore_num, 3).min(total);

            let plan = plan_proportional_restore(&assignments, restore).unwrap();

            let restored: Decimal = plan.iter().map(|d| d.quantity).sum();
            prop_assert_eq!(restored, restore);
            for d in &plan {
                prop_assert!(d.quantity > Decimal::ZERO);
            }
        }
    }
}
