//! Sales flow tests over the decision layer
//!
//! Exercises the full manufactured-sale scenario (recipe conversion, batch
//! assignment, totals, ledger effect) and the create/cancel round trip using
//! the pure planning and replay functions the orchestrator composes.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::allocation::{
    apply_deduction, plan_fifo, required_raw_quantity, restore_quantity, validate_manual,
    AssignmentRequest, BatchSnapshot,
};
use shared::ledger::{covers_invoice, entry_balance, replay_balances, EntryDelta};
use shared::models::BatchStatus;
use shared::types::{round_money, round_quantity};
use shared::validation;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Selling 10 roofing sheets at 2.5 kg of coil each: the assignment must
    /// cover exactly 25 kg, batch A drops from 100 to 75 and stays in stock
    #[test]
    fn test_manufactured_sale_scenario() {
        let coil = Uuid::new_v4();
        let mut batch_a = BatchSnapshot {
            id: Uuid::new_v4(),
            product_id: coil,
            remaining_quantity: dec("100"),
            status: BatchStatus::InStock,
        };

        let required = required_raw_quantity(dec("10"), dec("2.5"));
        assert_eq!(required, dec("25.000"));

        let requests = vec![AssignmentRequest {
            batch_id: batch_a.id,
            quantity: dec("25.000"),
        }];
        let plan = validate_manual(
            std::slice::from_ref(&batch_a),
            &requests,
            coil,
            Some(required),
        )
        .unwrap();

        for deduction in &plan {
            apply_deduction(&mut batch_a, deduction.quantity);
        }
        assert_eq!(batch_a.remaining_quantity, dec("75"));
        assert_eq!(batch_a.status, BatchStatus::InStock);

        // Line subtotal at money scale
        assert_eq!(round_money(dec("10") * dec("145.00")), dec("1450.00"));
    }

    /// Create then cancel: every batch returns to its pre-sale quantity and
    /// status, and the contact balance returns to its pre-sale value
    #[test]
    fn test_create_cancel_round_trip() {
        let coil = Uuid::new_v4();
        let mut batches = vec![
            BatchSnapshot {
                id: Uuid::new_v4(),
                product_id: coil,
                remaining_quantity: dec("30"),
                status: BatchStatus::InStock,
            },
            BatchSnapshot {
                id: Uuid::new_v4(),
                product_id: coil,
                remaining_quantity: dec("20"),
                status: BatchStatus::InStock,
            },
        ];
        let original = batches.clone();
        let opening_balance = dec("-250.00");

        // Create: FIFO across both batches plus the invoice debit
        let plan = plan_fifo(&batches, dec("45")).unwrap();
        for deduction in &plan {
            let target = batches
                .iter_mut()
                .find(|b| b.id == deduction.batch_id)
                .unwrap();
            apply_deduction(target, deduction.quantity);
        }
        assert_eq!(batches[0].status, BatchStatus::Depleted);
        let entries = vec![EntryDelta {
            debit: dec("1732.50"),
            credit: Decimal::ZERO,
        }];
        let after_sale = *replay_balances(opening_balance, &entries).last().unwrap();
        assert_eq!(after_sale, dec("1482.50"));

        // Cancel: restore every assignment, delete the entry, replay
        for deduction in &plan {
            let target = batches
                .iter_mut()
                .find(|b| b.id == deduction.batch_id)
                .unwrap();
            restore_quantity(target, deduction.quantity);
        }
        assert_eq!(batches, original);
        let after_cancel = replay_balances(opening_balance, &[]);
        assert!(after_cancel.is_empty());
        // Stream is empty again; the cached balance falls back to the opening
        assert_eq!(opening_balance, dec("-250.00"));
    }

    /// Customer with 5000 in credit buys for 4000 requested as unpaid; the
    /// invoice is auto-marked paid without a payment entry
    #[test]
    fn test_auto_payment_on_creation() {
        let prior_balance = dec("-5000");
        let total = dec("4000");

        assert!(covers_invoice(prior_balance, total));
        // The invoice entry still posts; the credit absorbs it
        assert_eq!(
            entry_balance(prior_balance, total, Decimal::ZERO),
            dec("-1000")
        );
    }

    #[test]
    fn test_line_validation_rejects_bad_input() {
        assert!(validation::validate_quantity(dec("0")).is_err());
        assert!(validation::validate_quantity(dec("-1")).is_err());
        assert!(validation::validate_quantity(dec("1.0001")).is_err());
        assert!(validation::validate_quantity(dec("10.500")).is_ok());

        assert!(validation::validate_unit_price(dec("-0.01")).is_err());
        assert!(validation::validate_unit_price(dec("38.505")).is_err());
        assert!(validation::validate_unit_price(dec("0")).is_ok());

        let no_items: Vec<u32> = vec![];
        assert!(validation::validate_has_items(&no_items).is_err());
        assert!(validation::validate_has_items(&[1]).is_ok());

        assert!(validation::validate_identity("  ").is_err());
        assert!(validation::validate_identity("worker-7").is_ok());
    }

    #[test]
    fn test_rounding_scales() {
        assert_eq!(round_quantity(dec("2.0005")), dec("2.000"));
        assert_eq!(round_quantity(dec("2.00051")), dec("2.001"));
        assert_eq!(round_money(dec("1732.505")), dec("1732.50"));
        assert_eq!(round_money(dec("1732.5051")), dec("1732.51"));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 3))
    }

    fn factor_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=10_000i64).prop_map(|n| Decimal::new(n, 3))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any manufactured sale satisfied by a single large batch, the
        /// assigned quantity equals quantity * factor exactly
        #[test]
        fn manufactured_assignments_sum_exactly(
            quantity in quantity_strategy(),
            factor in factor_strategy(),
        ) {
            let raw = Uuid::new_v4();
            let required = required_raw_quantity(quantity, factor);
            prop_assume!(required > Decimal::ZERO);

            let big_batch = BatchSnapshot {
                id: Uuid::new_v4(),
                product_id: raw,
                remaining_quantity: required + dec("1000"),
                status: BatchStatus::InStock,
            };
            let requests = vec![AssignmentRequest {
                batch_id: big_batch.id,
                quantity: required,
            }];

            let plan = validate_manual(
                std::slice::from_ref(&big_batch),
                &requests,
                raw,
                Some(required),
            ).unwrap();

            let assigned: Decimal = plan.iter().map(|d| d.quantity).sum();
            prop_assert_eq!(assigned, required);
        }

        /// Off-by-a-thousandth assignments are always rejected
        #[test]
        fn near_miss_assignments_are_rejected(
            quantity in quantity_strategy(),
            factor in factor_strategy(),
        ) {
            let raw = Uuid::new_v4();
            let required = required_raw_quantity(quantity, factor);
            prop_assume!(required > dec("0.001"));

            let big_batch = BatchSnapshot {
                id: Uuid::new_v4(),
                product_id: raw,
                remaining_quantity: required + dec("1000"),
                status: BatchStatus::InStock,
            };
            let requests = vec![AssignmentRequest {
                batch_id: big_batch.id,
                quantity: required - dec("0.001"),
            }];

            let result = validate_manual(
                std::slice::from_ref(&big_batch),
                &requests,
                raw,
                Some(required),
            );
            prop_assert!(result.is_err());
        }
    }
}
