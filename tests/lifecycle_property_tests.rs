//! Property-based tests for the policy lifecycle
//!
//! These run the engine against a temporary sled instance per case and check
//! the invariants that must hold for any payment history: id allocation,
//! installment limits, the payment interval, and the exclusive settlement
//! paths.

use policy_ledger::{
    config::EngineConfig,
    error::{ErrorKind, PolicyError},
    ledger::Ledger,
    policy::{PolicyRequest, PolicyStatus, PolicyType, TimeStamp},
    service::PolicyService,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

const T0: i64 = 1_700_000_000;

fn fresh() -> (Ledger, PolicyService) {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let ledger = Ledger::new(Arc::new(db));
    let service = PolicyService::new(EngineConfig::default());
    ledger.submit(at(0), |tx| service.init_ledger(tx)).unwrap();
    (ledger, service)
}

fn at(offset_secs: i64) -> TimeStamp {
    TimeStamp::from_unix(T0 + offset_secs).unwrap()
}

fn request(premium: u32, installments: u32) -> PolicyRequest {
    PolicyRequest::new(PolicyType::Health)
        .set_holder_name("holder")
        .set_age(30)
        .set_premium(Decimal::from(premium))
        .set_installment_no(installments)
}

/// Strategy for any payment amount, including non-positive ones
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (-1_000i64..=1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: ids are strictly increasing and the counter equals the number of creations
    #[test]
    fn prop_ids_strictly_increase(n in 1usize..=15) {
        let (ledger, service) = fresh();

        let mut last = 0u64;
        for i in 0..n {
            let id = ledger
                .submit(at(i as i64), |tx| service.create_policy(tx, request(100, 2)))
                .unwrap();
            prop_assert!(id > last);
            last = id;
        }

        let count = ledger.evaluate(at(100), |tx| service.policy_count(tx)).unwrap();
        prop_assert_eq!(count, n as u64);
    }

    /// Property: payment count never exceeds the installment target
    #[test]
    fn prop_payment_count_bounded(installments in 1u32..=6, attempts in 0u32..=10) {
        let (ledger, service) = fresh();
        let id = ledger
            .submit(at(0), |tx| service.create_policy(tx, request(50, installments)))
            .unwrap();

        for k in 0..attempts {
            let result = ledger.submit(at(10 * (k as i64 + 1)), |tx| {
                service.pay_premium(tx, id, Decimal::from(50))
            });
            if k < installments {
                prop_assert!(result.is_ok());
            } else {
                let limited = matches!(result, Err(PolicyError::InstallmentLimitReached(_)));
                prop_assert!(limited);
            }
        }

        let policy = ledger.evaluate(at(1000), |tx| service.get_policy(tx, id)).unwrap();
        prop_assert_eq!(policy.payment_count, attempts.min(installments));
        prop_assert!(policy.payment_count <= policy.installment_no);
    }

    /// Property: a second payment succeeds iff the minimum interval has elapsed
    #[test]
    fn prop_payment_interval(gap in 0i64..=30) {
        let (ledger, service) = fresh();
        let id = ledger
            .submit(at(0), |tx| service.create_policy(tx, request(50, 5)))
            .unwrap();
        ledger
            .submit(at(100), |tx| service.pay_premium(tx, id, Decimal::from(50)))
            .unwrap();

        let second = ledger.submit(at(100 + gap), |tx| {
            service.pay_premium(tx, id, Decimal::from(50))
        });

        if gap >= 10 {
            prop_assert!(second.is_ok());
        } else {
            let err = second.unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        }
    }

    /// Property: payments on a settled policy fail as a precondition, whatever the amount
    #[test]
    fn prop_settled_policy_rejects_payments(amount in amount_strategy()) {
        let (ledger, service) = fresh();
        let id = ledger
            .submit(at(0), |tx| service.create_policy(tx, request(50, 3)))
            .unwrap();
        ledger.submit(at(1), |tx| service.cancel_policy(tx, id)).unwrap();

        let err = ledger
            .submit(at(100), |tx| service.pay_premium(tx, id, amount))
            .unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    /// Property: exactly one settlement path applies, and it credits the right amount
    #[test]
    fn prop_settlement_is_exclusive(installments in 1u32..=5, paid in 0u32..=5, premium in 1u32..=10_000) {
        let paid = paid.min(installments);
        let (ledger, service) = fresh();
        let id = ledger
            .submit(at(0), |tx| service.create_policy(tx, request(premium, installments)))
            .unwrap();
        for k in 0..paid {
            ledger
                .submit(at(10 * (k as i64 + 1)), |tx| {
                    service.pay_premium(tx, id, Decimal::from(premium))
                })
                .unwrap();
        }

        let before = ledger.evaluate(at(500), |tx| service.get_policy(tx, id)).unwrap();
        let claim = ledger.submit(at(500), |tx| service.claim_coverage(tx, id));
        let cancel = ledger.submit(at(501), |tx| service.cancel_policy(tx, id));

        if paid == installments {
            let claimed = claim.unwrap();
            prop_assert_eq!(claimed.status, PolicyStatus::Claimed);
            prop_assert_eq!(claimed.user_balance, before.coverage);
            prop_assert!(cancel.is_err());
        } else {
            let shortfall = matches!(claim, Err(PolicyError::PremiumShortfall { .. }));
            prop_assert!(shortfall);
            let cancelled = cancel.unwrap();
            prop_assert_eq!(cancelled.status, PolicyStatus::Cancelled);
            prop_assert_eq!(cancelled.user_balance, before.total_paid);
        }
    }
}
