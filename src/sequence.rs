//! Policy id allocation from a single counter key
use super::error::PolicyError;
use super::ledger::TransactionContext;

pub const COUNTER_KEY: &str = "policyCounter";

pub fn initialize(ctx: &mut impl TransactionContext) -> Result<(), PolicyError> {
    ctx.put_state(COUNTER_KEY, b"0".to_vec())
}

/// Highest id allocated so far, 0 when nothing has been created.
pub fn current(ctx: &mut impl TransactionContext) -> Result<u64, PolicyError> {
    let raw = ctx
        .get_state(COUNTER_KEY)?
        .ok_or(PolicyError::NotInitialized)?;

    std::str::from_utf8(&raw)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| PolicyError::corrupt(COUNTER_KEY, "counter is not an integer"))
}

/// Allocate the next id. The counter write lands in the same transaction as
/// the record it numbers.
pub fn next(ctx: &mut impl TransactionContext) -> Result<u64, PolicyError> {
    let id = current(ctx)?
        .checked_add(1)
        .ok_or(PolicyError::Overflow("policy id"))?;
    ctx.put_state(COUNTER_KEY, id.to_string().into_bytes())?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::policy::TimeStamp;
    use std::sync::Arc;

    fn temp_ledger() -> Ledger {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Ledger::new(Arc::new(db))
    }

    #[test]
    fn uninitialised_counter_is_reported() {
        let ledger = temp_ledger();
        let err = ledger
            .submit(TimeStamp::now(), |tx| next(tx))
            .unwrap_err();

        assert!(matches!(err, PolicyError::NotInitialized));
    }

    #[test]
    fn garbage_counter_is_corrupt() {
        let ledger = temp_ledger();
        ledger
            .submit(TimeStamp::now(), |tx| tx.put_state(COUNTER_KEY, b"seven".to_vec()))
            .unwrap();

        let err = ledger.evaluate(TimeStamp::now(), |tx| current(tx)).unwrap_err();
        assert!(matches!(err, PolicyError::CorruptState { .. }));
    }

    #[test]
    fn ids_follow_each_other() {
        let ledger = temp_ledger();
        ledger.submit(TimeStamp::now(), |tx| initialize(tx)).unwrap();

        let ids: Vec<u64> = (0..3)
            .map(|_| ledger.submit(TimeStamp::now(), |tx| next(tx)).unwrap())
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(ledger.evaluate(TimeStamp::now(), |tx| current(tx)).unwrap(), 3);
    }
}
