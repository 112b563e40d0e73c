//! Policy records in the keyed store
use super::error::PolicyError;
use super::ledger::TransactionContext;
use super::policy::Policy;
use super::utils::policy_key;

pub fn read(ctx: &mut impl TransactionContext, id: u64) -> Result<Policy, PolicyError> {
    let key = policy_key(id);
    let bytes = ctx.get_state(&key)?.ok_or(PolicyError::NotFound(id))?;

    minicbor::decode(&bytes).map_err(|err| PolicyError::corrupt(key, err))
}

pub fn write(ctx: &mut impl TransactionContext, policy: &Policy) -> Result<(), PolicyError> {
    let cbor = minicbor::to_vec(policy)?;
    ctx.put_state(&policy_key(policy.id), cbor)
}

pub fn contains(ctx: &mut impl TransactionContext, id: u64) -> Result<bool, PolicyError> {
    Ok(ctx.get_state(&policy_key(id))?.is_some())
}

pub fn delete(ctx: &mut impl TransactionContext, id: u64) -> Result<(), PolicyError> {
    ctx.del_state(&policy_key(id))
}

/// Records with ids in `lo..hi`, lazily decoded in id order.
pub fn scan<'a>(
    ctx: &'a impl TransactionContext,
    lo: u64,
    hi: u64,
) -> Result<impl Iterator<Item = Result<Policy, PolicyError>> + 'a, PolicyError> {
    let entries = ctx.state_by_range(&policy_key(lo), &policy_key(hi))?;

    Ok(entries.map(|entry| {
        let (key, bytes) = entry?;
        minicbor::decode(&bytes).map_err(|err| PolicyError::corrupt(key, err))
    }))
}
