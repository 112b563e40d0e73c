//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a time-ordered unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Store key for a policy id. Fixed width so that lexicographic key order
/// matches numeric id order.
pub fn policy_key(id: u64) -> String {
    format!("{id:020}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_keys_sort_numerically() {
        let mut ids = vec![10u64, 2, 100, 9, u64::MAX, 0];
        let mut keys: Vec<String> = ids.iter().map(|id| policy_key(*id)).collect();

        ids.sort();
        keys.sort();

        let expected: Vec<String> = ids.iter().map(|id| policy_key(*id)).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn transaction_ids_carry_hrp() {
        let id = new_uuid_to_bech32("tx").unwrap();
        assert!(id.starts_with("tx1"));
    }
}
