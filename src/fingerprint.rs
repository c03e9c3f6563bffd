use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: &[u8] = &[0x1f];

/// Content fingerprint used to spot a transaction that an earlier import
/// already stored. Fields are separated so `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub fn fingerprint(account_id: i64, amount: i64, date: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account_id.to_string().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(amount.to_string().as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(date.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(description.as_bytes());
    hex::encode(hasher.finalize())
}
