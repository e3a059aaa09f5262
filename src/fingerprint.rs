//! Subject fingerprint derivation.
//!
//! The fingerprint is a SHA-256 digest over normalized identity attributes.
//! It is stored on the transaction record for audit and search; it is not a
//! uniqueness key (the same subject may be verified more than once).

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Field separator inside the digest preimage.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Normalize a single identity attribute: trim, lowercase, collapse
/// internal whitespace runs to a single space.
fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive the hex-encoded fingerprint for a subject's identity attributes.
///
/// Absent optional attributes hash as empty fields, so adding a father's
/// name or date of birth later produces a different fingerprint.
#[must_use]
pub fn subject_fingerprint(
    name: &str,
    address: &str,
    father_name: Option<&str>,
    date_of_birth: Option<&NaiveDate>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(name).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(address).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(father_name.unwrap_or_default()).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(
        date_of_birth
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}
