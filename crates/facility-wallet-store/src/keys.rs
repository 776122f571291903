//! Key encoding for `RocksDB` column families.
//!
//! Composite keys start with the 16 facility bytes so a facility's rows are
//! contiguous and can be scanned with a prefix.

use facility_wallet_core::{AnalysisType, FacilityId, TopUpId};

/// Length of an encoded facility id.
pub const FACILITY_PREFIX_LEN: usize = 16;

/// Wallet key.
#[must_use]
pub fn wallet_key(facility_id: &FacilityId) -> Vec<u8> {
    facility_id.as_bytes().to_vec()
}

/// Ledger entry key.
///
/// Format: `facility_id (16 bytes) || sequence (8 bytes, big-endian)`
///
/// Big-endian sequences sort numerically, so a reverse scan yields the newest
/// entry first.
#[must_use]
pub fn ledger_key(facility_id: &FacilityId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(FACILITY_PREFIX_LEN + 8);
    key.extend_from_slice(facility_id.as_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

/// Prefix shared by all keys of one facility.
#[must_use]
pub fn facility_prefix(facility_id: &FacilityId) -> Vec<u8> {
    facility_id.as_bytes().to_vec()
}

/// Top-up key.
#[must_use]
pub fn top_up_key(top_up_id: &TopUpId) -> Vec<u8> {
    top_up_id.to_bytes().to_vec()
}

/// Gateway reference key.
#[must_use]
pub fn reference_key(reference: &str) -> Vec<u8> {
    reference.as_bytes().to_vec()
}

/// Facility/top-up index key.
///
/// Format: `facility_id (16 bytes) || top_up_id (16 bytes)`
///
/// ULIDs are time-ordered, so a facility's top-ups sort by creation time.
#[must_use]
pub fn facility_top_up_key(facility_id: &FacilityId, top_up_id: &TopUpId) -> Vec<u8> {
    let mut key = Vec::with_capacity(FACILITY_PREFIX_LEN + 16);
    key.extend_from_slice(facility_id.as_bytes());
    key.extend_from_slice(&top_up_id.to_bytes());
    key
}

/// Upper bound for a reverse scan over one facility's composite keys.
#[must_use]
pub fn facility_upper_bound(facility_id: &FacilityId) -> Vec<u8> {
    let mut key = Vec::with_capacity(FACILITY_PREFIX_LEN + 16);
    key.extend_from_slice(facility_id.as_bytes());
    key.extend_from_slice(&[0xFF; 16]);
    key
}

/// Extract the top-up id from a facility/top-up index key.
///
/// Returns `None` if the key is too short.
#[must_use]
pub fn top_up_id_from_index_key(key: &[u8]) -> Option<TopUpId> {
    let bytes: [u8; 16] = key
        .get(FACILITY_PREFIX_LEN..FACILITY_PREFIX_LEN + 16)?
        .try_into()
        .ok()?;
    Some(TopUpId::from_bytes(bytes))
}

/// Decode a top-up id stored as a reference value.
#[must_use]
pub fn top_up_id_from_value(value: &[u8]) -> Option<TopUpId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(TopUpId::from_bytes(bytes))
}

/// Pricing key.
#[must_use]
pub fn pricing_key(analysis_type: AnalysisType) -> Vec<u8> {
    analysis_type.as_str().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_keys_sort_by_sequence() {
        let facility = FacilityId::generate();
        let k2 = ledger_key(&facility, 2);
        let k10 = ledger_key(&facility, 10);
        let k256 = ledger_key(&facility, 256);

        assert_eq!(k2.len(), 24);
        assert!(k2 < k10);
        assert!(k10 < k256);
        assert!(k256 < facility_upper_bound(&facility));
        assert!(k2.starts_with(&facility_prefix(&facility)));
    }

    #[test]
    fn facility_top_up_key_format() {
        let facility = FacilityId::generate();
        let top_up = TopUpId::generate();
        let key = facility_top_up_key(&facility, &top_up);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], facility.as_bytes());
        assert_eq!(top_up_id_from_index_key(&key), Some(top_up));
    }

    #[test]
    fn malformed_keys_do_not_decode() {
        assert_eq!(top_up_id_from_index_key(&[0u8; 20]), None);
        assert_eq!(top_up_id_from_value(&[0u8; 3]), None);
    }
}
