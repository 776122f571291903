//! Column families used by the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Wallet records, keyed by `facility_id`.
    pub const WALLETS: &str = "wallets";

    /// Ledger entries, keyed by `facility_id || sequence` (big-endian).
    pub const LEDGER: &str = "ledger";

    /// Top-up records, keyed by `top_up_id` (ULID).
    pub const TOP_UPS: &str = "top_ups";

    /// Every gateway reference ever issued, mapped to its `top_up_id`.
    pub const TOP_UP_REFERENCES: &str = "top_up_references";

    /// Index: top-ups by facility, keyed by `facility_id || top_up_id`.
    /// Value is empty (index only).
    pub const TOP_UPS_BY_FACILITY: &str = "top_ups_by_facility";

    /// Pricing rows, keyed by analysis type name.
    pub const PRICING: &str = "pricing";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::WALLETS,
        cf::LEDGER,
        cf::TOP_UPS,
        cf::TOP_UP_REFERENCES,
        cf::TOP_UPS_BY_FACILITY,
        cf::PRICING,
    ]
}
