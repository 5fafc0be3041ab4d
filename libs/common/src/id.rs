use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = tradewatch_common::id::prefixed_ulid("sub");
/// assert!(id.starts_with("sub_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Broker subscription handles.
    pub const SUBSCRIPTION: &str = "sub";
    /// One activation of a push stream, used to correlate log lines.
    pub const SESSION: &str = "ses";
}
