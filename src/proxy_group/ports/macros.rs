//! Port for expanding user macros in group configuration strings.

/// Expands macros such as `{$FAILOVER_DELAY}` to their configured values.
pub trait MacroResolver: Send + Sync {
    /// Returns `expression` with every known macro expanded.
    ///
    /// Unknown macros are left untouched.
    fn resolve(&self, expression: &str) -> String;
}
