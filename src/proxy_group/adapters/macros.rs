//! User macro table backed by configuration.

use crate::proxy_group::ports::MacroResolver;
use std::collections::HashMap;

const MACRO_OPEN: &str = "{$";
const MACRO_CLOSE: char = '}';

/// Resolves `{$NAME}` macros from a fixed table.
///
/// Names may be registered either bare (`FAILOVER_DELAY`) or in their
/// bracketed form (`{$FAILOVER_DELAY}`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMacroTable {
    values: HashMap<String, String>,
}

impl UserMacroTable {
    /// Creates a table from `(name, value)` pairs.
    #[must_use]
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(name, value)| (normalise_name(name.as_ref()).to_owned(), value.into()))
            .collect();
        Self { values }
    }

    /// Returns the number of registered macros.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether no macros are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalise_name(name: &str) -> &str {
    name.strip_prefix(MACRO_OPEN)
        .and_then(|inner| inner.strip_suffix(MACRO_CLOSE))
        .unwrap_or(name)
}

impl MacroResolver for UserMacroTable {
    fn resolve(&self, expression: &str) -> String {
        let mut resolved = String::with_capacity(expression.len());
        let mut remaining = expression;
        while let Some((before, after_open)) = remaining.split_once(MACRO_OPEN) {
            resolved.push_str(before);
            let Some((name, after_close)) = after_open.split_once(MACRO_CLOSE) else {
                resolved.push_str(MACRO_OPEN);
                resolved.push_str(after_open);
                return resolved;
            };
            match self.values.get(name) {
                Some(value) => resolved.push_str(value),
                None => {
                    resolved.push_str(MACRO_OPEN);
                    resolved.push_str(name);
                    resolved.push(MACRO_CLOSE);
                }
            }
            remaining = after_close;
        }
        resolved.push_str(remaining);
        resolved
    }
}
