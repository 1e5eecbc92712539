//! Addressable unit under test.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit (virtual machine instance), identified by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitRef {
    /// Namespace the unit lives in.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl UnitRef {
    /// Create a unit reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_namespace_slash_name() {
        let unit = UnitRef::new("scale-1", "vm-0042");
        assert_eq!(unit.to_string(), "scale-1/vm-0042");
    }

    #[test]
    fn orders_by_namespace_then_name() {
        let mut units = vec![
            UnitRef::new("scale-2", "vm-0001"),
            UnitRef::new("scale-1", "vm-0002"),
            UnitRef::new("scale-1", "vm-0001"),
        ];
        units.sort();
        assert_eq!(units[0], UnitRef::new("scale-1", "vm-0001"));
        assert_eq!(units[2].namespace, "scale-2");
    }
}
