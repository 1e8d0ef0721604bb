//! Handler-instance identity.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifies one handler instance for its whole life in a pool.
///
/// A fresh id is minted whenever a pool builds or adopts an instance, so two
/// callers holding the same id are holding the same instance. Singleton pools
/// hand out the same id on every resolution.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct InstanceId(Ulid);

impl InstanceId {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Parses the form printed by `Display`, for ids copied out of logs
impl FromStr for InstanceId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn parses_its_own_display() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<InstanceId>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let id = InstanceId::new();
        assert_eq!(serde_json::to_value(id).unwrap(), id.to_string());
    }
}
