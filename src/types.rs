/// Shared identity types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Project identifier (tenant boundary for keys and rate limits)
pub type ProjectId = i64;

/// Collection identifier inside a project
pub type CollectionId = i64;

/// Capability key record identifier
pub type KeyId = i64;

/// The authenticated identity a request acts as.
///
/// Always a UUID; parsing from a claim or path segment is the only way to build
/// one from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(Uuid);

impl Principal {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl FromStr for Principal {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for Principal {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uuid_strings() {
        let id = Uuid::new_v4();
        let principal: Principal = id.to_string().parse().unwrap();
        assert_eq!(principal.as_uuid(), id);
        assert!("not-a-uuid".parse::<Principal>().is_err());
    }
}
