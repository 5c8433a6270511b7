use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed correlation identifier backed by ULID.
///
/// One id is minted per inbound call and keys the delivery sink that
/// eventually receives the call's deferred result.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct CorrelationId(pub ulid::Ulid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }

    /// Attempt to parse from an opaque token; if invalid, generate a new one.
    pub fn from_str_or_new(token: Option<&str>) -> Self {
        token
            .and_then(|s| s.parse::<CorrelationId>().ok())
            .unwrap_or_default()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(CorrelationId(id))
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<CorrelationId>()
            .map_err(|_| serde::de::Error::custom("invalid correlation id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = CorrelationId::new();
        let parsed: CorrelationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn salvages_invalid_tokens() {
        let id = CorrelationId::new();
        assert_eq!(
            CorrelationId::from_str_or_new(Some(&id.to_string())),
            id
        );
        // Garbage and absent tokens both mint a fresh id.
        let fresh = CorrelationId::from_str_or_new(Some("not-a-ulid"));
        assert_ne!(fresh, id);
        let _ = CorrelationId::from_str_or_new(None);
    }
}
