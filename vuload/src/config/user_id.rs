use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, de::Error as _};

/// Placeholder identifier sent when no user id source is configured.
pub const DEFAULT_USER_ID: &str = "someUserId";

/// Where the `userId` of each request payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdSource {
    /// The same literal id for every iteration.
    Fixed(String),
    /// A fresh random id for every iteration.
    Random,
}

impl UserIdSource {
    pub fn next_user_id(&self) -> String {
        match self {
            Self::Fixed(id) => id.clone(),
            Self::Random => format!("user-{:016x}", rand::random::<u64>()),
        }
    }
}

impl Default for UserIdSource {
    fn default() -> Self {
        Self::Fixed(DEFAULT_USER_ID.to_owned())
    }
}

impl FromStr for UserIdSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err("user id cannot be empty".to_owned())
        } else if s == "random" {
            Ok(Self::Random)
        } else {
            Ok(Self::Fixed(s.to_owned()))
        }
    }
}

impl fmt::Display for UserIdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(id) => id.fmt(f),
            Self::Random => f.write_str("random"),
        }
    }
}

impl<'de> Deserialize<'de> for UserIdSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_placeholder_literal() {
        let source = UserIdSource::default();
        assert_eq!(DEFAULT_USER_ID, source.next_user_id());
        assert_eq!(DEFAULT_USER_ID, source.next_user_id());
    }

    #[test]
    fn parse_user_id_source() {
        assert_eq!(Ok(UserIdSource::Random), "random".parse());
        assert_eq!(Ok(UserIdSource::Random), " random ".parse());
        assert_eq!(
            Ok(UserIdSource::Fixed("alice".to_owned())),
            "alice".parse::<UserIdSource>()
        );
        // only the lowercase keyword selects random ids
        for literal in ["Random", "RANDOM"] {
            assert_eq!(
                Ok(UserIdSource::Fixed(literal.to_owned())),
                literal.parse::<UserIdSource>()
            );
        }
        assert!("".parse::<UserIdSource>().is_err());
        assert!("   ".parse::<UserIdSource>().is_err());
    }

    #[test]
    fn random_ids_have_stable_shape() {
        let source = UserIdSource::Random;
        let a = source.next_user_id();
        let b = source.next_user_id();

        for id in [&a, &b] {
            let hex = id.strip_prefix("user-").expect("user- prefix");
            assert_eq!(16, hex.len(), "id: {id}");
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit()), "id: {id}");
        }
        // 64 bits of randomness, a collision here means the rng is broken
        assert_ne!(a, b);
    }
}
