use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(JobId, "job");
branded_id!(UserId, "user");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_prefix() {
        let id = JobId::new();
        assert!(id.as_str().starts_with("job_"), "got: {id}");
    }

    #[test]
    fn user_id_has_prefix() {
        let id = UserId::new();
        assert!(id.as_str().starts_with("user_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn from_raw_preserves_caller_value() {
        let id = JobId::from_raw("client-supplied-42");
        assert_eq!(id.as_str(), "client-supplied-42");
        assert_eq!(id.to_string(), "client-supplied-42");
    }

    #[test]
    fn blank_detection() {
        assert!(JobId::from_raw("   ").is_blank());
        assert!(UserId::from_raw("").is_blank());
        assert!(!JobId::new().is_blank());
    }

    #[test]
    fn serde_is_transparent() {
        let id = JobId::from_raw("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
        let parsed: JobId = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn monotonic_ordering() {
        let ids: Vec<JobId> = (0..50).map(|_| JobId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0].as_str() < w[1].as_str(), "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}
