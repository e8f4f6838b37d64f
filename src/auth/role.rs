//! Account roles with a total order.

use serde::{Deserialize, Serialize};

/// `user < moderator < admin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User = 1,
    Moderator = 2,
    Admin = 3,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    /// Permission level (higher = more permissions)
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Level of a stored or claimed role string; unknown roles are 0 and
    /// therefore fail every check.
    pub fn level_of(role: &str) -> u8 {
        role.parse::<Role>().map(Role::level).unwrap_or(0)
    }

    /// Whether a role string meets `required`
    pub fn satisfies(role: &str, required: Role) -> bool {
        Role::level_of(role) >= required.level()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        assert!(Role::User < Role::Moderator);
        assert!(Role::Moderator < Role::Admin);
        assert_eq!(Role::User.level(), 1);
        assert_eq!(Role::Moderator.level(), 2);
        assert_eq!(Role::Admin.level(), 3);
    }

    #[test]
    fn test_parse_roundtrip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("Admin".parse::<Role>().is_err());
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_unknown_role_fails_every_check() {
        assert_eq!(Role::level_of("superuser"), 0);
        assert_eq!(Role::level_of(""), 0);
        for required in Role::ALL {
            assert!(!Role::satisfies("superuser", required));
        }
    }

    #[test]
    fn test_satisfies() {
        assert!(Role::satisfies("admin", Role::Moderator));
        assert!(Role::satisfies("moderator", Role::Moderator));
        assert!(!Role::satisfies("user", Role::Moderator));
        assert!(Role::satisfies("user", Role::User));
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Moderator).unwrap(), "\"moderator\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }
}
