use serde::{Deserialize, Serialize};

/// Closed role set. The authorization branches match on this exhaustively,
/// so an unhandled role is a compile error rather than a silent fallthrough.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role")]
pub enum UserRole {
    #[serde(rename = "admin")]
    #[sqlx(rename = "admin")]
    Admin,
    #[serde(rename = "section staff")]
    #[sqlx(rename = "section staff")]
    SectionStaff,
    #[serde(rename = "reporter")]
    #[sqlx(rename = "reporter")]
    Reporter,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::SectionStaff => "section staff",
            UserRole::Reporter => "reporter",
        }
    }

    pub fn parse(raw: &str) -> Option<UserRole> {
        match raw {
            "admin" => Some(UserRole::Admin),
            "section staff" => Some(UserRole::SectionStaff),
            "reporter" => Some(UserRole::Reporter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_labels_round_trip() {
        for role in [UserRole::Admin, UserRole::SectionStaff, UserRole::Reporter] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("manager"), None);
    }

    #[test]
    fn serde_uses_wire_labels() {
        let json = serde_json::to_string(&UserRole::SectionStaff).unwrap();
        assert_eq!(json, "\"section staff\"");
        let back: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(back, UserRole::Admin);
    }
}
