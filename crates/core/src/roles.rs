//! Role names and their rank.
//!
//! Roles form a total order; a user's effective role is the highest one
//! they hold. Unknown names rank lowest.

use serde::Serialize;

pub const ROLE_PLAYER: &str = "Player";
pub const ROLE_GAMER: &str = "Gamer";
pub const ROLE_ADMIN: &str = "Admin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Role {
    #[default]
    Player,
    Gamer,
    Admin,
}

impl Role {
    /// Case-insensitive lookup; unrecognised names map to the lowest rank.
    pub fn from_name(name: &str) -> Role {
        let name = name.trim();
        if name.eq_ignore_ascii_case(ROLE_ADMIN) {
            Role::Admin
        } else if name.eq_ignore_ascii_case(ROLE_GAMER) {
            Role::Gamer
        } else {
            Role::Player
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Player => ROLE_PLAYER,
            Role::Gamer => ROLE_GAMER,
            Role::Admin => ROLE_ADMIN,
        }
    }
}

/// Highest-ranked role among `names`, or the lowest rank when empty.
pub fn highest_role<I, S>(names: I) -> Role
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| Role::from_name(n.as_ref()))
        .max()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_ordered() {
        assert!(Role::Player < Role::Gamer);
        assert!(Role::Gamer < Role::Admin);
    }

    #[test]
    fn highest_wins() {
        assert_eq!(highest_role(["Player", "Admin", "Gamer"]), Role::Admin);
        assert_eq!(highest_role(vec!["gamer".to_string()]), Role::Gamer);
    }

    #[test]
    fn unknown_and_empty_rank_lowest() {
        assert_eq!(highest_role(["Moderator"]), Role::Player);
        assert_eq!(highest_role(Vec::<String>::new()), Role::Player);
    }

    #[test]
    fn names_round_trip() {
        for role in [Role::Player, Role::Gamer, Role::Admin] {
            assert_eq!(Role::from_name(role.as_str()), role);
        }
    }
}
