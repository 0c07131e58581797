use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($($name:ident),+ $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub u64);

            impl $name {
                pub fn get(self) -> u64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = std::num::ParseIntError;

                fn from_str(value: &str) -> Result<Self, Self::Err> {
                    value.trim().parse::<u64>().map(Self)
                }
            }
        )+
    };
}

snowflake_id!(GuildId, ChannelId, MessageId, RoleId, UserId, EmojiId);

impl UserId {
    /// Platform mention markup, rendered by clients as `@name`.
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

impl ChannelId {
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}

/// The invoking member as seen by an interaction: identity plus the role set
/// held at the moment the event was delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role_ids: Vec<RoleId>,
}

impl Member {
    pub fn new(user_id: UserId, role_ids: impl IntoIterator<Item = RoleId>) -> Self {
        Self { user_id, role_ids: role_ids.into_iter().collect() }
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.role_ids.contains(&role_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelId, Member, RoleId, UserId};

    #[test]
    fn mentions_use_platform_markup() {
        assert_eq!(UserId(42).mention(), "<@42>");
        assert_eq!(ChannelId(7).mention(), "<#7>");
    }

    #[test]
    fn ids_parse_from_snowflake_strings() {
        assert_eq!(" 1342201759111712799 ".parse::<RoleId>(), Ok(RoleId(1342201759111712799)));
        assert!("not-a-number".parse::<RoleId>().is_err());
    }

    #[test]
    fn member_role_lookup() {
        let member = Member::new(UserId(1), [RoleId(10), RoleId(11)]);
        assert!(member.has_role(RoleId(11)));
        assert!(!member.has_role(RoleId(12)));
    }
}
