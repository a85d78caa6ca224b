//! Membership model - an actor's role inside one cabinet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// The politician who owns the cabinet.
    Owner,
    /// Chief of staff (chefe de gabinete).
    Lead,
    /// Assessor.
    Staff,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Lead => "lead",
            MemberRole::Staff => "staff",
        }
    }

    /// Owners and leads manage the team: invitations, permissions and removals.
    pub fn manages_team(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Lead)
    }
}

impl FromStr for MemberRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(MemberRole::Owner),
            "lead" => Ok(MemberRole::Lead),
            "staff" => Ok(MemberRole::Staff),
            other => Err(UnknownVariant::new("member role", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Membership {
    pub membership_id: Uuid,
    pub cabinet_id: Uuid,
    pub actor_id: Uuid,
    pub member_role: MemberRole,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(cabinet_id: Uuid, actor_id: Uuid, member_role: MemberRole) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            cabinet_id,
            actor_id,
            member_role,
            created_utc: Utc::now(),
        }
    }
}
