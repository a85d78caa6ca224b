//! Actor model - a person known to the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::UnknownVariant;

/// Platform-wide role assigned when the actor profile is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    PlatformAdmin,
    Politician,
    CabinetLead,
    Staff,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::PlatformAdmin => "platform_admin",
            ActorRole::Politician => "politician",
            ActorRole::CabinetLead => "cabinet_lead",
            ActorRole::Staff => "staff",
        }
    }
}

impl FromStr for ActorRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_admin" => Ok(ActorRole::PlatformAdmin),
            "politician" => Ok(ActorRole::Politician),
            "cabinet_lead" => Ok(ActorRole::CabinetLead),
            "staff" => Ok(ActorRole::Staff),
            other => Err(UnknownVariant::new("actor role", other)),
        }
    }
}

/// Gender used to pick titles and articles in cabinet names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::NonBinary => "non_binary",
        }
    }
}

impl FromStr for Gender {
    type Err = UnknownVariant;

    /// Accepts the stored codes as well as the Portuguese labels used by profile forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" | "masculino" => Ok(Gender::Male),
            "female" | "f" | "feminino" => Ok(Gender::Female),
            "non_binary" | "nb" | "nao_binario" | "não binário" => Ok(Gender::NonBinary),
            other => Err(UnknownVariant::new("gender", other)),
        }
    }
}

/// Actor profile as persisted by the service.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Actor {
    pub actor_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub gender: Option<Gender>,
    pub actor_role: ActorRole,
    pub created_utc: DateTime<Utc>,
}

impl Actor {
    pub fn new(
        actor_id: Uuid,
        email: &str,
        display_name: Option<String>,
        gender: Option<Gender>,
        actor_role: ActorRole,
    ) -> Self {
        Self {
            actor_id,
            email: normalize_email(email),
            display_name,
            gender,
            actor_role,
            created_utc: Utc::now(),
        }
    }

    pub fn is_platform_admin(&self) -> bool {
        self.actor_role == ActorRole::PlatformAdmin
    }
}

/// Identity asserted by a validated bearer token for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedActor {
    pub actor_id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_accepts_form_labels() {
        assert_eq!("Feminino".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("nb".parse::<Gender>().unwrap(), Gender::NonBinary);
        assert_eq!("masculino".parse::<Gender>().unwrap(), Gender::Male);
        assert!("other".parse::<Gender>().is_err());
    }

    #[test]
    fn actor_email_is_normalized() {
        let actor = Actor::new(
            Uuid::new_v4(),
            "  Jane@Example.COM ",
            None,
            None,
            ActorRole::Staff,
        );
        assert_eq!(actor.email, "jane@example.com");
    }
}
