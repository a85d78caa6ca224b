//! Cabinet model - the tenant owned by a single politician.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Gender, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CabinetStatus {
    Active,
    Deleted,
}

impl CabinetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinetStatus::Active => "active",
            CabinetStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for CabinetStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CabinetStatus::Active),
            "deleted" => Ok(CabinetStatus::Deleted),
            other => Err(UnknownVariant::new("cabinet status", other)),
        }
    }
}

/// Legislative house the politician sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChamberKind {
    /// Câmara municipal (vereadores).
    Municipal,
    /// Assembleia legislativa (deputados estaduais).
    State,
}

impl ChamberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChamberKind::Municipal => "municipal",
            ChamberKind::State => "state",
        }
    }

    fn base_title(&self) -> &'static str {
        match self {
            ChamberKind::Municipal => "Vereador",
            ChamberKind::State => "Deputado",
        }
    }
}

impl FromStr for ChamberKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "municipal" => Ok(ChamberKind::Municipal),
            "state" | "estadual" => Ok(ChamberKind::State),
            other => Err(UnknownVariant::new("chamber kind", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Cabinet {
    pub cabinet_id: Uuid,
    pub cabinet_name: String,
    pub status: CabinetStatus,
    pub politician_id: Uuid,
    pub institution_id: Option<Uuid>,
    pub plan_id: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Cabinet {
    /// Create a new active cabinet owned by `politician_id`.
    pub fn new(cabinet_name: String, politician_id: Uuid, institution_id: Option<Uuid>) -> Self {
        Self {
            cabinet_id: Uuid::new_v4(),
            cabinet_name,
            status: CabinetStatus::Active,
            politician_id,
            institution_id,
            plan_id: None,
            created_utc: Utc::now(),
            deleted_utc: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CabinetStatus::Active
    }
}

/// First and last word of a name with more than two words, otherwise the name itself.
fn short_name(full_name: &str) -> String {
    let words: Vec<&str> = full_name.split_whitespace().collect();
    match words.as_slice() {
        [first, .., last] if words.len() > 2 => format!("{} {}", first, last),
        _ => words.join(" "),
    }
}

/// Build the display name of a politician's cabinet, e.g. "Gabinete da Vereadora Ana Souza".
pub fn cabinet_name(full_name: &str, chamber: ChamberKind, gender: Option<Gender>) -> String {
    let base = chamber.base_title();
    let (article, title) = match gender {
        Some(Gender::Female) => (
            "da",
            match chamber {
                ChamberKind::Municipal => "Vereadora".to_string(),
                ChamberKind::State => "Deputada".to_string(),
            },
        ),
        Some(Gender::NonBinary) => ("do(a)", format!("{}(a)", base)),
        Some(Gender::Male) | None => ("do", base.to_string()),
    };

    format!("Gabinete {} {} {}", article, title, short_name(full_name))
        .trim()
        .to_string()
}
