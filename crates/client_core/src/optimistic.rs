use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Client-side placeholder id for an entity the gateway has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    pub fn generate() -> Self {
        let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("temp-{}-{sequence}", Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-phase lifecycle of an optimistically created entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntityState<Id> {
    Pending { temp_id: TempId },
    Confirmed { id: Id },
}

impl<Id: AsRef<str>> EntityState<Id> {
    pub fn pending() -> Self {
        Self::Pending {
            temp_id: TempId::generate(),
        }
    }

    /// The id the entity is currently addressed by, temporary or not.
    pub fn key(&self) -> &str {
        match self {
            Self::Pending { temp_id } => temp_id.as_str(),
            Self::Confirmed { id } => id.as_ref(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn confirmed_id(&self) -> Option<&Id> {
        match self {
            Self::Pending { .. } => None,
            Self::Confirmed { id } => Some(id),
        }
    }

    pub fn is_temp(&self, temp: &TempId) -> bool {
        matches!(self, Self::Pending { temp_id } if temp_id == temp)
    }

    /// Moves a pending entity to confirmed; a confirmed one keeps its id.
    pub fn confirm(&mut self, id: Id) {
        if self.is_pending() {
            *self = Self::Confirmed { id };
        }
    }
}

/// What a failed optimistic mutation restores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// The whole cached collection returns to its pre-mutation snapshot.
    #[default]
    WholeCollection,
    /// Only the entity the mutation touched is reverted.
    SingleEntity,
}

impl RollbackPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RollbackPolicy::WholeCollection => "whole-collection",
            RollbackPolicy::SingleEntity => "single-entity",
        }
    }
}

impl FromStr for RollbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "whole-collection" | "whole" | "collection" => Ok(RollbackPolicy::WholeCollection),
            "single-entity" | "single" | "entity" => Ok(RollbackPolicy::SingleEntity),
            other => Err(format!("unknown rollback policy '{other}'")),
        }
    }
}
