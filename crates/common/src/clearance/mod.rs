//! Clearance model shared by every query path
//!
//! Three ordered levels gate paper visibility. A caller sees a paper iff the
//! paper's stored level ranks at or below the caller's clearance. Stored
//! levels that fail to parse rank as CONFIDENTIAL, so malformed rows are
//! only ever visible to the highest clearance.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller clearance / paper security level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Clearance {
    Public,
    Internal,
    Confidential,
}

impl Clearance {
    pub const ALL: [Clearance; 3] = [
        Clearance::Public,
        Clearance::Internal,
        Clearance::Confidential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Clearance::Public => "PUBLIC",
            Clearance::Internal => "INTERNAL",
            Clearance::Confidential => "CONFIDENTIAL",
        }
    }

    /// Position in the visibility order: PUBLIC(0) < INTERNAL(1) < CONFIDENTIAL(2)
    pub fn rank(&self) -> u8 {
        match self {
            Clearance::Public => 0,
            Clearance::Internal => 1,
            Clearance::Confidential => 2,
        }
    }

    /// Stored levels a caller at this clearance may see
    pub fn allowed_levels(&self) -> &'static [&'static str] {
        match self {
            Clearance::Public => &["PUBLIC"],
            Clearance::Internal => &["PUBLIC", "INTERNAL"],
            Clearance::Confidential => &["PUBLIC", "INTERNAL", "CONFIDENTIAL"],
        }
    }

    /// True iff a paper stored at `level` is visible at this clearance
    pub fn can_see(&self, level: &str) -> bool {
        level_rank(level) <= self.rank()
    }
}

impl fmt::Display for Clearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Clearance {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUBLIC" => Ok(Clearance::Public),
            "INTERNAL" => Ok(Clearance::Internal),
            "CONFIDENTIAL" => Ok(Clearance::Confidential),
            other => Err(AppError::InvalidClearance {
                message: format!(
                    "Invalid clearance: '{}'. Allowed: PUBLIC, INTERNAL, CONFIDENTIAL",
                    other
                ),
            }),
        }
    }
}

/// Rank of a stored paper level; unknown values rank as CONFIDENTIAL
pub fn level_rank(raw: &str) -> u8 {
    match raw {
        "PUBLIC" => 0,
        "INTERNAL" => 1,
        _ => 2,
    }
}

/// Normalize a session role string to a clearance, defaulting to PUBLIC
pub fn normalize_role(raw: Option<&str>) -> Clearance {
    let candidate = raw.unwrap_or("").trim().to_uppercase();
    Clearance::from_str(&candidate).unwrap_or(Clearance::Public)
}

/// Resolve the effective clearance for a request.
///
/// An explicitly requested level must parse exactly (validation error
/// otherwise); when absent the session role decides, falling back to PUBLIC.
pub fn resolve(requested: Option<&str>, session_role: Option<&str>) -> Result<Clearance, AppError> {
    match requested {
        Some(value) => Clearance::from_str(value.trim()),
        None => Ok(normalize_role(session_role)),
    }
}
