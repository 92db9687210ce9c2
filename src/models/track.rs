// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track model and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LOCAL_PREFIX: &str = "local-";

/// Track identifier: client-generated until the remote store assigns one.
///
/// Serialized as `"42"` for remote ids and `"local-1700000000000"` for
/// client ids, which is also the form used in store keys and URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TrackId {
    /// Derived from the local clock (epoch milliseconds)
    Local(u64),
    /// Assigned by the remote store
    Remote(u64),
}

impl TrackId {
    pub fn is_local(&self) -> bool {
        matches!(self, TrackId::Local(_))
    }

    pub fn remote(&self) -> Option<u64> {
        match self {
            TrackId::Remote(id) => Some(*id),
            TrackId::Local(_) => None,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackId::Local(id) => write!(f, "{}{}", LOCAL_PREFIX, id),
            TrackId::Remote(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for TrackId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (local, digits) = match s.strip_prefix(LOCAL_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let id: u64 = digits
            .parse()
            .map_err(|_| format!("invalid track id: {:?}", s))?;
        Ok(if local {
            TrackId::Local(id)
        } else {
            TrackId::Remote(id)
        })
    }
}

impl TryFrom<String> for TrackId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.to_string()
    }
}

/// Which entity a track follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Human,
    Dog,
}

impl TrackType {
    pub fn label(&self) -> &'static str {
        match self {
            TrackType::Human => "Human",
            TrackType::Dog => "Dog",
        }
    }
}

/// Track record as kept in the local log (positions are stored separately).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub track_type: TrackType,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Human track a dog track follows
    pub reference_track_id: Option<TrackId>,
    /// Reconciliation pointer: leading positions acknowledged by the remote store
    #[serde(default)]
    pub synced_positions: u64,
}

/// Track plus its ordered positions, for read paths.
#[derive(Debug, Clone, Serialize)]
pub struct TrackDetail {
    #[serde(flatten)]
    pub track: Track,
    pub positions: Vec<crate::models::Position>,
}

/// Marker stored while a capture session is active, used for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMarker {
    pub track_id: TrackId,
    pub track_type: TrackType,
    pub reference_track_id: Option<TrackId>,
    pub started_at: DateTime<Utc>,
}
