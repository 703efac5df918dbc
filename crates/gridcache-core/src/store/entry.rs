use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical partitions of the store. Bulk entities are kept apart from the
/// generic URL-keyed TTL cache so a category can be cleared on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Cache,
    Players,
    Teams,
    Lineups,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Cache,
        Partition::Players,
        Partition::Teams,
        Partition::Lineups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Cache => "cache",
            Partition::Players => "players",
            Partition::Teams => "teams",
            Partition::Lineups => "lineups",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value together with its write and expiry timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Builds an entry stamped at `now`. Returns `None` for a zero TTL,
    /// since `expires_at` must lie strictly after `stored_at`.
    pub fn new(key: impl Into<String>, value: Value, ttl: Duration, now: DateTime<Utc>) -> Option<Self> {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        if ttl <= chrono::Duration::zero() {
            return None;
        }
        let expires_at = now.checked_add_signed(ttl)?;
        Some(Self {
            key: key.into(),
            value,
            stored_at: now,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
