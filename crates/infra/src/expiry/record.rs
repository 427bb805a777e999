//! Expiry records and their sharded index key.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use courier_core::{DomainError, DomainResult, ResourceKey};

/// Write-sharded date key: `YYYY-MM-DD#<shard>`.
///
/// Spreads one day's expiries over `N` partitions so no single index partition
/// takes every write for that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShardKey {
    date: NaiveDate,
    shard: u32,
}

impl ShardKey {
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";

    pub fn new(date: NaiveDate, shard: u32) -> Self {
        Self { date, shard }
    }

    /// Key for an item expiring at `expiry_epoch_seconds` (UTC date), on `shard`.
    pub fn for_expiry(expiry_epoch_seconds: i64, shard: u32) -> DomainResult<Self> {
        let at = DateTime::<Utc>::from_timestamp(expiry_epoch_seconds, 0).ok_or_else(|| {
            DomainError::invalid_timestamp(format!(
                "{expiry_epoch_seconds} is out of range for a calendar date"
            ))
        })?;
        Ok(Self::new(at.date_naive(), shard))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }
}

impl core::fmt::Display for ShardKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.date.format(Self::DATE_FORMAT), self.shard)
    }
}

impl FromStr for ShardKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, shard) = s
            .split_once('#')
            .ok_or_else(|| DomainError::validation(format!("shard key has no '#': {s}")))?;
        let date = NaiveDate::parse_from_str(date, Self::DATE_FORMAT)
            .map_err(|e| DomainError::validation(format!("shard key date {date:?}: {e}")))?;
        let shard = shard
            .parse::<u32>()
            .map_err(|e| DomainError::validation(format!("shard key shard {shard:?}: {e}")))?;
        Ok(Self::new(date, shard))
    }
}

impl TryFrom<String> for ShardKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShardKey> for String {
    fn from(value: ShardKey) -> Self {
        value.to_string()
    }
}

/// An item scheduled to expire.
///
/// Invariant: `shard_key.date()` is the UTC calendar date of `expiry_epoch_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryRecord {
    pub resource_key: ResourceKey,
    pub expiry_epoch_seconds: i64,
    pub shard_key: ShardKey,
    #[serde(default)]
    pub payload: JsonValue,
}

impl ExpiryRecord {
    /// Build a record, enforcing the shard-date invariant.
    pub fn new(
        resource_key: ResourceKey,
        expiry_epoch_seconds: i64,
        shard: u32,
        payload: JsonValue,
    ) -> DomainResult<Self> {
        Ok(Self {
            resource_key,
            expiry_epoch_seconds,
            shard_key: ShardKey::for_expiry(expiry_epoch_seconds, shard)?,
            payload,
        })
    }

    pub fn is_due(&self, before_epoch_seconds: i64) -> bool {
        self.expiry_epoch_seconds < before_epoch_seconds
    }
}
