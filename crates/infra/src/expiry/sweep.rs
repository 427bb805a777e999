//! What one poller run sweeps.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::ExpiryError;
use super::record::ShardKey;

/// Optional override carried by a scheduled trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOverride {
    /// `YYYY-MM-DD`
    pub date_of_expiry: Option<String>,
    /// RFC 3339 timestamp, e.g. `2022-03-06T12:34:56Z`
    pub time_of_expiry: Option<String>,
}

/// Target of one sweep: the shard date to read and the expiry cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySweep {
    pub date: NaiveDate,
    /// Only records expiring strictly before this are due.
    pub before_epoch_seconds: i64,
}

impl ExpirySweep {
    /// Sweep for a run starting at `now`.
    ///
    /// The date lags `now` by an hour, so a run shortly after midnight still
    /// drains the previous day's shards.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            date: (now - ChronoDuration::hours(1)).date_naive(),
            before_epoch_seconds: now.timestamp(),
        }
    }

    /// The sweep date followed by `lookback_days` earlier dates, newest first.
    pub fn dates(&self, lookback_days: u32) -> Vec<NaiveDate> {
        std::iter::successors(Some(self.date), NaiveDate::pred_opt)
            .take(lookback_days as usize + 1)
            .collect()
    }

    /// Apply a trigger override on top of [`ExpirySweep::at`].
    pub fn resolve(overrides: &SweepOverride, now: DateTime<Utc>) -> Result<Self, ExpiryError> {
        let mut sweep = Self::at(now);

        if let Some(date) = overrides.date_of_expiry.as_deref() {
            sweep.date = NaiveDate::parse_from_str(date, ShardKey::DATE_FORMAT)
                .ok()
                .filter(|_| date.len() == 10)
                .ok_or_else(|| {
                    ExpiryError::InvalidSweep(format!(
                        "dateOfExpiry is not valid ISO date format (YYYY-MM-DD): {date}"
                    ))
                })?;
        }

        if let Some(time) = overrides.time_of_expiry.as_deref() {
            let at = DateTime::parse_from_rfc3339(time).map_err(|_| {
                ExpiryError::InvalidSweep(format!(
                    "timeOfExpiry is not valid date format (YYYY-MM-DD'T'HH:MM:SSZ): {time}"
                ))
            })?;
            sweep.before_epoch_seconds = at.timestamp();
        }

        Ok(sweep)
    }
}
