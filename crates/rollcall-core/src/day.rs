//! Operational day window.
//!
//! Attendance is grouped by an operational day that does not follow the
//! calendar: it opens at 00:07:00 on a calendar date and closes at 06:59:59 on
//! the following date. The window for "now" is always derived from the
//! calendar date of "now" in the coordinator's local timezone.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{OPERATIONAL_DAY_END, OPERATIONAL_DAY_START};
use crate::{Error, Result};

/// Inclusive `[start, end]` range of one operational day, stored in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalDay {
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl OperationalDay {
    /// Window opened on `date`, interpreted in `tz`.
    ///
    /// # Errors
    /// Returns `Error::InvalidTimestamp` if the boundaries cannot be
    /// represented (date overflow).
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<Self> {
        let (sh, sm, ss) = OPERATIONAL_DAY_START;
        let (eh, em, es) = OPERATIONAL_DAY_END;

        let start = date
            .and_hms_opt(sh, sm, ss)
            .ok_or_else(|| Error::InvalidTimestamp(format!("day start on {date}")))?;
        let end = date
            .checked_add_days(Days::new(1))
            .and_then(|next| next.and_hms_opt(eh, em, es))
            .ok_or_else(|| Error::InvalidTimestamp(format!("day end after {date}")))?;

        Ok(Self {
            date,
            start: to_utc(start, tz),
            end: to_utc(end, tz),
        })
    }

    /// Window for the calendar date of `now`.
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Self> {
        Self::for_date(now.date_naive(), &now.timezone())
    }

    /// Window for the current local date.
    pub fn current() -> Result<Self> {
        Self::containing(&Local::now())
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

// DST gaps have no local representation; fall back to reading the wall clock as UTC.
fn to_utc<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
