//! Expiry arithmetic over calendar dates.
//!
//! Every function here works on [`Date`] values, so time of day never leaks into a
//! day count: two instants on the same calendar day always classify the same way.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use time::{Date, Duration, OffsetDateTime};

use crate::model::{local_offset, ValidationError};

/// Items expiring within this many days (inclusive) are flagged as [`ExpiryStatus::Warning`].
pub const WARNING_WINDOW_DAYS: i64 = 7;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExpiryStatus {
    Normal,
    Warning,
    Expired,
}

impl ExpiryStatus {
    pub fn needs_attention(self) -> bool {
        matches!(self, ExpiryStatus::Warning | ExpiryStatus::Expired)
    }
}

/// Drops the time of day from a wall-clock instant.
pub fn midnight(instant: OffsetDateTime) -> Date {
    instant.date()
}

/// Whole days from `today` until `expiry_date`; negative once the item is overdue.
pub fn days_until_expiry(expiry_date: Date, today: Date) -> i64 {
    (expiry_date - today).whole_days()
}

pub fn expiry_status(expiry_date: Date, today: Date) -> ExpiryStatus {
    let days = days_until_expiry(expiry_date, today);
    if days < 0 {
        ExpiryStatus::Expired
    } else if days <= WARNING_WINDOW_DAYS {
        ExpiryStatus::Warning
    } else {
        ExpiryStatus::Normal
    }
}

/// Calendar days from purchase to expiry. Not clamped: a reversed pair yields a negative span.
pub fn shelf_life_days(purchase_date: Date, expiry_date: Date) -> i64 {
    (expiry_date - purchase_date).whole_days()
}

pub fn expiry_date_from_shelf_life(
    purchase_date: Date,
    shelf_life_days: i64,
) -> Result<Date, ValidationError> {
    if shelf_life_days < 0 {
        return Err(ValidationError::NegativeShelfLife(shelf_life_days));
    }
    purchase_date
        .checked_add(Duration::days(shelf_life_days))
        .ok_or(ValidationError::DateOutOfRange)
}

/// Remaining-days count and status for one expiry date, evaluated as of `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub days_until: i64,
    pub status: ExpiryStatus,
}

impl Freshness {
    pub fn assess(expiry_date: Date, today: Date) -> Self {
        Self {
            days_until: days_until_expiry(expiry_date, today),
            status: expiry_status(expiry_date, today),
        }
    }

    pub fn describe(&self) -> String {
        match self.days_until {
            0 => "expires today".to_string(),
            days if days < 0 => format!("expired {} ago", plural_days(-days)),
            days => format!("expires in {}", plural_days(days)),
        }
    }
}

fn plural_days(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}

/// Source of "today" for status evaluation.
pub trait Clock: Send + Sync {
    fn today(&self) -> Date;
}

/// Wall clock in the local offset, falling back to UTC when the offset cannot be determined.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Date {
        midnight(OffsetDateTime::now_utc().to_offset(local_offset()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Date);

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use time::macros::{date, datetime};

    const TODAY: Date = date!(2024 - 01 - 10);

    #[test]
    fn seven_days_out_is_still_a_warning() {
        assert_eq!(days_until_expiry(date!(2024 - 01 - 17), TODAY), 7);
        assert_eq!(expiry_status(date!(2024 - 01 - 17), TODAY), ExpiryStatus::Warning);
        assert_eq!(expiry_status(date!(2024 - 01 - 18), TODAY), ExpiryStatus::Normal);
    }

    #[test]
    fn yesterday_is_expired_by_one_day() {
        let expiry = date!(2024 - 01 - 09);
        assert_eq!(days_until_expiry(expiry, TODAY), -1);
        assert_eq!(expiry_status(expiry, TODAY), ExpiryStatus::Expired);
    }

    #[test]
    fn expiring_today_is_a_warning() {
        assert_eq!(days_until_expiry(TODAY, TODAY), 0);
        assert_eq!(expiry_status(TODAY, TODAY), ExpiryStatus::Warning);
    }

    #[test]
    fn time_of_day_does_not_change_the_count() {
        let early = midnight(datetime!(2024-01-10 00:00:01 UTC));
        let late = midnight(datetime!(2024-01-10 23:59:59 UTC));
        let expiry = date!(2024 - 01 - 12);
        assert_eq!(days_until_expiry(expiry, early), days_until_expiry(expiry, late));
    }

    #[test]
    fn shelf_life_round_trips_through_expiry_date() -> anyhow::Result<()> {
        for purchase in [date!(2024 - 01 - 31), date!(2024 - 02 - 28), date!(2023 - 12 - 15)] {
            let expiry = expiry_date_from_shelf_life(purchase, 30)?;
            assert_eq!(shelf_life_days(purchase, expiry), 30);
        }
        Ok(())
    }

    #[test]
    fn shelf_life_spans_leap_day() -> anyhow::Result<()> {
        let expiry = expiry_date_from_shelf_life(date!(2024 - 02 - 28), 2)?;
        assert_eq!(expiry, date!(2024 - 03 - 01));
        Ok(())
    }

    #[test]
    fn shelf_life_may_be_negative_for_reversed_dates() {
        assert_eq!(shelf_life_days(date!(2024 - 01 - 10), date!(2024 - 01 - 05)), -5);
    }

    #[test]
    fn negative_shelf_life_is_rejected() {
        assert_matches!(
            expiry_date_from_shelf_life(TODAY, -1),
            Err(ValidationError::NegativeShelfLife(-1))
        );
    }

    #[test]
    fn freshness_descriptions() {
        assert_eq!(Freshness::assess(TODAY, TODAY).describe(), "expires today");
        assert_eq!(
            Freshness::assess(date!(2024 - 01 - 11), TODAY).describe(),
            "expires in 1 day"
        );
        assert_eq!(
            Freshness::assess(date!(2024 - 01 - 07), TODAY).describe(),
            "expired 3 days ago"
        );
    }

    #[test]
    fn status_round_trips_through_strings() -> anyhow::Result<()> {
        assert_eq!(ExpiryStatus::Warning.to_string(), "warning");
        assert_eq!("expired".parse::<ExpiryStatus>()?, ExpiryStatus::Expired);
        Ok(())
    }
}
