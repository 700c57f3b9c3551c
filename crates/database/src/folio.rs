//! Ticket folio generation.
//!
//! A folio reads `{CODE}-{YYYYMMDD}-{NNNN}`: the category code, the creation
//! date in the business timezone, and a per-category, per-day sequence
//! starting at `0001`.
//!
//! The next sequence is derived from the greatest folio already stored for
//! the prefix. Two concurrent callers can read the same maximum; the
//! `UNIQUE` constraint on `tickets.folio` rejects the loser, which then
//! recomputes (see [`crate::ticket::create_ticket`]).

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::TicketCategory;

/// Insert attempts before giving up on a contended prefix.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Largest sequence a four-digit folio can carry.
pub const MAX_SEQUENCE: u32 = 9999;

/// Default business timezone offset, in seconds east of UTC.
pub const DEFAULT_UTC_OFFSET_SECS: i32 = -6 * 3600;

/// Computes folios for a business timezone.
#[derive(Debug, Clone, Copy)]
pub struct FolioGenerator {
    offset: FixedOffset,
    max_attempts: u32,
}

impl Default for FolioGenerator {
    fn default() -> Self {
        let offset =
            FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        Self::new(offset)
    }
}

impl FolioGenerator {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the number of insert attempts (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calendar date of `now` in the business timezone.
    pub fn business_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Folio prefix for a category and instant, e.g. `FUG-20240501-`.
    pub fn prefix(&self, category: TicketCategory, now: DateTime<Utc>) -> String {
        format!(
            "{}-{}-",
            category.code(),
            self.business_date(now).format("%Y%m%d")
        )
    }

    /// Compute the next folio for `category` from the stored maximum.
    ///
    /// Fails with [`DatabaseError::InvalidState`] once the day's sequence
    /// has reached [`MAX_SEQUENCE`].
    pub async fn next(
        &self,
        pool: &SqlitePool,
        category: TicketCategory,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let prefix = self.prefix(category, now);
        let last = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT MAX(folio)
            FROM tickets
            WHERE folio LIKE ? || '%'
            "#,
        )
        .bind(&prefix)
        .fetch_one(pool)
        .await?;

        let next = last
            .as_deref()
            .and_then(sequence_of)
            .map(|seq| seq + 1)
            .unwrap_or(1);

        if next > MAX_SEQUENCE {
            return Err(DatabaseError::InvalidState {
                entity: "Folio",
                id: prefix,
                reason: format!("daily sequence exhausted at {:04}", MAX_SEQUENCE),
            });
        }

        Ok(format!("{}{:04}", prefix, next))
    }

    /// Folio used when the store is unreachable.
    ///
    /// The sequence is the last four digits of the millisecond timestamp:
    /// the result still matches the folio format but is not gapless.
    pub fn fallback(&self, category: TicketCategory, now: DateTime<Utc>) -> String {
        let fragment = now.timestamp_millis().rem_euclid(10_000);
        format!("{}{:04}", self.prefix(category, now), fragment)
    }
}

/// Trailing four-digit sequence of a folio.
pub fn sequence_of(folio: &str) -> Option<u32> {
    let (_, seq) = folio.rsplit_once('-')?;
    if seq.len() != 4 || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

/// Whether `folio` matches `^[A-Z]{3}-\d{8}-\d{4}$`.
pub fn is_valid_folio(folio: &str) -> bool {
    let parts: Vec<&str> = folio.split('-').collect();
    match parts.as_slice() {
        [code, date, seq] => {
            code.len() == 3
                && code.bytes().all(|b| b.is_ascii_uppercase())
                && date.len() == 8
                && date.bytes().all(|b| b.is_ascii_digit())
                && seq.len() == 4
                && seq.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// Parse a UTC offset such as `-06:00`, `+0530` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
