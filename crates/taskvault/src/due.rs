//! Parsing of `--due` values given on the command line.

use anyhow::{Result, anyhow, bail};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time};

/// Parse a due date relative to `now`.
///
/// Accepted forms: `today`, `tomorrow`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`,
/// `YYYY-MM-DD HH:MM:SS`, `MM/DD/YYYY`, `MM/DD/YYYY HH:MM`, offsets such as
/// `3d`, `2h`, `45m`, and a bare number of days. Absolute dates are UTC.
pub fn parse_due(input: &str, now: OffsetDateTime) -> Result<OffsetDateTime> {
    let raw = input.trim();
    match raw.to_ascii_lowercase().as_str() {
        "today" => return Ok(now.replace_time(Time::MIDNIGHT)),
        "tomorrow" => {
            if let Some(next) = now.checked_add(Duration::DAY) {
                return Ok(next.replace_time(Time::MIDNIGHT));
            }
            bail!("due date {raw:?} is out of range");
        }
        _ => {}
    }

    let date_time_formats: [&[BorrowedFormatItem<'_>]; 3] = [
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[month]/[day]/[year] [hour]:[minute]"),
    ];
    for format in date_time_formats {
        if let Ok(parsed) = PrimitiveDateTime::parse(raw, format) {
            return Ok(parsed.assume_utc());
        }
    }
    let date_formats: [&[BorrowedFormatItem<'_>]; 2] = [
        format_description!("[year]-[month]-[day]"),
        format_description!("[month]/[day]/[year]"),
    ];
    for format in date_formats {
        if let Ok(parsed) = Date::parse(raw, format) {
            return Ok(parsed.midnight().assume_utc());
        }
    }

    if let Some(offset) = parse_offset(raw) {
        return now
            .checked_add(offset)
            .ok_or_else(|| anyhow!("due date {raw:?} is out of range"));
    }
    bail!("unrecognized due date {raw:?}; try YYYY-MM-DD, \"tomorrow\" or \"3d\"")
}

/// Relative offset; `None` when the text is not an offset or overflows.
fn parse_offset(raw: &str) -> Option<Duration> {
    if let Ok(days) = raw.parse::<i64>() {
        return Duration::DAY.checked_mul(i32::try_from(days).ok()?);
    }
    let unit = raw.chars().last()?;
    let amount: i64 = raw[..raw.len() - unit.len_utf8()].parse().ok()?;
    let amount = i32::try_from(amount).ok()?;
    match unit {
        'd' => Duration::DAY.checked_mul(amount),
        'h' => Duration::HOUR.checked_mul(amount),
        'm' => Duration::MINUTE.checked_mul(amount),
        _ => None,
    }
}
