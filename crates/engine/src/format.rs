//! Display helpers shared by anything that renders pools, matches and wallets.
//! All times are rendered in UTC.

use chrono::{DateTime, Utc};
use common::types::{Match, MatchStatus};
use rust_decimal::{Decimal, RoundingStrategy};

/// US dollar amount with thousands separators and two decimals: `$1,234.50`, `-$10.00`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let fixed = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{frac_part}")
}

/// `Tue, 25 Feb 2025`, or `Tue, 25 Feb 2025, 15:00` with `show_time`.
pub fn format_date(at: DateTime<Utc>, show_time: bool) -> String {
    if show_time {
        at.format("%a, %-d %b %Y, %H:%M").to_string()
    } else {
        at.format("%a, %-d %b %Y").to_string()
    }
}

/// Kickoff time on a 12-hour clock: `03:00 PM`.
pub fn format_match_time(at: DateTime<Utc>) -> String {
    at.format("%I:%M %p").to_string()
}

/// Short kickoff date: `Tue, Feb 25`.
pub fn format_match_date(at: DateTime<Utc>) -> String {
    at.format("%a, %b %-d").to_string()
}

pub fn match_status_label(m: &Match) -> String {
    match m.status {
        MatchStatus::Live => "LIVE".to_string(),
        MatchStatus::Finished => "FINAL".to_string(),
        MatchStatus::Upcoming => format_match_time(m.match_time),
    }
}
