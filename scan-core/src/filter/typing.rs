use chrono::{Datelike, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use scan_model::{FilterKeyword, Relation, ValueType};

use super::lexer::RawKeyword;

/// Fixed severity substitution constants, mirroring the scanner's own severity
/// scale: logs and false positives are below the reportable range, errors sit at
/// a dedicated sentinel.
pub const SEVERITY_LOG: f64 = 0.0;
pub const SEVERITY_FALSE_POSITIVE: f64 = -99.0;
pub const SEVERITY_ERROR: f64 = -1.0;

const STRPTIME_FORMATS: &[&str] = &[
    "%Y-%m-%dt%H:%M",
    "%Y-%m-%dt%Hh%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%Hh%M",
    "%Y-%m-%d",
];

fn is_severity_column(column: &str) -> bool {
    column.eq_ignore_ascii_case("severity") || column.eq_ignore_ascii_case("new_severity")
}

fn severity_constant(value: &str) -> Option<f64> {
    if value.eq_ignore_ascii_case("Log") {
        Some(SEVERITY_LOG)
    } else if value.eq_ignore_ascii_case("False Positive") {
        Some(SEVERITY_FALSE_POSITIVE)
    } else if value.eq_ignore_ascii_case("Error") {
        Some(SEVERITY_ERROR)
    } else {
        None
    }
}

/// Parses a relative-time suffix (`-?\d+[smhdwMy]`) into seconds-since-epoch,
/// anchored at `now`. `M` and `y` use calendar-month arithmetic.
fn parse_relative_time(raw: &str, now: chrono::DateTime<Utc>) -> Option<i64> {
    let mut chars = raw.chars().peekable();
    let negative = chars.next_if_eq(&'-').is_some();
    let digits: String = chars
        .by_ref()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let suffix: Vec<char> = chars.collect();
    if suffix.len() != 1 {
        return None;
    }
    let magnitude: i64 = digits.parse().ok()?;
    let n = if negative { -magnitude } else { magnitude };

    let result = match suffix[0] {
        's' => now + Duration::seconds(n),
        'm' => now + Duration::minutes(n),
        'h' => now + Duration::hours(n),
        'd' => now + Duration::days(n),
        'w' => now + Duration::weeks(n),
        'M' => add_months(now, n),
        'y' => add_months(now, n.saturating_mul(12)),
        _ => return None,
    };
    Some(result.timestamp())
}

fn add_months(base: chrono::DateTime<Utc>, months: i64) -> chrono::DateTime<Utc> {
    let total_months = base.month0() as i64 + months;
    let year_delta = total_months.div_euclid(12);
    let month0 = total_months.rem_euclid(12) as u32;
    let year = base.year() + year_delta as i32;
    let last_day = days_in_month(year, month0 + 1);
    let day = base.day().min(last_day);
    Utc.with_ymd_and_hms(
        year,
        month0 + 1,
        day,
        base.hour(),
        base.minute(),
        base.second(),
    )
    .single()
    .unwrap_or(base)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap();
    let first_of_this = chrono::NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (first_of_next - first_of_this).num_days() as u32
}

fn parse_strptime(raw: &str) -> Option<i64> {
    for fmt in STRPTIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Utc.from_local_datetime(&naive).single().map(|dt| dt.timestamp());
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Utc.from_local_datetime(&naive).single().map(|dt| dt.timestamp());
        }
    }
    None
}

/// Assigns a type and parsed value to one lexed keyword. `now` is injected so
/// relative-time resolution stays deterministic in tests.
pub fn assign_type(raw: RawKeyword, now: chrono::DateTime<Utc>) -> FilterKeyword {
    if let Some(column) = raw.column.as_deref() {
        if is_severity_column(column) {
            if let Some(constant) = severity_constant(&raw.raw_value) {
                return FilterKeyword::double(raw.column, raw.relation, raw.raw_value, constant);
            }
        }
    }

    if !raw.quoted {
        if let Some(epoch) = parse_relative_time(&raw.raw_value, now) {
            return FilterKeyword::integer(raw.column, raw.relation, raw.raw_value, epoch);
        }
        if let Some(epoch) = parse_strptime(&raw.raw_value) {
            return FilterKeyword::integer(raw.column, raw.relation, raw.raw_value, epoch);
        }
        if let Ok(int_value) = raw.raw_value.parse::<i64>() {
            return FilterKeyword::integer(raw.column, raw.relation, raw.raw_value, int_value);
        }
        if let Ok(double_value) = raw.raw_value.parse::<f64>() {
            if double_value.is_finite() {
                return FilterKeyword::double(raw.column, raw.relation, raw.raw_value, double_value);
            }
        }
    }

    FilterKeyword::string(raw.column, raw.relation, raw.raw_value, raw.quoted)
}

/// Applies the per-column integer clamps from the component design.
pub fn clamp(keyword: &mut FilterKeyword) {
    let Some(column) = keyword.column.clone() else {
        return;
    };
    let lower = column.to_ascii_lowercase();

    match lower.as_str() {
        "first" => {
            if keyword.value_type == ValueType::Integer && keyword.int_value < 1 {
                keyword.int_value = 1;
            }
        }
        "rows" => {
            if keyword.value_type == ValueType::Integer {
                keyword.int_value = match keyword.int_value {
                    n if n >= 1 => n,
                    0 => 1,
                    -1 | -2 => keyword.int_value,
                    n if n < -2 => -1,
                    n => n,
                };
            }
        }
        "min_qod" => {
            if keyword.value_type == ValueType::Integer {
                keyword.int_value = keyword.int_value.clamp(0, 100);
            }
        }
        "apply_overrides" | "overrides" | "notes" | "result_hosts_only" => {
            if keyword.value_type == ValueType::Integer {
                keyword.int_value = if keyword.int_value != 0 { 1 } else { 0 };
            }
        }
        "delta_states" | "levels" | "sort" | "sort-reverse" => {
            keyword.relation = Relation::ColEqual;
            if keyword.value_type != ValueType::String {
                keyword.value_type = ValueType::String;
                keyword.int_value = 0;
                keyword.double_value = 0.0;
            }
        }
        _ => {}
    }
}
