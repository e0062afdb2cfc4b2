//! Date parsing for pickup deadlines and delivery estimates.
//!
//! Resolution order: relative expressions (resolved against the message's
//! receipt time), long-form month names in French, English and Spanish,
//! numeric day/month/year, then ISO 8601. Every match is checked against the
//! plausible year window before the next one is tried; the first valid parse
//! wins.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use regex::Regex;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

const FR_MONTHS: &str = "janvier|février|fevrier|mars|avril|mai|juin|juillet|août|aout|septembre|octobre|novembre|décembre|decembre";
const EN_MONTHS: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";
const ES_MONTHS: &str =
    "enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre";

static DAY_AFTER_TOMORROW: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)après-demain|apres-demain|day after tomorrow|pasado mañana"));
static TODAY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)aujourd['’]hui|\btoday\b|\bhoy\b"));
static TOMORROW: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bdemain\b|\btomorrow\b|\bmañana\b"));
static IN_N_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:dans|in|en)\s+(\d{1,3})\s+(?:jours?|days?|días?|dias?)\b")
});

static FR_LONG: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(r"(?i)\b(\d{{1,2}})(?:er)?\s+({FR_MONTHS})(?:\s+(\d{{4}}))?"))
});
static EN_MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(
        r"(?i)\b({EN_MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?,?(?:\s+(\d{{4}}))?"
    ))
});
static EN_DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({EN_MONTHS})(?:,?\s+(\d{{4}}))?"
    ))
});
static ES_LONG: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(
        r"(?i)\b(\d{{1,2}})\s+de\s+({ES_MONTHS})(?:\s+(?:de|del)\s+(\d{{4}}))?"
    ))
});

static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| re(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b"));
static ISO: LazyLock<Regex> = LazyLock::new(|| re(r"\b(\d{4})-(\d{2})-(\d{2})"));

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "janvier" | "january" | "enero" => 1,
        "février" | "fevrier" | "february" | "febrero" => 2,
        "mars" | "march" | "marzo" => 3,
        "avril" | "april" | "abril" => 4,
        "mai" | "may" | "mayo" => 5,
        "juin" | "june" | "junio" => 6,
        "juillet" | "july" | "julio" => 7,
        "août" | "aout" | "august" | "agosto" => 8,
        "septembre" | "september" | "septiembre" => 9,
        "octobre" | "october" | "octubre" => 10,
        "novembre" | "november" | "noviembre" => 11,
        "décembre" | "decembre" | "december" | "diciembre" => 12,
        _ => return None,
    };
    Some(month)
}

/// Dates outside this window are treated as misparses.
fn in_range(date: &NaiveDate) -> bool {
    (2000..=2100).contains(&date.year())
}

/// Parse the first date found in `text`, relative to `reference`.
pub fn parse_date(text: &str, reference: DateTime<Utc>) -> Option<NaiveDate> {
    parse_relative(text, reference)
        .filter(in_range)
        .or_else(|| parse_long_form(text, reference))
        .or_else(|| parse_numeric(text))
        .or_else(|| parse_iso(text))
}

fn parse_relative(text: &str, reference: DateTime<Utc>) -> Option<NaiveDate> {
    let today = reference.date_naive();
    if DAY_AFTER_TOMORROW.is_match(text) {
        return today.checked_add_days(Days::new(2));
    }
    if TODAY.is_match(text) {
        return Some(today);
    }
    if TOMORROW.is_match(text) {
        return today.checked_add_days(Days::new(1));
    }
    let caps = IN_N_DAYS.captures(text)?;
    let days: u64 = caps[1].parse().ok()?;
    today.checked_add_days(Days::new(days))
}

fn parse_long_form(text: &str, reference: DateTime<Utc>) -> Option<NaiveDate> {
    let day_month_year = |day: &str, month: &str, year: Option<&str>| -> Option<NaiveDate> {
        let day: u32 = day.parse().ok()?;
        let month = month_number(month)?;
        match year {
            Some(y) => NaiveDate::from_ymd_opt(y.parse().ok()?, month, day),
            None => infer_year(day, month, reference),
        }
    };

    [&*FR_LONG, &*ES_LONG, &*EN_DAY_FIRST]
        .iter()
        .find_map(|pattern| {
            pattern.captures_iter(text).find_map(|caps| {
                day_month_year(&caps[1], &caps[2], caps.get(3).map(|m| m.as_str()))
                    .filter(in_range)
            })
        })
        .or_else(|| {
            EN_MONTH_FIRST.captures_iter(text).find_map(|caps| {
                day_month_year(&caps[2], &caps[1], caps.get(3).map(|m| m.as_str()))
                    .filter(in_range)
            })
        })
}

/// A yearless date is taken in the reference year, or the next one when it
/// would otherwise lie more than a month in the past.
fn infer_year(day: u32, month: u32, reference: DateTime<Utc>) -> Option<NaiveDate> {
    let today = reference.date_naive();
    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if (today - candidate).num_days() > 31 {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(candidate)
    }
}

fn parse_numeric(text: &str) -> Option<NaiveDate> {
    NUMERIC.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        NaiveDate::from_ymd_opt(year, month, day).filter(in_range)
    })
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    ISO.captures_iter(text).find_map(|caps| {
        NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )
        .filter(in_range)
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 10, 9, 0, 0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn relative_expressions() {
        assert_eq!(parse_date("livraison demain", reference()), Some(ymd(2025, 12, 11)));
        assert_eq!(parse_date("arrives today", reference()), Some(ymd(2025, 12, 10)));
        assert_eq!(parse_date("dans 3 jours", reference()), Some(ymd(2025, 12, 13)));
        assert_eq!(parse_date("après-demain", reference()), Some(ymd(2025, 12, 12)));
    }

    #[test]
    fn long_form_in_three_languages() {
        assert_eq!(
            parse_date("jusqu'au samedi 20 décembre 2025", reference()),
            Some(ymd(2025, 12, 20))
        );
        assert_eq!(parse_date("by January 15, 2026", reference()), Some(ymd(2026, 1, 15)));
        assert_eq!(parse_date("on 3rd March 2026", reference()), Some(ymd(2026, 3, 3)));
        assert_eq!(
            parse_date("antes del 15 de enero de 2026", reference()),
            Some(ymd(2026, 1, 15))
        );
    }

    #[test]
    fn yearless_dates_roll_forward() {
        assert_eq!(parse_date("jusqu'au 5 janvier", reference()), Some(ymd(2026, 1, 5)));
        assert_eq!(parse_date("le 20 décembre", reference()), Some(ymd(2025, 12, 20)));
    }

    #[test]
    fn numeric_and_iso() {
        assert_eq!(parse_date("avant le 24/12/2025", reference()), Some(ymd(2025, 12, 24)));
        assert_eq!(parse_date("le 03.01.26", reference()), Some(ymd(2026, 1, 3)));
        assert_eq!(parse_date("due 2026-02-14T10:00:00", reference()), Some(ymd(2026, 2, 14)));
    }

    #[test]
    fn out_of_range_matches_fall_through() {
        assert_eq!(
            parse_date("commande du 5 mars 1850, retrait avant le 20 décembre 2025", reference()),
            Some(ymd(2025, 12, 20))
        );
        assert_eq!(
            parse_date("ref 31/12/1999, livraison 2025-12-24", reference()),
            Some(ymd(2025, 12, 24))
        );
    }

    #[test]
    fn invalid_dates_are_skipped() {
        assert_eq!(parse_date("le 31/02/2025", reference()), None);
        assert_eq!(parse_date("nothing here", reference()), None);
    }
}
