//! Pure derivation rules. Each automation maps its inputs through one of these.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Deserialize;

/// Which way a non-exempt date moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    Forward,
    Backward,
}

impl ShiftDirection {
    fn days(self) -> i64 {
        match self {
            ShiftDirection::Forward => 1,
            ShiftDirection::Backward => -1,
        }
    }
}

/// Copy `source` as-is when `status` is the exempt label, otherwise move it
/// one calendar day.
///
/// The arithmetic runs at noon UTC so no DST transition or local-midnight
/// rounding can land it on the wrong day.
pub fn shift_date(
    source: NaiveDate,
    status: &str,
    exempt_label: &str,
    direction: ShiftDirection,
) -> NaiveDate {
    if status.trim().eq_ignore_ascii_case(exempt_label.trim()) {
        return source;
    }
    let noon = source.and_time(chrono::NaiveTime::MIN) + Duration::hours(12);
    (noon.and_utc() + Duration::days(direction.days())).date_naive()
}

fn job_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[?&]id=(\d+)").expect("static job id pattern"))
}

/// Digits of the `id` query parameter, in any position.
pub fn extract_job_id(url: &str) -> Option<String> {
    job_id_pattern()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

const NAME_SEPARATORS: &[char] = &['-', '\u{2013}', '\u{2014}', '|', '/'];

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "dr", "prof", "sir", "dame", "lady", "lord", "rev", "fr",
];

/// First name from a display name like "Mr Jonathan Wood - Ooosh Tours".
pub fn first_name(name: &str) -> String {
    let segment = name.split(NAME_SEPARATORS).next().unwrap_or_default();
    let words: Vec<&str> = segment.split_whitespace().collect();
    let Some(first) = words.first() else {
        return String::new();
    };

    let bare = first
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    if HONORIFICS.contains(&bare.as_str()) && words.len() > 1 {
        words[1].to_string()
    } else {
        (*first).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use chrono_tz::Europe::London;
    use proptest::prelude::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn exempt_label_copies_as_is() {
        let d = ymd(2025, 3, 29);
        assert_eq!(shift_date(d, "Rehearsal", "Rehearsal", ShiftDirection::Backward), d);
        assert_eq!(shift_date(d, " rehearsal ", "Rehearsal", ShiftDirection::Forward), d);
    }

    #[test]
    fn other_labels_shift_one_day() {
        let d = ymd(2025, 3, 29);
        assert_eq!(shift_date(d, "", "Rehearsal", ShiftDirection::Backward), ymd(2025, 3, 28));
        assert_eq!(shift_date(d, "Show", "Rehearsal", ShiftDirection::Forward), ymd(2025, 3, 30));
    }

    #[test]
    fn uk_spring_forward_boundary() {
        // Clocks go forward in the UK at 01:00 on 2025-03-30.
        assert_eq!(
            shift_date(ymd(2025, 3, 30), "", "Rehearsal", ShiftDirection::Backward),
            ymd(2025, 3, 29)
        );
        assert_eq!(
            shift_date(ymd(2025, 3, 30), "", "Rehearsal", ShiftDirection::Forward),
            ymd(2025, 3, 31)
        );
        assert_eq!(
            shift_date(ymd(2025, 3, 29), "", "Rehearsal", ShiftDirection::Forward),
            ymd(2025, 3, 30)
        );
    }

    #[test]
    fn uk_fall_back_boundary() {
        // Clocks go back in the UK at 02:00 on 2025-10-26.
        assert_eq!(
            shift_date(ymd(2025, 10, 26), "", "Rehearsal", ShiftDirection::Backward),
            ymd(2025, 10, 25)
        );
        assert_eq!(
            shift_date(ymd(2025, 10, 25), "", "Rehearsal", ShiftDirection::Forward),
            ymd(2025, 10, 26)
        );
    }

    #[test]
    fn london_local_day_matches_shifted_date() {
        // Read the shifted day back as a London wall-clock date at noon: no drift.
        for day in [ymd(2025, 3, 30), ymd(2025, 10, 26)] {
            let shifted = shift_date(day, "", "Rehearsal", ShiftDirection::Forward);
            let local = London
                .with_ymd_and_hms(shifted.year(), shifted.month(), shifted.day(), 12, 0, 0)
                .single()
                .unwrap();
            assert_eq!(local.date_naive(), shifted);
            assert_eq!((shifted - day).num_days(), 1);
        }
    }

    #[test]
    fn month_and_year_rollover() {
        assert_eq!(
            shift_date(ymd(2025, 1, 1), "", "Rehearsal", ShiftDirection::Backward),
            ymd(2024, 12, 31)
        );
        assert_eq!(
            shift_date(ymd(2024, 2, 28), "", "Rehearsal", ShiftDirection::Forward),
            ymd(2024, 2, 29)
        );
    }

    proptest! {
        #[test]
        fn shift_is_exactly_one_day(days in 0i64..40_000, forward in any::<bool>()) {
            let d = ymd(1970, 1, 1) + Duration::days(days);
            let direction = if forward { ShiftDirection::Forward } else { ShiftDirection::Backward };
            let shifted = shift_date(d, "Show", "Rehearsal", direction);
            prop_assert_eq!((shifted - d).num_days(), direction.days());
            prop_assert_eq!(shift_date(d, "Rehearsal", "Rehearsal", direction), d);
        }
    }

    #[test]
    fn job_id_from_url() {
        assert_eq!(extract_job_id("https://x/job.php?id=13422"), Some("13422".into()));
        assert_eq!(
            extract_job_id("https://x/job.php?tab=crew&id=77&x=1"),
            Some("77".into())
        );
        assert_eq!(extract_job_id("https://x/job.php?other=1"), None);
        assert_eq!(extract_job_id("https://x/job.php?jobid=5"), None);
        assert_eq!(extract_job_id(""), None);
    }

    #[test]
    fn first_name_skips_honorific() {
        assert_eq!(first_name("Mr Jonathan Wood - Ooosh Tours"), "Jonathan");
        assert_eq!(first_name("Dr. Sarah Lee | Venue"), "Sarah");
        assert_eq!(first_name("MRS   Ann Smith"), "Ann");
    }

    #[test]
    fn first_name_plain() {
        assert_eq!(first_name("Acme Corp Ltd"), "Acme");
        assert_eq!(first_name("Alex / Crew"), "Alex");
        assert_eq!(first_name("Sam \u{2013} Driver"), "Sam");
    }

    #[test]
    fn first_name_honorific_alone() {
        assert_eq!(first_name("Mr"), "Mr");
        assert_eq!(first_name("Mr - Someone"), "Mr");
    }

    #[test]
    fn first_name_empty() {
        assert_eq!(first_name(""), "");
        assert_eq!(first_name("   "), "");
        assert_eq!(first_name(" - Ooosh"), "");
    }
}
