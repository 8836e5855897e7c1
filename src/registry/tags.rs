//! Security-compliance image tag parsing and selection.
//!
//! Builds for the security-compliance branch are tagged
//! `sc-YYYYMMDD-<7 char id>`, e.g. `sc-20260208-abc1234`. Only the date
//! carries ordering meaning; the identifier is a short commit SHA.

use std::sync::OnceLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

fn sc_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^sc-(\d{8})-([0-9A-Za-z]{7})$").expect("sc tag pattern is valid")
    })
}

/// A tag that matched the `sc-{date}-{id}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScTag {
    pub name: String,
    pub date: NaiveDate,
    pub identifier: String,
}

impl ScTag {
    /// Parse a raw tag name. Returns `None` for any other tag shape,
    /// including impossible calendar dates such as `sc-20261399-...`.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = sc_tag_pattern().captures(name)?;
        let date = NaiveDate::parse_from_str(&caps[1], "%Y%m%d").ok()?;
        Some(Self {
            name: name.to_string(),
            date,
            identifier: caps[2].to_string(),
        })
    }

    /// Ordering key: date first, identifier breaks ties so the pick is stable.
    fn sort_key(&self) -> (NaiveDate, &str) {
        (self.date, self.identifier.as_str())
    }
}

/// Outcome of scanning one repository's tags against the recency window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelection {
    /// Newest matching tag inside the window.
    Recent(ScTag),
    /// Matching tags exist, none inside the window. Carries the newest one.
    OutsideWindow(ScTag),
    /// No tag matched the pattern.
    NoMatchingTags,
}

/// First day still counted as recent for `window_days` ending on `today`.
///
/// Windows reaching past the earliest representable date start there.
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(window_days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Pick the newest `sc-` tag and decide whether it falls inside the window
/// `[today - window_days, today]` (both ends inclusive). Tags dated after
/// `today` are not counted as recent.
pub fn select_latest<'a, I>(tags: I, window_days: u32, today: NaiveDate) -> TagSelection
where
    I: IntoIterator<Item = &'a str>,
{
    let start = window_start(today, window_days);
    let mut newest: Option<ScTag> = None;
    let mut newest_in_window: Option<ScTag> = None;

    for tag in tags.into_iter().filter_map(ScTag::parse) {
        if (start..=today).contains(&tag.date)
            && newest_in_window
                .as_ref()
                .map_or(true, |best| tag.sort_key() > best.sort_key())
        {
            newest_in_window = Some(tag.clone());
        }
        if newest
            .as_ref()
            .map_or(true, |best| tag.sort_key() > best.sort_key())
        {
            newest = Some(tag);
        }
    }

    match (newest_in_window, newest) {
        (Some(tag), _) => TagSelection::Recent(tag),
        (None, Some(tag)) => TagSelection::OutsideWindow(tag),
        (None, None) => TagSelection::NoMatchingTags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_well_formed_tags() {
        let tag = ScTag::parse("sc-20260208-abc1234").unwrap();
        assert_eq!(tag.date, day(2026, 2, 8));
        assert_eq!(tag.identifier, "abc1234");
    }

    #[test]
    fn rejects_malformed_tags() {
        for name in [
            "rel-9.9",
            "latest",
            "sc-2026020-abc1234",
            "sc-20260208-abc123",
            "sc-20260208-abc12345",
            "sc-20261301-abc1234",
            "sc-20260230-abc1234",
            "sc-20260208",
            "xsc-20260208-abc1234",
            "sc-20260208-abc1234-extra",
        ] {
            assert!(ScTag::parse(name).is_none(), "{name} should not parse");
        }
    }

    #[test]
    fn selects_latest_within_window() {
        let tags = ["sc-20260101-aaa1111", "sc-20260115-bbb2222", "rel-9.9"];
        let selection = select_latest(tags, 14, day(2026, 1, 16));
        match selection {
            TagSelection::Recent(tag) => assert_eq!(tag.name, "sc-20260115-bbb2222"),
            other => panic!("expected recent, got {other:?}"),
        }
    }

    #[test]
    fn window_edges_are_inclusive() {
        let today = day(2026, 1, 16);
        assert_eq!(window_start(today, 14), day(2026, 1, 2));

        let at_start = select_latest(["sc-20260102-aaa1111"], 14, today);
        assert!(matches!(at_start, TagSelection::Recent(_)));

        let today_tag = select_latest(["sc-20260116-aaa1111"], 14, today);
        assert!(matches!(today_tag, TagSelection::Recent(_)));

        let just_outside = select_latest(["sc-20260101-aaa1111"], 14, today);
        assert!(matches!(just_outside, TagSelection::OutsideWindow(_)));
    }

    #[test]
    fn oversized_window_reaches_back_to_the_earliest_date() {
        let today = day(2026, 1, 16);
        assert_eq!(window_start(today, u32::MAX), NaiveDate::MIN);

        let selection = select_latest(["sc-19700101-aaa1111"], u32::MAX, today);
        assert!(matches!(selection, TagSelection::Recent(_)));
    }

    #[test]
    fn future_dates_are_not_recent() {
        let selection = select_latest(["sc-20260120-aaa1111"], 14, day(2026, 1, 16));
        assert!(matches!(selection, TagSelection::OutsideWindow(_)));
    }

    #[test]
    fn stale_selection_reports_newest_seen() {
        let tags = ["sc-20250601-aaa1111", "sc-20251001-bbb2222", "sc-20250901-ccc3333"];
        match select_latest(tags, 14, day(2026, 1, 16)) {
            TagSelection::OutsideWindow(tag) => assert_eq!(tag.name, "sc-20251001-bbb2222"),
            other => panic!("expected outside window, got {other:?}"),
        }
    }

    #[test]
    fn no_matching_tags() {
        assert_eq!(
            select_latest(["v1.0.0", "latest"], 14, day(2026, 1, 16)),
            TagSelection::NoMatchingTags
        );
        assert_eq!(
            select_latest(std::iter::empty(), 14, day(2026, 1, 16)),
            TagSelection::NoMatchingTags
        );
    }

    #[test]
    fn same_date_ties_break_on_identifier() {
        let today = day(2026, 1, 16);
        let forward = select_latest(["sc-20260115-aaa1111", "sc-20260115-fff9999"], 14, today);
        let backward = select_latest(["sc-20260115-fff9999", "sc-20260115-aaa1111"], 14, today);
        assert_eq!(forward, backward);
        match forward {
            TagSelection::Recent(tag) => assert_eq!(tag.identifier, "fff9999"),
            other => panic!("expected recent, got {other:?}"),
        }
    }
}
