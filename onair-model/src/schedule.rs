use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// One scheduled airing as recorded by either system.
///
/// `start < end` is expected of well-formed items; callers that cannot trust
/// their source check [`ScheduleItem::is_well_formed`] and drop the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub id: ItemId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub media_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_track_ref: Option<String>,
    /// Automation-engine handle for the queued entry. Only set on items read
    /// back from the automation engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_instance_ref: Option<String>,
    #[serde(default)]
    pub title: String,
}

impl ScheduleItem {
    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    /// Half-open overlap test against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    /// True when both records describe the same airing slot. Titles and remote
    /// references are not compared.
    pub fn same_slot(&self, other: &ScheduleItem) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.media_ref == other.media_ref
    }
}

/// Caller-selected reconciliation range, inclusive start and exclusive end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeWindow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub label: String,
}

impl EnvelopeWindow {
    pub fn new(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            window_start,
            window_end,
            label: label.into(),
        }
    }

    /// The rolling reconciliation envelope: from `now` (truncated to the
    /// minute) through the end of the current ISO week plus `weeks_ahead`
    /// further weeks. The label names the ISO week so two calls in the same
    /// week share a window identity.
    pub fn envelope(now: DateTime<Utc>, weeks_ahead: u32) -> Self {
        let start = now
            - Duration::seconds(i64::from(now.second()))
            - Duration::nanoseconds(i64::from(now.nanosecond()));
        let days_into_week = i64::from(now.weekday().num_days_from_monday());
        let this_monday = now.date_naive() - Duration::days(days_into_week);
        let end_date =
            this_monday + Duration::weeks(1 + i64::from(weeks_ahead));
        let end = end_date.and_time(NaiveTime::MIN).and_utc();
        let week = now.iso_week();
        let label = format!(
            "envelope/{}-W{:02}/+{}w",
            week.year(),
            week.week(),
            weeks_ahead
        );
        Self::new(start, end, label)
    }

    pub fn intersects(&self, item: &ScheduleItem) -> bool {
        item.overlaps(self.window_start, self.window_end)
    }
}

impl std::fmt::Display for EnvelopeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} .. {})",
            self.label,
            self.window_start.to_rfc3339(),
            self.window_end.to_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(start_min: i64, end_min: i64) -> ScheduleItem {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        ScheduleItem {
            id: ItemId(1),
            start: base + chrono::Duration::minutes(start_min),
            end: base + chrono::Duration::minutes(end_min),
            media_ref: "shows/a.mp3".into(),
            remote_track_ref: None,
            remote_instance_ref: None,
            title: "A".into(),
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let it = item(0, 30);
        assert!(it.overlaps(it.start, it.end));
        assert!(!it.overlaps(it.end, it.end + chrono::Duration::minutes(5)));
        assert!(!it.overlaps(it.start - chrono::Duration::minutes(5), it.start));
    }

    #[test]
    fn same_slot_ignores_title_and_remote_refs() {
        let a = item(0, 30);
        let mut b = a.clone();
        b.title = "renamed".into();
        b.remote_instance_ref = Some("inst-9".into());
        assert!(a.same_slot(&b));
        b.media_ref = "shows/b.mp3".into();
        assert!(!a.same_slot(&b));
    }

    #[test]
    fn envelope_runs_to_monday_after_requested_weeks() {
        // Wednesday 2026-03-04 14:37:21
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 14, 37, 21).unwrap();
        let window = EnvelopeWindow::envelope(now, 2);
        assert_eq!(
            window.window_start,
            Utc.with_ymd_and_hms(2026, 3, 4, 14, 37, 0).unwrap()
        );
        assert_eq!(
            window.window_end,
            Utc.with_ymd_and_hms(2026, 3, 23, 0, 0, 0).unwrap()
        );
        assert_eq!(window.label, "envelope/2026-W10/+2w");
    }

    #[test]
    fn envelope_label_is_stable_within_a_week() {
        let monday = Utc.with_ymd_and_hms(2026, 3, 2, 0, 5, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 3, 8, 23, 59, 0).unwrap();
        let a = EnvelopeWindow::envelope(monday, 0);
        let b = EnvelopeWindow::envelope(sunday, 0);
        assert_eq!(a.label, b.label);
        assert_eq!(a.window_end, b.window_end);
        assert_eq!(
            a.window_end,
            Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_value(item(0, 30)).unwrap();
        assert!(json.get("mediaRef").is_some());
        assert!(json.get("remoteInstanceRef").is_none());
    }
}
