//! Snapshot diffing: turns a `previous -> current` transition into the
//! ordered list of change events a follow should be notified about.
//!
//! Rules per follow target, evaluated in this order:
//!
//! - **movie**: `release_date` set/changed, then status milestone.
//! - **tv_season**: `season_air_date` set/changed, then binge-ready.
//! - **tv_full**: run concluded, then `next_air_date` set/changed.
//!
//! Every rule is gated by its preference flag. `date_set` and
//! `date_changed` are additionally suppressed as a group when
//! `notify_date_changes` is off.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::media::FollowTarget;
use crate::preferences::FollowPreferences;
use crate::snapshot::DerivedFields;

/// Payload `field` tag for next-episode date events on full series.
pub const FIELD_NEXT_AIR_DATE: &str = "next_air_date";

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Kind of change event stored in `change_events.event_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DateSet,
    DateChanged,
    StatusMilestone,
    SeasonBingeReady,
    FullRunConcluded,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::DateSet => "date_set",
            EventType::DateChanged => "date_changed",
            EventType::StatusMilestone => "status_milestone",
            EventType::SeasonBingeReady => "season_binge_ready",
            EventType::FullRunConcluded => "full_run_concluded",
        }
    }

    /// Events gated by the follow's `notify_date_changes` flag.
    pub fn is_date_category(self) -> bool {
        matches!(self, EventType::DateSet | EventType::DateChanged)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date_set" => Ok(EventType::DateSet),
            "date_changed" => Ok(EventType::DateChanged),
            "status_milestone" => Ok(EventType::StatusMilestone),
            "season_binge_ready" => Ok(EventType::SeasonBingeReady),
            "full_run_concluded" => Ok(EventType::FullRunConcluded),
            other => Err(CoreError::Validation(format!("unknown event type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One preference-gated transition, ready to be logged.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedChange {
    pub event_type: EventType,
    pub payload: Value,
}

/// Diff two extracted snapshots of the same entity.
///
/// `today` is used for the binge-ready comparison and must be read once
/// per refresh by the caller.
pub fn detect_changes(
    target: FollowTarget,
    previous: &DerivedFields,
    current: &DerivedFields,
    prefs: &FollowPreferences,
    today: NaiveDate,
) -> Vec<DetectedChange> {
    let mut out = Emitter::new(prefs);

    match target {
        FollowTarget::Movie => {
            out.date_rule(previous.release_date, current.release_date, None);

            if prefs.notify_status_milestones {
                if let Some(to) = current.status.as_deref() {
                    if previous.status.as_deref() != Some(to) {
                        out.emit(
                            EventType::StatusMilestone,
                            json!({"from": previous.status, "to": to}),
                        );
                    }
                }
            }
        }
        FollowTarget::TvSeason(_) => {
            out.date_rule(previous.season_air_date, current.season_air_date, None);

            let was_ready = previous.is_binge_ready(today);
            let is_ready = current.is_binge_ready(today);
            if is_ready && !was_ready && prefs.notify_season_binge_ready {
                if let Some(last) = current.season_last_episode_date {
                    out.emit(
                        EventType::SeasonBingeReady,
                        json!({"last_episode_air_date": last.to_string()}),
                    );
                }
            }
        }
        FollowTarget::TvFull => {
            if current.is_concluded() && !previous.is_concluded() && prefs.notify_full_run_concluded
            {
                out.emit(
                    EventType::FullRunConcluded,
                    json!({"from": previous.status, "to": current.status}),
                );
            }

            out.date_rule(
                previous.next_air_date,
                current.next_air_date,
                Some(FIELD_NEXT_AIR_DATE),
            );
        }
    }

    out.changes
}

/// Collects changes while applying the date-category gate.
struct Emitter<'a> {
    prefs: &'a FollowPreferences,
    changes: Vec<DetectedChange>,
}

impl<'a> Emitter<'a> {
    fn new(prefs: &'a FollowPreferences) -> Self {
        Self {
            prefs,
            changes: Vec::new(),
        }
    }

    fn emit(&mut self, event_type: EventType, payload: Value) {
        if event_type.is_date_category() && !self.prefs.notify_date_changes {
            return;
        }
        self.changes.push(DetectedChange {
            event_type,
            payload,
        });
    }

    /// `None -> Some` is a `date_set`; `Some(a) -> Some(b)` with `a != b`
    /// is a `date_changed`. A date disappearing emits nothing.
    fn date_rule(
        &mut self,
        previous: Option<NaiveDate>,
        current: Option<NaiveDate>,
        field: Option<&str>,
    ) {
        let (event_type, mut payload) = match (previous, current) {
            (None, Some(to)) => (
                EventType::DateSet,
                json!({"from": Value::Null, "to": to.to_string()}),
            ),
            (Some(from), Some(to)) if from != to => (
                EventType::DateChanged,
                json!({"from": from.to_string(), "to": to.to_string()}),
            ),
            _ => return,
        };

        if let (Some(field), Some(map)) = (field, payload.as_object_mut()) {
            map.insert("field".to_string(), Value::from(field));
        }
        self.emit(event_type, payload);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        date("2026-06-01")
    }

    fn types(changes: &[DetectedChange]) -> Vec<EventType> {
        changes.iter().map(|c| c.event_type).collect()
    }

    #[test]
    fn movie_release_date_set() {
        let previous = DerivedFields::default();
        let current = DerivedFields {
            release_date: Some(date("2030-01-01")),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::Movie,
            &previous,
            &current,
            &FollowPreferences::default(),
            today(),
        );
        assert_eq!(types(&changes), vec![EventType::DateSet]);
        assert_eq!(changes[0].payload, json!({"from": null, "to": "2030-01-01"}));
    }

    #[test]
    fn movie_release_date_changed_then_status_milestone() {
        let previous = DerivedFields {
            status: Some("Post Production".into()),
            release_date: Some(date("2030-01-01")),
            ..DerivedFields::default()
        };
        let current = DerivedFields {
            status: Some("Released".into()),
            release_date: Some(date("2030-02-01")),
            ..DerivedFields::default()
        };
        let prefs = FollowPreferences {
            notify_status_milestones: true,
            ..FollowPreferences::default()
        };
        let changes = detect_changes(FollowTarget::Movie, &previous, &current, &prefs, today());
        assert_eq!(
            types(&changes),
            vec![EventType::DateChanged, EventType::StatusMilestone]
        );
        assert_eq!(
            changes[0].payload,
            json!({"from": "2030-01-01", "to": "2030-02-01"})
        );
        assert_eq!(
            changes[1].payload,
            json!({"from": "Post Production", "to": "Released"})
        );
    }

    #[test]
    fn removed_date_emits_nothing() {
        let previous = DerivedFields {
            release_date: Some(date("2030-01-01")),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::Movie,
            &previous,
            &DerivedFields::default(),
            &FollowPreferences::default(),
            today(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn status_cleared_is_not_a_milestone() {
        let previous = DerivedFields {
            status: Some("Planned".into()),
            ..DerivedFields::default()
        };
        let prefs = FollowPreferences {
            notify_status_milestones: true,
            ..FollowPreferences::default()
        };
        let changes = detect_changes(
            FollowTarget::Movie,
            &previous,
            &DerivedFields::default(),
            &prefs,
            today(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn date_events_suppressed_when_date_changes_off() {
        let current = DerivedFields {
            release_date: Some(date("2030-01-01")),
            status: Some("Planned".into()),
            ..DerivedFields::default()
        };
        let prefs = FollowPreferences {
            notify_date_changes: false,
            notify_status_milestones: true,
            ..FollowPreferences::default()
        };
        let changes = detect_changes(
            FollowTarget::Movie,
            &DerivedFields::default(),
            &current,
            &prefs,
            today(),
        );
        assert_eq!(types(&changes), vec![EventType::StatusMilestone]);
    }

    #[test]
    fn season_becomes_binge_ready() {
        let previous = DerivedFields {
            season_air_date: Some(date("2026-05-01")),
            season_last_episode_date: Some(date("2026-06-15")),
            ..DerivedFields::default()
        };
        let current = DerivedFields {
            season_air_date: Some(date("2026-05-01")),
            season_last_episode_date: Some(date("2026-05-29")),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::TvSeason(2),
            &previous,
            &current,
            &FollowPreferences::default(),
            today(),
        );
        assert_eq!(types(&changes), vec![EventType::SeasonBingeReady]);
        assert_eq!(
            changes[0].payload,
            json!({"last_episode_air_date": "2026-05-29"})
        );
    }

    #[test]
    fn binge_ready_is_not_re_emitted() {
        let ready = DerivedFields {
            season_last_episode_date: Some(date("2026-05-29")),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::TvSeason(2),
            &ready,
            &ready.clone(),
            &FollowPreferences::default(),
            today(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn binge_ready_respects_preference() {
        let current = DerivedFields {
            season_last_episode_date: Some(date("2026-05-29")),
            ..DerivedFields::default()
        };
        let prefs = FollowPreferences {
            notify_season_binge_ready: false,
            ..FollowPreferences::default()
        };
        let changes = detect_changes(
            FollowTarget::TvSeason(1),
            &DerivedFields::default(),
            &current,
            &prefs,
            today(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn full_run_concluded() {
        let previous = DerivedFields {
            status: Some("Returning Series".into()),
            ..DerivedFields::default()
        };
        let current = DerivedFields {
            status: Some("Ended".into()),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::TvFull,
            &previous,
            &current,
            &FollowPreferences::default(),
            today(),
        );
        assert_eq!(types(&changes), vec![EventType::FullRunConcluded]);
        assert_eq!(
            changes[0].payload,
            json!({"from": "Returning Series", "to": "Ended"})
        );
    }

    #[test]
    fn ended_to_canceled_is_not_a_new_conclusion() {
        let previous = DerivedFields {
            status: Some("Ended".into()),
            ..DerivedFields::default()
        };
        let current = DerivedFields {
            status: Some("Canceled".into()),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::TvFull,
            &previous,
            &current,
            &FollowPreferences::default(),
            today(),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn next_air_date_events_carry_field_tag() {
        let previous = DerivedFields {
            status: Some("Returning Series".into()),
            next_air_date: Some(date("2026-07-01")),
            ..DerivedFields::default()
        };
        let current = DerivedFields {
            status: Some("Returning Series".into()),
            next_air_date: Some(date("2026-07-08")),
            ..DerivedFields::default()
        };
        let changes = detect_changes(
            FollowTarget::TvFull,
            &previous,
            &current,
            &FollowPreferences::default(),
            today(),
        );
        assert_eq!(types(&changes), vec![EventType::DateChanged]);
        assert_eq!(
            changes[0].payload,
            json!({"from": "2026-07-01", "to": "2026-07-08", "field": "next_air_date"})
        );
    }

    #[test]
    fn event_type_names_round_trip() {
        for event_type in [
            EventType::DateSet,
            EventType::DateChanged,
            EventType::StatusMilestone,
            EventType::SeasonBingeReady,
            EventType::FullRunConcluded,
        ] {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }
}
