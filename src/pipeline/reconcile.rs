//! Change detection between an observed entry and the stored entries of its date.
//!
//! [`reconcile`] is a pure scan; [`ReconciliationEngine::plan`] turns its
//! outcome into the mutations and announcement to apply:
//!
//! | exact match | conflicts | plan                                     |
//! |-------------|-----------|------------------------------------------|
//! | yes         | any       | `Unchanged`                              |
//! | no          | some      | `Replace` (delete, announce, upsert)     |
//! | no          | none      | `Insert` (announced inside the window)   |
//!
//! A page is reconciled through a [`DateSnapshot`]: the stored entries of a
//! course date are read once, and entries the page still lists are never
//! treated as conflicts of other entries on the same page.

use std::collections::HashSet;

use crate::models::{ChangeEvent, ScheduleEntry, StoreId};

use super::window::NotificationWindow;

/// Outcome of scanning the stored entries for one observed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub exact_match_found: bool,
    /// Ids of conflicting stored entries (entries without an id are skipped)
    pub ids_to_delete: Vec<StoreId>,
    pub conflicting_old_entries: Vec<ScheduleEntry>,
}

/// Compare one observed entry against every stored entry of the same date.
pub fn reconcile(observed: &ScheduleEntry, stored: &[ScheduleEntry]) -> Reconciliation {
    let mut result = Reconciliation::default();
    for entry in stored {
        if entry.same_occurrence(observed) {
            result.exact_match_found = true;
        }
        if observed.conflicts_with(entry) {
            if let Some(id) = entry.id {
                result.ids_to_delete.push(id);
            }
            result.conflicting_old_entries.push(entry.clone());
        }
    }
    result
}

/// Stored entries of one course date, reconciled against every entry a page
/// lists for that date.
#[derive(Debug, Clone, Default)]
pub struct DateSnapshot {
    stored: Vec<ScheduleEntry>,
    /// Stored ids that the page lists as-is
    listed: HashSet<StoreId>,
}

impl DateSnapshot {
    /// Snapshot `stored` for a page listing `observed`.
    pub fn new<'a>(
        stored: Vec<ScheduleEntry>,
        observed: impl IntoIterator<Item = &'a ScheduleEntry>,
    ) -> Self {
        let observed: Vec<&ScheduleEntry> = observed.into_iter().collect();
        let listed = stored
            .iter()
            .filter(|e| observed.iter().any(|o| o.same_occurrence(e)))
            .filter_map(|e| e.id)
            .collect();
        Self { stored, listed }
    }

    /// Reconcile `observed`, ignoring conflicts with entries the page lists.
    pub fn reconcile(&self, observed: &ScheduleEntry) -> Reconciliation {
        let mut result = reconcile(observed, &self.stored);
        result.ids_to_delete.retain(|id| !self.listed.contains(id));
        result
            .conflicting_old_entries
            .retain(|e| e.id.is_none_or(|id| !self.listed.contains(&id)));
        result
    }

    /// Forget entries deleted from the store.
    pub fn record_deleted(&mut self, ids: &[StoreId]) {
        self.stored.retain(|e| e.id.is_none_or(|id| !ids.contains(&id)));
    }

    /// Remember an entry of the page written to the store as `id`.
    pub fn record_written(&mut self, entry: &ScheduleEntry, id: StoreId) {
        self.listed.insert(id);
        if !self.stored.iter().any(|e| e.id == Some(id)) {
            self.stored.push(entry.clone().with_id(id));
        }
    }
}

/// Mutations to apply for one observed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Already stored as-is
    Unchanged,
    /// Delete `ids`, announce the change, then upsert the observed entry
    Replace { ids: Vec<StoreId>, event: ChangeEvent },
    /// Upsert the observed entry, announcing it when `event` is set
    Insert { event: Option<ChangeEvent> },
}

/// Decides what to do with reconciled entries.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine {
    window: NotificationWindow,
}

impl ReconciliationEngine {
    pub fn new(window: NotificationWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> NotificationWindow {
        self.window
    }

    pub fn plan(&self, observed: &ScheduleEntry, reconciliation: &Reconciliation) -> Plan {
        if reconciliation.exact_match_found {
            return Plan::Unchanged;
        }

        if !reconciliation.ids_to_delete.is_empty() {
            let previous = reconciliation
                .conflicting_old_entries
                .iter()
                .filter(|e| e.id.is_some())
                .map(|e| (e.start_time.clone(), e.end_time.clone()))
                .collect();
            return Plan::Replace {
                ids: reconciliation.ids_to_delete.clone(),
                event: ChangeEvent::Modified {
                    date: observed.date_of_course,
                    previous,
                    start: observed.start_time.clone(),
                    end: observed.end_time.clone(),
                },
            };
        }

        let event = self
            .window
            .contains(observed.date_of_course)
            .then_some(ChangeEvent::Scheduled {
                date: observed.date_of_course,
            });
        Plan::Insert { event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    fn march_12() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
    }

    fn entry(start: &str, end: &str) -> ScheduleEntry {
        ScheduleEntry {
            id: None,
            date_of_course: march_12(),
            start_time: start.into(),
            end_time: end.into(),
            room: "A101".into(),
            subject: "Math".into(),
            instructor: "Dupont".into(),
            group: "BACHELOR-A".into(),
        }
    }

    fn engine(today: NaiveDate) -> ReconciliationEngine {
        ReconciliationEngine::new(NotificationWindow::current(today, Weekday::Thu))
    }

    #[test]
    fn test_modified_time_range() {
        let stored = vec![entry("08:00", "10:00").with_id(StoreId(1))];
        let observed = entry("08:00", "11:00");

        let r = reconcile(&observed, &stored);
        assert!(!r.exact_match_found);
        assert_eq!(r.ids_to_delete, vec![StoreId(1)]);

        match engine(march_12()).plan(&observed, &r) {
            Plan::Replace { ids, event } => {
                assert_eq!(ids, vec![StoreId(1)]);
                let msg = event.to_message(0);
                assert!(
                    msg.description.contains("08:00 à 10:00 => 08:00 à 11:00"),
                    "{}",
                    msg.description
                );
            }
            other => panic!("expected Replace, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_match_is_unchanged_even_with_conflicts() {
        let stored = vec![
            entry("08:00", "10:00").with_id(StoreId(1)),
            entry("09:00", "11:00").with_id(StoreId(2)),
        ];
        let observed = entry("08:00", "10:00");

        let r = reconcile(&observed, &stored);
        assert!(r.exact_match_found);
        // conflicts are still collected, but not acted upon
        assert_eq!(r.ids_to_delete.len(), 2);
        assert_eq!(engine(march_12()).plan(&observed, &r), Plan::Unchanged);
    }

    #[test]
    fn test_other_group_is_independent() {
        let mut other = entry("08:00", "10:00").with_id(StoreId(1));
        other.group = "BACHELOR-B".into();
        let observed = entry("08:00", "10:00");

        let r = reconcile(&observed, &[other]);
        assert_eq!(r, Reconciliation::default());
    }

    #[test]
    fn test_insert_inside_window_is_announced() {
        let observed = entry("08:00", "10:00");
        let r = reconcile(&observed, &[]);
        assert_eq!(
            engine(march_12()).plan(&observed, &r),
            Plan::Insert {
                event: Some(ChangeEvent::Scheduled { date: march_12() })
            }
        );
    }

    #[test]
    fn test_insert_outside_window_is_silent() {
        let observed = entry("08:00", "10:00");
        let r = reconcile(&observed, &[]);
        let weeks_before = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        assert_eq!(
            engine(weeks_before).plan(&observed, &r),
            Plan::Insert { event: None }
        );
    }

    #[test]
    fn test_replace_lists_all_previous_ranges() {
        let stored = vec![
            entry("08:00", "09:00").with_id(StoreId(4)),
            entry("09:30", "10:30").with_id(StoreId(5)),
            entry("13:00", "14:00").with_id(StoreId(6)),
        ];
        let observed = entry("08:00", "11:00");
        let r = reconcile(&observed, &stored);
        assert_eq!(r.ids_to_delete, vec![StoreId(4), StoreId(5)]);

        let Plan::Replace { event, .. } = engine(march_12()).plan(&observed, &r) else {
            panic!("expected Replace");
        };
        assert_eq!(
            event,
            ChangeEvent::Modified {
                date: march_12(),
                previous: vec![
                    ("08:00".into(), "09:00".into()),
                    ("09:30".into(), "10:30".into())
                ],
                start: "08:00".into(),
                end: "11:00".into(),
            }
        );
    }

    #[test]
    fn test_same_time_different_room_replaces() {
        let stored = vec![entry("08:00", "10:00").with_id(StoreId(3))];
        let mut observed = entry("08:00", "10:00");
        observed.room = "B202".into();

        let r = reconcile(&observed, &stored);
        assert!(!r.exact_match_found);
        assert!(matches!(
            engine(march_12()).plan(&observed, &r),
            Plan::Replace { .. }
        ));
    }

    #[test]
    fn test_snapshot_keeps_overlapping_listed_entries() {
        let english = entry("08:00", "10:00").with_id(StoreId(1));
        let mut spanish = entry("09:00", "11:00");
        spanish.subject = "Espagnol".into();
        let stored = vec![english.clone(), spanish.clone().with_id(StoreId(2))];
        let observed = [entry("08:00", "10:00"), spanish];

        let snapshot = DateSnapshot::new(stored, &observed);
        for o in &observed {
            let r = snapshot.reconcile(o);
            assert!(r.exact_match_found);
            assert!(r.ids_to_delete.is_empty());
        }
    }

    #[test]
    fn test_snapshot_new_overlapping_entries_do_not_evict_each_other() {
        let english = entry("08:00", "10:00");
        let mut spanish = entry("09:00", "11:00");
        spanish.subject = "Espagnol".into();
        let observed = [english.clone(), spanish.clone()];

        let mut snapshot = DateSnapshot::new(Vec::new(), &observed);
        assert!(matches!(
            engine(march_12()).plan(&english, &snapshot.reconcile(&english)),
            Plan::Insert { event: Some(_) }
        ));
        snapshot.record_written(&english, StoreId(1));

        let r = snapshot.reconcile(&spanish);
        assert!(!r.exact_match_found);
        assert!(r.ids_to_delete.is_empty());
        assert!(r.conflicting_old_entries.is_empty());

        // a repeated slot matches the entry written for the first one
        assert!(snapshot.reconcile(&english).exact_match_found);
    }

    #[test]
    fn test_snapshot_still_replaces_unlisted_entries() {
        let stored = vec![entry("08:00", "10:00").with_id(StoreId(1))];
        let observed = [entry("08:00", "11:00"), entry("09:00", "12:00")];

        let mut snapshot = DateSnapshot::new(stored, &observed);
        let first = snapshot.reconcile(&observed[0]);
        assert_eq!(first.ids_to_delete, vec![StoreId(1)]);
        snapshot.record_deleted(&first.ids_to_delete);
        snapshot.record_written(&observed[0], StoreId(2));

        // the old entry is gone and the new one is listed
        let second = snapshot.reconcile(&observed[1]);
        assert!(second.ids_to_delete.is_empty());
        assert!(!second.exact_match_found);
    }
}
