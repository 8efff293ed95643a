//! Property tests for entry identity, conflict detection and reconciliation.

use chrono::{NaiveDate, NaiveTime, Weekday};
use proptest::prelude::*;
use timetable_crawler::models::{ScheduleEntry, StoreId, intervals_overlap};
use timetable_crawler::pipeline::{
    DateSnapshot, NotificationWindow, Plan, ReconciliationEngine, reconcile,
};

fn hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn time(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

prop_compose! {
    // Quarter-hour aligned slot between 07:00 and 20:00
    fn slot_times()(start in 28u32..76, len in 1u32..16) -> (u32, u32) {
        (start * 15, (start + len).min(80) * 15)
    }
}

prop_compose! {
    fn entry()(
        day in 11u32..15,
        (start, end) in slot_times(),
        room in prop::sample::select(vec!["A101", "B202", "Salle non spécifiée"]),
        subject in prop::sample::select(vec!["Math", "Réseaux", "Algo"]),
        instructor in prop::sample::select(vec!["Dupont", "Martin"]),
        group in prop::sample::select(vec!["BACHELOR-A", "BACHELOR-B"]),
    ) -> ScheduleEntry {
        ScheduleEntry {
            id: None,
            date_of_course: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            start_time: hhmm(start),
            end_time: hhmm(end),
            room: room.to_string(),
            subject: subject.to_string(),
            instructor: instructor.to_string(),
            group: group.to_string(),
        }
    }
}

fn engine() -> ReconciliationEngine {
    let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
    ReconciliationEngine::new(NotificationWindow::current(today, Weekday::Thu))
}

proptest! {
    #[test]
    fn same_occurrence_is_reflexive(e in entry(), id in any::<i64>()) {
        prop_assert!(e.same_occurrence(&e));
        prop_assert!(e.same_occurrence(&e.clone().with_id(StoreId(id))));
    }

    #[test]
    fn same_occurrence_is_symmetric(a in entry(), b in entry()) {
        prop_assert_eq!(a.same_occurrence(&b), b.same_occurrence(&a));
    }

    #[test]
    fn same_occurrence_matches_fingerprint(a in entry(), b in entry()) {
        prop_assert_eq!(a.same_occurrence(&b), a.fingerprint() == b.fingerprint());
    }

    #[test]
    fn overlap_is_symmetric((s1, e1) in slot_times(), (s2, e2) in slot_times()) {
        let a = (time(s1), time(e1));
        let b = (time(s2), time(e2));
        prop_assert_eq!(intervals_overlap(a, b), intervals_overlap(b, a));
    }

    #[test]
    fn overlap_matches_interval_intersection((s1, e1) in slot_times(), (s2, e2) in slot_times()) {
        let expected = s1.max(s2) < e1.min(e2);
        prop_assert_eq!(intervals_overlap((time(s1), time(e1)), (time(s2), time(e2))), expected);
    }

    #[test]
    fn conflicts_never_cross_groups(a in entry(), b in entry()) {
        if a.group != b.group || a.date_of_course != b.date_of_course {
            prop_assert!(!a.conflicts_with(&b));
        }
    }

    #[test]
    fn replaying_stored_state_is_unchanged(
        stored in prop::collection::vec(entry(), 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let stored: Vec<ScheduleEntry> = stored
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.with_id(StoreId(i as i64 + 1)))
            .collect();
        let mut observed = pick.get(&stored).clone();
        observed.id = None;

        let reconciliation = reconcile(&observed, &stored);
        prop_assert!(reconciliation.exact_match_found);
        prop_assert_eq!(engine().plan(&observed, &reconciliation), Plan::Unchanged);
    }

    #[test]
    fn replacement_targets_only_conflicting_ids(
        stored in prop::collection::vec(entry(), 0..6),
        observed in entry(),
    ) {
        let stored: Vec<ScheduleEntry> = stored
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.with_id(StoreId(i as i64 + 1)))
            .collect();

        let reconciliation = reconcile(&observed, &stored);
        for id in &reconciliation.ids_to_delete {
            let target = stored.iter().find(|e| e.id == Some(*id)).unwrap();
            prop_assert!(observed.conflicts_with(target));
        }
        if let Plan::Replace { ids, .. } = engine().plan(&observed, &reconciliation) {
            prop_assert!(!reconciliation.exact_match_found);
            prop_assert_eq!(&ids, &reconciliation.ids_to_delete);
        }
    }

    #[test]
    fn stored_page_replays_unchanged_through_snapshot(
        page in prop::collection::vec(entry(), 1..8),
    ) {
        // first run against an empty store
        let mut snapshot = DateSnapshot::new(Vec::new(), &page);
        let mut stored: Vec<ScheduleEntry> = Vec::new();
        for observed in &page {
            let r = snapshot.reconcile(observed);
            prop_assert!(r.ids_to_delete.is_empty());
            if !r.exact_match_found {
                let id = StoreId(stored.len() as i64 + 1);
                snapshot.record_written(observed, id);
                stored.push(observed.clone().with_id(id));
            }
        }

        // second run sees only what the first one wrote
        let replay = DateSnapshot::new(stored, &page);
        for observed in &page {
            let r = replay.reconcile(observed);
            prop_assert_eq!(engine().plan(observed, &r), Plan::Unchanged);
        }
    }
}
