use chrono::{Duration as ChronoDuration, Utc};
use rastro_core::{LiveLocationStore, PositionSample};
use std::time::Duration;

fn sample(subject_id: i64, latitude: f64, longitude: f64) -> PositionSample {
    PositionSample {
        subject_id,
        display_name: None,
        latitude,
        longitude,
        accuracy: Some(5.0),
        timestamp: Some(Utc::now()),
    }
}

fn store() -> LiveLocationStore {
    LiveLocationStore::new(Duration::from_secs(120))
}

#[test]
fn snapshot_replaces_the_whole_collection() {
    let store = store();
    store.apply_snapshot(vec![sample(1, 1.0, 1.0), sample(2, 2.0, 2.0)]);
    assert_eq!(store.len(), 2);

    store.apply_snapshot(vec![sample(3, 3.0, 3.0)]);

    assert_eq!(store.len(), 1);
    assert!(store.get(1).is_none());
    assert!(store.get(2).is_none());
    assert!(store.get(3).is_some());
}

#[test]
fn update_merges_without_touching_other_subjects() {
    let store = store();
    store.apply_snapshot(vec![sample(1, 1.0, 1.0), sample(2, 2.0, 2.0)]);

    store.apply_update(sample(1, 9.0, 9.5));

    let updated = store.get(1).expect("subject 1 present");
    assert!((updated.latitude - 9.0).abs() < f64::EPSILON);
    assert!((updated.longitude - 9.5).abs() < f64::EPSILON);
    assert!(updated.online);

    let untouched = store.get(2).expect("subject 2 present");
    assert!((untouched.latitude - 2.0).abs() < f64::EPSILON);
    assert_eq!(store.len(), 2);
}

#[test]
fn update_inserts_unseen_subject_with_synthesized_name() {
    let store = store();
    store.apply_update(sample(42, 1.0, 2.0));

    let inserted = store.get(42).expect("inserted");
    assert_eq!(inserted.display_name, "Subject 42");
    assert!(inserted.online);
}

#[test]
fn update_keeps_existing_name_when_payload_has_none() {
    let store = store();
    store.apply_update(PositionSample {
        display_name: Some("Ana Flores".to_string()),
        ..sample(5, 1.0, 1.0)
    });
    store.apply_update(sample(5, 2.0, 2.0));

    assert_eq!(store.get(5).expect("present").display_name, "Ana Flores");
}

#[test]
fn staleness_sweep_is_the_only_offline_path() {
    let store = store();
    let now = Utc::now();

    store.apply_snapshot(vec![
        PositionSample {
            timestamp: Some(now - ChronoDuration::minutes(3)),
            ..sample(1, 1.0, 1.0)
        },
        PositionSample {
            timestamp: Some(now - ChronoDuration::minutes(1)),
            ..sample(2, 2.0, 2.0)
        },
    ]);

    // Snapshot entries always come up online, stale timestamps included
    assert!(store.get(1).expect("present").online);
    assert!(store.get(2).expect("present").online);

    store.sweep(now);

    assert!(!store.get(1).expect("present").online, "3 min old is stale");
    assert!(store.get(2).expect("present").online, "1 min old is fresh");
    assert_eq!(store.online_count(), 1);

    // Sweeping never deletes, only marks
    assert_eq!(store.len(), 2);
}

#[test]
fn fresh_update_brings_a_stale_subject_back_online() {
    let store = store();
    let now = Utc::now();

    store.apply_snapshot(vec![PositionSample {
        timestamp: Some(now - ChronoDuration::minutes(10)),
        ..sample(1, 1.0, 1.0)
    }]);
    store.sweep(now);
    assert!(!store.get(1).expect("present").online);

    store.apply_update(sample(1, 1.1, 1.1));
    assert!(store.get(1).expect("present").online);
}

#[test]
fn reset_clears_everything() {
    let store = store();
    store.apply_snapshot(vec![sample(1, 1.0, 1.0), sample(2, 2.0, 2.0)]);

    store.reset();

    assert!(store.is_empty());
    assert!(store.all().is_empty());
}

#[test]
fn all_returns_positions_in_stable_order() {
    let store = store();
    store.apply_update(sample(9, 1.0, 1.0));
    store.apply_update(sample(3, 2.0, 2.0));
    store.apply_update(sample(7, 3.0, 3.0));

    let ids: Vec<i64> = store.all().iter().map(|p| p.subject_id).collect();
    assert_eq!(ids, vec![3, 7, 9]);
}
