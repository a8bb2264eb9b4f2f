use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rastro_core::map::{CameraUpdate, HistoryMapView, LiveMapView, MapInteraction};
use rastro_core::{HistoryPoint, TrackedPosition};

fn position(subject_id: i64, lat: f64, lng: f64, online: bool) -> TrackedPosition {
    let now = Utc::now();
    TrackedPosition {
        subject_id,
        display_name: format!("Subject {}", subject_id),
        latitude: lat,
        longitude: lng,
        accuracy: None,
        sample_timestamp: now,
        last_update: now,
        online,
    }
}

fn history_point(minute: i64, lat: f64, lng: f64) -> HistoryPoint {
    let base = Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap();
    HistoryPoint {
        subject_id: 1,
        display_name: None,
        latitude: lat,
        longitude: lng,
        accuracy: None,
        sample_timestamp: base + ChronoDuration::minutes(minute),
    }
}

#[test]
fn live_render_builds_one_marker_per_subject() {
    let mut view = LiveMapView::new();
    let scene = view.render(&[
        position(1, -12.05, -77.04, true),
        position(2, -12.10, -77.00, false),
    ]);

    assert_eq!(scene.markers.len(), 2);
    assert!(scene.route.is_none());
    assert_ne!(scene.markers[0].color, scene.markers[1].color);
    assert!(scene.camera.is_some(), "first non-empty render frames");
}

#[test]
fn live_render_is_an_idempotent_replace() {
    let mut view = LiveMapView::new();
    let positions = vec![position(1, -12.0, -77.0, true)];

    let first = view.render(&positions).clone();
    let second = view.render(&positions).clone();

    assert_eq!(first.markers, second.markers);

    // A shrunk collection leaves no ghost markers behind
    let scene = view.render(&[]);
    assert!(scene.markers.is_empty());
}

#[test]
fn user_interaction_suppresses_auto_framing() {
    let mut view = LiveMapView::new();
    view.render(&[position(1, -12.0, -77.0, true)]);

    view.notify_interaction(MapInteraction::Drag);

    let scene = view.render(&[
        position(1, -12.0, -77.0, true),
        position(2, -13.0, -76.0, true),
    ]);
    assert!(scene.camera.is_none(), "user viewport must not be overridden");
    // Markers still track the collection
    assert_eq!(scene.markers.len(), 2);
}

#[test]
fn single_marker_centers_and_many_fit_bounds() {
    let mut view = LiveMapView::new();

    let scene = view.render(&[position(1, -12.0, -77.0, true)]);
    assert!(matches!(
        scene.camera,
        Some(CameraUpdate::CenterZoom { .. })
    ));

    let scene = view.render(&[
        position(1, -12.0, -77.0, true),
        position(2, -11.0, -76.0, true),
    ]);
    assert!(matches!(
        scene.camera,
        Some(CameraUpdate::FitBounds { .. })
    ));

    let scene = view.render(&[]);
    assert!(scene.camera.is_none(), "empty collection frames nothing");
}

#[test]
fn live_selection_resolves_the_underlying_position() {
    let mut view = LiveMapView::new();
    view.render(&[
        position(1, -12.05, -77.04, true),
        position(2, -12.10, -77.00, true),
    ]);

    let selected = view.select(2).expect("marker 2 exists");
    assert_eq!(selected.subject_id, 2);
    assert!(view.select(99).is_none());
}

#[test]
fn history_markers_are_numbered_chronologically() {
    let mut view = HistoryMapView::new();
    let points = vec![
        history_point(0, -12.00, -77.00),
        history_point(5, -12.01, -77.01),
        history_point(10, -12.02, -77.02),
    ];

    let scene = view.render(&points);

    let labels: Vec<&str> = scene.markers.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["1", "2", "3"]);
    assert_eq!(
        scene.route.as_ref().map(|r| r.len()),
        Some(3),
        "route connects every point in order"
    );
}

#[test]
fn history_gradient_runs_from_earliest_to_latest() {
    let mut view = HistoryMapView::new();
    let points = vec![
        history_point(0, -12.00, -77.00),
        history_point(5, -12.01, -77.01),
        history_point(10, -12.02, -77.02),
    ];

    let scene = view.render(&points);

    assert_eq!(scene.markers.first().expect("first").color, "#2e86de");
    assert_eq!(scene.markers.last().expect("last").color, "#e74c3c");
    // Midpoint sits strictly between the endpoints
    let mid = &scene.markers[1].color;
    assert_ne!(mid, "#2e86de");
    assert_ne!(mid, "#e74c3c");
}

#[test]
fn history_single_point_has_no_route_and_centers() {
    let mut view = HistoryMapView::new();
    let scene = view.render(&[history_point(0, -12.0, -77.0)]);

    assert_eq!(scene.markers.len(), 1);
    assert!(scene.route.is_none());
    assert!(matches!(
        scene.camera,
        Some(CameraUpdate::CenterZoom { .. })
    ));
    // Identical timestamps collapse the gradient to its start
    assert_eq!(scene.markers[0].color, "#2e86de");
}

#[test]
fn history_selection_is_one_based() {
    let mut view = HistoryMapView::new();
    let points = vec![history_point(0, -12.0, -77.0), history_point(1, -12.1, -77.1)];
    view.render(&points);

    assert_eq!(
        view.select(2).expect("second marker").sample_timestamp,
        points[1].sample_timestamp
    );
    assert!(view.select(0).is_none());
    assert!(view.select(3).is_none());
}

#[test]
fn history_interaction_suppresses_framing_too() {
    let mut view = HistoryMapView::new();
    view.render(&[history_point(0, -12.0, -77.0)]);
    view.notify_interaction(MapInteraction::Zoom);

    let scene = view.render(&[
        history_point(0, -12.0, -77.0),
        history_point(1, -12.1, -77.1),
    ]);
    assert!(scene.camera.is_none());
}
