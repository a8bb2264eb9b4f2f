// Historical map surface: numbered markers along a time-colored route.

use super::{frame_positions, gradient_color, LngLat, MapInteraction, MapScene, Marker};
use crate::history::HistoryPoint;

/// Projects a history query result onto a scene: markers numbered 1..N in
/// chronological order, a connecting route line, and marker colors placed on
/// a linear time gradient between the earliest and latest sample.
pub struct HistoryMapView {
    scene: MapScene,
    rendered: Vec<HistoryPoint>,
    user_interacted: bool,
}

impl HistoryMapView {
    pub fn new() -> Self {
        Self {
            scene: MapScene::default(),
            rendered: Vec::new(),
            user_interacted: false,
        }
    }

    /// Rebuild the scene from a result set (expected ascending by timestamp,
    /// as the history client produces it).
    pub fn render(&mut self, points: &[HistoryPoint]) -> &MapScene {
        let (min_ts, max_ts) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (
                first.sample_timestamp.timestamp_millis(),
                last.sample_timestamp.timestamp_millis(),
            ),
            _ => (0, 0),
        };
        let span = (max_ts - min_ts).max(0) as f64;

        let markers = points
            .iter()
            .enumerate()
            .map(|(index, p)| {
                let t = if span > 0.0 {
                    (p.sample_timestamp.timestamp_millis() - min_ts) as f64 / span
                } else {
                    0.0
                };
                Marker {
                    id: index as i64 + 1,
                    position: LngLat::new(p.longitude, p.latitude),
                    label: format!("{}", index + 1),
                    color: gradient_color(t),
                }
            })
            .collect();

        let route = if points.len() >= 2 {
            Some(
                points
                    .iter()
                    .map(|p| LngLat::new(p.longitude, p.latitude))
                    .collect(),
            )
        } else {
            None
        };

        let camera = if self.user_interacted {
            None
        } else {
            let positions: Vec<LngLat> = points
                .iter()
                .map(|p| LngLat::new(p.longitude, p.latitude))
                .collect();
            frame_positions(&positions)
        };

        self.rendered = points.to_vec();
        self.scene = MapScene {
            markers,
            route,
            camera,
        };
        &self.scene
    }

    pub fn notify_interaction(&mut self, _interaction: MapInteraction) {
        self.user_interacted = true;
    }

    /// Resolve a clicked marker (numbered from 1) back to its HistoryPoint.
    pub fn select(&self, marker_id: i64) -> Option<&HistoryPoint> {
        if marker_id < 1 {
            return None;
        }
        self.rendered.get(marker_id as usize - 1)
    }

    pub fn scene(&self) -> &MapScene {
        &self.scene
    }
}

impl Default for HistoryMapView {
    fn default() -> Self {
        Self::new()
    }
}
