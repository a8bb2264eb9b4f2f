// Live map surface: one marker per tracked subject.

use super::{
    frame_positions, LngLat, MapInteraction, MapScene, Marker, OFFLINE_COLOR, ONLINE_COLOR,
};
use crate::store::TrackedPosition;

/// Projects the live location collection onto a scene. Auto-framing stops as
/// soon as the user touches the viewport and never resumes for this surface.
pub struct LiveMapView {
    scene: MapScene,
    rendered: Vec<TrackedPosition>,
    user_interacted: bool,
}

impl LiveMapView {
    pub fn new() -> Self {
        Self {
            scene: MapScene::default(),
            rendered: Vec::new(),
            user_interacted: false,
        }
    }

    /// Rebuild the whole scene from the current collection. Idempotent
    /// replace: prior markers are discarded, never diffed.
    pub fn render(&mut self, positions: &[TrackedPosition]) -> &MapScene {
        let markers = positions
            .iter()
            .map(|p| Marker {
                id: p.subject_id,
                position: LngLat::new(p.longitude, p.latitude),
                label: p.display_name.clone(),
                color: if p.online { ONLINE_COLOR } else { OFFLINE_COLOR }.to_string(),
            })
            .collect();

        let camera = if self.user_interacted {
            None
        } else {
            let points: Vec<LngLat> = positions
                .iter()
                .map(|p| LngLat::new(p.longitude, p.latitude))
                .collect();
            frame_positions(&points)
        };

        self.rendered = positions.to_vec();
        self.scene = MapScene {
            markers,
            route: None,
            camera,
        };
        &self.scene
    }

    /// Record a manual viewport interaction; the user's viewport wins from
    /// here on.
    pub fn notify_interaction(&mut self, _interaction: MapInteraction) {
        self.user_interacted = true;
    }

    /// Resolve a clicked marker back to its TrackedPosition. Read-only.
    pub fn select(&self, marker_id: i64) -> Option<&TrackedPosition> {
        self.rendered.iter().find(|p| p.subject_id == marker_id)
    }

    pub fn scene(&self) -> &MapScene {
        &self.scene
    }
}

impl Default for LiveMapView {
    fn default() -> Self {
        Self::new()
    }
}
