// Map rendering surface
//
// Deterministic projection of a location collection into a renderable scene:
// markers, an optional route line and an optional camera move. The surface
// owns no business state; every render discards and rebuilds all markers so
// the scene can never silently diverge from the input collection.

pub mod history;
pub mod live;

pub use history::HistoryMapView;
pub use live::LiveMapView;

use serde::{Deserialize, Serialize};

/// Longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl Bounds {
    pub fn from_point(p: LngLat) -> Self {
        Self { sw: p, ne: p }
    }

    pub fn extend(&mut self, p: LngLat) {
        self.sw.lng = self.sw.lng.min(p.lng);
        self.sw.lat = self.sw.lat.min(p.lat);
        self.ne.lng = self.ne.lng.max(p.lng);
        self.ne.lat = self.ne.lat.max(p.lat);
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.sw.lng + self.ne.lng) / 2.0,
            (self.sw.lat + self.ne.lat) / 2.0,
        )
    }
}

/// Camera move requested by a render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CameraUpdate {
    /// Single marker: center on it at a fixed zoom
    CenterZoom { center: LngLat, zoom: f64 },
    /// Multiple markers: fit them all with padding
    FitBounds { bounds: Bounds, padding: f64 },
}

/// Manual viewport interactions that suppress auto-framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapInteraction {
    Drag,
    Zoom,
    Rotate,
    Tilt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: i64,
    pub position: LngLat,
    pub label: String,
    /// CSS hex color
    pub color: String,
}

/// One rendered frame of the surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapScene {
    pub markers: Vec<Marker>,
    /// Chronological connecting line (historical variant only)
    pub route: Option<Vec<LngLat>>,
    /// Camera move for this render; None when auto-framing is suppressed
    pub camera: Option<CameraUpdate>,
}

pub(crate) const SINGLE_MARKER_ZOOM: f64 = 15.0;
pub(crate) const FIT_PADDING: f64 = 50.0;

pub(crate) const ONLINE_COLOR: &str = "#2ecc71";
pub(crate) const OFFLINE_COLOR: &str = "#95a5a6";

// Time gradient endpoints: earliest sample blue, latest red
const GRADIENT_START: [u8; 3] = [0x2e, 0x86, 0xde];
const GRADIENT_END: [u8; 3] = [0xe7, 0x4c, 0x3c];

/// Frame a set of positions: one marker centers at a fixed zoom, several fit
/// their bounds with padding, none leaves the camera alone.
pub(crate) fn frame_positions(positions: &[LngLat]) -> Option<CameraUpdate> {
    match positions {
        [] => None,
        [only] => Some(CameraUpdate::CenterZoom {
            center: *only,
            zoom: SINGLE_MARKER_ZOOM,
        }),
        [first, rest @ ..] => {
            let mut bounds = Bounds::from_point(*first);
            for p in rest {
                bounds.extend(*p);
            }
            Some(CameraUpdate::FitBounds {
                bounds,
                padding: FIT_PADDING,
            })
        }
    }
}

/// Linear color interpolation along the time gradient, `t` in [0, 1].
pub fn gradient_color(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let channel = |i: usize| {
        let a = GRADIENT_START[i] as f64;
        let b = GRADIENT_END[i] as f64;
        (a + (b - a) * t).round() as u8
    };
    format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_hits_both_endpoints() {
        assert_eq!(gradient_color(0.0), "#2e86de");
        assert_eq!(gradient_color(1.0), "#e74c3c");
        // Out-of-range input clamps instead of overflowing
        assert_eq!(gradient_color(-2.0), "#2e86de");
        assert_eq!(gradient_color(5.0), "#e74c3c");
    }

    #[test]
    fn framing_distinguishes_single_from_many() {
        assert!(frame_positions(&[]).is_none());

        let single = frame_positions(&[LngLat::new(-77.0, -12.0)]).unwrap();
        assert!(matches!(single, CameraUpdate::CenterZoom { zoom, .. } if zoom == SINGLE_MARKER_ZOOM));

        let multi = frame_positions(&[
            LngLat::new(-77.0, -12.0),
            LngLat::new(-76.5, -11.5),
            LngLat::new(-77.2, -12.3),
        ])
        .unwrap();
        match multi {
            CameraUpdate::FitBounds { bounds, padding } => {
                assert_eq!(padding, FIT_PADDING);
                assert_eq!(bounds.sw, LngLat::new(-77.2, -12.3));
                assert_eq!(bounds.ne, LngLat::new(-76.5, -11.5));
            }
            other => panic!("expected bounds fit, got {:?}", other),
        }
    }
}
