//! Renderer-agnostic visualization primitives
//!
//! Frames are non-authoritative snapshots: a consumer may drop them freely.

use nalgebra::Vector3;

use crate::path_planning::min_snap::PolynomialTrajectory;

/// RGBA colour with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub const RED: Rgba = Rgba::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Rgba = Rgba::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Rgba = Rgba::new(0.0, 0.0, 1.0, 1.0);

    /// `#RRGGBB`, alpha dropped
    pub fn to_hex(&self) -> String {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", channel(self.r), channel(self.g), channel(self.b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// One sphere per point
    SphereList,
    /// One segment per consecutive pair of points
    LineList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub namespace: String,
    pub kind: MarkerKind,
    pub scale: f64,
    pub color: Rgba,
    pub points: Vec<Vector3<f64>>,
}

impl Marker {
    pub fn spheres(namespace: &str, points: &[Vector3<f64>], scale: f64, color: Rgba) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: MarkerKind::SphereList,
            scale,
            color,
            points: points.to_vec(),
        }
    }

    /// Segments joining consecutive points, stored pairwise
    pub fn polyline(namespace: &str, points: &[Vector3<f64>], scale: f64, color: Rgba) -> Self {
        let points = points.windows(2).flat_map(|w| [w[0], w[1]]).collect();
        Self {
            namespace: namespace.to_string(),
            kind: MarkerKind::LineList,
            scale,
            color,
            points,
        }
    }

    /// Endpoint pairs of a line list
    pub fn segments(&self) -> impl Iterator<Item = (&Vector3<f64>, &Vector3<f64>)> {
        self.points.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualizationFrame {
    pub markers: Vec<Marker>,
}

impl VisualizationFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    pub fn extend(&mut self, markers: impl IntoIterator<Item = Marker>) {
        self.markers.extend(markers);
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn find(&self, namespace: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.namespace == namespace)
    }
}

/// Dense search path
pub fn raw_path_markers(points: &[Vector3<f64>]) -> Vec<Marker> {
    vec![
        Marker::spheres("path_raw_points", points, 0.30, Rgba::BLUE),
        Marker::polyline("path_raw_lines", points, 0.15, Rgba::BLUE),
    ]
}

/// Critical waypoints left after simplification
pub fn critical_waypoint_markers(points: &[Vector3<f64>]) -> Vec<Marker> {
    vec![
        Marker::spheres("waypoints_points", points, 0.60, Rgba::GREEN),
        Marker::polyline("waypoints_lines", points, 0.30, Rgba::GREEN),
    ]
}

pub fn trajectory_marker(trajectory: &PolynomialTrajectory, sample_dt: f64, width: f64) -> Marker {
    Marker::spheres("trajectory", &trajectory.sample_positions(sample_dt), width, Rgba::RED)
}
