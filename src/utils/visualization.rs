//! Visualization utilities for quad_planner
//!
//! Renders marker frames and obstacle voxels into a 3-D gnuplot figure.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use nalgebra::Vector3;

use crate::common::{PlannerError, PlannerResult};
use crate::utils::markers::{Marker, MarkerKind, VisualizationFrame};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const GRAY: &str = "#808080";

    // Semantic colors
    pub const OBSTACLE: &str = GRAY;
    pub const START: &str = "#00AA00";
    pub const GOAL: &str = "#0000FF";
    pub const VEHICLE: &str = BLACK;
}

/// gnuplot uses point size in character units; markers carry metres
const POINT_SIZE_PER_METRE: f64 = 2.0;

/// Collects scene content, then draws it in one pass on `show`/`save_png`
pub struct Visualizer {
    figure: Figure,
    title: String,
    z_range: Option<(f64, f64)>,
    obstacles: Vec<Vector3<f64>>,
    markers: Vec<Marker>,
    labelled_points: Vec<(String, &'static str, Vector3<f64>)>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            figure: Figure::new(),
            title: String::new(),
            z_range: None,
            obstacles: Vec::new(),
            markers: Vec::new(),
            labelled_points: Vec::new(),
        }
    }

    /// Set the plot title
    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_z_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.z_range = Some((min, max));
        self
    }

    /// Occupied voxel centres
    pub fn plot_obstacles(&mut self, points: &[Vector3<f64>]) -> &mut Self {
        self.obstacles.extend_from_slice(points);
        self
    }

    pub fn plot_frame(&mut self, frame: &VisualizationFrame) -> &mut Self {
        self.markers.extend(frame.markers.iter().cloned());
        self
    }

    pub fn plot_start(&mut self, point: Vector3<f64>) -> &mut Self {
        self.labelled_points.push(("Start".to_string(), colors::START, point));
        self
    }

    pub fn plot_goal(&mut self, point: Vector3<f64>) -> &mut Self {
        self.labelled_points.push(("Goal".to_string(), colors::GOAL, point));
        self
    }

    pub fn plot_vehicle(&mut self, point: Vector3<f64>) -> &mut Self {
        self.labelled_points.push(("Vehicle".to_string(), colors::VEHICLE, point));
        self
    }

    /// Number of gnuplot series the scene will produce
    pub fn series_count(&self) -> usize {
        let marker_series: usize = self
            .markers
            .iter()
            .map(|m| match m.kind {
                MarkerKind::SphereList => 1,
                MarkerKind::LineList => m.points.len() / 2,
            })
            .sum();
        marker_series + self.labelled_points.len() + usize::from(!self.obstacles.is_empty())
    }

    /// Finalize and show the plot
    pub fn show(&mut self) -> PlannerResult<()> {
        self.render();
        self.figure
            .show()
            .map(|_| ())
            .map_err(|e| PlannerError::VisualizationError(e.to_string()))
    }

    /// Save plot to PNG file
    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> PlannerResult<()> {
        self.render();
        self.figure
            .save_to_png(path, width, height)
            .map_err(|e| PlannerError::VisualizationError(e.to_string()))
    }

    fn render(&mut self) {
        self.figure.clear_axes();
        let axes = self.figure.axes3d();

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label("X [m]", &[]);
        axes.set_y_label("Y [m]", &[]);
        axes.set_z_label("Z [m]", &[]);
        if let Some((min, max)) = self.z_range {
            axes.set_z_range(AutoOption::Fix(min), AutoOption::Fix(max));
        }

        if !self.obstacles.is_empty() {
            let (x, y, z) = split_xyz(self.obstacles.iter());
            axes.points(&x, &y, &z, &[
                Caption("Obstacles"),
                Color(colors::OBSTACLE),
                PointSymbol('S'),
                PointSize(0.5),
            ]);
        }

        for marker in &self.markers {
            let color = marker.color.to_hex();
            match marker.kind {
                MarkerKind::SphereList => {
                    let (x, y, z) = split_xyz(marker.points.iter());
                    axes.points(&x, &y, &z, &[
                        Caption(&marker.namespace),
                        Color(&color),
                        PointSymbol('O'),
                        PointSize(marker.scale * POINT_SIZE_PER_METRE),
                    ]);
                }
                MarkerKind::LineList => {
                    for (a, b) in marker.segments() {
                        axes.lines(&[a.x, b.x], &[a.y, b.y], &[a.z, b.z], &[
                            Color(&color),
                            LineWidth(marker.scale * 10.0),
                        ]);
                    }
                }
            }
        }

        for (caption, color, point) in &self.labelled_points {
            axes.points(&[point.x], &[point.y], &[point.z], &[
                Caption(caption),
                Color(*color),
                PointSymbol('O'),
                PointSize(1.5),
            ]);
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_xyz<'a>(points: impl Iterator<Item = &'a Vector3<f64>>) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut z = Vec::new();
    for p in points {
        x.push(p.x);
        y.push(p.y);
        z.push(p.z);
    }
    (x, y, z)
}
