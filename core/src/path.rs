//! Road/river style paths: a centre polyline with per-point widths,
//! Catmull-Rom resampling, derived edges, nearest-point queries and
//! arc-length walking.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serializable description of a path inside a landscape document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    pub name: String,
    pub points: Vec<[f64; 3]>,
    pub widths: Vec<f64>,
    /// World distance between resampled points; 0 keeps the control points.
    #[serde(default)]
    pub resolution: f64,
    #[serde(default)]
    pub snap_to_terrain: bool,
}

/// Closest point on a path to a query position (distances in the XZ plane).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    pub distance: f64,
    pub width: f64,
    /// Arc-length parameter in [0,1].
    pub t: f64,
    pub height: f64,
    pub position: DVec3,
}

/// A point produced by walking a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub position: DVec3,
    /// Unit direction of travel in the XZ plane.
    pub direction: DVec2,
    pub width: f64,
    pub t: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    name: String,
    centers: Vec<DVec3>,
    widths: Vec<f64>,
    left: Vec<DVec3>,
    right: Vec<DVec3>,
    // cumulative XZ arc length at each center
    cumulative: Vec<f64>,
    snap_to_terrain: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PathBuilder {
    name: String,
    points: Vec<DVec3>,
    widths: Vec<f64>,
    resolution: f64,
    snap_to_terrain: bool,
}

impl PathBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn point(mut self, position: DVec3, width: f64) -> Self {
        self.points.push(position);
        self.widths.push(width);
        self
    }

    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn snap_to_terrain(mut self, snap: bool) -> Self {
        self.snap_to_terrain = snap;
        self
    }

    pub fn build(self) -> Result<Path> {
        Path::new(
            self.name,
            self.points,
            self.widths,
            self.resolution,
            self.snap_to_terrain,
        )
    }
}

fn xz(p: DVec3) -> DVec2 {
    DVec2::new(p.x, p.z)
}

fn catmull_rom(p0: DVec3, p1: DVec3, p2: DVec3, p3: DVec3, t: f64) -> DVec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

impl Path {
    pub fn builder(name: impl Into<String>) -> PathBuilder {
        PathBuilder::new(name)
    }

    pub fn from_config(config: &PathConfig) -> Result<Self> {
        Self::new(
            config.name.clone(),
            config.points.iter().map(|p| DVec3::from_array(*p)).collect(),
            config.widths.clone(),
            config.resolution,
            config.snap_to_terrain,
        )
    }

    fn new(
        name: String,
        points: Vec<DVec3>,
        widths: Vec<f64>,
        resolution: f64,
        snap_to_terrain: bool,
    ) -> Result<Self> {
        let context = format!("path '{name}'");
        if points.len() != widths.len() {
            return Err(Error::config(
                &context,
                format!(
                    "{} positions but {} widths",
                    points.len(),
                    widths.len()
                ),
            ));
        }
        if widths.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::config(&context, "widths must be finite and non-negative"));
        }
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(Error::config(&context, "resolution must be non-negative"));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(Error::geometry(&context, "positions must be finite"));
        }
        if points.len() < 2 {
            return Err(Error::geometry(&context, "a path needs at least two points"));
        }
        let length: f64 = points
            .windows(2)
            .map(|w| xz(w[0]).distance(xz(w[1])))
            .sum();
        if length <= 0.0 {
            return Err(Error::geometry(&context, "path has zero length"));
        }

        let (centers, widths) = if resolution > 0.0 {
            Self::resample(&points, &widths, resolution)
        } else {
            (points, widths)
        };

        let mut path = Self {
            name,
            centers,
            widths,
            left: Vec::new(),
            right: Vec::new(),
            cumulative: Vec::new(),
            snap_to_terrain,
        };
        path.rebuild();
        Ok(path)
    }

    // Catmull-Rom through the control points, endpoints duplicated
    fn resample(points: &[DVec3], widths: &[f64], resolution: f64) -> (Vec<DVec3>, Vec<f64>) {
        let n = points.len();
        let mut out_points = Vec::new();
        let mut out_widths = Vec::new();
        for i in 0..n - 1 {
            let p0 = points[i.saturating_sub(1)];
            let p1 = points[i];
            let p2 = points[i + 1];
            let p3 = points[(i + 2).min(n - 1)];
            let seg_len = xz(p1).distance(xz(p2));
            let steps = ((seg_len / resolution).ceil() as usize).max(1);
            for s in 0..steps {
                let t = s as f64 / steps as f64;
                out_points.push(catmull_rom(p0, p1, p2, p3, t));
                out_widths.push(widths[i] + (widths[i + 1] - widths[i]) * t);
            }
        }
        out_points.push(points[n - 1]);
        out_widths.push(widths[n - 1]);
        (out_points, out_widths)
    }

    // Recompute edges and arc lengths after centers change
    fn rebuild(&mut self) {
        let n = self.centers.len();
        self.left.clear();
        self.right.clear();
        self.cumulative.clear();
        let mut acc = 0.0;
        for i in 0..n {
            if i > 0 {
                acc += xz(self.centers[i - 1]).distance(xz(self.centers[i]));
            }
            self.cumulative.push(acc);

            let dir = self.direction_at(i);
            let perp = DVec2::new(-dir.y, dir.x);
            let half = self.widths[i] * 0.5;
            let c = self.centers[i];
            self.left
                .push(DVec3::new(c.x + perp.x * half, c.y, c.z + perp.y * half));
            self.right
                .push(DVec3::new(c.x - perp.x * half, c.y, c.z - perp.y * half));
        }
    }

    // Central-difference tangent in XZ; zero-length neighbours fall back
    // to whichever side has extent
    fn direction_at(&self, i: usize) -> DVec2 {
        let n = self.centers.len();
        let prev = xz(self.centers[i.saturating_sub(1)]);
        let next = xz(self.centers[(i + 1).min(n - 1)]);
        let d = (next - prev).normalize_or_zero();
        if d != DVec2::ZERO {
            return d;
        }
        self.centers
            .windows(2)
            .map(|w| (xz(w[1]) - xz(w[0])).normalize_or_zero())
            .find(|d| *d != DVec2::ZERO)
            .unwrap_or(DVec2::X)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn centers(&self) -> &[DVec3] {
        &self.centers
    }

    pub fn widths(&self) -> &[f64] {
        &self.widths
    }

    pub fn left_edge(&self) -> &[DVec3] {
        &self.left
    }

    pub fn right_edge(&self) -> &[DVec3] {
        &self.right
    }

    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn snaps_to_terrain(&self) -> bool {
        self.snap_to_terrain
    }

    pub fn max_width(&self) -> f64 {
        self.widths.iter().copied().fold(0.0, f64::max)
    }

    /// Set every center's height from `height_at(x, z)` (world units).
    pub fn snap<F: Fn(f64, f64) -> f64>(&mut self, height_at: F) {
        for c in &mut self.centers {
            c.y = height_at(c.x, c.z);
        }
        self.rebuild();
    }

    pub fn nearest(&self, x: f64, z: f64) -> NearestPoint {
        let q = DVec2::new(x, z);
        let total = self.length();
        let mut best = NearestPoint {
            distance: f64::INFINITY,
            width: self.widths[0],
            t: 0.0,
            height: self.centers[0].y,
            position: self.centers[0],
        };
        for i in 0..self.centers.len() - 1 {
            let a = xz(self.centers[i]);
            let b = xz(self.centers[i + 1]);
            let ab = b - a;
            let len2 = ab.length_squared();
            let s = if len2 > 0.0 {
                ((q - a).dot(ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let p = a + ab * s;
            let d = q.distance(p);
            if d < best.distance {
                let pos = self.centers[i].lerp(self.centers[i + 1], s);
                let arc = self.cumulative[i] + (self.cumulative[i + 1] - self.cumulative[i]) * s;
                best = NearestPoint {
                    distance: d,
                    width: self.widths[i] + (self.widths[i + 1] - self.widths[i]) * s,
                    t: if total > 0.0 { arc / total } else { 0.0 },
                    height: pos.y,
                    position: pos,
                };
            }
        }
        best
    }

    /// Point at arc length `s` (clamped to the path).
    pub fn sample_at(&self, s: f64) -> PathSample {
        let total = self.length();
        let s = s.clamp(0.0, total);
        let i = self
            .cumulative
            .partition_point(|&c| c <= s)
            .clamp(1, self.centers.len() - 1);
        let seg = self.cumulative[i] - self.cumulative[i - 1];
        let f = if seg > 0.0 {
            (s - self.cumulative[i - 1]) / seg
        } else {
            0.0
        };
        let a = self.centers[i - 1];
        let b = self.centers[i];
        let mut direction = (xz(b) - xz(a)).normalize_or_zero();
        if direction == DVec2::ZERO {
            direction = self.direction_at(i);
        }
        PathSample {
            position: a.lerp(b, f),
            direction,
            width: self.widths[i - 1] + (self.widths[i] - self.widths[i - 1]) * f,
            t: if total > 0.0 { s / total } else { 0.0 },
        }
    }

    /// Samples every `spacing` world units, starting at the first point.
    pub fn walk_spacing(&self, spacing: f64) -> Vec<PathSample> {
        if !(spacing.is_finite() && spacing > 0.0) {
            return Vec::new();
        }
        let total = self.length();
        let count = (total / spacing).floor() as usize + 1;
        (0..count).map(|i| self.sample_at(i as f64 * spacing)).collect()
    }

    /// Exactly `count` samples spread evenly from start to end.
    pub fn walk_count(&self, count: usize) -> Vec<PathSample> {
        match count {
            0 => Vec::new(),
            1 => vec![self.sample_at(self.length() * 0.5)],
            n => {
                let step = self.length() / (n - 1) as f64;
                (0..n).map(|i| self.sample_at(i as f64 * step)).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> Path {
        Path::builder("road")
            .point(DVec3::new(0.0, 0.0, 0.0), 10.0)
            .point(DVec3::new(100.0, 0.0, 0.0), 10.0)
            .build()
            .unwrap()
    }

    #[test]
    fn mismatched_widths_are_a_configuration_error() {
        let cfg = PathConfig {
            name: "river".into(),
            points: vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]],
            widths: vec![4.0],
            resolution: 0.0,
            snap_to_terrain: false,
        };
        assert!(matches!(
            Path::from_config(&cfg),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn degenerate_paths_are_geometry_errors() {
        let single = Path::builder("p").point(DVec3::ZERO, 1.0).build();
        assert!(matches!(single, Err(Error::Geometry { .. })));
        let zero = Path::builder("p")
            .point(DVec3::ZERO, 1.0)
            .point(DVec3::new(0.0, 5.0, 0.0), 1.0)
            .build();
        assert!(matches!(zero, Err(Error::Geometry { .. })));
    }

    #[test]
    fn edges_match_center_count_and_offset_by_half_width() {
        let p = Path::builder("curvy")
            .point(DVec3::new(0.0, 0.0, 0.0), 4.0)
            .point(DVec3::new(50.0, 0.0, 30.0), 6.0)
            .point(DVec3::new(100.0, 0.0, 0.0), 8.0)
            .resolution(5.0)
            .build()
            .unwrap();
        assert!(p.centers().len() > 3);
        assert_eq!(p.left_edge().len(), p.centers().len());
        assert_eq!(p.right_edge().len(), p.centers().len());
        for i in 0..p.centers().len() {
            let c = xz(p.centers()[i]);
            let l = xz(p.left_edge()[i]);
            let r = xz(p.right_edge()[i]);
            assert!((c.distance(l) - p.widths()[i] * 0.5).abs() < 1e-9);
            assert!((c.distance(r) - p.widths()[i] * 0.5).abs() < 1e-9);
        }
        assert_eq!(*p.centers().last().unwrap(), DVec3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn nearest_point_on_straight_path() {
        let p = straight();
        let n = p.nearest(25.0, 7.0);
        assert!((n.distance - 7.0).abs() < 1e-9);
        assert!((n.t - 0.25).abs() < 1e-9);
        assert_eq!(n.width, 10.0);
        let beyond = p.nearest(-30.0, 40.0);
        assert!((beyond.distance - 50.0).abs() < 1e-9);
        assert_eq!(beyond.t, 0.0);
    }

    #[test]
    fn walking_by_spacing_and_count() {
        let p = straight();
        let s = p.walk_spacing(25.0);
        assert_eq!(s.len(), 5);
        assert!((s[4].position.x - 100.0).abs() < 1e-9);
        assert_eq!(s[1].direction, DVec2::X);

        let c = p.walk_count(3);
        assert_eq!(c.len(), 3);
        assert!((c[1].position.x - 50.0).abs() < 1e-9);
        assert!(p.walk_spacing(0.0).is_empty());
        assert!(p.walk_count(0).is_empty());
    }

    #[test]
    fn snapping_sets_heights() {
        let mut p = straight();
        p.snap(|x, _| x * 0.1);
        assert_eq!(p.centers()[1].y, 10.0);
        assert_eq!(p.left_edge()[1].y, 10.0);
        assert!((p.nearest(50.0, 0.0).height - 5.0).abs() < 1e-9);
    }
}
