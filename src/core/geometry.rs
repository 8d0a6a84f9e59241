//! Planar Geometry
//!
//! Points, axis-aligned bounding boxes and the polygon primitives shared by
//! the collision engine and the shape validator.
//!
//! All coordinates are world units (`f64`) with +Y pointing down, matching
//! the renderer and editors.

use std::fmt;
use std::ops::{Add, Sub};
use serde::{Serialize, Deserialize};

/// Tolerance used when comparing floating-point coordinates.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// A point in world space.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// World origin
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// True if both coordinates are finite numbers.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// 2D cross product (z component of the 3D cross product).
    #[inline]
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Axis-aligned bounding box, stored as top-left corner plus extent.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Horizontal extent
    pub width: f64,
    /// Vertical extent
    pub height: f64,
}

impl BoundingBox {
    /// Create a box from its top-left corner and extent.
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Square box of side `size` centred on `center`.
    pub fn centered(center: Point, size: f64) -> Self {
        let half = size / 2.0;
        Self::new(center.x - half, center.y - half, size, size)
    }

    /// Smallest box containing every point. `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Left edge.
    #[inline]
    pub fn left(&self) -> f64 {
        self.x
    }

    /// Right edge.
    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Top edge.
    #[inline]
    pub fn top(&self) -> f64 {
        self.y
    }

    /// Bottom edge.
    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Finite coordinates and non-negative extent.
    pub fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Inclusive containment test.
    #[inline]
    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// True if every point lies inside the box, within `tolerance`.
    pub fn contains_points(&self, points: &[Point], tolerance: f64) -> bool {
        points.iter().all(|p| {
            p.x >= self.left() - tolerance
                && p.x <= self.right() + tolerance
                && p.y >= self.top() - tolerance
                && p.y <= self.bottom() + tolerance
        })
    }

    /// Strict AABB overlap. Boxes that only share an edge do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }
}

/// Convert a flattened `[x0, y0, x1, y1, ...]` array into points.
///
/// Returns `None` if the array has odd length.
pub fn points_from_flat(coords: &[f64]) -> Option<Vec<Point>> {
    if coords.len() % 2 != 0 {
        return None;
    }
    Some(
        coords
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect(),
    )
}

/// Flatten points into `[x0, y0, x1, y1, ...]`.
pub fn flatten_points(points: &[Point]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

/// True if the slice holds at least three pairwise distinct vertices.
pub fn has_three_distinct(points: &[Point]) -> bool {
    let mut distinct: Vec<Point> = Vec::with_capacity(3);
    for p in points {
        if !distinct.iter().any(|d| d == p) {
            distinct.push(*p);
            if distinct.len() >= 3 {
                return true;
            }
        }
    }
    false
}

/// Signed shoelace sum divided by two. Positive for counter-clockwise
/// winding in a +Y-up frame.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Polygon area via the shoelace formula.
#[inline]
pub fn polygon_area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// True if `point` lies on segment `a`-`b` (within tolerance).
pub fn point_on_segment(point: Point, a: Point, b: Point) -> bool {
    let ab = b - a;
    let ap = point - a;
    let len_sq = ab.dot(ab);
    if len_sq <= GEOMETRY_EPSILON {
        return ap.dot(ap) <= GEOMETRY_EPSILON;
    }
    // Cross product scaled by segment length gives the perpendicular distance.
    let cross = ab.cross(ap);
    if cross.abs() > GEOMETRY_EPSILON * len_sq.sqrt().max(1.0) {
        return false;
    }
    let t = ap.dot(ab);
    t >= -GEOMETRY_EPSILON && t <= len_sq + GEOMETRY_EPSILON
}

/// Even-odd ray-casting point-in-polygon test.
///
/// For each edge `(i, j = i - 1 mod n)` a crossing is counted when the point's
/// y lies strictly between the edge's y-extents and the point's x is left of
/// the edge at that y.
///
/// Edge convention: a point lying exactly on a boundary edge or vertex is
/// reported as inside. Polygons with fewer than three distinct vertices
/// contain no points. Self-intersecting polygons follow the even-odd rule,
/// so each lobe of a bowtie is inside even though its signed area cancels.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if !has_three_distinct(polygon) {
        return false;
    }

    let n = polygon.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = polygon[i];
        let pj = polygon[j];

        if point_on_segment(point, pj, pi) {
            return true;
        }

        if (pi.y > point.y) != (pj.y > point.y) {
            let x_at_y = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_at_y {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Parametric segment intersection test for `p1`-`p2` against `p3`-`p4`.
///
/// Parallel and collinear segments (zero denominator) are reported as
/// non-intersecting, so exactly overlapping collinear segments are not
/// detected.
pub fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let denom = (p2.x - p1.x) * (p4.y - p3.y) - (p2.y - p1.y) * (p4.x - p3.x);
    if denom.abs() <= GEOMETRY_EPSILON {
        return false;
    }
    let ua = ((p4.x - p3.x) * (p1.y - p3.y) - (p4.y - p3.y) * (p1.x - p3.x)) / denom;
    let ub = ((p2.x - p1.x) * (p1.y - p3.y) - (p2.y - p1.y) * (p1.x - p3.x)) / denom;
    (0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub)
}

/// Find the first pair of edges that cross.
///
/// Edge `k` runs from vertex `k` to vertex `k + 1 mod n`. Edges sharing an
/// endpoint meet there by construction and are never reported, whether they
/// are neighbours by index or only by a repeated vertex (a closing copy of
/// the first vertex, or a doubled vertex). Returns the edge indices of the
/// first crossing pair found.
pub fn first_self_intersection(points: &[Point]) -> Option<(usize, usize)> {
    let n = points.len();
    if n < 4 {
        return None;
    }
    for i in 0..n {
        let a1 = points[i];
        let a2 = points[(i + 1) % n];
        for j in (i + 2)..n {
            let b1 = points[j];
            let b2 = points[(j + 1) % n];
            if a1 == b1 || a1 == b2 || a2 == b1 || a2 == b2 {
                continue;
            }
            if segments_intersect(a1, a2, b1, b2) {
                return Some((i, j));
            }
        }
    }
    None
}
