//! Geometry kernel
//!
//! A circle primitive with exact intersection tests against segments, arcs,
//! polygons, rectangles and other circles. Tests compare squared distances
//! so no square roots are taken on the hot path.
//!
//! Coordinates are y-down screen space, but angles are plain math angles:
//! a point on an arc is `center + r * (cos θ, sin θ)`.

use std::f64::consts::TAU;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::{polar_to_cartesian, vector_angle};

/// Relative tolerance when checking that an arc's framing box is square
const SQUARE_TOLERANCE: f64 = 1e-9;

/// A straight line segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: DVec2,
    pub end: DVec2,
}

impl Segment {
    pub fn new(start: DVec2, end: DVec2) -> Self {
        Self { start, end }
    }

    /// Squared distance from `p` to the closest point of the segment
    pub fn distance_sq_to(&self, p: DVec2) -> f64 {
        (p - self.closest_point(p)).length_squared()
    }

    /// Closest point on the segment to `p`
    pub fn closest_point(&self, p: DVec2) -> DVec2 {
        let line = self.end - self.start;
        let len_sq = line.length_squared();
        if len_sq == 0.0 {
            return self.start;
        }
        let t = ((p - self.start).dot(line) / len_sq).clamp(0.0, 1.0);
        self.start + line * t
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).length()
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: DVec2,
    pub max: DVec2,
}

impl Rect {
    /// Rectangle from any two opposite corners
    pub fn from_corners(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_center(center: DVec2, size: DVec2) -> Self {
        let half = size / 2.0;
        Self::from_corners(center - half, center + half)
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Closest point inside the rectangle to `p`
    pub fn clamp(&self, p: DVec2) -> DVec2 {
        p.clamp(self.min, self.max)
    }
}

/// A simple polygon, edges implied between consecutive vertices and closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DVec2>", into = "Vec<DVec2>")]
pub struct Polygon {
    vertices: Vec<DVec2>,
}

impl Polygon {
    pub fn new(vertices: Vec<DVec2>) -> Result<Self, GeometryError> {
        if vertices.len() < 3 {
            return Err(GeometryError::DegeneratePolygon(vertices.len()));
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    /// Closed edge list
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| Segment::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Even-odd point containment
    pub fn contains(&self, p: DVec2) -> bool {
        let mut inside = false;
        for edge in self.edges() {
            let (a, b) = (edge.start, edge.end);
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

impl TryFrom<Vec<DVec2>> for Polygon {
    type Error = GeometryError;

    fn try_from(vertices: Vec<DVec2>) -> Result<Self, Self::Error> {
        Self::new(vertices)
    }
}

impl From<Polygon> for Vec<DVec2> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices
    }
}

/// How an arc's ends are closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcKind {
    /// Just the curve
    Open,
    /// Ends joined by a straight chord
    Chord,
    /// Ends joined to the center, a pie slice
    Pie,
}

/// An elliptical arc described by its framing box; only circular arcs can be
/// intersected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcSegment {
    pub center: DVec2,
    pub radius_x: f64,
    pub radius_y: f64,
    /// Start angle, radians
    pub start: f64,
    /// Signed angular extent, radians
    pub extent: f64,
    pub kind: ArcKind,
}

impl ArcSegment {
    pub fn new(
        center: DVec2,
        radius_x: f64,
        radius_y: f64,
        start: f64,
        extent: f64,
        kind: ArcKind,
    ) -> Self {
        Self {
            center,
            radius_x,
            radius_y,
            start,
            extent,
            kind,
        }
    }

    pub fn circular(center: DVec2, radius: f64, start: f64, extent: f64, kind: ArcKind) -> Self {
        Self::new(center, radius, radius, start, extent, kind)
    }

    /// Radius of a circular arc; errors if the framing box is not square
    pub fn radius(&self) -> Result<f64, GeometryError> {
        let scale = self.radius_x.abs().max(self.radius_y.abs()).max(1.0);
        if (self.radius_x - self.radius_y).abs() > SQUARE_TOLERANCE * scale {
            return Err(GeometryError::NonCircularArc {
                width: self.radius_x * 2.0,
                height: self.radius_y * 2.0,
            });
        }
        Ok(self.radius_x)
    }

    /// Start and end points of the curve (assumes a circular arc)
    pub fn end_points(&self) -> (DVec2, DVec2) {
        (
            polar_to_cartesian(self.center, self.radius_x, self.start),
            polar_to_cartesian(self.center, self.radius_x, self.start + self.extent),
        )
    }

    /// Whether `theta` falls inside the swept angle, either sweep direction
    pub fn contains_angle(&self, theta: f64) -> bool {
        let (from, sweep) = if self.extent < 0.0 {
            (self.start + self.extent, -self.extent)
        } else {
            (self.start, self.extent)
        };
        if sweep >= TAU {
            return true;
        }
        (theta - from).rem_euclid(TAU) <= sweep
    }

    /// Area containment. Open arcs enclose nothing.
    pub fn contains(&self, p: DVec2) -> bool {
        let Ok(radius) = self.radius() else {
            return false;
        };
        let offset = p - self.center;
        if offset.length_squared() > radius * radius {
            return false;
        }
        let in_pie = offset == DVec2::ZERO || self.contains_angle(vector_angle(offset));
        match self.kind {
            ArcKind::Open => false,
            ArcKind::Pie => in_pie,
            ArcKind::Chord => {
                let (a, b) = self.end_points();
                let in_triangle = triangle_contains(self.center, a, b, p);
                if self.extent.abs() <= std::f64::consts::PI {
                    in_pie && !in_triangle
                } else {
                    in_pie || in_triangle
                }
            }
        }
    }
}

fn triangle_contains(a: DVec2, b: DVec2, c: DVec2, p: DVec2) -> bool {
    let d1 = (b - a).perp_dot(p - a);
    let d2 = (c - b).perp_dot(p - b);
    let d3 = (a - c).perp_dot(p - c);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// A circle. Radius is validated on construction, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CircleParts", into = "CircleParts")]
pub struct Circle {
    center: DVec2,
    radius: f64,
}

/// Unchecked serialized form of a `Circle`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CircleParts {
    center: DVec2,
    radius: f64,
}

impl TryFrom<CircleParts> for Circle {
    type Error = GeometryError;

    fn try_from(parts: CircleParts) -> Result<Self, Self::Error> {
        Self::new(parts.center, parts.radius)
    }
}

impl From<Circle> for CircleParts {
    fn from(circle: Circle) -> Self {
        Self {
            center: circle.center,
            radius: circle.radius,
        }
    }
}

impl Circle {
    pub fn new(center: DVec2, radius: f64) -> Result<Self, GeometryError> {
        if !(radius >= 0.0) {
            return Err(GeometryError::NegativeRadius(radius));
        }
        Ok(Self { center, radius })
    }

    /// Construct from a radius already known to be non-negative
    pub(crate) fn from_parts(center: DVec2, radius: f64) -> Self {
        debug_assert!(radius >= 0.0);
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        self.center
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// A zero radius circle only reaches its exact center.
    #[inline]
    fn reaches(dist_sq: f64, radius: f64) -> bool {
        if radius == 0.0 {
            dist_sq == 0.0
        } else {
            dist_sq < radius * radius
        }
    }

    pub fn contains(&self, p: DVec2) -> bool {
        Self::reaches((p - self.center).length_squared(), self.radius)
    }

    pub fn intersects_segment(&self, segment: &Segment) -> bool {
        Self::reaches(segment.distance_sq_to(self.center), self.radius)
    }

    /// First point along `segment` that lies within the circle
    pub fn segment_entry(&self, segment: &Segment) -> Option<DVec2> {
        if !self.intersects_segment(segment) {
            return None;
        }
        if self.contains(segment.start) {
            return Some(segment.start);
        }
        let d = segment.end - segment.start;
        let f = segment.start - self.center;
        let a = d.length_squared();
        let b = 2.0 * f.dot(d);
        let c = f.length_squared() - self.radius * self.radius;
        let disc = b * b - 4.0 * a * c;
        if a == 0.0 || disc < 0.0 {
            return Some(segment.closest_point(self.center));
        }
        let t = ((-b - disc.sqrt()) / (2.0 * a)).clamp(0.0, 1.0);
        Some(segment.start + d * t)
    }

    pub fn intersects_circle(&self, other: &Circle) -> bool {
        Self::reaches(
            (other.center - self.center).length_squared(),
            self.radius + other.radius,
        )
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        rect.contains(self.center)
            || Self::reaches((rect.clamp(self.center) - self.center).length_squared(), self.radius)
    }

    pub fn intersects_polygon(&self, polygon: &Polygon) -> bool {
        polygon.contains(self.center) || polygon.edges().any(|e| self.intersects_segment(&e))
    }

    /// Errors if the arc is not circular.
    pub fn intersects_arc(&self, arc: &ArcSegment) -> Result<bool, GeometryError> {
        let arc_radius = arc.radius()?;
        if arc.contains(self.center) {
            return Ok(true);
        }
        let (start, end) = arc.end_points();
        if self.contains(start) || self.contains(end) {
            return Ok(true);
        }
        let crosses_edge = match arc.kind {
            ArcKind::Open => false,
            ArcKind::Chord => self.intersects_segment(&Segment::new(start, end)),
            ArcKind::Pie => {
                self.intersects_segment(&Segment::new(arc.center, start))
                    || self.intersects_segment(&Segment::new(arc.center, end))
            }
        };
        if crosses_edge {
            return Ok(true);
        }
        // The curve itself: the circle straddles the arc's radius within the sweep
        let offset = self.center - arc.center;
        let dist = offset.length();
        let in_band = dist > arc_radius - self.radius && dist < arc_radius + self.radius;
        Ok(in_band && dist > 0.0 && arc.contains_angle(vector_angle(offset)))
    }

    pub fn intersects(&self, shape: &Shape) -> Result<bool, GeometryError> {
        Ok(match shape {
            Shape::Circle(c) => self.intersects_circle(c),
            Shape::Rect(r) => self.intersects_rect(r),
            Shape::Polygon(p) => self.intersects_polygon(p),
            Shape::Arc(a) => self.intersects_arc(a)?,
        })
    }
}

/// Any area the kernel can test against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(Circle),
    Rect(Rect),
    Polygon(Polygon),
    Arc(ArcSegment),
}

impl Shape {
    pub fn contains(&self, p: DVec2) -> bool {
        match self {
            Shape::Circle(c) => c.contains(p),
            Shape::Rect(r) => r.contains(p),
            Shape::Polygon(poly) => poly.contains(p),
            Shape::Arc(a) => a.contains(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn circle(x: f64, y: f64, r: f64) -> Circle {
        Circle::new(DVec2::new(x, y), r).unwrap()
    }

    fn square() -> Polygon {
        Polygon::new(vec![
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_negative_radius_rejected() {
        assert_eq!(
            Circle::new(DVec2::ZERO, -1.0),
            Err(GeometryError::NegativeRadius(-1.0))
        );
        assert!(Circle::new(DVec2::ZERO, f64::NAN).is_err());
    }

    #[test]
    fn test_segment_intersection() {
        let c = circle(0.0, 0.0, 5.0);
        let near = Segment::new(DVec2::new(-10.0, 4.0), DVec2::new(10.0, 4.0));
        let tangent = Segment::new(DVec2::new(-10.0, 5.0), DVec2::new(10.0, 5.0));
        let short = Segment::new(DVec2::new(6.0, 0.0), DVec2::new(10.0, 0.0));
        assert!(c.intersects_segment(&near));
        assert!(!c.intersects_segment(&tangent)); // strictly inside only
        assert!(!c.intersects_segment(&short));
    }

    #[test]
    fn test_segment_entry_point() {
        let c = circle(10.0, 0.0, 2.0);
        let seg = Segment::new(DVec2::ZERO, DVec2::new(20.0, 0.0));
        let entry = c.segment_entry(&seg).unwrap();
        assert!((entry - DVec2::new(8.0, 0.0)).length() < 1e-9);

        let inside = Segment::new(DVec2::new(10.5, 0.0), DVec2::new(20.0, 0.0));
        assert_eq!(c.segment_entry(&inside), Some(DVec2::new(10.5, 0.0)));
    }

    #[test]
    fn test_zero_radius_circle() {
        let c = circle(3.0, 3.0, 0.0);
        assert!(c.contains(DVec2::new(3.0, 3.0)));
        assert!(!c.contains(DVec2::new(3.0, 3.0001)));
        let through = Segment::new(DVec2::new(0.0, 0.0), DVec2::new(6.0, 6.0));
        let beside = Segment::new(DVec2::new(0.0, 1.0), DVec2::new(6.0, 7.0));
        assert!(c.intersects_segment(&through));
        assert!(!c.intersects_segment(&beside));
    }

    #[test]
    fn test_circle_circle() {
        let a = circle(0.0, 0.0, 3.0);
        assert!(a.intersects_circle(&circle(5.0, 0.0, 2.5)));
        assert!(!a.intersects_circle(&circle(5.0, 0.0, 2.0)));
    }

    #[test]
    fn test_circle_polygon() {
        let poly = square();
        assert!(circle(5.0, 5.0, 1.0).intersects_polygon(&poly)); // center inside
        assert!(circle(12.0, 5.0, 3.0).intersects_polygon(&poly)); // crosses an edge
        assert!(!circle(15.0, 5.0, 3.0).intersects_polygon(&poly));
        assert!(circle(5.0, 5.0, 20.0).intersects_polygon(&poly)); // swallows it
    }

    #[test]
    fn test_circle_rect() {
        let rect = Rect::from_corners(DVec2::new(10.0, 10.0), DVec2::ZERO);
        assert!(circle(12.0, 12.0, 3.0).intersects_rect(&rect));
        assert!(!circle(13.0, 13.0, 3.0).intersects_rect(&rect));
        assert!(circle(5.0, 5.0, 0.0).intersects_rect(&rect));
    }

    #[test]
    fn test_non_square_arc_rejected() {
        let arc = ArcSegment::new(DVec2::ZERO, 10.0, 5.0, 0.0, PI, ArcKind::Pie);
        let result = circle(0.0, 0.0, 1.0).intersects_arc(&arc);
        assert_eq!(
            result,
            Err(GeometryError::NonCircularArc {
                width: 20.0,
                height: 10.0
            })
        );
    }

    #[test]
    fn test_pie_arc_cases() {
        // Quarter pie from +x to +y
        let arc = ArcSegment::circular(DVec2::ZERO, 10.0, 0.0, FRAC_PI_2, ArcKind::Pie);
        // Inside the slice
        assert!(circle(3.0, 3.0, 0.5).intersects_arc(&arc).unwrap());
        // Crossing the curve at 45 degrees
        assert!(circle(7.2, 7.2, 0.5).intersects_arc(&arc).unwrap());
        // Beyond the curve
        assert!(!circle(9.0, 9.0, 1.0).intersects_arc(&arc).unwrap());
        // Across the start radius, center outside the sweep
        assert!(circle(5.0, -1.0, 2.0).intersects_arc(&arc).unwrap());
        // Opposite quadrant
        assert!(!circle(-5.0, -5.0, 2.0).intersects_arc(&arc).unwrap());
    }

    #[test]
    fn test_chord_arc_excludes_segment_area() {
        let arc = ArcSegment::circular(DVec2::ZERO, 10.0, 0.0, FRAC_PI_2, ArcKind::Chord);
        // Near the center, on the wrong side of the chord
        assert!(!circle(1.0, 1.0, 1.0).intersects_arc(&arc).unwrap());
        // Between chord and curve
        assert!(circle(6.5, 6.5, 0.5).intersects_arc(&arc).unwrap());
    }

    #[test]
    fn test_negative_extent_arc() {
        // Sweeps clockwise from +y back to +x, same area as the quarter pie
        let arc = ArcSegment::circular(DVec2::ZERO, 10.0, FRAC_PI_2, -FRAC_PI_2, ArcKind::Pie);
        assert!(circle(7.2, 7.2, 0.5).intersects_arc(&arc).unwrap());
        assert!(!circle(-7.5, 7.5, 0.5).intersects_arc(&arc).unwrap());
    }

    #[test]
    fn test_open_arc_only_touches_curve() {
        let arc = ArcSegment::circular(DVec2::ZERO, 10.0, 0.0, PI, ArcKind::Open);
        assert!(!circle(0.0, 2.0, 1.0).intersects_arc(&arc).unwrap());
        assert!(circle(0.0, 10.0, 1.0).intersects_arc(&arc).unwrap());
    }

    #[test]
    fn test_shape_contains() {
        let shape = Shape::Polygon(square());
        assert!(shape.contains(DVec2::new(2.0, 8.0)));
        assert!(!shape.contains(DVec2::new(-2.0, 8.0)));
        let pie = Shape::Arc(ArcSegment::circular(DVec2::ZERO, 10.0, 0.0, FRAC_PI_2, ArcKind::Pie));
        assert!(pie.contains(DVec2::new(1.0, 1.0)));
        assert!(!pie.contains(DVec2::new(-1.0, 1.0)));
    }

    #[test]
    fn test_polygon_needs_three_vertices() {
        assert_eq!(
            Polygon::new(vec![DVec2::ZERO, DVec2::X]),
            Err(GeometryError::DegeneratePolygon(2))
        );
    }

    proptest! {
        #[test]
        fn prop_circle_at_pie_center_always_hits(
            radius in 0.01f64..50.0,
            arc_radius in 1.0f64..200.0,
            start in -PI..PI,
            extent in prop_oneof![0.05f64..6.2, -6.2f64..-0.05],
        ) {
            let arc = ArcSegment::circular(DVec2::new(100.0, 100.0), arc_radius, start, extent, ArcKind::Pie);
            let c = Circle::new(DVec2::new(100.0, 100.0), radius).unwrap();
            prop_assert!(c.intersects_arc(&arc).unwrap());
        }

        #[test]
        fn prop_circle_outside_radial_band_misses(
            radius in 0.0f64..10.0,
            arc_radius in 1.0f64..100.0,
            gap in 0.01f64..100.0,
            theta in -PI..PI,
            start in -PI..PI,
            extent in -6.0f64..6.0,
        ) {
            let arc = ArcSegment::circular(DVec2::ZERO, arc_radius, start, extent, ArcKind::Pie);
            let center = polar_to_cartesian(DVec2::ZERO, arc_radius + radius + gap, theta);
            let c = Circle::new(center, radius).unwrap();
            prop_assert!(!c.intersects_arc(&arc).unwrap());
        }

        #[test]
        fn prop_circle_on_swept_curve_hits(
            radius in 0.5f64..10.0,
            arc_radius in 20.0f64..100.0,
            start in -PI..PI,
            extent in 0.1f64..6.0,
            t in 0.0f64..1.0,
        ) {
            let arc = ArcSegment::circular(DVec2::ZERO, arc_radius, start, extent, ArcKind::Open);
            let center = polar_to_cartesian(DVec2::ZERO, arc_radius, start + extent * t);
            let c = Circle::new(center, radius).unwrap();
            prop_assert!(c.intersects_arc(&arc).unwrap());
        }

        #[test]
        fn prop_circle_intersection_is_symmetric(
            ax in -50.0f64..50.0, ay in -50.0f64..50.0, ar in 0.0f64..20.0,
            bx in -50.0f64..50.0, by in -50.0f64..50.0, br in 0.0f64..20.0,
        ) {
            let a = Circle::new(DVec2::new(ax, ay), ar).unwrap();
            let b = Circle::new(DVec2::new(bx, by), br).unwrap();
            prop_assert_eq!(a.intersects_circle(&b), b.intersects_circle(&a));
        }
    }
}
