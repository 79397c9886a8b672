//! Planar polyline geometry
//!
//! All coordinates live in one consistent 2D metric plane (meters). Points
//! are `geo` coordinates and polylines are coordinate vectors, measured and
//! resampled through `geo`'s `Line` and `LineString` algorithms. Mitered
//! offsets, loop clamping, Bézier connectors and circle crops are local.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    BoundingRect, Centroid, Coord, Densify, Distance, Euclidean, Intersects, Length, Line,
    LineInterpolatePoint, LineString, MultiPoint, RemoveRepeatedPoints,
};

pub use geo::Vector2DOps;

/// Lengths below this are treated as zero
pub const EPSILON: f64 = 1e-9;

/// Interior offset vertices never move further than this multiple of the offset
const MITER_LIMIT: f64 = 2.0;

/// Offset loops are looked for this many offsets ahead along the line,
/// plus [`LOOP_REACH_MIN`]
const LOOP_REACH_FACTOR: f64 = 16.0;
const LOOP_REACH_MIN: f64 = 10.0;

/// A point (or vector) in the metric plane
pub type Point = Coord<f64>;

/// The few vector helpers `geo` leaves to its callers
pub trait PointExt: Sized {
    fn new(x: f64, y: f64) -> Self;

    fn distance(self, other: Self) -> f64;

    /// Unit vector, or `None` for a (near) zero vector
    fn normalize(self) -> Option<Self>;

    fn lerp(self, other: Self, t: f64) -> Self;

    /// Heading in radians, counter-clockwise from the +x axis
    fn heading(self) -> f64;

    fn as_array(self) -> [f64; 2];
}

impl PointExt for Point {
    fn new(x: f64, y: f64) -> Self {
        Coord { x, y }
    }

    fn distance(self, other: Point) -> f64 {
        Euclidean::distance(self, other)
    }

    fn normalize(self) -> Option<Point> {
        if self.magnitude() < EPSILON {
            None
        } else {
            self.try_normalize()
        }
    }

    fn lerp(self, other: Point, t: f64) -> Point {
        self + (other - self) * t
    }

    fn heading(self) -> f64 {
        self.y.atan2(self.x)
    }

    fn as_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Signed angle turning from direction `a` to direction `b`, in (-π, π].
/// Positive is a counter-clockwise (left) turn.
pub fn signed_angle(a: Point, b: Point) -> f64 {
    a.wedge_product(b).atan2(a.dot_product(b))
}

/// Smallest difference between two axes (headings taken modulo π), in [0, π/2]
pub fn axis_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(std::f64::consts::PI);
    d.min(std::f64::consts::PI - d)
}

/// Centroid of a point set, `None` when it is empty
pub fn centroid(points: impl IntoIterator<Item = Point>) -> Option<Point> {
    points
        .into_iter()
        .collect::<MultiPoint<f64>>()
        .centroid()
        .map(|c| c.0)
}

fn segment_length(a: Point, b: Point) -> f64 {
    Line::new(a, b).length::<Euclidean>()
}

pub fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| segment_length(w[0], w[1])).sum()
}

/// Arc length at each vertex, starting with 0.0
pub fn cumulative_lengths(points: &[Point]) -> Vec<f64> {
    let mut total = 0.0;
    let mut lengths = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += segment_length(points[i - 1], *p);
        }
        lengths.push(total);
    }
    lengths
}

/// Point at arc length `station`, clamped to the polyline
pub fn point_along(points: &[Point], station: f64) -> Point {
    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        return Point::default();
    };
    let total = polyline_length(points);
    if total < EPSILON || station <= 0.0 {
        return first;
    }
    if station >= total {
        return last;
    }
    LineString::from(points.to_vec())
        .line_interpolate_point(station / total)
        .map_or(last, |p| p.0)
}

/// Subdivide every segment into equal pieces no longer than `spacing`.
///
/// Original vertices are kept, so endpoints and corners are preserved
/// exactly; repeated vertices are dropped.
pub fn densify(points: &[Point], spacing: f64) -> Vec<Point> {
    if points.len() < 2 || spacing <= 0.0 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let dense = LineString::from(points.to_vec())
        .remove_repeated_points()
        .densify::<Euclidean>(spacing)
        .0;
    if dense.len() < 2 {
        vec![first, last]
    } else {
        dense
    }
}

/// Resample at uniform arc-length spacing (rounded to a whole number of
/// pieces). First and last points are kept exactly.
pub fn resample(points: &[Point], spacing: f64) -> Vec<Point> {
    if points.len() < 2 || spacing <= 0.0 {
        return points.to_vec();
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let total = polyline_length(points);
    if total < EPSILON {
        return vec![first, last];
    }

    let line = LineString::from(points.to_vec());
    let pieces = (total / spacing).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(pieces + 1);
    out.push(first);
    for k in 1..pieces {
        let fraction = k as f64 / pieces as f64;
        out.push(line.line_interpolate_point(fraction).map_or(last, |p| p.0));
    }
    out.push(last);
    out
}

/// Largest perpendicular distance of any vertex from the start-end chord
pub fn max_chord_deviation(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let a = points[0];
    let b = points[points.len() - 1];
    match (b - a).normalize() {
        Some(dir) => points
            .iter()
            .map(|p| (*p - a).wedge_product(dir).abs())
            .fold(0.0, f64::max),
        None => points.iter().map(|p| p.distance(a)).fold(0.0, f64::max),
    }
}

/// Unit direction leaving the first vertex
pub fn start_direction(points: &[Point]) -> Option<Point> {
    let first = *points.first()?;
    points.iter().skip(1).find_map(|p| (*p - first).normalize())
}

/// Unit direction arriving at the last vertex
pub fn end_direction(points: &[Point]) -> Option<Point> {
    let last = *points.last()?;
    points.iter().rev().skip(1).find_map(|p| (last - *p).normalize())
}

/// Unit direction of every segment; a zero-length segment inherits the
/// direction of its neighbour.
fn segment_directions(points: &[Point]) -> Option<Vec<Point>> {
    let mut dirs: Vec<Option<Point>> = points
        .windows(2)
        .map(|w| (w[1] - w[0]).normalize())
        .collect();
    let fallback = dirs.iter().flatten().next().copied()?;
    let mut previous = fallback;
    for d in dirs.iter_mut() {
        match d {
            Some(v) => previous = *v,
            None => *d = Some(previous),
        }
    }
    Some(dirs.into_iter().flatten().collect())
}

/// Offset every vertex along its mitered normal (positive = left).
///
/// Keeps the vertex count. The miter is clamped at [`MITER_LIMIT`] so sharp
/// corners never throw a vertex far away from the centerline.
pub fn offset_vertices(points: &[Point], offset: f64) -> Vec<Point> {
    if points.len() < 2 || offset == 0.0 {
        return points.to_vec();
    }
    let Some(dirs) = segment_directions(points) else {
        return points.to_vec();
    };

    let n = points.len();
    (0..n)
        .map(|i| {
            let normal = if i == 0 {
                dirs[0].left()
            } else if i == n - 1 {
                dirs[n - 2].left()
            } else {
                let before = dirs[i - 1].left();
                let after = dirs[i].left();
                match (before + after).normalize() {
                    Some(miter) => {
                        let cos = miter.dot_product(after).max(1.0 / MITER_LIMIT);
                        miter * (1.0 / cos)
                    }
                    None => after,
                }
            };
            points[i] + normal * offset
        })
        .collect()
}

fn is_degenerate(line: Line<f64>) -> bool {
    line.start.distance(line.end) < EPSILON
}

fn boxes_touch(a: Line<f64>, b: Line<f64>) -> bool {
    a.bounding_rect().intersects(&b.bounding_rect())
}

/// Where the polyline has to be pinched so segment `a` and the later
/// segment `b` stop overlapping. Neighbouring segments only count when
/// they fold back onto each other; then the far end of the overlap is
/// returned.
fn pinch_point(a: Line<f64>, b: Line<f64>, adjacent: bool) -> Option<Point> {
    if !boxes_touch(a, b) {
        return None;
    }
    match line_intersection(a, b)? {
        LineIntersection::SinglePoint { intersection, .. } => (!adjacent).then_some(intersection),
        LineIntersection::Collinear { intersection } => {
            if !adjacent {
                return Some(intersection.start);
            }
            if is_degenerate(intersection) {
                return None;
            }
            let (s, e) = (intersection.start, intersection.end);
            Some(if s.distance(a.end) >= e.distance(a.end) { s } else { e })
        }
    }
}

/// One forward sweep of [`collapse_loops`]. Returns the number of moved
/// vertices.
fn collapse_sweep(points: &mut [Point], reach: f64) -> usize {
    let n = points.len();
    let mut moved = 0;
    for i in 0..n.saturating_sub(1) {
        let a = Line::new(points[i], points[i + 1]);
        if is_degenerate(a) {
            continue;
        }
        let mut cut = None;
        let mut adjacent = true;
        let mut travelled = 0.0;
        for j in (i + 1)..(n - 1) {
            let b = Line::new(points[j], points[j + 1]);
            if is_degenerate(b) {
                continue;
            }
            if !adjacent && travelled > reach {
                break;
            }
            if let Some(p) = pinch_point(a, b, adjacent) {
                cut = Some((j, p));
            }
            travelled += segment_length(b.start, b.end);
            adjacent = false;
        }
        if let Some((j, p)) = cut {
            for q in &mut points[(i + 1)..=j] {
                if *q != p {
                    *q = p;
                    moved += 1;
                }
            }
        }
    }
    moved
}

/// Collapse every loop and fold of the polyline onto the point where it
/// closes, looking at most `reach` meters ahead. Keeps the vertex count and
/// both endpoints. Returns the number of moved vertices.
pub fn collapse_loops(points: &mut [Point], reach: f64) -> usize {
    let mut total = 0;
    for _ in 0..points.len() {
        let moved = collapse_sweep(points, reach);
        if moved == 0 {
            break;
        }
        total += moved;
    }
    total
}

fn loop_reach(offset: f64) -> f64 {
    LOOP_REACH_FACTOR * offset.abs() + LOOP_REACH_MIN
}

/// Offset a polyline and clamp it where the raw offset loops or folds back
/// on the inside of curves tighter than the offset: the loop collapses onto
/// its crossing point. Keeps the vertex count and returns the number of
/// clamped vertices alongside.
pub fn clamped_offset(points: &[Point], offset: f64) -> (Vec<Point>, usize) {
    let mut line = offset_vertices(points, offset);
    let clamped = collapse_loops(&mut line, loop_reach(offset));
    (line, clamped)
}

/// [`clamped_offset`] without the count
pub fn offset_polyline(points: &[Point], offset: f64) -> Vec<Point> {
    clamped_offset(points, offset).0
}

/// True if any two non-adjacent segments touch, or adjacent segments fold
/// back onto each other.
pub fn self_intersects(points: &[Point]) -> bool {
    let segments: Vec<Line<f64>> = points
        .windows(2)
        .map(|w| Line::new(w[0], w[1]))
        .filter(|l| !is_degenerate(*l))
        .collect();

    for (i, &a) in segments.iter().enumerate() {
        for (j, &b) in segments.iter().enumerate().skip(i + 1) {
            if !boxes_touch(a, b) {
                continue;
            }
            match line_intersection(a, b) {
                None => {}
                Some(LineIntersection::Collinear { intersection }) => {
                    if j > i + 1 || !is_degenerate(intersection) {
                        return true;
                    }
                }
                Some(LineIntersection::SinglePoint { .. }) => {
                    if j > i + 1 {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Sample a cubic Bézier curve at `samples` evenly spaced parameters
pub fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, samples: usize) -> Vec<Point> {
    let n = samples.max(2);
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            let mt = 1.0 - t;
            p0 * (mt * mt * mt) + p1 * (3.0 * mt * mt * t) + p2 * (3.0 * mt * t * t) + p3 * (t * t * t)
        })
        .collect()
}

/// Total signed heading change divided by arc length (1/m)
pub fn mean_curvature(points: &[Point]) -> f64 {
    let length = polyline_length(points);
    if length < EPSILON {
        return 0.0;
    }
    let turning: f64 = points
        .windows(3)
        .filter_map(|w| {
            let a = (w[1] - w[0]).normalize()?;
            let b = (w[2] - w[1]).normalize()?;
            Some(signed_angle(a, b))
        })
        .sum();
    turning / length
}

/// Parameter in [0, 1] where the segment a→b leaves the circle around
/// `center`. `a` must lie inside the circle and `b` on or outside it.
fn circle_exit(a: Point, b: Point, center: Point, radius: f64) -> Point {
    let d = b - a;
    let f = a - center;
    let qa = d.magnitude_squared();
    if qa < EPSILON {
        return b;
    }
    let qb = 2.0 * f.dot_product(d);
    let qc = f.magnitude_squared() - radius * radius;
    let disc = (qb * qb - 4.0 * qa * qc).max(0.0);
    let t = ((-qb + disc.sqrt()) / (2.0 * qa)).clamp(0.0, 1.0);
    a.lerp(b, t)
}

/// Remove the leading vertices that lie within `radius` of `center`, ending
/// the cut exactly on the circle. `None` if nothing would remain outside.
pub fn crop_start(points: &[Point], center: Point, radius: f64) -> Option<Vec<Point>> {
    let first_outside = points.iter().position(|p| p.distance(center) >= radius)?;
    if first_outside == 0 {
        return Some(points.to_vec());
    }
    let exit = circle_exit(points[first_outside - 1], points[first_outside], center, radius);
    let mut out = Vec::with_capacity(points.len() - first_outside + 1);
    if exit.distance(points[first_outside]) >= EPSILON {
        out.push(exit);
    }
    out.extend_from_slice(&points[first_outside..]);
    if out.len() < 2 {
        None
    } else {
        Some(out)
    }
}

/// Mirror of [`crop_start`] for the trailing vertices
pub fn crop_end(points: &[Point], center: Point, radius: f64) -> Option<Vec<Point>> {
    let reversed: Vec<Point> = points.iter().rev().copied().collect();
    let mut cropped = crop_start(&reversed, center, radius)?;
    cropped.reverse();
    Some(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(len: f64) -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(len, 0.0)]
    }

    #[test]
    fn test_densify_keeps_vertices() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 3.0)];
        let dense = densify(&pts, 1.0);
        assert_eq!(dense.first(), Some(&pts[0]));
        assert_eq!(dense.last(), Some(&pts[2]));
        assert!(dense.contains(&pts[1]), "corner vertex must survive");
        assert_eq!(dense.len(), 14);
    }

    #[test]
    fn test_densify_drops_zero_length_segments() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(0.0, 0.0), Point::new(2.0, 0.0)];
        let dense = densify(&pts, 1.0);
        assert_eq!(dense, vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(2.0, 0.0)]);
    }

    #[test]
    fn test_resample_uniform() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(3.0, 0.0), Point::new(10.0, 0.0)];
        let out = resample(&pts, 2.5);
        assert_eq!(out.len(), 5);
        for (i, p) in out.iter().enumerate() {
            assert!((p.x - 2.5 * i as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_offset_straight_is_exact() {
        let pts = densify(&straight(20.0), 1.0);
        let left = offset_polyline(&pts, 1.5);
        assert_eq!(left.len(), pts.len());
        for (a, b) in pts.iter().zip(&left) {
            assert!((b.y - 1.5).abs() < 1e-12);
            assert!((b.x - a.x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_offset_tight_corner_has_no_backtracking() {
        // U-shaped hairpin narrower than the offset on the inside
        let pts = densify(
            &[Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 1.0), Point::new(0.0, 1.0)],
            0.25,
        );
        let (inner, clamped) = clamped_offset(&pts, 2.0);
        assert_eq!(inner.len(), pts.len());
        assert!(clamped > 0);
        assert!(!self_intersects(&inner), "clamped offset must not self-intersect");
    }

    /// Flared U-turn round a `radius` semicircle, endpoints 20 m apart
    fn hairpin(radius: f64) -> Vec<Point> {
        let mut pts = vec![Point::new(-10.0, 20.0)];
        for k in 0..=12 {
            let t = std::f64::consts::PI * (1.0 + k as f64 / 12.0);
            pts.push(Point::new(radius * t.cos(), radius * t.sin()));
        }
        pts.push(Point::new(10.0, 20.0));
        densify(&pts, 0.25)
    }

    #[test]
    fn test_hairpin_offsets_are_clamped_not_looped() {
        let pts = hairpin(3.0);
        // The inside of the turn is on the left
        for offset in [1.75, 3.5, 5.25, 7.0] {
            let raw = offset_vertices(&pts, offset);
            let clamped = offset_polyline(&pts, offset);
            assert_eq!(clamped.len(), pts.len());
            assert_eq!(clamped[0], raw[0]);
            assert_eq!(clamped.last(), raw.last());
            assert!(!self_intersects(&clamped), "offset {offset} still loops");
        }
        assert!(self_intersects(&offset_vertices(&pts, 3.5)));
    }

    #[test]
    fn test_collapse_pinches_bowtie_onto_crossing() {
        let mut pts = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 2.0),
            Point::new(2.0, -2.0),
            Point::new(2.0, -6.0),
        ];
        let moved = collapse_loops(&mut pts, 100.0);
        assert_eq!(moved, 2);
        assert_eq!(pts.len(), 5);
        assert!(pts[1].distance(Point::new(3.0, 0.0)) < 1e-12);
        assert_eq!(pts[1], pts[2]);
        assert!(!self_intersects(&pts));
    }

    #[test]
    fn test_polyline_measures() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0), Point::new(3.0, 10.0)];
        assert_eq!(polyline_length(&pts), 11.0);
        assert_eq!(cumulative_lengths(&pts), vec![0.0, 5.0, 11.0]);
        assert!(point_along(&pts, 8.0).distance(Point::new(3.0, 7.0)) < 1e-12);
        assert_eq!(point_along(&pts, 50.0), pts[2]);
        assert_eq!(
            centroid([Point::new(0.0, 0.0), Point::new(0.5, 0.0)]),
            Some(Point::new(0.25, 0.0))
        );
        assert_eq!(centroid(Vec::new()), None);
    }

    #[test]
    fn test_self_intersects() {
        let bowtie = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 0.0),
            Point::new(0.0, 2.0),
        ];
        assert!(self_intersects(&bowtie));
        assert!(!self_intersects(&densify(&straight(5.0), 1.0)));

        let fold = vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(1.0, 0.0)];
        assert!(self_intersects(&fold));
    }

    #[test]
    fn test_signed_angle_and_axis() {
        let east = Point::new(1.0, 0.0);
        let north = Point::new(0.0, 1.0);
        assert!((signed_angle(east, north) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((signed_angle(north, east) + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!(axis_difference(0.0, std::f64::consts::PI) < 1e-12);
        assert!((axis_difference(0.0, std::f64::consts::FRAC_PI_2) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_crop_start_and_end() {
        let pts = densify(&straight(10.0), 1.0);
        let cropped = crop_start(&pts, pts[0], 2.5).unwrap();
        assert!((cropped[0].x - 2.5).abs() < 1e-12);
        assert_eq!(cropped.last(), pts.last());

        let both = crop_end(&cropped, pts[pts.len() - 1], 2.5).unwrap();
        assert!((both[both.len() - 1].x - 7.5).abs() < 1e-12);
        assert!((polyline_length(&both) - 5.0).abs() < 1e-9);

        assert!(crop_start(&straight(2.0), Point::new(0.0, 0.0), 5.0).is_none());
    }

    #[test]
    fn test_bezier_endpoints() {
        let p0 = Point::new(0.0, 0.0);
        let p3 = Point::new(10.0, 10.0);
        let curve = cubic_bezier(p0, Point::new(4.0, 0.0), Point::new(10.0, 6.0), p3, 16);
        assert_eq!(curve.len(), 16);
        assert_eq!(curve[0], p0);
        assert!(curve[15].distance(p3) < 1e-12);
        assert!(mean_curvature(&curve) > 0.0, "left-hand curve has positive curvature");
    }
}
