//! Geometry values and a parser for the WKT subset the spatial dialect
//! understands: `POINT`, `ENVELOPE`, and single-ring `POLYGON`.
//!
//! `ENVELOPE (min-x, max-x, max-y, min-y)` follows the CQL argument order.
//! Polygon holes are parsed past but ignored; all spatial evaluation here is
//! envelope-based.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A WKT text that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid WKT: {0}")]
pub struct WktParseError(pub String);

/// A point in coordinate order (x, y).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X (longitude/easting) coordinate.
    pub x: f64,
    /// Y (latitude/northing) coordinate.
    pub y: f64,
}

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Smallest x.
    pub min_x: f64,
    /// Smallest y.
    pub min_y: f64,
    /// Largest x.
    pub max_x: f64,
    /// Largest y.
    pub max_y: f64,
}

impl Envelope {
    /// Builds an envelope from two opposite corners, normalizing order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// The degenerate envelope of a single point.
    pub fn of_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    /// The smallest envelope containing all points. None for an empty slice.
    pub fn of_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut env = Self::of_point(*first);
        for p in &points[1..] {
            env.min_x = env.min_x.min(p.x);
            env.min_y = env.min_y.min(p.y);
            env.max_x = env.max_x.max(p.x);
            env.max_y = env.max_y.max(p.y);
        }
        Some(env)
    }

    /// True when `other` lies entirely inside this envelope (borders count).
    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// True when the two envelopes overlap (borders count).
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

/// A parsed geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// A single point.
    Point(Point),
    /// An axis-aligned box.
    Envelope(Envelope),
    /// A polygon's outer ring; holes are dropped at parse time.
    Polygon {
        /// Outer ring, first point repeated last as written.
        ring: Vec<Point>,
        /// Precomputed bounding box of the ring.
        envelope: Envelope,
    },
}

impl Geometry {
    /// The geometry's bounding box.
    pub fn envelope(&self) -> Envelope {
        match self {
            Self::Point(p) => Envelope::of_point(*p),
            Self::Envelope(e) => *e,
            Self::Polygon { envelope, .. } => *envelope,
        }
    }

    /// Renders the geometry as WKT.
    pub fn to_wkt(&self) -> String {
        match self {
            Self::Point(p) => format!("POINT ({} {})", fmt_num(p.x), fmt_num(p.y)),
            Self::Envelope(e) => format!(
                "ENVELOPE ({}, {}, {}, {})",
                fmt_num(e.min_x),
                fmt_num(e.max_x),
                fmt_num(e.max_y),
                fmt_num(e.min_y)
            ),
            Self::Polygon { ring, .. } => {
                let coords: Vec<String> = ring
                    .iter()
                    .map(|p| format!("{} {}", fmt_num(p.x), fmt_num(p.y)))
                    .collect();
                format!("POLYGON (({}))", coords.join(", "))
            }
        }
    }
}

fn fmt_num(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Parses a WKT text into a [`Geometry`].
pub fn parse(text: &str) -> Result<Geometry, WktParseError> {
    let trimmed = text.trim();
    let open = trimmed
        .find('(')
        .ok_or_else(|| WktParseError(format!("missing '(' in '{trimmed}'")))?;
    let keyword = trimmed[..open].trim().to_ascii_uppercase();
    if !trimmed.ends_with(')') {
        return Err(WktParseError(format!("missing ')' in '{trimmed}'")));
    }
    let body = &trimmed[open + 1..trimmed.len() - 1];
    match keyword.as_str() {
        "POINT" => parse_point(body),
        "ENVELOPE" => parse_envelope(body),
        "POLYGON" => parse_polygon(body),
        other => Err(WktParseError(format!("unsupported geometry '{other}'"))),
    }
}

fn parse_number(token: &str) -> Result<f64, WktParseError> {
    let trimmed = token.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| WktParseError(format!("bad number '{trimmed}'")))?;
    // f64::from_str accepts NaN and infinity; WKT coordinates do not.
    if !value.is_finite() {
        return Err(WktParseError(format!("non-finite number '{trimmed}'")));
    }
    Ok(value)
}

fn parse_point(body: &str) -> Result<Geometry, WktParseError> {
    let coords: Vec<&str> = body.split_whitespace().collect();
    if coords.len() != 2 {
        return Err(WktParseError(format!(
            "POINT wants two coordinates, got {}",
            coords.len()
        )));
    }
    Ok(Geometry::Point(Point {
        x: parse_number(coords[0])?,
        y: parse_number(coords[1])?,
    }))
}

fn parse_envelope(body: &str) -> Result<Geometry, WktParseError> {
    let nums: Vec<f64> = body
        .split(',')
        .map(parse_number)
        .collect::<Result<_, _>>()?;
    if nums.len() != 4 {
        return Err(WktParseError(format!(
            "ENVELOPE wants four values, got {}",
            nums.len()
        )));
    }
    // CQL order: min-x, max-x, max-y, min-y.
    Ok(Geometry::Envelope(Envelope::new(
        nums[0], nums[3], nums[1], nums[2],
    )))
}

fn parse_polygon(body: &str) -> Result<Geometry, WktParseError> {
    let rings = split_rings(body)?;
    let outer = rings
        .first()
        .ok_or_else(|| WktParseError("POLYGON has no rings".into()))?;
    let mut ring = Vec::new();
    for pair in outer.split(',') {
        let coords: Vec<&str> = pair.split_whitespace().collect();
        if coords.len() != 2 {
            return Err(WktParseError(format!("bad coordinate pair '{}'", pair.trim())));
        }
        ring.push(Point {
            x: parse_number(coords[0])?,
            y: parse_number(coords[1])?,
        });
    }
    if ring.len() < 4 {
        return Err(WktParseError(format!(
            "POLYGON ring wants at least four points, got {}",
            ring.len()
        )));
    }
    let (first, last) = (ring[0], ring[ring.len() - 1]);
    if first != last {
        return Err(WktParseError("POLYGON ring is not closed".into()));
    }
    let envelope = Envelope::of_points(&ring)
        .ok_or_else(|| WktParseError("POLYGON ring is empty".into()))?;
    Ok(Geometry::Polygon { ring, envelope })
}

/// Splits `(..), (..), ..` into the parenthesized ring bodies.
fn split_rings(body: &str) -> Result<Vec<&str>, WktParseError> {
    let mut rings = Vec::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(WktParseError(format!("expected '(' at '{rest}'")));
        }
        let close = rest
            .find(')')
            .ok_or_else(|| WktParseError(format!("unclosed ring at '{rest}'")))?;
        rings.push(&rest[1..close]);
        rest = rest[close + 1..].trim_start();
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped.trim_start();
        } else if !rest.is_empty() {
            return Err(WktParseError(format!("unexpected text '{rest}'")));
        }
    }
    Ok(rings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point() {
        let geom = parse("POINT (1.5 -2)").unwrap();
        assert_eq!(geom, Geometry::Point(Point { x: 1.5, y: -2.0 }));
        assert_eq!(geom.to_wkt(), "POINT (1.5 -2)");
    }

    #[test]
    fn parses_point_without_space_after_keyword() {
        let geom = parse("point(3 4)").unwrap();
        assert_eq!(geom.envelope(), Envelope::new(3.0, 4.0, 3.0, 4.0));
    }

    #[test]
    fn parses_envelope_in_cql_order() {
        let geom = parse("ENVELOPE (0, 10, 20, 5)").unwrap();
        assert_eq!(
            geom,
            Geometry::Envelope(Envelope {
                min_x: 0.0,
                min_y: 5.0,
                max_x: 10.0,
                max_y: 20.0,
            })
        );
    }

    #[test]
    fn parses_polygon_outer_ring() {
        let geom = parse("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))").unwrap();
        assert_eq!(geom.envelope(), Envelope::new(0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn polygon_holes_are_ignored() {
        let geom = parse("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0), (1 1, 2 1, 2 2, 1 1))").unwrap();
        match geom {
            Geometry::Polygon { ring, .. } => assert_eq!(ring.len(), 5),
            other => panic!("unexpected geometry: {other:?}"),
        }
    }

    #[test]
    fn rejects_open_ring() {
        assert!(parse("POLYGON ((0 0, 4 0, 4 4, 0 4))").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("POINT (1)").is_err());
        assert!(parse("CIRCLE (0 0 5)").is_err());
        assert!(parse("POINT (a b)").is_err());
        assert!(parse("POINT 1 1").is_err());
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        assert!(parse("POINT (NaN 1)").is_err());
        assert!(parse("POINT (1 inf)").is_err());
        assert!(parse("POINT (-inf 0)").is_err());
        assert!(parse("ENVELOPE (0, 10, infinity, 0)").is_err());
    }

    #[test]
    fn envelope_relations() {
        let outer = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let inner = Envelope::new(2.0, 2.0, 3.0, 3.0);
        let crossing = Envelope::new(8.0, 8.0, 12.0, 12.0);
        let outside = Envelope::new(20.0, 20.0, 30.0, 30.0);
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&crossing));
        assert!(outer.intersects(&crossing));
        assert!(!outer.intersects(&outside));
        assert!(outer.intersects(&inner));
    }
}
