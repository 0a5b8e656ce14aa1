//! Polygon geometry as seen by the scan engine.

use serde::Serialize;

use crate::error::{PgrdError, Result};

/// A polygon vertex in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Latitude/longitude bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Extent {
    pub const EMPTY: Extent = Extent {
        min_lat: f64::INFINITY,
        min_lon: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
        max_lon: f64::NEG_INFINITY,
    };

    /// Bounds of a set of points; `EMPTY` when there are none.
    pub fn of_points<'a, I: IntoIterator<Item = &'a GeoPoint>>(points: I) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.include(*p))
    }

    #[inline]
    pub fn include(self, p: GeoPoint) -> Self {
        Self {
            min_lat: self.min_lat.min(p.lat),
            min_lon: self.min_lon.min(p.lon),
            max_lat: self.max_lat.max(p.lat),
            max_lon: self.max_lon.max(p.lon),
        }
    }

    #[inline]
    pub fn union(self, other: Extent) -> Self {
        Self {
            min_lat: self.min_lat.min(other.min_lat),
            min_lon: self.min_lon.min(other.min_lon),
            max_lat: self.max_lat.max(other.max_lat),
            max_lon: self.max_lon.max(other.max_lon),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.min_lat <= self.max_lat && self.min_lon <= self.max_lon)
    }
}

/// Random-access view of a polygon dataset.
///
/// Records are polygons, parts are rings, points are `(lat, lon)` pairs. Every
/// method fails with [`PgrdError::Bounds`] on an invalid index; ring reads may
/// also fail with [`PgrdError::GeometryRead`].
pub trait GeometrySource {
    fn record_count(&self) -> usize;

    fn bounding_box(&self, record: usize) -> Result<Extent>;

    fn part_count(&self, record: usize) -> Result<usize>;

    fn part_point_count(&self, record: usize, part: usize) -> Result<usize>;

    fn point(&self, record: usize, part: usize, index: usize) -> Result<GeoPoint>;

    /// Dataset-wide bounds, written into the grid file header.
    fn extent(&self) -> Result<Extent> {
        let mut extent = Extent::EMPTY;
        for record in 0..self.record_count() {
            if let Ok(bbox) = self.bounding_box(record) {
                extent = extent.union(bbox);
            }
        }
        Ok(extent)
    }

    /// All points of one ring, in file order.
    fn ring(&self, record: usize, part: usize) -> Result<Vec<GeoPoint>> {
        let count = self.part_point_count(record, part)?;
        (0..count).map(|i| self.point(record, part, i)).collect()
    }
}

/// One polygon record: an outer ring plus any holes or islands.
#[derive(Debug, Clone, Default)]
pub struct Polygon {
    pub rings: Vec<Vec<GeoPoint>>,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<GeoPoint>>) -> Self {
        Self { rings }
    }

    /// Builds a single-ring polygon from `(lat, lon)` pairs.
    pub fn from_ring(points: &[(f64, f64)]) -> Self {
        Self {
            rings: vec![points.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect()],
        }
    }

    pub fn extent(&self) -> Extent {
        Extent::of_points(self.rings.iter().flatten())
    }
}

/// In-memory polygon dataset.
#[derive(Debug, Clone, Default)]
pub struct PolygonSet {
    polygons: Vec<Polygon>,
}

impl PolygonSet {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn push(&mut self, polygon: Polygon) {
        self.polygons.push(polygon);
    }

    fn polygon(&self, record: usize) -> Result<&Polygon> {
        self.polygons
            .get(record)
            .ok_or_else(|| PgrdError::bounds("record", record, self.polygons.len()))
    }

    fn ring_slice(&self, record: usize, part: usize) -> Result<&[GeoPoint]> {
        let polygon = self.polygon(record)?;
        polygon
            .rings
            .get(part)
            .map(Vec::as_slice)
            .ok_or_else(|| PgrdError::bounds("part", part, polygon.rings.len()))
    }
}

impl GeometrySource for PolygonSet {
    fn record_count(&self) -> usize {
        self.polygons.len()
    }

    fn bounding_box(&self, record: usize) -> Result<Extent> {
        Ok(self.polygon(record)?.extent())
    }

    fn part_count(&self, record: usize) -> Result<usize> {
        Ok(self.polygon(record)?.rings.len())
    }

    fn part_point_count(&self, record: usize, part: usize) -> Result<usize> {
        Ok(self.ring_slice(record, part)?.len())
    }

    fn point(&self, record: usize, part: usize, index: usize) -> Result<GeoPoint> {
        let ring = self.ring_slice(record, part)?;
        ring.get(index)
            .copied()
            .ok_or_else(|| PgrdError::bounds("point", index, ring.len()))
    }

    fn ring(&self, record: usize, part: usize) -> Result<Vec<GeoPoint>> {
        Ok(self.ring_slice(record, part)?.to_vec())
    }
}
