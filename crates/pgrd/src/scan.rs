//! Latitude scan over a polygon dataset.
//!
//! Two queries per latitude line:
//!
//! * [`ScanEngine::enclosing`]: records whose bounding box spans the line,
//!   answered from an index sorted by minimum latitude (binary search for the
//!   last box starting below the line, then a bounded linear scan);
//! * [`ScanEngine::interior_intervals`]: the longitude ranges where the line
//!   lies inside one record, by even-odd pairing of ring crossings.
//!
//! Crossing rules, applied per edge `cur -> next` with `prev` the vertex
//! before `cur`:
//!
//! * the edge crosses when `cur.lat >= L > next.lat` or `cur.lat <= L < next.lat`;
//! * a vertex lying on the line that is a strict latitude extremum of its
//!   neighbours is dropped;
//! * `prev.lon == cur.lon` takes `prev.lon` directly;
//! * `prev.lat == cur.lat` is dropped;
//! * otherwise the crossing is interpolated along `cur -> next`;
//! * longitudes outside `[-180, 180]` are dropped.
//!
//! These are kept exactly as stated even though they can miscount crossings
//! at reflex vertices; an odd crossing count simply loses its last value.

use log::debug;

use crate::audit::AuditSink;
use crate::error::Result;
use crate::geometry::{Extent, GeoPoint, GeometrySource};

const MAX_ABS_LON: f64 = 180.0;

/// Bounding box of one record, as stored in the scan index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub record: usize,
    pub extent: Extent,
}

/// One interior longitude interval on a scan line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub west: f64,
    pub east: f64,
}

/// Bounding boxes sorted once by minimum latitude.
#[derive(Debug, Clone, Default)]
pub struct BoxIndex {
    boxes: Vec<BoundingBox>,
}

impl BoxIndex {
    pub fn new(mut boxes: Vec<BoundingBox>) -> Self {
        // Stable: equal min-lats keep record order.
        boxes.sort_by(|a, b| a.extent.min_lat.total_cmp(&b.extent.min_lat));
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Number of leading boxes whose minimum latitude is below `lat`.
    #[inline]
    pub fn search_bound(&self, lat: f64) -> usize {
        self.boxes.partition_point(|b| b.extent.min_lat < lat)
    }

    /// Records whose box satisfies `min_lat < lat <= max_lat`, in index order.
    pub fn enclosing(&self, lat: f64) -> Vec<usize> {
        self.boxes[..self.search_bound(lat)]
            .iter()
            .filter(|b| b.extent.max_lat >= lat)
            .map(|b| b.record)
            .collect()
    }
}

/// Scan engine bound to one geometry source.
pub struct ScanEngine<'a, S: ?Sized> {
    source: &'a S,
    index: BoxIndex,
}

impl<'a, S: GeometrySource + ?Sized> ScanEngine<'a, S> {
    /// Builds the bounding box index. Records without a readable box are
    /// reported to `audit` and never returned by [`enclosing`](Self::enclosing).
    pub fn new(source: &'a S, audit: &mut dyn AuditSink) -> Self {
        let count = source.record_count();
        let mut boxes = Vec::with_capacity(count);
        for record in 0..count {
            match source.bounding_box(record) {
                Ok(extent) => boxes.push(BoundingBox { record, extent }),
                Err(err) => audit.record(&format!(
                    "record {record}: no bounding box, left out of the scan: {err}"
                )),
            }
        }
        debug!("scan index: {} of {} records", boxes.len(), count);

        Self {
            source,
            index: BoxIndex::new(boxes),
        }
    }

    pub fn index(&self) -> &BoxIndex {
        &self.index
    }

    pub fn enclosing(&self, lat: f64) -> Vec<usize> {
        self.index.enclosing(lat)
    }

    /// Interior intervals of `record` on latitude `lat`, west to east.
    ///
    /// A ring that cannot be read is reported to `audit` and contributes no
    /// crossings. Fails only when the record's part count is unavailable.
    pub fn interior_intervals(
        &self,
        record: usize,
        lat: f64,
        audit: &mut dyn AuditSink,
    ) -> Result<Vec<Interval>> {
        let parts = self.source.part_count(record)?;
        let mut crossings = Vec::new();

        for part in 0..parts {
            match self.source.ring(record, part) {
                Ok(ring) => ring_crossings(&ring, lat, &mut crossings),
                Err(err) => audit.record(&format!(
                    "record {record}, ring {part}: skipped at latitude {lat}: {err}"
                )),
            }
        }

        Ok(pair_crossings(crossings))
    }
}

/// Appends the valid crossings of one ring with latitude `lat` to `out`.
///
/// A closed ring (first point repeated as last) is walked over its distinct
/// vertices, so open and closed forms agree.
pub fn ring_crossings(ring: &[GeoPoint], lat: f64, out: &mut Vec<f64>) {
    let n = match ring {
        [first, .., last] if first == last => ring.len() - 1,
        _ => ring.len(),
    };
    if n < 2 {
        return;
    }
    let vertices = &ring[..n];

    for i in 0..n {
        let prev = vertices[(i + n - 1) % n];
        let cur = vertices[i];
        let next = vertices[(i + 1) % n];

        if crosses(lat, cur, next) {
            if let Some(lon) = crossing_lon(lat, prev, cur, next) {
                out.push(lon);
            }
        }
    }
}

#[inline]
fn crosses(lat: f64, cur: GeoPoint, next: GeoPoint) -> bool {
    (cur.lat >= lat && next.lat < lat) || (cur.lat <= lat && next.lat > lat)
}

/// Longitude where edge `cur -> next` meets `lat`, or `None` when the
/// degeneracy rules drop it.
fn crossing_lon(lat: f64, prev: GeoPoint, cur: GeoPoint, next: GeoPoint) -> Option<f64> {
    if lat == cur.lat {
        let above = prev.lat > cur.lat && next.lat > cur.lat;
        let below = prev.lat < cur.lat && next.lat < cur.lat;
        if above || below {
            return None;
        }
    }

    let lon = if prev.lon == cur.lon {
        prev.lon
    } else if prev.lat == cur.lat {
        return None;
    } else {
        (next.lon - cur.lon) / (next.lat - cur.lat) * (lat - cur.lat) + cur.lon
    };

    (lon.abs() <= MAX_ABS_LON).then_some(lon)
}

/// Sorts crossings and pairs them into intervals; an odd trailing value is
/// dropped.
pub fn pair_crossings(mut crossings: Vec<f64>) -> Vec<Interval> {
    crossings.sort_by(f64::total_cmp);
    crossings
        .chunks_exact(2)
        .map(|pair| Interval {
            west: pair[0],
            east: pair[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Polygon, PolygonSet};

    fn pts(coords: &[(f64, f64)]) -> Vec<GeoPoint> {
        coords.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect()
    }

    /// Closed diamond with vertices `radius` away from the centre.
    fn diamond(lat: f64, lon: f64, radius: f64) -> Polygon {
        Polygon::from_ring(&[
            (lat - radius, lon),
            (lat, lon + radius),
            (lat + radius, lon),
            (lat, lon - radius),
            (lat - radius, lon),
        ])
    }

    fn bbox(record: usize, min_lat: f64, max_lat: f64) -> BoundingBox {
        BoundingBox {
            record,
            extent: Extent {
                min_lat,
                min_lon: 0.0,
                max_lat,
                max_lon: 1.0,
            },
        }
    }

    #[test]
    fn enclosing_is_a_half_open_stab() {
        let index = BoxIndex::new(vec![
            bbox(0, 0.0, 10.0),
            bbox(1, 5.0, 6.0),
            bbox(2, 6.0, 8.0),
            bbox(3, 20.0, 30.0),
        ]);

        assert_eq!(index.enclosing(6.0), vec![0, 1]);
        assert_eq!(index.enclosing(0.0), Vec::<usize>::new());
        assert_eq!(index.enclosing(7.5), vec![0, 2]);
        assert_eq!(index.enclosing(10.0), vec![0]);
        assert!(index.enclosing(-1.0).is_empty());
        assert!(index.enclosing(15.0).is_empty());
        assert_eq!(index.enclosing(30.0), vec![3]);
    }

    #[test]
    fn enclosing_contents_do_not_depend_on_input_order() {
        let boxes = vec![
            bbox(0, 3.0, 9.0),
            bbox(1, -2.0, 4.0),
            bbox(2, 1.0, 2.0),
            bbox(3, 3.5, 3.6),
            bbox(4, -10.0, 10.0),
        ];
        let mut reversed = boxes.clone();
        reversed.reverse();

        let a = BoxIndex::new(boxes.clone());
        let b = BoxIndex::new(reversed);

        for step in -24..=24 {
            let lat = step as f64 * 0.5;
            let mut x = a.enclosing(lat);
            let mut y = b.enclosing(lat);
            x.sort_unstable();
            y.sort_unstable();
            assert_eq!(x, y, "lat {lat}");

            let brute: Vec<usize> = boxes
                .iter()
                .filter(|b| b.extent.min_lat < lat && lat <= b.extent.max_lat)
                .map(|b| b.record)
                .collect();
            assert_eq!(x, brute, "lat {lat}");
        }
    }

    #[test]
    fn diamond_yields_one_interval() {
        let set = PolygonSet::new(vec![diamond(2.0, 2.0, 2.0)]);
        let mut audit = Vec::new();
        let engine = ScanEngine::new(&set, &mut audit);

        let intervals = engine.interior_intervals(0, 1.0, &mut audit).unwrap();
        assert_eq!(intervals, vec![Interval { west: 1.0, east: 3.0 }]);

        // Through the side vertices.
        let intervals = engine.interior_intervals(0, 2.0, &mut audit).unwrap();
        assert_eq!(intervals, vec![Interval { west: 0.0, east: 4.0 }]);
        assert!(audit.is_empty());
    }

    #[test]
    fn hole_splits_the_line() {
        let set = PolygonSet::new(vec![Polygon::new(vec![
            diamond(5.0, 5.0, 5.0).rings.remove(0),
            diamond(5.0, 5.0, 1.0).rings.remove(0),
        ])]);
        let mut audit = Vec::new();
        let engine = ScanEngine::new(&set, &mut audit);

        let intervals = engine.interior_intervals(0, 5.0, &mut audit).unwrap();
        assert_eq!(
            intervals,
            vec![
                Interval { west: 0.0, east: 4.0 },
                Interval { west: 6.0, east: 10.0 },
            ]
        );
    }

    #[test]
    fn open_and_closed_rings_agree() {
        let closed = pts(&[(0.0, 0.0), (4.0, 2.0), (1.0, 4.0), (0.0, 0.0)]);
        let open = pts(&[(0.0, 0.0), (4.0, 2.0), (1.0, 4.0)]);

        let mut a = Vec::new();
        let mut b = Vec::new();
        ring_crossings(&closed, 1.0, &mut a);
        ring_crossings(&open, 1.0, &mut b);
        assert_eq!(a, b);
        assert_eq!(a, vec![0.5, 4.0]);
    }

    #[test]
    fn interpolates_sloped_edges() {
        let ring = pts(&[(0.0, 0.0), (4.0, 2.0), (-4.0, 4.0)]);
        let mut out = Vec::new();
        ring_crossings(&ring, 2.0, &mut out);
        out.sort_by(f64::total_cmp);
        assert_eq!(out, vec![1.0, 2.5]);
    }

    #[test]
    fn axis_aligned_corners_lose_their_crossings() {
        // Each crossing edge of a lat/lon rectangle follows a horizontal
        // edge, which the degeneracy rules drop.
        let ring = pts(&[(0.0, 10.0), (4.0, 10.0), (4.0, 14.0), (0.0, 14.0), (0.0, 10.0)]);
        let mut out = Vec::new();
        ring_crossings(&ring, 2.0, &mut out);
        assert!(out.is_empty(), "{out:?}");
    }

    #[test]
    fn touching_extremum_vertex_is_not_a_crossing() {
        // Diamond whose top vertex touches lat 4.
        let ring = pts(&[(0.0, 2.0), (2.0, 4.0), (4.0, 2.0), (2.0, 0.0)]);
        let mut out = Vec::new();
        ring_crossings(&ring, 4.0, &mut out);
        assert!(out.is_empty(), "{out:?}");
    }

    #[test]
    fn horizontal_edge_before_vertex_is_dropped() {
        // prev -> cur is horizontal on the scanline: cur's crossing is discarded.
        let prev = GeoPoint::new(1.0, 0.0);
        let cur = GeoPoint::new(1.0, 2.0);
        let next = GeoPoint::new(0.0, 3.0);
        assert_eq!(crossing_lon(1.0, prev, cur, next), None);
    }

    #[test]
    fn vertical_shortcut_uses_previous_longitude() {
        let prev = GeoPoint::new(0.0, 5.0);
        let cur = GeoPoint::new(2.0, 5.0);
        let next = GeoPoint::new(4.0, 9.0);
        assert_eq!(crossing_lon(3.0, prev, cur, next), Some(5.0));
    }

    #[test]
    fn out_of_range_longitudes_are_dropped() {
        let prev = GeoPoint::new(-1.0, 170.0);
        let cur = GeoPoint::new(0.0, 179.0);
        let next = GeoPoint::new(2.0, 185.0);
        assert_eq!(crossing_lon(1.5, prev, cur, next), None);
    }

    #[test]
    fn crossings_are_even_in_general_position() {
        let rings = [
            pts(&[(0.0, 0.0), (3.0, 1.0), (5.0, 4.0), (2.0, 6.0), (-1.0, 3.0)]),
            pts(&[(10.0, 10.0), (12.5, 10.5), (11.0, 13.0)]),
        ];
        for ring in &rings {
            let extent = Extent::of_points(ring);
            for k in 0..40 {
                let t = (k as f64 + 0.5) / 40.0;
                let lat = extent.min_lat + (extent.max_lat - extent.min_lat) * t;
                let mut out = Vec::new();
                ring_crossings(ring, lat, &mut out);
                assert_eq!(out.len() % 2, 0, "lat {lat}: {out:?}");
            }
        }
    }

    #[test]
    fn odd_crossing_count_drops_the_last_value() {
        assert_eq!(
            pair_crossings(vec![3.0, 1.0, 2.0]),
            vec![Interval { west: 1.0, east: 2.0 }]
        );
        assert!(pair_crossings(vec![7.0]).is_empty());
    }

    #[test]
    fn unreadable_records_are_left_out_of_the_index() {
        struct Holey(PolygonSet);

        impl GeometrySource for Holey {
            fn record_count(&self) -> usize {
                self.0.record_count() + 1
            }
            fn bounding_box(&self, record: usize) -> Result<Extent> {
                if record == self.0.record_count() {
                    return Err(crate::PgrdError::GeometryRead {
                        record,
                        part: None,
                        detail: "null shape".into(),
                    });
                }
                self.0.bounding_box(record)
            }
            fn part_count(&self, record: usize) -> Result<usize> {
                self.0.part_count(record)
            }
            fn part_point_count(&self, record: usize, part: usize) -> Result<usize> {
                self.0.part_point_count(record, part)
            }
            fn point(&self, record: usize, part: usize, index: usize) -> Result<GeoPoint> {
                self.0.point(record, part, index)
            }
        }

        let source = Holey(PolygonSet::new(vec![diamond(0.0, 0.0, 1.0)]));
        let mut audit = Vec::new();
        let engine = ScanEngine::new(&source, &mut audit);

        assert_eq!(engine.index().len(), 1);
        assert_eq!(audit.len(), 1);
        assert!(audit[0].starts_with("record 1:"));
    }

    #[test]
    fn unreadable_ring_is_dropped_and_the_record_kept() {
        /// Ring 1 of every record fails on its points.
        struct BrokenHole(PolygonSet);

        impl GeometrySource for BrokenHole {
            fn record_count(&self) -> usize {
                self.0.record_count()
            }
            fn bounding_box(&self, record: usize) -> Result<Extent> {
                self.0.bounding_box(record)
            }
            fn part_count(&self, record: usize) -> Result<usize> {
                self.0.part_count(record)
            }
            fn part_point_count(&self, record: usize, part: usize) -> Result<usize> {
                self.0.part_point_count(record, part)
            }
            fn point(&self, record: usize, part: usize, index: usize) -> Result<GeoPoint> {
                if part == 1 {
                    return Err(crate::PgrdError::GeometryRead {
                        record,
                        part: Some(part),
                        detail: "truncated point table".into(),
                    });
                }
                self.0.point(record, part, index)
            }
        }

        let source = BrokenHole(PolygonSet::new(vec![Polygon::new(vec![
            diamond(5.0, 5.0, 5.0).rings.remove(0),
            diamond(5.0, 5.0, 1.0).rings.remove(0),
        ])]));
        let mut audit = Vec::new();
        let engine = ScanEngine::new(&source, &mut audit);
        assert!(audit.is_empty());

        let intervals = engine.interior_intervals(0, 5.0, &mut audit).unwrap();
        assert_eq!(intervals, vec![Interval { west: 0.0, east: 10.0 }]);
        assert_eq!(audit.len(), 1);
        assert!(
            audit[0].starts_with("record 0, ring 1: skipped at latitude 5:"),
            "{audit:?}"
        );
    }
}
