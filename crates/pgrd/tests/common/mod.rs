use std::fs;
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

/// One ring as (x = lon, y = lat) pairs.
pub type Ring = Vec<(f64, f64)>;

/// Closed diamond ring around (lat, lon).
pub fn diamond(lat: f64, lon: f64, radius: f64) -> Ring {
    vec![
        (lon, lat - radius),
        (lon + radius, lat),
        (lon, lat + radius),
        (lon - radius, lat),
        (lon, lat - radius),
    ]
}

/// Closed lat/lon-aligned rectangle.
pub fn rectangle(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Ring {
    vec![
        (min_lon, min_lat),
        (min_lon, max_lat),
        (max_lon, max_lat),
        (max_lon, min_lat),
        (min_lon, min_lat),
    ]
}

fn file_header(extent: [f64; 4], file_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(100);
    out.write_i32::<BigEndian>(9994).unwrap();
    out.resize(24, 0);
    out.write_i32::<BigEndian>((file_len / 2) as i32).unwrap();
    out.write_i32::<LittleEndian>(1000).unwrap();
    out.write_i32::<LittleEndian>(5).unwrap();
    for v in extent {
        out.write_f64::<LittleEndian>(v).unwrap();
    }
    out.resize(100, 0);
    out
}

fn record_content(rings: Option<&[Ring]>) -> Vec<u8> {
    let mut content = Vec::new();
    let Some(rings) = rings else {
        content.write_i32::<LittleEndian>(0).unwrap();
        return content;
    };

    let points: Vec<(f64, f64)> = rings.iter().flatten().copied().collect();
    let (mut xmin, mut ymin, mut xmax, mut ymax) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for &(x, y) in &points {
        xmin = xmin.min(x);
        ymin = ymin.min(y);
        xmax = xmax.max(x);
        ymax = ymax.max(y);
    }

    content.write_i32::<LittleEndian>(5).unwrap();
    for v in [xmin, ymin, xmax, ymax] {
        content.write_f64::<LittleEndian>(v).unwrap();
    }
    content.write_i32::<LittleEndian>(rings.len() as i32).unwrap();
    content.write_i32::<LittleEndian>(points.len() as i32).unwrap();
    let mut start = 0;
    for ring in rings {
        content.write_i32::<LittleEndian>(start).unwrap();
        start += ring.len() as i32;
    }
    for (x, y) in points {
        content.write_f64::<LittleEndian>(x).unwrap();
        content.write_f64::<LittleEndian>(y).unwrap();
    }
    content
}

/// Writes `<base>.shp` and `<base>.shx`. `None` records are null shapes.
/// `extent` is `[xmin, ymin, xmax, ymax]`.
pub fn write_shapefile(base: &Path, records: &[Option<Vec<Ring>>], extent: [f64; 4]) {
    let mut body = Vec::new();
    let mut index = Vec::new();

    for (number, record) in records.iter().enumerate() {
        let content = record_content(record.as_deref());
        let offset = 100 + body.len();
        index.write_i32::<BigEndian>((offset / 2) as i32).unwrap();
        index.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        body.write_i32::<BigEndian>(number as i32 + 1).unwrap();
        body.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        body.extend_from_slice(&content);
    }

    let mut shp = file_header(extent, 100 + body.len());
    shp.extend_from_slice(&body);
    let mut shx = file_header(extent, 100 + index.len());
    shx.extend_from_slice(&index);

    fs::write(base.with_extension("shp"), shp).unwrap();
    fs::write(base.with_extension("shx"), shx).unwrap();
}
