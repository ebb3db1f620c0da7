// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Spatial lookup answering "is this point inside any city?".
//!
//! Boundaries are stored in a [Container](crate::Container) as the
//! [SECTION_NAME] section, with the following big-endian layout:
//!
//! - `u8` version (= 1),
//! - `u32` boundary count,
//! - for every boundary: `u32` vertex count (at least 3), then the vertices
//!   as `i32` latitude and `i32` longitude, both in 1e-7 degrees.

use geo::{Coord, Intersects, LineString, Point, Polygon};
use rstar::{RTree, RTreeObject, AABB};

use crate::container::payload::{from_e7, to_e7, Reader, Truncated};
use crate::container::{self, SectionSource};
use crate::LatLon;

pub const SECTION_NAME: &str = "cities_boundaries";

const VERSION: u8 = 1;

/// Error which can occur when decoding city boundaries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] container::Error),

    #[error("unsupported boundaries version: {0}")]
    UnsupportedVersion(u8),

    #[error("boundaries section is truncated")]
    Truncated,

    #[error("boundary {index} has only {vertices} vertices")]
    TooFewVertices { index: usize, vertices: u32 },

    #[error("boundaries section has {0} trailing bytes")]
    TrailingBytes(usize),
}

impl From<Truncated> for Error {
    fn from(_: Truncated) -> Self {
        Error::Truncated
    }
}

/// A single city polygon together with its bounding box.
#[derive(Debug, Clone)]
struct CityBoundary {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl CityBoundary {
    fn new(polygon: Polygon<f64>) -> Option<Self> {
        let mut coords = polygon.exterior().coords();
        let first = coords.next()?;
        let (mut min, mut max) = ([first.x, first.y], [first.x, first.y]);
        for c in coords {
            min = [min[0].min(c.x), min[1].min(c.y)];
            max = [max[0].max(c.x), max[1].max(c.y)];
        }

        Some(Self {
            polygon,
            envelope: AABB::from_corners(min, max),
        })
    }
}

impl RTreeObject for CityBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Immutable set of city boundaries, indexed by an R-tree over their bounding boxes.
///
/// Polygons use `x = longitude` and `y = latitude`. Points on a boundary are
/// considered to be inside the city.
#[derive(Debug)]
pub struct CityBoundariesChecker {
    tree: RTree<CityBoundary>,
}

impl Default for CityBoundariesChecker {
    fn default() -> Self {
        Self { tree: RTree::new() }
    }
}

impl CityBoundariesChecker {
    /// Loads boundaries from the [SECTION_NAME] section of `source`.
    ///
    /// Never fails: a missing or corrupt section results in an empty checker,
    /// for which [in_city](Self::in_city) is always false.
    pub fn load(source: &dyn SectionSource) -> Self {
        let data = match source.read_section(SECTION_NAME) {
            Ok(Some(data)) => data,
            Ok(None) => {
                log::info!("No {} section, city checks are disabled", SECTION_NAME);
                return Self::default();
            }
            Err(e) => {
                log::error!("Failed to read the {} section: {}", SECTION_NAME, e);
                return Self::default();
            }
        };

        match decode_boundaries(&data) {
            Ok(boundaries) => {
                let checker = Self::from_boundaries(boundaries);
                log::debug!("Loaded {} city boundaries", checker.len());
                checker
            }
            Err(e) => {
                log::error!("Corrupt {} section: {}", SECTION_NAME, e);
                Self::default()
            }
        }
    }

    /// Builds the checker from polygons. Polygons without vertices are skipped.
    pub fn from_boundaries(boundaries: Vec<Polygon<f64>>) -> Self {
        let boundaries = boundaries
            .into_iter()
            .filter_map(CityBoundary::new)
            .collect::<Vec<_>>();
        Self {
            tree: RTree::bulk_load(boundaries),
        }
    }

    /// Returns true if `point` lies within (or on the edge of) any city boundary.
    pub fn in_city(&self, point: LatLon) -> bool {
        let p = Point::new(point.lon, point.lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.lon, point.lat]))
            .any(|b| b.polygon.intersects(&p))
    }

    /// Returns the number of boundaries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a boundary polygon from its vertices.
pub fn boundary_polygon(vertices: &[LatLon]) -> Polygon<f64> {
    let ring = vertices
        .iter()
        .map(|v| Coord { x: v.lon, y: v.lat })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(ring), vec![])
}

/// Serializes boundaries into a section payload. Holes are not stored.
pub fn encode_boundaries(boundaries: &[Polygon<f64>]) -> Vec<u8> {
    let mut b = vec![VERSION];
    b.extend_from_slice(&(boundaries.len() as u32).to_be_bytes());

    for polygon in boundaries {
        let ring = open_ring(polygon.exterior());
        b.extend_from_slice(&(ring.len() as u32).to_be_bytes());
        for c in ring {
            b.extend_from_slice(&to_e7(c.y).to_be_bytes());
            b.extend_from_slice(&to_e7(c.x).to_be_bytes());
        }
    }

    b
}

/// Parses a section payload produced by [encode_boundaries].
pub fn decode_boundaries(data: &[u8]) -> Result<Vec<Polygon<f64>>, Error> {
    let mut r = Reader::new(data);
    let version = r.u8()?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let count = r.u32()? as usize;
    let mut boundaries = Vec::with_capacity(count.min(r.remaining() / 28));
    for index in 0..count {
        let vertices = r.u32()?;
        if vertices < 3 {
            return Err(Error::TooFewVertices { index, vertices });
        }
        if vertices as usize > r.remaining() / 8 {
            return Err(Error::Truncated);
        }

        let mut ring = Vec::with_capacity(vertices as usize);
        for _ in 0..vertices {
            let lat = from_e7(r.i32()?);
            let lon = from_e7(r.i32()?);
            ring.push(Coord { x: lon, y: lat });
        }
        boundaries.push(Polygon::new(LineString::new(ring), vec![]));
    }

    if !r.is_empty() {
        return Err(Error::TrailingBytes(r.remaining()));
    }
    Ok(boundaries)
}

/// Returns the ring's coordinates without the closing duplicate of the first vertex.
fn open_ring(ring: &LineString<f64>) -> &[Coord<f64>] {
    let coords = ring.0.as_slice();
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() > 1 && first == last => &coords[..coords.len() - 1],
        _ => coords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Compression, Container};

    fn square(lat: f64, lon: f64, size: f64) -> Polygon<f64> {
        boundary_polygon(&[
            LatLon::new(lat, lon),
            LatLon::new(lat, lon + size),
            LatLon::new(lat + size, lon + size),
            LatLon::new(lat + size, lon),
        ])
    }

    fn sample() -> Vec<Polygon<f64>> {
        vec![
            square(52.1, 20.8, 0.3),
            square(50.0, 19.8, 0.2),
            // A triangle
            boundary_polygon(&[
                LatLon::new(54.3, 18.5),
                LatLon::new(54.5, 18.5),
                LatLon::new(54.3, 18.8),
            ]),
        ]
    }

    #[test]
    fn in_city() {
        let checker = CityBoundariesChecker::from_boundaries(sample());
        assert_eq!(checker.len(), 3);
        assert!(checker.in_city(LatLon::new(52.23, 21.01)));
        assert!(checker.in_city(LatLon::new(50.06, 19.94)));
        assert!(checker.in_city(LatLon::new(54.35, 18.55)));

        // Inside the triangle's bounding box, but not the triangle itself
        assert!(!checker.in_city(LatLon::new(54.48, 18.78)));
        assert!(!checker.in_city(LatLon::new(51.0, 17.0)));
        assert!(!checker.in_city(LatLon::new(-52.23, -21.01)));
    }

    #[test]
    fn boundary_is_inside() {
        let checker = CityBoundariesChecker::from_boundaries(vec![square(0.0, 0.0, 1.0)]);
        assert!(checker.in_city(LatLon::new(0.0, 0.5)));
        assert!(checker.in_city(LatLon::new(1.0, 1.0)));
        assert!(!checker.in_city(LatLon::new(1.0001, 1.0)));
    }

    #[test]
    fn empty_checker() {
        let checker = CityBoundariesChecker::default();
        assert!(checker.is_empty());
        assert!(!checker.in_city(LatLon::new(52.23, 21.01)));
    }

    #[test]
    fn load_from_container() {
        let mut c = Container::new();
        c.insert(SECTION_NAME, &encode_boundaries(&sample()), Compression::Bzip2)
            .unwrap();
        let checker = CityBoundariesChecker::load(&c);
        assert_eq!(checker.len(), 3);
        assert!(checker.in_city(LatLon::new(52.23, 21.01)));
    }

    #[test]
    fn missing_section() {
        let checker = CityBoundariesChecker::load(&Container::new());
        assert!(checker.is_empty());
        assert!(!checker.in_city(LatLon::new(52.23, 21.01)));
    }

    #[test]
    fn corrupt_section() {
        let mut data = encode_boundaries(&sample());
        data.truncate(data.len() - 3);
        let mut c = Container::new();
        c.insert(SECTION_NAME, &data, Compression::Raw).unwrap();

        let checker = CityBoundariesChecker::load(&c);
        assert!(checker.is_empty());
        assert!(!checker.in_city(LatLon::new(52.23, 21.01)));
    }

    #[test]
    fn codec() {
        let encoded = encode_boundaries(&sample());
        // version + count + 2 squares + 1 triangle
        assert_eq!(encoded.len(), 1 + 4 + 2 * (4 + 4 * 8) + (4 + 3 * 8));

        let decoded = decode_boundaries(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(open_ring(decoded[2].exterior()).len(), 3);

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert!(matches!(decode_boundaries(&trailing), Err(Error::TrailingBytes(1))));

        let mut degenerate = vec![VERSION, 0, 0, 0, 1, 0, 0, 0, 2];
        degenerate.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            decode_boundaries(&degenerate),
            Err(Error::TooFewVertices { index: 0, vertices: 2 })
        ));
    }
}
