//! Search footprints for the supported regions of Morocco.
//!
//! Each footprint is a closed rectangular ring of (longitude, latitude) pairs in WGS84.

use std::fmt;

pub const REGION_NAMES: [&str; 3] = ["north", "central", "south"];

const NORTH: [(f64, f64); 5] = [
    (-9.5, 35.922618),
    (-0.998429, 35.922618),
    (-0.998429, 32.0),
    (-9.5, 32.0),
    (-9.5, 35.922618),
];

const CENTRAL: [(f64, f64); 5] = [
    (-13.168555, 32.0),
    (-0.998429, 32.0),
    (-0.998429, 28.0),
    (-13.168555, 28.0),
    (-13.168555, 32.0),
];

const SOUTH: [(f64, f64); 5] = [
    (-17.10, 28.0),
    (-8.5, 28.0),
    (-8.5, 20.70),
    (-17.10, 20.70),
    (-17.10, 28.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    pub fn is_closed(&self) -> bool {
        self.ring.len() >= 4 && self.ring.first() == self.ring.last()
    }

    /// Well-known text, e.g. `POLYGON ((-9.5 35.922618, ...))`.
    pub fn to_wkt(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let points: Vec<String> = self
            .ring
            .iter()
            .map(|(lon, lat)| format!("{} {}", lon, lat))
            .collect();
        write!(f, "POLYGON (({}))", points.join(", "))
    }
}

pub fn polygon(region: &str) -> Option<Polygon> {
    let ring = match region {
        "north" => NORTH,
        "central" => CENTRAL,
        "south" => SOUTH,
        _ => return None,
    };
    Some(Polygon { ring: ring.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_regions_are_closed_rings() {
        for name in REGION_NAMES {
            let poly = polygon(name).unwrap();
            assert_eq!(poly.ring().len(), 5, "{}", name);
            assert_eq!(poly.ring().first(), poly.ring().last(), "{}", name);
            assert!(poly.is_closed());
        }
    }

    #[test]
    fn test_unknown_region() {
        assert!(polygon("east").is_none());
        assert!(polygon("North").is_none());
    }

    #[test]
    fn test_wkt() {
        let wkt = polygon("north").unwrap().to_wkt();
        assert_eq!(
            wkt,
            "POLYGON ((-9.5 35.922618, -0.998429 35.922618, -0.998429 32, -9.5 32, -9.5 35.922618))"
        );
    }
}
