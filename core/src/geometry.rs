use serde::{Deserialize, Serialize};

/// 2-D point in metres. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Circular coverage area: centre plus radius in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircularRegion {
    pub center: Coordinate,
    pub radius: f64,
}

impl CircularRegion {
    pub fn new(center: Coordinate, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center.distance(point) <= self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn region_contains_boundary_point() {
        let region = CircularRegion::new(Coordinate::new(0.0, 0.0), 5.0);
        assert!(region.contains(&Coordinate::new(3.0, 4.0)));
        assert!(!region.contains(&Coordinate::new(3.1, 4.0)));
    }
}
