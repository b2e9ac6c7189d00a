//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic, projected, or pixel-space bounding box.
///
/// For geographic CRS (EPSG:4326), coordinates are in degrees.
/// For projected CRS (EPSG:3857), coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a bounding box from edges in either orientation.
    ///
    /// Callers may submit `left/right` and `bottom/top` swapped; the result
    /// always has `min <= max` on both axes.
    pub fn normalized(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            min_x: left.min(right),
            min_y: bottom.min(top),
            max_x: left.max(right),
            max_y: bottom.max(top),
        }
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_accepts_swapped_edges() {
        let a = BoundingBox::normalized(-77.0, -78.0, 25.0, 24.0);
        let b = BoundingBox::normalized(-78.0, -77.0, 24.0, 25.0);
        assert_eq!(a, b);
        assert_eq!(a.min_x, -78.0);
        assert_eq!(a.max_y, 25.0);
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let intersection = a.intersection(&b).unwrap();
        assert_eq!(intersection.min_x, 5.0);
        assert_eq!(intersection.min_y, 5.0);
        assert_eq!(intersection.max_x, 10.0);
        assert_eq!(intersection.max_y, 10.0);
    }

    #[test]
    fn test_contains_point() {
        let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
        assert!(bbox.contains_point(0.0, 0.0));
        assert!(bbox.contains_point(-180.0, 90.0));
        assert!(!bbox.contains_point(-181.0, 0.0));
    }
}
