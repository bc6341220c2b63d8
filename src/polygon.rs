use crate::geometry::{PromptPoint, RingPoint};
use crate::session::SessionError;
use serde::{Deserialize, Serialize};

/// Registry-unique polygon identifier from a monotonic counter.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PolygonId(pub u64);

/// Axis-aligned bounds of a ring, used to reject hit-test misses cheaply.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RingBounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl RingBounds {
    fn for_ring(ring: &[RingPoint]) -> Self {
        if ring.is_empty() {
            return Self {
                x: 0.0,
                y: 0.0,
                w: 0.0,
                h: 0.0,
            };
        }

        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for p in ring {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Self {
            x: min_x,
            y: min_y,
            w: (max_x - min_x).max(0.0),
            h: (max_y - min_y).max(0.0),
        }
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.w && y >= self.y && y <= self.y + self.h
    }
}

/// A committed segmentation result: a closed boundary ring in logical image
/// space plus the prompt set that produced it (empty for auto-segmented
/// polygons).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Polygon {
    pub id: PolygonId,
    pub ring: Vec<RingPoint>,
    pub bbox: RingBounds,
    pub origin_prompt: Vec<PromptPoint>,
}

impl Polygon {
    pub fn new(id: PolygonId, ring: Vec<RingPoint>, origin_prompt: Vec<PromptPoint>) -> Self {
        let bbox = RingBounds::for_ring(&ring);
        Self {
            id,
            ring,
            bbox,
            origin_prompt,
        }
    }

    /// Even-odd ray-casting containment test against the ring edges, with
    /// the final edge implicitly closing the ring. Points exactly on the
    /// boundary have unspecified inside/outside classification.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        if self.ring.len() < 3 || !self.bbox.contains(x, y) {
            return false;
        }
        point_in_ring(x, y, &self.ring)
    }
}

fn point_in_ring(x: f32, y: f32, ring: &[RingPoint]) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Committed polygons keyed by id. Ids stay unique for the registry's
/// lifetime even as polygons are removed and restored.
#[derive(Debug, Default)]
pub struct PolygonRegistry {
    polygons: Vec<Polygon>,
    next_id: u64,
}

impl PolygonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new polygon built from `ring` and return its fresh id.
    pub fn add(&mut self, ring: Vec<RingPoint>, origin_prompt: Vec<PromptPoint>) -> PolygonId {
        let id = PolygonId(self.next_id);
        self.next_id += 1;
        self.polygons.push(Polygon::new(id, ring, origin_prompt));
        id
    }

    pub fn remove(&mut self, id: PolygonId) -> Option<Polygon> {
        let idx = self.polygons.iter().position(|p| p.id == id)?;
        Some(self.polygons.remove(idx))
    }

    /// First polygon (in insertion order) whose ring contains the point.
    pub fn find_containing(&self, x: f32, y: f32) -> Option<&Polygon> {
        self.polygons.iter().find(|p| p.contains(x, y))
    }

    pub fn get(&self, id: PolygonId) -> Option<&Polygon> {
        self.polygons.iter().find(|p| p.id == id)
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn clear(&mut self) {
        self.polygons.clear();
    }

    /// Serialize the committed polygons for a host UI.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(&self.polygons).map_err(|e| SessionError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_ring(x0: f32, y0: f32, side: f32) -> Vec<RingPoint> {
        vec![
            RingPoint::new(x0, y0),
            RingPoint::new(x0 + side, y0),
            RingPoint::new(x0 + side, y0 + side),
            RingPoint::new(x0, y0 + side),
        ]
    }

    #[test]
    fn hit_test_uses_even_odd_rule() {
        let poly = Polygon::new(PolygonId(0), square_ring(10.0, 10.0, 20.0), Vec::new());
        assert!(poly.contains(20.0, 20.0));
        assert!(!poly.contains(5.0, 20.0));
        assert!(!poly.contains(20.0, 35.0));
    }

    #[test]
    fn bbox_rejects_far_points() {
        let poly = Polygon::new(PolygonId(0), square_ring(0.0, 0.0, 10.0), Vec::new());
        assert!(!poly.contains(500.0, 500.0));
    }

    #[test]
    fn degenerate_rings_contain_nothing() {
        let point_ring = Polygon::new(PolygonId(0), vec![RingPoint::new(3.0, 3.0)], Vec::new());
        assert!(!point_ring.contains(3.0, 3.0));
    }

    #[test]
    fn find_containing_is_idempotent() {
        let mut registry = PolygonRegistry::new();
        let id = registry.add(square_ring(0.0, 0.0, 100.0), Vec::new());
        registry.add(square_ring(200.0, 200.0, 50.0), Vec::new());

        let first = registry.find_containing(50.0, 50.0).map(|p| p.id);
        let second = registry.find_containing(50.0, 50.0).map(|p| p.id);
        assert_eq!(first, Some(id));
        assert_eq!(first, second);
        assert!(registry.find_containing(150.0, 150.0).is_none());
    }

    #[test]
    fn ids_stay_unique_after_removal() {
        let mut registry = PolygonRegistry::new();
        let a = registry.add(square_ring(0.0, 0.0, 10.0), Vec::new());
        registry.remove(a).unwrap();
        let b = registry.add(square_ring(0.0, 0.0, 10.0), Vec::new());
        assert_ne!(a, b);
    }

    #[test]
    fn json_export_round_trips() {
        let mut registry = PolygonRegistry::new();
        registry.add(square_ring(1.0, 2.0, 3.0), vec![PromptPoint::positive(2.0, 3.0)]);

        let json = registry.to_json().unwrap();
        let parsed: Vec<Polygon> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].ring, registry.polygons()[0].ring);
        assert_eq!(parsed[0].origin_prompt, registry.polygons()[0].origin_prompt);
    }
}
