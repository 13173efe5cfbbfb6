//! Real Hanoi / Ha Long / Hoi An locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap via Overpass API. These are real
//! points of interest; the service durations and tags are test fixtures,
//! not sourced data.

use daytrip_planner::model::{GeoPoint, PlanNode, PlanNodeConstraints, PlanNodeMeta, PlanNodeType};

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn geo(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

// ============================================================================
// Hanoi Old Quarter (good for depot / first-stop locations)
// ============================================================================

pub const OLD_QUARTER: &[Location] = &[
    Location::new("Hoan Kiem Lake", 21.0285, 105.8524),
    Location::new("Ngoc Son Temple", 21.0301, 105.8524),
    Location::new("Dong Xuan Market", 21.0361, 105.8497),
    Location::new("St. Joseph's Cathedral", 21.0294, 105.8490),
    Location::new("Hanoi Train Street", 21.0263, 105.8421),
];

// ============================================================================
// Hanoi Cultural / Historic Sites
// ============================================================================

pub const HANOI_LANDMARKS: &[Location] = &[
    Location::new("Ho Chi Minh Mausoleum", 21.0369, 105.8346),
    Location::new("One Pillar Pagoda", 21.0358, 105.8339),
    Location::new("Temple of Literature", 21.0277, 105.8355),
    Location::new("Imperial Citadel of Thang Long", 21.0347, 105.8398),
    Location::new("Vietnam Museum of Ethnology", 21.0389, 105.7999),
    Location::new("Tran Quoc Pagoda", 21.0473, 105.8390),
    Location::new("West Lake", 21.0570, 105.8200),
];

// ============================================================================
// Hanoi Food / Markets
// ============================================================================

pub const HANOI_FOOD: &[Location] = &[
    Location::new("Bun Cha Huong Lien", 21.0212, 105.8480),
    Location::new("Pho Gia Truyen", 21.0341, 105.8496),
    Location::new("Banh Mi 25", 21.0313, 105.8510),
    Location::new("Cha Ca La Vong", 21.0338, 105.8489),
    Location::new("Egg Coffee Giang Cafe", 21.0344, 105.8467),
];

// ============================================================================
// Ha Long Bay Area
// ============================================================================

pub const HA_LONG: &[Location] = &[
    Location::new("Ha Long Bay Pier", 20.9515, 107.0797),
    Location::new("Sung Sot Cave", 20.8958, 107.0772),
    Location::new("Ti Top Island", 20.8892, 107.0869),
    Location::new("Bai Tho Mountain", 20.9573, 107.0835),
];

// ============================================================================
// Hoi An Old Town
// ============================================================================

pub const HOI_AN: &[Location] = &[
    Location::new("Japanese Covered Bridge", 15.8767, 108.3260),
    Location::new("Hoi An Central Market", 15.8785, 108.3292),
    Location::new("Tan Ky Old House", 15.8771, 108.3276),
    Location::new("An Bang Beach", 15.9167, 108.3450),
    Location::new("Hoi An Night Market", 15.8775, 108.3300),
];

/// Returns all locations as a single slice.
pub fn all_locations() -> Vec<Location> {
    let mut all = Vec::with_capacity(30);
    all.extend_from_slice(OLD_QUARTER);
    all.extend_from_slice(HANOI_LANDMARKS);
    all.extend_from_slice(HANOI_FOOD);
    all.extend_from_slice(HA_LONG);
    all.extend_from_slice(HOI_AN);
    all
}

/// Locations spread across the Hanoi metro area, good for corridor/region
/// gating tests (they are not all reachable within a single-day buffer).
pub fn geographically_diverse_locations() -> Vec<Location> {
    vec![
        Location::new("Hoan Kiem Lake", 21.0285, 105.8524),
        Location::new("Ho Chi Minh Mausoleum", 21.0369, 105.8346),
        Location::new("West Lake", 21.0570, 105.8200),
        Location::new("Ha Long Bay Pier", 20.9515, 107.0797),
        Location::new("Japanese Covered Bridge", 15.8767, 108.3260),
    ]
}

/// Builds a [`PlanNode`] from a fixture location with an all-day window and
/// no hard constraints, for tests that only care about travel geometry.
pub fn plan_node(id: &str, location: &Location, duration_min: i32) -> PlanNode {
    PlanNode {
        id: id.to_string(),
        name: location.name.to_string(),
        node_type: PlanNodeType::Poi,
        geo: location.geo(),
        service_duration_min: duration_min,
        time_windows: vec![(0, 24 * 3600)],
        constraints: PlanNodeConstraints::default(),
        meta: PlanNodeMeta::default(),
    }
}

/// Like [`plan_node`] but marked as a hard (must-visit) node with the given
/// time window.
pub fn hard_plan_node(id: &str, location: &Location, duration_min: i32, window: (i32, i32)) -> PlanNode {
    PlanNode {
        constraints: PlanNodeConstraints {
            is_hard_node: true,
            priority_level: 1,
            drop_penalty: None,
            reward: Some(100.0),
        },
        time_windows: vec![window],
        ..plan_node(id, location, duration_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_locations_count() {
        let all = all_locations();
        assert!(all.len() >= 25, "should have at least 25 locations, got {}", all.len());
    }

    #[test]
    fn test_coordinates_in_vietnam() {
        for loc in all_locations() {
            assert!(loc.lat > 14.0 && loc.lat < 22.0, "{} lat out of range: {}", loc.name, loc.lat);
            assert!(loc.lng > 104.0 && loc.lng < 109.5, "{} lng out of range: {}", loc.name, loc.lng);
        }
    }
}
