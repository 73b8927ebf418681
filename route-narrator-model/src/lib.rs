use geo::{line_measures::LengthMeasurable, Coord, Haversine, LineString};
use serde::{Deserialize, Serialize};

/// A point placed by the user. Stored as (lat, lng), the way the browser persisted routes.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
}

impl Waypoint {
    /// Returns `None` unless both coordinates are finite.
    pub fn new(lat: f64, lng: f64) -> Option<Waypoint> {
        if lat.is_finite() && lng.is_finite() {
            Some(Waypoint { lat, lng })
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn to_coord(self) -> Coord {
        Coord {
            x: self.lng,
            y: self.lat,
        }
    }

    pub fn from_coord(c: Coord) -> Waypoint {
        Waypoint { lat: c.y, lng: c.x }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct SavedRoute {
    pub id: i64,
    pub name: String,
    pub waypoints: Vec<Waypoint>,
}

/// One maneuver. A missing distance is `None`, never zero.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Instruction {
    pub text: String,
    pub distance_meters: Option<f64>,
}

impl Instruction {
    /// How the instruction is announced when a route is first resolved.
    pub fn announcement(&self) -> String {
        match self.distance_meters {
            Some(d) => format!("In {} meters, {}", d, self.text),
            None => self.text.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct ResolvedPath {
    // (lat, lng) order, already flipped from what the routing service returns
    pub geometry: Vec<Waypoint>,
    pub instructions: Vec<Instruction>,
}

impl ResolvedPath {
    pub fn to_line_string(&self) -> Option<LineString> {
        if self.geometry.len() < 2 {
            return None;
        }
        Some(LineString::new(
            self.geometry.iter().map(|pt| pt.to_coord()).collect(),
        ))
    }

    pub fn length_meters(&self) -> f64 {
        self.to_line_string()
            .map(|ls| ls.length(&Haversine))
            .unwrap_or(0.0)
    }

    /// What gets spoken right after a successful resolution: one line per step, skipping a step
    /// whose text matches the one right before it.
    pub fn announcements(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut last_text: Option<&str> = None;
        for instruction in &self.instructions {
            if last_text == Some(instruction.text.as_str()) {
                continue;
            }
            last_text = Some(&instruction.text);
            out.push(instruction.announcement());
        }
        out
    }
}

/// A fix from the geolocation collaborator.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_meters: Option<f64>,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(text: &str, distance_meters: Option<f64>) -> Instruction {
        Instruction {
            text: text.to_string(),
            distance_meters,
        }
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(Waypoint::new(f64::NAN, 1.0).is_none());
        assert!(Waypoint::new(1.0, f64::INFINITY).is_none());
        assert_eq!(
            Waypoint::new(21.88, -102.29),
            Some(Waypoint {
                lat: 21.88,
                lng: -102.29
            })
        );
    }

    #[test]
    fn test_zero_distance_is_known() {
        assert_eq!(
            step("Turn left.", Some(0.0)).announcement(),
            "In 0 meters, Turn left."
        );
        assert_eq!(step("Turn left.", None).announcement(), "Turn left.");
        assert_eq!(
            step("Turn left.", Some(120.5)).announcement(),
            "In 120.5 meters, Turn left."
        );
    }

    #[test]
    fn test_only_consecutive_repeats_collapse() {
        let path = ResolvedPath {
            geometry: Vec::new(),
            instructions: vec![
                step("Turn left.", Some(10.0)),
                step("Turn left.", Some(20.0)),
                step("Turn right.", None),
                step("Turn left.", None),
            ],
        };
        assert_eq!(
            path.announcements(),
            vec!["In 10 meters, Turn left.", "Turn right.", "Turn left."]
        );
    }

    #[test]
    fn test_saved_route_json_shape() {
        let raw = r#"[{"id":1700000000000,"name":"Work","waypoints":[{"lat":21.88,"lng":-102.29}]}]"#;
        let routes: Vec<SavedRoute> = serde_json::from_str(raw).unwrap();
        assert_eq!(routes[0].name, "Work");
        assert_eq!(routes[0].waypoints[0].lng, -102.29);
    }
}
