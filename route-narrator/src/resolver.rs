use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

use route_narrator_model::{Instruction, ResolvedPath, Waypoint};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("need at least 2 waypoints, got {0}")]
    TooFewWaypoints(usize),
    #[error("request to the routing service failed: {0}")]
    Network(String),
    #[error("routing service returned HTTP {0}")]
    Status(u16),
    #[error("routing service found no route")]
    NoRoute,
    #[error("bad response from the routing service: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Turns waypoints into a street route by asking an OSRM-compatible service.
#[derive(Clone)]
pub struct RouteResolver {
    route_api: String,
    client: reqwest::Client,
}

impl RouteResolver {
    pub fn new(route_api: &str) -> RouteResolver {
        RouteResolver {
            route_api: route_api.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn request_url(&self, waypoints: &[Waypoint]) -> Result<String, ResolveError> {
        if waypoints.len() < 2 {
            return Err(ResolveError::TooFewWaypoints(waypoints.len()));
        }
        let coordinates = waypoints
            .iter()
            .map(|pt| format!("{},{}", pt.lng, pt.lat))
            .collect::<Vec<_>>()
            .join(";");
        Ok(format!(
            "{}/driving/{}?overview=full&geometries=geojson&steps=true",
            self.route_api, coordinates
        ))
    }

    /// Never panics; every failure along the way becomes a `ResolveError`.
    pub async fn resolve(&self, waypoints: &[Waypoint]) -> Result<ResolvedPath, ResolveError> {
        let url = self.request_url(waypoints)?;
        debug!("Requesting {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ResolveError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ResolveError::Network(err.to_string()))?;
        interpret(status, &body)
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Deserialize)]
struct OsrmStep {
    instruction: Option<String>,
    distance: Option<f64>,
    maneuver: Option<OsrmManeuver>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct OsrmManeuver {
    modifier: Option<String>,
}

/// Interprets a raw routing service response.
pub fn interpret(status: u16, body: &str) -> Result<ResolvedPath, ResolveError> {
    if !(200..300).contains(&status) {
        return Err(ResolveError::Status(status));
    }
    let response: OsrmResponse = serde_json::from_str(body)?;

    // The first route is the best one, ignore any alternatives
    let Some(route) = response.routes.into_iter().next() else {
        warn!("Routing service returned no routes");
        return Err(ResolveError::NoRoute);
    };

    let geometry = route
        .geometry
        .coordinates
        .into_iter()
        .filter_map(|pair| match pair[..] {
            [lng, lat, ..] => Some(Waypoint { lat, lng }),
            _ => None,
        })
        .collect();

    // Only the first leg is narrated. With more than 2 waypoints, later legs are ignored.
    let instructions = route
        .legs
        .into_iter()
        .next()
        .map(|leg| leg.steps.into_iter().map(to_instruction).collect())
        .unwrap_or_default();

    Ok(ResolvedPath {
        geometry,
        instructions,
    })
}

fn to_instruction(step: OsrmStep) -> Instruction {
    let text = match step.instruction.filter(|x| !x.is_empty()) {
        Some(text) => text,
        None => fallback_instruction(
            step.maneuver
                .as_ref()
                .and_then(|m| m.modifier.as_deref()),
            step.name.as_deref(),
        ),
    };
    Instruction {
        text,
        distance_meters: step.distance,
    }
}

/// Text for a step that came back without an instruction.
pub fn fallback_instruction(modifier: Option<&str>, street: Option<&str>) -> String {
    let modifier = modifier.filter(|x| !x.is_empty()).unwrap_or("en");
    let street = street.filter(|x| !x.is_empty()).unwrap_or("unknown street");
    format!("Turn {modifier} onto {street}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_STEPS: &str = r#"{
        "code": "Ok",
        "routes": [
            {
                "geometry": {"type": "LineString", "coordinates": [[-102.29, 21.88], [-102.295, 21.89], [-102.30, 21.90]]},
                "legs": [{"steps": [
                    {"instruction": "Head north.", "distance": 120.5, "name": "Av. Convención"},
                    {"maneuver": {"modifier": "right", "type": "turn"}, "name": "Calle Juárez", "distance": 0}
                ]}]
            },
            {
                "geometry": {"coordinates": [[0.0, 0.0], [1.0, 1.0]]},
                "legs": [{"steps": [{"instruction": "Alternative."}]}]
            }
        ]
    }"#;

    #[test]
    fn test_request_url() {
        let resolver = RouteResolver::new("https://router.example.org/route/v1/");
        let url = resolver
            .request_url(&[
                Waypoint {
                    lat: 21.88,
                    lng: -102.29,
                },
                Waypoint {
                    lat: 21.90,
                    lng: -102.30,
                },
            ])
            .unwrap();
        assert_eq!(
            url,
            "https://router.example.org/route/v1/driving/-102.29,21.88;-102.3,21.9?overview=full&geometries=geojson&steps=true"
        );
    }

    #[test]
    fn test_one_waypoint_isnt_requested() {
        let resolver = RouteResolver::new("http://localhost");
        assert!(matches!(
            resolver.request_url(&[Waypoint { lat: 1.0, lng: 2.0 }]),
            Err(ResolveError::TooFewWaypoints(1))
        ));
    }

    #[test]
    fn test_first_route_first_leg() {
        let path = interpret(200, TWO_STEPS).unwrap();
        assert_eq!(path.instructions.len(), 2);
        assert_eq!(path.instructions[0].text, "Head north.");
        assert_eq!(path.instructions[0].distance_meters, Some(120.5));
        // Geometry is flipped into (lat, lng)
        assert_eq!(
            path.geometry[0],
            Waypoint {
                lat: 21.88,
                lng: -102.29
            }
        );
        assert_eq!(path.geometry.len(), 3);
    }

    #[test]
    fn test_three_waypoints_narrate_first_leg_only() {
        let body = r#"{"routes": [{
            "geometry": {"coordinates": [[-102.29, 21.88], [-102.30, 21.90], [-102.31, 21.91]]},
            "legs": [
                {"steps": [{"instruction": "Head north.", "distance": 50}, {"instruction": "Arrive at stop.", "distance": 0}]},
                {"steps": [{"instruction": "Turn left.", "distance": 80}, {"instruction": "Arrive.", "distance": 0}]}
            ]
        }]}"#;
        let path = interpret(200, body).unwrap();
        let texts: Vec<&str> = path.instructions.iter().map(|x| x.text.as_str()).collect();
        assert_eq!(texts, vec!["Head north.", "Arrive at stop."]);
        // The geometry still covers the whole route
        assert_eq!(path.geometry.len(), 3);
    }

    #[test]
    fn test_fallback_text() {
        let path = interpret(200, TWO_STEPS).unwrap();
        assert_eq!(path.instructions[1].text, "Turn right onto Calle Juárez.");
        // Zero is a real distance, not a missing one
        assert_eq!(path.instructions[1].distance_meters, Some(0.0));

        assert_eq!(fallback_instruction(None, None), "Turn en onto unknown street.");
        assert_eq!(
            fallback_instruction(Some(""), Some("")),
            "Turn en onto unknown street."
        );
    }

    #[test]
    fn test_missing_distance_is_unknown() {
        let body = r#"{"routes": [{"geometry": {"coordinates": []}, "legs": [{"steps": [{"instruction": "Arrive."}]}]}]}"#;
        let path = interpret(200, body).unwrap();
        assert_eq!(path.instructions[0].distance_meters, None);
        assert_eq!(path.instructions[0].announcement(), "Arrive.");
    }

    #[test]
    fn test_no_legs() {
        let body = r#"{"routes": [{"geometry": {"coordinates": [[1.0, 2.0], [3.0, 4.0]]}}]}"#;
        let path = interpret(200, body).unwrap();
        assert!(path.instructions.is_empty());
        assert_eq!(path.geometry.len(), 2);
    }

    #[test]
    fn test_failures() {
        assert!(matches!(
            interpret(502, TWO_STEPS),
            Err(ResolveError::Status(502))
        ));
        assert!(matches!(
            interpret(200, r#"{"code": "NoRoute", "routes": []}"#),
            Err(ResolveError::NoRoute)
        ));
        assert!(matches!(
            interpret(200, r#"{"code": "NoRoute"}"#),
            Err(ResolveError::NoRoute)
        ));
        assert!(matches!(
            interpret(200, "<html>gateway timeout</html>"),
            Err(ResolveError::Malformed(_))
        ));
    }
}
