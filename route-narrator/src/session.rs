use thiserror::Error;

use route_narrator_model::{ResolvedPath, SavedRoute, Waypoint};

pub const DEFAULT_ROUTE_NAME: &str = "New route";

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("can't {transition} while {from}")]
    InvalidTransition {
        from: &'static str,
        transition: &'static str,
    },
    #[error("a journey needs at least 2 waypoints, this route has {0}")]
    NotEnoughWaypoints(usize),
}

/// A route being drawn, not saved yet.
#[derive(Clone, PartialEq, Debug)]
pub struct DraftRoute {
    pub id: i64,
    pub name: String,
    pub waypoints: Vec<Waypoint>,
    // Only present once 2 waypoints have been resolved
    pub path: Option<ResolvedPath>,
}

/// Exactly one route is active at a time.
#[derive(Clone, PartialEq, Debug)]
pub enum SessionState {
    Idle,
    Creating(DraftRoute),
    Selected {
        route: SavedRoute,
        path: Option<ResolvedPath>,
    },
    Journeying {
        route: SavedRoute,
        path: Option<ResolvedPath>,
    },
}

#[derive(Clone, Debug)]
pub enum Transition {
    StartCreation { id: i64, name: String },
    AddWaypoint(Waypoint),
    Cancel,
    Saved,
    Load(SavedRoute),
    StartJourney,
    StopJourney,
    Resolved(ResolvedPath),
}

impl Transition {
    fn describe(&self) -> &'static str {
        match self {
            Transition::StartCreation { .. } => "start creating a route",
            Transition::AddWaypoint(_) => "add a waypoint",
            Transition::Cancel => "cancel route creation",
            Transition::Saved => "save a route",
            Transition::Load(_) => "load a route",
            Transition::StartJourney => "start a journey",
            Transition::StopJourney => "stop a journey",
            Transition::Resolved(_) => "apply a resolved path",
        }
    }
}

impl SessionState {
    pub fn describe(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Creating(_) => "creating a route",
            SessionState::Selected { .. } => "a route is selected",
            SessionState::Journeying { .. } => "on a journey",
        }
    }

    /// Computes the next state. `self` is untouched, so a rejected transition leaves everything
    /// as it was.
    pub fn apply(&self, transition: Transition) -> Result<SessionState, SessionError> {
        let next = match (self, transition) {
            (
                SessionState::Idle | SessionState::Selected { .. },
                Transition::StartCreation { id, name },
            ) => SessionState::Creating(DraftRoute {
                id,
                name,
                waypoints: Vec::new(),
                path: None,
            }),
            (SessionState::Creating(draft), Transition::AddWaypoint(waypt)) => {
                let mut draft = draft.clone();
                draft.waypoints.push(waypt);
                // The old path no longer matches the waypoints
                draft.path = None;
                SessionState::Creating(draft)
            }
            (SessionState::Creating(_), Transition::Cancel | Transition::Saved) => {
                SessionState::Idle
            }
            (SessionState::Idle | SessionState::Selected { .. }, Transition::Load(route)) => {
                SessionState::Selected { route, path: None }
            }
            (SessionState::Selected { route, path }, Transition::StartJourney) => {
                if route.waypoints.len() < 2 {
                    return Err(SessionError::NotEnoughWaypoints(route.waypoints.len()));
                }
                SessionState::Journeying {
                    route: route.clone(),
                    path: path.clone(),
                }
            }
            (SessionState::Journeying { .. }, Transition::StopJourney) => SessionState::Idle,
            (SessionState::Creating(draft), Transition::Resolved(path)) => {
                let mut draft = draft.clone();
                draft.path = Some(path);
                SessionState::Creating(draft)
            }
            (SessionState::Selected { route, .. }, Transition::Resolved(path)) => {
                SessionState::Selected {
                    route: route.clone(),
                    path: Some(path),
                }
            }
            (SessionState::Journeying { route, .. }, Transition::Resolved(path)) => {
                SessionState::Journeying {
                    route: route.clone(),
                    path: Some(path),
                }
            }
            (from, transition) => {
                return Err(SessionError::InvalidTransition {
                    from: from.describe(),
                    transition: transition.describe(),
                });
            }
        };
        Ok(next)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        match self {
            SessionState::Idle => &[],
            SessionState::Creating(draft) => &draft.waypoints,
            SessionState::Selected { route, .. } | SessionState::Journeying { route, .. } => {
                &route.waypoints
            }
        }
    }

    pub fn path(&self) -> Option<&ResolvedPath> {
        match self {
            SessionState::Idle => None,
            SessionState::Creating(draft) => draft.path.as_ref(),
            SessionState::Selected { path, .. } | SessionState::Journeying { path, .. } => {
                path.as_ref()
            }
        }
    }

    pub fn is_creating(&self) -> bool {
        matches!(self, SessionState::Creating(_))
    }

    pub fn is_journeying(&self) -> bool {
        matches!(self, SessionState::Journeying { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lng: f64) -> Waypoint {
        Waypoint { lat, lng }
    }

    fn saved(waypoints: Vec<Waypoint>) -> SavedRoute {
        SavedRoute {
            id: 1,
            name: "Home".to_string(),
            waypoints,
        }
    }

    fn creating() -> SessionState {
        SessionState::Idle
            .apply(Transition::StartCreation {
                id: 7,
                name: DEFAULT_ROUTE_NAME.to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_create_then_cancel() {
        let state = creating();
        let state = state
            .apply(Transition::AddWaypoint(pt(21.88, -102.29)))
            .unwrap();
        assert_eq!(state.waypoints(), &[pt(21.88, -102.29)]);
        assert!(state.path().is_none());
        assert_eq!(state.apply(Transition::Cancel).unwrap(), SessionState::Idle);
    }

    #[test]
    fn test_new_waypoint_drops_stale_path() {
        let state = creating()
            .apply(Transition::AddWaypoint(pt(1.0, 1.0)))
            .unwrap()
            .apply(Transition::AddWaypoint(pt(2.0, 2.0)))
            .unwrap()
            .apply(Transition::Resolved(ResolvedPath::default()))
            .unwrap();
        assert!(state.path().is_some());
        let state = state.apply(Transition::AddWaypoint(pt(3.0, 3.0))).unwrap();
        assert!(state.path().is_none());
        assert_eq!(state.waypoints().len(), 3);
    }

    #[test]
    fn test_waypoints_only_while_creating() {
        for state in [
            SessionState::Idle,
            SessionState::Selected {
                route: saved(vec![pt(1.0, 1.0), pt(2.0, 2.0)]),
                path: None,
            },
        ] {
            assert!(matches!(
                state.apply(Transition::AddWaypoint(pt(0.0, 0.0))),
                Err(SessionError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_journey_needs_two_waypoints() {
        let state = SessionState::Idle
            .apply(Transition::Load(saved(vec![pt(1.0, 1.0)])))
            .unwrap();
        assert_eq!(
            state.apply(Transition::StartJourney),
            Err(SessionError::NotEnoughWaypoints(1))
        );

        let state = SessionState::Idle
            .apply(Transition::Load(saved(vec![pt(1.0, 1.0), pt(2.0, 2.0)])))
            .unwrap();
        let state = state.apply(Transition::StartJourney).unwrap();
        assert!(state.is_journeying());
        assert_eq!(
            state.apply(Transition::StopJourney).unwrap(),
            SessionState::Idle
        );
    }

    #[test]
    fn test_no_loading_mid_journey() {
        let state = SessionState::Journeying {
            route: saved(vec![pt(1.0, 1.0), pt(2.0, 2.0)]),
            path: None,
        };
        assert!(state
            .apply(Transition::Load(saved(Vec::new())))
            .is_err());
        assert!(state
            .apply(Transition::StartCreation {
                id: 1,
                name: "x".to_string()
            })
            .is_err());
    }

    #[test]
    fn test_resolved_while_idle_is_rejected() {
        assert!(SessionState::Idle
            .apply(Transition::Resolved(ResolvedPath::default()))
            .is_err());
    }
}
