//! Real-time event probes.
//!
//! Liveness checks over the notification socket: an authenticated ping
//! must draw a framed reply within the receive window, bad or missing
//! credentials must be rejected before any data frame, and one principal
//! must be able to hold several sockets at once.
//!
//! No event schema beyond `{type, timestamp}` is asserted; the backend
//! does not document one.

use super::ROLE_BUYER;
use crate::scenario::{Scenario, Step, WsAction};

/// Sockets opened concurrently for the fan-out probe.
const FANOUT_CONNECTIONS: usize = 3;

pub fn realtime_events() -> Scenario {
    Scenario::new(
        "realtime-events",
        "WebSocket liveness: authenticated ping, credential rejection, multi-socket fan-out",
    )
    .requires_role(ROLE_BUYER)
    .critical_step("authenticated ping")
    .step(Step::login(ROLE_BUYER))
    .step(Step::ws(
        "authenticated ping",
        WsAction::Ping {
            role: ROLE_BUYER.to_string(),
            strict: false,
        },
    ))
    .step(Step::ws(
        "invalid token rejected",
        WsAction::Reject {
            role: ROLE_BUYER.to_string(),
            token: Some("invalid_short_token".to_string()),
        },
    ))
    .step(Step::ws(
        "missing token rejected",
        WsAction::Reject {
            role: ROLE_BUYER.to_string(),
            token: None,
        },
    ))
    .step(Step::ws(
        "fan-out",
        WsAction::Fanout {
            role: ROLE_BUYER.to_string(),
            connections: FANOUT_CONNECTIONS,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::StepAction;

    #[test]
    fn test_realtime_scenario_shape() {
        let scenario = realtime_events();
        assert_eq!(scenario.id, "realtime-events");
        assert_eq!(scenario.required_roles, vec![ROLE_BUYER]);
        assert_eq!(scenario.steps.len(), 5);
    }

    #[test]
    fn test_negative_paths_cover_invalid_and_missing_tokens() {
        let scenario = realtime_events();
        let tokens: Vec<_> = scenario
            .steps
            .iter()
            .filter_map(|s| match &s.action {
                StepAction::Ws(WsAction::Reject { token, .. }) => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains(&Some("invalid_short_token".to_string())));
        assert!(tokens.contains(&None));
    }

    #[test]
    fn test_fanout_opens_three_sockets() {
        let scenario = realtime_events();
        let connections = scenario.steps.iter().find_map(|s| match &s.action {
            StepAction::Ws(WsAction::Fanout { connections, .. }) => Some(*connections),
            _ => None,
        });
        assert_eq!(connections, Some(3));
    }
}
