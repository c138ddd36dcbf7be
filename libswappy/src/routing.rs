//! Route guard driven by the session snapshot

use crate::types::{AuthSnapshot, SessionStatus};

/// Screens the guard distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    /// Interest selection, part of the auth group
    Onboarding,
    /// OAuth redirect landing screen
    OAuthCallback,
    /// Anything in the main tab group
    Main,
    Modal,
}

impl Route {
    /// Login, onboarding and the OAuth landing screen are reachable
    /// without a user
    pub fn in_auth_group(self) -> bool {
        matches!(self, Route::Login | Route::Onboarding | Route::OAuthCallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// No determination yet, keep showing what is there
    Wait,
    Stay,
    ToLogin,
    ToMain,
}

pub fn guard(snapshot: &AuthSnapshot, route: Route) -> RouteDecision {
    if snapshot.loading || snapshot.status == SessionStatus::Unknown {
        return RouteDecision::Wait;
    }

    match (snapshot.user(), route) {
        (None, route) if !route.in_auth_group() => RouteDecision::ToLogin,
        (Some(_), Route::Login) => RouteDecision::ToMain,
        _ => RouteDecision::Stay,
    }
}
