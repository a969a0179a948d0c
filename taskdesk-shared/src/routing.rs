//! Role-based route gating
//!
//! [`decide`] is a pure function of `(role, path)`. Every redirect it issues
//! lands on a route that renders for that same role, or on `/login`, which
//! always renders, so no sequence of redirects can cycle.

use serde::Serialize;
use std::fmt;

use crate::models::user::Role;
use crate::session::SessionState;

/// A page of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Login,
    Register,
    AdminDashboard,
    Dashboard,
}

impl Route {
    pub const ALL: [Route; 4] = [
        Route::Login,
        Route::Register,
        Route::AdminDashboard,
        Route::Dashboard,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::AdminDashboard => "/admin-dashboard",
            Route::Dashboard => "/dashboard",
        }
    }

    /// Matches a request path exactly, as the HTTP router does
    pub fn from_path(path: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|r| r.path() == path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What to show for a requested path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "route", rename_all = "snake_case")]
pub enum Decision {
    Render(Route),
    Redirect(Route),
}

impl Decision {
    /// Route that ends up on screen
    pub fn target(&self) -> Route {
        match self {
            Decision::Render(r) | Decision::Redirect(r) => *r,
        }
    }
}

/// Routing outcome once the session state is taken into account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Session still resolving; show a loading indicator
    Pending,
    Decided(Decision),
}

/// Post-login landing route for a role
pub fn landing_for(role: Role) -> Route {
    if role.is_staff() {
        Route::AdminDashboard
    } else {
        Route::Dashboard
    }
}

/// Decides what a session with `role` sees at `path`
pub fn decide(role: Option<Role>, path: &str) -> Decision {
    let Some(route) = Route::from_path(path) else {
        return Decision::Redirect(Route::Login);
    };

    match (route, role) {
        (Route::Login | Route::Register, _) => Decision::Render(route),

        (Route::AdminDashboard, Some(r)) if r.is_staff() => Decision::Render(route),
        (Route::AdminDashboard, Some(Role::TeamMember)) => Decision::Redirect(Route::Dashboard),

        (Route::Dashboard, Some(Role::TeamMember)) => Decision::Render(route),
        (Route::Dashboard, Some(r)) if r.is_staff() => Decision::Redirect(Route::AdminDashboard),

        _ => Decision::Redirect(Route::Login),
    }
}

/// [`decide`] for a watched session, holding back while it is loading
pub fn gate(state: &SessionState, path: &str) -> Gate {
    if state.is_loading() {
        Gate::Pending
    } else {
        Gate::Decided(decide(state.role(), path))
    }
}
