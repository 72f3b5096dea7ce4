//! Route guards and navigation links derived from a [`SessionSnapshot`].
//! Nothing here talks to the backend.

use crate::domain_model::{Role, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Register,
    AdminLogin,
    ClientDashboard,
    RestaurantDashboard,
    DriverDashboard,
    AdminDashboard,
}

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Home,
        Route::Login,
        Route::Register,
        Route::AdminLogin,
        Route::ClientDashboard,
        Route::RestaurantDashboard,
        Route::DriverDashboard,
        Route::AdminDashboard,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::Register => "/register",
            Route::AdminLogin => "/admin-login",
            Route::ClientDashboard => "/client/dashboard",
            Route::RestaurantDashboard => "/restaurant/dashboard",
            Route::DriverDashboard => "/driver/dashboard",
            Route::AdminDashboard => "/admin/dashboard",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    pub fn dashboard_for(role: Role) -> Route {
        match role {
            Role::Client => Route::ClientDashboard,
            Role::Restaurant => Route::RestaurantDashboard,
            Role::Driver => Route::DriverDashboard,
            Role::Admin => Route::AdminDashboard,
        }
    }

    /// The role a dashboard belongs to; `None` for public pages.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Route::ClientDashboard => Some(Role::Client),
            Route::RestaurantDashboard => Some(Role::Restaurant),
            Route::DriverDashboard => Some(Role::Driver),
            Route::AdminDashboard => Some(Role::Admin),
            Route::Home | Route::Login | Route::Register | Route::AdminLogin => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Allowed,
    SignInRequired,
    /// Signed in, role lookup not finished (or failed).
    RolePending,
    Forbidden,
}

pub fn guard(route: Route, snapshot: &SessionSnapshot) -> RouteAccess {
    let Some(required) = route.required_role() else {
        return RouteAccess::Allowed;
    };
    if !snapshot.is_signed_in() {
        return RouteAccess::SignInRequired;
    }
    match snapshot.role() {
        None => RouteAccess::RolePending,
        Some(role) if role == required => RouteAccess::Allowed,
        Some(_) => RouteAccess::Forbidden,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavLink {
    Orders,
    Cart,
    Notifications,
    Dashboard(Route),
    Profile,
    SignOut,
    SignIn,
    Register,
}

impl NavLink {
    pub fn target(&self) -> Option<&'static str> {
        match self {
            NavLink::Orders => Some("/orders"),
            NavLink::Cart => Some("/cart"),
            NavLink::Profile => Some("/profile"),
            NavLink::Dashboard(route) => Some(route.path()),
            NavLink::SignIn => Some(Route::Login.path()),
            NavLink::Register => Some(Route::Register.path()),
            NavLink::Notifications | NavLink::SignOut => None,
        }
    }
}

pub fn nav_links(snapshot: &SessionSnapshot) -> Vec<NavLink> {
    if !snapshot.is_signed_in() {
        return vec![NavLink::SignIn, NavLink::Register];
    }
    let mut links = vec![NavLink::Orders, NavLink::Cart, NavLink::Notifications];
    if let Some(role) = snapshot.role() {
        links.push(NavLink::Dashboard(Route::dashboard_for(role)));
    }
    links.extend([NavLink::SignOut, NavLink::Profile]);
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{Identity, Session, UserId};

    fn signed_in(role: Option<Role>) -> SessionSnapshot {
        let session = Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: None,
            user: Identity {
                id: UserId::new_random(),
                email: None,
            },
        };
        SessionSnapshot::from_session(Some(session)).with_role(role)
    }

    #[test]
    fn paths_round_trip() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
        assert_eq!(Route::from_path("/nowhere"), None);
    }

    #[test]
    fn public_routes_are_always_open() {
        for route in [Route::Home, Route::Login, Route::Register, Route::AdminLogin] {
            assert_eq!(guard(route, &SessionSnapshot::signed_out()), RouteAccess::Allowed);
        }
    }

    #[test]
    fn dashboards_require_matching_role() {
        let signed_out = SessionSnapshot::signed_out();
        assert_eq!(guard(Route::DriverDashboard, &signed_out), RouteAccess::SignInRequired);

        let pending = signed_in(None);
        assert_eq!(guard(Route::DriverDashboard, &pending), RouteAccess::RolePending);

        let driver = signed_in(Some(Role::Driver));
        assert_eq!(guard(Route::DriverDashboard, &driver), RouteAccess::Allowed);
        assert_eq!(guard(Route::AdminDashboard, &driver), RouteAccess::Forbidden);
    }

    #[test]
    fn links_follow_sign_in_state_and_role() {
        assert_eq!(
            nav_links(&SessionSnapshot::signed_out()),
            vec![NavLink::SignIn, NavLink::Register]
        );

        let pending = nav_links(&signed_in(None));
        assert!(pending.contains(&NavLink::SignOut));
        assert!(!pending.iter().any(|l| matches!(l, NavLink::Dashboard(_))));

        let restaurant = nav_links(&signed_in(Some(Role::Restaurant)));
        assert!(restaurant.contains(&NavLink::Dashboard(Route::RestaurantDashboard)));
    }
}
