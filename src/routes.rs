/// The lat/lng pair that rides alongside the active route, filling the role
/// URL search params play in a browser app.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppView {
    Cities,
    City(u64),
    Countries,
    Form,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route {
    Home,
    Login,
    App(AppView),
}

/// Intent-based navigation: `navigate` only queues, `apply_pending` commits
/// at the top of the next frame. Nothing ever switches views mid-render.
pub struct Router {
    route: Route,
    query: Option<MapQuery>,
    pending: Option<(Route, Option<MapQuery>)>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            route: Route::Home,
            query: None,
            pending: None,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn query(&self) -> Option<MapQuery> {
        self.query
    }

    pub fn navigate(&mut self, route: Route, query: Option<MapQuery>) {
        self.pending = Some((route, query));
    }

    /// Like `navigate` but carries the current query along, the way a
    /// relative link keeps the search params it does not mention.
    pub fn navigate_keep_query(&mut self, route: Route) {
        self.pending = Some((route, self.query));
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Commits a queued intent. Returns true when the route or its query
    /// changed so the caller can run its route-entry hooks (a new click
    /// position on an already-open form counts as entering it again).
    pub fn apply_pending(&mut self) -> bool {
        match self.pending.take() {
            Some((route, query)) => {
                let changed = route != self.route || query != self.query;
                self.route = route;
                self.query = query;
                changed
            }
            None => false,
        }
    }

    /// Gate for the protected `App` subtree. Returns whether the children
    /// may render this frame; when they may not, exactly one redirect to
    /// `Home` is queued (never more, no matter how many frames pass before
    /// the intent is applied).
    pub fn guard_protected(&mut self, is_authenticated: bool) -> bool {
        if !matches!(self.route, Route::App(_)) {
            return true;
        }
        if is_authenticated {
            return true;
        }
        if self.pending.is_none() {
            self.navigate(Route::Home, None);
        }
        false
    }
}
