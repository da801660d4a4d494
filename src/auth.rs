pub struct FakeUser {
    pub name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub avatar: &'static str,
}

//placeholder account until a real backend exists
pub static FAKE_USER: FakeUser = FakeUser {
    name: "Jack",
    email: "jack@example.com",
    password: "qwerty",
    avatar: "https://i.pravatar.cc/100?u=zz",
};

pub struct AuthService {
    authenticated: bool,
}

impl AuthService {
    pub fn new() -> Self {
        Self { authenticated: false }
    }

    /// Compares against the single fake account. Returns whether this
    /// attempt succeeded; an earlier login is not revoked by a failed one.
    pub fn login(&mut self, email: &str, password: &str) -> bool {
        let matches = email == FAKE_USER.email && password == FAKE_USER.password;
        if matches {
            self.authenticated = true;
        }
        matches
    }

    pub fn logout(&mut self) {
        self.authenticated = false;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn user(&self) -> Option<&'static FakeUser> {
        if self.authenticated {
            Some(&FAKE_USER)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_credentials_authenticate() {
        let mut auth = AuthService::new();
        assert!(!auth.is_authenticated());
        assert!(auth.login("jack@example.com", "qwerty"));
        assert!(auth.is_authenticated());
        assert_eq!(auth.user().map(|u| u.name), Some("Jack"));
    }

    #[test]
    fn wrong_credentials_are_rejected() {
        let mut auth = AuthService::new();
        assert!(!auth.login("jack@example.com", "hunter2"));
        assert!(!auth.login("jill@example.com", "qwerty"));
        assert!(!auth.is_authenticated());
        assert!(auth.user().is_none());
    }

    #[test]
    fn failed_login_keeps_existing_session() {
        let mut auth = AuthService::new();
        assert!(auth.login("jack@example.com", "qwerty"));
        assert!(!auth.login("jack@example.com", "wrong"));
        assert!(auth.is_authenticated());
    }

    #[test]
    fn logout_clears_the_session() {
        let mut auth = AuthService::new();
        auth.login("jack@example.com", "qwerty");
        auth.logout();
        assert!(!auth.is_authenticated());
    }
}
