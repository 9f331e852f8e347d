/// The single admin account
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check a login attempt; both fields are trimmed before comparison.
    ///
    /// An account configured with an empty password never matches.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if self.password.is_empty() {
            return false;
        }
        // Evaluate both so timing does not reveal which field was wrong
        let user_ok = constant_time_eq(username.trim().as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.trim().as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
