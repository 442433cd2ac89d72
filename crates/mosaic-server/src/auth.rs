use mosaic_core::Authorizer;

/// Header carrying the deletion credential.
pub const SECRET_HEADER: &str = "x-mosaic-secret";

/// Authorizes deletions against a single shared secret.
///
/// With no secret configured every deletion is refused.
#[derive(Clone)]
pub struct SharedSecret {
    secret: Option<String>,
}

impl SharedSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Authorizer for SharedSecret {
    fn authorize(&self, credential: Option<&str>) -> bool {
        match (&self.secret, credential) {
            (Some(secret), Some(given)) => constant_time_eq(secret.as_bytes(), given.as_bytes()),
            _ => false,
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret() {
        let auth = SharedSecret::new(Some("hunter2".to_string()));
        assert!(auth.authorize(Some("hunter2")));
        assert!(!auth.authorize(Some("hunter3")));
        assert!(!auth.authorize(Some("hunter")));
        assert!(!auth.authorize(None));
    }

    #[test]
    fn test_disabled_without_secret() {
        let auth = SharedSecret::new(None);
        assert!(!auth.is_enabled());
        assert!(!auth.authorize(Some("")));
        assert!(!auth.authorize(None));
    }

    #[test]
    fn test_debug_hides_secret() {
        let auth = SharedSecret::new(Some("hunter2".to_string()));
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
