//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Traduce el target de una petición a la página que se debe servir.
//!
//! ## Acciones
//!
//! La acción es el primer carácter después del último `/` del target:
//!
//! | Acción | Condición        | Página                                |
//! |--------|------------------|---------------------------------------|
//! | `2`    | formulario (POST)| `/welcome.html` o `/logError.html`    |
//! | `3`    | formulario (POST)| `/log.html` o `/registerError.html`   |
//! | `0`    | siempre          | `/register.html`                      |
//! | `1`    | siempre          | `/log.html`                           |
//! | `5`    | siempre          | `/picture.html`                       |
//! | `6`    | siempre          | `/video.html`                         |
//! | `7`    | siempre          | `/fans.html`                          |
//!
//! Cualquier otro target se usa tal cual.

use crate::credentials::{parse_credentials, RegisterOutcome, StoreConnection, UserCache};
use tracing::{debug, info};

pub const LOGIN_ACTION: u8 = b'2';
pub const REGISTER_ACTION: u8 = b'3';

pub const WELCOME_PAGE: &str = "/welcome.html";
pub const LOGIN_ERROR_PAGE: &str = "/logError.html";
pub const LOGIN_PAGE: &str = "/log.html";
pub const REGISTER_PAGE: &str = "/register.html";
pub const REGISTER_ERROR_PAGE: &str = "/registerError.html";

/// Router de páginas fijas
#[derive(Debug, Clone)]
pub struct Router {
    /// Acción → página
    pages: Vec<(u8, &'static str)>,
}

impl Router {
    /// Crea un router sin páginas fijas
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Router con las páginas fijas del sitio
    pub fn with_default_pages() -> Self {
        let mut router = Self::new();
        router.register(b'0', REGISTER_PAGE);
        router.register(b'1', LOGIN_PAGE);
        router.register(b'5', "/picture.html");
        router.register(b'6', "/video.html");
        router.register(b'7', "/fans.html");
        router
    }

    /// Registra una página fija para una acción
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_httpd::router::Router;
    ///
    /// let mut router = Router::new();
    /// router.register(b'9', "/about.html");
    /// assert_eq!(router.page_for(b'9'), Some("/about.html"));
    /// ```
    pub fn register(&mut self, action: u8, page: &'static str) {
        self.pages.push((action, page));
    }

    pub fn page_for(&self, action: u8) -> Option<&'static str> {
        self.pages
            .iter()
            .find(|(registered, _)| *registered == action)
            .map(|(_, page)| *page)
    }

    /// Primer byte después del último `/`
    pub fn action_of(target: &str) -> Option<u8> {
        let idx = target.rfind('/')?;
        target.as_bytes().get(idx + 1).copied()
    }

    /// Resuelve la página a servir.
    ///
    /// `form_body` es `Some` solo para envíos de formulario. `store` es la
    /// conexión prestada al almacén; sin ella un registro falla.
    pub fn resolve(
        &self,
        target: &str,
        form_body: Option<&[u8]>,
        users: &UserCache,
        store: Option<&mut dyn StoreConnection>,
    ) -> String {
        let action = Self::action_of(target);

        if let Some(body) = form_body {
            match action {
                Some(LOGIN_ACTION) => return Self::login(body, users).to_string(),
                Some(REGISTER_ACTION) => {
                    return Self::register_user(body, users, store).to_string();
                }
                _ => {}
            }
        }

        match action.and_then(|a| self.page_for(a)) {
            Some(page) => page.to_string(),
            None => target.to_string(),
        }
    }

    fn login(body: &[u8], users: &UserCache) -> &'static str {
        match parse_credentials(body) {
            Ok(creds) if users.verify(&creds) => {
                info!(user = %creds.name, "login ok");
                WELCOME_PAGE
            }
            Ok(creds) => {
                info!(user = %creds.name, "login rejected");
                LOGIN_ERROR_PAGE
            }
            Err(err) => {
                debug!(error = %err, "malformed login form");
                LOGIN_ERROR_PAGE
            }
        }
    }

    fn register_user(
        body: &[u8],
        users: &UserCache,
        store: Option<&mut dyn StoreConnection>,
    ) -> &'static str {
        let creds = match parse_credentials(body) {
            Ok(creds) => creds,
            Err(err) => {
                debug!(error = %err, "malformed register form");
                return REGISTER_ERROR_PAGE;
            }
        };
        let Some(store) = store else {
            return REGISTER_ERROR_PAGE;
        };

        match users.register_with(&creds, |name, digest| store.insert_user(name, digest)) {
            RegisterOutcome::Registered => {
                info!(user = %creds.name, "user registered");
                LOGIN_PAGE
            }
            RegisterOutcome::Duplicate | RegisterOutcome::StoreFailed => REGISTER_ERROR_PAGE,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::with_default_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::digest_password;
    use crate::error::StoreError;

    /// Almacén en memoria para tests
    #[derive(Default)]
    struct MemoryStore {
        inserted: Vec<String>,
        fail: bool,
    }

    impl StoreConnection for MemoryStore {
        fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError> {
            Ok(Vec::new())
        }

        fn insert_user(&mut self, name: &str, _digest: &str) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Exhausted);
            }
            self.inserted.push(name.to_string());
            Ok(())
        }
    }

    fn cache_with_ana() -> UserCache {
        let cache = UserCache::new();
        cache.load([("ana".to_string(), digest_password("pw"))]);
        cache
    }

    // ==================== Acciones ====================

    #[test]
    fn test_action_of() {
        assert_eq!(Router::action_of("/2CGISQL.cgi"), Some(b'2'));
        assert_eq!(Router::action_of("/dir/5x"), Some(b'5'));
        assert_eq!(Router::action_of("/dir/"), None);
        assert_eq!(Router::action_of("noslash"), None);
    }

    #[test]
    fn test_fixed_pages() {
        let router = Router::default();
        let users = UserCache::new();
        for (target, page) in [
            ("/0", "/register.html"),
            ("/1", "/log.html"),
            ("/5", "/picture.html"),
            ("/6", "/video.html"),
            ("/7", "/fans.html"),
        ] {
            assert_eq!(router.resolve(target, None, &users, None), page);
        }
    }

    #[test]
    fn test_other_targets_verbatim() {
        let router = Router::default();
        let users = UserCache::new();
        assert_eq!(router.resolve("/index.html", None, &users, None), "/index.html");
        // Login sin formulario no consulta credenciales
        assert_eq!(router.resolve("/2CGISQL.cgi", None, &users, None), "/2CGISQL.cgi");
    }

    // ==================== Login ====================

    #[test]
    fn test_login_success_and_failure() {
        let router = Router::default();
        let users = cache_with_ana();

        let ok = router.resolve("/2CGISQL.cgi", Some(b"user=ana&password=pw"), &users, None);
        assert_eq!(ok, WELCOME_PAGE);

        let bad = router.resolve("/2CGISQL.cgi", Some(b"user=ana&password=no"), &users, None);
        assert_eq!(bad, LOGIN_ERROR_PAGE);

        let malformed = router.resolve("/2CGISQL.cgi", Some(b"garbage"), &users, None);
        assert_eq!(malformed, LOGIN_ERROR_PAGE);
    }

    // ==================== Registro ====================

    #[test]
    fn test_register_new_user() {
        let router = Router::default();
        let users = UserCache::new();
        let mut store = MemoryStore::default();

        let page = router.resolve(
            "/3CGISQL.cgi",
            Some(b"user=bob&password=pw"),
            &users,
            Some(&mut store),
        );
        assert_eq!(page, LOGIN_PAGE);
        assert_eq!(store.inserted, vec!["bob".to_string()]);
        assert!(users.contains("bob"));
    }

    #[test]
    fn test_register_duplicate_user() {
        let router = Router::default();
        let users = cache_with_ana();
        let mut store = MemoryStore::default();

        let page = router.resolve(
            "/3CGISQL.cgi",
            Some(b"user=ana&password=x"),
            &users,
            Some(&mut store),
        );
        assert_eq!(page, REGISTER_ERROR_PAGE);
        assert!(store.inserted.is_empty());
    }

    #[test]
    fn test_register_store_failure_or_missing() {
        let router = Router::default();
        let users = UserCache::new();
        let mut failing = MemoryStore {
            fail: true,
            ..Default::default()
        };

        let body: &[u8] = b"user=bob&password=pw";
        assert_eq!(
            router.resolve("/3x", Some(body), &users, Some(&mut failing)),
            REGISTER_ERROR_PAGE
        );
        assert_eq!(router.resolve("/3x", Some(body), &users, None), REGISTER_ERROR_PAGE);
        assert!(!users.contains("bob"));
    }
}
