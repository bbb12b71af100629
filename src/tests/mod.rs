//! Integration and unit tests for the download gate.
//!
//! ## Test Modules
//!
//! - **api_tests**: operational endpoints, headers and content negotiation
//! - **gate_tests**: login, sessions, anti-forgery and role checks end to end
//! - **download_tests**: redemption, token links, metered downloads and uploads
//! - **error_tests**: error envelope mapping
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: the SQLite store
//!
//! Individual test modules can be run with:
//! ```bash
//! cargo test gate_tests
//! ```

pub mod db_tests;

/// Fixtures shared by the HTTP-level tests.
#[cfg(test)]
pub mod support {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, Response},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::password::hash_password;
    use crate::routes;
    use crate::state::AppState;
    use crate::store::{MemoryStore, Store};
    use crate::throttle::BruteForceThrottle;
    use crate::types::{Role, User};

    pub struct TestApp {
        pub app: Router,
        pub state: AppState,
        pub store: Arc<MemoryStore>,
    }

    pub fn setup_test_app() -> TestApp {
        setup_test_app_with(AppConfig::default())
    }

    pub fn setup_test_app_with(config: AppConfig) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config, BruteForceThrottle::default());
        TestApp { app: routes::router(state.clone()), state, store }
    }

    impl TestApp {
        pub async fn send(&self, req: Request<Body>) -> Response<Body> {
            self.app.clone().oneshot(req).await.unwrap()
        }

        /// A fresh anti-forgery marker, obtained the way a browser would.
        pub async fn xsrf(&self) -> String {
            let res = self.send(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await;
            cookie(&res, "XSRF-TOKEN").expect("healthz mints an anti-forgery cookie")
        }

        /// Logs in and returns the session cookie value.
        pub async fn login(&self, user: &str, password: &str) -> String {
            let xsrf = self.xsrf().await;
            let res = self
                .send(json_post("/login", &serde_json::json!({ "user": user, "password": password }), &xsrf, None))
                .await;
            assert_eq!(res.status(), 200, "login of {} failed", user);
            cookie(&res, "SD").expect("login issues a session cookie")
        }
    }

    pub async fn seed_user(store: &MemoryStore, username: &str, password: &str, role: Role) -> User {
        let user = User {
            username: username.to_string(),
            hash: hash_password(password).unwrap(),
            email: format!("{}@example.com", username),
            name: username.to_string(),
            role,
            token: None,
            last_login: None,
            modify_date: None,
        };
        store.save_user(&user).await.unwrap();
        user
    }

    /// Value of the cookie `name` set by `res`, if any.
    pub fn cookie(res: &Response<Body>, name: &str) -> Option<String> {
        set_cookies(res).into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn set_cookies(res: &Response<Body>) -> Vec<(String, String)> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }

    pub fn cookie_header(xsrf: &str, session: Option<&str>) -> String {
        match session {
            Some(sd) => format!("XSRF-TOKEN={}; SD={}", xsrf, sd),
            None => format!("XSRF-TOKEN={}", xsrf),
        }
    }

    pub fn json_post(uri: &str, body: &Value, xsrf: &str, session: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie_header(xsrf, session))
            .header("X-XSRF-TOKEN", xsrf)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn json_get(uri: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).header(header::ACCEPT, "application/json");
        if let Some(sd) = session {
            builder = builder.header(header::COOKIE, format!("SD={}", sd));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn body_json(res: Response<Body>) -> Value {
        let body = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn body_bytes(res: Response<Body>) -> Vec<u8> {
        res.into_body().collect().await.unwrap().to_bytes().to_vec()
    }
}
