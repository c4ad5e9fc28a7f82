#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chirptube::{
    ServerConfig, create_app,
    db::Database,
    jwt::{JwtConfig, JwtSettings},
};
use std::time::Duration;
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-test-access-secret";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-test-refresh-secret";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: Duration::from_secs(15 * 60),
        refresh_ttl: Duration::from_secs(10 * 24 * 60 * 60),
    }
}

/// A `JwtConfig` sharing the test app's secrets, for minting tokens directly.
pub fn jwt_config() -> JwtConfig {
    JwtConfig::new(&jwt_settings())
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_login_limit(100).await
}

pub async fn create_test_app_with_login_limit(login_attempts_per_minute: u32) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        jwt: jwt_settings(),
        secure_cookies: false,
        login_attempts_per_minute,
    };
    TestApp {
        app: create_app(&config),
        db,
    }
}

impl TestApp {
    /// Send a request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(json_request("POST", uri, body)).await
    }

    /// Register a user with default profile fields.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Response<Body> {
        self.post_json(
            "/api/v1/users/register",
            serde_json::json!({
                "username": username,
                "email": email,
                "fullName": "Test User",
                "password": password,
            }),
        )
        .await
    }

    /// Log in by username and return the token pair from the response body.
    pub async fn login(&self, username: &str, password: &str) -> (String, String) {
        let response = self
            .post_json(
                "/api/v1/users/login",
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        (
            json["data"]["accessToken"].as_str().unwrap().to_string(),
            json["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    /// Register and log in, returning the token pair.
    pub async fn register_and_login(&self, username: &str, password: &str) -> (String, String) {
        let email = format!("{}@example.com", username);
        let response = self.register(username, &email, password).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        self.login(username, password).await
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_cookie(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// All `Set-Cookie` header values on a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The value a `Set-Cookie` header assigns to `name`, if any.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        c.strip_prefix(&prefix)
            .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Assert the failure envelope shape and return its message.
pub async fn assert_failure(response: Response<Body>, status: StatusCode) -> String {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["statusCode"], status.as_u16());
    assert_eq!(json["success"], false);
    assert!(json["errors"].as_array().is_some());
    json["message"].as_str().unwrap().to_string()
}
