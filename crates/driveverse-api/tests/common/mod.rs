#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use uuid::Uuid;

use driveverse_api::middleware::issue_token;
use driveverse_api::{ApiConfig, AppState, AppStateInner, build_router};
use driveverse_db::Database;
use driveverse_db::models::NewUser;
use driveverse_gateway::dispatcher::Dispatcher;
use driveverse_types::models::{AuthProvider, Role};

pub const SECRET: &str = "integration-test-secret";

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// Fresh state over an in-memory database, uploads written under `tmp`.
pub fn test_state(tmp: &tempfile::TempDir) -> AppState {
    let db = Database::open_in_memory().unwrap();
    let config = ApiConfig {
        jwt_secret: SECRET.into(),
        upload_dir: tmp.path().join("uploads"),
        max_image_bytes: 64 * 1024,
    };
    AppStateInner::new(db, Dispatcher::new(), config)
}

pub fn seed_user(state: &AppState, name: &str, role: Role) -> TestUser {
    let id = Uuid::new_v4();
    let uid = id.to_string();
    let email = format!("{}@driveverse.test", name.to_lowercase());
    state
        .db
        .create_user(&NewUser {
            id: &uid,
            name,
            email: &email,
            password_hash: None,
            auth_provider: AuthProvider::Local.as_str(),
            role: role.as_str(),
            avatar: None,
            place: "Lisbon",
        })
        .unwrap();

    let token = issue_token(SECRET, id, role, chrono::Duration::hours(1)).unwrap();
    TestUser { id, token }
}

pub async fn spawn_server() -> (SocketAddr, JoinHandle<()>, AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let state = test_state(&tmp);
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server, state, tmp)
}
