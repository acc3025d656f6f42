#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! [`TestApp`] wires the real router, list pipeline and role scoping over
//! in-memory storage seeded with a small hiring dataset.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use talentdesk_kernel::config::Config;
use talentdesk_kernel::models::{Caller, Role};
use talentdesk_kernel::routes;
use talentdesk_kernel::schema::SchemaRegistry;
use talentdesk_kernel::services::TokenService;
use talentdesk_kernel::state::AppState;
use talentdesk_kernel::storage::MemoryStorage;
use talentdesk_test_utils::{Dataset, test_application, test_candidate, test_job, test_user};

pub const JWT_SECRET: &str = "integration-test-secret-0123456789";

/// Ids of the seeded records.
///
/// Two recruiters each own a draft job and share a pool of open jobs owned
/// by the second recruiter. The candidate applied to one job of each.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub admin: Caller,
    pub recruiter: Caller,
    pub other_recruiter: Caller,
    pub candidate: Caller,
    pub other_candidate: Uuid,
    pub own_draft_job: Uuid,
    pub other_draft_job: Uuid,
    pub open_jobs: Vec<Uuid>,
    pub own_application: Uuid,
    pub other_application: Uuid,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub fixture: Fixture,
    tokens: TokenService,
}

/// Number of open jobs seeded, more than one clamped page.
pub const OPEN_JOBS: usize = 120;

fn seed() -> (Dataset, Fixture) {
    let mut data = Dataset::new();

    let admin = Caller::new(data.user(test_user("Ana Admin", "admin")), Role::Admin);
    let recruiter =
        Caller::new(data.user(test_user("Rita Recruiter", "recruiter")), Role::Recruiter);
    let other_recruiter =
        Caller::new(data.user(test_user("Omar Recruiter", "recruiter")), Role::Recruiter);

    let own_draft_job = data.job(
        test_job("Rust Engineer")
            .owned_by(recruiter.id)
            .draft()
            .with_salary(120, 160),
    );
    let other_draft_job = data.job(
        test_job("Staff Engineer")
            .owned_by(other_recruiter.id)
            .draft()
            .with_salary(150, 200),
    );
    let open_jobs = (0..OPEN_JOBS)
        .map(|i| {
            data.job(
                test_job(&format!("Open Role {i:03}"))
                    .owned_by(other_recruiter.id)
                    .in_department(if i % 2 == 0 { "Engineering" } else { "Design" })
                    .with_salary(50 + i as i64, 100 + i as i64),
            )
        })
        .collect::<Vec<_>>();

    let candidate_id = data.candidate(test_candidate("Ada", "Lovelace").with_phone("555-0100"));
    let candidate = Caller::new(candidate_id, Role::Candidate);
    let other_candidate = data.candidate(test_candidate("Grace", "Hopper"));

    let own_application = data.application(
        test_application(own_draft_job, candidate_id).reviewed(4.5, "strong systems background"),
    );
    let other_application = data.application(
        test_application(other_draft_job, other_candidate)
            .with_status("SCREENING")
            .reviewed(3.0, "needs follow-up"),
    );
    data.application(test_application(open_jobs[0], candidate_id).with_status("SCREENING"));

    let fixture = Fixture {
        admin,
        recruiter,
        other_recruiter,
        candidate,
        other_candidate,
        own_draft_job,
        other_draft_job,
        open_jobs,
        own_application,
        other_application,
    };
    (data, fixture)
}

impl TestApp {
    pub fn new() -> Self {
        let (data, fixture) = seed();

        let registry = Arc::new(SchemaRegistry::ats_default());
        let storage = Arc::new(MemoryStorage::with_tables(registry.clone(), data.into_tables()));
        let config = Config::for_memory(JWT_SECRET);
        let state = AppState::with_storage(&config, registry, storage);

        Self {
            router: routes::router(state.clone()),
            state,
            fixture,
            tokens: TokenService::new(JWT_SECRET.as_bytes()),
        }
    }

    pub fn token_for(&self, caller: &Caller) -> String {
        self.tokens.issue(*caller, 3600).expect("Failed to sign token")
    }

    /// Send a request through the router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// `POST /api/{entity}/list` as `caller`.
    pub async fn list(&self, caller: &Caller, entity: &str, body: Value) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/{entity}/list"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token_for(caller)))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// `GET /api/{entity}/{id}` as `caller`.
    pub async fn show(&self, caller: &Caller, entity: &str, id: &str) -> Response {
        let request = Request::builder()
            .uri(format!("/api/{entity}/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token_for(caller)))
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!("Response is not JSON: {}", String::from_utf8_lossy(&body))
    })
}

pub async fn response_text(response: Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&body).to_string()
}
