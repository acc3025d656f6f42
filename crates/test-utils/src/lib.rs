//! Talentdesk test utilities.
//!
//! Helpers for integration testing: row builders for the applicant-tracking
//! entities, a dataset that collects them into storage tables, and JSON
//! assertion helpers.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

/// Timestamp every fixture clock starts from.
fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
}

/// Create a test user with the given role.
pub fn test_user(name: &str, role: &str) -> TestUser {
    TestUser {
        id: Uuid::now_v7(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        role: role.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn to_row(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "name": self.name,
            "email": self.email,
            "role": self.role,
        })
    }
}

/// Create an open test job with no owner.
pub fn test_job(title: &str) -> TestJob {
    TestJob {
        id: Uuid::now_v7(),
        title: title.to_string(),
        department: "Engineering".to_string(),
        location: "Remote".to_string(),
        status: "OPEN".to_string(),
        salary_min: None,
        salary_max: None,
        owner_id: None,
    }
}

/// A job row builder.
#[derive(Debug, Clone)]
pub struct TestJob {
    pub id: Uuid,
    pub title: String,
    pub department: String,
    pub location: String,
    pub status: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub owner_id: Option<Uuid>,
}

impl TestJob {
    pub fn owned_by(mut self, owner: Uuid) -> Self {
        self.owner_id = Some(owner);
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    /// Mark as a draft, hidden from candidates.
    pub fn draft(self) -> Self {
        self.with_status("DRAFT")
    }

    pub fn closed(self) -> Self {
        self.with_status("CLOSED")
    }

    pub fn with_salary(mut self, min: i64, max: i64) -> Self {
        self.salary_min = Some(min);
        self.salary_max = Some(max);
        self
    }

    pub fn in_department(mut self, department: &str) -> Self {
        self.department = department.to_string();
        self
    }

    pub fn to_row(&self, created_at: DateTime<Utc>) -> Value {
        json!({
            "id": self.id.to_string(),
            "title": self.title,
            "description": format!("{} role", self.title),
            "department": self.department,
            "location": self.location,
            "status": self.status,
            "salaryMin": self.salary_min,
            "salaryMax": self.salary_max,
            "ownerId": self.owner_id.map(|id| id.to_string()),
            "createdAt": created_at.to_rfc3339(),
        })
    }
}

/// Create a test candidate.
pub fn test_candidate(first_name: &str, last_name: &str) -> TestCandidate {
    TestCandidate {
        id: Uuid::now_v7(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: format!(
            "{}.{}@example.com",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        ),
        phone: None,
    }
}

#[derive(Debug, Clone)]
pub struct TestCandidate {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl TestCandidate {
    /// Use an existing id, e.g. the id a candidate token is issued for.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn to_row(&self, created_at: DateTime<Utc>) -> Value {
        json!({
            "id": self.id.to_string(),
            "firstName": self.first_name,
            "lastName": self.last_name,
            "email": self.email,
            "phone": self.phone,
            "createdAt": created_at.to_rfc3339(),
        })
    }
}

/// Create a new application of `candidate` to `job`.
pub fn test_application(job: Uuid, candidate: Uuid) -> TestApplication {
    TestApplication {
        id: Uuid::now_v7(),
        job_id: job,
        candidate_id: candidate,
        status: "NEW".to_string(),
        score: None,
        review_notes: None,
    }
}

#[derive(Debug, Clone)]
pub struct TestApplication {
    pub id: Uuid,
    pub job_id: Uuid,
    pub candidate_id: Uuid,
    pub status: String,
    pub score: Option<f64>,
    pub review_notes: Option<String>,
}

impl TestApplication {
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    /// Set the recruiter-only review fields.
    pub fn reviewed(mut self, score: f64, notes: &str) -> Self {
        self.score = Some(score);
        self.review_notes = Some(notes.to_string());
        self
    }

    pub fn to_row(&self, created_at: DateTime<Utc>) -> Value {
        json!({
            "id": self.id.to_string(),
            "jobId": self.job_id.to_string(),
            "candidateId": self.candidate_id.to_string(),
            "status": self.status,
            "score": self.score,
            "reviewNotes": self.review_notes,
            "createdAt": created_at.to_rfc3339(),
        })
    }
}

/// Rows for every entity, in insertion order.
///
/// Each added row gets a `createdAt` one minute after the previous one, so
/// sorting by creation time is deterministic.
#[derive(Debug, Default)]
pub struct Dataset {
    tables: HashMap<String, Vec<Value>>,
    added: i64,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.added += 1;
        epoch() + Duration::minutes(self.added)
    }

    fn push(&mut self, entity: &str, row: Value) {
        self.tables.entry(entity.to_string()).or_default().push(row);
    }

    pub fn user(&mut self, user: TestUser) -> Uuid {
        self.push("users", user.to_row());
        user.id
    }

    pub fn job(&mut self, job: TestJob) -> Uuid {
        let row = job.to_row(self.next_timestamp());
        self.push("jobs", row);
        job.id
    }

    pub fn candidate(&mut self, candidate: TestCandidate) -> Uuid {
        let row = candidate.to_row(self.next_timestamp());
        self.push("candidates", row);
        candidate.id
    }

    pub fn application(&mut self, application: TestApplication) -> Uuid {
        let row = application.to_row(self.next_timestamp());
        self.push("applications", row);
        application.id
    }

    /// Rows added so far for `entity`.
    pub fn rows(&self, entity: &str) -> &[Value] {
        self.tables.get(entity).map_or(&[], Vec::as_slice)
    }

    pub fn into_tables(self) -> HashMap<String, Vec<Value>> {
        self.tables
    }

    /// The dataset as a seed document: `{"entity": [rows]}`.
    pub fn to_json(&self) -> Value {
        json!(self.tables)
    }
}

/// Assertion helpers for JSON responses.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value does not have a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to NOT have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// The `id` of every row in a list response's `data`.
    pub fn ids(response: &Value) -> Vec<String> {
        response["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
