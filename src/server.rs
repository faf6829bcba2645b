use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::post};
use log::{error, info, warn};
use serde::Serialize;

use crate::data::{RunMetadata, SchedulingInput, SchedulingOutput};
use crate::error::TimetableError;
use crate::solver;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<RunMetadata>,
}

impl IntoResponse for TimetableError {
    fn into_response(self) -> Response {
        let status = match &self {
            TimetableError::DataIntegrity { .. } | TimetableError::NoQualifiedTeacher { .. } => {
                StatusCode::BAD_REQUEST
            }
            TimetableError::Infeasible { .. }
            | TimetableError::Timeout { .. }
            | TimetableError::Exhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TimetableError::InternalInvariantViolation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            metadata: match self {
                TimetableError::Exhausted { metadata } => Some(*metadata),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

async fn solve_handler(Json(input): Json<SchedulingInput>) -> Result<Json<SchedulingOutput>, Response> {
    info!(
        "Received request: {} courses, {} teachers, {} rooms, mode {}",
        input.courses.len(),
        input.teachers.len(),
        input.rooms.len(),
        input.config.strictness_mode
    );
    // the solver blocks for up to the configured timeout per attempt
    let result = tokio::task::spawn_blocking(move || solver::solve(&input))
        .await
        .map_err(|e| {
            error!("Solver task failed: {}", e);
            let body = ErrorBody {
                error: "internal",
                message: format!("solver task failed: {}", e),
                metadata: None,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        })?;

    match result {
        Ok(output) => Ok(Json(output)),
        Err(e) => {
            warn!("Request failed: {}", e);
            Err(e.into_response())
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/v1/timetable/solve", post(solve_handler))
}

pub async fn run_server(addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn post_json(body: Value) -> (StatusCode, Value) {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/timetable/solve")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn request(courses: Value, rooms: Value, config: Value) -> Value {
        json!({
            "departments": [{ "id": "IT", "name": "Information Technology" }],
            "teachers": [{ "email": "a@college.edu", "department": "IT" }],
            "courses": courses,
            "rooms": rooms,
            "config": config
        })
    }

    #[tokio::test]
    async fn test_solve_returns_sessions() {
        let (status, body) = post_json(request(
            json!([{ "code": "IT20001", "department": "IT", "lectureHours": 2 }]),
            json!([{ "number": "R1", "block": "A", "maxCapacity": 60 }]),
            json!({ "strictnessMode": "relaxed" }),
        ))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
        assert_eq!(body["metadata"]["modeUsed"], "relaxed");
        assert_eq!(body["sessions"][0]["teacherId"], "a@college.edu");
    }

    #[tokio::test]
    async fn test_unknown_department_is_bad_request() {
        let (status, body) = post_json(request(
            json!([{ "code": "CH10001", "department": "Chemistry", "lectureHours": 2 }]),
            json!([]),
            json!({}),
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "data_integrity");
    }

    #[tokio::test]
    async fn test_exhausted_ladder_reports_attempts() {
        let (status, body) = post_json(request(
            json!([{ "code": "IT21002", "department": "IT", "practicalHours": 2 }]),
            json!([{ "number": "R1", "block": "A", "maxCapacity": 60 }]),
            json!({ "strictnessMode": "balanced", "adaptive": true }),
        ))
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "exhausted");
        let metadata = &body["metadata"];
        assert_eq!(metadata["feasible"], false);
        assert_eq!(metadata["modeUsed"], Value::Null);
        assert_eq!(metadata["attemptsTried"], json!(["balanced", "relaxed"]));
        let attempts = metadata["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1]["mode"], "relaxed");
        assert_eq!(attempts[1]["status"], "infeasible");
    }

    #[tokio::test]
    async fn test_exhausted_body_lists_unassignable_courses() {
        let mut input = request(
            json!([
                { "code": "MA10001", "department": "MA", "lectureHours": 2 },
                { "code": "IT21002", "department": "IT", "practicalHours": 2 }
            ]),
            json!([{ "number": "R1", "block": "A", "maxCapacity": 60 }]),
            json!({ "strictnessMode": "relaxed" }),
        );
        input["departments"] = json!([
            { "id": "IT", "name": "Information Technology" },
            { "id": "MA", "name": "Mathematics" }
        ]);
        let (status, body) = post_json(input).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["metadata"]["feasible"], false);
        assert_eq!(body["metadata"]["warnings"], json!(["MA10001"]));
        assert!(body["metadata"]["solveTimeSeconds"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_is_rejected() {
        let (status, _) = post_json(request(json!([]), json!([]), json!({ "maxAttempts": 0 }))).await;
        assert!(status.is_client_error());
    }
}
