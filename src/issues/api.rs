use std::sync::Arc;

use axum::{
    Form, Json, Router,
    body::{Body, Bytes},
    extract::{FromRequest, Path, Query, Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::de::DeserializeOwned;

use super::models::{CreateIssueRequest, DeleteIssueRequest, UpdateIssueRequest};
use super::service::IssueService;
use crate::errors::ServiceError;

// ── Shared application state ──────────────────────────────────────────

/// How client-caused errors map onto HTTP status codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Validation and not-found errors answer 200 with an error body.
    #[default]
    Legacy,
    /// Validation errors answer 400, not-found errors 404.
    Strict,
}

impl StatusPolicy {
    pub fn from_legacy_flag(legacy: bool) -> Self {
        if legacy { Self::Legacy } else { Self::Strict }
    }
}

pub struct AppState {
    pub service: IssueService,
    pub status_policy: StatusPolicy,
}

impl AppState {
    fn reject(&self, err: ServiceError) -> ApiError {
        ApiError {
            err,
            policy: self.status_policy,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request body decoding ─────────────────────────────────────────────

/// Body accepted as JSON or as a URL-encoded form.
///
/// A request without a `Content-Type`, or with an empty body, carries no
/// payload and decodes to `T::default()`.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned + Default + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        match content_type {
            None => Ok(Self(T::default())),
            Some(ct) if ct.starts_with("application/json") => Json::<T>::from_bytes(&bytes)
                .map(|Json(body)| Self(body))
                .map_err(IntoResponse::into_response),
            Some(ct) => {
                // Form only reads the body of non-GET requests.
                let form_req = axum::http::Request::builder()
                    .method(Method::POST)
                    .header(header::CONTENT_TYPE, ct)
                    .body(Body::from(bytes))
                    .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;
                Form::<T>::from_request(form_req, state)
                    .await
                    .map(|Form(body)| Self(body))
                    .map_err(IntoResponse::into_response)
            }
        }
    }
}

// ── Error handling ────────────────────────────────────────────────────

pub struct ApiError {
    err: ServiceError,
    policy: StatusPolicy,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match (&self.err, self.policy) {
            (ServiceError::StoreFault(_), _) => StatusCode::INTERNAL_SERVER_ERROR,
            (_, StatusPolicy::Legacy) => StatusCode::OK,
            (ServiceError::Validation { .. }, StatusPolicy::Strict) => StatusCode::BAD_REQUEST,
            (ServiceError::NotFound { .. }, StatusPolicy::Strict) => StatusCode::NOT_FOUND,
        };
        let mut body = serde_json::json!({ "error": self.err.message() });
        if let Some(id) = self.err.id() {
            body["_id"] = serde_json::Value::from(id);
        }
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/issues/{project}",
            get(list_issues)
                .post(create_issue)
                .put(update_issue)
                .delete(delete_issue),
        )
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_issues(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let issues = state
        .service
        .list(&project, query)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(issues))
}

async fn create_issue(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    Payload(req): Payload<CreateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state
        .service
        .create(&project, req)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(issue))
}

async fn update_issue(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    Payload(req): Payload<UpdateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .service
        .update(&project, req)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(receipt))
}

async fn delete_issue(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    Payload(req): Payload<DeleteIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .service
        .delete(&project, req)
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::memory::InMemoryStore;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app_with(policy: StatusPolicy) -> Router {
        let state = Arc::new(AppState {
            service: IssueService::new(Arc::new(InMemoryStore::new())),
            status_policy: policy,
        });
        api_router().with_state(state)
    }

    fn test_app() -> Router {
        test_app_with(StatusPolicy::Legacy)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn create_one(app: &Router, project: &str) -> serde_json::Value {
        let request = json_request(
            "POST",
            &format!("/api/issues/{project}"),
            serde_json::json!({
                "issue_title": "Issue with every field",
                "issue_text": "Some issue text",
                "created_by": "Tester",
                "assigned_to": "Assignee",
                "status_text": "In Progress"
            }),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();

        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_issue_with_every_field() {
        let app = test_app();
        let issue = create_one(&app, "apitest").await;

        assert!(issue["_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert_eq!(issue["issue_title"], "Issue with every field");
        assert_eq!(issue["assigned_to"], "Assignee");
        assert_eq!(issue["status_text"], "In Progress");
        assert_eq!(issue["open"], true);
        assert_eq!(issue["created_on"], issue["updated_on"]);
    }

    #[tokio::test]
    async fn test_create_issue_from_form_body() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/issues/apitest")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("issue_title=T&issue_text=X&created_by=A"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let issue: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(issue["issue_title"], "T");
        assert_eq!(issue["assigned_to"], "");
        assert_eq!(issue["open"], true);
    }

    #[tokio::test]
    async fn test_create_issue_missing_required_fields() {
        let app = test_app();
        let request = json_request(
            "POST",
            "/api/issues/apitest",
            serde_json::json!({"issue_title": "Issue with missing fields"}),
        );

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body, serde_json::json!({"error": "required field(s) missing"}));

        let list = Request::builder()
            .uri("/api/issues/apitest")
            .body(Body::empty())
            .unwrap();
        let issues: Vec<serde_json::Value> =
            body_json(app.oneshot(list).await.unwrap().into_body()).await;
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_list_issues_with_filters() {
        let app = test_app();
        let first = create_one(&app, "apitest").await;
        create_one(&app, "apitest").await;
        create_one(&app, "other").await;

        let close = json_request(
            "PUT",
            "/api/issues/apitest",
            serde_json::json!({"_id": first["_id"], "open": false}),
        );
        app.clone().oneshot(close).await.unwrap();

        let all = Request::builder()
            .uri("/api/issues/apitest")
            .body(Body::empty())
            .unwrap();
        let issues: Vec<serde_json::Value> =
            body_json(app.clone().oneshot(all).await.unwrap().into_body()).await;
        assert_eq!(issues.len(), 2);

        let filtered = Request::builder()
            .uri("/api/issues/apitest?open=true&assigned_to=Assignee")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(filtered).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issues: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(issues.len(), 1);
        for issue in &issues {
            assert_eq!(issue["open"], true);
            assert_eq!(issue["assigned_to"], "Assignee");
        }
    }

    #[tokio::test]
    async fn test_update_errors_echo_id() {
        let app = test_app();
        let issue = create_one(&app, "apitest").await;

        let cases = [
            (
                serde_json::json!({"issue_title": "Update without _id"}),
                serde_json::json!({"error": "missing _id"}),
            ),
            (
                serde_json::json!({"_id": issue["_id"]}),
                serde_json::json!({"error": "no update field(s) sent", "_id": issue["_id"]}),
            ),
            (
                serde_json::json!({"_id": "invalid_id", "issue_title": "Attempt"}),
                serde_json::json!({"error": "could not update", "_id": "invalid_id"}),
            ),
        ];
        for (payload, expected) in cases {
            let response = app
                .clone()
                .oneshot(json_request("PUT", "/api/issues/apitest", payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body: serde_json::Value = body_json(response.into_body()).await;
            assert_eq!(body, expected);
        }
    }

    #[tokio::test]
    async fn test_update_multiple_fields() {
        let app = test_app();
        let issue = create_one(&app, "apitest").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/issues/apitest",
                serde_json::json!({
                    "_id": issue["_id"],
                    "issue_title": "Updated title",
                    "assigned_to": "New Assignee"
                }),
            ))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(
            body,
            serde_json::json!({"result": "successfully updated", "_id": issue["_id"]})
        );

        let list = Request::builder()
            .uri("/api/issues/apitest?assigned_to=New%20Assignee")
            .body(Body::empty())
            .unwrap();
        let issues: Vec<serde_json::Value> =
            body_json(app.oneshot(list).await.unwrap().into_body()).await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0]["issue_title"], "Updated title");
        assert_eq!(issues[0]["issue_text"], "Some issue text");
    }

    #[tokio::test]
    async fn test_delete_issue() {
        let app = test_app();
        let issue = create_one(&app, "apitest").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/api/issues/apitest",
                serde_json::json!({"_id": issue["_id"]}),
            ))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(
            body,
            serde_json::json!({"result": "successfully deleted", "_id": issue["_id"]})
        );

        let again = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/api/issues/apitest",
                serde_json::json!({"_id": issue["_id"]}),
            ))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(again.into_body()).await;
        assert_eq!(
            body,
            serde_json::json!({"error": "could not delete", "_id": issue["_id"]})
        );
    }

    #[tokio::test]
    async fn test_delete_without_body_is_missing_id() {
        let app = test_app();
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/issues/apitest")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body, serde_json::json!({"error": "missing _id"}));
    }

    #[tokio::test]
    async fn test_empty_json_body_is_an_empty_payload() {
        let app = test_app();
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/issues/apitest")
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body, serde_json::json!({"error": "missing _id"}));
    }

    #[tokio::test]
    async fn test_numeric_fields_are_read_as_text() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/issues/apitest",
                serde_json::json!({"_id": 123, "status_text": "x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(
            body,
            serde_json::json!({"error": "could not update", "_id": "123"})
        );

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/issues/apitest",
                serde_json::json!({"issue_title": 5, "issue_text": "X", "created_by": "A"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issue: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(issue["issue_title"], "5");
    }

    #[tokio::test]
    async fn test_form_update_closes_issue() {
        let app = test_app();
        let issue = create_one(&app, "apitest").await;
        let id = issue["_id"].as_str().unwrap();

        let request = Request::builder()
            .method("PUT")
            .uri("/api/issues/apitest")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("_id={id}&open=false")))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["result"], "successfully updated");

        let list = Request::builder()
            .uri("/api/issues/apitest?open=false")
            .body(Body::empty())
            .unwrap();
        let issues: Vec<serde_json::Value> =
            body_json(app.oneshot(list).await.unwrap().into_body()).await;
        assert_eq!(issues.len(), 1);
    }

    #[tokio::test]
    async fn test_strict_policy_uses_error_status_codes() {
        let app = test_app_with(StatusPolicy::Strict);

        let missing = app
            .clone()
            .oneshot(json_request("POST", "/api/issues/apitest", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(json_request(
                "DELETE",
                "/api/issues/apitest",
                serde_json::json!({"_id": "invalid_id"}),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = body_json(unknown.into_body()).await;
        assert_eq!(body["_id"], "invalid_id");
    }

    #[test]
    fn test_status_policy_from_flag() {
        assert_eq!(StatusPolicy::from_legacy_flag(true), StatusPolicy::Legacy);
        assert_eq!(StatusPolicy::from_legacy_flag(false), StatusPolicy::Strict);
    }
}
