use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::StudentStatus;
use crate::repositories::{ExamStore, NewSubmission};
use crate::test_support::{self, TestContext};

fn enrolment(id: &str, email: &str, number: &str) -> serde_json::Value {
    json!({"id": id, "name": format!("Student {id}"), "email": email, "studentId": number})
}

async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let token = test_support::admin_token(ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(&token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn admin_can_enrol_and_list_students() {
    let ctx = test_support::setup_test_context().await;

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/students",
        Some(enrolment("s1", "Ana@School.test", "2025-001")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "ana@school.test");
    assert_eq!(body["student_number"], "2025-001");
    assert_eq!(body["status"], "active");
    assert!(body["joined"].as_str().is_some_and(|joined| joined.len() == 10));

    let mut inactive = enrolment("s2", "ben@school.test", "2025-002");
    inactive["status"] = json!("Inactive");
    let (status, _) = send(&ctx, Method::POST, "/api/v1/students", Some(inactive)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&ctx, Method::GET, "/api/v1/students", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (_, body) = send(&ctx, Method::GET, "/api/v1/students?status=inactive", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["id"], "s2");
}

#[tokio::test]
async fn duplicate_enrolments_conflict() {
    let ctx = test_support::setup_test_context().await;
    let (status, _) =
        send(&ctx, Method::POST, "/api/v1/students", Some(enrolment("s1", "a@school.test", "1")))
            .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        send(&ctx, Method::POST, "/api/v1/students", Some(enrolment("s2", "a@school.test", "2")))
            .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("email")));

    let (status, _) =
        send(&ctx, Method::POST, "/api/v1/students", Some(enrolment("s3", "not-an-email", "3")))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn edits_change_name_number_and_status_only() {
    let ctx = test_support::setup_test_context().await;
    send(&ctx, Method::POST, "/api/v1/students", Some(enrolment("s1", "a@school.test", "1"))).await;

    let (status, body) = send(
        &ctx,
        Method::PUT,
        "/api/v1/students/s1",
        Some(json!({
            "name": "Ana Lima",
            "studentId": "1-b",
            "status": "inactive",
            "email": "changed@school.test"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ana Lima");
    assert_eq!(body["student_number"], "1-b");
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["email"], "a@school.test");

    let stored = ctx.store.find_student("s1").await.unwrap().expect("student");
    assert_eq!(stored.status, StudentStatus::Inactive);

    let (status, body) = send(
        &ctx,
        Method::PUT,
        "/api/v1/students/ghost",
        Some(json!({"name": "Nobody", "studentId": "9", "status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Student not found");
}

#[tokio::test]
async fn student_view_includes_submission_history() {
    let ctx = test_support::setup_test_context().await;
    send(&ctx, Method::POST, "/api/v1/students", Some(enrolment("s1", "a@school.test", "1"))).await;
    for exam_id in ["exam-1", "exam-2"] {
        ctx.store
            .create_submission(NewSubmission {
                exam_id: exam_id.to_string(),
                student_id: "s1".to_string(),
                student_name: "Student s1".to_string(),
                answers: Default::default(),
                score: 1,
                total_auto_graded: 2,
                total_questions: 3,
                question_snapshot: None,
            })
            .await
            .unwrap();
    }

    let (status, body) = send(&ctx, Method::GET, "/api/v1/students/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "s1");
    let submissions = body["submissions"].as_array().expect("submissions");
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|submission| submission["student_id"] == "s1"));

    let (status, body) = send(&ctx, Method::GET, "/api/v1/students/s1/submissions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, _) = send(&ctx, Method::GET, "/api/v1/students/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn students_cannot_read_the_roster() {
    let ctx = test_support::setup_test_context().await;
    let token = test_support::student_token("s1", "Sam", ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/students", Some(&token), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
