use std::collections::BTreeMap;

use axum::http::{Method, StatusCode};
use tower::ServiceExt;

use crate::db::models::fixtures::{assign, descriptive, exam, mcq, student};
use crate::db::models::Question;
use crate::db::types::{ExamStatus, StudentStatus};
use crate::repositories::{ExamStore, NewSubmission};
use crate::test_support::{self, TestContext};

fn attempt(answers: &[(&str, &str)], snapshot: Option<Vec<Question>>) -> NewSubmission {
    NewSubmission {
        exam_id: "exam-1".to_string(),
        student_id: "s1".to_string(),
        student_name: "Sam".to_string(),
        answers: answers.iter().map(|(q, a)| (q.to_string(), a.to_string())).collect(),
        score: 1,
        total_auto_graded: 1,
        total_questions: 2,
        question_snapshot: snapshot,
    }
}

async fn seed(ctx: &TestContext) {
    let mut stored = exam("exam-1", ExamStatus::Ongoing, &["s1"]);
    assign(&mut stored, "s1", &["q1", "q2"]);
    ctx.store
        .insert_exam(
            &stored,
            &[
                mcq("q1", &["A", "B"], "A"),
                descriptive("q2", "free text"),
                mcq("q3", &["C", "D"], "C"),
            ],
        )
        .await
        .unwrap();
}

async fn fetch(ctx: &TestContext, submission_id: &str) -> (StatusCode, serde_json::Value) {
    let token = test_support::admin_token(ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/submissions/{submission_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn detail_reviews_the_live_bank_for_the_student() {
    let ctx = test_support::setup_test_context().await;
    seed(&ctx).await;
    let submission =
        ctx.store.create_submission(attempt(&[("q1", "A"), ("q2", "essay")], None)).await.unwrap();

    let (status, body) = fetch(&ctx, &submission.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], submission.id.as_str());
    assert_eq!(body["exam_title"], "Midterm");
    assert_eq!(body["graded_against"], "live_bank");

    let review = body["review"].as_array().expect("review rows");
    let ids: Vec<&str> = review.iter().filter_map(|row| row["question_id"].as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);
    assert_eq!(review[0]["correct"], true);
    assert_eq!(review[1]["answer"], "essay");
    assert!(review[1]["correct"].is_null());
}

#[tokio::test]
async fn live_review_ignores_answers_outside_the_assignment() {
    let ctx = test_support::setup_test_context().await;
    seed(&ctx).await;
    let submission = ctx
        .store
        .create_submission(attempt(&[("q1", "B"), ("q3", "C"), ("junk", "x")], None))
        .await
        .unwrap();

    let (_, body) = fetch(&ctx, &submission.id).await;
    let ids: Vec<&str> = body["review"]
        .as_array()
        .expect("review rows")
        .iter()
        .filter_map(|row| row["question_id"].as_str())
        .collect();
    assert_eq!(ids, vec!["q1", "q2"]);
}

#[tokio::test]
async fn detail_prefers_the_frozen_questions() {
    let ctx = test_support::setup_test_context().await;
    seed(&ctx).await;
    let frozen = vec![mcq("q1", &["A", "B"], "B")];
    let submission =
        ctx.store.create_submission(attempt(&[("q1", "B")], Some(frozen))).await.unwrap();

    let (_, body) = fetch(&ctx, &submission.id).await;
    assert_eq!(body["graded_against"], "snapshot");
    assert_eq!(body["review"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["review"][0]["canonical_answer"], "B");
    assert_eq!(body["review"][0]["correct"], true);
}

#[tokio::test]
async fn detail_survives_a_deleted_exam() {
    let ctx = test_support::setup_test_context().await;
    let submission = ctx.store.create_submission(attempt(&[], None)).await.unwrap();

    let (status, body) = fetch(&ctx, &submission.id).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["exam_title"].is_null());
    assert_eq!(body["review"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_submission_is_not_found() {
    let ctx = test_support::setup_test_context().await;
    let (status, body) = fetch(&ctx, "missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Submission not found");
}

#[tokio::test]
async fn monitoring_summarises_ongoing_exams() {
    let ctx = test_support::setup_test_context().await;
    seed(&ctx).await;
    ctx.store.insert_exam(&exam("exam-2", ExamStatus::Published, &["s1"]), &[]).await.unwrap();
    ctx.store.create_submission(attempt(&[("q1", "A")], None)).await.unwrap();
    let mut missed = attempt(&[], None);
    missed.student_id = "s2".to_string();
    missed.score = 0;
    missed.answers = BTreeMap::new();
    ctx.store.create_submission(missed).await.unwrap();

    let token = test_support::admin_token(ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/monitoring", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;

    assert_eq!(body["active_sessions"], 0);
    let exams = body["exams"].as_array().expect("exams");
    assert_eq!(exams.len(), 1);
    assert_eq!(exams[0]["exam_id"], "exam-1");
    assert_eq!(exams[0]["submissions"], 2);
    assert_eq!(exams[0]["average_score"], 0.5);
}

#[tokio::test]
async fn summary_counts_students_exams_and_submissions() {
    let ctx = test_support::setup_test_context().await;
    seed(&ctx).await;
    ctx.store.insert_exam(&exam("exam-2", ExamStatus::Draft, &[]), &[]).await.unwrap();
    ctx.store.insert_student(&student("s1", StudentStatus::Active)).await.unwrap();
    ctx.store.insert_student(&student("s2", StudentStatus::Inactive)).await.unwrap();
    for student_id in ["s1", "s2", "s3", "s4", "s5", "s6"] {
        let mut submission = attempt(&[("q1", "A")], None);
        submission.student_id = student_id.to_string();
        ctx.store.create_submission(submission).await.unwrap();
    }

    let token = test_support::admin_token(ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/monitoring/summary",
            Some(&token),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;

    assert_eq!(body["totals"]["students"], 2);
    assert_eq!(body["totals"]["active_students"], 1);
    assert_eq!(body["totals"]["exams"], 2);
    assert_eq!(body["totals"]["submissions"], 6);
    assert_eq!(body["exams_by_status"]["ongoing"], 1);
    assert_eq!(body["exams_by_status"]["draft"], 1);
    assert_eq!(body["recent_submissions"].as_array().map(Vec::len), Some(5));
    assert_eq!(body["active_sessions"], 0);
}
