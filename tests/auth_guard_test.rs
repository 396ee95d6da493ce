mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wordschool::{
    models::Role,
    names,
    router,
    services::study::StudyConfig,
    AppState,
};

fn app(f: &common::Fixture) -> Router {
    router(AppState::new(f.db.clone(), StudyConfig::default()))
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = cookie {
        req = req.header(
            "cookie",
            format!("{}={}", names::STUDENT_SESSION_COOKIE_NAME, token),
        );
    }
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    req.body(body).expect("request build should succeed")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("router should respond");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn study_routes_reject_requests_without_a_login_cookie() {
    let f = common::seed(2).await;
    let app = app(&f);
    let phase_body = json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "test"});

    let cases = [
        (Method::POST, names::START_URL.to_string(), Some(phase_body.clone())),
        (Method::POST, names::SAVE_URL.to_string(), Some(json!({"sessionId": 1}))),
        (Method::POST, names::FINISH_URL.to_string(), Some(phase_body.clone())),
        (Method::POST, names::COMPLETE_URL.to_string(), Some(phase_body)),
        (Method::GET, names::session_url(1), None),
        (Method::DELETE, names::session_url(1), None),
        (Method::GET, names::assignment_progress_url(f.assignment_id), None),
        (Method::GET, names::daily_scores_url("2024-04-01", "2024-04-30"), None),
    ];

    for (method, uri, body) in cases {
        let (status, _) = send(&app, request(method, &uri, None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "expected UNAUTHORIZED for {uri}");
    }

    let (status, _) = send(
        &app,
        request(Method::GET, &names::session_url(1), Some("not-a-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn state_changing_requests_must_be_json() {
    let f = common::seed(2).await;
    let app = app(&f);
    let token = f.login().await;

    let req = Request::builder()
        .method(Method::POST)
        .uri(names::START_URL)
        .header("content-type", "application/x-www-form-urlencoded")
        .header(
            "cookie",
            format!("{}={}", names::STUDENT_SESSION_COOKIE_NAME, token),
        )
        .body(Body::from("assignmentId=1"))
        .expect("request build should succeed");
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "JSON body required");
}

#[tokio::test]
async fn non_student_logins_are_forbidden() {
    let f = common::seed(2).await;
    let app = app(&f);
    let token = f
        .db
        .create_student_session(f.student_id, Role::Teacher)
        .await
        .expect("create login session");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            names::START_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "wordlist"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ACCESS_DENIED");
}

#[tokio::test]
async fn students_outside_the_class_are_forbidden() {
    let f = common::seed(2).await;
    let app = app(&f);
    let outsider = f.db.create_student(f.campus_id, "Ken").await.unwrap();
    let token = f
        .db
        .create_student_session(outsider, Role::Student)
        .await
        .unwrap();

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            names::START_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "test"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request(
            Method::GET,
            &names::assignment_progress_url(f.assignment_id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_assignment_is_not_found() {
    let f = common::seed(2).await;
    let app = app(&f);
    let token = f.login().await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            names::START_URL,
            Some(&token),
            Some(json!({"assignmentId": 999, "moduleId": f.module_id, "phase": "test"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn a_test_can_be_started_saved_and_completed_over_http() {
    let f = common::seed(4).await;
    let app = app(&f);
    let token = f.login().await;

    let (status, started) = send(
        &app,
        request(
            Method::POST,
            names::START_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id.to_string(), "moduleId": f.module_id, "phase": "test"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["phase"], "test");
    assert_eq!(started["items"].as_array().map(Vec::len), Some(4));
    let session_id = started["sessionId"].as_i64().expect("session id");

    let (status, saved) = send(
        &app,
        request(
            Method::POST,
            names::SAVE_URL,
            Some(&token),
            Some(json!({"sessionId": session_id, "currentIndex": 3, "quizAnswers": {"0": 0, "1": "1", "2": 2}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved, json!({"ok": true}));

    let (status, session) = send(
        &app,
        request(Method::GET, &names::session_url(session_id), Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "IN_PROGRESS");
    assert_eq!(session["payload"]["currentIndex"], 3);

    let (status, completed) = send(
        &app,
        request(
            Method::POST,
            names::COMPLETE_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "test", "isReview": false})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed, json!({"score": 75}));

    let (status, progress) = send(
        &app,
        request(
            Method::GET,
            &names::assignment_progress_url(f.assignment_id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress[0]["completed"], true);
}

#[tokio::test]
async fn wordlist_save_reports_progress_over_http() {
    let f = common::seed(4).await;
    let app = app(&f);
    let token = f.login().await;

    let (status, started) = send(
        &app,
        request(
            Method::POST,
            names::START_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "wordlist"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["sessionId"], Value::Null);

    let (status, saved) = send(
        &app,
        request(
            Method::POST,
            names::SAVE_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "wordlist", "currentIndex": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved, json!({"ok": true, "maxIndex": 0, "progressPct": 25}));

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            names::SAVE_URL,
            Some(&token),
            Some(json!({"assignmentId": f.assignment_id, "moduleId": f.module_id, "phase": "wordlist", "currentIndex": -2})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INPUT_ERROR");
}
