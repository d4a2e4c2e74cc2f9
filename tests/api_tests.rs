// tests/api_tests.rs

use std::sync::Arc;

use chrono::{Duration, Utc};
use exam_portal::{
    config::Config,
    models::user::{NewUser, Role},
    repository::Repositories,
    routes,
    session::SystemClock,
    state::AppState,
    utils::hash::hash_password,
};
use axum::{Json, Router, http::HeaderMap, routing::post};
use reqwest::{Response, StatusCode};
use serde_json::{Value, json};

struct TestApp {
    address: String,
    client: reqwest::Client,
    admin_token: String,
}

impl TestApp {
    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut request = self.client.post(format!("{}{}", self.address, path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    async fn get(&self, path: &str, token: &str) -> Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn login(&self, username: &str, password: &str, role: &str) -> String {
        let response = self
            .post(
                "/api/auth/login",
                None,
                json!({ "username": username, "password": password, "role": role }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login as {} failed", username);
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }
}

/// Spawns the app on a random port, backed by the in-memory store with a seeded admin.
async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let repos = Repositories::in_memory();
    repos
        .users
        .create(NewUser {
            username: "admin".to_string(),
            name: "Administrator".to_string(),
            password: Some(hash_password("admin-pass").unwrap()),
            role: Role::Admin,
            email: String::new(),
            department: String::new(),
            class: String::new(),
            semester: None,
            roll_number: String::new(),
        })
        .await
        .unwrap();

    let mut config = Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        port: 0,
        max_tab_switches: 2,
        ai_api_url: None,
        ai_api_key: None,
    };
    configure(&mut config);

    let state = AppState::new(repos, config, Arc::new(SystemClock));
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut app = TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        admin_token: String::new(),
    };
    app.admin_token = app.login("admin", "admin-pass", "admin").await;
    app
}

struct Classroom {
    teacher_token: String,
    student_token: String,
    subject_id: i64,
    question_ids: Vec<i64>,
}

/// Creates a teacher assigned to a subject with three questions (correct option 1)
/// and a student who went through first-time password setup.
async fn classroom(app: &TestApp) -> Classroom {
    let admin = Some(app.admin_token.as_str());

    let teacher = app
        .post(
            "/api/admin/teachers",
            admin,
            json!({ "username": "meera", "name": "Meera Iyer", "password": "teach-pass", "department": "CSE" }),
        )
        .await;
    assert_eq!(teacher.status(), StatusCode::CREATED);
    let teacher: Value = teacher.json().await.unwrap();

    let student = app
        .post(
            "/api/admin/students",
            admin,
            json!({ "username": "asha", "name": "Asha Rao", "class": "CSE-A", "semester": 5, "roll_number": "21CS042" }),
        )
        .await;
    assert_eq!(student.status(), StatusCode::CREATED);

    let check: Value = app
        .post("/api/auth/verify-username", None, json!({ "username": "asha", "role": "student" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(check["requires_password_setup"], json!(true));

    let set = app
        .post(
            "/api/auth/set-password",
            None,
            json!({ "username": "asha", "role": "student", "new_password": "study-hard" }),
        )
        .await;
    assert_eq!(set.status(), StatusCode::OK);
    let student_token = app.login("asha", "study-hard", "student").await;

    let subject = app
        .post(
            "/api/admin/subjects",
            admin,
            json!({ "code": "cs301", "name": "Computer Networks", "department": "CSE", "semester": 5 }),
        )
        .await;
    assert_eq!(subject.status(), StatusCode::CREATED);
    let subject: Value = subject.json().await.unwrap();
    assert_eq!(subject["code"], json!("CS301"));
    let subject_id = subject["id"].as_i64().unwrap();

    let assigned = app
        .post(
            "/api/admin/subjects/assign",
            admin,
            json!({ "subject_id": subject_id, "teacher_id": teacher["id"] }),
        )
        .await;
    assert_eq!(assigned.status(), StatusCode::OK);

    let teacher_token = app.login("meera", "teach-pass", "teacher").await;

    let mut question_ids = Vec::new();
    for text in ["Which layer routes packets?", "Which protocol is connectionless?", "What does ARP resolve?"] {
        let response = app
            .post(
                &format!("/api/teacher/subjects/{}/questions", subject_id),
                Some(&teacher_token),
                json!({ "text": text, "options": ["w", "x", "y", "z"], "correct_answer": 1, "difficulty": "easy" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let question: Value = response.json().await.unwrap();
        question_ids.push(question["id"].as_i64().unwrap());
    }

    Classroom {
        teacher_token,
        student_token,
        subject_id,
        question_ids,
    }
}

async fn deploy_exam(app: &TestApp, room: &Classroom, start_in: Duration, end_in: Duration) -> i64 {
    let now = Utc::now();
    let questions: Vec<Value> = room
        .question_ids
        .iter()
        .map(|id| json!({ "question_id": id, "marks": 2 }))
        .collect();

    let response = app
        .post(
            "/api/teacher/exams",
            Some(&room.teacher_token),
            json!({
                "title": "Networks Quiz",
                "subject_id": room.subject_id,
                "duration_minutes": 60,
                "pass_percentage": 50,
                "start_time": now + start_in,
                "end_time": now + end_in,
                "questions": questions,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let exam: Value = response.json().await.unwrap();
    assert_eq!(exam["total_marks"], json!(6));
    exam["id"].as_i64().unwrap()
}

async fn open_session(app: &TestApp, token: &str, exam_id: i64) -> Value {
    let response = app
        .post(&format!("/api/student/exams/{}/session", exam_id), Some(token), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

fn navigator_ids(state: &Value) -> Vec<i64> {
    state["navigator"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["question_id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn protected_routes_check_token_and_role() {
    let app = spawn_app().await;
    let room = classroom(&app).await;

    let anonymous = app.client.get(format!("{}/api/auth/me", app.address)).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let student_as_admin = app.get("/api/admin/teachers", &room.student_token).await;
    assert_eq!(student_as_admin.status(), StatusCode::FORBIDDEN);

    let me: Value = app.get("/api/auth/me", &room.student_token).await.json().await.unwrap();
    assert_eq!(me["username"], json!("asha"));
    assert!(me.get("password").is_none());
}

#[tokio::test]
async fn first_time_password_setup_happens_once() {
    let app = spawn_app().await;
    let admin = Some(app.admin_token.as_str());
    app.post("/api/admin/students", admin, json!({ "username": "ravi", "name": "Ravi" }))
        .await;

    let early = app
        .post("/api/auth/login", None, json!({ "username": "ravi", "password": "x", "role": "student" }))
        .await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);

    let body = json!({ "username": "ravi", "role": "student", "new_password": "first-pass" });
    assert_eq!(app.post("/api/auth/set-password", None, body.clone()).await.status(), StatusCode::OK);
    assert_eq!(app.post("/api/auth/set-password", None, body).await.status(), StatusCode::CONFLICT);

    let wrong_role = app
        .post("/api/auth/login", None, json!({ "username": "ravi", "password": "first-pass", "role": "teacher" }))
        .await;
    assert_eq!(wrong_role.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authoring_rules_are_enforced() {
    let app = spawn_app().await;
    let room = classroom(&app).await;

    let three_options = app
        .post(
            &format!("/api/teacher/subjects/{}/questions", room.subject_id),
            Some(&room.teacher_token),
            json!({ "text": "Pick one", "options": ["a", "b", "c"], "correct_answer": 0 }),
        )
        .await;
    assert_eq!(three_options.status(), StatusCode::BAD_REQUEST);

    let duplicate_code = app
        .post(
            "/api/admin/subjects",
            Some(&app.admin_token),
            json!({ "code": "CS301", "name": "Again", "department": "CSE", "semester": 5 }),
        )
        .await;
    assert_eq!(duplicate_code.status(), StatusCode::BAD_REQUEST);

    let other: Value = app
        .post(
            "/api/admin/subjects",
            Some(&app.admin_token),
            json!({ "code": "MA101", "name": "Calculus", "department": "Maths", "semester": 1 }),
        )
        .await
        .json()
        .await
        .unwrap();
    let unassigned = app
        .post(
            &format!("/api/teacher/subjects/{}/questions", other["id"]),
            Some(&room.teacher_token),
            json!({ "text": "d/dx x^2?", "options": ["x", "2x", "x^2", "2"], "correct_answer": 1 }),
        )
        .await;
    assert_eq!(unassigned.status(), StatusCode::FORBIDDEN);

    let sanitized: Value = app
        .post(
            &format!("/api/teacher/subjects/{}/questions", room.subject_id),
            Some(&room.teacher_token),
            json!({ "text": "<b>TCP</b><script>alert(1)</script>", "options": ["a", "b", "c", "d"], "correct_answer": 0 }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(sanitized["text"], json!("<b>TCP</b>"));
}

#[tokio::test]
async fn complete_attempt_is_scored_and_recorded() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::minutes(-5), Duration::hours(1)).await;
    let token = room.student_token.as_str();

    let cards: Value = app.get("/api/student/exams", token).await.json().await.unwrap();
    assert_eq!(cards[0]["status"], json!("active"));

    let state = open_session(&app, token, exam_id).await;
    let session_id = state["session_id"].as_str().unwrap().to_string();
    assert_eq!(state["phase"], json!("active"));
    assert_eq!(state["total_questions"], json!(3));
    assert!(state["current_question"].get("correct_answer").is_none());

    let resumed = open_session(&app, token, exam_id).await;
    assert_eq!(resumed["session_id"], state["session_id"]);
    assert_eq!(navigator_ids(&resumed), navigator_ids(&state));

    for question_id in navigator_ids(&state) {
        let response = app
            .post(
                &format!("/api/student/sessions/{}/answer", session_id),
                Some(token),
                json!({ "question_id": question_id, "option": 1 }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let moved: Value = app
        .post(
            &format!("/api/student/sessions/{}/navigate", session_id),
            Some(token),
            json!({ "action": "go_to", "index": 99 }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(moved["current_index"], json!(2));

    let submitted = app
        .post(&format!("/api/student/sessions/{}/submit", session_id), Some(token), json!({}))
        .await;
    assert_eq!(submitted.status(), StatusCode::OK);
    let submitted: Value = submitted.json().await.unwrap();
    assert_eq!(submitted["phase"], json!("submitted"));
    assert_eq!(submitted["result"]["percentage"], json!(100.0));
    assert_eq!(submitted["result"]["status"], json!("pass"));

    let again = app
        .post(&format!("/api/student/sessions/{}/submit", session_id), Some(token), json!({}))
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let restart = app
        .post(&format!("/api/student/exams/{}/session", exam_id), Some(token), json!({}))
        .await;
    assert_eq!(restart.status(), StatusCode::CONFLICT);

    let mine: Value = app.get("/api/student/results", token).await.json().await.unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let results: Value = app
        .get(&format!("/api/teacher/exams/{}/results", exam_id), &room.teacher_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(results[0]["student_name"], json!("Asha Rao"));

    let cards: Value = app.get("/api/student/exams", token).await.json().await.unwrap();
    assert_eq!(cards[0]["status"], json!("attended"));
}

#[tokio::test]
async fn submitting_with_blanks_needs_confirmation() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::minutes(-5), Duration::hours(1)).await;
    let token = room.student_token.as_str();

    let state = open_session(&app, token, exam_id).await;
    let session_id = state["session_id"].as_str().unwrap().to_string();
    let first = navigator_ids(&state)[0];

    app.post(
        &format!("/api/student/sessions/{}/answer", session_id),
        Some(token),
        json!({ "question_id": first, "option": 1 }),
    )
    .await;

    let flagged: Value = app
        .post(
            &format!("/api/student/sessions/{}/flag", session_id),
            Some(token),
            json!({ "question_id": first }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(flagged["navigator"][0]["status"], json!("flagged"));
    assert_eq!(flagged["navigator"][0]["selected"], json!(1));

    let unconfirmed = app
        .post(&format!("/api/student/sessions/{}/submit", session_id), Some(token), json!({}))
        .await;
    assert_eq!(unconfirmed.status(), StatusCode::CONFLICT);

    let confirmed: Value = app
        .post(
            &format!("/api/student/sessions/{}/submit", session_id),
            Some(token),
            json!({ "confirmed": true }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(confirmed["result"]["correct_answers"], json!(1));
    assert_eq!(confirmed["result"]["wrong_answers"], json!(2));
    assert_eq!(confirmed["result"]["status"], json!("fail"));

    let late_answer = app
        .post(
            &format!("/api/student/sessions/{}/answer", session_id),
            Some(token),
            json!({ "question_id": first, "option": 2 }),
        )
        .await;
    assert_eq!(late_answer.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn repeated_tab_switches_submit_automatically() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::minutes(-5), Duration::hours(1)).await;
    let token = room.student_token.as_str();

    let state = open_session(&app, token, exam_id).await;
    let path = format!("/api/student/sessions/{}/visibility", state["session_id"].as_str().unwrap());

    let mut last = Value::Null;
    for hidden in [true, false, true, false, true] {
        let response = app.post(&path, Some(token), json!({ "hidden": hidden })).await;
        assert_eq!(response.status(), StatusCode::OK);
        last = response.json().await.unwrap();
        if hidden && last["tab_switches"] == json!(2) {
            let kinds: Vec<&str> = last["notices"]
                .as_array()
                .unwrap()
                .iter()
                .filter_map(|n| n["kind"].as_str())
                .collect();
            assert!(kinds.contains(&"tab_switch_warning"));
        }
    }

    assert_eq!(last["phase"], json!("submitted"));
    let kinds: Vec<&str> = last["notices"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"integrity_violation"));

    let mine: Value = app.get("/api/student/results", token).await.json().await.unwrap();
    assert_eq!(mine[0]["total_questions"], json!(3));
}

#[tokio::test]
async fn refused_fullscreen_is_reported_and_monitoring_continues() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::minutes(-5), Duration::hours(1)).await;
    let token = room.student_token.as_str();

    let state = open_session(&app, token, exam_id).await;
    assert_eq!(state["fullscreen"], json!(true));
    let path = format!("/api/student/sessions/{}/visibility", state["session_id"].as_str().unwrap());

    let empty = app.post(&path, Some(token), json!({})).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let refused: Value = app
        .post(&path, Some(token), json!({ "fullscreen": false, "hidden": true }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(refused["fullscreen"], json!(false));
    assert_eq!(refused["tab_switches"], json!(1));
    assert_eq!(refused["phase"], json!("active"));
    let kinds: Vec<&str> = refused["notices"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"fullscreen_denied"));
}

#[tokio::test]
async fn exam_outside_window_cannot_start() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::hours(1), Duration::hours(2)).await;
    let token = room.student_token.as_str();

    let cards: Value = app.get("/api/student/exams", token).await.json().await.unwrap();
    assert_eq!(cards[0]["status"], json!("upcoming"));

    let response = app
        .post(&format!("/api/student/exams/{}/session", exam_id), Some(token), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .post("/api/student/exams/9999/session", Some(token), json!({}))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn closed_session_is_gone() {
    let app = spawn_app().await;
    let room = classroom(&app).await;
    let exam_id = deploy_exam(&app, &room, Duration::minutes(-5), Duration::hours(1)).await;
    let token = room.student_token.as_str();

    let state = open_session(&app, token, exam_id).await;
    let url = format!("{}/api/student/sessions/{}", app.address, state["session_id"].as_str().unwrap());

    let closed = app.client.delete(&url).bearer_auth(token).send().await.unwrap();
    assert_eq!(closed.status(), StatusCode::OK);
    let closed: Value = closed.json().await.unwrap();
    assert_eq!(closed["phase"], json!("closed"));

    let after = app.client.get(&url).bearer_auth(token).send().await.unwrap();
    assert_eq!(after.status(), StatusCode::NOT_FOUND);

    let mine: Value = app.get("/api/student/results", token).await.json().await.unwrap();
    assert!(mine.as_array().unwrap().is_empty());
}

/// Serves a canned model reply on a random port and returns its endpoint.
async fn spawn_model_service(candidate: &'static str) -> String {
    let app = Router::new().route(
        "/generate",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(headers["authorization"], "Bearer model-key");
            assert!(
                body["contents"][0]["parts"][0]["text"]
                    .as_str()
                    .unwrap()
                    .contains("about subnetting")
            );
            Json(json!({ "candidates": [{ "content": { "parts": [{ "text": candidate }] } }] }))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}/generate", port)
}

#[tokio::test]
async fn generated_questions_are_validated_and_stored() {
    let endpoint = spawn_model_service(
        r#"```json
[
  {"text": "How many hosts fit in a /30?", "options": ["1", "2", "4", "6"], "correct_answer": "B", "difficulty": "easy"},
  {"text": "<b>Mask</b> of a /24?<script>alert(1)</script>", "options": ["255.0.0.0", "255.255.0.0", "255.255.255.0", "255.255.255.255"], "correct_answer": "c"},
  {"text": "Broken draft", "options": ["only", "three", "options"], "correct_answer": "A"},
  {"text": "Dangling key", "options": ["a", "b", "c", "d"], "correct_answer": "F"}
]
```"#,
    )
    .await;
    let app = spawn_app_with(|config| {
        config.ai_api_url = Some(endpoint);
        config.ai_api_key = Some("model-key".to_string());
    })
    .await;
    let room = classroom(&app).await;
    let path = format!("/api/teacher/subjects/{}/questions/generate", room.subject_id);

    let blank = app
        .post(&path, Some(&room.teacher_token), json!({ "topic": "   ", "count": 4 }))
        .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(&path, Some(&room.teacher_token), json!({ "topic": "subnetting", "count": 4 }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["skipped"], json!(2));

    let created = body["created"].as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["correct_answer"], json!(1));
    assert_eq!(created[0]["difficulty"], json!("easy"));
    assert_eq!(created[1]["correct_answer"], json!(2));
    assert_eq!(created[1]["difficulty"], json!("medium"));
    assert!(!created[1]["text"].as_str().unwrap().contains("<script>"));

    let listed: Value = app
        .get(&format!("/api/teacher/subjects/{}/questions", room.subject_id), &room.teacher_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn generation_needs_a_configured_model() {
    let app = spawn_app().await;
    let room = classroom(&app).await;

    let response = app
        .post(
            &format!("/api/teacher/subjects/{}/questions/generate", room.subject_id),
            Some(&room.teacher_token),
            json!({ "topic": "subnetting", "count": 3 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
