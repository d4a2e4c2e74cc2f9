// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam, question, session, subject},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Merges the auth, admin, teacher and student sub-routers.
/// * Each role group runs `auth_middleware` first, then its role check.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://localhost:5173"),
        HeaderValue::from_static("http://127.0.0.1:5173"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/verify-username", post(auth::verify_username))
        .route("/set-password", post(auth::set_password))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let admin_routes = Router::new()
        .route("/teachers", get(admin::list_teachers).post(admin::create_teacher))
        .route(
            "/teachers/{id}",
            put(admin::update_teacher).delete(admin::delete_teacher),
        )
        .route("/students", get(admin::list_students).post(admin::create_student))
        .route(
            "/students/{id}",
            put(admin::update_student).delete(admin::delete_student),
        )
        .route("/subjects", get(subject::list_subjects).post(subject::create_subject))
        .route("/subjects/assign", post(subject::assign_teacher))
        .route("/subjects/unassign", post(subject::unassign_teacher))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let teacher_routes = Router::new()
        .route("/subjects", get(subject::list_my_subjects))
        .route(
            "/subjects/{id}/questions",
            get(question::list_questions).post(question::create_question),
        )
        .route(
            "/subjects/{id}/questions/generate",
            post(question::generate_questions),
        )
        .route(
            "/questions/{id}",
            put(question::update_question).delete(question::delete_question),
        )
        .route("/exams", get(exam::list_my_exams).post(exam::create_exam))
        .route("/exams/{id}/results", get(exam::exam_results))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let student_routes = Router::new()
        .route("/exams", get(exam::list_student_exams))
        .route("/results", get(exam::my_results))
        .route("/exams/{id}/session", post(session::start_session))
        .route(
            "/sessions/{id}",
            get(session::get_session).delete(session::close_session),
        )
        .route("/sessions/{id}/navigate", post(session::navigate))
        .route("/sessions/{id}/answer", post(session::answer))
        .route("/sessions/{id}/flag", post(session::toggle_flag))
        .route("/sessions/{id}/visibility", post(session::report_visibility))
        .route("/sessions/{id}/submit", post(session::submit))
        .route("/sessions/{id}/retry", post(session::retry_delivery))
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/student", student_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        models::user::Role,
        repository::Repositories,
        session::ManualClock,
        utils::jwt::sign_jwt,
    };

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        let config = Config {
            database_url: None,
            jwt_secret: SECRET.to_string(),
            jwt_expiration: 60,
            rust_log: "error".to_string(),
            admin_username: None,
            admin_password: None,
            port: 0,
            max_tab_switches: 2,
            ai_api_url: None,
            ai_api_key: None,
        };
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        create_router(AppState::new(Repositories::in_memory(), config, clock))
    }

    fn get(uri: &str, role: Option<Role>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(role) = role {
            let token = sign_jwt(1, "Tester", role, SECRET, 60).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let response = app().oneshot(get("/api/student/exams", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_role_groups_reject_other_roles() {
        let response = app()
            .oneshot(get("/api/admin/teachers", Some(Role::Teacher)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app()
            .oneshot(get("/api/teacher/subjects", Some(Role::Student)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_matching_role_passes() {
        let response = app()
            .oneshot(get("/api/student/exams", Some(Role::Student)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
