/*!
Server binary: wire the routes up and go.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Router,
    routing::{get, get_service, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;
use tower_http::services::fs::ServeDir;

use quad::config::{self, Cfg};
use quad::inter::{self, auth, dashboard, profile, request};

async fn catchall_error_handler(e: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled internal error: {}", &e)
    )
}

/// The portal proper starts at the dashboard.
async fn root_redirect() -> Response {
    inter::redirect_to("/dashboard")
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("quad")
        .build();
    TermLogger::init(
        quad::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::var("QUAD_CONFIG")
        .unwrap_or_else(|_| "quad.toml".to_owned());
    let cfg = if std::path::Path::new(&config_path).exists() {
        Cfg::from_file(&config_path).unwrap()
    } else {
        log::info!("No config file at {:?}; using defaults.", &config_path);
        Cfg::default()
    };

    inter::init(&cfg.templates_dir).unwrap();

    let glob = config::load_configuration(cfg).await.unwrap();
    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let serve_static = get_service(ServeDir::new("static"))
        .handle_error(catchall_error_handler);

    let app = Router::new()
        .route("/", get(root_redirect))
        .nest_service("/static", serve_static)
        .route("/auth/login", get(auth::login_page).post(auth::login))
        .route("/auth/logout", get(auth::logout))
        .route(
            "/auth/student-signup",
            get(auth::student_signup_page).post(auth::student_signup)
        )
        .route(
            "/auth/faculty-signup",
            get(auth::faculty_signup_page).post(auth::faculty_signup)
        )
        .route(
            "/auth/forgot-password",
            get(auth::forgot_password_page).post(auth::forgot_password)
        )
        .route(
            "/auth/reset-password",
            get(auth::reset_password_page).post(auth::reset_password)
        )
        .route("/dashboard", get(dashboard::dashboard))
        .route("/request/:request_id", get(request::request_page))
        .route("/request/comment", post(request::create_comment))
        .route("/request/withdraw", post(request::withdraw_request))
        .route("/request/approve", post(request::approve_request))
        .route("/request/reject", post(request::reject_request))
        .route(
            "/request/leaveRequest",
            get(request::leave_request_form).post(request::create_leave_request)
        )
        .route(
            "/request/housingRequest",
            get(request::housing_request_form).post(request::create_housing_request)
        )
        .route(
            "/request/courseRegistrationRequest",
            get(request::course_request_form).post(request::create_course_request)
        )
        .route("/user/profile", get(profile::profile_page))
        .route(
            "/user/update-student-profile",
            post(profile::update_student_profile)
        )
        .route(
            "/user/update-faculty-profile",
            post(profile::update_faculty_profile)
        )
        .layer(middleware::from_fn(inter::session_authenticate))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
