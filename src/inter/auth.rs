/*!
Handlers for login, logout, signup, and password recovery.

Everything under `/auth/` is reachable without a session; these are the
doors into the portal.
*/
use std::collections::HashMap;

use axum::{
    extract::{Extension, Query},
    Form,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{self, AuthResult},
    user::{BaseUser, Department},
};

use super::*;

/// Data type to read the form data from a login request.
#[derive(Deserialize, Debug)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct StudentSignupData {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub student_id: String,
}

#[derive(Deserialize, Debug)]
pub struct FacultySignupData {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub department: String,
}

/// The department list every select element is built from.
pub fn department_options() -> Vec<serde_json::Value> {
    Department::ALL.iter()
        .map(|d| json!({ "value": d.to_string(), "label": d.label() }))
        .collect()
}

pub async fn login_page(
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    log::trace!("login_page() called.");

    let mut data = json!({});
    if params.contains_key("logout") {
        data = json!({ "message": "You have been logged out." });
    }

    serve_template(StatusCode::OK, "login", &data, vec![])
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("login( {:?} ) called.", &form.email);

    let auth_response = {
        glob.read().await.auth().check_password_and_issue_key(
            &form.email,
            &form.password,
        ).await
    };

    let key = match auth_response {
        Err(e) => {
            log::error!(
                "auth::Db::check_password_and_issue_key( {:?}, ... ): {}",
                &form.email, e.display()
            );
            return html_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) | Ok(AuthResult::NoSuchUser) => {
            // The two cases render identically, so a probe can't tell an
            // unknown address from a wrong password.
            return respond_bad_password();
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?}, ... ) returned {:?}, which shouldn't ever happen.",
                &form.email, &x
            );
            return respond_bad_password();
        },
    };

    redirect_to("/dashboard").add_headers(session_cookie(&key))
}

pub async fn logout(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    headers: header::HeaderMap,
) -> Response {
    log::trace!("logout() called.");

    if let Some(key) = session_key_from_headers(&headers) {
        if let Err(e) = glob.read().await.auth().delete_key(&key).await {
            log::error!("Error deleting session key: {}", e.display());
        }
    }

    redirect_to("/auth/login?logout").add_headers(clear_session_cookie())
}

pub async fn student_signup_page() -> Response {
    log::trace!("student_signup_page() called.");

    serve_template(StatusCode::OK, "student-signup", &json!({}), vec![])
}

fn student_signup_error(form: &StudentSignupData, error: &str) -> Response {
    let data = json!({
        "error": error,
        "email": &form.email,
        "first_name": &form.first_name,
        "last_name": &form.last_name,
        "phone": &form.phone,
        "student_id": &form.student_id,
    });

    serve_template(StatusCode::OK, "student-signup", &data, vec![])
}

pub async fn student_signup(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<StudentSignupData>,
) -> Response {
    log::trace!("student_signup( {:?} ) called.", &form.email);

    if let Some(msg) = crate::user::validate_signup(
        &form.password, &form.confirm_password, &form.phone
    ) {
        return student_signup_error(&form, msg);
    }

    let hash = match auth::hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Error hashing signup password: {}", e.display());
            return html_500();
        },
    };

    let student = crate::user::Student {
        base: BaseUser {
            email: form.email.to_lowercase(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            phone: form.phone.clone(),
        },
        student_id: form.student_id.clone(),
    };

    if let Err(e) = glob.read().await.store().insert_student(&student, &hash).await {
        log::error!(
            "Error inserting student {:?}: {}",
            &student.base.email, e.display()
        );
        return student_signup_error(&form, e.display());
    }

    redirect_to("/dashboard")
}

pub async fn faculty_signup_page() -> Response {
    log::trace!("faculty_signup_page() called.");

    let data = json!({ "departments": department_options() });
    serve_template(StatusCode::OK, "faculty-signup", &data, vec![])
}

fn faculty_signup_error(form: &FacultySignupData, error: &str) -> Response {
    let data = json!({
        "error": error,
        "email": &form.email,
        "first_name": &form.first_name,
        "last_name": &form.last_name,
        "phone": &form.phone,
        "departments": department_options(),
    });

    serve_template(StatusCode::OK, "faculty-signup", &data, vec![])
}

pub async fn faculty_signup(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<FacultySignupData>,
) -> Response {
    log::trace!("faculty_signup( {:?} ) called.", &form.email);

    if let Some(msg) = crate::user::validate_signup(
        &form.password, &form.confirm_password, &form.phone
    ) {
        return faculty_signup_error(&form, msg);
    }

    let department: Department = match form.department.parse() {
        Ok(d) => d,
        Err(_) => {
            return faculty_signup_error(&form, "A department selection is required");
        },
    };

    let hash = match auth::hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Error hashing signup password: {}", e.display());
            return html_500();
        },
    };

    let faculty = crate::user::Faculty {
        base: BaseUser {
            email: form.email.to_lowercase(),
            first_name: form.first_name.clone(),
            last_name: form.last_name.clone(),
            phone: form.phone.clone(),
        },
        department,
    };

    if let Err(e) = glob.read().await.store().insert_faculty(&faculty, &hash).await {
        log::error!(
            "Error inserting faculty {:?}: {}",
            &faculty.base.email, e.display()
        );
        return faculty_signup_error(&form, e.display());
    }

    redirect_to("/dashboard")
}

pub async fn forgot_password_page(
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    log::trace!("forgot_password_page() called.");

    let data = if params.contains_key("sent") {
        json!({ "message": "Password reset link has been sent to your email." })
    } else if params.contains_key("notfound") {
        json!({ "error": "Email address not found." })
    } else if params.contains_key("duplicate") {
        json!({ "error": "Password reset link has already been sent to your email." })
    } else {
        json!({})
    };

    serve_template(StatusCode::OK, "forgot-password", &data, vec![])
}

#[derive(Deserialize, Debug)]
pub struct ForgotPasswordData {
    pub email: String,
}

pub async fn forgot_password(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ForgotPasswordData>,
) -> Response {
    log::trace!("forgot_password( {:?} ) called.", &form.email);

    let res = {
        let glob = glob.read().await;
        auth::request_reset(
            glob.store(), glob.mail(), &form.email, &glob.base_url
        ).await
    };

    match res {
        Err(e) => {
            log::error!(
                "Error starting password reset for {:?}: {}",
                &form.email, e.display()
            );
            html_500()
        },
        Ok(auth::ResetOutcome::Sent) =>
            redirect_to("/auth/forgot-password?sent"),
        Ok(auth::ResetOutcome::NoSuchUser) =>
            redirect_to("/auth/forgot-password?notfound"),
        Ok(auth::ResetOutcome::AlreadyIssued) =>
            redirect_to("/auth/forgot-password?duplicate"),
    }
}

pub async fn reset_password_page(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    log::trace!("reset_password_page() called.");

    let token = match params.get("token") {
        Some(t) => t.clone(),
        None => {
            let data = json!({ "error": "Invalid or expired token." });
            return serve_template(StatusCode::OK, "reset-password", &data, vec![]);
        },
    };

    let res = {
        glob.read().await.store()
            .validate_reset_token(&token, crate::now()).await
    };

    match res {
        Err(e) => {
            log::error!("Error validating reset token: {}", e.display());
            html_500()
        },
        Ok(None) => {
            let data = json!({ "error": "Invalid or expired token." });
            serve_template(StatusCode::OK, "reset-password", &data, vec![])
        },
        Ok(Some(_)) => {
            let data = json!({ "token": &token });
            serve_template(StatusCode::OK, "reset-password", &data, vec![])
        },
    }
}

#[derive(Deserialize, Debug)]
pub struct ResetPasswordData {
    pub token: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

pub async fn reset_password(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ResetPasswordData>,
) -> Response {
    log::trace!("reset_password( [ token ] ) called.");

    let res = {
        let glob = glob.read().await;
        auth::complete_reset(
            glob.store(),
            glob.mail(),
            &form.token,
            &form.new_password,
            &form.confirm_new_password,
        ).await
    };

    match res {
        Err(e) => {
            log::error!("Error completing password reset: {}", e.display());
            html_500()
        },
        Ok(auth::ResetCompletion::PasswordMismatch) => {
            let data = json!({
                "token": &form.token,
                "password_error": "Passwords must match.",
            });
            serve_template(StatusCode::OK, "reset-password", &data, vec![])
        },
        Ok(auth::ResetCompletion::InvalidToken) => {
            let data = json!({ "error": "Invalid or expired token." });
            serve_template(StatusCode::OK, "reset-password", &data, vec![])
        },
        Ok(auth::ResetCompletion::Done) => redirect_to("/auth/login"),
    }
}
