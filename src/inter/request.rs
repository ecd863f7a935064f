/*!
Handlers for the request pages: the detail view with its comment thread,
the three creation forms, and the approve/reject/withdraw actions.
*/
use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, Query},
    Form,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;

use crate::{
    lifecycle::{self, Action, CommentOutcome, CreateOutcome, TransitionOutcome},
    request::{FieldError, Request, RequestBody, RequestForm},
    user::{Role, User},
};

use super::*;

/// The pieces of the logged-in user every page's header wants.
pub fn user_json(user: &User) -> serde_json::Value {
    json!({
        "email": user.email(),
        "first_name": user.first_name(),
        "last_name": user.last_name(),
        "is_student": user.role() == Role::Student,
        "is_faculty": user.role() == Role::Faculty,
    })
}

/// Template data for one request, detail fields and all.
pub fn request_json(r: &Request) -> serde_json::Value {
    let mut data = json!({
        "id": r.id,
        "kind": r.kind().to_string(),
        "kind_label": r.kind().label(),
        "status": r.status.to_string(),
        "is_open": r.status == crate::request::Status::Open,
        "department": r.assigned_department.label(),
        "created_by": &r.created_by,
        "created_at": r.created_at.format(crate::TIMESTAMP_FMT).unwrap_or_default(),
        "summary": r.body.summary(),
    });

    if let Some(by) = &r.approved_by {
        data["approved_by"] = json!(by);
    }
    if let Some(at) = &r.approved_at {
        data["approved_at"] = json!(at.format(crate::TIMESTAMP_FMT).unwrap_or_default());
    }

    match &r.body {
        RequestBody::LeaveOfAbsence { start_date, end_date, reason } => {
            data["start_date"] = json!(start_date.format(crate::DATE_FMT).unwrap_or_default());
            data["end_date"] = json!(end_date.format(crate::DATE_FMT).unwrap_or_default());
            data["reason"] = json!(reason);
        },
        RequestBody::StudentHousing { housing_type, duration, reason } => {
            data["housing_type"] = json!(housing_type);
            data["duration"] = json!(duration);
            data["reason"] = json!(reason);
        },
        RequestBody::CourseRegistration { course_id, semester, reason } => {
            data["course_id"] = json!(course_id);
            data["semester"] = json!(semester);
            data["reason"] = json!(reason);
        },
    }

    data
}

pub async fn request_page(
    Path(request_id): Path<i32>,
    Query(params): Query<HashMap<String, String>>,
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("request_page( {} ) called.", &request_id);

    let res = {
        glob.read().await.store().get_request_by_id(request_id).await
    };

    let request = match res {
        Err(e) => {
            log::error!(
                "Error fetching request {}: {}", &request_id, e.display()
            );
            return html_500();
        },
        Ok(None) => {
            // Nothing to show, and nothing to reveal about whether there
            // ever was.
            return redirect_to("/dashboard");
        },
        Ok(Some(r)) => r,
    };

    let comments: Vec<serde_json::Value> = request.comments.iter()
        .map(|c| json!({
            "author": &c.author,
            "body": &c.body,
            "created_at": c.created_at.format(crate::TIMESTAMP_FMT).unwrap_or_default(),
        }))
        .collect();

    let mut data = json!({
        "user": user_json(&user),
        "active_page": "dashboard",
        "request": request_json(&request),
        "comments": comments,
    });
    if params.get("error").map(String::as_str) == Some("unauthorized") {
        data["error"] = json!("You are not authorized to perform that action.");
    }

    serve_template(StatusCode::OK, "request-page", &data, vec![])
}

#[derive(Deserialize, Debug)]
pub struct CommentData {
    pub request_id: i32,
    pub body: String,
}

pub async fn create_comment(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<CommentData>,
) -> Response {
    log::trace!(
        "create_comment( {}, {:?} ) called.",
        &form.request_id, user.email()
    );

    let res = {
        let glob = glob.read().await;
        lifecycle::add_comment(
            glob.store(), form.request_id, &user, &form.body
        ).await
    };

    match res {
        Err(e) => {
            log::error!(
                "Error adding comment to request {}: {}",
                &form.request_id, e.display()
            );
            html_500()
        },
        // Found or not, back to the request page; a missing request just
        // bounces off it.
        Ok(CommentOutcome::Added(_)) | Ok(CommentOutcome::NoSuchRequest) => {
            redirect_to(&format!("/request/{}", &form.request_id))
        },
    }
}

#[derive(Deserialize, Debug)]
pub struct ActionData {
    pub request_id: i32,
}

async fn act(
    glob: Arc<RwLock<Glob>>,
    user: User,
    request_id: i32,
    action: Action,
) -> Response {
    let res = {
        let glob = glob.read().await;
        lifecycle::transition(
            glob.store(), glob.mail(), request_id, &user, action
        ).await
    };

    match res {
        Err(e) => {
            log::error!(
                "Error applying {:?} to request {}: {}",
                &action, &request_id, e.display()
            );
            html_500()
        },
        Ok(TransitionOutcome::Done(_)) | Ok(TransitionOutcome::NoSuchRequest) => {
            redirect_to(&format!("/request/{}", &request_id))
        },
        Ok(TransitionOutcome::Unauthorized) => {
            redirect_to(&format!("/request/{}?error=unauthorized", &request_id))
        },
    }
}

pub async fn approve_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ActionData>,
) -> Response {
    log::trace!("approve_request( {} ) called.", &form.request_id);
    act(glob, user, form.request_id, Action::Approve).await
}

pub async fn reject_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ActionData>,
) -> Response {
    log::trace!("reject_request( {} ) called.", &form.request_id);
    act(glob, user, form.request_id, Action::Reject).await
}

pub async fn withdraw_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ActionData>,
) -> Response {
    log::trace!("withdraw_request( {} ) called.", &form.request_id);
    act(glob, user, form.request_id, Action::Withdraw).await
}

/// Parse an `<input type="date">` value; blank or unparseable is absent,
/// and the server-side validation decides whether that's a problem.
fn parse_date_field(s: &str) -> Option<Date> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match Date::parse(s, crate::DATE_INPUT_FMT) {
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!("Unparseable date field {:?}: {}", s, &e);
            None
        },
    }
}

/// Fold per-field validation errors into template data as
/// `<field>_error` entries.
fn add_field_errors(data: &mut serde_json::Value, errors: &[FieldError]) {
    for e in errors.iter() {
        data[format!("{}_error", e.field)] = json!(e.message);
    }
}

/**
Shared tail of the three create-form POST handlers: run the lifecycle
service and translate its outcome. `form_data` is the filled-in template
data to re-render (with field errors added) when validation fails.
*/
async fn handle_create(
    glob: Arc<RwLock<Glob>>,
    user: User,
    form: RequestForm,
    template_name: &str,
    mut form_data: serde_json::Value,
) -> Response {
    let res = {
        let glob = glob.read().await;
        lifecycle::create_request(glob.store(), glob.mail(), &user, form).await
    };

    match res {
        Err(e) => {
            log::error!("Error creating request: {}", e.display());
            html_500()
        },
        Ok(CreateOutcome::Invalid(errors)) => {
            add_field_errors(&mut form_data, &errors);
            serve_template(StatusCode::OK, template_name, &form_data, vec![])
        },
        Ok(CreateOutcome::Forbidden) => redirect_to("/dashboard?error"),
        Ok(CreateOutcome::NoFacultyAssigned(d)) => serve_error_page(&format!(
            "Faculty member with department {} not found.", &d
        )),
        Ok(CreateOutcome::Created(_)) => redirect_to("/dashboard"),
    }
}

#[derive(Deserialize, Debug)]
pub struct LeaveRequestData {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn leave_request_form(
    Extension(user): Extension<User>,
) -> Response {
    log::trace!("leave_request_form() called.");

    let data = json!({
        "user": user_json(&user),
        "active_page": "leaveRequest",
    });
    serve_template(StatusCode::OK, "leave-request-form", &data, vec![])
}

pub async fn create_leave_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LeaveRequestData>,
) -> Response {
    log::trace!("create_leave_request( {:?} ) called.", user.email());

    let form_data = json!({
        "user": user_json(&user),
        "active_page": "leaveRequest",
        "start_date": &form.start_date,
        "end_date": &form.end_date,
        "reason": &form.reason,
    });
    let request_form = RequestForm::LeaveOfAbsence {
        start_date: parse_date_field(&form.start_date),
        end_date: parse_date_field(&form.end_date),
        reason: form.reason,
    };

    handle_create(glob, user, request_form, "leave-request-form", form_data).await
}

#[derive(Deserialize, Debug)]
pub struct HousingRequestData {
    #[serde(default)]
    pub housing_type: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn housing_request_form(
    Extension(user): Extension<User>,
) -> Response {
    log::trace!("housing_request_form() called.");

    let data = json!({
        "user": user_json(&user),
        "active_page": "housingRequest",
    });
    serve_template(StatusCode::OK, "housing-request-form", &data, vec![])
}

pub async fn create_housing_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<HousingRequestData>,
) -> Response {
    log::trace!("create_housing_request( {:?} ) called.", user.email());

    let form_data = json!({
        "user": user_json(&user),
        "active_page": "housingRequest",
        "housing_type": &form.housing_type,
        "duration": &form.duration,
        "reason": &form.reason,
    });
    let request_form = RequestForm::StudentHousing {
        housing_type: form.housing_type,
        duration: form.duration,
        reason: form.reason,
    };

    handle_create(glob, user, request_form, "housing-request-form", form_data).await
}

#[derive(Deserialize, Debug)]
pub struct CourseRequestData {
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn course_request_form(
    Extension(user): Extension<User>,
) -> Response {
    log::trace!("course_request_form() called.");

    let data = json!({
        "user": user_json(&user),
        "active_page": "courseRegistrationRequest",
    });
    serve_template(StatusCode::OK, "course-registration-request-form", &data, vec![])
}

pub async fn create_course_request(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<CourseRequestData>,
) -> Response {
    log::trace!("create_course_request( {:?} ) called.", user.email());

    let form_data = json!({
        "user": user_json(&user),
        "active_page": "courseRegistrationRequest",
        "course_id": &form.course_id,
        "semester": &form.semester,
        "reason": &form.reason,
    });
    let request_form = RequestForm::CourseRegistration {
        course_id: form.course_id.trim().parse::<i64>().ok(),
        semester: form.semester,
        reason: form.reason,
    };

    handle_create(glob, user, request_form, "course-registration-request-form", form_data).await
}
