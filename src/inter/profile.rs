/*!
Handlers for the profile page and profile updates.

Name, phone, student number, and (for faculty) department are the only
things a user may change here. Email is identity and the role grants are
fixed at signup; neither is reachable through this path.
*/
use std::collections::HashMap;

use axum::{
    extract::{Extension, Query},
    Form,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::user::{Department, User};

use super::*;
use super::auth::department_options;
use super::request::user_json;

pub async fn profile_page(
    Query(params): Query<HashMap<String, String>>,
    Extension(user): Extension<User>,
) -> Response {
    log::trace!("profile_page( {:?} ) called.", user.email());

    let mut data = json!({
        "user": user_json(&user),
        "active_page": "profile",
        "phone": user.phone(),
        "departments": department_options(),
    });
    match &user {
        User::Student(s) => {
            data["student_id"] = json!(&s.student_id);
        },
        User::Faculty(f) => {
            data["department"] = json!(f.department.to_string());
        },
    }

    if params.contains_key("updated") {
        data["message"] = json!("Profile updated successfully!");
    } else if let Some(flag) = params.get("error") {
        let msg = match flag.as_str() {
            "phone" => "Phone number must be 10 digits long.",
            "role" => "That update doesn't apply to your kind of account.",
            _ => "An error occurred while updating the profile.",
        };
        data["error"] = json!(msg);
    }

    serve_template(StatusCode::OK, "profile", &data, vec![])
}

#[derive(Deserialize, Debug)]
pub struct StudentProfileData {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub student_id: String,
}

pub async fn update_student_profile(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<StudentProfileData>,
) -> Response {
    log::trace!("update_student_profile( {:?} ) called.", user.email());

    let student = match &user {
        User::Student(s) => s,
        User::Faculty(_) => {
            return redirect_to("/user/profile?error=role");
        },
    };

    if !crate::user::is_valid_phone(&form.phone) {
        return redirect_to("/user/profile?error=phone");
    }

    let res = {
        glob.read().await.store().update_student_profile(
            &student.base.email,
            &form.first_name,
            &form.last_name,
            &form.phone,
            &form.student_id,
        ).await
    };

    match res {
        Err(e) => {
            log::error!(
                "Error updating student profile {:?}: {}",
                &student.base.email, e.display()
            );
            redirect_to("/user/profile?error=db")
        },
        Ok(()) => redirect_to("/user/profile?updated"),
    }
}

#[derive(Deserialize, Debug)]
pub struct FacultyProfileData {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub department: String,
}

pub async fn update_faculty_profile(
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<FacultyProfileData>,
) -> Response {
    log::trace!("update_faculty_profile( {:?} ) called.", user.email());

    let faculty = match &user {
        User::Faculty(f) => f,
        User::Student(_) => {
            return redirect_to("/user/profile?error=role");
        },
    };

    if !crate::user::is_valid_phone(&form.phone) {
        return redirect_to("/user/profile?error=phone");
    }

    let department: Department = match form.department.parse() {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Bad department in profile update: {}", &e);
            return redirect_to("/user/profile?error=department");
        },
    };

    let res = {
        glob.read().await.store().update_faculty_profile(
            &faculty.base.email,
            &form.first_name,
            &form.last_name,
            &form.phone,
            department,
        ).await
    };

    match res {
        Err(e) => {
            log::error!(
                "Error updating faculty profile {:?}: {}",
                &faculty.base.email, e.display()
            );
            redirect_to("/user/profile?error=db")
        },
        Ok(()) => redirect_to("/user/profile?updated"),
    }
}
