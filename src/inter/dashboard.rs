/*!
The dashboard: each user's front page.

Students see their own requests, grouped by kind. Faculty see the queue
for their department, minus withdrawn requests, plus anything they've
already acted on.
*/
use std::collections::HashMap;

use axum::{
    extract::{Extension, Query},
    response::Response,
};
use serde_json::json;

use crate::{
    request::{Request, RequestKind},
    user::User,
};

use super::*;
use super::request::{request_json, user_json};

fn rows(requests: &[Request]) -> Vec<serde_json::Value> {
    requests.iter().map(request_json).collect()
}

pub async fn dashboard(
    Query(params): Query<HashMap<String, String>>,
    Extension(user): Extension<User>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("dashboard( {:?} ) called.", user.email());

    let glob = glob.read().await;
    let store = glob.store();

    let (leave, housing, course) = match &user {
        User::Student(s) => {
            let email = s.base.email.as_str();
            let (leave, housing, course) = tokio::join!(
                store.get_requests_by_creator(email, RequestKind::LeaveOfAbsence),
                store.get_requests_by_creator(email, RequestKind::StudentHousing),
                store.get_requests_by_creator(email, RequestKind::CourseRegistration),
            );
            match (leave, housing, course) {
                (Ok(l), Ok(h), Ok(c)) => (l, h, c),
                (l, h, c) => {
                    for res in [l, h, c] {
                        if let Err(e) = res {
                            log::error!(
                                "Error fetching dashboard requests for {:?}: {}",
                                &s.base.email, e.display()
                            );
                        }
                    }
                    return html_500();
                },
            }
        },
        User::Faculty(f) => {
            let all = match store.get_requests_for_faculty(
                &f.base.email, f.department
            ).await {
                Ok(all) => all,
                Err(e) => {
                    log::error!(
                        "Error fetching dashboard requests for {:?}: {}",
                        &f.base.email, e.display()
                    );
                    return html_500();
                },
            };

            let mut leave: Vec<Request> = Vec::new();
            let mut housing: Vec<Request> = Vec::new();
            let mut course: Vec<Request> = Vec::new();
            for r in all.into_iter() {
                match r.kind() {
                    RequestKind::LeaveOfAbsence => leave.push(r),
                    RequestKind::StudentHousing => housing.push(r),
                    RequestKind::CourseRegistration => course.push(r),
                }
            }
            (leave, housing, course)
        },
    };

    let mut data = json!({
        "user": user_json(&user),
        "active_page": "dashboard",
        "leave_requests": rows(&leave),
        "housing_requests": rows(&housing),
        "course_requests": rows(&course),
    });
    if params.contains_key("error") {
        data["error"] = json!("You are not authorized to perform that action.");
    }

    serve_template(StatusCode::OK, "dashboard", &data, vec![])
}
