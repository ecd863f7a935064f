/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and
`store`.)

The session middleware lives here: every path outside the public set needs
a valid session cookie, whose key resolves to a user that the middleware
attaches to the request for handlers downstream.
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    http::{header, Request, StatusCode},
    http::header::{HeaderName, HeaderValue},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::user::Role;

pub mod auth;
pub mod dashboard;
pub mod profile;
pub mod request;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

/// Name of the cookie the session key travels in.
pub const SESSION_COOKIE: &str = "quad_key";

/// The three request-creation paths that can be restricted to students.
static CREATE_PATHS: &[&str] = &[
    "/request/leaveRequest",
    "/request/housingRequest",
    "/request/courseRegistrationRequest",
];

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>quad | Error</title>
<link rel="stylesheet" href="/static/quad.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/**
Initializes the resources used in this module. This function should be
called before any functionality of this module or any of its submodules is
used.

Currently the only thing that happens here is loading the templates used
by `serve_template()`, which will panic unless `init()` has been called
first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// Render the generic error page with a user-visible message. The message
/// is also logged; this is the catch-all for conditions the user can't
/// fix inline (data-integrity problems and the like).
pub fn serve_error_page(message: &str) -> Response {
    log::error!("Rendering error page: {}", message);

    let data = json!({ "message": message });
    serve_template(
        StatusCode::INTERNAL_SERVER_ERROR,
        "error",
        &data,
        vec![]
    )
}

/// A SEE OTHER redirect; what every successful form POST turns into.
pub fn redirect_to(path: &str) -> Response {
    log::trace!("redirect_to( {:?} ) called.", path);

    match HeaderValue::from_str(path) {
        Ok(loc) => (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, loc)],
        ).into_response(),
        Err(e) => {
            log::error!("Unusable redirect location {:?}: {}", path, &e);
            html_500()
        },
    }
}

pub fn respond_bad_password() -> Response {
    log::trace!("respond_bad_password() called.");

    let data = json!({
        "error": "Invalid email/password combination."
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "login",
        &data,
        vec![]
    )
}

/// Set-Cookie header pair installing `key` as the session cookie.
pub fn session_cookie(key: &str) -> Vec<(HeaderName, HeaderValue)> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, key
    );
    match HeaderValue::from_str(&cookie) {
        Ok(v) => vec![(header::SET_COOKIE, v)],
        Err(e) => {
            // Keys are generated alphanumeric, so this shouldn't happen.
            log::error!("Unusable session cookie value: {}", &e);
            vec![]
        },
    }
}

/// Set-Cookie header pair wiping the session cookie.
pub fn clear_session_cookie() -> Vec<(HeaderName, HeaderValue)> {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        SESSION_COOKIE
    );
    // The value is a constant; from_str() can't fail on it.
    vec![(header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap())]
}

/// Dig the session key out of the Cookie header, if there is one.
pub fn session_key_from_headers(headers: &header::HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    for chunk in cookies.split(';') {
        let chunk = chunk.trim();
        if let Some(key) = chunk.strip_prefix(SESSION_COOKIE) {
            if let Some(key) = key.strip_prefix('=') {
                if !key.is_empty() {
                    return Some(key.to_owned());
                }
            }
        }
    }

    None
}

/// Paths reachable without a session: the login and signup pages, the
/// password-recovery flow, and static assets.
fn is_public(path: &str) -> bool {
    path == "/" || path.starts_with("/auth/") || path.starts_with("/static")
}

/**
Middleware gating everything outside the public set behind a live session.

The cookie's key is resolved to an email, the email to a `User`, and the
`User` is attached to the request for handlers downstream to extract. A
session key naming a user with no backing record means the stores have
diverged from the session table; that request is not servable.

When the student-only restriction on the request-creation paths is
switched on, non-students get bounced to the dashboard here, before any
handler runs.
*/
pub async fn session_authenticate<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let path = req.uri().path().to_owned();
    if is_public(&path) {
        return next.run(req).await;
    }

    let glob: Arc<RwLock<Glob>> = req.extensions()
        .get::<Arc<RwLock<Glob>>>()
        .unwrap()
        .clone();

    let key = match session_key_from_headers(req.headers()) {
        Some(k) => k,
        None => {
            log::trace!("No session cookie on {:?}; bouncing to login.", &path);
            return redirect_to("/auth/login");
        },
    };

    let res = glob.read().await.auth().check_key(&key).await;

    let email = match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key() returned error: {}", e.display()
            );
            return text_500(None);
        },
        Ok(AuthResult::Email(email)) => email,
        Ok(AuthResult::InvalidKey) => {
            log::trace!("Invalid session key on {:?}; bouncing to login.", &path);
            return redirect_to("/auth/login");
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            return text_500(None);
        },
    };

    let user = {
        let glob = glob.read().await;
        match glob.store().get_user_by_email(&email).await {
            Err(e) => {
                log::error!(
                    "Error resolving session user {:?}: {}",
                    &email, e.display()
                );
                return text_500(None);
            },
            Ok(Some(u)) => u,
            Ok(None) => {
                // A live session key for a nonexistent user: the session
                // table and the user store have diverged.
                log::error!(
                    "Session key resolves to {:?}, but no such user exists.",
                    &email
                );
                return text_500(None);
            },
        }
    };

    let restrict = glob.read().await.restrict_create_paths_to_students;
    if restrict
        && CREATE_PATHS.contains(&path.as_str())
        && user.role() != Role::Student
    {
        log::trace!(
            "Refusing {:?} access to {:?}.", user.email(), &path
        );
        return redirect_to("/dashboard?error");
    }

    let mut req = req;
    req.extensions_mut().insert(user);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{HeaderMap, COOKIE};

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        assert!(session_key_from_headers(&headers).is_none());

        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; quad_key=abc123; lang=en"),
        );
        assert_eq!(
            session_key_from_headers(&headers).as_deref(),
            Some("abc123")
        );

        // An empty value is no session at all.
        headers.insert(COOKIE, HeaderValue::from_static("quad_key="));
        assert!(session_key_from_headers(&headers).is_none());

        // A cookie whose name merely starts with ours doesn't match.
        headers.insert(
            COOKIE,
            HeaderValue::from_static("quad_key_other=zzz"),
        );
        assert!(session_key_from_headers(&headers).is_none());
    }

    #[test]
    fn public_paths() {
        assert!(is_public("/"));
        assert!(is_public("/auth/login"));
        assert!(is_public("/auth/reset-password"));
        assert!(is_public("/static/quad.css"));
        assert!(!is_public("/dashboard"));
        assert!(!is_public("/request/42"));
        assert!(!is_public("/request/leaveRequest"));
    }
}
