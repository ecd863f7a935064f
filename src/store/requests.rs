/*
`Store` methods for request rows and their comments.

All three request variants share the `requests` table; `request_type` is
the discriminator and decides which of the nullable variant columns are
meaningful. Comments hang off a request and go away with it
(`ON DELETE CASCADE`).
*/
use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{Store, DbError};
use crate::request::{Comment, Request, RequestBody, RequestKind, Status};
use crate::user::Department;

static SELECT_REQUEST: &str =
    "SELECT id, request_type, assigned_department, status,
            created_at, created_by, approved_at, approved_by,
            start_date, end_date, housing_type, duration,
            course_id, semester, reason
        FROM requests";

/// A variant column that must be non-NULL on rows of its own discriminator.
fn required<T>(field: &str, id: i32, value: Option<T>) -> Result<T, DbError> {
    value.ok_or_else(|| DbError(format!(
        "Request {} is missing its {} column.", id, field
    )))
}

fn request_from_row(row: &Row) -> Result<Request, DbError> {
    let id: i32 = row.try_get("id")?;

    let kind_str: &str = row.try_get("request_type")?;
    let kind: RequestKind = kind_str.parse()?;

    let reason: Option<String> = row.try_get("reason")?;
    let reason = reason.unwrap_or_default();

    let body = match kind {
        RequestKind::LeaveOfAbsence => RequestBody::LeaveOfAbsence {
            start_date: required("start_date", id, row.try_get("start_date")?)?,
            end_date: required("end_date", id, row.try_get("end_date")?)?,
            reason,
        },
        RequestKind::StudentHousing => RequestBody::StudentHousing {
            housing_type: required("housing_type", id, row.try_get("housing_type")?)?,
            duration: required("duration", id, row.try_get("duration")?)?,
            reason,
        },
        RequestKind::CourseRegistration => RequestBody::CourseRegistration {
            course_id: required("course_id", id, row.try_get("course_id")?)?,
            semester: required("semester", id, row.try_get("semester")?)?,
            reason,
        },
    };

    let dept_str: &str = row.try_get("assigned_department")?;
    let status_str: &str = row.try_get("status")?;

    Ok(Request {
        id,
        assigned_department: dept_str.parse::<Department>()?,
        status: status_str.parse::<Status>()?,
        created_at: row.try_get("created_at")?,
        created_by: row.try_get("created_by")?,
        approved_at: row.try_get("approved_at")?,
        approved_by: row.try_get("approved_by")?,
        body,
        comments: Vec::new(),
    })
}

fn comment_from_row(row: &Row) -> Result<Comment, DbError> {
    Ok(Comment {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        author: row.try_get("email")?,
        body: row.try_get("body")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    /**
    Insert a new request row.

    The caller supplies only the creator and the validated body; the
    assigned department comes from the kind's fixed routing, and the status
    of every new request is `open`. Returns the stored `Request`, id and
    all.
    */
    pub async fn insert_request(
        &self,
        created_by: &str,
        created_at: OffsetDateTime,
        body: &RequestBody,
    ) -> Result<Request, DbError> {
        log::trace!(
            "Store::insert_request( {:?}, [ {} ] ) called.",
            created_by, body.kind()
        );

        let kind = body.kind();
        let department = kind.department();
        let status = Status::Open;

        let (start_date, end_date, housing_type, duration, course_id, semester, reason) =
            match body {
                RequestBody::LeaveOfAbsence { start_date, end_date, reason } => (
                    Some(*start_date), Some(*end_date),
                    None, None, None, None, reason.as_str(),
                ),
                RequestBody::StudentHousing { housing_type, duration, reason } => (
                    None, None,
                    Some(housing_type.as_str()), Some(duration.as_str()),
                    None, None, reason.as_str(),
                ),
                RequestBody::CourseRegistration { course_id, semester, reason } => (
                    None, None, None, None,
                    Some(*course_id), Some(semester.as_str()), reason.as_str(),
                ),
            };

        let client = self.connect().await?;

        let row = client.query_one(
            "INSERT INTO requests (
                request_type, assigned_department, status,
                created_at, created_by,
                start_date, end_date, housing_type, duration,
                course_id, semester, reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id",
            &[
                &kind.to_string(), &department.to_string(), &status.to_string(),
                &created_at, &created_by,
                &start_date, &end_date, &housing_type, &duration,
                &course_id, &semester, &reason,
            ]
        ).await?;
        let id: i32 = row.try_get("id")?;

        log::trace!("Inserted {} request [ id {} ].", kind, &id);

        Ok(Request {
            id,
            assigned_department: department,
            status,
            created_at,
            created_by: created_by.to_owned(),
            approved_at: None,
            approved_by: None,
            body: body.clone(),
            comments: Vec::new(),
        })
    }

    /// Fetch one request with its comments, oldest comment first.
    pub async fn get_request_by_id(
        &self,
        id: i32,
    ) -> Result<Option<Request>, DbError> {
        log::trace!("Store::get_request_by_id( {} ) called.", &id);

        let client = self.connect().await?;

        let query = format!("{} WHERE id = $1", SELECT_REQUEST);
        let mut request = match client.query_opt(query.as_str(), &[&id]).await? {
            None => { return Ok(None); },
            Some(row) => request_from_row(&row)
                .map_err(|e| e.annotate("Unable to build Request from row"))?,
        };

        let rows = client.query(
            "SELECT id, request_id, email, body, created_at
                FROM comments WHERE request_id = $1
                ORDER BY created_at, id",
            &[&id]
        ).await?;
        let mut comments: Vec<Comment> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            comments.push(
                comment_from_row(row)
                    .map_err(|e| e.annotate("Unable to build Comment from row"))?
            );
        }
        request.comments = comments;

        Ok(Some(request))
    }

    /**
    Overwrite a request's status.

    There is deliberately no status precondition: the last writer wins, and
    re-applying the status a request already has is a no-op in effect.
    `approval` carries the acting faculty member and timestamp on approve
    and reject; a withdrawal records neither. Returns whether a row with
    that id existed to be updated.
    */
    pub async fn set_status(
        &self,
        id: i32,
        status: Status,
        approval: Option<(&str, OffsetDateTime)>,
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::set_status( {}, {}, {:?} ) called.",
            &id, &status, &approval
        );

        let client = self.connect().await?;

        let n = match approval {
            Some((approver, when)) => client.execute(
                "UPDATE requests
                    SET status = $1, approved_by = $2, approved_at = $3
                    WHERE id = $4",
                &[&status.to_string(), &approver, &when, &id]
            ).await?,
            None => client.execute(
                "UPDATE requests SET status = $1 WHERE id = $2",
                &[&status.to_string(), &id]
            ).await?,
        };

        match n {
            0 => Ok(false),
            1 => Ok(true),
            n => {
                log::warn!(
                    "Setting status of single request {} affected {} rows.",
                    &id, &n
                );
                Ok(true)
            },
        }
    }

    /// Append a comment. Returns `None` if no such request exists.
    pub async fn insert_comment(
        &self,
        request_id: i32,
        author: &str,
        body: &str,
        created_at: OffsetDateTime,
    ) -> Result<Option<Comment>, DbError> {
        log::trace!(
            "Store::insert_comment( {}, {:?}, ... ) called.",
            &request_id, author
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        if t.query_opt(
            "SELECT id FROM requests WHERE id = $1",
            &[&request_id]
        ).await?.is_none() {
            return Ok(None);
        }

        let row = t.query_one(
            "INSERT INTO comments (request_id, email, body, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&request_id, &author, &body, &created_at]
        ).await?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;

        Ok(Some(Comment {
            id,
            request_id,
            author: author.to_owned(),
            body: body.to_owned(),
            created_at,
        }))
    }

    /// A student's own requests of one kind, newest first. Comments are not
    /// loaded; the dashboard doesn't show them.
    pub async fn get_requests_by_creator(
        &self,
        email: &str,
        kind: RequestKind,
    ) -> Result<Vec<Request>, DbError> {
        log::trace!(
            "Store::get_requests_by_creator( {:?}, {} ) called.",
            email, &kind
        );

        let client = self.connect().await?;

        let query = format!(
            "{} WHERE created_by = $1 AND request_type = $2
                ORDER BY created_at DESC, id DESC",
            SELECT_REQUEST
        );
        let rows = client.query(
            query.as_str(),
            &[&email, &kind.to_string()]
        ).await?;

        let mut requests: Vec<Request> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            requests.push(
                request_from_row(row)
                    .map_err(|e| e.annotate("Unable to build Request from row"))?
            );
        }

        Ok(requests)
    }

    /**
    The requests a faculty member sees on the dashboard: everything they
    have already acted on, plus everything still routed to their department
    that hasn't been withdrawn.
    */
    pub async fn get_requests_for_faculty(
        &self,
        email: &str,
        department: Department,
    ) -> Result<Vec<Request>, DbError> {
        log::trace!(
            "Store::get_requests_for_faculty( {:?}, {} ) called.",
            email, &department
        );

        let client = self.connect().await?;

        let query = format!(
            "{} WHERE approved_by = $1
                OR (assigned_department = $2 AND status <> $3)
                ORDER BY created_at DESC, id DESC",
            SELECT_REQUEST
        );
        let rows = client.query(
            query.as_str(),
            &[
                &email,
                &department.to_string(),
                &Status::Withdrawn.to_string(),
            ]
        ).await?;

        let mut requests: Vec<Request> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            requests.push(
                request_from_row(row)
                    .map_err(|e| e.annotate("Unable to build Request from row"))?
            );
        }

        Ok(requests)
    }
}
