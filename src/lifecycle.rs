/*!
The request lifecycle: creation, review actions, comments.

A request is born `open` and is assigned its department once, from its
kind. The only transitions are the three review actions, each gated on the
actor's role, and each lands in a terminal status:

```text
            approve -> approved
open  --->  reject  -> rejected
            withdraw-> withdrawn
```

There is no transition out of a terminal status, but neither is there a
precondition guarding one: whoever writes last wins, and repeating an
action converges on its result instead of erroring.

Functions here take their collaborators (`Store`, `Mailer`) as arguments;
nothing is reached through a global. The notification at the end of each
operation is best-effort, with one exception: a request whose department
has no faculty member at all cannot be routed, and that is reported to the
caller rather than logged away.
*/
use crate::notify::Mailer;
use crate::request::{Comment, FieldError, Request, RequestForm, Status};
use crate::store::{DbError, Store};
use crate::user::{Department, User};

/// What a reviewer can do to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
    Withdraw,
}

impl Action {
    pub fn target(&self) -> Status {
        match self {
            Action::Approve => Status::Approved,
            Action::Reject => Status::Rejected,
            Action::Withdraw => Status::Withdrawn,
        }
    }
}

#[derive(Debug)]
pub enum CreateOutcome {
    Created(Request),
    /// Field validation failed; every failing field is named. Nothing was
    /// persisted and no mail went out.
    Invalid(Vec<FieldError>),
    /// Faculty don't file requests. Nothing was persisted.
    Forbidden,
    /// The request WAS persisted and the creator notified, but the
    /// assigned department has no faculty member to route it to. This is a
    /// data-integrity problem the user gets told about.
    NoFacultyAssigned(Department),
}

/**
Validate and file a new request on behalf of `creator`.

Validation reports all field failures together. A faculty creator is
refused before anything is written. On success the request is stored
`open`, routed to its kind's department, and two notices go out: a
confirmation to the creator and a review alert to the department's faculty
member.
*/
pub async fn create_request(
    store: &Store,
    mail: &dyn Mailer,
    creator: &User,
    form: RequestForm,
) -> Result<CreateOutcome, DbError> {
    log::trace!(
        "create_request( {:?}, [ {} form ] ) called.",
        creator.email(), form.kind()
    );

    let errors = form.validate();
    if !errors.is_empty() {
        log::trace!("    ...{} validation errors.", errors.len());
        return Ok(CreateOutcome::Invalid(errors));
    }

    if let User::Faculty(_) = creator {
        log::trace!("    ...refusing request creation by faculty.");
        return Ok(CreateOutcome::Forbidden);
    }

    let body = form.into_body()
        .map_err(|field| DbError(format!(
            "Validated form still missing {:?}.", &field
        )))?;

    let request = store.insert_request(creator.email(), crate::now(), &body).await?;
    log::info!(
        "{} filed {} request [ id {} ].",
        creator.email(), request.kind(), &request.id
    );

    mail.creation_confirmation(&request, creator.email()).await;

    let department = request.assigned_department;
    let faculty = match store.get_faculty_by_department(department).await? {
        Some(f) => f,
        None => {
            log::error!(
                "No faculty member assigned to {}; request {} cannot be routed.",
                &department, &request.id
            );
            return Ok(CreateOutcome::NoFacultyAssigned(department));
        },
    };

    mail.creation_alert(&request, creator, &faculty.base.email).await;

    Ok(CreateOutcome::Created(request))
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Done(Request),
    /// No request with that id. Callers redirect without comment, so a
    /// probe can't learn which ids exist.
    NoSuchRequest,
    /// The actor's role doesn't permit this action; callers redirect with
    /// an error flag rather than failing the whole operation.
    Unauthorized,
}

/**
Apply a review action to a request.

Approve and reject are faculty actions and record who acted and when;
withdraw is a student action and records neither. Note that ANY student
may withdraw ANY request, not just their own; see DESIGN.md.

The status write is the durable fact. The notice to the creator afterward
is best-effort, and a mail failure never unwinds the change.
*/
pub async fn transition(
    store: &Store,
    mail: &dyn Mailer,
    request_id: i32,
    actor: &User,
    action: Action,
) -> Result<TransitionOutcome, DbError> {
    log::trace!(
        "transition( {}, {:?}, {:?} ) called.",
        &request_id, actor.email(), &action
    );

    let approval_time = crate::now();
    let approval = match (&action, actor) {
        (Action::Approve | Action::Reject, User::Student(_)) => {
            log::trace!("    ...student may not {:?}.", &action);
            return Ok(TransitionOutcome::Unauthorized);
        },
        (Action::Approve | Action::Reject, User::Faculty(_)) => {
            Some((actor.email(), approval_time))
        },
        (Action::Withdraw, User::Faculty(_)) => {
            log::trace!("    ...faculty may not withdraw.");
            return Ok(TransitionOutcome::Unauthorized);
        },
        (Action::Withdraw, User::Student(_)) => None,
    };

    let target = action.target();
    if !store.set_status(request_id, target, approval).await? {
        return Ok(TransitionOutcome::NoSuchRequest);
    }

    let request = match store.get_request_by_id(request_id).await? {
        Some(r) => r,
        // Deleted out from under us between the write and the read.
        None => { return Ok(TransitionOutcome::NoSuchRequest); },
    };

    log::info!(
        "{} set request [ id {} ] to {}.",
        actor.email(), &request_id, &target
    );

    mail.status_change(&request, &request.created_by).await;

    Ok(TransitionOutcome::Done(request))
}

#[derive(Debug)]
pub enum CommentOutcome {
    Added(Comment),
    NoSuchRequest,
}

/// Append a comment to a request. Any authenticated user may comment on
/// any request, in any status, terminal ones included.
pub async fn add_comment(
    store: &Store,
    request_id: i32,
    author: &User,
    body: &str,
) -> Result<CommentOutcome, DbError> {
    log::trace!(
        "add_comment( {}, {:?}, ... ) called.",
        &request_id, author.email()
    );

    match store.insert_comment(request_id, author.email(), body, crate::now()).await? {
        None => Ok(CommentOutcome::NoSuchRequest),
        Some(comment) => Ok(CommentOutcome::Added(comment)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::notify::recording::{RecordingMailer, Sent};
    use crate::request::RequestKind;
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::*;

    static STUDENT: &str = "jdoe@university.edu";
    static OTHER_STUDENT: &str = "msmith@university.edu";
    static HOUSING_FACULTY: &str = "jprine@university.edu";

    fn student(email: &str, student_id: &str) -> User {
        User::Student(Student {
            base: BaseUser {
                email: email.to_owned(),
                first_name: "John".to_owned(),
                last_name: "Doe".to_owned(),
                phone: "9195551234".to_owned(),
            },
            student_id: student_id.to_owned(),
        })
    }

    fn faculty(email: &str, department: Department) -> User {
        User::Faculty(Faculty {
            base: BaseUser {
                email: email.to_owned(),
                first_name: "Janet".to_owned(),
                last_name: "Prine".to_owned(),
                phone: "9195550000".to_owned(),
            },
            department,
        })
    }

    /// Fresh schema, one student, one other student, and a housing-office
    /// faculty member. Tests that need more insert it themselves.
    async fn fixture() -> (Store, RecordingMailer, User, User, User) {
        let store = Store::new(TEST_CONNECTION.to_owned());
        store.ensure_db_schema().await.unwrap();

        let stud = student(STUDENT, "1333567");
        let other = student(OTHER_STUDENT, "7654321");
        let fac = faculty(HOUSING_FACULTY, Department::HousingOffice);

        match (&stud, &other, &fac) {
            (User::Student(s), User::Student(o), User::Faculty(f)) => {
                store.insert_student(s, "$2b$12$notaverygoodhash").await.unwrap();
                store.insert_student(o, "$2b$12$notaverygoodhash").await.unwrap();
                store.insert_faculty(f, "$2b$12$notaverygoodhash").await.unwrap();
            },
            _ => unreachable!(),
        }

        (store, RecordingMailer::new(), stud, other, fac)
    }

    fn housing_form() -> RequestForm {
        RequestForm::StudentHousing {
            housing_type: "Single Room".to_owned(),
            duration: "1 Semester".to_owned(),
            reason: "closer to campus".to_owned(),
        }
    }

    async fn file_housing_request(store: &Store, mail: &RecordingMailer, stud: &User) -> Request {
        match create_request(store, mail, stud, housing_form()).await.unwrap() {
            CreateOutcome::Created(r) => r,
            x => panic!("expected Created, got {:?}", &x),
        }
    }

    #[tokio::test]
    #[serial]
    async fn create_routes_and_notifies() {
        ensure_logging();
        let (store, mail, stud, _, _) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        assert_eq!(req.status, Status::Open);
        assert_eq!(req.assigned_department, Department::HousingOffice);
        assert_eq!(&req.created_by, STUDENT);

        let sent = mail.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            Sent::CreationConfirmation { request_id: req.id, to: STUDENT.to_owned() }
        );
        assert_eq!(
            sent[1],
            Sent::CreationAlert { request_id: req.id, to: HOUSING_FACULTY.to_owned() }
        );

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn invalid_form_persists_and_sends_nothing() {
        ensure_logging();
        let (store, mail, stud, _, _) = fixture().await;

        let form = RequestForm::StudentHousing {
            housing_type: "".to_owned(),
            duration: "1 Semester".to_owned(),
            reason: String::new(),
        };
        match create_request(&store, &mail, &stud, form).await.unwrap() {
            CreateOutcome::Invalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "housing_type");
            },
            x => panic!("expected Invalid, got {:?}", &x),
        }

        assert!(
            store.get_requests_by_creator(STUDENT, RequestKind::StudentHousing)
                .await.unwrap().is_empty()
        );
        assert!(mail.sent().is_empty());

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn faculty_may_not_create() {
        ensure_logging();
        let (store, mail, _, _, fac) = fixture().await;

        match create_request(&store, &mail, &fac, housing_form()).await.unwrap() {
            CreateOutcome::Forbidden => {},
            x => panic!("expected Forbidden, got {:?}", &x),
        }

        assert!(
            store.get_requests_by_creator(HOUSING_FACULTY, RequestKind::StudentHousing)
                .await.unwrap().is_empty()
        );
        assert!(mail.sent().is_empty());

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn unroutable_department_is_surfaced() {
        ensure_logging();
        let (store, mail, stud, _, _) = fixture().await;

        // Leave requests route to Student Affairs, which has no faculty in
        // this fixture.
        let form = RequestForm::LeaveOfAbsence {
            start_date: Some(date!(2026 - 05 - 01)),
            end_date: Some(date!(2026 - 05 - 20)),
            reason: "family".to_owned(),
        };
        match create_request(&store, &mail, &stud, form).await.unwrap() {
            CreateOutcome::NoFacultyAssigned(d) => {
                assert_eq!(d, Department::StudentAffairs);
            },
            x => panic!("expected NoFacultyAssigned, got {:?}", &x),
        }

        // The request itself was still filed, and the creator still got
        // their confirmation; only the review alert had nowhere to go.
        let listed = store.get_requests_by_creator(STUDENT, RequestKind::LeaveOfAbsence)
            .await.unwrap();
        assert_eq!(listed.len(), 1);
        let sent = mail.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Sent::CreationConfirmation { .. }));

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn students_may_not_approve_or_reject() {
        ensure_logging();
        let (store, mail, stud, other, _) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        for action in [Action::Approve, Action::Reject] {
            match transition(&store, &mail, req.id, &other, action).await.unwrap() {
                TransitionOutcome::Unauthorized => {},
                x => panic!("expected Unauthorized, got {:?}", &x),
            }
        }

        // Blocked before persistence: still open.
        let fetched = store.get_request_by_id(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Open);

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn faculty_may_not_withdraw() {
        ensure_logging();
        let (store, mail, stud, _, fac) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        match transition(&store, &mail, req.id, &fac, Action::Withdraw).await.unwrap() {
            TransitionOutcome::Unauthorized => {},
            x => panic!("expected Unauthorized, got {:?}", &x),
        }
        let fetched = store.get_request_by_id(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Open);

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn any_student_may_withdraw() {
        ensure_logging();
        let (store, mail, stud, other, _) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        // `other` did not create this request, and may nonetheless
        // withdraw it. Intentional fidelity to current behavior.
        match transition(&store, &mail, req.id, &other, Action::Withdraw).await.unwrap() {
            TransitionOutcome::Done(r) => {
                assert_eq!(r.status, Status::Withdrawn);
                assert!(r.approved_by.is_none());
            },
            x => panic!("expected Done, got {:?}", &x),
        }

        // The status notice goes to the creator, not the withdrawer.
        let sent = mail.sent();
        assert_eq!(
            sent.last().unwrap(),
            &Sent::StatusChange {
                request_id: req.id,
                to: STUDENT.to_owned(),
                status: "withdrawn".to_owned(),
            }
        );

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn reject_round_trip() {
        ensure_logging();
        let (store, mail, stud, _, fac) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        match transition(&store, &mail, req.id, &fac, Action::Reject).await.unwrap() {
            TransitionOutcome::Done(_) => {},
            x => panic!("expected Done, got {:?}", &x),
        }

        let fetched = store.get_request_by_id(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Rejected);
        assert_eq!(&fetched.created_by, STUDENT);
        assert_eq!(fetched.approved_by.as_deref(), Some(HOUSING_FACULTY));
        assert!(fetched.approved_at.is_some());

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn repeated_transitions_converge() {
        ensure_logging();
        let (store, mail, stud, _, fac) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;

        for action in [Action::Approve, Action::Reject, Action::Reject] {
            match transition(&store, &mail, req.id, &fac, action).await.unwrap() {
                TransitionOutcome::Done(_) => {},
                x => panic!("expected Done, got {:?}", &x),
            }
        }

        let fetched = store.get_request_by_id(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Status::Rejected);

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn missing_request_is_a_quiet_no() {
        ensure_logging();
        let (store, mail, stud, _, fac) = fixture().await;

        match transition(&store, &mail, 10_000, &fac, Action::Approve).await.unwrap() {
            TransitionOutcome::NoSuchRequest => {},
            x => panic!("expected NoSuchRequest, got {:?}", &x),
        }
        match add_comment(&store, 10_000, &stud, "anyone there?").await.unwrap() {
            CommentOutcome::NoSuchRequest => {},
            x => panic!("expected NoSuchRequest, got {:?}", &x),
        }

        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn comments_ignore_status() {
        ensure_logging();
        let (store, mail, stud, _, fac) = fixture().await;

        let req = file_housing_request(&store, &mail, &stud).await;
        match transition(&store, &mail, req.id, &fac, Action::Reject).await.unwrap() {
            TransitionOutcome::Done(_) => {},
            x => panic!("expected Done, got {:?}", &x),
        }

        // Terminal status, comment still lands; faculty comment too.
        match add_comment(&store, req.id, &fac, "see the housing FAQ").await.unwrap() {
            CommentOutcome::Added(c) => {
                assert_eq!(&c.author, HOUSING_FACULTY);
            },
            x => panic!("expected Added, got {:?}", &x),
        }

        let fetched = store.get_request_by_id(req.id).await.unwrap().unwrap();
        assert_eq!(fetched.comments.len(), 1);

        store.nuke_database().await.unwrap();
    }
}
