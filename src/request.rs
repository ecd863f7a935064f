/*!
The `Request` record and its three typed variants.

All requests live in one `requests` table; the `request_type` column is the
discriminator, and variant-specific columns are NULL on rows of the other
variants. See `store::SCHEMA` for the table definition.
*/
use time::{Date, OffsetDateTime};

use crate::user::Department;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Open,
    Approved,
    Rejected,
    Withdrawn,
}

impl Status {
    /// Open is the only state anything transitions out of; the other three
    /// are terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Open)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Status::Open => "open",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
            Status::Withdrawn => "withdrawn",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Status::Open),
            "approved" => Ok(Status::Approved),
            "rejected" => Ok(Status::Rejected),
            "withdrawn" => Ok(Status::Withdrawn),
            _ => Err(format!("{:?} is not a valid Status.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    LeaveOfAbsence,
    StudentHousing,
    CourseRegistration,
}

impl RequestKind {
    /// Which department reviews this kind of request. Fixed at creation;
    /// a request never moves between departments.
    pub fn department(&self) -> Department {
        match self {
            RequestKind::LeaveOfAbsence => Department::StudentAffairs,
            RequestKind::StudentHousing => Department::HousingOffice,
            RequestKind::CourseRegistration => Department::RegistrarsOffice,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::LeaveOfAbsence => "Leave of Absence",
            RequestKind::StudentHousing => "Student Housing",
            RequestKind::CourseRegistration => "Course Registration",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            RequestKind::LeaveOfAbsence => "leave_of_absence",
            RequestKind::StudentHousing => "student_housing",
            RequestKind::CourseRegistration => "course_registration",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leave_of_absence" => Ok(RequestKind::LeaveOfAbsence),
            "student_housing" => Ok(RequestKind::StudentHousing),
            "course_registration" => Ok(RequestKind::CourseRegistration),
            _ => Err(format!("{:?} is not a valid request type.", s)),
        }
    }
}

/// The variant-specific fields of a request, post-validation.
#[derive(Clone, Debug)]
pub enum RequestBody {
    LeaveOfAbsence {
        start_date: Date,
        end_date: Date,
        reason: String,
    },
    StudentHousing {
        housing_type: String,
        duration: String,
        reason: String,
    },
    CourseRegistration {
        course_id: i64,
        semester: String,
        reason: String,
    },
}

impl RequestBody {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestBody::LeaveOfAbsence { .. } => RequestKind::LeaveOfAbsence,
            RequestBody::StudentHousing { .. } => RequestKind::StudentHousing,
            RequestBody::CourseRegistration { .. } => RequestKind::CourseRegistration,
        }
    }

    /// One-line description for dashboard rows and email.
    pub fn summary(&self) -> String {
        match self {
            RequestBody::LeaveOfAbsence { start_date, end_date, .. } => {
                format!(
                    "{} through {}",
                    start_date.format(crate::DATE_FMT).unwrap_or_default(),
                    end_date.format(crate::DATE_FMT).unwrap_or_default(),
                )
            },
            RequestBody::StudentHousing { housing_type, duration, .. } => {
                format!("{}, {}", housing_type, duration)
            },
            RequestBody::CourseRegistration { course_id, semester, .. } => {
                format!("course {}, {}", course_id, semester)
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub id: i32,
    pub assigned_department: Department,
    pub status: Status,
    pub created_at: OffsetDateTime,
    /// Email of the student who filed the request. Immutable.
    pub created_by: String,
    pub approved_at: Option<OffsetDateTime>,
    pub approved_by: Option<String>,
    pub body: RequestBody,
    pub comments: Vec<Comment>,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        self.body.kind()
    }
}

#[derive(Clone, Debug)]
pub struct Comment {
    pub id: i64,
    pub request_id: i32,
    /// Email of the comment's author.
    pub author: String,
    pub body: String,
    pub created_at: OffsetDateTime,
}

/// One named validation failure on a request form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: &'static str, message: &'static str) -> FieldError {
        FieldError { field, message }
    }
}

/// Raw request-form input, before validation. Dates arrive as the strings
/// the browser sent; blank means the field was left empty.
#[derive(Clone, Debug)]
pub enum RequestForm {
    LeaveOfAbsence {
        start_date: Option<Date>,
        end_date: Option<Date>,
        reason: String,
    },
    StudentHousing {
        housing_type: String,
        duration: String,
        reason: String,
    },
    CourseRegistration {
        course_id: Option<i64>,
        semester: String,
        reason: String,
    },
}

impl RequestForm {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestForm::LeaveOfAbsence { .. } => RequestKind::LeaveOfAbsence,
            RequestForm::StudentHousing { .. } => RequestKind::StudentHousing,
            RequestForm::CourseRegistration { .. } => RequestKind::CourseRegistration,
        }
    }

    /**
    Check the form server-side, independent of whatever the page's own
    validation did.

    Every missing required field produces its own named error, and all of
    them come back together; nothing short-circuits. An empty vector means
    the form is good and `into_body()` will succeed.

    Leave-of-absence dates are each required but their order is not
    checked.
    */
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors: Vec<FieldError> = Vec::new();

        match self {
            RequestForm::LeaveOfAbsence { start_date, end_date, .. } => {
                if start_date.is_none() {
                    errors.push(FieldError::new("start_date", "Start date is required"));
                }
                if end_date.is_none() {
                    errors.push(FieldError::new("end_date", "End date is required"));
                }
            },
            RequestForm::StudentHousing { housing_type, duration, .. } => {
                if housing_type.trim().is_empty() {
                    errors.push(FieldError::new("housing_type", "Housing type is required"));
                }
                if duration.trim().is_empty() {
                    errors.push(FieldError::new("duration", "Duration is required"));
                }
            },
            RequestForm::CourseRegistration { course_id, semester, .. } => {
                if course_id.is_none() {
                    errors.push(FieldError::new("course_id", "Course ID is required"));
                }
                if semester.trim().is_empty() {
                    errors.push(FieldError::new("semester", "Semester is required"));
                }
            },
        }

        errors
    }

    /// Convert a validated form into a `RequestBody`.
    ///
    /// Errors with the field name if a required field is still missing;
    /// callers are expected to have run `validate()` first.
    pub fn into_body(self) -> Result<RequestBody, String> {
        match self {
            RequestForm::LeaveOfAbsence { start_date, end_date, reason } => {
                let start_date = start_date.ok_or("start_date")?;
                let end_date = end_date.ok_or("end_date")?;
                Ok(RequestBody::LeaveOfAbsence { start_date, end_date, reason })
            },
            RequestForm::StudentHousing { housing_type, duration, reason } => {
                Ok(RequestBody::StudentHousing { housing_type, duration, reason })
            },
            RequestForm::CourseRegistration { course_id, semester, reason } => {
                let course_id = course_id.ok_or("course_id")?;
                Ok(RequestBody::CourseRegistration { course_id, semester, reason })
            },
        }
    }
}
