/*!
Portal users: students and faculty.
*/

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Role {
    Student,
    Faculty,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Student => "STUDENT",
            Role::Faculty => "FACULTY",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Role::Student),
            "FACULTY" => Ok(Role::Faculty),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

/// The fixed set of university departments.
///
/// A `Department` serves double duty: it is a Faculty member's home unit,
/// and it is the routing target every request gets assigned at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Department {
    RegistrarsOffice,
    HousingOffice,
    StudentAffairs,
    Admissions,
}

impl Department {
    pub const ALL: &'static [Department] = &[
        Department::RegistrarsOffice,
        Department::HousingOffice,
        Department::StudentAffairs,
        Department::Admissions,
    ];

    /// Human-readable form for pages and email.
    pub fn label(&self) -> &'static str {
        match self {
            Department::RegistrarsOffice => "Registrar's Office",
            Department::HousingOffice => "Housing Office",
            Department::StudentAffairs => "Student Affairs",
            Department::Admissions => "Admissions",
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Department::RegistrarsOffice => "REGISTRARS_OFFICE",
            Department::HousingOffice => "HOUSING_OFFICE",
            Department::StudentAffairs => "STUDENT_AFFAIRS",
            Department::Admissions => "ADMISSIONS",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTRARS_OFFICE" => Ok(Department::RegistrarsOffice),
            "HOUSING_OFFICE" => Ok(Department::HousingOffice),
            "STUDENT_AFFAIRS" => Ok(Department::StudentAffairs),
            "ADMISSIONS" => Ok(Department::Admissions),
            _ => Err(format!("{:?} is not a valid Department.", s)),
        }
    }
}

/// Fields common to every kind of user.
///
/// The email address is the primary key and is stored lowercased; the
/// password hash lives only in the database and is handled by the `auth`
/// module, never carried around on one of these.
#[derive(Clone, Debug)]
pub struct BaseUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Ten ASCII digits, no punctuation.
    pub phone: String,
}

impl BaseUser {
    pub fn into_student(self, student_id: String) -> User {
        User::Student(Student { base: self, student_id })
    }

    pub fn into_faculty(self, department: Department) -> User {
        User::Faculty(Faculty { base: self, department })
    }
}

#[derive(Clone, Debug)]
pub struct Student {
    pub base: BaseUser,
    /// University-issued student number; unique among students.
    pub student_id: String,
}

#[derive(Clone, Debug)]
pub struct Faculty {
    pub base: BaseUser,
    pub department: Department,
}

#[derive(Clone, Debug)]
pub enum User {
    Student(Student),
    Faculty(Faculty),
}

impl User {
    pub fn email(&self) -> &str {
        match self {
            User::Student(s) => &s.base.email,
            User::Faculty(f) => &f.base.email,
        }
    }

    pub fn first_name(&self) -> &str {
        match self {
            User::Student(s) => &s.base.first_name,
            User::Faculty(f) => &f.base.first_name,
        }
    }

    pub fn last_name(&self) -> &str {
        match self {
            User::Student(s) => &s.base.last_name,
            User::Faculty(f) => &f.base.last_name,
        }
    }

    pub fn phone(&self) -> &str {
        match self {
            User::Student(s) => &s.base.phone,
            User::Faculty(f) => &f.base.phone,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::Student(_) => Role::Student,
            User::Faculty(_) => Role::Faculty,
        }
    }
}

/// A phone number here is exactly ten ASCII digits.
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit())
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

/**
Validate the parts of a signup form that are common to students and
faculty.

Checks run in a fixed order and the first failure wins, so the user fixes
one thing at a time; this matches how the signup pages report errors.
Returns the message to show, or `None` if everything passes.
*/
pub fn validate_signup(
    password: &str,
    confirm_password: &str,
    phone: &str,
) -> Option<&'static str> {
    if password != confirm_password {
        return Some("Passwords do not match");
    }
    if !is_valid_phone(phone) {
        return Some("Invalid phone number");
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Some("Password must be at least 8 characters long");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_round_trip() {
        for d in Department::ALL.iter() {
            let s = d.to_string();
            let back: Department = s.parse().unwrap();
            assert_eq!(*d, back);
        }
        assert!("FINE_ARTS".parse::<Department>().is_err());
    }

    #[test]
    fn phone_numbers() {
        assert!(is_valid_phone("9195551234"));
        assert!(!is_valid_phone("919-555-1234"));
        assert!(!is_valid_phone("91955512"));
        assert!(!is_valid_phone("919555123456"));
        assert!(!is_valid_phone("91955512ab"));
    }

    #[test]
    fn signup_validation_order() {
        // Mismatch is reported before the bad phone number.
        assert_eq!(
            validate_signup("longenough", "different", "bogus"),
            Some("Passwords do not match")
        );
        assert_eq!(
            validate_signup("short", "short", "9195551234"),
            Some("Password must be at least 8 characters long")
        );
        assert_eq!(
            validate_signup("longenough", "longenough", "bogus"),
            Some("Invalid phone number")
        );
        assert_eq!(
            validate_signup("longenough", "longenough", "9195551234"),
            None
        );
    }

    #[test]
    fn user_accessors() {
        let base = BaseUser {
            email: "jsmith@university.edu".to_owned(),
            first_name: "John".to_owned(),
            last_name: "Smith".to_owned(),
            phone: "9195551234".to_owned(),
        };
        let u = base.clone().into_student("1333567".to_owned());
        assert_eq!(u.role(), Role::Student);
        assert_eq!(u.email(), "jsmith@university.edu");

        let u = base.into_faculty(Department::StudentAffairs);
        assert_eq!(u.role(), Role::Faculty);
        assert_eq!(u.last_name(), "Smith");
    }
}
