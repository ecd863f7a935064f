/*
`Store` methods et. al. for dealing with the different kinds of users.

A user is a row in `users` plus exactly one of a `students` or a `faculty`
row, plus one `authorities` row granting the matching role. All three are
written in a single transaction at signup.
*/
use tokio_postgres::{Row, Transaction};

use super::{Store, DbError};
use crate::user::*;

fn user_from_row(row: &Row) -> Result<User, DbError> {
    log::trace!("user_from_row( {:?} ) called.", row);

    let base = BaseUser {
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
    };

    let student_id: Option<String> = row.try_get("student_id")?;
    let department: Option<String> = row.try_get("department")?;

    match (student_id, department) {
        (Some(student_id), None) => Ok(base.into_student(student_id)),
        (None, Some(dept_str)) => {
            let department: Department = dept_str.parse()?;
            Ok(base.into_faculty(department))
        },
        (None, None) => Err(DbError(format!(
            "User {:?} has neither a student nor a faculty record.",
            &base.email
        ))),
        (Some(_), Some(_)) => Err(DbError(format!(
            "User {:?} has both a student and a faculty record.",
            &base.email
        ))),
    }
}

/// Query joining a `users` row with whichever variant table matches.
static SELECT_USER: &str =
    "SELECT u.email, u.first_name, u.last_name, u.phone,
            s.student_id, f.department
        FROM users u
            LEFT JOIN students s ON s.email = u.email
            LEFT JOIN faculty  f ON f.email = u.email";

/// Errors with an informative message if `email` is already taken.
async fn check_email_available(
    t: &Transaction<'_>,
    email: &str,
) -> Result<(), DbError> {
    log::trace!("check_email_available( T, {:?} ) called.", email);

    match t.query_opt(
        "SELECT authority FROM authorities WHERE email = $1",
        &[&email]
    ).await.map_err(|e|
        DbError::from(e).annotate("Error querying for preexisting email")
    )? {
        None => Ok(()),
        Some(row) => {
            let authority: &str = row.try_get("authority")?;
            Err(DbError(format!(
                "The email address {} is already registered ({}).",
                email, authority
            )))
        },
    }
}

impl Store {

    /// Inserts the `user::BaseUser` information into the `users` table and
    /// grants `role` in `authorities`.
    ///
    /// Used by `insert_student()` and `insert_faculty()`; the caller's
    /// transaction also writes the variant table row, so a failure anywhere
    /// leaves no partial user behind.
    async fn insert_base_user(
        &self,
        t: &Transaction<'_>,
        base: &BaseUser,
        password_hash: &str,
        role: Role,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_base_user( T, {:?}, [ hash ], {} ) called.",
            &base.email, role
        );

        check_email_available(t, &base.email).await?;

        t.execute(
            "INSERT INTO users (email, password_hash, first_name, last_name, phone)
                VALUES ($1, $2, $3, $4, $5)",
            &[
                &base.email,
                &password_hash,
                &base.first_name,
                &base.last_name,
                &base.phone,
            ]
        ).await?;

        t.execute(
            "INSERT INTO authorities (email, authority)
                VALUES ($1, $2)",
            &[&base.email, &role.to_string()]
        ).await?;

        Ok(())
    }

    pub async fn insert_student(
        &self,
        student: &Student,
        password_hash: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_student( {:?}, [ hash ] ) called.",
            &student.base.email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        self.insert_base_user(&t, &student.base, password_hash, Role::Student).await?;

        t.execute(
            "INSERT INTO students (email, student_id)
                VALUES ($1, $2)",
            &[&student.base.email, &student.student_id]
        ).await?;

        t.commit().await?;
        log::trace!(
            "Inserted Student {:?} (id {}).",
            &student.base.email, &student.student_id
        );
        Ok(())
    }

    pub async fn insert_faculty(
        &self,
        faculty: &Faculty,
        password_hash: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_faculty( {:?}, [ hash ] ) called.",
            &faculty.base.email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        self.insert_base_user(&t, &faculty.base, password_hash, Role::Faculty).await?;

        t.execute(
            "INSERT INTO faculty (email, department)
                VALUES ($1, $2)",
            &[&faculty.base.email, &faculty.department.to_string()]
        ).await?;

        t.commit().await?;
        log::trace!(
            "Inserted Faculty {:?} ({}).",
            &faculty.base.email, &faculty.department
        );
        Ok(())
    }

    /// Fetch a user by email, case-insensitively.
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let email = email.to_lowercase();
        let client = self.connect().await?;

        let query = format!("{} WHERE u.email = $1", SELECT_USER);
        match client.query_opt(query.as_str(), &[&email]).await? {
            None => Ok(None),
            Some(row) => {
                let u = user_from_row(&row)
                    .map_err(|e| e.annotate("Unable to build User from row"))?;
                Ok(Some(u))
            },
        }
    }

    /**
    Return the faculty member responsible for `department`, if any.

    Requests routed to a department are announced to this person. Several
    faculty may share a department; the one with the alphabetically first
    email gets the mail, which keeps the choice stable between calls. `None`
    means the department has nobody assigned at all, which the caller must
    surface rather than swallow.
    */
    pub async fn get_faculty_by_department(
        &self,
        department: Department,
    ) -> Result<Option<Faculty>, DbError> {
        log::trace!(
            "Store::get_faculty_by_department( {} ) called.",
            &department
        );

        let client = self.connect().await?;

        let query = format!(
            "{} WHERE f.department = $1 ORDER BY u.email LIMIT 1",
            SELECT_USER
        );
        match client.query_opt(query.as_str(), &[&department.to_string()]).await? {
            None => Ok(None),
            Some(row) => match user_from_row(&row)? {
                User::Faculty(f) => Ok(Some(f)),
                User::Student(s) => Err(DbError(format!(
                    "Faculty query for {} returned student {:?}.",
                    &department, &s.base.email
                ))),
            },
        }
    }

    /// The role grants attached to `email`, for policy checks and tests.
    pub async fn get_authorities(
        &self,
        email: &str,
    ) -> Result<Vec<String>, DbError> {
        log::trace!("Store::get_authorities( {:?} ) called.", email);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT authority FROM authorities WHERE email = $1
                ORDER BY authority",
            &[&email]
        ).await?;

        let mut authorities: Vec<String> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            authorities.push(row.try_get("authority")?);
        }

        Ok(authorities)
    }

    /**
    Update the mutable parts of a student's profile.

    Email and authorities are deliberately not reachable through this path;
    the email is the user's identity and the grants only change at signup.
    */
    pub async fn update_student_profile(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
        student_id: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::update_student_profile( {:?}, ... ) called.",
            email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE students SET student_id = $1 WHERE email = $2",
            &[&student_id, &email]
        ).await?;
        if n == 0 {
            return Err(DbError(format!(
                "There is no student with email {:?}.", email
            )));
        }

        t.execute(
            "UPDATE users SET first_name = $1, last_name = $2, phone = $3
                WHERE email = $4",
            &[&first_name, &last_name, &phone, &email]
        ).await?;

        t.commit().await?;
        Ok(())
    }

    /// Faculty counterpart of `update_student_profile()`; the department is
    /// the one extra mutable field.
    pub async fn update_faculty_profile(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
        department: Department,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::update_faculty_profile( {:?}, ... ) called.",
            email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE faculty SET department = $1 WHERE email = $2",
            &[&department.to_string(), &email]
        ).await?;
        if n == 0 {
            return Err(DbError(format!(
                "There is no faculty member with email {:?}.", email
            )));
        }

        t.execute(
            "UPDATE users SET first_name = $1, last_name = $2, phone = $3
                WHERE email = $4",
            &[&first_name, &last_name, &phone, &email]
        ).await?;

        t.commit().await?;
        Ok(())
    }

    pub async fn update_password(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::update_password( {:?}, [ hash ] ) called.", email);

        let client = self.connect().await?;

        let n = client.execute(
            "UPDATE users SET password_hash = $1 WHERE email = $2",
            &[&password_hash, &email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with email {:?}.", email)))
        } else {
            Ok(())
        }
    }

    /**
    Deletes a user from the database, regardless of role.

    It's not clever; it shotgun-deletes authority, student, and faculty
    records for the given email before removing the `users` row itself.
    Nothing in the portal deletes users; this exists so tests can clean up
    after themselves.
    */
    #[cfg(test)]
    pub async fn delete_user(
        &self,
        email: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {:?} ) called.", email);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        for stmt in [
            "DELETE FROM authorities WHERE email = $1",
            "DELETE FROM students WHERE email = $1",
            "DELETE FROM faculty WHERE email = $1",
        ] {
            t.execute(stmt, &[&email]).await?;
        }

        let n = t.execute(
            "DELETE FROM users WHERE email = $1",
            &[&email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with email {:?}.", email)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;

    fn base(email: &str, first: &str, last: &str) -> BaseUser {
        BaseUser {
            email: email.to_owned(),
            first_name: first.to_owned(),
            last_name: last.to_owned(),
            phone: "9195551234".to_owned(),
        }
    }

    pub fn test_student(email: &str) -> Student {
        Student {
            base: base(email, "John", "Doe"),
            student_id: format!("S-{}", email.len()),
        }
    }

    pub fn test_faculty(email: &str, department: Department) -> Faculty {
        Faculty {
            base: base(email, "Janet", "Prine"),
            department,
        }
    }

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let stud = test_student("jdoe@university.edu");
        db.insert_student(&stud, "$2b$12$notaverygoodhash").await.unwrap();

        let fac = test_faculty("jprine@university.edu", Department::HousingOffice);
        db.insert_faculty(&fac, "$2b$12$notaverygoodhash").await.unwrap();

        // Round trip, and case-insensitive lookup.
        let u = db.get_user_by_email("JDoe@University.EDU").await.unwrap().unwrap();
        match u {
            User::Student(s) => {
                assert_eq!(&s.base.email, &stud.base.email);
                assert_eq!(&s.student_id, &stud.student_id);
            },
            User::Faculty(_) => panic!("student came back as faculty"),
        }

        // Exactly one authority, with the right value.
        let auths = db.get_authorities(&stud.base.email).await.unwrap();
        assert_eq!(auths, vec!["STUDENT".to_owned()]);
        let auths = db.get_authorities(&fac.base.email).await.unwrap();
        assert_eq!(auths, vec!["FACULTY".to_owned()]);

        // Duplicate email is refused.
        assert!(db.insert_student(&stud, "$2b$12$whatever").await.is_err());

        // Department routing lookup.
        let found = db.get_faculty_by_department(Department::HousingOffice)
            .await.unwrap().unwrap();
        assert_eq!(&found.base.email, &fac.base.email);
        assert!(
            db.get_faculty_by_department(Department::Admissions)
                .await.unwrap().is_none()
        );

        db.delete_user(&stud.base.email).await.unwrap();
        assert!(
            db.get_user_by_email(&stud.base.email).await.unwrap().is_none()
        );
        assert!(db.delete_user(&stud.base.email).await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn profile_updates() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let stud = test_student("jdoe@university.edu");
        db.insert_student(&stud, "$2b$12$notaverygoodhash").await.unwrap();

        db.update_student_profile(
            &stud.base.email, "Jonathan", "Doe", "9195559999", "1333567"
        ).await.unwrap();

        match db.get_user_by_email(&stud.base.email).await.unwrap().unwrap() {
            User::Student(s) => {
                assert_eq!(&s.base.first_name, "Jonathan");
                assert_eq!(&s.base.phone, "9195559999");
                assert_eq!(&s.student_id, "1333567");
            },
            User::Faculty(_) => panic!("student came back as faculty"),
        }

        // A student can't be profile-updated as faculty.
        assert!(
            db.update_faculty_profile(
                &stud.base.email, "J", "D", "9195559999",
                Department::Admissions
            ).await.is_err()
        );

        db.nuke_database().await.unwrap();
    }
}
