/*!
Credentials, session keys, and the password-reset flow.

Passwords are stored bcrypt-hashed on the `users` row; this module is the
only thing that reads or writes the hash. Logging in mints an opaque
session key held in `session_keys`, which the cookie carries and the
session middleware checks on every request.

`auth::Db` keeps its own connection handling and its own slice of the
schema, separate from `Store`, even though both point at the same
database.
*/
use rand::{Rng, distributions};
use time::Duration;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::notify::Mailer;
use crate::store::{DbError, Store};

const SESSION_KEY_LENGTH: usize = 32;
const SESSION_KEY_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How long a password-reset link stays usable.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(24);

static AUTH_SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'session_keys'",
        "CREATE TABLE session_keys (
            key    TEXT PRIMARY KEY,
            email  TEXT NOT NULL,
            issued TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE session_keys",
    ),
];

/// Every way an authentication check can come out.
///
/// Callers match on exactly the variants their operation can produce; any
/// other variant turning up is a bug worth a warning.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthResult {
    Ok,
    /// A freshly-issued session key.
    Key(String),
    /// The email a valid session key belongs to.
    Email(String),
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

pub fn hash_password(password: &str) -> Result<String, DbError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| DbError(format!("Error hashing password: {}", &e)))
}

/// Generate a new opaque session key.
fn generate_key() -> String {
    let chars: Vec<char> = SESSION_KEY_CHARS.chars().collect();
    // chars is a nonempty constant, so the distribution is constructable.
    let dist = distributions::Slice::new(&chars).unwrap();
    let rng = rand::thread_rng();
    rng.sample_iter(&dist)
        .take(SESSION_KEY_LENGTH)
        .collect()
}

pub struct Db {
    connection_string: String,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!("auth::Db::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in AUTH_SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /// Test-only counterpart of `Store::nuke_database()`.
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in AUTH_SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        Ok(())
    }

    async fn fetch_password_hash(
        &self,
        email: &str,
    ) -> Result<Option<String>, DbError> {
        let client = self.connect().await?;

        match client.query_opt(
            "SELECT password_hash FROM users WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(row.try_get("password_hash")?)),
        }
    }

    /// Check `password` against the stored hash for `email`
    /// (case-insensitively).
    ///
    /// Returns `Ok`, `BadPassword`, or `NoSuchUser`.
    pub async fn check_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_password( {:?}, [ pwd ] ) called.", email);

        let email = email.to_lowercase();
        let hash = match self.fetch_password_hash(&email).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(h) => h,
        };

        let good = bcrypt::verify(password, &hash)
            .map_err(|e| DbError(format!("Error verifying password: {}", &e)))?;

        if good {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /// `check_password()`, and on success mint and persist a session key.
    ///
    /// Returns `Key(..)`, `BadPassword`, or `NoSuchUser`.
    pub async fn check_password_and_issue_key(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!(
            "auth::Db::check_password_and_issue_key( {:?}, [ pwd ] ) called.",
            email
        );

        let email = email.to_lowercase();
        match self.check_password(&email, password).await? {
            AuthResult::Ok => { /* Proceed to issue below. */ },
            x => { return Ok(x); },
        }

        let key = generate_key();
        let client = self.connect().await?;
        client.execute(
            "INSERT INTO session_keys (key, email, issued)
                VALUES ($1, $2, $3)",
            &[&key, &email, &crate::now()]
        ).await?;

        log::trace!("Issued session key for {:?}.", &email);
        Ok(AuthResult::Key(key))
    }

    /// Resolve a session key from a cookie.
    ///
    /// Returns `Email(..)` or `InvalidKey`.
    pub async fn check_key(&self, key: &str) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_key( [ key ] ) called.");

        let client = self.connect().await?;

        match client.query_opt(
            "SELECT email FROM session_keys WHERE key = $1",
            &[&key]
        ).await? {
            None => Ok(AuthResult::InvalidKey),
            Some(row) => {
                let email: String = row.try_get("email")?;
                Ok(AuthResult::Email(email))
            },
        }
    }

    /// Drop a session key; used at logout. Unknown keys are quietly fine.
    pub async fn delete_key(&self, key: &str) -> Result<(), DbError> {
        log::trace!("auth::Db::delete_key( [ key ] ) called.");

        let client = self.connect().await?;

        client.execute(
            "DELETE FROM session_keys WHERE key = $1",
            &[&key]
        ).await?;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResetOutcome {
    /// Token stored and the link mailed.
    Sent,
    NoSuchUser,
    /// An unexpired token is already outstanding; no new mail goes out.
    AlreadyIssued,
}

/**
Start the password-reset flow for `email`.

A token is only issued for a known user with no live token outstanding.
The mailed link points at the reset-password page with the token attached.
*/
pub async fn request_reset(
    store: &Store,
    mail: &dyn Mailer,
    email: &str,
    base_url: &str,
) -> Result<ResetOutcome, DbError> {
    log::trace!("request_reset( {:?} ) called.", email);

    let user = match store.get_user_by_email(email).await? {
        None => { return Ok(ResetOutcome::NoSuchUser); },
        Some(u) => u,
    };
    let email = user.email();

    let now = crate::now();
    if store.unexpired_token_exists(email, now).await? {
        log::trace!("    ...unexpired token already on file for {:?}.", email);
        return Ok(ResetOutcome::AlreadyIssued);
    }

    let token = Uuid::new_v4().to_string();
    store.insert_reset_token(email, &token, now + RESET_TOKEN_TTL).await?;

    let link = format!("{}/auth/reset-password?token={}", base_url, &token);
    mail.reset_link(email, &link).await;

    Ok(ResetOutcome::Sent)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResetCompletion {
    Done,
    InvalidToken,
    PasswordMismatch,
}

/**
Finish the password-reset flow: re-validate the token, store the new
password, burn the token, and send the changed-password notice.

A mismatched confirmation is reported before token validity, so the user
fixing their typing doesn't get told their link just died.
*/
pub async fn complete_reset(
    store: &Store,
    mail: &dyn Mailer,
    token: &str,
    new_password: &str,
    confirm_new_password: &str,
) -> Result<ResetCompletion, DbError> {
    log::trace!("complete_reset( [ token ] ) called.");

    if new_password != confirm_new_password {
        return Ok(ResetCompletion::PasswordMismatch);
    }

    let email = match store.validate_reset_token(token, crate::now()).await? {
        None => { return Ok(ResetCompletion::InvalidToken); },
        Some(email) => email,
    };

    let hash = hash_password(new_password)?;
    store.update_password(&email, &hash).await?;
    store.delete_reset_token(token).await?;

    mail.password_changed(&email).await;

    Ok(ResetCompletion::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::tests::ensure_logging;
    use crate::store::tests::TEST_CONNECTION;
    use crate::user::{BaseUser, Student};

    fn test_student(email: &str) -> Student {
        Student {
            base: BaseUser {
                email: email.to_owned(),
                first_name: "John".to_owned(),
                last_name: "Doe".to_owned(),
                phone: "9195551234".to_owned(),
            },
            student_id: "1333567".to_owned(),
        }
    }

    #[test]
    fn generated_keys_are_distinct() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), SESSION_KEY_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn hashes_are_not_plaintext() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert_ne!(hash, "hunter2hunter2");
        assert!(bcrypt::verify("hunter2hunter2", &hash).unwrap());
        assert!(!bcrypt::verify("hunter3hunter3", &hash).unwrap());
    }

    #[tokio::test]
    #[serial]
    async fn password_and_key_round_trip() {
        ensure_logging();

        let store = Store::new(TEST_CONNECTION.to_owned());
        store.ensure_db_schema().await.unwrap();
        let auth = Db::new(TEST_CONNECTION.to_owned());
        auth.ensure_db_schema().await.unwrap();

        let stud = test_student("jdoe@university.edu");
        let hash = hash_password("quadquadquad").unwrap();
        store.insert_student(&stud, &hash).await.unwrap();

        assert_eq!(
            auth.check_password("nobody@university.edu", "quadquadquad")
                .await.unwrap(),
            AuthResult::NoSuchUser
        );
        assert_eq!(
            auth.check_password("jdoe@university.edu", "wrong password")
                .await.unwrap(),
            AuthResult::BadPassword
        );
        // Lookup is case-insensitive.
        assert_eq!(
            auth.check_password("JDoe@University.edu", "quadquadquad")
                .await.unwrap(),
            AuthResult::Ok
        );

        let key = match auth.check_password_and_issue_key(
            "jdoe@university.edu", "quadquadquad"
        ).await.unwrap() {
            AuthResult::Key(k) => k,
            x => panic!("expected a key, got {:?}", &x),
        };

        match auth.check_key(&key).await.unwrap() {
            AuthResult::Email(email) => {
                assert_eq!(&email, "jdoe@university.edu");
            },
            x => panic!("expected an email, got {:?}", &x),
        }

        auth.delete_key(&key).await.unwrap();
        assert_eq!(
            auth.check_key(&key).await.unwrap(),
            AuthResult::InvalidKey
        );

        auth.nuke_database().await.unwrap();
        store.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn reset_flow() {
        ensure_logging();

        let store = Store::new(TEST_CONNECTION.to_owned());
        store.ensure_db_schema().await.unwrap();

        let stud = test_student("jdoe@university.edu");
        let hash = hash_password("first password").unwrap();
        store.insert_student(&stud, &hash).await.unwrap();

        let mail = crate::notify::recording::RecordingMailer::new();

        assert_eq!(
            request_reset(&store, &mail, "nobody@university.edu", "http://localhost:8001")
                .await.unwrap(),
            ResetOutcome::NoSuchUser
        );

        assert_eq!(
            request_reset(&store, &mail, "jdoe@university.edu", "http://localhost:8001")
                .await.unwrap(),
            ResetOutcome::Sent
        );
        let link = match mail.sent().last().unwrap() {
            crate::notify::recording::Sent::ResetLink { to, link } => {
                assert_eq!(to, "jdoe@university.edu");
                link.clone()
            },
            x => panic!("expected a reset link, got {:?}", &x),
        };
        let token = link.split("token=").nth(1).unwrap().to_owned();

        // Asking again while the token is live is refused.
        assert_eq!(
            request_reset(&store, &mail, "jdoe@university.edu", "http://localhost:8001")
                .await.unwrap(),
            ResetOutcome::AlreadyIssued
        );

        // Mismatched confirmation changes nothing.
        assert_eq!(
            complete_reset(&store, &mail, &token, "new password", "different")
                .await.unwrap(),
            ResetCompletion::PasswordMismatch
        );

        assert_eq!(
            complete_reset(&store, &mail, &token, "second password", "second password")
                .await.unwrap(),
            ResetCompletion::Done
        );
        assert!(!store.reset_token_row_exists(&token).await.unwrap());

        let auth = Db::new(TEST_CONNECTION.to_owned());
        assert_eq!(
            auth.check_password("jdoe@university.edu", "second password")
                .await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            auth.check_password("jdoe@university.edu", "first password")
                .await.unwrap(),
            AuthResult::BadPassword
        );

        // The burned token no longer validates.
        assert_eq!(
            complete_reset(&store, &mail, &token, "x", "x").await.unwrap(),
            ResetCompletion::InvalidToken
        );

        store.nuke_database().await.unwrap();
    }
}
