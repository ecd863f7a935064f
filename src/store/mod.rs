/*!
Database interaction module.

The Postgres database to which this connects holds the following tables.
`users` is the base record for both kinds of user; `students` and `faculty`
join against it by email. All three request variants share the single
`requests` table, discriminated by `request_type`, with the variant-specific
columns left NULL on rows of the other variants.

```sql
CREATE TABLE users (
    email         TEXT PRIMARY KEY,   /* stored lowercased */
    password_hash TEXT NOT NULL,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    phone         TEXT NOT NULL       /* ten digits */
);

CREATE TABLE students (
    email      TEXT PRIMARY KEY REFERENCES users(email),
    student_id TEXT UNIQUE NOT NULL
);

CREATE TABLE faculty (
    email      TEXT PRIMARY KEY REFERENCES users(email),
    department TEXT NOT NULL
);

CREATE TABLE authorities (
    id        BIGSERIAL PRIMARY KEY,
    email     TEXT NOT NULL REFERENCES users(email),
    authority TEXT NOT NULL,
    UNIQUE (email, authority)
);

CREATE TABLE requests (
    id                  SERIAL PRIMARY KEY,
    request_type        TEXT NOT NULL,  /* discriminator */
    assigned_department TEXT NOT NULL,
    status              TEXT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    created_by          TEXT NOT NULL REFERENCES users(email),
    approved_at         TIMESTAMPTZ,
    approved_by         TEXT REFERENCES users(email),
    start_date          DATE,       /* leave_of_absence */
    end_date            DATE,       /* leave_of_absence */
    housing_type        TEXT,       /* student_housing */
    duration            TEXT,       /* student_housing */
    course_id           BIGINT,     /* course_registration */
    semester            TEXT,       /* course_registration */
    reason              TEXT
);

CREATE TABLE comments (
    id         BIGSERIAL PRIMARY KEY,
    request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
    email      TEXT NOT NULL REFERENCES users(email),
    body       TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE password_reset_tokens (
    token       TEXT PRIMARY KEY,
    email       TEXT NOT NULL REFERENCES users(email),
    expiry_date TIMESTAMPTZ NOT NULL
);
```
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod requests;
pub mod tokens;
pub mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            email         TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            first_name    TEXT NOT NULL,
            last_name     TEXT NOT NULL,
            phone         TEXT NOT NULL
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            email      TEXT PRIMARY KEY REFERENCES users(email),
            student_id TEXT UNIQUE NOT NULL
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'faculty'",
        "CREATE TABLE faculty (
            email      TEXT PRIMARY KEY REFERENCES users(email),
            department TEXT NOT NULL
        )",
        "DROP TABLE faculty",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'authorities'",
        "CREATE TABLE authorities (
            id        BIGSERIAL PRIMARY KEY,
            email     TEXT NOT NULL REFERENCES users(email),
            authority TEXT NOT NULL,
            UNIQUE (email, authority)
        )",
        "DROP TABLE authorities",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'requests'",
        "CREATE TABLE requests (
            id                  SERIAL PRIMARY KEY,
            request_type        TEXT NOT NULL,
            assigned_department TEXT NOT NULL,
            status              TEXT NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL,
            created_by          TEXT NOT NULL REFERENCES users(email),
            approved_at         TIMESTAMPTZ,
            approved_by         TEXT REFERENCES users(email),
            start_date          DATE,
            end_date            DATE,
            housing_type        TEXT,
            duration            TEXT,
            course_id           BIGINT,
            semester            TEXT,
            reason              TEXT
        )",
        "DROP TABLE requests",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'comments'",
        "CREATE TABLE comments (
            id         BIGSERIAL PRIMARY KEY,
            request_id INTEGER NOT NULL REFERENCES requests(id) ON DELETE CASCADE,
            email      TEXT NOT NULL REFERENCES users(email),
            body       TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE comments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'password_reset_tokens'",
        "CREATE TABLE password_reset_tokens (
            token       TEXT PRIMARY KEY,
            email       TEXT NOT NULL REFERENCES users(email),
            expiry_date TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE password_reset_tokens",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(pub String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    pub(crate) async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
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
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
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

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: quad_test
    password: quad_test

    with write access to:

    database: quad_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str =
        "host=localhost user=quad_test password='quad_test' dbname=quad_test";

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
