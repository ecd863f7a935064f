/*
`Store` methods for password-reset tokens.

A token is a single-use opaque string bound to a user and an expiry. At
most one unexpired token exists per user at a time; an expired token is
removed the first time anything trips over it.
*/
use time::OffsetDateTime;

use super::{Store, DbError};

impl Store {
    /// Whether `email` already has a live (unexpired) reset token.
    ///
    /// Issuing a second token while one is outstanding is refused upstream
    /// so the mail can't be endlessly re-sent.
    pub async fn unexpired_token_exists(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<bool, DbError> {
        log::trace!("Store::unexpired_token_exists( {:?} ) called.", email);

        let client = self.connect().await?;

        let row = client.query_opt(
            "SELECT token FROM password_reset_tokens
                WHERE email = $1 AND expiry_date > $2",
            &[&email, &now]
        ).await?;

        Ok(row.is_some())
    }

    pub async fn insert_reset_token(
        &self,
        email: &str,
        token: &str,
        expiry_date: OffsetDateTime,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_reset_token( {:?}, [ token ], {:?} ) called.",
            email, &expiry_date
        );

        let client = self.connect().await?;

        client.execute(
            "INSERT INTO password_reset_tokens (token, email, expiry_date)
                VALUES ($1, $2, $3)",
            &[&token, &email, &expiry_date]
        ).await?;

        Ok(())
    }

    /**
    Resolve a reset token to the email it was issued for.

    An unknown token is `None`. An expired token is also `None`, and the
    stale row is deleted on the way out, so the failed validation is what
    cleans it up.
    */
    pub async fn validate_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<String>, DbError> {
        log::trace!("Store::validate_reset_token( [ token ] ) called.");

        let client = self.connect().await?;

        let row = match client.query_opt(
            "SELECT email, expiry_date FROM password_reset_tokens
                WHERE token = $1",
            &[&token]
        ).await? {
            None => { return Ok(None); },
            Some(row) => row,
        };

        let expiry_date: OffsetDateTime = row.try_get("expiry_date")?;
        if expiry_date < now {
            log::trace!("    ...token expired {:?}; deleting.", &expiry_date);
            client.execute(
                "DELETE FROM password_reset_tokens WHERE token = $1",
                &[&token]
            ).await?;
            return Ok(None);
        }

        let email: String = row.try_get("email")?;
        Ok(Some(email))
    }

    pub async fn delete_reset_token(&self, token: &str) -> Result<(), DbError> {
        log::trace!("Store::delete_reset_token( [ token ] ) called.");

        let client = self.connect().await?;

        client.execute(
            "DELETE FROM password_reset_tokens WHERE token = $1",
            &[&token]
        ).await?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn reset_token_row_exists(
        &self,
        token: &str,
    ) -> Result<bool, DbError> {
        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT token FROM password_reset_tokens WHERE token = $1",
            &[&token]
        ).await?;
        Ok(row.is_some())
    }
}
