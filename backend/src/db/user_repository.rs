use chrono::{SubsecRound, Utc};
use rusqlite::{ErrorCode, OptionalExtension, params};

use super::models::UserAccount;
use super::{Database, RepositoryError, format_timestamp, parse_timestamp};

#[derive(Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: String,
    ) -> Result<UserAccount, RepositoryError> {
        let user = UserAccount {
            username: username.to_string(),
            password_hash,
            created_at: Utc::now().trunc_subsecs(6),
        };
        let row = user.clone();
        self.db
            .run(move |conn| {
                let inserted = conn.execute(
                    "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                    params![row.username, row.password_hash, format_timestamp(&row.created_at)],
                );
                match inserted {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(err, _))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        Err(RepositoryError::Duplicate(row.username.clone()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        log::info!("Created user {}", user.username);
        Ok(user)
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let username = username.to_string();
        self.db
            .run(move |conn| {
                let row: Option<(String, String, String)> = conn
                    .query_row(
                        "SELECT username, password_hash, created_at FROM users WHERE username = ?1",
                        params![username],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                row.map(|(username, password_hash, created_at)| {
                    Ok(UserAccount {
                        username,
                        password_hash,
                        created_at: parse_timestamp(&created_at)?,
                    })
                })
                .transpose()
            })
            .await
    }
}
