use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, PgPool, Row};

use crate::auth::account::{Account, AccountStatus, NewAccount, Region, Role};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

const ACCOUNT_COLUMNS: &str = "id, first_name, last_name, email, password_hash, role, status, region_id, birth_year, picture, created_at";

const UNIQUE_VIOLATION: &str = "23505";

/// Credential store backed by the `accounts` and `regions` tables.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn account_from_row(row: &PgRow) -> AuthResult<Account> {
    let role_str: String = row.try_get("role")?;
    let status_str: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Account {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role_str
            .parse::<Role>()
            .map_err(|_| AuthError::Store(format!("unknown role '{role_str}' in accounts")))?,
        status: status_str.parse::<AccountStatus>().map_err(AuthError::Store)?,
        region_id: row.try_get("region_id")?,
        birth_year: row.try_get("birth_year")?,
        picture: row.try_get("picture")?,
        created_at,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.code().map(|code| code == UNIQUE_VIOLATION).unwrap_or(false)
    )
}

#[rocket::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1)");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn create(&self, account: NewAccount) -> AuthResult<Account> {
        let query = format!(
            "INSERT INTO accounts (first_name, last_name, email, password_hash, role, status, region_id, birth_year, picture) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.status.as_str())
            .bind(account.region_id)
            .bind(account.birth_year)
            .bind(&account.picture)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    AuthError::DuplicateAccount
                } else {
                    AuthError::from(err)
                }
            })?;

        account_from_row(&row)
    }

    async fn update_status(&self, email: &str, status: AccountStatus) -> AuthResult<()> {
        let result = sqlx::query("UPDATE accounts SET status = $1 WHERE lower(email) = lower($2)")
            .bind(status.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AccountNotFound);
        }
        Ok(())
    }

    async fn update_role(&self, id: i64, role: Role) -> AuthResult<Account> {
        let query = format!("UPDATE accounts SET role = $1 WHERE id = $2 RETURNING {ACCOUNT_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(role.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        account_from_row(&row)
    }

    async fn find_region(&self, id: i32) -> AuthResult<Option<Region>> {
        let row = sqlx::query("SELECT id, name FROM regions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Region {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn list(&self) -> AuthResult<Vec<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id");
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }
}
