use crate::auth::dto::{PublicUser, Role};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: String,          // "admin" | "member"
    pub grant_balance: i64,
    pub sent_this_month: i64,
    pub redeemable_balance: i64,
    pub total_received: i64,
    pub last_reset_period: Option<String>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, grant_balance, \
     sent_this_month, redeemable_balance, total_received, last_reset_period, created_at";

impl User {
    pub fn role_claim(&self) -> Role {
        if self.role == "admin" {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role_claim(),
            grant_balance: self.grant_balance,
            sent_this_month: self.sent_this_month,
            redeemable_balance: self.redeemable_balance,
            total_received: self.total_received,
        }
    }

    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by id.
    pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with hashed password. The first row ever inserted
    /// gets the admin role; everyone after that is a member.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3,
                    CASE WHEN EXISTS (SELECT 1 FROM users) THEN 'member' ELSE 'admin' END)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }
}

/// A concurrent registration of the same email loses the race at the
/// unique constraint rather than at the pre-check; surface that as the
/// same business-rule rejection, not a server error.
pub fn classify_create_error(e: sqlx::Error) -> ApiError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ApiError::BusinessRule("email already registered".into())
        }
        e => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::Role;

    fn user_with_role(role: &str) -> User {
        User {
            id: 1,
            name: "Test".into(),
            email: "test@example.com".into(),
            password_hash: "x".into(),
            role: role.into(),
            grant_balance: 100,
            sent_this_month: 0,
            redeemable_balance: 0,
            total_received: 0,
            last_reset_period: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn admin_row_yields_admin_claim() {
        assert_eq!(user_with_role("admin").role_claim(), Role::Admin);
        assert_eq!(user_with_role("member").role_claim(), Role::Member);
    }

    #[test]
    fn non_unique_create_errors_stay_internal() {
        let err = classify_create_error(sqlx::Error::RowNotFound);
        assert_eq!(
            err.status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn public_user_carries_balances_but_never_the_hash() {
        let user = user_with_role("member");
        let public = user.public();
        assert_eq!(public.grant_balance, 100);
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("password_hash"));
    }
}
