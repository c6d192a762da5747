use crate::error::ApiError;
use crate::ledger::dto::LeaderboardEntry;
use crate::ledger::services::{
    self, apply_recognition, apply_redemption, check_recognition, check_redemption, Balances,
};
use sqlx::{FromRow, PgPool};

#[derive(Debug, FromRow)]
struct BalanceRow {
    id: i64,
    grant_balance: i64,
    sent_this_month: i64,
    redeemable_balance: i64,
    total_received: i64,
}

impl BalanceRow {
    fn balances(&self) -> Balances {
        Balances {
            grant_balance: self.grant_balance,
            sent_this_month: self.sent_this_month,
            redeemable_balance: self.redeemable_balance,
            total_received: self.total_received,
        }
    }
}

/// Result of a committed recognition, with post-transfer balances for the
/// audit trail.
#[derive(Debug)]
pub struct RecognitionOutcome {
    pub recognition_id: i64,
    pub sender: Balances,
    pub receiver: Balances,
}

/// Result of a committed redemption.
#[derive(Debug)]
pub struct RedemptionOutcome {
    pub redemption_id: i64,
    pub voucher_value: i64,
    pub balance_after: i64,
}

/// Transfer credits from sender to receiver in one transaction. No observer
/// sees a partially applied transfer.
pub async fn create_recognition(
    db: &PgPool,
    sender_id: i64,
    receiver_id: i64,
    credits: i64,
    note: Option<&str>,
) -> Result<RecognitionOutcome, ApiError> {
    let mut tx = db.begin().await?;

    // Lock both parties in id order so concurrent opposite transfers
    // cannot deadlock.
    let rows = sqlx::query_as::<_, BalanceRow>(
        r#"
        SELECT id, grant_balance, sent_this_month, redeemable_balance, total_received
        FROM users
        WHERE id IN ($1, $2)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(sender_id)
    .bind(receiver_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut sender = rows
        .iter()
        .find(|r| r.id == sender_id)
        .map(BalanceRow::balances)
        .ok_or_else(|| ApiError::NotFound("sender not found".into()))?;

    check_recognition(sender_id, receiver_id, credits, &sender)?;

    let mut receiver = rows
        .iter()
        .find(|r| r.id == receiver_id)
        .map(BalanceRow::balances)
        .ok_or_else(|| ApiError::NotFound("receiver not found".into()))?;

    apply_recognition(&mut sender, &mut receiver, credits);

    let recognition_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO recognitions (sender_id, receiver_id, credits, note)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(credits)
    .bind(note)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET grant_balance = $1, sent_this_month = $2 WHERE id = $3")
        .bind(sender.grant_balance)
        .bind(sender.sent_this_month)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET redeemable_balance = $1, total_received = $2 WHERE id = $3")
        .bind(receiver.redeemable_balance)
        .bind(receiver.total_received)
        .bind(receiver_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(RecognitionOutcome {
        recognition_id,
        sender,
        receiver,
    })
}

/// Add an endorsement. The unique constraint on (recognition, endorser)
/// makes a repeat endorsement fail even under concurrent requests.
pub async fn endorse(db: &PgPool, recognition_id: i64, endorser_id: i64) -> Result<(), ApiError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM recognitions WHERE id = $1")
        .bind(recognition_id)
        .fetch_optional(db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("recognition not found".into()));
    }

    let result = sqlx::query("INSERT INTO endorsements (recognition_id, endorser_id) VALUES ($1, $2)")
        .bind(recognition_id)
        .bind(endorser_id)
        .execute(db)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(ApiError::BusinessRule("already endorsed".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Convert redeemable credits into a voucher, in one transaction.
pub async fn redeem(db: &PgPool, user_id: i64, credits: i64) -> Result<RedemptionOutcome, ApiError> {
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, BalanceRow>(
        r#"
        SELECT id, grant_balance, sent_this_month, redeemable_balance, total_received
        FROM users
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    let mut user = row.balances();
    check_redemption(credits, &user)?;
    let voucher_value = apply_redemption(&mut user, credits);

    sqlx::query("UPDATE users SET redeemable_balance = $1 WHERE id = $2")
        .bind(user.redeemable_balance)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let redemption_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO redemptions (user_id, credits, voucher_value)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(credits)
    .bind(voucher_value)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(RedemptionOutcome {
        redemption_id,
        voucher_value,
        balance_after: user.redeemable_balance,
    })
}

#[derive(Debug, FromRow)]
struct ResetRow {
    id: i64,
    grant_balance: i64,
    last_reset_period: Option<String>,
}

/// Replenish grant balances for every user not yet reset this cycle.
/// Idempotent per cycle; returns the number of users actually reset.
pub async fn reset_month(db: &PgPool, period: &str) -> Result<u64, ApiError> {
    let mut tx = db.begin().await?;

    let rows = sqlx::query_as::<_, ResetRow>(
        r#"
        SELECT id, grant_balance, last_reset_period
        FROM users
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    let mut users_reset = 0u64;
    for row in &rows {
        if !services::needs_reset(row.last_reset_period.as_deref(), period) {
            continue;
        }
        sqlx::query(
            r#"
            UPDATE users
            SET grant_balance = $1, sent_this_month = 0, last_reset_period = $2
            WHERE id = $3
            "#,
        )
        .bind(services::next_grant_balance(row.grant_balance))
        .bind(period)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
        users_reset += 1;
    }

    tx.commit().await?;
    Ok(users_reset)
}

/// Ranked aggregates over ledger state, derived on demand. Aggregation
/// happens in SQL; ordering and truncation go through the same pure
/// ranking rule the tests exercise.
pub async fn leaderboard(db: &PgPool, limit: i64) -> Result<Vec<LeaderboardEntry>, ApiError> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT u.id, u.name, u.total_received,
               (SELECT count(*) FROM recognitions r
                 WHERE r.receiver_id = u.id) AS recognition_count,
               (SELECT count(*) FROM endorsements e
                  JOIN recognitions r ON r.id = e.recognition_id
                 WHERE r.receiver_id = u.id) AS endorsement_count
        FROM users u
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(services::rank_leaderboard(entries, limit))
}
