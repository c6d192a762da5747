use crate::error::ApiError;
use crate::ledger::dto::LeaderboardEntry;
use time::OffsetDateTime;

/// Credits granted to every user at each monthly reset.
pub const MONTHLY_GRANT: i64 = 100;
/// Maximum credits a user may send within one cycle.
pub const MONTHLY_SEND_LIMIT: i64 = 100;
/// Unused grant balance carried into the next cycle, at most this much.
pub const CARRY_FORWARD_CAP: i64 = 50;
/// Voucher value per redeemed credit.
pub const VOUCHER_RATE: i64 = 5;

/// Mutable balance fields of a user row, as touched by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    pub grant_balance: i64,
    pub sent_this_month: i64,
    pub redeemable_balance: i64,
    pub total_received: i64,
}

/// The carry-forward rule: next cycle's grant balance as a function of the
/// previous one.
pub fn next_grant_balance(previous: i64) -> i64 {
    MONTHLY_GRANT + previous.clamp(0, CARRY_FORWARD_CAP)
}

pub fn voucher_value(credits: i64) -> i64 {
    credits * VOUCHER_RATE
}

/// Current cycle marker, e.g. "2026-08".
pub fn current_period() -> String {
    let now = OffsetDateTime::now_utc();
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

/// A user is reset at most once per cycle; a second reset in the same
/// cycle must skip them.
pub fn needs_reset(last_reset_period: Option<&str>, period: &str) -> bool {
    last_reset_period != Some(period)
}

/// Rank by lifetime credits received, ties broken by the lower user id.
pub fn rank_leaderboard(
    mut entries: Vec<LeaderboardEntry>,
    limit: i64,
) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.total_received
            .cmp(&a.total_received)
            .then(a.id.cmp(&b.id))
    });
    entries.truncate(limit as usize);
    entries
}

/// All business-rule checks for a recognition, against the sender's locked
/// row state. Range checks on `credits` happen earlier, at the schema layer.
pub fn check_recognition(
    sender_id: i64,
    receiver_id: i64,
    credits: i64,
    sender: &Balances,
) -> Result<(), ApiError> {
    if sender_id == receiver_id {
        return Err(ApiError::BusinessRule(
            "cannot send credits to yourself".into(),
        ));
    }
    if sender.grant_balance < credits {
        return Err(ApiError::BusinessRule(
            "insufficient grant balance".into(),
        ));
    }
    if sender.sent_this_month + credits > MONTHLY_SEND_LIMIT {
        return Err(ApiError::BusinessRule(
            "monthly sending limit exceeded".into(),
        ));
    }
    Ok(())
}

/// Apply a checked recognition to both parties' balances.
pub fn apply_recognition(sender: &mut Balances, receiver: &mut Balances, credits: i64) {
    sender.grant_balance -= credits;
    sender.sent_this_month += credits;
    receiver.redeemable_balance += credits;
    receiver.total_received += credits;
}

pub fn check_redemption(credits: i64, user: &Balances) -> Result<(), ApiError> {
    if user.redeemable_balance < credits {
        return Err(ApiError::BusinessRule(
            "insufficient redeemable balance".into(),
        ));
    }
    Ok(())
}

/// Apply a checked redemption; returns the voucher value.
pub fn apply_redemption(user: &mut Balances, credits: i64) -> i64 {
    user.redeemable_balance -= credits;
    voucher_value(credits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances(grant: i64, sent: i64, redeemable: i64, received: i64) -> Balances {
        Balances {
            grant_balance: grant,
            sent_this_month: sent,
            redeemable_balance: redeemable,
            total_received: received,
        }
    }

    #[test]
    fn carry_forward_adds_unused_balance() {
        assert_eq!(next_grant_balance(20), 120);
    }

    #[test]
    fn carry_forward_caps_at_fifty() {
        assert_eq!(next_grant_balance(50), 150);
        assert_eq!(next_grant_balance(80), 150);
    }

    #[test]
    fn carry_forward_floors_at_zero() {
        assert_eq!(next_grant_balance(0), 100);
        assert_eq!(next_grant_balance(-10), 100);
    }

    #[test]
    fn self_recognition_always_fails() {
        for credits in [1, 50, 100] {
            let err = check_recognition(3, 3, credits, &balances(100, 0, 0, 0)).unwrap_err();
            assert!(matches!(err, ApiError::BusinessRule(_)));
        }
    }

    #[test]
    fn monthly_limit_boundary() {
        let sender = balances(100, 80, 0, 0);
        // 80 + 21 crosses 100
        assert!(check_recognition(1, 2, 21, &sender).is_err());
        // 80 + 20 lands exactly on 100
        assert!(check_recognition(1, 2, 20, &sender).is_ok());
    }

    #[test]
    fn insufficient_grant_balance_rejected() {
        let sender = balances(5, 0, 0, 0);
        let err = check_recognition(1, 2, 10, &sender).unwrap_err();
        assert!(matches!(err, ApiError::BusinessRule(_)));
    }

    #[test]
    fn recognition_conserves_sender_budget() {
        let mut sender = balances(100, 0, 0, 0);
        let mut receiver = balances(100, 0, 0, 0);
        let before = sender.grant_balance + sender.sent_this_month;

        apply_recognition(&mut sender, &mut receiver, 30);

        assert_eq!(sender.grant_balance + sender.sent_this_month, before);
        assert_eq!(sender.sent_this_month, 30);
        assert_eq!(receiver.redeemable_balance, 30);
        assert_eq!(receiver.total_received, 30);
    }

    #[test]
    fn redemption_never_drives_balance_negative() {
        let user = balances(100, 0, 10, 10);
        assert!(check_redemption(11, &user).is_err());
        assert!(check_redemption(10, &user).is_ok());

        let mut user = user;
        apply_redemption(&mut user, 10);
        assert_eq!(user.redeemable_balance, 0);
    }

    #[test]
    fn voucher_value_is_fixed_rate() {
        assert_eq!(voucher_value(1), 5);
        assert_eq!(voucher_value(20), 100);
        let mut user = balances(0, 0, 20, 20);
        assert_eq!(apply_redemption(&mut user, 20), 100);
    }

    #[test]
    fn reset_skips_users_already_reset_this_cycle() {
        // fresh cycle: everyone qualifies
        assert!(needs_reset(None, "2026-08"));
        assert!(needs_reset(Some("2026-07"), "2026-08"));
        // second run in the same cycle resets nobody
        assert!(!needs_reset(Some("2026-08"), "2026-08"));
    }

    fn entry(id: i64, total_received: i64) -> LeaderboardEntry {
        LeaderboardEntry {
            id,
            name: format!("user-{id}"),
            total_received,
            recognition_count: 0,
            endorsement_count: 0,
        }
    }

    #[test]
    fn leaderboard_orders_descending_and_honors_limit() {
        let ranked = rank_leaderboard(vec![entry(1, 10), entry(2, 40), entry(3, 25)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[1].id, 3);
    }

    #[test]
    fn leaderboard_breaks_ties_by_lower_id() {
        let ranked = rank_leaderboard(vec![entry(9, 30), entry(4, 30), entry(7, 30)], 10);
        let ids: Vec<i64> = ranked.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 7, 9]);
    }

    #[test]
    fn current_period_is_year_dash_month() {
        let period = current_period();
        assert_eq!(period.len(), 7);
        assert_eq!(&period[4..5], "-");
        assert!(period[..4].parse::<i32>().is_ok());
        let month: u8 = period[5..].parse().unwrap();
        assert!((1..=12).contains(&month));
    }
}
