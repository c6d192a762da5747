use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    pub receiver_id: i64,
    pub credits: i64,
    pub note: Option<String>,
}

impl RecognizeRequest {
    /// Schema-level checks; business rules run later against row state.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        if self.receiver_id <= 0 {
            return Err(ApiError::Validation("receiver_id must be positive".into()));
        }
        if !(1..=100).contains(&self.credits) {
            return Err(ApiError::Validation(
                "credits must be between 1 and 100".into(),
            ));
        }
        if let Some(note) = self.note.take() {
            let note = note.trim().to_string();
            if note.len() > 500 {
                return Err(ApiError::Validation(
                    "note must be at most 500 characters".into(),
                ));
            }
            if !note.is_empty() {
                self.note = Some(note);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub credits: i64,
}

impl RedeemRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if !(1..=10_000).contains(&self.credits) {
            return Err(ApiError::Validation(
                "credits must be between 1 and 10000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    pub limit: i64,
}

fn default_leaderboard_limit() -> i64 {
    10
}

#[derive(Debug, Serialize)]
pub struct RecognitionResponse {
    pub status: &'static str,
    pub recognition_id: i64,
}

#[derive(Debug, Serialize)]
pub struct EndorsementResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RedemptionResponse {
    pub status: &'static str,
    pub voucher_value: i64,
}

#[derive(Debug, Serialize)]
pub struct ResetMonthResponse {
    pub status: &'static str,
    pub period: String,
    pub users_reset: u64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub name: String,
    pub total_received: i64,
    pub recognition_count: i64,
    pub endorsement_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognize_rejects_out_of_range_credits() {
        for credits in [0, -5, 101] {
            let mut req = RecognizeRequest {
                receiver_id: 2,
                credits,
                note: None,
            };
            assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
        }
    }

    #[test]
    fn recognize_rejects_nonpositive_receiver() {
        let mut req = RecognizeRequest {
            receiver_id: 0,
            credits: 10,
            note: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn recognize_accepts_boundary_credits() {
        for credits in [1, 100] {
            let mut req = RecognizeRequest {
                receiver_id: 2,
                credits,
                note: Some("Great work!".into()),
            };
            assert!(req.validate().is_ok());
        }
    }

    #[test]
    fn blank_note_becomes_none() {
        let mut req = RecognizeRequest {
            receiver_id: 2,
            credits: 10,
            note: Some("   ".into()),
        };
        req.validate().unwrap();
        assert_eq!(req.note, None);
    }

    #[test]
    fn overlong_note_rejected() {
        let mut req = RecognizeRequest {
            receiver_id: 2,
            credits: 10,
            note: Some("A".repeat(501)),
        };
        assert!(matches!(req.validate(), Err(ApiError::Validation(_))));
    }

    #[test]
    fn redeem_range_checks() {
        assert!(RedeemRequest { credits: 0 }.validate().is_err());
        assert!(RedeemRequest { credits: 10_001 }.validate().is_err());
        assert!(RedeemRequest { credits: 1 }.validate().is_ok());
        assert!(RedeemRequest { credits: 10_000 }.validate().is_ok());
    }
}
