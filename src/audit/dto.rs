use serde::Deserialize;

/// Query filters for the audit trail. All filters are optional equality
/// matches; results come back newest first.
#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub user_id: Option<i64>,
    pub entity_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}
