//! Role requests awaiting admin review

use crate::validated_by_derive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequestDto {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(range(min = 1))]
    pub user_id: i64,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub requested_role: String,
    pub request_reason: Option<String>,
    pub created_by: Option<String>,
    pub create_date: DateTime<Utc>,
}

validated_by_derive!(PermissionRequestDto);

/// Ids of a bulk approve/reject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPermissionRequest {
    pub ids: Vec<i64>,
}
