//! Self-service account models

use crate::validated_by_derive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub has_password: bool,
    #[serde(default)]
    pub linked_providers: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRoleDto {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: String,
}

validated_by_derive!(ProfileDto, AvailableRoleDto);

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1))]
    pub requested_roles: Vec<String>,
    #[validate(length(max = 500))]
    pub request_reason: Option<String>,
}
