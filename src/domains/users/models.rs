//! User administration models

use crate::services::PagedFilter;
use crate::validated_by_derive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const DEFAULT_SORT: &str = "Username";

// ======================================================================
// RESPONSES
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub create_date: DateTime<Utc>,
    pub modify_date: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roles: Vec<String>,
}

validated_by_derive!(UserDto);

// ======================================================================
// REQUESTS
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub id: i64,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
}

/// Ids of a bulk activate/deactivate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserRequest {
    pub ids: Vec<i64>,
}

// ======================================================================
// FILTER
// ======================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub page: i32,
    pub page_size: i32,
    pub sort_by: String,
    pub sort_descending: bool,
    pub search_term: Option<String>,
    pub is_active: Option<bool>,
    pub include_deleted: bool,
}

impl Default for UserFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: DEFAULT_SORT.to_string(),
            sort_descending: false,
            search_term: None,
            is_active: None,
            include_deleted: false,
        }
    }
}

impl PagedFilter for UserFilter {
    fn page(&self) -> i32 {
        self.page
    }

    fn set_page(&mut self, page: i32) {
        self.page = page;
    }

    fn page_size(&self) -> i32 {
        self.page_size
    }

    fn set_page_size(&mut self, page_size: i32) {
        self.page_size = page_size;
    }
}
