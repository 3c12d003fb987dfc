//! Log records and the admin log filter

use crate::http_params::iso_millis;
use crate::services::PagedFilter;
use crate::validated_by_derive;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const DEFAULT_SORT: &str = "Id";
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogDto {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 1, max = 20))]
    pub log_level: String,
    pub message: String,
    pub create_date: DateTime<Utc>,
    pub source_context: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i64>,
    pub exception_message: Option<String>,
    pub stack_trace: Option<String>,
    pub correlation_id: Option<String>,
    pub machine_name: Option<String>,
}

validated_by_derive!(LogDto);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub page: i32,
    pub page_size: i32,
    pub sort_by: String,
    pub sort_descending: bool,
    pub log_level: Option<String>,
    #[serde(with = "iso_millis::option")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(with = "iso_millis::option")]
    pub end_date: Option<DateTime<Utc>>,
    pub search_term: Option<String>,
}

impl LogFilter {
    /// First page of the last 24 hours ending at `now`, newest first.
    pub fn rolling_window(now: DateTime<Utc>) -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: DEFAULT_SORT.to_string(),
            sort_descending: true,
            log_level: None,
            start_date: Some(now - Duration::hours(DEFAULT_WINDOW_HOURS)),
            end_date: Some(now),
            search_term: None,
        }
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::rolling_window(Utc::now())
    }
}

impl PagedFilter for LogFilter {
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

/// Body of a batch delete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLogsRequest {
    pub ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_params::build_http_params;
    use chrono::TimeZone;

    #[test]
    fn test_rolling_window_params() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let params = build_http_params(&LogFilter::rolling_window(now)).unwrap();

        assert_eq!(params.get("pageSize"), Some("50"));
        assert_eq!(params.get("sortBy"), Some("Id"));
        assert_eq!(params.get("sortDescending"), Some("true"));
        assert_eq!(params.get("startDate"), Some("2024-03-08T12:00:00.000Z"));
        assert_eq!(params.get("endDate"), Some("2024-03-09T12:00:00.000Z"));
        assert!(!params.has("logLevel"));
        assert!(!params.has("searchTerm"));
    }

    #[test]
    fn test_log_dto_validation() {
        let log: LogDto = serde_json::from_value(serde_json::json!({
            "id": 0,
            "logLevel": "",
            "message": "boom",
            "createDate": "2024-03-09T12:00:00Z",
            "sourceContext": null,
            "requestMethod": null,
            "requestPath": null,
            "statusCode": null,
            "durationMs": null,
            "exceptionMessage": null,
            "stackTrace": null,
            "correlationId": null,
            "machineName": null
        }))
        .unwrap();

        let errors = log.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("id"));
        assert!(fields.contains_key("log_level"));
    }
}
