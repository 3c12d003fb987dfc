pub mod account;
pub mod health;
pub mod logs;
pub mod permission_requests;
pub mod users;

pub use account::AccountService;
pub use health::HealthService;
pub use logs::LogManagementService;
pub use permission_requests::PermissionRequestService;
pub use users::UserService;
