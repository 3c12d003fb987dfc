pub mod models;
pub mod service;

pub use models::*;
pub use service::UserService;
