pub mod auth_service;
pub mod dispatcher;
pub mod session_service;

pub use auth_service::{AuthService, GUEST_USER_ID, LoginCredentials, LoginRequest, LoginResponse};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use session_service::SessionAdminService;
