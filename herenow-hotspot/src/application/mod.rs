pub mod handler;

pub use handler::{HERE_NOW_APP_ID, HereNowHandler};
