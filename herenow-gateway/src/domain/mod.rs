pub mod connection;
pub mod message;
pub mod repositories;
pub mod session;

pub use connection::{
    ActiveConnectionGuard, ConnectionHandle, ConnectionInfo, ConnectionRegistry, OutboundFrame,
};
pub use message::Message;
pub use repositories::{SessionStore, UserDirectory, UserRecord};
pub use session::{ClientInfo, Session, SessionStatus, SessionUser};
