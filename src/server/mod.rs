pub mod auth;
pub mod protocol;
pub mod ws;

pub use protocol::{ClientCommand, Envelope, ServerEvent};
pub use ws::router;
