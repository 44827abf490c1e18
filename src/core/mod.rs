pub mod comparator;
pub mod controls;
pub mod error;
pub mod hash;
pub mod history;
pub mod preflight;
pub mod resolver;
pub mod scanner;
pub mod session;
pub mod syncer;

pub use controls::SyncControls;
pub use error::TransferError;
pub use session::TransferSession;
