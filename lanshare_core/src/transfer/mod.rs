//! TCP file transfer engine.
//!
//! One connection moves one file:
//! - the sender writes a `name:size` header and waits for `OK`
//! - the payload follows as raw bytes, exactly `size` of them
//! - progress is reported per chunk and cancellation is checked between chunks

pub mod active;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod state;
pub mod utils;

// Re-export public API
pub use active::{ActiveTransferGuard, ActiveTransfers};
pub use constants::TRANSFER_PORT;
pub use error::TransferError;
pub use protocol::TransferHeader;
pub use receiver::receive_file;
pub use sender::send_file;
pub use server::run_server;
pub use state::{Progress, Role, Transfer, TransferStatus};
pub use utils::TransferOptions;
