/// Default TCP port for file transfer
pub const TRANSFER_PORT: u16 = 5001;

/// Bytes moved per read/write cycle
pub const CHUNK_SIZE: usize = 4096;

/// Upper bound accepted for a configured chunk size (16MB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// The header is read with a single read of at most this many bytes
pub const MAX_HEADER_LEN: usize = 1024;

/// Receiver acknowledgement, exactly these two bytes
pub const ACK: &[u8; 2] = b"OK";

/// Maximum filename length (bytes) kept on the receiving side
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Added to elapsed time before computing throughput
pub const ELAPSED_FLOOR_SECS: f64 = 0.01;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;
