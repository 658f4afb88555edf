use std::io;

/// Convenience alias for fallible channel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file exists but does not carry the channel magic. The payload is
    /// the magic word exactly as it appears in the file, byte by byte.
    #[error("bad magic number: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Both endpoint roles are already claimed.
    #[error("channel file already in use by two endpoints")]
    InUse,

    /// A blocking send or recv ran past its deadline.
    #[error("timed out waiting for the peer")]
    Timeout,

    /// A decoded frame length cannot fit the ring that carried it. Only
    /// reachable when the backing file was corrupted out of band.
    #[error("frame length {len} exceeds ring capacity {capacity}")]
    CorruptFrame { len: u32, capacity: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}
