use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("application is already initialized")]
    AlreadyInitialized,

    #[error("config file {path} is not accessible: {inner}")]
    ConfigUnreadable { path: String, inner: io::Error },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] ini::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("netlink error: {0}")]
    Netlink(String),

    #[error("system call failed: {0}")]
    Nix(#[from] nix::Error),

    #[error("failed to encode protobuf message: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("failed to decode protobuf message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("work queue is closed")]
    QueueClosed,

    #[error("peer envelope failed the origin integrity check")]
    OriginMismatch,

    #[error("peer closed the connection")]
    EndOfFile,

    #[error("unknown dispatcher action for a source that was never constructed: {0}")]
    SourceDisabled(&'static str),
}
