//! Error types for every layer of the reader.
//!
//! Each layer gets its own `thiserror`-derived enum so that callers deeper in
//! the stack (e.g. the block scanner) can match on a narrow set of variants,
//! while the CLI only ever has to deal with the top-level [`Error`].

use thiserror::Error;

/// Errors raised while scanning a UBI container and reading its block table.
#[derive(Debug, Error)]
pub enum UbiError {
    #[error("not a UBI image: missing 'UBI#' magic at offset 0")]
    NotUbiImage,

    #[error("could not determine LEB size: no 'UBI#' magic found at any power-of-two offset in [1KiB, 512KiB]")]
    UnknownLebSize,

    #[error("EC header at PEB {peb} is malformed: {reason}")]
    BadEcHeader { peb: u32, reason: String },

    #[error("VID header at PEB {peb} is malformed: {reason}")]
    BadVidHeader { peb: u32, reason: String },

    #[error("volume {vol_id:#x} has no physical block for logical block {lnum}")]
    NoSuchLogicalBlock { vol_id: u32, lnum: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while parsing UBIFS nodes and walking the B+-tree.
#[derive(Debug, Error)]
pub enum UbifsError {
    #[error("node at [{lnum}:{offs:#x}] has bad magic {magic:#010x}")]
    BadMagic { lnum: u32, offs: u32, magic: u32 },

    #[error("node at [{lnum}:{offs:#x}] failed CRC check (want {want:#010x}, got {got:#010x})")]
    CrcMismatch {
        lnum: u32,
        offs: u32,
        want: u32,
        got: u32,
    },

    #[error("node at [{lnum}:{offs:#x}] has unknown node type {node_type}")]
    UnknownNodeType { lnum: u32, offs: u32, node_type: u8 },

    #[error("node at [{lnum}:{offs:#x}] is shorter than its header claims")]
    TruncatedNode { lnum: u32, offs: u32 },

    #[error("index tree exceeds the maximum supported depth (32 levels)")]
    TreeTooDeep,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decompressed size {got} does not match declared size {want}")]
    DataSizeMismatch { want: u32, got: usize },

    #[error("path not found")]
    NotFound,

    #[error("{0:?} is not a directory")]
    NotADirectory(Vec<String>),

    #[error(transparent)]
    Ubi(#[from] UbiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error returned by the public API and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ubi(#[from] UbiError),

    #[error(transparent)]
    Ubifs(#[from] UbifsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type UbiResult<T> = Result<T, UbiError>;
pub type UbifsResult<T> = Result<T, UbifsError>;
pub type Result<T> = std::result::Result<T, Error>;
