#![forbid(unsafe_code)]

//! Read-only access to UBI container images and the UBIFS filesystems
//! stored inside them.
//!
//! The crate is split into the same two layers the on-disk format has:
//! [`ubi`] scans physical erase blocks and reconstructs per-volume logical
//! block maps and the volume table, and [`ubifs`] interprets one volume's
//! contents as a UBIFS B+-tree of inodes, directory entries, and data.

pub mod crc;
pub mod decompress;
pub mod error;
pub mod present;
pub mod ubi;
pub mod ubifs;

pub use error::{Error, Result};
pub use ubi::UbiBlocks;
pub use ubifs::{SearchRelation, UbiFs};
