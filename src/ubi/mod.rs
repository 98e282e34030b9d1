//! UBI container layer: physical erase-block scanning, the volume table,
//! and per-volume logical-block reads. Everything here is big-endian and
//! knows nothing about UBIFS.

pub mod blocks;
pub mod headers;

pub use blocks::{UbiBlocks, UbiVolume};
pub use headers::{EcHeader, VidHeader, VtblRecord};
