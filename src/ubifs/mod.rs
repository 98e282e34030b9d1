//! UBIFS filesystem layer: nodes, keys, the index B+-tree, and the
//! `UbiFs` handle that ties them together into directory/file access.

pub mod cursor;
pub mod fs;
pub mod index;
pub mod key;
pub mod node;

pub use cursor::Cursor;
pub use fs::{SearchRelation, UbiFs};
pub use key::Key;
pub use node::Node;
