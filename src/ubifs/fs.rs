//! Filesystem-level access to a single UBI volume: loading the superblock
//! and master node, walking the index B+-tree, and reconstructing
//! directories and file contents from it.

use std::io::{Seek, Write};

use crate::error::{UbifsError, UbifsResult};
use crate::ubi::blocks::{UbiBlocks, UbiVolume};
use crate::ubifs::cursor::Cursor;
use crate::ubifs::index::Relation;
use crate::ubifs::key::{namehash, Key};
use crate::ubifs::node::{read_node, DirEntryType, Dirent, IndexNode, Master, Node, Superblock};

/// Fixed UBIFS data block size; independent of the underlying device.
pub const BLOCK_SIZE: u64 = 4096;

const MASTER_PROBE_STRIDE: u32 = 0x1000;
const MAX_TREE_DEPTH: usize = 32;

/// The five ordered relations a B+-tree search can be asked for, matching
/// the reference reader's `lt`/`le`/`eq`/`ge`/`gt` search modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRelation {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// A loaded UBIFS filesystem bound to one volume inside a [`UbiBlocks`]
/// image. Holds the superblock, the most recently committed master node,
/// and the root index node, all read once at [`UbiFs::load`] time.
pub struct UbiFs<'a> {
    volume: UbiVolume<'a>,
    sb: Superblock,
    mst: Master,
    root: IndexNode,
}

impl<'a> UbiFs<'a> {
    /// Load the superblock, the most recent master node, and the root index
    /// node for `vol_id` inside `blocks`.
    pub fn load(blocks: &'a mut UbiBlocks, vol_id: u32, data_ofs: u32) -> UbifsResult<UbiFs<'a>> {
        let mut volume = UbiVolume::new(blocks, vol_id, data_ofs);

        let sb_node = read_node(&mut volume, 0, 0)?;
        let sb = match sb_node {
            Node::Superblock(sb) => sb,
            other => {
                return Err(UbifsError::TruncatedNode {
                    lnum: other.header().lnum,
                    offs: other.header().offs,
                })
            }
        };

        let mst = Self::find_most_recent_master(&mut volume)?;

        let root_node = read_node(&mut volume, mst.root_lnum, mst.root_offs)?;
        let root = match root_node {
            Node::Index(idx) => idx,
            other => {
                return Err(UbifsError::TruncatedNode {
                    lnum: other.header().lnum,
                    offs: other.header().offs,
                })
            }
        };

        Ok(UbiFs { volume, sb, mst, root })
    }

    /// Probe LEB 1 at increasing fixed-size offsets for the last valid
    /// master node. UBIFS writes master nodes back-to-back at
    /// `0x1000`-aligned offsets and never erases stale copies until the next
    /// commit reuses the LEB, so the last one that parses is the current one.
    ///
    /// We deliberately don't cross-check against the second master copy in
    /// LEB 2 (the reference reader skips this too); see DESIGN.md.
    fn find_most_recent_master(volume: &mut UbiVolume) -> UbifsResult<Master> {
        let mut offset = 0u32;
        let mut last: Option<Master> = None;
        loop {
            match read_node(volume, 1, offset) {
                Ok(Node::Master(mst)) => {
                    last = Some(mst);
                    offset += MASTER_PROBE_STRIDE;
                }
                _ => break,
            }
        }
        last.ok_or(UbifsError::NotFound)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn master(&self) -> &Master {
        &self.mst
    }

    pub fn root(&self) -> &IndexNode {
        &self.root
    }

    /// Read and verify the node at `(lnum, offs)`.
    pub fn read_node(&mut self, lnum: u32, offs: u32) -> UbifsResult<Node> {
        read_node(&mut self.volume, lnum, offs)
    }

    /// Read the node at `(lnum, offs)`, requiring it to be an index node.
    pub(crate) fn read_index_node(&mut self, lnum: u32, offs: u32) -> UbifsResult<IndexNode> {
        match self.read_node(lnum, offs)? {
            Node::Index(idx) => Ok(idx),
            _ => Err(UbifsError::TruncatedNode { lnum, offs }),
        }
    }

    /// Descend the tree looking for `key`, returning a cursor positioned
    /// according to `search`:
    ///
    /// - `Lt`: the highest-ordered entry with a key strictly less than `key`.
    /// - `Le`: the highest-ordered entry with a key less than or equal to `key`.
    /// - `Eq`: the entry exactly matching `key`, if present.
    /// - `Ge`: the lowest-ordered entry with a key greater than or equal to `key`.
    /// - `Gt`: the lowest-ordered entry with a key strictly greater than `key`.
    ///
    /// Returns `Ok(None)` when no entry satisfies the relation (e.g. `Lt` on
    /// the very first key in the tree).
    pub fn find(&mut self, search: SearchRelation, key: &Key) -> UbifsResult<Option<Cursor>> {
        let mut stack = Vec::new();
        let mut page = self.root.clone();
        let mut act;
        let mut ix;
        loop {
            if stack.len() >= MAX_TREE_DEPTH {
                return Err(UbifsError::TreeTooDeep);
            }
            (act, ix) = page.find(key);
            let is_leaf = page.is_leaf();
            stack.push((page.clone(), ix));
            if is_leaf {
                break;
            }
            let b = &page.branches[ix];
            page = self.read_index_node(b.lnum, b.offs)?;
        }

        let mut cursor = Cursor::new(stack);

        let outcome = match (act, search) {
            (Relation::Gt, SearchRelation::Lt)
            | (Relation::Gt, SearchRelation::Le)
            | (Relation::Eq, SearchRelation::Le)
            | (Relation::Eq, SearchRelation::Eq)
            | (Relation::Eq, SearchRelation::Ge)
            | (Relation::Lt, SearchRelation::Ge)
            | (Relation::Lt, SearchRelation::Gt) => Some(cursor),
            (Relation::Lt, SearchRelation::Lt)
            | (Relation::Lt, SearchRelation::Le)
            | (Relation::Lt, SearchRelation::Eq)
            | (Relation::Gt, SearchRelation::Eq) => None,
            (Relation::Eq, SearchRelation::Lt) => {
                cursor.prev(self)?;
                Some(cursor)
            }
            (Relation::Eq, SearchRelation::Gt)
            | (Relation::Gt, SearchRelation::Ge)
            | (Relation::Gt, SearchRelation::Gt) => {
                cursor.next(self)?;
                Some(cursor)
            }
        };

        Ok(outcome)
    }

    /// Recursively yield every directory-entry-type-matching descendant of
    /// the directory at `inum`, as `(child_inum, path)` pairs. `type_mask`
    /// is a bitmask of `1 << DirEntryType`, e.g. [`DIRENT_ALL_TYPES`] for
    /// everything.
    pub fn walk(&mut self, inum: u32, path: &[Vec<u8>], type_mask: u32) -> UbifsResult<Vec<(u32, Vec<Vec<u8>>)>> {
        let mut out = Vec::new();
        self.walk_into(inum, path, type_mask, &mut out)?;
        Ok(out)
    }

    fn walk_into(
        &mut self,
        inum: u32,
        path: &[Vec<u8>],
        type_mask: u32,
        out: &mut Vec<(u32, Vec<Vec<u8>>)>,
    ) -> UbifsResult<()> {
        let start = Key::new(inum, 2, 0);
        let end = Key::new(inum, 3, 0);

        let Some(mut cursor) = self.find(SearchRelation::Ge, &start)? else {
            return Ok(());
        };

        while !cursor.eof() {
            let Some(k) = cursor.key() else { break };
            if k >= end {
                break;
            }

            let node = cursor.node(self)?.expect("non-eof cursor has a node");
            let ent = match node {
                Node::Dirent(ent) => ent,
                _ => {
                    cursor.next(self)?;
                    continue;
                }
            };

            let mut child_path = path.to_vec();
            child_path.push(ent.name.clone());

            if type_mask & (1 << ent.entry_type) != 0 {
                out.push((ent.inum as u32, child_path.clone()));
            }
            if ent.entry_type == DirEntryType::Directory as u8 {
                self.walk_into(ent.inum as u32, &child_path, type_mask, out)?;
            }

            cursor.next(self)?;
        }

        Ok(())
    }

    /// Write the file data belonging to inode `inum` to `sink`, filling any
    /// gap between the last written block and the inode's declared size with
    /// zeros (or truncating if more data was written than the inode claims).
    pub fn save_file<W: Write + std::io::Seek>(&mut self, inum: u32, sink: &mut W) -> UbifsResult<()> {
        let start = Key::new(inum, 1, 0);
        let end = Key::new(inum, 2, 0);

        let mut saved_len: u64 = 0;
        if let Some(mut cursor) = self.find(SearchRelation::Ge, &start)? {
            while !cursor.eof() {
                let Some(k) = cursor.key() else { break };
                if k >= end {
                    break;
                }

                let node = cursor.node(self)?.expect("non-eof cursor has a node");
                let data = match node {
                    Node::Data(d) => d,
                    _ => {
                        cursor.next(self)?;
                        continue;
                    }
                };
                let block_num = k.value as u64;

                sink.seek(std::io::SeekFrom::Start(BLOCK_SIZE * block_num))?;
                sink.write_all(&data.data)?;
                saved_len += data.data.len() as u64;

                cursor.next(self)?;
            }
        }

        let inode = self.inode(inum)?;
        if saved_len < inode.size && inode.size > 0 {
            // Extend the sink to the declared size without assuming a
            // concrete file-like type: seeking past the current end and
            // writing zero-fills the gap for both real files and in-memory
            // buffers.
            sink.seek(std::io::SeekFrom::Start(inode.size - 1))?;
            sink.write_all(&[0u8])?;
        }
        // If saved_len > inode.size the reference reader only warns; we do
        // not fail extraction for it either.

        Ok(())
    }

    /// Look up the inode node for `inum`.
    pub fn inode(&mut self, inum: u32) -> UbifsResult<crate::ubifs::node::Inode> {
        let cursor = self
            .find(SearchRelation::Eq, &Key::new(inum, 0, 0))?
            .ok_or(UbifsError::NotFound)?;
        match cursor.node(self)?.ok_or(UbifsError::NotFound)? {
            Node::Inode(inode) => Ok(inode),
            _ => Err(UbifsError::NotFound),
        }
    }

    /// Resolve `path` (a list of path components, no leading directory) to
    /// an inode number, starting the search in the directory `start_inum`
    /// (the filesystem root is always inode 1).
    pub fn find_path(&mut self, path: &[Vec<u8>], start_inum: u32) -> UbifsResult<Option<u32>> {
        let mut inum = start_inum;
        let mut itype = DirEntryType::Directory as u8;

        for part in path {
            if itype != DirEntryType::Directory as u8 {
                return Err(UbifsError::NotADirectory(
                    path.iter()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .collect(),
                ));
            }

            let hash = namehash(part);
            let dirent = self.find_dirent(inum, part, hash)?;
            let Some(dirent) = dirent else {
                return Ok(None);
            };

            inum = dirent.inum as u32;
            itype = dirent.entry_type;
        }

        Ok(Some(inum))
    }

    /// Find the dirent named `name` inside directory `inum`.
    ///
    /// The index is ordered by name hash, not by name, so a hash collision
    /// (two different names in the same directory sharing a 29-bit hash)
    /// would make a plain `Eq` lookup ambiguous. We scan forward from the
    /// first matching hash and compare names explicitly to disambiguate,
    /// rather than trusting the first hash match blindly.
    fn find_dirent(&mut self, inum: u32, name: &[u8], hash: u32) -> UbifsResult<Option<Dirent>> {
        let key = Key::new(inum, 2, hash);
        let Some(mut cursor) = self.find(SearchRelation::Ge, &key)? else {
            return Ok(None);
        };

        while !cursor.eof() {
            let Some(k) = cursor.key() else { break };
            if k.inum != inum || k.key_type != 2 || k.value != hash {
                break;
            }

            if let Some(Node::Dirent(ent)) = cursor.node(self)? {
                if ent.name == name {
                    return Ok(Some(ent));
                }
            }
            cursor.next(self)?;
        }

        Ok(None)
    }
}
