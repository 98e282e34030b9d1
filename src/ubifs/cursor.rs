//! A `Cursor` is a position within the UBIFS index B+-tree: a stack of
//! `(index node, branch index)` frames from the root down to a leaf.
//! Moving the cursor forward or backward pops frames that are exhausted and
//! re-descends into the next or previous subtree, mirroring an in-order
//! traversal of the tree.

use crate::error::UbifsResult;
use crate::ubifs::fs::UbiFs;
use crate::ubifs::key::Key;
use crate::ubifs::node::{IndexNode, Node};

#[derive(Debug, Clone)]
pub struct Cursor {
    stack: Vec<(IndexNode, usize)>,
}

impl Cursor {
    pub(crate) fn new(stack: Vec<(IndexNode, usize)>) -> Cursor {
        Cursor { stack }
    }

    /// True once the cursor has been advanced past the last (or before the
    /// first) leaf entry.
    pub fn eof(&self) -> bool {
        self.stack.is_empty()
    }

    /// The key of the leaf entry the cursor currently points at.
    pub fn key(&self) -> Option<Key> {
        self.stack.last().map(|(page, ix)| page.branches[*ix].key)
    }

    /// Read the leaf node the cursor currently points at.
    pub fn node(&self, fs: &mut UbiFs<'_>) -> UbifsResult<Option<Node>> {
        match self.stack.last() {
            Some((page, ix)) => {
                let b = &page.branches[*ix];
                Ok(Some(fs.read_node(b.lnum, b.offs)?))
            }
            None => Ok(None),
        }
    }

    /// Advance to the next leaf entry in key order.
    pub fn next(&mut self, fs: &mut UbiFs<'_>) -> UbifsResult<()> {
        let (mut page, mut ix) = if self.stack.is_empty() {
            (fs.root().clone(), 0usize)
        } else {
            let (mut page, mut ix) = self.stack.pop().unwrap();
            while !self.stack.is_empty() && ix == page.branches.len() - 1 {
                (page, ix) = self.stack.pop().unwrap();
            }
            if ix == page.branches.len() - 1 {
                // Exhausted the whole tree; cursor is now at eof.
                return Ok(());
            }
            ix += 1;
            (page, ix)
        };

        self.stack.push((page.clone(), ix));
        while !page.is_leaf() {
            let b = &page.branches[ix];
            page = fs.read_index_node(b.lnum, b.offs)?;
            ix = 0;
            self.stack.push((page.clone(), ix));
        }
        Ok(())
    }

    /// Move to the previous leaf entry in key order.
    pub fn prev(&mut self, fs: &mut UbiFs<'_>) -> UbifsResult<()> {
        let (mut page, mut ix) = if self.stack.is_empty() {
            let root = fs.root().clone();
            let ix = root.branches.len() - 1;
            (root, ix)
        } else {
            let (mut page, mut ix) = self.stack.pop().unwrap();
            while !self.stack.is_empty() && ix == 0 {
                (page, ix) = self.stack.pop().unwrap();
            }
            if ix == 0 {
                return Ok(());
            }
            ix -= 1;
            (page, ix)
        };

        self.stack.push((page.clone(), ix));
        while !page.is_leaf() {
            let b = &page.branches[ix];
            page = fs.read_index_node(b.lnum, b.offs)?;
            ix = page.branches.len() - 1;
            self.stack.push((page.clone(), ix));
        }
        Ok(())
    }
}
