//! Searching within a single index node's branch array.

use crate::ubifs::key::Key;
use crate::ubifs::node::IndexNode;

/// How a search key relates to the branch a search landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `key` sorts before every branch's key; `index` is always 0.
    Lt,
    /// `key` exactly matches branch `index`'s key.
    Eq,
    /// `key` sorts strictly between branch `index` and branch `index + 1`
    /// (or after the last branch, when `index` is the last one).
    Gt,
}

impl IndexNode {
    /// Find where `key` falls among this node's branches.
    ///
    /// Branch keys are non-decreasing. Returns `(Relation::Lt, 0)` if `key`
    /// is smaller than every branch key, `(Relation::Eq, i)` if it matches
    /// branch `i` exactly, or `(Relation::Gt, i)` if it falls strictly after
    /// branch `i` (and, unless `i` is the last branch, before branch
    /// `i + 1`).
    pub fn find(&self, key: &Key) -> (Relation, usize) {
        for (i, b) in self.branches.iter().enumerate() {
            match key.cmp(&b.key) {
                std::cmp::Ordering::Less => {
                    return if i == 0 {
                        (Relation::Lt, 0)
                    } else {
                        (Relation::Gt, i - 1)
                    };
                }
                std::cmp::Ordering::Equal => return (Relation::Eq, i),
                std::cmp::Ordering::Greater => continue,
            }
        }
        (Relation::Gt, self.branches.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubifs::node::{Branch, CommonHeader};

    fn header() -> CommonHeader {
        CommonHeader {
            crc: 0,
            sqnum: 0,
            len: 0,
            node_type: 9,
            group_type: 0,
            lnum: 0,
            offs: 0,
        }
    }

    fn branch(inum: u32, key_type: u8, value: u32) -> Branch {
        Branch {
            lnum: 0,
            offs: 0,
            len: 0,
            key: Key::new(inum, key_type, value),
        }
    }

    fn index_of(keys: &[(u32, u8, u32)]) -> IndexNode {
        IndexNode {
            hdr: header(),
            child_cnt: keys.len() as u16,
            level: 1,
            branches: keys.iter().map(|&(i, t, v)| branch(i, t, v)).collect(),
        }
    }

    #[test]
    fn single_branch_relations() {
        let idx = index_of(&[(5, 0, 0)]);
        assert_eq!(idx.find(&Key::new(4, 0, 0)), (Relation::Lt, 0));
        assert_eq!(idx.find(&Key::new(5, 0, 0)), (Relation::Eq, 0));
        assert_eq!(idx.find(&Key::new(6, 0, 0)), (Relation::Gt, 0));
    }

    #[test]
    fn two_branch_relations() {
        let idx = index_of(&[(5, 0, 0), (10, 0, 0)]);
        assert_eq!(idx.find(&Key::new(1, 0, 0)), (Relation::Lt, 0));
        assert_eq!(idx.find(&Key::new(5, 0, 0)), (Relation::Eq, 0));
        assert_eq!(idx.find(&Key::new(7, 0, 0)), (Relation::Gt, 0));
        assert_eq!(idx.find(&Key::new(10, 0, 0)), (Relation::Eq, 1));
        assert_eq!(idx.find(&Key::new(20, 0, 0)), (Relation::Gt, 1));
    }
}
