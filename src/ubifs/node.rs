//! UBIFS node header and bodies.
//!
//! Every node is little-endian, starts with a fixed 24-byte common header,
//! and is protected by a CRC-32/JAMCRC covering everything from byte 8 of
//! the header (skipping only the magic and the CRC field itself) to the end
//! of the node.

use crate::crc::jamcrc;
use crate::decompress::{decompress, CompressionType};
use crate::error::{UbifsError, UbifsResult};
use crate::ubi::blocks::UbiVolume;
use crate::ubifs::key::Key;

pub const COMMON_HEADER_MAGIC: u32 = 0x0610_1831;
pub const COMMON_HEADER_SIZE: usize = 24;

fn u16le(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes(b[o..o + 2].try_into().unwrap())
}
fn u32le(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes(b[o..o + 4].try_into().unwrap())
}
fn u64le(b: &[u8], o: usize) -> u64 {
    u64::from_le_bytes(b[o..o + 8].try_into().unwrap())
}

fn key_at(b: &[u8], o: usize) -> Key {
    Key::unpack(b[o..o + 8].try_into().unwrap())
}

/// The 24-byte header common to every node, plus the `(lnum, offs)` it was
/// read from (not stored on disk, but needed by index branches and printing).
#[derive(Debug, Clone, Copy)]
pub struct CommonHeader {
    pub crc: u32,
    pub sqnum: u64,
    pub len: u32,
    pub node_type: u8,
    pub group_type: u8,
    pub lnum: u32,
    pub offs: u32,
}

impl CommonHeader {
    fn parse(data: &[u8; COMMON_HEADER_SIZE], lnum: u32, offs: u32) -> UbifsResult<CommonHeader> {
        let magic = u32le(data, 0);
        if magic != COMMON_HEADER_MAGIC {
            return Err(UbifsError::BadMagic { lnum, offs, magic });
        }
        Ok(CommonHeader {
            crc: u32le(data, 4),
            sqnum: u64le(data, 8),
            len: u32le(data, 16),
            node_type: data[20],
            group_type: data[21],
            lnum,
            offs,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub hdr: CommonHeader,
    pub key: Key,
    pub creat_sqnum: u64,
    pub size: u64,
    pub atime_sec: u64,
    pub ctime_sec: u64,
    pub mtime_sec: u64,
    pub atime_nsec: u32,
    pub ctime_nsec: u32,
    pub mtime_nsec: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub flags: u32,
    pub data_len: u32,
    pub xattr_cnt: u32,
    pub xattr_size: u32,
    pub xattr_names: u32,
    pub compr_type: u16,
    /// Raw trailing bytes: the symlink target for `S_IFLNK` inodes, empty
    /// otherwise.
    pub data: Vec<u8>,
}

impl Inode {
    const FIXED_SIZE: usize = 16 + 5 * 8 + 11 * 4 + 4 + 4 + 2 + 26;

    fn parse(hdr: CommonHeader, data: &[u8]) -> UbifsResult<Inode> {
        if data.len() < Self::FIXED_SIZE {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        let key = key_at(data, 0);
        let creat_sqnum = u64le(data, 16);
        let size = u64le(data, 24);
        let atime_sec = u64le(data, 32);
        let ctime_sec = u64le(data, 40);
        let mtime_sec = u64le(data, 48);
        let atime_nsec = u32le(data, 56);
        let ctime_nsec = u32le(data, 60);
        let mtime_nsec = u32le(data, 64);
        let nlink = u32le(data, 68);
        let uid = u32le(data, 72);
        let gid = u32le(data, 76);
        let mode = u32le(data, 80);
        let flags = u32le(data, 84);
        let data_len = u32le(data, 88);
        let xattr_cnt = u32le(data, 92);
        let xattr_size = u32le(data, 96);
        // 4 bytes padding at offset 100
        let xattr_names = u32le(data, 104);
        let compr_type = u16le(data, 108);
        // 26 bytes padding at offset 110, body starts at 136

        let body = &data[Self::FIXED_SIZE..];
        if body.len() != data_len as usize {
            return Err(UbifsError::DataSizeMismatch {
                want: data_len,
                got: body.len(),
            });
        }

        Ok(Inode {
            hdr,
            key,
            creat_sqnum,
            size,
            atime_sec,
            ctime_sec,
            mtime_sec,
            atime_nsec,
            ctime_nsec,
            mtime_nsec,
            nlink,
            uid,
            gid,
            mode,
            flags,
            data_len,
            xattr_cnt,
            xattr_size,
            xattr_names,
            compr_type,
            data: body.to_vec(),
        })
    }

    /// Inode type nibble, per the upper 4 bits of `mode` (`S_IFMT >> 12`).
    pub fn type_nibble(&self) -> u32 {
        (self.mode >> 12) & 0xF
    }
}

#[derive(Debug, Clone)]
pub struct DataNode {
    pub hdr: CommonHeader,
    pub key: Key,
    pub size: u32,
    pub compr_type: u16,
    pub data: Vec<u8>,
}

impl DataNode {
    const FIXED_SIZE: usize = 16 + 4 + 2 + 2;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<DataNode> {
        if raw.len() < Self::FIXED_SIZE {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        let key = key_at(raw, 0);
        let size = u32le(raw, 16);
        let compr_type = u16le(raw, 20);
        let compr = CompressionType::try_from(compr_type as u8)?;
        let data = decompress(&raw[Self::FIXED_SIZE..], size as usize, compr)?;

        Ok(DataNode {
            hdr,
            key,
            size,
            compr_type,
            data,
        })
    }
}

/// Directory-entry node type codes (`UBIFS_ITYPE_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DirEntryType {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
    BlockDev = 3,
    CharDev = 4,
    Fifo = 5,
    Socket = 6,
}

impl TryFrom<u8> for DirEntryType {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => DirEntryType::Regular,
            1 => DirEntryType::Directory,
            2 => DirEntryType::Symlink,
            3 => DirEntryType::BlockDev,
            4 => DirEntryType::CharDev,
            5 => DirEntryType::Fifo,
            6 => DirEntryType::Socket,
            _ => return Err(()),
        })
    }
}

/// Bitmask of every directory-entry type, for callers that want all of them.
pub const DIRENT_ALL_TYPES: u32 = 127;

#[derive(Debug, Clone)]
pub struct Dirent {
    pub hdr: CommonHeader,
    pub key: Key,
    pub inum: u64,
    pub entry_type: u8,
    pub name: Vec<u8>,
}

impl Dirent {
    const FIXED_SIZE: usize = 16 + 8 + 1 + 1 + 2 + 4;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<Dirent> {
        if raw.len() < Self::FIXED_SIZE {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        let key = key_at(raw, 0);
        let inum = u64le(raw, 16);
        // 1 byte padding at offset 24
        let entry_type = raw[25];
        let nlen = u16le(raw, 26) as usize;
        // 4 bytes padding at offset 28, body starts at 32

        // The name is NUL-terminated on disk; the trailing byte is not part
        // of it.
        let trailer = &raw[Self::FIXED_SIZE..];
        if trailer.is_empty() {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        let name = &trailer[..trailer.len() - 1];
        if name.len() != nlen {
            return Err(UbifsError::DataSizeMismatch {
                want: nlen as u32,
                got: name.len(),
            });
        }

        Ok(Dirent {
            hdr,
            key,
            inum,
            entry_type,
            name: name.to_vec(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExtendedAttribute {
    pub hdr: CommonHeader,
}

#[derive(Debug, Clone)]
pub struct Truncation {
    pub hdr: CommonHeader,
    pub inum: u32,
    pub old_size: u64,
    pub new_size: u64,
}

impl Truncation {
    const SIZE: usize = 4 + 12 + 8 + 8;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<Truncation> {
        if raw.len() != Self::SIZE {
            return Err(UbifsError::DataSizeMismatch { want: Self::SIZE as u32, got: raw.len() });
        }
        let inum = u32le(raw, 0);
        // 12 bytes padding at offset 4
        let old_size = u64le(raw, 16);
        let new_size = u64le(raw, 24);
        Ok(Truncation { hdr, inum, old_size, new_size })
    }
}

#[derive(Debug, Clone)]
pub struct Padding {
    pub hdr: CommonHeader,
    pub pad_len: u32,
}

impl Padding {
    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<Padding> {
        if raw.len() < 4 {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        Ok(Padding { hdr, pad_len: u32le(raw, 0) })
    }
}

#[derive(Debug, Clone)]
pub struct Superblock {
    pub hdr: CommonHeader,
    pub key_hash: u8,
    pub key_fmt: u8,
    pub flags: u32,
    pub min_io_size: u32,
    pub leb_size: u32,
    pub leb_cnt: u32,
    pub max_leb_cnt: u32,
    pub max_bud_bytes: u64,
    pub log_lebs: u32,
    pub lpt_lebs: u32,
    pub orph_lebs: u32,
    pub jhead_cnt: u32,
    pub fanout: u32,
    pub lsave_cnt: u32,
    pub fmt_version: u32,
    pub default_compr: u16,
    pub rp_uid: u32,
    pub rp_gid: u32,
    pub rp_size: u64,
    pub time_gran: u32,
    pub uuid: [u8; 16],
    pub ro_compat_version: u32,
}

impl Superblock {
    const FIXED_SIZE: usize = 2 + 1 + 1 + 5 * 4 + 8 + 7 * 4 + 2 + 2 + 4 + 4 + 8 + 4 + 16 + 4;
    const TRAILING_PAD: usize = 3968;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<Superblock> {
        if raw.len() != Self::FIXED_SIZE + Self::TRAILING_PAD {
            return Err(UbifsError::DataSizeMismatch {
                want: (Self::FIXED_SIZE + Self::TRAILING_PAD) as u32,
                got: raw.len(),
            });
        }
        // 2 bytes padding at offset 0
        let key_hash = raw[2];
        let key_fmt = raw[3];
        let flags = u32le(raw, 4);
        let min_io_size = u32le(raw, 8);
        let leb_size = u32le(raw, 12);
        let leb_cnt = u32le(raw, 16);
        let max_leb_cnt = u32le(raw, 20);
        let max_bud_bytes = u64le(raw, 24);
        let log_lebs = u32le(raw, 32);
        let lpt_lebs = u32le(raw, 36);
        let orph_lebs = u32le(raw, 40);
        let jhead_cnt = u32le(raw, 44);
        let fanout = u32le(raw, 48);
        let lsave_cnt = u32le(raw, 52);
        let fmt_version = u32le(raw, 56);
        let default_compr = u16le(raw, 60);
        // 2 bytes padding at offset 62
        let rp_uid = u32le(raw, 64);
        let rp_gid = u32le(raw, 68);
        let rp_size = u64le(raw, 72);
        let time_gran = u32le(raw, 80);
        let uuid: [u8; 16] = raw[84..100].try_into().unwrap();
        let ro_compat_version = u32le(raw, 100);

        Ok(Superblock {
            hdr,
            key_hash,
            key_fmt,
            flags,
            min_io_size,
            leb_size,
            leb_cnt,
            max_leb_cnt,
            max_bud_bytes,
            log_lebs,
            lpt_lebs,
            orph_lebs,
            jhead_cnt,
            fanout,
            lsave_cnt,
            fmt_version,
            default_compr,
            rp_uid,
            rp_gid,
            rp_size,
            time_gran,
            uuid,
            ro_compat_version,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Master {
    pub hdr: CommonHeader,
    pub highest_inum: u64,
    pub cmt_no: u64,
    pub flags: u32,
    pub log_lnum: u32,
    pub root_lnum: u32,
    pub root_offs: u32,
    pub root_len: u32,
    pub gc_lnum: u32,
    pub ihead_lnum: u32,
    pub ihead_offs: u32,
    pub index_size: u64,
    pub total_free: u64,
    pub total_dirty: u64,
    pub total_used: u64,
    pub total_dead: u64,
    pub total_dark: u64,
    pub lpt_lnum: u32,
    pub lpt_offs: u32,
    pub nhead_lnum: u32,
    pub nhead_offs: u32,
    pub ltab_lnum: u32,
    pub ltab_offs: u32,
    pub lsave_lnum: u32,
    pub lsave_offs: u32,
    pub lscan_lnum: u32,
    pub empty_lebs: u32,
    pub idx_lebs: u32,
    pub leb_cnt: u32,
}

impl Master {
    const FIXED_SIZE: usize = 8 + 8 + 8 * 4 + 6 * 8 + 12 * 4;
    const TRAILING_PAD: usize = 344;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<Master> {
        if raw.len() != Self::FIXED_SIZE + Self::TRAILING_PAD {
            return Err(UbifsError::DataSizeMismatch {
                want: (Self::FIXED_SIZE + Self::TRAILING_PAD) as u32,
                got: raw.len(),
            });
        }
        let highest_inum = u64le(raw, 0);
        let cmt_no = u64le(raw, 8);
        let flags = u32le(raw, 16);
        let log_lnum = u32le(raw, 20);
        let root_lnum = u32le(raw, 24);
        let root_offs = u32le(raw, 28);
        let root_len = u32le(raw, 32);
        let gc_lnum = u32le(raw, 36);
        let ihead_lnum = u32le(raw, 40);
        let ihead_offs = u32le(raw, 44);
        let index_size = u64le(raw, 48);
        let total_free = u64le(raw, 56);
        let total_dirty = u64le(raw, 64);
        let total_used = u64le(raw, 72);
        let total_dead = u64le(raw, 80);
        let total_dark = u64le(raw, 88);
        let lpt_lnum = u32le(raw, 96);
        let lpt_offs = u32le(raw, 100);
        let nhead_lnum = u32le(raw, 104);
        let nhead_offs = u32le(raw, 108);
        let ltab_lnum = u32le(raw, 112);
        let ltab_offs = u32le(raw, 116);
        let lsave_lnum = u32le(raw, 120);
        let lsave_offs = u32le(raw, 124);
        let lscan_lnum = u32le(raw, 128);
        let empty_lebs = u32le(raw, 132);
        let idx_lebs = u32le(raw, 136);
        let leb_cnt = u32le(raw, 140);

        Ok(Master {
            hdr,
            highest_inum,
            cmt_no,
            flags,
            log_lnum,
            root_lnum,
            root_offs,
            root_len,
            gc_lnum,
            ihead_lnum,
            ihead_offs,
            index_size,
            total_free,
            total_dirty,
            total_used,
            total_dead,
            total_dark,
            lpt_lnum,
            lpt_offs,
            nhead_lnum,
            nhead_offs,
            ltab_lnum,
            ltab_offs,
            lsave_lnum,
            lsave_offs,
            lscan_lnum,
            empty_lebs,
            idx_lebs,
            leb_cnt,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LebReference {
    pub hdr: CommonHeader,
    pub lnum: u32,
    pub offs: u32,
    pub jhead: u32,
}

impl LebReference {
    const SIZE: usize = 12 + 28;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<LebReference> {
        if raw.len() != Self::SIZE {
            return Err(UbifsError::DataSizeMismatch { want: Self::SIZE as u32, got: raw.len() });
        }
        Ok(LebReference {
            hdr,
            lnum: u32le(raw, 0),
            offs: u32le(raw, 4),
            jhead: u32le(raw, 8),
        })
    }
}

/// One entry of an index node: a pointer to a child node, keyed by the
/// smallest key reachable through it.
#[derive(Debug, Clone)]
pub struct Branch {
    pub lnum: u32,
    pub offs: u32,
    pub len: u32,
    pub key: Key,
}

impl Branch {
    const SIZE: usize = 12 + 8;
}

#[derive(Debug, Clone)]
pub struct IndexNode {
    pub hdr: CommonHeader,
    pub child_cnt: u16,
    pub level: u16,
    pub branches: Vec<Branch>,
}

impl IndexNode {
    const FIXED_SIZE: usize = 4;

    fn parse(hdr: CommonHeader, raw: &[u8]) -> UbifsResult<IndexNode> {
        if raw.len() < Self::FIXED_SIZE {
            return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
        }
        let child_cnt = u16le(raw, 0);
        let level = u16le(raw, 2);

        let mut branches = Vec::with_capacity(child_cnt as usize);
        let mut o = Self::FIXED_SIZE;
        for _ in 0..child_cnt {
            if o + Branch::SIZE > raw.len() {
                return Err(UbifsError::TruncatedNode { lnum: hdr.lnum, offs: hdr.offs });
            }
            let lnum = u32le(raw, o);
            let offs = u32le(raw, o + 4);
            let len = u32le(raw, o + 8);
            let key = key_at(raw, o + 12);
            branches.push(Branch { lnum, offs, len, key });
            o += Branch::SIZE;
        }

        Ok(IndexNode { hdr, child_cnt, level, branches })
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}

#[derive(Debug, Clone)]
pub struct CommitStart {
    pub hdr: CommonHeader,
    pub cmt_no: u64,
}

#[derive(Debug, Clone)]
pub struct Orphan {
    pub hdr: CommonHeader,
    pub cmt_no: u64,
}

/// Every node type, tagged by `node_type` from the common header.
#[derive(Debug, Clone)]
pub enum Node {
    Inode(Inode),
    Data(DataNode),
    Dirent(Dirent),
    Xattr(ExtendedAttribute),
    Truncation(Truncation),
    Padding(Padding),
    Superblock(Superblock),
    Master(Master),
    LebReference(LebReference),
    Index(IndexNode),
    CommitStart(CommitStart),
    Orphan(Orphan),
}

impl Node {
    pub fn header(&self) -> &CommonHeader {
        match self {
            Node::Inode(n) => &n.hdr,
            Node::Data(n) => &n.hdr,
            Node::Dirent(n) => &n.hdr,
            Node::Xattr(n) => &n.hdr,
            Node::Truncation(n) => &n.hdr,
            Node::Padding(n) => &n.hdr,
            Node::Superblock(n) => &n.hdr,
            Node::Master(n) => &n.hdr,
            Node::LebReference(n) => &n.hdr,
            Node::Index(n) => &n.hdr,
            Node::CommitStart(n) => &n.hdr,
            Node::Orphan(n) => &n.hdr,
        }
    }

    pub fn as_index(&self) -> Option<&IndexNode> {
        match self {
            Node::Index(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_inode(&self) -> Option<&Inode> {
        match self {
            Node::Inode(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match self {
            Node::Data(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_dirent(&self) -> Option<&Dirent> {
        match self {
            Node::Dirent(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_master(&self) -> Option<&Master> {
        match self {
            Node::Master(n) => Some(n),
            _ => None,
        }
    }
}

/// Read and verify a single node at volume-relative `(lnum, offs)`.
pub fn read_node(volume: &mut UbiVolume, lnum: u32, offs: u32) -> UbifsResult<Node> {
    let raw_hdr = volume.read(lnum, offs, COMMON_HEADER_SIZE)?;
    let hdr_bytes: [u8; COMMON_HEADER_SIZE] = raw_hdr.as_slice().try_into().unwrap();
    let hdr = CommonHeader::parse(&hdr_bytes, lnum, offs)?;

    if (hdr.len as usize) < COMMON_HEADER_SIZE {
        return Err(UbifsError::TruncatedNode { lnum, offs });
    }
    let body_len = hdr.len as usize - COMMON_HEADER_SIZE;
    let body = volume.read(lnum, offs + COMMON_HEADER_SIZE as u32, body_len)?;

    let computed = jamcrc(&[&hdr_bytes[8..], body.as_slice()].concat());
    if computed != hdr.crc {
        return Err(UbifsError::CrcMismatch {
            lnum,
            offs,
            want: hdr.crc,
            got: computed,
        });
    }

    let node = match hdr.node_type {
        0 => Node::Inode(Inode::parse(hdr, &body)?),
        1 => Node::Data(DataNode::parse(hdr, &body)?),
        2 => Node::Dirent(Dirent::parse(hdr, &body)?),
        3 => Node::Xattr(ExtendedAttribute { hdr }),
        4 => Node::Truncation(Truncation::parse(hdr, &body)?),
        5 => Node::Padding(Padding::parse(hdr, &body)?),
        6 => Node::Superblock(Superblock::parse(hdr, &body)?),
        7 => Node::Master(Master::parse(hdr, &body)?),
        8 => Node::LebReference(LebReference::parse(hdr, &body)?),
        9 => Node::Index(IndexNode::parse(hdr, &body)?),
        10 => {
            if body.len() < 8 {
                return Err(UbifsError::TruncatedNode { lnum, offs });
            }
            Node::CommitStart(CommitStart { hdr, cmt_no: u64le(&body, 0) })
        }
        11 => {
            if body.len() < 8 {
                return Err(UbifsError::TruncatedNode { lnum, offs });
            }
            Node::Orphan(Orphan { hdr, cmt_no: u64le(&body, 0) })
        }
        other => return Err(UbifsError::UnknownNodeType { lnum, offs, node_type: other }),
    };

    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ubi::blocks::UbiBlocks;
    use crate::ubi::headers::{EcHeader, VidHeader, EC_HDR_MAGIC, VID_HDR_MAGIC};
    use deku::DekuContainerWrite;
    use std::io::Write;

    const LEB_SIZE: u32 = 1 << 15;
    const VID_HDR_OFS: u32 = 64;
    const DATA_OFS: u32 = 128;
    const VOL_ID: u32 = 1;

    fn common_header_bytes(node_type: u8, body: &[u8]) -> Vec<u8> {
        let len = (COMMON_HEADER_SIZE + body.len()) as u32;
        let mut tail = Vec::with_capacity(16);
        tail.extend_from_slice(&7u64.to_le_bytes());
        tail.extend_from_slice(&len.to_le_bytes());
        tail.push(node_type);
        tail.push(0);
        tail.extend_from_slice(&[0u8; 2]);

        let mut crc_input = tail.clone();
        crc_input.extend_from_slice(body);
        let crc = jamcrc(&crc_input);

        let mut out = Vec::with_capacity(len as usize);
        out.extend_from_slice(&COMMON_HEADER_MAGIC.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&tail);
        out.extend_from_slice(body);
        out
    }

    fn write_single_node_image(path: &std::path::Path, node: &[u8]) {
        let mut image = vec![0xFFu8; LEB_SIZE as usize];

        let mut ec = EcHeader {
            magic: EC_HDR_MAGIC,
            version: 1,
            erase_count: 0,
            vid_hdr_ofs: VID_HDR_OFS,
            data_ofs: DATA_OFS,
            image_seq: 1,
            hdr_crc: 0,
        };
        let mut ec_bytes = ec.to_bytes().unwrap();
        ec.hdr_crc = jamcrc(&ec_bytes[..EcHeader::SIZE - 4]);
        ec_bytes = ec.to_bytes().unwrap();
        image[..ec_bytes.len()].copy_from_slice(&ec_bytes);

        let mut vid = VidHeader {
            magic: VID_HDR_MAGIC,
            version: 1,
            vol_type: 1,
            copy_flag: 0,
            compat: 0,
            vol_id: VOL_ID,
            lnum: 0,
            data_size: 0,
            used_ebs: 0,
            data_pad: 0,
            data_crc: 0,
            sqnum: 1,
            hdr_crc: 0,
        };
        let mut vid_bytes = vid.to_bytes().unwrap();
        vid.hdr_crc = jamcrc(&vid_bytes[..VidHeader::SIZE - 4]);
        vid_bytes = vid.to_bytes().unwrap();
        let vid_base = VID_HDR_OFS as usize;
        image[vid_base..vid_base + vid_bytes.len()].copy_from_slice(&vid_bytes);

        let data_base = DATA_OFS as usize;
        image[data_base..data_base + node.len()].copy_from_slice(node);

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&image).unwrap();
    }

    fn open_blocks(dir_name: &str, node: &[u8]) -> UbiBlocks {
        let dir = std::env::temp_dir().join(format!("ubidump-node-test-{dir_name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("img.bin");
        write_single_node_image(&path, node);
        UbiBlocks::open(&path).expect("image should parse")
    }

    #[test]
    fn reads_a_padding_node() {
        let body = 4u32.to_le_bytes().to_vec();
        let node = common_header_bytes(5, &body);
        let mut blocks = open_blocks("padding", &node);

        let mut volume = UbiVolume::new(&mut blocks, VOL_ID, DATA_OFS);
        let parsed = read_node(&mut volume, 0, 0).unwrap();
        match parsed {
            Node::Padding(p) => assert_eq!(p.pad_len, 4),
            other => panic!("expected padding node, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut node = common_header_bytes(5, &4u32.to_le_bytes());
        node[0] ^= 0xFF;
        let mut blocks = open_blocks("badmagic", &node);

        let mut volume = UbiVolume::new(&mut blocks, VOL_ID, DATA_OFS);
        let err = read_node(&mut volume, 0, 0).unwrap_err();
        assert!(matches!(err, UbifsError::BadMagic { .. }));
    }

    #[test]
    fn rejects_crc_mismatch() {
        let mut node = common_header_bytes(5, &4u32.to_le_bytes());
        let last = node.len() - 1;
        node[last] ^= 0xFF;
        let mut blocks = open_blocks("badcrc", &node);

        let mut volume = UbiVolume::new(&mut blocks, VOL_ID, DATA_OFS);
        let err = read_node(&mut volume, 0, 0).unwrap_err();
        assert!(matches!(err, UbifsError::CrcMismatch { .. }));
    }

    #[test]
    fn rejects_unknown_node_type() {
        let node = common_header_bytes(200, &[]);
        let mut blocks = open_blocks("unknowntype", &node);

        let mut volume = UbiVolume::new(&mut blocks, VOL_ID, DATA_OFS);
        let err = read_node(&mut volume, 0, 0).unwrap_err();
        assert!(matches!(err, UbifsError::UnknownNodeType { .. }));
    }

    #[test]
    fn dirent_name_excludes_trailing_nul() {
        let key = Key::new(1, 2, 12345);
        let mut body = vec![0u8; 32];
        body[0..8].copy_from_slice(&key.pack());
        body[16..24].copy_from_slice(&2u64.to_le_bytes());
        body[25] = 0;
        body[26..28].copy_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(b"abc\0");
        let node = common_header_bytes(2, &body);
        let mut blocks = open_blocks("dirent", &node);

        let mut volume = UbiVolume::new(&mut blocks, VOL_ID, DATA_OFS);
        let parsed = read_node(&mut volume, 0, 0).unwrap();
        match parsed {
            Node::Dirent(ent) => {
                assert_eq!(ent.name, b"abc");
                assert_eq!(ent.inum, 2);
            }
            other => panic!("expected dirent, got {other:?}"),
        }
    }
}
