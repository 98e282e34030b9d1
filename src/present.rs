//! Human-readable rendering: `ls -l`-style mode strings, UTC timestamps, and
//! the directory-listing line format used by the CLI's `-l` flag.

use chrono::{TimeZone, Utc};

use crate::ubifs::node::Inode;

const TYPECHAR: &[u8; 16] = b"?pc?d?b?-?l?s???";

fn rwx(bits: u32, extra: u32, xchar: char) -> String {
    let r = if bits & 0b100 != 0 { 'r' } else { '-' };
    let w = if bits & 0b010 != 0 { 'w' } else { '-' };
    let x_chars = ['-', 'x', xchar.to_ascii_uppercase(), xchar.to_ascii_lowercase()];
    let x = x_chars[((bits & 1) + 2 * extra) as usize];
    format!("{r}{w}{x}")
}

/// Render `mode` (a raw `st_mode`-style value: 4-bit type, suid/sgid/sticky,
/// then owner/group/other permission triples) the way `ls -l` would.
pub fn modestring(mode: u32) -> String {
    let type_char = TYPECHAR[(mode >> 12) as usize & 0xF] as char;
    let owner = rwx((mode >> 6) & 7, (mode >> 11) & 1, 's');
    let group = rwx((mode >> 3) & 7, (mode >> 10) & 1, 's');
    let other = rwx(mode & 7, (mode >> 9) & 1, 't');
    format!("{type_char}{owner}{group}{other}")
}

/// Render a UNIX timestamp as a UTC `YYYY-MM-DD HH:MM:SS` string.
pub fn timestring(epoch_secs: u64) -> String {
    match Utc.timestamp_opt(epoch_secs as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("<invalid time {epoch_secs}>"),
    }
}

/// The device-number pair packed into the first two bytes of a device-node
/// inode's trailing data.
pub fn device_numbers(inode: &Inode) -> Option<(u8, u8)> {
    if inode.data.len() < 2 {
        return None;
    }
    Some((inode.data[0], inode.data[1]))
}

/// Symlink target, for `S_IFLNK` inodes.
pub fn symlink_target(inode: &Inode) -> Option<String> {
    if inode.type_nibble() == 10 {
        Some(String::from_utf8_lossy(&inode.data).into_owned())
    } else {
        None
    }
}

/// One `-l`-style listing line for a file at `path` with inode `inode`.
pub fn listing_line(inode: &Inode, path: &[Vec<u8>]) -> String {
    let type_nibble = inode.type_nibble();

    let size_str = if type_nibble == 2 || type_nibble == 6 {
        match device_numbers(inode) {
            Some((major, minor)) => format!("{major},{minor:4}"),
            None => "?".to_string(),
        }
    } else {
        inode.size.to_string()
    };

    let link_str = match symlink_target(inode) {
        Some(target) => format!(" -> {target}"),
        None => String::new(),
    };

    let path_str = path
        .iter()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "{} {:2} {:<5} {:<5} {:>10} {} {}{}",
        modestring(inode.mode),
        inode.nlink,
        inode.uid,
        inode.gid,
        size_str,
        timestring(inode.mtime_sec),
        path_str,
        link_str,
    )
}
