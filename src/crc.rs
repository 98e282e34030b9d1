//! CRC-32/JAMCRC, the variant used to protect every UBI and UBIFS on-disk
//! header. JAMCRC is the bitwise complement of standard CRC-32/ISO-HDLC:
//! reflected input and output, initial value `0xFFFFFFFF`, and a zero final
//! XOR (so the usual final XOR of `0xFFFFFFFF` is skipped entirely).

use crc::{Crc, CRC_32_JAMCRC};

const JAMCRC: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

/// Compute the JAMCRC checksum of `data`.
pub fn jamcrc(data: &[u8]) -> u32 {
    JAMCRC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        // JAMCRC of an empty buffer is the complement of the standard
        // CRC-32 of an empty buffer (0x00000000), i.e. all-ones.
        assert_eq!(jamcrc(b""), 0xFFFFFFFF);
    }

    #[test]
    fn known_vector() {
        // CRC-32/JAMCRC("123456789") = 0x340BC6D9, the standard check value
        // published for this algorithm.
        assert_eq!(jamcrc(b"123456789"), 0x340BC6D9);
    }
}
