//! Block-level access to a UBI container image: discovering the logical
//! erase-block size, scanning every physical block for its EC/VID headers,
//! and reconstructing the `volume_id -> logical_lnum -> physical_lnum`
//! mapping plus the volume table.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use log::{debug, warn};

use super::headers::{EcHeader, VidHeader, VtblRecord, EC_HDR_MAGIC, VTBL_VOLUME_ID};
use crate::error::{UbiError, UbiResult};

const MIN_LOG_LEB_SIZE: u32 = 10; // 1 KiB
const MAX_LOG_LEB_SIZE_INCLUSIVE: u32 = 19; // 512 KiB

const VTBL_RECORD_COUNT: usize = 128;

/// Block-level view of one UBI container image.
///
/// Owns the backing file. Built once via [`UbiBlocks::open`], after which
/// every volume read goes through [`UbiBlocks::read_volume`] or a
/// [`super::volume::UbiVolume`] handle bound to a single volume id.
pub struct UbiBlocks {
    file: File,
    leb_size: u32,
    /// volume_id -> (logical_lnum -> physical_lnum)
    vmap: HashMap<u32, HashMap<u32, u32>>,
    /// The EC header of whichever physical LEB backs the volume table, if any.
    vtbl_ec: Option<EcHeader>,
    /// All 128 volume-table slots, dense (including empty ones).
    vtbl: Vec<VtblRecord>,
    /// name -> index into `vtbl`, non-empty records only.
    vtbl_by_name: HashMap<Vec<u8>, usize>,
}

impl UbiBlocks {
    /// Open `path`, discover the LEB size, and scan every physical block.
    pub fn open(path: &std::path::Path) -> UbiResult<UbiBlocks> {
        let mut file = File::options().read(true).open(path)?;
        let leb_size = Self::find_leb_size(&mut file)?;

        let filesize = {
            let pos = file.seek(SeekFrom::End(0))?;
            pos
        };
        let max_lebs = (filesize / leb_size as u64) as u32;

        let mut blocks = UbiBlocks {
            file,
            leb_size,
            vmap: HashMap::new(),
            vtbl_ec: None,
            vtbl: Vec::new(),
            vtbl_by_name: HashMap::new(),
        };

        blocks.scan(max_lebs)?;
        blocks.load_volume_table()?;

        Ok(blocks)
    }

    /// Probe offsets `1 << k` for `k` in `[10, 19]` for the `UBI#` magic
    /// that marks the start of the first physical LEB at that stride.
    fn find_leb_size(file: &mut File) -> UbiResult<u32> {
        file.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if magic != EC_HDR_MAGIC {
            return Err(UbiError::NotUbiImage);
        }

        for log_size in MIN_LOG_LEB_SIZE..=MAX_LOG_LEB_SIZE_INCLUSIVE {
            let offset = 1u64 << log_size;
            file.seek(SeekFrom::Start(offset))?;
            let mut probe = [0u8; 4];
            if file.read_exact(&mut probe).is_err() {
                continue;
            }
            if probe == EC_HDR_MAGIC {
                return Ok(1u32 << log_size);
            }
        }

        Err(UbiError::UnknownLebSize)
    }

    /// Scan every physical LEB, parsing its EC and VID headers. Any header
    /// that fails to parse or verify is silently skipped: a UBI image
    /// legitimately contains erased-but-unused blocks, and blocks with only
    /// an EC header (no VID header yet written).
    fn scan(&mut self, max_lebs: u32) -> UbiResult<()> {
        for peb in 0..max_lebs {
            let ec_bytes = match self.read_block(peb, 0, EcHeader::SIZE) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let ec = match EcHeader::parse(&ec_bytes) {
                Some(ec) => ec,
                None => {
                    debug!("PEB {peb}: no valid EC header, skipping");
                    continue;
                }
            };

            let vid_bytes = match self.read_block(peb, ec.vid_hdr_ofs, VidHeader::SIZE) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let vid = match VidHeader::parse(&vid_bytes) {
                Some(vid) => vid,
                None => {
                    debug!("PEB {peb}: EC header present but no valid VID header, skipping");
                    continue;
                }
            };

            // Last-writer-wins on collision, matching the reference reader.
            // See DESIGN.md Open Question 1 for the worn-image caveat.
            self.vmap
                .entry(vid.vol_id)
                .or_default()
                .insert(vid.lnum, peb);
        }

        Ok(())
    }

    /// Load the 128-entry volume table from whichever physical LEB the scan
    /// found under the reserved volume-table id. Picks the *first* physical
    /// LEB seen for that id, ignoring its logical lnum -- this matches the
    /// reference implementation; see DESIGN.md Open Question 1.
    fn load_volume_table(&mut self) -> UbiResult<()> {
        let Some(lmap) = self.vmap.get(&VTBL_VOLUME_ID) else {
            warn!("no volume table found; only the raw physical-volume map is available");
            return Ok(());
        };
        let Some(&peb) = lmap.values().next() else {
            return Ok(());
        };

        let ec_bytes = self.read_block(peb, 0, EcHeader::SIZE)?;
        let ec = EcHeader::parse(&ec_bytes).ok_or_else(|| UbiError::BadEcHeader {
            peb,
            reason: "volume-table LEB's own EC header failed to reparse".into(),
        })?;

        let mut records = Vec::with_capacity(VTBL_RECORD_COUNT);
        let mut by_name = HashMap::new();
        for i in 0..VTBL_RECORD_COUNT {
            let offset = ec.data_ofs + (i as u32) * VtblRecord::SIZE as u32;
            let raw = self.read_block(peb, offset, VtblRecord::SIZE)?;
            let rec = VtblRecord::parse(&raw).ok_or_else(|| UbiError::BadVidHeader {
                peb,
                reason: format!("volume table record {i} failed CRC"),
            })?;

            if !rec.is_empty() {
                by_name.insert(rec.name(), i);
            }
            records.push(rec);
        }

        self.vtbl_ec = Some(ec);
        self.vtbl = records;
        self.vtbl_by_name = by_name;
        Ok(())
    }

    /// Read `size` bytes at `offs` within logical block `lnum`, regardless
    /// of which volume it belongs to (used internally while scanning).
    fn read_block(&mut self, lnum: u32, offs: u32, size: usize) -> UbiResult<Vec<u8>> {
        let pos = lnum as u64 * self.leb_size as u64 + offs as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; size];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read `size` bytes at volume-relative `(logical_lnum, offs)` within
    /// `vol_id`'s address space.
    pub fn read_volume(&mut self, vol_id: u32, logical_lnum: u32, offs: u32, size: usize) -> UbiResult<Vec<u8>> {
        let physical = *self
            .vmap
            .get(&vol_id)
            .and_then(|lmap| lmap.get(&logical_lnum))
            .ok_or(UbiError::NoSuchLogicalBlock {
                vol_id,
                lnum: logical_lnum,
            })?;
        self.read_block(physical, offs, size)
    }

    pub fn leb_size(&self) -> u32 {
        self.leb_size
    }

    /// The `data_ofs` shared by every non-volume-table LEB (taken from the
    /// volume table LEB's own EC header, which is what the source does: it
    /// is simply the per-image erase-block data offset).
    pub fn data_ofs(&self) -> u32 {
        self.vtbl_ec.as_ref().map(|ec| ec.data_ofs).unwrap_or(0)
    }

    pub fn num_volumes(&self) -> usize {
        self.vtbl_by_name.len()
    }

    /// Volume ids in table order, paired with their record.
    pub fn volumes(&self) -> impl Iterator<Item = (u32, &VtblRecord)> {
        let mut ids: Vec<&Vec<u8>> = self.vtbl_by_name.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(move |name| {
            let idx = self.vtbl_by_name[name];
            self.vtbl.get(idx).map(|rec| (idx as u32, rec))
        })
    }

    pub fn vtbl_record(&self, vol_id: u32) -> Option<&VtblRecord> {
        self.vtbl.get(vol_id as usize)
    }

    pub fn vtbl_record_by_name(&self, name: &[u8]) -> Option<(u32, &VtblRecord)> {
        self.vtbl_by_name
            .get(name)
            .map(|&idx| (idx as u32, &self.vtbl[idx]))
    }

    /// Every raw physical-volume id discovered during the scan (not limited
    /// to named volumes -- present even without a volume table).
    pub fn physical_volume_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.vmap.keys().copied()
    }

    pub fn leb_count(&self, vol_id: u32) -> usize {
        self.vmap.get(&vol_id).map(|m| m.len()).unwrap_or(0)
    }
}

/// A cheap handle bound to one volume inside a [`UbiBlocks`] image.
///
/// Translates volume-relative `(lnum, offset)` reads into the block layer's
/// `read_volume` calls by adding the volume's `data_ofs`. This is the only
/// I/O surface the UBIFS layer touches; it never reaches back into
/// `UbiBlocks` directly.
pub struct UbiVolume<'a> {
    blocks: &'a mut UbiBlocks,
    vol_id: u32,
    data_ofs: u32,
}

impl<'a> UbiVolume<'a> {
    pub fn new(blocks: &'a mut UbiBlocks, vol_id: u32, data_ofs: u32) -> UbiVolume<'a> {
        UbiVolume { blocks, vol_id, data_ofs }
    }

    pub fn vol_id(&self) -> u32 {
        self.vol_id
    }

    /// Read `size` bytes at volume-relative `(lnum, offs)`.
    pub fn read(&mut self, lnum: u32, offs: u32, size: usize) -> UbiResult<Vec<u8>> {
        self.blocks.read_volume(self.vol_id, lnum, self.data_ofs + offs, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::jamcrc;
    use deku::DekuContainerWrite;
    use std::io::Write;

    const LEB_SIZE: u32 = 1 << 15; // 32 KiB, smallest convenient test size

    fn encode_ec(erase_count: u64, vid_hdr_ofs: u32, data_ofs: u32) -> Vec<u8> {
        let mut hdr = EcHeader {
            magic: EC_HDR_MAGIC,
            version: 1,
            erase_count,
            vid_hdr_ofs,
            data_ofs,
            image_seq: 1,
            hdr_crc: 0,
        };
        let mut bytes = hdr.to_bytes().unwrap();
        hdr.hdr_crc = jamcrc(&bytes[..EcHeader::SIZE - 4]);
        bytes = hdr.to_bytes().unwrap();
        bytes
    }

    fn encode_vid(vol_id: u32, lnum: u32) -> Vec<u8> {
        use super::super::headers::VID_HDR_MAGIC;
        let mut hdr = VidHeader {
            magic: VID_HDR_MAGIC,
            version: 1,
            vol_type: 1,
            copy_flag: 0,
            compat: 0,
            vol_id,
            lnum,
            data_size: 0,
            used_ebs: 0,
            data_pad: 0,
            data_crc: 0,
            sqnum: 1,
            hdr_crc: 0,
        };
        let mut bytes = hdr.to_bytes().unwrap();
        hdr.hdr_crc = jamcrc(&bytes[..VidHeader::SIZE - 4]);
        bytes = hdr.to_bytes().unwrap();
        bytes
    }

    fn write_peb(buf: &mut Vec<u8>, peb: u32, ec: &[u8], vid_hdr_ofs: u32, vid: Option<&[u8]>) {
        let base = peb as usize * LEB_SIZE as usize;
        buf[base..base + ec.len()].copy_from_slice(ec);
        if let Some(vid) = vid {
            let vid_base = base + vid_hdr_ofs as usize;
            buf[vid_base..vid_base + vid.len()].copy_from_slice(vid);
        }
    }

    fn write_image(tmpdir: &std::path::Path, name: &str, num_pebs: u32) -> (std::path::PathBuf, Vec<u8>) {
        let mut image = vec![0xFFu8; num_pebs as usize * LEB_SIZE as usize];
        let path = tmpdir.join(name);

        let ec = encode_ec(0, 64, 128);
        for peb in 0..num_pebs {
            let vid = encode_vid(0, peb);
            write_peb(&mut image, peb, &ec, 64, Some(&vid));
        }

        let mut f = File::create(&path).unwrap();
        f.write_all(&image).unwrap();
        (path, image)
    }

    #[test]
    fn finds_leb_size_and_scans_blocks() {
        let dir = std::env::temp_dir().join(format!("ubidump-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (path, _) = write_image(&dir, "basic.img", 4);

        let blocks = UbiBlocks::open(&path).expect("image should parse");
        assert_eq!(blocks.leb_size(), LEB_SIZE);
        assert_eq!(blocks.leb_count(0), 4);
    }

    #[test]
    fn rejects_non_ubi_image() {
        let dir = std::env::temp_dir().join(format!("ubidump-test-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_ubi.img");
        let mut f = File::create(&path).unwrap();
        f.write_all(&[0u8; 65536]).unwrap();

        let err = UbiBlocks::open(&path).unwrap_err();
        assert!(matches!(err, UbiError::NotUbiImage));
    }

    #[test]
    fn skips_peb_with_only_ec_header() {
        let dir = std::env::temp_dir().join(format!("ubidump-test-skip-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.img");

        let mut image = vec![0xFFu8; 4 * LEB_SIZE as usize];
        let ec = encode_ec(0, 64, 128);
        // PEB 0 and 2 fully valid; PEB 1 has a corrupted VID header (skipped);
        // PEB 3 has no VID header at all (also skipped).
        write_peb(&mut image, 0, &ec, 64, Some(&encode_vid(5, 0)));
        let mut corrupt_vid = encode_vid(5, 1);
        let last = corrupt_vid.len() - 1;
        corrupt_vid[last] ^= 0xFF;
        write_peb(&mut image, 1, &ec, 64, Some(&corrupt_vid));
        write_peb(&mut image, 2, &ec, 64, Some(&encode_vid(5, 2)));
        write_peb(&mut image, 3, &ec, 64, None);

        let mut f = File::create(&path).unwrap();
        f.write_all(&image).unwrap();

        let blocks = UbiBlocks::open(&path).unwrap();
        assert_eq!(blocks.leb_count(5), 2);
    }
}
