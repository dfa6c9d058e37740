//! Volume descriptors: primary, Joliet supplementary, El-Torito boot record
//! and the set terminator (ECMA-119 8, Joliet specification).

use super::names::ucs2_be;
use super::record::{datetime17, set_both_u16, set_both_u32};

pub const SECTOR_SIZE: usize = 2048;

/// Joliet level-3 escape sequence (UCS-2, long names).
const JOLIET_LEVEL_3_ESCAPE: &[u8] = b"%/E";

const TYPE_BOOT_RECORD: u8 = 0;
const TYPE_PRIMARY: u8 = 1;
const TYPE_SUPPLEMENTARY: u8 = 2;
const TYPE_TERMINATOR: u8 = 255;

const STANDARD_ID: &[u8; 5] = b"CD001";

/// Geometry shared by the primary and supplementary descriptors.
pub struct VolumeLayout<'a> {
    pub volume_id: &'a str,
    pub total_sectors: u32,
    pub path_table_size: u32,
    pub l_path_table_lba: u32,
    pub m_path_table_lba: u32,
    /// 34-byte record describing the root directory of this hierarchy.
    pub root_record: &'a [u8],
    pub unix_time: i64,
}

fn descriptor(type_code: u8) -> Vec<u8> {
    let mut sector = vec![0u8; SECTOR_SIZE];
    sector[0] = type_code;
    sector[1..6].copy_from_slice(STANDARD_ID);
    sector[6] = 1; // version
    sector
}

/// ASCII text field padded with spaces.
fn set_a_text(buf: &mut [u8], offset: usize, len: usize, text: &str) {
    let field = &mut buf[offset..offset + len];
    field.fill(b' ');
    let bytes = text.as_bytes();
    let n = bytes.len().min(len);
    field[..n].copy_from_slice(&bytes[..n]);
}

/// UCS-2BE text field padded with UCS-2 spaces (Joliet descriptors).
fn set_ucs2_text(buf: &mut [u8], offset: usize, len: usize, text: &str) {
    let field = &mut buf[offset..offset + len];
    for pair in field.chunks_exact_mut(2) {
        pair[0] = 0x00;
        pair[1] = 0x20;
    }
    let bytes = ucs2_be(text);
    let n = bytes.len().min(len) & !1;
    field[..n].copy_from_slice(&bytes[..n]);
}

fn fill_common(sector: &mut [u8], layout: &VolumeLayout<'_>) {
    set_both_u32(sector, 80, layout.total_sectors);
    set_both_u16(sector, 120, 1); // volume set size
    set_both_u16(sector, 124, 1); // volume sequence number
    set_both_u16(sector, 128, SECTOR_SIZE as u16);
    set_both_u32(sector, 132, layout.path_table_size);
    sector[140..144].copy_from_slice(&layout.l_path_table_lba.to_le_bytes());
    // optional type-L path table at 144: none
    sector[148..152].copy_from_slice(&layout.m_path_table_lba.to_be_bytes());
    // optional type-M path table at 152: none
    sector[156..190].copy_from_slice(layout.root_record);

    let stamp = datetime17(layout.unix_time);
    sector[813..830].copy_from_slice(&stamp); // creation
    sector[830..847].copy_from_slice(&stamp); // modification
    let unspecified = b"0000000000000000\0";
    sector[847..864].copy_from_slice(unspecified); // expiration
    sector[864..881].copy_from_slice(unspecified); // effective
    sector[881] = 1; // file structure version
}

/// Primary Volume Descriptor (sector 16).
pub fn primary(layout: &VolumeLayout<'_>) -> Vec<u8> {
    let mut sector = descriptor(TYPE_PRIMARY);
    set_a_text(&mut sector, 8, 32, ""); // system identifier
    set_a_text(&mut sector, 40, 32, layout.volume_id);
    fill_common(&mut sector, layout);
    set_a_text(&mut sector, 190, 128, ""); // volume set identifier
    set_a_text(&mut sector, 318, 128, ""); // publisher
    set_a_text(&mut sector, 446, 128, ""); // data preparer
    set_a_text(&mut sector, 574, 128, ""); // application
    set_a_text(&mut sector, 702, 37, "");
    set_a_text(&mut sector, 739, 37, "");
    set_a_text(&mut sector, 776, 37, "");
    sector
}

/// Joliet Supplementary Volume Descriptor (level 3 escape, UCS-2 text).
pub fn supplementary(layout: &VolumeLayout<'_>) -> Vec<u8> {
    let mut sector = descriptor(TYPE_SUPPLEMENTARY);
    set_ucs2_text(&mut sector, 8, 32, "");
    set_ucs2_text(&mut sector, 40, 32, layout.volume_id);
    sector[88..88 + JOLIET_LEVEL_3_ESCAPE.len()].copy_from_slice(JOLIET_LEVEL_3_ESCAPE);
    fill_common(&mut sector, layout);
    set_ucs2_text(&mut sector, 190, 128, "");
    set_ucs2_text(&mut sector, 318, 128, "");
    set_ucs2_text(&mut sector, 446, 128, "");
    set_ucs2_text(&mut sector, 574, 128, "");
    set_ucs2_text(&mut sector, 702, 36, "");
    set_ucs2_text(&mut sector, 739, 36, "");
    set_ucs2_text(&mut sector, 776, 36, "");
    sector
}

/// El-Torito Boot Record volume descriptor (sector 17), pointing at the
/// boot catalog.
pub fn boot_record(catalog_lba: u32) -> Vec<u8> {
    let mut sector = descriptor(TYPE_BOOT_RECORD);
    let system_id = b"EL TORITO SPECIFICATION";
    sector[7..7 + system_id.len()].copy_from_slice(system_id);
    sector[71..75].copy_from_slice(&catalog_lba.to_le_bytes());
    sector
}

/// Volume Descriptor Set Terminator.
pub fn terminator() -> Vec<u8> {
    descriptor(TYPE_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iso::record::directory_record;

    fn layout<'a>(root: &'a [u8]) -> VolumeLayout<'a> {
        VolumeLayout {
            volume_id: "OPENCORE",
            total_sectors: 100,
            path_table_size: 10,
            l_path_table_lba: 21,
            m_path_table_lba: 22,
            root_record: root,
            unix_time: 0,
        }
    }

    #[test]
    fn primary_descriptor_header_and_geometry() {
        let root = directory_record(&[0x00], 25, 2048, true, 0);
        let sector = primary(&layout(&root));

        assert_eq!(sector.len(), SECTOR_SIZE);
        assert_eq!(sector[0], 1);
        assert_eq!(&sector[1..6], b"CD001");
        assert_eq!(sector[6], 1);
        assert_eq!(&sector[40..48], b"OPENCORE");
        assert_eq!(u32::from_le_bytes(sector[80..84].try_into().unwrap()), 100);
        assert_eq!(u16::from_le_bytes(sector[128..130].try_into().unwrap()), 2048);
        assert_eq!(u32::from_le_bytes(sector[140..144].try_into().unwrap()), 21);
        assert_eq!(u32::from_be_bytes(sector[148..152].try_into().unwrap()), 22);
        assert_eq!(sector[156], 34); // root record length
        assert_eq!(sector[881], 1);
    }

    #[test]
    fn supplementary_carries_joliet_level_3_escape() {
        let root = directory_record(&[0x00], 30, 2048, true, 0);
        let sector = supplementary(&layout(&root));
        assert_eq!(sector[0], 2);
        assert_eq!(&sector[88..91], b"%/E");
        // Volume id is UCS-2 big-endian.
        assert_eq!(&sector[40..44], &[0x00, b'O', 0x00, b'P']);
    }

    #[test]
    fn boot_record_points_at_catalog() {
        let sector = boot_record(20);
        assert_eq!(sector[0], 0);
        assert_eq!(&sector[7..30], b"EL TORITO SPECIFICATION");
        assert_eq!(u32::from_le_bytes(sector[71..75].try_into().unwrap()), 20);
    }

    #[test]
    fn terminator_type_code() {
        let sector = terminator();
        assert_eq!(sector[0], 255);
        assert_eq!(&sector[1..6], b"CD001");
    }
}
