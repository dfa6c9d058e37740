//! El-Torito boot catalog (validation entry + initial entry).

use super::volume::SECTOR_SIZE;

/// Size of the virtual sectors the initial entry counts in.
const VIRTUAL_SECTOR: u64 = 512;

/// Build the single-sector boot catalog.
///
/// The validation entry carries the platform id and a checksum chosen so the
/// 16-bit word sum of the entry is zero; the initial entry is a bootable,
/// no-emulation record pointing at the boot image extent.
pub fn catalog_sector(platform_id: u8, boot_image_lba: u32, boot_image_size: u64) -> Vec<u8> {
    let mut sector = vec![0u8; SECTOR_SIZE];

    // Validation entry (bytes 0..32).
    sector[0] = 0x01;
    sector[1] = platform_id;
    sector[0x1e] = 0x55;
    sector[0x1f] = 0xAA;
    let mut sum: u32 = 0;
    for pair in sector[..32].chunks_exact(2) {
        sum = (sum + u16::from_le_bytes([pair[0], pair[1]]) as u32) & 0xFFFF;
    }
    let checksum = ((0x1_0000 - sum) & 0xFFFF) as u16;
    sector[0x1c..0x1e].copy_from_slice(&checksum.to_le_bytes());

    // Initial/default entry (bytes 32..64).
    sector[32] = 0x88; // bootable
    sector[33] = 0x00; // no emulation
    // load segment (34..36) and system type (36) stay zero
    let count = boot_image_size
        .div_ceil(VIRTUAL_SECTOR)
        .clamp(1, u16::MAX as u64) as u16;
    sector[38..40].copy_from_slice(&count.to_le_bytes());
    sector[40..44].copy_from_slice(&boot_image_lba.to_le_bytes());

    sector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_sum(entry: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        for pair in entry.chunks_exact(2) {
            sum = (sum + u16::from_le_bytes([pair[0], pair[1]]) as u32) & 0xFFFF;
        }
        sum as u16
    }

    #[test]
    fn validation_entry_checksums_to_zero() {
        let sector = catalog_sector(2, 40, 5);
        assert_eq!(sector[0], 0x01);
        assert_eq!(sector[1], 2);
        assert_eq!(sector[0x1e], 0x55);
        assert_eq!(sector[0x1f], 0xAA);
        assert_eq!(word_sum(&sector[..32]), 0);
    }

    #[test]
    fn initial_entry_is_bootable_no_emulation() {
        let sector = catalog_sector(2, 40, 5);
        assert_eq!(sector[32], 0x88);
        assert_eq!(sector[33], 0x00);
        assert_eq!(u16::from_le_bytes(sector[38..40].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(sector[40..44].try_into().unwrap()), 40);
    }

    #[test]
    fn sector_count_rounds_up() {
        let sector = catalog_sector(2, 40, 1025);
        assert_eq!(u16::from_le_bytes(sector[38..40].try_into().unwrap()), 3);
    }
}
