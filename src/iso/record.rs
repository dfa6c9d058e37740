//! ECMA-119 on-disk primitives: both-endian integers, recording timestamps,
//! directory records and path table entries.

/// Write a 32-bit value in both-endian form (LE then BE) at `offset`.
pub fn set_both_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    buf[offset + 4..offset + 8].copy_from_slice(&value.to_be_bytes());
}

/// Write a 16-bit value in both-endian form (LE then BE) at `offset`.
pub fn set_both_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    buf[offset + 2..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Gregorian date from days since the Unix epoch.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn split_unix(unix: i64) -> ((i64, u32, u32), (u8, u8, u8)) {
    let days = unix.div_euclid(86_400);
    let secs = unix.rem_euclid(86_400);
    (
        civil_from_days(days),
        (
            (secs / 3600) as u8,
            ((secs % 3600) / 60) as u8,
            (secs % 60) as u8,
        ),
    )
}

/// 7-byte recording date and time (ECMA-119 9.1.5), GMT.
pub fn datetime7(unix: i64) -> [u8; 7] {
    let ((year, month, day), (hour, minute, second)) = split_unix(unix);
    let years_since_1900 = (year - 1900).clamp(0, 255) as u8;
    [
        years_since_1900,
        month as u8,
        day as u8,
        hour,
        minute,
        second,
        0, // GMT offset
    ]
}

/// 17-byte decimal date and time used by volume descriptors (ECMA-119 8.4.26).
pub fn datetime17(unix: i64) -> [u8; 17] {
    let ((year, month, day), (hour, minute, second)) = split_unix(unix);
    let text = format!("{year:04}{month:02}{day:02}{hour:02}{minute:02}{second:02}00");
    let mut out = [0u8; 17];
    out[..16].copy_from_slice(&text.as_bytes()[..16]);
    out
}

/// Length a directory record with an identifier of `id_len` bytes occupies.
/// Records are padded to even length.
pub fn record_len(id_len: usize) -> usize {
    33 + id_len + (1 - id_len % 2)
}

/// Encode one directory record.
pub fn directory_record(
    identifier: &[u8],
    extent_lba: u32,
    data_len: u32,
    is_dir: bool,
    unix_time: i64,
) -> Vec<u8> {
    let len = record_len(identifier.len());
    let mut rec = vec![0u8; len];
    rec[0] = len as u8;
    // rec[1]: extended attribute record length, always 0 here
    set_both_u32(&mut rec, 2, extent_lba);
    set_both_u32(&mut rec, 10, data_len);
    rec[18..25].copy_from_slice(&datetime7(unix_time));
    rec[25] = if is_dir { 0x02 } else { 0x00 };
    // rec[26], rec[27]: file unit size / interleave gap, not interleaved
    set_both_u16(&mut rec, 28, 1); // volume sequence number
    rec[32] = identifier.len() as u8;
    rec[33..33 + identifier.len()].copy_from_slice(identifier);
    rec
}

/// Encode one path table entry, little- or big-endian per table type.
pub fn path_table_entry(identifier: &[u8], extent_lba: u32, parent: u16, big_endian: bool) -> Vec<u8> {
    let mut entry = Vec::with_capacity(8 + identifier.len() + identifier.len() % 2);
    entry.push(identifier.len() as u8);
    entry.push(0); // extended attribute record length
    if big_endian {
        entry.extend_from_slice(&extent_lba.to_be_bytes());
        entry.extend_from_slice(&parent.to_be_bytes());
    } else {
        entry.extend_from_slice(&extent_lba.to_le_bytes());
        entry.extend_from_slice(&parent.to_le_bytes());
    }
    entry.extend_from_slice(identifier);
    if identifier.len() % 2 == 1 {
        entry.push(0);
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_endian_encodes_le_then_be() {
        let mut buf = [0u8; 8];
        set_both_u32(&mut buf, 0, 0x0102_0304);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn record_lengths_are_even() {
        assert_eq!(record_len(1), 34); // "." and ".."
        assert_eq!(record_len(2), 36);
        assert_eq!(record_len(11), 44);
        for id_len in 1..64 {
            assert_eq!(record_len(id_len) % 2, 0);
        }
    }

    #[test]
    fn directory_record_layout() {
        let rec = directory_record(&[0x00], 21, 2048, true, 0);
        assert_eq!(rec.len(), 34);
        assert_eq!(rec[0], 34);
        assert_eq!(u32::from_le_bytes(rec[2..6].try_into().unwrap()), 21);
        assert_eq!(u32::from_be_bytes(rec[6..10].try_into().unwrap()), 21);
        assert_eq!(u32::from_le_bytes(rec[10..14].try_into().unwrap()), 2048);
        assert_eq!(rec[25] & 0x02, 0x02);
        assert_eq!(rec[32], 1);
        // Epoch maps to 1970-01-01.
        assert_eq!(rec[18], 70);
        assert_eq!(rec[19], 1);
        assert_eq!(rec[20], 1);
    }

    #[test]
    fn path_table_entry_pads_odd_identifiers() {
        let le = path_table_entry(b"BOOT", 30, 1, false);
        assert_eq!(le.len(), 12);
        assert_eq!(le[0], 4);
        assert_eq!(u32::from_le_bytes(le[2..6].try_into().unwrap()), 30);
        assert_eq!(u16::from_le_bytes(le[6..8].try_into().unwrap()), 1);

        let odd = path_table_entry(&[0x00], 20, 1, true);
        assert_eq!(odd.len(), 10);
        assert_eq!(u32::from_be_bytes(odd[2..6].try_into().unwrap()), 20);
    }

    #[test]
    fn civil_conversion_handles_leap_years() {
        // 2020-02-29 00:00:00 UTC
        let ts = 1_582_934_400;
        let dt = datetime7(ts);
        assert_eq!(dt[0], 120);
        assert_eq!(dt[1], 2);
        assert_eq!(dt[2], 29);
    }
}
