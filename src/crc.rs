//! DVB CRC-32 (CRC-32/MPEG-2): polynomial 0x04C11DB7, init 0xFFFFFFFF, no
//! input/output reflection, no final XOR.

use crc::{Crc, CRC_32_MPEG_2};

const DVB_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn crc32(data: &[u8]) -> u32 {
    DVB_CRC.checksum(data)
}

/// Verifies a section's trailing 4-byte CRC against the preceding bytes.
pub fn verify_section(section: &[u8]) -> bool {
    if section.len() < 4 {
        return false;
    }
    let (body, trailer) = section.split_at(section.len() - 4);
    let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    crc32(body) == expected
}
