//! Table decoders (§4.4): PAT, PMT, NIT, SDT, EIT. Each module exposes a
//! `decode` function taking the raw framed section and a `TableContext`.

pub mod eit;
pub mod nit;
pub mod pat;
pub mod pmt;
pub mod sdt;

use crate::context::TableContext;

/// Dispatches a framed, CRC-verified section to the decoder for its table.
pub fn decode(table_id: u8, raw: &[u8], refresh: bool, ctx: &mut TableContext) -> Result<(), String> {
    match table_id {
        0x00 => pat::decode(raw, ctx),
        0x02 => pmt::decode(raw, ctx),
        0x40 | 0x41 => nit::decode(raw, ctx),
        0x42 | 0x46 => sdt::decode(raw, table_id, ctx),
        0x4E..=0x6F => eit::decode(raw, table_id, refresh, ctx),
        other => Err(format!("no decoder for table_id 0x{other:02x}")),
    }
}

/// Reads a big-endian u16 at `offset`, bounds-checked.
pub(crate) fn u16_at(buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset + 2)
        .map(|s| u16::from_be_bytes([s[0], s[1]]))
}
