//! Program Association Table decoder (tid 0x00, PID 0x00).

use crate::context::TableContext;
use crate::filter::{ExtMode, TIMEOUT_NIT, TIMEOUT_PAT_PMT_SDT};
use crate::tables::u16_at;

const SDT_ACTUAL_PID: u16 = 0x11;
const SDT_ACTUAL_TID: u8 = 0x42;
const PMT_TID: u8 = 0x02;
const NIT_TID: u8 = 0x40;

pub fn decode(raw: &[u8], ctx: &mut TableContext) -> Result<(), String> {
    if raw.len() < 12 {
        return Err("pat section too short".to_string());
    }
    let tsid = u16_at(raw, 3).ok_or("pat missing transport_stream_id")?;
    let section_length = (((raw[1] & 0x0F) as usize) << 8) | raw[2] as usize;
    let end = (3 + section_length).saturating_sub(4).min(raw.len());

    let mut off = 8;
    while off + 4 <= end {
        let program_number = u16_at(raw, off).ok_or("pat entry truncated")?;
        let pid = u16_at(raw, off + 2).ok_or("pat entry truncated")? & 0x1FFF;
        if program_number == 0 {
            ctx.install_filter(pid, NIT_TID, 0, ExtMode::Ignore, TIMEOUT_NIT);
        } else {
            ctx.install_filter(pid, PMT_TID, program_number, ExtMode::Match, TIMEOUT_PAT_PMT_SDT);
            ctx.install_filter(
                SDT_ACTUAL_PID,
                SDT_ACTUAL_TID,
                program_number,
                ExtMode::Match,
                TIMEOUT_PAT_PMT_SDT,
            );
            ctx.service_mut(program_number).tsid = tsid;
        }
        off += 4;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterTable;
    use crate::queue::TransponderQueue;
    use crate::stats::StatsAccumulator;
    use crate::model::{DeliverySystem, TransponderSpec};
    use std::collections::HashMap;
    use std::time::Instant;

    fn pat_section(tsid: u16, entries: &[(u16, u16)]) -> Vec<u8> {
        let mut body = vec![0x00u8, 0x00, 0x00];
        body.extend_from_slice(&tsid.to_be_bytes());
        body.extend_from_slice(&[0x01, 0x00, 0x00]);
        for (pnr, pid) in entries {
            body.extend_from_slice(&pnr.to_be_bytes());
            body.extend_from_slice(&(pid | 0xE000).to_be_bytes());
        }
        let section_length = body.len() - 3 + 4;
        body[1] = 0x80 | (((section_length >> 8) as u8) & 0x0F);
        body[2] = (section_length & 0xFF) as u8;
        let crc = crate::crc::crc32(&body);
        body.extend_from_slice(&crc.to_be_bytes());
        body
    }

    #[test]
    fn pat_installs_pmt_sdt_and_nit_filters() {
        let raw = pat_section(1, &[(0x0001, 0x0064), (0x0000, 0x0010)]);
        let mut filters = FilterTable::new();
        let mut services = HashMap::new();
        let mut events = Vec::new();
        let mut queue = TransponderQueue::new();
        let mut stats = StatsAccumulator::default();
        let spec = TransponderSpec::new(DeliverySystem::DvbT, 594);
        let mut ctx = TableContext {
            filters: &mut filters,
            services: &mut services,
            events: &mut events,
            queue: &mut queue,
            stats: &mut stats,
            spec: &spec,
            now: Instant::now(),
            new_pids: Vec::new(),
        };
        decode(&raw, &mut ctx).unwrap();
        assert_eq!(filters.filter_count(), 3);
        assert_eq!(services.get(&1).unwrap().tsid, 1);
    }
}
