//! Service Description Table decoder (tid 0x42 actual, 0x46 other).

use crate::context::TableContext;
use crate::filter::{ExtMode, TIMEOUT_EIT_FIRST};
use crate::model::Service;
use crate::tables::u16_at;

const SERVICE_DESCRIPTOR_TAG: u8 = 0x48;
const MAX_NAME_BYTES: usize = 80;
/// Decoded UTF-8 output cap; Latin-1 upper-half bytes expand to two UTF-8
/// bytes each, so an 80-byte input slice can decode past this on its own.
const MAX_NAME_UTF8_BYTES: usize = 79;
const EIT_SCHEDULE_PID: u16 = 0x12;
const EIT_SCHEDULE_ACTUAL_TID: u8 = 0x50;

pub fn decode(raw: &[u8], _table_id: u8, ctx: &mut TableContext) -> Result<(), String> {
    if raw.len() < 12 {
        return Err("sdt section too short".to_string());
    }
    let tsid = u16_at(raw, 3).ok_or("sdt missing transport_stream_id")?;
    let onid = u16_at(raw, 8).ok_or("sdt missing original_network_id")?;
    let section_length = (((raw[1] & 0x0F) as usize) << 8) | raw[2] as usize;
    let end = (3 + section_length).saturating_sub(4).min(raw.len());

    let mut off = 11;
    while off + 5 <= end {
        let sid = u16_at(raw, off).ok_or("sdt entry truncated")?;
        let flags = raw[off + 2];
        let eit_schedule = flags & 0x02 != 0;
        let eit_pf = flags & 0x01 != 0;
        let ca_and_len = u16_at(raw, off + 3).ok_or("sdt entry truncated")?;
        let ca_mode = ca_and_len & 0x1000 != 0;
        let desc_loop_len = (ca_and_len & 0x0FFF) as usize;
        let desc_start = off + 5;
        let desc_end = (desc_start + desc_loop_len).min(end);

        {
            let svc = ctx.service_mut(sid);
            svc.tsid = tsid;
            svc.onid = onid;
            svc.eit_sched = eit_schedule;
            svc.eit_pf = eit_pf;
            svc.ca_mode = ca_mode;
        }

        let mut doff = desc_start;
        while doff + 2 <= desc_end {
            let tag = raw[doff];
            let len = raw[doff + 1] as usize;
            let dstart = doff + 2;
            let dend = (dstart + len).min(desc_end);
            if tag == SERVICE_DESCRIPTOR_TAG {
                let svc = ctx.service_mut(sid);
                parse_service_descriptor(svc, &raw[dstart..dend]);
            }
            doff = dend;
        }

        if ctx.spec.scan_eit {
            let schedule_requested = ctx.service_mut(sid).eit_sched;
            if schedule_requested && ctx.spec.eit_allowed(sid) {
                ctx.install_filter(EIT_SCHEDULE_PID, EIT_SCHEDULE_ACTUAL_TID, sid, ExtMode::Match, TIMEOUT_EIT_FIRST);
            }
        }

        off = desc_end;
    }
    Ok(())
}

fn parse_service_descriptor(svc: &mut Service, data: &[u8]) {
    if data.len() < 2 {
        return;
    }
    let provider_len = data[1] as usize;
    let provider_start = 2;
    let provider_end = (provider_start + provider_len).min(provider_start + MAX_NAME_BYTES).min(data.len());
    svc.provider_name = truncate_utf8(crate::text::decode_dvb_string(&data[provider_start..provider_end]), MAX_NAME_UTF8_BYTES);

    let name_len_pos = provider_start + provider_len;
    if name_len_pos >= data.len() {
        return;
    }
    let service_name_len = data[name_len_pos] as usize;
    let name_start = name_len_pos + 1;
    let name_end = (name_start + service_name_len).min(name_start + MAX_NAME_BYTES).min(data.len());
    svc.service_name = truncate_utf8(crate::text::decode_dvb_string(&data[name_start..name_end]), MAX_NAME_UTF8_BYTES);
    svc.got_sdt = true;
}

/// Truncates `s` to at most `limit` UTF-8 bytes, stepping back to the
/// nearest char boundary rather than splitting a multi-byte sequence.
fn truncate_utf8(mut s: String, limit: usize) -> String {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}
