//! Event Information Table decoder (tid 0x4E..=0x6F).
//!
//! Extension is the service_id. A version bump (signalled by the filter
//! table via `refresh`) means the whole subtable is being replayed from
//! scratch, so every event previously recorded under this `table_id` is
//! dropped before the new event loop is applied (§4.4).

use crate::context::TableContext;
use crate::model::Event;
use crate::tables::u16_at;

const SHORT_EVENT_DESCRIPTOR_TAG: u8 = 0x4D;

pub fn decode(raw: &[u8], table_id: u8, refresh: bool, ctx: &mut TableContext) -> Result<(), String> {
    if raw.len() < 14 {
        return Err("eit section too short".to_string());
    }
    let sid = u16_at(raw, 3).ok_or("eit missing service_id")?;
    let tsid = u16_at(raw, 8).ok_or("eit missing transport_stream_id")?;
    let onid = u16_at(raw, 10).ok_or("eit missing original_network_id")?;
    let section_length = (((raw[1] & 0x0F) as usize) << 8) | raw[2] as usize;
    let end = (3 + section_length).saturating_sub(4).min(raw.len());

    if refresh {
        let removed = ctx.delete_events_for_tid(table_id);
        ctx.stats.eit_events_deleted += removed as u64;
    }

    let mut off = 14;
    while off + 12 <= end {
        let eid = u16_at(raw, off).ok_or("eit entry truncated")?;
        let mjd = u16_at(raw, off + 2).ok_or("eit entry truncated")?;
        let start_h = raw[off + 4];
        let start_m = raw[off + 5];
        let start_s = raw[off + 6];
        let dur_h = raw[off + 7];
        let dur_m = raw[off + 8];
        let dur_s = raw[off + 9];
        let desc_loop_len = (u16_at(raw, off + 10).ok_or("eit entry truncated")? & 0x0FFF) as usize;
        let desc_start = off + 12;
        let desc_end = (desc_start + desc_loop_len).min(end);

        let mut event = Event {
            onid,
            tsid,
            sid,
            eid,
            mjd,
            start_h,
            start_m,
            start_s,
            dur_h,
            dur_m,
            dur_s,
            lang: [0; 3],
            short_name: Vec::new(),
            short_text: Vec::new(),
            tid: table_id,
        };

        let mut doff = desc_start;
        while doff + 2 <= desc_end {
            let tag = raw[doff];
            let len = raw[doff + 1] as usize;
            let dstart = doff + 2;
            let dend = (dstart + len).min(desc_end);
            if tag == SHORT_EVENT_DESCRIPTOR_TAG {
                parse_short_event(&mut event, &raw[dstart..dend]);
            }
            doff = dend;
        }

        ctx.events.push(event);
        ctx.stats.eit_events_added += 1;
        off = desc_end;
    }
    Ok(())
}

fn parse_short_event(event: &mut Event, data: &[u8]) {
    if data.len() < 4 {
        return;
    }
    event.lang.copy_from_slice(&data[0..3]);
    let name_len = data[3] as usize;
    let name_start = 4;
    let name_end = (name_start + name_len).min(data.len());
    let mut short_name = vec![name_len as u8];
    short_name.extend_from_slice(&data[name_start..name_end]);
    event.short_name = short_name;

    if name_end >= data.len() {
        return;
    }
    let text_len = data[name_end] as usize;
    let text_start = name_end + 1;
    let text_end = (text_start + text_len).min(data.len());
    let mut short_text = vec![text_len as u8];
    short_text.extend_from_slice(&data[text_start..text_end]);
    event.short_text = short_text;
}
