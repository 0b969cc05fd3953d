//! Program Map Table decoder (tid 0x02).

use crate::context::TableContext;
use crate::model::Service;
use crate::tables::u16_at;

const VIDEO_STREAM_TYPES: &[u8] = &[0x01, 0x02, 0x10, 0x1B, 0x24, 0x42, 0xEA, 0xD1];
const AUDIO_STREAM_TYPES: &[u8] = &[0x03, 0x04, 0x0F, 0x11, 0x81, 0x82, 0x83];
const PRIVATE_DATA_STREAM_TYPE: u8 = 0x06;
const TELETEXT_DESCRIPTOR_TAG: u8 = 0x56;
const SUBTITLE_DESCRIPTOR_TAG: u8 = 0x59;
const AUDIO_DESCRIPTOR_TAGS: &[u8] = &[0x0A, 0x6A, 0x7A];

pub fn decode(raw: &[u8], ctx: &mut TableContext) -> Result<(), String> {
    if raw.len() < 12 {
        return Err("pmt section too short".to_string());
    }
    let program_number = u16_at(raw, 3).ok_or("pmt missing program_number")?;

    let section_length = (((raw[1] & 0x0F) as usize) << 8) | raw[2] as usize;
    let end = (3 + section_length).saturating_sub(4).min(raw.len());
    let pcr_pid = u16_at(raw, 8).ok_or("pmt missing pcr_pid")? & 0x1FFF;
    let program_info_length = (u16_at(raw, 10).ok_or("pmt missing program_info_length")? & 0x0FFF) as usize;

    let svc = ctx.service_mut(program_number);
    svc.pcr_pid = pcr_pid;

    let mut off = 12 + program_info_length;
    while off + 5 <= end {
        let stream_type = raw[off];
        let epid = u16_at(raw, off + 1).ok_or("pmt es entry truncated")? & 0x1FFF;
        let es_info_length = (u16_at(raw, off + 3).ok_or("pmt es entry truncated")? & 0x0FFF) as usize;
        let desc_start = off + 5;
        let desc_end = (desc_start + es_info_length).min(end);
        classify_stream(ctx.service_mut(program_number), stream_type, epid, &raw[desc_start..desc_end]);
        off = desc_end;
    }

    ctx.service_mut(program_number).got_pmt = true;
    Ok(())
}

fn classify_stream(svc: &mut Service, stream_type: u8, pid: u16, descriptors: &[u8]) {
    if VIDEO_STREAM_TYPES.contains(&stream_type) {
        svc.vpid = pid;
    } else if AUDIO_STREAM_TYPES.contains(&stream_type) {
        svc.push_apid(pid);
    } else if stream_type == PRIVATE_DATA_STREAM_TYPE {
        classify_private_data(svc, pid, descriptors);
    }
}

fn classify_private_data(svc: &mut Service, pid: u16, descriptors: &[u8]) {
    let mut off = 0;
    while off + 2 <= descriptors.len() {
        let tag = descriptors[off];
        let len = descriptors[off + 1] as usize;
        if tag == TELETEXT_DESCRIPTOR_TAG {
            svc.ttx_pid = pid;
        } else if tag == SUBTITLE_DESCRIPTOR_TAG {
            svc.sub_pid = pid;
        } else if AUDIO_DESCRIPTOR_TAGS.contains(&tag) {
            svc.push_apid(pid);
        }
        off += 2 + len;
    }
}
