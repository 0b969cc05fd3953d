//! End-to-end seed-suite scenarios: feed raw 188-byte TS packets through
//! `TsContext::feed_packet` so reassembly, filter dispatch and table
//! decoding are all exercised together, the way a real multiplex pump does.

use std::time::Instant;

use satipscan::context::TsContext;
use satipscan::crc::crc32;
use satipscan::filter::{ExtMode, TIMEOUT_EIT_FIRST, TIMEOUT_NIT, TIMEOUT_PAT_PMT_SDT};
use satipscan::model::{DeliverySystem, TransponderSpec};
use satipscan::queue::TransponderQueue;
use satipscan::stats::StatsAccumulator;

fn single_packet(pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x47, 0x40 | (((pid >> 8) as u8) & 0x1F), (pid & 0xFF) as u8, 0x10 | cc];
    packet.push(0x00); // pointer field
    packet.extend_from_slice(section);
    packet.resize(188, 0xFF);
    packet
}

fn finish_section(mut body: Vec<u8>) -> Vec<u8> {
    let section_length = body.len() - 3 + 4;
    body[1] = 0x80 | (((section_length >> 8) as u8) & 0x0F);
    body[2] = (section_length & 0xFF) as u8;
    let crc = crc32(&body);
    body.extend_from_slice(&crc.to_be_bytes());
    body
}

fn pat_section(tsid: u16, entries: &[(u16, u16)]) -> Vec<u8> {
    let mut body = vec![0x00u8, 0x00, 0x00];
    body.extend_from_slice(&tsid.to_be_bytes());
    body.extend_from_slice(&[0x01, 0x00, 0x00]);
    for (pnr, pid) in entries {
        body.extend_from_slice(&pnr.to_be_bytes());
        body.extend_from_slice(&(pid | 0xE000).to_be_bytes());
    }
    finish_section(body)
}

fn sdt_section(tsid: u16, onid: u16, sid: u16, name: &str) -> Vec<u8> {
    let mut body = vec![0x42u8, 0x00, 0x00];
    body.extend_from_slice(&tsid.to_be_bytes());
    body.extend_from_slice(&[0x01, 0x00, 0x00]);
    body.extend_from_slice(&onid.to_be_bytes());
    body.push(0xFF);
    body.extend_from_slice(&sid.to_be_bytes());
    body.push(0xFC);
    let mut inner = vec![0x01u8, 0u8]; // service_type, provider_len=0
    inner.push(name.len() as u8);
    inner.extend_from_slice(name.as_bytes());
    let mut desc = vec![0x48u8, inner.len() as u8];
    desc.extend_from_slice(&inner);
    let loop_len = desc.len() as u16;
    body.extend_from_slice(&(loop_len | 0x8000).to_be_bytes());
    body.extend_from_slice(&desc);
    finish_section(body)
}

fn bcd_byte(tens: u8, ones: u8) -> u8 {
    (tens << 4) | ones
}

fn encode_bcd_digits(value: u32, byte_count: usize) -> Vec<u8> {
    let mut digits = format!("{:0width$}", value, width = byte_count * 2).into_bytes();
    digits.reverse();
    let mut bytes = Vec::with_capacity(byte_count);
    for chunk in digits.chunks(2) {
        let ones = chunk[0] - b'0';
        let tens = if chunk.len() > 1 { chunk[1] - b'0' } else { 0 };
        bytes.push(bcd_byte(tens, ones));
    }
    bytes.reverse();
    bytes
}

fn cable_descriptor(freq_raw: u32, sr_raw: u32, modulation: u8) -> Vec<u8> {
    let mut body = encode_bcd_digits(freq_raw, 4);
    body.push(0x00);
    body.push(0x00);
    body.push(modulation);
    let sr_digits = sr_raw / 10;
    let sr_last_nibble = ((sr_raw % 10) as u8) << 4;
    let mut sr_bytes = encode_bcd_digits(sr_digits, 3);
    sr_bytes.push(sr_last_nibble);
    body.extend_from_slice(&sr_bytes);
    body
}

fn nit_section(transports: &[(u16, u16, u8, Vec<u8>)]) -> Vec<u8> {
    let mut body = vec![0x40u8, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00];
    body.extend_from_slice(&[0x00, 0x00]);
    let mut ts_loop = Vec::new();
    for (tsid, onid, tag, descriptor_body) in transports {
        ts_loop.extend_from_slice(&tsid.to_be_bytes());
        ts_loop.extend_from_slice(&onid.to_be_bytes());
        let mut descriptors = vec![*tag, descriptor_body.len() as u8];
        descriptors.extend_from_slice(descriptor_body);
        let loop_len = descriptors.len() as u16;
        ts_loop.extend_from_slice(&(loop_len & 0x0FFF).to_be_bytes());
        ts_loop.extend_from_slice(&descriptors);
    }
    let ts_loop_len = ts_loop.len() as u16;
    body.extend_from_slice(&(ts_loop_len & 0x0FFF).to_be_bytes());
    body.extend_from_slice(&ts_loop);
    finish_section(body)
}

fn eit_section(sid: u16, tsid: u16, onid: u16, table_id: u8, version: u8, events: &[(u16, u16, &[u8])]) -> Vec<u8> {
    let mut body = vec![table_id, 0x00, 0x00];
    body.extend_from_slice(&sid.to_be_bytes());
    body.extend_from_slice(&[0x01 | (version << 1), 0x00, 0x00]);
    body.extend_from_slice(&tsid.to_be_bytes());
    body.extend_from_slice(&onid.to_be_bytes());
    body.extend_from_slice(&[0x00, table_id]); // segment_last_section_number, last_table_id
    for (eid, mjd, name_bytes) in events {
        body.extend_from_slice(&eid.to_be_bytes());
        body.extend_from_slice(&mjd.to_be_bytes());
        body.extend_from_slice(&[0x00, 0x00, 0x00]);
        body.extend_from_slice(&[0x00, 0x30, 0x00]);
        let mut inner = b"pol".to_vec();
        inner.push(name_bytes.len() as u8);
        inner.extend_from_slice(name_bytes);
        inner.push(0); // text_len = 0
        let mut descriptor = vec![0x4Du8, inner.len() as u8];
        descriptor.extend_from_slice(&inner);
        let desc_loop_len = descriptor.len() as u16;
        body.extend_from_slice(&(desc_loop_len & 0x0FFF).to_be_bytes());
        body.extend_from_slice(&descriptor);
    }
    finish_section(body)
}

fn spec(delivery: DeliverySystem) -> TransponderSpec {
    TransponderSpec::new(delivery, 594)
}

#[test]
fn pat_triggers_pmt_sdt_and_nit_filters() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let spec = spec(DeliverySystem::DvbT);
    let now = Instant::now();

    ctx.ensure_pid(0x00);
    ctx.filters.add_filter(0x00, 0x00, 0, ExtMode::Ignore, TIMEOUT_PAT_PMT_SDT, now);

    let raw = pat_section(1, &[(0x0001, 0x0064), (0x0000, 0x0010)]);
    let packet = single_packet(0x00, 0, &raw);
    let decoded = ctx.feed_packet(&packet, &mut queue, &mut stats, &spec, now);

    assert_eq!(decoded, 1);
    // PAT filter itself, plus PMT(0x64, ext=1), SDT(0x11, ext=1), NIT(0x10).
    assert_eq!(ctx.filters.filter_count(), 4);
    assert_eq!(ctx.services.get(&1).unwrap().tsid, 1);
}

#[test]
fn cc_discontinuity_discards_partial_section() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let spec = spec(DeliverySystem::DvbT);
    let now = Instant::now();

    ctx.ensure_pid(0x40);
    ctx.filters.add_filter(0x40, 0x42, 0, ExtMode::Learn, TIMEOUT_PAT_PMT_SDT, now);

    let raw = sdt_section(1, 9, 0x1000, "Channel");
    // Split the section in half to force reassembly across two packets, then
    // jump the continuity counter so the second packet is out of sequence.
    let half = raw.len() / 2;

    let mut first = vec![0x47, 0x40, 0x40, 0x15]; // pusi=1, pid=0x40, afc=1, cc=5
    first.push(0x00); // pointer field
    first.extend_from_slice(&raw[..half]);
    first.resize(188, 0xFF);

    let mut second = vec![0x47, 0x00, 0x40, 0x17]; // pusi=0, cc jumps 5 -> 7
    second.extend_from_slice(&raw[half..]);
    second.resize(188, 0xFF);

    ctx.feed_packet(&first, &mut queue, &mut stats, &spec, now);
    let decoded = ctx.feed_packet(&second, &mut queue, &mut stats, &spec, now);

    assert_eq!(decoded, 0);
    assert_eq!(stats.sections_seen, 0);
    assert!(ctx.services.is_empty());
}

#[test]
fn crc_failure_suppresses_decode() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let spec = spec(DeliverySystem::DvbT);
    let now = Instant::now();

    ctx.ensure_pid(0x11);
    ctx.filters.add_filter(0x11, 0x42, 0, ExtMode::Learn, TIMEOUT_PAT_PMT_SDT, now);

    let mut raw = sdt_section(1, 9, 0x1000, "Channel");
    let last = raw.len() - 1;
    raw[last] ^= 0xFF;
    let packet = single_packet(0x11, 0, &raw);
    let decoded = ctx.feed_packet(&packet, &mut queue, &mut stats, &spec, now);

    assert_eq!(decoded, 0);
    assert_eq!(stats.sections_seen, 1);
    assert_eq!(stats.sections_crc_failed, 1);
    assert!(ctx.services.is_empty());
}

#[test]
fn eit_version_bump_does_not_revive_completed_filter() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let spec = spec(DeliverySystem::DvbT);
    let now = Instant::now();

    ctx.ensure_pid(0x12);
    ctx.filters.add_filter(0x12, 0x50, 0x1000, ExtMode::Match, TIMEOUT_EIT_FIRST, now);

    let raw_v3 = eit_section(0x1000, 2, 3, 0x50, 3, &[(10, 60310, b"First")]);
    let packet_v3 = single_packet(0x12, 0, &raw_v3);
    ctx.feed_packet(&packet_v3, &mut queue, &mut stats, &spec, now);
    assert_eq!(ctx.events.len(), 1);
    assert_eq!(ctx.events[0].eid, 10);

    // This section's single segment already completed the filter, so a
    // later version bump must not reopen it: the new section is never
    // decoded and the earlier event stands untouched.
    let raw_v4 = eit_section(0x1000, 2, 3, 0x50, 4, &[(11, 60311, b"Second")]);
    let packet_v4 = single_packet(0x12, 1, &raw_v4);
    ctx.feed_packet(&packet_v4, &mut queue, &mut stats, &spec, now);

    assert_eq!(ctx.events.len(), 1);
    assert_eq!(ctx.events[0].eid, 10);
    assert_eq!(stats.eit_events_deleted, 0);
    assert_eq!(stats.eit_events_added, 1);
}

#[test]
fn nit_cable_descriptor_enqueues_transponder_with_dedup() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let mut spec = spec(DeliverySystem::DvbC);
    spec.use_nit = true;
    let now = Instant::now();

    ctx.ensure_pid(0x10);
    ctx.filters.add_filter(0x10, 0x40, 0, ExtMode::Ignore, TIMEOUT_NIT, now);

    let d1 = cable_descriptor(3_460_000, 69_000, 3);
    let d2 = cable_descriptor(3_470_000, 69_000, 3);
    let raw = nit_section(&[(1, 1, 0x44, d1), (1, 1, 0x44, d2)]);
    let packet = single_packet(0x10, 0, &raw);
    ctx.feed_packet(&packet, &mut queue, &mut stats, &spec, now);

    assert_eq!(queue.pending().len(), 1);
    let discovered = &queue.pending()[0];
    assert_eq!(discovered.freq_mhz, 346);
    assert_eq!(discovered.symbol_rate, Some(6900));
    assert_eq!(stats.transponders_discovered, 1);
}

#[test]
fn short_event_descriptor_transcodes_to_utf8() {
    let mut ctx = TsContext::new();
    let mut queue = TransponderQueue::new();
    let mut stats = StatsAccumulator::default();
    let spec = spec(DeliverySystem::DvbT);
    let now = Instant::now();

    ctx.ensure_pid(0x12);
    ctx.filters.add_filter(0x12, 0x50, 0x1000, ExtMode::Match, TIMEOUT_EIT_FIRST, now);

    // Latin-1 "Król": K, r, 0xF3 ('o' with acute), l.
    let name = [b'K', b'r', 0xF3, b'l'];
    let raw = eit_section(0x1000, 2, 3, 0x50, 0, &[(10, 60310, &name)]);
    let packet = single_packet(0x12, 0, &raw);
    ctx.feed_packet(&packet, &mut queue, &mut stats, &spec, now);

    assert_eq!(ctx.events.len(), 1);
    assert_eq!(ctx.events[0].lang_str(), "pol");
    assert_eq!(ctx.events[0].decoded_name(), "Król");

    let mut out = Vec::new();
    satipscan::output::write_event(&mut out, &ctx.events[0]).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("LANG:pol\n"));
    assert!(text.contains("NAME:Król\n"));
}
