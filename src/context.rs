//! Glues the filter table, service/event model and transponder queue
//! together for one transponder's scan. Table decoders receive a
//! `TableContext` rather than owning these collections themselves, since
//! PAT/SDT installation and NIT enqueueing all need to reach back into the
//! same state.

use std::collections::HashMap;
use std::time::Instant;

use crate::filter::{ExtMode, FilterId, FilterTable};
use crate::model::{Event, Service, TransponderSpec};
use crate::queue::TransponderQueue;
use crate::stats::StatsAccumulator;
use std::time::Duration;

pub struct TableContext<'a> {
    pub filters: &'a mut FilterTable,
    pub services: &'a mut HashMap<u16, Service>,
    pub events: &'a mut Vec<Event>,
    pub queue: &'a mut TransponderQueue,
    pub stats: &'a mut StatsAccumulator,
    pub spec: &'a TransponderSpec,
    pub now: Instant,
    pub new_pids: Vec<u16>,
}

impl<'a> TableContext<'a> {
    pub fn service_mut(&mut self, sid: u16) -> &mut Service {
        self.services.entry(sid).or_insert_with(|| Service::new(sid))
    }

    /// Deletes every event whose EIT subtable id is `tid` (used on a
    /// version-refresh, §4.4 EIT).
    pub fn delete_events_for_tid(&mut self, tid: u8) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.tid != tid);
        before - self.events.len()
    }

    /// Installs a filter (§4.3), recording the PID for subscription with the
    /// RTSP collaborator if this is the first filter on it.
    pub fn install_filter(
        &mut self,
        pid: u16,
        table_id: u8,
        ext: u16,
        mode: ExtMode,
        timeout: Duration,
    ) -> FilterId {
        let (id, is_new_pid) = self.filters.add_filter(pid, table_id, ext, mode, timeout, self.now);
        if is_new_pid {
            self.new_pids.push(pid);
        }
        id
    }

    fn take_new_pids(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.new_pids)
    }
}

/// Owns the reassembly state for every subscribed PID on the current
/// transponder, plus the filter table and decoded model. One instance per
/// transponder scan (§3 "every PidState belongs to the current
/// transponder's TS context").
pub struct TsContext {
    pub pids: HashMap<u16, crate::ts::PidState>,
    pub filters: FilterTable,
    pub services: HashMap<u16, Service>,
    pub events: Vec<Event>,
}

impl TsContext {
    pub fn new() -> Self {
        TsContext {
            pids: HashMap::new(),
            filters: FilterTable::new(),
            services: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn ensure_pid(&mut self, pid: u16) -> bool {
        if self.pids.contains_key(&pid) {
            false
        } else {
            self.pids.insert(pid, crate::ts::PidState::new());
            true
        }
    }

    /// Feeds one raw 188-byte TS packet through reassembly, framing and
    /// filter dispatch, invoking the appropriate table decoder for each
    /// section due. Returns the number of sections successfully decoded
    /// (used by the scan driver to extend activity timestamps).
    pub fn feed_packet(
        &mut self,
        packet: &[u8],
        queue: &mut TransponderQueue,
        stats: &mut StatsAccumulator,
        spec: &TransponderSpec,
        now: Instant,
    ) -> usize {
        let (header, payload) = match crate::ts::parse_packet(packet) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("dropping malformed ts packet: {e}");
                return 0;
            }
        };

        let pid_state = match self.pids.get_mut(&header.pid) {
            Some(p) => p,
            None => return 0,
        };

        let sections = pid_state.feed(&header, payload);
        let mut decoded = 0;
        for raw in sections {
            stats.sections_seen += 1;
            let parsed = match crate::ts::frame_section(&raw) {
                Some(h) => h,
                None => {
                    stats.sections_crc_failed += 1;
                    continue;
                }
            };
            let items = self.filters.dispatch(header.pid, &parsed, &raw, now);
            for item in items {
                let mut ctx = TableContext {
                    filters: &mut self.filters,
                    services: &mut self.services,
                    events: &mut self.events,
                    queue,
                    stats,
                    spec,
                    now,
                    new_pids: Vec::new(),
                };
                let result = crate::tables::decode(item.table_id, &raw, item.refresh, &mut ctx);
                let new_pids = ctx.take_new_pids();
                if result.is_ok() {
                    self.filters.mark_decoded(item.id, parsed.section_number, now);
                    decoded += 1;
                }
                for pid in new_pids {
                    self.ensure_pid(pid);
                }
            }
        }
        decoded
    }
}

impl Default for TsContext {
    fn default() -> Self {
        Self::new()
    }
}
