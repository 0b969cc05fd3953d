//! Per-transponder scan life cycle (§4.6): tune, install bootstrap filters,
//! pump packets through a 1 s multiplex loop, decide termination, tear down.

use std::collections::HashSet;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::context::TsContext;
use crate::filter::{ExtMode, TIMEOUT_NIT, TIMEOUT_PAT_PMT_SDT};
use crate::model::TransponderSpec;
use crate::output::{write_event, write_service, write_tune, M3uWriter};
use crate::queue::TransponderQueue;
use crate::rtsp::SatIpCollaborator;
use crate::stats::StatsAccumulator;

const MULTIPLEX_TIMEOUT: Duration = Duration::from_secs(1);
const BOOTSTRAP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_CAP: Duration = Duration::from_secs(300);

const PAT_PID: u16 = 0x00;
const PAT_TID: u8 = 0x00;
const SDT_ACTUAL_PID: u16 = 0x11;
const SDT_ACTUAL_TID: u8 = 0x42;
const NIT_PID: u16 = 0x10;
const NIT_TID: u8 = 0x40;

/// Mirrors the one place a scan-driver failure needs a fixed kind rather
/// than a bare string: a protocol fault is retryable (move to the next
/// transponder), distinct from a fatal configuration error (§10.2).
pub enum ScanOutcome {
    Completed(StatsAccumulator),
    ProtocolFault(String),
}

pub struct ScanDriver<'a, C: SatIpCollaborator> {
    collaborator: &'a mut C,
    cancel: CancellationToken,
}

impl<'a, C: SatIpCollaborator> ScanDriver<'a, C> {
    pub fn new(collaborator: &'a mut C, cancel: CancellationToken) -> Self {
        ScanDriver { collaborator, cancel }
    }

    pub fn scan(
        &mut self,
        spec: &TransponderSpec,
        queue: &mut TransponderQueue,
        out: &mut impl Write,
        mut m3u: Option<&mut M3uWriter>,
        host: &str,
        port: u16,
    ) -> ScanOutcome {
        let mut stats = StatsAccumulator::default();
        let mut ctx = TsContext::new();

        let tune_query = spec.tune_query();
        let client_port = self.collaborator.local_udp_port();
        let (session_id, stream_id) = match self.collaborator.setup(&tune_query, client_port) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("setup failed for {tune_query}: {e}");
                return ScanOutcome::ProtocolFault(e);
            }
        };

        ctx.ensure_pid(PAT_PID);
        let (pat_id, _) = ctx.filters.add_filter(PAT_PID, PAT_TID, 0, ExtMode::Ignore, TIMEOUT_PAT_PMT_SDT, Instant::now());
        ctx.ensure_pid(SDT_ACTUAL_PID);
        let (sdt_id, _) = ctx.filters.add_filter(SDT_ACTUAL_PID, SDT_ACTUAL_TID, 0, ExtMode::Learn, TIMEOUT_PAT_PMT_SDT, Instant::now());
        let mut bootstrap_ids = vec![pat_id, sdt_id];
        if spec.use_nit {
            ctx.ensure_pid(NIT_PID);
            let (nit_id, _) = ctx.filters.add_filter(NIT_PID, NIT_TID, 0, ExtMode::Ignore, TIMEOUT_NIT, Instant::now());
            bootstrap_ids.push(nit_id);
        }

        let mut subscribed: HashSet<u16> = ctx.pids.keys().copied().collect();
        if let Err(e) = self.update_subscription(&stream_id, &session_id, &tune_query, &subscribed) {
            log::warn!("initial pid subscription failed: {e}");
            self.collaborator.teardown(&stream_id, &session_id);
            return ScanOutcome::ProtocolFault(e);
        }

        let _ = write_tune(out, spec);

        let start = Instant::now();
        let mut last_data = Instant::now();
        let mut bootstrap_complete_since: Option<Instant> = None;

        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now.duration_since(start) >= SESSION_CAP {
                log::info!("session cap reached, force-retiring remaining filters");
                break;
            }
            if ctx.filters.all_complete() {
                break;
            }
            let bootstrap_done = bootstrap_ids.iter().all(|&id| ctx.filters.is_complete(id));
            if bootstrap_done {
                let since = *bootstrap_complete_since.get_or_insert(now);
                if now.duration_since(since) >= BOOTSTRAP_IDLE_TIMEOUT && now.duration_since(last_data) >= BOOTSTRAP_IDLE_TIMEOUT {
                    log::info!("bootstrap complete and no data for {BOOTSTRAP_IDLE_TIMEOUT:?}, ending scan");
                    break;
                }
            } else {
                bootstrap_complete_since = None;
            }

            match self.collaborator.control_ready(MULTIPLEX_TIMEOUT) {
                Ok(true) => {
                    let _ = self.collaborator.read_control();
                }
                Ok(false) => {}
                Err(e) => log::debug!("control poll error: {e}"),
            }

            match self.collaborator.udp_ready(Duration::from_millis(0)) {
                Ok(true) => {
                    let mut buf = [0u8; 2048];
                    if let Ok(n) = self.collaborator.read_udp(&mut buf) {
                        if n > 12 {
                            last_data = Instant::now();
                            for chunk in buf[12..n].chunks(188) {
                                if chunk.len() == 188 {
                                    ctx.feed_packet(chunk, queue, &mut stats, spec, Instant::now());
                                }
                            }
                            let current: HashSet<u16> = ctx.pids.keys().copied().collect();
                            if current != subscribed {
                                subscribed = current;
                                if let Err(e) = self.update_subscription(&stream_id, &session_id, &tune_query, &subscribed) {
                                    log::warn!("pid re-subscription failed: {e}");
                                }
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => log::debug!("udp poll error: {e}"),
            }
        }

        for id in ctx.filters.expired(Instant::now()) {
            ctx.filters.force_retire(id);
            stats.filters_timed_out += 1;
        }

        self.collaborator.teardown(&stream_id, &session_id);

        for svc in ctx.services.values() {
            let _ = write_service(out, svc);
            if let Some(writer) = m3u.as_mut() {
                let mut pids: Vec<u16> = vec![svc.pcr_pid, svc.vpid, svc.ttx_pid, svc.sub_pid];
                pids.extend(svc.apids.iter().copied());
                pids.retain(|&p| p != 0);
                pids.sort_unstable();
                pids.dedup();
                let _ = writer.write_entry(&svc.service_name, host, port, &tune_query, &pids);
            }
        }
        for event in &ctx.events {
            let _ = write_event(out, event);
        }

        stats.log_summary();
        ScanOutcome::Completed(stats)
    }

    fn update_subscription(&mut self, stream_id: &str, session_id: &str, tune_query: &str, pids: &HashSet<u16>) -> Result<(), String> {
        let mut pid_vec: Vec<u16> = pids.iter().copied().collect();
        pid_vec.sort_unstable();
        self.collaborator.set_pids(stream_id, session_id, tune_query, &pid_vec)
    }
}
