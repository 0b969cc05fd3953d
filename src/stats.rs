//! Counters accumulated across one scan run, logged as a summary at
//! teardown (§10.4).

#[derive(Debug, Default, Clone)]
pub struct StatsAccumulator {
    pub sections_seen: u64,
    pub sections_crc_failed: u64,
    pub cc_errors: u64,
    pub eit_events_deleted: u64,
    pub eit_events_added: u64,
    pub filters_timed_out: u64,
    pub transponders_discovered: u64,
}

impl StatsAccumulator {
    pub fn log_summary(&self) {
        log::info!(
            "sections={} crc_failed={} cc_errors={} eit_added={} eit_deleted={} timed_out={} transponders={}",
            self.sections_seen,
            self.sections_crc_failed,
            self.cc_errors,
            self.eit_events_added,
            self.eit_events_deleted,
            self.filters_timed_out,
            self.transponders_discovered,
        );
    }
}
