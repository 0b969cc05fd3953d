//! Transponder work queue (§3, §4.7). Transponders discovered via NIT (or
//! seeded by a blind sweep) are deduplicated against both the pending and
//! already-scanned sets before being queued for the scan driver.

use crate::model::{DeliverySystem, TransponderSpec};

const BLIND_SWEEP_START_MHZ: u32 = 114;
const BLIND_SWEEP_END_MHZ: u32 = 858;
const BLIND_SWEEP_STEP_MHZ: u32 = 8;

#[derive(Debug, Default)]
pub struct TransponderQueue {
    pending: Vec<TransponderSpec>,
    done: Vec<TransponderSpec>,
}

impl TransponderQueue {
    pub fn new() -> Self {
        TransponderQueue { pending: Vec::new(), done: Vec::new() }
    }

    pub fn pending(&self) -> &[TransponderSpec] {
        &self.pending
    }

    pub fn done(&self) -> &[TransponderSpec] {
        &self.done
    }

    /// Adds `spec` unless it's the same transponder as one already pending
    /// or already scanned.
    pub fn enqueue(&mut self, spec: TransponderSpec) {
        let known = self.pending.iter().chain(self.done.iter()).any(|s| s.same_transponder(&spec));
        if !known {
            self.pending.push(spec);
        }
    }

    /// Pops the next transponder to scan, FIFO.
    pub fn next(&mut self) -> Option<TransponderSpec> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    /// Records that `spec` has been scanned, so future NIT discoveries of
    /// the same transponder are suppressed.
    pub fn mark_done(&mut self, spec: TransponderSpec) {
        self.done.push(spec);
    }

    /// Seeds the queue with a fixed DVB-C frequency ladder for a blind
    /// sweep, used when no NIT is available to discover transponders.
    pub fn seed_blind_sweep(&mut self, delivery_system: DeliverySystem) {
        let mut freq = BLIND_SWEEP_START_MHZ;
        while freq <= BLIND_SWEEP_END_MHZ {
            self.enqueue(TransponderSpec::new(delivery_system, freq));
            freq += BLIND_SWEEP_STEP_MHZ;
        }
    }
}
