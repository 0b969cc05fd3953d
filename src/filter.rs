//! Per-PID section filter bank (§4.3). An owning slab plus two secondary
//! indices (by-PID, and an active-filter list for timeout scanning) replace
//! the intrusive linked lists the system this was modeled on threaded
//! filters through; see DESIGN.md.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ts::SectionHeader;

pub const TIMEOUT_PAT_PMT_SDT: Duration = Duration::from_secs(60);
pub const TIMEOUT_NIT: Duration = Duration::from_secs(120);
pub const TIMEOUT_EIT_FIRST: Duration = Duration::from_secs(15);
pub const TIMEOUT_EIT_SIBLING: Duration = Duration::from_secs(45);

const EIT_SIBLING_PID: u16 = 0x12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtMode {
    Ignore,
    Learn,
    Match,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub usize);

struct SectionFilter {
    pid: u16,
    table_id: u8,
    ext: u16,
    ext_mode: ExtMode,
    version: Option<u8>,
    todo: [u32; 8],
    todo_set: bool,
    complete: bool,
    deadline: Instant,
    timeout: Duration,
    active_pos: Option<usize>,
}

impl SectionFilter {
    fn todo_get(&self, n: u8) -> bool {
        let word = (n / 32) as usize;
        let bit = n % 32;
        self.todo[word] & (1 << bit) != 0
    }

    fn todo_clear(&mut self, n: u8) {
        let word = (n / 32) as usize;
        let bit = n % 32;
        self.todo[word] &= !(1 << bit);
    }

    fn todo_is_empty(&self) -> bool {
        self.todo.iter().all(|w| *w == 0)
    }

    fn init_todo(&mut self, last_section_number: u8) {
        self.todo = [0; 8];
        for n in 0..=last_section_number {
            let word = (n / 32) as usize;
            let bit = n % 32;
            self.todo[word] |= 1 << bit;
        }
        self.todo_set = true;
    }
}

/// One candidate filter due for decode on this dispatch pass.
pub struct DispatchItem {
    pub id: FilterId,
    pub table_id: u8,
    pub ext: u16,
    pub refresh: bool,
}

#[derive(Default)]
pub struct FilterTable {
    slab: Vec<Option<SectionFilter>>,
    by_pid: HashMap<u16, Vec<usize>>,
    active: Vec<usize>,
}

impl FilterTable {
    pub fn new() -> Self {
        FilterTable::default()
    }

    /// Adds a filter, idempotent on (pid, table_id, ext). Returns the filter
    /// id and whether this is the first filter ever installed on `pid`
    /// (the caller should subscribe the PID with the collaborator in that
    /// case).
    pub fn add_filter(
        &mut self,
        pid: u16,
        table_id: u8,
        ext: u16,
        ext_mode: ExtMode,
        timeout: Duration,
        now: Instant,
    ) -> (FilterId, bool) {
        let bucket = self.by_pid.entry(pid).or_default();
        let is_new_pid = bucket.is_empty();
        for &idx in bucket.iter() {
            if let Some(f) = &self.slab[idx] {
                if f.table_id == table_id && f.ext == ext {
                    return (FilterId(idx), false);
                }
            }
        }

        let filter = SectionFilter {
            pid,
            table_id,
            ext,
            ext_mode,
            version: None,
            todo: [0; 8],
            todo_set: false,
            complete: false,
            deadline: now + timeout,
            timeout,
            active_pos: None,
        };
        let idx = self.slab.len();
        self.slab.push(Some(filter));
        self.by_pid.entry(pid).or_default().push(idx);
        self.push_active(idx);
        (FilterId(idx), is_new_pid)
    }

    fn push_active(&mut self, idx: usize) {
        let pos = self.active.len();
        self.active.push(idx);
        self.slab[idx].as_mut().unwrap().active_pos = Some(pos);
    }

    fn remove_active(&mut self, idx: usize) {
        let pos = match self.slab[idx].as_ref().and_then(|f| f.active_pos) {
            Some(p) => p,
            None => return,
        };
        let last = self.active.len() - 1;
        self.active.swap(pos, last);
        self.active.pop();
        if pos < self.active.len() {
            let moved = self.active[pos];
            self.slab[moved].as_mut().unwrap().active_pos = Some(pos);
        }
        self.slab[idx].as_mut().unwrap().active_pos = None;
    }

    /// Computes the set of filters on `pid` due for decode given a newly
    /// completed, framed section, handling version tracking, ext match/learn
    /// and EIT sibling-filter installation. Does not itself invoke any
    /// decoder; the caller does that and reports back via `mark_decoded`.
    pub fn dispatch(&mut self, pid: u16, header: &SectionHeader, raw: &[u8], now: Instant) -> Vec<DispatchItem> {
        let candidates: Vec<usize> = self
            .by_pid
            .get(&pid)
            .map(|v| v.clone())
            .unwrap_or_default();

        let mut out = Vec::new();
        let mut sibling_installs: Vec<(u8, u16)> = Vec::new();

        for idx in candidates {
            let (due, refresh, table_id, ext, needs_siblings) = {
                let f = match self.slab[idx].as_mut() {
                    Some(f) => f,
                    None => continue,
                };
                if f.table_id != header.table_id {
                    continue;
                }
                match f.ext_mode {
                    ExtMode::Match => {
                        if f.ext != header.table_id_extension {
                            continue;
                        }
                    }
                    ExtMode::Learn => {
                        f.ext = header.table_id_extension;
                        f.ext_mode = ExtMode::Match;
                    }
                    ExtMode::Ignore => {}
                }

                // A completed filter never decodes again, even across a
                // version bump; it stays inert until force-retired.
                if f.complete {
                    continue;
                }

                let mut refresh = false;
                match f.version {
                    None => f.version = Some(header.version_number),
                    Some(v) if v != header.version_number => {
                        f.todo_set = false;
                        f.version = Some(header.version_number);
                        refresh = true;
                    }
                    _ => {}
                }

                let mut needs_siblings = false;
                if !f.todo_set {
                    f.init_todo(header.last_section_number);
                    if f.table_id == 0x50 || f.table_id == 0x60 {
                        needs_siblings = true;
                    }
                }

                if !f.todo_get(header.section_number) {
                    continue;
                }
                (true, refresh, f.table_id, f.ext, needs_siblings)
            };

            if needs_siblings && raw.len() > 12 {
                let segment_last = raw[12] & 0x0F;
                let tid = header.table_id;
                for sibling_tid in (tid + 1)..=(tid.wrapping_add(segment_last)) {
                    sibling_installs.push((sibling_tid, header.table_id_extension));
                }
            }

            if due {
                out.push(DispatchItem {
                    id: FilterId(idx),
                    table_id,
                    ext,
                    refresh,
                });
            }
        }

        for (sibling_tid, ext) in sibling_installs {
            self.add_filter(
                EIT_SIBLING_PID,
                sibling_tid,
                ext,
                ExtMode::Match,
                TIMEOUT_EIT_SIBLING,
                now,
            );
        }

        out
    }

    /// Reports that `id` successfully decoded `section_number`; clears the
    /// bit (and, for EIT, the rest of its 8-section segment), extends the
    /// deadline on progress, or marks the filter complete and drops it from
    /// the active index.
    pub fn mark_decoded(&mut self, id: FilterId, section_number: u8, now: Instant) {
        let idx = id.0;
        let now_complete = {
            let f = match self.slab[idx].as_mut() {
                Some(f) => f,
                None => return,
            };
            f.todo_clear(section_number);
            if matches!(f.table_id, 0x4E..=0x6F) {
                let segment_end = section_number | 0x07;
                for n in (section_number + 1)..=segment_end {
                    f.todo_clear(n);
                }
            }
            let complete = f.todo_is_empty();
            if complete {
                f.complete = true;
            } else {
                f.deadline = now + f.timeout;
            }
            complete
        };
        if now_complete {
            self.remove_active(idx);
        }
    }

    /// All filters currently tracked as incomplete have passed their
    /// deadline and should be force-retired (§4.6 termination / session cap).
    pub fn expired(&self, now: Instant) -> Vec<FilterId> {
        self.active
            .iter()
            .filter_map(|&idx| {
                let f = self.slab[idx].as_ref()?;
                if f.deadline <= now {
                    Some(FilterId(idx))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn force_retire(&mut self, id: FilterId) {
        let idx = id.0;
        if let Some(f) = self.slab[idx].as_mut() {
            f.complete = true;
        }
        self.remove_active(idx);
    }

    pub fn all_complete(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_complete(&self, id: FilterId) -> bool {
        self.slab[id.0].as_ref().map(|f| f.complete).unwrap_or(true)
    }

    pub fn pid_of(&self, id: FilterId) -> u16 {
        self.slab[id.0].as_ref().map(|f| f.pid).unwrap_or(0)
    }

    pub fn filter_count(&self) -> usize {
        self.slab.iter().filter(|f| f.is_some()).count()
    }
}
