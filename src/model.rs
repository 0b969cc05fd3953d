//! Service/event/transponder data model shared by the table decoders and the
//! scan driver. Field widths follow the wire encoding, not convenience: see
//! the redesign note in DESIGN.md about codifying bit-widths explicitly.

/// Null PID: padding, never assembled into a section.
pub const NULL_PID: u16 = 0x1FFF;

/// Upper bound on audio ES entries tracked per service (matches the upstream
/// tuner's fixed-size audio PID table).
pub const MAX_ANUM: usize = 32;

/// Delivery systems a transponder can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverySystem {
    DvbC,
    DvbT,
    DvbT2,
    DvbS,
    DvbS2,
    DvbC2,
}

impl DeliverySystem {
    pub fn as_msys(&self) -> &'static str {
        match self {
            DeliverySystem::DvbC => "dvbc",
            DeliverySystem::DvbT => "dvbt",
            DeliverySystem::DvbT2 => "dvbt2",
            DeliverySystem::DvbS => "dvbs",
            DeliverySystem::DvbS2 => "dvbs2",
            DeliverySystem::DvbC2 => "dvbc2",
        }
    }
}

/// Satellite polarization, canonicalized per EN 300 468 satellite delivery
/// system descriptor decoding (`1 ^ pol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarization {
    Horizontal,
    Vertical,
    Left,
    Right,
}

impl Polarization {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Polarization::Horizontal => "h",
            Polarization::Vertical => "v",
            Polarization::Left => "l",
            Polarization::Right => "r",
        }
    }
}

/// Identifies a physical multiplex. Two specs are the same transponder iff
/// delivery system, source, polarization and frequency (within 1 MHz) match.
#[derive(Debug, Clone)]
pub struct TransponderSpec {
    pub delivery_system: DeliverySystem,
    /// Frequency in MHz; a satellite tuner encodes a 1/10000-MHz fraction
    /// separately via `freq_frac`.
    pub freq_mhz: u32,
    pub freq_frac: u32,
    pub source: u8,
    pub polarization: Option<Polarization>,
    pub symbol_rate: Option<u32>,
    pub modulation: Option<u8>,
    pub fec: Option<u8>,
    pub rolloff: Option<u8>,
    pub bandwidth: Option<u8>,
    pub transmission_mode: Option<u8>,
    pub guard_interval: Option<u8>,
    pub orbital_position: Option<u16>,
    pub use_nit: bool,
    pub scan_eit: bool,
    pub eit_sid_allow: Vec<u16>,
}

impl TransponderSpec {
    pub fn new(delivery_system: DeliverySystem, freq_mhz: u32) -> Self {
        TransponderSpec {
            delivery_system,
            freq_mhz,
            freq_frac: 0,
            source: 0,
            polarization: None,
            symbol_rate: None,
            modulation: None,
            fec: None,
            rolloff: None,
            bandwidth: None,
            transmission_mode: None,
            guard_interval: None,
            orbital_position: None,
            use_nit: false,
            scan_eit: false,
            eit_sid_allow: Vec::new(),
        }
    }

    /// Transponder equality per §3: delivery system, source, polarization and
    /// frequency (tolerant of +/- 1 MHz) must all match.
    pub fn same_transponder(&self, other: &TransponderSpec) -> bool {
        self.delivery_system == other.delivery_system
            && self.source == other.source
            && self.polarization == other.polarization
            && self.freq_mhz.abs_diff(other.freq_mhz) <= 1
    }

    pub fn eit_allowed(&self, sid: u16) -> bool {
        self.eit_sid_allow.is_empty() || self.eit_sid_allow.contains(&sid)
    }

    /// Builds the SAT>IP RTSP tune query string (`key=value&...`).
    pub fn tune_query(&self) -> String {
        let mut parts = vec![format!("src={}", self.source.max(1))];
        if self.freq_frac > 0 {
            parts.push(format!("freq={}.{:04}", self.freq_mhz, self.freq_frac));
        } else {
            parts.push(format!("freq={}", self.freq_mhz));
        }
        if let Some(pol) = self.polarization {
            parts.push(format!("pol={}", pol.as_query_value()));
        }
        parts.push(format!("msys={}", self.delivery_system.as_msys()));
        if let Some(sr) = self.symbol_rate {
            parts.push(format!("sr={sr}"));
        }
        if let Some(fec) = self.fec {
            parts.push(format!("fec={fec}"));
        }
        if let Some(bw) = self.bandwidth {
            parts.push(format!("bw={bw}"));
        }
        if let Some(tmode) = self.transmission_mode {
            parts.push(format!("tmode={tmode}"));
        }
        if let Some(gi) = self.guard_interval {
            parts.push(format!("gi={gi}"));
        }
        parts.join("&")
    }
}

/// A demultiplexed service, keyed by service_id within the current
/// transponder's TS context.
#[derive(Debug, Clone)]
pub struct Service {
    pub sid: u16,
    pub tsid: u16,
    pub onid: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub vpid: u16,
    pub apids: Vec<u16>,
    pub ttx_pid: u16,
    pub sub_pid: u16,
    pub provider_name: String,
    pub service_name: String,
    pub got_pmt: bool,
    pub got_sdt: bool,
    pub ca_mode: bool,
    pub eit_pf: bool,
    pub eit_sched: bool,
}

impl Service {
    pub fn new(sid: u16) -> Self {
        Service {
            sid,
            tsid: 0,
            onid: 0,
            pmt_pid: 0,
            pcr_pid: 0,
            vpid: 0,
            apids: Vec::new(),
            ttx_pid: 0,
            sub_pid: 0,
            provider_name: String::new(),
            service_name: format!("Service {sid}"),
            got_pmt: false,
            got_sdt: false,
            ca_mode: false,
            eit_pf: false,
            eit_sched: false,
        }
    }

    pub fn push_apid(&mut self, pid: u16) {
        if self.apids.len() < MAX_ANUM && !self.apids.contains(&pid) {
            self.apids.push(pid);
        }
    }
}

/// A decoded EIT event, identified by (onid, tsid, sid, eid).
#[derive(Debug, Clone)]
pub struct Event {
    pub onid: u16,
    pub tsid: u16,
    pub sid: u16,
    pub eid: u16,
    pub mjd: u16,
    pub start_h: u8,
    pub start_m: u8,
    pub start_s: u8,
    pub dur_h: u8,
    pub dur_m: u8,
    pub dur_s: u8,
    pub lang: [u8; 3],
    /// Raw octet string as delivered: first byte is length, remainder is the
    /// EN 300 468 coded string.
    pub short_name: Vec<u8>,
    pub short_text: Vec<u8>,
    pub tid: u8,
}

impl Event {
    pub fn decoded_name(&self) -> String {
        decode_length_prefixed(&self.short_name)
    }

    pub fn decoded_text(&self) -> String {
        decode_length_prefixed(&self.short_text)
    }

    pub fn lang_str(&self) -> String {
        String::from_utf8_lossy(&self.lang).into_owned()
    }
}

fn decode_length_prefixed(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let len = raw[0] as usize;
    let end = (1 + len).min(raw.len());
    crate::text::decode_dvb_string(&raw[1..end])
}
