//! Textual inventory and M3U playlist output (§6). Program output never
//! goes through `log`; it's written directly to the destinations the
//! caller supplies, matching this codebase's separation between
//! diagnostics and user-facing results.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::mjd::bcd_to_u8;
use crate::model::{Event, Service, TransponderSpec};

pub fn write_tune(out: &mut impl Write, spec: &TransponderSpec) -> std::io::Result<()> {
    writeln!(out, "TUNE:{}", spec.tune_query())
}

pub fn write_service(out: &mut impl Write, svc: &Service) -> std::io::Result<()> {
    writeln!(out, "SERVICE")?;
    writeln!(out, "SID:{}", svc.sid)?;
    writeln!(out, "TSID:{}", svc.tsid)?;
    writeln!(out, "ONID:{}", svc.onid)?;
    writeln!(out, "NAME:{}", svc.service_name)?;
    writeln!(out, "PROVIDER:{}", svc.provider_name)?;
    writeln!(out, "PCR_PID:{}", svc.pcr_pid)?;
    writeln!(out, "VPID:{}", svc.vpid)?;
    let apids = svc.apids.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
    writeln!(out, "APIDS:{apids}")?;
    writeln!(out, "TTXPID:{}", svc.ttx_pid)?;
    writeln!(out, "SUBPID:{}", svc.sub_pid)?;
    writeln!(out, "CA:{}", svc.ca_mode)?;
    writeln!(out, "END")
}

pub fn write_event(out: &mut impl Write, event: &Event) -> std::io::Result<()> {
    writeln!(out, "EVENT")?;
    writeln!(out, "SID:{}", event.sid)?;
    writeln!(out, "EID:{}", event.eid)?;
    writeln!(out, "LANG:{}", event.lang_str())?;
    writeln!(out, "NAME:{}", event.decoded_name())?;
    writeln!(out, "TEXT:{}", event.decoded_text())?;
    writeln!(out, "MJD:{}", event.mjd)?;
    writeln!(
        out,
        "START:{:02}:{:02}:{:02}",
        bcd_to_u8(event.start_h),
        bcd_to_u8(event.start_m),
        bcd_to_u8(event.start_s)
    )?;
    writeln!(
        out,
        "DUR:{:02}:{:02}:{:02}",
        bcd_to_u8(event.dur_h),
        bcd_to_u8(event.dur_m),
        bcd_to_u8(event.dur_s)
    )?;
    writeln!(out, "END")
}

/// Models the source's create-vs-append playlist file handle as two
/// explicit constructors instead of a boolean flag (§10.4).
pub struct M3uWriter {
    file: std::fs::File,
}

impl M3uWriter {
    pub fn create(path: &Path) -> Result<Self, String> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| format!("creating {}: {e}", path.display()))?;
        writeln!(file, "#EXTM3U").map_err(|e| format!("writing {}: {e}", path.display()))?;
        Ok(M3uWriter { file })
    }

    pub fn append(path: &Path) -> Result<Self, String> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("opening {}: {e}", path.display()))?;
        Ok(M3uWriter { file })
    }

    pub fn write_entry(&mut self, name: &str, host: &str, port: u16, tune_query: &str, pids: &[u16]) -> Result<(), String> {
        let pid_csv = if pids.is_empty() {
            "none".to_string()
        } else {
            pids.iter().map(u16::to_string).collect::<Vec<_>>().join(",")
        };
        writeln!(self.file, "#EXTINF:-1,{name}").map_err(|e| format!("m3u write: {e}"))?;
        writeln!(self.file, "rtsp://{host}:{port}/?{tune_query}&pids={pid_csv}").map_err(|e| format!("m3u write: {e}"))
    }
}
