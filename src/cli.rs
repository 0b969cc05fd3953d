//! Hand-rolled CLI flag parsing (§10.3), matching the `while`-loop,
//! `match`-on-flag-string style this codebase's existing `main.rs` uses for
//! its `serve` subcommand rather than pulling in a parsing crate.

use std::path::PathBuf;

use log::LevelFilter;

use crate::model::{DeliverySystem, Polarization};

pub struct Config {
    pub host: String,
    pub port: u16,
    pub delivery_system: DeliverySystem,
    pub freq_mhz: u32,
    pub symbol_rate: Option<u32>,
    pub polarization: Option<Polarization>,
    pub source: u8,
    pub scan_eit: bool,
    pub eit_sid_allow: Vec<u16>,
    pub use_nit: bool,
    pub blind_sweep: bool,
    pub m3u_create: Option<PathBuf>,
    pub m3u_append: Option<PathBuf>,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 554,
            delivery_system: DeliverySystem::DvbC,
            freq_mhz: 0,
            symbol_rate: None,
            polarization: None,
            source: 1,
            scan_eit: false,
            eit_sid_allow: Vec::new(),
            use_nit: false,
            blind_sweep: false,
            m3u_create: None,
            m3u_append: None,
            log_level: LevelFilter::Info,
        }
    }
}

fn take_value(args: &[String], i: usize, flag: &str) -> Result<String, String> {
    args.get(i + 1).cloned().ok_or_else(|| format!("missing value for {flag}"))
}

pub fn parse(args: &[String]) -> Result<Config, String> {
    let mut cfg = Config::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-H" | "--host" => {
                cfg.host = take_value(args, i, &args[i])?;
                i += 2;
            }
            "-p" | "--port" => {
                let v = take_value(args, i, &args[i])?;
                cfg.port = v.parse().map_err(|_| format!("invalid port '{v}'"))?;
                i += 2;
            }
            "--dvbc" => { cfg.delivery_system = DeliverySystem::DvbC; i += 1; }
            "--dvbt" => { cfg.delivery_system = DeliverySystem::DvbT; i += 1; }
            "--dvbt2" => { cfg.delivery_system = DeliverySystem::DvbT2; i += 1; }
            "--dvbs" => { cfg.delivery_system = DeliverySystem::DvbS; i += 1; }
            "--dvbs2" => { cfg.delivery_system = DeliverySystem::DvbS2; i += 1; }
            "--dvbc2" => { cfg.delivery_system = DeliverySystem::DvbC2; i += 1; }
            "--freq" => {
                let v = take_value(args, i, &args[i])?;
                cfg.freq_mhz = v.parse().map_err(|_| format!("invalid frequency '{v}'"))?;
                i += 2;
            }
            "--sr" => {
                let v = take_value(args, i, &args[i])?;
                cfg.symbol_rate = Some(v.parse().map_err(|_| format!("invalid symbol rate '{v}'"))?);
                i += 2;
            }
            "--pol" => {
                let v = take_value(args, i, &args[i])?;
                cfg.polarization = Some(match v.as_str() {
                    "h" => Polarization::Horizontal,
                    "v" => Polarization::Vertical,
                    "l" => Polarization::Left,
                    "r" => Polarization::Right,
                    other => return Err(format!("invalid polarization '{other}'")),
                });
                i += 2;
            }
            "--src" => {
                let v = take_value(args, i, &args[i])?;
                cfg.source = v.parse().map_err(|_| format!("invalid source '{v}'"))?;
                i += 2;
            }
            "--eit" => { cfg.scan_eit = true; i += 1; }
            "--eit-sids" => {
                let v = take_value(args, i, &args[i])?;
                cfg.eit_sid_allow = v
                    .split(',')
                    .map(|s| s.parse::<u16>().map_err(|_| format!("invalid sid '{s}'")))
                    .collect::<Result<Vec<_>, _>>()?;
                cfg.scan_eit = true;
                i += 2;
            }
            "-n" | "--use-nit" => { cfg.use_nit = true; i += 1; }
            "--blind-sweep" => { cfg.blind_sweep = true; i += 1; }
            "-c" => {
                cfg.m3u_create = Some(PathBuf::from(take_value(args, i, &args[i])?));
                i += 2;
            }
            "-a" => {
                cfg.m3u_append = Some(PathBuf::from(take_value(args, i, &args[i])?));
                i += 2;
            }
            "-v" | "--verbose" => { cfg.log_level = LevelFilter::Debug; i += 1; }
            "-q" | "--quiet" => { cfg.log_level = LevelFilter::Warn; i += 1; }
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    Ok(cfg)
}
