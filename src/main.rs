//! Command-line entrypoint: parse options, install the cancellation signal
//! handler (the same `libc::signal` pattern this codebase's `serve` command
//! uses), then drive the transponder queue to completion.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use satipscan::cancel::CancellationToken;
use satipscan::cli::{self, Config};
use satipscan::model::TransponderSpec;
use satipscan::output::M3uWriter;
use satipscan::queue::TransponderQueue;
use satipscan::rtsp::TcpSatIpClient;
use satipscan::scan::{ScanDriver, ScanOutcome};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match cli::parse(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("satipscan: {e}");
            process::exit(1);
        }
    };

    env_logger::Builder::new().filter_level(cfg.log_level).init();

    let cancel = CancellationToken::new();
    SHUTDOWN_TOKEN.set(cancel.clone()).ok();
    let _ = unsafe { libc::signal(libc::SIGINT, signal_handler as *const () as libc::sighandler_t) };
    let _ = unsafe { libc::signal(libc::SIGTERM, signal_handler as *const () as libc::sighandler_t) };

    if let Err(e) = run(&cfg, cancel) {
        eprintln!("satipscan: {e}");
        process::exit(1);
    }
}

static SHUTDOWN_TOKEN: OnceLock<CancellationToken> = OnceLock::new();
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
    if let Some(token) = SHUTDOWN_TOKEN.get() {
        token.cancel();
    }
}

fn run(cfg: &Config, cancel: CancellationToken) -> Result<(), String> {
    let mut queue = TransponderQueue::new();
    if cfg.blind_sweep {
        queue.seed_blind_sweep(cfg.delivery_system);
    } else {
        let mut spec = TransponderSpec::new(cfg.delivery_system, cfg.freq_mhz);
        spec.source = cfg.source;
        spec.polarization = cfg.polarization;
        spec.symbol_rate = cfg.symbol_rate;
        spec.use_nit = cfg.use_nit;
        spec.scan_eit = cfg.scan_eit;
        spec.eit_sid_allow = cfg.eit_sid_allow.clone();
        queue.enqueue(spec);
    }

    let mut m3u = match (&cfg.m3u_create, &cfg.m3u_append) {
        (Some(path), _) => Some(M3uWriter::create(path)?),
        (None, Some(path)) => Some(M3uWriter::append(path)?),
        (None, None) => None,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    while let Some(mut spec) = queue.next() {
        if cancel.is_cancelled() {
            log::info!("shutdown requested, stopping before next transponder");
            queue.mark_done(spec);
            break;
        }
        spec.use_nit = cfg.use_nit;
        spec.scan_eit = cfg.scan_eit;
        spec.eit_sid_allow = cfg.eit_sid_allow.clone();

        let mut collaborator = match TcpSatIpClient::connect(&cfg.host, cfg.port) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("connecting to {}:{}: {e}", cfg.host, cfg.port);
                queue.mark_done(spec);
                continue;
            }
        };

        let mut driver = ScanDriver::new(&mut collaborator, cancel.clone());
        let outcome = driver.scan(&spec, &mut queue, &mut out, m3u.as_mut(), &cfg.host, cfg.port);
        match outcome {
            ScanOutcome::Completed(_) => {}
            ScanOutcome::ProtocolFault(e) => log::warn!("scan of {}: {e}", spec.tune_query()),
        }
        queue.mark_done(spec);
    }

    Ok(())
}
