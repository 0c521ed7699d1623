use crate::{
    bootstrap::ensure_server_initialized,
    config::Settings,
    error::{Error, Result},
    exec::{self, run_lenient},
    keys::{AwgCommand, ServerKeys},
    nat,
};
use log::{debug, info, log_enabled, Level};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Bootstraps, brings the interface up with `awg-quick`, and blocks until
/// SIGINT/SIGTERM, then tears it down.
pub fn start(settings: &Settings) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Signal(e.to_string()))?;

    info!("AmneziaWG server");
    let keygen = AwgCommand::new(&settings.awg_command);
    ensure_server_initialized(settings, &keygen)?;
    let layout = settings.layout();
    let conf_path = layout.server_conf();
    let keys = ServerKeys::load(&layout.server_keys())?;
    let obf = settings.obfuscation;
    info!("interface: {}", settings.interface);
    info!("endpoint: {}:{}", settings.server_ip, settings.listen_port);
    info!("VPN network: {}", settings.vpn_network);
    info!("public key: {}", keys.public_key().unwrap_or("N/A"));
    info!("obfuscation: Jc={}, Jmin={}, Jmax={}", obf.jc, obf.jmin, obf.jmax);

    nat::setup_forwarding();

    info!("starting interface {}", settings.interface);
    let conf = conf_path.display().to_string();
    exec::run(&["awg-quick".to_string(), "up".to_string(), conf.clone()], None)?;
    info!("AmneziaWG server started");
    match run_lenient(&["awg", "show"]) {
        (true, out) if !out.is_empty() => info!("interface status:\n{}", out),
        _ => info!("interface is up"),
    }

    let interval = Duration::from_secs(settings.stats_interval_secs.max(1));
    let mut last_stats = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(500));
        if last_stats.elapsed() >= interval {
            last_stats = Instant::now();
            if log_enabled!(Level::Debug) {
                let (_, out) = run_lenient(&["awg", "show", settings.interface.as_str()]);
                if !out.is_empty() {
                    debug!("interface stats:\n{}", out);
                }
            }
        }
    }

    let _ = run_lenient(&["awg-quick", "down", conf.as_str()]);
    info!("server stopped cleanly");
    Ok(())
}
