use log::warn;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/**
 * @brief Append a timestamped line to a log file, creating the file if missing.
 * @param path Path to the log file.
 * @param line Text line to append.
 *
 * Failures are logged and otherwise ignored; the audit trail never fails
 * the operation it records.
 */
pub fn write_line(path: &Path, line: &str) {
    let stamp = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    let res = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{} {}", stamp, line));
    if let Err(e) = res {
        warn!("could not append to {}: {}", path.display(), e);
    }
}
