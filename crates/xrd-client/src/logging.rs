//! Log subscriber setup driven by the `XRD_LOG*` environment variables.
//!
//! `XRD_LOGLEVEL` picks the verbosity (`Error`, `Warning`, `Info`,
//! `Debug`, `Dump`), `XRD_LOGMASK` narrows output to pipe-separated topics
//! (`AppMsg`, `UtilityMsg`, `FileMsg`, `All`, `None`), and `XRD_LOGFILE`
//! appends to a file created with mode 0600 instead of stderr.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

use tracing_subscriber::EnvFilter;

fn level_from_env() -> &'static str {
    match std::env::var("XRD_LOGLEVEL").as_deref() {
        Ok("Error") => "error",
        Ok("Warning") => "warn",
        Ok("Info") => "info",
        Ok("Debug") => "debug",
        Ok("Dump") => "trace",
        _ => "warn",
    }
}

fn mask_filter(level: &str) -> EnvFilter {
    let Ok(mask) = std::env::var("XRD_LOGMASK") else {
        return EnvFilter::new(level);
    };

    let mut directives: Vec<String> = vec!["off".to_string()];
    for topic in mask.split('|').map(str::trim) {
        match topic {
            "All" => return EnvFilter::new(level),
            "None" => return EnvFilter::new("off"),
            "AppMsg" => directives.push(format!("xrd::app={level}")),
            "UtilityMsg" => directives.push(format!("xrd::util={level}")),
            "FileMsg" => directives.push(format!("xrd::file={level}")),
            other => {
                eprintln!("xrd: unknown log topic {other:?} in XRD_LOGMASK");
            }
        }
    }
    EnvFilter::new(directives.join(","))
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init() {
    let level = level_from_env();
    let filter = mask_filter(level);

    match std::env::var("XRD_LOGFILE") {
        Ok(path) if !path.is_empty() => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .mode(0o600)
                .open(&path);
            match file {
                Ok(file) => {
                    let _ = tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(std::sync::Arc::new(file))
                        .with_ansi(false)
                        .try_init();
                }
                Err(err) => {
                    eprintln!("xrd: cannot open log file {path}: {err}");
                    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
                }
            }
        }
        _ => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
