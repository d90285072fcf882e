use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use xrd_client::fs::dirlist_flags;
use xrd_client::{ErrorKind, FileSystem, XRootDStatus};
use xrd_proto::constants::{access_mode, locate_flags, mkdir_flags, stat_info_flags, QueryCode};
use xrd_proto::info::{LocationInfo, StatInfo};

#[derive(Parser)]
#[command(name = "xrdfs")]
#[command(about = "Interact with an XRootD cluster", long_about = None)]
pub struct Cli {
    /// Server URL, e.g. root://manager.example.org:1094
    pub server: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Change the working directory of the shell
    Cd { path: String },
    /// Change the access mode of a file or directory
    Chmod { mode: String, path: String },
    /// List a directory
    Ls {
        #[arg(short = 'l', long)]
        long: bool,
        path: Option<String>,
    },
    /// Print object statistics
    Stat { path: String },
    /// Print filesystem statistics
    Statvfs { path: String },
    /// Print the locations of a path
    Locate {
        /// Do not wait for pending locations
        #[arg(short = 'n')]
        nowait: bool,
        /// Bypass cached location data
        #[arg(short = 'r')]
        refresh: bool,
        /// Resolve managers down to the servers beneath them
        #[arg(short = 'd')]
        deep: bool,
        path: String,
    },
    /// Move or rename a path
    Mv { source: String, dest: String },
    /// Create a directory
    Mkdir {
        /// Create missing path components
        #[arg(short = 'p')]
        parents: bool,
        /// Access mode, octal
        #[arg(short = 'm', default_value = "755")]
        mode: String,
        path: String,
    },
    /// Remove a file
    Rm { path: String },
    /// Remove a directory
    Rmdir { path: String },
    /// Query server information
    Query { code: String, arg: String },
    /// Truncate a file
    Truncate { path: String, size: u64 },
}

/// Exit code for a failed operation: invalid input maps to 2, everything
/// else to 1.
pub fn exit_code(status: &XRootDStatus) -> i32 {
    match status.kind {
        ErrorKind::InvalidArgs | ErrorKind::UnknownCommand => 2,
        _ => 1,
    }
}

/// Parse an octal mode string into the protocol's access bits.
pub fn parse_mode(text: &str) -> Result<u16> {
    let value = u16::from_str_radix(text, 8)?;
    if value > 0o777 {
        bail!("mode out of range: {text}");
    }
    let table = [
        (0o400, access_mode::UR),
        (0o200, access_mode::UW),
        (0o100, access_mode::UX),
        (0o040, access_mode::GR),
        (0o020, access_mode::GW),
        (0o010, access_mode::GX),
        (0o004, access_mode::OR),
        (0o002, access_mode::OW),
        (0o001, access_mode::OX),
    ];
    Ok(table
        .iter()
        .filter(|(bit, _)| value & bit != 0)
        .fold(0, |acc, (_, flag)| acc | flag))
}

fn parse_query_code(text: &str) -> Result<QueryCode> {
    Ok(match text.to_ascii_lowercase().as_str() {
        "config" => QueryCode::Config,
        "checksum" => QueryCode::Checksum,
        "checksumcancel" => QueryCode::ChecksumCancel,
        "space" => QueryCode::Space,
        "stats" => QueryCode::Stats,
        "prepare" => QueryCode::Prepare,
        "xattr" => QueryCode::XAttr,
        "visa" => QueryCode::Visa,
        "opaque" => QueryCode::Opaque,
        "opaquefile" => QueryCode::OpaqueFile,
        other => bail!("unknown query code: {other}"),
    })
}

fn flags_text(info: &StatInfo) -> String {
    let mut out = String::new();
    let table = [
        (stat_info_flags::IS_DIR, 'd'),
        (stat_info_flags::IS_READABLE, 'r'),
        (stat_info_flags::IS_WRITABLE, 'w'),
        (stat_info_flags::X_BIT_SET, 'x'),
        (stat_info_flags::OFFLINE, 'o'),
    ];
    for (bit, c) in table {
        out.push(if info.test_flags(bit) { c } else { '-' });
    }
    out
}

fn print_locations(info: &LocationInfo) {
    for location in &info.locations {
        let kind = match (location.is_manager(), location.is_server()) {
            (true, _) => "manager",
            (_, true) => "server",
            _ => "unknown",
        };
        let access = match location.access {
            xrd_proto::info::AccessType::Read => "read",
            xrd_proto::info::AccessType::ReadWrite => "read/write",
        };
        println!("{:<40} {:<8} {}", location.address, kind, access);
    }
}

/// Resolve `path` against the shell working directory.
pub fn absolute(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if cwd.ends_with('/') {
        format!("{cwd}{path}")
    } else {
        format!("{cwd}/{path}")
    }
}

/// Run one command against `fs`, resolving relative paths against `cwd`.
pub async fn run_command(fs: &FileSystem, cwd: &str, command: Command) -> Result<(), XRootDStatus> {
    match command {
        Command::Cd { .. } => Ok(()),

        Command::Chmod { mode, path } => {
            let mode = parse_mode(&mode)
                .map_err(|e| XRootDStatus::error(ErrorKind::InvalidArgs).with_message(e.to_string()))?;
            fs.chmod(&absolute(cwd, &path), mode).await
        }

        Command::Ls { long, path } => {
            let path = absolute(cwd, path.as_deref().unwrap_or(""));
            let flags = if long { dirlist_flags::STAT } else { 0 };
            let listing = fs.dirlist(&path, flags).await?;
            for entry in &listing.list.entries {
                match (&entry.stat_info, long) {
                    (Some(info), true) => println!(
                        "{} {:>12} {:>12} {}",
                        flags_text(info),
                        info.size,
                        info.mod_time,
                        entry.name
                    ),
                    _ => println!("{}", entry.name),
                }
            }
            if listing.partial {
                eprintln!("warning: listing is incomplete, some entries may be missing");
                return Err(
                    XRootDStatus::error(ErrorKind::Partial).with_message("partial listing")
                );
            }
            Ok(())
        }

        Command::Stat { path } => {
            let info = fs.stat(&absolute(cwd, &path)).await?;
            println!("Path:  {}", absolute(cwd, &path));
            println!("Id:    {}", info.id);
            println!("Size:  {}", info.size);
            println!("Flags: {:#x} ({})", info.flags, flags_text(&info));
            println!("MTime: {}", info.mod_time);
            Ok(())
        }

        Command::Statvfs { path } => {
            let info = fs.stat_vfs(&absolute(cwd, &path)).await?;
            println!("Nodes providing r/w space:     {}", info.nodes_rw);
            println!("Largest free r/w chunk (MB):   {}", info.free_rw);
            println!("r/w utilization:               {}%", info.utilization_rw);
            println!("Nodes providing staging space: {}", info.nodes_staging);
            println!("Largest free staging chunk:    {}", info.free_staging);
            println!("Staging utilization:           {}%", info.utilization_staging);
            Ok(())
        }

        Command::Locate {
            nowait,
            refresh,
            deep,
            path,
        } => {
            let mut flags = 0u16;
            if nowait {
                flags |= locate_flags::NOWAIT;
            }
            if refresh {
                flags |= locate_flags::REFRESH;
            }
            let path = absolute(cwd, &path);
            let info = if deep {
                fs.deep_locate(&path, flags).await?
            } else {
                fs.locate(&path, flags).await?
            };
            print_locations(&info);
            Ok(())
        }

        Command::Mv { source, dest } => {
            fs.mv(&absolute(cwd, &source), &absolute(cwd, &dest)).await
        }

        Command::Mkdir {
            parents,
            mode,
            path,
        } => {
            let mode = parse_mode(&mode)
                .map_err(|e| XRootDStatus::error(ErrorKind::InvalidArgs).with_message(e.to_string()))?;
            let flags = if parents { mkdir_flags::MKPATH } else { 0 };
            fs.mkdir(&absolute(cwd, &path), flags, mode).await
        }

        Command::Rm { path } => fs.rm(&absolute(cwd, &path)).await,

        Command::Rmdir { path } => fs.rmdir(&absolute(cwd, &path)).await,

        Command::Query { code, arg } => {
            let code = parse_query_code(&code)
                .map_err(|e| XRootDStatus::error(ErrorKind::InvalidArgs).with_message(e.to_string()))?;
            let data = fs.query(code, arg.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&data));
            Ok(())
        }

        Command::Truncate { path, size } => fs.truncate(&absolute(cwd, &path), size).await,
    }
}
