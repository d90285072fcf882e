//! `xrdfs`: one-shot subcommands or an interactive shell against an
//! XRootD cluster.

mod cli;

use std::io::{BufRead, Write};

use anyhow::Result;
use clap::Parser;

use cli::{exit_code, run_command, Cli};
use xrd_client::FileSystem;

#[tokio::main]
async fn main() -> Result<()> {
    xrd_client::logging::init();

    let args = Cli::parse();
    let fs = match FileSystem::new(&args.server) {
        Ok(fs) => fs,
        Err(status) => {
            eprintln!("xrdfs: {status}");
            std::process::exit(2);
        }
    };

    match args.command {
        Some(command) => {
            let cwd = initial_cwd();
            if let Err(status) = run_command(&fs, &cwd, command).await {
                eprintln!("xrdfs: {status}");
                std::process::exit(exit_code(&status));
            }
            Ok(())
        }
        None => shell(&fs).await,
    }
}

fn initial_cwd() -> String {
    xrd_client::PostMaster::global()
        .env()
        .get_string("CWD")
        .unwrap_or_else(|| "/".to_string())
}

const SHELL_HELP: &str = "\
Available commands:
  cd <path>                      change the working directory
  chmod <mode> <path>            change access mode (octal)
  ls [-l] [path]                 list a directory
  stat <path>                    print object statistics
  statvfs <path>                 print filesystem statistics
  locate [-n] [-r] [-d] <path>   print the locations of a path
  mv <source> <dest>             move or rename
  mkdir [-p] [-m<mode>] <path>   create a directory
  rm <path>                      remove a file
  rmdir <path>                   remove a directory
  query <code> <arg>             query server information
  truncate <path> <size>         truncate a file
  help                           this text
  exit                           leave the shell";

async fn shell(fs: &FileSystem) -> Result<()> {
    let mut cwd = initial_cwd();
    let mut last_failed = false;
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("[{}] {} > ", fs.url().host_id(), cwd);
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        match words[0] {
            "exit" | "quit" => break,
            "help" => {
                println!("{SHELL_HELP}");
                last_failed = false;
                continue;
            }
            "cd" => {
                if let Some(path) = words.get(1) {
                    cwd = cli::absolute(&cwd, path);
                    if !cwd.ends_with('/') {
                        cwd.push('/');
                    }
                    last_failed = false;
                } else {
                    eprintln!("cd: missing path");
                    last_failed = true;
                }
                continue;
            }
            _ => {}
        }

        // Reuse the clap grammar for everything else.
        let mut argv = vec!["xrdfs", "shell://"];
        argv.extend(words.iter().copied());
        match Cli::try_parse_from(argv) {
            Ok(Cli {
                command: Some(command),
                ..
            }) => match run_command(fs, &cwd, command).await {
                Ok(()) => last_failed = false,
                Err(status) => {
                    eprintln!("xrdfs: {status}");
                    last_failed = true;
                }
            },
            Ok(Cli { command: None, .. }) => {}
            Err(err) => {
                eprintln!("{err}");
                last_failed = true;
            }
        }
    }

    if last_failed {
        std::process::exit(1);
    }
    Ok(())
}
