//! `rewind` - inspect recording container files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rewind_core::event::{EventKind, SourceEvent};
use rewind_session::storage;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect rewind recording files")]
struct Cli {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show container header and per-kind event counts
    Info {
        file: PathBuf,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// List events (type and time) without decoding payloads
    Events { file: PathBuf },
    /// Decode and print every event
    Dump { file: PathBuf },
    /// List recording files in a directory
    List {
        dir: PathBuf,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    match cli.command {
        Command::Info { file, json } => info(&file, json),
        Command::Events { file } => events(&file),
        Command::Dump { file } => dump(&file),
        Command::List { dir, json } => list(&dir, json),
    }
}

fn info(file: &PathBuf, json: bool) -> Result<()> {
    if json {
        let info = storage::recording_info(file)
            .with_context(|| format!("Cannot read {}", file.display()))?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    let recording = storage::read_recording(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    println!("id:       {}", recording.id);
    println!("mode:     {}", recording.mode);
    println!("duration: {}ms", recording.duration);
    println!("events:   {}", recording.events.len());

    let mut counts: Vec<(EventKind, usize)> = Vec::new();
    for view in recording.views() {
        let kind = view.and_then(|v| v.kind())?;
        match counts.iter().position(|(k, _)| *k == kind) {
            Some(i) => counts[i].1 += 1,
            None => counts.push((kind, 1)),
        }
    }
    for (kind, n) in counts {
        println!("  {:<16} {}", kind.to_string(), n);
    }
    Ok(())
}

fn events(file: &PathBuf) -> Result<()> {
    let recording = storage::read_recording(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    println!("{:>6}  {:>8}  {:<16} {:>8}", "index", "time", "type", "bytes");
    for (i, view) in recording.views().enumerate() {
        let view = view?;
        println!(
            "{:>6}  {:>8}  {:<16} {:>8}",
            i,
            view.time(),
            view.kind().map(|k| k.to_string()).unwrap_or_else(|_| format!("?{}", view.kind_tag())),
            recording.events[i].len()
        );
    }
    Ok(())
}

fn dump(file: &PathBuf) -> Result<()> {
    let recording = storage::read_recording(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    for (i, buf) in recording.events.iter().enumerate() {
        let event = SourceEvent::decode(buf)
            .with_context(|| format!("Event {} failed to decode", i))?;
        println!("[{}] @{}ms {:#?}", i, event.time, event.payload);
    }
    Ok(())
}

fn list(dir: &PathBuf, json: bool) -> Result<()> {
    let recordings = storage::list_recordings(dir);
    if json {
        println!("{}", serde_json::to_string_pretty(&recordings)?);
        return Ok(());
    }
    if recordings.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }
    println!(
        "{:<24} {:<16} {:<9} {:>10} {:>8} {:>10}",
        "file", "id", "mode", "duration", "events", "size"
    );
    for info in recordings {
        println!(
            "{:<24} {:<16} {:<9} {:>8}ms {:>8} {:>10}",
            info.filename, info.id, info.mode, info.duration_ms, info.event_count, info.size
        );
    }
    Ok(())
}
