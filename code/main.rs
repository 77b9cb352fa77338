use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, atomic::{AtomicBool, Ordering}};
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use clap::Parser;
use fault_injector::report::{SessionReport, Snapshot};
use fault_injector::{usage, AttachShim, FaultDispatcher, FaultTelemetry, LocalShim, TargetProcess};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Inject CPU or memory exhaustion faults", long_about = None)]
struct Cli {
    /// Target process (defaults to this process)
    #[arg(long)]
    pid: Option<u32>,

    /// Seconds between status lines
    #[arg(long, default_value_t = 5)]
    status_interval: u64,

    /// Keep reading fault commands from stdin, one per line
    #[arg(long, default_value_t = false)]
    follow: bool,

    /// Write a JSON session report here on exit
    #[arg(long)]
    report_file: Option<PathBuf>,

    /// Fault command, e.g. `cpu -d 30 -t 4`, `mem -m 64 -k` or `stop`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let args = cli.command.join(" ");
    let target = cli.pid.map(TargetProcess::new).unwrap_or_else(TargetProcess::current);
    target.probe().with_context(|| format!("cannot attach to process {}", target.pid()))?;

    println!("=== FAULT INJECTOR ===");
    println!("[CONFIG] Target pid: {}", target.pid());
    println!("[CONFIG] Command: {}", if args.is_empty() { "<none>" } else { &args });
    println!("[CONFIG] Status interval: {} seconds", cli.status_interval);
    println!("[CONFIG] Follow stdin: {}", cli.follow);
    if let Some(path) = &cli.report_file {
        println!("[CONFIG] Report file: {}", path.display());
    }
    println!();

    let shim = LocalShim::new(FaultDispatcher::new());
    let telemetry = shim.dispatcher().telemetry();
    let commands = Arc::new(Mutex::new(Vec::new()));

    if !args.is_empty() {
        let outcome = shim.attach(&target, &args).context("fault injection failed")?;
        println!("[INJECT] {}", outcome);
        commands.lock().unwrap_or_else(PoisonError::into_inner).push(args.clone());
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        let shim = shim.clone();
        let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                println!("\n[!] Received signal {}, stopping all faults...", sig);
                if let Err(e) = shim.attach(&target, "stop") {
                    eprintln!("[ERROR] Failed to stop faults: {}", e);
                }
                r.store(false, Ordering::SeqCst);
            }
        });
    }

    let reading_stdin = Arc::new(AtomicBool::new(cli.follow));
    if cli.follow {
        let reading = reading_stdin.clone();
        let shim = shim.clone();
        let commands = commands.clone();
        thread::spawn(move || {
            follow_stdin(&shim, &target, &commands);
            reading.store(false, Ordering::SeqCst);
        });
    }

    let session_over = || {
        !running.load(Ordering::SeqCst)
            || (telemetry.active_workers() == 0 && !reading_stdin.load(Ordering::SeqCst))
    };

    let interval = Duration::from_secs(cli.status_interval.max(1));
    let mut snapshots = Vec::new();
    let mut iteration = 0;
    loop {
        iteration += 1;
        snapshots.push(take_snapshot(iteration, &telemetry));

        if session_over() {
            break;
        }
        let next = Instant::now() + interval;
        while Instant::now() < next && !session_over() {
            thread::sleep(POLL_SLICE);
        }
    }

    // Workers still running at this point belong to a session that is ending.
    if let Err(e) = shim.attach(&target, "stop") {
        eprintln!("[ERROR] Failed to stop faults: {}", e);
    }

    let commands = commands.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let report = SessionReport::new(commands, snapshots);
    report.print_summary();
    if let Some(path) = &cli.report_file {
        let saved = report
            .save_to_file(path)
            .with_context(|| format!("failed to write session report to {}", path.display()))?;
        println!("\nSession report saved: {}", saved.display());
    }

    println!("\nShutdown complete.");
    Ok(())
}

fn take_snapshot(iteration: usize, telemetry: &FaultTelemetry) -> Snapshot {
    let usage = match usage::sample() {
        Ok(u) => Some(u),
        Err(e) => {
            warn!(error = %e, "failed to sample process usage");
            None
        }
    };
    let snapshot = Snapshot::new(iteration, telemetry.snapshot(), usage);
    snapshot.print_compact();
    snapshot
}

fn follow_stdin(shim: &LocalShim, target: &TargetProcess, commands: &Mutex<Vec<String>>) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[ERROR] Failed to read command: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match shim.attach(target, line) {
            Ok(outcome) => {
                println!("[INJECT] {}", outcome);
                commands.lock().unwrap_or_else(PoisonError::into_inner).push(line.to_string());
            }
            Err(e) => eprintln!("[ERROR] {}", e),
        }
    }
}
