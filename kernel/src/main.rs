//! Dianti demo
//!
//! Boots the simulated machine, runs one of the built-in thread tests and
//! prints the halt report. A TOML file given with `--config` supplies the
//! machine configuration; command-line flags take precedence.
//!
//! # Tests
//!
//! 1. Two threads ping-pong with `yield`
//! 2. Fork until the thread id pool runs out
//! 3. Three threads of priorities 3, 2, 1 (run with `--policy priority`)
//! 4. Two busy threads sharing the processor by time slice

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use dianti_kernel::{Kernel, KernelConfig, Priority, SchedulingPolicy};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Priority,
    RoundRobin,
    Feedback,
}

impl From<PolicyArg> for SchedulingPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Priority => SchedulingPolicy::Priority,
            PolicyArg::RoundRobin => SchedulingPolicy::RoundRobin,
            PolicyArg::Feedback => SchedulingPolicy::MultilevelFeedback,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dianti", version, about = "Run a thread test on the simulated machine")]
struct Cli {
    /// Kernel configuration file (TOML). Flags below override it.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Scheduling policy [default: round-robin].
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Base quantum in ticks.
    #[arg(long)]
    quantum: Option<u64>,

    /// Size of the thread id pool.
    #[arg(long)]
    max_threads: Option<usize>,

    /// Thread test to run (1-4).
    #[arg(long = "test", default_value_t = 1)]
    test: u32,

    /// Log kernel activity at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Kernel diagnostics on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("dianti_kernel", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => match KernelConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => KernelConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config = config.with_policy(policy.into());
    }
    if let Some(quantum) = cli.quantum {
        config = config.with_quantum(quantum);
    }
    if let Some(max_threads) = cli.max_threads {
        config = config.with_max_threads(max_threads);
    }

    let kernel = match Kernel::new(config) {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let body: fn(&Arc<Kernel>) = match cli.test {
        1 => thread_test_1,
        2 => thread_test_2,
        3 => thread_test_3,
        4 => thread_test_4,
        n => {
            eprintln!("error: no thread test {n}");
            return ExitCode::FAILURE;
        }
    };

    let report = kernel.boot("main", body);
    let stats = report.statistics;
    println!("Machine halting: {:?}", report.reason);
    println!(
        "Ticks: total {}, system {}, user {}",
        stats.total_ticks, stats.system_ticks, stats.user_ticks
    );
    println!("Context switches: {}", stats.context_switches);
    println!(
        "Paging: TLB misses {}, page faults {}, evictions {}, disk reads {}, disk writes {}",
        stats.tlb_misses, stats.page_faults, stats.evictions, stats.disk_reads, stats.disk_writes
    );
    println!("System calls: {}", stats.syscalls);
    ExitCode::SUCCESS
}

/// Loop five times, yielding after each iteration.
fn simple_thread(kernel: &Arc<Kernel>, which: usize) {
    for num in 0..5 {
        println!("*** thread {which} looped {num} times");
        kernel.yield_now();
    }
}

/// Print identity a few times, yielding in between.
fn report_identity(kernel: &Arc<Kernel>, rounds: usize) {
    for _ in 0..rounds {
        let tid = kernel
            .current_tid()
            .map_or_else(|| "-".to_string(), |tid| tid.to_string());
        println!("name: {}, tid: {}", kernel.current_name(), tid);
        kernel.yield_now();
    }
}

fn thread_test_1(kernel: &Arc<Kernel>) {
    log::debug!("[KERNEL] entering thread test 1");
    if let Err(e) = kernel.fork("forked thread", Priority::DEFAULT, |k| simple_thread(k, 1)) {
        eprintln!("fork failed: {e}");
    }
    simple_thread(kernel, 0);
}

fn thread_test_2(kernel: &Arc<Kernel>) {
    log::debug!("[KERNEL] entering thread test 2");
    let mut created = 0;
    while kernel
        .fork("test thread", Priority::DEFAULT, |k| report_identity(k, 3))
        .is_ok()
    {
        created += 1;
    }
    println!("thread id pool exhausted after {created} threads");
    report_identity(kernel, 3);
}

fn thread_test_3(kernel: &Arc<Kernel>) {
    log::debug!("[KERNEL] entering thread test 3");
    for (name, priority) in [("thread 3", 3), ("thread 2", 2), ("thread 1", 1)] {
        if let Err(e) = kernel.fork(name, Priority::new(priority), |k| report_identity(k, 3)) {
            eprintln!("fork failed: {e}");
        }
    }
}

/// Burn 300 ticks without yielding.
fn busy_thread(kernel: &Arc<Kernel>) {
    for _ in 0..300 {
        kernel.tick();
    }
    println!("{} done after {} ticks", kernel.current_name(), 300);
}

fn thread_test_4(kernel: &Arc<Kernel>) {
    log::debug!("[KERNEL] entering thread test 4");
    for name in ["thread 1", "thread 2"] {
        if let Err(e) = kernel.fork(name, Priority::DEFAULT, busy_thread) {
            eprintln!("fork failed: {e}");
        }
    }
    busy_thread(kernel);
}
