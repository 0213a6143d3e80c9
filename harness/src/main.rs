//! racebench CLI

use clap::{Arg, ArgAction, Command};
use racebench::{crate_version, plan, run, stats};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Entrypoint for the racebench CLI
fn main() -> ExitCode {
    // Define application
    let matches = Command::new("racebench")
        .version(crate_version())
        .about("Run, plan, and inspect deterministic concurrency-bug benchmarks.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new(run::CMD)
                .about("Invoke every bug of a manifest against a fuzz input, persist statistics, and abort if any bug fired.")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .required(true)
                        .help("Path to JSON bug manifest")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value(run::DEFAULT_THREADS)
                        .help("Threads per part per bug (must be >= 1)")
                        .value_parser(
                            clap::builder::RangedU64ValueParser::<usize>::new().range(1..),
                        ),
                )
                .arg(
                    Arg::new("rounds")
                        .long("rounds")
                        .default_value(run::DEFAULT_ROUNDS)
                        .help("Invocations per thread")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("input")
                        .help("Path to fuzz input")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new(stats::CMD)
                .about("Print the counters accumulated in a statistics file.")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .help("Path to statistics file")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new(plan::CMD)
                .about("Gate a bug on bytes of a known-good input and add it to a manifest.")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .help("Path to input that must trigger the bug")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("id")
                        .long("id")
                        .required(true)
                        .help("Bug id")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("field")
                        .long("field")
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Input field as <offset>:<width> (repeatable)")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    Arg::new("pattern")
                        .long("pattern")
                        .help("Pattern name (random if not provided)")
                        .value_parser(racebench_patterns::NAMES),
                )
                .arg(
                    Arg::new("interleave")
                        .long("interleave")
                        .default_value(plan::DEFAULT_INTERLEAVE)
                        .help("Number of interleave slots")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("0")
                        .help("Seed for preferred parts, pads, and pattern choice")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .help("Manifest to add the bug to (created if absent). If not provided, the manifest is printed.")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Parse subcommands
    match matches.subcommand() {
        Some((run::CMD, matches)) => {
            let manifest = matches.get_one::<PathBuf>("manifest").unwrap();
            let threads = *matches.get_one::<usize>("threads").unwrap();
            let rounds = *matches.get_one::<usize>("rounds").unwrap();
            let input = matches.get_one::<PathBuf>("input");
            if let Err(e) = run::run(manifest, input.map(PathBuf::as_path), threads, rounds) {
                error!(error=?e, "failed to run benchmark");
            } else {
                return ExitCode::SUCCESS;
            }
        }
        Some((stats::CMD, matches)) => {
            let file = matches.get_one::<PathBuf>("file").unwrap();
            match stats::load(file) {
                Ok(record) => {
                    print!("{}", stats::render(&record));
                    return ExitCode::SUCCESS;
                }
                Err(e) => error!(error=?e, "failed to read statistics"),
            }
        }
        Some((plan::CMD, matches)) => {
            let input = matches.get_one::<PathBuf>("input").unwrap();
            let manifest = matches.get_one::<PathBuf>("manifest");
            let fields = matches
                .get_many::<String>("field")
                .unwrap()
                .map(|raw| plan::parse_field(raw))
                .collect::<Result<Vec<_>, _>>();
            let request = fields.map(|fields| plan::Request {
                id: *matches.get_one::<usize>("id").unwrap(),
                pattern: matches.get_one::<String>("pattern").cloned(),
                fields,
                interleave: *matches.get_one::<usize>("interleave").unwrap(),
                seed: *matches.get_one::<u64>("seed").unwrap(),
            });
            let manifest_path = manifest.map(PathBuf::as_path);
            match request.and_then(|request| plan::plan_file(input, manifest_path, &request)) {
                Ok(json) => {
                    if manifest.is_none() {
                        println!("{json}");
                    }
                    return ExitCode::SUCCESS;
                }
                Err(e) => error!(error=?e, "failed to plan bug"),
            }
        }
        Some((cmd, _)) => {
            error!(cmd, "invalid subcommand");
        }
        None => {
            error!("no subcommand provided");
        }
    }
    ExitCode::FAILURE
}
