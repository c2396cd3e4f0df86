use clap::{App, Arg, SubCommand};
use num_enum::TryFromPrimitive;
use std::convert::TryFrom;
use tracing_subscriber::EnvFilter;

mod command_e2e;
mod command_inspect;
mod command_keygen;
mod config;

use command_e2e::command_e2e;
use command_inspect::command_inspect;
use command_keygen::command_keygen;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Verbosity {
    fn filter(self) -> &'static str {
        match self {
            Verbosity::Silent => "off",
            Verbosity::Error => "error",
            Verbosity::Warn => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        }
    }
}

fn main() {
    let matches = App::new("CipherTally CLI")
        .version("0.1")
        .author("Patrick Hayes <patrick.d.hayes@gmail.com>")
        .about("Runs and inspects homomorphic batch tallies")
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Disable logging"),
        )
        .subcommand(
            SubCommand::with_name("keygen").about("Generate a signing keypair and its principal"),
        )
        .subcommand(
            SubCommand::with_name("e2e")
                .about("Run a full tally against a local decryption oracle")
                .arg(
                    Arg::with_name("VOTES")
                        .index(1)
                        .required(true)
                        .help("Comma-separated votes, for example yes,no,yes"),
                )
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .help("Seed for every key and ballot, for reproducible tallies (request ids stay random)"),
                )
                .arg(
                    Arg::with_name("state-out")
                        .long("state-out")
                        .takes_value(true)
                        .help("Write the final ledger state here (JSON if the name ends in .json, otherwise CBOR)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("Print the batches and results of a saved ledger state")
                .arg(
                    Arg::with_name("INPUT")
                        .index(1)
                        .required(true)
                        .help("Ledger state file in JSON or CBOR format"),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the whole state as JSON"),
                ),
        )
        .get_matches();

    let level = if matches.is_present("quiet") {
        0
    } else {
        std::cmp::min(2 + matches.occurrences_of("v"), 4) as u8
    };
    let verbosity = Verbosity::try_from(level).unwrap_or(Verbosity::Debug);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen(matches),
        ("e2e", Some(matches)) => config::Config::from_env()
            .and_then(|config| command_e2e(matches, &config)),
        ("inspect", Some(matches)) => command_inspect(matches),
        _ => {
            eprintln!("{}", matches.usage());
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("ciphertally: {:#}", e);
        std::process::exit(1);
    }
}

pub fn expand(path: &str) -> String {
    match shellexpand::full(path) {
        Ok(expanded) => expanded.into_owned(),
        Err(_) => path.to_owned(),
    }
}
