use std::path::Path;
use std::process;
use std::time::Duration;

use clap::{App, Arg, ArgMatches};
use log::error;

use synod::cluster::{self, Cluster};
use synod::paxos::NodeId;
use synod::{Config, Error, Result};

fn parse<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(s) => s.parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("--{}: invalid value '{}'", name, s)))
    }
}

fn configure(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default()
    };

    if let Some(n) = parse::<usize>(matches, "nodes")? {
        let proposers_were_default = config.proposers == Config::with_nodes(config.num_nodes).proposers;
        config.num_nodes = n;
        if proposers_were_default {
            config.proposers = config.node_ids().collect();
        }
    }
    if let Some(k) = parse::<u32>(matches, "max-attempts")? {
        config.max_attempts = k;
    }
    if let Some(ms) = parse::<u64>(matches, "timeout-ms")? {
        config.phase_timeout = Duration::from_millis(ms);
    }
    if let Some(ids) = matches.values_of("proposer") {
        config.proposers = ids
            .map(|s| s.parse::<u32>()
                .map(NodeId)
                .map_err(|_| Error::Config(format!("--proposer: invalid node id '{}'", s))))
            .collect::<Result<Vec<_>>>()?;
    }

    config.validate()?;
    Ok(config)
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = configure(matches)?;

    let mut cluster = Cluster::start(&config)?;
    let outcomes = cluster.wait();
    let reports = cluster.shutdown()?;

    for report in &reports {
        let outcome = match report.decision {
            Some(d) => format!("decided {} in round {} after {} attempt(s)", d.value, d.round, d.attempts),
            None if config.proposers.contains(&report.node) => {
                format!("no decision after {} attempt(s)", report.rounds_started)
            },
            None => "acceptor only".to_string()
        };
        println!("{}: {}; promised {:?}, accepted {:?}; data store {}",
            report.node, outcome, report.acceptor.promised, report.acceptor.accepted, report.log);
    }

    cluster::decisions(outcomes)?;
    Ok(())
}

fn main() {
    env_logger::init();

    let matches = App::new("synod")
        .version("0.1.0")
        .about("Runs one round of single-decree Paxos across a cluster of in-process nodes")
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .value_name("FILE")
            .help("TOML configuration file")
            .takes_value(true))
        .arg(Arg::with_name("nodes")
            .short("n")
            .long("nodes")
            .value_name("N")
            .help("Number of nodes in the cluster")
            .takes_value(true))
        .arg(Arg::with_name("max-attempts")
            .long("max-attempts")
            .value_name("K")
            .help("Rounds a proposer may start before giving up")
            .takes_value(true))
        .arg(Arg::with_name("timeout-ms")
            .long("timeout-ms")
            .value_name("MS")
            .help("Time to wait for responses in each phase")
            .takes_value(true))
        .arg(Arg::with_name("proposer")
            .short("p")
            .long("proposer")
            .value_name("ID")
            .help("Node that proposes a value (repeatable, defaults to every node)")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1))
        .get_matches();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        eprintln!("synod: {}", e);
        process::exit(1);
    }
}
