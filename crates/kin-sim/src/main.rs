use clap::{value_parser, Arg, ArgAction, Command};
use kin_sim::{run_media, run_race, MediaConfig, RaceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Command::new("kin-sim")
        .version(kin_core::VERSION)
        .about("Profile editing simulator")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .subcommand(
            Command::new("race")
                .about("Race concurrent writers on one record")
                .arg(
                    Arg::new("writers")
                        .long("writers")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Number of concurrent writers"),
                )
                .arg(
                    Arg::new("rounds")
                        .long("rounds")
                        .default_value("25")
                        .value_parser(value_parser!(usize))
                        .help("Applied writes each writer must land"),
                )
                .arg(
                    Arg::new("start-version")
                        .long("start-version")
                        .default_value("1")
                        .value_parser(value_parser!(u64))
                        .help("Version of the record before the race"),
                )
                .arg(seed_arg()),
        )
        .subcommand(
            Command::new("media")
                .about("Commit media under injected failures")
                .arg(
                    Arg::new("count")
                        .long("count")
                        .default_value("50")
                        .value_parser(value_parser!(usize))
                        .help("Number of commits"),
                )
                .arg(
                    Arg::new("fail-link")
                        .long("fail-link")
                        .default_value("0.3")
                        .value_parser(value_parser!(f64))
                        .help("Probability that the link step is denied"),
                )
                .arg(
                    Arg::new("fail-delete")
                        .long("fail-delete")
                        .default_value("0.3")
                        .value_parser(value_parser!(f64))
                        .help("Probability that the compensating delete fails"),
                )
                .arg(seed_arg()),
        );

    let matches = cli.get_matches();
    let json = matches.get_flag("json");

    let (text, passed) = match matches.subcommand() {
        Some(("race", args)) => {
            let config = RaceConfig {
                seed: *args.get_one::<u64>("seed").unwrap_or(&42),
                writers: *args.get_one::<usize>("writers").unwrap_or(&4),
                rounds: *args.get_one::<usize>("rounds").unwrap_or(&25),
                start_version: *args.get_one::<u64>("start-version").unwrap_or(&1),
            };
            let report = run_race(config).await?;
            let text = if json {
                serde_json::to_string_pretty(&report)?
            } else {
                report.generate_text()
            };
            (text, report.passed())
        }
        Some(("media", args)) => {
            let config = MediaConfig {
                seed: *args.get_one::<u64>("seed").unwrap_or(&42),
                count: *args.get_one::<usize>("count").unwrap_or(&50),
                link_failure_rate: *args.get_one::<f64>("fail-link").unwrap_or(&0.3),
                delete_failure_rate: *args.get_one::<f64>("fail-delete").unwrap_or(&0.3),
            };
            let report = run_media(config).await?;
            let text = if json {
                serde_json::to_string_pretty(&report)?
            } else {
                report.generate_text()
            };
            (text, report.passed())
        }
        _ => unreachable!("subcommand is required"),
    };

    println!("{text}");
    std::process::exit(if passed { 0 } else { 1 });
}

fn seed_arg() -> Arg {
    Arg::new("seed")
        .long("seed")
        .default_value("42")
        .value_parser(value_parser!(u64))
        .help("Random seed for reproducibility")
}
