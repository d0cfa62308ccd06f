use clap::{Arg, ArgMatches, Command};
use ibg_advisor::logging::{init_logging, parse_level};
use ibg_advisor::pipeline::StatementOutcome;
use ibg_advisor::{build, AdvisorConfig, InteractionBank, Workload, WorkloadRunner};
use std::time::Instant;

/// Index interaction advisor CLI
///
/// Reads a JSON workload of plan tables and reports:
/// - per-statement graph sizes and oracle usage
/// - pairwise degrees of interaction
/// - the stable partition of the candidate indexes
fn main() {
    let matches = create_cli().get_matches();

    if let Err(e) = run_command(matches) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("ibg-cli")
        .about("Index Benefit Graph interaction advisor")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("log-level")
            .help("Log level")
            .long("log-level")
            .global(true)
            .value_parser(["trace", "debug", "info", "warn", "error"])
            .default_value("warn"))
        .arg(Arg::new("json-logs")
            .help("Emit logs as JSON")
            .long("json-logs")
            .global(true)
            .action(clap::ArgAction::SetTrue))
        .subcommand(
            Command::new("analyze")
                .about("Analyze index interactions across a workload")
                .arg(Arg::new("workload")
                    .help("Workload JSON file")
                    .required(true)
                    .index(1))
                .arg(Arg::new("config")
                    .help("Advisor configuration JSON file")
                    .long("config"))
                .arg(Arg::new("threshold")
                    .help("Interaction threshold for the stable partition")
                    .long("threshold")
                    .value_parser(clap::value_parser!(f64)))
                .arg(Arg::new("sequential")
                    .help("Finish construction before analysis")
                    .long("sequential")
                    .action(clap::ArgAction::SetTrue))
                .arg(Arg::new("no-covering")
                    .help("Call the oracle for every node")
                    .long("no-covering")
                    .action(clap::ArgAction::SetTrue))
                .arg(Arg::new("format")
                    .help("Output format")
                    .long("format")
                    .value_parser(["text", "json"])
                    .default_value("text"))
        )
        .subcommand(
            Command::new("graph")
                .about("Build one statement's graph and print it as JSON")
                .arg(Arg::new("workload")
                    .help("Workload JSON file")
                    .required(true)
                    .index(1))
                .arg(Arg::new("statement")
                    .help("Statement position in the workload")
                    .long("statement")
                    .value_parser(clap::value_parser!(usize))
                    .default_value("0"))
                .arg(Arg::new("no-covering")
                    .help("Call the oracle for every node")
                    .long("no-covering")
                    .action(clap::ArgAction::SetTrue))
        )
}

fn run_command(matches: ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let level = matches
        .get_one::<String>("log-level")
        .and_then(|name| parse_level(name))
        .unwrap_or(tracing::Level::WARN);
    init_logging(level, matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("analyze", sub_matches)) => cmd_analyze(sub_matches),
        Some(("graph", sub_matches)) => cmd_graph(sub_matches),
        _ => unreachable!(),
    }
}

fn cmd_analyze(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let workload = Workload::from_file(required(matches, "workload")?)?;
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => AdvisorConfig::from_file(path)?,
        None => AdvisorConfig::default(),
    };
    if let Some(threshold) = matches.get_one::<f64>("threshold") {
        config.interaction_threshold = *threshold;
    }
    if matches.get_flag("sequential") {
        config.concurrent_analysis = false;
    }
    if matches.get_flag("no-covering") {
        config.use_covering_nodes = false;
    }
    config.validate()?;

    let bank = InteractionBank::new(workload.all_candidates());
    let threshold = config.interaction_threshold;
    let runner = WorkloadRunner::new(config);
    let report = runner.run_workload(&workload, &bank)?;
    let partition = bank.stable_partition(threshold);

    if matches.get_one::<String>("format").map(String::as_str) == Some("json") {
        let statements: Vec<serde_json::Value> = report
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                StatementOutcome::Completed(done) => serde_json::json!({
                    "statement": workload.statements[done.statement].name,
                    "status": "completed",
                    "nodes": done.construction.node_count,
                    "oracle_calls": done.construction.oracle_calls,
                    "covered_nodes": done.construction.covered_nodes,
                    "costs_raised": done.repair.as_ref().map(|r| r.costs_raised),
                }),
                StatementOutcome::Failed { statement, error } => serde_json::json!({
                    "statement": workload.statements[*statement].name,
                    "status": "failed",
                    "error": error.to_string(),
                    "code": error.error_code(),
                }),
            })
            .collect();
        let interactions: Vec<serde_json::Value> = bank
            .pairs()
            .into_iter()
            .map(|(pair, level)| serde_json::json!({ "a": pair.lo(), "b": pair.hi(), "doi": level }))
            .collect();
        let output = serde_json::json!({
            "statements": statements,
            "interactions": interactions,
            "partition": partition,
            "elapsed_ms": report.elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Statements:");
    for outcome in &report.outcomes {
        let name = &workload.statements[outcome.statement()].name;
        match outcome {
            StatementOutcome::Completed(done) => {
                println!(
                    "  {:<16} nodes={:<6} oracle_calls={:<6} covered={:<6} raised={}",
                    name,
                    done.construction.node_count,
                    done.construction.oracle_calls,
                    done.construction.covered_nodes,
                    done.repair.as_ref().map_or(0, |r| r.costs_raised),
                );
            }
            StatementOutcome::Failed { error, .. } => {
                println!("  {:<16} FAILED: {}", name, error);
            }
        }
    }

    println!("\nInteractions:");
    let pairs = bank.pairs();
    if pairs.is_empty() {
        println!("  (none)");
    }
    for (pair, level) in pairs {
        println!("  {:>4} {:>4}  {:.6}", pair.lo(), pair.hi(), level);
    }

    println!("\nStable partition (threshold {}):", threshold);
    for group in &partition {
        println!("  {}", group);
    }
    println!("\nCompleted in {:.2?}", report.elapsed);
    Ok(())
}

fn cmd_graph(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let workload = Workload::from_file(required(matches, "workload")?)?;
    let statement = matches.get_one::<usize>("statement").copied().unwrap_or(0);
    if statement >= workload.statements.len() {
        return Err(format!(
            "statement {} out of range (workload has {})",
            statement,
            workload.statements.len()
        )
        .into());
    }

    let start = Instant::now();
    let graph = build(
        statement,
        workload.candidates_for(statement),
        workload.statements[statement].oracle.clone(),
        !matches.get_flag("no-covering"),
    )?;
    tracing::info!(
        statement,
        nodes = graph.node_count(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "graph built"
    );
    println!("{}", serde_json::to_string_pretty(&graph.snapshot()?)?);
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String, Box<dyn std::error::Error>> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing argument: {}", name).into())
}
