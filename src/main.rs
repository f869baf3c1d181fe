use anyhow::{Context, bail};
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use picksense::config::PickConfig;
use picksense::consensus::{ConsensusMatcher, ThresholdPolicy, required_votes};
use picksense::coords::parse_coordinates;
use picksense::detectors::DetectorCoordinateSet;
use picksense::engine::{ConsensusEngine, OutputSink};
use picksense::schema::{BatchReport, DetectorSummary, ImageOutcome, ImageReport};
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "picksense",
    about = "Consensus of particle coordinates picked by independent detectors",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match coordinate files from several detectors for one image
    Match(MatchArgs),
    /// Process every image the configured detectors have finished
    Run(RunArgs),
    /// Print the JSON schema of the batch report
    Schema,
}

#[derive(Args, Clone)]
struct MatchArgs {
    /// Coordinate file, optionally with its sampling rate: PATH[@RATE].
    /// The first detector is the reference frame.
    #[arg(short, long = "detector", value_name = "PATH[@RATE]", required = true)]
    detectors: Vec<String>,

    /// Maximum distance, in reference pixels, for points to match
    #[arg(short, long)]
    radius: Option<f64>,

    /// Votes required; <= 0 or >= detector count requires all detectors
    #[arg(short, long, allow_negative_numbers = true)]
    threshold: Option<i32>,

    /// Reject thresholds outside [0, detectors]
    #[arg(long)]
    strict: bool,

    /// Image name used in JSON output
    #[arg(long, default_value = "image")]
    image: String,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Job configuration (defaults to $PICKSENSE_CONFIG or the user config file)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for consensus coordinate files
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Output the batch report as JSON
    #[arg(long)]
    json: bool,
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    // Mirror clap's parsing by stopping at `--` which terminates flags.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Split `PATH[@RATE]`. A suffix that is not a number stays part of the path.
fn parse_detector_arg(arg: &str) -> (PathBuf, f64) {
    if let Some((path, rate)) = arg.rsplit_once('@')
        && let Ok(rate) = rate.parse::<f64>()
    {
        return (PathBuf::from(path), rate);
    }
    (PathBuf::from(arg), 1.0)
}

fn load_detector_file(arg: &str) -> anyhow::Result<DetectorCoordinateSet> {
    let (path, rate) = parse_detector_arg(arg);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let points = parse_coordinates(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("detector")
        .to_string();
    Ok(DetectorCoordinateSet::new(name, rate, points))
}

fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) => format!("{:.3}", r),
        None => "undefined".to_string(),
    }
}

fn render_match(report: &ImageReport, needed: usize, radius: f64, color: bool) -> String {
    let mut out = String::new();
    let heading = format!(
        "Consensus ({} detectors, radius {}, {} votes required):",
        report.detectors.len(),
        radius,
        needed
    );
    if color {
        out.push_str(&heading.bold().cyan().to_string());
    } else {
        out.push_str(&heading);
    }

    let points = report.consensus_points();
    if points.is_empty() {
        out.push_str("\n  none");
    }
    for point in points {
        let votes = format!("votes={}", point.votes);
        let votes = if color {
            votes.green().to_string()
        } else {
            votes
        };
        out.push_str(&format!(
            "\n  {} {}  {}",
            point.position.x, point.position.y, votes
        ));
    }
    out.push_str(&format!(
        "\nAgreement: {}",
        format_ratio(report.agreement_ratio())
    ));
    out
}

fn run_match(args: MatchArgs, color: ColorChoice) -> Result<(), i32> {
    let config = match PickConfig::resolve(None) {
        Ok((config, _)) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(2);
        }
    };
    let radius = args.radius.unwrap_or(config.matching.radius);
    let threshold = args.threshold.unwrap_or(config.matching.vote_threshold);
    let policy = if args.strict {
        ThresholdPolicy::Strict
    } else {
        config.matching.threshold_policy
    };

    let sets = match args
        .detectors
        .iter()
        .map(|d| load_detector_file(d))
        .collect::<anyhow::Result<Vec<_>>>()
    {
        Ok(sets) => sets,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Err(2);
        }
    };

    let matcher = ConsensusMatcher::new(radius, threshold).with_policy(policy);
    let result = match matcher.run(&sets) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(2);
        }
    };
    // Cannot fail after a successful run with the same inputs.
    let needed = required_votes(threshold, sets.len(), policy).unwrap_or(sets.len());

    let report = ImageReport {
        image: args.image,
        detectors: sets.iter().map(DetectorSummary::from).collect(),
        outcome: ImageOutcome::from(result),
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(_) => return Err(3),
        }
    } else {
        let want_color = stdout().is_terminal() && !matches!(color, ColorChoice::Never);
        println!("{}", render_match(&report, needed, radius, want_color));
    }
    Ok(())
}

fn build_engine(
    config: &PickConfig,
    base: Option<&Path>,
    out: Option<PathBuf>,
) -> anyhow::Result<ConsensusEngine> {
    if config.detectors.is_empty() {
        bail!("no detectors configured; add [[detectors]] entries to the job configuration");
    }

    let mut engine = ConsensusEngine::new(config.matcher());
    for detector in &config.detectors {
        engine = engine.register(detector.build(base));
    }

    let out_dir = out.or_else(|| {
        config
            .output
            .dir
            .as_ref()
            .map(|dir| match base {
                Some(base) if dir.is_relative() => base.join(dir),
                _ => dir.clone(),
            })
    });
    if let Some(dir) = out_dir {
        engine = engine.with_output(OutputSink {
            dir,
            write_empty: config.output.write_empty,
            with_votes: config.output.with_votes,
        });
    }
    Ok(engine)
}

fn render_image_line(report: &ImageReport, color: bool) -> String {
    match &report.outcome {
        ImageOutcome::Matched {
            points,
            agreement_ratio,
        } => {
            let status = if color {
                "ok".green().to_string()
            } else {
                "ok".to_string()
            };
            format!(
                "{} {}  {} points  agreement {}",
                status,
                report.image,
                points.len(),
                format_ratio(*agreement_ratio)
            )
        }
        ImageOutcome::Failed { error } => {
            let status = if color {
                "failed".red().to_string()
            } else {
                "failed".to_string()
            };
            format!("{} {}  {}", status, report.image, error)
        }
    }
}

fn run_batch(args: RunArgs, color: ColorChoice) -> Result<(), i32> {
    let (config, base) = match PickConfig::resolve(args.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(2);
        }
    };

    let mut engine = match build_engine(&config, base.as_deref(), args.out) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Err(2);
        }
    };

    let reports = match engine.process_ready() {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(2);
        }
    };

    let report = BatchReport::new(
        config.matching.radius,
        config.matching.vote_threshold,
        reports,
    );

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(_) => return Err(3),
        }
    } else {
        let want_color = stdout().is_terminal() && !matches!(color, ColorChoice::Never);
        for image in &report.images {
            let line = render_image_line(image, want_color);
            if image.is_failed() {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
        let summary = &report.summary;
        println!(
            "{} images, {} matched, {} failed, {} consensus points, mean agreement {}",
            summary.images,
            summary.matched,
            summary.failed,
            summary.consensus_points,
            format_ratio(summary.mean_agreement)
        );
    }

    if report.summary.failed > 0 { Err(1) } else { Ok(()) }
}

fn run_schema() -> Result<(), i32> {
    match serde_json::to_string_pretty(&BatchReport::json_schema()) {
        Ok(s) => {
            println!("{}", s);
            Ok(())
        }
        Err(_) => Err(3),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let color = detect_color_choice();
    if matches!(color, ColorChoice::Never) {
        colored::control::set_override(false);
    }
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let result = match cli.command {
        Some(Commands::Match(args)) => run_match(args, color),
        Some(Commands::Run(args)) => run_batch(args, color),
        Some(Commands::Schema) => run_schema(),
        None => Ok(()),
    };
    if let Err(code) = result {
        std::process::exit(code);
    }
}
