//! FILENAME: app/summary-cli/src/main.rs
//! cube-summary - summarizes a serialized cube and prints the result as JSON.

mod logging;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cube::{BalancedCostFunction, CubeSource, DEFAULT_MIN_CONTRIBUTION_PERCENTAGE};
use summary_engine::{calculate_summary_from_source, SummaryDefinition};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cube-summary", version, about = "Explain the change of a metric across its dimensions")]
struct Cli {
    /// Cube JSON file (dimensions, rows, optional dimension_slices)
    #[arg(short, long, env = "CUBE_SUMMARY_INPUT")]
    input: PathBuf,

    /// Summary definition JSON file; flags override its fields
    #[arg(short, long, env = "CUBE_SUMMARY_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of summary rows, the root row included
    #[arg(long, env = "CUBE_SUMMARY_ANSWER_SIZE")]
    answer_size: Option<usize>,

    /// Number of dimensions to drill into (0 = all)
    #[arg(long, env = "CUBE_SUMMARY_LEVEL_COUNT")]
    level_count: Option<usize>,

    /// Hide rows that change against the overall direction
    #[arg(long, env = "CUBE_SUMMARY_ONE_SIDE_ERROR")]
    one_side_error: bool,

    /// Minimum share of the total size (percent) a slice needs to be scored
    #[arg(long, env = "CUBE_SUMMARY_MIN_CONTRIBUTION")]
    min_contribution: Option<f64>,

    /// Pretty-print the JSON output
    #[arg(long, env = "CUBE_SUMMARY_PRETTY")]
    pretty: bool,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let output = run(&cli)?;
    println!("{}", output);
    Ok(())
}

fn run(cli: &Cli) -> Result<String> {
    let source = load_cube_source(&cli.input)?;
    let base = match &cli.config {
        Some(path) => load_definition(path)?,
        None => SummaryDefinition::default(),
    };
    let definition = resolve_definition(cli, base);
    definition.validate()?;

    let cost_function =
        BalancedCostFunction::new(cli.min_contribution.unwrap_or(DEFAULT_MIN_CONTRIBUTION_PERCENTAGE));
    let result = calculate_summary_from_source(source, &cost_function, &definition)
        .with_context(|| format!("Failed to summarize {}", cli.input.display()))?;
    info!(
        "Summary with {} rows, {} gainers and {} losers",
        result.response_rows.len(),
        result.gainer.len(),
        result.loser.len()
    );

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    };
    json.context("Failed to serialize the summary")
}

fn load_cube_source(path: &Path) -> Result<CubeSource> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read cube file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse cube file {}", path.display()))
}

fn load_definition(path: &Path) -> Result<SummaryDefinition> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Applies the command-line overrides on top of the file definition.
fn resolve_definition(cli: &Cli, mut definition: SummaryDefinition) -> SummaryDefinition {
    if let Some(answer_size) = cli.answer_size {
        definition.answer_size = answer_size;
    }
    if let Some(level_count) = cli.level_count {
        definition.level_count = level_count;
    }
    if cli.one_side_error {
        definition.one_side_error = true;
    }
    definition
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE_JSON: &str = r#"{
        "dimensions": ["country"],
        "rows": [
            { "baseline_value": 1000, "current_value": 1200 },
            { "dimension_values": ["A"], "baseline_value": 200, "current_value": 500 },
            { "dimension_values": ["B"], "baseline_value": 200, "current_value": 400 },
            { "dimension_values": ["C"], "baseline_value": 600, "current_value": 300 }
        ]
    }"#;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from(["cube-summary", "--input", "cube.json", "--answer-size", "3", "--one-side-error"]).unwrap();
        let base = SummaryDefinition::new(7, false, 2);
        let definition = resolve_definition(&cli, base);
        assert_eq!(definition, SummaryDefinition::new(3, true, 2));
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::try_parse_from(["cube-summary", "-i", "cube.json"]).unwrap();
        assert!(!cli.pretty);
        assert_eq!(resolve_definition(&cli, SummaryDefinition::default()), SummaryDefinition::default());
    }

    #[test]
    fn test_run_prints_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(&dir, "cube.json", CUBE_JSON);
        let config = write_file(&dir, "config.json", r#"{"answer_size": 3}"#);
        let cli = Cli::try_parse_from([
            "cube-summary",
            "--input",
            input.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--min-contribution",
            "0",
        ])
        .unwrap();

        let output = run(&cli).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["global_ratio"], serde_json::json!(1.2));
        let rows = json["response_rows"].as_array().unwrap();
        assert!(!rows.is_empty() && rows.len() <= 3);
        assert_eq!(json["dimensions"], serde_json::json!(["country"]));
    }

    #[test]
    fn test_run_reports_invalid_cube() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(&dir, "cube.json", r#"{"dimensions": ["country"], "rows": []}"#);
        let cli = Cli::try_parse_from(["cube-summary", "--input", input.to_str().unwrap()]).unwrap();
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to summarize"));
        assert!(format!("{:#}", err).contains("no root row"));
    }

    #[test]
    fn test_run_reports_missing_input() {
        let cli = Cli::try_parse_from(["cube-summary", "--input", "/nonexistent/cube.json"]).unwrap();
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to read cube file"));
    }
}
