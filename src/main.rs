//! Entry point for the convrate training/evaluation workflow.

use std::path::PathBuf;

use convrate::config::WorkflowConfig;
use convrate::{logging, workflow};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    config_path: PathBuf,
}

fn run() -> Result<(), String> {
    let options = match parse_args(std::env::args().skip(1).collect())? {
        Some(options) => options,
        None => {
            println!("{}", usage());
            return Ok(());
        }
    };
    let config = WorkflowConfig::load(&options.config_path).map_err(|err| err.to_string())?;
    if let Err(err) = logging::init(config.log_dir.as_deref()) {
        eprintln!("Logging disabled: {err}");
    }
    let report = workflow::run(&config).map_err(|err| err.to_string())?;
    println!("{report}");
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Option<CliOptions>, String> {
    let mut config_path: Option<PathBuf> = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("--config requires a path\n{}", usage()))?;
                config_path = Some(PathBuf::from(value));
            }
            other => return Err(format!("Unknown argument {other:?}\n{}", usage())),
        }
    }
    let config_path = config_path.ok_or_else(|| format!("--config is required\n{}", usage()))?;
    Ok(Some(CliOptions { config_path }))
}

fn usage() -> String {
    [
        "Usage: convrate --config <path>",
        "",
        "Trains a remote linear-learner regression model, deploys it behind a",
        "scoring endpoint, scores the held-out test snapshot, and reports mean",
        "absolute error (overall and over rows with truth > 0).",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_requires_config() {
        let err = parse_args(vec![]).unwrap_err();
        assert!(err.contains("--config is required"));
    }

    #[test]
    fn parse_args_reads_config_path() {
        let options = parse_args(vec!["--config".into(), "run.toml".into()])
            .unwrap()
            .unwrap();
        assert_eq!(options.config_path, PathBuf::from("run.toml"));
    }

    #[test]
    fn parse_args_rejects_unknown_flags() {
        let err = parse_args(vec!["--frobnicate".into()]).unwrap_err();
        assert!(err.contains("Unknown argument"));
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse_args(vec!["--help".into()]).unwrap().is_none());
    }
}
