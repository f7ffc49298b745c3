//! `stackweave` command line
//!
//! Two subcommands share one set of inputs:
//! - `synth` renders the artifact as JSON or YAML, to stdout or `--out`
//! - `validate` synthesizes and prints a summary with the broad-grant audit
//!
//! Inputs are either the built-in chatbot stack (`--variant`, optionally
//! overlaid by a TOML `--config`) or a declarative `--document`.

use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use stackweave_chatbot::{synthesize_stack, ConfigOverlay, EnvSource, StackVariant};
use stackweave_core::document::GraphDocument;
use stackweave_core::{synthesize, Artifact, SynthesisError};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Rendering of the artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty JSON
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => anyhow::bail!("unknown output format `{other}`"),
        }
    }
}

fn input_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("variant")
            .long("variant")
            .default_value("ingestion")
            .value_parser(["ingestion", "standalone"])
            .help("Chatbot stack variant to declare"),
    )
    .arg(
        Arg::new("config")
            .long("config")
            .value_parser(value_parser!(PathBuf))
            .help("TOML file overlaid on the environment defaults"),
    )
    .arg(
        Arg::new("document")
            .long("document")
            .value_parser(value_parser!(PathBuf))
            .conflicts_with_all(["variant", "config"])
            .help("Declarative graph document (YAML or JSON) instead of the chatbot stack"),
    )
}

/// The `stackweave` command tree
#[must_use]
pub fn command() -> Command {
    Command::new("stackweave")
        .version(stackweave_core::VERSION)
        .about("Deterministic infrastructure synthesis")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            input_args(Command::new("synth").about("Synthesize the deployment artifact"))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("json")
                        .value_parser(["json", "yaml"])
                        .help("Artifact encoding"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the artifact here instead of stdout"),
                ),
        )
        .subcommand(input_args(
            Command::new("validate").about("Synthesize and report, without writing the artifact"),
        ))
}

/// Run the parsed command and return what should be printed
///
/// # Errors
/// Unreadable inputs, configuration failures and synthesis failures.
pub fn run(matches: &ArgMatches, env: &impl EnvSource) -> anyhow::Result<String> {
    match matches.subcommand() {
        Some(("synth", args)) => {
            let artifact = load_artifact(args, env)?;
            let format: OutputFormat = args.get_one::<String>("format").map_or("json", String::as_str).parse()?;
            let rendered = render(&artifact, format)?;
            match args.get_one::<PathBuf>("out") {
                Some(path) => {
                    fs::write(path, &rendered).with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), digest = %artifact.digest, "artifact written");
                    Ok(format!("wrote {}", path.display()))
                }
                None => Ok(rendered),
            }
        }
        Some(("validate", args)) => {
            let artifact = load_artifact(args, env)?;
            Ok(summarize(&artifact))
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand `{other}`"),
        None => anyhow::bail!("no subcommand given"),
    }
}

fn load_artifact(args: &ArgMatches, env: &impl EnvSource) -> anyhow::Result<Artifact> {
    if let Some(path) = args.get_one::<PathBuf>("document") {
        let graph = read_document(path)?
            .into_graph()
            .map_err(SynthesisError::from)
            .with_context(|| format!("declaring {}", path.display()))?;
        return Ok(synthesize(&graph)?);
    }

    let variant: StackVariant = args
        .get_one::<String>("variant")
        .map_or("ingestion", String::as_str)
        .parse()
        .map_err(anyhow::Error::msg)?;

    let overlay = args
        .get_one::<PathBuf>("config")
        .map(|path| {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Ok::<_, anyhow::Error>(ConfigOverlay::from_toml_str(&text)?)
        })
        .transpose()?;

    Ok(synthesize_stack(env, overlay.as_ref(), variant)?)
}

/// Parse a graph document, picking the decoder by extension
///
/// # Errors
/// Unreadable file or malformed document.
pub fn read_document(path: &Path) -> anyhow::Result<GraphDocument> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        GraphDocument::from_json(&text)?
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(document)
}

/// Encode the artifact
///
/// # Errors
/// Serialization failures.
pub fn render(artifact: &Artifact, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => artifact.to_json_pretty()?,
        OutputFormat::Yaml => serde_yaml::to_string(artifact)?,
    })
}

/// One-screen report of a synthesized artifact
#[must_use]
pub fn summarize(artifact: &Artifact) -> String {
    let report = &artifact.broad_grant_report;
    let mut out = format!(
        "ok: {} nodes, {} routes, {} outputs, {} broad grant(s)\ndigest: {}\n",
        artifact.ordered_nodes.len(),
        artifact.routes.len(),
        artifact.outputs.len(),
        report.len(),
        artifact.digest,
    );
    for grant in report.entries() {
        let _ = writeln!(
            out,
            "  {} -> {}: {}",
            grant.principal,
            grant.actions.join(", "),
            grant.justification
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_document_conflicts_with_variant() {
        let result = command().try_get_matches_from(["stackweave", "synth", "--document", "g.yaml", "--variant", "standalone"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_names() {
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("toml".parse::<OutputFormat>().is_err());
    }
}
