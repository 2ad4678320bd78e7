use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use strata_core::{EnvironmentDiff, LoggingConfig, PackageInstall, StrataConfig};
use strata_graph::{
    diff_graph_snapshots, validate_graph_snapshot, GraphDiffResult, GraphSnapshot,
    GraphValidationError,
};
use strata_promotion::diff_environments;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("strata")
        .version(strata_core::VERSION)
        .about("Strata schema graph tooling")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a strata.toml configuration file"),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Pretty-print JSON output"),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a graph snapshot")
                .arg(path_arg("snapshot", "Graph snapshot JSON file")),
        )
        .subcommand(
            Command::new("diff")
                .about("Diff two graph snapshots")
                .arg(path_arg("before", "Snapshot before the change"))
                .arg(path_arg("after", "Snapshot after the change")),
        )
        .subcommand(
            Command::new("drift")
                .about("Compare the installed packages of two environments")
                .arg(path_arg("source", "Source environment installs (JSON array)"))
                .arg(path_arg("target", "Target environment installs (JSON array)")),
        )
}

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing --{name}"))
}

fn validate(snapshot: &Path) -> Result<Vec<GraphValidationError>> {
    let snapshot: GraphSnapshot = read_json(snapshot)?;
    tracing::debug!(
        tenant = %snapshot.tenant_id,
        record_types = snapshot.nodes.len(),
        "validating snapshot"
    );
    Ok(validate_graph_snapshot(&snapshot))
}

fn diff(before: &Path, after: &Path) -> Result<GraphDiffResult> {
    let before: GraphSnapshot = read_json(before)?;
    let after: GraphSnapshot = read_json(after)?;
    Ok(diff_graph_snapshots(&before, &after))
}

fn drift(source: &Path, target: &Path) -> Result<EnvironmentDiff> {
    let source: Vec<PackageInstall> = read_json(source)?;
    let target: Vec<PackageInstall> = read_json(target)?;
    Ok(diff_environments(&source, &target))
}

fn print<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => StrataConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StrataConfig::default(),
    };
    init_tracing(&config.logging);
    let pretty = matches.get_flag("pretty");

    match matches.subcommand() {
        Some(("validate", args)) => {
            let errors = validate(path(args, "snapshot")?)?;
            print(&errors, pretty)?;
            if !errors.is_empty() {
                tracing::warn!(errors = errors.len(), "snapshot is invalid");
                std::process::exit(1);
            }
        }
        Some(("diff", args)) => {
            let result = diff(path(args, "before")?, path(args, "after")?)?;
            print(&result, pretty)?;
        }
        Some(("drift", args)) => {
            let result = drift(path(args, "source")?, path(args, "target")?)?;
            tracing::info!(
                added = result.added.len(),
                changed = result.changed.len(),
                in_sync = result.in_sync.len(),
                "environment drift computed"
            );
            print(&result, pretty)?;
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand `{other}`"),
        None => anyhow::bail!("no subcommand given"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use strata_core::EnvironmentId;
    use strata_graph::{RecordTypeNode, SnapshotBuilder, ValidationCode};
    use strata_test_utils::{field, manifest_with, package_install};

    fn node(key: &str, base: Option<&str>) -> RecordTypeNode {
        RecordTypeNode {
            id: format!("rt-{key}"),
            tenant_id: "t1".to_string(),
            key: key.to_string(),
            version: 1,
            base_type: base.map(str::to_string),
            status: "active".to_string(),
            project_id: "p1".to_string(),
        }
    }

    fn write_json<T: serde::Serialize>(value: &T) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(value).unwrap().as_bytes()).unwrap();
        file
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn validate_reports_orphan_base_type() {
        let snapshot = SnapshotBuilder::new("t1")
            .record_type(node("incident", Some("ghost")), Vec::new())
            .build();
        let file = write_json(&snapshot);

        let errors = validate(file.path()).unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::OrphanBaseType);
    }

    #[test]
    fn diff_reads_both_snapshots() {
        let before = SnapshotBuilder::new("t1").record_type(node("task", None), Vec::new());
        let after = before.clone().record_type(node("incident", Some("task")), Vec::new());
        let before_file = write_json(&before.build());
        let after_file = write_json(&after.build());

        let result = diff(before_file.path(), after_file.path()).unwrap();

        assert_eq!(result.affected_record_keys(), vec!["incident".to_string()]);
    }

    #[test]
    fn drift_classifies_added_and_changed() {
        let (dev, prod) = (EnvironmentId::new(), EnvironmentId::new());
        let fields = vec![field("title", "string")];
        let source = vec![
            package_install(dev, "itsm", "2.0.0", manifest_with("incident", None, fields.clone())),
            package_install(dev, "hr", "1.0.0", manifest_with("case", None, Vec::new())),
            package_install(dev, "core", "1.0.0", manifest_with("task", None, Vec::new())),
        ];
        let target = vec![
            package_install(prod, "itsm", "1.0.0", manifest_with("incident", None, fields)),
            package_install(prod, "core", "1.0.0", manifest_with("task", None, Vec::new())),
        ];
        let source_file = write_json(&source);
        let target_file = write_json(&target);

        let result = drift(source_file.path(), target_file.path()).unwrap();

        let added: Vec<_> = result.added.iter().map(|d| d.package_key.as_str()).collect();
        let changed: Vec<_> = result.changed.iter().map(|d| d.package_key.as_str()).collect();
        let in_sync: Vec<_> = result.in_sync.iter().map(|d| d.package_key.as_str()).collect();
        assert_eq!(added, vec!["hr"]);
        assert_eq!(changed, vec!["itsm"]);
        assert_eq!(in_sync, vec!["core"]);
        assert_eq!(result.changed[0].source_version, "2.0.0");
    }

    #[test]
    fn malformed_input_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = validate(file.path()).unwrap_err();

        assert!(err.to_string().contains("parsing"));
    }
}
