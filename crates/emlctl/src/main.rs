use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use eml_sync::EntityType;
use emlctl::{cmd_parse, cmd_roundtrip, cmd_scales, cmd_set, cmd_validate, common};

#[derive(Parser, Debug)]
#[command(name = "emlctl", version, about = "EML metadata sync CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// Match element names exactly instead of ignoring case
    #[arg(long)]
    exact_tags: bool,
    /// Keep tag spelling as found instead of restoring canonical names
    #[arg(long)]
    no_canonicalize: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Parse one XML fragment into entity fields
    Parse {
        #[arg(long)]
        file: PathBuf,
        /// Entity type (e.g. numericDomain); inferred from the root element when omitted
        #[arg(long)]
        entity: Option<EntityType>,
    },
    /// Load a document and write every entity back
    Roundtrip {
        #[arg(long)]
        file: PathBuf,
    },
    /// Dispatch every measurement scale in a document
    Scales {
        #[arg(long)]
        file: PathBuf,
    },
    /// Validate every loaded entity and its references
    Validate {
        #[arg(long)]
        file: PathBuf,
    },
    /// Change one field of a loaded entity
    Set {
        #[arg(long)]
        file: PathBuf,
        /// Entity id as printed by `roundtrip`
        #[arg(long)]
        entity: u32,
        /// Dotted field path (e.g. `unit.standardUnit`)
        #[arg(long)]
        path: String,
        #[arg(long)]
        value: String,
    },
}

fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        exact_tags,
        no_canonicalize,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = common::sync_config(exact_tags, no_canonicalize);
    match cmd {
        Cmd::Parse { file, entity } => cmd_parse::run(&file, entity, &config, json)?,
        Cmd::Roundtrip { file } => cmd_roundtrip::run(&file, &config, json)?,
        Cmd::Scales { file } => cmd_scales::run(&file, &config, json)?,
        Cmd::Validate { file } => cmd_validate::run(&file, &config, json)?,
        Cmd::Set {
            file,
            entity,
            path,
            value,
        } => cmd_set::run(&file, entity, &path, &value, &config, json)?,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_entity_type_by_name() {
        let cli = Cli::parse_from([
            "emlctl",
            "parse",
            "--file",
            "ratio.xml",
            "--entity",
            "numericDomain",
        ]);
        match cli.cmd {
            Cmd::Parse { file, entity } => {
                assert_eq!(file, PathBuf::from("ratio.xml"));
                assert_eq!(entity, Some(EntityType::NumericDomain));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let parsed = Cli::try_parse_from([
            "emlctl", "parse", "--file", "x.xml", "--entity", "spaceship",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn parse_set_args_and_global_flags() {
        let cli = Cli::parse_from([
            "emlctl",
            "-vv",
            "--exact-tags",
            "set",
            "--file",
            "eml.xml",
            "--entity",
            "3",
            "--path",
            "unit.standardUnit",
            "--value",
            "meter",
        ]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.exact_tags);
        assert!(!cli.no_canonicalize);
        match cli.cmd {
            Cmd::Set {
                entity,
                path,
                value,
                ..
            } => {
                assert_eq!(entity, 3);
                assert_eq!(path, "unit.standardUnit");
                assert_eq!(value, "meter");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
