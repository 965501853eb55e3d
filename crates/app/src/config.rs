//! Command line and environment configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use services::AccessPolicy;
use thiserror::Error;
use tutor_core::model::{ProfileError, ResearchGroup};

pub const DEFAULT_DB_URL: &str = "sqlite://videoanalytics.sqlite3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid database url: {0}")]
    InvalidDbUrl(String),
    #[error("invalid control group {raw:?}: {source}")]
    InvalidControlGroup {
        raw: String,
        #[source]
        source: ProfileError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Parser)]
#[command(name = "videoanalytics")]
#[command(about = "Video tutoring progress tracking and research reports")]
pub struct Cli {
    /// SQLite database url or path
    #[arg(long = "db", env = "VIDEOANALYTICS_DB_URL", default_value = DEFAULT_DB_URL, global = true)]
    pub db_url: String,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Access gating knobs.
#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    /// Hierarchy that requires a quiz submission before entry
    #[arg(
        long,
        env = "VIDEOANALYTICS_GATED_HIERARCHY",
        default_value = services::access::DEFAULT_GATED_HIERARCHY,
        global = true
    )]
    pub gated_hierarchy: String,

    /// Research groups that skip the gate, comma separated
    #[arg(
        long,
        env = "VIDEOANALYTICS_CONTROL_GROUPS",
        value_delimiter = ',',
        global = true
    )]
    pub control_groups: Vec<String>,
}

impl PolicyArgs {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidControlGroup` for a code that is not a single character.
    pub fn to_policy(&self) -> Result<AccessPolicy, ConfigError> {
        let control_groups = self
            .control_groups
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse::<ResearchGroup>()
                    .map_err(|source| ConfigError::InvalidControlGroup {
                        raw: raw.to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AccessPolicy {
            gated_hierarchy: self.gated_hierarchy.trim().to_owned(),
            control_groups,
        })
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "VIDEOANALYTICS_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
    },

    /// Write a research report as CSV
    Report {
        /// Report kind: metadata or values
        #[arg(long = "type", default_value = "metadata")]
        kind: String,

        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Create an account and its profile
    CreateUser {
        username: String,

        /// Active staff account instead of a participant
        #[arg(long)]
        staff: bool,

        #[arg(long)]
        superuser: bool,

        /// Research group code
        #[arg(long)]
        group: Option<String>,
    },

    /// Load demo hierarchies and participants
    Seed,
}

/// Turn a bare path or `sqlite:` url into an absolute `sqlite://` url.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directory if they are missing.
///
/// # Errors
///
/// Returns `ConfigError::InvalidDbUrl` for a url without a path and
/// `ConfigError::Io` if the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), ConfigError> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ConfigError::InvalidDbUrl(db_url.to_owned()))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ConfigError::InvalidDbUrl(db_url.to_owned()));
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/x.db"), "sqlite:///tmp/x.db");
        assert_eq!(normalize_sqlite_url("/tmp/x.db"), "sqlite:///tmp/x.db");
        assert!(normalize_sqlite_url("sqlite:data/x.db").ends_with("/data/x.db"));
    }

    #[test]
    fn control_groups_parse_from_a_comma_list() {
        let cli = Cli::try_parse_from([
            "videoanalytics",
            "--control-groups",
            "c, d",
            "serve",
        ])
        .unwrap();
        let policy = cli.policy.to_policy().unwrap();
        let codes: Vec<char> = policy.control_groups.iter().map(|g| g.code()).collect();
        assert_eq!(codes, vec!['c', 'd']);
        assert_eq!(policy.gated_hierarchy, "videos");
    }

    #[test]
    fn multi_character_group_is_rejected() {
        let args = PolicyArgs {
            gated_hierarchy: "videos".into(),
            control_groups: vec!["ab".into()],
        };
        assert!(matches!(
            args.to_policy(),
            Err(ConfigError::InvalidControlGroup { .. })
        ));
    }

    #[test]
    fn report_subcommand_takes_type_and_out() {
        let cli = Cli::try_parse_from([
            "videoanalytics",
            "report",
            "--type",
            "values",
            "--out",
            "r.csv",
        ])
        .unwrap();
        match cli.command {
            Command::Report { kind, out } => {
                assert_eq!(kind, "values");
                assert_eq!(out, Some(PathBuf::from("r.csv")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
