//! Top-level CLI definition and dispatch.
//!
//! This layer turns flags and an optional TOML file into the validated
//! [`OptionSet`] the bootstrap core consumes, then runs the daemon and
//! maps the outcome to a process exit code.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::{debug, error};

use crate::core::errors::{Result, TaError};
use crate::core::listen::ListenAddress;
use crate::core::options::{DEFAULT_LOG_PERMISSIONS, OptionSet};
use crate::daemon::lifecycle::{self, EXIT_FAILURE, EXIT_SUCCESS};

/// Supervised telemetry-collection daemon.
#[derive(Parser)]
#[command(name = "telemetry-agent", version, about)]
pub struct Cli {
    /// Listen address: `unix:<absolute-path>` or `<host>:<port>`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Directory receiving collected telemetry logs.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// File containing the shared service secret.
    #[arg(long)]
    pub password_file: Option<PathBuf>,

    /// Unprivileged user to drop to (defaults to the current user).
    #[arg(long)]
    pub user: Option<String>,

    /// Group for the log directory (defaults to the user's primary group).
    #[arg(long)]
    pub group: Option<String>,

    /// Symbolic permission spec for the log directory.
    #[arg(long)]
    pub log_permissions: Option<String>,

    /// Optional TOML configuration file; flags override file values.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    listen: Option<String>,
    log_dir: Option<PathBuf>,
    password: Option<String>,
    password_file: Option<PathBuf>,
    user: Option<String>,
    group: Option<String>,
    log_permissions: Option<String>,
}

impl ConfigFile {
    fn load(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TaError::MissingConfig { path: path.clone() }
            } else {
                TaError::io(path, e)
            }
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Merge CLI flags over the config file into a validated option set.
pub fn build_options(cli: &Cli) -> Result<OptionSet> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let listen_raw = cli
        .listen
        .clone()
        .or(file.listen)
        .ok_or_else(|| TaError::InvalidConfig {
            details: "no listen address configured (set --listen or `listen`)".to_string(),
        })?;
    let listen: ListenAddress = listen_raw.parse()?;

    let password_file = cli.password_file.clone().or(file.password_file);
    let password = match (password_file, file.password) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(&path).map_err(|e| TaError::io(&path, e))?;
            raw.trim_end_matches(['\r', '\n']).to_string()
        }
        (None, Some(password)) => password,
        (None, None) => {
            return Err(TaError::InvalidConfig {
                details: "no service password configured (set --password-file or `password`)"
                    .to_string(),
            });
        }
    };
    if password.is_empty() {
        return Err(TaError::InvalidConfig {
            details: "the service password must not be empty".to_string(),
        });
    }

    Ok(OptionSet {
        listen,
        log_dir: cli
            .log_dir
            .clone()
            .or(file.log_dir)
            .unwrap_or_else(OptionSet::default_log_dir),
        password,
        user: cli.user.clone().or(file.user),
        group: cli.group.clone().or(file.group),
        log_permissions: cli
            .log_permissions
            .clone()
            .or(file.log_permissions)
            .unwrap_or_else(|| DEFAULT_LOG_PERMISSIONS.to_string()),
    })
}

/// Build options, run the daemon, and select the process exit code.
///
/// This is the single top-level error handler: every fatal error is
/// printed here with its stable code, mapping to exit code 1. A graceful
/// reactor stop maps to exit code 0. The supervision-loss path never
/// reaches this function (it exits from inside its watcher).
pub fn run(cli: &Cli) -> i32 {
    let outcome = build_options(cli).and_then(|options| {
        debug!(?options, "validated option set");
        lifecycle::run(&options)
    });
    match outcome {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(code = e.code(), "{e}");
            EXIT_FAILURE
        }
    }
}
