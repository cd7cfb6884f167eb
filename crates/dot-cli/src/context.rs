//! Settings resolution
//!
//! Flags override the configuration file, which overrides the defaults:
//!
//! | setting | default |
//! |---|---|
//! | config file | `<config dir>/dotsync/dotsync.toml` |
//! | source | `<data dir>/dotsync` |
//! | destination | `$HOME` |
//! | state file | `dotsync-state.toml` next to the config file |
//! | umask | `022` |

use std::path::{Path, PathBuf};

use dot_core::{TargetState, TemplateFuncs};
use dot_fs::{ConfigStore, NormalizedPath};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cli::{Cli, parse_octal};
use crate::error::{CliError, Result};

const CONFIG_FILE: &str = "dotsync.toml";
const STATE_FILE: &str = "dotsync-state.toml";
const DEFAULT_UMASK: u32 = 0o022;

/// Contents of the configuration file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source_dir: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
    /// Octal, as a string: `"022"`.
    pub umask: Option<String>,
    pub state_file: Option<PathBuf>,
    /// Template data.
    pub data: Map<String, Value>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug)]
pub struct Context {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub state_file: PathBuf,
    pub umask: u32,
    pub data: Map<String, Value>,
}

impl Context {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => Some(path.clone()),
            None => config_dir().map(|dir| dir.join(CONFIG_FILE)).filter(|p| p.exists()),
        };
        let config: Config = match &config_path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                ConfigStore::new().load(path)?
            }
            None => Config::default(),
        };

        let source_dir = cli
            .source
            .clone()
            .or(config.source_dir)
            .or_else(|| dirs::data_dir().map(|dir| dir.join("dotsync")))
            .ok_or_else(|| CliError::user("No source directory: pass --source or set HOME"))?;
        let target_dir = cli
            .destination
            .clone()
            .or(config.target_dir)
            .or_else(dirs::home_dir)
            .ok_or_else(|| CliError::user("No destination directory: pass --destination or set HOME"))?;
        let state_file = config
            .state_file
            .or_else(|| {
                config_path
                    .as_deref()
                    .and_then(Path::parent)
                    .map(Path::to_path_buf)
                    .or_else(config_dir)
                    .map(|dir| dir.join(STATE_FILE))
            })
            .ok_or_else(|| CliError::user("No state file: set state_file in the config or set HOME"))?;
        let umask = match (cli.umask, config.umask) {
            (Some(umask), _) => umask,
            (None, Some(umask)) => parse_octal(&umask).map_err(CliError::user)?,
            (None, None) => DEFAULT_UMASK,
        };

        Ok(Self {
            source_dir: std::path::absolute(source_dir)?,
            target_dir: std::path::absolute(target_dir)?,
            state_file: std::path::absolute(state_file)?,
            umask,
            data: config.data,
        })
    }

    /// An unpopulated target state with the configured data and the
    /// built-in template functions.
    pub fn target_state(&self) -> TargetState {
        let mut data = self.data.clone();
        data.entry("sourceDir")
            .or_insert_with(|| Value::String(self.source_dir.display().to_string()));
        data.entry("destDir")
            .or_insert_with(|| Value::String(self.target_dir.display().to_string()));

        TargetState::new(
            NormalizedPath::from(self.target_dir.as_path()),
            self.umask,
            NormalizedPath::from(self.source_dir.as_path()),
            Value::Object(data),
            template_funcs(),
        )
    }
}

fn template_funcs() -> TemplateFuncs {
    TemplateFuncs::new()
        .with("os", || Ok(Value::String(std::env::consts::OS.to_string())))
        .with("arch", || Ok(Value::String(std::env::consts::ARCH.to_string())))
}

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dotsync"))
}
