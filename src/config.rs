//! Configuration management for botctl.
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, error, warn};

use crate::error::ConfigError;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "botctl.yaml";

fn default_command() -> String {
    "venv/bin/python main.py".to_string()
}

fn default_pid_file() -> String {
    "bot.pid".to_string()
}

fn default_log_file() -> String {
    "bot.log".to_string()
}

fn default_settle_delay() -> String {
    "2s".to_string()
}

fn default_stop_timeout() -> String {
    "5s".to_string()
}

fn default_log_lines() -> usize {
    50
}

fn default_install_command() -> String {
    "venv/bin/pip install -r requirements.txt".to_string()
}

fn default_backup_prefix() -> String {
    "bot_backup".to_string()
}

fn default_backup_exclude() -> Vec<String> {
    ["venv", ".venv", "__pycache__", "*.pyc", "*.log"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Represents the structure of the configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the bot sources, PID file and log stream.
    #[serde(default)]
    pub base_dir: Option<String>,
    /// Command used to start the supervised process (run through `sh -c`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Substring matched against process command lines; defaults to `command`.
    #[serde(default)]
    pub match_pattern: Option<String>,
    /// PID file name, relative to the base directory.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,
    /// Log file name, relative to the base directory.
    #[serde(default = "default_log_file")]
    pub log_file: String,
    /// Pause between stop and start during a restart.
    #[serde(default = "default_settle_delay")]
    pub settle_delay: String,
    /// Grace period between SIGTERM and SIGKILL.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,
    /// Number of lines shown by `logs`.
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
    /// Command run by `update` to reinstall dependencies.
    #[serde(default = "default_install_command")]
    pub install_command: String,
    /// Optional environment variables for the supervised process.
    #[serde(default)]
    pub env: Option<EnvConfig>,
    /// Backup archive settings.
    #[serde(default)]
    pub backup: BackupConfig,
    /// Absolute base directory, resolved at load time.
    #[serde(skip)]
    root: PathBuf,
}

/// Represents environment variables for the supervised process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Optional path to an environment file.
    pub file: Option<String>,
    /// Key-value pairs of environment variables.
    pub vars: Option<HashMap<String, String>>,
}

impl EnvConfig {
    /// Resolves the full path to the env file based on a base directory.
    pub fn path(&self, base: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|f| {
            let path = Path::new(f);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            }
        })
    }
}

/// Settings for the `backup` verb.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Directory receiving archives; defaults to the parent of the base directory.
    #[serde(default)]
    pub dir: Option<String>,
    /// Archive file name prefix.
    #[serde(default = "default_backup_prefix")]
    pub prefix: String,
    /// Path components (`venv`) or suffix globs (`*.log`) left out of the archive.
    #[serde(default = "default_backup_exclude")]
    pub exclude: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: default_backup_prefix(),
            exclude: default_backup_exclude(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: None,
            command: default_command(),
            match_pattern: None,
            pid_file: default_pid_file(),
            log_file: default_log_file(),
            settle_delay: default_settle_delay(),
            stop_timeout: default_stop_timeout(),
            log_lines: default_log_lines(),
            install_command: default_install_command(),
            env: None,
            backup: BackupConfig::default(),
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Builds the default configuration rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: base_dir.into(),
            ..Self::default()
        }
    }

    /// Absolute directory the supervised process runs in.
    pub fn base_dir(&self) -> &Path {
        &self.root
    }

    /// Location of the process handle.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join(&self.pid_file)
    }

    /// Location of the advisory lock guarding the process handle.
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(format!("{}.lock", self.pid_file))
    }

    /// Location of the append-only log stream.
    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.log_file)
    }

    /// Directory where backup archives are written.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.dir {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.root.join(dir),
            None => self
                .root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone()),
        }
    }

    /// Substring used to find the supervised process in the process table.
    pub fn match_pattern(&self) -> &str {
        self.match_pattern
            .as_deref()
            .filter(|pattern| !pattern.trim().is_empty())
            .unwrap_or(&self.command)
    }

    /// Parsed restart settling delay.
    pub fn settle_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.settle_delay)
    }

    /// Parsed SIGTERM grace period.
    pub fn stop_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.stop_timeout)
    }

    /// Build the environment for the supervised process, giving inline `env.vars` precedence over
    /// entries loaded from `env.file`.
    pub fn child_env(&self) -> HashMap<String, String> {
        self.env
            .as_ref()
            .map(|env_config| env_overlay(env_config, &self.root))
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "command",
                reason: "must not be empty".into(),
            });
        }
        if self.pid_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "pid_file",
                reason: "must not be empty".into(),
            });
        }
        if self.log_file.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log_file",
                reason: "must not be empty".into(),
            });
        }
        if self.log_lines == 0 {
            return Err(ConfigError::InvalidValue {
                field: "log_lines",
                reason: "must be at least 1".into(),
            });
        }
        self.settle_delay()?;
        self.stop_timeout()?;
        Ok(())
    }
}

/// Reads `KEY=value` pairs from an env file, accepting `export` prefixes, quotes and comments.
fn read_env_file(path: &Path) -> std::io::Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)?;
    let mut pairs = HashMap::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            pairs.insert(key.trim().to_string(), unquote(value.trim()));
        } else {
            warn!("Ignoring malformed line in env file {path:?}: {line}");
        }
    }

    Ok(pairs)
}

/// Env file entries overlaid with inline vars.
fn env_overlay(env_config: &EnvConfig, root: &Path) -> HashMap<String, String> {
    let mut resolved = HashMap::new();

    if let Some(file_path) = env_config.path(root) {
        match read_env_file(&file_path) {
            Ok(pairs) => resolved.extend(pairs),
            Err(err) => error!("Failed to read env file {file_path:?}: {err}"),
        }
    }

    if let Some(vars) = &env_config.vars {
        resolved.extend(vars.iter().map(|(key, value)| (key.clone(), value.clone())));
    }

    resolved
}

fn unquote(value: &str) -> String {
    let quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));
    if quoted {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m|h]`.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    let invalid = || ConfigError::InvalidDuration(raw.to_string());

    if let Some(millis) = value.strip_suffix("ms") {
        let amount: u64 = millis.trim().parse().map_err(|_| invalid())?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str.parse().map_err(|_| invalid())?;
    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

/// Expands `${VAR}` and `$VAR` within a string, looking in `overlay` before the process
/// environment.
fn expand_env_vars(input: &str, overlay: &HashMap<String, String>) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .map_err(|err| ConfigError::InvalidValue {
            field: "env",
            reason: err.to_string(),
        })?;

    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match overlay
            .get(var_name)
            .cloned()
            .or_else(|| env::var(var_name).ok())
        {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ConfigError::MissingEnvVar(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// The keys read before `${VAR}` expansion so the env file can feed it.
#[derive(Debug, Deserialize)]
struct EnvPreamble {
    #[serde(default)]
    base_dir: Option<String>,
    #[serde(default)]
    env: Option<EnvConfig>,
}

/// Variables visible to `${VAR}` expansion on top of the process environment: the env file,
/// then inline vars. `base_dir` and `env.file` themselves only see the process environment.
fn expansion_overlay(
    content: &str,
    config_dir: &Path,
) -> Result<HashMap<String, String>, ConfigError> {
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let preamble: EnvPreamble = serde_yaml::from_str(content)?;
    let Some(mut env_config) = preamble.env else {
        return Ok(HashMap::new());
    };

    let process_only = HashMap::new();
    let base_dir = preamble
        .base_dir
        .map(|dir| expand_env_vars(&dir, &process_only))
        .transpose()?;
    env_config.file = env_config
        .file
        .map(|file| expand_env_vars(&file, &process_only))
        .transpose()?;

    let root = resolve_root(base_dir.as_deref(), config_dir);
    Ok(env_overlay(&env_config, &root))
}

fn resolve_root(base_dir: Option<&str>, config_dir: &Path) -> PathBuf {
    match base_dir {
        Some(dir) if Path::new(dir).is_absolute() => absolutize(Path::new(dir)),
        Some(dir) => absolutize(&config_dir.join(dir)),
        None => config_dir.to_path_buf(),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    joined.canonicalize().unwrap_or(joined)
}

/// Loads and parses the configuration file, expanding environment variables.
///
/// Without an explicit path, `botctl.yaml` in the working directory is used when present and
/// the built-in defaults (rooted at the working directory) otherwise.
pub fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !candidate.exists() {
                debug!("No {DEFAULT_CONFIG_FILE} found; using defaults");
                return Ok(Config::with_base_dir(absolutize(Path::new("."))));
            }
            candidate
        }
    };

    let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
        path: config_path.clone(),
        source,
    })?;

    let config_dir = absolutize(
        config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(".")),
    );

    let overlay = expansion_overlay(&content, &config_dir)?;
    let expanded_content = expand_env_vars(&content, &overlay)?;
    let mut config: Config = if expanded_content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&expanded_content)?
    };

    config.root = resolve_root(config.base_dir.as_deref(), &config_dir);

    config.validate()?;
    debug!("Loaded configuration from {config_path:?} (base dir {:?})", config.root);
    Ok(config)
}
