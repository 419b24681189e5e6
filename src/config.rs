//! INI configuration file.
//!
//! The file lives at `$ROOT_PATH/conf/<name>.conf`, where `<name>` comes from
//! `-c NAME`, `--conf NAME` or `--conf=NAME` on the command line. A missing
//! file is generated from a template with a fresh cookie secret.
//!
//! ```rust,ignore
//! let config = Arc::new(Config::open(&ConfigPath::from_env())?);
//! let port = config.port();
//! let debug = config.get_bool_option("setting", "_debug", false);
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use base64::Engine;
use ini::Ini;
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

const TEMPLATE: &str = r#"
[setting]
port = {port}
processes = 1
language = zh_CN
cors = True
access_control_allow_origin = *
cookie_domain =
cookie_secret_name = X-Token
cookie_secret = {cookie_secret}
_debug = False
_enable_jwt = True

[log]
level = INFO
archive = True
crontab_base_log_dir = /tmp
access_path = /tmp/access.log

[database]
# mysql://user:passwd@ip:port/my_db
# mysql+pool://user:passwd@ip:port/my_db?charset=utf8&max_connections=50&stale_timeout=20
# postgresql://user:passwd@ip:port/my_db?connect_timeout=60
# postgresql+pool://user:passwd@ip:port/my_db?connect_timeout=60&max_connections=50&stale_timeout=30
# db_url =
# slave_url =

[redis]
# redis://:password@host:6379/0?encoding=utf-8
center_redis_url = redis://localhost:6379/0?encoding=utf8
"#;

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_NAME: &str = "server";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to load config {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where to find (or create) the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub root: PathBuf,
    pub name: String,
    pub port: u16,
    /// Create the `conf` directory when it is missing.
    pub create_dirs: bool,
}

impl ConfigPath {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            port: DEFAULT_PORT,
            create_dirs: false,
        }
    }

    /// Reads the process arguments and environment; see [`ConfigPath::from_args`].
    pub fn from_env() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    /// Config name from `args` (default `server`), root from `ROOT_PATH`
    /// (falls back to the working directory), `CREATE_CONFIG` enables
    /// directory creation.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = std::env::var_os("ROOT_PATH")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let name = conf_name_from_args(args).unwrap_or_else(|| DEFAULT_NAME.to_owned());
        Self {
            create_dirs: std::env::var_os("CREATE_CONFIG").is_some(),
            ..Self::new(root, name)
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join("conf").join(format!("{}.conf", self.name))
    }
}

/// Extracts the config name from `-c NAME`, `--conf NAME` or `--conf=NAME`.
pub fn conf_name_from_args<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if let Some(name) = arg.strip_prefix("--conf=") {
            return Some(name.to_owned());
        }
        if arg == "-c" || arg == "--conf" {
            return args.next().map(|name| name.as_ref().to_owned());
        }
    }
    None
}

/// 64 characters of base64 over 48 random bytes.
pub fn generate_cookie_secret() -> String {
    let mut bytes = [0u8; 48];
    rand::rng().fill(&mut bytes[..]);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn render_template(port: u16) -> String {
    TEMPLATE
        .replace("{port}", &port.to_string())
        .replace("{cookie_secret}", &generate_cookie_secret())
        .trim()
        .to_owned()
}

pub struct Config {
    path: Option<PathBuf>,
    ini: RwLock<Ini>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let ini = read(&path)?;
        Ok(Self {
            path: Some(path),
            ini: RwLock::new(ini),
        })
    }

    /// Loads the file described by `options`, writing the template first if
    /// it does not exist yet.
    pub fn open(options: &ConfigPath) -> Result<Self, ConfigError> {
        let path = options.path();
        if !path.exists() {
            let dir = path.parent().unwrap_or(&options.root);
            if !dir.exists() {
                if !options.create_dirs {
                    return Err(ConfigError::NotFound(path));
                }
                fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            fs::write(&path, render_template(options.port)).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "generated default config file");
        }
        Self::load(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the file, replacing the cached values.
    pub fn reload(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            let fresh = read(path)?;
            *self.ini.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        }
        Ok(())
    }

    /// The option value, or `default` when it is missing or empty.
    pub fn get_option(&self, section: &str, option: &str, default: Option<&str>) -> Option<String> {
        self.read()
            .get_from(Some(section), option)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or(default)
            .map(str::to_owned)
    }

    /// `false`/`0` (any case) are false; any other non-empty value is true.
    pub fn get_bool_option(&self, section: &str, option: &str, default: bool) -> bool {
        match self.get_option(section, option, None) {
            Some(value) => !matches!(value.to_ascii_lowercase().as_str(), "false" | "0"),
            None => default,
        }
    }

    /// Only plain digit strings parse; anything else yields `default`.
    pub fn get_int_option(&self, section: &str, option: &str, default: i64) -> i64 {
        self.get_option(section, option, None)
            .filter(|value| value.chars().all(|c| c.is_ascii_digit()))
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Updates a value and rewrites the file in place.
    pub fn set_option(&self, section: &str, option: &str, value: &str) -> Result<(), ConfigError> {
        let mut ini = self.ini.write().unwrap_or_else(PoisonError::into_inner);
        ini.with_section(Some(section)).set(option, value);
        if let Some(path) = &self.path {
            ini.write_to_file(path).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        } else {
            warn!(section, option, "config has no backing file, change kept in memory");
        }
        Ok(())
    }

    pub fn process_num(&self) -> i64 {
        self.get_int_option("setting", "processes", 1)
    }

    pub fn language(&self) -> String {
        self.get_option("setting", "language", Some("en_US"))
            .unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        u16::try_from(self.get_int_option("setting", "port", i64::from(DEFAULT_PORT)))
            .unwrap_or(DEFAULT_PORT)
    }

    /// Origin to advertise in CORS headers, or `None` while `[setting] cors`
    /// is off. `access_control_allow_origin` narrows the `*` default.
    pub fn cors_origin(&self) -> Option<String> {
        self.get_bool_option("setting", "cors", false)
            .then(|| self.get_option("setting", "access_control_allow_origin", Some("*")))
            .flatten()
    }

    fn read(&self) -> RwLockReadGuard<'_, Ini> {
        self.ini.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            path: None,
            ini: RwLock::new(Ini::load_from_str(text)?),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config").field("path", &self.path).finish_non_exhaustive()
    }
}

fn read(path: &Path) -> Result<Ini, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    Ini::load_from_file(path).map_err(|source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    })
}
