use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Load defaults, overlay the rc file at `path` (if any), then the environment.
    pub fn load_from(path: &Path) -> Self {
        let mut map = default_map();

        if path.exists() {
            if let Ok(file) = fs::File::open(path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if let Some((k, v)) = parse_line(&line) {
                        map.insert(k, v);
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if let Some(key) = config_key(&k) {
                map.insert(key, v);
            }
        }

        Self { inner: map, config_path: path.to_path_buf() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from)
    }

    pub fn output_root(&self) -> PathBuf {
        self.get_path("OUTPUT_ROOT")
            .unwrap_or_else(|| env::temp_dir().join("snipbox").join("agent_output"))
    }
}

/// Typed view over the execution-related keys.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub output_root: PathBuf,
    pub python_path: PathBuf,
    pub timeout: Duration,
    pub cpu_seconds: u64,
    pub memory_mb: u64,
    pub file_size_mb: u64,
    pub threads: usize,
    pub output_limit_bytes: usize,
    pub preview_rows: usize,
    pub isolate_network: bool,
}

impl SandboxSettings {
    pub fn from_config(cfg: &Config) -> Self {
        let defaults = Self::default();
        Self {
            output_root: cfg.output_root(),
            python_path: cfg.get_path("PYTHON_PATH").unwrap_or(defaults.python_path),
            timeout: cfg
                .get_u64("EXEC_TIMEOUT")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            cpu_seconds: cfg.get_u64("EXEC_CPU_SECONDS").unwrap_or(defaults.cpu_seconds),
            memory_mb: cfg.get_u64("EXEC_MEMORY_MB").unwrap_or(defaults.memory_mb),
            file_size_mb: cfg.get_u64("EXEC_FILE_SIZE_MB").unwrap_or(defaults.file_size_mb),
            threads: cfg.get_usize("EXEC_THREADS").filter(|n| *n > 0).unwrap_or(defaults.threads),
            output_limit_bytes: cfg
                .get_usize("OUTPUT_LIMIT_BYTES")
                .unwrap_or(defaults.output_limit_bytes),
            preview_rows: cfg.get_usize("PREVIEW_ROWS").unwrap_or(defaults.preview_rows),
            isolate_network: cfg.get_bool("ISOLATE_NETWORK"),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            output_root: env::temp_dir().join("snipbox").join("agent_output"),
            python_path: PathBuf::from("python3"),
            timeout: Duration::from_secs(60),
            cpu_seconds: 60,
            memory_mb: 2048,
            file_size_mb: 256,
            threads: 2,
            output_limit_bytes: 1024 * 1024,
            preview_rows: 5,
            isolate_network: false,
        }
    }
}

const KEYS: &[&str] = &[
    "OUTPUT_ROOT",
    "PYTHON_PATH",
    "EXEC_TIMEOUT",
    "EXEC_CPU_SECONDS",
    "EXEC_MEMORY_MB",
    "EXEC_FILE_SIZE_MB",
    "EXEC_THREADS",
    "OUTPUT_LIMIT_BYTES",
    "PREVIEW_ROWS",
    "ISOLATE_NETWORK",
    "LOG_LEVEL",
];

/// Map an environment variable name onto a config key: known keys as-is,
/// `SNIPBOX_<KEY>` with the prefix stripped.
fn config_key(k: &str) -> Option<String> {
    if let Some(rest) = k.strip_prefix("SNIPBOX_") {
        return (!rest.is_empty()).then(|| rest.to_string());
    }
    KEYS.contains(&k).then(|| k.to_string())
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("snipbox").join(".snipboxrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let defaults = SandboxSettings::default();

    // Paths
    m.insert(
        "OUTPUT_ROOT".into(),
        defaults.output_root.to_string_lossy().into_owned(),
    );
    m.insert(
        "PYTHON_PATH".into(),
        defaults.python_path.to_string_lossy().into_owned(),
    );

    // Numbers
    m.insert("EXEC_TIMEOUT".into(), defaults.timeout.as_secs().to_string());
    m.insert("EXEC_CPU_SECONDS".into(), defaults.cpu_seconds.to_string());
    m.insert("EXEC_MEMORY_MB".into(), defaults.memory_mb.to_string());
    m.insert("EXEC_FILE_SIZE_MB".into(), defaults.file_size_mb.to_string());
    m.insert("EXEC_THREADS".into(), defaults.threads.to_string());
    m.insert("OUTPUT_LIMIT_BYTES".into(), defaults.output_limit_bytes.to_string());
    m.insert("PREVIEW_ROWS".into(), defaults.preview_rows.to_string());

    // Bools as strings
    m.insert("ISOLATE_NETWORK".into(), "false".into());

    // Strings
    m.insert("LOG_LEVEL".into(), "warn".into());

    m
}
