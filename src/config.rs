use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use anyhow::{bail, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};
use crate::source::DEFAULT_PAGE_SIZE;

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Default)]
pub struct FlatConfig {
    #[arg(long, env = "CHRONOGRID_API_URL", help = "Base URL of the timeline API")]
    api_url: Option<String>,

    #[arg(long, env = "CHRONOGRID_PAGE_SIZE", help = "Items requested per page")]
    page_size: Option<usize>,

    #[arg(long, env = "CHRONOGRID_WORK_DIR", help = "Directory for persisted state")]
    work_dir: Option<PathBuf>,

    #[arg(long, env = "CHRONOGRID_DEBOUNCE", value_parser = humantime::parse_duration, help = "Quiet period before the visible date is persisted, e.g. 50ms")]
    debounce: Option<Duration>,

    #[arg(long, env = "CHRONOGRID_LOG_LEVEL", help = "Log level: error, warn, info, debug, trace")]
    log_level: Option<String>,

    #[arg(long, env = "CHRONOGRID_VIEWPORT", default_value = "1280x800", help = "Viewport size as WIDTHxHEIGHT")]
    viewport: Viewport,

    #[arg(long, env = "CHRONOGRID_PREFETCH", help = "Fetch the next page ahead of scrolling")]
    prefetch: bool,

    #[arg(long, global = true, help = "Use a generated in-memory collection instead of the API")]
    demo: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280.0, height: 800.0 }
    }
}

impl FromStr for Viewport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((w, h)) = s.trim().split_once(['x', 'X']) else {
            bail!("expected WIDTHxHEIGHT, got {}", s);
        };
        let width: f64 = w.trim().parse().with_context(|| format!("invalid width: {}", w))?;
        let height: f64 = h.trim().parse().with_context(|| format!("invalid height: {}", h))?;
        if width <= 0.0 || height <= 0.0 {
            bail!("viewport must be positive, got {}", s);
        }
        Ok(Viewport { width, height })
    }
}

/// Values persisted in `config.json`; flags and env override them.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub file_config: FileConfig,
    pub api: ApiConfiguration,
    pub paging: PagingConfiguration,
    pub grid: GridConfiguration,
    pub state: StateConfiguration,
    pub log_level: String,
    pub demo: bool,
    /// Why `config.json` was ignored. Reported once logging is up.
    pub file_error: Option<String>,
}

#[derive(Debug)]
pub struct ApiConfiguration {
    pub api_url: String, // CHRONOGRID_API_URL
}

#[derive(Debug)]
pub struct PagingConfiguration {
    pub page_size: usize, // CHRONOGRID_PAGE_SIZE
    pub prefetch: bool, // CHRONOGRID_PREFETCH
}

#[derive(Debug)]
pub struct GridConfiguration {
    pub viewport_width: f64,
    pub viewport_height: f64,
}

#[derive(Debug)]
pub struct StateConfiguration {
    pub work_dir: PathBuf, // CHRONOGRID_WORK_DIR
    pub debounce: Duration,
}

impl StateConfiguration {
    pub fn state_path(&self) -> PathBuf {
        self.work_dir.join("state.json")
    }
}

impl AppConfig {
    pub fn from_parts(value: FlatConfig, config_path: PathBuf, file_config: FileConfig) -> Self {
        let default_dir = config_path.parent().map(Path::to_path_buf).unwrap_or_else(default_work_dir);
        let work_dir = value.work_dir
            .or_else(|| file_config.workdir.as_ref().map(PathBuf::from))
            .unwrap_or(default_dir);
        let page_size = value.page_size
            .or(file_config.page_size)
            .filter(|x| *x > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        AppConfig {
            api: ApiConfiguration {
                api_url: value.api_url
                    .or_else(|| file_config.api_url.clone())
                    .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            },
            paging: PagingConfiguration { page_size, prefetch: value.prefetch },
            grid: GridConfiguration {
                viewport_width: value.viewport.width,
                viewport_height: value.viewport.height,
            },
            state: StateConfiguration {
                work_dir,
                debounce: value.debounce.unwrap_or(DEFAULT_DEBOUNCE),
            },
            log_level: value.log_level
                .or_else(|| file_config.log_level.clone())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            demo: value.demo,
            file_error: None,
            config_path,
            file_config,
        }
    }

    /// Merges flags with the file at `config_path`. An unreadable file counts as empty and
    /// the reason is kept in `file_error`.
    pub fn load(value: FlatConfig, config_path: PathBuf) -> Self {
        match read_file_config(&config_path) {
            Ok(file_config) => AppConfig::from_parts(value, config_path, file_config),
            Err(e) => {
                let file_error = format!("ignoring config file {:?}: {:#}", config_path, e);
                AppConfig { file_error: Some(file_error), ..AppConfig::from_parts(value, config_path, FileConfig::default()) }
            }
        }
    }
}

impl From<FlatConfig> for AppConfig {
    fn from(value: FlatConfig) -> Self {
        AppConfig::load(value, default_work_dir().join("config.json"))
    }
}

pub fn default_work_dir() -> PathBuf {
    home::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chronogrid")
}

/// A missing file is an empty config.
pub fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    let file_config = serde_json::from_str(&content).with_context(|| format!("failed to parse {:?}", path))?;
    Ok(file_config)
}

pub fn write_file_config(path: &Path, file_config: &FileConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(file_config)?;
    std::fs::write(path, content).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(args: &[&str]) -> FlatConfig {
        let mut argv = vec!["chronogrid"];
        argv.extend_from_slice(args);
        FlatConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_viewport_parsing() {
        assert_eq!("800x600".parse::<Viewport>().unwrap(), Viewport { width: 800.0, height: 600.0 });
        assert!("800".parse::<Viewport>().is_err());
        assert!("0x600".parse::<Viewport>().is_err());
    }

    #[test]
    fn test_flags_override_file_config() {
        let file_config = FileConfig {
            workdir: Some("/tmp/from-file".to_string()),
            api_url: Some("http://file:1".to_string()),
            page_size: Some(200),
            log_level: None,
        };
        let config = AppConfig::from_parts(
            flat(&["--api-url", "http://flag:2", "--debounce", "250ms", "--viewport", "700x500"]),
            PathBuf::from("/tmp/cfg/config.json"),
            file_config,
        );
        assert_eq!(config.api.api_url, "http://flag:2");
        assert_eq!(config.paging.page_size, 200);
        assert_eq!(config.state.work_dir, PathBuf::from("/tmp/from-file"));
        assert_eq!(config.state.debounce, Duration::from_millis(250));
        assert_eq!(config.grid.viewport_width, 700.0);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::from_parts(FlatConfig::default(), PathBuf::from("/tmp/cfg/config.json"), FileConfig::default());
        assert_eq!(config.paging.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.state.state_path(), PathBuf::from("/tmp/cfg/state.json"));
        assert_eq!(config.state.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn test_file_config_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        assert_eq!(read_file_config(&path).unwrap(), FileConfig::default());

        let file_config = FileConfig { page_size: Some(500), ..Default::default() };
        write_file_config(&path, &file_config).unwrap();
        assert_eq!(read_file_config(&path).unwrap(), file_config);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("api_url"));
    }

    #[test]
    fn test_malformed_file_is_reported_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"page_size\": ").unwrap();
        let config = AppConfig::load(flat(&["--prefetch"]), path.clone());
        assert_eq!(config.file_config, FileConfig::default());
        assert_eq!(config.paging.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.paging.prefetch);
        assert!(config.file_error.unwrap().contains("failed to parse"));

        std::fs::write(&path, "{ \"page_size\": 250 }").unwrap();
        let config = AppConfig::load(flat(&[]), path);
        assert_eq!(config.paging.page_size, 250);
        assert!(!config.paging.prefetch);
        assert_eq!(config.file_error, None);
    }
}
