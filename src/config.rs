use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;

use student_records::api::generator::{DEFAULT_COUNT, DEFAULT_SEED};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("环境变量 {key} 的值 {value:?} 无效")]
    Invalid { key: &'static str, value: String },
    #[error("环境变量 {0} 不能为0")]
    Zero(&'static str),
}

/// 运行参数, 来自环境变量或`.env`文件
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub page_size: u32,
    pub sample_size: usize,
    pub generator_seed: u64,
    pub export_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("students.db"),
            log_level: LevelFilter::Info,
            log_file: None,
            page_size: 20,
            sample_size: DEFAULT_COUNT,
            generator_seed: DEFAULT_SEED,
            export_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 未设置或为空的变量使用默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Config::default();

        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(level) = parse::<LevelFilter>(&get, "LOG_LEVEL")? {
            config.log_level = level;
        }
        config.log_file = get("LOG_FILE").map(PathBuf::from);
        if let Some(size) = parse::<u32>(&get, "PAGE_SIZE")? {
            if size == 0 {
                return Err(ConfigError::Zero("PAGE_SIZE"));
            }
            config.page_size = size;
        }
        if let Some(size) = parse(&get, "SAMPLE_SIZE")? {
            config.sample_size = size;
        }
        if let Some(seed) = parse(&get, "GENERATOR_SEED")? {
            config.generator_seed = seed;
        }
        config.export_path = get("EXPORT_PATH").map(PathBuf::from);

        Ok(config)
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}
