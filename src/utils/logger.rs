use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
/// 日志初始化：控制台(env_logger) + 按天滚动的文件
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::config::LoggingConfig;
use crate::core::error::RebalanceError;
use crate::core::types::Result;

/// 按日期命名的日志文件，跨天自动切换
struct DailyFile {
    dir: PathBuf,
    date: String,
    file: Option<fs::File>,
}

impl DailyFile {
    fn new(dir: &str) -> Self {
        Self {
            dir: PathBuf::from(dir),
            date: String::new(),
            file: None,
        }
    }

    fn write_line(&mut self, line: &str) {
        let today = Local::now().format("%Y%m%d").to_string();
        if self.file.is_none() || self.date != today {
            let path = log_file_path(&self.dir, &today);
            self.file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok();
            self.date = today;
        }

        if let Some(file) = self.file.as_mut() {
            if writeln!(file, "{}", line).is_ok() {
                let _ = file.flush();
            }
        }
    }
}

/// 日志文件路径: {dir}/rebalance_YYYYMMDD.log
pub fn log_file_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("rebalance_{}.log", date))
}

/// 控制台与文件双写
pub struct RebalanceLogger {
    console: env_logger::Logger,
    file: Option<Mutex<DailyFile>>,
}

impl Log for RebalanceLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.console.matches(record) {
            return;
        }
        self.console.log(record);

        if let Some(file) = &self.file {
            let line = format!(
                "[{}] [{}] [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
            if let Ok(mut guard) = file.lock() {
                guard.write_line(&line);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        "OFF" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// 初始化全局日志，RUST_LOG 优先于配置
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(&config.level));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let console = builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .build();

    let file = if config.file_output {
        if !Path::new(&config.dir).exists() {
            fs::create_dir_all(&config.dir)?;
        }
        Some(Mutex::new(DailyFile::new(&config.dir)))
    } else {
        None
    };

    let max_level = console.filter();
    log::set_boxed_logger(Box::new(RebalanceLogger { console, file }))
        .map_err(|e| RebalanceError::ConfigError(format!("日志初始化失败: {}", e)))?;
    log::set_max_level(max_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("Warning"), LevelFilter::Warn);
        assert_eq!(parse_level("bogus"), LevelFilter::Info);
    }

    #[test]
    fn daily_file_appends_to_dated_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = DailyFile::new(dir.path().to_str().unwrap());
        file.write_line("第一行");
        file.write_line("第二行");

        let today = Local::now().format("%Y%m%d").to_string();
        let contents = fs::read_to_string(log_file_path(dir.path(), &today)).unwrap();
        assert_eq!(contents, "第一行\n第二行\n");
    }
}
