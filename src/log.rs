use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use crate::constants::APP_NAME;

static LOGGER: OnceLock<Logger> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    /// Console only, for chatty per-event lines (key events, monitor frames)
    Print,
}

impl Level {
    fn label(&self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
            Level::Print => "PRINT",
        }
    }
}

pub struct Logger {
    // `None` when the log file couldn't be opened, console output still works
    file: Option<Mutex<std::fs::File>>,
}

pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(&log_path()))
}

impl Logger {
    fn new(log_path: &Path) -> Self {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path);

        match file {
            Ok(file) => Logger {
                file: Some(Mutex::new(file)),
            },
            Err(e) => {
                eprintln!(
                    "Could not open log file `{}`, logging to console only: {}",
                    log_path.display(),
                    e
                );

                Logger { file: None }
            }
        }
    }

    pub fn log(&self, level: Level, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let thread = std::thread::current();

        let line = format!(
            "[ {} ][{}][{}] {}",
            level.label(),
            timestamp,
            thread.name().unwrap_or("unnamed"),
            message,
        );

        if level != Level::Print {
            if let Some(file) = &self.file {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());

                writeln!(file, "{}", line).ok();
            }
        }

        match level {
            Level::Warn | Level::Error => eprintln!("{}", line),
            Level::Info | Level::Print => println!("{}", line),
        }
    }
}

/// `<app>.log` next to the executable.
fn log_path() -> PathBuf {
    let file_name = format!("{}.log", APP_NAME.to_lowercase());

    match std::env::current_exe() {
        Ok(app_path) => app_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(file_name),
        Err(_) => PathBuf::from(file_name),
    }
}

// Logging Macros
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::get_logger().log($crate::log::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::get_logger().log($crate::log::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::get_logger().log($crate::log::Level::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_print {
    ($($arg:tt)*) => {
        $crate::log::get_logger().log($crate::log::Level::Print, &format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopenable_log_file_falls_back_to_console() {
        // A directory can't be opened for appending
        let logger = Logger::new(&std::env::temp_dir());

        assert!(logger.file.is_none());

        logger.log(Level::Error, "still printed");
    }

    #[test]
    fn console_only_lines_stay_out_of_the_file() {
        let path = std::env::temp_dir().join(format!("gyroglove-log-{}.log", std::process::id()));
        std::fs::remove_file(&path).ok();

        let logger = Logger::new(&path);

        logger.log(Level::Print, "[KEY] a Press");
        logger.log(Level::Warn, "falling behind");

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(!written.contains("[KEY] a Press"));
        assert!(written.contains("[ WARN  ]"));
        assert!(written.contains("falling behind"));
    }
}
