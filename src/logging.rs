//! # Logging
//! src/logging.rs
//!
//! Inicializa `tracing` a partir de la configuración:
//!
//! - `--close-log`: no se instala subscriber, los eventos se descartan
//! - archivo `<log_dir>/<log_prefix>` que rota al cambiar el día o al
//!   superar `log_max_size` bytes; los rotados quedan como
//!   `<log_prefix>.1`, `<log_prefix>.2`, ... hasta `log_max_files`
//! - `--log-async`: el archivo se escribe desde un thread dedicado con
//!   una cola de `log_queue_size` líneas que descarta antes que bloquear
//! - siempre se agrega una capa a stderr

use crate::config::Config;
use crate::error::ServerError;
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use std::fs;
use std::sync::Mutex;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Instala el subscriber global.
///
/// Con `log_async` devuelve el guard del writer: mientras viva, las
/// líneas encoladas se siguen escribiendo. Si ya había un subscriber
/// global la llamada no tiene efecto.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>, ServerError> {
    if config.close_log {
        return Ok(None);
    }

    let level = config.level_filter().map_err(ServerError::Logging)?;
    let appender = file_appender(config)?;

    let (file_layer, guard) = if config.log_async {
        let (writer, guard) = NonBlockingBuilder::default()
            .buffered_lines_limit(config.log_queue_size)
            .lossy(true)
            .finish(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(writer)
            .boxed();
        (layer, Some(guard))
    } else {
        let layer = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(Mutex::new(appender))
            .boxed();
        (layer, None)
    };

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // Ya inicializado (p. ej. en tests): se conserva el existente
    let _ = tracing_subscriber::registry()
        .with(file_layer.with_filter(level))
        .with(console_layer.with_filter(level))
        .try_init();

    Ok(guard)
}

/// Appender del archivo de log con rotación diaria y por tamaño
pub fn file_appender(config: &Config) -> Result<BasicRollingFileAppender, ServerError> {
    fs::create_dir_all(&config.log_dir).map_err(|e| {
        ServerError::Logging(format!("cannot create {}: {}", config.log_dir.display(), e))
    })?;

    let mut condition = RollingConditionBasic::new().daily();
    if config.log_max_size > 0 {
        condition = condition.max_size(config.log_max_size);
    }

    let path = config.log_dir.join(&config.log_prefix);
    BasicRollingFileAppender::new(&path, condition, config.log_max_files)
        .map_err(|e| ServerError::Logging(format!("cannot open {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_close_log_installs_nothing() {
        let config = Config {
            close_log: true,
            ..Config::default()
        };
        assert!(init(&config).unwrap().is_none());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            log_dir: dir.path().to_path_buf(),
            log_level: "chatty".to_string(),
            ..Config::default()
        };
        assert!(matches!(init(&config), Err(ServerError::Logging(_))));
    }

    #[test]
    fn test_async_returns_guard_and_creates_dir() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let config = Config {
            log_dir: log_dir.clone(),
            log_async: true,
            log_queue_size: 16,
            ..Config::default()
        };

        let guard = init(&config).unwrap();
        assert!(guard.is_some());
        assert!(log_dir.join("server.log").is_file());
    }

    // ==================== Rotación ====================

    #[test]
    fn test_rotates_when_size_exceeded() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            log_dir: dir.path().to_path_buf(),
            log_prefix: "httpd.log".to_string(),
            log_max_size: 150,
            log_max_files: 2,
            ..Config::default()
        };

        let mut appender = file_appender(&config).unwrap();
        let line = [b'x'; 100];
        for _ in 0..6 {
            appender.write_all(&line).unwrap();
        }
        appender.flush().unwrap();

        assert!(dir.path().join("httpd.log").is_file());
        assert!(dir.path().join("httpd.log.1").is_file());
        assert!(dir.path().join("httpd.log.2").is_file());
        // Solo se conservan `log_max_files` rotados
        assert!(!dir.path().join("httpd.log.3").exists());
    }

    #[test]
    fn test_no_size_limit_keeps_single_file() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            log_dir: dir.path().to_path_buf(),
            log_max_size: 0,
            ..Config::default()
        };

        let mut appender = file_appender(&config).unwrap();
        for _ in 0..50 {
            appender.write_all(&[b'y'; 100]).unwrap();
        }
        appender.flush().unwrap();

        let written = fs::metadata(dir.path().join("server.log")).unwrap().len();
        assert_eq!(written, 5000);
        assert!(!dir.path().join("server.log.1").exists());
    }
}
