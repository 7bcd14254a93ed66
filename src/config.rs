//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./reactor_httpd --port 9006 \
//!   --doc-root ./root \
//!   --listen-trigger et --conn-trigger et \
//!   --threads 8 --dispatch dual
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=9006 DOC_ROOT=/srv/www LOG_LEVEL=debug ./reactor_httpd
//! ```

use crate::pool::DispatchMode;
use crate::reactor::TriggerMode;
use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "reactor_httpd")]
#[command(about = "Servidor HTTP/1.1 con reactor epoll y pool de workers")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "9006", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Directorio desde el que se sirven los archivos
    #[arg(long, default_value = "./root", env = "DOC_ROOT")]
    pub doc_root: PathBuf,

    // === Reactor ===
    /// Modo de disparo del socket de escucha
    #[arg(long, value_enum, default_value = "lt", env = "LISTEN_TRIGGER")]
    pub listen_trigger: TriggerMode,

    /// Modo de disparo de las conexiones
    #[arg(long, value_enum, default_value = "lt", env = "CONN_TRIGGER")]
    pub conn_trigger: TriggerMode,

    /// Activa SO_LINGER (1 s) en el socket de escucha
    #[arg(long, env = "LINGER")]
    pub linger: bool,

    /// Máximo de conexiones simultáneas
    #[arg(long, default_value = "65536", env = "MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Segundos sin actividad antes de cerrar una conexión
    #[arg(long = "idle-timeout", default_value = "15", env = "IDLE_TIMEOUT")]
    pub idle_timeout_secs: u64,

    // === Workers ===
    /// Número de threads del pool
    #[arg(short, long, default_value = "8", env = "THREADS")]
    pub threads: usize,

    /// Capacidad máxima de la cola de trabajos
    #[arg(long, default_value = "10000", env = "MAX_REQUESTS")]
    pub max_requests: usize,

    /// Quién hace la E/S de sockets: el event loop o los workers
    #[arg(long, value_enum, default_value = "direct", env = "DISPATCH")]
    pub dispatch: DispatchMode,

    // === Credenciales ===
    /// Archivo JSON de usuarios
    #[arg(long, default_value = "./data/users.json", env = "USERS_FILE")]
    pub users_file: PathBuf,

    /// Conexiones en el pool del almacén
    #[arg(long, default_value = "8", env = "STORE_POOL_SIZE")]
    pub store_pool_size: usize,

    // === Logging ===
    /// Directorio de los archivos de log
    #[arg(long, default_value = "./logs", env = "LOG_DIR")]
    pub log_dir: PathBuf,

    /// Nombre del archivo de log activo
    #[arg(long, default_value = "server.log", env = "LOG_PREFIX")]
    pub log_prefix: String,

    /// Archivos rotados que se conservan
    #[arg(long, default_value = "7", env = "LOG_MAX_FILES")]
    pub log_max_files: usize,

    /// Tamaño en bytes que fuerza una rotación (0 = solo diaria)
    #[arg(long, default_value = "67108864", env = "LOG_MAX_SIZE")]
    pub log_max_size: u64,

    /// Escribe el log desde un thread dedicado
    #[arg(long, env = "LOG_ASYNC")]
    pub log_async: bool,

    /// Líneas que admite la cola del log asíncrono antes de descartar
    #[arg(long, default_value = "8192", env = "LOG_QUEUE_SIZE")]
    pub log_queue_size: usize,

    /// Desactiva el logging por completo
    #[arg(long, env = "CLOSE_LOG")]
    pub close_log: bool,

    /// Nivel mínimo: trace, debug, info, warn, error, off
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use reactor_httpd::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:9006");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Nivel de log parseado
    pub fn level_filter(&self) -> Result<LevelFilter, String> {
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| format!("Unknown log level: {}", self.log_level))
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("Worker threads must be >= 1".to_string());
        }
        if self.max_requests == 0 {
            return Err("Max requests must be >= 1".to_string());
        }
        if self.store_pool_size == 0 {
            return Err("Store pool size must be >= 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("Max connections must be >= 1".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("Idle timeout must be > 0".to_string());
        }
        if self.log_max_files == 0 {
            return Err("Log max files must be >= 1".to_string());
        }
        if self.log_async && self.log_queue_size == 0 {
            return Err("Log queue size must be >= 1 in async mode".to_string());
        }
        self.level_filter()?;

        if !self.doc_root.is_dir() {
            return Err(format!(
                "Document root is not a directory: {}",
                self.doc_root.display()
            ));
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║              Reactor HTTP/1.1 Server Configuration           ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Doc root:     {}", self.doc_root.display());
        println!("   Linger:       {}", if self.linger { "on" } else { "off" });
        println!();
        println!("⚡ Reactor:");
        println!("   ┌──────────────┬──────────┐");
        println!("   │ Socket       │ Trigger  │");
        println!("   ├──────────────┼──────────┤");
        println!("   │ Listener     │ {:^8} │", trigger_name(self.listen_trigger));
        println!("   │ Connections  │ {:^8} │", trigger_name(self.conn_trigger));
        println!("   └──────────────┴──────────┘");
        println!("   Max conns:    {}", self.max_connections);
        println!("   Idle timeout: {} s", self.idle_timeout_secs);
        println!();
        println!("👷 Worker Pool:");
        println!("   Threads:      {}", self.threads);
        println!("   Queue cap:    {}", self.max_requests);
        println!("   Dispatch:     {:?}", self.dispatch);
        println!();
        println!("🔑 Credentials:");
        println!("   Users file:   {}", self.users_file.display());
        println!("   Pool size:    {}", self.store_pool_size);
        println!();
        println!("📝 Logging:");
        if self.close_log {
            println!("   disabled");
        } else {
            println!(
                "   File:         {}/{}",
                self.log_dir.display(),
                self.log_prefix
            );
            println!("   Level:        {}", self.log_level);
            println!("   Retention:    {} files", self.log_max_files);
            if self.log_max_size > 0 {
                println!("   Max size:     {} bytes", self.log_max_size);
            }
            if self.log_async {
                println!("   Async queue:  {} lines", self.log_queue_size);
            } else {
                println!("   Async:        off");
            }
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

fn trigger_name(mode: TriggerMode) -> &'static str {
    match mode {
        TriggerMode::Level => "LT",
        TriggerMode::Edge => "ET",
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 9006,
            host: "127.0.0.1".to_string(),
            doc_root: PathBuf::from("./root"),
            listen_trigger: TriggerMode::Level,
            conn_trigger: TriggerMode::Level,
            linger: false,
            max_connections: 65536,
            idle_timeout_secs: 15,
            threads: 8,
            max_requests: 10_000,
            dispatch: DispatchMode::Direct,
            users_file: PathBuf::from("./data/users.json"),
            store_pool_size: 8,
            log_dir: PathBuf::from("./logs"),
            log_prefix: "server.log".to_string(),
            log_max_files: 7,
            log_max_size: 64 * 1024 * 1024,
            log_async: false,
            log_queue_size: 8192,
            close_log: false,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config(dir: &TempDir) -> Config {
        Config {
            doc_root: dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 9006);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.threads, 8);
        assert_eq!(config.max_requests, 10_000);
        assert_eq!(config.dispatch, DispatchMode::Direct);
        assert_eq!(config.listen_trigger, TriggerMode::Level);
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_validate_success() {
        let dir = TempDir::new().unwrap();
        assert!(valid_config(&dir).validate().is_ok());
    }

    // ==================== CLI ====================

    #[test]
    fn test_parse_cli_flags() {
        let config = Config::try_parse_from([
            "reactor_httpd",
            "--port",
            "8080",
            "--listen-trigger",
            "et",
            "--conn-trigger",
            "et",
            "--dispatch",
            "dual",
            "--threads",
            "4",
            "--close-log",
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_trigger, TriggerMode::Edge);
        assert_eq!(config.conn_trigger, TriggerMode::Edge);
        assert_eq!(config.dispatch, DispatchMode::Dual);
        assert_eq!(config.threads, 4);
        assert!(config.close_log);
    }

    #[test]
    fn test_parse_log_rotation_flags() {
        let config = Config::try_parse_from([
            "reactor_httpd",
            "--log-max-size",
            "1048576",
            "--log-async",
            "--log-queue-size",
            "100",
        ])
        .unwrap();

        assert_eq!(config.log_max_size, 1_048_576);
        assert!(config.log_async);
        assert_eq!(config.log_queue_size, 100);
    }

    #[test]
    fn test_parse_rejects_unknown_trigger() {
        let result = Config::try_parse_from(["reactor_httpd", "--conn-trigger", "edge"]);
        assert!(result.is_err());
    }

    // ==================== Validación ====================

    #[test]
    fn test_validate_invalid_threads() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.threads = 0;
        assert!(config.validate().unwrap_err().contains("Worker threads"));
    }

    #[test]
    fn test_validate_invalid_queue() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.max_requests = 0;
        assert!(config.validate().unwrap_err().contains("Max requests"));
    }

    #[test]
    fn test_validate_invalid_store_pool() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.store_pool_size = 0;
        assert!(config.validate().unwrap_err().contains("Store pool"));
    }

    #[test]
    fn test_validate_invalid_idle_timeout() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.idle_timeout_secs = 0;
        assert!(config.validate().unwrap_err().contains("Idle timeout"));
    }

    #[test]
    fn test_validate_async_log_queue() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.log_queue_size = 0;
        // Sin modo asíncrono la cola no se usa
        assert!(config.validate().is_ok());

        config.log_async = true;
        assert!(config.validate().unwrap_err().contains("Log queue size"));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.log_level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("log level"));

        config.log_level = "debug".to_string();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_validate_missing_doc_root() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.doc_root = dir.path().join("missing");
        assert!(config.validate().unwrap_err().contains("Document root"));
    }

    // ==================== Print Summary ====================

    #[test]
    fn test_config_print_summary() {
        let config = Config::default();
        // Should not panic
        config.print_summary();

        let quiet = Config {
            close_log: true,
            ..Config::default()
        };
        quiet.print_summary();
    }
}
