//! # Reactor HTTP Server - Entry Point
//! src/main.rs
//!
//! Parsea la configuración, inicializa el logging y ejecuta el event loop
//! hasta recibir SIGINT o SIGTERM.

use reactor_httpd::config::Config;
use reactor_httpd::error::ServerError;
use reactor_httpd::logging;
use reactor_httpd::server::{self, Server};
use tracing::error;

fn run(config: Config) -> Result<(), ServerError> {
    server::install_signal_handlers()?;

    let mut server = Server::bind(config)?;
    server.run()
}

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("💥 Configuración inválida: {}", e);
        std::process::exit(1);
    }
    config.print_summary();

    // El guard debe vivir hasta el final para vaciar el log asíncrono
    let log_guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("💥 Error fatal: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        error!(error = %e, "server failed");
        eprintln!("💥 Error fatal: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}
