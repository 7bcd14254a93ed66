//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas, cerradas, activas y rechazadas
//! - Respuestas por código de estado
//! - Trabajos descartados por cola llena
//! - Cierres por inactividad

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
