//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Contadores del servidor compartidos entre el event loop y los workers.

use crate::sync::Locker;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Locker<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Default)]
struct MetricsData {
    /// Conexiones aceptadas y registradas
    accepted: u64,

    /// Conexiones cerradas por cualquier motivo
    closed: u64,

    /// Conexiones rechazadas con la tabla llena
    refused: u64,

    /// Trabajos descartados con la cola llena
    queue_rejected: u64,

    /// Conexiones cerradas por inactividad
    idle_timeouts: u64,

    /// Respuestas por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Bytes de respuesta armados (cabeceras + cuerpo)
    response_bytes: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Locker::new(MetricsData::default())),
            start_time: Instant::now(),
        }
    }

    pub fn connection_accepted(&self) {
        self.inner.lock().accepted += 1;
    }

    pub fn connection_closed(&self) {
        self.inner.lock().closed += 1;
    }

    pub fn connection_refused(&self) {
        self.inner.lock().refused += 1;
    }

    pub fn queue_rejected(&self) {
        self.inner.lock().queue_rejected += 1;
    }

    pub fn idle_timeout(&self) {
        self.inner.lock().idle_timeouts += 1;
    }

    /// Registra una respuesta armada
    pub fn record_response(&self, status_code: u16, bytes: usize) {
        let mut data = self.inner.lock();
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        data.response_bytes += bytes as u64;
    }

    /// Conexiones abiertas ahora mismo
    pub fn active_connections(&self) -> u64 {
        let data = self.inner.lock();
        data.accepted.saturating_sub(data.closed)
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.inner.lock();
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            connections_accepted: data.accepted,
            connections_closed: data.closed,
            connections_active: data.accepted.saturating_sub(data.closed),
            connections_refused: data.refused,
            queue_rejected: data.queue_rejected,
            idle_timeouts: data.idle_timeouts,
            total_responses: data.status_codes.values().sum(),
            status_codes: data.status_codes.clone(),
            response_bytes: data.response_bytes,
        }
    }

    /// Snapshot en JSON
    pub fn to_json(&self) -> String {
        // Un struct de contadores siempre serializa
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub connections_active: u64,
    pub connections_refused: u64,
    pub queue_rejected: u64,
    pub idle_timeouts: u64,
    pub total_responses: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub response_bytes: u64,
}
