//! Prometheus-compatible metrics endpoint
//!
//! Exposes simulation and replication counters in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::world::TickReport;
use crate::net::client::ReplicaStats;

/// Samples kept for tick time percentiles
const TICK_HISTORY_LEN: usize = 1000;

/// Metrics registry for the server
#[derive(Debug)]
pub struct Metrics {
    // Simulation
    pub ships_alive: AtomicU64,
    pub connections_active: AtomicU64,
    pub moves_applied: AtomicU64,
    pub kills: AtomicU64,
    pub respawns: AtomicU64,

    // Tick timing
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Replication, server side
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub ghost_updates: AtomicU64,

    // Replication, client side (summed over simulated clients)
    pub warps: AtomicU64,
    pub interpolations: AtomicU64,
    pub reconciliations: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ships_alive: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            moves_applied: AtomicU64::new(0),
            kills: AtomicU64::new(0),
            respawns: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            ghost_updates: AtomicU64::new(0),
            warps: AtomicU64::new(0),
            interpolations: AtomicU64::new(0),
            reconciliations: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Fold one tick's report into the counters
    pub fn record_tick(&self, report: &TickReport) {
        self.ships_alive.store(report.ships_alive as u64, Ordering::Relaxed);
        self.moves_applied.fetch_add(report.moves_applied as u64, Ordering::Relaxed);
        self.kills.fetch_add(report.kills as u64, Ordering::Relaxed);
        self.respawns.fetch_add(report.respawned as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(report.packets.len() as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(report.bytes_sent() as u64, Ordering::Relaxed);
        self.ghost_updates.fetch_add(report.ghost_updates() as u64, Ordering::Relaxed);
    }

    /// Replace the client-side totals; `stats` are cumulative per replica
    pub fn record_replicas<'a>(&self, stats: impl IntoIterator<Item = &'a ReplicaStats>) {
        let (mut warps, mut interpolations, mut reconciliations) = (0, 0, 0);
        for s in stats {
            warps += s.warps;
            interpolations += s.interpolations;
            reconciliations += s.reconciliations;
        }
        self.warps.store(warps, Ordering::Relaxed);
        self.interpolations.store(interpolations, Ordering::Relaxed);
        self.reconciliations.store(reconciliations, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("ship_sync_ships_alive", "Ships not destroyed", "gauge",
            self.ships_alive.load(Ordering::Relaxed));
        metric!("ship_sync_connections_active", "Connected clients", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("ship_sync_moves_applied_total", "Client moves simulated", "counter",
            self.moves_applied.load(Ordering::Relaxed));
        metric!("ship_sync_kills_total", "Ships destroyed", "counter",
            self.kills.load(Ordering::Relaxed));
        metric!("ship_sync_respawns_total", "Ships respawned", "counter",
            self.respawns.load(Ordering::Relaxed));

        metric!("ship_sync_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("ship_sync_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("ship_sync_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("ship_sync_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("ship_sync_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("ship_sync_packets_sent_total", "Ghost packets written", "counter",
            self.packets_sent.load(Ordering::Relaxed));
        metric!("ship_sync_bytes_sent_total", "Ghost packet bytes written", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("ship_sync_ghost_updates_total", "Ship updates written", "counter",
            self.ghost_updates.load(Ordering::Relaxed));

        metric!("ship_sync_client_warps_total", "Replica positions snapped", "counter",
            self.warps.load(Ordering::Relaxed));
        metric!("ship_sync_client_interpolations_total", "Replica interpolations started", "counter",
            self.interpolations.load(Ordering::Relaxed));
        metric!("ship_sync_client_reconciliations_total", "Control states reconciled", "counter",
            self.reconciliations.load(Ordering::Relaxed));

        metric!("ship_sync_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON form of the same counters
    pub fn to_json(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "simulation": {
                "ships_alive": load(&self.ships_alive),
                "connections": load(&self.connections_active),
                "moves_applied": load(&self.moves_applied),
                "kills": load(&self.kills),
                "respawns": load(&self.respawns),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "replication": {
                "packets_sent": load(&self.packets_sent),
                "bytes_sent": load(&self.bytes_sent),
                "ghost_updates": load(&self.ghost_updates),
                "warps": load(&self.warps),
                "interpolations": load(&self.interpolations),
                "reconciliations": load(&self.reconciliations),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ghost::OutgoingPacket;
    use uuid::Uuid;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ships_alive.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_record_tick_report() {
        let metrics = Metrics::new();
        let report = TickReport {
            ships_alive: 3,
            moves_applied: 5,
            kills: 1,
            packets: vec![
                (Uuid::new_v4(), OutgoingPacket { bytes: vec![0; 40], ghost_updates: 2, removals: 0 }),
                (Uuid::new_v4(), OutgoingPacket { bytes: vec![0; 10], ghost_updates: 1, removals: 1 }),
            ],
            ..TickReport::default()
        };
        metrics.record_tick(&report);
        metrics.record_tick(&report);

        assert_eq!(metrics.ships_alive.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.moves_applied.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.packets_sent.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.ghost_updates.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_record_replicas_replaces_totals() {
        let metrics = Metrics::new();
        let a = ReplicaStats { warps: 2, interpolations: 5, reconciliations: 7, ..Default::default() };
        let b = ReplicaStats { warps: 1, ..Default::default() };
        metrics.record_replicas([&a, &b]);
        metrics.record_replicas([&a, &b]);
        assert_eq!(metrics.warps.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.interpolations.load(Ordering::Relaxed), 5);
        assert_eq!(metrics.reconciliations.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.ships_alive.store(12, Ordering::Relaxed);
        let output = metrics.to_prometheus();

        assert!(output.contains("ship_sync_ships_alive 12"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.kills.store(4, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["simulation"]["kills"], 4);
        assert!(value["replication"].is_object());
    }
}
