use crate::game::constants::tick::TICK_RATE;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation rate in Hz
    pub tick_rate: u32,
    /// Simulated clients driven by the loopback demo
    pub sim_clients: usize,
    /// One-way latency applied to loopback packets (ms)
    pub sim_latency_ms: u64,
    /// Clients freeze moving ships after this much server silence (ms)
    pub lost_contact_ms: u64,
    /// Port for the metrics endpoint
    pub metrics_port: u16,
    /// Stop after this many seconds; run until ctrl-c when unset
    pub run_seconds: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            sim_clients: 4,
            sim_latency_ms: 60,
            lost_contact_ms: 1500,
            metrics_port: 9090,
            run_seconds: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("TICK_RATE") {
            if let Ok(parsed) = rate.parse::<u32>() {
                if (1..=240).contains(&parsed) {
                    config.tick_rate = parsed;
                } else {
                    tracing::warn!("TICK_RATE must be 1-240, using default");
                }
            } else {
                tracing::warn!("Invalid TICK_RATE '{}', using default", rate);
            }
        }

        if let Ok(clients) = std::env::var("SIM_CLIENTS") {
            if let Ok(parsed) = clients.parse::<usize>() {
                if parsed <= 512 {
                    config.sim_clients = parsed;
                } else {
                    tracing::warn!("SIM_CLIENTS must be 0-512, using default");
                }
            } else {
                tracing::warn!("Invalid SIM_CLIENTS '{}', using default", clients);
            }
        }

        if let Ok(latency) = std::env::var("SIM_LATENCY_MS") {
            match latency.parse::<u64>() {
                Ok(parsed) => config.sim_latency_ms = parsed,
                Err(_) => tracing::warn!("Invalid SIM_LATENCY_MS '{}', using default", latency),
            }
        }

        if let Ok(lost) = std::env::var("LOST_CONTACT_MS") {
            match lost.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.lost_contact_ms = parsed,
                _ => tracing::warn!("Invalid LOST_CONTACT_MS '{}', using default", lost),
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.metrics_port = parsed;
                } else {
                    tracing::warn!("METRICS_PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        if let Ok(seconds) = std::env::var("RUN_SECONDS") {
            match seconds.parse::<u64>() {
                Ok(parsed) => config.run_seconds = Some(parsed),
                Err(_) => tracing::warn!("Invalid RUN_SECONDS '{}', running until stopped", seconds),
            }
        }

        config
    }

    /// Tick length in milliseconds
    #[inline]
    pub fn tick_ms(&self) -> u32 {
        1000 / self.tick_rate.max(1)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err("tick_rate must be 1-240".to_string());
        }
        if self.metrics_port == 0 {
            return Err("metrics_port cannot be 0".to_string());
        }
        if self.lost_contact_ms <= self.sim_latency_ms * 2 {
            return Err("lost_contact_ms must exceed the round trip latency".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.tick_ms(), 33);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.run_seconds.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_validate_rejects_short_lost_contact() {
        let config = ServerConfig {
            sim_latency_ms: 800,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
