use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub polling: PollingSettings,
    pub smoothing: SmoothingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    /// Usually left empty; the host sends it with `wakeupPlugin`.
    #[serde(default)]
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSettings {
    pub chart_step_secs: u64,
    pub new_file_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothingSettings {
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub filter: String,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PollingSettings {
    pub fn new_file_interval(&self) -> Duration {
        Duration::from_millis(self.new_file_interval_ms)
    }
}

impl SmoothingSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn defaults() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.bind", "0.0.0.0:8080")?
        .set_default("backend.timeout_ms", 10_000)?
        .set_default("polling.chart_step_secs", 5)?
        .set_default("polling.new_file_interval_ms", 10_000)?
        .set_default("smoothing.debounce_ms", 500)?
        .set_default("logging.filter", "info")?)
}

/// Defaults, then `config/panel.*` if present, then `SCALAR_PANEL__*` env vars.
pub fn load_panel_config() -> anyhow::Result<PanelConfig> {
    let settings = defaults()?
        .add_source(config::File::with_name("config/panel").required(false))
        .add_source(
            config::Environment::with_prefix("SCALAR_PANEL")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: PanelConfig = defaults().unwrap().build().unwrap().try_deserialize().unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.backend.base_url, None);
        assert_eq!(config.backend.timeout(), Duration::from_secs(10));
        assert_eq!(config.polling.chart_step_secs, 5);
        assert_eq!(config.polling.new_file_interval(), Duration::from_secs(10));
        assert_eq!(config.smoothing.debounce(), Duration::from_millis(500));
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_file_source_overrides_defaults() {
        let config: PanelConfig = defaults()
            .unwrap()
            .add_source(config::File::from_str(
                "[backend]\nbase_url = \"http://127.0.0.1:9000\"\n[polling]\nchart_step_secs = 2\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.backend.base_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.polling.chart_step_secs, 2);
        assert_eq!(config.backend.timeout_ms, 10_000);
    }
}
