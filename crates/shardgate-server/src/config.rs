use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Name of the single logical schema the proxy presents to clients.
    pub logic_schema: String,
    /// Version string advertised in the handshake greeting.
    pub server_version: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    pub listen_addr: String,
}

impl Config {
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.proxy.logic_schema.is_empty() {
            return Err(anyhow::anyhow!("proxy.logic_schema must not be empty"));
        }
        if self.proxy.server_version.is_empty() {
            return Err(anyhow::anyhow!("proxy.server_version must not be empty"));
        }
        if self.server.max_connections == 0 {
            return Err(anyhow::anyhow!("server.max_connections must be positive"));
        }
        Ok(())
    }
}
