//! Server configuration.
//!
//! Bind addresses come from the command line, frontend endpoints from the
//! environment, both with working defaults so the server starts bare.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WEARABLE_IP: &str = "0.0.0.0";
pub const DEFAULT_WEARABLE_PORT: u16 = 53397;
pub const DEFAULT_APP_IP: &str = "0.0.0.0";
pub const DEFAULT_APP_EGRESS_PORT: u16 = 43397;
/// The app ingress port is a fixed protocol constant, not configurable.
pub const APP_INGRESS_PORT: u16 = 43396;

pub const DEFAULT_DATA_URL: &str = "http://localhost:8788/api/wearables";
pub const DEFAULT_CONTROL_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_PRESET_FILE: &str = "wearable_colors.json";
pub const BRIDGE_TIMEOUT: Duration = Duration::from_secs(2);

pub const ENV_DATA_URL: &str = "FRONTEND_REST";
pub const ENV_SIM_URL: &str = "FRONTEND_SIM_REST";
pub const ENV_CONTROL_BIND: &str = "FRONTEND_CTRL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {role} address: {value}")]
    InvalidAddress { role: &'static str, value: String },
    #[error("invalid {role} port: {value}")]
    InvalidPort { role: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub wearable_bind: SocketAddr,
    pub app_egress_bind: SocketAddr,
    pub app_ingress_bind: SocketAddr,
    pub simulated_enabled: bool,
    pub preset_path: PathBuf,
    pub frontend_data_url: String,
    pub frontend_sim_url: String,
    pub control_bind: SocketAddr,
    pub bridge_timeout: Duration,
}

impl ServerConfig {
    /// Builds the config from command-line bind settings plus environment
    /// overrides for the frontend endpoints.
    pub fn from_args(
        wearable_ip: &str,
        wearable_port: &str,
        app_ip: &str,
        app_port: &str,
        simulated_enabled: bool,
    ) -> Result<Self, ConfigError> {
        let wearable_bind = build_addr("wearable", wearable_ip, wearable_port)?;
        let app_egress_bind = build_addr("app", app_ip, app_port)?;
        let app_ingress_bind = SocketAddr::new(app_egress_bind.ip(), APP_INGRESS_PORT);

        let frontend_data_url =
            std::env::var(ENV_DATA_URL).unwrap_or_else(|_| DEFAULT_DATA_URL.to_string());
        let frontend_sim_url = std::env::var(ENV_SIM_URL)
            .unwrap_or_else(|_| derive_sim_url(&frontend_data_url));

        let control_value =
            std::env::var(ENV_CONTROL_BIND).unwrap_or_else(|_| DEFAULT_CONTROL_BIND.to_string());
        let control_bind: SocketAddr =
            control_value
                .parse()
                .map_err(|_| ConfigError::InvalidAddress {
                    role: "control",
                    value: control_value,
                })?;

        Ok(Self {
            wearable_bind,
            app_egress_bind,
            app_ingress_bind,
            simulated_enabled,
            preset_path: PathBuf::from(DEFAULT_PRESET_FILE),
            frontend_data_url,
            frontend_sim_url,
            control_bind,
            bridge_timeout: BRIDGE_TIMEOUT,
        })
    }
}

/// The simulator endpoint lives next to the wearable endpoint unless
/// overridden.
pub fn derive_sim_url(data_url: &str) -> String {
    format!("{}/simulated", data_url.trim_end_matches('/'))
}

fn build_addr(role: &'static str, ip: &str, port: &str) -> Result<SocketAddr, ConfigError> {
    let ip: IpAddr = ip.parse().map_err(|_| ConfigError::InvalidAddress {
        role,
        value: ip.to_string(),
    })?;
    let port: u16 = port.parse().map_err(|_| ConfigError::InvalidPort {
        role,
        value: port.to_string(),
    })?;
    Ok(SocketAddr::new(ip, port))
}
