//! # Instance Launcher
//!
//! Assembles a [`ModuleInstance`] from its collaborators and starts it.
//! Given a [`TelemetryConfig`], the builder also installs the process-wide
//! log subscriber; hosts that set up `tracing` themselves leave it out.
//!
//! ```rust,ignore
//! let instance = InstanceBuilder::new(Thermometer::default())
//!     .logging(TelemetryConfig::for_module("thermometer"))
//!     .config(Arc::new(TomlConfigProvider::load("fabric.toml")?))
//!     .heartbeat(group.endpoint())
//!     .transport(bus.transport())
//!     .options(StartOptions::default().with_auto_enable(true))
//!     .launch()?;
//! instance.join_execution();
//! ```

use std::sync::Arc;

use fabric_telemetry::{init_logging, TelemetryConfig, TelemetryError};
use mf_01_peer_discovery::{DiscoveryConfig, HeartbeatTransport};
use shared_bus::MessageTransport;
use shared_types::{ConfigProvider, StaticConfigProvider};
use tracing::{debug, info};

use crate::errors::StartError;
use crate::instance::{ModuleInstance, StartOptions};
use crate::module::Module;

/// Builder for a started [`ModuleInstance`].
pub struct InstanceBuilder<M: Module> {
    module: M,
    config: Option<Arc<dyn ConfigProvider>>,
    heartbeat: Option<Arc<dyn HeartbeatTransport>>,
    transport: Option<Arc<dyn MessageTransport>>,
    discovery: Option<DiscoveryConfig>,
    logging: Option<TelemetryConfig>,
    options: StartOptions,
}

impl<M: Module> InstanceBuilder<M> {
    #[must_use]
    pub fn new(module: M) -> Self {
        Self {
            module,
            config: None,
            heartbeat: None,
            transport: None,
            discovery: None,
            logging: None,
            options: StartOptions::default(),
        }
    }

    /// Configuration source. Defaults to an empty provider.
    #[must_use]
    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = Some(config);
        self
    }

    /// Heartbeat transport. With the `network` feature a UDP multicast
    /// socket is opened from configuration when none is given.
    #[must_use]
    pub fn heartbeat(mut self, heartbeat: Arc<dyn HeartbeatTransport>) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Message transport. Required.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the discovery tunables read from configuration.
    #[must_use]
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Install the global log subscriber on build. A subscriber that is
    /// already installed (another instance in this process) is kept.
    #[must_use]
    pub fn logging(mut self, logging: TelemetryConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    #[must_use]
    pub fn options(mut self, options: StartOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the instance without starting it.
    ///
    /// # Errors
    ///
    /// `Missing` if no message transport (or, without `network`, no
    /// heartbeat transport) was given; `Heartbeat` if the multicast socket
    /// cannot be opened; `Logging` for a bad log filter directive.
    pub fn build(self) -> Result<(ModuleInstance, StartOptions), StartError> {
        if let Some(logging) = &self.logging {
            install_logging(logging)?;
        }
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(StaticConfigProvider::new()));
        let transport = self.transport.ok_or(StartError::Missing("message transport"))?;
        let heartbeat = match self.heartbeat {
            Some(heartbeat) => heartbeat,
            None => default_heartbeat(config.as_ref())?,
        };
        let discovery = self
            .discovery
            .unwrap_or_else(|| DiscoveryConfig::from_config(config.as_ref()));
        debug!(
            module = %self.module.name(),
            broadcast_ms = discovery.broadcast_interval.as_millis(),
            "Instance assembled"
        );

        let instance = ModuleInstance::with_discovery_config(self.module, config, heartbeat, transport, discovery);
        Ok((instance, self.options))
    }

    /// Build and start the instance.
    ///
    /// # Errors
    ///
    /// Anything [`build`](Self::build) or [`ModuleInstance::start`] returns.
    pub fn launch(self) -> Result<ModuleInstance, StartError> {
        let (instance, options) = self.build()?;
        instance.start(options)?;
        Ok(instance)
    }
}

fn install_logging(config: &TelemetryConfig) -> Result<(), StartError> {
    match init_logging(config) {
        Ok(()) => Ok(()),
        Err(TelemetryError::AlreadyInitialized(reason)) => {
            info!(service = %config.service_name, %reason, "Keeping installed log subscriber");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "network")]
fn default_heartbeat(config: &dyn ConfigProvider) -> Result<Arc<dyn HeartbeatTransport>, StartError> {
    let socket = mf_01_peer_discovery::UdpMulticastTransport::from_config(config)?;
    debug!(group = %socket.group(), "Opened multicast heartbeat socket");
    Ok(Arc::new(socket))
}

#[cfg(not(feature = "network"))]
fn default_heartbeat(_config: &dyn ConfigProvider) -> Result<Arc<dyn HeartbeatTransport>, StartError> {
    Err(StartError::Missing("heartbeat transport"))
}
