//! Channel lifecycle for a UTxO RPC endpoint.
//!
//! A [Connection] owns the endpoint configuration and a channel slot that is
//! only populated while a connection scope is active. Typed clients obtain
//! the channel through the slot and fail with
//! [NotConnected][crate::transport::TransportError::NotConnected] outside a
//! scope, before any network activity.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context;
use slog::{Logger, debug};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::UtxorpcResult;
use crate::transport::TransportError;

/// Tuning parameters applied to the underlying channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelOptions {
    /// Time limit for establishing the underlying connection
    pub connect_timeout: Option<Duration>,

    /// Time limit applied to each request
    pub request_timeout: Option<Duration>,

    /// TCP keepalive interval
    pub tcp_keepalive: Option<Duration>,

    /// HTTP/2 keepalive ping interval
    pub http2_keepalive_interval: Option<Duration>,
}

/// Endpoint configuration of a [Connection].
#[derive(Clone)]
pub(crate) struct ConnectionConfig {
    /// `host[:port]` or a full url; the scheme is derived from `secure`
    /// when absent.
    pub uri: String,

    /// Use TLS for the channel
    pub secure: bool,

    /// Custom TLS configuration; `None` selects the platform roots
    pub tls: Option<ClientTlsConfig>,

    /// Channel tuning parameters
    pub options: ChannelOptions,
}

impl ConnectionConfig {
    fn url(&self) -> String {
        if self.uri.contains("://") {
            self.uri.clone()
        } else if self.secure {
            format!("https://{}", self.uri)
        } else {
            format!("http://{}", self.uri)
        }
    }
}

/// Owns one channel for a given endpoint, scoped to a single acquisition.
pub struct Connection {
    config: ConnectionConfig,
    channel: RwLock<Option<Channel>>,
    logger: Logger,
}

impl Connection {
    /// [Connection] factory
    pub(crate) fn new(config: ConnectionConfig, logger: Logger) -> Self {
        Self {
            config,
            channel: RwLock::new(None),
            logger,
        }
    }

    /// Populate the channel slot.
    ///
    /// The channel is created lazily: no I/O happens here, connectivity
    /// failures surface at the call that first uses the channel. Opening an
    /// already open connection is an error, a scope owns its channel
    /// exclusively.
    pub(crate) fn open(&self) -> UtxorpcResult<()> {
        let mut slot = self
            .channel
            .write()
            .map_err(|_| anyhow::anyhow!("Connection state poisoned"))?;
        if slot.is_some() {
            anyhow::bail!("Already connected: connection scopes cannot be nested");
        }

        debug!(self.logger, "Opening channel"; "url" => self.config.url());
        *slot = Some(self.build_endpoint()?.connect_lazy());

        Ok(())
    }

    /// Clear the channel slot, dropping the channel.
    pub(crate) fn close(&self) {
        if let Ok(mut slot) = self.channel.write() {
            if slot.take().is_some() {
                debug!(self.logger, "Closed channel"; "url" => self.config.url());
            }
        }
    }

    /// Get the channel of the active scope.
    pub(crate) fn channel(&self) -> Result<Channel, TransportError> {
        self.channel
            .read()
            .map_err(|_| TransportError::NotConnected)?
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    /// Tell whether a connection scope is currently active.
    pub fn is_connected(&self) -> bool {
        self.channel.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn build_endpoint(&self) -> UtxorpcResult<Endpoint> {
        let url = self.config.url();
        let mut endpoint = Endpoint::from_shared(url.clone())
            .with_context(|| format!("Invalid endpoint url: '{url}'"))?;

        if self.config.secure {
            let tls = self
                .config
                .tls
                .clone()
                .unwrap_or_else(|| ClientTlsConfig::new().with_native_roots());
            endpoint = endpoint
                .tls_config(tls)
                .with_context(|| "Invalid TLS configuration")?;
        }

        let options = &self.config.options;
        if let Some(timeout) = options.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }
        if let Some(timeout) = options.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }
        if options.tcp_keepalive.is_some() {
            endpoint = endpoint.tcp_keepalive(options.tcp_keepalive);
        }
        if let Some(interval) = options.http2_keepalive_interval {
            endpoint = endpoint.http2_keep_alive_interval(interval);
        }

        Ok(endpoint)
    }
}

/// Guard clearing the channel slot when a connection scope exits, whatever
/// the exit path (return, error or cancellation).
pub(crate) struct ConnectionGuard<'a> {
    connection: &'a Connection,
}

impl<'a> ConnectionGuard<'a> {
    pub(crate) fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.connection.close();
    }
}
