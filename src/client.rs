//! Aggregate client and its builder.
//!
//! A [Client] bundles the four typed service clients behind one connection
//! scope. Instances are built with [ClientBuilder] and are cheap to clone,
//! clones share the connection and the sub-clients.

use std::collections::HashMap;
use std::sync::Arc;

use slog::{Logger, o};
use tonic::codec::CompressionEncoding;
use tonic::transport::ClientTlsConfig;

use crate::UtxorpcResult;
use crate::chain::Chain;
use crate::connection::{ChannelOptions, Connection, ConnectionConfig, ConnectionGuard};
use crate::query_client::QueryClient;
use crate::submit_client::SubmitClient;
use crate::sync_client::SyncClient;
use crate::transport::{GrpcTransport, metadata_from_pairs};
use crate::watch_client::WatchClient;

/// Aggregate client for one UTxO RPC endpoint, generic over the chain
/// adapter.
///
/// Every remote operation must run inside a
/// [with_connection][Client::with_connection] scope.
pub struct Client<C: Chain> {
    connection: Arc<Connection>,
    sync: Arc<SyncClient<C>>,
    query: Arc<QueryClient<C>>,
    submit: Arc<SubmitClient>,
    watch: Arc<WatchClient<C>>,
}

impl<C: Chain> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            sync: self.sync.clone(),
            query: self.query.clone(),
            submit: self.submit.clone(),
            watch: self.watch.clone(),
        }
    }
}

impl<C: Chain> Client<C> {
    pub(crate) fn new(
        connection: Arc<Connection>,
        sync: Arc<SyncClient<C>>,
        query: Arc<QueryClient<C>>,
        submit: Arc<SubmitClient>,
        watch: Arc<WatchClient<C>>,
    ) -> Self {
        Self {
            connection,
            sync,
            query,
            submit,
            watch,
        }
    }

    /// Run `body` inside a connection scope.
    ///
    /// The channel is opened on entry and dropped on every exit path
    /// (normal return, error, cancellation). Scopes cannot be nested.
    pub async fn with_connection<T, F>(&self, body: F) -> UtxorpcResult<T>
    where
        F: AsyncFnOnce(Client<C>) -> UtxorpcResult<T>,
    {
        self.connection.open()?;
        let _guard = ConnectionGuard::new(&self.connection);

        body(self.clone()).await
    }

    /// Tell whether a connection scope is currently active.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Get the client of the chain synchronization service.
    pub fn sync_client(&self) -> Arc<SyncClient<C>> {
        self.sync.clone()
    }

    /// Get the client of the ledger query service.
    pub fn query_client(&self) -> Arc<QueryClient<C>> {
        self.query.clone()
    }

    /// Get the client of the transaction submit service.
    pub fn submit_client(&self) -> Arc<SubmitClient> {
        self.submit.clone()
    }

    /// Get the client of the transaction watch service.
    pub fn watch_client(&self) -> Arc<WatchClient<C>> {
        self.watch.clone()
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

/// Builder of [Client] instances.
///
/// Configuration is validated at build time: a malformed metadata entry
/// fails [build][ClientBuilder::build], never a later call.
pub struct ClientBuilder {
    uri: String,
    secure: bool,
    tls: Option<ClientTlsConfig>,
    options: ChannelOptions,
    metadata: HashMap<String, String>,
    compression: Option<CompressionEncoding>,
    logger: Option<Logger>,
}

impl ClientBuilder {
    /// Constructs a new `ClientBuilder` for the given endpoint.
    ///
    /// `uri` is `host[:port]` or a full url. TLS with the platform roots is
    /// the default, see [insecure][Self::insecure] and
    /// [with_tls_config][Self::with_tls_config].
    pub fn endpoint(uri: &str) -> ClientBuilder {
        Self {
            uri: uri.to_string(),
            secure: true,
            tls: None,
            options: ChannelOptions::default(),
            metadata: HashMap::new(),
            compression: None,
            logger: None,
        }
    }

    /// Use a plaintext channel.
    pub fn insecure(mut self) -> ClientBuilder {
        self.secure = false;
        self
    }

    /// Use a caller-supplied TLS configuration instead of the platform
    /// roots, implies a secure channel.
    pub fn with_tls_config(mut self, tls: ClientTlsConfig) -> ClientBuilder {
        self.tls = Some(tls);
        self.secure = true;
        self
    }

    /// Set the channel tuning parameters.
    pub fn with_channel_options(mut self, options: ChannelOptions) -> ClientBuilder {
        self.options = options;
        self
    }

    /// Add one metadata header sent with every request (an API key, for
    /// instance).
    pub fn add_metadata(mut self, key: &str, value: &str) -> ClientBuilder {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Set all metadata headers sent with every request, replacing any
    /// previously added entry.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> ClientBuilder {
        self.metadata = metadata;
        self
    }

    /// Compress request and response bodies with the given encoding.
    pub fn with_compression(mut self, encoding: CompressionEncoding) -> ClientBuilder {
        self.compression = Some(encoding);
        self
    }

    /// Set the Logger.
    pub fn with_logger(mut self, logger: Logger) -> ClientBuilder {
        self.logger = Some(logger);
        self
    }

    /// Returns an instance of [Client] for the chain adapter `C`.
    pub fn build<C: Chain>(self) -> UtxorpcResult<Client<C>> {
        let logger = self
            .logger
            .unwrap_or_else(|| Logger::root(slog::Discard, o!()));
        let metadata = metadata_from_pairs(&self.metadata)?;

        let connection = Arc::new(Connection::new(
            ConnectionConfig {
                uri: self.uri,
                secure: self.secure,
                tls: self.tls,
                options: self.options,
            },
            logger.clone(),
        ));
        let transport = Arc::new(GrpcTransport::new(
            connection.clone(),
            metadata,
            self.compression,
            logger.new(o!("src" => "grpc_transport")),
        ));

        Ok(Client::new(
            connection,
            Arc::new(SyncClient::new(transport.clone(), &logger)),
            Arc::new(QueryClient::new(transport.clone(), &logger)),
            Arc::new(SubmitClient::new(transport.clone(), &logger)),
            Arc::new(WatchClient::new(transport, &logger)),
        ))
    }

    /// Returns an instance of the blocking [Client][crate::blocking::Client]
    /// for the chain adapter `C`.
    pub fn build_blocking<C: Chain>(self) -> UtxorpcResult<crate::blocking::Client<C>> {
        crate::blocking::Client::new(self.build()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::CardanoChain;
    use crate::test_utils::TestLogger;

    use super::*;

    #[test]
    fn build_validates_metadata_eagerly() {
        ClientBuilder::endpoint("localhost:50051")
            .add_metadata("bad key", "value")
            .build::<CardanoChain>()
            .map(|_| ())
            .expect_err("a malformed metadata key should fail the build");
    }

    #[tokio::test]
    async fn with_connection_scopes_the_channel_to_the_body() {
        let client = ClientBuilder::endpoint("localhost:50051")
            .insecure()
            .with_logger(TestLogger::stdout())
            .build::<CardanoChain>()
            .unwrap();
        assert!(!client.is_connected());

        let result = client
            .with_connection(async |scoped| {
                assert!(scoped.is_connected());
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(42, result);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn with_connection_tears_down_the_channel_on_error() {
        let client = ClientBuilder::endpoint("localhost:50051")
            .insecure()
            .build::<CardanoChain>()
            .unwrap();

        client
            .with_connection(async |_| -> UtxorpcResult<()> {
                Err(anyhow::anyhow!("body failed"))
            })
            .await
            .expect_err("the body error should propagate");

        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn nested_connection_scopes_are_rejected() {
        let client = ClientBuilder::endpoint("localhost:50051")
            .insecure()
            .build::<CardanoChain>()
            .unwrap();

        client
            .with_connection(async |scoped| {
                scoped
                    .with_connection(async |_| Ok(()))
                    .await
                    .expect_err("nested scope should fail");
                Ok(())
            })
            .await
            .unwrap();

        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn operations_outside_a_scope_fail_before_any_network_activity() {
        let client = ClientBuilder::endpoint("localhost:50051")
            .insecure()
            .build::<CardanoChain>()
            .unwrap();

        let error = client
            .sync_client()
            .fetch_block(&[crate::entities::ChainPoint::new(1, vec![0u8; 32])])
            .await
            .unwrap_err();

        assert!(error.to_string().contains("Not connected"));
    }
}
