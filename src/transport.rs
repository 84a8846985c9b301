//! Mechanisms to exchange messages with a UTxO RPC endpoint.
//!
//! One narrow trait per remote service abstracts how the communication is
//! done ([SyncTransport], [QueryTransport], [SubmitTransport],
//! [WatchTransport]); the typed clients only depend on those traits. The
//! gRPC implementation backing all four is [GrpcTransport].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use slog::{Logger, debug};
use thiserror::Error;
use tonic::Request;
use tonic::codec::CompressionEncoding;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::Channel;

use utxorpc_spec::utxorpc::v1alpha::query::query_service_client::QueryServiceClient;
use utxorpc_spec::utxorpc::v1alpha::query::{
    ReadParamsRequest, ReadParamsResponse, ReadUtxosRequest, ReadUtxosResponse,
    SearchUtxosRequest, SearchUtxosResponse,
};
use utxorpc_spec::utxorpc::v1alpha::submit::submit_service_client::SubmitServiceClient;
use utxorpc_spec::utxorpc::v1alpha::submit::{
    SubmitTxRequest, SubmitTxResponse, WaitForTxRequest, WaitForTxResponse,
    WatchMempoolRequest, WatchMempoolResponse,
};
use utxorpc_spec::utxorpc::v1alpha::sync::sync_service_client::SyncServiceClient;
use utxorpc_spec::utxorpc::v1alpha::sync::{
    DumpHistoryRequest, DumpHistoryResponse, FetchBlockRequest, FetchBlockResponse,
    FollowTipRequest, FollowTipResponse,
};
use utxorpc_spec::utxorpc::v1alpha::watch::watch_service_client::WatchServiceClient;
use utxorpc_spec::utxorpc::v1alpha::watch::{WatchTxRequest, WatchTxResponse};

use crate::UtxorpcResult;
use crate::connection::Connection;

/// A server-driven sequence of wire frames.
///
/// Errors terminate the sequence and surface on the pull that encounters
/// them, never silently dropped.
pub type WireStream<T> = BoxStream<'static, Result<T, TransportError>>;

/// Error tied with the transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    /// Error raised when an operation runs outside an active connection
    /// scope. Raised locally, before any network activity.
    #[error("Not connected: operations must run inside a connection scope")]
    NotConnected,

    /// Error raised by the remote procedure call, propagated unmodified
    /// from the underlying gRPC status.
    #[error("Rpc call failed: {0}")]
    Rpc(#[from] tonic::Status),
}

/// Remote procedures of the chain synchronization service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch blocks by reference points.
    async fn fetch_block(
        &self,
        request: FetchBlockRequest,
    ) -> Result<FetchBlockResponse, TransportError>;

    /// Fetch a contiguous range of historical blocks.
    async fn dump_history(
        &self,
        request: DumpHistoryRequest,
    ) -> Result<DumpHistoryResponse, TransportError>;

    /// Open the tip-following server stream.
    async fn follow_tip(
        &self,
        request: FollowTipRequest,
    ) -> Result<WireStream<FollowTipResponse>, TransportError>;
}

/// Remote procedures of the ledger query service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Read transaction outputs by key.
    async fn read_utxos(
        &self,
        request: ReadUtxosRequest,
    ) -> Result<ReadUtxosResponse, TransportError>;

    /// Search transaction outputs matching a predicate, one page per call.
    async fn search_utxos(
        &self,
        request: SearchUtxosRequest,
    ) -> Result<SearchUtxosResponse, TransportError>;

    /// Read the current blockchain parameters.
    async fn read_params(
        &self,
        request: ReadParamsRequest,
    ) -> Result<ReadParamsResponse, TransportError>;
}

/// Remote procedures of the transaction submit service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmitTransport: Send + Sync {
    /// Submit signed transactions.
    async fn submit_tx(
        &self,
        request: SubmitTxRequest,
    ) -> Result<SubmitTxResponse, TransportError>;

    /// Open the confirmation-stage server stream for submitted transactions.
    async fn wait_for_tx(
        &self,
        request: WaitForTxRequest,
    ) -> Result<WireStream<WaitForTxResponse>, TransportError>;

    /// Open the mempool-watching server stream.
    async fn watch_mempool(
        &self,
        request: WatchMempoolRequest,
    ) -> Result<WireStream<WatchMempoolResponse>, TransportError>;
}

/// Remote procedures of the transaction watch service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatchTransport: Send + Sync {
    /// Open the transaction-watching server stream.
    async fn watch_tx(
        &self,
        request: WatchTxRequest,
    ) -> Result<WireStream<WatchTxResponse>, TransportError>;
}

/// Responsible for the gRPC transport: channel access, per-call metadata
/// and wire compression.
pub struct GrpcTransport {
    connection: Arc<Connection>,
    metadata: MetadataMap,
    compression: Option<CompressionEncoding>,
    logger: Logger,
}

impl GrpcTransport {
    /// Constructs a new `GrpcTransport`
    pub(crate) fn new(
        connection: Arc<Connection>,
        metadata: MetadataMap,
        compression: Option<CompressionEncoding>,
        logger: Logger,
    ) -> Self {
        Self {
            connection,
            metadata,
            compression,
            logger,
        }
    }

    fn request<T>(&self, message: T) -> Request<T> {
        build_request(message, &self.metadata)
    }

    fn sync_service(&self) -> Result<SyncServiceClient<Channel>, TransportError> {
        let mut client = SyncServiceClient::new(self.connection.channel()?);
        if let Some(encoding) = self.compression {
            client = client.send_compressed(encoding).accept_compressed(encoding);
        }
        Ok(client)
    }

    fn query_service(&self) -> Result<QueryServiceClient<Channel>, TransportError> {
        let mut client = QueryServiceClient::new(self.connection.channel()?);
        if let Some(encoding) = self.compression {
            client = client.send_compressed(encoding).accept_compressed(encoding);
        }
        Ok(client)
    }

    fn submit_service(&self) -> Result<SubmitServiceClient<Channel>, TransportError> {
        let mut client = SubmitServiceClient::new(self.connection.channel()?);
        if let Some(encoding) = self.compression {
            client = client.send_compressed(encoding).accept_compressed(encoding);
        }
        Ok(client)
    }

    fn watch_service(&self) -> Result<WatchServiceClient<Channel>, TransportError> {
        let mut client = WatchServiceClient::new(self.connection.channel()?);
        if let Some(encoding) = self.compression {
            client = client.send_compressed(encoding).accept_compressed(encoding);
        }
        Ok(client)
    }
}

#[async_trait]
impl SyncTransport for GrpcTransport {
    async fn fetch_block(
        &self,
        request: FetchBlockRequest,
    ) -> Result<FetchBlockResponse, TransportError> {
        debug!(self.logger, "FetchBlock"; "refs" => request.r#ref.len());
        let response = self.sync_service()?.fetch_block(self.request(request)).await?;
        Ok(response.into_inner())
    }

    async fn dump_history(
        &self,
        request: DumpHistoryRequest,
    ) -> Result<DumpHistoryResponse, TransportError> {
        debug!(self.logger, "DumpHistory"; "max_items" => request.max_items);
        let response = self.sync_service()?.dump_history(self.request(request)).await?;
        Ok(response.into_inner())
    }

    async fn follow_tip(
        &self,
        request: FollowTipRequest,
    ) -> Result<WireStream<FollowTipResponse>, TransportError> {
        debug!(self.logger, "FollowTip"; "intersect" => request.intersect.len());
        let stream = self.sync_service()?.follow_tip(self.request(request)).await?.into_inner();
        Ok(stream.map(|frame| frame.map_err(TransportError::from)).boxed())
    }
}

#[async_trait]
impl QueryTransport for GrpcTransport {
    async fn read_utxos(
        &self,
        request: ReadUtxosRequest,
    ) -> Result<ReadUtxosResponse, TransportError> {
        debug!(self.logger, "ReadUtxos"; "keys" => request.keys.len());
        let response = self.query_service()?.read_utxos(self.request(request)).await?;
        Ok(response.into_inner())
    }

    async fn search_utxos(
        &self,
        request: SearchUtxosRequest,
    ) -> Result<SearchUtxosResponse, TransportError> {
        debug!(self.logger, "SearchUtxos"; "max_items" => request.max_items);
        let response = self.query_service()?.search_utxos(self.request(request)).await?;
        Ok(response.into_inner())
    }

    async fn read_params(
        &self,
        request: ReadParamsRequest,
    ) -> Result<ReadParamsResponse, TransportError> {
        debug!(self.logger, "ReadParams");
        let response = self.query_service()?.read_params(self.request(request)).await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl SubmitTransport for GrpcTransport {
    async fn submit_tx(
        &self,
        request: SubmitTxRequest,
    ) -> Result<SubmitTxResponse, TransportError> {
        debug!(self.logger, "SubmitTx"; "txs" => request.tx.len());
        let response = self.submit_service()?.submit_tx(self.request(request)).await?;
        Ok(response.into_inner())
    }

    async fn wait_for_tx(
        &self,
        request: WaitForTxRequest,
    ) -> Result<WireStream<WaitForTxResponse>, TransportError> {
        debug!(self.logger, "WaitForTx"; "refs" => request.r#ref.len());
        let stream = self.submit_service()?.wait_for_tx(self.request(request)).await?.into_inner();
        Ok(stream.map(|frame| frame.map_err(TransportError::from)).boxed())
    }

    async fn watch_mempool(
        &self,
        request: WatchMempoolRequest,
    ) -> Result<WireStream<WatchMempoolResponse>, TransportError> {
        debug!(self.logger, "WatchMempool");
        let stream = self
            .submit_service()?
            .watch_mempool(self.request(request))
            .await?
            .into_inner();
        Ok(stream.map(|frame| frame.map_err(TransportError::from)).boxed())
    }
}

#[async_trait]
impl WatchTransport for GrpcTransport {
    async fn watch_tx(
        &self,
        request: WatchTxRequest,
    ) -> Result<WireStream<WatchTxResponse>, TransportError> {
        debug!(self.logger, "WatchTx"; "intersect" => request.intersect.len());
        let stream = self.watch_service()?.watch_tx(self.request(request)).await?.into_inner();
        Ok(stream.map(|frame| frame.map_err(TransportError::from)).boxed())
    }
}

/// Encode a string map as call metadata, failing on any entry the wire
/// format cannot carry.
pub(crate) fn metadata_from_pairs(pairs: &HashMap<String, String>) -> UtxorpcResult<MetadataMap> {
    let mut metadata = MetadataMap::new();
    for (key, value) in pairs {
        let metadata_key: AsciiMetadataKey = key
            .parse()
            .with_context(|| format!("Invalid metadata key: '{key}'"))?;
        let metadata_value: AsciiMetadataValue = value
            .parse()
            .with_context(|| format!("Invalid metadata value for key '{key}'"))?;
        metadata.insert(metadata_key, metadata_value);
    }

    Ok(metadata)
}

/// Build a request carrying the configured per-call metadata.
///
/// Transport agnostic: the same construction serves both operating modes.
fn build_request<T>(message: T, metadata: &MetadataMap) -> Request<T> {
    let mut request = Request::new(message);
    *request.metadata_mut() = metadata.clone();
    request
}
