//! Typed client for the transaction submit service.
//!
//! Covers raw transaction submission, the confirmation-stage stream and the
//! mempool watch stream.

use std::sync::Arc;

use anyhow::anyhow;
use futures::StreamExt;
use slog::{Logger, debug, o};

use utxorpc_spec::utxorpc::v1alpha::submit::{
    AnyChainTx, SubmitTxRequest, TxInMempool, TxPredicate, WaitForTxRequest,
    WaitForTxResponse, WatchMempoolRequest, WatchMempoolResponse, any_chain_tx,
};

use crate::UtxorpcResult;
use crate::entities::TxStage;
use crate::transport::{SubmitTransport, WireStream};

/// Client for the transaction submit service.
///
/// Transactions are submitted as opaque signed bytes, the server does the
/// decoding. Chain-neutral: no adapter is involved on this path.
pub struct SubmitClient {
    transport: Arc<dyn SubmitTransport>,
    logger: Logger,
}

impl SubmitClient {
    /// Constructs a new `SubmitClient`.
    pub fn new(transport: Arc<dyn SubmitTransport>, logger: &Logger) -> Self {
        Self {
            transport,
            logger: logger.new(o!("src" => "submit_client")),
        }
    }

    /// Submit one signed transaction, returning the server-assigned
    /// reference.
    ///
    /// Empty transaction bytes are an input error, raised before any
    /// request.
    pub async fn submit_tx(&self, tx: &[u8]) -> UtxorpcResult<Vec<u8>> {
        if tx.is_empty() {
            return Err(anyhow!("submit_tx requires non-empty transaction bytes"));
        }
        debug!(self.logger, "Submit tx"; "bytes" => tx.len());

        let request = SubmitTxRequest {
            tx: vec![AnyChainTx {
                r#type: Some(any_chain_tx::Type::Raw(tx.to_vec().into())),
                ..Default::default()
            }],
            ..Default::default()
        };
        let response = self.transport.submit_tx(request).await?;

        response
            .r#ref
            .into_iter()
            .next()
            .map(|tx_ref| tx_ref.to_vec())
            .ok_or_else(|| anyhow!("Server did not assign a reference to the submitted transaction"))
    }

    /// Follow the confirmation stages of a submitted transaction.
    pub async fn wait_for_tx(&self, tx_ref: &[u8]) -> UtxorpcResult<StageStream> {
        if tx_ref.is_empty() {
            return Err(anyhow!("wait_for_tx requires a non-empty transaction reference"));
        }
        debug!(self.logger, "Wait for tx"; "ref" => hex::encode(tx_ref));

        let request = WaitForTxRequest {
            r#ref: vec![tx_ref.to_vec().into()],
            ..Default::default()
        };
        let stream = self.transport.wait_for_tx(request).await?;

        Ok(StageStream {
            stream,
            logger: self.logger.clone(),
        })
    }

    /// Watch the transactions entering the mempool, restricted to those
    /// matching `predicate` (`None` matches all).
    pub async fn watch_mempool(
        &self,
        predicate: Option<TxPredicate>,
    ) -> UtxorpcResult<MempoolStream> {
        debug!(self.logger, "Watch mempool"; "filtered" => predicate.is_some());

        let request = WatchMempoolRequest {
            predicate,
            ..Default::default()
        };
        let stream = self.transport.watch_mempool(request).await?;

        Ok(MempoolStream {
            stream,
            logger: self.logger.clone(),
        })
    }
}

/// A stream of confirmation stages for one submitted transaction.
pub struct StageStream {
    stream: WireStream<WaitForTxResponse>,
    logger: Logger,
}

impl StageStream {
    /// Suspend until the transaction reaches its next confirmation stage.
    ///
    /// Returns `None` when the server ends the stream, which a server
    /// typically does after [Confirmed][TxStage::Confirmed].
    pub async fn next_stage(&mut self) -> Option<UtxorpcResult<TxStage>> {
        match self.stream.next().await? {
            Ok(frame) => {
                let stage = TxStage::from(frame.stage);
                debug!(self.logger, "Tx stage"; "stage" => ?stage);
                Some(Ok(stage))
            }
            Err(error) => Some(Err(error.into())),
        }
    }
}

/// A stream of transactions entering the mempool.
///
/// Entries are the wire [TxInMempool] messages, passed through untouched.
pub struct MempoolStream {
    stream: WireStream<WatchMempoolResponse>,
    logger: Logger,
}

impl MempoolStream {
    /// Suspend until the next matching transaction enters the mempool.
    ///
    /// Frames carrying no transaction payload are skipped.
    pub async fn next_tx(&mut self) -> Option<UtxorpcResult<TxInMempool>> {
        loop {
            match self.stream.next().await? {
                Ok(frame) => match frame.tx {
                    Some(tx) => return Some(Ok(tx)),
                    None => {
                        debug!(self.logger, "Mempool frame without payload, skipped");
                    }
                },
                Err(error) => return Some(Err(error.into())),
            }
        }
    }
}
