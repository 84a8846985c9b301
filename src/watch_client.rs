//! Typed client for the transaction watch service.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use futures::StreamExt;
use pbjson_types::FieldMask;
use slog::{Logger, debug, o};

use utxorpc_spec::utxorpc::v1alpha::watch::{
    TxPredicate, WatchTxRequest, WatchTxResponse, watch_tx_response,
};

use crate::UtxorpcResult;
use crate::chain::Chain;
use crate::entities::ChainPoint;
use crate::transport::{WatchTransport, WireStream};

/// A transition reported by the transaction watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TxEvent<T> {
    /// A matching transaction is included in an applied block
    Apply(T),

    /// A matching transaction is rolled back with its block
    Undo(T),
}

/// Client for the transaction watch service, generic over the chain
/// adapter.
pub struct WatchClient<C: Chain> {
    transport: Arc<dyn WatchTransport>,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> WatchClient<C> {
    /// Constructs a new `WatchClient`.
    pub fn new(transport: Arc<dyn WatchTransport>, logger: &Logger) -> Self {
        Self {
            transport,
            logger: logger.new(o!("src" => "watch_client")),
            _chain: PhantomData,
        }
    }

    /// Watch the chain for transactions matching `predicate` (`None`
    /// matches all), starting from the first known intersection point (the
    /// current tip when empty).
    pub async fn watch_tx(
        &self,
        predicate: Option<TxPredicate>,
        field_mask: Option<FieldMask>,
        intersect: &[ChainPoint],
    ) -> UtxorpcResult<TxStream<C>> {
        debug!(
            self.logger, "Watch tx";
            "filtered" => predicate.is_some(), "intersect" => intersect.len()
        );

        let request = WatchTxRequest {
            predicate,
            field_mask,
            intersect: intersect.iter().map(C::point_to_watch_block_ref).collect(),
            ..Default::default()
        };
        let stream = self.transport.watch_tx(request).await?;

        Ok(TxStream {
            stream,
            logger: self.logger.clone(),
            _chain: PhantomData,
        })
    }
}

/// A transaction watch stream of [TxEvent]s.
///
/// Pull-driven and server-paced: the server only emits frames when a
/// matching transaction transitions, so there is no local keep-alive pause.
pub struct TxStream<C: Chain> {
    stream: WireStream<WatchTxResponse>,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> TxStream<C> {
    /// Suspend until the next watch transition.
    ///
    /// Frames with no recognizable transition are skipped. Returns `None`
    /// when the server ends the stream.
    pub async fn next_event(&mut self) -> Option<UtxorpcResult<TxEvent<C::Tx>>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(error) => return Some(Err(error.into())),
            };

            match frame.action {
                Some(watch_tx_response::Action::Apply(tx)) => {
                    return Some(
                        C::any_chain_tx_to_tx(tx)
                            .map(TxEvent::Apply)
                            .ok_or_else(|| {
                                anyhow!("Watch stream applied a transaction of another chain")
                            }),
                    );
                }
                Some(watch_tx_response::Action::Undo(tx)) => {
                    return Some(
                        C::any_chain_tx_to_tx(tx)
                            .map(TxEvent::Undo)
                            .ok_or_else(|| {
                                anyhow!("Watch stream undid a transaction of another chain")
                            }),
                    );
                }
                None => {
                    debug!(self.logger, "Watch frame without transition, skipped");
                }
            }
        }
    }
}
