//! Typed client for the chain synchronization service.
//!
//! Covers block fetching, history dumps and the tip-following stream.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use slog::{Logger, debug, o};

use utxorpc_spec::utxorpc::v1alpha::sync::{
    DumpHistoryRequest, FetchBlockRequest, FollowTipRequest, FollowTipResponse,
    follow_tip_response,
};

use crate::UtxorpcResult;
use crate::chain::Chain;
use crate::entities::ChainPoint;
use crate::transport::{SyncTransport, WireStream};

/// Pause applied between pulls when the server sends a keep-alive frame.
const DEFAULT_POKE_INTERVAL: Duration = Duration::from_secs(1);

/// A transition of the chain tip, as reported by the tip-following stream.
///
/// Exactly one of the three transitions happens per event, the sum type
/// makes any other combination unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum TipEvent<B> {
    /// A new block extends the chain
    Apply(B),

    /// A previously applied block is rolled back
    Undo(B),

    /// The stream restarts from the given point
    Reset(ChainPoint),
}

/// Client for the chain synchronization service, generic over the chain
/// adapter.
pub struct SyncClient<C: Chain> {
    transport: Arc<dyn SyncTransport>,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> SyncClient<C> {
    /// Constructs a new `SyncClient`.
    pub fn new(transport: Arc<dyn SyncTransport>, logger: &Logger) -> Self {
        Self {
            transport,
            logger: logger.new(o!("src" => "sync_client")),
            _chain: PhantomData,
        }
    }

    /// Fetch the block at the first of the given reference points.
    ///
    /// Returns `None` when the server holds no block for the reference.
    /// An empty reference list is an input error, raised before any request.
    pub async fn fetch_block(&self, refs: &[ChainPoint]) -> UtxorpcResult<Option<C::Block>> {
        if refs.is_empty() {
            return Err(anyhow!("fetch_block requires at least one block reference"));
        }
        debug!(self.logger, "Fetch block"; "refs" => refs.len());

        let request = FetchBlockRequest {
            r#ref: refs.iter().map(C::point_to_block_ref).collect(),
            ..Default::default()
        };
        let response = self.transport.fetch_block(request).await?;

        Ok(response.block.into_iter().next().and_then(C::any_chain_to_block))
    }

    /// Fetch a contiguous range of historical blocks starting at `start`
    /// (the chain origin when absent), at most `max_items` of them.
    ///
    /// Entries the adapter cannot interpret come back as `None`, preserving
    /// the server ordering.
    pub async fn dump_history(
        &self,
        start: Option<&ChainPoint>,
        max_items: u32,
    ) -> UtxorpcResult<Vec<Option<C::Block>>> {
        debug!(self.logger, "Dump history"; "max_items" => max_items);

        let request = DumpHistoryRequest {
            start_token: start.map(C::point_to_block_ref),
            max_items,
            ..Default::default()
        };
        let response = self.transport.dump_history(request).await?;

        Ok(response
            .block
            .into_iter()
            .map(C::any_chain_to_block)
            .collect())
    }

    /// Follow the chain tip from the first known intersection point, with
    /// the default keep-alive pause.
    ///
    /// An empty intersection list starts from the current tip.
    pub async fn follow_tip(&self, intersect: &[ChainPoint]) -> UtxorpcResult<TipStream<C>> {
        self.follow_tip_with_poke(intersect, DEFAULT_POKE_INTERVAL).await
    }

    /// Follow the chain tip, pausing for `poke_interval` after each
    /// keep-alive frame before pulling again.
    pub async fn follow_tip_with_poke(
        &self,
        intersect: &[ChainPoint],
        poke_interval: Duration,
    ) -> UtxorpcResult<TipStream<C>> {
        debug!(self.logger, "Follow tip"; "intersect" => intersect.len());

        let request = FollowTipRequest {
            intersect: intersect.iter().map(C::point_to_block_ref).collect(),
            ..Default::default()
        };
        let stream = self.transport.follow_tip(request).await?;

        Ok(TipStream {
            stream,
            poke_interval,
            logger: self.logger.clone(),
            _chain: PhantomData,
        })
    }
}

/// A tip-following stream of [TipEvent]s.
///
/// Pull-driven: the server only progresses when [next_event][TipStream::next_event]
/// is awaited. Dropping the stream cancels the underlying server stream.
pub struct TipStream<C: Chain> {
    stream: WireStream<FollowTipResponse>,
    poke_interval: Duration,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> TipStream<C> {
    /// Suspend until the next tip transition.
    ///
    /// Keep-alive frames yield no event: the stream pauses for the poke
    /// interval and pulls again. Returns `None` when the server ends the
    /// stream; errors surface on the pull that encounters them.
    pub async fn next_event(&mut self) -> Option<UtxorpcResult<TipEvent<C::Block>>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(error) => return Some(Err(error.into())),
            };

            match frame.action {
                Some(follow_tip_response::Action::Apply(block)) => {
                    return Some(
                        C::any_chain_to_block(block)
                            .map(TipEvent::Apply)
                            .ok_or_else(|| anyhow!("Tip stream applied a block of another chain")),
                    );
                }
                Some(follow_tip_response::Action::Undo(block)) => {
                    return Some(
                        C::any_chain_to_block(block)
                            .map(TipEvent::Undo)
                            .ok_or_else(|| anyhow!("Tip stream undid a block of another chain")),
                    );
                }
                Some(follow_tip_response::Action::Reset(block_ref)) => {
                    let point = C::block_ref_to_point(&block_ref);
                    debug!(self.logger, "Tip stream reset"; "point" => %point);
                    return Some(Ok(TipEvent::Reset(point)));
                }
                None => {
                    debug!(
                        self.logger, "Tip stream keep-alive";
                        "pause_ms" => self.poke_interval.as_millis() as u64
                    );
                    tokio::time::sleep(self.poke_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures::stream;

    use utxorpc_spec::utxorpc::v1alpha::cardano::{Block, BlockHeader};
    use utxorpc_spec::utxorpc::v1alpha::sync::{
        AnyChainBlock, DumpHistoryResponse, FetchBlockResponse, any_chain_block,
    };

    use crate::chain::CardanoChain;
    use crate::transport::{MockSyncTransport, TransportError};

    use super::*;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn client(transport: MockSyncTransport) -> SyncClient<CardanoChain> {
        SyncClient::new(Arc::new(transport), &test_logger())
    }

    fn cardano_block(slot: u64) -> AnyChainBlock {
        AnyChainBlock {
            chain: Some(any_chain_block::Chain::Cardano(Block {
                header: Some(BlockHeader {
                    slot,
                    ..Default::default()
                }),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn foreign_block() -> AnyChainBlock {
        AnyChainBlock {
            chain: None,
            ..Default::default()
        }
    }

    fn frame(action: Option<follow_tip_response::Action>) -> Result<FollowTipResponse, TransportError> {
        Ok(FollowTipResponse {
            action,
            ..Default::default()
        })
    }

    fn frames(items: Vec<Result<FollowTipResponse, TransportError>>) -> WireStream<FollowTipResponse> {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn fetch_block_returns_the_first_result_element() {
        let mut transport = MockSyncTransport::new();
        transport.expect_fetch_block().return_once(|request| {
            assert_eq!(1, request.r#ref.len());
            assert_eq!(100, request.r#ref[0].index);
            Ok(FetchBlockResponse {
                block: vec![cardano_block(100)],
                ..Default::default()
            })
        });

        let block = client(transport)
            .fetch_block(&[ChainPoint::new(100, vec![1u8; 32])])
            .await
            .unwrap()
            .expect("a block should be returned");

        assert_eq!(100, block.header.unwrap().slot);
    }

    #[tokio::test]
    async fn fetch_block_with_empty_refs_fails_without_any_transport_call() {
        let transport = MockSyncTransport::new();

        client(transport)
            .fetch_block(&[])
            .await
            .expect_err("empty refs should be rejected");
    }

    #[tokio::test]
    async fn fetch_block_degrades_a_foreign_chain_block_to_absent() {
        let mut transport = MockSyncTransport::new();
        transport.expect_fetch_block().return_once(|_| {
            Ok(FetchBlockResponse {
                block: vec![foreign_block()],
                ..Default::default()
            })
        });

        let block = client(transport)
            .fetch_block(&[ChainPoint::new(100, vec![1u8; 32])])
            .await
            .unwrap();

        assert!(block.is_none());
    }

    #[tokio::test]
    async fn dump_history_preserves_server_ordering_and_absent_entries() {
        let mut transport = MockSyncTransport::new();
        transport.expect_dump_history().return_once(|request| {
            assert_eq!(3, request.max_items);
            assert!(request.start_token.is_none());
            Ok(DumpHistoryResponse {
                block: vec![cardano_block(1), foreign_block(), cardano_block(3)],
                ..Default::default()
            })
        });

        let blocks = client(transport).dump_history(None, 3).await.unwrap();

        let slots: Vec<_> = blocks
            .iter()
            .map(|block| block.as_ref().map(|b| b.header.as_ref().unwrap().slot))
            .collect();
        assert_eq!(vec![Some(1), None, Some(3)], slots);
    }

    #[tokio::test]
    async fn tip_stream_discriminates_apply_undo_and_reset() {
        let mut transport = MockSyncTransport::new();
        transport.expect_follow_tip().return_once(|_| {
            Ok(frames(vec![
                frame(Some(follow_tip_response::Action::Apply(cardano_block(10)))),
                frame(Some(follow_tip_response::Action::Undo(cardano_block(10)))),
                frame(Some(follow_tip_response::Action::Reset(
                    CardanoChain::point_to_block_ref(&ChainPoint::new(5, vec![9u8; 32])),
                ))),
            ]))
        });

        let mut stream = client(transport).follow_tip(&[]).await.unwrap();

        assert!(matches!(
            stream.next_event().await.unwrap().unwrap(),
            TipEvent::Apply(block) if block.header.as_ref().unwrap().slot == 10
        ));
        assert!(matches!(
            stream.next_event().await.unwrap().unwrap(),
            TipEvent::Undo(block) if block.header.as_ref().unwrap().slot == 10
        ));
        assert!(matches!(
            stream.next_event().await.unwrap().unwrap(),
            TipEvent::Reset(point) if point == ChainPoint::new(5, vec![9u8; 32])
        ));
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn tip_stream_pauses_for_the_poke_interval_on_keep_alive() {
        let poke = Duration::from_millis(50);
        let mut transport = MockSyncTransport::new();
        transport.expect_follow_tip().return_once(|_| {
            Ok(frames(vec![
                frame(None),
                frame(Some(follow_tip_response::Action::Apply(cardano_block(42)))),
            ]))
        });

        let mut stream = client(transport)
            .follow_tip_with_poke(&[], poke)
            .await
            .unwrap();

        let start = Instant::now();
        let event = stream.next_event().await.unwrap().unwrap();

        assert!(start.elapsed() >= poke);
        assert!(matches!(event, TipEvent::Apply(_)));
    }

    #[tokio::test]
    async fn tip_stream_errors_on_a_foreign_chain_apply() {
        let mut transport = MockSyncTransport::new();
        transport.expect_follow_tip().return_once(|_| {
            Ok(frames(vec![frame(Some(follow_tip_response::Action::Apply(
                foreign_block(),
            )))]))
        });

        let mut stream = client(transport).follow_tip(&[]).await.unwrap();

        stream
            .next_event()
            .await
            .unwrap()
            .expect_err("a foreign chain block should be an error");
    }

    #[tokio::test]
    async fn tip_stream_surfaces_transport_errors_on_the_failing_pull() {
        let mut transport = MockSyncTransport::new();
        transport.expect_follow_tip().return_once(|_| {
            Ok(frames(vec![
                frame(Some(follow_tip_response::Action::Apply(cardano_block(1)))),
                Err(TransportError::Rpc(tonic::Status::unavailable("gone"))),
            ]))
        });

        let mut stream = client(transport).follow_tip(&[]).await.unwrap();

        stream.next_event().await.unwrap().unwrap();
        stream
            .next_event()
            .await
            .unwrap()
            .expect_err("the second pull should surface the error");
    }
}
