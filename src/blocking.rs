//! Blocking operating mode.
//!
//! A thin synchronous driver over the async client: every operation has a
//! single suspension-aware implementation, executed here on a private
//! current-thread runtime. Streams become [Iterator]s. A client instance is
//! used in exactly one mode, the two modes share no mutable state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pbjson_types::FieldMask;
use tokio::runtime::Runtime;

use utxorpc_spec::utxorpc::v1alpha::query::ReadParamsResponse;
use utxorpc_spec::utxorpc::v1alpha::submit::{TxInMempool, TxPredicate};
use utxorpc_spec::utxorpc::v1alpha::watch::TxPredicate as WatchTxPredicate;

use crate::UtxorpcResult;
use crate::chain::Chain;
use crate::connection::ConnectionGuard;
use crate::entities::{ChainPoint, TxStage, UtxoKey};
use crate::sync_client::TipEvent;
use crate::watch_client::TxEvent;

/// Blocking counterpart of the aggregate [Client][crate::Client], built
/// with [build_blocking][crate::ClientBuilder::build_blocking].
pub struct Client<C: Chain> {
    inner: crate::client::Client<C>,
    runtime: Arc<Runtime>,
}

impl<C: Chain> Client<C> {
    pub(crate) fn new(inner: crate::client::Client<C>) -> UtxorpcResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .with_context(|| "Failed to build the blocking mode runtime")?;

        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// Run `body` inside a connection scope, see
    /// [Client::with_connection][crate::Client::with_connection].
    pub fn with_connection<T, F>(&self, body: F) -> UtxorpcResult<T>
    where
        F: FnOnce(&Client<C>) -> UtxorpcResult<T>,
    {
        // Channel establishment needs the runtime's reactor in context.
        let _rt = self.runtime.enter();
        self.inner.connection().open()?;
        let _guard = ConnectionGuard::new(self.inner.connection());

        body(self)
    }

    /// Tell whether a connection scope is currently active.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// See [SyncClient::fetch_block][crate::SyncClient::fetch_block].
    pub fn fetch_block(&self, refs: &[ChainPoint]) -> UtxorpcResult<Option<C::Block>> {
        self.runtime
            .block_on(self.inner.sync_client().fetch_block(refs))
    }

    /// See [SyncClient::dump_history][crate::SyncClient::dump_history].
    pub fn dump_history(
        &self,
        start: Option<&ChainPoint>,
        max_items: u32,
    ) -> UtxorpcResult<Vec<Option<C::Block>>> {
        self.runtime
            .block_on(self.inner.sync_client().dump_history(start, max_items))
    }

    /// See [SyncClient::follow_tip][crate::SyncClient::follow_tip].
    pub fn follow_tip(&self, intersect: &[ChainPoint]) -> UtxorpcResult<TipStream<C>> {
        let inner = self
            .runtime
            .block_on(self.inner.sync_client().follow_tip(intersect))?;

        Ok(TipStream {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    /// See
    /// [SyncClient::follow_tip_with_poke][crate::SyncClient::follow_tip_with_poke].
    pub fn follow_tip_with_poke(
        &self,
        intersect: &[ChainPoint],
        poke_interval: Duration,
    ) -> UtxorpcResult<TipStream<C>> {
        let inner = self.runtime.block_on(
            self.inner
                .sync_client()
                .follow_tip_with_poke(intersect, poke_interval),
        )?;

        Ok(TipStream {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    /// See [QueryClient::read_utxos][crate::QueryClient::read_utxos].
    pub fn read_utxos(&self, keys: &[UtxoKey]) -> UtxorpcResult<Vec<Option<C::TxOutput>>> {
        self.runtime
            .block_on(self.inner.query_client().read_utxos(keys))
    }

    /// See [QueryClient::search_utxos][crate::QueryClient::search_utxos].
    pub fn search_utxos(&self, pattern: C::TxOutputPattern) -> UtxorpcResult<Vec<C::TxOutput>> {
        self.runtime
            .block_on(self.inner.query_client().search_utxos(pattern))
    }

    /// See
    /// [QueryClient::search_utxos_pages][crate::QueryClient::search_utxos_pages].
    pub fn search_utxos_pages(
        &self,
        pattern: C::TxOutputPattern,
        page_size: u32,
    ) -> UtxoPages<C> {
        UtxoPages {
            inner: self
                .inner
                .query_client()
                .search_utxos_pages(pattern, page_size),
            runtime: self.runtime.clone(),
        }
    }

    /// See [QueryClient::read_params][crate::QueryClient::read_params].
    pub fn read_params(&self, field_mask: Option<FieldMask>) -> UtxorpcResult<ReadParamsResponse> {
        self.runtime
            .block_on(self.inner.query_client().read_params(field_mask))
    }

    /// See [SubmitClient::submit_tx][crate::SubmitClient::submit_tx].
    pub fn submit_tx(&self, tx: &[u8]) -> UtxorpcResult<Vec<u8>> {
        self.runtime
            .block_on(self.inner.submit_client().submit_tx(tx))
    }

    /// See [SubmitClient::wait_for_tx][crate::SubmitClient::wait_for_tx].
    pub fn wait_for_tx(&self, tx_ref: &[u8]) -> UtxorpcResult<StageStream> {
        let inner = self
            .runtime
            .block_on(self.inner.submit_client().wait_for_tx(tx_ref))?;

        Ok(StageStream {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    /// See [SubmitClient::watch_mempool][crate::SubmitClient::watch_mempool].
    pub fn watch_mempool(&self, predicate: Option<TxPredicate>) -> UtxorpcResult<MempoolStream> {
        let inner = self
            .runtime
            .block_on(self.inner.submit_client().watch_mempool(predicate))?;

        Ok(MempoolStream {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    /// See [WatchClient::watch_tx][crate::WatchClient::watch_tx].
    pub fn watch_tx(
        &self,
        predicate: Option<WatchTxPredicate>,
        field_mask: Option<FieldMask>,
        intersect: &[ChainPoint],
    ) -> UtxorpcResult<TxStream<C>> {
        let inner = self.runtime.block_on(
            self.inner
                .watch_client()
                .watch_tx(predicate, field_mask, intersect),
        )?;

        Ok(TxStream {
            inner,
            runtime: self.runtime.clone(),
        })
    }
}

/// Blocking counterpart of [TipStream][crate::TipStream].
pub struct TipStream<C: Chain> {
    inner: crate::sync_client::TipStream<C>,
    runtime: Arc<Runtime>,
}

impl<C: Chain> TipStream<C> {
    /// Block until the next tip transition.
    pub fn next_event(&mut self) -> Option<UtxorpcResult<TipEvent<C::Block>>> {
        self.runtime.block_on(self.inner.next_event())
    }
}

impl<C: Chain> Iterator for TipStream<C> {
    type Item = UtxorpcResult<TipEvent<C::Block>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

/// Blocking counterpart of [UtxoPages][crate::UtxoPages].
pub struct UtxoPages<C: Chain> {
    inner: crate::query_client::UtxoPages<C>,
    runtime: Arc<Runtime>,
}

impl<C: Chain> UtxoPages<C> {
    /// Block until the next page of matching outputs.
    pub fn next_page(&mut self) -> Option<UtxorpcResult<Vec<C::TxOutput>>> {
        self.runtime.block_on(self.inner.next_page())
    }
}

impl<C: Chain> Iterator for UtxoPages<C> {
    type Item = UtxorpcResult<Vec<C::TxOutput>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_page()
    }
}

/// Blocking counterpart of [StageStream][crate::StageStream].
pub struct StageStream {
    inner: crate::submit_client::StageStream,
    runtime: Arc<Runtime>,
}

impl StageStream {
    /// Block until the transaction reaches its next confirmation stage.
    pub fn next_stage(&mut self) -> Option<UtxorpcResult<TxStage>> {
        self.runtime.block_on(self.inner.next_stage())
    }
}

impl Iterator for StageStream {
    type Item = UtxorpcResult<TxStage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_stage()
    }
}

/// Blocking counterpart of [MempoolStream][crate::MempoolStream].
pub struct MempoolStream {
    inner: crate::submit_client::MempoolStream,
    runtime: Arc<Runtime>,
}

impl MempoolStream {
    /// Block until the next matching transaction enters the mempool.
    pub fn next_tx(&mut self) -> Option<UtxorpcResult<TxInMempool>> {
        self.runtime.block_on(self.inner.next_tx())
    }
}

impl Iterator for MempoolStream {
    type Item = UtxorpcResult<TxInMempool>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tx()
    }
}

/// Blocking counterpart of [TxStream][crate::TxStream].
pub struct TxStream<C: Chain> {
    inner: crate::watch_client::TxStream<C>,
    runtime: Arc<Runtime>,
}

impl<C: Chain> TxStream<C> {
    /// Block until the next watch transition.
    pub fn next_event(&mut self) -> Option<UtxorpcResult<TxEvent<C::Tx>>> {
        self.runtime.block_on(self.inner.next_event())
    }
}

impl<C: Chain> Iterator for TxStream<C> {
    type Item = UtxorpcResult<TxEvent<C::Tx>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}
