//! Typed client for the ledger query service.
//!
//! Covers keyed utxo reads, predicate searches (paged or drained) and the
//! chain parameters read.

use std::marker::PhantomData;
use std::sync::Arc;

use pbjson_types::FieldMask;
use slog::{Logger, debug, o};

use utxorpc_spec::utxorpc::v1alpha::query::{
    ReadParamsRequest, ReadParamsResponse, ReadUtxosRequest, SearchUtxosRequest, TxoRef,
    UtxoPredicate,
};

use crate::UtxorpcResult;
use crate::chain::Chain;
use crate::entities::{InvalidUtxoKeyLength, UtxoKey};
use crate::transport::QueryTransport;

/// Page size used when draining a search in one call.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Client for the ledger query service, generic over the chain adapter.
pub struct QueryClient<C: Chain> {
    transport: Arc<dyn QueryTransport>,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> QueryClient<C> {
    /// Constructs a new `QueryClient`.
    pub fn new(transport: Arc<dyn QueryTransport>, logger: &Logger) -> Self {
        Self {
            transport,
            logger: logger.new(o!("src" => "query_client")),
            _chain: PhantomData,
        }
    }

    /// Read transaction outputs by key, in key order.
    ///
    /// Keys are resolved locally first: a malformed packed key fails the
    /// whole call before any request is sent. Outputs the server does not
    /// know, or that belong to another chain, come back as `None`.
    pub async fn read_utxos(&self, keys: &[UtxoKey]) -> UtxorpcResult<Vec<Option<C::TxOutput>>> {
        let refs = keys
            .iter()
            .map(|key| Ok(C::utxo_ref_to_txo_ref(&key.to_ref()?)))
            .collect::<Result<Vec<TxoRef>, InvalidUtxoKeyLength>>()?;
        debug!(self.logger, "Read utxos"; "keys" => refs.len());

        let request = ReadUtxosRequest {
            keys: refs,
            ..Default::default()
        };
        let response = self.transport.read_utxos(request).await?;

        Ok(response
            .items
            .into_iter()
            .map(C::any_utxo_data_to_tx_output)
            .collect())
    }

    /// Search transaction outputs matching the given pattern, one page per
    /// pull.
    ///
    /// No request is sent until the first page is pulled.
    pub fn search_utxos_pages(
        &self,
        pattern: C::TxOutputPattern,
        page_size: u32,
    ) -> UtxoPages<C> {
        let predicate = UtxoPredicate {
            r#match: Some(C::tx_output_pattern_to_any_utxo_pattern(pattern)),
            ..Default::default()
        };

        UtxoPages {
            transport: self.transport.clone(),
            predicate: Some(predicate),
            page_size,
            next_token: String::new(),
            exhausted: false,
            logger: self.logger.clone(),
            _chain: PhantomData,
        }
    }

    /// Search transaction outputs matching the given pattern, draining all
    /// pages into one list.
    pub async fn search_utxos(
        &self,
        pattern: C::TxOutputPattern,
    ) -> UtxorpcResult<Vec<C::TxOutput>> {
        let mut pages = self.search_utxos_pages(pattern, DEFAULT_PAGE_SIZE);
        let mut outputs = Vec::new();
        while let Some(page) = pages.next_page().await {
            outputs.extend(page?);
        }

        Ok(outputs)
    }

    /// Read the current blockchain parameters, optionally restricted to the
    /// masked fields.
    ///
    /// The response is the chain-tagged wire message, returned as is.
    pub async fn read_params(
        &self,
        field_mask: Option<FieldMask>,
    ) -> UtxorpcResult<ReadParamsResponse> {
        debug!(self.logger, "Read params");

        let request = ReadParamsRequest {
            field_mask,
            ..Default::default()
        };

        Ok(self.transport.read_params(request).await?)
    }
}

/// A paged utxo search.
///
/// Pull-driven: each [next_page][UtxoPages::next_page] sends one request,
/// carrying the pagination token of the previous page. Outputs belonging to
/// another chain are dropped from the page.
pub struct UtxoPages<C: Chain> {
    transport: Arc<dyn QueryTransport>,
    predicate: Option<UtxoPredicate>,
    page_size: u32,
    next_token: String,
    exhausted: bool,
    logger: Logger,
    _chain: PhantomData<C>,
}

impl<C: Chain> UtxoPages<C> {
    /// Suspend until the next page of matching outputs.
    ///
    /// Returns `None` once the server reports no further page. An error
    /// exhausts the search: later pulls return `None`.
    pub async fn next_page(&mut self) -> Option<UtxorpcResult<Vec<C::TxOutput>>> {
        if self.exhausted {
            return None;
        }
        debug!(self.logger, "Search utxos page"; "page_size" => self.page_size);

        let request = SearchUtxosRequest {
            predicate: self.predicate.clone(),
            max_items: self.page_size as i32,
            start_token: self.next_token.clone(),
            ..Default::default()
        };
        let response = match self.transport.search_utxos(request).await {
            Ok(response) => response,
            Err(error) => {
                self.exhausted = true;
                return Some(Err(error.into()));
            }
        };

        self.next_token = response.next_token;
        if self.next_token.is_empty() {
            self.exhausted = true;
        }

        Some(Ok(response
            .items
            .into_iter()
            .filter_map(C::any_utxo_data_to_tx_output)
            .collect()))
    }
}
