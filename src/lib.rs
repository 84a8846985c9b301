#![warn(missing_docs)]
//! Typed client library for the UTxO RPC protocol, specialized for
//! Cardano.
//!
//! The library wraps the generated gRPC bindings of the
//! [utxorpc-spec](https://crates.io/crates/utxorpc-spec) crate behind four
//! typed service clients (sync, query, submit, watch), all generic over a
//! [Chain] adapter that converts between chain-tagged wire envelopes and
//! chain-specific types. [CardanoChain] is the provided adapter.
//!
//! Remote operations run inside a connection scope: the channel is opened
//! on entry and released on every exit path. Async is the primary mode,
//! the [blocking] module drives the same implementation synchronously.
//!
//! # Follow the chain tip
//!
//! ```no_run
//! use utxorpc_client::{CardanoChain, ChainPoint, ClientBuilder, TipEvent};
//!
//! #[tokio::main]
//! async fn main() -> utxorpc_client::UtxorpcResult<()> {
//!     let client = ClientBuilder::endpoint("preview.utxorpc-v0.demeter.run")
//!         .add_metadata("dmtr-api-key", "dmtr_apikey...")
//!         .build::<CardanoChain>()?;
//!
//!     client
//!         .with_connection(async |client| {
//!             let intersect = ChainPoint::from_hex(
//!                 58_580_037,
//!                 "f8502a0b0a9b939218f320cd30522a238e1bed057cf9e46c82cb26f5ff69c342",
//!             )?;
//!             let mut tip = client.sync_client().follow_tip(&[intersect]).await?;
//!
//!             while let Some(event) = tip.next_event().await {
//!                 match event? {
//!                     TipEvent::Apply(block) => println!("apply: {block:?}"),
//!                     TipEvent::Undo(block) => println!("undo: {block:?}"),
//!                     TipEvent::Reset(point) => println!("reset to {point}"),
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .await
//! }
//! ```
//!
//! # Read utxos, blocking mode
//!
//! ```no_run
//! use utxorpc_client::{CardanoChain, ClientBuilder, UtxoRef};
//!
//! fn main() -> utxorpc_client::UtxorpcResult<()> {
//!     let client = ClientBuilder::endpoint("localhost:50051")
//!         .insecure()
//!         .build_blocking::<CardanoChain>()?;
//!
//!     let outputs = client.with_connection(|client| {
//!         client.read_utxos(&[UtxoRef::new(vec![0u8; 32], 0).into()])
//!     })?;
//!     println!("{outputs:?}");
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod chain;
mod client;
pub mod connection;
pub mod entities;
mod query_client;
mod submit_client;
mod sync_client;
pub mod transport;
mod watch_client;

#[cfg(test)]
mod test_utils;

pub use chain::{
    CardanoBlock, CardanoChain, CardanoTx, CardanoTxOutput, CardanoTxOutputPattern, Chain,
};
pub use client::{Client, ClientBuilder};
pub use connection::ChannelOptions;
pub use entities::{
    BlockHash, ChainPoint, InvalidUtxoKeyLength, SlotNumber, TxStage, UtxoKey, UtxoRef,
};
pub use query_client::{QueryClient, UtxoPages};
pub use submit_client::{MempoolStream, StageStream, SubmitClient};
pub use sync_client::{SyncClient, TipEvent, TipStream};
pub use watch_client::{TxEvent, TxStream, WatchClient};

/// The raw wire protocol bindings, re-exported for advanced uses
/// (predicates, field masks, parsed chain messages).
pub use utxorpc_spec::utxorpc::v1alpha as proto;

/// Generic error type
pub type UtxorpcError = anyhow::Error;

/// Generic result type
pub type UtxorpcResult<T> = anyhow::Result<T>;
