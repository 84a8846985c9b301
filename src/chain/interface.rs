use utxorpc_spec::utxorpc::v1alpha::query::{AnyUtxoData, AnyUtxoPattern, TxoRef};
use utxorpc_spec::utxorpc::v1alpha::sync::{AnyChainBlock, BlockRef};
use utxorpc_spec::utxorpc::v1alpha::watch;
use utxorpc_spec::utxorpc::v1alpha::watch::AnyChainTx;

use crate::entities::{ChainPoint, UtxoRef};

/// Adapter between one blockchain's representation and the chain-tagged
/// wire envelopes of the protocol.
///
/// Every conversion is pure, stateless and total over well-formed input:
/// a wire envelope whose populated variant belongs to another chain
/// degrades to `None` instead of failing. The clients are generic over this
/// trait, selected at construction time.
pub trait Chain: Send + Sync + 'static {
    /// Chain-specific block representation
    type Block: Send;

    /// Chain-specific transaction representation
    type Tx: Send;

    /// Chain-specific transaction output representation
    type TxOutput: Send;

    /// Chain-specific transaction output search pattern
    type TxOutputPattern: Send + Clone;

    /// Convert a [ChainPoint] to its wire block reference.
    ///
    /// Mutual inverse of [block_ref_to_point][Chain::block_ref_to_point].
    fn point_to_block_ref(point: &ChainPoint) -> BlockRef;

    /// Convert a wire block reference back to a [ChainPoint].
    fn block_ref_to_point(block_ref: &BlockRef) -> ChainPoint;

    /// Convert a [ChainPoint] to the watch service's block reference.
    ///
    /// The watch service declares its own reference message with the same
    /// shape as the sync one.
    fn point_to_watch_block_ref(point: &ChainPoint) -> watch::BlockRef;

    /// Unwrap the tagged any-chain block envelope.
    ///
    /// Returns `None` when the envelope does not carry this chain's variant,
    /// the sole mechanism for detecting a server that answered with another
    /// chain's data.
    fn any_chain_to_block(message: AnyChainBlock) -> Option<Self::Block>;

    /// Unwrap the tagged any-chain transaction envelope of the watch service.
    fn any_chain_tx_to_tx(message: AnyChainTx) -> Option<Self::Tx>;

    /// Wrap a chain-specific output pattern in the tagged wire envelope.
    fn tx_output_pattern_to_any_utxo_pattern(pattern: Self::TxOutputPattern) -> AnyUtxoPattern;

    /// Unwrap a tagged wire pattern envelope back to the chain-specific pattern.
    fn any_utxo_pattern_to_tx_output_pattern(
        pattern: AnyUtxoPattern,
    ) -> Option<Self::TxOutputPattern>;

    /// Unwrap the parsed output carried by a wire utxo entry.
    fn any_utxo_data_to_tx_output(data: AnyUtxoData) -> Option<Self::TxOutput>;

    /// Convert a [UtxoRef] to its wire equivalent (structural forwarding).
    fn utxo_ref_to_txo_ref(utxo_ref: &UtxoRef) -> TxoRef;
}
