use utxorpc_spec::utxorpc::v1alpha::cardano;
use utxorpc_spec::utxorpc::v1alpha::query::{
    AnyUtxoData, AnyUtxoPattern, TxoRef, any_utxo_data, any_utxo_pattern,
};
use utxorpc_spec::utxorpc::v1alpha::sync::{AnyChainBlock, BlockRef, any_chain_block};
use utxorpc_spec::utxorpc::v1alpha::watch;
use utxorpc_spec::utxorpc::v1alpha::watch::{AnyChainTx, any_chain_tx};

use crate::chain::Chain;
use crate::entities::{ChainPoint, UtxoRef};

/// A Cardano block, as parsed by the protocol.
pub type CardanoBlock = cardano::Block;

/// A Cardano transaction, as parsed by the protocol.
pub type CardanoTx = cardano::Tx;

/// A Cardano transaction output.
pub type CardanoTxOutput = cardano::TxOutput;

/// A search pattern over Cardano transaction outputs.
pub type CardanoTxOutputPattern = cardano::TxOutputPattern;

/// [Chain] adapter for Cardano.
///
/// The position index of a [ChainPoint] is the Cardano slot number.
pub struct CardanoChain;

impl Chain for CardanoChain {
    type Block = CardanoBlock;
    type Tx = CardanoTx;
    type TxOutput = CardanoTxOutput;
    type TxOutputPattern = CardanoTxOutputPattern;

    fn point_to_block_ref(point: &ChainPoint) -> BlockRef {
        BlockRef {
            index: point.slot_number,
            hash: point.block_hash.clone().into(),
            ..Default::default()
        }
    }

    fn block_ref_to_point(block_ref: &BlockRef) -> ChainPoint {
        ChainPoint::new(block_ref.index, block_ref.hash.to_vec())
    }

    fn point_to_watch_block_ref(point: &ChainPoint) -> watch::BlockRef {
        watch::BlockRef {
            index: point.slot_number,
            hash: point.block_hash.clone().into(),
            ..Default::default()
        }
    }

    fn any_chain_to_block(message: AnyChainBlock) -> Option<Self::Block> {
        match message.chain {
            Some(any_chain_block::Chain::Cardano(block)) => Some(block),
            _ => None,
        }
    }

    fn any_chain_tx_to_tx(message: AnyChainTx) -> Option<Self::Tx> {
        match message.chain {
            Some(any_chain_tx::Chain::Cardano(tx)) => Some(tx),
            _ => None,
        }
    }

    fn tx_output_pattern_to_any_utxo_pattern(pattern: Self::TxOutputPattern) -> AnyUtxoPattern {
        AnyUtxoPattern {
            utxo_pattern: Some(any_utxo_pattern::UtxoPattern::Cardano(pattern)),
            ..Default::default()
        }
    }

    fn any_utxo_pattern_to_tx_output_pattern(
        pattern: AnyUtxoPattern,
    ) -> Option<Self::TxOutputPattern> {
        match pattern.utxo_pattern {
            Some(any_utxo_pattern::UtxoPattern::Cardano(pattern)) => Some(pattern),
            _ => None,
        }
    }

    fn any_utxo_data_to_tx_output(data: AnyUtxoData) -> Option<Self::TxOutput> {
        match data.parsed_state {
            Some(any_utxo_data::ParsedState::Cardano(output)) => Some(output),
            _ => None,
        }
    }

    fn utxo_ref_to_txo_ref(utxo_ref: &UtxoRef) -> TxoRef {
        TxoRef {
            hash: utxo_ref.hash.clone().into(),
            index: utxo_ref.index,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_and_block_ref_are_mutual_inverses() {
        let point = ChainPoint::new(8772, vec![0xab; 32]);

        let round_tripped =
            CardanoChain::block_ref_to_point(&CardanoChain::point_to_block_ref(&point));

        assert_eq!(point, round_tripped);
    }

    #[test]
    fn watch_block_ref_carries_the_same_position_and_hash() {
        let point = ChainPoint::new(8772, vec![0xab; 32]);

        let watch_ref = CardanoChain::point_to_watch_block_ref(&point);

        assert_eq!(point.slot_number, watch_ref.index);
        assert_eq!(point.block_hash, watch_ref.hash.to_vec());
    }

    #[test]
    fn any_chain_block_without_this_chain_variant_degrades_to_absent() {
        let envelope = AnyChainBlock {
            chain: None,
            ..Default::default()
        };

        assert_eq!(None, CardanoChain::any_chain_to_block(envelope));
    }

    #[test]
    fn any_chain_block_with_cardano_variant_is_unwrapped() {
        let block = CardanoBlock::default();
        let envelope = AnyChainBlock {
            chain: Some(any_chain_block::Chain::Cardano(block.clone())),
            ..Default::default()
        };

        assert_eq!(Some(block), CardanoChain::any_chain_to_block(envelope));
    }

    #[test]
    fn any_chain_tx_without_this_chain_variant_degrades_to_absent() {
        let envelope = AnyChainTx {
            chain: None,
            ..Default::default()
        };

        assert_eq!(None, CardanoChain::any_chain_tx_to_tx(envelope));
    }

    #[test]
    fn output_pattern_envelope_round_trips() {
        let pattern = CardanoTxOutputPattern::default();

        let unwrapped = CardanoChain::any_utxo_pattern_to_tx_output_pattern(
            CardanoChain::tx_output_pattern_to_any_utxo_pattern(pattern.clone()),
        );

        assert_eq!(Some(pattern), unwrapped);
    }

    #[test]
    fn utxo_data_without_parsed_state_degrades_to_absent() {
        let data = AnyUtxoData {
            parsed_state: None,
            ..Default::default()
        };

        assert_eq!(None, CardanoChain::any_utxo_data_to_tx_output(data));
    }

    #[test]
    fn utxo_ref_is_forwarded_structurally() {
        let utxo_ref = UtxoRef::new(vec![3u8; 32], 7);

        let wire_ref = CardanoChain::utxo_ref_to_txo_ref(&utxo_ref);

        assert_eq!(utxo_ref.hash, wire_ref.hash.to_vec());
        assert_eq!(utxo_ref.index, wire_ref.index);
    }
}
