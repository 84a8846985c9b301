//! Chain-neutral domain entities exchanged with the typed clients.

use std::fmt::{Display, Formatter};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UtxorpcResult;

/// Chain-specific monotonic position index (a slot on Cardano).
pub type SlotNumber = u64;

/// Raw bytes of a block hash.
pub type BlockHash = Vec<u8>;

/// Size of the hash part of a packed legacy utxo key.
const PACKED_KEY_HASH_SIZE: usize = 32;

/// Size of a packed legacy utxo key: 32 bytes of hash + 4 bytes of little-endian index.
const PACKED_KEY_SIZE: usize = 36;

/// A reference to a specific point in the chain, used both as a query input
/// and as the reset target of a tip-following stream.
///
/// The hash is always held as raw bytes; the hex and base64 text forms are
/// normalized at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPoint {
    /// The slot number
    pub slot_number: SlotNumber,

    /// The block hash, as raw bytes
    pub block_hash: BlockHash,
}

impl ChainPoint {
    /// [ChainPoint] factory from raw hash bytes
    pub fn new<T: Into<BlockHash>>(slot_number: SlotNumber, block_hash: T) -> ChainPoint {
        ChainPoint {
            slot_number,
            block_hash: block_hash.into(),
        }
    }

    /// [ChainPoint] factory from a hex encoded hash
    pub fn from_hex(slot_number: SlotNumber, block_hash: &str) -> UtxorpcResult<ChainPoint> {
        let block_hash = hex::decode(block_hash)
            .map_err(|e| anyhow::anyhow!(e).context("Invalid hex encoded block hash"))?;

        Ok(ChainPoint {
            slot_number,
            block_hash,
        })
    }

    /// [ChainPoint] factory from a base64 encoded hash
    pub fn from_base64(slot_number: SlotNumber, block_hash: &str) -> UtxorpcResult<ChainPoint> {
        let block_hash = BASE64_STANDARD
            .decode(block_hash)
            .map_err(|e| anyhow::anyhow!(e).context("Invalid base64 encoded block hash"))?;

        Ok(ChainPoint {
            slot_number,
            block_hash,
        })
    }
}

impl Display for ChainPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChainPoint (slot_number: {}, block_hash: {})",
            self.slot_number,
            hex::encode(&self.block_hash)
        )
    }
}

/// An explicit reference to a transaction output: producing transaction hash
/// plus output index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRef {
    /// Hash of the transaction that produced the output
    pub hash: Vec<u8>,

    /// Index of the output within the producing transaction
    pub index: u32,
}

impl UtxoRef {
    /// [UtxoRef] factory
    pub fn new<T: Into<Vec<u8>>>(hash: T, index: u32) -> UtxoRef {
        UtxoRef {
            hash: hash.into(),
            index,
        }
    }
}

/// Error raised when a packed utxo key does not have the expected length.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "invalid packed utxo key length: {actual} bytes, expected {PACKED_KEY_SIZE} \
    ({PACKED_KEY_HASH_SIZE} bytes of hash + 4 bytes of little-endian index)"
)]
pub struct InvalidUtxoKeyLength {
    /// Length of the rejected key
    pub actual: usize,
}

/// A key accepted by the query client to designate a transaction output.
///
/// Both encodings are accepted interchangeably: the explicit reference and
/// the packed 36-byte legacy form (32-byte hash followed by a 4-byte
/// little-endian index). Any other packed length is a format error, raised
/// locally before a request is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UtxoKey {
    /// An explicit {hash, index} reference
    Reference(UtxoRef),

    /// The packed 36-byte legacy encoding
    Packed(Vec<u8>),
}

impl UtxoKey {
    /// Resolve the key to an explicit [UtxoRef], decoding the packed form if needed.
    pub fn to_ref(&self) -> Result<UtxoRef, InvalidUtxoKeyLength> {
        match self {
            UtxoKey::Reference(utxo_ref) => Ok(utxo_ref.clone()),
            UtxoKey::Packed(bytes) => {
                if bytes.len() != PACKED_KEY_SIZE {
                    return Err(InvalidUtxoKeyLength {
                        actual: bytes.len(),
                    });
                }
                let hash = bytes[..PACKED_KEY_HASH_SIZE].to_vec();
                let index =
                    u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);

                Ok(UtxoRef::new(hash, index))
            }
        }
    }
}

impl From<UtxoRef> for UtxoKey {
    fn from(utxo_ref: UtxoRef) -> Self {
        UtxoKey::Reference(utxo_ref)
    }
}

impl From<Vec<u8>> for UtxoKey {
    fn from(bytes: Vec<u8>) -> Self {
        UtxoKey::Packed(bytes)
    }
}

/// Confirmation stage of a submitted transaction, as reported by the
/// submit service while waiting for inclusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxStage {
    /// Stage unknown to this client
    Unspecified,

    /// The node has acknowledged the transaction
    Acknowledged,

    /// The transaction sits in the local mempool
    Mempool,

    /// The transaction has been propagated to the network
    Network,

    /// The transaction is included in a block
    Confirmed,
}

impl From<i32> for TxStage {
    fn from(value: i32) -> Self {
        use utxorpc_spec::utxorpc::v1alpha::submit::Stage;

        match Stage::try_from(value) {
            Ok(Stage::Acknowledged) => TxStage::Acknowledged,
            Ok(Stage::Mempool) => TxStage::Mempool,
            Ok(Stage::Network) => TxStage::Network,
            Ok(Stage::Confirmed) => TxStage::Confirmed,
            _ => TxStage::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

    #[test]
    fn chain_point_normalizes_hex_hash_to_raw_bytes() {
        let point = ChainPoint::from_hex(100, "deadbeef").unwrap();

        assert_eq!(ChainPoint::new(100, HASH.to_vec()), point);
    }

    #[test]
    fn chain_point_normalizes_base64_hash_to_raw_bytes() {
        let encoded = BASE64_STANDARD.encode(HASH);
        let point = ChainPoint::from_base64(100, &encoded).unwrap();

        assert_eq!(ChainPoint::new(100, HASH.to_vec()), point);
    }

    #[test]
    fn chain_point_rejects_malformed_text_hashes() {
        ChainPoint::from_hex(1, "not-hex").expect_err("hex decoding should fail");
        ChainPoint::from_base64(1, "@@@").expect_err("base64 decoding should fail");
    }

    #[test]
    fn packed_utxo_key_decodes_hash_and_little_endian_index() {
        let mut packed = vec![7u8; 32];
        packed.extend_from_slice(&2u32.to_le_bytes());

        let utxo_ref = UtxoKey::Packed(packed).to_ref().unwrap();

        assert_eq!(UtxoRef::new(vec![7u8; 32], 2), utxo_ref);
    }

    #[test]
    fn packed_utxo_key_of_wrong_length_is_rejected() {
        let error = UtxoKey::Packed(vec![0u8; 35]).to_ref().unwrap_err();

        assert_eq!(InvalidUtxoKeyLength { actual: 35 }, error);
        assert!(error.to_string().contains("35"));
    }

    #[test]
    fn explicit_utxo_key_is_forwarded_unchanged() {
        let utxo_ref = UtxoRef::new(vec![1u8; 32], 9);

        assert_eq!(
            utxo_ref.clone(),
            UtxoKey::from(utxo_ref).to_ref().unwrap()
        );
    }

    #[test]
    fn tx_stage_maps_wire_values_and_degrades_unknown_codes() {
        assert_eq!(TxStage::Acknowledged, TxStage::from(1));
        assert_eq!(TxStage::Mempool, TxStage::from(2));
        assert_eq!(TxStage::Network, TxStage::from(3));
        assert_eq!(TxStage::Confirmed, TxStage::from(4));
        assert_eq!(TxStage::Unspecified, TxStage::from(0));
        assert_eq!(TxStage::Unspecified, TxStage::from(255));
    }
}
