//! Chain adapters: pure conversions between the chain-neutral domain
//! entities and the chain-tagged wire envelopes of the UTxO RPC protocol.

mod cardano;
mod interface;

pub use cardano::*;
pub use interface::*;
