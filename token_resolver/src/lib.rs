// ERC-20 symbol lookup for token transfers the explorer did not label

pub mod abi;
pub mod resolver;
pub mod rpc;

pub use abi::{decode_abi_string, decode_bytes32_string, decode_hex_payload, SYMBOL_SELECTOR};
pub use resolver::{TokenSymbolResolver, UNKNOWN_SYMBOL};
pub use rpc::{ContractReader, JsonRpcReader, RpcError};
