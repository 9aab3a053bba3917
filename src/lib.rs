extern crate bincode;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate sha1;
extern crate thiserror;

mod config;
mod error;
mod key;
mod node;
mod protocol;
mod routing;
mod rpc;
mod storage;

pub use self::config::{local_address, Config};
pub use self::error::{Error, Result};
pub use self::key::Key;
pub use self::node::node_data::NodeData;
pub use self::node::{DhtNode, Node};

/// The number of bytes in a key. SHA-1 digests are 20 bytes long.
const KEY_LENGTH: usize = 20;

/// The number of entries in the finger table, one per bit of the identifier space.
const FINGER_TABLE_SIZE: usize = KEY_LENGTH * 8;

/// The number of successors each node tracks.
const SUCCESSOR_LIST_SIZE: usize = 5;

/// The maximum length of an encoded message in bytes.
const MESSAGE_LENGTH: u64 = 64 * 1024 * 1024;
