use crate::key::Key;
use std::fmt::{Debug, Formatter, Result};

/// The identity of a ring member: its address and the hash of that address.
#[derive(PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub addr: String,
    pub id: Key,
}

impl NodeData {
    pub fn new(addr: &str) -> Self {
        NodeData {
            addr: addr.to_string(),
            id: Key::hash(addr),
        }
    }
}

impl Debug for NodeData {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{} - {:?}", self.addr, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::NodeData;
    use crate::key::Key;

    #[test]
    fn test_id_is_address_hash() {
        let node_data = NodeData::new("127.0.0.1:9000");
        assert_eq!(node_data.addr, "127.0.0.1:9000");
        assert_eq!(node_data.id, Key::hash("127.0.0.1:9000"));
    }
}
