use crate::key::Key;
use crate::node::node_data::NodeData;
use crate::{FINGER_TABLE_SIZE, SUCCESSOR_LIST_SIZE};
use std::sync::Arc;

/// A node's view of the ring topology.
///
/// Entries are peer addresses; the empty string marks an unknown entry. `finger_table` always
/// holds exactly `FINGER_TABLE_SIZE` slots and `finger_table[0]` mirrors `successor_list[0]`.
#[derive(Clone, Debug)]
pub struct RingView {
    node_data: Arc<NodeData>,
    successor_list: [String; SUCCESSOR_LIST_SIZE],
    finger_table: Vec<String>,
    predecessor: String,
    next: usize,
}

impl RingView {
    /// Constructs a new, empty `RingView`.
    pub fn new(node_data: Arc<NodeData>) -> Self {
        RingView {
            node_data,
            successor_list: Default::default(),
            finger_table: vec![String::new(); FINGER_TABLE_SIZE],
            predecessor: String::new(),
            next: 1,
        }
    }

    /// Forgets every peer.
    pub fn reset(&mut self) {
        self.successor_list = Default::default();
        for finger in self.finger_table.iter_mut() {
            finger.clear();
        }
        self.predecessor.clear();
        self.next = 1;
    }

    /// Makes this node the only member of a new ring.
    pub fn create(&mut self) {
        self.reset();
        let addr = self.node_data.addr.clone();
        self.successor_list[0] = addr.clone();
        self.finger_table[0] = addr;
    }

    /// Enters an existing ring in front of `successor`, whose own successor list is
    /// `successor_list`. The predecessor stays unknown until someone notifies us.
    pub fn join(&mut self, successor: &str, successor_list: &[String; SUCCESSOR_LIST_SIZE]) {
        self.reset();
        self.set_successor(successor, successor_list);
    }

    /// Sets the immediate successor and refills the remaining slots from its successor list.
    pub fn set_successor(&mut self, successor: &str, successor_list: &[String; SUCCESSOR_LIST_SIZE]) {
        self.successor_list[0] = successor.to_string();
        self.successor_list[1..].clone_from_slice(&successor_list[..SUCCESSOR_LIST_SIZE - 1]);
        self.finger_table[0] = successor.to_string();
    }

    pub fn successor_list(&self) -> [String; SUCCESSOR_LIST_SIZE] {
        self.successor_list.clone()
    }

    pub fn predecessor(&self) -> &str {
        &self.predecessor
    }

    pub fn set_predecessor(&mut self, predecessor: &str) {
        self.predecessor = predecessor.to_string();
    }

    /// Clears the predecessor if it is still `predecessor`. Returns `true` if it was cleared.
    pub fn clear_predecessor_if(&mut self, predecessor: &str) -> bool {
        if self.predecessor == predecessor {
            self.predecessor.clear();
            true
        } else {
            false
        }
    }

    /// Returns `true` if `candidate` should replace the current predecessor: either none is
    /// known or `candidate` lies strictly between the current predecessor and this node. A node
    /// that is not part of a ring accepts nobody.
    pub fn accepts_predecessor(&self, candidate: &str) -> bool {
        if candidate.is_empty() || self.successor_list[0].is_empty() {
            return false;
        }
        self.predecessor.is_empty()
            || Key::hash(candidate).in_interval(
                &Key::hash(&self.predecessor),
                &self.node_data.id,
                false,
            )
    }

    pub fn finger(&self, index: usize) -> &str {
        &self.finger_table[index]
    }

    /// Returns the finger table entries lying strictly between this node and `target`, longest
    /// reach first. Consecutive duplicates are collapsed.
    pub fn preceding_fingers(&self, target: &Key) -> Vec<String> {
        let mut ret: Vec<String> = Vec::new();
        for finger in self.finger_table.iter().rev() {
            if finger.is_empty() || ret.last() == Some(finger) {
                continue;
            }
            if Key::hash(finger).in_interval(&self.node_data.id, target, false) {
                ret.push(finger.clone());
            }
        }
        ret
    }

    /// Returns the finger slot the next fix-finger tick refreshes.
    pub fn next_finger(&self) -> usize {
        self.next
    }

    /// Stores `addr` in finger `index` and moves the cursor past it. Slot 0 is owned by the
    /// successor list and is never written here.
    pub fn set_finger(&mut self, index: usize, addr: &str) {
        if index == 0 || index >= FINGER_TABLE_SIZE {
            return;
        }
        self.finger_table[index] = addr.to_string();
        self.next = index + 1;
        if self.next >= FINGER_TABLE_SIZE {
            self.next = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RingView;
    use crate::key::Key;
    use crate::node::node_data::NodeData;
    use crate::{FINGER_TABLE_SIZE, SUCCESSOR_LIST_SIZE};
    use std::sync::Arc;

    fn view(addr: &str) -> RingView {
        RingView::new(Arc::new(NodeData::new(addr)))
    }

    fn list(addrs: &[&str]) -> [String; SUCCESSOR_LIST_SIZE] {
        let mut ret: [String; SUCCESSOR_LIST_SIZE] = Default::default();
        for (slot, addr) in ret.iter_mut().zip(addrs) {
            *slot = addr.to_string();
        }
        ret
    }

    #[test]
    fn test_create() {
        let mut ring = view("a");
        ring.create();
        assert_eq!(ring.successor_list()[0], "a");
        assert_eq!(ring.finger(0), "a");
        assert_eq!(ring.predecessor(), "");
        assert_eq!(ring.next_finger(), 1);
    }

    #[test]
    fn test_set_successor_shifts_list() {
        let mut ring = view("a");
        ring.join("b", &list(&["c", "d", "e", "f", "g"]));
        assert_eq!(ring.successor_list(), list(&["b", "c", "d", "e", "f"]));
        assert_eq!(ring.finger(0), "b");
        assert_eq!(ring.predecessor(), "");
    }

    #[test]
    fn test_reset() {
        let mut ring = view("a");
        ring.join("b", &list(&["c"]));
        ring.set_predecessor("z");
        ring.set_finger(7, "b");
        ring.reset();
        assert_eq!(ring.successor_list(), list(&[]));
        assert_eq!(ring.finger(0), "");
        assert_eq!(ring.finger(7), "");
        assert_eq!(ring.predecessor(), "");
        assert_eq!(ring.next_finger(), 1);
    }

    #[test]
    fn test_finger_cursor_wraps_and_skips_zero() {
        let mut ring = view("a");
        ring.create();
        ring.set_finger(0, "x");
        assert_eq!(ring.finger(0), "a");
        ring.set_finger(FINGER_TABLE_SIZE - 1, "b");
        assert_eq!(ring.finger(FINGER_TABLE_SIZE - 1), "b");
        assert_eq!(ring.next_finger(), 1);
        ring.set_finger(1, "c");
        assert_eq!(ring.next_finger(), 2);
    }

    #[test]
    fn test_accepts_predecessor() {
        let mut ring = view("a");
        assert!(!ring.accepts_predecessor("b"));
        ring.create();
        assert!(ring.accepts_predecessor("b"));
        assert!(!ring.accepts_predecessor(""));

        let own_id = Key::hash("a");
        let candidates = ["b", "c", "d", "e"];
        ring.set_predecessor("b");
        for candidate in &candidates[1..] {
            let between = Key::hash(candidate).in_interval(&Key::hash("b"), &own_id, false);
            assert_eq!(ring.accepts_predecessor(candidate), between);
        }
    }

    #[test]
    fn test_clear_predecessor_if() {
        let mut ring = view("a");
        ring.set_predecessor("b");
        assert!(!ring.clear_predecessor_if("c"));
        assert_eq!(ring.predecessor(), "b");
        assert!(ring.clear_predecessor_if("b"));
        assert_eq!(ring.predecessor(), "");
    }

    #[test]
    fn test_preceding_fingers() {
        let mut ring = view("a");
        ring.create();
        let addrs = ["b", "c", "d", "e", "f", "g"];
        for (i, addr) in addrs.iter().enumerate() {
            ring.set_finger(i + 1, addr);
            ring.set_finger(i + 10, addr);
        }
        let own_id = Key::hash("a");
        let target = Key::hash("target");
        let fingers = ring.preceding_fingers(&target);
        for finger in &fingers {
            assert!(Key::hash(finger).in_interval(&own_id, &target, false));
        }
        for addr in addrs.iter() {
            let between = Key::hash(addr).in_interval(&own_id, &target, false);
            assert_eq!(fingers.iter().any(|f| f == addr), between);
        }
    }
}
