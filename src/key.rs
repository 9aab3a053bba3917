use sha1::{Digest, Sha1};
use std::fmt::{Debug, Display, Formatter, Result};

use crate::KEY_LENGTH;

/// A point on the identifier circle that represents nodes and data.
///
/// Keys are 160-bit SHA-1 digests stored big-endian, so the derived `Ord` is numeric order and
/// the circle has `2^160` points.
#[derive(Ord, PartialOrd, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, Default, Copy)]
pub struct Key(pub [u8; KEY_LENGTH]);

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let hex_vec: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", hex_vec.join(""))
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter) -> Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Key {
    /// Constructs a new `Key` from a byte array.
    pub fn new(data: [u8; KEY_LENGTH]) -> Self {
        Key(data)
    }

    /// Hashes `value` onto the identifier circle.
    pub fn hash(value: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(value.as_bytes());
        let mut data = [0; KEY_LENGTH];
        data.copy_from_slice(hasher.finalize().as_slice());
        Key::new(data)
    }

    /// Returns `true` if `self` lies clockwise after `left` and before `right`. `right` itself is
    /// included iff `closed_right`.
    ///
    /// When `right <= left` the interval wraps through zero, so `(left, left]` covers the whole
    /// circle and `(left, left)` covers everything except `left`.
    pub fn in_interval(&self, left: &Key, right: &Key, closed_right: bool) -> bool {
        let before_right = if closed_right {
            self <= right
        } else {
            self < right
        };
        if left < right {
            self > left && before_right
        } else {
            self > left || before_right
        }
    }

    /// Returns `(self + 2^index) mod 2^160`, the start of the range covered by finger `index`.
    pub fn finger_target(&self, index: usize) -> Key {
        debug_assert!(index < KEY_LENGTH * 8);
        let mut ret = *self;
        let mut byte = KEY_LENGTH - 1 - index / 8;
        let mut carry = 1u16 << (index % 8);
        loop {
            let sum = u16::from(ret.0[byte]) + carry;
            ret.0[byte] = sum as u8;
            carry = sum >> 8;
            if carry == 0 || byte == 0 {
                break;
            }
            byte -= 1;
        }
        ret
    }

    /// Constructs a new, random `Key`.
    #[cfg(test)]
    pub(crate) fn rand() -> Self {
        let mut ret = Key([0; KEY_LENGTH]);
        for byte in &mut ret.0 {
            *byte = rand::random::<u8>();
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::Key;
    use crate::KEY_LENGTH;

    fn small(value: u64) -> Key {
        let mut ret = [0u8; KEY_LENGTH];
        ret[KEY_LENGTH - 8..].copy_from_slice(&value.to_be_bytes());
        Key(ret)
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Key::hash("127.0.0.1:8000"), Key::hash("127.0.0.1:8000"));
        assert_ne!(Key::hash("127.0.0.1:8000"), Key::hash("127.0.0.1:8001"));
        assert_eq!(
            Key::hash("abc").to_string(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_in_interval_without_wrap() {
        let (l, r) = (small(10), small(250));
        assert!(small(11).in_interval(&l, &r, false));
        assert!(small(250).in_interval(&l, &r, true));
        assert!(!small(250).in_interval(&l, &r, false));
        assert!(!small(10).in_interval(&l, &r, true));
        assert!(!small(300).in_interval(&l, &r, true));
    }

    #[test]
    fn test_in_interval_with_wrap() {
        let (l, r) = (small(250), small(10));
        assert!(small(300).in_interval(&l, &r, true));
        assert!(small(5).in_interval(&l, &r, true));
        assert!(small(0).in_interval(&l, &r, false));
        assert!(small(10).in_interval(&l, &r, true));
        assert!(!small(10).in_interval(&l, &r, false));
        assert!(!small(250).in_interval(&l, &r, true));
        assert!(!small(100).in_interval(&l, &r, true));
        assert!(Key([0xFF; KEY_LENGTH]).in_interval(&l, &r, false));
    }

    #[test]
    fn test_in_interval_degenerate() {
        let k = small(42);
        assert!(small(42).in_interval(&k, &k, true));
        assert!(small(7).in_interval(&k, &k, true));
        assert!(!small(42).in_interval(&k, &k, false));
        assert!(small(7).in_interval(&k, &k, false));
    }

    #[test]
    fn test_in_interval_partitions_circle() {
        for _ in 0..1000 {
            let (a, b, x) = (Key::rand(), Key::rand(), Key::rand());
            if a == b {
                continue;
            }
            assert!(x.in_interval(&a, &b, true) != x.in_interval(&b, &a, true));
        }
    }

    #[test]
    fn test_finger_target() {
        let modulus = BigUint::from(1u8) << (KEY_LENGTH * 8);
        for _ in 0..20 {
            let key = Key::rand();
            for i in 0..KEY_LENGTH * 8 {
                let expected =
                    (BigUint::from_bytes_be(&key.0) + (BigUint::from(1u8) << i)) % &modulus;
                let actual = BigUint::from_bytes_be(&key.finger_target(i).0);
                assert_eq!(actual, expected);
            }
        }
    }

    #[test]
    fn test_finger_target_wraps() {
        let max = Key([0xFF; KEY_LENGTH]);
        assert_eq!(max.finger_target(0), Key([0; KEY_LENGTH]));
        assert_eq!(small(3).finger_target(1), small(5));
    }
}
