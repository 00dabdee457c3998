use rand;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::ID_LENGTH;

/// A 160-bit Kademlia identifier, stored big-endian.
///
/// Distance between two `Id`s is their bitwise XOR (`Id::xor`), and the
/// natural `Ord` on `Id` is plain lexicographic byte order -- used only to
/// break ties between two contacts that are equidistant from a lookup
/// target (spec.md's "ties broken by lexicographic ID order").
#[derive(PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Id(pub [u8; ID_LENGTH]);

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let hex_vec: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", hex_vec.join(""))
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Id) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Id) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Id {
    pub fn new(data: [u8; ID_LENGTH]) -> Self {
        Id(data)
    }

    /// Builds an `Id` from a big-endian byte slice, panicking if `data` is
    /// not exactly `ID_LENGTH` bytes -- used when decoding an on-wire
    /// identifier that some other collaborator has already validated.
    pub fn from_be_bytes(data: &[u8]) -> Self {
        let mut ret = [0u8; ID_LENGTH];
        ret.copy_from_slice(data);
        Id(ret)
    }

    pub fn rand() -> Self {
        let mut ret = Id([0; ID_LENGTH]);
        for byte in &mut ret.0 {
            *byte = rand::random::<u8>();
        }
        ret
    }

    /// Generates a random id in the range covered by the `index`-th routing
    /// bucket, i.e. sharing the holder's first `index` bits and differing at
    /// bit `index`. Used to refresh stale buckets.
    pub fn rand_in_bucket(holder: &Id, index: usize) -> Self {
        let mut ret = Id::rand();
        let bytes = index / 8;
        let bit = index % 8;
        for i in 0..bytes {
            ret.0[i] = holder.0[i];
        }
        let mask: u8 = if bit == 0 { 0 } else { 0xFFu8 << (8 - bit) };
        ret.0[bytes] = (holder.0[bytes] & mask) | (ret.0[bytes] & !mask);
        ret.0[bytes] ^= 1 << (7 - bit);
        ret
    }

    /// Bitwise XOR distance to another id.
    pub fn xor(&self, other: &Id) -> Id {
        let mut ret = [0; ID_LENGTH];
        for (i, byte) in ret.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Id(ret)
    }

    /// Number of leading zero bits, i.e. which routing bucket this distance
    /// falls into.
    pub fn leading_zeros(&self) -> usize {
        let mut ret = 0;
        for byte in &self.0 {
            if *byte == 0 {
                ret += 8;
            } else {
                return ret + byte.leading_zeros() as usize;
            }
        }
        ret
    }
}

/// Produces the `Id` a node or lookup target should use. The hash function
/// itself is a Non-goal (spec.md §1); this trait is the seam a caller plugs
/// a concrete digest into.
pub trait IdProvider {
    fn id_for(&self, data: &[u8]) -> Id;
}

/// Default `IdProvider`: SHA3-256 truncated to the first `ID_LENGTH` bytes.
#[derive(Default)]
pub struct Sha3IdProvider;

impl IdProvider for Sha3IdProvider {
    fn id_for(&self, data: &[u8]) -> Id {
        use sha3::{Digest, Sha3_256};
        let mut hasher = Sha3_256::default();
        hasher.input(data);
        let digest = hasher.result();
        Id::from_be_bytes(&digest[..ID_LENGTH])
    }
}

impl PartialEq<[u8; ID_LENGTH]> for Id {
    fn eq(&self, other: &[u8; ID_LENGTH]) -> bool {
        &self.0 == other
    }
}

#[cfg(test)]
mod tests {
    extern crate num_bigint;
    use self::num_bigint::BigUint;

    use super::Id;
    use crate::ID_LENGTH;

    #[test]
    fn xor_is_symmetric() {
        let a = Id::rand();
        let b = Id::rand();
        assert_eq!(a.xor(&b), b.xor(&a));
    }

    #[test]
    fn xor_with_self_is_zero() {
        let a = Id::rand();
        assert_eq!(a.xor(&a), Id::new([0u8; ID_LENGTH]));
    }

    #[test]
    fn rand_in_bucket_has_expected_leading_zeros() {
        let holder = Id::rand();
        for i in 0..ID_LENGTH * 8 {
            let candidate = Id::rand_in_bucket(&holder, i);
            assert_eq!(holder.xor(&candidate).leading_zeros(), i);
        }
    }

    #[test]
    fn ord_matches_unsigned_big_endian_comparison() {
        let a = Id::rand();
        let b = Id::rand();
        let expect = BigUint::from_bytes_be(&a.0).cmp(&BigUint::from_bytes_be(&b.0));
        assert_eq!(a.cmp(&b), expect);
    }
}
