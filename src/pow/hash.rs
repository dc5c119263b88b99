use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

const HASH_LEN: usize = 32;
const ADDRESS_LEN: usize = 20;
const NONCE_OFFSET: usize = HASH_LEN + ADDRESS_LEN;
const PREIMAGE_LEN: usize = NONCE_OFFSET + 32;

/// Packed `(bytes32 base_hash, address miner, uint256 nonce)` preimage, the
/// same layout the contract hashes when it verifies a submission.
///
/// Only the trailing nonce word changes between attempts, so the search keeps
/// one of these and rewrites it in place.
#[derive(Clone)]
pub struct Preimage {
    bytes: [u8; PREIMAGE_LEN],
}

impl Preimage {
    pub fn new(base_hash: &H256, miner: &H160) -> Self {
        let mut bytes = [0u8; PREIMAGE_LEN];
        bytes[..HASH_LEN].copy_from_slice(base_hash.as_bytes());
        bytes[HASH_LEN..NONCE_OFFSET].copy_from_slice(miner.as_bytes());
        Self { bytes }
    }

    pub fn set_nonce(&mut self, nonce: &U256) {
        self.bytes[NONCE_OFFSET..].copy_from_slice(&nonce.to_big_endian());
    }

    pub fn digest(&self) -> H256 {
        let out: [u8; 32] = Keccak256::digest(self.bytes).into();
        H256::from(out)
    }
}

/// keccak256(base_hash ‖ miner ‖ nonce).
pub fn work_hash(base_hash: &H256, miner: &H160, nonce: &U256) -> H256 {
    let mut preimage = Preimage::new(base_hash, miner);
    preimage.set_nonce(nonce);
    preimage.digest()
}

/// A digest read as a big-endian unsigned integer.
pub fn hash_value(hash: &H256) -> U256 {
    U256::from_big_endian(hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let base = H256::repeat_byte(0x11);
        let miner = H160::repeat_byte(0xab);
        let nonce = U256::from(42u64);
        assert_eq!(
            work_hash(&base, &miner, &nonce),
            work_hash(&base, &miner, &nonce)
        );
    }

    #[test]
    fn every_field_contributes() {
        let base = H256::zero();
        let miner = H160::repeat_byte(0xab);
        let nonce = U256::from(7u64);
        let h = work_hash(&base, &miner, &nonce);

        assert_ne!(h, work_hash(&H256::repeat_byte(1), &miner, &nonce));
        assert_ne!(h, work_hash(&base, &H160::repeat_byte(0xac), &nonce));
        assert_ne!(h, work_hash(&base, &miner, &U256::from(8u64)));
    }

    #[test]
    fn matches_packed_keccak() {
        // keccak256 of 84 zero bytes, i.e. solidityPacked(0x00.., address(0), 0).
        let h = work_hash(&H256::zero(), &H160::zero(), &U256::zero());
        let expected: [u8; 32] = Keccak256::digest([0u8; 84]).into();
        assert_eq!(h.as_bytes(), &expected);
    }

    #[test]
    fn nonce_is_big_endian_uint256() {
        let base = H256::zero();
        let miner = H160::zero();
        let mut raw = [0u8; 84];
        raw[83] = 1;
        let expected: [u8; 32] = Keccak256::digest(raw).into();
        assert_eq!(
            work_hash(&base, &miner, &U256::one()).as_bytes(),
            &expected
        );
    }

    #[test]
    fn hash_value_is_big_endian() {
        let mut bytes = [0u8; 32];
        bytes[31] = 5;
        assert_eq!(hash_value(&H256::from(bytes)), U256::from(5u64));
        bytes[0] = 1;
        assert!(hash_value(&H256::from(bytes)) > U256::from(u128::MAX));
    }
}
