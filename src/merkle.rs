//! Merkle commitments over transfer ids
//!
//! Matches the bridge's on-chain verifier: each level hashes sorted pairs
//! (smaller value first) and the leaf layer is padded to a power of two with
//! `keccak256(bytes32(0))`.

use alloy::primitives::B256;

use crate::hash::keccak256;

/// Filler leaf used to pad the leaf layer: keccak256 of 32 zero bytes.
pub fn default_leaf() -> B256 {
    B256::from(keccak256(&[0u8; 32]))
}

/// Hash a pair of nodes, smaller value first.
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(lo.as_slice());
    data[32..].copy_from_slice(hi.as_slice());
    B256::from(keccak256(&data))
}

/// Compute the root over an ordered list of leaves.
///
/// An empty list yields the zero hash; a single leaf is its own root.
pub fn merkle_root(leaves: &[B256]) -> B256 {
    match leaves.len() {
        0 => return B256::ZERO,
        1 => return leaves[0],
        _ => {}
    }

    let width = leaves.len().next_power_of_two();
    let mut layer: Vec<B256> = Vec::with_capacity(width);
    layer.extend_from_slice(leaves);
    layer.resize(width, default_leaf());

    while layer.len() > 1 {
        layer = layer
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    layer[0]
}

/// True when `leaves` commit to `expected`.
pub fn verify_root(leaves: &[B256], expected: &B256) -> bool {
    !leaves.is_empty() && merkle_root(leaves) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::bytes32_to_hex;

    fn word(n: u8) -> B256 {
        let mut b = [0u8; 32];
        b[31] = n;
        B256::from(b)
    }

    #[test]
    fn test_default_leaf() {
        assert_eq!(
            bytes32_to_hex(&default_leaf().0),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merkle_root(&[]), B256::ZERO);
        assert_eq!(merkle_root(&[word(7)]), word(7));
        assert!(!verify_root(&[], &B256::ZERO));
    }

    #[test]
    fn test_two_leaves_order_independent() {
        let expected = "0xe90b7bceb6e7df5418fb78d8ee546e97c83a08bbccc01a0644d599ccd2a7c2e0";
        assert_eq!(bytes32_to_hex(&merkle_root(&[word(1), word(2)]).0), expected);
        assert_eq!(bytes32_to_hex(&merkle_root(&[word(2), word(1)]).0), expected);
    }

    #[test]
    fn test_three_leaves_golden_root() {
        let leaves = [word(1), word(2), word(3)];
        let root = merkle_root(&leaves);

        assert_eq!(
            bytes32_to_hex(&root.0),
            "0x4f7901f93f63ad7faaf7b02f727cf9df45a2c81755de36dd17b49e14f3e4f3ca"
        );
        assert_eq!(root, merkle_root(&leaves));
        assert!(verify_root(&leaves, &root));
    }

    #[test]
    fn test_five_leaves_pads_to_eight() {
        let leaves: Vec<B256> = (1..=5).map(word).collect();
        assert_eq!(
            bytes32_to_hex(&merkle_root(&leaves).0),
            "0xdd2211dcb507a1e23616a9a453099c38f14209a38f13d67a8ac3b259ba967dfa"
        );
    }

    #[test]
    fn test_verify_rejects_wrong_root() {
        let leaves = [word(1), word(2), word(3)];
        assert!(!verify_root(&leaves[..2], &merkle_root(&leaves)));
    }
}
