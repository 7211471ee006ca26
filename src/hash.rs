//! Identifier hashes for transfers and transfer roots
//!
//! These must byte-match the bridge contracts:
//! - `transferId = keccak256(abi.encode(chainId, recipient, amount, transferNonce, bonderFee, amountOutMin, deadline))`
//! - `transferRootId = keccak256(abi.encodePacked(rootHash, totalAmount))`
//!
//! Every value is a 32-byte big-endian word, so `abi.encode` and `abi.encodePacked`
//! produce the same layout for the root id.

use alloy::primitives::{Address, B256, U256};
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Fields hashed into a transfer id, in contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferIdFields {
    /// Destination chain id
    pub chain_id: u64,
    pub recipient: Address,
    pub amount: U256,
    pub transfer_nonce: B256,
    pub bonder_fee: U256,
    pub amount_out_min: U256,
    pub deadline: U256,
}

/// Compute the transfer id that matches `Bridge.getTransferId`
pub fn transfer_id(fields: &TransferIdFields) -> B256 {
    // abi.encode layout: 7 words * 32 bytes = 224 bytes
    let mut data = [0u8; 224];

    // Word 0: chainId (uint256, we only use u64)
    data[24..32].copy_from_slice(&fields.chain_id.to_be_bytes());

    // Word 1: recipient (address, left-padded to 32 bytes)
    data[32 + 12..64].copy_from_slice(fields.recipient.as_slice());

    // Word 2: amount (uint256)
    data[64..96].copy_from_slice(&fields.amount.to_be_bytes::<32>());

    // Word 3: transferNonce (bytes32)
    data[96..128].copy_from_slice(fields.transfer_nonce.as_slice());

    // Word 4: bonderFee (uint256)
    data[128..160].copy_from_slice(&fields.bonder_fee.to_be_bytes::<32>());

    // Word 5: amountOutMin (uint256)
    data[160..192].copy_from_slice(&fields.amount_out_min.to_be_bytes::<32>());

    // Word 6: deadline (uint256)
    data[192..224].copy_from_slice(&fields.deadline.to_be_bytes::<32>());

    B256::from(keccak256(&data))
}

/// Compute the transfer root id that matches `Bridge.getTransferRootId`
pub fn transfer_root_id(root_hash: B256, total_amount: U256) -> B256 {
    let mut data = [0u8; 64];
    data[0..32].copy_from_slice(root_hash.as_slice());
    data[32..64].copy_from_slice(&total_amount.to_be_bytes::<32>());
    B256::from(keccak256(&data))
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(n: u8) -> B256 {
        let mut b = [0u8; 32];
        b[31] = n;
        B256::from(b)
    }

    #[test]
    fn test_keccak256() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
        assert_eq!(
            bytes32_to_hex(&keccak256(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_transfer_id_vector() {
        let fields = TransferIdFields {
            chain_id: 10,
            recipient: Address::repeat_byte(0x11),
            amount: U256::from(1_000_000_000_000_000_000u128),
            transfer_nonce: B256::repeat_byte(0x22),
            bonder_fee: U256::from(1_000_000_000_000_000u128),
            amount_out_min: U256::ZERO,
            deadline: U256::ZERO,
        };

        assert_eq!(
            bytes32_to_hex(&transfer_id(&fields).0),
            "0x6a9ae5508123a774b9f10f9df2254ed9bcf07d3c67821270c02b08f48022be05"
        );
        // Stable across calls
        assert_eq!(transfer_id(&fields), transfer_id(&fields));
    }

    #[test]
    fn test_transfer_id_depends_on_every_field() {
        let base = TransferIdFields {
            chain_id: 10,
            recipient: Address::repeat_byte(0x11),
            amount: U256::from(100u64),
            transfer_nonce: B256::repeat_byte(0x22),
            bonder_fee: U256::from(1u64),
            amount_out_min: U256::ZERO,
            deadline: U256::ZERO,
        };
        let id = transfer_id(&base);

        assert_ne!(id, transfer_id(&TransferIdFields { chain_id: 42161, ..base }));
        assert_ne!(id, transfer_id(&TransferIdFields { bonder_fee: U256::from(2u64), ..base }));
        assert_ne!(id, transfer_id(&TransferIdFields { deadline: U256::from(1u64), ..base }));
    }

    #[test]
    fn test_transfer_root_id_vector() {
        let root: B256 = "0x4f7901f93f63ad7faaf7b02f727cf9df45a2c81755de36dd17b49e14f3e4f3ca"
            .parse()
            .unwrap();

        let id = transfer_root_id(root, U256::from(1000u64));

        assert_eq!(
            bytes32_to_hex(&id.0),
            "0x80d4009b06f2818ad406e7b61bc83df23f6f9f92dcc4f263b3b3d22f7786a4c2"
        );
        assert_ne!(id, transfer_root_id(root, U256::from(1001u64)));
        assert_ne!(id, transfer_root_id(word(1), U256::from(1000u64)));
    }
}
