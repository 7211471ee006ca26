//! Bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings. `Bridge` holds the
//! surface shared by L1 and L2 deployments; `L1Bridge` and `L2Bridge` add the
//! layer-specific calls and events.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Functions and events present on every bridge deployment
    #[sol(rpc)]
    contract Bridge {
        /// Front a transfer's amount to its recipient ahead of the root
        function bondWithdrawal(
            address recipient,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee
        ) external;

        /// Reclaim bonded withdrawals once their root is set on this chain
        function settleBondedWithdrawals(
            address bonder,
            bytes32[] transferIds,
            uint256 totalAmount
        ) external;

        function getCredit(address bonder) external view returns (uint256);
        function getDebitAndAdditionalDebit(address bonder) external view returns (uint256);
        function getIsBonder(address maybeBonder) external view returns (bool);
        function isTransferIdSpent(bytes32 transferId) external view returns (bool);
        function getChainId() external view returns (uint256 chainId);
        function stake(address bonder, uint256 amount) external payable;

        /// Root as set on this chain; `total == 0` when unknown
        function getTransferRoot(bytes32 rootHash, uint256 totalAmount)
            external
            view
            returns (uint256 total, uint256 amountWithdrawn, uint256 createdAt);

        function getBondedWithdrawalAmount(address bonder, bytes32 transferId)
            external
            view
            returns (uint256);

        event WithdrawalBonded(bytes32 indexed transferId, uint256 amount);

        event Withdrew(
            bytes32 indexed transferId,
            address indexed recipient,
            uint256 amount,
            bytes32 transferNonce
        );

        event WithdrawalBondSettled(
            address indexed bonder,
            bytes32 indexed transferId,
            bytes32 indexed rootHash
        );

        event MultipleWithdrawalsSettled(
            address indexed bonder,
            bytes32 indexed rootHash,
            uint256 totalBondsSettled
        );

        event TransferRootSet(bytes32 indexed rootHash, uint256 totalAmount);
    }

    /// L2 bridge: transfer origination and commits
    #[sol(rpc)]
    contract L2Bridge {
        function commitTransfers(uint256 destinationChainId) external;

        function pendingAmountForChainId(uint256 chainId) external view returns (uint256);

        /// Bond and swap through the destination AMM
        function bondWithdrawalAndDistribute(
            address recipient,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee,
            uint256 amountOutMin,
            uint256 deadline
        ) external;

        function messengerProxy() external view returns (address);

        event TransferSent(
            bytes32 indexed transferId,
            uint256 indexed chainId,
            address indexed recipient,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee,
            uint256 index,
            uint256 amountOutMin,
            uint256 deadline
        );

        event TransfersCommitted(
            uint256 indexed destinationChainId,
            bytes32 indexed rootHash,
            uint256 totalAmount,
            uint256 rootCommittedAt
        );
    }

    /// L1 bridge: root bonds, confirmations and challenges
    #[sol(rpc)]
    contract L1Bridge {
        function bondTransferRoot(
            bytes32 rootHash,
            uint256 destinationChainId,
            uint256 totalAmount
        ) external;

        function challengeTransferBond(
            bytes32 rootHash,
            uint256 originalAmount,
            uint256 destinationChainId
        ) external payable;

        function resolveChallenge(
            bytes32 rootHash,
            uint256 originalAmount,
            uint256 destinationChainId
        ) external;

        function transferBonds(bytes32 transferRootId)
            external
            view
            returns (
                address bonder,
                uint256 createdAt,
                uint256 totalAmount,
                uint256 challengeStartTime,
                address challenger,
                bool challengeResolved
            );

        function transferRootCommittedAt(uint256 destinationChainId, bytes32 transferRootId)
            external
            view
            returns (uint256);

        function getBondForTransferAmount(uint256 amount) external view returns (uint256);
        function getChallengeAmountForTransferAmount(uint256 amount) external view returns (uint256);
        function challengePeriod() external view returns (uint256);
        function challengeResolutionPeriod() external view returns (uint256);
        function MIN_TRANSFER_ROOT_BOND_DELAY() external view returns (uint256);

        event TransferRootBonded(bytes32 indexed root, uint256 amount);

        event TransferRootConfirmed(
            uint256 indexed originChainId,
            uint256 indexed destinationChainId,
            bytes32 indexed rootHash,
            uint256 totalAmount
        );

        event TransferBondChallenged(
            bytes32 indexed transferRootId,
            bytes32 indexed rootHash,
            uint256 originalAmount
        );

        event ChallengeResolved(
            bytes32 indexed transferRootId,
            bytes32 indexed rootHash,
            uint256 originalAmount
        );
    }

    /// L1 messenger wrapper for one L2; batches root confirmations
    #[sol(rpc)]
    contract MessengerWrapper {
        function confirmRoots(
            bytes32[] rootHashes,
            uint256[] destinationChainIds,
            uint256[] totalAmounts,
            uint256[] rootCommittedAts
        ) external;

        function l2ChainId() external view returns (uint256);
    }

    /// ERC-4626 vault holding idle bonder liquidity
    #[sol(rpc)]
    contract Erc4626Vault {
        function balanceOf(address owner) external view returns (uint256);
        function convertToAssets(uint256 shares) external view returns (uint256);
        function withdraw(uint256 assets, address receiver, address owner)
            external
            returns (uint256 shares);
    }
}
