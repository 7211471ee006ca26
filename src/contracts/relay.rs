//! Messaging contracts used by the root-confirmation relay strategies

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Withdrawal as hashed by the OP stack message passer
    #[derive(Debug)]
    struct WithdrawalTransaction {
        uint256 nonce;
        address sender;
        address target;
        uint256 value;
        uint256 gasLimit;
        bytes data;
    }

    #[derive(Debug)]
    struct OutputRootProof {
        bytes32 version;
        bytes32 stateRoot;
        bytes32 messagePasserStorageRoot;
        bytes32 latestBlockhash;
    }

    #[derive(Debug)]
    struct OutputProposal {
        bytes32 outputRoot;
        uint128 timestamp;
        uint128 l2BlockNumber;
    }

    #[sol(rpc)]
    contract L2ToL1MessagePasser {
        event MessagePassed(
            uint256 indexed nonce,
            address indexed sender,
            address indexed target,
            uint256 value,
            uint256 gasLimit,
            bytes data,
            bytes32 withdrawalHash
        );
    }

    #[sol(rpc)]
    contract OptimismPortal {
        function proveWithdrawalTransaction(
            WithdrawalTransaction _tx,
            uint256 _l2OutputIndex,
            OutputRootProof _outputRootProof,
            bytes[] _withdrawalProof
        ) external;

        function finalizeWithdrawalTransaction(WithdrawalTransaction _tx) external;

        function finalizedWithdrawals(bytes32 withdrawalHash) external view returns (bool);

        function provenWithdrawals(bytes32 withdrawalHash)
            external
            view
            returns (bytes32 outputRoot, uint128 timestamp, uint128 l2OutputIndex);
    }

    #[sol(rpc)]
    contract L2OutputOracle {
        function latestBlockNumber() external view returns (uint256);
        function getL2OutputIndexAfter(uint256 _l2BlockNumber) external view returns (uint256);
        function getL2Output(uint256 _l2OutputIndex) external view returns (OutputProposal);
        function FINALIZATION_PERIOD_SECONDS() external view returns (uint256);
    }

    #[sol(rpc)]
    contract ArbSys {
        event L2ToL1Tx(
            address caller,
            address indexed destination,
            uint256 indexed hash,
            uint256 indexed position,
            uint256 arbBlockNum,
            uint256 ethBlockNum,
            uint256 timestamp,
            uint256 callvalue,
            bytes data
        );
    }

    #[sol(rpc)]
    contract NodeInterface {
        function constructOutboxProof(uint64 size, uint64 leaf)
            external
            view
            returns (bytes32 send, bytes32 root, bytes32[] proof);
    }

    #[sol(rpc)]
    contract ArbOutbox {
        function isSpent(uint256 index) external view returns (bool);

        function executeTransaction(
            bytes32[] proof,
            uint256 index,
            address l2Sender,
            address to,
            uint256 l2Block,
            uint256 l1Block,
            uint256 l2Timestamp,
            uint256 value,
            bytes data
        ) external;

        event SendRootUpdated(bytes32 indexed outputRoot, bytes32 indexed l2BlockHash);
    }

    /// AMB on the L2 side, where validators sign outgoing messages
    #[sol(rpc)]
    contract HomeAmb {
        event UserRequestForSignature(bytes32 indexed messageId, bytes encodedData);

        function numMessagesSigned(bytes32 messageHash) external view returns (uint256);
        function isAlreadyProcessed(uint256 number) external pure returns (bool);
        function signature(bytes32 messageHash, uint256 index) external view returns (bytes);
        function requiredSignatures() external view returns (uint256);
    }

    /// AMB on L1, which executes signed messages
    #[sol(rpc)]
    contract ForeignAmb {
        function relayedMessages(bytes32 messageId) external view returns (bool);
        function executeSignatures(bytes data, bytes signatures) external;
    }

    #[sol(rpc)]
    contract FxChildTunnel {
        function fxRootTunnel() external view returns (address);
    }

    #[sol(rpc)]
    contract FxRootTunnel {
        function receiveMessage(bytes inputData) external;
    }
}
