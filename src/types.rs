//! Common types shared across the node
//!
//! Chain slugs decide which watchers and relay strategy a chain gets; the
//! database-compatible `TxError` records why a withdrawal bond was deferred.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Known chain families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainSlug {
    Ethereum,
    Optimism,
    Arbitrum,
    Nova,
    Base,
    PolygonZk,
    Gnosis,
    Polygon,
    Linea,
    ZkSync,
    Scroll,
}

impl ChainSlug {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainSlug::Ethereum => "ethereum",
            ChainSlug::Optimism => "optimism",
            ChainSlug::Arbitrum => "arbitrum",
            ChainSlug::Nova => "nova",
            ChainSlug::Base => "base",
            ChainSlug::PolygonZk => "polygonzk",
            ChainSlug::Gnosis => "gnosis",
            ChainSlug::Polygon => "polygon",
            ChainSlug::Linea => "linea",
            ChainSlug::ZkSync => "zksync",
            ChainSlug::Scroll => "scroll",
        }
    }

    pub fn is_l1(&self) -> bool {
        matches!(self, ChainSlug::Ethereum)
    }

    /// Optimistic rollups: roots from these chains are bonded on L1 because
    /// their native exit takes about a week.
    pub fn is_oru(&self) -> bool {
        matches!(
            self,
            ChainSlug::Optimism
                | ChainSlug::Arbitrum
                | ChainSlug::Nova
                | ChainSlug::Base
                | ChainSlug::PolygonZk
        )
    }
}

impl fmt::Display for ChainSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChainSlug {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let slug = match s.to_lowercase().as_str() {
            "ethereum" | "mainnet" => ChainSlug::Ethereum,
            "optimism" => ChainSlug::Optimism,
            "arbitrum" => ChainSlug::Arbitrum,
            "nova" => ChainSlug::Nova,
            "base" => ChainSlug::Base,
            "polygonzk" => ChainSlug::PolygonZk,
            "gnosis" | "xdai" => ChainSlug::Gnosis,
            "polygon" => ChainSlug::Polygon,
            "linea" => ChainSlug::Linea,
            "zksync" => ChainSlug::ZkSync,
            "scroll" => ChainSlug::Scroll,
            other => return Err(eyre::eyre!("Unknown chain slug: {}", other)),
        };
        Ok(slug)
    }
}

/// Reason a withdrawal bond attempt was deferred or abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
pub enum TxError {
    NotEnoughLiquidity,
    CallException,
    BonderFeeTooLow,
    RpcServerError,
}

impl TxError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxError::NotEnoughLiquidity => "not_enough_liquidity",
            TxError::CallException => "call_exception",
            TxError::BonderFeeTooLow => "bonder_fee_too_low",
            TxError::RpcServerError => "rpc_server_error",
        }
    }
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oru_set() {
        let oru: Vec<_> = [
            ChainSlug::Ethereum,
            ChainSlug::Optimism,
            ChainSlug::Arbitrum,
            ChainSlug::Nova,
            ChainSlug::Base,
            ChainSlug::PolygonZk,
            ChainSlug::Gnosis,
            ChainSlug::Polygon,
            ChainSlug::Linea,
        ]
        .into_iter()
        .filter(|s| s.is_oru())
        .collect();

        assert_eq!(
            oru,
            vec![
                ChainSlug::Optimism,
                ChainSlug::Arbitrum,
                ChainSlug::Nova,
                ChainSlug::Base,
                ChainSlug::PolygonZk
            ]
        );
        assert!(ChainSlug::Ethereum.is_l1());
        assert!(!ChainSlug::Ethereum.is_oru());
    }

    #[test]
    fn test_slug_parse() {
        assert_eq!("Arbitrum".parse::<ChainSlug>().unwrap(), ChainSlug::Arbitrum);
        assert_eq!("xdai".parse::<ChainSlug>().unwrap(), ChainSlug::Gnosis);
        assert!("fantom".parse::<ChainSlug>().is_err());
        assert_eq!(ChainSlug::PolygonZk.to_string(), "polygonzk");
    }

    #[test]
    fn test_tx_error_as_str() {
        assert_eq!(TxError::NotEnoughLiquidity.as_str(), "not_enough_liquidity");
        assert_eq!(format!("{}", TxError::CallException), "call_exception");
    }
}
