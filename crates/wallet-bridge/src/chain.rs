//! Chain metadata and chain selection.

use crate::{error::BridgeError, provider::WalletProvider};
use alloy_chains::NamedChain;
use alloy_primitives::ChainId;
use serde::{Deserialize, Serialize};

/// The native currency of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self { name: "Ether".to_string(), symbol: "ETH".to_string(), decimals: 18 }
    }
}

/// Static description of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainMeta {
    pub id: ChainId,
    pub name: &'static str,
    /// Preferred RPC endpoints.
    pub default_rpc_urls: &'static [&'static str],
    /// Fallback RPC endpoints, used when there are no preferred ones.
    pub public_rpc_urls: &'static [&'static str],
    /// `(name, symbol, decimals)`, `None` means ether.
    pub native_currency: Option<(&'static str, &'static str, u8)>,
}

impl ChainMeta {
    /// The RPC endpoints to hand to a wallet, in order of preference.
    pub fn rpc_urls(&self) -> &'static [&'static str] {
        if self.default_rpc_urls.is_empty() { self.public_rpc_urls } else { self.default_rpc_urls }
    }

    /// The first RPC endpoint, for display.
    pub fn rpc_url(&self) -> Option<&'static str> {
        self.rpc_urls().first().copied()
    }

    pub fn native_currency(&self) -> NativeCurrency {
        self.native_currency
            .map(|(name, symbol, decimals)| NativeCurrency {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals,
            })
            .unwrap_or_default()
    }
}

const fn chain(
    named: NamedChain,
    name: &'static str,
    default_rpc_urls: &'static [&'static str],
) -> ChainMeta {
    ChainMeta {
        id: named as u64,
        name,
        default_rpc_urls,
        public_rpc_urls: &[],
        native_currency: None,
    }
}

static CHAINS: &[ChainMeta] = &[
    chain(NamedChain::Mainnet, "Ethereum", &["https://eth.merkle.io"]),
    chain(NamedChain::Sepolia, "Sepolia", &["https://sepolia.drpc.org"]),
    chain(NamedChain::Holesky, "Holesky", &["https://ethereum-holesky-rpc.publicnode.com"]),
    chain(NamedChain::Optimism, "OP Mainnet", &["https://mainnet.optimism.io"]),
    chain(NamedChain::OptimismSepolia, "OP Sepolia", &["https://sepolia.optimism.io"]),
    chain(NamedChain::Arbitrum, "Arbitrum One", &["https://arb1.arbitrum.io/rpc"]),
    chain(
        NamedChain::ArbitrumSepolia,
        "Arbitrum Sepolia",
        &["https://sepolia-rollup.arbitrum.io/rpc"],
    ),
    chain(NamedChain::Base, "Base", &["https://mainnet.base.org"]),
    chain(NamedChain::BaseSepolia, "Base Sepolia", &["https://sepolia.base.org"]),
    ChainMeta {
        native_currency: Some(("POL", "POL", 18)),
        ..chain(NamedChain::Polygon, "Polygon", &["https://polygon-rpc.com"])
    },
    ChainMeta {
        native_currency: Some(("BNB", "BNB", 18)),
        ..chain(NamedChain::BinanceSmartChain, "BNB Smart Chain", &["https://56.rpc.thirdweb.com"])
    },
    ChainMeta {
        native_currency: Some(("xDAI", "XDAI", 18)),
        ..chain(NamedChain::Gnosis, "Gnosis", &["https://rpc.gnosischain.com"])
    },
    ChainMeta {
        native_currency: Some(("Avalanche", "AVAX", 18)),
        ..chain(NamedChain::Avalanche, "Avalanche", &["https://api.avax.network/ext/bc/C/rpc"])
    },
    ChainMeta {
        id: 31337,
        name: "Anvil",
        default_rpc_urls: &[],
        public_rpc_urls: &["http://127.0.0.1:8545"],
        native_currency: None,
    },
];

/// Looks up the metadata of a chain by id.
pub fn resolve(id: ChainId) -> Option<&'static ChainMeta> {
    CHAINS.iter().find(|chain| chain.id == id)
}

/// Parses a chain id given as a number, a `0x`-prefixed hex string, or a decimal string.
pub fn parse_chain_id(value: &serde_json::Value) -> Option<ChainId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => parse_chain_id_str(s),
        _ => None,
    }
}

/// String form of [`parse_chain_id`].
pub fn parse_chain_id_str(s: &str) -> Option<ChainId> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return u64::from_str_radix(hex, 16).ok();
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parameters of `wallet_addEthereumChain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    /// `0x`-prefixed hex chain id.
    pub chain_id: String,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency: NativeCurrency,
}

impl From<&ChainMeta> for AddChainParams {
    fn from(meta: &ChainMeta) -> Self {
        Self {
            chain_id: format!("{:#x}", meta.id),
            chain_name: meta.name.to_string(),
            rpc_urls: meta.rpc_urls().iter().map(|url| url.to_string()).collect(),
            native_currency: meta.native_currency(),
        }
    }
}

/// Makes sure the wallet is on `want`.
///
/// Does nothing when `want` is unset or already equals `have`. If the wallet does not know the
/// chain, it is registered from the static table and the switch is retried once. Any other
/// provider error, a user rejection included, is returned as is.
pub async fn ensure_chain_selected(
    provider: &dyn WalletProvider,
    want: Option<ChainId>,
    have: Option<ChainId>,
) -> Result<(), BridgeError> {
    let Some(want) = want.filter(|id| *id != 0) else { return Ok(()) };
    if Some(want) == have {
        return Ok(());
    }

    trace!(target: "wallet_bridge::chain", want, ?have, "switching chain");
    let err = match provider.switch_chain(want).await {
        Ok(()) => return Ok(()),
        Err(err) if err.is_unrecognized_chain() => err,
        Err(err) => return Err(err.into()),
    };

    let meta = resolve(want).ok_or(BridgeError::UnknownChain(want))?;
    debug!(target: "wallet_bridge::chain", chain = meta.name, %err, "registering chain with wallet");
    provider.add_chain(&AddChainParams::from(meta)).await?;
    provider.switch_chain(want).await?;
    Ok(())
}
