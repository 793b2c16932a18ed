use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::RebalanceError;
use crate::core::types::{Address, Result};

/// 已知的资产
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    Usdc,
    Uni,
    Weth,
    Usdt,
    Dai,
}

impl Asset {
    pub const ALL: [Asset; 5] = [Asset::Usdc, Asset::Uni, Asset::Weth, Asset::Usdt, Asset::Dai];

    pub fn name(&self) -> &'static str {
        match self {
            Asset::Usdc => "usdc",
            Asset::Uni => "uni",
            Asset::Weth => "weth",
            Asset::Usdt => "usdt",
            Asset::Dai => "dai",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Asset {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Asset::ALL
            .iter()
            .copied()
            .find(|asset| asset.name() == key)
            .ok_or_else(|| RebalanceError::UnknownAsset(s.to_string()))
    }
}

/// 已知的质押协议
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Uniswap,
    CompoundV3,
    UsdxMoney,
    StargateV3,
    AaveV3,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Uniswap,
        Protocol::CompoundV3,
        Protocol::UsdxMoney,
        Protocol::StargateV3,
        Protocol::AaveV3,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Uniswap => "uniswap",
            Protocol::CompoundV3 => "compoundv3",
            Protocol::UsdxMoney => "usdxmoney",
            Protocol::StargateV3 => "stargatev3",
            Protocol::AaveV3 => "aavev3",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = RebalanceError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Protocol::ALL
            .iter()
            .copied()
            .find(|protocol| protocol.name() == key)
            .ok_or_else(|| RebalanceError::UnknownProtocol(s.to_string()))
    }
}

/// 配置文件中的单个部署（未校验）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDeployment {
    pub swap_router: String,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub protocols: BTreeMap<String, String>,
}

/// 校验后的网络配置：路由合约、资产地址、协议地址
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub swap_router: Address,
    tokens: HashMap<Asset, Address>,
    protocols: HashMap<Protocol, Address>,
}

impl NetworkConfig {
    /// 从配置部署构建并校验
    pub fn from_deployment(name: &str, deployment: &NetworkDeployment) -> Result<Self> {
        let swap_router = Address::parse(&deployment.swap_router)?;

        let mut tokens = HashMap::new();
        for (key, value) in &deployment.tokens {
            let asset: Asset = key.parse()?;
            tokens.insert(asset, Address::parse(value)?);
        }

        let mut protocols = HashMap::new();
        for (key, value) in &deployment.protocols {
            let protocol: Protocol = key.parse()?;
            protocols.insert(protocol, Address::parse(value)?);
        }

        let config = Self {
            name: name.to_string(),
            swap_router,
            tokens,
            protocols,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&Address, String> = HashMap::new();
        seen.insert(&self.swap_router, "swap_router".to_string());

        let entries = self
            .tokens
            .iter()
            .map(|(asset, address)| (address, format!("token:{}", asset)))
            .chain(
                self.protocols
                    .iter()
                    .map(|(protocol, address)| (address, format!("protocol:{}", protocol))),
            );

        for (address, label) in entries {
            if let Some(existing) = seen.get(address) {
                return Err(RebalanceError::ConfigError(format!(
                    "网络 {} 中地址 {} 同时配置给了 {} 和 {}",
                    self.name, address, existing, label
                )));
            }
            seen.insert(address, label);
        }

        Ok(())
    }

    pub fn token_address(&self, asset: Asset) -> Result<&Address> {
        self.tokens
            .get(&asset)
            .ok_or_else(|| RebalanceError::UnknownAsset(asset.to_string()))
    }

    pub fn protocol_address(&self, protocol: Protocol) -> Result<&Address> {
        self.protocols
            .get(&protocol)
            .ok_or_else(|| RebalanceError::UnknownProtocol(protocol.to_string()))
    }

    /// 按名称查找资产地址
    pub fn token_by_name(&self, name: &str) -> Result<&Address> {
        self.token_address(name.parse()?)
    }

    /// 按名称查找协议地址
    pub fn protocol_by_name(&self, name: &str) -> Result<&Address> {
        self.protocol_address(name.parse()?)
    }

    /// 反查协议名称（用于日志）
    pub fn protocol_of(&self, address: &Address) -> Option<Protocol> {
        self.protocols
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(p, _)| *p)
    }

    pub fn asset_of(&self, address: &Address) -> Option<Asset> {
        self.tokens
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(asset, _)| *asset)
    }

    /// 日志友好的协议标签
    pub fn describe_protocol(&self, address: &Address) -> String {
        match self.protocol_of(address) {
            Some(protocol) => format!("{}({})", protocol, address),
            None => address.to_string(),
        }
    }

    pub fn describe_token(&self, address: &Address) -> String {
        match self.asset_of(address) {
            Some(asset) => format!("{}({})", asset, address),
            None => address.to_string(),
        }
    }
}
