//! 交易账户领域模型
//!
//! 账户类型命名格式：`ROLE.PLATFORM.STORAGE`，例如 `DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT`

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// 账户类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "HOST.STELLAR.ENV")]
    HostStellarEnv,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.STELLAR.ENV")]
    DistributionAccountStellarEnv,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT")]
    DistributionAccountStellarDbVault,
    #[serde(rename = "DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT")]
    DistributionAccountCircleDbVault,
}

/// 托管方式（签名后端的封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustodyKind {
    /// 本地加密金库
    LocalVault,
    /// 第三方托管（Circle）
    ExternalCustodian,
    /// 环境变量中的平台密钥
    HostManaged,
}

impl AccountType {
    pub fn all() -> [AccountType; 4] {
        [
            Self::HostStellarEnv,
            Self::DistributionAccountStellarEnv,
            Self::DistributionAccountStellarDbVault,
            Self::DistributionAccountCircleDbVault,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HostStellarEnv => "HOST.STELLAR.ENV",
            Self::DistributionAccountStellarEnv => "DISTRIBUTION_ACCOUNT.STELLAR.ENV",
            Self::DistributionAccountStellarDbVault => "DISTRIBUTION_ACCOUNT.STELLAR.DB_VAULT",
            Self::DistributionAccountCircleDbVault => "DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT",
        }
    }

    fn parts(&self) -> (&'static str, &'static str, &'static str) {
        let mut it = self.as_str().split('.');
        // as_str 总是三段式
        let role = it.next().unwrap_or_default();
        let platform = it.next().unwrap_or_default();
        let storage = it.next().unwrap_or_default();
        (role, platform, storage)
    }

    pub fn role(&self) -> &'static str {
        self.parts().0
    }

    pub fn platform(&self) -> &'static str {
        self.parts().1
    }

    pub fn storage_method(&self) -> &'static str {
        self.parts().2
    }

    pub fn is_stellar(&self) -> bool {
        self.platform() == "STELLAR"
    }

    pub fn is_circle(&self) -> bool {
        self.platform() == "CIRCLE"
    }

    pub fn custody_kind(&self) -> CustodyKind {
        match self {
            Self::HostStellarEnv | Self::DistributionAccountStellarEnv => CustodyKind::HostManaged,
            Self::DistributionAccountStellarDbVault => CustodyKind::LocalVault,
            Self::DistributionAccountCircleDbVault => CustodyKind::ExternalCustodian,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("invalid account type: {}", s))
    }
}

/// 账户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    PendingUserActivation,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::PendingUserActivation => "PENDING_USER_ACTIVATION",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "PENDING_USER_ACTIVATION" => Ok(Self::PendingUserActivation),
            other => Err(format!("invalid account status: {}", other)),
        }
    }
}

/// 用于签名/出资的账户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAccount {
    pub address: String,
    pub account_type: AccountType,
    pub status: AccountStatus,
    /// 外部托管钱包 ID（仅 Circle 账户）
    pub external_wallet_id: Option<String>,
}

impl TransactionAccount {
    pub fn stellar(address: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            address: address.into(),
            account_type,
            status: AccountStatus::Active,
            external_wallet_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_pending_user_activation(&self) -> bool {
        self.status == AccountStatus::PendingUserActivation
    }

    /// Circle 账户返回钱包 ID，其余返回地址
    pub fn id(&self) -> &str {
        if self.account_type.is_circle() {
            self.external_wallet_id.as_deref().unwrap_or_default()
        } else {
            &self.address
        }
    }
}

impl fmt::Display for TransactionAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TransactionAccount{{type={}, id={}, status={}}}",
            self.account_type,
            self.id(),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_parts() {
        let t = AccountType::DistributionAccountStellarDbVault;
        assert_eq!(t.role(), "DISTRIBUTION_ACCOUNT");
        assert_eq!(t.platform(), "STELLAR");
        assert_eq!(t.storage_method(), "DB_VAULT");
        assert!(t.is_stellar());
        assert!(!t.is_circle());

        assert!(AccountType::DistributionAccountCircleDbVault.is_circle());
    }

    #[test]
    fn test_account_type_parse() {
        for t in AccountType::all() {
            assert_eq!(t.as_str().parse::<AccountType>(), Ok(t));
        }
        assert_eq!(
            "host.stellar.env".parse::<AccountType>(),
            Ok(AccountType::HostStellarEnv)
        );
        assert!("CHANNEL_ACCOUNT.STELLAR.DB".parse::<AccountType>().is_err());
    }

    #[test]
    fn test_custody_kind() {
        assert_eq!(
            AccountType::HostStellarEnv.custody_kind(),
            CustodyKind::HostManaged
        );
        assert_eq!(
            AccountType::DistributionAccountStellarDbVault.custody_kind(),
            CustodyKind::LocalVault
        );
        assert_eq!(
            AccountType::DistributionAccountCircleDbVault.custody_kind(),
            CustodyKind::ExternalCustodian
        );
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&AccountType::DistributionAccountCircleDbVault).unwrap();
        assert_eq!(json, "\"DISTRIBUTION_ACCOUNT.CIRCLE.DB_VAULT\"");

        let status: AccountStatus = serde_json::from_str("\"PENDING_USER_ACTIVATION\"").unwrap();
        assert_eq!(status, AccountStatus::PendingUserActivation);
    }

    #[test]
    fn test_transaction_account_id() {
        let stellar = TransactionAccount::stellar("GABC", AccountType::DistributionAccountStellarEnv);
        assert_eq!(stellar.id(), "GABC");
        assert!(stellar.is_active());

        let circle = TransactionAccount {
            address: String::new(),
            account_type: AccountType::DistributionAccountCircleDbVault,
            status: AccountStatus::PendingUserActivation,
            external_wallet_id: Some("1000066041".into()),
        };
        assert_eq!(circle.id(), "1000066041");
        assert!(circle.is_pending_user_activation());
    }
}
