//! 提交交易状态机
//! 所有提交到账本的交易共用这一组状态，对账决策也基于它

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 提交交易状态
///
/// Pending → Processing → {Success, Error}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// 已入队，等待提交
    Pending,

    /// 正在提交到账本
    Processing,

    /// 账本确认成功
    Success,

    /// 提交失败
    Error,
}

/// 非法状态转换
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot transition from {from} to {to}")]
pub struct StateTransitionError {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl TransactionStatus {
    pub fn all() -> [TransactionStatus; 4] {
        [Self::Pending, Self::Processing, Self::Success, Self::Error]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }

    /// 是否为最终状态（不可再转换）
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// 验证状态转换合法性
    ///
    /// 只做校验，不修改任何存储状态；调用方在校验通过后再持久化新状态
    pub fn can_transition_to(&self, target: TransactionStatus) -> Result<(), StateTransitionError> {
        use TransactionStatus::*;

        match (self, target) {
            (Pending, Processing) | (Processing, Success) | (Processing, Error) => Ok(()),
            _ => Err(StateTransitionError {
                from: *self,
                to: target,
            }),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("invalid transaction status: {}", other)),
        }
    }
}
