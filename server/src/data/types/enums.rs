//! Enumerated column values shared by both backends

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of flow that produced a metered execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowType {
    Chatflow,
    Agentflow,
    Assistant,
    Multiagent,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chatflow => "CHATFLOW",
            Self::Agentflow => "AGENTFLOW",
            Self::Assistant => "ASSISTANT",
            Self::Multiagent => "MULTIAGENT",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHATFLOW" => Ok(Self::Chatflow),
            "AGENTFLOW" => Ok(Self::Agentflow),
            "ASSISTANT" => Ok(Self::Assistant),
            "MULTIAGENT" => Ok(Self::Multiagent),
            other => Err(format!("Unknown flow type: {}", other)),
        }
    }
}

/// Ledger row type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionType {
    Topup,
    Consume,
    Adjust,
    Checkin,
}

impl CreditTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::Consume => "consume",
            Self::Adjust => "adjust",
            Self::Checkin => "checkin",
        }
    }
}

impl fmt::Display for CreditTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditTransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topup" => Ok(Self::Topup),
            "consume" => Ok(Self::Consume),
            "adjust" => Ok(Self::Adjust),
            "checkin" => Ok(Self::Checkin),
            other => Err(format!("Unknown credit transaction type: {}", other)),
        }
    }
}
