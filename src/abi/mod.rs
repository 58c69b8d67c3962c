//! Wire contract with the campaign ledger.
//!
//! Method signatures are matched character for character by the backend, so
//! they live here as constants next to the typed values passed through them.

use serde::{Deserialize, Serialize};

use crate::amount::BaseUnits;
use crate::error::{LedgerError, LedgerResult};

pub type Address = String;

/// Dynamically typed call argument or view result.
///
/// `uint256` travels as a decimal digit string, the way JSON-RPC clients
/// serialize big integers, so a backend can hand back values this layer
/// refuses to interpret.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AbiValue {
    Address(Address),
    String(String),
    Uint(String),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    pub fn uint(value: impl Into<BaseUnits>) -> Self {
        AbiValue::Uint(value.into().to_string())
    }

    pub fn abi_type(&self) -> &'static str {
        match self {
            AbiValue::Address(_) => "address",
            AbiValue::String(_) => "string",
            AbiValue::Uint(_) => "uint256",
            AbiValue::Array(_) => "array",
            AbiValue::Tuple(_) => "tuple",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    NonPayable,
    Payable,
    View,
}

/// A ledger method: exact signature plus what the ledger declares around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Method {
    pub signature: &'static str,
    pub returns: Option<&'static str>,
    pub mutability: Mutability,
}

pub const CREATE_CAMPAIGN: Method = Method {
    signature: "createCampaign(address,string,string,uint256,uint256,string)",
    returns: Some("(uint256)"),
    mutability: Mutability::NonPayable,
};

pub const DONATE_TO_CAMPAIGN: Method = Method {
    signature: "donateToCampaign(uint256)",
    returns: None,
    mutability: Mutability::Payable,
};

pub const GET_CAMPAIGNS: Method = Method {
    signature: "getCampaigns()",
    returns: Some("((address,string,string,uint256,uint256,uint256,string,address[],uint256[])[])"),
    mutability: Mutability::View,
};

pub const GET_DONATORS: Method = Method {
    signature: "getDonators(uint256)",
    returns: Some("(address[],uint256[])"),
    mutability: Mutability::View,
};

impl Method {
    pub fn name(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map(|(name, _)| name)
            .unwrap_or(self.signature)
    }

    /// Parameter type list in declaration order.
    pub fn param_types(&self) -> Vec<&'static str> {
        let inner = self
            .signature
            .split_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
            .unwrap_or("");
        if inner.is_empty() {
            return Vec::new();
        }
        inner.split(',').collect()
    }

    /// Full declaration, e.g. `donateToCampaign(uint256) payable`.
    pub fn declaration(&self) -> String {
        let mut out = self.signature.to_string();
        match self.mutability {
            Mutability::Payable => out.push_str(" payable"),
            Mutability::View => out.push_str(" view"),
            Mutability::NonPayable => {}
        }
        if let Some(returns) = self.returns {
            out.push_str(" returns ");
            out.push_str(returns);
        }
        out
    }

    /// Checks arity and value kinds against the parameter list.
    pub fn check_params(&self, params: &[AbiValue]) -> LedgerResult<()> {
        let expected = self.param_types();
        if expected.len() != params.len() {
            return Err(LedgerError::InvalidCallParameters {
                method: self.signature,
                reason: format!("expected {} parameters, got {}", expected.len(), params.len()),
            });
        }
        for (position, (ty, value)) in expected.iter().zip(params).enumerate() {
            if *ty != value.abi_type() {
                return Err(LedgerError::InvalidCallParameters {
                    method: self.signature,
                    reason: format!(
                        "parameter {position} must be {ty}, got {}",
                        value.abi_type()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A view call ready for the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadCall {
    pub method: Method,
    pub params: Vec<AbiValue>,
}

impl ReadCall {
    pub fn new(method: Method, params: Vec<AbiValue>) -> Self {
        Self { method, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_match_wire_contract() {
        assert_eq!(
            CREATE_CAMPAIGN.declaration(),
            "createCampaign(address,string,string,uint256,uint256,string) returns (uint256)"
        );
        assert_eq!(
            DONATE_TO_CAMPAIGN.declaration(),
            "donateToCampaign(uint256) payable"
        );
        assert_eq!(
            GET_CAMPAIGNS.declaration(),
            "getCampaigns() view returns ((address,string,string,uint256,uint256,uint256,string,address[],uint256[])[])"
        );
        assert_eq!(
            GET_DONATORS.declaration(),
            "getDonators(uint256) view returns (address[],uint256[])"
        );
    }

    #[test]
    fn param_types_follow_signature() {
        assert_eq!(CREATE_CAMPAIGN.name(), "createCampaign");
        assert_eq!(
            CREATE_CAMPAIGN.param_types(),
            vec!["address", "string", "string", "uint256", "uint256", "string"]
        );
        assert!(GET_CAMPAIGNS.param_types().is_empty());
    }

    #[test]
    fn check_params_rejects_wrong_kinds() {
        assert!(DONATE_TO_CAMPAIGN.check_params(&[AbiValue::uint(3u64)]).is_ok());
        let err = DONATE_TO_CAMPAIGN
            .check_params(&[AbiValue::String("3".into())])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidCallParameters { .. }));
        assert!(DONATE_TO_CAMPAIGN.check_params(&[]).is_err());
    }
}
