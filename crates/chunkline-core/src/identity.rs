//! Stream identity: which contract and which event method a record stream carries

use std::fmt;

/// Canonical event signature, e.g. `Transfer(address,address,uint256)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig(String);

impl MethodSig {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into().trim().to_string())
    }

    pub fn canonical(&self) -> &str {
        &self.0
    }

    /// Method name without the argument list (`Transfer`)
    pub fn name(&self) -> &str {
        self.0.split('(').next().unwrap_or_default()
    }

    /// Lowercased name, used in object keys (`transfer`)
    pub fn slug(&self) -> String {
        self.name().to_lowercase()
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical ingestion stream: a contract and one of its event methods.
///
/// Each stream owns its own accumulator and its own output namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub contract: String,
    pub method: MethodSig,
}

impl StreamId {
    pub fn new(contract: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            method: MethodSig::new(method),
        }
    }

    /// `<contract>_<method-slug>`, the stream's object-key namespace
    pub fn slug(&self) -> String {
        format!("{}_{}", self.contract, self.method.slug())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.contract, self.method.name())
    }
}
