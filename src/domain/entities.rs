//! Managed objects returned by the policy source and their typed records.
//!
//! The remote model hands out loosely typed attribute maps. Each class the
//! walker cares about is decoded into a record at the query boundary, with
//! attachment and contract attributes as explicit `Option`s.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::error::DomainError;

/// Distinguished name: the full hierarchy path of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dn(String);

impl Dn {
    pub fn new(dn: impl Into<String>) -> Self {
        Self(dn.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw managed object: class name plus attribute map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedObject {
    pub class: String,
    pub attributes: BTreeMap<String, String>,
}

impl ManagedObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Attribute value, `None` when absent.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute value, `None` when absent or empty.
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn required(&self, name: &str) -> Result<String, DomainError> {
        self.non_empty(name)
            .ok_or_else(|| DomainError::MalformedObject {
                class: self.class.clone(),
                message: format!("missing attribute '{}'", name),
            })
    }

    pub fn name(&self) -> Result<String, DomainError> {
        self.required("name")
    }

    pub fn dn(&self) -> Result<Dn, DomainError> {
        self.required("dn").map(Dn::new)
    }
}

/// Record decoded from a managed object of one class.
pub trait PolicyClass: Sized {
    /// Remote class name, e.g. `fvTenant`.
    const CLASS: &'static str;

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError>;
}

macro_rules! named_class {
    ($(#[$meta:meta])* $ty:ident, $class:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $ty {
            pub name: String,
            pub dn: Dn,
        }

        impl PolicyClass for $ty {
            const CLASS: &'static str = $class;

            fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
                Ok(Self {
                    name: mo.name()?,
                    dn: mo.dn()?,
                })
            }
        }
    };
}

named_class!(
    /// Top-level grouping unit.
    Tenant,
    "fvTenant"
);
named_class!(
    /// Routing domain.
    Vrf,
    "fvCtx"
);
named_class!(
    /// Layer-2 forwarding domain.
    BridgeDomain,
    "fvBD"
);
named_class!(
    /// External routed connection.
    L3Out,
    "l3extOut"
);
named_class!(
    /// Classification of external traffic under an L3Out.
    ExternalEpg,
    "l3extInstP"
);
named_class!(ApplicationProfile, "fvAp");
named_class!(EndpointGroup, "fvAEPg");

/// Subnet of a bridge domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdSubnet {
    pub ip: Option<String>,
}

impl PolicyClass for BdSubnet {
    const CLASS: &'static str = "fvSubnet";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            ip: mo.non_empty("ip"),
        })
    }
}

/// Subnet of an external EPG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSubnet {
    pub ip: Option<String>,
}

impl PolicyClass for ExternalSubnet {
    const CLASS: &'static str = "l3extSubnet";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            ip: mo.non_empty("ip"),
        })
    }
}

/// Bridge domain to VRF attachment stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdVrfAttachment {
    pub vrf: Option<String>,
}

impl PolicyClass for BdVrfAttachment {
    const CLASS: &'static str = "fvRsCtx";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            vrf: mo.non_empty("tnFvCtxName"),
        })
    }
}

/// L3Out to VRF attachment stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L3OutVrfAttachment {
    pub vrf: Option<String>,
}

impl PolicyClass for L3OutVrfAttachment {
    const CLASS: &'static str = "l3extRsEctx";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            vrf: mo.non_empty("tnFvCtxName"),
        })
    }
}

/// Bridge domain to L3Out attachment stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdL3OutAttachment {
    pub l3out: Option<String>,
}

impl PolicyClass for BdL3OutAttachment {
    const CLASS: &'static str = "fvRsBDToOut";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            l3out: mo.non_empty("tnL3extOutName"),
        })
    }
}

/// EPG to bridge domain attachment stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgBdAttachment {
    pub bridge_domain: Option<String>,
}

impl PolicyClass for EpgBdAttachment {
    const CLASS: &'static str = "fvRsBd";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self {
            bridge_domain: mo.non_empty("tnFvBDName"),
        })
    }
}

/// Which side of a contract the referencing entity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Provide,
    Consume,
}

/// Resolution state of a contract reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    Formed,
    MissingTarget,
    Other(String),
}

impl ResolutionState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "formed" => ResolutionState::Formed,
            "missing-target" => ResolutionState::MissingTarget,
            other => ResolutionState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionState::Formed => f.write_str("formed"),
            ResolutionState::MissingTarget => f.write_str("missing-target"),
            ResolutionState::Other(s) => f.write_str(s),
        }
    }
}

/// Contract reference held by an EPG or external EPG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRef {
    pub contract: Option<String>,
    pub state: ResolutionState,
    pub direction: Direction,
}

impl ContractRef {
    fn decode_with(mo: &ManagedObject, direction: Direction) -> Self {
        Self {
            contract: mo.non_empty("tnVzBrCPName"),
            state: ResolutionState::parse(mo.attr("state").unwrap_or_default()),
            direction,
        }
    }
}

/// `fvRsProv` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidedContract(pub ContractRef);

impl PolicyClass for ProvidedContract {
    const CLASS: &'static str = "fvRsProv";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self(ContractRef::decode_with(mo, Direction::Provide)))
    }
}

/// `fvRsCons` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedContract(pub ContractRef);

impl PolicyClass for ConsumedContract {
    const CLASS: &'static str = "fvRsCons";

    fn decode(mo: &ManagedObject) -> Result<Self, DomainError> {
        Ok(Self(ContractRef::decode_with(mo, Direction::Consume)))
    }
}
