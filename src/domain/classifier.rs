//! Contract relationship classification.
//!
//! Decides from a contract reference's resolution state and direction which
//! contract node and edge to emit. Works the same for any referencing entity.

use crate::domain::entities::{ContractRef, Direction, ResolutionState};
use crate::domain::graph::{Color, EdgeSpec, NodeSpec, NodeStyle, Shape};
use crate::domain::identity::NodeKey;

/// What to draw for one contract reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractDecision {
    Draw(ContractDrawing),
    /// The reference names no contract.
    Absent,
    /// The state is neither `formed` nor `missing-target`.
    Unclassified(String),
}

/// Node and edge for one classified reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDrawing {
    pub contract: String,
    pub node: NodeSpec,
    pub edge: EdgeSpec,
    pub direction: Direction,
}

impl ContractDrawing {
    /// Edge endpoints: provider points at the contract, the contract points at its consumer.
    pub fn endpoints<'a>(
        &self,
        referencer: &'a NodeKey,
        contract: &'a NodeKey,
    ) -> (&'a NodeKey, &'a NodeKey) {
        match self.direction {
            Direction::Provide => (referencer, contract),
            Direction::Consume => (contract, referencer),
        }
    }
}

/// Short edge tag distinguishing provide from consume.
pub fn direction_tag(direction: Direction) -> &'static str {
    match direction {
        Direction::Provide => "p",
        Direction::Consume => "c",
    }
}

pub fn classify(reference: &ContractRef) -> ContractDecision {
    let Some(contract) = reference.contract.as_deref() else {
        return ContractDecision::Absent;
    };
    let (prefix, color) = match &reference.state {
        ResolutionState::Formed => ("Contract", Color::LightGray),
        ResolutionState::MissingTarget => ("Missing Contract", Color::Coral),
        ResolutionState::Other(state) => return ContractDecision::Unclassified(state.clone()),
    };
    ContractDecision::Draw(ContractDrawing {
        contract: contract.to_string(),
        node: NodeSpec::new(format!("{}\n{}", prefix, contract))
            .shape(Shape::Box)
            .style(NodeStyle::Filled)
            .color(color),
        edge: EdgeSpec::solid().label(direction_tag(reference.direction)),
        direction: reference.direction,
    })
}
