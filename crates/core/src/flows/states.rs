use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Conversation phase. Each stage has exactly one handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Greeting,
    Consultation,
    Analysis,
    Recommendation,
    DocumentCollection,
    DocumentProcessing,
    QuotationGeneration,
    QuotationDelivery,
    CommercialNotification,
    CompanyInformation,
    EquipmentDetail,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Greeting,
        Stage::Consultation,
        Stage::Analysis,
        Stage::Recommendation,
        Stage::DocumentCollection,
        Stage::DocumentProcessing,
        Stage::QuotationGeneration,
        Stage::QuotationDelivery,
        Stage::CommercialNotification,
        Stage::CompanyInformation,
        Stage::EquipmentDetail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Consultation => "consultation",
            Self::Analysis => "analysis",
            Self::Recommendation => "recommendation",
            Self::DocumentCollection => "document_collection",
            Self::DocumentProcessing => "document_processing",
            Self::QuotationGeneration => "quotation_generation",
            Self::QuotationDelivery => "quotation_delivery",
            Self::CommercialNotification => "commercial_notification",
            Self::CompanyInformation => "company_information",
            Self::EquipmentDetail => "equipment_detail",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| DomainError::UnknownStage(value.to_string()))
    }
}

/// Router output: run a stage handler, or stop and wait for the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Run(Stage),
    Wait,
}

/// What a handler asks the turn loop to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// The reply is final for this chain; it is logged and the router is consulted again.
    Reply,
    /// Fixed edge to another stage within the same turn.
    Chain(Stage),
    /// Consult the router without closing the chain.
    Reroute,
}

#[cfg(test)]
mod tests {
    use super::Stage;

    #[test]
    fn stage_names_round_trip_for_persistence() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
    }

    #[test]
    fn unknown_stage_name_is_rejected() {
        assert!("checkout".parse::<Stage>().is_err());
    }
}
