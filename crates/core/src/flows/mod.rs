pub mod rules;
pub mod states;

pub use rules::{has_pricing_intent, RoutingRules, RuleDecision};
pub use states::{Route, Stage, StageOutcome};
