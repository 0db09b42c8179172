//! # ctx-conditions
//!
//! Condition evaluation engine for the context server.
//!
//! [`ConditionEvaluator`] decides whether a profile, in the context of one
//! session, satisfies a condition tree. Profile and session predicates are
//! delegated to the store's matcher; event predicates are answered from
//! event queries with count bounds or the "last occurrence" rule; logical
//! conditions combine their sub-conditions.
//!
//! ## Key components
//!
//! - [`ConditionEvaluator`] — `match_condition` / `match_condition_json`
//! - [`EvaluationError`] — store failures; malformed conditions simply do not match

pub mod error;
pub mod evaluator;

pub use error::EvaluationError;
pub use evaluator::{
    ConditionEvaluator, EVENT_CONDITION_PARAMETER, EVENT_OCCUR_IN_PARAMETER, MAXIMUM_EVENT_COUNT_PARAMETER,
    MINIMUM_EVENT_COUNT_PARAMETER, OPERATOR_PARAMETER,
};
