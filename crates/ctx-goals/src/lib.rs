//! # ctx-goals
//!
//! Conversion goals and funnel reports for the context server.
//!
//! A [`Goal`] names a start condition and a target condition. While it is
//! enabled, [`GoalsService`] keeps two hidden [`Rule`]s registered that
//! stamp `<goalId>.start.reached` and `<goalId>.target.reached` on the
//! session when their condition matches. A [`GoalReport`] counts sessions
//! carrying those stamps, globally and per split bucket.
//!
//! ## Key components
//!
//! - [`Goal`] / [`Metadata`] — goal documents, persisted as `goal` items
//! - [`GoalsService`] — goal CRUD, rule compilation, predefined goals, reports
//! - [`RuleService`] — where compiled rules go ([`StoreRuleService`] keeps them in the store)
//! - [`GoalReport`] / [`Stat`] — funnel conversion figures

pub mod error;
pub mod goal;
pub mod report;
pub mod rule;
pub mod service;

pub use error::GoalError;
pub use goal::{FunnelStep, Goal, Metadata};
pub use report::{GoalReport, Split, Stat, SESSION_CREATION_DATE_SPLIT};
pub use rule::{Action, Rule, RuleService, StoreRuleService};
pub use service::{GoalsService, GoalsSettings};
