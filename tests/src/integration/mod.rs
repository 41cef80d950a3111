//! Scenario tests, one module per concern.

pub mod dispatch;
pub mod publishing;
pub mod startup;
