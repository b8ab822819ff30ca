//! Query planning context.
//!
//! [`PlanCtx`] carries what the analyzer passes learn about a query beyond
//! the rewritten operator tree itself:
//! - The expansion limits in force
//! - The navigation expansion result, once that pass has run

use std::fmt;

use crate::{
    config::ExpansionConfig,
    query_planner::analyzer::navigation_expansion::NavigationExpansionResult,
};

#[derive(Debug, Clone)]
pub struct PlanCtx {
    config: ExpansionConfig,
    /// Set by the navigation expansion pass.
    navigation_result: Option<NavigationExpansionResult>,
}

impl PlanCtx {
    pub fn new(config: ExpansionConfig) -> Self {
        PlanCtx {
            config,
            navigation_result: None,
        }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn set_navigation_result(&mut self, result: NavigationExpansionResult) {
        self.navigation_result = Some(result);
    }

    pub fn navigation_result(&self) -> Option<&NavigationExpansionResult> {
        self.navigation_result.as_ref()
    }

    pub fn take_navigation_result(&mut self) -> Option<NavigationExpansionResult> {
        self.navigation_result.take()
    }
}

impl fmt::Display for PlanCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PlanCtx {{")?;
        writeln!(
            f,
            "  limits: navigation depth {}, operator depth {}",
            self.config.max_navigation_depth, self.config.max_operator_depth
        )?;
        match &self.navigation_result {
            Some(result) => writeln!(
                f,
                "  expanded: {} source mapping(s), element type {}",
                result.source_mappings.len(),
                result.element_type
            )?,
            None => writeln!(f, "  expanded: no")?,
        }
        write!(f, "}}")
    }
}
