//! Fluent construction of operator trees.
//!
//! # Example
//!
//! ```ignore
//! let o = Symbol::new("o", ElementType::entity("Order"));
//! let plan = PlanBuilder::scan("Order")
//!     .filter(o.clone(), eq(param(&o).member("Customer").member("Name"), lit_str("Acme")))
//!     .select(o.clone(), param(&o).member("Id"))
//!     .build();
//! ```

use std::sync::Arc;

use crate::query_planner::logical_expr::{Expr, Lambda, Symbol};

use super::{IncludeTarget, QueryOperator, ReducerKind};

#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: Arc<QueryOperator>,
}

impl PlanBuilder {
    pub fn scan(entity: &str) -> Self {
        PlanBuilder {
            plan: Arc::new(QueryOperator::scan(entity)),
        }
    }

    pub fn source(expr: Expr) -> Self {
        PlanBuilder {
            plan: Arc::new(QueryOperator::Source { expr }),
        }
    }

    pub fn from_plan(plan: Arc<QueryOperator>) -> Self {
        PlanBuilder { plan }
    }

    pub fn build(self) -> Arc<QueryOperator> {
        self.plan
    }

    fn wrap(self, make: impl FnOnce(Arc<QueryOperator>) -> QueryOperator) -> Self {
        PlanBuilder {
            plan: Arc::new(make(self.plan)),
        }
    }

    pub fn filter(self, param: Symbol, predicate: Expr) -> Self {
        self.wrap(|input| QueryOperator::Where {
            input,
            predicate: Lambda::unary(param, predicate),
        })
    }

    pub fn select(self, param: Symbol, body: Expr) -> Self {
        self.wrap(|input| QueryOperator::Select {
            input,
            selector: Lambda::unary(param, body),
        })
    }

    pub fn order_by(self, param: Symbol, key: Expr, descending: bool) -> Self {
        self.wrap(|input| QueryOperator::OrderBy {
            input,
            key: Lambda::unary(param, key),
            descending,
        })
    }

    pub fn then_by(self, param: Symbol, key: Expr, descending: bool) -> Self {
        self.wrap(|input| QueryOperator::ThenBy {
            input,
            key: Lambda::unary(param, key),
            descending,
        })
    }

    pub fn join(
        self,
        inner: Arc<QueryOperator>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> Self {
        self.wrap(|outer| QueryOperator::Join {
            outer,
            inner,
            outer_key,
            inner_key,
            result,
        })
    }

    pub fn group_join(
        self,
        inner: Arc<QueryOperator>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> Self {
        self.wrap(|outer| QueryOperator::GroupJoin {
            outer,
            inner,
            outer_key,
            inner_key,
            result,
        })
    }

    pub fn select_many(self, collection: Lambda, result: Option<Lambda>) -> Self {
        self.wrap(|input| QueryOperator::SelectMany {
            input,
            collection,
            result,
        })
    }

    pub fn group_by(self, key: Lambda, element: Option<Lambda>) -> Self {
        self.wrap(|input| QueryOperator::GroupBy {
            input,
            key,
            element,
        })
    }

    pub fn all(self, param: Symbol, predicate: Expr) -> Self {
        self.wrap(|input| QueryOperator::All {
            input,
            predicate: Lambda::unary(param, predicate),
        })
    }

    pub fn any(self, predicate: Option<Lambda>) -> Self {
        self.wrap(|input| QueryOperator::Any { input, predicate })
    }

    pub fn count(self, predicate: Option<Lambda>) -> Self {
        self.wrap(|input| QueryOperator::Count { input, predicate })
    }

    pub fn average(self, selector: Option<Lambda>) -> Self {
        self.wrap(|input| QueryOperator::Average { input, selector })
    }

    pub fn distinct(self) -> Self {
        self.wrap(|input| QueryOperator::Distinct { input })
    }

    pub fn default_if_empty(self, default: Option<Expr>) -> Self {
        self.wrap(|input| QueryOperator::DefaultIfEmpty { input, default })
    }

    pub fn as_tracking(self) -> Self {
        self.wrap(|input| QueryOperator::AsTracking { input })
    }

    pub fn as_no_tracking(self) -> Self {
        self.wrap(|input| QueryOperator::AsNoTracking { input })
    }

    pub fn reduce(self, kind: ReducerKind) -> Self {
        self.wrap(|input| QueryOperator::CardinalityReducer {
            input,
            kind,
            predicate: None,
        })
    }

    pub fn reduce_where(self, kind: ReducerKind, predicate: Lambda) -> Self {
        self.wrap(|input| QueryOperator::CardinalityReducer {
            input,
            kind,
            predicate: Some(predicate),
        })
    }

    pub fn of_type(self, entity: &str) -> Self {
        self.wrap(|input| QueryOperator::OfType {
            input,
            entity: entity.to_string(),
        })
    }

    pub fn skip(self, count: Expr) -> Self {
        self.wrap(|input| QueryOperator::Skip { input, count })
    }

    pub fn take(self, count: Expr) -> Self {
        self.wrap(|input| QueryOperator::Take { input, count })
    }

    pub fn include(self, param: Symbol, navigation: Expr) -> Self {
        self.wrap(|input| QueryOperator::Include {
            input,
            navigation: IncludeTarget::Lambda(Lambda::unary(param, navigation)),
        })
    }

    pub fn include_path(self, path: &str) -> Self {
        self.wrap(|input| QueryOperator::Include {
            input,
            navigation: IncludeTarget::Path(path.to_string()),
        })
    }

    pub fn then_include(self, param: Symbol, navigation: Expr) -> Self {
        self.wrap(|input| QueryOperator::ThenInclude {
            input,
            navigation: Lambda::unary(param, navigation),
        })
    }
}
