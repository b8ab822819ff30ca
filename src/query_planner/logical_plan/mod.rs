use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    entity_catalog::{EntityModel, ScalarKind},
    query_planner::{
        logical_expr::{visitors::ExpressionRewriter, Expr, Lambda},
        types::ElementType,
    },
};

pub mod plan_builder;

/// Row-count reducing terminal operators.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ReducerKind {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReducerKind::First => "First",
            ReducerKind::FirstOrDefault => "FirstOrDefault",
            ReducerKind::Single => "Single",
            ReducerKind::SingleOrDefault => "SingleOrDefault",
        };
        f.write_str(name)
    }
}

/// Argument of an `Include` hint.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum IncludeTarget {
    /// `Include(o => o.Customer)`
    Lambda(Lambda),
    /// `Include("Customer.Address")`
    Path(String),
}

/// Discriminant of [`QueryOperator`], used for logging and error context.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum OperatorKind {
    EntityScan,
    Source,
    Where,
    Select,
    OrderBy,
    ThenBy,
    Join,
    GroupJoin,
    SelectMany,
    GroupBy,
    All,
    Any,
    Count,
    Average,
    Distinct,
    DefaultIfEmpty,
    AsTracking,
    AsNoTracking,
    CardinalityReducer,
    OfType,
    Skip,
    Take,
    Include,
    ThenInclude,
    MaterializeCollectionNavigation,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum QueryOperator {
    /// All rows of an entity type.
    EntityScan { entity: String },

    /// A sequence-valued expression used as a source, e.g. a grouping.
    Source { expr: Expr },

    Where {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        predicate: Lambda,
    },

    Select {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        selector: Lambda,
    },

    OrderBy {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        key: Lambda,
        #[serde(default)]
        descending: bool,
    },

    ThenBy {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        key: Lambda,
        #[serde(default)]
        descending: bool,
    },

    Join {
        #[serde(with = "crate::utils::serde_arc")]
        outer: Arc<QueryOperator>,
        #[serde(with = "crate::utils::serde_arc")]
        inner: Arc<QueryOperator>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    },

    /// Like `Join`, but the result selector's second argument is the
    /// sequence of matching inner rows.
    GroupJoin {
        #[serde(with = "crate::utils::serde_arc")]
        outer: Arc<QueryOperator>,
        #[serde(with = "crate::utils::serde_arc")]
        inner: Arc<QueryOperator>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    },

    SelectMany {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        collection: Lambda,
        #[serde(default)]
        result: Option<Lambda>,
    },

    GroupBy {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        key: Lambda,
        #[serde(default)]
        element: Option<Lambda>,
    },

    All {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        predicate: Lambda,
    },

    Any {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        #[serde(default)]
        predicate: Option<Lambda>,
    },

    Count {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        #[serde(default)]
        predicate: Option<Lambda>,
    },

    Average {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        #[serde(default)]
        selector: Option<Lambda>,
    },

    Distinct {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
    },

    DefaultIfEmpty {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        #[serde(default)]
        default: Option<Expr>,
    },

    AsTracking {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
    },

    AsNoTracking {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
    },

    CardinalityReducer {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        kind: ReducerKind,
        #[serde(default)]
        predicate: Option<Lambda>,
    },

    OfType {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        entity: String,
    },

    Skip {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        count: Expr,
    },

    Take {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        count: Expr,
    },

    Include {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        navigation: IncludeTarget,
    },

    ThenInclude {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        navigation: Lambda,
    },

    /// Marks a correlated subquery as the value of a collection navigation.
    MaterializeCollectionNavigation {
        #[serde(with = "crate::utils::serde_arc")]
        input: Arc<QueryOperator>,
        /// `Entity.Relationship` of the collection being materialized.
        relationship: String,
    },
}

impl QueryOperator {
    pub fn scan(entity: &str) -> QueryOperator {
        QueryOperator::EntityScan {
            entity: entity.to_string(),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            QueryOperator::EntityScan { .. } => OperatorKind::EntityScan,
            QueryOperator::Source { .. } => OperatorKind::Source,
            QueryOperator::Where { .. } => OperatorKind::Where,
            QueryOperator::Select { .. } => OperatorKind::Select,
            QueryOperator::OrderBy { .. } => OperatorKind::OrderBy,
            QueryOperator::ThenBy { .. } => OperatorKind::ThenBy,
            QueryOperator::Join { .. } => OperatorKind::Join,
            QueryOperator::GroupJoin { .. } => OperatorKind::GroupJoin,
            QueryOperator::SelectMany { .. } => OperatorKind::SelectMany,
            QueryOperator::GroupBy { .. } => OperatorKind::GroupBy,
            QueryOperator::All { .. } => OperatorKind::All,
            QueryOperator::Any { .. } => OperatorKind::Any,
            QueryOperator::Count { .. } => OperatorKind::Count,
            QueryOperator::Average { .. } => OperatorKind::Average,
            QueryOperator::Distinct { .. } => OperatorKind::Distinct,
            QueryOperator::DefaultIfEmpty { .. } => OperatorKind::DefaultIfEmpty,
            QueryOperator::AsTracking { .. } => OperatorKind::AsTracking,
            QueryOperator::AsNoTracking { .. } => OperatorKind::AsNoTracking,
            QueryOperator::CardinalityReducer { .. } => OperatorKind::CardinalityReducer,
            QueryOperator::OfType { .. } => OperatorKind::OfType,
            QueryOperator::Skip { .. } => OperatorKind::Skip,
            QueryOperator::Take { .. } => OperatorKind::Take,
            QueryOperator::Include { .. } => OperatorKind::Include,
            QueryOperator::ThenInclude { .. } => OperatorKind::ThenInclude,
            QueryOperator::MaterializeCollectionNavigation { .. } => {
                OperatorKind::MaterializeCollectionNavigation
            }
        }
    }

    /// Child operator trees, outer before inner.
    pub fn inputs(&self) -> Vec<&Arc<QueryOperator>> {
        match self {
            QueryOperator::EntityScan { .. } | QueryOperator::Source { .. } => vec![],
            QueryOperator::Join { outer, inner, .. }
            | QueryOperator::GroupJoin { outer, inner, .. } => vec![outer, inner],
            QueryOperator::Where { input, .. }
            | QueryOperator::Select { input, .. }
            | QueryOperator::OrderBy { input, .. }
            | QueryOperator::ThenBy { input, .. }
            | QueryOperator::SelectMany { input, .. }
            | QueryOperator::GroupBy { input, .. }
            | QueryOperator::All { input, .. }
            | QueryOperator::Any { input, .. }
            | QueryOperator::Count { input, .. }
            | QueryOperator::Average { input, .. }
            | QueryOperator::Distinct { input }
            | QueryOperator::DefaultIfEmpty { input, .. }
            | QueryOperator::AsTracking { input }
            | QueryOperator::AsNoTracking { input }
            | QueryOperator::CardinalityReducer { input, .. }
            | QueryOperator::OfType { input, .. }
            | QueryOperator::Skip { input, .. }
            | QueryOperator::Take { input, .. }
            | QueryOperator::Include { input, .. }
            | QueryOperator::ThenInclude { input, .. }
            | QueryOperator::MaterializeCollectionNavigation { input, .. } => vec![input],
        }
    }

    /// Lambda arguments of this operator (not of its inputs).
    pub fn lambdas(&self) -> Vec<&Lambda> {
        match self {
            QueryOperator::Where { predicate, .. } | QueryOperator::All { predicate, .. } => {
                vec![predicate]
            }
            QueryOperator::Select { selector, .. } => vec![selector],
            QueryOperator::OrderBy { key, .. } | QueryOperator::ThenBy { key, .. } => vec![key],
            QueryOperator::Join {
                outer_key,
                inner_key,
                result,
                ..
            }
            | QueryOperator::GroupJoin {
                outer_key,
                inner_key,
                result,
                ..
            } => vec![outer_key, inner_key, result],
            QueryOperator::SelectMany {
                collection, result, ..
            } => std::iter::once(collection).chain(result.as_ref()).collect(),
            QueryOperator::GroupBy { key, element, .. } => {
                std::iter::once(key).chain(element.as_ref()).collect()
            }
            QueryOperator::Any { predicate, .. }
            | QueryOperator::Count { predicate, .. }
            | QueryOperator::CardinalityReducer { predicate, .. } => {
                predicate.iter().collect()
            }
            QueryOperator::Average { selector, .. } => selector.iter().collect(),
            QueryOperator::Include {
                navigation: IncludeTarget::Lambda(lambda),
                ..
            } => vec![lambda],
            QueryOperator::ThenInclude { navigation, .. } => vec![navigation],
            _ => vec![],
        }
    }

    /// Non-lambda expression arguments.
    pub fn arguments(&self) -> Vec<&Expr> {
        match self {
            QueryOperator::Source { expr } => vec![expr],
            QueryOperator::DefaultIfEmpty { default, .. } => default.iter().collect(),
            QueryOperator::Skip { count, .. } | QueryOperator::Take { count, .. } => vec![count],
            _ => vec![],
        }
    }

    /// Rebuilds the tree with every lambda and expression argument rewritten.
    pub fn rewrite_expressions<R: ExpressionRewriter + ?Sized>(
        self: &Arc<Self>,
        rewriter: &mut R,
    ) -> Result<Arc<QueryOperator>, R::Error> {
        let input = |op: &Arc<QueryOperator>, r: &mut R| op.rewrite_expressions(r);
        let rewritten = match self.as_ref() {
            QueryOperator::EntityScan { .. } => return Ok(self.clone()),
            QueryOperator::Source { expr } => QueryOperator::Source {
                expr: rewriter.rewrite_expr(expr)?,
            },
            QueryOperator::Where { input: i, predicate } => QueryOperator::Where {
                input: input(i, rewriter)?,
                predicate: rewriter.rewrite_lambda(predicate)?,
            },
            QueryOperator::Select { input: i, selector } => QueryOperator::Select {
                input: input(i, rewriter)?,
                selector: rewriter.rewrite_lambda(selector)?,
            },
            QueryOperator::OrderBy {
                input: i,
                key,
                descending,
            } => QueryOperator::OrderBy {
                input: input(i, rewriter)?,
                key: rewriter.rewrite_lambda(key)?,
                descending: *descending,
            },
            QueryOperator::ThenBy {
                input: i,
                key,
                descending,
            } => QueryOperator::ThenBy {
                input: input(i, rewriter)?,
                key: rewriter.rewrite_lambda(key)?,
                descending: *descending,
            },
            QueryOperator::Join {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            } => QueryOperator::Join {
                outer: input(outer, rewriter)?,
                inner: input(inner, rewriter)?,
                outer_key: rewriter.rewrite_lambda(outer_key)?,
                inner_key: rewriter.rewrite_lambda(inner_key)?,
                result: rewriter.rewrite_lambda(result)?,
            },
            QueryOperator::GroupJoin {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            } => QueryOperator::GroupJoin {
                outer: input(outer, rewriter)?,
                inner: input(inner, rewriter)?,
                outer_key: rewriter.rewrite_lambda(outer_key)?,
                inner_key: rewriter.rewrite_lambda(inner_key)?,
                result: rewriter.rewrite_lambda(result)?,
            },
            QueryOperator::SelectMany {
                input: i,
                collection,
                result,
            } => QueryOperator::SelectMany {
                input: input(i, rewriter)?,
                collection: rewriter.rewrite_lambda(collection)?,
                result: result
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::GroupBy {
                input: i,
                key,
                element,
            } => QueryOperator::GroupBy {
                input: input(i, rewriter)?,
                key: rewriter.rewrite_lambda(key)?,
                element: element
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::All { input: i, predicate } => QueryOperator::All {
                input: input(i, rewriter)?,
                predicate: rewriter.rewrite_lambda(predicate)?,
            },
            QueryOperator::Any { input: i, predicate } => QueryOperator::Any {
                input: input(i, rewriter)?,
                predicate: predicate
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::Count { input: i, predicate } => QueryOperator::Count {
                input: input(i, rewriter)?,
                predicate: predicate
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::Average { input: i, selector } => QueryOperator::Average {
                input: input(i, rewriter)?,
                selector: selector
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::Distinct { input: i } => QueryOperator::Distinct {
                input: input(i, rewriter)?,
            },
            QueryOperator::DefaultIfEmpty { input: i, default } => QueryOperator::DefaultIfEmpty {
                input: input(i, rewriter)?,
                default: default
                    .as_ref()
                    .map(|e| rewriter.rewrite_expr(e))
                    .transpose()?,
            },
            QueryOperator::AsTracking { input: i } => QueryOperator::AsTracking {
                input: input(i, rewriter)?,
            },
            QueryOperator::AsNoTracking { input: i } => QueryOperator::AsNoTracking {
                input: input(i, rewriter)?,
            },
            QueryOperator::CardinalityReducer {
                input: i,
                kind,
                predicate,
            } => QueryOperator::CardinalityReducer {
                input: input(i, rewriter)?,
                kind: *kind,
                predicate: predicate
                    .as_ref()
                    .map(|l| rewriter.rewrite_lambda(l))
                    .transpose()?,
            },
            QueryOperator::OfType { input: i, entity } => QueryOperator::OfType {
                input: input(i, rewriter)?,
                entity: entity.clone(),
            },
            QueryOperator::Skip { input: i, count } => QueryOperator::Skip {
                input: input(i, rewriter)?,
                count: rewriter.rewrite_expr(count)?,
            },
            QueryOperator::Take { input: i, count } => QueryOperator::Take {
                input: input(i, rewriter)?,
                count: rewriter.rewrite_expr(count)?,
            },
            QueryOperator::Include {
                input: i,
                navigation,
            } => QueryOperator::Include {
                input: input(i, rewriter)?,
                navigation: match navigation {
                    IncludeTarget::Lambda(l) => IncludeTarget::Lambda(rewriter.rewrite_lambda(l)?),
                    IncludeTarget::Path(p) => IncludeTarget::Path(p.clone()),
                },
            },
            QueryOperator::ThenInclude {
                input: i,
                navigation,
            } => QueryOperator::ThenInclude {
                input: input(i, rewriter)?,
                navigation: rewriter.rewrite_lambda(navigation)?,
            },
            QueryOperator::MaterializeCollectionNavigation {
                input: i,
                relationship,
            } => QueryOperator::MaterializeCollectionNavigation {
                input: input(i, rewriter)?,
                relationship: relationship.clone(),
            },
        };
        Ok(Arc::new(rewritten))
    }

    /// Type of a single row produced by this operator. Scalar terminals
    /// return the scalar type.
    pub fn element_type(&self, model: &EntityModel) -> ElementType {
        match self {
            QueryOperator::EntityScan { entity } | QueryOperator::OfType { entity, .. } => {
                ElementType::Entity(entity.clone())
            }
            QueryOperator::Source { expr } => expr.element_type(model).element().clone(),
            QueryOperator::Select { selector, .. } => selector.body.element_type(model),
            QueryOperator::Join { result, .. } | QueryOperator::GroupJoin { result, .. } => {
                result.body.element_type(model)
            }
            QueryOperator::SelectMany {
                collection, result, ..
            } => match result {
                Some(result) => result.body.element_type(model),
                None => collection.body.element_type(model).element().clone(),
            },
            QueryOperator::GroupBy { .. } => ElementType::Unknown,
            QueryOperator::All { .. } | QueryOperator::Any { .. } => {
                ElementType::scalar(ScalarKind::Bool)
            }
            QueryOperator::Count { .. } => ElementType::scalar(ScalarKind::Int),
            QueryOperator::Average { input, selector } => {
                let value = match selector {
                    Some(selector) => selector.body.element_type(model),
                    None => input.element_type(model),
                };
                match value {
                    ElementType::Scalar {
                        kind: ScalarKind::Decimal,
                        nullable,
                    } => ElementType::Scalar {
                        kind: ScalarKind::Decimal,
                        nullable,
                    },
                    other => ElementType::Scalar {
                        kind: ScalarKind::Float,
                        nullable: other.is_nullable(),
                    },
                }
            }
            QueryOperator::Where { input, .. }
            | QueryOperator::OrderBy { input, .. }
            | QueryOperator::ThenBy { input, .. }
            | QueryOperator::Distinct { input }
            | QueryOperator::DefaultIfEmpty { input, .. }
            | QueryOperator::AsTracking { input }
            | QueryOperator::AsNoTracking { input }
            | QueryOperator::CardinalityReducer { input, .. }
            | QueryOperator::Skip { input, .. }
            | QueryOperator::Take { input, .. }
            | QueryOperator::Include { input, .. }
            | QueryOperator::ThenInclude { input, .. }
            | QueryOperator::MaterializeCollectionNavigation { input, .. } => {
                input.element_type(model)
            }
        }
    }

    /// Whether the operator yields one value rather than a sequence.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            QueryOperator::All { .. }
                | QueryOperator::Any { .. }
                | QueryOperator::Count { .. }
                | QueryOperator::Average { .. }
                | QueryOperator::CardinalityReducer { .. }
        )
    }

    /// Type of the whole operator used as a value: a sequence of rows, or
    /// the single value of a scalar terminal.
    pub fn result_type(&self, model: &EntityModel) -> ElementType {
        let element = self.element_type(model);
        if self.is_scalar() {
            element
        } else {
            ElementType::sequence(element)
        }
    }

    fn describe(&self) -> String {
        match self {
            QueryOperator::EntityScan { entity } => format!("EntityScan({})", entity),
            QueryOperator::Source { expr } => format!("Source({})", expr),
            QueryOperator::Where { predicate, .. } => format!("Where({})", predicate),
            QueryOperator::Select { selector, .. } => format!("Select({})", selector),
            QueryOperator::OrderBy {
                key, descending, ..
            } => format!("OrderBy{}({})", if *descending { "Descending" } else { "" }, key),
            QueryOperator::ThenBy {
                key, descending, ..
            } => format!("ThenBy{}({})", if *descending { "Descending" } else { "" }, key),
            QueryOperator::Join {
                outer_key,
                inner_key,
                result,
                ..
            } => format!("Join({}, {}, {})", outer_key, inner_key, result),
            QueryOperator::GroupJoin {
                outer_key,
                inner_key,
                result,
                ..
            } => format!("GroupJoin({}, {}, {})", outer_key, inner_key, result),
            QueryOperator::SelectMany {
                collection, result, ..
            } => match result {
                Some(result) => format!("SelectMany({}, {})", collection, result),
                None => format!("SelectMany({})", collection),
            },
            QueryOperator::GroupBy { key, element, .. } => match element {
                Some(element) => format!("GroupBy({}, {})", key, element),
                None => format!("GroupBy({})", key),
            },
            QueryOperator::All { predicate, .. } => format!("All({})", predicate),
            QueryOperator::Any { predicate, .. } => optional_lambda("Any", predicate),
            QueryOperator::Count { predicate, .. } => optional_lambda("Count", predicate),
            QueryOperator::Average { selector, .. } => optional_lambda("Average", selector),
            QueryOperator::Distinct { .. } => "Distinct()".to_string(),
            QueryOperator::DefaultIfEmpty { default, .. } => match default {
                Some(default) => format!("DefaultIfEmpty({})", default),
                None => "DefaultIfEmpty()".to_string(),
            },
            QueryOperator::AsTracking { .. } => "AsTracking()".to_string(),
            QueryOperator::AsNoTracking { .. } => "AsNoTracking()".to_string(),
            QueryOperator::CardinalityReducer {
                kind, predicate, ..
            } => optional_lambda(&kind.to_string(), predicate),
            QueryOperator::OfType { entity, .. } => format!("OfType({})", entity),
            QueryOperator::Skip { count, .. } => format!("Skip({})", count),
            QueryOperator::Take { count, .. } => format!("Take({})", count),
            QueryOperator::Include { navigation, .. } => match navigation {
                IncludeTarget::Lambda(lambda) => format!("Include({})", lambda),
                IncludeTarget::Path(path) => format!("Include(\"{}\")", path),
            },
            QueryOperator::ThenInclude { navigation, .. } => format!("ThenInclude({})", navigation),
            QueryOperator::MaterializeCollectionNavigation { relationship, .. } => {
                format!("MaterializeCollectionNavigation({})", relationship)
            }
        }
    }

    /// Single-line method-chain rendering, used for embedded subqueries:
    /// `OrderLine.Where(l => l.OrderId == o.Id)`.
    pub fn compact(&self) -> String {
        match self {
            QueryOperator::EntityScan { entity } => entity.clone(),
            QueryOperator::Source { expr } => expr.to_string(),
            QueryOperator::Join { outer, inner, .. }
            | QueryOperator::GroupJoin { outer, inner, .. } => {
                let call = self.describe();
                let args = call.find('(').map(|i| &call[i + 1..]).unwrap_or("");
                format!(
                    "{}.{}({}, {}",
                    outer.compact(),
                    self.kind(),
                    inner.compact(),
                    args
                )
            }
            other => match other.inputs().first() {
                Some(input) => format!("{}.{}", input.compact(), other.describe()),
                None => other.describe(),
            },
        }
    }

    fn fmt_with_tree(
        &self,
        f: &mut fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
        is_root: bool,
    ) -> fmt::Result {
        let (branch, next_prefix) = if is_last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };

        if is_root {
            writeln!(f, "{}", self.describe())?;
        } else {
            writeln!(f, "{}{}{}", prefix, branch, self.describe())?;
        }

        let children = self.inputs();
        let child_prefix = if is_root {
            String::new()
        } else {
            format!("{}{}", prefix, next_prefix)
        };
        for (i, child) in children.iter().enumerate() {
            child.fmt_with_tree(f, &child_prefix, i + 1 == children.len(), false)?;
        }
        Ok(())
    }
}

fn optional_lambda(name: &str, lambda: &Option<Lambda>) -> String {
    match lambda {
        Some(lambda) => format!("{}({})", name, lambda),
        None => format!("{}()", name),
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with_tree(f, "", true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::plan_builder::PlanBuilder;
    use super::*;
    use crate::query_planner::logical_expr::{combinators::*, Symbol};

    #[test]
    fn test_tree_display() {
        let o = Symbol::untyped("o");
        let plan = PlanBuilder::scan("Order")
            .filter(o.clone(), eq(param(&o).member("Id"), lit_int(7)))
            .take(lit_int(1))
            .build();
        assert_eq!(
            plan.to_string(),
            "Take(1)\n└── Where(o => o.Id == 7)\n    └── EntityScan(Order)\n"
        );
    }

    #[test]
    fn test_compact_chain() {
        let l = Symbol::untyped("l");
        let plan = PlanBuilder::scan("OrderLine")
            .filter(l.clone(), eq(param(&l).member("OrderId"), lit_int(1)))
            .build();
        assert_eq!(plan.compact(), "OrderLine.Where(l => l.OrderId == 1)");
    }

    #[test]
    fn test_json_round_trip() {
        let o = Symbol::untyped("o");
        let plan = PlanBuilder::scan("Order")
            .order_by(o.clone(), param(&o).member("Id"), true)
            .reduce(ReducerKind::FirstOrDefault)
            .build();
        let json = serde_json::to_string(plan.as_ref()).unwrap();
        let back: QueryOperator = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, plan.as_ref());
        assert_eq!(back.kind(), OperatorKind::CardinalityReducer);
    }
}
