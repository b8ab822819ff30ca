use std::sync::Arc;

use super::navigation_tree::ExpansionStatus;
use super::*;
use crate::{
    entity_catalog::{config::EntityModelConfig, ScalarKind},
    query_planner::{
        logical_expr::{
            combinators::{and, eq, lit_int, lit_str, ne, param, record},
            Symbol,
        },
        logical_plan::{plan_builder::PlanBuilder, OperatorKind},
    },
};

const SHOP: &str = r#"
name: shop
entities:
  - name: Order
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: CustomerId, type: int }
      - { name: ShipperId, type: int, nullable: true }
      - { name: Total, type: decimal }
    relationships:
      - { name: Customer, target: Customer, foreign_key: [CustomerId], inverse: Orders }
      - { name: Shipper, target: Shipper, foreign_key: [ShipperId] }
      - { name: Lines, target: OrderLine, foreign_key: [OrderId], owning: false, collection: true, inverse: Order }
  - name: Customer
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: Name, type: string }
      - { name: AddressId, type: int }
    relationships:
      - { name: Address, target: Address, foreign_key: [AddressId] }
      - { name: Orders, target: Order, foreign_key: [CustomerId], owning: false, collection: true, inverse: Customer }
  - name: Address
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: City, type: string }
  - name: Shipper
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: Name, type: string }
  - name: OrderLine
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: OrderId, type: int }
      - { name: ProductId, type: int }
      - { name: Quantity, type: int }
    relationships:
      - { name: Order, target: Order, foreign_key: [OrderId], inverse: Lines }
      - { name: Product, target: Product, foreign_key: [ProductId] }
  - name: Product
    key: [Id]
    fields:
      - { name: Id, type: int }
      - { name: Name, type: string }
      - { name: Price, type: decimal }
"#;

const CUSTOMER_JOIN: &str = "Join(order => order.CustomerId, customer => customer.Id, (order, customer) => { Outer = order, Inner = customer })";

fn shop() -> EntityModel {
    EntityModelConfig::from_yaml_str(SHOP)
        .and_then(|config| config.build())
        .unwrap()
}

fn sym(name: &str, entity: &str) -> Symbol {
    Symbol::new(name, ElementType::entity(entity))
}

fn expand_with(
    plan: &Arc<QueryOperator>,
    config: ExpansionConfig,
) -> Result<NavigationExpansionResult, NavigationExpansionError> {
    NavigationExpansion::new(config).expand(plan, &shop())
}

fn expand(plan: &Arc<QueryOperator>) -> NavigationExpansionResult {
    expand_with(plan, ExpansionConfig::default()).unwrap()
}

/// Expands without finalizing and checks that every joined node's `to_path`
/// resolves to its entity against the rows the rewritten source produces.
fn assert_paths_resolve(plan: &Arc<QueryOperator>) -> Expansion {
    let model = shop();
    let config = ExpansionConfig::default();
    let mut expander = NavigationExpander::new(&model, &config, plan.kind());
    let expansion = expander.expand(plan).unwrap();
    let row = expansion.source.element_type(&model);
    for mapping in &expansion.state.source_mappings {
        for id in expander.arena.nodes_of(*mapping) {
            let node = expander.arena.node(id);
            if node.status != ExpansionStatus::Complete {
                continue;
            }
            assert_eq!(
                row.resolve_path(&model, &node.to_path),
                Some(ElementType::entity(&node.entity)),
                "nav#{} at {:?} in {}",
                id.0,
                node.to_path,
                row
            );
        }
    }
    expansion
}

fn root_to_path(plan: &Arc<QueryOperator>) -> Vec<Vec<String>> {
    let model = shop();
    let config = ExpansionConfig::default();
    let mut expander = NavigationExpander::new(&model, &config, plan.kind());
    let expansion = expander.expand(plan).unwrap();
    let mapping = expansion.state.source_mappings[0];
    expander
        .arena
        .nodes_of(mapping)
        .into_iter()
        .map(|id| expander.arena.node(id).to_path.clone())
        .collect()
}

fn where_customer_named(name: &str) -> PlanBuilder {
    let o = sym("o", "Order");
    PlanBuilder::scan("Order").filter(
        o.clone(),
        eq(param(&o).member("Customer").member("Name"), lit_str(name)),
    )
}

#[test]
fn test_required_navigation_in_filter() {
    let result = expand(&where_customer_named("Acme").build());
    assert_eq!(
        result.plan.to_string(),
        format!(
            "Select(order_customer => order_customer.Outer)\n\
             └── Where(order_customer => order_customer.Inner.Name == \"Acme\")\n    \
                 └── {}\n        \
                     ├── EntityScan(Order)\n        \
                     └── EntityScan(Customer)\n",
            CUSTOMER_JOIN
        )
    );
    assert_eq!(result.element_type, ElementType::entity("Order"));
    assert_eq!(result.source_mappings.len(), 1);
    assert_eq!(result.source_mappings[0].root_entity, "Order");
}

#[test]
fn test_optional_navigation_in_projection() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .select(o.clone(), param(&o).member("Shipper").member("Name"))
        .build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        "Select(order_shipper => order_shipper.Inner.Name)\n\
         └── SelectMany(ti => ti.Inner.DefaultIfEmpty(), (ti, shipper_1) => { Outer = ti, Inner = shipper_1 })\n    \
             └── GroupJoin(order => order.ShipperId, shipper => nullable(shipper.Id), (order, shipper_group) => { Outer = order, Inner = shipper_group })\n        \
                 ├── EntityScan(Order)\n        \
                 └── EntityScan(Shipper)\n"
    );
}

#[test]
fn test_ordering_is_flushed_before_projection() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .order_by(o.clone(), param(&o).member("Customer").member("Name"), false)
        .select(o.clone(), param(&o).member("Id"))
        .build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        format!(
            "Select(order_customer => order_customer.Outer.Id)\n\
             └── OrderBy(order_customer => order_customer.Inner.Name)\n    \
                 └── {}\n        \
                     ├── EntityScan(Order)\n        \
                     └── EntityScan(Customer)\n",
            CUSTOMER_JOIN
        )
    );
    assert_eq!(result.element_type, ElementType::scalar(ScalarKind::Int));
}

#[test]
fn test_ordering_is_flushed_before_navigating_filter() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .order_by(o.clone(), param(&o).member("Total"), false)
        .filter(
            o.clone(),
            eq(param(&o).member("Customer").member("Name"), lit_str("A")),
        )
        .take(lit_int(2))
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        format!(
            "Take(2)\n\
             └── Select(order_customer => order_customer.Outer)\n    \
                 └── Where(order_customer => order_customer.Inner.Name == \"A\")\n        \
                     └── OrderBy(order_customer => order_customer.Outer.Total)\n            \
                         └── {}\n                \
                             ├── EntityScan(Order)\n                \
                             └── EntityScan(Customer)\n",
            CUSTOMER_JOIN
        )
    );
}

#[test]
fn test_then_by_follows_its_ordering() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .order_by(o.clone(), param(&o).member("Total"), true)
        .then_by(o.clone(), param(&o).member("Id"), false)
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        "ThenBy(order => order.Id)\n\
         └── OrderByDescending(order => order.Total)\n    \
             └── EntityScan(Order)\n"
    );
}

#[test]
fn test_projection_is_deferred_until_needed() {
    let o = sym("o", "Order");
    let x = Symbol::untyped("x");
    let plan = PlanBuilder::scan("Order")
        .select(o.clone(), record(vec![("Id", param(&o).member("Id"))]))
        .filter(x.clone(), eq(param(&x).member("Id"), lit_int(3)))
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        "Select(order => new { Id = order.Id })\n\
         └── Where(order => order.Id == 3)\n    \
             └── EntityScan(Order)\n"
    );
}

#[test]
fn test_path_remapping_after_joins() {
    let plan = where_customer_named("Acme").build();
    assert_eq!(
        root_to_path(&plan),
        vec![vec!["Outer".to_string()], vec!["Inner".to_string()]]
    );

    let o = sym("o", "Order");
    let both = PlanBuilder::scan("Order")
        .filter(
            o.clone(),
            and(vec![
                eq(param(&o).member("Customer").member("Name"), lit_str("Acme")),
                eq(param(&o).member("Shipper").member("Name"), lit_str("Fast")),
            ])
            .unwrap(),
        )
        .build();
    let paths = root_to_path(&both);
    assert_eq!(paths[0], vec!["Outer", "Outer", "Outer"]);
    assert_eq!(paths[1], vec!["Outer", "Outer", "Inner"]);
    assert_eq!(paths[2], vec!["Inner"]);

    let chained = PlanBuilder::scan("Order")
        .filter(
            o.clone(),
            eq(
                param(&o).member("Customer").member("Address").member("City"),
                lit_str("Oslo"),
            ),
        )
        .build();
    let paths = root_to_path(&chained);
    assert_eq!(paths[0], vec!["Outer", "Outer"]);
    assert_eq!(paths[1], vec!["Outer", "Inner"]);
    assert_eq!(paths[2], vec!["Inner"]);
}

#[test]
fn test_joined_paths_resolve_against_rows() {
    let o = sym("o", "Order");
    let x = Symbol::untyped("x");
    let plans = vec![
        where_customer_named("Acme").build(),
        PlanBuilder::scan("Order")
            .filter(
                o.clone(),
                and(vec![
                    eq(param(&o).member("Shipper").member("Name"), lit_str("Fast")),
                    eq(
                        param(&o).member("Customer").member("Address").member("City"),
                        lit_str("Oslo"),
                    ),
                ])
                .unwrap(),
            )
            .build(),
        PlanBuilder::scan("Order")
            .select(
                o.clone(),
                record(vec![
                    ("Order", param(&o)),
                    ("Customer", param(&o).member("Customer")),
                ]),
            )
            .take(lit_int(1))
            .filter(
                x.clone(),
                eq(
                    param(&x).member("Customer").member("Address").member("City"),
                    lit_str("Oslo"),
                ),
            )
            .build(),
    ];
    for plan in &plans {
        assert_paths_resolve(plan);
    }
}

#[test]
fn test_entities_survive_materialized_projection() {
    let o = sym("o", "Order");
    let x = Symbol::untyped("x");
    let plan = PlanBuilder::scan("Order")
        .select(
            o.clone(),
            record(vec![
                ("Order", param(&o)),
                ("Customer", param(&o).member("Customer")),
            ]),
        )
        .take(lit_int(1))
        .filter(
            x.clone(),
            eq(
                param(&x).member("Customer").member("Address").member("City"),
                lit_str("Oslo"),
            ),
        )
        .build();
    let result = expand(&plan);
    let rendered = result.plan.to_string();
    assert!(rendered.contains("Take(1)"), "{}", rendered);
    assert!(
        rendered.contains("Where(p_address => p_address.Inner.City == \"Oslo\")"),
        "{}",
        rendered
    );
    assert!(rendered.contains("p => p.Customer.AddressId"), "{}", rendered);
    let entities: Vec<_> = result
        .source_mappings
        .iter()
        .map(|m| m.root_entity.as_str())
        .collect();
    assert_eq!(entities, vec!["Order", "Customer"]);
}

#[test]
fn test_collection_navigation_in_predicate() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .filter(
            o.clone(),
            Expr::Subquery(
                PlanBuilder::source(param(&o).member("Lines"))
                    .any(None)
                    .build(),
            ),
        )
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        "Where(order => OrderLine.Where(orderline => orderline.OrderId == order.Id).Any())\n\
         └── EntityScan(Order)\n"
    );
}

#[test]
fn test_collection_navigation_is_materialized_in_projection() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .select(o.clone(), param(&o).member("Lines"))
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        "Select(order => OrderLine.Where(orderline => orderline.OrderId == order.Id).MaterializeCollectionNavigation(Order.Lines))\n\
         └── EntityScan(Order)\n"
    );
}

#[test]
fn test_select_many_over_collection() {
    let o = sym("o", "Order");
    let l = sym("l", "OrderLine");
    let plan = PlanBuilder::scan("Order")
        .select_many(
            Lambda::unary(o.clone(), param(&o).member("Lines")),
            Some(Lambda::new(
                vec![o.clone(), l.clone()],
                record(vec![
                    ("Id", param(&o).member("Id")),
                    ("Quantity", param(&l).member("Quantity")),
                ]),
            )),
        )
        .build();
    assert_eq!(
        expand(&plan).plan.to_string(),
        "Select(join => new { Id = join.Outer.Id, Quantity = join.Inner.Quantity })\n\
         └── SelectMany(order => OrderLine.Where(orderline => orderline.OrderId == order.Id), (order, orderline) => { Outer = order, Inner = orderline })\n    \
             └── EntityScan(Order)\n"
    );
}

#[test]
fn test_group_join_result_selector() {
    let c = sym("c", "Customer");
    let o = sym("o", "Order");
    let orders = Symbol::new("orders", ElementType::sequence(ElementType::entity("Order")));
    let plan = PlanBuilder::scan("Customer")
        .group_join(
            PlanBuilder::scan("Order").build(),
            Lambda::unary(c.clone(), param(&c).member("Id")),
            Lambda::unary(o.clone(), param(&o).member("CustomerId")),
            Lambda::new(
                vec![c.clone(), orders.clone()],
                record(vec![
                    ("Name", param(&c).member("Name")),
                    (
                        "Count",
                        Expr::Subquery(PlanBuilder::source(param(&orders)).count(None).build()),
                    ),
                ]),
            ),
        )
        .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(
        rendered.starts_with(
            "Select(groupjoin => new { Name = groupjoin.Outer.Name, Count = groupjoin.Inner.Count() })\n"
        ),
        "{}",
        rendered
    );
    assert!(
        rendered.contains("GroupJoin(customer => customer.Id, order => order.CustomerId, (customer, order_group) => "),
        "{}",
        rendered
    );
}

fn customers_with_orders(result: Lambda) -> PlanBuilder {
    let c = sym("c", "Customer");
    let o = sym("o", "Order");
    PlanBuilder::scan("Customer").group_join(
        PlanBuilder::scan("Order").build(),
        Lambda::unary(c.clone(), param(&c).member("Id")),
        Lambda::unary(o.clone(), param(&o).member("CustomerId")),
        result,
    )
}

fn orders_param() -> Symbol {
    Symbol::new("orders", ElementType::sequence(ElementType::entity("Order")))
}

#[test]
fn test_navigation_inside_group_subquery_is_expanded() {
    let c = sym("c", "Customer");
    let o2 = sym("o2", "Order");
    let orders = orders_param();
    let shipped_by_f = Lambda::unary(
        o2.clone(),
        eq(param(&o2).member("Shipper").member("Name"), lit_str("F")),
    );
    let plan = customers_with_orders(Lambda::new(
        vec![c.clone(), orders.clone()],
        record(vec![(
            "N",
            Expr::Subquery(
                PlanBuilder::source(param(&orders))
                    .count(Some(shipped_by_f))
                    .build(),
            ),
        )]),
    ))
    .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(
        rendered.starts_with(
            "Select(groupjoin => new { N = groupjoin.Inner.GroupJoin(Shipper, order_1 => order_1.ShipperId, "
        ),
        "{}",
        rendered
    );
    assert!(
        rendered.contains(".Where(order_1_shipper => order_1_shipper.Inner.Name == \"F\")"),
        "{}",
        rendered
    );
    assert!(rendered.contains(".Count() })\n"), "{}", rendered);
    assert!(!rendered.contains(".Shipper."), "{}", rendered);
}

#[test]
fn test_left_join_written_with_group_join() {
    let c = sym("c", "Customer");
    let o2 = sym("o2", "Order");
    let t = Symbol::untyped("t");
    let orders = orders_param();
    let plan = customers_with_orders(Lambda::new(
        vec![c.clone(), orders.clone()],
        record(vec![("C", param(&c)), ("Os", param(&orders))]),
    ))
    .select_many(
        Lambda::unary(
            t.clone(),
            Expr::Subquery(
                PlanBuilder::source(param(&t).member("Os"))
                    .default_if_empty(None)
                    .build(),
            ),
        ),
        Some(Lambda::new(
            vec![t.clone(), o2.clone()],
            record(vec![
                ("Name", param(&t).member("C").member("Name")),
                ("S", param(&o2).member("Shipper").member("Name")),
            ]),
        )),
    )
    .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(
        rendered.starts_with(
            "Select(join_shipper => new { Name = join_shipper.Outer.Outer.Outer.Outer.Name, S = join_shipper.Inner.Name })\n"
        ),
        "{}",
        rendered
    );
    assert!(
        rendered.contains(
            "SelectMany(groupjoin => groupjoin.Inner.DefaultIfEmpty(), (groupjoin, order_1) => { Outer = groupjoin, Inner = order_1 })"
        ),
        "{}",
        rendered
    );
    // the group element may be missing, so the shipper is left-joined
    assert!(
        rendered.contains("GroupJoin(join => join.Inner.ShipperId"),
        "{}",
        rendered
    );
}

#[test]
fn test_groups_survive_materialized_projection() {
    let c = sym("c", "Customer");
    let o2 = sym("o2", "Order");
    let t = Symbol::untyped("t");
    let orders = orders_param();
    let plan = customers_with_orders(Lambda::new(
        vec![c.clone(), orders.clone()],
        record(vec![("Name", param(&c).member("Name")), ("Orders", param(&orders))]),
    ))
    .take(lit_int(1))
    .select_many(
        Lambda::unary(
            t.clone(),
            Expr::Subquery(PlanBuilder::source(param(&t).member("Orders")).build()),
        ),
        Some(Lambda::new(
            vec![t.clone(), o2.clone()],
            record(vec![
                ("Name", param(&t).member("Name")),
                ("S", param(&o2).member("Shipper").member("Name")),
            ]),
        )),
    )
    .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(
        rendered.starts_with(
            "Select(join_shipper => new { Name = join_shipper.Outer.Outer.Outer.Name, S = join_shipper.Inner.Name })\n"
        ),
        "{}",
        rendered
    );
    assert!(
        rendered.contains("SelectMany(p => p.Orders, (p, order_1) => { Outer = p, Inner = order_1 })"),
        "{}",
        rendered
    );
    assert!(
        rendered.contains("Select(groupjoin => new { Name = groupjoin.Outer.Name, Orders = groupjoin.Inner })"),
        "{}",
        rendered
    );
}

#[test]
fn test_explicit_join_keys_navigate() {
    let o = sym("o", "Order");
    let a = sym("a", "Address");
    let plan = PlanBuilder::scan("Order")
        .join(
            PlanBuilder::scan("Address").build(),
            Lambda::unary(o.clone(), param(&o).member("Customer").member("AddressId")),
            Lambda::unary(a.clone(), param(&a).member("Id")),
            Lambda::new(
                vec![o.clone(), a.clone()],
                record(vec![("City", param(&a).member("City"))]),
            ),
        )
        .build();
    let result = expand(&plan);
    let rendered = result.plan.to_string();
    assert!(rendered.contains(CUSTOMER_JOIN), "{}", rendered);
    assert!(
        rendered.contains("Join(order_customer => order_customer.Inner.AddressId, address => address.Id"),
        "{}",
        rendered
    );
    assert!(result
        .plan
        .to_string()
        .starts_with("Select(join => new { City = join.Inner.City })"));
}

#[test]
fn test_reducer_with_predicate_becomes_filter() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .reduce_where(
            ReducerKind::First,
            Lambda::unary(o.clone(), eq(param(&o).member("Id"), lit_int(1))),
        )
        .build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        "First()\n└── Where(order => order.Id == 1)\n    └── EntityScan(Order)\n"
    );
    assert_eq!(result.cardinality_reducer, Some(ReducerKind::First));
}

#[test]
fn test_reducer_stays_outermost() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .reduce(ReducerKind::SingleOrDefault)
        .build();
    let plan = PlanBuilder::from_plan(plan)
        .select(o.clone(), param(&o).member("Customer").member("Name"))
        .build();
    let result = expand(&plan);
    assert_eq!(result.plan.kind(), OperatorKind::CardinalityReducer);
    assert!(result.plan.to_string().contains(CUSTOMER_JOIN));
}

#[test]
fn test_include_then_include_chain() {
    let o = sym("o", "Order");
    let c = sym("c", "Customer");
    let plan = PlanBuilder::scan("Order")
        .include(o.clone(), param(&o).member("Customer"))
        .then_include(c.clone(), param(&c).member("Address"))
        .build();
    let result = expand(&plan);
    assert_eq!(result.plan.to_string(), "EntityScan(Order)\n");
    assert_eq!(
        result.include_chain,
        Some(vec![
            "Order".to_string(),
            "Customer".to_string(),
            "Address".to_string()
        ])
    );
    let customer = result.source_mappings[0].node(&["Customer"]).unwrap();
    assert!(customer.included);
    assert_eq!(customer.status, ExpansionStatus::NotNeeded);
}

#[test]
fn test_string_include() {
    let plan = PlanBuilder::scan("Order")
        .include_path("Customer.Address")
        .build();
    let result = expand(&plan);
    assert_eq!(result.plan.to_string(), "EntityScan(Order)\n");
    assert_eq!(
        result.include_chain.as_deref(),
        Some(&["Order".to_string(), "Customer".to_string(), "Address".to_string()][..])
    );

    let config = ExpansionConfig {
        expand_string_includes: false,
        ..ExpansionConfig::default()
    };
    let plan = PlanBuilder::scan("Order").include_path("Customer").build();
    let result = expand_with(&plan, config).unwrap();
    assert_eq!(
        result.plan.to_string(),
        "Include(\"Customer\")\n└── EntityScan(Order)\n"
    );
    assert_eq!(result.include_chain, None);
}

#[test]
fn test_invalid_includes() {
    let o = sym("o", "Order");
    let c = sym("c", "Customer");

    let plan = PlanBuilder::scan("Order")
        .include(o.clone(), param(&o).member("Total"))
        .build();
    let err = expand_with(&plan, ExpansionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        NavigationExpansionError::InvalidIncludeArgument {
            operator: OperatorKind::Include,
            ..
        }
    ));

    let plan = PlanBuilder::scan("Order")
        .then_include(c.clone(), param(&c).member("Address"))
        .build();
    let err = expand_with(&plan, ExpansionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        NavigationExpansionError::InvalidIncludeArgument {
            operator: OperatorKind::ThenInclude,
            ..
        }
    ));

    let plan = PlanBuilder::scan("Order")
        .include_path("Customer..Address")
        .build();
    let err = expand_with(&plan, ExpansionConfig::default()).unwrap_err();
    assert_eq!(
        err,
        NavigationExpansionError::InvalidIncludeArgument {
            operator: OperatorKind::Include,
            argument: "Customer..Address".to_string(),
        }
    );
}

#[test]
fn test_default_if_empty_makes_navigations_optional() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .default_if_empty(None)
        .filter(
            o.clone(),
            eq(param(&o).member("Customer").member("Name"), lit_str("Acme")),
        )
        .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(rendered.contains("GroupJoin("), "{}", rendered);
    assert!(!rendered.contains(CUSTOMER_JOIN), "{}", rendered);
}

#[test]
fn test_distinct_materializes_entity_projection() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .select(o.clone(), param(&o).member("Customer"))
        .distinct()
        .build();
    let result = expand(&plan);
    assert!(result
        .plan
        .to_string()
        .starts_with("Distinct()\n└── Select(order_customer => order_customer.Inner)\n"));
    assert_eq!(result.source_mappings.len(), 1);
    assert_eq!(result.source_mappings[0].root_entity, "Customer");
    assert_eq!(result.element_type, ElementType::entity("Customer"));
}

#[test]
fn test_scalar_terminals() {
    let o = sym("o", "Order");

    let plan = PlanBuilder::scan("Order")
        .average(Some(Lambda::unary(o.clone(), param(&o).member("Total"))))
        .build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        "Average(order => order.Total)\n└── EntityScan(Order)\n"
    );
    assert_eq!(result.element_type, ElementType::scalar(ScalarKind::Decimal));

    let plan = PlanBuilder::scan("Order")
        .count(Some(Lambda::unary(
            o.clone(),
            eq(param(&o).member("Customer").member("Name"), lit_str("Acme")),
        )))
        .build();
    let result = expand(&plan);
    let rendered = result.plan.to_string();
    assert!(rendered.starts_with("Count()\n└── Select("), "{}", rendered);
    assert!(rendered.contains(CUSTOMER_JOIN), "{}", rendered);
    assert_eq!(result.element_type, ElementType::scalar(ScalarKind::Int));

    let plan = PlanBuilder::scan("Order")
        .all(
            o.clone(),
            ne(param(&o).member("Customer").member("Name"), lit_str("")),
        )
        .build();
    let rendered = expand(&plan).plan.to_string();
    assert!(
        rendered.starts_with("All(order_customer => order_customer.Inner.Name != \"\")\n"),
        "{}",
        rendered
    );
}

#[test]
fn test_group_by_passes_through() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .group_by(Lambda::unary(o.clone(), param(&o).member("CustomerId")), None)
        .build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        "GroupBy(o => o.CustomerId)\n└── EntityScan(Order)\n"
    );
    assert!(result.source_mappings.is_empty());
}

#[test]
fn test_of_type_keeps_entity_rows() {
    let plan = PlanBuilder::scan("Order").of_type("Order").build();
    let result = expand(&plan);
    assert_eq!(
        result.plan.to_string(),
        "OfType(Order)\n└── EntityScan(Order)\n"
    );
    assert_eq!(result.source_mappings[0].root_entity, "Order");
}

#[test]
fn test_navigation_depth_limit() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .filter(
            o.clone(),
            eq(
                param(&o).member("Customer").member("Address").member("City"),
                lit_str("Oslo"),
            ),
        )
        .build();
    let config = ExpansionConfig {
        max_navigation_depth: 1,
        ..ExpansionConfig::default()
    };
    assert_eq!(
        expand_with(&plan, config).unwrap_err(),
        NavigationExpansionError::NavigationDepthExceeded {
            operator: OperatorKind::Where,
            path: "Order.Customer.Address".to_string(),
            limit: 1,
        }
    );
}

#[test]
fn test_operator_depth_limit() {
    let plan = where_customer_named("Acme").take(lit_int(1)).build();
    let config = ExpansionConfig {
        max_operator_depth: 2,
        ..ExpansionConfig::default()
    };
    assert_eq!(
        expand_with(&plan, config).unwrap_err(),
        NavigationExpansionError::OperatorDepthExceeded { limit: 2 }
    );
}

#[test]
fn test_unknown_entity() {
    let plan = PlanBuilder::scan("Invoice").build();
    assert_eq!(
        expand_with(&plan, ExpansionConfig::default()).unwrap_err(),
        NavigationExpansionError::UnknownEntityType {
            entity: "Invoice".to_string()
        }
    );
}

#[test]
fn test_pending_collection_node_is_rejected() {
    let model = shop();
    let config = ExpansionConfig::default();
    let mut expander = NavigationExpander::new(&model, &config, OperatorKind::Where);
    let mapping = expander.arena.add_mapping("Order", vec![], false, None);
    let root = expander.arena.root_of(mapping);
    let lines = model.relationship("Order", "Lines").unwrap().clone();
    expander.arena.get_or_add_child(root, &lines, false);

    let symbol = Symbol::new("order", ElementType::entity("Order"));
    let mut state = ExpansionState::new(
        symbol,
        Expr::NavigationBinding {
            node: root,
            entity: "Order".to_string(),
        },
    );
    state.source_mappings.push(mapping);
    let err = expander
        .expand_pending_navigations(Arc::new(QueryOperator::scan("Order")), &mut state)
        .unwrap_err();
    assert_eq!(
        err,
        NavigationExpansionError::CollectionInJoinTree {
            operator: OperatorKind::Where,
            relationship: "Order.Lines".to_string()
        }
    );
}

#[test]
fn test_expansion_is_deterministic() {
    let o = sym("o", "Order");
    let plan = PlanBuilder::scan("Order")
        .filter(
            o.clone(),
            and(vec![
                eq(param(&o).member("Shipper").member("Name"), lit_str("Fast")),
                eq(param(&o).member("Customer").member("Name"), lit_str("Acme")),
            ])
            .unwrap(),
        )
        .select(o.clone(), param(&o).member("Lines"))
        .build();
    let first = expand(&plan);
    let second = expand(&plan);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_analyzer_pass_records_result() {
    let plan = where_customer_named("Acme").build();
    let mut plan_ctx = PlanCtx::new(ExpansionConfig::default());
    let transformed = NavigationExpansion::new(ExpansionConfig::default())
        .analyze_with_entity_model(plan.clone(), &mut plan_ctx, &shop())
        .unwrap();
    assert!(transformed.is_yes());
    let result = plan_ctx.take_navigation_result().unwrap();
    assert_eq!(result.plan, transformed.get_plan());

    let untouched = PlanBuilder::scan("Order").build();
    let transformed = NavigationExpansion::new(ExpansionConfig::default())
        .analyze_with_entity_model(untouched, &mut plan_ctx, &shop())
        .unwrap();
    assert!(!transformed.is_yes());
}
