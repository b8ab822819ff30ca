//! End-to-end expansion through the public entry points: queries parsed
//! from JSON, expanded against a model loaded from YAML.

#[cfg(test)]
mod expansion_api_tests {
    use std::sync::Arc;

    use navexpand::{
        config::ExpansionConfig,
        entity_catalog::{load_entity_model, EntityModel},
        query_planner::{
            analyzer::navigation_expansion::NavigationExpansionError,
            expand_navigations, load_query,
            logical_expr::{
                combinators::{eq, lit_str, param},
                Symbol,
            },
            logical_plan::{plan_builder::PlanBuilder, OperatorKind, QueryOperator},
            parse_query,
            types::ElementType,
            QueryPlannerError,
        },
    };
    use test_case::test_case;

    fn shop() -> EntityModel {
        load_entity_model("tests/fixtures/shop.yaml").unwrap()
    }

    fn order_filter(path: &[&str], value: &str) -> Arc<QueryOperator> {
        let o = Symbol::new("o", ElementType::entity("Order"));
        PlanBuilder::scan("Order")
            .filter(o.clone(), eq(param(&o).member_path(path), lit_str(value)))
            .build()
    }

    #[test]
    fn test_query_file_is_expanded() {
        let plan = load_query("tests/fixtures/orders_of_acme.json").unwrap();
        let result = expand_navigations(plan, &shop(), &ExpansionConfig::default()).unwrap();
        let rendered = result.plan.to_string();
        assert!(
            rendered.starts_with("Select(order_customer => order_customer.Outer)\n"),
            "{}",
            rendered
        );
        assert!(rendered.contains("Where(order_customer => order_customer.Inner.Name == \"Acme\")"));
        assert_eq!(result.element_type, ElementType::entity("Order"));
    }

    #[test]
    fn test_expanded_plan_round_trips_as_json() {
        let result = expand_navigations(
            order_filter(&["Shipper", "Name"], "Fast"),
            &shop(),
            &ExpansionConfig::default(),
        )
        .unwrap();
        let json = serde_json::to_string(result.plan.as_ref()).unwrap();
        let back = parse_query(&json).unwrap();
        assert_eq!(back, result.plan);
    }

    #[test_case(&["Customer", "Name"], "Join(" ; "required reference")]
    #[test_case(&["Shipper", "Name"], "GroupJoin(" ; "optional reference")]
    #[test_case(&["Customer", "Address", "City"], "order_customer_address" ; "reference chain")]
    fn test_reference_navigations(path: &[&str], expected: &str) {
        let result = expand_navigations(
            order_filter(path, "x"),
            &shop(),
            &ExpansionConfig::default(),
        )
        .unwrap();
        let rendered = result.plan.to_string();
        assert!(rendered.contains(expected), "{}", rendered);
        assert!(!rendered.contains("nav#"), "{}", rendered);
    }

    #[test]
    fn test_malformed_query_json() {
        let err = parse_query("{\"Where\": {}}").unwrap_err();
        assert!(matches!(err, QueryPlannerError::QueryParse(_)));
    }

    #[test]
    fn test_missing_query_file() {
        let err = load_query("tests/fixtures/missing.json").unwrap_err();
        assert!(matches!(err, QueryPlannerError::QueryRead { .. }));
    }

    #[test]
    fn test_errors_carry_pass_context() {
        let config = ExpansionConfig {
            max_navigation_depth: 1,
            ..ExpansionConfig::default()
        };
        let err = expand_navigations(
            order_filter(&["Customer", "Address", "City"], "x"),
            &shop(),
            &config,
        )
        .unwrap_err();
        let QueryPlannerError::Analyzer(analyzer) = &err else {
            panic!("expected an analyzer error, got {:?}", err);
        };
        assert_eq!(
            analyzer.navigation_error(),
            Some(&NavigationExpansionError::NavigationDepthExceeded {
                operator: OperatorKind::Where,
                path: "Order.Customer.Address".to_string(),
                limit: 1,
            })
        );
        assert!(err.to_string().contains("NavigationExpansion"), "{}", err);
        assert!(
            err.to_string().contains("Where: navigation `Order.Customer.Address`"),
            "{}",
            err
        );
    }

    #[test]
    fn test_unknown_member_is_left_as_field_access() {
        let result = expand_navigations(
            order_filter(&["Reference"], "x"),
            &shop(),
            &ExpansionConfig::default(),
        )
        .unwrap();
        assert_eq!(
            result.plan.to_string(),
            "Where(order => order.Reference == \"x\")\n└── EntityScan(Order)\n"
        );
    }
}
