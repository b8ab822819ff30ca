//! Entity catalog loading from YAML files, including the definition rules
//! enforced before a model is built.

#[cfg(test)]
mod entity_model_tests {
    use std::io::Write;

    use navexpand::entity_catalog::{load_entity_model, EntityModelError};
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn write_model(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(yaml.as_bytes()).expect("write model");
        file
    }

    #[test]
    fn test_load_fixture_model() {
        let model = load_entity_model("tests/fixtures/shop.yaml").unwrap();
        assert_eq!(model.name, "shop");
        assert_eq!(model.entities().len(), 5);

        let shipper = model.relationship("Order", "Shipper").unwrap();
        assert!(shipper.is_optional, "nullable foreign key");
        let customer = model.relationship("Order", "Customer").unwrap();
        assert!(!customer.is_optional);
        let lines = model.relationship("Order", "Lines").unwrap();
        assert!(lines.is_collection);
        assert_eq!(lines.outer_key_fields(), ["Id".to_string()]);
        assert_eq!(lines.inner_key_fields(), ["OrderId".to_string()]);
    }

    #[test]
    fn test_missing_file() {
        let err = load_entity_model("tests/fixtures/does_not_exist.yaml").unwrap_err();
        assert!(matches!(err, EntityModelError::ConfigReadError { .. }));
    }

    #[test_case(
        r#"
entities:
  - name: Order
    key: [Id]
    fields: [{ name: Id, type: int }, { name: CustomerId, type: int }]
    relationships:
      - { name: Customer, target: Customer, foreign_key: [CustomerId] }
"#,
        "targets unknown entity";
        "unknown target"
    )]
    #[test_case(
        r#"
entities:
  - name: Order
    key: [Id]
    fields: [{ name: Id, type: int }]
    relationships:
      - { name: Lines, target: Line, foreign_key: [OrderId], collection: true }
  - name: Line
    key: [Id]
    fields: [{ name: Id, type: int }, { name: OrderId, type: int }]
"#,
        "cannot be the owning side";
        "owning collection"
    )]
    #[test_case(
        r#"
entities:
  - name: Order
    key: [Id]
    fields: [{ name: Id, type: int }, { name: CustomerId, type: int }]
    relationships:
      - { name: Customer, target: Customer, foreign_key: [CustomerId], inverse: Orders }
  - name: Customer
    key: [Id]
    fields: [{ name: Id, type: int }]
"#,
        "Inverse Orders";
        "missing inverse"
    )]
    #[test_case(
        r#"
entities:
  - name: Order
    key: [Number]
    fields: [{ name: Id, type: int }]
"#,
        "Key field Number";
        "undeclared key"
    )]
    fn test_invalid_definitions(yaml: &str, expected: &str) {
        let file = write_model(yaml);
        match load_entity_model(file.path()) {
            Err(EntityModelError::InvalidDefinition { message }) => {
                assert!(message.contains(expected), "{}", message)
            }
            other => panic!("expected an invalid definition, got {:?}", other),
        }
    }
}
