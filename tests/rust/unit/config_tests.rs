//! Expansion configuration from YAML files, environment variables and
//! command-line overrides.

#[cfg(test)]
mod config_tests {
    use std::env;
    use std::io::Write;

    use navexpand::config::{ConfigError, ConfigOverrides, ExpansionConfig};
    use serial_test::serial;
    use tempfile::NamedTempFile;

    const VARS: [&str; 3] = [
        "NAVEXPAND_MAX_NAVIGATION_DEPTH",
        "NAVEXPAND_MAX_OPERATOR_DEPTH",
        "NAVEXPAND_EXPAND_STRING_INCLUDES",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ExpansionConfig::from_env().unwrap();
        assert_eq!(config, ExpansionConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        clear_env();
        env::set_var("NAVEXPAND_MAX_NAVIGATION_DEPTH", "4");
        env::set_var("NAVEXPAND_EXPAND_STRING_INCLUDES", "false");
        let config = ExpansionConfig::from_env().unwrap();
        clear_env();
        assert_eq!(config.max_navigation_depth, 4);
        assert_eq!(config.max_operator_depth, 512);
        assert!(!config.expand_string_includes);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("NAVEXPAND_MAX_OPERATOR_DEPTH", "deep");
        let parse = ExpansionConfig::from_env();
        env::set_var("NAVEXPAND_MAX_OPERATOR_DEPTH", "0");
        let range = ExpansionConfig::from_env();
        clear_env();
        assert!(matches!(parse, Err(ConfigError::Parse { .. })));
        assert!(matches!(range, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_from_yaml_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_navigation_depth: 3").unwrap();
        let config = ExpansionConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_navigation_depth, 3);
        assert_eq!(config.max_operator_depth, 512);
        assert!(config.expand_string_includes);
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = ExpansionConfig::default();
        config
            .merge(ConfigOverrides {
                max_operator_depth: Some(8),
                no_string_includes: true,
                ..ConfigOverrides::default()
            })
            .unwrap();
        assert_eq!(config.max_operator_depth, 8);
        assert!(!config.expand_string_includes);

        let err = config
            .merge(ConfigOverrides {
                max_navigation_depth: Some(100),
                ..ConfigOverrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
