//! Integration tests for the public navexpand API: model loading,
//! configuration and the end-to-end expansion entry points.

mod config_tests;
mod entity_model_tests;
mod expansion_api_tests;
