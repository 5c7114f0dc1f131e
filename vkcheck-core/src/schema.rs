//! JSON schemas for scenario and harness documents.

use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::ValidationSpec;
use crate::preflight::HarnessConfig;

/// Schema of a validation document.
pub fn validation_spec_schema() -> RootSchema {
    schema_for!(ValidationSpec)
}

/// Schema of the harness configuration file.
pub fn harness_config_schema() -> RootSchema {
    schema_for!(HarnessConfig)
}
