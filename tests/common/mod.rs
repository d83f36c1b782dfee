//! Common test utilities for integration tests
//!
//! Shared logging initialization and settings fixtures.

#![allow(dead_code)]

use std::sync::Once;
use unicorn_stack::config::StackSettings;
use unicorn_stack::observability::init_logging;

static LOGGING_INIT: Once = Once::new();

/// Install the test subscriber once per test binary
pub fn init_test_logging() {
    LOGGING_INIT.call_once(|| init_logging("unicorn_stack=debug"));
}

/// Settings from the documented example: scope "Demo", two zones, two replicas
pub fn demo_settings() -> StackSettings {
    let mut settings = StackSettings::new("Demo", "admin", "unicorn-store", "siteadmin");
    settings.max_azs = 2;
    settings.desired_replica_count = 2;
    settings
}

pub const DEMO_SETTINGS_YAML: &str = r#"
scopeName: Demo
maxAzs: 2
dbUsername: admin
desiredReplicaCount: 2
dockerImageRepository: unicorn-store
imageTag: "1.4.0"
defaultSiteAdminUsername: admin@unicorn.store
"#;
