//! Test fixtures and utilities

use uuid::Uuid;

/// Generate a unique device ID for testing
pub fn unique_device_id() -> String {
    format!("test-device-{}", &Uuid::new_v4().to_string()[..8])
}

/// Generate a unique template name for testing
pub fn unique_template_name() -> String {
    format!("test-template-{}", &Uuid::new_v4().to_string()[..8])
}

/// Generate a unique group name for testing
pub fn unique_group_name() -> String {
    format!("test-group-{}", &Uuid::new_v4().to_string()[..8])
}

/// Check if API URL is configured
pub fn api_url_configured() -> bool {
    std::env::var("FLEETOPS_API_URL").is_ok()
}

/// Skip test if API URL is not configured
#[macro_export]
macro_rules! skip_if_no_api {
    () => {
        if !$crate::fixtures::api_url_configured() {
            eprintln!("Skipping test: FLEETOPS_API_URL not set");
            return;
        }
    };
}
