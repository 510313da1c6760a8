use std::sync::Arc;

use pretty_assertions::assert_eq;
use statuskit_core::StatusService;
use statuskit_core::StatusServiceConfig;
use statuskit_protocol::CheckScope;
use statuskit_test_support::EmptyDiagnostics;
use statuskit_test_support::failing_provider;
use statuskit_test_support::next_value;
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn provider_failures_are_logged_when_enabled() -> anyhow::Result<()> {
    let config = StatusServiceConfig::from_toml_str("log_provider_errors = true")?;
    let service = StatusService::new(Arc::new(EmptyDiagnostics), config);
    let _registration = service.register_status_provider("broken", failing_provider("boom"))?;

    let mut statuses = service.observe_statuses(CheckScope::Global);
    assert_eq!(next_value(&mut statuses).await, Vec::new());

    assert!(logs_contain("status provider failed: boom"));
    Ok(())
}
