use std::sync::Arc;

use pretty_assertions::assert_eq;
use statuskit_core::StatusService;
use statuskit_core::StatusServiceConfig;
use statuskit_protocol::CheckScope;
use statuskit_test_support::EmptyDiagnostics;
use statuskit_test_support::ScriptedProvider;
use statuskit_test_support::assert_quiet;
use statuskit_test_support::failing_provider;
use statuskit_test_support::next_value;
use statuskit_test_support::static_provider;
use statuskit_test_support::status_1;
use statuskit_test_support::status_2;
use statuskit_test_support::wrap;

const SCOPE: CheckScope = CheckScope::Global;

fn service() -> StatusService {
    StatusService::new(Arc::new(EmptyDiagnostics), StatusServiceConfig::default())
}

#[tokio::test]
async fn no_providers_yields_none() {
    let service = service();
    for name in ["a", "b", "anything"] {
        let mut status = service.observe_status(name, SCOPE);
        assert_eq!(next_value(&mut status).await, None);
    }
}

#[tokio::test]
async fn single_provider_round_trip() -> anyhow::Result<()> {
    let service = service();
    let provider = ScriptedProvider::new();
    provider.emit(None);
    provider.emit(Some(status_1()));
    provider.emit(Some(status_2()));
    provider.emit(None);
    let _registration = service.register_status_provider("a", provider)?;

    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, None);
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_1())));
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_2())));
    assert_eq!(next_value(&mut status).await, None);
    Ok(())
}

#[tokio::test]
async fn suppresses_errors() -> anyhow::Result<()> {
    let service = service();
    let _registration = service.register_status_provider("a", failing_provider("x"))?;

    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, None);
    assert_quiet(&mut status).await;
    Ok(())
}

#[tokio::test]
async fn follows_registration_of_watched_name() -> anyhow::Result<()> {
    let service = service();
    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, None);

    let first = service.register_status_provider("a", static_provider(Some(status_1())))?;
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_1())));

    first.release();
    assert_eq!(next_value(&mut status).await, None);

    let _second = service.register_status_provider("a", static_provider(Some(status_2())))?;
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_2())));
    Ok(())
}

#[tokio::test]
async fn ignores_other_names() -> anyhow::Result<()> {
    let service = service();
    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, None);

    let other = service.register_status_provider("b", static_provider(Some(status_1())))?;
    assert_quiet(&mut status).await;

    other.release();
    assert_quiet(&mut status).await;
    Ok(())
}

#[tokio::test]
async fn only_reports_the_watched_provider() -> anyhow::Result<()> {
    let service = service();
    let _a = service.register_status_provider("a", static_provider(Some(status_1())))?;
    let _b = service.register_status_provider("b", static_provider(Some(status_2())))?;

    let mut status = service.observe_status("b", SCOPE);
    assert_eq!(next_value(&mut status).await, Some(wrap("b", status_2())));
    Ok(())
}

#[tokio::test]
async fn back_to_back_changes_to_other_names_are_ignored() -> anyhow::Result<()> {
    let service = service();
    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, None);

    let _a = service.register_status_provider("a", static_provider(Some(status_1())))?;
    let b = service.register_status_provider("b", static_provider(Some(status_2())))?;
    b.release();

    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_1())));
    assert_quiet(&mut status).await;
    Ok(())
}

#[tokio::test]
async fn back_to_back_release_and_registration_of_watched_name() -> anyhow::Result<()> {
    let service = service();
    let first = service.register_status_provider("a", static_provider(Some(status_1())))?;
    let mut status = service.observe_status("a", SCOPE);
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_1())));

    first.release();
    let _second = service.register_status_provider("a", static_provider(Some(status_2())))?;

    assert_eq!(next_value(&mut status).await, None);
    assert_eq!(next_value(&mut status).await, Some(wrap("a", status_2())));
    Ok(())
}
