//! Paginated install listing and lookup by name.

use wpe_backup::api::ApiError;
use wpe_backup::engine::{ConfigError, LookupError};
use wpe_backup::settings::Settings;

use crate::support::{env, install_page, ready_settings, Call, Reply, ScriptedTransport};

fn offset(call: &Call) -> usize {
    call.query("offset")
        .and_then(|o| o.parse().ok())
        .expect("offset query parameter")
}

/// Serves `total` installs in enveloped pages.
fn paged(total: usize) -> impl Fn(&Call) -> Reply + Send + Sync + 'static {
    move |call| {
        let start = offset(call);
        let len = total.saturating_sub(start).min(100);
        Reply::Status(200, install_page(start, len, total))
    }
}

#[tokio::test]
async fn walks_pages_until_total_is_reached() {
    let env = env(ready_settings(), ScriptedTransport::new(paged(250))).await;

    let installs = env.engine.list_installs().await.expect("listing");
    assert_eq!(installs.len(), 250);
    assert_eq!(installs[0].name, "site0");
    assert_eq!(installs[249].name, "site249");

    let calls = env.transport.calls();
    let offsets: Vec<usize> = calls.iter().map(offset).collect();
    assert_eq!(offsets, [0, 100, 200]);
    assert!(calls.iter().all(|c| c.query("limit").as_deref() == Some("100")));
    assert!(calls.iter().all(|c| c.url.path() == "/v1/installs"));
}

#[tokio::test]
async fn exact_multiple_stops_on_reported_total() {
    let env = env(ready_settings(), ScriptedTransport::new(paged(200))).await;

    assert_eq!(env.engine.list_installs().await.expect("listing").len(), 200);
    assert_eq!(env.transport.call_count(), 2);
}

#[tokio::test]
async fn short_page_ends_listing_even_if_total_is_larger() {
    let env = env(
        ready_settings(),
        ScriptedTransport::new(|call: &Call| {
            let start = offset(call);
            let len = if start == 0 { 100 } else { 30 };
            Reply::Status(200, install_page(start, len, 999))
        }),
    )
    .await;

    assert_eq!(env.engine.list_installs().await.expect("listing").len(), 130);
    assert_eq!(env.transport.call_count(), 2);
}

#[tokio::test]
async fn bare_array_is_a_complete_listing() {
    let body = r#"[{"id":"a","name":"alpha"},{"id":"b","name":"beta","environment":"staging"}]"#;
    let env = env(ready_settings(), ScriptedTransport::always(Reply::json(200, body))).await;

    let installs = env.engine.list_installs().await.expect("listing");
    assert_eq!(installs.len(), 2);
    assert_eq!(installs[1].environment.as_str(), "staging");
    assert_eq!(installs[0].environment.as_str(), "unknown");
    assert_eq!(env.transport.call_count(), 1);
}

#[tokio::test]
async fn null_environment_does_not_break_the_listing() {
    let body = r#"{"results":[
        {"id":"a","name":"alpha","environment":null},
        {"id":"b","name":"beta","environment":"production"}
    ],"count":2}"#;
    let env = env(ready_settings(), ScriptedTransport::always(Reply::json(200, body))).await;

    let installs = env.engine.list_installs().await.expect("listing");
    assert_eq!(installs.len(), 2);
    assert_eq!(installs[0].environment.as_str(), "unknown");
    assert_eq!(installs[1].environment.as_str(), "production");

    let id = env.engine.resolve_id_by_name("beta").await.expect("lookup");
    assert_eq!(id.as_deref(), Some("b"));
}

#[tokio::test]
async fn malformed_install_error_names_the_entry() {
    let body = r#"{"results":[{"id":"a","name":"alpha"},{"id":"b"}],"count":2}"#;
    let env = env(ready_settings(), ScriptedTransport::always(Reply::json(200, body))).await;

    let err = env.engine.list_installs().await.expect_err("should fail");
    let LookupError::Api(ApiError::Parse(ref message)) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert!(message.contains("install at index 1"), "{message}");
    assert!(message.contains("name"), "{message}");
}

#[tokio::test]
async fn envelope_without_count_stops_after_first_page() {
    let body = serde_json::json!({
        "results": (0..100)
            .map(|n| serde_json::json!({"id": format!("id-{n}"), "name": format!("site{n}")}))
            .collect::<Vec<_>>()
    })
    .to_string();
    let env = env(ready_settings(), ScriptedTransport::always(Reply::Status(200, body))).await;

    assert_eq!(env.engine.list_installs().await.expect("listing").len(), 100);
    assert_eq!(env.transport.call_count(), 1);
}

#[tokio::test]
async fn runaway_total_hits_the_offset_cap() {
    let env = env(
        ready_settings(),
        ScriptedTransport::new(|call: &Call| {
            Reply::Status(200, install_page(offset(call), 100, 1_000_000))
        }),
    )
    .await;

    let installs = env.engine.list_installs().await.expect("partial listing");
    assert_eq!(env.transport.call_count(), 11);
    assert_eq!(installs.len(), 1100);
    let last_offset = env.transport.calls().last().map(offset);
    assert_eq!(last_offset, Some(1000));
}

#[tokio::test]
async fn failed_page_aborts_the_listing() {
    let env = env(
        ready_settings(),
        ScriptedTransport::new(|call: &Call| {
            if offset(call) == 0 {
                Reply::Status(200, install_page(0, 100, 300))
            } else {
                Reply::json(500, r#"{"message":"boom"}"#)
            }
        }),
    )
    .await;

    let err = env.engine.list_installs().await.expect_err("should fail");
    assert!(
        matches!(err, LookupError::Api(ApiError::HttpStatus { status: 500, .. })),
        "{err:?}"
    );
    assert!(err.to_string().starts_with("Failed to fetch from WP Engine API"));
}

#[tokio::test]
async fn unparseable_page_is_a_format_error() {
    let env = env(ready_settings(), ScriptedTransport::always(Reply::json(200, "<html>"))).await;

    let err = env.engine.list_installs().await.expect_err("should fail");
    assert!(matches!(err, LookupError::Api(ApiError::Parse(_))), "{err:?}");
}

#[tokio::test]
async fn listing_requires_credentials() {
    let env = env(Settings::default(), ScriptedTransport::new(paged(10))).await;

    let err = env.engine.list_installs().await.expect_err("should fail");
    assert!(matches!(
        err,
        LookupError::Configuration(ConfigError::MissingCredentials)
    ));
    assert_eq!(env.transport.call_count(), 0);
}

#[tokio::test]
async fn resolves_name_on_a_later_page() {
    let env = env(ready_settings(), ScriptedTransport::new(paged(250))).await;

    let id = env.engine.resolve_id_by_name("site180").await.expect("lookup");
    assert_eq!(id.as_deref(), Some("id-180"));

    let missing = env.engine.resolve_id_by_name("Site180").await.expect("lookup");
    assert!(missing.is_none(), "matching is exact");
}
