//! Chained proxies: upstream failover and mode handling.

use serde_json::{json, Value};
use std::time::Duration;

use config_proxy::proxy::Mode;

mod common;

#[tokio::test]
async fn fails_over_to_healthy_upstream() {
    let upstream = common::start_proxy(common::proxy_config(Mode::MemoryCache, vec![])).await;
    upstream.server().update_config(common::config(7, "from upstream"));
    let upstream_addr = upstream.local_addr().to_string();

    let dead = common::dead_address().await.to_string();
    let downstream = common::start_proxy(common::proxy_config(
        Mode::Default,
        vec![dead.clone(), upstream_addr.clone()],
    ))
    .await;
    let addr = downstream.local_addr();

    // The first fetch hits the dead source and the request waits; the
    // refresher's retry fails over and answers it.
    let answer = tokio::time::timeout(
        Duration::from_secs(10),
        common::result(addr, "getConfig", common::get_config_params(0, "")),
    )
    .await
    .unwrap();
    assert_eq!(answer["generation"], 7);

    let sources = common::result(addr, "listSourceConnections", Value::Null).await;
    assert_eq!(
        sources,
        json!([
            format!("Current source: {upstream_addr}"),
            format!("All sources:\n{dead}\n{upstream_addr}\n")
        ])
    );

    let listing = common::result(addr, "listCachedConfigFull", Value::Null).await;
    assert!(listing[0].as_str().unwrap().ends_with(",from upstream"));

    downstream.stop().await;
    upstream.stop().await;
}

#[tokio::test]
async fn downstream_picks_up_upstream_changes() {
    let upstream = common::start_proxy(common::proxy_config(Mode::MemoryCache, vec![])).await;
    upstream.server().update_config(common::config(1, "v1"));

    let downstream = common::start_proxy(common::proxy_config(
        Mode::Default,
        vec![upstream.local_addr().to_string()],
    ))
    .await;
    let addr = downstream.local_addr();

    let first = common::result(addr, "getConfig", common::get_config_params(0, "")).await;
    assert_eq!(first["generation"], 1);
    let hash = first["content_hash"].as_str().unwrap().to_string();

    let waiting = tokio::spawn(common::result(addr, "getConfig", common::get_config_params(1, &hash)));
    common::wait_for_pending(addr, 1).await;

    upstream.server().update_config(common::config(2, "v2"));
    let answer = tokio::time::timeout(Duration::from_secs(10), waiting)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer["generation"], 2);

    downstream.stop().await;
    upstream.stop().await;
}

#[tokio::test]
async fn memorycache_mode_rejects_source_updates() {
    let proxy = common::start_proxy(common::proxy_config(Mode::Default, vec!["cfg1:19070".into()])).await;
    let addr = proxy.local_addr();

    assert_eq!(
        common::result(addr, "setMode", json!("memorycache")).await,
        json!(["0", "success"])
    );
    assert_eq!(common::result(addr, "getMode", Value::Null).await, json!("memorycache"));
    assert_eq!(
        common::result(addr, "updateSources", json!("a:1,b:1")).await,
        json!("Cannot update sources when in 'memorycache' mode")
    );
    let sources = common::result(addr, "listSourceConnections", Value::Null).await;
    assert_eq!(sources[0], "Current source: cfg1:19070");

    assert_eq!(
        common::result(addr, "setMode", json!("Default")).await,
        json!(["0", "success"])
    );
    assert_eq!(
        common::result(addr, "updateSources", json!("a:1,b:1")).await,
        json!("Updated config sources to: a:1,b:1")
    );
    let sources = common::result(addr, "listSourceConnections", Value::Null).await;
    assert_eq!(sources[0], "Current source: a:1");

    proxy.stop().await;
}
