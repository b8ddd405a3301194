//! Process-wide defaults used by `Request::send`.
//!
//! The defaults are global, so every step that touches them runs inside a
//! single test in this binary.

mod common;

use modkit_request::{
    HttpClientConfig, Request, TimeoutPhase, default_client, default_config, set_connect_timeout,
    set_default_config,
};
use std::time::Duration;

#[tokio::test]
async fn default_client_follows_process_configuration() {
    let addr = common::spawn(common::router()).await;

    assert_eq!(default_config().connect_timeout, Duration::from_secs(1));
    let response = Request::get(format!("http://{addr}/headers/user-agent"))
        .send()
        .await
        .unwrap();
    assert!(
        response
            .text()
            .await
            .unwrap()
            .starts_with("modkit-request/")
    );

    let first = default_client().unwrap();
    set_connect_timeout(Duration::from_millis(250));
    let second = default_client().unwrap();
    assert_eq!(first.connect_timeout(), Duration::from_secs(1));
    assert_eq!(second.connect_timeout(), Duration::from_millis(250));
    assert_eq!(default_config().connect_timeout, Duration::from_millis(250));

    set_default_config(HttpClientConfig {
        user_agent: "configured/3.0".to_owned(),
        request_timeout: Some(Duration::from_millis(200)),
        ..HttpClientConfig::for_testing()
    });

    let response = Request::get(format!("http://{addr}/headers/user-agent"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "configured/3.0");

    let err = Request::get(format!("http://{addr}/hang"))
        .send()
        .await
        .unwrap_err();
    assert_eq!(err.timeout_phase(), Some(TimeoutPhase::Request));
}
