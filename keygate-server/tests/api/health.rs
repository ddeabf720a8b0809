use crate::{TestApp, TestIssuer};

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn health_check_needs_no_token() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(0).await;
    let app = TestApp::start(issuer.gate()).await;

    let response = app.get("/health", None).await;

    assert_eq!(200, response.status().as_u16());
    assert_eq!("UP", response.text().await.unwrap());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn unknown_routes_are_not_found() {
    let issuer = TestIssuer::start().await;
    let app = TestApp::start(issuer.gate()).await;

    let response = app.get("/nope", None).await;

    assert_eq!(404, response.status().as_u16());
}
