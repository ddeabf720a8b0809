use std::sync::Arc;
use std::time::Duration;

use keygate_server::auth::{Decision, FetchError, Gate, GateError, KeyCache, KeyFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::{TestIssuer, JWKS_PATH};

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn bad_status_is_a_fetch_error() {
    let issuer = TestIssuer::start().await;
    issuer.serve_status(404, 1).await;
    let gate = issuer.gate();

    match gate.authorize(Some(&issuer.token())).await {
        Err(GateError::KeyFetch {
            issuer: failed,
            source: FetchError::Status { status, .. },
        }) => {
            assert_eq!(issuer.issuer(), failed);
            assert_eq!(404, status.as_u16());
        }
        other => panic!("expected a status error, got {:?}", other.map(|_| ())),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn not_modified_is_a_fetch_error() {
    let issuer = TestIssuer::start().await;
    issuer.serve_status(304, 1).await;

    let fetcher = KeyFetcher::new().unwrap();
    assert!(matches!(
        fetcher.fetch(&issuer.issuer()).await,
        Err(FetchError::Status { .. })
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn slow_issuer_times_out() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys_slowly(Duration::from_secs(1)).await;
    let gate = issuer.gate_with_timeout(Duration::from_millis(200));

    match gate.authorize(Some(&issuer.token())).await {
        Err(GateError::KeyFetch { source, .. }) => assert!(source.is_timeout(), "{}", source),
        other => panic!("expected a timeout, got {:?}", other.map(|_| ())),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn invalid_key_set_body() {
    let issuer = TestIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not keys</html>"))
        .expect(1)
        .mount(&issuer.server)
        .await;

    let fetcher = KeyFetcher::new().unwrap();
    assert!(matches!(
        fetcher.fetch(&issuer.issuer()).await,
        Err(FetchError::InvalidKeySet { .. })
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn failed_fetch_is_not_remembered() {
    let issuer = TestIssuer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&issuer.server)
        .await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();
    let token = issuer.token();

    assert!(gate.authorize(Some(&token)).await.is_err());
    assert!(gate.key_cache().is_empty().await);

    assert!(matches!(
        gate.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn cached_keys_are_reused() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();

    for _ in 0..5 {
        assert!(matches!(
            gate.authorize(Some(&issuer.token())).await.unwrap(),
            Decision::Authorized(_)
        ));
    }
    assert_eq!(1, gate.key_cache().len().await);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn concurrent_first_use_fetches_once() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let cache = Arc::new(KeyCache::new(KeyFetcher::new().unwrap()));
    let issuer_url = issuer.issuer();

    let fetches = (0..16).map(|_| {
        let cache = cache.clone();
        let issuer_url = issuer_url.clone();
        tokio::spawn(async move { cache.ensure_keys(&issuer_url).await })
    });
    let results = futures::future::join_all(fetches).await;

    let key_sets: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert!(key_sets.iter().all(|jwks| Arc::ptr_eq(jwks, &key_sets[0])));
    assert_eq!(issuer.jwks, *key_sets[0]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn gates_can_share_a_key_cache() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let cache = Arc::new(KeyCache::new(KeyFetcher::new().unwrap()));
    let first = Gate::with_key_cache(issuer.config(), cache.clone());
    let second = Gate::with_key_cache(issuer.config(), cache);
    let token = issuer.token();

    assert!(matches!(
        first.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));
    assert!(matches!(
        second.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));
}
