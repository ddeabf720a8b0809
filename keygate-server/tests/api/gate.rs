use std::sync::Arc;

use keygate_core::config::{OneOrMany, Options};
use keygate_core::{Algorithm, ConfigError, Rejection, RevocationRegistry};
use keygate_server::auth::{Decision, Gate, GateError};
use serde_json::json;

use crate::{TestIssuer, AUDIENCE};

fn options(issuer: Option<&str>, audience: Option<&str>, algorithms: Option<OneOrMany>) -> Options {
    Options {
        issuer: issuer.map(str::to_string),
        audience: audience.map(str::to_string),
        algorithms,
        ..Options::default()
    }
}

fn rs256() -> Option<OneOrMany> {
    Some(OneOrMany::One("RS256".to_string()))
}

fn assert_rejected(decision: Decision, expected: impl Fn(&Rejection) -> bool) {
    match decision {
        Decision::Unauthorized(rejection) => assert!(expected(&rejection), "{:?}", rejection),
        Decision::Authorized(claims) => panic!("expected rejection, authorized {:?}", claims),
    }
}

#[test_log::test]
fn missing_options_are_configuration_errors() {
    let cases = [
        (options(None, Some(AUDIENCE), rs256()), "issuer"),
        (options(Some(""), Some(AUDIENCE), rs256()), "issuer"),
        (options(Some("https://issuer.test"), None, rs256()), "audience"),
        (options(Some("https://issuer.test"), Some(""), rs256()), "audience"),
        (options(Some("https://issuer.test"), Some(AUDIENCE), None), "algorithms"),
        (
            options(
                Some("https://issuer.test"),
                Some(AUDIENCE),
                Some(OneOrMany::Many(vec![])),
            ),
            "algorithms",
        ),
    ];

    for (options, missing) in cases {
        match Gate::from_options(options) {
            Err(GateError::Configuration(ConfigError::MissingOption(name))) => {
                assert_eq!(missing, name)
            }
            Err(e) => panic!("expected missing {}, got {}", missing, e),
            Ok(_) => panic!("expected missing {}, got a gate", missing),
        }
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn valid_token_is_authorized_with_exact_claims() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();

    let original = issuer.claims_with(json!({"custom:tenant": "acme", "token_use": "access"}));
    let token = issuer.sign(&original);

    match gate.authorize(Some(&token)).await.unwrap() {
        Decision::Authorized(claims) => {
            assert_eq!(original, serde_json::to_value(claims).unwrap())
        }
        Decision::Unauthorized(rejection) => panic!("rejected: {}", rejection),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn missing_token_does_not_fetch_keys() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(0).await;
    let gate = issuer.gate();

    assert_eq!(
        Decision::Unauthorized(Rejection::MissingToken),
        gate.authorize(None).await.unwrap()
    );
    assert_eq!(
        Decision::Unauthorized(Rejection::MissingToken),
        gate.authorize(Some("  ")).await.unwrap()
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn fetch_keys_first_fetches_even_without_token() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = Gate::new(issuer.config().with_fetch_keys_first(true)).unwrap();

    assert_eq!(
        Decision::Unauthorized(Rejection::MissingToken),
        gate.authorize(None).await.unwrap()
    );
    assert!(gate.key_cache().cached(&issuer.issuer()).await.is_some());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn fetch_keys_first_reports_fetch_errors_before_missing_token() {
    let issuer = TestIssuer::start().await;
    issuer.serve_status(500, 1).await;
    let gate = Gate::new(issuer.config().with_fetch_keys_first(true)).unwrap();

    assert!(matches!(
        gate.authorize(None).await,
        Err(GateError::KeyFetch { .. })
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn expiry_boundary() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();
    let now = chrono::Utc::now().timestamp();

    let expired = issuer.sign(&issuer.claims_with(json!({"exp": now - 1})));
    assert_rejected(gate.authorize(Some(&expired)).await.unwrap(), |r| {
        matches!(r, Rejection::Expired { .. })
    });

    let far_future = issuer.sign(&issuer.claims_with(json!({"exp": now + 10 * 365 * 24 * 3600})));
    assert!(matches!(
        gate.authorize(Some(&far_future)).await.unwrap(),
        Decision::Authorized(_)
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn fractional_expiry_is_a_valid_numeric_date() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();
    let now = chrono::Utc::now().timestamp() as f64;

    let future = issuer.sign(&issuer.claims_with(json!({"exp": now + 3600.5})));
    assert!(matches!(
        gate.authorize(Some(&future)).await.unwrap(),
        Decision::Authorized(_)
    ));

    let past = issuer.sign(&issuer.claims_with(json!({"exp": now - 3600.5})));
    assert_rejected(gate.authorize(Some(&past)).await.unwrap(), |r| {
        matches!(r, Rejection::Expired { .. })
    });
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn each_claim_mismatch_is_rejected_on_its_own() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();

    let wrong_audience = issuer.sign(&issuer.claims_with(json!({"aud": "someone-else"})));
    assert_rejected(gate.authorize(Some(&wrong_audience)).await.unwrap(), |r| {
        *r == Rejection::AudienceMismatch
    });

    let audience_list = issuer.sign(&issuer.claims_with(json!({"aud": [AUDIENCE]})));
    assert_rejected(gate.authorize(Some(&audience_list)).await.unwrap(), |r| {
        *r == Rejection::AudienceMismatch
    });

    let wrong_issuer = issuer.sign(&issuer.claims_with(json!({"iss": "https://evil.test/pool"})));
    assert_rejected(gate.authorize(Some(&wrong_issuer)).await.unwrap(), |r| {
        *r == Rejection::IssuerMismatch
    });

    let wrong_use = issuer.sign(&issuer.claims_with(json!({"token_use": "refresh"})));
    assert_rejected(gate.authorize(Some(&wrong_use)).await.unwrap(), |r| {
        matches!(r, Rejection::TokenUseNotAllowed(_))
    });

    let no_issuer = issuer.sign(&issuer.claims_with(json!({"iss": null})));
    assert_rejected(gate.authorize(Some(&no_issuer)).await.unwrap(), |r| {
        *r == Rejection::OpaquePayload
    });
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn unknown_key_id_is_rejected_without_refetching() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();

    assert!(matches!(
        gate.authorize(Some(&issuer.token())).await.unwrap(),
        Decision::Authorized(_)
    ));

    let token = issuer
        .generator
        .clone()
        .with_key_id("unknown")
        .generate("user-2", "id", chrono::Duration::hours(1))
        .unwrap();

    assert_eq!(
        Decision::Unauthorized(Rejection::UnknownKeyId("unknown".to_string())),
        gate.authorize(Some(&token)).await.unwrap()
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn revoked_subject_is_rejected() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let registry = Arc::new(RevocationRegistry::new());
    let gate = issuer.gate().with_revocation(registry.clone());
    let token = issuer.token();

    assert!(matches!(
        gate.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));

    registry.revoke("user-1");
    assert_eq!(
        Decision::Unauthorized(Rejection::Revoked("user-1".to_string())),
        gate.authorize(Some(&token)).await.unwrap()
    );

    registry.reinstate("user-1");
    assert!(matches!(
        gate.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn issuer_with_trailing_slash() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let issuer_url = format!("{}/", issuer.issuer());
    let gate = Gate::from_options(Options {
        issuer: Some(issuer_url.clone()),
        audience: Some(AUDIENCE.to_string()),
        algorithms: rs256(),
        ..Options::default()
    })
    .unwrap();

    let token = issuer.sign(&issuer.claims_with(json!({"iss": issuer_url})));
    assert!(matches!(
        gate.authorize(Some(&token)).await.unwrap(),
        Decision::Authorized(_)
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn signature_by_another_key_is_rejected() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let impostor = TestIssuer::start().await;
    let gate = issuer.gate();

    let token = impostor
        .generator
        .clone()
        .with_key_id(issuer.generator.key_id())
        .sign(&issuer.claims_with(json!({})))
        .unwrap();

    assert_rejected(gate.authorize(Some(&token)).await.unwrap(), |r| {
        matches!(r, Rejection::InvalidSignature(_))
    });
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
pub async fn algorithm_outside_allowlist_is_rejected() {
    let issuer = TestIssuer::start().await;
    issuer.serve_keys(1).await;
    let gate = issuer.gate();

    let token = issuer
        .generator
        .clone()
        .with_algorithm(Algorithm::RS384)
        .sign(&issuer.claims_with(json!({})))
        .unwrap();

    assert_rejected(gate.authorize(Some(&token)).await.unwrap(), |r| {
        matches!(r, Rejection::InvalidSignature(_))
    });
}
