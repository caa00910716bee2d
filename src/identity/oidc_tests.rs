use super::*;
use crate::identity::clock::ManualClock;

fn cfg() -> OidcConfig {
    OidcConfig {
        issuer_url: "https://id.example.com".into(),
        client_id: "dumbdo".into(),
        client_secret: Some("shh".into()),
        audience: Some("lists".into()),
        session_secret: "pepper".into(),
    }
}

fn client() -> (Arc<ManualClock>, OidcClient) {
    let clock = Arc::new(ManualClock::new());
    let c = offline_client(cfg(), None, clock.clone()).unwrap();
    (clock, c)
}

/// Form-decoded query parameter (`+` is a space).
fn query_param(url: &str, key: &str) -> Option<String> {
    let q = url.split_once('?')?.1;
    q.split('&').find_map(|kv| {
        let (k, v) = kv.split_once('=')?;
        (k == key).then(|| urlencoding::decode(&v.replace('+', " ")).unwrap().into_owned())
    })
}

#[test]
fn authorization_url_carries_code_flow_params() {
    let (_, c) = client();
    let url = c.authorization_url(false, None);
    assert!(url.starts_with("https://id.example.com/authorize?"));
    assert_eq!(query_param(&url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("dumbdo"));
    assert_eq!(query_param(&url, "redirect_uri").as_deref(), Some("https://todo.example.com/auth/callback"));
    let scope = query_param(&url, "scope").unwrap();
    for s in ["openid", "profile", "email"] {
        assert!(scope.split(' ').any(|x| x == s), "scope {:?} lacks {}", scope, s);
    }
    assert_eq!(query_param(&url, "audience").as_deref(), Some("lists"));
    assert_eq!(query_param(&url, "code_challenge_method").as_deref(), Some("S256"));
    assert!(query_param(&url, "code_challenge").is_some());
    assert!(query_param(&url, "state").is_some());
    assert!(query_param(&url, "nonce").is_some());
    assert!(query_param(&url, "prompt").is_none());
}

#[test]
fn forced_login_prompts_again() {
    let (_, c) = client();
    let url = c.authorization_url(true, None);
    assert_eq!(query_param(&url, "prompt").as_deref(), Some("login"));
}

#[test]
fn each_login_gets_fresh_state_and_nonce() {
    let (_, c) = client();
    let a = c.authorization_url(false, None);
    let b = c.authorization_url(false, None);
    assert_ne!(query_param(&a, "state"), query_param(&b, "state"));
    assert_ne!(query_param(&a, "nonce"), query_param(&b, "nonce"));
}

#[test]
fn pending_state_is_single_use() {
    let (_, c) = client();
    let url = c.authorization_url(false, Some("/lists"));
    let state = query_param(&url, "state").unwrap();
    let p = c.take_pending(&state).unwrap();
    assert_eq!(p.return_to, "/lists");
    assert_eq!(Some(p.nonce.secret().clone()), query_param(&url, "nonce"));
    assert!(c.take_pending(&state).is_none());
}

#[test]
fn pending_state_expires() {
    let (clock, c) = client();
    let url = c.authorization_url(false, None);
    let state = query_param(&url, "state").unwrap();
    clock.advance(PENDING_TTL);
    assert!(c.take_pending(&state).is_none());
}

#[test]
fn foreign_return_targets_are_dropped() {
    let (_, c) = client();
    for bad in ["https://evil.example", "//evil.example", "/\\evil"] {
        let url = c.authorization_url(false, Some(bad));
        let state = query_param(&url, "state").unwrap();
        assert_eq!(c.take_pending(&state).unwrap().return_to, "/");
    }
}

#[tokio::test]
async fn unknown_state_is_refused_before_any_request() {
    let (_, c) = client();
    let err = c.complete("code", "never-issued").await.unwrap_err();
    assert!(err.to_string().contains("unknown or expired"));
}

#[test]
fn logout_url_uses_end_session_endpoint_when_advertised() {
    let (_, c) = client();
    assert_eq!(c.logout_url(), "/");

    let c = offline_client(cfg(), Some("https://id.example.com/logout"), Arc::new(SystemClock)).unwrap();
    let url = c.logout_url();
    assert!(url.starts_with("https://id.example.com/logout?"));
    assert_eq!(query_param(&url, "client_id").as_deref(), Some("dumbdo"));
    assert_eq!(query_param(&url, "post_logout_redirect_uri").as_deref(), Some("https://todo.example.com/"));
}

#[test]
fn sweep_drops_stale_logins() {
    let (clock, c) = client();
    c.authorization_url(false, None);
    c.authorization_url(false, None);
    clock.advance(PENDING_TTL + Duration::from_secs(1));
    assert_eq!(c.sweep(), 2);
}
