//! Twilio call update against an in-process HTTP server

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use call_bridge_core::{CallControl, CallScript};
use call_bridge_telephony::{TelephonyError, TwilioCallControl, TwilioConfig};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct Captured {
    account: String,
    call: String,
    authorization: Option<String>,
    twiml: Option<String>,
}

type Captures = Arc<Mutex<Vec<Captured>>>;

async fn update_call(
    State(captures): State<Captures>,
    Path((account, call)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    captures.lock().push(Captured {
        account,
        call,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        twiml: form.get("Twiml").cloned(),
    });
    StatusCode::OK
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn control(api_base: String) -> TwilioCallControl {
    TwilioCallControl::new(TwilioConfig {
        account_sid: Some("AC123".to_string()),
        api_key_sid: Some("SK456".to_string()),
        api_secret: Some("s3cret".to_string()),
        api_base,
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

#[tokio::test]
async fn test_inject_posts_twiml_with_basic_auth() {
    let captures: Captures = Arc::default();
    let router = Router::new()
        .route("/2010-04-01/Accounts/:account/Calls/:call", post(update_call))
        .with_state(captures.clone());
    let control = control(serve(router).await);

    let script = CallScript::new()
        .say("Still here & listening.")
        .connect_stream("wss://bridge.example.com/realtime");
    control.inject("CA789", &script).await.unwrap();

    let captured = captures.lock().clone();
    assert_eq!(captured.len(), 1);
    let request = &captured[0];
    assert_eq!(request.account, "AC123");
    assert_eq!(request.call, "CA789.json");

    let expected_auth = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("SK456:s3cret")
    );
    assert_eq!(request.authorization.as_deref(), Some(expected_auth.as_str()));

    let twiml = request.twiml.as_deref().unwrap();
    assert!(twiml.contains("<Say>Still here &amp; listening.</Say>"));
    assert!(twiml.contains(r#"<Stream url="wss://bridge.example.com/realtime"/>"#));
}

#[tokio::test]
async fn test_rejected_update_is_recoverable_error() {
    let router = Router::new().route(
        "/2010-04-01/Accounts/:account/Calls/:call",
        post(|| async { (StatusCode::NOT_FOUND, r#"{"code":20404}"#) }),
    );
    let control = control(serve(router).await);

    let err = control
        .update_call("CA-gone", &CallScript::new().say("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, TelephonyError::Status { status: 404, .. }));

    let core_err = control
        .inject("CA-gone", &CallScript::new().say("hello"))
        .await
        .unwrap_err();
    assert!(matches!(core_err, call_bridge_core::Error::CallControl(_)));
    assert!(!core_err.is_fatal());
}
