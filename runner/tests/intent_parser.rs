//! Gemini intent parsing against a local stand-in for the generateContent API.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use runner::{GeminiIntentParser, IntentError, IntentParser};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct Model {
    reply: Arc<(StatusCode, Value)>,
    seen: Arc<Mutex<Vec<(String, HeaderMap, Value)>>>,
}

async fn generate(
    State(model): State<Model>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    model.seen.lock().unwrap().push((uri.to_string(), headers, body));
    let (status, reply) = &*model.reply;
    (*status, Json(reply.clone()))
}

async fn spawn_model(status: StatusCode, reply: Value) -> (String, Model) {
    let model = Model {
        reply: Arc::new((status, reply)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    // The model id contains a colon-suffixed method, so match the whole tail.
    let app = Router::new()
        .route("/v1beta/models/{*rest}", post(generate))
        .with_state(model.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/v1beta", addr), model)
}

fn parser(endpoint: String, api_key: Option<String>) -> GeminiIntentParser {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    GeminiIntentParser::new(endpoint, "gemini-2.5-flash", api_key).with_client(http)
}

fn candidate(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
}

#[tokio::test]
async fn test_parses_job_and_variables() {
    let text = r#"{"jobName":"Daily_Sales_Load","globalVariables":{"$G_Region":"NA","$G_FiscalYear":2024},"explanation":"Daily load for NA"}"#;
    let (endpoint, model) = spawn_model(StatusCode::OK, candidate(text)).await;
    let parser = parser(endpoint, Some("key-1".to_string()));
    let known = vec!["Daily_Sales_Load".to_string(), "Master_Data_Sync".to_string()];

    let parsed = parser
        .parse("Run the daily sales load for region NA and fiscal year 2024", &known)
        .await
        .unwrap();

    assert_eq!(parsed.job_name, "Daily_Sales_Load");
    assert_eq!(parsed.explanation.as_deref(), Some("Daily load for NA"));
    let request = parsed.into_request("MAIN_REPO", "JS_PROD_01").unwrap();
    let vars = request.global_variables();
    assert_eq!(vars["$G_Region"], "NA");
    assert_eq!(vars["$G_FiscalYear"], "2024");

    let seen = model.seen.lock().unwrap();
    let (uri, headers, body) = &seen[0];
    assert_eq!(uri, "/v1beta/models/gemini-2.5-flash:generateContent");
    assert_eq!(headers["x-goog-api-key"], "key-1");
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(
        body["generationConfig"]["responseSchema"]["required"],
        json!(["jobName", "globalVariables"])
    );
    assert!(body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Daily_Sales_Load, Master_Data_Sync"));
    assert_eq!(
        body["contents"][0]["parts"][0]["text"],
        "Run the daily sales load for region NA and fiscal year 2024"
    );
}

#[tokio::test]
async fn test_http_error_is_reported_as_intent_failure() {
    let (endpoint, _) = spawn_model(
        StatusCode::FORBIDDEN,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
    )
    .await;
    let parser = parser(endpoint, Some("bad".to_string()));

    let err = parser.parse("run something", &[]).await.unwrap_err();
    match err {
        IntentError::Http(msg) => {
            assert!(msg.starts_with("HTTP 403"), "{}", msg);
            assert!(msg.contains("API key not valid"));
        }
        other => panic!("expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_model_text_is_malformed() {
    let (endpoint, _) = spawn_model(StatusCode::OK, candidate("I could not find that job.")).await;
    let parser = parser(endpoint, Some("key".to_string()));

    let err = parser.parse("run something", &[]).await.unwrap_err();
    assert!(matches!(err, IntentError::Malformed(_)));
}
