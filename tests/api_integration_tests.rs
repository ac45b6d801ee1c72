use chefbyte::api_connection::{
    connection::ApiConnectionError,
    endpoints::{ChatCompletionRequest, ChatMessage, DEFAULT_MODEL},
    Provider,
};
use chefbyte::modification::{extract_payload, parse};
use chefbyte::Oracle;
use dotenv::dotenv;
use std::env;

const TEST_API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

fn setup_test_environment() {
    dotenv().ok();
}

#[tokio::test]
async fn test_missing_api_key_error() {
    setup_test_environment();
    let provider = Provider::openrouter("THIS_KEY_SHOULD_NOT_EXIST_IN_ENV_ABXYZ");
    let request = ChatCompletionRequest {
        model: DEFAULT_MODEL.to_string(),
        messages: vec![ChatMessage::user("Hello")],
        temperature: None,
        max_tokens: None,
    };
    let result = provider.call_chat_completion(request).await;
    assert!(matches!(result, Err(ApiConnectionError::MissingApiKey(_))));
    if let Err(ApiConnectionError::MissingApiKey(key_name)) = result {
        assert_eq!(key_name, "THIS_KEY_SHOULD_NOT_EXIST_IN_ENV_ABXYZ");
    }
}

#[tokio::test]
#[ignore]
async fn test_live_inventory_request_yields_payload() {
    setup_test_environment();
    if env::var(TEST_API_KEY_ENV_VAR).is_err() {
        println!(
            "Skipping test_live_inventory_request_yields_payload: {} not set.",
            TEST_API_KEY_ENV_VAR
        );
        return;
    }

    let provider = Provider::openrouter(TEST_API_KEY_ENV_VAR);
    let system_prompt = chefbyte::assistant::build_system_prompt(
        "",
        "",
        chrono::Local::now().naive_local(),
    );
    let result = provider
        .generate(&system_prompt, &[ChatMessage::user("Add 2 apples")])
        .await;
    assert!(result.is_ok(), "API call failed: {:?}", result.err());

    let response = result.unwrap();
    let payload = extract_payload(&response)
        .unwrap_or_else(|| panic!("Expected a JSON payload, got: {}", response));
    let batch = parse(payload).expect("payload should decode");
    assert!(batch
        .instructions
        .iter()
        .any(|i| i.name.to_lowercase().contains("apple")));
}
