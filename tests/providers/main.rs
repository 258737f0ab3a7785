#[allow(dead_code)]
#[path = "../guardrails/helpers.rs"]
mod helpers;

mod test_bedrock;
mod test_openai_chat;
