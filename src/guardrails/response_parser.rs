use super::types::{EvaluationResult, GuardrailError};
use tracing::debug;

/// Parse the evaluator response body (JSON string) into an EvaluationResult.
pub fn parse_evaluation_result(body: &str) -> Result<EvaluationResult, GuardrailError> {
    let result = serde_json::from_str::<EvaluationResult>(body)
        .map_err(|e| GuardrailError::ParseError(e.to_string()))?;

    debug!(
        blocked = result.is_blocked(),
        failures = result.failures().len(),
        "Parsed evaluation result"
    );

    Ok(result)
}

/// Parse an HTTP response from the evaluator, handling non-2xx status codes.
/// A 422 carries the service's request-validation error.
pub fn parse_evaluation_http_response(
    status: u16,
    body: &str,
) -> Result<EvaluationResult, GuardrailError> {
    if status == 422 {
        return Err(GuardrailError::Validation(body.to_string()));
    }
    if !(200..300).contains(&status) {
        return Err(GuardrailError::HttpError {
            status,
            body: body.to_string(),
        });
    }
    parse_evaluation_result(body)
}
