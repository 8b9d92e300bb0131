//! Client for the world-ecletix lookup API.
//!
//! The upstream is an opaque black box returning loosely structured
//! JSON. Every failure mode — timeout, connection error, non-2xx status,
//! unparseable body — is absorbed into an unsuccessful
//! [`UpstreamOutcome`] rather than an error: the pipeline must always
//! produce a well-formed response, and never 5xx just because the
//! upstream is down.

use std::time::Duration;

use serde_json::Value;

use crate::models::tipo::Tipo;

/// User agent presented to the upstream.
const USER_AGENT: &str = "MutanoX-Premium-API/v2.0";

/// Result of one upstream lookup, success or not.
#[derive(Debug, Clone)]
pub struct UpstreamOutcome {
    pub sucesso: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl UpstreamOutcome {
    fn failure(message: String) -> Self {
        UpstreamOutcome {
            sucesso: false,
            data: None,
            error: Some(message),
        }
    }
}

/// The upstream's success indicator, which is inconsistently typed
/// across endpoints: sometimes a boolean, sometimes a string, sometimes
/// absent entirely. All interpretation happens in [`resolve_success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessFlag {
    Boolean(bool),
    Text(String),
    Inferred,
}

impl SuccessFlag {
    fn from_payload(data: &Value) -> SuccessFlag {
        match data.get("sucesso") {
            Some(Value::Bool(b)) => SuccessFlag::Boolean(*b),
            Some(Value::String(s)) => SuccessFlag::Text(s.clone()),
            _ => SuccessFlag::Inferred,
        }
    }
}

/// Normalize the upstream's duck-typed success indicator.
///
/// A boolean flag is used directly. A textual "true" counts as success;
/// any other text, like an absent flag, falls back to inferring success
/// from the presence of a data/results field.
pub fn resolve_success(data: &Value) -> bool {
    match SuccessFlag::from_payload(data) {
        SuccessFlag::Boolean(b) => b,
        SuccessFlag::Text(s) if s.eq_ignore_ascii_case("true") => true,
        SuccessFlag::Text(_) | SuccessFlag::Inferred => has_result_field(data),
    }
}

fn has_result_field(data: &Value) -> bool {
    ["dados", "resultados", "resultado"]
        .iter()
        .any(|field| matches!(data.get(*field), Some(v) if !v.is_null()))
}

/// HTTP client for the upstream, carrying its base URL and hard timeout.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    /// Build the client with the configured hard timeout (default 30s).
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(UpstreamClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Endpoint path and query parameter name for one lookup kind.
    fn route(tipo: Tipo) -> (&'static str, &'static str) {
        match tipo {
            Tipo::Cpf => ("/api/consultarcpf", "cpf"),
            Tipo::Nome => ("/api/nome-completo", "q"),
            Tipo::Numero => ("/api/numero", "q"),
        }
    }

    /// Perform one lookup. Never returns an error; see module docs.
    pub async fn lookup(&self, tipo: Tipo, query: &str) -> UpstreamOutcome {
        let (path, param) = Self::route(tipo);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[(param, query)])
            .header("Content-Type", "application/json")
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("upstream request failed: {e}");
                return UpstreamOutcome::failure(format!("Erro de conexão: {e}"));
            }
        };

        let status = response.status();

        let data: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("upstream returned unparseable body: {e}");
                return UpstreamOutcome::failure("Resposta inválida da API externa".to_string());
            }
        };

        if !status.is_success() {
            let message = data
                .get("erro")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Erro HTTP {}", status.as_u16()));
            return UpstreamOutcome {
                sucesso: false,
                data: Some(data),
                error: Some(message),
            };
        }

        let sucesso = resolve_success(&data);
        let error = data.get("erro").and_then(Value::as_str).map(str::to_string);

        UpstreamOutcome {
            sucesso,
            data: Some(data),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_flag_is_used_directly() {
        assert!(resolve_success(&json!({ "sucesso": true })));
        assert!(!resolve_success(&json!({ "sucesso": false, "dados": {} })));
    }

    #[test]
    fn textual_true_counts_as_success() {
        assert!(resolve_success(&json!({ "sucesso": "true" })));
        assert!(resolve_success(&json!({ "sucesso": "TRUE" })));
    }

    #[test]
    fn other_text_falls_back_to_inference() {
        assert!(resolve_success(&json!({ "sucesso": "ok", "resultado": [] })));
        assert!(!resolve_success(&json!({ "sucesso": "ok" })));
    }

    #[test]
    fn absent_flag_infers_from_data_presence() {
        assert!(resolve_success(&json!({ "dados": { "nome": "Maria" } })));
        assert!(resolve_success(&json!({ "resultados": [1] })));
        assert!(!resolve_success(&json!({ "erro": "nada" })));
        assert!(!resolve_success(&json!({ "dados": null })));
    }

    #[test]
    fn routes_match_the_upstream_contract() {
        assert_eq!(UpstreamClient::route(Tipo::Cpf), ("/api/consultarcpf", "cpf"));
        assert_eq!(UpstreamClient::route(Tipo::Nome), ("/api/nome-completo", "q"));
        assert_eq!(UpstreamClient::route(Tipo::Numero), ("/api/numero", "q"));
    }
}
