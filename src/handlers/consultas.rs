//! The lookup endpoint and its admission pipeline.
//!
//! `GET /api/consultas` runs every request through a strict sequence:
//! authenticate, charge quota, validate input, consult the cache, and
//! only then call the upstream. Upstream faults never become HTTP
//! faults; the body carries the outcome either way.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::AppError,
    handlers::{client_ip, header_str},
    middleware::cookie_value,
    models::{audit_log::AuditAction, tipo::Tipo},
    security::{
        anti_replay::SecurityLedger,
        anti_sql::{
            looks_like_sql_injection, mask_middle, strip_non_digits, validate_cpf, validate_nome,
            validate_numero,
        },
        integrity::{assess_package_risk, RiskLevel},
    },
    services::{auth_service, cache_service},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ConsultaParams {
    pub tipo: Option<String>,

    /// Query value for tipo=cpf.
    pub cpf: Option<String>,

    /// Query value for tipo=nome and tipo=numero.
    pub q: Option<String>,

    /// Credential fallback when the header and cookie are absent.
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

/// Credential extraction, in priority order: `x-api-key` header,
/// `apiKey` query parameter, `apiKey` cookie.
fn extract_credential(headers: &HeaderMap, params: &ConsultaParams) -> Option<String> {
    header_str(headers, "x-api-key")
        .or_else(|| params.api_key.clone())
        .or_else(|| cookie_value(headers, "apiKey"))
}

/// Canonical query value per kind: cpf and numero reduce to bare digits,
/// nome is trimmed. Applied after shape validation, so the cache and the
/// upstream see one form regardless of the caller's punctuation.
fn canonical_query(tipo: Tipo, raw: &str) -> String {
    match tipo {
        Tipo::Cpf | Tipo::Numero => strip_non_digits(raw),
        Tipo::Nome => raw.trim().to_string(),
    }
}

/// Failed lookups surface only the error string; the upstream's raw
/// failure payload is kept out of `data`.
fn surfaced_data(sucesso: bool, data: Option<Value>) -> Value {
    if sucesso {
        data.unwrap_or(Value::Null)
    } else {
        Value::Null
    }
}

pub async fn consultar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConsultaParams>,
) -> Result<impl IntoResponse, AppError> {
    let started = std::time::Instant::now();

    let ip = client_ip(&headers);
    let user_agent = header_str(&headers, "user-agent").unwrap_or_else(|| "unknown".to_string());

    // Track the derived client identity for the admin ledger stats.
    let fingerprint = SecurityLedger::fingerprint(
        Some(&ip),
        Some(&user_agent),
        header_str(&headers, "accept").as_deref(),
        header_str(&headers, "accept-encoding").as_deref(),
        header_str(&headers, "accept-language").as_deref(),
    );
    state.ledger.observe_fingerprint(&fingerprint, &ip);

    let token = extract_credential(&headers, &params).ok_or(AppError::MissingApiKey)?;

    let credential =
        match auth_service::validate_api_key(&state.pool, &state.config.admin_key, &token).await {
            Ok(credential) => credential,
            Err(e @ AppError::InvalidApiKey(_)) => {
                auth_service::audit(
                    &state.pool,
                    &state.config.admin_key,
                    &token,
                    AuditAction::UnauthorizedAccess,
                    None,
                    Some(&ip),
                    Some(&user_agent),
                    false,
                    json!({ "motivo": e.to_string() }),
                )
                .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

    let rate = auth_service::check_and_increment(
        &state.pool,
        &state.config.admin_key,
        &token,
        &ip,
        &user_agent,
    )
    .await?;

    let tipo_raw = params.tipo.as_deref().unwrap_or("");
    let tipo = match Tipo::parse(tipo_raw) {
        Ok(tipo) => tipo,
        Err(message) => {
            auth_service::audit(
                &state.pool,
                &state.config.admin_key,
                &token,
                AuditAction::InvalidTipo,
                Some(tipo_raw),
                Some(&ip),
                Some(&user_agent),
                false,
                json!({ "tipoRecebido": tipo_raw }),
            )
            .await;
            return Err(AppError::InvalidType(message));
        }
    };

    let raw_query = match tipo {
        Tipo::Cpf => params.cpf.as_deref().unwrap_or(""),
        Tipo::Nome | Tipo::Numero => params.q.as_deref().unwrap_or(""),
    };

    let shape = match tipo {
        Tipo::Cpf => validate_cpf(raw_query),
        Tipo::Nome => validate_nome(raw_query),
        Tipo::Numero => validate_numero(raw_query),
    };

    if let Err(message) = shape {
        let injection = looks_like_sql_injection(raw_query);
        let action = if injection {
            AuditAction::SqlInjectionDetected
        } else {
            AuditAction::InvalidInputValidation
        };
        auth_service::audit(
            &state.pool,
            &state.config.admin_key,
            &token,
            action,
            Some(tipo.as_str()),
            Some(&ip),
            Some(&user_agent),
            false,
            json!({ "valor": mask_middle(raw_query), "motivo": message }),
        )
        .await;
        return Err(AppError::Validation(message));
    }

    let query = canonical_query(tipo, raw_query);

    if let Some(entry) = cache_service::get(&state.pool, tipo, &query).await? {
        let cache_age = (chrono::Utc::now() - entry.created_at).num_seconds().max(0);
        auth_service::audit(
            &state.pool,
            &state.config.admin_key,
            &token,
            AuditAction::CacheHit,
            Some(tipo.as_str()),
            Some(&ip),
            Some(&user_agent),
            entry.sucesso,
            json!({ (tipo.as_str()): query, "hitCount": entry.hit_count }),
        )
        .await;

        return Ok(Json(json!({
            "success": true,
            "data": entry.resultado,
            "sucesso": entry.sucesso,
            "tempoResposta": entry.tempo_resposta,
            "fromCache": true,
            "hitCount": entry.hit_count,
            "cacheAge": cache_age,
            "criador": "@MutanoX",
            "warnings": [],
        })));
    }

    let outcome = state.upstream.lookup(tipo, &query).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let mut integrity: Option<Value> = None;
    let mut warnings: Vec<String> = Vec::new();
    let mut critical = false;

    if !outcome.sucesso {
        let data = outcome.data.clone().unwrap_or(Value::Null);
        let risk = assess_package_risk(&data, tipo);
        critical = risk.risk_level == RiskLevel::Critical;
        warnings.clone_from(&risk.issues);
        integrity = serde_json::to_value(&risk).ok();
    } else {
        let payload = outcome.data.clone().unwrap_or(Value::Null);
        cache_service::put(&state.pool, tipo, &query, &payload, true, elapsed_ms).await?;
    }

    auth_service::audit(
        &state.pool,
        &state.config.admin_key,
        &token,
        AuditAction::Consulta,
        Some(tipo.as_str()),
        Some(&ip),
        Some(&user_agent),
        outcome.sucesso,
        json!({
            (tipo.as_str()): query,
            "tempoResposta": elapsed_ms,
            "fromCache": false,
            "erro": outcome.error,
            "integridadeCritica": critical,
            "admin": credential.is_admin(),
            "restanteHora": rate.remaining_hour,
        }),
    )
    .await;

    let mut body = json!({
        "success": true,
        "data": surfaced_data(outcome.sucesso, outcome.data),
        "sucesso": outcome.sucesso,
        "tempoResposta": elapsed_ms,
        "fromCache": false,
        "criador": "@MutanoX",
        "warnings": warnings,
    });

    if let Some(error) = outcome.error {
        body["error"] = Value::String(error);
    }
    if let Some(integrity) = integrity {
        body["integrity"] = integrity;
    }

    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn params(api_key: Option<&str>) -> ConsultaParams {
        ConsultaParams {
            tipo: None,
            cpf: None,
            q: None,
            api_key: api_key.map(str::to_string),
        }
    }

    #[test]
    fn header_wins_over_query_and_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("from-header"));
        headers.insert("cookie", HeaderValue::from_static("apiKey=from-cookie"));

        let got = extract_credential(&headers, &params(Some("from-query")));
        assert_eq!(got.as_deref(), Some("from-header"));
    }

    #[test]
    fn query_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("apiKey=from-cookie"));

        let got = extract_credential(&headers, &params(Some("from-query")));
        assert_eq!(got.as_deref(), Some("from-query"));
    }

    #[test]
    fn canonical_query_collapses_punctuation_variants() {
        // Punctuated and bare forms must address the same cache slot and
        // reach the upstream in one canonical shape.
        assert_eq!(
            canonical_query(Tipo::Cpf, "123.456.789-00"),
            canonical_query(Tipo::Cpf, "12345678900"),
        );
        assert_eq!(canonical_query(Tipo::Numero, "(11) 99999-9999"), "11999999999");
        assert_eq!(canonical_query(Tipo::Nome, "  Maria Silva "), "Maria Silva");
    }

    #[test]
    fn failed_lookups_never_surface_the_upstream_payload() {
        let failure = serde_json::json!({ "erro": "interno", "stack": "..." });
        assert_eq!(surfaced_data(false, Some(failure)), Value::Null);
        assert_eq!(surfaced_data(true, None), Value::Null);

        let ok = serde_json::json!({ "dados": { "nome": "Maria" } });
        assert_eq!(surfaced_data(true, Some(ok.clone())), ok);
    }

    #[test]
    fn cookie_is_last_resort() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("apiKey=from-cookie"));

        let got = extract_credential(&headers, &params(None));
        assert_eq!(got.as_deref(), Some("from-cookie"));
        assert_eq!(extract_credential(&HeaderMap::new(), &params(None)), None);
    }
}
