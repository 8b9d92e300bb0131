//! Upstream response integrity inspection.
//!
//! The upstream API returns loosely structured JSON. Before a payload is
//! surfaced or cached, its structure is checked for completeness and its
//! serialized form is scanned for executable-code signatures. Findings
//! are advisory only: they are attached to the response and the audit
//! entry, and never block the pipeline.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::models::tipo::Tipo;

/// Creator tag expected on every well-formed upstream payload.
pub const EXPECTED_CREATOR: &str = "@MutanoX";

/// Signatures of embedded executable code. Any hit forces CRITICAL.
static DANGEROUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<script",
        r"(?i)<iframe",
        r"(?i)javascript:",
        r"(?i)on\w+=",
        r"(?i)eval\(",
        r"(?i)document\.cookie",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});

/// Risk classification for an inspected payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Integrity report attached to responses and audit entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRisk {
    pub is_secure: bool,
    pub risk_level: RiskLevel,
    pub issues: Vec<String>,
    pub recommendation: String,
}

/// Inspect an upstream payload for structural completeness and embedded
/// executable-code signatures.
///
/// Escalation: LOW by default; MEDIUM above 5 issues; HIGH above 10
/// issues or when the payload carries no data at all; CRITICAL whenever
/// an executable-code signature is found, irrespective of issue counts.
pub fn assess_package_risk(data: &Value, tipo: Tipo) -> PackageRisk {
    let mut issues = structural_issues(data, tipo);

    let mut risk_level = RiskLevel::Low;

    if issues.len() > 5 {
        risk_level = RiskLevel::Medium;
    }
    if issues.len() > 10 {
        risk_level = RiskLevel::High;
    }

    // An empty package is worse than a malformed one.
    if data.get("dados").is_none() && data.get("resultado").is_none() {
        issues.push("Pacote de resposta vazio sem dados".to_string());
        risk_level = risk_level.max(RiskLevel::High);
    }

    let serialized = data.to_string();
    if DANGEROUS_PATTERNS.iter().any(|p| p.is_match(&serialized)) {
        issues.push("Contém padrão de código executável perigoso".to_string());
        risk_level = RiskLevel::Critical;
    }

    let recommendation = match risk_level {
        RiskLevel::High | RiskLevel::Critical => {
            "Pacote requer revisão manual antes de ser usado".to_string()
        }
        RiskLevel::Medium => {
            "Pacote possui problemas menores mas pode ser usado com cautela".to_string()
        }
        RiskLevel::Low => "Pacote válido".to_string(),
    };

    PackageRisk {
        is_secure: risk_level == RiskLevel::Low,
        risk_level,
        issues,
        recommendation,
    }
}

/// Structural completeness checks: expected top-level fields present and
/// the creator tag matching the expected constant.
fn structural_issues(data: &Value, tipo: Tipo) -> Vec<String> {
    let mut issues = Vec::new();

    if data.get("sucesso").is_none() {
        issues.push("Resposta não contém campo \"sucesso\"".to_string());
    }

    match data.get("criador").and_then(Value::as_str) {
        Some(EXPECTED_CREATOR) => {}
        Some(other) => issues.push(format!("Criador não corresponde: {other}")),
        None => issues.push("Resposta não contém campo \"criador\"".to_string()),
    }

    // CPF lookups return a "dados" object; name and number lookups return
    // a "resultado" list.
    match tipo {
        Tipo::Cpf => {
            if data.get("dados").is_none() {
                issues.push("Resposta cpf não contém campo \"dados\"".to_string());
            }
        }
        Tipo::Nome | Tipo::Numero => {
            if data.get("resultado").is_none() {
                issues.push(format!("Resposta {tipo} não contém campo \"resultado\""));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_cpf_payload_is_low_risk() {
        let data = json!({
            "sucesso": true,
            "criador": "@MutanoX",
            "dados": { "nome": "Maria", "cpf": "12345678900" }
        });
        let risk = assess_package_risk(&data, Tipo::Cpf);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert!(risk.is_secure);
        assert!(risk.issues.is_empty());
    }

    #[test]
    fn missing_fields_are_reported() {
        let data = json!({ "resultado": [] });
        let risk = assess_package_risk(&data, Tipo::Nome);
        assert!(risk.issues.iter().any(|i| i.contains("sucesso")));
        assert!(risk.issues.iter().any(|i| i.contains("criador")));
    }

    #[test]
    fn empty_package_is_high_risk() {
        let data = json!({ "sucesso": false, "criador": "@MutanoX" });
        let risk = assess_package_risk(&data, Tipo::Cpf);
        assert_eq!(risk.risk_level, RiskLevel::High);
        assert!(!risk.is_secure);
    }

    #[test]
    fn script_signature_forces_critical() {
        let data = json!({
            "sucesso": true,
            "criador": "@MutanoX",
            "dados": { "nome": "<script>alert(1)</script>" }
        });
        let risk = assess_package_risk(&data, Tipo::Cpf);
        assert_eq!(risk.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn mismatched_creator_is_flagged() {
        let data = json!({
            "sucesso": true,
            "criador": "@Someone",
            "resultado": []
        });
        let risk = assess_package_risk(&data, Tipo::Numero);
        assert!(risk.issues.iter().any(|i| i.contains("@Someone")));
    }
}
