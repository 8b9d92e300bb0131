//! SQL-injection heuristics, input shape validation and masking.
//!
//! All functions here are pure and stateless. They run before anything
//! reaches the database, the upstream API, or a log line. Queries are
//! always bound server-side, so these checks are defense in depth for
//! values that end up forwarded or logged.

use std::sync::LazyLock;

use regex::Regex;

/// Dangerous SQL keywords (matched case-insensitively as substrings).
const SQL_KEYWORDS: [&str; 34] = [
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "TRUNCATE",
    "UNION",
    "JOIN",
    "WHERE",
    "HAVING",
    "GROUP BY",
    "ORDER BY",
    "CREATE",
    "ALTER",
    "RENAME",
    "LIMIT",
    "OFFSET",
    "EXEC",
    "EXECUTE",
    "CALL",
    "SHOW",
    "DESCRIBE",
    "EXPLAIN",
    "--",
    "/*",
    "*/",
    ";",
    "xp_cmdshell",
    "sp_password",
    "database()",
    "version()",
    "user()",
    "load_file()",
    "into outfile",
];

/// Structural injection patterns: tautologies, UNION SELECT, comment
/// markers, statement terminators followed by a mutating verb.
static SQL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP)\s",
        r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP)\s*\(",
        r"(?i)\b(OR|AND)\s+\d+\s*=\s*\d+",
        r#"(?i)\b(OR|AND)\s*["'].*["']"#,
        r"(?i)\b(OR|AND)\s*\w+\s*(=|LIKE)",
        r"(?i)UNION\s+SELECT",
        // Bare boolean operators, word-bounded so names like ANDERSON or
        // CORINA pass while "x OR y" trips.
        r"(?i)\b(OR|AND)\b",
        r"--\s*",
        r"/\*.*\*/",
        r"(?i);\s*(DROP|DELETE|INSERT)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern compiles"))
    .collect()
});

/// True if the input contains any dangerous SQL keyword.
pub fn contains_sql_keywords(input: &str) -> bool {
    if input.is_empty() {
        return false;
    }
    let upper = input.to_uppercase();
    SQL_KEYWORDS
        .iter()
        .any(|kw| upper.contains(&kw.to_uppercase()))
}

/// True if the input matches any structural injection pattern.
pub fn detect_sql_injection(input: &str) -> bool {
    if input.is_empty() {
        return false;
    }
    SQL_PATTERNS.iter().any(|p| p.is_match(input))
}

/// Combined heuristic used by the pipeline's input validation.
pub fn looks_like_sql_injection(input: &str) -> bool {
    contains_sql_keywords(input) || detect_sql_injection(input)
}

/// Validate a CPF: must reduce to exactly 11 digits after stripping
/// every non-digit character.
pub fn validate_cpf(cpf: &str) -> Result<(), String> {
    if cpf.is_empty() {
        return Err("CPF não fornecido".to_string());
    }

    let digits = strip_non_digits(cpf);

    if digits.len() != 11 {
        return Err("CPF deve conter 11 dígitos numéricos".to_string());
    }

    Ok(())
}

/// Validate a name: 3-100 characters and no SQL heuristic trip.
pub fn validate_nome(nome: &str) -> Result<(), String> {
    if nome.is_empty() {
        return Err("Nome não fornecido".to_string());
    }

    if nome.chars().count() < 3 {
        return Err("Nome deve conter pelo menos 3 caracteres".to_string());
    }

    if nome.chars().count() > 100 {
        return Err("Nome muito longo (máximo 100 caracteres)".to_string());
    }

    if looks_like_sql_injection(nome) {
        return Err("Nome contém caracteres SQL inválidos".to_string());
    }

    Ok(())
}

/// Validate a phone number: must reduce to 10 or 11 digits (with DDD).
pub fn validate_numero(numero: &str) -> Result<(), String> {
    if numero.is_empty() {
        return Err("Número não fornecido".to_string());
    }

    let digits = strip_non_digits(numero);

    if digits.len() < 10 || digits.len() > 11 {
        return Err("Número deve conter 10 ou 11 dígitos numéricos (com DDD)".to_string());
    }

    Ok(())
}

/// Keep only the digits of a raw query value.
pub fn strip_non_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mask the middle of a sensitive value, keeping the first 3 and last 2
/// characters. Values of 5 characters or fewer are left untouched.
pub fn mask_middle(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 5 {
        return value.to_string();
    }
    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{prefix}***{suffix}")
}

/// Mask named string fields inside a JSON object for safe logging.
///
/// Non-object values and non-string fields pass through unchanged.
pub fn mask_sensitive(mut data: serde_json::Value, fields: &[&str]) -> serde_json::Value {
    if let Some(map) = data.as_object_mut() {
        for field in fields {
            if let Some(serde_json::Value::String(s)) = map.get(*field) {
                let masked = mask_middle(s);
                map.insert((*field).to_string(), serde_json::Value::String(masked));
            }
        }
    }
    data
}

/// Sanitize a string destined for a log or audit entry: strip control
/// characters and cap the length at 500 characters.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(500)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cpf_requires_exactly_eleven_digits() {
        assert!(validate_cpf("12345678900").is_ok());
        assert!(validate_cpf("123.456.789-00").is_ok());
        assert!(validate_cpf("1234567890").is_err());
        assert!(validate_cpf("123456789001").is_err());
        assert!(validate_cpf("").is_err());
    }

    #[test]
    fn numero_accepts_ten_or_eleven_digits() {
        assert!(validate_numero("1199999999").is_ok());
        assert!(validate_numero("(11) 99999-9999").is_ok());
        assert!(validate_numero("119999999").is_err());
        assert!(validate_numero("119999999999").is_err());
    }

    #[test]
    fn nome_enforces_length_bounds() {
        assert!(validate_nome("ab").is_err());
        assert!(validate_nome("Maria Silva").is_ok());
        assert!(validate_nome(&"x".repeat(101)).is_err());
    }

    #[test]
    fn nome_rejects_injection_attempts() {
        assert!(validate_nome("Maria'; DROP TABLE users").is_err());
        assert!(validate_nome("a UNION SELECT b").is_err());
    }

    #[test]
    fn detects_tautologies_and_union_select() {
        assert!(looks_like_sql_injection("1 OR 1=1"));
        assert!(looks_like_sql_injection("x UNION SELECT password"));
        assert!(looks_like_sql_injection("'; DROP TABLE api_keys"));
        assert!(!looks_like_sql_injection("12345678900"));
    }

    #[test]
    fn bare_boolean_operators_trip_only_as_whole_words() {
        assert!(looks_like_sql_injection("x OR y"));
        assert!(looks_like_sql_injection("a and b"));
        assert!(!looks_like_sql_injection("CORINA"));
        assert!(!looks_like_sql_injection("ANDERSON SILVA"));
    }

    #[test]
    fn mask_middle_keeps_short_values() {
        assert_eq!(mask_middle("12345"), "12345");
        assert_eq!(mask_middle("12345678900"), "123***00");
    }

    #[test]
    fn mask_sensitive_only_touches_named_string_fields() {
        let masked = mask_sensitive(
            json!({"cpf": "12345678900", "tempo": 42}),
            &["cpf", "numero"],
        );
        assert_eq!(masked["cpf"], "123***00");
        assert_eq!(masked["tempo"], 42);
    }

    #[test]
    fn sanitize_strips_control_chars_and_caps_length() {
        assert_eq!(sanitize_for_logging("a\x00b\x1fc"), "abc");
        assert_eq!(sanitize_for_logging(&"x".repeat(600)).len(), 500);
    }
}
