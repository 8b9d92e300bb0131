//! The query-kind discriminator.
//!
//! Every lookup is one of three kinds: CPF, full name (nome) or phone
//! number (numero). The discriminator arrives as the `tipo` query
//! parameter and drives validation, upstream routing and cache expiry.

use std::fmt;

/// Recognized query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tipo {
    Cpf,
    Nome,
    Numero,
}

impl Tipo {
    /// Parse the `tipo` parameter, case-insensitively.
    ///
    /// Returns the human-readable rejection reason on failure, including
    /// the list of accepted values.
    pub fn parse(raw: &str) -> Result<Tipo, String> {
        match raw.to_lowercase().as_str() {
            "cpf" => Ok(Tipo::Cpf),
            "nome" => Ok(Tipo::Nome),
            "numero" => Ok(Tipo::Numero),
            _ => Err("Tipo inválido. Tipos disponíveis: cpf, nome, numero".to_string()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tipo::Cpf => "cpf",
            Tipo::Nome => "nome",
            Tipo::Numero => "numero",
        }
    }
}

impl fmt::Display for Tipo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds_case_insensitively() {
        assert_eq!(Tipo::parse("cpf"), Ok(Tipo::Cpf));
        assert_eq!(Tipo::parse("NOME"), Ok(Tipo::Nome));
        assert_eq!(Tipo::parse("Numero"), Ok(Tipo::Numero));
    }

    #[test]
    fn rejects_unknown_kinds() {
        assert!(Tipo::parse("cnpj").is_err());
        assert!(Tipo::parse("").is_err());
    }
}
