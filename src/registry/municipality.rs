//! IBGE municipality names
//!
//! Only a static table of state capitals is known locally. Other codes render
//! generically; resolving them against the IBGE service is left to callers.

use crate::schema::UNKNOWN_MUNICIPALITY_CODE;

/// State capitals: (IBGE code, name, UF)
pub const STATE_CAPITALS: [(i64, &str, &str); 27] = [
    (1100205, "Porto Velho", "RO"),
    (1200401, "Rio Branco", "AC"),
    (1302603, "Manaus", "AM"),
    (1400100, "Boa Vista", "RR"),
    (1501402, "Belém", "PA"),
    (1600303, "Macapá", "AP"),
    (1721000, "Palmas", "TO"),
    (2111300, "São Luís", "MA"),
    (2211001, "Teresina", "PI"),
    (2304400, "Fortaleza", "CE"),
    (2408102, "Natal", "RN"),
    (2507507, "João Pessoa", "PB"),
    (2611606, "Recife", "PE"),
    (2704302, "Maceió", "AL"),
    (2800308, "Aracaju", "SE"),
    (2927408, "Salvador", "BA"),
    (3106200, "Belo Horizonte", "MG"),
    (3205309, "Vitória", "ES"),
    (3304557, "Rio de Janeiro", "RJ"),
    (3550308, "São Paulo", "SP"),
    (4106902, "Curitiba", "PR"),
    (4205407, "Florianópolis", "SC"),
    (4314902, "Porto Alegre", "RS"),
    (5002704, "Campo Grande", "MS"),
    (5103403, "Cuiabá", "MT"),
    (5208707, "Goiânia", "GO"),
    (5300108, "Brasília", "DF"),
];

/// Look up a capital by its seven-digit code, or by the six-digit code
/// without the check digit
#[must_use]
pub fn lookup(code: i64) -> Option<(&'static str, &'static str)> {
    STATE_CAPITALS
        .iter()
        .find(|(known, _, _)| *known == code || (code < 1_000_000 && known / 10 == code))
        .map(|(_, name, uf)| (*name, *uf))
}

/// Display name of a municipality code
#[must_use]
pub fn municipality_name(code: i64) -> String {
    if code == UNKNOWN_MUNICIPALITY_CODE {
        return "Desconhecido".to_string();
    }
    match lookup(code) {
        Some((name, uf)) => format!("{name}/{uf}"),
        None => format!("Município {code}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_capitals() {
        assert_eq!(municipality_name(2304400), "Fortaleza/CE");
        assert_eq!(municipality_name(3205309), "Vitória/ES");
        assert_eq!(municipality_name(230440), "Fortaleza/CE");
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(municipality_name(1234567), "Município 1234567");
        assert_eq!(municipality_name(UNKNOWN_MUNICIPALITY_CODE), "Desconhecido");
    }
}
