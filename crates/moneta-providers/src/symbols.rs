//! Static Korean-market symbol table.
//!
//! Resolves company names (Korean and English) to exchange-qualified KRX
//! codes, and recognizes literal six-digit `.KS` codes anywhere in the
//! query.

use async_trait::async_trait;

use moneta_orchestrator::{Symbol, SymbolLookup};

pub struct StaticSymbolTable {
    entries: Vec<(&'static str, &'static str, &'static str)>,
}

impl StaticSymbolTable {
    /// The default KOSPI large-cap table.
    pub fn korea_default() -> Self {
        Self {
            entries: vec![
                ("삼성전자", "005930.KS", "삼성전자"),
                ("samsung", "005930.KS", "삼성전자"),
                ("sk하이닉스", "000660.KS", "SK하이닉스"),
                ("하이닉스", "000660.KS", "SK하이닉스"),
                ("sk hynix", "000660.KS", "SK하이닉스"),
                ("네이버", "035420.KS", "네이버"),
                ("naver", "035420.KS", "네이버"),
                ("카카오", "035720.KS", "카카오"),
                ("kakao", "035720.KS", "카카오"),
                ("현대차", "005380.KS", "현대차"),
                ("hyundai", "005380.KS", "현대차"),
                ("기아", "000270.KS", "기아"),
                ("kia", "000270.KS", "기아"),
                ("lg전자", "066570.KS", "LG전자"),
                ("삼성바이오로직스", "207940.KS", "삼성바이오로직스"),
                ("삼성바이오", "207940.KS", "삼성바이오로직스"),
                ("삼성sdi", "006400.KS", "삼성SDI"),
                ("포스코", "005490.KS", "POSCO홀딩스"),
                ("sk텔레콤", "017670.KS", "SK텔레콤"),
            ],
        }
    }
}

/// Find a literal `NNNNNN.KS` code in free text.
fn find_literal_code(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let suffix = b".KS";
    let mut i = 0;
    while let Some(pos) = text[i..].find(".KS").map(|p| p + i) {
        if pos >= 6 {
            let candidate = &bytes[pos - 6..pos];
            if candidate.iter().all(u8::is_ascii_digit) {
                let code = &text[pos - 6..pos + suffix.len()];
                return Some(code.to_string());
            }
        }
        i = pos + suffix.len();
    }
    None
}

#[async_trait]
impl SymbolLookup for StaticSymbolTable {
    async fn resolve(&self, text: &str) -> Option<Symbol> {
        let lowered = text.to_lowercase();
        // Longest keyword wins, so "삼성바이오로직스" is not shadowed by
        // "삼성바이오".
        let best = self
            .entries
            .iter()
            .filter(|(keyword, _, _)| lowered.contains(keyword))
            .max_by_key(|(keyword, _, _)| keyword.len());
        if let Some((_, code, company_name)) = best {
            return Some(Symbol {
                code: (*code).to_string(),
                company_name: (*company_name).to_string(),
            });
        }

        find_literal_code(text).map(|code| Symbol {
            company_name: code.trim_end_matches(".KS").to_string(),
            code,
        })
    }
}
