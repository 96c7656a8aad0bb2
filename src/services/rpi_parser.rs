// src/services/rpi_parser.rs
//
// Leitura do texto da RPI (Revista da Propriedade Industrial): localiza os
// números de processo e classifica o despacho que vem depois de cada um.

use std::sync::LazyLock;

use regex::Regex;

use crate::{common::text, models::process::ProcessStatus};

static PROCESS_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9}\b").expect("regex de número de processo"));

const MAX_DISPATCH_CHARS: usize = 500;

// A ordem importa: "indeferimento" contém "deferimento" e a publicação do
// pedido cita o prazo "para oposição" sem haver oposição. A chave já vem
// sem espaços (normalize_key).
const KEYWORDS: [(&str, ProcessStatus); 13] = [
    ("arquivamento", ProcessStatus::Arquivado),
    ("arquivado", ProcessStatus::Arquivado),
    ("indeferimento", ProcessStatus::Indeferido),
    ("indeferido", ProcessStatus::Indeferido),
    ("concessao", ProcessStatus::Concedido),
    ("deferimento", ProcessStatus::Deferido),
    ("deferido", ProcessStatus::Deferido),
    ("publicacaodepedido", ProcessStatus::PublicadoRpi),
    ("paraoposicao", ProcessStatus::PublicadoRpi),
    ("oposicao", ProcessStatus::Oposicao),
    ("exigencia", ProcessStatus::EmExame),
    ("exame", ProcessStatus::EmExame),
    ("publicacao", ProcessStatus::PublicadoRpi),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpiEntry {
    pub process_number: String,
    pub dispatch_text: String,
    pub status: Option<ProcessStatus>,
}

pub fn classify_dispatch(dispatch: &str) -> Option<ProcessStatus> {
    let normalized = text::normalize_key(dispatch);
    KEYWORDS
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, status)| *status)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// O despacho de um processo vai do fim do número até o próximo número.
pub fn parse_gazette(content: &str) -> Vec<RpiEntry> {
    let matches: Vec<_> = PROCESS_NUMBER.find_iter(content).collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = matches.get(i + 1).map(|next| next.start()).unwrap_or(content.len());
            let dispatch: String = collapse_whitespace(&content[m.end()..end])
                .chars()
                .take(MAX_DISPATCH_CHARS)
                .collect();
            RpiEntry {
                process_number: m.as_str().to_string(),
                status: classify_dispatch(&dispatch),
                dispatch_text: dispatch,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_dispatches() {
        assert_eq!(classify_dispatch("Publicação de pedido para oposição"), Some(ProcessStatus::PublicadoRpi));
        assert_eq!(classify_dispatch("Oposição apresentada por terceiro"), Some(ProcessStatus::Oposicao));
        assert_eq!(classify_dispatch("Notificação de oposição"), Some(ProcessStatus::Oposicao));
        assert_eq!(classify_dispatch("Publicação do pedido"), Some(ProcessStatus::PublicadoRpi));
        assert_eq!(classify_dispatch("Exigência de mérito"), Some(ProcessStatus::EmExame));
        assert_eq!(classify_dispatch("Deferimento do pedido"), Some(ProcessStatus::Deferido));
        assert_eq!(classify_dispatch("INDEFERIMENTO do pedido"), Some(ProcessStatus::Indeferido));
        assert_eq!(classify_dispatch("Concessão de registro"), Some(ProcessStatus::Concedido));
        assert_eq!(classify_dispatch("Arquivamento definitivo"), Some(ProcessStatus::Arquivado));
        assert_eq!(classify_dispatch("Notificação de recolhimento"), None);
    }

    #[test]
    fn splits_gazette_by_process_number() {
        let content = "RPI 2857\n\n912345678  Deferimento do pedido\nTitular: Café Bom LTDA\n\
                       923456789 Indeferimento\nart. 124\n 1234567890 não é processo";
        let entries = parse_gazette(content);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].process_number, "912345678");
        assert_eq!(entries[0].dispatch_text, "Deferimento do pedido Titular: Café Bom LTDA");
        assert_eq!(entries[0].status, Some(ProcessStatus::Deferido));
        assert_eq!(entries[1].process_number, "923456789");
        assert_eq!(entries[1].status, Some(ProcessStatus::Indeferido));
        assert!(entries[1].dispatch_text.ends_with("1234567890 não é processo"));
    }

    #[test]
    fn publication_dispatch_is_not_an_opposition() {
        let content = "931111111 Publicação de pedido para oposição (prazo de 60 dias)\n\
                       932222222 Oposição apresentada. Titular notificado";
        let entries = parse_gazette(content);

        assert_eq!(entries[0].status, Some(ProcessStatus::PublicadoRpi));
        assert_eq!(entries[1].status, Some(ProcessStatus::Oposicao));
    }

    #[test]
    fn empty_gazette_has_no_entries() {
        assert!(parse_gazette("nenhum número aqui 12345").is_empty());
    }
}
