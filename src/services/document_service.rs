// src/services/document_service.rs
//
// PDF do contrato assinado: texto, assinatura desenhada, bloco de prova e QR
// apontando para a página de verificação.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use genpdf::{elements, style, Element};
use image::Luma;
use qrcode::QrCode;

use crate::{
    common::{error::AppError, text},
    models::contract::Contract,
};

#[derive(Clone)]
pub struct DocumentService {
    fonts_dir: String,
}

impl DocumentService {
    pub fn new(fonts_dir: String) -> Self {
        Self { fonts_dir }
    }

    /// Renderização síncrona; chamar dentro de spawn_blocking.
    pub fn signed_contract_pdf(&self, contract: &Contract, verification_url: &str) -> Result<Vec<u8>, AppError> {
        let font_family = genpdf::fonts::from_files(&self.fonts_dir, "Roboto", None)
            .map_err(|_| AppError::FontNotFound(format!("Fonte não encontrada na pasta {}", self.fonts_dir)))?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title(contract.document_type.title());
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(15);
        doc.set_page_decorator(decorator);

        // --- CABEÇALHO ---
        doc.push(
            elements::Paragraph::new(contract.document_type.title().to_uppercase())
                .styled(style::Style::new().bold().with_font_size(14)),
        );
        doc.push(elements::Paragraph::new(contract.subject.clone()).styled(style::Style::new().with_font_size(10)));
        doc.push(elements::Break::new(1.5));

        // --- CORPO ---
        let body = text::html_to_text(contract.contract_html.as_deref().unwrap_or_default());
        for paragraph in body.split("\n\n") {
            for line in paragraph.lines() {
                doc.push(elements::Paragraph::new(line.to_string()).styled(style::Style::new().with_font_size(10)));
            }
            doc.push(elements::Break::new(0.8));
        }

        // --- ASSINATURA ---
        doc.push(elements::Break::new(1.5));
        if let Some(data_url) = contract.client_signature_image.as_deref() {
            match decode_data_url(data_url).and_then(|bytes| {
                image::load_from_memory(&bytes).map_err(|e| AppError::InternalServerError(anyhow::Error::msg(e.to_string())))
            }) {
                Ok(signature) => {
                    let signature = elements::Image::from_dynamic_image(signature)
                        .map_err(|e| AppError::InternalServerError(anyhow::Error::msg(e.to_string())))?
                        .with_scale(genpdf::Scale::new(0.4, 0.4));
                    doc.push(signature);
                }
                Err(e) => tracing::warn!(contract_id = %contract.id, "Imagem de assinatura ilegível: {:?}", e),
            }
        }

        if let Some(signed_at) = contract.signed_at {
            doc.push(elements::Paragraph::new(format!(
                "Assinado eletronicamente em {} (UTC)",
                signed_at.format("%d/%m/%Y %H:%M:%S")
            )));
        }

        // --- PROVA ---
        doc.push(elements::Break::new(1.5));
        doc.push(
            elements::Paragraph::new("CERTIFICADO DE ASSINATURA")
                .styled(style::Style::new().bold().with_font_size(11)),
        );

        let small = style::Style::new().with_font_size(8);
        let proof_lines = [
            ("Hash SHA-256", contract.blockchain_hash.clone()),
            ("Identificador", contract.blockchain_tx_id.clone()),
            ("Rede", contract.blockchain_network.clone()),
            ("IP", contract.signature_ip.clone()),
            ("Navegador", contract.signature_user_agent.clone()),
        ];
        for (label, value) in proof_lines {
            if let Some(value) = value {
                doc.push(elements::Paragraph::new(format!("{label}: {value}")).styled(small));
            }
        }

        doc.push(elements::Break::new(1));
        doc.push(elements::Paragraph::new(format!("Verifique em: {verification_url}")).styled(small));

        let code = QrCode::new(verification_url.as_bytes())
            .map_err(|e| AppError::InternalServerError(anyhow::Error::msg(e.to_string())))?;
        let image_buffer = code.render::<Luma<u8>>().build();
        let qr = elements::Image::from_dynamic_image(image::DynamicImage::ImageLuma8(image_buffer))
            .map_err(|e| AppError::InternalServerError(anyhow::Error::msg(e.to_string())))?
            .with_scale(genpdf::Scale::new(0.5, 0.5));
        doc.push(qr);

        let mut buffer = Vec::new();
        doc.render(&mut buffer)
            .map_err(|e| AppError::InternalServerError(anyhow::Error::msg(e.to_string())))?;

        Ok(buffer)
    }
}

/// `data:image/png;base64,....` (ou só o base64) -> bytes.
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, AppError> {
    let payload = match value.split_once(',') {
        Some((meta, data)) if meta.starts_with("data:") => data,
        _ => value,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InternalServerError(anyhow::Error::msg(format!("base64 inválido: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_data_urls() {
        assert_eq!(decode_data_url("data:image/png;base64,AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_data_url("AQID").unwrap(), vec![1, 2, 3]);
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn missing_fonts_are_reported() {
        let svc = DocumentService::new("/caminho/que/nao/existe".into());
        let contract = crate::models::contract::fixtures::contract(chrono::Utc::now());
        assert!(matches!(
            svc.signed_contract_pdf(&contract, "https://webmarcas.net/verificar/abc"),
            Err(AppError::FontNotFound(_))
        ));
    }
}
