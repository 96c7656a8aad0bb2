pub mod auth;
pub mod checkout_service;
pub mod contract_service;
pub mod crm_service;
pub mod document_service;
pub mod import_parser;
pub mod import_service;
pub mod notification_service;
pub mod payment_service;
pub mod process_service;
pub mod rpi_parser;
pub mod signature_service;
