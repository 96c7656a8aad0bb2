pub mod auth;
pub mod checkout;
pub mod contract;
pub mod crm;
pub mod finance;
pub mod import;
pub mod notification;
pub mod process;
