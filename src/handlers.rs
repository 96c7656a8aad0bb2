pub mod auth;
pub mod checkout;
pub mod contracts;
pub mod crm;
pub mod imports;
pub mod payments;
pub mod portal;
pub mod processes;
