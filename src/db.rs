pub mod contract_repo;
pub mod crm_repo;
pub mod finance_repo;
pub mod log_repo;
pub mod process_repo;
pub mod user_repo;

pub use contract_repo::ContractRepository;
pub use crm_repo::CrmRepository;
pub use finance_repo::FinanceRepository;
pub use log_repo::LogRepository;
pub use process_repo::ProcessRepository;
pub use user_repo::UserRepository;
