pub mod custodian_config;
pub mod payments;
pub mod tenants;
pub mod transactions;
pub mod vault;

pub use custodian_config::{CustodianConfigStore, PgCustodianConfigStore};
pub use payments::{PgReconciliationStore, ReconciliationStore};
pub use tenants::{PgTenantStore, TenantStore};
pub use transactions::{PgTransactionStore, TransactionStore};
pub use vault::{PgVaultStore, VaultStore};
