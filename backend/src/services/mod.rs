//! Business logic services for the Materials Back Office

use uuid::Uuid;

pub mod catalog;
pub mod inventory_count;
pub mod ledger;
pub mod notification;
pub mod numbering;
pub mod purchase;
pub mod reporting;
pub mod transfer;
pub mod writeoff;

pub use inventory_count::InventoryCountService;
pub use ledger::LedgerService;
pub use notification::NotificationService;
pub use purchase::PurchaseService;
pub use reporting::ReportingService;
pub use transfer::TransferService;
pub use writeoff::WriteOffService;

/// Resolved facts about the acting user, decided once at the boundary.
///
/// The engine never inspects roles; the API layer resolves permissions and
/// passes the outcome in. `writeoff_scope` is the one capability the core
/// itself enforces: which departments the actor may write off for.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub writeoff_scope: DepartmentScope,
}

/// Department-level capability scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentScope {
    All,
    Only(Uuid),
}

impl DepartmentScope {
    pub fn allows(&self, department_id: Uuid) -> bool {
        match self {
            DepartmentScope::All => true,
            DepartmentScope::Only(dept) => *dept == department_id,
        }
    }
}

impl ActorContext {
    /// An actor with no department restrictions
    pub fn unrestricted(user_id: Uuid) -> Self {
        Self {
            user_id,
            writeoff_scope: DepartmentScope::All,
        }
    }

    /// An actor restricted to write-offs for a single department
    pub fn scoped_to(user_id: Uuid, department_id: Uuid) -> Self {
        Self {
            user_id,
            writeoff_scope: DepartmentScope::Only(department_id),
        }
    }
}
