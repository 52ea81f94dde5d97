use posledger_core::TenantId;
use posledger_inventory::{reconcile, TransferMatcher, TransferReport};

use crate::ledger::{MovementFilter, MovementLedger, Pagination};

use super::ProjectionFailure;

/// Derives transfers from the ledger's transfer rows at read time.
///
/// Nothing is stored: pairing depends on the whole set of rows (a late
/// `transfer_in` can complete an old `transfer_out`), so the report is
/// recomputed from the ledger on every call.
#[derive(Debug)]
pub struct TransferReconciler {
    matcher: Box<dyn TransferMatcher>,
    page_size: u32,
}

impl TransferReconciler {
    pub fn new(matcher: Box<dyn TransferMatcher>, page_size: u32) -> Self {
        Self {
            matcher,
            page_size: page_size.max(1),
        }
    }

    pub fn strategy(&self) -> &'static str {
        self.matcher.name()
    }

    pub async fn report(
        &self,
        tenant_id: TenantId,
        ledger: &dyn MovementLedger,
    ) -> Result<TransferReport, ProjectionFailure> {
        let filter = MovementFilter::transfers();
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page = ledger
                .query(tenant_id, &filter, Pagination { limit: self.page_size, offset })
                .await?;
            offset += page.movements.len() as u32;
            rows.extend(page.movements);
            if !page.has_more {
                break;
            }
        }
        Ok(reconcile(&rows, self.matcher.as_ref()))
    }
}
