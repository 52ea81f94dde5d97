//! Supplier aggregate and late attribution of received stock.
//!
//! Goods are often received before anyone knows which supplier they belong
//! to. The purchase movement is recorded with a `reference_id` and no
//! supplier; attributing the reference later is an event on the supplier's
//! stream. Ledger rows are never touched; attribution is joined at read time.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{Aggregate, AggregateRoot, Conflict, DomainError, SupplierId, TenantId};
use posledger_events::Event;

use crate::movement::MAX_REFERENCE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    id: SupplierId,
    tenant_id: Option<TenantId>,
    name: String,
    references: BTreeSet<String>,
    version: u64,
    created: bool,
}

impl Supplier {
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            references: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(String::as_str)
    }
}

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierCommand {
    Register {
        tenant_id: TenantId,
        supplier_id: SupplierId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    AttributeReference {
        tenant_id: TenantId,
        supplier_id: SupplierId,
        reference_id: String,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupplierEvent {
    SupplierRegistered {
        tenant_id: TenantId,
        supplier_id: SupplierId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    ReferenceAttributed {
        tenant_id: TenantId,
        supplier_id: SupplierId,
        reference_id: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::SupplierRegistered { .. } => "suppliers.supplier.registered",
            SupplierEvent::ReferenceAttributed { .. } => "suppliers.supplier.reference_attributed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::SupplierRegistered { occurred_at, .. }
            | SupplierEvent::ReferenceAttributed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::SupplierRegistered {
                tenant_id,
                supplier_id,
                name,
                ..
            } => {
                self.id = *supplier_id;
                self.tenant_id = Some(*tenant_id);
                self.name = name.clone();
                self.created = true;
            }
            SupplierEvent::ReferenceAttributed { reference_id, .. } => {
                self.references.insert(reference_id.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::Register {
                tenant_id,
                supplier_id,
                name,
                occurred_at,
            } => {
                if self.created {
                    return Err(Conflict::AlreadyExists(format!("supplier {supplier_id}")).into());
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(DomainError::validation("supplier name cannot be empty"));
                }
                Ok(vec![SupplierEvent::SupplierRegistered {
                    tenant_id: *tenant_id,
                    supplier_id: *supplier_id,
                    name: name.to_string(),
                    occurred_at: *occurred_at,
                }])
            }
            SupplierCommand::AttributeReference {
                tenant_id,
                supplier_id,
                reference_id,
                occurred_at,
            } => {
                if !self.created || self.tenant_id != Some(*tenant_id) || self.id != *supplier_id {
                    return Err(DomainError::not_found(format!("supplier {supplier_id}")));
                }
                let reference_id = reference_id.trim();
                if reference_id.is_empty() {
                    return Err(DomainError::validation("reference_id cannot be empty"));
                }
                if reference_id.len() > MAX_REFERENCE_LEN {
                    return Err(DomainError::validation("reference_id too long"));
                }
                if self.references.contains(reference_id) {
                    return Ok(vec![]);
                }
                Ok(vec![SupplierEvent::ReferenceAttributed {
                    tenant_id: *tenant_id,
                    supplier_id: *supplier_id,
                    reference_id: reference_id.to_string(),
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_is_recorded_once() {
        let tenant = TenantId::new();
        let id = SupplierId::new();
        let mut s = Supplier::empty(id);

        for e in &s
            .handle(&SupplierCommand::Register {
                tenant_id: tenant,
                supplier_id: id,
                name: "Roastery Co".into(),
                occurred_at: Utc::now(),
            })
            .unwrap()
        {
            s.apply(e);
        }

        let attribute = SupplierCommand::AttributeReference {
            tenant_id: tenant,
            supplier_id: id,
            reference_id: "PO-77".into(),
            occurred_at: Utc::now(),
        };
        for e in &s.handle(&attribute).unwrap() {
            s.apply(e);
        }
        assert_eq!(s.references().collect::<Vec<_>>(), vec!["PO-77"]);
        assert!(s.handle(&attribute).unwrap().is_empty());
    }

    #[test]
    fn unknown_supplier_cannot_attribute() {
        let id = SupplierId::new();
        let err = Supplier::empty(id)
            .handle(&SupplierCommand::AttributeReference {
                tenant_id: TenantId::new(),
                supplier_id: id,
                reference_id: "PO-1".into(),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
