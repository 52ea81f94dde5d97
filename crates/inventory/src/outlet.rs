//! Outlet aggregate.
//!
//! Outlets are never deleted. A deactivated outlet keeps its history and can
//! still be queried, but accepts no new movements or shifts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{Aggregate, AggregateRoot, Conflict, DomainError, OutletId, TenantId};
use posledger_events::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outlet {
    id: OutletId,
    tenant_id: Option<TenantId>,
    name: String,
    active: bool,
    version: u64,
    created: bool,
}

impl Outlet {
    pub fn empty(id: OutletId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Outlet {
    type Id = OutletId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletCommand {
    Register {
        tenant_id: TenantId,
        outlet_id: OutletId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    Rename {
        tenant_id: TenantId,
        outlet_id: OutletId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    Deactivate {
        tenant_id: TenantId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    },
    Reactivate {
        tenant_id: TenantId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletEvent {
    OutletRegistered {
        tenant_id: TenantId,
        outlet_id: OutletId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    OutletRenamed {
        tenant_id: TenantId,
        outlet_id: OutletId,
        name: String,
        occurred_at: DateTime<Utc>,
    },
    OutletDeactivated {
        tenant_id: TenantId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    },
    OutletReactivated {
        tenant_id: TenantId,
        outlet_id: OutletId,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for OutletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OutletEvent::OutletRegistered { .. } => "outlets.outlet.registered",
            OutletEvent::OutletRenamed { .. } => "outlets.outlet.renamed",
            OutletEvent::OutletDeactivated { .. } => "outlets.outlet.deactivated",
            OutletEvent::OutletReactivated { .. } => "outlets.outlet.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OutletEvent::OutletRegistered { occurred_at, .. }
            | OutletEvent::OutletRenamed { occurred_at, .. }
            | OutletEvent::OutletDeactivated { occurred_at, .. }
            | OutletEvent::OutletReactivated { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Outlet {
    type Command = OutletCommand;
    type Event = OutletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OutletEvent::OutletRegistered {
                tenant_id,
                outlet_id,
                name,
                ..
            } => {
                self.id = *outlet_id;
                self.tenant_id = Some(*tenant_id);
                self.name = name.clone();
                self.active = true;
                self.created = true;
            }
            OutletEvent::OutletRenamed { name, .. } => self.name = name.clone(),
            OutletEvent::OutletDeactivated { .. } => self.active = false,
            OutletEvent::OutletReactivated { .. } => self.active = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OutletCommand::Register {
                tenant_id,
                outlet_id,
                name,
                occurred_at,
            } => {
                if self.created {
                    return Err(Conflict::AlreadyExists(format!("outlet {outlet_id}")).into());
                }
                let name = validate_name(name)?;
                Ok(vec![OutletEvent::OutletRegistered {
                    tenant_id: *tenant_id,
                    outlet_id: *outlet_id,
                    name,
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Rename {
                tenant_id,
                outlet_id,
                name,
                occurred_at,
            } => {
                self.ensure_exists(*tenant_id, *outlet_id)?;
                let name = validate_name(name)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![OutletEvent::OutletRenamed {
                    tenant_id: *tenant_id,
                    outlet_id: *outlet_id,
                    name,
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Deactivate {
                tenant_id,
                outlet_id,
                occurred_at,
            } => {
                self.ensure_exists(*tenant_id, *outlet_id)?;
                if !self.active {
                    return Ok(vec![]);
                }
                Ok(vec![OutletEvent::OutletDeactivated {
                    tenant_id: *tenant_id,
                    outlet_id: *outlet_id,
                    occurred_at: *occurred_at,
                }])
            }
            OutletCommand::Reactivate {
                tenant_id,
                outlet_id,
                occurred_at,
            } => {
                self.ensure_exists(*tenant_id, *outlet_id)?;
                if self.active {
                    return Ok(vec![]);
                }
                Ok(vec![OutletEvent::OutletReactivated {
                    tenant_id: *tenant_id,
                    outlet_id: *outlet_id,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl Outlet {
    fn ensure_exists(&self, tenant_id: TenantId, outlet_id: OutletId) -> Result<(), DomainError> {
        if !self.created || self.tenant_id != Some(tenant_id) || self.id != outlet_id {
            return Err(DomainError::not_found(format!("outlet {outlet_id}")));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("outlet name cannot be empty"));
    }
    Ok(name.to_string())
}
