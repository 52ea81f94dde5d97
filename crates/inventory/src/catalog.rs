//! Catalog product aggregate.
//!
//! The catalog only carries what the ledger needs: product and variation
//! identity plus the per-unit stock settings. Current stock is never stored
//! here; it is always derived from the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posledger_core::{
    Aggregate, AggregateRoot, Conflict, DomainError, ProductId, TenantId, VariationId,
};
use posledger_events::Event;

/// Stock tracking settings of a product or variation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockSettings {
    pub track_inventory: bool,
    pub low_stock_threshold: i64,
}

impl StockSettings {
    pub fn tracked(low_stock_threshold: i64) -> Self {
        Self {
            track_inventory: true,
            low_stock_threshold,
        }
    }

    pub fn untracked() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.low_stock_threshold < 0 {
            return Err(DomainError::validation(
                "low_stock_threshold cannot be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub variation_id: VariationId,
    pub name: String,
    pub sku: Option<String>,
    pub settings: StockSettings,
}

/// Aggregate root: CatalogProduct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    id: ProductId,
    tenant_id: Option<TenantId>,
    name: String,
    sku: Option<String>,
    settings: StockSettings,
    variations: Vec<Variation>,
    version: u64,
    created: bool,
}

impl CatalogProduct {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            sku: None,
            settings: StockSettings::default(),
            variations: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn settings(&self) -> StockSettings {
        self.settings
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn variation(&self, variation_id: VariationId) -> Option<&Variation> {
        self.variations
            .iter()
            .find(|v| v.variation_id == variation_id)
    }

    /// Whether stock is tracked per variation rather than per product.
    pub fn has_tracked_variations(&self) -> bool {
        self.variations.iter().any(|v| v.settings.track_inventory)
    }
}

impl AggregateRoot for CatalogProduct {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Which unit a settings change targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "variation_id", rename_all = "snake_case")]
pub enum SettingsTarget {
    Product,
    Variation(VariationId),
}

/// Command: RegisterProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub settings: StockSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddVariation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation_id: VariationId,
    pub name: String,
    pub sku: Option<String>,
    pub settings: StockSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStockSettings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStockSettings {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub target: SettingsTarget,
    pub settings: StockSettings,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogCommand {
    RegisterProduct(RegisterProduct),
    AddVariation(AddVariation),
    ChangeStockSettings(ChangeStockSettings),
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: Option<String>,
    pub settings: StockSettings,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariationAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationAdded {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variation: Variation,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSettingsChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSettingsChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub target: SettingsTarget,
    pub settings: StockSettings,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogEvent {
    ProductRegistered(ProductRegistered),
    VariationAdded(VariationAdded),
    StockSettingsChanged(StockSettingsChanged),
}

impl Event for CatalogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ProductRegistered(_) => "catalog.product.registered",
            CatalogEvent::VariationAdded(_) => "catalog.product.variation_added",
            CatalogEvent::StockSettingsChanged(_) => "catalog.product.stock_settings_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CatalogEvent::ProductRegistered(e) => e.occurred_at,
            CatalogEvent::VariationAdded(e) => e.occurred_at,
            CatalogEvent::StockSettingsChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CatalogProduct {
    type Command = CatalogCommand;
    type Event = CatalogEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CatalogEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.sku = e.sku.clone();
                self.settings = e.settings;
                self.created = true;
            }
            CatalogEvent::VariationAdded(e) => {
                self.variations.push(e.variation.clone());
            }
            CatalogEvent::StockSettingsChanged(e) => match e.target {
                SettingsTarget::Product => self.settings = e.settings,
                SettingsTarget::Variation(variation_id) => {
                    if let Some(v) = self
                        .variations
                        .iter_mut()
                        .find(|v| v.variation_id == variation_id)
                    {
                        v.settings = e.settings;
                    }
                }
            },
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CatalogCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            CatalogCommand::AddVariation(cmd) => self.handle_add_variation(cmd),
            CatalogCommand::ChangeStockSettings(cmd) => self.handle_change_settings(cmd),
        }
    }
}

impl CatalogProduct {
    fn ensure_exists(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        // A product of another tenant is indistinguishable from a missing one.
        if !self.created || self.tenant_id != Some(tenant_id) || self.id != product_id {
            return Err(DomainError::not_found(format!("product {product_id}")));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<CatalogEvent>, DomainError> {
        if self.created {
            return Err(Conflict::AlreadyExists(format!("product {}", cmd.product_id)).into());
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        cmd.settings.validate()?;

        Ok(vec![CatalogEvent::ProductRegistered(ProductRegistered {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            sku: cmd.sku.clone(),
            settings: cmd.settings,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_variation(&self, cmd: &AddVariation) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.product_id)?;
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("variation name cannot be empty"));
        }
        cmd.settings.validate()?;
        if self.variation(cmd.variation_id).is_some() {
            return Err(Conflict::AlreadyExists(format!("variation {}", cmd.variation_id)).into());
        }
        if self.variations.iter().any(|v| v.name.eq_ignore_ascii_case(name)) {
            return Err(Conflict::AlreadyExists(format!("variation named '{name}'")).into());
        }

        Ok(vec![CatalogEvent::VariationAdded(VariationAdded {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            variation: Variation {
                variation_id: cmd.variation_id,
                name: name.to_string(),
                sku: cmd.sku.clone(),
                settings: cmd.settings,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_settings(
        &self,
        cmd: &ChangeStockSettings,
    ) -> Result<Vec<CatalogEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.product_id)?;
        cmd.settings.validate()?;

        let current = match cmd.target {
            SettingsTarget::Product => self.settings,
            SettingsTarget::Variation(variation_id) => {
                self.variation(variation_id)
                    .ok_or_else(|| DomainError::not_found(format!("variation {variation_id}")))?
                    .settings
            }
        };
        if current == cmd.settings {
            return Ok(vec![]);
        }

        Ok(vec![CatalogEvent::StockSettingsChanged(StockSettingsChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            target: cmd.target,
            settings: cmd.settings,
            occurred_at: cmd.occurred_at,
        })])
    }
}
