//! Outlet, catalog and supplier registries.

use chrono::Utc;
use tracing::{info, instrument};

use posledger_core::{AggregateRoot, Conflict, OutletId, ProductId, SupplierId, VariationId};
use posledger_inventory::{
    AddVariation, CatalogCommand, CatalogProduct, ChangeStockSettings, Outlet, OutletCommand,
    RegisterProduct, SettingsTarget, StockSettings, Supplier, SupplierCommand,
};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{MovementFilter, Pagination};

use super::views::{OutletView, ProductView, SupplierView};
use super::{TenantScope, OUTLET_STREAM, PRODUCT_STREAM, SUPPLIER_STREAM};

impl TenantScope<'_> {
    // ---- outlets ----

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub fn register_outlet(&self, name: &str) -> EngineResult<OutletView> {
        let outlet_id = OutletId::new();
        let command = OutletCommand::Register {
            tenant_id: self.tenant_id,
            outlet_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        };
        let done = self.outlet_command(outlet_id, &command)?;
        info!(outlet_id = %outlet_id, "outlet registered");
        Ok(OutletView::from(&done))
    }

    pub fn rename_outlet(&self, outlet_id: OutletId, name: &str) -> EngineResult<OutletView> {
        let command = OutletCommand::Rename {
            tenant_id: self.tenant_id,
            outlet_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        };
        Ok(OutletView::from(&self.outlet_command(outlet_id, &command)?))
    }

    /// Existing movements and shifts stay attributable; new ones are refused.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub fn deactivate_outlet(&self, outlet_id: OutletId) -> EngineResult<OutletView> {
        let command = OutletCommand::Deactivate {
            tenant_id: self.tenant_id,
            outlet_id,
            occurred_at: Utc::now(),
        };
        Ok(OutletView::from(&self.outlet_command(outlet_id, &command)?))
    }

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub fn reactivate_outlet(&self, outlet_id: OutletId) -> EngineResult<OutletView> {
        let command = OutletCommand::Reactivate {
            tenant_id: self.tenant_id,
            outlet_id,
            occurred_at: Utc::now(),
        };
        Ok(OutletView::from(&self.outlet_command(outlet_id, &command)?))
    }

    pub fn outlet(&self, outlet_id: OutletId) -> EngineResult<OutletView> {
        self.engine
            .outlets
            .get(self.tenant_id, &outlet_id)
            .map(|o| OutletView::from(&o))
            .ok_or_else(|| EngineError::not_found(format!("outlet {outlet_id}")))
    }

    /// All outlets, active and inactive, by name.
    pub fn outlets(&self) -> Vec<OutletView> {
        let mut outlets: Vec<_> = self
            .engine
            .outlets
            .list(self.tenant_id)
            .iter()
            .map(OutletView::from)
            .collect();
        outlets.sort_by(|a, b| a.name.cmp(&b.name));
        outlets
    }

    fn outlet_command(&self, outlet_id: OutletId, command: &OutletCommand) -> EngineResult<Outlet> {
        Ok(self
            .execute(
                OUTLET_STREAM,
                outlet_id.as_aggregate(),
                command,
                &self.engine.outlets,
                |id| Outlet::empty(id.into()),
            )?
            .aggregate)
    }

    // ---- catalog ----

    #[instrument(skip(self, settings), fields(tenant_id = %self.tenant_id))]
    pub fn register_product(
        &self,
        name: &str,
        sku: Option<String>,
        settings: StockSettings,
    ) -> EngineResult<ProductView> {
        let product_id = ProductId::new();
        let command = CatalogCommand::RegisterProduct(RegisterProduct {
            tenant_id: self.tenant_id,
            product_id,
            name: name.to_string(),
            sku,
            settings,
            occurred_at: Utc::now(),
        });
        let done = self.catalog_command(product_id, &command)?;
        info!(product_id = %product_id, "product registered");
        Ok(ProductView::from(&done))
    }

    #[instrument(skip(self, settings), fields(tenant_id = %self.tenant_id))]
    pub fn add_variation(
        &self,
        product_id: ProductId,
        name: &str,
        sku: Option<String>,
        settings: StockSettings,
    ) -> EngineResult<(VariationId, ProductView)> {
        let variation_id = VariationId::new();
        let command = CatalogCommand::AddVariation(AddVariation {
            tenant_id: self.tenant_id,
            product_id,
            variation_id,
            name: name.to_string(),
            sku,
            settings,
            occurred_at: Utc::now(),
        });
        let done = self.catalog_command(product_id, &command)?;
        Ok((variation_id, ProductView::from(&done)))
    }

    pub fn change_stock_settings(
        &self,
        product_id: ProductId,
        target: SettingsTarget,
        settings: StockSettings,
    ) -> EngineResult<ProductView> {
        let command = CatalogCommand::ChangeStockSettings(ChangeStockSettings {
            tenant_id: self.tenant_id,
            product_id,
            target,
            settings,
            occurred_at: Utc::now(),
        });
        Ok(ProductView::from(&self.catalog_command(product_id, &command)?))
    }

    pub fn product(&self, product_id: ProductId) -> EngineResult<ProductView> {
        self.catalog_product(product_id).map(|p| ProductView::from(&p))
    }

    pub fn products(&self) -> Vec<ProductView> {
        let mut products: Vec<_> = self
            .engine
            .products
            .list(self.tenant_id)
            .iter()
            .map(ProductView::from)
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        products
    }

    pub(super) fn catalog_product(&self, product_id: ProductId) -> EngineResult<CatalogProduct> {
        self.engine
            .products
            .get(self.tenant_id, &product_id)
            .ok_or_else(|| EngineError::not_found(format!("product {product_id}")))
    }

    fn catalog_command(
        &self,
        product_id: ProductId,
        command: &CatalogCommand,
    ) -> EngineResult<CatalogProduct> {
        Ok(self
            .execute(
                PRODUCT_STREAM,
                product_id.as_aggregate(),
                command,
                &self.engine.products,
                |id| CatalogProduct::empty(id.into()),
            )?
            .aggregate)
    }

    // ---- suppliers ----

    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub fn register_supplier(&self, name: &str) -> EngineResult<SupplierView> {
        let supplier_id = SupplierId::new();
        let command = SupplierCommand::Register {
            tenant_id: self.tenant_id,
            supplier_id,
            name: name.to_string(),
            occurred_at: Utc::now(),
        };
        let done = self.supplier_command(supplier_id, &command)?;
        Ok(SupplierView::from(&done))
    }

    /// Attribute every movement carrying `reference_id` to a supplier.
    ///
    /// Ledger rows are left untouched; the attribution is joined in when
    /// history is read. The reference must name at least one movement and may
    /// belong to one supplier only. Repeating an attribution is a no-op.
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    pub async fn attribute_reference(
        &self,
        supplier_id: SupplierId,
        reference_id: &str,
    ) -> EngineResult<SupplierView> {
        let reference_id = reference_id.trim();
        if reference_id.is_empty() {
            return Err(EngineError::Validation("reference_id cannot be empty".into()));
        }
        if self.engine.suppliers.get(self.tenant_id, &supplier_id).is_none() {
            return Err(EngineError::not_found(format!("supplier {supplier_id}")));
        }

        let held_elsewhere = self
            .engine
            .suppliers
            .list(self.tenant_id)
            .into_iter()
            .any(|s| *s.id() != supplier_id && s.references().any(|r| r == reference_id));
        if held_elsewhere {
            return Err(Conflict::AlreadyAttributed(reference_id.to_string()).into());
        }

        let filter = MovementFilter {
            reference_id: Some(reference_id.to_string()),
            ..MovementFilter::default()
        };
        let page = self
            .engine
            .ledger
            .query(self.tenant_id, &filter, Pagination { limit: 1, offset: 0 })
            .await?;
        if page.total == 0 {
            return Err(EngineError::not_found(format!(
                "movements with reference {reference_id}"
            )));
        }

        let command = SupplierCommand::AttributeReference {
            tenant_id: self.tenant_id,
            supplier_id,
            reference_id: reference_id.to_string(),
            occurred_at: Utc::now(),
        };
        let done = self.supplier_command(supplier_id, &command)?;
        info!(supplier_id = %supplier_id, reference_id, "reference attributed");
        Ok(SupplierView::from(&done))
    }

    pub fn supplier(&self, supplier_id: SupplierId) -> EngineResult<SupplierView> {
        self.engine
            .suppliers
            .get(self.tenant_id, &supplier_id)
            .map(|s| SupplierView::from(&s))
            .ok_or_else(|| EngineError::not_found(format!("supplier {supplier_id}")))
    }

    pub fn suppliers(&self) -> Vec<SupplierView> {
        let mut suppliers: Vec<_> = self
            .engine
            .suppliers
            .list(self.tenant_id)
            .iter()
            .map(SupplierView::from)
            .collect();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        suppliers
    }

    fn supplier_command(
        &self,
        supplier_id: SupplierId,
        command: &SupplierCommand,
    ) -> EngineResult<Supplier> {
        Ok(self
            .execute(
                SUPPLIER_STREAM,
                supplier_id.as_aggregate(),
                command,
                &self.engine.suppliers,
                |id| Supplier::empty(id.into()),
            )?
            .aggregate)
    }
}

/// Supplier credited with a reference, if any.
pub(super) fn attributed_supplier(suppliers: &[Supplier], reference_id: &str) -> Option<SupplierId> {
    suppliers
        .iter()
        .find(|s| s.references().any(|r| r == reference_id))
        .map(|s| *s.id())
}
