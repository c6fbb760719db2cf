/// ERP models the gateway reads from, each with its fixed field projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Inventory,
    PurchaseOrders,
    PurchaseOrderLines,
}

impl Collection {
    pub fn model(&self) -> &'static str {
        match self {
            Self::Products => "product.template",
            Self::Inventory => "stock.quant",
            Self::PurchaseOrders => "purchase.order",
            Self::PurchaseOrderLines => "purchase.order.line",
        }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Products => &["name", "type", "list_price", "default_code"],
            Self::Inventory => &["product_id", "quantity", "location_id"],
            Self::PurchaseOrders => &["name", "partner_id", "date_order", "state"],
            Self::PurchaseOrderLines => {
                &["product_id", "product_qty", "product_uom", "date_planned", "location_dest_id"]
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Products => "product",
            Self::Inventory => "inventory",
            Self::PurchaseOrders => "purchase order",
            Self::PurchaseOrderLines => "purchase order line",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Collection;

    #[test]
    fn projections_are_fixed_per_collection() {
        assert_eq!(Collection::Products.fields().len(), 4);
        assert_eq!(Collection::Inventory.fields(), &["product_id", "quantity", "location_id"]);
        assert_eq!(Collection::PurchaseOrders.model(), "purchase.order");
        assert!(Collection::PurchaseOrderLines.fields().contains(&"location_dest_id"));
    }
}
