//! Legacy store queries and relation declarations
//!
//! Ordering rules (default variant first, primary image first, default
//! address first) come from the legacy exports and are kept as-is.

use crate::db::Query;

use super::relation::{RelationSpec, RootSpec};

// ============================================================================
// Products
// ============================================================================

pub const PRODUCTS: Query = Query::new(
    "products",
    r#"
    SELECT
        product_id, sku, name, slug, description, short_description,
        status, visibility, featured, weight, weight_unit,
        created_at, updated_at, meta_title, meta_description,
        made_in_hawaii, ingredients, nutrition_facts, allergen_info, shelf_life
    FROM products
    WHERE status = 'active'
    ORDER BY product_id
    "#,
);

pub const PRODUCT_VARIANTS: Query = Query::new(
    "product_variants",
    r#"
    SELECT
        variant_id, sku, name, flavor, size, price, compare_price, cost,
        weight, barcode, inventory_quantity, inventory_policy,
        requires_shipping, taxable, is_default
    FROM product_variants
    WHERE product_id = $1
    ORDER BY is_default DESC, position, variant_id
    "#,
);

pub const PRODUCT_IMAGES: Query = Query::new(
    "product_images",
    r#"
    SELECT
        image_id, variant_id, image_url, alt_text, position,
        width, height, is_primary
    FROM product_images
    WHERE product_id = $1
    ORDER BY is_primary DESC, position, image_id
    "#,
);

pub const PRODUCT_CATEGORIES: Query = Query::new(
    "product_categories",
    r#"
    SELECT c.category_id, c.name, c.slug, c.parent_id
    FROM categories c
    JOIN product_categories pc ON c.category_id = pc.category_id
    WHERE pc.product_id = $1
    ORDER BY c.category_id
    "#,
);

pub const PRODUCT_ATTRIBUTES: Query = Query::new(
    "product_attributes",
    r#"
    SELECT attribute_name, attribute_value
    FROM product_attributes
    WHERE product_id = $1
    ORDER BY attribute_name, attribute_value
    "#,
);

pub const RELATED_PRODUCTS: Query = Query::new(
    "related_products",
    r#"
    SELECT related_product_id, relationship_type
    FROM product_relationships
    WHERE product_id = $1
    ORDER BY relationship_type, related_product_id
    "#,
);

/// Full category tree, exported alongside the products
pub const CATEGORIES: Query = Query::new(
    "categories",
    r#"
    SELECT
        category_id, parent_id, name, slug, description,
        image_url, position, is_active
    FROM categories
    ORDER BY parent_id NULLS FIRST, position, category_id
    "#,
);

pub fn product_root() -> RootSpec {
    RootSpec { query: PRODUCTS, key_column: "product_id" }
}

pub fn product_relations() -> Vec<RelationSpec> {
    vec![
        RelationSpec::many("variants", PRODUCT_VARIANTS),
        RelationSpec::many("images", PRODUCT_IMAGES),
        RelationSpec::many("categories", PRODUCT_CATEGORIES),
        RelationSpec::pivot("attributes", PRODUCT_ATTRIBUTES, "attribute_name", "attribute_value"),
        RelationSpec::many("related_products", RELATED_PRODUCTS),
    ]
}

// ============================================================================
// Customers
// ============================================================================

pub const CUSTOMERS: Query = Query::new(
    "customers",
    r#"
    SELECT
        customer_id, email, password_hash, first_name, last_name, phone,
        created_at, last_login, email_opt_in, sms_opt_in, loyalty_points,
        customer_group, tags, notes, is_active
    FROM customers
    WHERE is_active = TRUE
    ORDER BY customer_id
    "#,
);

pub const CUSTOMER_ADDRESSES: Query = Query::new(
    "customer_addresses",
    r#"
    SELECT
        address_id, address_type, first_name, last_name, company,
        address_line1, address_line2, city, state, zip, country,
        phone, is_default
    FROM customer_addresses
    WHERE customer_id = $1
    ORDER BY is_default DESC, address_id
    "#,
);

pub const CUSTOMER_ORDER_SUMMARY: Query = Query::new(
    "customer_order_summary",
    r#"
    SELECT
        COUNT(*) AS total_orders,
        SUM(total) AS lifetime_value,
        MAX(created_at) AS last_order_date,
        AVG(total) AS average_order_value
    FROM orders
    WHERE customer_id = $1
      AND status NOT IN ('cancelled', 'failed')
    "#,
);

/// Tokenized payment methods only; card numbers are never stored
pub const CUSTOMER_PAYMENT_METHODS: Query = Query::new(
    "customer_payment_methods",
    r#"
    SELECT
        payment_method_id, type, last_four, card_brand,
        exp_month, exp_year, is_default, created_at
    FROM customer_payment_methods
    WHERE customer_id = $1
      AND is_active = TRUE
    ORDER BY payment_method_id
    "#,
);

pub fn customer_root() -> RootSpec {
    RootSpec { query: CUSTOMERS, key_column: "customer_id" }
}

pub fn customer_relations() -> Vec<RelationSpec> {
    vec![
        RelationSpec::many("addresses", CUSTOMER_ADDRESSES),
        RelationSpec::one("order_summary", CUSTOMER_ORDER_SUMMARY),
        RelationSpec::many("payment_methods", CUSTOMER_PAYMENT_METHODS),
    ]
}
