use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::privileges::Permission;
use crate::request_state::RequestState;

use super::utils::{ApiResponse, Json};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/products",
            get_with(list_products, list_products_docs)
                .post_with(create_product, create_product_docs),
        )
        .api_route(
            "/products/:id",
            get_with(get_product, get_product_docs)
                .put_with(update_product, update_product_docs)
                .delete_with(delete_product, delete_product_docs),
        )
        .api_route(
            "/products/reports/low-stock",
            get_with(low_stock_report, low_stock_report_docs),
        )
        .api_route(
            "/products/reports/expiring",
            get_with(expiring_report, expiring_report_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ProductDto {
    pub id: i64,
    pub item: String,
    pub brand: Option<String>,
    pub purchase_value: Option<f64>,
    pub sale_value: f64,
    pub expiration_date: Option<NaiveDate>,
    pub details: Option<serde_json::Value>,
    pub category: Option<String>,
    pub supplier_id: Option<i64>,
    /// Sum over all stock locations.
    pub quantity_in_stock: i64,
}

impl ProductDto {
    fn new(product: &models::Product, quantity_in_stock: i64) -> Self {
        ProductDto {
            id: product.id,
            item: product.item.clone(),
            brand: product.brand.clone(),
            purchase_value: product.purchase_value,
            sale_value: product.sale_value,
            expiration_date: product.expiration_date,
            details: product.details.clone(),
            category: product.category.clone(),
            supplier_id: product.supplier_id,
            quantity_in_stock,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ProductPageDto {
    pub products: Vec<ProductDto>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}

fn page_params(page: Option<i64>, per_page: Option<i64>) -> (i64, i64) {
    (page.unwrap_or(1).max(1), per_page.unwrap_or(20).clamp(1, 100))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct ProductListQuery {
    /// Substring filter on the product name.
    pub item: Option<String>,
    /// Substring filter on the brand.
    pub brand: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

async fn list_products(
    mut state: RequestState,
    query: Query<ProductListQuery>,
) -> ServiceResult<ApiResponse<ProductPageDto>> {
    state.session_require()?;
    let query = query.0;

    let (page, per_page) = page_params(query.page, query.per_page);
    let result = state
        .db
        .list_products(
            query.item.as_deref().unwrap_or("").trim(),
            query.brand.as_deref().unwrap_or("").trim(),
            page,
            per_page,
        )
        .await?;

    Ok(ApiResponse::ok(
        "Products retrieved successfully.",
        ProductPageDto {
            products: result
                .items
                .iter()
                .map(|(p, q)| ProductDto::new(p, *q))
                .collect(),
            total: result.total,
            pages: result.pages,
            current_page: result.current_page,
        },
    ))
}

fn list_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("Paginated product listing with aggregate stock quantities.")
        .tag("products")
        .response::<200, Json<ApiResponse<ProductPageDto>>>()
}

async fn get_product(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<ProductDto>> {
    state.session_require()?;

    let (product, quantity) = state
        .db
        .get_product_with_stock(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Product retrieved successfully.",
        ProductDto::new(&product, quantity),
    ))
}

fn get_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a single product by id with its aggregate stock quantity.")
        .tag("products")
        .response::<200, Json<ApiResponse<ProductDto>>>()
        .response_with::<404, (), _>(|res| res.description("No product with this id."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateProductDto {
    pub item: String,
    pub brand: Option<String>,
    pub purchase_value: Option<f64>,
    pub sale_value: f64,
    /// `YYYY-MM-DD`
    pub expiration_date: Option<NaiveDate>,
    pub details: Option<serde_json::Value>,
    pub category: Option<String>,
    pub supplier_id: Option<i64>,
}

async fn create_product(
    mut state: RequestState,
    form: Json<CreateProductDto>,
) -> ServiceResult<ApiResponse<ProductDto>> {
    state.session_require_privilege(Permission::StockModifier)?;
    let form = form.0;

    let item = form.item.trim().to_string();
    if item.is_empty() {
        return Err(ServiceError::Validation(
            "Field 'item' must not be empty.".to_string(),
        ));
    }
    if form.sale_value < 0.0 {
        return Err(ServiceError::Validation(
            "Field 'sale_value' must not be negative.".to_string(),
        ));
    }
    if let Some(supplier_id) = form.supplier_id {
        if state.db.get_supplier_by_id(supplier_id).await?.is_none() {
            return Err(ServiceError::Validation(format!(
                "Supplier with id '{supplier_id}' does not exist."
            )));
        }
    }

    let product = state
        .db
        .store_product(models::Product {
            id: 0,
            item,
            brand: form.brand.map(|b| b.trim().to_string()),
            purchase_value: form.purchase_value,
            sale_value: form.sale_value,
            expiration_date: form.expiration_date,
            details: form.details,
            category: form.category,
            supplier_id: form.supplier_id,
        })
        .await?;

    Ok(ApiResponse::created(
        "Product created successfully.",
        ProductDto::new(&product, 0),
    ))
}

fn create_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a product.")
        .tag("products")
        .response::<201, Json<ApiResponse<ProductDto>>>()
        .response_with::<400, (), _>(|res| res.description("Validation error."))
}

/// Nullable fields distinguish "absent" from an explicit `null`, which
/// clears the stored value (a `null` supplier_id unlinks the supplier).
#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateProductDto {
    pub item: Option<String>,
    #[serde(default)]
    pub brand: Option<Option<String>>,
    #[serde(default)]
    pub purchase_value: Option<Option<f64>>,
    pub sale_value: Option<f64>,
    #[serde(default)]
    pub expiration_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub details: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub category: Option<Option<String>>,
    #[serde(default)]
    pub supplier_id: Option<Option<i64>>,
}

async fn update_product(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<UpdateProductDto>,
) -> ServiceResult<ApiResponse<ProductDto>> {
    state.session_require_privilege(Permission::StockModifier)?;
    let form = form.0;

    let (mut product, quantity) = state
        .db
        .get_product_with_stock(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if let Some(item) = form.item {
        let item = item.trim().to_string();
        if item.is_empty() {
            return Err(ServiceError::Validation(
                "Field 'item' must not be empty.".to_string(),
            ));
        }
        product.item = item;
    }
    if let Some(brand) = form.brand {
        product.brand = brand.map(|b| b.trim().to_string());
    }
    if let Some(purchase_value) = form.purchase_value {
        product.purchase_value = purchase_value;
    }
    if let Some(sale_value) = form.sale_value {
        if sale_value < 0.0 {
            return Err(ServiceError::Validation(
                "Field 'sale_value' must not be negative.".to_string(),
            ));
        }
        product.sale_value = sale_value;
    }
    if let Some(expiration_date) = form.expiration_date {
        product.expiration_date = expiration_date;
    }
    if let Some(details) = form.details {
        product.details = details;
    }
    if let Some(category) = form.category {
        product.category = category;
    }
    if let Some(supplier_id) = form.supplier_id {
        if let Some(supplier_id) = supplier_id {
            if state.db.get_supplier_by_id(supplier_id).await?.is_none() {
                return Err(ServiceError::Validation(format!(
                    "Supplier with id '{supplier_id}' does not exist."
                )));
            }
        }
        product.supplier_id = supplier_id;
    }

    let product = state.db.store_product(product).await?;
    Ok(ApiResponse::ok(
        "Product updated successfully.",
        ProductDto::new(&product, quantity),
    ))
}

fn update_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Partially update a product.")
        .tag("products")
        .response::<200, Json<ApiResponse<ProductDto>>>()
        .response_with::<404, (), _>(|res| res.description("No product with this id."))
}

async fn delete_product(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::StockModifier)?;

    state.db.delete_product(id).await?;
    Ok(ApiResponse::message("Product deleted successfully."))
}

fn delete_product_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a product. Its stock associations are removed as well.")
        .tag("products")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| res.description("No product with this id."))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct LowStockReportDto {
    pub products: Vec<ProductDto>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
    pub threshold: i64,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

async fn low_stock_report(
    mut state: RequestState,
    query: Query<LowStockQuery>,
) -> ServiceResult<ApiResponse<LowStockReportDto>> {
    state.session_require_privilege(Permission::StorageModifier)?;
    let query = query.0;

    let threshold = query.threshold.unwrap_or(10);
    let (page, per_page) = page_params(query.page, query.per_page);
    let result = state.db.low_stock_report(threshold, page, per_page).await?;

    Ok(ApiResponse::ok(
        "Low stock report retrieved successfully.",
        LowStockReportDto {
            products: result
                .items
                .iter()
                .map(|(p, q)| ProductDto::new(p, *q))
                .collect(),
            total: result.total,
            pages: result.pages,
            current_page: result.current_page,
            threshold,
        },
    ))
}

fn low_stock_report_docs(op: TransformOperation) -> TransformOperation {
    op.description("Paginated report of products at or below a stock threshold.")
        .tag("products")
        .response::<200, Json<ApiResponse<LowStockReportDto>>>()
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ExpiringReportDto {
    pub products: Vec<ProductDto>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
    pub days_ahead: i64,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

async fn expiring_report(
    mut state: RequestState,
    query: Query<ExpiringQuery>,
) -> ServiceResult<ApiResponse<ExpiringReportDto>> {
    state.session_require_privilege(Permission::StorageModifier)?;
    let query = query.0;

    let days_ahead = query.days.unwrap_or(30);
    let (page, per_page) = page_params(query.page, query.per_page);
    let result = state.db.expiring_report(days_ahead, page, per_page).await?;

    Ok(ApiResponse::ok(
        "Expiring products report retrieved successfully.",
        ExpiringReportDto {
            products: result
                .items
                .iter()
                .map(|(p, q)| ProductDto::new(p, *q))
                .collect(),
            total: result.total,
            pages: result.pages,
            current_page: result.current_page,
            days_ahead,
        },
    ))
}

fn expiring_report_docs(op: TransformOperation) -> TransformOperation {
    op.description("Paginated report of products expiring within the next days.")
        .tag("products")
        .response::<200, Json<ApiResponse<ExpiringReportDto>>>()
}
