use aide::axum::routing::{get_with, patch_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
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
            "/stocks",
            get_with(list_stocks, list_stocks_docs).post_with(create_stock, create_stock_docs),
        )
        .api_route(
            "/stocks/:id",
            get_with(get_stock, get_stock_docs)
                .put_with(update_stock, update_stock_docs)
                .delete_with(delete_stock, delete_stock_docs),
        )
        .api_route(
            "/stocks/:id/products",
            get_with(get_stock_products, get_stock_products_docs),
        )
        .api_route(
            "/stocks/:id/products/:product_id",
            post_with(add_product, add_product_docs),
        )
        .api_route(
            "/stocks/:id/products/:product_id/quantity",
            patch_with(set_product_quantity, set_product_quantity_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StockDto {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl From<&models::Stock> for StockDto {
    fn from(value: &models::Stock) -> Self {
        StockDto {
            id: value.id,
            name: value.name.clone(),
            description: value.description.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StockListDto {
    pub stocks: Vec<StockDto>,
}

async fn list_stocks(mut state: RequestState) -> ServiceResult<ApiResponse<StockListDto>> {
    state.session_require()?;

    let stocks = state.db.get_all_stocks().await?;
    Ok(ApiResponse::ok(
        "Stocks retrieved successfully.",
        StockListDto {
            stocks: stocks.iter().map(StockDto::from).collect(),
        },
    ))
}

fn list_stocks_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all stock locations.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<StockListDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateStockDto {
    pub name: String,
    pub description: Option<String>,
}

async fn create_stock(
    mut state: RequestState,
    form: Json<CreateStockDto>,
) -> ServiceResult<ApiResponse<StockDto>> {
    state.session_require_privilege(Permission::StockModifier)?;
    let form = form.0;

    let name = form.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Validation(
            "Field 'name' must not be empty.".to_string(),
        ));
    }
    // names are unique regardless of case
    if state.db.get_stock_by_name(&name).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "A stock named '{name}' already exists."
        )));
    }

    let stock = state
        .db
        .store_stock(models::Stock {
            id: 0,
            name,
            description: form.description,
        })
        .await?;

    Ok(ApiResponse::created(
        "Stock created successfully.",
        StockDto::from(&stock),
    ))
}

fn create_stock_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a stock location. Names are unique case-insensitively.")
        .tag("stocks")
        .response::<201, Json<ApiResponse<StockDto>>>()
        .response_with::<409, (), _>(|res| res.description("Stock name already taken."))
}

async fn get_stock(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<StockDto>> {
    state.session_require()?;

    let stock = state
        .db
        .get_stock_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Stock retrieved successfully.",
        StockDto::from(&stock),
    ))
}

fn get_stock_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a single stock location by id.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<StockDto>>>()
        .response_with::<404, (), _>(|res| res.description("No stock with this id."))
}

/// An explicit `null` description clears the stored value.
#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateStockDto {
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
}

async fn update_stock(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<UpdateStockDto>,
) -> ServiceResult<ApiResponse<StockDto>> {
    state.session_require_privilege(Permission::StockModifier)?;
    let form = form.0;

    if form.name.is_none() && form.description.is_none() {
        return Err(ServiceError::Validation(
            "At least one field must be provided for the update.".to_string(),
        ));
    }

    let mut stock = state
        .db
        .get_stock_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if let Some(name) = form.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "Field 'name' must not be empty.".to_string(),
            ));
        }
        if let Some(existing) = state.db.get_stock_by_name(&name).await? {
            if existing.id != id {
                return Err(ServiceError::Conflict(format!(
                    "A stock named '{name}' already exists."
                )));
            }
        }
        stock.name = name;
    }
    if let Some(description) = form.description {
        stock.description = description;
    }

    let stock = state.db.store_stock(stock).await?;
    Ok(ApiResponse::ok(
        "Stock updated successfully.",
        StockDto::from(&stock),
    ))
}

fn update_stock_docs(op: TransformOperation) -> TransformOperation {
    op.description("Partially update a stock location.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<StockDto>>>()
        .response_with::<404, (), _>(|res| res.description("No stock with this id."))
}

async fn delete_stock(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::StockModifier)?;

    state.db.delete_stock(id).await?;
    Ok(ApiResponse::message("Stock deleted successfully."))
}

fn delete_stock_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a stock location and its product associations.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| res.description("No stock with this id."))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StockProductDto {
    pub id: i64,
    pub item: String,
    pub brand: Option<String>,
    pub sale_value: f64,
    /// Quantity within this stock location only.
    pub quantity: i32,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StockProductsDto {
    pub products: Vec<StockProductDto>,
}

async fn get_stock_products(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<StockProductsDto>> {
    state.session_require()?;

    let stock = state
        .db
        .get_stock_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    let products = state.db.get_products_in_stock(id).await?;

    Ok(ApiResponse::ok(
        format!("Products in stock '{}'.", stock.name),
        StockProductsDto {
            products: products
                .iter()
                .map(|(p, quantity)| StockProductDto {
                    id: p.id,
                    item: p.item.clone(),
                    brand: p.brand.clone(),
                    sale_value: p.sale_value,
                    quantity: *quantity,
                })
                .collect(),
        },
    ))
}

fn get_stock_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the products and quantities held in a stock location.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<StockProductsDto>>>()
        .response_with::<404, (), _>(|res| res.description("No stock with this id."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct QuantityDto {
    pub quantity: i32,
}

async fn add_product(
    mut state: RequestState,
    Path((id, product_id)): Path<(i64, i64)>,
    form: Json<QuantityDto>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::StockModifier)?;

    if form.quantity <= 0 {
        return Err(ServiceError::Validation(
            "Field 'quantity' must be a positive integer.".to_string(),
        ));
    }

    let stock = state
        .db
        .get_stock_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    let (product, _) = state
        .db
        .get_product_with_stock(product_id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    state
        .db
        .add_product_to_stock(id, product_id, form.quantity)
        .await?;

    Ok(ApiResponse::message(format!(
        "'{}' added to stock '{}'.",
        product.item, stock.name
    )))
}

fn add_product_docs(op: TransformOperation) -> TransformOperation {
    op.description(
        "Add a product to a stock location, incrementing the quantity when it already exists.",
    )
    .tag("stocks")
    .response::<200, Json<ApiResponse<()>>>()
    .response_with::<400, (), _>(|res| res.description("Quantity must be positive."))
    .response_with::<404, (), _>(|res| res.description("No such stock or product."))
}

async fn set_product_quantity(
    mut state: RequestState,
    Path((id, product_id)): Path<(i64, i64)>,
    form: Json<QuantityDto>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::StockModifier)?;

    if form.quantity < 0 {
        return Err(ServiceError::Validation(
            "Field 'quantity' must be an integer greater than or equal to zero.".to_string(),
        ));
    }

    if state.db.get_stock_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }
    if state.db.get_product_with_stock(product_id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }

    let updated = state
        .db
        .set_product_quantity_in_stock(id, product_id, form.quantity)
        .await?;
    // the product exists but has no association with this stock
    if !updated {
        return Err(ServiceError::NotFound);
    }

    Ok(ApiResponse::message(
        "Product quantity updated successfully.",
    ))
}

fn set_product_quantity_docs(op: TransformOperation) -> TransformOperation {
    op.description("Overwrite the exact quantity of a product in a stock location.")
        .tag("stocks")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| {
            res.description("No such stock, product, or association.")
        })
}
