use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::request_state::RequestState;

use super::utils::{ApiResponse, Json};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/suppliers",
            get_with(list_suppliers, list_suppliers_docs)
                .post_with(create_supplier, create_supplier_docs),
        )
        .api_route(
            "/suppliers/:id",
            get_with(get_supplier, get_supplier_docs)
                .put_with(update_supplier, update_supplier_docs)
                .delete_with(delete_supplier, delete_supplier_docs),
        )
        .api_route(
            "/suppliers/:id/products",
            get_with(get_supplier_products, get_supplier_products_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SupplierDto {
    pub id: i64,
    pub name: String,
    pub cnpj: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl From<&models::Supplier> for SupplierDto {
    fn from(value: &models::Supplier) -> Self {
        SupplierDto {
            id: value.id,
            name: value.name.clone(),
            cnpj: value.cnpj.clone(),
            contact_person: value.contact_person.clone(),
            phone: value.phone.clone(),
            email: value.email.clone(),
            address: value.address.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SupplierListDto {
    pub suppliers: Vec<SupplierDto>,
}

async fn list_suppliers(mut state: RequestState) -> ServiceResult<ApiResponse<SupplierListDto>> {
    state.session_require()?;

    let suppliers = state.db.get_all_suppliers().await?;
    Ok(ApiResponse::ok(
        "Suppliers retrieved successfully.",
        SupplierListDto {
            suppliers: suppliers.iter().map(SupplierDto::from).collect(),
        },
    ))
}

fn list_suppliers_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all suppliers ordered by name.")
        .tag("suppliers")
        .response::<200, Json<ApiResponse<SupplierListDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateSupplierDto {
    pub name: String,
    pub cnpj: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

async fn create_supplier(
    mut state: RequestState,
    form: Json<CreateSupplierDto>,
) -> ServiceResult<ApiResponse<SupplierDto>> {
    state.session_require_admin()?;
    let form = form.0;

    let name = form.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Validation(
            "Field 'name' must not be empty.".to_string(),
        ));
    }
    if state.db.get_supplier_by_name(&name).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "A supplier named '{name}' already exists."
        )));
    }

    let supplier = state
        .db
        .store_supplier(models::Supplier {
            id: 0,
            name,
            cnpj: form.cnpj,
            contact_person: form.contact_person,
            phone: form.phone,
            email: form.email,
            address: form.address,
        })
        .await?;

    Ok(ApiResponse::created(
        "Supplier created successfully.",
        SupplierDto::from(&supplier),
    ))
}

fn create_supplier_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a supplier.")
        .tag("suppliers")
        .response::<201, Json<ApiResponse<SupplierDto>>>()
        .response_with::<409, (), _>(|res| res.description("Supplier name or cnpj already taken."))
}

async fn get_supplier(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<SupplierDto>> {
    state.session_require()?;

    let supplier = state
        .db
        .get_supplier_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Supplier retrieved successfully.",
        SupplierDto::from(&supplier),
    ))
}

fn get_supplier_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a single supplier by id.")
        .tag("suppliers")
        .response::<200, Json<ApiResponse<SupplierDto>>>()
        .response_with::<404, (), _>(|res| res.description("No supplier with this id."))
}

/// Nullable fields distinguish "absent" from an explicit `null`, which
/// clears the stored value.
#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateSupplierDto {
    pub name: Option<String>,
    #[serde(default)]
    pub cnpj: Option<Option<String>>,
    #[serde(default)]
    pub contact_person: Option<Option<String>>,
    #[serde(default)]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub email: Option<Option<String>>,
    #[serde(default)]
    pub address: Option<Option<String>>,
}

async fn update_supplier(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<UpdateSupplierDto>,
) -> ServiceResult<ApiResponse<SupplierDto>> {
    state.session_require_admin()?;
    let form = form.0;

    let mut supplier = state
        .db
        .get_supplier_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if let Some(name) = form.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "Field 'name' must not be empty.".to_string(),
            ));
        }
        if let Some(existing) = state.db.get_supplier_by_name(&name).await? {
            if existing.id != id {
                return Err(ServiceError::Conflict(format!(
                    "A supplier named '{name}' already exists."
                )));
            }
        }
        supplier.name = name;
    }
    if let Some(cnpj) = form.cnpj {
        supplier.cnpj = cnpj;
    }
    if let Some(contact_person) = form.contact_person {
        supplier.contact_person = contact_person;
    }
    if let Some(phone) = form.phone {
        supplier.phone = phone;
    }
    if let Some(email) = form.email {
        supplier.email = email;
    }
    if let Some(address) = form.address {
        supplier.address = address;
    }

    let supplier = state.db.store_supplier(supplier).await?;
    Ok(ApiResponse::ok(
        "Supplier updated successfully.",
        SupplierDto::from(&supplier),
    ))
}

fn update_supplier_docs(op: TransformOperation) -> TransformOperation {
    op.description("Partially update a supplier.")
        .tag("suppliers")
        .response::<200, Json<ApiResponse<SupplierDto>>>()
        .response_with::<404, (), _>(|res| res.description("No supplier with this id."))
}

async fn delete_supplier(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_admin()?;

    state.db.delete_supplier(id).await?;
    Ok(ApiResponse::message(
        "Supplier deleted successfully. Its products were kept and unlinked.",
    ))
}

fn delete_supplier_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a supplier. Linked products stay in the catalog without a supplier.")
        .tag("suppliers")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| res.description("No supplier with this id."))
}

/// Catalog entry as listed under a supplier, without stock aggregation.
#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SupplierProductDto {
    pub id: i64,
    pub item: String,
    pub brand: Option<String>,
    pub purchase_value: Option<f64>,
    pub sale_value: f64,
    pub category: Option<String>,
}

impl From<&models::Product> for SupplierProductDto {
    fn from(value: &models::Product) -> Self {
        SupplierProductDto {
            id: value.id,
            item: value.item.clone(),
            brand: value.brand.clone(),
            purchase_value: value.purchase_value,
            sale_value: value.sale_value,
            category: value.category.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SupplierProductsDto {
    pub products: Vec<SupplierProductDto>,
}

async fn get_supplier_products(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<SupplierProductsDto>> {
    state.session_require()?;

    if state.db.get_supplier_by_id(id).await?.is_none() {
        return Err(ServiceError::NotFound);
    }
    let products = state.db.get_products_by_supplier(id).await?;

    Ok(ApiResponse::ok(
        "Supplier products retrieved successfully.",
        SupplierProductsDto {
            products: products.iter().map(SupplierProductDto::from).collect(),
        },
    ))
}

fn get_supplier_products_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the products supplied by a supplier.")
        .tag("suppliers")
        .response::<200, Json<ApiResponse<SupplierProductsDto>>>()
        .response_with::<404, (), _>(|res| res.description("No supplier with this id."))
}
