use std::collections::BTreeMap;

use aide::axum::routing::{delete_with, get_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
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
            "/clients",
            get_with(list_clients, list_clients_docs).post_with(create_client, create_client_docs),
        )
        .api_route(
            "/clients/:id",
            get_with(get_client, get_client_docs)
                .put_with(update_client, update_client_docs)
                .delete_with(delete_client, delete_client_docs),
        )
        .api_route(
            "/clients/:id/discounts",
            get_with(get_discounts, get_discounts_docs)
                .post_with(set_discount, set_discount_docs),
        )
        .api_route(
            "/clients/:id/discounts/:category",
            delete_with(remove_discount, remove_discount_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ClientDto {
    pub id: i64,
    pub cpf: String,
    pub name: String,
    pub nickname: Option<String>,
    /// Discount percentage per lower-cased category key.
    pub discounts: BTreeMap<String, f64>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl From<&models::Client> for ClientDto {
    fn from(value: &models::Client) -> Self {
        ClientDto {
            id: value.id,
            cpf: value.cpf.clone(),
            name: value.name.clone(),
            nickname: value.nickname.clone(),
            discounts: value.discounts.clone(),
            phone: value.phone.clone(),
            notes: value.notes.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ClientListDto {
    pub clients: Vec<ClientDto>,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct ClientSearchQuery {
    /// Search term matched against cpf, name and nickname.
    pub q: Option<String>,
}

async fn list_clients(
    mut state: RequestState,
    query: Query<ClientSearchQuery>,
) -> ServiceResult<ApiResponse<ClientListDto>> {
    state.session_require()?;

    let search = query.0.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let clients = state.db.get_all_clients(search).await?;
    Ok(ApiResponse::ok(
        "Clients retrieved successfully.",
        ClientListDto {
            clients: clients.iter().map(ClientDto::from).collect(),
        },
    ))
}

fn list_clients_docs(op: TransformOperation) -> TransformOperation {
    op.description("List clients, optionally filtered by a search term.")
        .tag("clients")
        .response::<200, Json<ApiResponse<ClientListDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateClientDto {
    /// Dots and dashes are stripped before storage.
    pub cpf: String,
    pub name: String,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

async fn create_client(
    mut state: RequestState,
    form: Json<CreateClientDto>,
) -> ServiceResult<ApiResponse<ClientDto>> {
    state.session_require_privilege(Permission::ClientCreator)?;
    let form = form.0;

    let cpf: String = form
        .cpf
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .collect();
    if cpf.len() < 11 || cpf.len() > 14 {
        return Err(ServiceError::Validation(
            "Field 'cpf' must have between 11 and 14 characters.".to_string(),
        ));
    }
    let name = form.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Validation(
            "Field 'name' must not be empty.".to_string(),
        ));
    }

    if state.db.get_client_by_cpf(&cpf).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "A client with cpf '{cpf}' already exists."
        )));
    }

    let client = state
        .db
        .store_client(models::Client {
            id: 0,
            cpf,
            name,
            nickname: form.nickname.map(|n| n.trim().to_string()),
            discounts: BTreeMap::new(),
            phone: form.phone,
            notes: form.notes,
        })
        .await?;

    Ok(ApiResponse::created(
        "Client created successfully.",
        ClientDto::from(&client),
    ))
}

fn create_client_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a client. New clients start with an empty discount set.")
        .tag("clients")
        .response::<201, Json<ApiResponse<ClientDto>>>()
        .response_with::<409, (), _>(|res| res.description("CPF already registered."))
}

async fn get_client(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<ClientDto>> {
    state.session_require()?;

    let client = state
        .db
        .get_client_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Client retrieved successfully.",
        ClientDto::from(&client),
    ))
}

fn get_client_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a single client by id.")
        .tag("clients")
        .response::<200, Json<ApiResponse<ClientDto>>>()
        .response_with::<404, (), _>(|res| res.description("No client with this id."))
}

/// Partial update, cpf is immutable and discounts have their own endpoints.
/// Nullable fields distinguish "absent" from an explicit `null`, which
/// clears the stored value.
#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateClientDto {
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<Option<String>>,
    #[serde(default)]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub notes: Option<Option<String>>,
}

async fn update_client(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<UpdateClientDto>,
) -> ServiceResult<ApiResponse<ClientDto>> {
    state.session_require_privilege(Permission::ClientCreator)?;
    let form = form.0;

    if form.name.is_none() && form.nickname.is_none() && form.phone.is_none() && form.notes.is_none()
    {
        return Err(ServiceError::Validation(
            "At least one field must be provided for the update.".to_string(),
        ));
    }

    let mut client = state
        .db
        .get_client_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if let Some(name) = form.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "Field 'name' must not be empty.".to_string(),
            ));
        }
        client.name = name;
    }
    if let Some(nickname) = form.nickname {
        client.nickname = nickname.map(|n| n.trim().to_string());
    }
    if let Some(phone) = form.phone {
        client.phone = phone;
    }
    if let Some(notes) = form.notes {
        client.notes = notes;
    }

    let client = state.db.store_client(client).await?;
    Ok(ApiResponse::ok(
        "Client updated successfully.",
        ClientDto::from(&client),
    ))
}

fn update_client_docs(op: TransformOperation) -> TransformOperation {
    op.description("Partially update a client. The cpf is immutable.")
        .tag("clients")
        .response::<200, Json<ApiResponse<ClientDto>>>()
        .response_with::<400, (), _>(|res| res.description("Empty update payload."))
        .response_with::<404, (), _>(|res| res.description("No client with this id."))
}

async fn delete_client(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::ClientCreator)?;

    state.db.delete_client(id).await?;
    Ok(ApiResponse::message("Client deleted successfully."))
}

fn delete_client_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a client by id.")
        .tag("clients")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| res.description("No client with this id."))
}

async fn get_discounts(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<BTreeMap<String, f64>>> {
    state.session_require()?;

    let client = state
        .db
        .get_client_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Client discounts retrieved successfully.",
        client.discounts,
    ))
}

fn get_discounts_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the discounts of a client.")
        .tag("clients")
        .response::<200, Json<ApiResponse<BTreeMap<String, f64>>>>()
        .response_with::<404, (), _>(|res| res.description("No client with this id."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SetDiscountDto {
    pub category: String,
    pub percentage: f64,
}

async fn set_discount(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<SetDiscountDto>,
) -> ServiceResult<ApiResponse<BTreeMap<String, f64>>> {
    state.session_require_privilege(Permission::ClientCreator)?;
    let form = form.0;

    if form.category.trim().is_empty() {
        return Err(ServiceError::Validation(
            "Fields 'category' (string) and 'percentage' (number) are required.".to_string(),
        ));
    }

    let mut client = state
        .db
        .get_client_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    client
        .discounts
        .insert(form.category.trim().to_lowercase(), form.percentage);
    let client = state.db.store_client(client).await?;

    Ok(ApiResponse::ok(
        format!("Discount for '{}' updated successfully.", form.category),
        client.discounts,
    ))
}

fn set_discount_docs(op: TransformOperation) -> TransformOperation {
    op.description("Add or update a discount category for a client. Keys are lower-cased.")
        .tag("clients")
        .response::<200, Json<ApiResponse<BTreeMap<String, f64>>>>()
        .response_with::<404, (), _>(|res| res.description("No client with this id."))
}

async fn remove_discount(
    mut state: RequestState,
    Path((id, category)): Path<(i64, String)>,
) -> ServiceResult<ApiResponse<()>> {
    state.session_require_privilege(Permission::ClientCreator)?;

    let mut client = state
        .db
        .get_client_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let key = category.to_lowercase();
    if client.discounts.remove(&key).is_none() {
        return Err(ServiceError::NotFound);
    }
    state.db.store_client(client).await?;

    Ok(ApiResponse::message(format!(
        "Discount for '{category}' removed successfully."
    )))
}

fn remove_discount_docs(op: TransformOperation) -> TransformOperation {
    op.description("Remove a discount category from a client.")
        .tag("clients")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<404, (), _>(|res| {
            res.description("No client with this id or no such discount category.")
        })
}
