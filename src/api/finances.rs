use aide::axum::routing::{get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::{Path, Query};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::privileges::{self, AccountType, Permission};
use crate::request_state::RequestState;

use super::utils::{ApiResponse, Json};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/finances/register-sell",
            post_with(register_sell, register_sell_docs),
        )
        .api_route("/finances/sells", get_with(get_all_sells, get_all_sells_docs))
        .api_route(
            "/finances/specific/:cashier_id/sells",
            get_with(get_cashier_sells, get_cashier_sells_docs),
        )
        .api_route(
            "/finances/summary/daily",
            get_with(daily_summary, daily_summary_docs),
        )
        .api_route(
            "/finances/summary/monthly",
            get_with(monthly_summary, monthly_summary_docs),
        )
        .api_route(
            "/finances/reports/sales-flow",
            get_with(sales_flow_report, sales_flow_report_docs),
        )
        .api_route(
            "/finances/reports/payment-methods",
            get_with(payment_methods_report, payment_methods_report_docs),
        )
        .api_route(
            "/finances/reports/profit-margin",
            get_with(profit_margin_report, profit_margin_report_docs),
        )
        .with_state(app_state)
}

/// Parse a `YYYY-MM-DD` query parameter, silently falling back on bad input.
fn parse_date_or_default(value: Option<&str>, default_date: NaiveDate) -> NaiveDate {
    value
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        .unwrap_or(default_date)
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SoldItemDto {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_value: f64,
    pub total_value: f64,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct RegisterSellDto {
    /// Receipt identifier generated by the point of sale.
    pub id: String,
    pub cashier_id: String,
    pub operator: String,
    pub total_value: f64,
    pub payment_method: String,
    pub items: Vec<SoldItemDto>,
    pub received_value: Option<f64>,
    pub change: Option<f64>,
    pub client_id: Option<i64>,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct RegisteredSellDto {
    pub sell_id: String,
}

async fn register_sell(
    mut state: RequestState,
    form: Json<RegisterSellDto>,
) -> ServiceResult<ApiResponse<RegisteredSellDto>> {
    state.session_require_privilege(Permission::DownStorage)?;
    let form = form.0;

    if form.id.trim().is_empty() {
        return Err(ServiceError::Validation(
            "Field 'id' must not be empty.".to_string(),
        ));
    }
    if form.items.is_empty() {
        return Err(ServiceError::Validation(
            "A sale must contain at least one item.".to_string(),
        ));
    }
    for item in &form.items {
        if item.quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "Invalid quantity for product '{}'.",
                item.product_name
            )));
        }
        if item.unit_value < 0.0 || item.total_value < 0.0 {
            return Err(ServiceError::Validation(format!(
                "Negative value for product '{}'.",
                item.product_name
            )));
        }
    }

    let sell = state
        .db
        .register_sell(models::Sell {
            id: form.id,
            cashier_id: form.cashier_id,
            operator: form.operator,
            sell_time: Utc::now(),
            total_value: form.total_value,
            payment_method: form.payment_method,
            received_value: form.received_value,
            change: form.change,
            client_id: form.client_id,
            items: form
                .items
                .into_iter()
                .map(|item| models::SoldItem {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_value: item.unit_value,
                    total_value: item.total_value,
                })
                .collect(),
        })
        .await?;

    Ok(ApiResponse::created(
        "Sale registered successfully.",
        RegisteredSellDto { sell_id: sell.id },
    ))
}

fn register_sell_docs(op: TransformOperation) -> TransformOperation {
    op.description(
        "Register a sale, atomically debiting every item from the 'Geral' stock location.",
    )
    .tag("finances")
    .response::<201, Json<ApiResponse<RegisteredSellDto>>>()
    .response_with::<400, (), _>(|res| {
        res.description("Validation error or missing 'Geral' stock.")
    })
    .response_with::<409, (), _>(|res| res.description("Insufficient stock for an item."))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SellItemDto {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_value: f64,
    pub total_value: f64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SellDto {
    pub id: String,
    pub cashier_id: String,
    pub operator: String,
    pub sell_time: DateTime<Utc>,
    pub total_value: f64,
    pub payment_method: String,
    pub received_value: Option<f64>,
    pub change: Option<f64>,
    pub client_id: Option<i64>,
    pub items: Vec<SellItemDto>,
}

impl From<&models::Sell> for SellDto {
    fn from(value: &models::Sell) -> Self {
        SellDto {
            id: value.id.clone(),
            cashier_id: value.cashier_id.clone(),
            operator: value.operator.clone(),
            sell_time: value.sell_time,
            total_value: value.total_value,
            payment_method: value.payment_method.clone(),
            received_value: value.received_value,
            change: value.change,
            client_id: value.client_id,
            items: value
                .items
                .iter()
                .map(|item| SellItemDto {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_value: item.unit_value,
                    total_value: item.total_value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SellListDto {
    pub sells: Vec<SellDto>,
}

async fn get_all_sells(mut state: RequestState) -> ServiceResult<ApiResponse<SellListDto>> {
    state.session_require_admin()?;

    let sells = state.db.get_all_sells().await?;
    Ok(ApiResponse::ok(
        "Sales retrieved successfully.",
        SellListDto {
            sells: sells.iter().map(SellDto::from).collect(),
        },
    ))
}

fn get_all_sells_docs(op: TransformOperation) -> TransformOperation {
    op.description("List every registered sale, newest first.")
        .tag("finances")
        .response::<200, Json<ApiResponse<SellListDto>>>()
        .response_with::<403, (), _>(|res| res.description("Requires the ADMIN privilege."))
}

async fn get_cashier_sells(
    mut state: RequestState,
    Path(cashier_id): Path<String>,
) -> ServiceResult<ApiResponse<SellListDto>> {
    let account = state.session_require()?;

    let resolved = privileges::resolve_privileges(account.account_type, &account.privileges);
    let is_admin = resolved.has(Permission::Admin);

    if !is_admin {
        let own_register = account
            .profile
            .get("register_number")
            .map(|v| v.to_string().trim_matches('"').to_string());
        if account.account_type != AccountType::Caixa || own_register.as_deref() != Some(&cashier_id)
        {
            return Err(ServiceError::Forbidden("Access denied.".to_string()));
        }
    }

    // cashiers only see their own last seven days
    let since = if is_admin {
        None
    } else {
        Some(Utc::now() - Duration::days(7))
    };
    let sells = state.db.get_sells_by_cashier(&cashier_id, since).await?;

    Ok(ApiResponse::ok(
        format!("Sales for register {cashier_id} retrieved."),
        SellListDto {
            sells: sells.iter().map(SellDto::from).collect(),
        },
    ))
}

fn get_cashier_sells_docs(op: TransformOperation) -> TransformOperation {
    op.description(
        "List the sales of one register. Admins see everything, a CAIXA account only its own \
         register limited to the last seven days.",
    )
    .tag("finances")
    .response::<200, Json<ApiResponse<SellListDto>>>()
    .response_with::<403, (), _>(|res| res.description("Not your register."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DailySummaryQuery {
    /// `YYYY-MM-DD`, defaults to today.
    pub date: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DailySummaryDto {
    pub date: NaiveDate,
    pub total_revenue: f64,
    pub total_sales_count: i64,
    pub total_items_sold: i64,
    pub average_ticket: f64,
}

async fn daily_summary(
    mut state: RequestState,
    query: Query<DailySummaryQuery>,
) -> ServiceResult<ApiResponse<DailySummaryDto>> {
    state.session_require_privilege(Permission::Finance)?;

    let date = parse_date_or_default(query.0.date.as_deref(), Utc::now().date_naive());
    let summary = state.db.daily_summary(date).await?;

    let average_ticket = if summary.total_sales_count > 0 {
        summary.total_revenue / summary.total_sales_count as f64
    } else {
        0.0
    };
    Ok(ApiResponse::ok(
        format!("Summary for {date}."),
        DailySummaryDto {
            date,
            total_revenue: summary.total_revenue,
            total_sales_count: summary.total_sales_count,
            total_items_sold: summary.total_items_sold,
            average_ticket,
        },
    ))
}

fn daily_summary_docs(op: TransformOperation) -> TransformOperation {
    op.description("Revenue, sale count, items sold and average ticket for one day.")
        .tag("finances")
        .response::<200, Json<ApiResponse<DailySummaryDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct MonthlySummaryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct MonthlySummaryDto {
    /// `MM/YYYY`
    pub month: String,
    pub total_revenue: f64,
    pub total_sales_count: i64,
    pub total_items_sold: i64,
    pub average_ticket: f64,
}

async fn monthly_summary(
    mut state: RequestState,
    query: Query<MonthlySummaryQuery>,
) -> ServiceResult<ApiResponse<MonthlySummaryDto>> {
    state.session_require_privilege(Permission::Finance)?;
    let query = query.0;

    let today = Utc::now().date_naive();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());
    if !(1..=12).contains(&month) {
        return Err(ServiceError::Validation(
            "Field 'month' must be between 1 and 12.".to_string(),
        ));
    }

    let summary = state.db.monthly_summary(year, month).await?;
    let average_ticket = if summary.total_sales_count > 0 {
        summary.total_revenue / summary.total_sales_count as f64
    } else {
        0.0
    };
    Ok(ApiResponse::ok(
        format!("Summary for {month}/{year}."),
        MonthlySummaryDto {
            month: format!("{month:02}/{year}"),
            total_revenue: summary.total_revenue,
            total_sales_count: summary.total_sales_count,
            total_items_sold: summary.total_items_sold,
            average_ticket,
        },
    ))
}

fn monthly_summary_docs(op: TransformOperation) -> TransformOperation {
    op.description("Revenue, sale count, items sold and average ticket for one month.")
        .tag("finances")
        .response::<200, Json<ApiResponse<MonthlySummaryDto>>>()
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DateRangeQuery {
    /// `YYYY-MM-DD`, defaults to thirty days ago.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, defaults to today.
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    fn resolve(&self) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().date_naive();
        let start = parse_date_or_default(self.start_date.as_deref(), today - Duration::days(30));
        let end = parse_date_or_default(self.end_date.as_deref(), today);
        (start, end)
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DailyRevenueDto {
    pub date: NaiveDate,
    pub revenue: f64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SalesFlowDto {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub sales_flow: Vec<DailyRevenueDto>,
}

async fn sales_flow_report(
    mut state: RequestState,
    query: Query<DateRangeQuery>,
) -> ServiceResult<ApiResponse<SalesFlowDto>> {
    state.session_require_privilege(Permission::Finance)?;

    let (start_date, end_date) = query.0.resolve();
    let flow = state.db.sales_flow(start_date, end_date).await?;

    Ok(ApiResponse::ok(
        "Sales flow retrieved successfully.",
        SalesFlowDto {
            start_date,
            end_date,
            sales_flow: flow
                .into_iter()
                .map(|(date, revenue)| DailyRevenueDto { date, revenue })
                .collect(),
        },
    ))
}

fn sales_flow_report_docs(op: TransformOperation) -> TransformOperation {
    op.description("Daily revenue within a date range.")
        .tag("finances")
        .response::<200, Json<ApiResponse<SalesFlowDto>>>()
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PaymentMethodSummaryDto {
    pub method: String,
    pub total_revenue: f64,
    pub sales_count: i64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PaymentMethodsDto {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_summary: Vec<PaymentMethodSummaryDto>,
}

async fn payment_methods_report(
    mut state: RequestState,
    query: Query<DateRangeQuery>,
) -> ServiceResult<ApiResponse<PaymentMethodsDto>> {
    state.session_require_privilege(Permission::Finance)?;

    let (start_date, end_date) = query.0.resolve();
    let summary = state.db.payment_methods_report(start_date, end_date).await?;

    Ok(ApiResponse::ok(
        "Payment methods report generated.",
        PaymentMethodsDto {
            start_date,
            end_date,
            payment_summary: summary
                .into_iter()
                .map(|(method, total_revenue, sales_count)| PaymentMethodSummaryDto {
                    method,
                    total_revenue,
                    sales_count,
                })
                .collect(),
        },
    ))
}

fn payment_methods_report_docs(op: TransformOperation) -> TransformOperation {
    op.description("Revenue grouped by payment method within a date range.")
        .tag("finances")
        .response::<200, Json<ApiResponse<PaymentMethodsDto>>>()
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ProfitMarginDto {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_revenue: f64,
    pub total_cost_of_goods: f64,
    pub gross_profit: f64,
    pub profit_margin_percent: f64,
}

async fn profit_margin_report(
    mut state: RequestState,
    query: Query<DateRangeQuery>,
) -> ServiceResult<ApiResponse<ProfitMarginDto>> {
    state.session_require_privilege(Permission::Finance)?;

    let (start_date, end_date) = query.0.resolve();
    let (total_revenue, total_cost) = state.db.profit_margin_report(start_date, end_date).await?;

    let gross_profit = total_revenue - total_cost;
    let profit_margin_percent = if total_revenue > 0.0 {
        gross_profit / total_revenue * 100.0
    } else {
        0.0
    };
    Ok(ApiResponse::ok(
        "Profit margin report generated.",
        ProfitMarginDto {
            start_date,
            end_date,
            total_revenue,
            total_cost_of_goods: total_cost,
            gross_profit,
            profit_margin_percent,
        },
    ))
}

fn profit_margin_report_docs(op: TransformOperation) -> TransformOperation {
    op.description(
        "Gross profit and margin within a date range, based on products with a purchase value.",
    )
    .tag("finances")
    .response::<200, Json<ApiResponse<ProfitMarginDto>>>()
}
