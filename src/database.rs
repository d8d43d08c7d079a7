use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Acquire, PgPool, Pool, Postgres};

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::privileges::AccountType;
use crate::token::TokenIssuer;

mod migration;
#[cfg(test)]
mod tests;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub config: Config,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub async fn connect(config: Config) -> AppState {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await
            .expect("connect to database");

        Self::from_pool(pool, config).await
    }

    pub async fn from_pool(pool: PgPool, config: Config) -> AppState {
        let migrator = Migrator::new(migration::postgresql_migrations())
            .await
            .expect("load migrations");
        migrator.run(&pool).await.expect("run migrations");

        let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_minutes);
        AppState {
            pool,
            config,
            tokens,
        }
    }
}

pub struct DatabaseConnection {
    pub connection: PoolConnection<Postgres>,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    email: String,
    password_hash: String,
    account_type: String,
    privileges: Json<crate::privileges::PrivilegeSet>,
    profile: serde_json::Value,
}

impl TryFrom<AccountRow> for models::Account {
    type Error = ServiceError;

    fn try_from(row: AccountRow) -> ServiceResult<models::Account> {
        Ok(models::Account {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            account_type: AccountType::parse(&row.account_type)?,
            privileges: row.privileges.0,
            profile: row.profile,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClientRow {
    id: i64,
    cpf: String,
    name: String,
    nickname: Option<String>,
    discounts: Json<std::collections::BTreeMap<String, f64>>,
    phone: Option<String>,
    notes: Option<String>,
}

impl From<ClientRow> for models::Client {
    fn from(row: ClientRow) -> models::Client {
        models::Client {
            id: row.id,
            cpf: row.cpf,
            name: row.name,
            nickname: row.nickname,
            discounts: row.discounts.0,
            phone: row.phone,
            notes: row.notes,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    item: String,
    brand: Option<String>,
    purchase_value: Option<f64>,
    sale_value: f64,
    expiration_date: Option<NaiveDate>,
    details: Option<serde_json::Value>,
    category: Option<String>,
    supplier_id: Option<i64>,
}

impl From<ProductRow> for models::Product {
    fn from(row: ProductRow) -> models::Product {
        models::Product {
            id: row.id,
            item: row.item,
            brand: row.brand,
            purchase_value: row.purchase_value,
            sale_value: row.sale_value,
            expiration_date: row.expiration_date,
            details: row.details,
            category: row.category,
            supplier_id: row.supplier_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductWithStockRow {
    #[sqlx(flatten)]
    product: ProductRow,
    quantity_in_stock: i64,
}

#[derive(sqlx::FromRow)]
struct SupplierRow {
    id: i64,
    name: String,
    cnpj: Option<String>,
    contact_person: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
}

impl From<SupplierRow> for models::Supplier {
    fn from(row: SupplierRow) -> models::Supplier {
        models::Supplier {
            id: row.id,
            name: row.name,
            cnpj: row.cnpj,
            contact_person: row.contact_person,
            phone: row.phone,
            email: row.email,
            address: row.address,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StockRow {
    id: i64,
    name: String,
    description: Option<String>,
}

impl From<StockRow> for models::Stock {
    fn from(row: StockRow) -> models::Stock {
        models::Stock {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SellRow {
    id: String,
    cashier_id: String,
    operator: String,
    sell_time: DateTime<Utc>,
    total_value: f64,
    payment_method: String,
    received_value: Option<f64>,
    change: Option<f64>,
    client_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct SoldItemRow {
    sell_id: String,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_value: f64,
    total_value: f64,
}

/// Pages of a paginated listing.
#[derive(Debug, PartialEq, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}

/// Escape `%`, `_` and `\` so a user supplied search term matches literally
/// inside an ILIKE pattern.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn page_count(total: i64, per_page: i64) -> i64 {
    if total == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

/// Aggregated revenue numbers for a day or month.
#[derive(Debug, PartialEq, Clone)]
pub struct FinanceSummary {
    pub total_revenue: f64,
    pub total_sales_count: i64,
    pub total_items_sold: i64,
}

impl DatabaseConnection {
    // ------------------------------------------------------------------
    // accounts

    pub async fn get_all_accounts(&mut self) -> ServiceResult<Vec<models::Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, account_type, privileges, profile
             FROM accounts ORDER BY id ASC",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(models::Account::try_from).collect()
    }

    pub async fn get_account_by_id(&mut self, id: i64) -> ServiceResult<Option<models::Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, account_type, privileges, profile
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(models::Account::try_from).transpose()
    }

    pub async fn get_account_by_email(
        &mut self,
        email: &str,
    ) -> ServiceResult<Option<models::Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, account_type, privileges, profile
             FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(models::Account::try_from).transpose()
    }

    /// Insert (id == 0) or update an account record.
    pub async fn store_account(
        &mut self,
        mut account: models::Account,
    ) -> ServiceResult<models::Account> {
        if account.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO accounts (email, password_hash, account_type, privileges, profile)
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.account_type.as_str())
            .bind(Json(&account.privileges))
            .bind(&account.profile)
            .fetch_one(&mut *self.connection)
            .await?;
            account.id = id;
        } else {
            let result = sqlx::query(
                "UPDATE accounts
                 SET email = $2, password_hash = $3, account_type = $4, privileges = $5, profile = $6
                 WHERE id = $1",
            )
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.account_type.as_str())
            .bind(Json(&account.privileges))
            .bind(&account.profile)
            .execute(&mut *self.connection)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::NotFound);
            }
        }

        Ok(account)
    }

    pub async fn delete_account(&mut self, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// Check whether some other account already uses a CAIXA register number.
    pub async fn register_number_in_use(
        &mut self,
        register_number: i64,
        exclude_account_id: i64,
    ) -> ServiceResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                SELECT 1 FROM accounts
                WHERE profile->>'register_number' = $1 AND id <> $2
             )",
        )
        .bind(register_number.to_string())
        .bind(exclude_account_id)
        .fetch_one(&mut *self.connection)
        .await?;

        Ok(exists)
    }

    // ------------------------------------------------------------------
    // clients

    pub async fn get_all_clients(
        &mut self,
        search: Option<&str>,
    ) -> ServiceResult<Vec<models::Client>> {
        let pattern = search.map(like_pattern).unwrap_or_else(|| "%".to_string());

        let rows = sqlx::query_as::<_, ClientRow>(
            "SELECT id, cpf, name, nickname, discounts, phone, notes FROM clients
             WHERE cpf ILIKE $1 OR name ILIKE $1 OR COALESCE(nickname, '') ILIKE $1
             ORDER BY id ASC",
        )
        .bind(pattern)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(models::Client::from).collect())
    }

    pub async fn get_client_by_id(&mut self, id: i64) -> ServiceResult<Option<models::Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, cpf, name, nickname, discounts, phone, notes FROM clients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(models::Client::from))
    }

    pub async fn get_client_by_cpf(&mut self, cpf: &str) -> ServiceResult<Option<models::Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, cpf, name, nickname, discounts, phone, notes FROM clients WHERE cpf = $1",
        )
        .bind(cpf)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(models::Client::from))
    }

    pub async fn store_client(
        &mut self,
        mut client: models::Client,
    ) -> ServiceResult<models::Client> {
        if client.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO clients (cpf, name, nickname, discounts, phone, notes)
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(&client.cpf)
            .bind(&client.name)
            .bind(&client.nickname)
            .bind(Json(&client.discounts))
            .bind(&client.phone)
            .bind(&client.notes)
            .fetch_one(&mut *self.connection)
            .await?;
            client.id = id;
        } else {
            let result = sqlx::query(
                "UPDATE clients
                 SET name = $2, nickname = $3, discounts = $4, phone = $5, notes = $6
                 WHERE id = $1",
            )
            .bind(client.id)
            .bind(&client.name)
            .bind(&client.nickname)
            .bind(Json(&client.discounts))
            .bind(&client.phone)
            .bind(&client.notes)
            .execute(&mut *self.connection)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::NotFound);
            }
        }

        Ok(client)
    }

    pub async fn delete_client(&mut self, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // suppliers

    pub async fn get_all_suppliers(&mut self) -> ServiceResult<Vec<models::Supplier>> {
        let rows = sqlx::query_as::<_, SupplierRow>(
            "SELECT id, name, cnpj, contact_person, phone, email, address
             FROM suppliers ORDER BY name ASC",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(models::Supplier::from).collect())
    }

    pub async fn get_supplier_by_id(&mut self, id: i64) -> ServiceResult<Option<models::Supplier>> {
        let row = sqlx::query_as::<_, SupplierRow>(
            "SELECT id, name, cnpj, contact_person, phone, email, address
             FROM suppliers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(models::Supplier::from))
    }

    pub async fn get_supplier_by_name(
        &mut self,
        name: &str,
    ) -> ServiceResult<Option<models::Supplier>> {
        let row = sqlx::query_as::<_, SupplierRow>(
            "SELECT id, name, cnpj, contact_person, phone, email, address
             FROM suppliers WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(models::Supplier::from))
    }

    pub async fn store_supplier(
        &mut self,
        mut supplier: models::Supplier,
    ) -> ServiceResult<models::Supplier> {
        if supplier.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO suppliers (name, cnpj, contact_person, phone, email, address)
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(&supplier.name)
            .bind(&supplier.cnpj)
            .bind(&supplier.contact_person)
            .bind(&supplier.phone)
            .bind(&supplier.email)
            .bind(&supplier.address)
            .fetch_one(&mut *self.connection)
            .await?;
            supplier.id = id;
        } else {
            let result = sqlx::query(
                "UPDATE suppliers
                 SET name = $2, cnpj = $3, contact_person = $4, phone = $5, email = $6, address = $7
                 WHERE id = $1",
            )
            .bind(supplier.id)
            .bind(&supplier.name)
            .bind(&supplier.cnpj)
            .bind(&supplier.contact_person)
            .bind(&supplier.phone)
            .bind(&supplier.email)
            .bind(&supplier.address)
            .execute(&mut *self.connection)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::NotFound);
            }
        }

        Ok(supplier)
    }

    /// Delete a supplier. Its products stay in the catalog, the foreign key
    /// clears their `supplier_id`.
    pub async fn delete_supplier(&mut self, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    pub async fn get_products_by_supplier(
        &mut self,
        supplier_id: i64,
    ) -> ServiceResult<Vec<models::Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, item, brand, purchase_value, sale_value, expiration_date, details, category, supplier_id
             FROM products WHERE supplier_id = $1 ORDER BY item ASC",
        )
        .bind(supplier_id)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(models::Product::from).collect())
    }

    // ------------------------------------------------------------------
    // products

    /// Paginated catalog listing with aggregated stock quantity.
    /// Empty filters match everything.
    pub async fn list_products(
        &mut self,
        item_filter: &str,
        brand_filter: &str,
        page: i64,
        per_page: i64,
    ) -> ServiceResult<Page<(models::Product, i64)>> {
        let item_pattern = like_pattern(item_filter);
        let brand_pattern = like_pattern(brand_filter);

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM products
             WHERE item ILIKE $1 AND COALESCE(brand, '') ILIKE $2",
        )
        .bind(&item_pattern)
        .bind(&brand_pattern)
        .fetch_one(&mut *self.connection)
        .await?;

        let rows = sqlx::query_as::<_, ProductWithStockRow>(
            "SELECT p.id, p.item, p.brand, p.purchase_value, p.sale_value,
                    p.expiration_date, p.details, p.category, p.supplier_id,
                    COALESCE(s.total_stock, 0) AS quantity_in_stock
             FROM products p
             LEFT JOIN (
                SELECT product_id, SUM(quantity)::BIGINT AS total_stock
                FROM stock_items GROUP BY product_id
             ) s ON s.product_id = p.id
             WHERE p.item ILIKE $1 AND COALESCE(p.brand, '') ILIKE $2
             ORDER BY p.id ASC LIMIT $3 OFFSET $4",
        )
        .bind(&item_pattern)
        .bind(&brand_pattern)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(|r| (models::Product::from(r.product), r.quantity_in_stock))
                .collect(),
            total,
            pages: page_count(total, per_page),
            current_page: page,
        })
    }

    pub async fn get_product_with_stock(
        &mut self,
        id: i64,
    ) -> ServiceResult<Option<(models::Product, i64)>> {
        let row = sqlx::query_as::<_, ProductWithStockRow>(
            "SELECT p.id, p.item, p.brand, p.purchase_value, p.sale_value,
                    p.expiration_date, p.details, p.category, p.supplier_id,
                    COALESCE((
                        SELECT SUM(quantity)::BIGINT FROM stock_items WHERE product_id = p.id
                    ), 0) AS quantity_in_stock
             FROM products p WHERE p.id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(|r| (models::Product::from(r.product), r.quantity_in_stock)))
    }

    pub async fn store_product(
        &mut self,
        mut product: models::Product,
    ) -> ServiceResult<models::Product> {
        if product.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO products (item, brand, purchase_value, sale_value, expiration_date, details, category, supplier_id)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(&product.item)
            .bind(&product.brand)
            .bind(product.purchase_value)
            .bind(product.sale_value)
            .bind(product.expiration_date)
            .bind(&product.details)
            .bind(&product.category)
            .bind(product.supplier_id)
            .fetch_one(&mut *self.connection)
            .await?;
            product.id = id;
        } else {
            let result = sqlx::query(
                "UPDATE products
                 SET item = $2, brand = $3, purchase_value = $4, sale_value = $5,
                     expiration_date = $6, details = $7, category = $8, supplier_id = $9
                 WHERE id = $1",
            )
            .bind(product.id)
            .bind(&product.item)
            .bind(&product.brand)
            .bind(product.purchase_value)
            .bind(product.sale_value)
            .bind(product.expiration_date)
            .bind(&product.details)
            .bind(&product.category)
            .bind(product.supplier_id)
            .execute(&mut *self.connection)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::NotFound);
            }
        }

        Ok(product)
    }

    pub async fn delete_product(&mut self, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// Products whose summed quantity across all stocks is at or below the
    /// given threshold. Products without any stock row are not listed.
    pub async fn low_stock_report(
        &mut self,
        threshold: i64,
        page: i64,
        per_page: i64,
    ) -> ServiceResult<Page<(models::Product, i64)>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (
                SELECT product_id FROM stock_items
                GROUP BY product_id HAVING SUM(quantity) <= $1
             ) low",
        )
        .bind(threshold)
        .fetch_one(&mut *self.connection)
        .await?;

        let rows = sqlx::query_as::<_, ProductWithStockRow>(
            "SELECT p.id, p.item, p.brand, p.purchase_value, p.sale_value,
                    p.expiration_date, p.details, p.category, p.supplier_id,
                    s.total_stock AS quantity_in_stock
             FROM products p
             JOIN (
                SELECT product_id, SUM(quantity)::BIGINT AS total_stock
                FROM stock_items GROUP BY product_id HAVING SUM(quantity) <= $1
             ) s ON s.product_id = p.id
             ORDER BY s.total_stock ASC LIMIT $2 OFFSET $3",
        )
        .bind(threshold)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(|r| (models::Product::from(r.product), r.quantity_in_stock))
                .collect(),
            total,
            pages: page_count(total, per_page),
            current_page: page,
        })
    }

    /// Products expiring within the next `days_ahead` days (inclusive).
    pub async fn expiring_report(
        &mut self,
        days_ahead: i64,
        page: i64,
        per_page: i64,
    ) -> ServiceResult<Page<(models::Product, i64)>> {
        let today = Utc::now().date_naive();
        let limit_date = today + chrono::Duration::days(days_ahead);

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM products
             WHERE expiration_date IS NOT NULL AND expiration_date BETWEEN $1 AND $2",
        )
        .bind(today)
        .bind(limit_date)
        .fetch_one(&mut *self.connection)
        .await?;

        let rows = sqlx::query_as::<_, ProductWithStockRow>(
            "SELECT p.id, p.item, p.brand, p.purchase_value, p.sale_value,
                    p.expiration_date, p.details, p.category, p.supplier_id,
                    COALESCE(s.total_stock, 0) AS quantity_in_stock
             FROM products p
             LEFT JOIN (
                SELECT product_id, SUM(quantity)::BIGINT AS total_stock
                FROM stock_items GROUP BY product_id
             ) s ON s.product_id = p.id
             WHERE p.expiration_date IS NOT NULL AND p.expiration_date BETWEEN $1 AND $2
             ORDER BY p.expiration_date ASC LIMIT $3 OFFSET $4",
        )
        .bind(today)
        .bind(limit_date)
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(|r| (models::Product::from(r.product), r.quantity_in_stock))
                .collect(),
            total,
            pages: page_count(total, per_page),
            current_page: page,
        })
    }

    // ------------------------------------------------------------------
    // stocks

    pub async fn get_all_stocks(&mut self) -> ServiceResult<Vec<models::Stock>> {
        let rows = sqlx::query_as::<_, StockRow>(
            "SELECT id, name, description FROM stocks ORDER BY name ASC",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows.into_iter().map(models::Stock::from).collect())
    }

    pub async fn get_stock_by_id(&mut self, id: i64) -> ServiceResult<Option<models::Stock>> {
        let row =
            sqlx::query_as::<_, StockRow>("SELECT id, name, description FROM stocks WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.connection)
                .await?;

        Ok(row.map(models::Stock::from))
    }

    /// Case-insensitive lookup, stock names are unique regardless of case.
    pub async fn get_stock_by_name(&mut self, name: &str) -> ServiceResult<Option<models::Stock>> {
        let row = sqlx::query_as::<_, StockRow>(
            "SELECT id, name, description FROM stocks WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(models::Stock::from))
    }

    pub async fn store_stock(&mut self, mut stock: models::Stock) -> ServiceResult<models::Stock> {
        if stock.id == 0 {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO stocks (name, description) VALUES ($1, $2) RETURNING id",
            )
            .bind(&stock.name)
            .bind(&stock.description)
            .fetch_one(&mut *self.connection)
            .await?;
            stock.id = id;
        } else {
            let result = sqlx::query("UPDATE stocks SET name = $2, description = $3 WHERE id = $1")
                .bind(stock.id)
                .bind(&stock.name)
                .bind(&stock.description)
                .execute(&mut *self.connection)
                .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::NotFound);
            }
        }

        Ok(stock)
    }

    pub async fn delete_stock(&mut self, id: i64) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM stocks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// Add a product to a stock or increment its quantity when the relation
    /// already exists.
    pub async fn add_product_to_stock(
        &mut self,
        stock_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO stock_items (stock_id, product_id, quantity) VALUES ($1, $2, $3)
             ON CONFLICT (stock_id, product_id)
             DO UPDATE SET quantity = stock_items.quantity + EXCLUDED.quantity",
        )
        .bind(stock_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.connection)
        .await?;

        Ok(())
    }

    /// Overwrite the exact quantity. Returns false when the product is not
    /// associated with the stock.
    pub async fn set_product_quantity_in_stock(
        &mut self,
        stock_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> ServiceResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_items SET quantity = $3 WHERE stock_id = $1 AND product_id = $2",
        )
        .bind(stock_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.connection)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_products_in_stock(
        &mut self,
        stock_id: i64,
    ) -> ServiceResult<Vec<(models::Product, i32)>> {
        #[derive(sqlx::FromRow)]
        struct RowWithQuantity {
            #[sqlx(flatten)]
            product: ProductRow,
            quantity: i32,
        }

        let rows = sqlx::query_as::<_, RowWithQuantity>(
            "SELECT p.id, p.item, p.brand, p.purchase_value, p.sale_value,
                    p.expiration_date, p.details, p.category, p.supplier_id, si.quantity
             FROM products p
             JOIN stock_items si ON si.product_id = p.id
             WHERE si.stock_id = $1 ORDER BY p.item ASC",
        )
        .bind(stock_id)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (models::Product::from(r.product), r.quantity))
            .collect())
    }

    // ------------------------------------------------------------------
    // finances

    /// Record a sale and debit its items from the "Geral" stock location.
    ///
    /// The whole operation runs in one transaction with the stock row
    /// locked, so concurrent sales cannot oversell. Any line with
    /// insufficient stock aborts the entire sale.
    pub async fn register_sell(&mut self, sell: models::Sell) -> ServiceResult<models::Sell> {
        let mut tx = self.connection.begin().await?;

        let stock: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM stocks WHERE name = 'Geral' FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?;

        let Some((stock_id,)) = stock else {
            return Err(ServiceError::Validation(
                "Stock location 'Geral' does not exist. Sale registration is blocked.".to_string(),
            ));
        };

        for item in &sell.items {
            let result = sqlx::query(
                "UPDATE stock_items SET quantity = quantity - $3
                 WHERE stock_id = $1 AND product_id = $2 AND quantity >= $3",
            )
            .bind(stock_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(ServiceError::Conflict(format!(
                    "Insufficient stock for product '{}'.",
                    item.product_name
                )));
            }
        }

        sqlx::query(
            "INSERT INTO sells (id, cashier_id, operator, sell_time, total_value,
                                payment_method, received_value, change, client_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&sell.id)
        .bind(&sell.cashier_id)
        .bind(&sell.operator)
        .bind(sell.sell_time)
        .bind(sell.total_value)
        .bind(&sell.payment_method)
        .bind(sell.received_value)
        .bind(sell.change)
        .bind(sell.client_id)
        .execute(&mut *tx)
        .await?;

        for item in &sell.items {
            sqlx::query(
                "INSERT INTO sold_items (sell_id, product_id, product_name, quantity, unit_value, total_value)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&sell.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_value)
            .bind(item.total_value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(sell)
    }

    pub async fn get_all_sells(&mut self) -> ServiceResult<Vec<models::Sell>> {
        let rows = sqlx::query_as::<_, SellRow>(
            "SELECT id, cashier_id, operator, sell_time, total_value, payment_method,
                    received_value, change, client_id
             FROM sells ORDER BY sell_time DESC",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        self.attach_sold_items(rows).await
    }

    pub async fn get_sells_by_cashier(
        &mut self,
        cashier_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> ServiceResult<Vec<models::Sell>> {
        let rows = sqlx::query_as::<_, SellRow>(
            "SELECT id, cashier_id, operator, sell_time, total_value, payment_method,
                    received_value, change, client_id
             FROM sells
             WHERE cashier_id = $1 AND ($2::timestamptz IS NULL OR sell_time >= $2)
             ORDER BY sell_time DESC",
        )
        .bind(cashier_id)
        .bind(since)
        .fetch_all(&mut *self.connection)
        .await?;

        self.attach_sold_items(rows).await
    }

    async fn attach_sold_items(&mut self, rows: Vec<SellRow>) -> ServiceResult<Vec<models::Sell>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let item_rows = sqlx::query_as::<_, SoldItemRow>(
            "SELECT sell_id, product_id, product_name, quantity, unit_value, total_value
             FROM sold_items WHERE sell_id = ANY($1) ORDER BY id ASC",
        )
        .bind(&ids)
        .fetch_all(&mut *self.connection)
        .await?;

        let mut sells: Vec<models::Sell> = rows
            .into_iter()
            .map(|r| models::Sell {
                id: r.id,
                cashier_id: r.cashier_id,
                operator: r.operator,
                sell_time: r.sell_time,
                total_value: r.total_value,
                payment_method: r.payment_method,
                received_value: r.received_value,
                change: r.change,
                client_id: r.client_id,
                items: Vec::new(),
            })
            .collect();

        for item in item_rows {
            if let Some(sell) = sells.iter_mut().find(|s| s.id == item.sell_id) {
                sell.items.push(models::SoldItem {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_value: item.unit_value,
                    total_value: item.total_value,
                });
            }
        }

        Ok(sells)
    }

    pub async fn daily_summary(&mut self, date: NaiveDate) -> ServiceResult<FinanceSummary> {
        let (total_revenue, total_sales_count, total_items_sold): (f64, i64, i64) =
            sqlx::query_as(
                "SELECT
                    COALESCE((SELECT SUM(total_value) FROM sells WHERE sell_time::date = $1), 0),
                    (SELECT COUNT(*) FROM sells WHERE sell_time::date = $1),
                    COALESCE((
                        SELECT SUM(si.quantity)::BIGINT FROM sold_items si
                        JOIN sells s ON s.id = si.sell_id
                        WHERE s.sell_time::date = $1
                    ), 0)",
            )
            .bind(date)
            .fetch_one(&mut *self.connection)
            .await?;

        Ok(FinanceSummary {
            total_revenue,
            total_sales_count,
            total_items_sold,
        })
    }

    pub async fn monthly_summary(&mut self, year: i32, month: u32) -> ServiceResult<FinanceSummary> {
        let (total_revenue, total_sales_count, total_items_sold): (f64, i64, i64) =
            sqlx::query_as(
                "SELECT
                    COALESCE((
                        SELECT SUM(total_value) FROM sells
                        WHERE date_part('year', sell_time)::int = $1
                          AND date_part('month', sell_time)::int = $2
                    ), 0),
                    (SELECT COUNT(*) FROM sells
                     WHERE date_part('year', sell_time)::int = $1
                       AND date_part('month', sell_time)::int = $2),
                    COALESCE((
                        SELECT SUM(si.quantity)::BIGINT FROM sold_items si
                        JOIN sells s ON s.id = si.sell_id
                        WHERE date_part('year', s.sell_time)::int = $1
                          AND date_part('month', s.sell_time)::int = $2
                    ), 0)",
            )
            .bind(year)
            .bind(month as i32)
            .fetch_one(&mut *self.connection)
            .await?;

        Ok(FinanceSummary {
            total_revenue,
            total_sales_count,
            total_items_sold,
        })
    }

    /// Revenue per day within the (inclusive) date range.
    pub async fn sales_flow(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ServiceResult<Vec<(NaiveDate, f64)>> {
        let rows: Vec<(NaiveDate, f64)> = sqlx::query_as(
            "SELECT sell_time::date AS sale_date, SUM(total_value)
             FROM sells WHERE sell_time::date BETWEEN $1 AND $2
             GROUP BY sale_date ORDER BY sale_date ASC",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows)
    }

    /// Revenue and sale count grouped by payment method.
    pub async fn payment_methods_report(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ServiceResult<Vec<(String, f64, i64)>> {
        let rows: Vec<(String, f64, i64)> = sqlx::query_as(
            "SELECT payment_method, SUM(total_value), COUNT(*)
             FROM sells WHERE sell_time::date BETWEEN $1 AND $2
             GROUP BY payment_method ORDER BY SUM(total_value) DESC",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&mut *self.connection)
        .await?;

        Ok(rows)
    }

    /// Revenue and cost of goods within the range, products without a
    /// purchase value are skipped.
    pub async fn profit_margin_report(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> ServiceResult<(f64, f64)> {
        let (total_revenue, total_cost): (f64, f64) = sqlx::query_as(
            "SELECT COALESCE(SUM(si.total_value), 0),
                    COALESCE(SUM(si.quantity * p.purchase_value), 0)
             FROM sold_items si
             JOIN sells s ON s.id = si.sell_id
             JOIN products p ON p.id = si.product_id
             WHERE p.purchase_value IS NOT NULL
               AND s.sell_time::date BETWEEN $1 AND $2",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *self.connection)
        .await?;

        Ok((total_revenue, total_cost))
    }
}
