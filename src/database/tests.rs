use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::error::ServiceError;
use crate::models::{Account, Client, Product, Sell, SoldItem, Stock, Supplier};
use crate::privileges::{AccountType, PrivilegeSet};

use super::{AppState, DatabaseConnection};

async fn connect(pool: PgPool) -> DatabaseConnection {
    let app_state = AppState::from_pool(pool, Config::from_env()).await;
    DatabaseConnection {
        connection: app_state.pool.acquire().await.unwrap(),
    }
}

fn test_account(email: &str, account_type: AccountType) -> Account {
    Account {
        id: 0,
        email: email.to_string(),
        password_hash: "$argon2i$m=4096,t=3,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
        account_type,
        privileges: PrivilegeSet::empty(),
        profile: serde_json::json!({}),
    }
}

fn test_product(item: &str, sale_value: f64) -> Product {
    Product {
        id: 0,
        item: item.to_string(),
        brand: None,
        purchase_value: None,
        sale_value,
        expiration_date: None,
        details: None,
        category: None,
        supplier_id: None,
    }
}

#[sqlx::test]
async fn account_crud(pool: PgPool) {
    let mut db = connect(pool).await;

    let stored = db
        .store_account(test_account("owner@market.com", AccountType::Owner))
        .await
        .unwrap();
    assert!(stored.id != 0);

    let loaded = db.get_account_by_id(stored.id).await.unwrap().unwrap();
    assert_eq!(loaded, stored);
    let by_email = db
        .get_account_by_email("owner@market.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email, stored);

    let mut updated = stored.clone();
    updated.email = "boss@market.com".to_string();
    updated.account_type = AccountType::FullManagement;
    db.store_account(updated.clone()).await.unwrap();
    let loaded = db.get_account_by_id(stored.id).await.unwrap().unwrap();
    assert_eq!(loaded, updated);

    db.delete_account(stored.id).await.unwrap();
    assert_eq!(db.get_account_by_id(stored.id).await.unwrap(), None);
    assert_eq!(
        db.delete_account(stored.id).await,
        Err(ServiceError::NotFound)
    );
}

#[sqlx::test]
async fn duplicate_emails_are_a_unique_violation(pool: PgPool) {
    let mut db = connect(pool).await;

    db.store_account(test_account("a@market.com", AccountType::Basic))
        .await
        .unwrap();
    let result = db
        .store_account(test_account("a@market.com", AccountType::Basic))
        .await;
    assert!(matches!(result, Err(ServiceError::Conflict(_))));
}

#[sqlx::test]
async fn caixa_register_number_lookup(pool: PgPool) {
    let mut db = connect(pool).await;

    let mut caixa = test_account("caixa1@market.com", AccountType::Caixa);
    caixa.profile = serde_json::json!({
        "register_number": 3,
        "operator_name": "Maria",
        "fast_lane": false,
        "preferential": false,
    });
    let caixa = db.store_account(caixa).await.unwrap();

    assert!(db.register_number_in_use(3, 0).await.unwrap());
    // the owning account itself is excluded
    assert!(!db.register_number_in_use(3, caixa.id).await.unwrap());
    assert!(!db.register_number_in_use(4, 0).await.unwrap());
}

#[sqlx::test]
async fn client_crud_and_search(pool: PgPool) {
    let mut db = connect(pool).await;

    let ana = db
        .store_client(Client {
            id: 0,
            cpf: "12345678901".to_string(),
            name: "Ana Souza".to_string(),
            nickname: Some("Aninha".to_string()),
            discounts: BTreeMap::new(),
            phone: None,
            notes: None,
        })
        .await
        .unwrap();
    db.store_client(Client {
        id: 0,
        cpf: "98765432100".to_string(),
        name: "Bruno Lima".to_string(),
        nickname: None,
        discounts: BTreeMap::new(),
        phone: None,
        notes: None,
    })
    .await
    .unwrap();

    let all = db.get_all_clients(None).await.unwrap();
    assert_eq!(all.len(), 2);

    // search matches cpf, name and nickname
    let by_name = db.get_all_clients(Some("souza")).await.unwrap();
    assert_eq!(by_name, vec![ana.clone()]);
    let by_nickname = db.get_all_clients(Some("aninha")).await.unwrap();
    assert_eq!(by_nickname, vec![ana.clone()]);
    let by_cpf = db.get_all_clients(Some("987654")).await.unwrap();
    assert_eq!(by_cpf.len(), 1);

    let mut updated = ana.clone();
    updated
        .discounts
        .insert("bebidas".to_string(), 5.0);
    db.store_client(updated.clone()).await.unwrap();
    let loaded = db.get_client_by_id(ana.id).await.unwrap().unwrap();
    assert_eq!(loaded.discounts.get("bebidas"), Some(&5.0));

    db.delete_client(ana.id).await.unwrap();
    assert_eq!(db.get_client_by_cpf("12345678901").await.unwrap(), None);
}

#[sqlx::test]
async fn search_terms_match_like_metacharacters_literally(pool: PgPool) {
    let mut db = connect(pool).await;

    db.store_client(Client {
        id: 0,
        cpf: "11111111111".to_string(),
        name: "Ana Souza".to_string(),
        nickname: None,
        discounts: BTreeMap::new(),
        phone: None,
        notes: None,
    })
    .await
    .unwrap();
    let natural = db
        .store_client(Client {
            id: 0,
            cpf: "22222222222".to_string(),
            name: "Mercearia 100% Natural".to_string(),
            nickname: None,
            discounts: BTreeMap::new(),
            phone: None,
            notes: None,
        })
        .await
        .unwrap();

    // "%" and "_" are literal characters, not wildcards
    let by_percent = db.get_all_clients(Some("100%")).await.unwrap();
    assert_eq!(by_percent, vec![natural]);
    assert!(db.get_all_clients(Some("_")).await.unwrap().is_empty());

    db.store_product(test_product("Cafe", 12.0)).await.unwrap();
    let filtered = db.list_products("caf_", "", 1, 20).await.unwrap();
    assert_eq!(filtered.total, 0);
}

#[sqlx::test]
async fn product_listing_aggregates_stock(pool: PgPool) {
    let mut db = connect(pool).await;

    let rice = db.store_product(test_product("Arroz", 20.0)).await.unwrap();
    let beans = db
        .store_product(test_product("Feijao", 8.0))
        .await
        .unwrap();

    let geral = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let deposito = db
        .store_stock(Stock {
            id: 0,
            name: "Deposito".to_string(),
            description: None,
        })
        .await
        .unwrap();

    db.add_product_to_stock(geral.id, rice.id, 7).await.unwrap();
    db.add_product_to_stock(deposito.id, rice.id, 5)
        .await
        .unwrap();

    let page = db.list_products("", "", 1, 20).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.pages, 1);
    assert_eq!(page.items, vec![(rice.clone(), 12), (beans.clone(), 0)]);

    let (_, quantity) = db.get_product_with_stock(rice.id).await.unwrap().unwrap();
    assert_eq!(quantity, 12);

    let filtered = db.list_products("arro", "", 1, 20).await.unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.items[0].0, rice);
}

#[sqlx::test]
async fn low_stock_report_orders_by_quantity(pool: PgPool) {
    let mut db = connect(pool).await;

    let a = db.store_product(test_product("A", 1.0)).await.unwrap();
    let b = db.store_product(test_product("B", 1.0)).await.unwrap();
    let c = db.store_product(test_product("C", 1.0)).await.unwrap();

    let stock = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    db.add_product_to_stock(stock.id, a.id, 2).await.unwrap();
    db.add_product_to_stock(stock.id, b.id, 50).await.unwrap();
    db.add_product_to_stock(stock.id, c.id, 9).await.unwrap();

    let report = db.low_stock_report(10, 1, 20).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.items, vec![(a, 2), (c, 9)]);
}

#[sqlx::test]
async fn stock_quantities_add_and_overwrite(pool: PgPool) {
    let mut db = connect(pool).await;

    let product = db.store_product(test_product("Leite", 6.0)).await.unwrap();
    let stock = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();

    // case-insensitive name lookup
    assert!(db.get_stock_by_name("geral").await.unwrap().is_some());

    db.add_product_to_stock(stock.id, product.id, 3)
        .await
        .unwrap();
    db.add_product_to_stock(stock.id, product.id, 4)
        .await
        .unwrap();
    let products = db.get_products_in_stock(stock.id).await.unwrap();
    assert_eq!(products, vec![(product.clone(), 7)]);

    assert!(db
        .set_product_quantity_in_stock(stock.id, product.id, 1)
        .await
        .unwrap());
    let products = db.get_products_in_stock(stock.id).await.unwrap();
    assert_eq!(products, vec![(product.clone(), 1)]);

    // no association, nothing to overwrite
    let other = db.store_product(test_product("Cafe", 12.0)).await.unwrap();
    assert!(!db
        .set_product_quantity_in_stock(stock.id, other.id, 5)
        .await
        .unwrap());
}

#[sqlx::test]
async fn supplier_delete_unlinks_products(pool: PgPool) {
    let mut db = connect(pool).await;

    let supplier = db
        .store_supplier(Supplier {
            id: 0,
            name: "Distribuidora Sul".to_string(),
            cnpj: None,
            contact_person: None,
            phone: None,
            email: None,
            address: None,
        })
        .await
        .unwrap();

    let mut product = test_product("Acucar", 4.0);
    product.supplier_id = Some(supplier.id);
    let product = db.store_product(product).await.unwrap();

    let linked = db.get_products_by_supplier(supplier.id).await.unwrap();
    assert_eq!(linked, vec![product.clone()]);

    db.delete_supplier(supplier.id).await.unwrap();
    let (orphan, _) = db.get_product_with_stock(product.id).await.unwrap().unwrap();
    assert_eq!(orphan.supplier_id, None);
}

fn test_sell(id: &str, product: &Product, quantity: i32) -> Sell {
    Sell {
        id: id.to_string(),
        cashier_id: "1".to_string(),
        operator: "Maria".to_string(),
        sell_time: Utc::now(),
        total_value: product.sale_value * f64::from(quantity),
        payment_method: "cash".to_string(),
        received_value: None,
        change: None,
        client_id: None,
        items: vec![SoldItem {
            product_id: product.id,
            product_name: product.item.clone(),
            quantity,
            unit_value: product.sale_value,
            total_value: product.sale_value * f64::from(quantity),
        }],
    }
}

#[sqlx::test]
async fn register_sell_debits_the_geral_stock(pool: PgPool) {
    let mut db = connect(pool).await;

    let product = db.store_product(test_product("Arroz", 20.0)).await.unwrap();
    let geral = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    db.add_product_to_stock(geral.id, product.id, 10)
        .await
        .unwrap();

    db.register_sell(test_sell("sale-1", &product, 4))
        .await
        .unwrap();
    let (_, quantity) = db.get_product_with_stock(product.id).await.unwrap().unwrap();
    assert_eq!(quantity, 6);

    let sells = db.get_all_sells().await.unwrap();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].id, "sale-1");
    assert_eq!(sells[0].items.len(), 1);
    assert_eq!(sells[0].items[0].quantity, 4);
}

#[sqlx::test]
async fn register_sell_is_all_or_nothing(pool: PgPool) {
    let mut db = connect(pool).await;

    let rice = db.store_product(test_product("Arroz", 20.0)).await.unwrap();
    let beans = db.store_product(test_product("Feijao", 8.0)).await.unwrap();
    let geral = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    db.add_product_to_stock(geral.id, rice.id, 10).await.unwrap();
    db.add_product_to_stock(geral.id, beans.id, 1).await.unwrap();

    let mut sell = test_sell("sale-2", &rice, 4);
    sell.items.push(SoldItem {
        product_id: beans.id,
        product_name: beans.item.clone(),
        quantity: 2,
        unit_value: beans.sale_value,
        total_value: beans.sale_value * 2.0,
    });

    let result = db.register_sell(sell).await;
    assert!(matches!(result, Err(ServiceError::Conflict(_))));

    // the rice debit was rolled back with the failed sale
    let (_, rice_quantity) = db.get_product_with_stock(rice.id).await.unwrap().unwrap();
    assert_eq!(rice_quantity, 10);
    assert!(db.get_all_sells().await.unwrap().is_empty());
}

#[sqlx::test]
async fn register_sell_requires_the_geral_stock(pool: PgPool) {
    let mut db = connect(pool).await;

    let product = db.store_product(test_product("Arroz", 20.0)).await.unwrap();
    let result = db.register_sell(test_sell("sale-3", &product, 1)).await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[sqlx::test]
async fn cashier_sells_filter_by_register_and_time(pool: PgPool) {
    let mut db = connect(pool).await;

    let product = db.store_product(test_product("Arroz", 20.0)).await.unwrap();
    let geral = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    db.add_product_to_stock(geral.id, product.id, 10)
        .await
        .unwrap();

    let mut sale_a = test_sell("sale-a", &product, 1);
    sale_a.cashier_id = "1".to_string();
    let mut sale_b = test_sell("sale-b", &product, 1);
    sale_b.cashier_id = "2".to_string();
    db.register_sell(sale_a).await.unwrap();
    db.register_sell(sale_b).await.unwrap();

    let register_one = db.get_sells_by_cashier("1", None).await.unwrap();
    assert_eq!(register_one.len(), 1);
    assert_eq!(register_one[0].id, "sale-a");

    let since_future = db
        .get_sells_by_cashier("1", Some(Utc::now() + chrono::Duration::days(1)))
        .await
        .unwrap();
    assert!(since_future.is_empty());
}

#[sqlx::test]
async fn finance_summaries_and_reports(pool: PgPool) {
    let mut db = connect(pool).await;

    let mut product = test_product("Arroz", 20.0);
    product.purchase_value = Some(12.0);
    let product = db.store_product(product).await.unwrap();
    let geral = db
        .store_stock(Stock {
            id: 0,
            name: "Geral".to_string(),
            description: None,
        })
        .await
        .unwrap();
    db.add_product_to_stock(geral.id, product.id, 100)
        .await
        .unwrap();

    let mut cash = test_sell("sale-cash", &product, 2);
    cash.payment_method = "cash".to_string();
    let mut card = test_sell("sale-card", &product, 3);
    card.payment_method = "card".to_string();
    db.register_sell(cash).await.unwrap();
    db.register_sell(card).await.unwrap();

    let today = Utc::now().date_naive();
    let summary = db.daily_summary(today).await.unwrap();
    assert_eq!(summary.total_sales_count, 2);
    assert_eq!(summary.total_items_sold, 5);
    assert!((summary.total_revenue - 100.0).abs() < f64::EPSILON);

    let monthly = db
        .monthly_summary(today.year(), today.month())
        .await
        .unwrap();
    assert_eq!(monthly.total_sales_count, 2);

    let flow = db.sales_flow(today, today).await.unwrap();
    assert_eq!(flow.len(), 1);
    assert_eq!(flow[0].0, today);
    assert!((flow[0].1 - 100.0).abs() < f64::EPSILON);

    let methods = db.payment_methods_report(today, today).await.unwrap();
    assert_eq!(methods.len(), 2);
    // ordered by revenue, the three unit card sale first
    assert_eq!(methods[0].0, "card");
    assert_eq!(methods[0].2, 1);

    let (revenue, cost) = db.profit_margin_report(today, today).await.unwrap();
    assert!((revenue - 100.0).abs() < f64::EPSILON);
    assert!((cost - 60.0).abs() < f64::EPSILON);

    let empty_day = db
        .daily_summary(today - chrono::Duration::days(90))
        .await
        .unwrap();
    assert_eq!(empty_day.total_sales_count, 0);
    assert_eq!(empty_day.total_revenue, 0.0);
}
