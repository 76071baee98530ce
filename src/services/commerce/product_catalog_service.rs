use crate::{
    entities::{category, product, Category, CategoryModel, Product, ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;
pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 10;

/// Product and category catalog. Rows referenced by orders are never
/// removed; deleting only clears `active`.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new product
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        ensure_non_negative_price(input.price)?;
        self.ensure_unique_sku(&input.sku, None).await?;
        if let Some(category_id) = input.category_id {
            self.get_category(category_id).await?;
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            sku: Set(input.sku),
            price: Set(input.price),
            stock_quantity: Set(input.stock_quantity.unwrap_or(0)),
            min_stock_level: Set(input.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL)),
            category_id: Set(input.category_id),
            brand: Set(input.brand),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = product.insert(&*self.db).await?;
        info!(product_id = %product.id, sku = %product.sku, "Created product");
        Ok(product)
    }

    /// Update an existing product
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        if let Some(ref sku) = input.sku {
            self.ensure_unique_sku(sku, Some(product_id)).await?;
        }
        if let Some(price) = input.price {
            ensure_non_negative_price(price)?;
        }
        if let Some(category_id) = input.category_id {
            self.get_category(category_id).await?;
        }

        let product = self.get_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(sku) = input.sku {
            active.sku = Set(sku);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(min_stock_level) = input.min_stock_level {
            active.min_stock_level = Set(min_stock_level);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(brand) = input.brand {
            active.brand = Set(Some(brand));
        }
        if let Some(is_active) = input.active {
            active.active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(%product_id, "Updated product");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    /// Inactive products are listed only when `include_inactive` is set.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductQuery,
        include_inactive: bool,
    ) -> Result<ProductListResult, ServiceError> {
        let mut select = Product::find();

        if !(include_inactive && query.include_inactive) {
            select = select.filter(product::Column::Active.eq(true));
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            select = select.filter(
                product::Column::Name
                    .contains(search)
                    .or(product::Column::Sku.contains(search)),
            );
        }
        if let Some(category_id) = query.category_id {
            select = select.filter(product::Column::CategoryId.eq(category_id));
        }

        let total = select.clone().count(&*self.db).await?;
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let products = select
            .order_by_asc(product::Column::Name)
            .limit(limit)
            .offset(offset)
            .all(&*self.db)
            .await?;

        Ok(ProductListResult { products, total })
    }

    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let product = self.get_product(product_id).await?;
        let mut active: product::ActiveModel = product.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(%product_id, "Deactivated product");
        Ok(product)
    }

    /// Admin restock. Sets the absolute quantity; negative values are rejected.
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        product_id: Uuid,
        stock_quantity: i32,
    ) -> Result<ProductModel, ServiceError> {
        if stock_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "stock_quantity cannot be negative".to_string(),
            ));
        }

        let result = Product::update_many()
            .col_expr(product::Column::StockQuantity, Expr::value(stock_quantity))
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Product", product_id));
        }

        info!(%product_id, stock_quantity, "Stock level set");
        self.get_product(product_id).await
    }

    /// Active products at or below their minimum stock level.
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Active.eq(true))
            .filter(
                Expr::col(product::Column::StockQuantity)
                    .lte(Expr::col(product::Column::MinStockLevel)),
            )
            .order_by_asc(product::Column::StockQuantity)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        input.validate()?;
        let name = input.name.trim().to_string();
        let exists = Category::find()
            .filter(category::Column::Name.eq(name.as_str()))
            .one(&*self.db)
            .await?;
        if exists.is_some() {
            return Err(ServiceError::Conflict(format!(
                "category {} already exists",
                name
            )));
        }

        let now = Utc::now();
        let category = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(input.description),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(category_id = %category.id, "Created category");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn get_category(&self, category_id: Uuid) -> Result<CategoryModel, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Category", category_id))
    }

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .filter(category::Column::Active.eq(true))
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn deactivate_category(
        &self,
        category_id: Uuid,
    ) -> Result<CategoryModel, ServiceError> {
        let category = self.get_category(category_id).await?;
        let mut active: category::ActiveModel = category.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now());

        let category = active.update(&*self.db).await?;
        info!(%category_id, "Deactivated category");
        Ok(category)
    }

    async fn ensure_unique_sku(
        &self,
        sku: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find().filter(product::Column::Sku.eq(sku));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!("SKU {} already exists", sku)));
        }

        Ok(())
    }
}

fn ensure_non_negative_price(price: Decimal) -> Result<(), ServiceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ServiceError::ValidationError(
            "price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
}

/// Input for updating a product
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub active: Option<bool>,
}

/// Body for an absolute stock update
#[derive(Debug, Clone, Deserialize)]
pub struct SetStockInput {
    pub stock_quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ProductListResult {
    pub products: Vec<ProductModel>,
    pub total: u64,
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}
