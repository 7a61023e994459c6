use crate::{
    config::AppConfig,
    entities::{cart, cart_item, product, product_image, Cart, CartItem, Product, ProductImage},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Cart repository adapter.
///
/// Owns all read/mutate access to a buyer's cart and its lines. Side
/// effects are confined to cart rows; nothing here touches orders,
/// addresses, or the payment processor.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

/// One cart line enriched with its product snapshot for display.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub image_url: String,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Fetches the buyer's cart without creating one.
    pub async fn get_cart(&self, buyer_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?)
    }

    /// Returns the buyer's cart, creating it lazily on first use.
    ///
    /// Creation is race-safe: the insert runs on-conflict-do-nothing
    /// against the unique index on `buyer_id`, then re-selects, so two
    /// concurrent calls converge on the same row.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, buyer_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = self.get_cart(buyer_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let new_cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            buyer_id: Set(buyer_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match Cart::insert(new_cart)
            .on_conflict(
                OnConflict::column(cart::Column::BuyerId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&*self.db)
            .await
        {
            Ok(_) => {}
            // Another request created the cart between our select and insert.
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        self.get_cart(buyer_id).await?.ok_or_else(|| {
            ServiceError::InternalError(format!("cart for buyer {} vanished after insert", buyer_id))
        })
    }

    /// Lists the buyer's cart lines enriched with product name, price, and
    /// a representative image, ordered by product name ascending.
    #[instrument(skip(self))]
    pub async fn list_lines(&self, buyer_id: Uuid) -> Result<Vec<CartLineView>, ServiceError> {
        let cart = match self.get_cart(buyer_id).await? {
            Some(cart) => cart,
            None => return Ok(Vec::new()),
        };

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = Product::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            let images = ProductImage::find()
                .filter(product_image::Column::ProductId.eq(product.id))
                .all(&*self.db)
                .await?;

            let image_url =
                resolve_line_image(&images, &product.name, &self.config.placeholder_image_base);

            lines.push(CartLineView {
                product_id: product.id,
                unit_price: product.price,
                quantity: item.quantity,
                subtotal: product.price * Decimal::from(item.quantity),
                image_url,
                name: product.name,
            });
        }

        lines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lines)
    }

    /// Computes the live cart total. Always re-derived from the stored
    /// lines; a client-supplied total is never trusted.
    pub async fn cart_total(&self, buyer_id: Uuid) -> Result<Decimal, ServiceError> {
        let lines = self.list_lines(buyer_id).await?;
        Ok(lines.iter().map(|line| line.subtotal).sum())
    }

    /// Adds a product to the cart, incrementing the quantity if the line
    /// already exists.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let cart = self.get_or_create_cart(buyer_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if let Some(item) = existing {
            let current = item.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(current + quantity);
            item.updated_at = Set(Utc::now());
            item.update(&*self.db).await?;
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&*self.db).await?;
        }

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id,
            })
            .await;

        info!(%buyer_id, %product_id, quantity, "Added item to cart");
        Ok(())
    }

    /// Overwrites the quantity of a cart line. A quantity of zero or less
    /// removes the line entirely; zero-quantity rows are never stored.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        buyer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return self.remove_item(buyer_id, product_id).await;
        }

        let cart = self
            .get_cart(buyer_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart is empty".to_string()))?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&*self.db).await?;
        Ok(())
    }

    /// Removes a line from the cart. Succeeds as a no-op when the line or
    /// the cart itself is absent.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, buyer_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let cart = match self.get_cart(buyer_id).await? {
            Some(cart) => cart,
            None => return Ok(()),
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes every line of the buyer's cart. The cart row itself is
    /// kept; a buyer with no cart is a successful no-op.
    #[instrument(skip(self))]
    pub async fn clear(&self, buyer_id: Uuid) -> Result<(), ServiceError> {
        let cart = match self.get_cart(buyer_id).await? {
            Some(cart) => cart,
            None => return Ok(()),
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(cart.id)).await;
        info!(%buyer_id, cart_id = %cart.id, "Cleared cart");
        Ok(())
    }
}

/// Picks the display image for a line: the flagged-principal image, else
/// the first by position, else a placeholder URL carrying the product name.
fn resolve_line_image(
    images: &[product_image::Model],
    product_name: &str,
    placeholder_base: &str,
) -> String {
    if let Some(principal) = images.iter().find(|img| img.is_principal) {
        return principal.url.clone();
    }
    if let Some(first) = images.iter().min_by_key(|img| img.position) {
        return first.url.clone();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(product_name.as_bytes()).collect();
    format!("{}?text={}", placeholder_base, encoded)
}
