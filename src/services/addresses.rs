use crate::{
    entities::{address, Address},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Address registry.
///
/// Deduplicates and persists shipping addresses per buyer. Every mutation
/// filters by both address id and buyer id, so an address not owned by the
/// caller behaves exactly like one that does not exist.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Shipping address fields as submitted by the buyer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub recipient_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    pub region: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

impl AddressInput {
    /// Trims every field. Comparison and storage always operate on the
    /// normalized form.
    fn normalized(&self) -> AddressInput {
        AddressInput {
            recipient_name: self.recipient_name.trim().to_string(),
            phone: self
                .phone
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            street: self.street.trim().to_string(),
            city: self.city.trim().to_string(),
            region: self.region.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
        }
    }
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Saves a shipping address, returning the id of an existing identical
    /// row when one is found.
    ///
    /// The dedup key is (buyer, street, city, region, postal code,
    /// country); recipient name and phone do not participate.
    #[instrument(skip(self, input))]
    pub async fn save(&self, buyer_id: Uuid, input: AddressInput) -> Result<Uuid, ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let existing = Address::find()
            .filter(address::Column::BuyerId.eq(buyer_id))
            .filter(address::Column::Street.eq(input.street.clone()))
            .filter(address::Column::City.eq(input.city.clone()))
            .filter(address::Column::Region.eq(input.region.clone()))
            .filter(address::Column::PostalCode.eq(input.postal_code.clone()))
            .filter(address::Column::Country.eq(input.country.clone()))
            .one(&*self.db)
            .await?;

        if let Some(found) = existing {
            info!(%buyer_id, address_id = %found.id, "Reusing existing address");
            return Ok(found.id);
        }

        let now = Utc::now();
        let address_id = Uuid::new_v4();
        let row = address::ActiveModel {
            id: Set(address_id),
            buyer_id: Set(buyer_id),
            recipient_name: Set(input.recipient_name),
            phone: Set(input.phone),
            street: Set(input.street),
            city: Set(input.city),
            region: Set(input.region),
            postal_code: Set(input.postal_code),
            country: Set(input.country),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::AddressSaved {
                buyer_id,
                address_id,
            })
            .await;

        info!(%buyer_id, %address_id, "Saved new address");
        Ok(address_id)
    }

    /// Updates an address in place. Filtered by owner, so another buyer's
    /// address reports `NotFound` rather than revealing its existence.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        buyer_id: Uuid,
        address_id: Uuid,
        input: AddressInput,
    ) -> Result<(), ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let existing = self
            .owned_address(buyer_id, address_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        let mut row: address::ActiveModel = existing.into();
        row.recipient_name = Set(input.recipient_name);
        row.phone = Set(input.phone);
        row.street = Set(input.street);
        row.city = Set(input.city);
        row.region = Set(input.region);
        row.postal_code = Set(input.postal_code);
        row.country = Set(input.country);
        row.updated_at = Set(Utc::now());
        row.update(&*self.db).await?;
        Ok(())
    }

    /// Deletes an address, with the same ownership filter as `update`.
    #[instrument(skip(self))]
    pub async fn delete(&self, buyer_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let existing = self
            .owned_address(buyer_id, address_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Address not found".to_string()))?;

        existing.delete(&*self.db).await?;
        Ok(())
    }

    /// Lists the buyer's addresses ordered by street ascending.
    pub async fn list(&self, buyer_id: Uuid) -> Result<Vec<address::Model>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::BuyerId.eq(buyer_id))
            .order_by_asc(address::Column::Street)
            .all(&*self.db)
            .await?)
    }

    /// Fetches an address only if it belongs to the buyer.
    pub async fn owned_address(
        &self,
        buyer_id: Uuid,
        address_id: Uuid,
    ) -> Result<Option<address::Model>, ServiceError> {
        Ok(Address::find_by_id(address_id)
            .filter(address::Column::BuyerId.eq(buyer_id))
            .one(&*self.db)
            .await?)
    }
}
