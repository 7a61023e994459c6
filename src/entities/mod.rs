//! Typed database entities.
//!
//! Every row read back from the store is validated into one of these
//! structs at the boundary; no loosely shaped rows cross into the services.

pub mod address;
pub mod cart;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment_record;
pub mod product;
pub mod product_image;

pub use address::Entity as Address;
pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment_record::Entity as PaymentRecord;
pub use product::Entity as Product;
pub use product_image::Entity as ProductImage;
