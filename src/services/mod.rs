pub mod addresses;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payments;

pub use addresses::AddressService;
pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderCommitService;
pub use payments::PaymentService;
