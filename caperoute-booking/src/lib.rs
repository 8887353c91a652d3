pub mod emails;
pub mod manager;
pub mod policy;
pub mod reference;
pub mod testing;
pub mod tokens;

pub use manager::{BookingManager, ManagerConfig};
pub use tokens::{InMemoryTokenStore, IssuedToken, TokenStore};
