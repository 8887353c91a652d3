pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod repository;

pub use error::BookingError;
pub use models::{
    Booking, BookingDetails, BookingStatus, BookingType, BookingView, Customer, Payment,
    PaymentStatus, TourPackage,
};
