use std::sync::Arc;

use caperoute_booking::BookingManager;
use caperoute_core::gateway::PaymentGateway;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    /// Also held by the manager; exposed here for webhook verification,
    /// which happens before any manager call.
    pub gateway: Arc<dyn PaymentGateway>,
}
