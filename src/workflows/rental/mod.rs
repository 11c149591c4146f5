//! The rental transaction lifecycle: application intake, matching, leasing,
//! booking conversion, rent scheduling, and post-booking change requests.
//!
//! Every mutating operation takes an explicit [`Principal`] and runs inside a
//! store transaction, so multi-record steps commit or roll back as one unit.

pub mod applications;
pub mod booking;
pub mod dashboards;
pub mod domain;
pub mod error;
pub mod leasing;
pub mod matching;
pub mod modifications;
pub mod notifications;
pub mod pricing;
pub mod router;
pub mod schedule;
pub mod store;

#[cfg(test)]
mod tests;

pub use applications::ApplicationManager;
pub use booking::{BookingFactory, SweepOutcome};
pub use dashboards::{DashboardReader, HostDashboard, RenterDashboard};
pub use domain::{
    Booking, BookingId, BookingModification, BookingStatus, DateWindow, HousingRequest,
    HousingRequestId, HousingRequestStatus, Lease, LeaseId, Listing, ListingId, MatchId,
    ModificationId, ModificationStatus, Notification, NotificationAction, PaymentMethodId,
    PaymentModification, PaymentTerms, Principal, PrincipalRole, RentPayment, RentPaymentId,
    RentPaymentKind, RentalMatch, Review, ReviewId, Trip, TripId, UserId,
};
pub use error::LifecycleError;
pub use leasing::{LeaseOrchestrator, SignerRole};
pub use matching::MatchBroker;
pub use modifications::{
    modifications_for_user, BookingDates, ModificationEntry, ModificationWorkflow,
    RentPaymentTerms,
};
pub use notifications::{DispatchError, LogDispatcher, NotificationDispatcher};
pub use pricing::{AdvertisedRentPricing, PricingError, PricingRule};
pub use router::{rental_router, RentalServices};
pub use schedule::generate_rent_payments;
pub use store::MarketplaceStore;
