use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub String);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(TripId);
id_newtype!(ListingId);
id_newtype!(HousingRequestId);
id_newtype!(MatchId);
id_newtype!(
    /// Identifier of a lease, keyed by the e-signature vendor's document id.
    LeaseId
);
id_newtype!(BookingId);
id_newtype!(RentPaymentId);
id_newtype!(ModificationId);
id_newtype!(ReviewId);
id_newtype!(NotificationId);
id_newtype!(
    /// Opaque reference to a stored payment method at the payment provider.
    PaymentMethodId
);

/// Authenticated actor threaded explicitly into every mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: PrincipalRole,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            role: PrincipalRole::User,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            role: PrincipalRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == PrincipalRole::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRole {
    User,
    Admin,
}

/// A renter's search criteria and date range. Read-only to this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub renter_id: UserId,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A rentable property. External; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub host_id: UserId,
    pub title: String,
    pub monthly_rent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HousingRequestStatus {
    Pending,
    Approved,
    Declined,
}

impl HousingRequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }
}

/// A renter's request to rent a specific listing for a specific trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousingRequest {
    pub id: HousingRequestId,
    pub trip_id: TripId,
    pub listing_id: ListingId,
    pub renter_id: UserId,
    pub status: HousingRequestStatus,
    pub lease_document_id: Option<LeaseId>,
    pub submitted_at: DateTime<Utc>,
}

/// The unique pairing of one trip with one listing once a deal is being
/// negotiated. Holds the agreed monthly rent and payment authorization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalMatch {
    pub id: MatchId,
    pub trip_id: TripId,
    pub listing_id: ListingId,
    pub monthly_rent: Option<u32>,
    pub lease_document_id: Option<LeaseId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub payment_authorized_at: Option<DateTime<Utc>>,
    /// Maintained by the storage layer's relation handling: set when a booking
    /// is created for this match, nulled when that booking is deleted.
    pub booking_id: Option<BookingId>,
}

/// The lease document binding landlord and tenant(s) to a match.
///
/// Identity is immutable once created; only the signature flags move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub match_id: MatchId,
    pub landlord_id: UserId,
    pub primary_tenant_id: UserId,
    pub secondary_tenant_id: Option<UserId>,
    pub landlord_signed: bool,
    pub tenant_signed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A confirmed occupancy derived from a completed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub match_id: MatchId,
    pub trip_id: TripId,
    pub listing_id: ListingId,
    pub renter_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: u32,
    pub status: BookingStatus,
    pub move_in_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentPaymentKind {
    MonthlyRent,
}

impl RentPaymentKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MonthlyRent => "monthly_rent",
        }
    }
}

/// One scheduled rent installment for a booking. Amounts are whole dollars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentPayment {
    pub id: RentPaymentId,
    pub booking_id: BookingId,
    pub amount: u32,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub kind: RentPaymentKind,
    pub payment_method_id: PaymentMethodId,
    pub payment_authorized_at: Option<DateTime<Utc>>,
}

/// A guest or host review left against a booking. Only the deletion cascade
/// cares about these here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub booking_id: BookingId,
    pub author_id: UserId,
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ModificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Proposed replacement for a booking's occupancy window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Proposed replacement for a rent payment's amount and due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub amount: u32,
    pub due_date: NaiveDate,
}

/// One proposed, approvable change to a live target. The booking-date and
/// rent-payment variants share this record shape with different value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRecord<Id, V> {
    pub id: ModificationId,
    pub target_id: Id,
    pub booking_id: BookingId,
    pub requestor_id: UserId,
    pub recipient_id: UserId,
    pub original: V,
    pub proposed: V,
    pub status: ModificationStatus,
    pub reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

pub type BookingModification = ModificationRecord<BookingId, DateWindow>;
pub type PaymentModification = ModificationRecord<RentPaymentId, PaymentTerms>;

/// Event payload on a notification, one variant per action type so each
/// carries exactly the fields its consumer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationAction {
    ApplicationReceived {
        housing_request_id: HousingRequestId,
    },
    ApplicationApproved {
        housing_request_id: HousingRequestId,
        match_id: MatchId,
    },
    ApplicationDeclined {
        housing_request_id: HousingRequestId,
    },
    BookingConfirmed {
        booking_id: BookingId,
    },
    MoveInCompleted {
        booking_id: BookingId,
        first_payment_id: Option<RentPaymentId>,
    },
    BookingChangeRequested {
        modification_id: ModificationId,
        booking_id: BookingId,
    },
    BookingChangeApproved {
        modification_id: ModificationId,
        booking_id: BookingId,
    },
    BookingChangeDeclined {
        modification_id: ModificationId,
        booking_id: BookingId,
        reason: Option<String>,
    },
    PaymentChangeRequested {
        modification_id: ModificationId,
        rent_payment_id: RentPaymentId,
    },
    PaymentChangeApproved {
        modification_id: ModificationId,
        rent_payment_id: RentPaymentId,
    },
    PaymentChangeDeclined {
        modification_id: ModificationId,
        rent_payment_id: RentPaymentId,
        reason: Option<String>,
    },
}

impl NotificationAction {
    /// The primary record this event points at, used when cleanup flows need
    /// to remove every notification referencing a deleted record.
    pub fn action_id(&self) -> &str {
        match self {
            Self::ApplicationReceived { housing_request_id }
            | Self::ApplicationApproved {
                housing_request_id, ..
            }
            | Self::ApplicationDeclined { housing_request_id } => &housing_request_id.0,
            Self::BookingConfirmed { booking_id }
            | Self::MoveInCompleted { booking_id, .. } => &booking_id.0,
            Self::BookingChangeRequested {
                modification_id, ..
            }
            | Self::BookingChangeApproved {
                modification_id, ..
            }
            | Self::BookingChangeDeclined {
                modification_id, ..
            }
            | Self::PaymentChangeRequested {
                modification_id, ..
            }
            | Self::PaymentChangeApproved {
                modification_id, ..
            }
            | Self::PaymentChangeDeclined {
                modification_id, ..
            } => &modification_id.0,
        }
    }
}

/// A user-facing event record. Created as a side effect of lifecycle steps;
/// never required for core correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub content: String,
    pub url: String,
    pub action: NotificationAction,
    pub created_at: DateTime<Utc>,
}
