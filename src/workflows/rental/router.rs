use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{AppEnvironment, ApplicationQuotas};
use crate::error::lifecycle_status;

use super::booking::BookingFactory;
use super::dashboards::DashboardReader;
use super::domain::{
    BookingId, DateWindow, HousingRequestId, LeaseId, ListingId, MatchId, ModificationId,
    ModificationStatus, PaymentMethodId, PaymentTerms, Principal, RentPaymentId, TripId, UserId,
};
use super::error::LifecycleError;
use super::leasing::{LeaseOrchestrator, SignerRole};
use super::matching::MatchBroker;
use super::modifications::{
    modifications_for_user, BookingDates, ModificationWorkflow, RentPaymentTerms,
};
use super::applications::ApplicationManager;
use super::notifications::NotificationDispatcher;
use super::pricing::PricingRule;
use super::store::MarketplaceStore;

/// The full set of lifecycle services behind the HTTP surface, sharing one
/// store and one notification dispatcher.
pub struct RentalServices<D> {
    pub store: Arc<MarketplaceStore>,
    pub applications: ApplicationManager<D>,
    pub matches: MatchBroker,
    pub leases: LeaseOrchestrator,
    pub bookings: BookingFactory<D>,
    pub booking_changes: ModificationWorkflow<BookingDates, D>,
    pub payment_changes: ModificationWorkflow<RentPaymentTerms, D>,
    pub dashboards: DashboardReader,
}

impl<D> RentalServices<D>
where
    D: NotificationDispatcher + 'static,
{
    pub fn new(
        store: Arc<MarketplaceStore>,
        dispatcher: Arc<D>,
        pricing: Arc<dyn PricingRule>,
        quotas: ApplicationQuotas,
        environment: AppEnvironment,
    ) -> Self {
        Self {
            applications: ApplicationManager::new(
                store.clone(),
                dispatcher.clone(),
                pricing.clone(),
                quotas,
            ),
            matches: MatchBroker::new(store.clone(), pricing),
            leases: LeaseOrchestrator::new(store.clone()),
            bookings: BookingFactory::new(store.clone(), dispatcher.clone(), environment),
            booking_changes: ModificationWorkflow::new(store.clone(), dispatcher.clone()),
            payment_changes: ModificationWorkflow::new(store.clone(), dispatcher),
            dashboards: DashboardReader::new(store.clone()),
            store,
        }
    }
}

/// Router builder exposing the transaction lifecycle endpoints.
pub fn rental_router<D>(services: Arc<RentalServices<D>>) -> Router
where
    D: NotificationDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/rental/applications",
            post(create_application::<D>),
        )
        .route(
            "/api/v1/rental/applications/:request_id",
            delete(withdraw_application::<D>),
        )
        .route(
            "/api/v1/rental/applications/:request_id/approve",
            post(approve_application::<D>),
        )
        .route(
            "/api/v1/rental/applications/:request_id/decline",
            post(decline_application::<D>),
        )
        .route(
            "/api/v1/rental/applications/:request_id/undo-approval",
            post(undo_approval::<D>),
        )
        .route(
            "/api/v1/rental/applications/:request_id/undo-decline",
            post(undo_decline::<D>),
        )
        .route(
            "/api/v1/rental/matches/:match_id",
            delete(delete_match::<D>),
        )
        .route(
            "/api/v1/rental/matches/:match_id/authorize-payment",
            post(authorize_payment::<D>),
        )
        .route("/api/v1/rental/leases", post(create_lease::<D>))
        .route(
            "/api/v1/rental/leases/:document_id/signatures",
            post(record_signature::<D>),
        )
        .route("/api/v1/rental/bookings", post(create_booking::<D>))
        .route("/api/v1/rental/bookings/sweep", post(sweep_bookings::<D>))
        .route(
            "/api/v1/rental/bookings/:booking_id",
            delete(delete_booking::<D>),
        )
        .route(
            "/api/v1/rental/bookings/:booking_id/move-in",
            post(complete_move_in::<D>),
        )
        .route(
            "/api/v1/rental/bookings/:booking_id/changes",
            post(create_booking_change::<D>).get(list_booking_changes::<D>),
        )
        .route(
            "/api/v1/rental/booking-changes/:modification_id/approve",
            post(approve_booking_change::<D>),
        )
        .route(
            "/api/v1/rental/booking-changes/:modification_id/reject",
            post(reject_booking_change::<D>),
        )
        .route(
            "/api/v1/rental/booking-changes/:modification_id/viewed",
            post(view_booking_change::<D>),
        )
        .route(
            "/api/v1/rental/payments/:payment_id/changes",
            post(create_payment_change::<D>).get(list_payment_changes::<D>),
        )
        .route(
            "/api/v1/rental/payment-changes/:modification_id/approve",
            post(approve_payment_change::<D>),
        )
        .route(
            "/api/v1/rental/payment-changes/:modification_id/reject",
            post(reject_payment_change::<D>),
        )
        .route(
            "/api/v1/rental/payment-changes/:modification_id/viewed",
            post(view_payment_change::<D>),
        )
        .route(
            "/api/v1/rental/users/:user_id/changes",
            get(list_user_changes::<D>),
        )
        .route(
            "/api/v1/rental/users/:user_id/notifications",
            get(list_notifications::<D>),
        )
        .route(
            "/api/v1/rental/users/:user_id/dashboard",
            get(renter_dashboard::<D>),
        )
        .route(
            "/api/v1/rental/listings/:listing_id/dashboard",
            get(host_dashboard::<D>),
        )
        .with_state(services)
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, LifecycleError> {
    let user_id = headers
        .get("x-principal-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or(LifecycleError::Unauthenticated)?;
    let is_admin = headers
        .get("x-principal-role")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("admin"))
        .unwrap_or(false);
    Ok(if is_admin {
        Principal::admin(user_id)
    } else {
        Principal::user(user_id)
    })
}

fn error_response(err: LifecycleError) -> Response {
    let status = lifecycle_status(&err);
    let payload = match &err {
        LifecycleError::QuotaExceeded {
            trip_open,
            renter_open,
            per_trip_limit,
            global_limit,
        } => json!({
            "error": err.to_string(),
            "trip_open": trip_open,
            "renter_open": renter_open,
            "per_trip_limit": per_trip_limit,
            "global_limit": global_limit,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, axum::Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, LifecycleError>) -> Response {
    match result {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

fn with_principal(
    headers: &HeaderMap,
    run: impl FnOnce(Principal) -> Response,
) -> Response {
    match principal_from_headers(headers) {
        Ok(principal) => run(principal),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct CreateApplicationBody {
    trip_id: TripId,
    listing_id: ListingId,
}

async fn create_application<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateApplicationBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        respond(
            StatusCode::CREATED,
            services
                .applications
                .create(&principal, &body.trip_id, &body.listing_id),
        )
    })
}

async fn withdraw_application<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = HousingRequestId(request_id);
        match services.applications.withdraw(&principal, &id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => error_response(err),
        }
    })
}

async fn approve_application<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = HousingRequestId(request_id);
        match services.applications.approve(&principal, &id) {
            Ok((request, rental_match)) => (
                StatusCode::OK,
                axum::Json(json!({
                    "request": request,
                    "match": rental_match,
                })),
            )
                .into_response(),
            Err(err) => error_response(err),
        }
    })
}

async fn decline_application<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = HousingRequestId(request_id);
        respond(StatusCode::OK, services.applications.decline(&principal, &id))
    })
}

async fn undo_approval<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = HousingRequestId(request_id);
        respond(
            StatusCode::OK,
            services.applications.undo_approval(&principal, &id),
        )
    })
}

async fn undo_decline<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = HousingRequestId(request_id);
        respond(
            StatusCode::OK,
            services.applications.undo_decline(&principal, &id),
        )
    })
}

async fn delete_match<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(match_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = MatchId(match_id);
        match services.matches.delete(&principal, &id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => error_response(err),
        }
    })
}

#[derive(Debug, Deserialize)]
struct AuthorizePaymentBody {
    payment_method_id: PaymentMethodId,
}

async fn authorize_payment<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(match_id): Path<String>,
    axum::Json(body): axum::Json<AuthorizePaymentBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = MatchId(match_id);
        respond(
            StatusCode::OK,
            services
                .matches
                .record_payment_authorization(&principal, &id, body.payment_method_id),
        )
    })
}

#[derive(Debug, Deserialize)]
struct CreateLeaseBody {
    document_id: LeaseId,
    match_id: MatchId,
    secondary_tenant_id: Option<UserId>,
}

async fn create_lease<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateLeaseBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        respond(
            StatusCode::CREATED,
            services.leases.create_for_match(
                &principal,
                body.document_id,
                &body.match_id,
                body.secondary_tenant_id,
            ),
        )
    })
}

#[derive(Debug, Deserialize)]
struct RecordSignatureBody {
    role: SignerRole,
}

async fn record_signature<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    axum::Json(body): axum::Json<RecordSignatureBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = LeaseId(document_id);
        respond(
            StatusCode::OK,
            services.leases.record_signature(&principal, &id, body.role),
        )
    })
}

#[derive(Debug, Deserialize)]
struct CreateBookingBody {
    match_id: MatchId,
}

async fn create_booking<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateBookingBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        respond(
            StatusCode::CREATED,
            services.bookings.create_from_match(&principal, &body.match_id),
        )
    })
}

async fn sweep_bookings<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        respond(
            StatusCode::OK,
            services.bookings.sweep_completed_matches(&principal),
        )
    })
}

async fn delete_booking<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = BookingId(booking_id);
        match services.bookings.delete(&principal, &id) {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(err) => error_response(err),
        }
    })
}

async fn complete_move_in<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = BookingId(booking_id);
        respond(
            StatusCode::OK,
            services.bookings.complete_move_in(&principal, &id),
        )
    })
}

#[derive(Debug, Deserialize)]
struct BookingChangeBody {
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: Option<String>,
}

async fn create_booking_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    axum::Json(body): axum::Json<BookingChangeBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = BookingId(booking_id);
        let proposed = DateWindow {
            start_date: body.start_date,
            end_date: body.end_date,
        };
        respond(
            StatusCode::CREATED,
            services
                .booking_changes
                .create(&principal, &id, proposed, body.reason),
        )
    })
}

async fn list_booking_changes<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = BookingId(booking_id);
        respond(
            StatusCode::OK,
            services.booking_changes.list_for_target(&principal, &id),
        )
    })
}

#[derive(Debug, Deserialize)]
struct RejectChangeBody {
    reason: Option<String>,
}

async fn approve_booking_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(StatusCode::OK, services.booking_changes.approve(&principal, &id))
    })
}

async fn reject_booking_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
    axum::Json(body): axum::Json<RejectChangeBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(
            StatusCode::OK,
            services.booking_changes.reject(&principal, &id, body.reason),
        )
    })
}

async fn view_booking_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(
            StatusCode::OK,
            services.booking_changes.mark_viewed(&principal, &id),
        )
    })
}

#[derive(Debug, Deserialize)]
struct PaymentChangeBody {
    amount: u32,
    due_date: NaiveDate,
    reason: Option<String>,
}

async fn create_payment_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    axum::Json(body): axum::Json<PaymentChangeBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = RentPaymentId(payment_id);
        let proposed = PaymentTerms {
            amount: body.amount,
            due_date: body.due_date,
        };
        respond(
            StatusCode::CREATED,
            services
                .payment_changes
                .create(&principal, &id, proposed, body.reason),
        )
    })
}

async fn list_payment_changes<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = RentPaymentId(payment_id);
        respond(
            StatusCode::OK,
            services.payment_changes.list_for_target(&principal, &id),
        )
    })
}

async fn approve_payment_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(StatusCode::OK, services.payment_changes.approve(&principal, &id))
    })
}

async fn reject_payment_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
    axum::Json(body): axum::Json<RejectChangeBody>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(
            StatusCode::OK,
            services.payment_changes.reject(&principal, &id, body.reason),
        )
    })
}

async fn view_payment_change<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(modification_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ModificationId(modification_id);
        respond(
            StatusCode::OK,
            services.payment_changes.mark_viewed(&principal, &id),
        )
    })
}

#[derive(Debug, Deserialize)]
struct ChangeFilter {
    status: Option<ModificationStatus>,
}

async fn list_user_changes<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
    Query(filter): Query<ChangeFilter>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = UserId(user_id);
        respond(
            StatusCode::OK,
            modifications_for_user(&services.store, &principal, &id, filter.status),
        )
    })
}

async fn list_notifications<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = UserId(user_id);
        if principal.user_id != id && !principal.is_admin() {
            return error_response(LifecycleError::unauthorized(
                "users may only list their own notifications",
            ));
        }
        respond(
            StatusCode::OK,
            services.store.read(|state| {
                let mut rows: Vec<_> = state
                    .notifications_for_user(&id)
                    .into_iter()
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rows
            }),
        )
    })
}

async fn renter_dashboard<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = UserId(user_id);
        respond(
            StatusCode::OK,
            services.dashboards.renter_dashboard(&principal, &id),
        )
    })
}

async fn host_dashboard<D>(
    State(services): State<Arc<RentalServices<D>>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response
where
    D: NotificationDispatcher + 'static,
{
    with_principal(&headers, |principal| {
        let id = ListingId(listing_id);
        respond(
            StatusCode::OK,
            services.dashboards.host_dashboard(&principal, &id),
        )
    })
}
