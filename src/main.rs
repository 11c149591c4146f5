use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use rental_flow::config::AppConfig;
use rental_flow::error::AppError;
use rental_flow::telemetry;
use rental_flow::workflows::rental::{
    rental_router, AdvertisedRentPricing, DateWindow, Listing, ListingId, LogDispatcher,
    MarketplaceStore, PaymentMethodId, Principal, RentalServices, SignerRole, Trip, TripId,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Rental Flow",
    about = "Run the rental transaction lifecycle service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a scripted application-to-booking lifecycle and print each step
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo(),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let store = Arc::new(MarketplaceStore::new());
    let services = Arc::new(RentalServices::new(
        store,
        Arc::new(LogDispatcher),
        Arc::new(AdvertisedRentPricing),
        config.quotas,
        config.environment,
    ));

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(rental_router(services))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "rental lifecycle service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_demo() -> Result<(), AppError> {
    let store = Arc::new(MarketplaceStore::new());
    let config = AppConfig::load()?;
    let services = RentalServices::new(
        store.clone(),
        Arc::new(LogDispatcher),
        Arc::new(AdvertisedRentPricing),
        config.quotas,
        config.environment,
    );

    let start = demo_date(2026, 1, 15);
    let end = demo_date(2026, 7, 15);
    store.seed(|state| {
        state.insert_trip(Trip {
            id: TripId::from("trip-demo"),
            renter_id: "renter-demo".into(),
            start_date: Some(start),
            end_date: Some(end),
        });
        state.insert_listing(Listing {
            id: ListingId::from("listing-demo"),
            host_id: "host-demo".into(),
            title: "Sunny one-bedroom near the park".to_string(),
            monthly_rent: 1000,
        });
    });

    let renter = Principal::user("renter-demo");
    let host = Principal::user("host-demo");

    println!("Rental lifecycle demo");
    println!("Stay: {start} -> {end} at $1000/month\n");

    let request = services
        .applications
        .create(&renter, &TripId::from("trip-demo"), &ListingId::from("listing-demo"))?;
    println!("1. Application {} submitted ({})", request.id, request.status.label());

    let (request, rental_match) = services.applications.approve(&host, &request.id)?;
    println!(
        "2. Application {} approved; match {} at ${}/month",
        request.id,
        rental_match.id,
        rental_match.monthly_rent.unwrap_or_default()
    );

    let lease = services.leases.create_for_match(
        &host,
        "lease-demo".into(),
        &rental_match.id,
        None,
    )?;
    services
        .leases
        .record_signature(&renter, &lease.id, SignerRole::Tenant)?;
    services
        .leases
        .record_signature(&host, &lease.id, SignerRole::Landlord)?;
    println!("3. Lease {} signed by both parties", lease.id);

    services.matches.record_payment_authorization(
        &renter,
        &rental_match.id,
        PaymentMethodId::from("pm-demo"),
    )?;
    println!("4. Payment authorized on match {}", rental_match.id);

    let booking = services.bookings.create_from_match(&renter, &rental_match.id)?;
    println!("5. Booking {} confirmed", booking.id);

    println!("\nRent schedule");
    let payments = store.read(|state| {
        state
            .rent_payments_for_booking(&booking.id)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    })?;
    for payment in &payments {
        let authorized = if payment.payment_authorized_at.is_some() {
            " (authorized)"
        } else {
            ""
        };
        println!("- {} due {}: ${}{}", payment.id, payment.due_date, payment.amount, authorized);
    }

    services.bookings.complete_move_in(&host, &booking.id)?;
    println!("\n6. Move-in completed; booking is active");

    let change = services.booking_changes.create(
        &renter,
        &booking.id,
        DateWindow {
            start_date: start,
            end_date: demo_date(2026, 8, 15),
        },
        Some("extending the stay by a month".to_string()),
    )?;
    let change = services.booking_changes.approve(&host, &change.id)?;
    println!(
        "7. Date change {} approved; booking now ends {}",
        change.id, change.proposed.end_date
    );

    let dashboard = services
        .dashboards
        .renter_dashboard(&renter, &booking.renter_id)?;
    println!(
        "\nRenter dashboard: {} booking(s), next payment {}",
        dashboard.bookings.len(),
        dashboard
            .next_payment
            .map(|payment| format!("${} due {}", payment.amount, payment.due_date))
            .unwrap_or_else(|| "none".to_string())
    );

    Ok(())
}

fn demo_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
