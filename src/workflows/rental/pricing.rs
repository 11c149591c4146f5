use super::domain::{Listing, Trip};

/// External pricing rule collaborator: computes the monthly rent a match is
/// negotiated at. Opaque to this core.
pub trait PricingRule: Send + Sync {
    fn calculate_rent(&self, listing: &Listing, trip: &Trip) -> Result<u32, PricingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("no rent published for listing {0}")]
    Unpriced(String),
    #[error("pricing rule unavailable: {0}")]
    Unavailable(String),
}

/// Default rule: the listing's advertised monthly rent, regardless of trip
/// length.
#[derive(Debug, Default, Clone)]
pub struct AdvertisedRentPricing;

impl PricingRule for AdvertisedRentPricing {
    fn calculate_rent(&self, listing: &Listing, _trip: &Trip) -> Result<u32, PricingError> {
        if listing.monthly_rent == 0 {
            return Err(PricingError::Unpriced(listing.id.0.clone()));
        }
        Ok(listing.monthly_rent)
    }
}
