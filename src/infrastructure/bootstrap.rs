use std::sync::Arc;

use tracing::info;

use crate::application::{GeocodeCsvUseCase, GeocodeUseCase};
use crate::domain::error::Result;
use crate::infrastructure::addok::{AddokClient, BackendRowGeocoder};
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::HttpState;

/// Wire the backend client and use cases for `config`.
pub fn setup(config: AppConfig) -> Result<HttpState> {
    let client = Arc::new(AddokClient::new(&config)?);
    info!(
        addok_service_url = %client.base_url(),
        max_retries = config.max_retries,
        csv_concurrency = config.csv_concurrency,
        "Geocoding backend configured"
    );

    let geocode_use_case = Arc::new(GeocodeUseCase::new(client.clone()));
    let geocode_csv_use_case = Arc::new(GeocodeCsvUseCase::new(
        Arc::new(BackendRowGeocoder::new(client)),
        config.csv_concurrency,
    ));

    Ok(HttpState {
        geocode_use_case,
        geocode_csv_use_case,
        config,
    })
}
