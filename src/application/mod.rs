pub mod use_cases;

pub use use_cases::geocode::GeocodeUseCase;
pub use use_cases::geocode_csv::GeocodeCsvUseCase;
