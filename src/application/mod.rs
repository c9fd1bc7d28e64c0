// Application layer - Store, polling machinery and dashboard use cases
pub mod dashboard_service;
pub mod debounce;
pub mod events;
pub mod poller;
pub mod scalar_api;
pub mod series_store;
pub mod single_flight;
