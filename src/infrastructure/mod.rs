// Infrastructure layer - Backend client, configuration and host I/O formats
pub mod config;
pub mod csv_export;
pub mod host_message;
pub mod http_client;
