// Domain layer - Series records and pure projections
pub mod comparison;
pub mod series;
pub mod view;
