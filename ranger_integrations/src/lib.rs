//! HTTP implementations of the site and hub collaborators.

pub mod earthranger;
pub mod hub;

pub use earthranger::{EarthRangerClient, EarthRangerConnector};
pub use hub::HubClient;
