pub mod model;
pub mod repository;

pub use model::{Boundaries, Hotspot, Location};
pub use repository::HotspotRepository;
