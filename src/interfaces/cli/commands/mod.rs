pub mod config_gen;
pub mod deliveries;
pub mod profiles;

pub use config_gen::config_generate;
pub use deliveries::{list_deliveries, retry_delivery};
pub use profiles::{import_profiles, list_profiles};
