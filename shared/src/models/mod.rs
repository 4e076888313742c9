//! Domain models for multi-location inventory accounting

mod alert;
mod analytics;
mod inventory;
mod location;
mod product;
mod transaction;
mod views;

pub use alert::*;
pub use analytics::*;
pub use inventory::*;
pub use location::*;
pub use product::*;
pub use transaction::*;
pub use views::*;
