pub use reqwest::Url;

pub mod config;
pub mod error;
pub mod isbn;
pub mod links;
pub mod lookup;
pub mod progress;
pub mod scan;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::isbn::BookIdentifier;
    pub use crate::lookup::{CatalogItem, CatalogProvider, CatalogQueryResult};
    pub use crate::scan::{CaptureControl, Detection, ScanCoordinator, ScanObserver, ScanState, Symbology};
}
