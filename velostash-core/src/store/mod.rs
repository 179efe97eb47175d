pub mod migrate;
pub mod parameters;
pub mod results;
pub mod schema;
pub mod sqlite;
mod traits;
pub mod versioned;

pub use parameters::SqliteParameterStore;
pub use results::SqliteResultStore;
pub use sqlite::{CollectionStats, Database, LocalOpenReport, LocalStore, StoreStats};
pub use traits::{ParameterStore, ResultStore};
pub use versioned::{OpenPath, OpenReport, StoreState};
