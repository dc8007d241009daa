pub mod filesystem;
pub mod naming;

pub use filesystem::{FileStorage, StoreOutcome};
pub use naming::{run_date_folder, sanitize_file_name, sanitize_segment};
