pub mod error;
pub mod format;
pub mod stage;
pub mod traits;
pub mod types;

pub use error::*;
pub use stage::*;
pub use traits::*;
pub use types::*;
