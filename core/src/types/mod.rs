pub mod cdist_type;
pub mod config;
pub mod object;

pub use cdist_type::CdistType;
pub use config::Settings;
pub use object::{CdistObject, Declarations, ObjectName, ObjectSpec, ObjectState};
