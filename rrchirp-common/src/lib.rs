///! Types shared between the harvester library and its command line front end

pub mod frequency;
pub mod states;
pub mod types;

pub use frequency::Frequency;
pub use states::UsState;
pub use types::*;
