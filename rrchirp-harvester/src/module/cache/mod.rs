///! County id cache
///!
///! Maps (state, normalized county name) to the upstream county id so a
///! county only has to be searched for once. Backed by a JSON document
///! sectioned by state code.

mod store;
mod types;

pub use store::CountyCache;
pub use types::{normalize_county_name, CountyCacheEntry, VerificationOutcome};
