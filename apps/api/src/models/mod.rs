pub mod job;
pub mod profile;

pub use job::{ApplicationMode, JobRecord, JobSearchPreferences, LocationType};
pub use profile::UserProfile;
