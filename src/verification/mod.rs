pub mod usernames;

pub use usernames::{GithubProfiles, ProfileDirectory};
