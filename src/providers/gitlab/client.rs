mod core;
mod jobs;
mod projects;

pub use self::core::GitLabClient;
