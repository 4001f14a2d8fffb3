//! GitHub integration: REST client, pull-request change notes, release
//! notes publishing, and release/tag/branch operations.

pub mod client;
pub mod models;
pub mod provider;
pub mod publish;
pub mod release;
pub mod tags;

pub use client::{GitHubClient, MergeOutcome};
pub use provider::GitHubChangeNotesProvider;
pub use publish::publish_release_notes;
pub use release::{clone_tag, create_release, merge_master_to_feature, MergeReport};
pub use tags::find_previous_release_tag;
